/// Waveform-style trace: one JSON object per clock edge
use std::fs::File;
use std::io::{BufWriter, Result, Write};
use std::path::Path;

/// Signal values sampled at one edge
pub struct EdgeSample<'a> {
  pub sim_time: u64,
  pub edge: &'static str,
  pub req_valid: bool,
  pub req_write: bool,
  pub req_addr: u32,
  pub ack: bool,
  pub units: &'a [u8],
}

pub struct TraceWriter {
  writer: BufWriter<File>,
}

impl TraceWriter {
  pub fn create(path: impl AsRef<Path>) -> Result<Self> {
    let file = File::create(path)?;
    Ok(Self {
      writer: BufWriter::new(file),
    })
  }

  pub fn record_edge(&mut self, sample: &EdgeSample) -> Result<()> {
    let entry = serde_json::json!({
      "t": sample.sim_time,
      "edge": sample.edge,
      "req": {
        "v": sample.req_valid,
        "we": sample.req_write,
        "addr": sample.req_addr,
      },
      "ack": sample.ack,
      "units": sample.units,
    });
    writeln!(self.writer, "{}", entry)?;
    self.writer.flush()
  }
}
