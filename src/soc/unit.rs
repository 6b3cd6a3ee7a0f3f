/// One matrix accelerator unit: fetch both tiles, compute, write back
use crate::builtin::{Module, Wire};
use crate::gpu::isa::{UnitState, TILE_ELEMS};
use crate::kernels::matmul::matmul_4x4_scalar;
use crate::log_config::is_unit_log_enabled;
use crate::soc::{MemRequest, MemResponse, BURST_LANES};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UnitFsm {
  Idle,
  FetchA,
  FetchB,
  Computing,
  WriteBack,
  Done,
  Error,
}

pub struct MatrixUnit {
  name: String,
  fsm: UnitFsm,
  a_addr: u32,
  b_addr: u32,
  c_addr: u32,
  a_tile: [i8; TILE_ELEMS],
  b_tile: [i8; TILE_ELEMS],
  c_tile: [i16; TILE_ELEMS],
  compute_latency: u32,
  compute_remaining: u32,
  /// Operand addresses latched by the decoder, consumed on the next cycle
  start: Option<(u32, u32, u32)>,
  req_sent: bool,

  pub mem_req: Wire<MemRequest>,
  pub mem_resp: Wire<MemResponse>,
}

impl MatrixUnit {
  pub fn new(name: impl Into<String>, compute_latency: u32) -> Self {
    Self {
      name: name.into(),
      fsm: UnitFsm::Idle,
      a_addr: 0,
      b_addr: 0,
      c_addr: 0,
      a_tile: [0; TILE_ELEMS],
      b_tile: [0; TILE_ELEMS],
      c_tile: [0; TILE_ELEMS],
      compute_latency,
      compute_remaining: 0,
      start: None,
      req_sent: false,
      mem_req: Wire::default(),
      mem_resp: Wire::default(),
    }
  }

  /// Latch a MATMUL issue. A unit that is not idle goes to Error and stays
  /// there until reset.
  pub fn start_matmul(&mut self, a_addr: u32, b_addr: u32, c_addr: u32) {
    if self.fsm != UnitFsm::Idle || self.start.is_some() {
      log::warn!("{}: issue while not idle", self.name);
      self.fsm = UnitFsm::Error;
      self.start = None;
      return;
    }
    self.start = Some((a_addr, b_addr, c_addr));
  }

  /// Architectural state as a STATUS probe sees it. Observing Done retires
  /// the unit to Idle; results are already committed to memory by then.
  pub fn status(&mut self) -> UnitState {
    match self.fsm {
      UnitFsm::Idle => {
        if self.start.is_some() {
          UnitState::Busy
        } else {
          UnitState::Idle
        }
      }
      UnitFsm::Done => {
        self.fsm = UnitFsm::Idle;
        UnitState::Done
      }
      UnitFsm::Error => UnitState::Error,
      _ => UnitState::Busy,
    }
  }

  /// State word without the Done-collapse side effect, for tracing
  pub fn state_bits(&self) -> u8 {
    match self.fsm {
      UnitFsm::Idle => {
        if self.start.is_some() {
          UnitState::Busy.bits() as u8
        } else {
          UnitState::Idle.bits() as u8
        }
      }
      UnitFsm::Done => UnitState::Done.bits() as u8,
      UnitFsm::Error => UnitState::Error.bits() as u8,
      _ => UnitState::Busy.bits() as u8,
    }
  }

  fn read_burst(&mut self, addr: u32) {
    self.mem_req.set(MemRequest {
      addr,
      wdata: [0; BURST_LANES],
      write: false,
    });
    self.req_sent = true;
  }

  fn tile_from_lanes(lanes: &[u32; BURST_LANES]) -> [i8; TILE_ELEMS] {
    // the 16 operand bytes are the first four lanes, little-endian
    let mut tile = [0i8; TILE_ELEMS];
    for (i, v) in tile.iter_mut().enumerate() {
      *v = (lanes[i / 4] >> ((i % 4) * 8)) as u8 as i8;
    }
    tile
  }

  fn lanes_from_result(&self) -> [u32; BURST_LANES] {
    // 16 INT16 results occupy lanes 0..8 little-endian, the rest stay zero
    let mut lanes = [0u32; BURST_LANES];
    for (i, &v) in self.c_tile.iter().enumerate() {
      lanes[i / 2] |= (v as u16 as u32) << ((i % 2) * 16);
    }
    lanes
  }

  fn log_state(&self, what: &str) {
    if is_unit_log_enabled() {
      log::debug!("{}: {}", self.name, what);
    }
  }
}

impl Module for MatrixUnit {
  fn run(&mut self) {
    match self.fsm {
      UnitFsm::Idle => {
        if let Some((a, b, c)) = self.start.take() {
          self.a_addr = a;
          self.b_addr = b;
          self.c_addr = c;
          self.fsm = UnitFsm::FetchA;
          self.req_sent = false;
          self.log_state("issue accepted, fetching A");
        }
      }
      UnitFsm::FetchA => {
        if !self.req_sent {
          self.read_burst(self.a_addr);
        } else if let Some(resp) = self.mem_resp.take() {
          self.a_tile = Self::tile_from_lanes(&resp.rdata);
          self.fsm = UnitFsm::FetchB;
          self.req_sent = false;
          self.log_state("A tile loaded, fetching B");
        }
      }
      UnitFsm::FetchB => {
        if !self.req_sent {
          self.read_burst(self.b_addr);
        } else if let Some(resp) = self.mem_resp.take() {
          self.b_tile = Self::tile_from_lanes(&resp.rdata);
          self.c_tile = matmul_4x4_scalar(&self.a_tile, &self.b_tile);
          self.fsm = UnitFsm::Computing;
          self.compute_remaining = self.compute_latency;
          self.log_state("B tile loaded, computing");
        }
      }
      UnitFsm::Computing => {
        if self.compute_remaining > 0 {
          self.compute_remaining -= 1;
        }
        if self.compute_remaining == 0 {
          self.fsm = UnitFsm::WriteBack;
          self.req_sent = false;
          self.log_state("compute finished, writing C");
        }
      }
      UnitFsm::WriteBack => {
        if !self.req_sent {
          let wdata = self.lanes_from_result();
          self.mem_req.set(MemRequest {
            addr: self.c_addr,
            wdata,
            write: true,
          });
          self.req_sent = true;
        } else if self.mem_resp.take().is_some() {
          self.fsm = UnitFsm::Done;
          self.log_state("write back acknowledged, done");
        }
      }
      UnitFsm::Done | UnitFsm::Error => {}
    }
  }

  fn reset(&mut self) {
    self.fsm = UnitFsm::Idle;
    self.a_addr = 0;
    self.b_addr = 0;
    self.c_addr = 0;
    self.a_tile = [0; TILE_ELEMS];
    self.b_tile = [0; TILE_ELEMS];
    self.c_tile = [0; TILE_ELEMS];
    self.compute_remaining = 0;
    self.start = None;
    self.req_sent = false;
    self.mem_req = Wire::default();
    self.mem_resp = Wire::default();
  }

  fn name(&self) -> &str {
    &self.name
  }
}
