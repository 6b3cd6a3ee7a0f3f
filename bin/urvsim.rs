use clap::Parser;
use std::process;
use urvsim::config::load_and_merge_configs;
use urvsim::harness::Testbench;
use urvsim::utils::log::{init_log, set_log};
use urvsim::utils::log_config::{set_mem_log, set_unit_log};

/// urvsim - A RISC-V matrix coprocessor simulator
#[derive(Parser, Debug)]
#[command(name = "urvsim")]
#[command(version = "0.1.0")]
#[command(about = "Cycle-level simulator for a RISC-V SoC with a matrix coprocessor", long_about = None)]
struct Args {
  /// Enable step mode (interactive stepping)
  #[arg(short, long)]
  step: bool,

  /// Quiet mode (suppress log messages)
  #[arg(short, long)]
  quiet: bool,

  /// Output trace file path (JSON lines, one record per clock edge)
  #[arg(long, value_name = "FILE")]
  trace_file: Option<String>,

  /// Configuration file path (TOML)
  #[arg(short, long, value_name = "FILE")]
  config: Option<String>,

  /// Number of matrix units
  #[arg(long, value_name = "N")]
  units: Option<usize>,

  /// Main memory latency in cycles
  #[arg(long, value_name = "CYCLES")]
  mem_latency: Option<u32>,

  /// Run benchmarks after the test suite
  #[arg(short, long)]
  bench: bool,

  /// Enable memory transaction debug log
  #[arg(long)]
  mem_log: bool,

  /// Enable matrix unit state debug log
  #[arg(long)]
  unit_log: bool,
}

fn main() -> std::io::Result<()> {
  init_log();

  let args = Args::parse();

  let config = load_and_merge_configs(
    args.config.as_deref(),
    args.quiet,
    args.step,
    &args.trace_file,
    args.units,
    args.mem_latency,
  )?;

  if config.simulation.quiet {
    set_log(false);
  }
  set_mem_log(args.mem_log);
  set_unit_log(args.unit_log);

  let mut testbench = Testbench::new(config.clone())?;

  if config.simulation.step_mode {
    return testbench.run_step_mode();
  }

  let all_passed = testbench.run_all_tests();
  if args.bench {
    testbench.run_benchmarks();
  }
  testbench.print_summary();

  if !all_passed {
    process::exit(1);
  }
  Ok(())
}
