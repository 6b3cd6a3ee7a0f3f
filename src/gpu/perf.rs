/// Performance accounting over the backend's tick source
#[derive(Debug, Clone, Copy, Default)]
pub struct PerfCounter {
  start_ticks: u64,
  end_ticks: u64,
  gpu_operations: u64,
}

impl PerfCounter {
  pub fn new() -> Self {
    Self::default()
  }

  /// Capture the starting tick count and clear the operation counter
  pub fn start(&mut self, ticks: u64) {
    self.start_ticks = ticks;
    self.end_ticks = ticks;
    self.gpu_operations = 0;
  }

  pub fn stop(&mut self, ticks: u64) {
    self.end_ticks = ticks;
  }

  pub fn add_ops(&mut self, ops: u64) {
    self.gpu_operations += ops;
  }

  pub fn elapsed(&self) -> u64 {
    self.end_ticks.saturating_sub(self.start_ticks)
  }

  pub fn operations(&self) -> u64 {
    self.gpu_operations
  }

  pub fn report(&self, label: &str) {
    println!("=== Performance Report: {} ===", label);
    println!("  Ticks: {}", self.elapsed());
    println!("  GPU operations: {}", self.gpu_operations);
    if self.gpu_operations > 0 {
      println!("  Ticks per operation: {}", self.elapsed() / self.gpu_operations);
    }
  }
}
