/// Building blocks for cycle-level hardware modules
pub mod port;

pub use port::Wire;

/// A clocked module: one `run` call is one clock cycle
pub trait Module {
  /// Advance the module by one cycle
  fn run(&mut self);

  /// Return the module to its power-on state
  fn reset(&mut self);

  /// Instance name
  fn name(&self) -> &str;
}
