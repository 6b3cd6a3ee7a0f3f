/// Round-robin scheduling of tile multiplies across the accelerator units
use crate::gpu::dispatch::MatmulBackend;
use crate::gpu::isa::{UnitState, TILE_ELEMS};

/// Upper bound on status polls per wait before giving up (0 = unbounded)
pub const DEFAULT_POLL_BUDGET: u64 = 1_000_000;

/// Single-issuer scheduler over a backend's units. The cursor is the only
/// state: it advances after every pick, spreading tiles across units.
pub struct UnitScheduler<'a> {
  backend: &'a mut dyn MatmulBackend,
  cursor: usize,
  poll_budget: u64,
  issued: u64,
}

impl<'a> UnitScheduler<'a> {
  pub fn new(backend: &'a mut dyn MatmulBackend) -> Self {
    Self::with_poll_budget(backend, DEFAULT_POLL_BUDGET)
  }

  pub fn with_poll_budget(backend: &'a mut dyn MatmulBackend, poll_budget: u64) -> Self {
    Self {
      backend,
      cursor: 0,
      poll_budget,
      issued: 0,
    }
  }

  pub fn num_units(&self) -> usize {
    self.backend.num_units()
  }

  pub fn ticks(&self) -> u64 {
    self.backend.ticks()
  }

  /// Tiles issued through this scheduler so far
  pub fn issued(&self) -> u64 {
    self.issued
  }

  /// Return the next unit in round-robin order and advance the cursor
  pub fn pick_next(&mut self) -> usize {
    let unit = self.cursor;
    self.cursor = (self.cursor + 1) % self.backend.num_units();
    unit
  }

  /// Busy-wait until `unit` reports Idle. Error is fatal: the unit must not
  /// be re-issued until the backend is reset.
  pub fn wait_idle(&mut self, unit: usize) -> Result<(), String> {
    let mut polls: u64 = 0;
    loop {
      match self.backend.probe(unit) {
        UnitState::Idle => return Ok(()),
        UnitState::Error => {
          return Err(format!("unit {} is in error state, reset required", unit));
        }
        UnitState::Busy | UnitState::Done => {}
      }

      polls += 1;
      if self.poll_budget > 0 && polls >= self.poll_budget {
        return Err(format!("unit {} still not idle after {} polls", unit, polls));
      }
    }
  }

  pub fn wait_all_idle(&mut self) -> Result<(), String> {
    for unit in 0..self.backend.num_units() {
      self.wait_idle(unit)?;
    }
    Ok(())
  }

  /// Issue a tile pair once `unit` is free
  pub fn issue(&mut self, unit: usize, a: &[i8; TILE_ELEMS], b: &[i8; TILE_ELEMS]) -> Result<(), String> {
    self.wait_idle(unit)?;
    self.backend.issue(unit, a, b)?;
    self.issued += 1;
    Ok(())
  }

  /// Wait for `unit` to finish and copy its result into `c`
  pub fn collect(&mut self, unit: usize, c: &mut [i16; TILE_ELEMS]) -> Result<(), String> {
    self.wait_idle(unit)?;
    self.backend.collect(unit, c)
  }

  /// One dispatched 4x4 multiply: issue, drain, read back
  pub fn matmul_4x4(
    &mut self,
    unit: usize,
    a: &[i8; TILE_ELEMS],
    b: &[i8; TILE_ELEMS],
    c: &mut [i16; TILE_ELEMS],
  ) -> Result<(), String> {
    self.issue(unit, a, b)?;
    self.collect(unit, c)
  }
}
