/// Per-component debug log switches
use std::sync::atomic::{AtomicBool, Ordering};

static ENABLE_MEM_LOG: AtomicBool = AtomicBool::new(false);
static ENABLE_UNIT_LOG: AtomicBool = AtomicBool::new(false);

/// Set memory log enabled
pub fn set_mem_log(enabled: bool) {
  ENABLE_MEM_LOG.store(enabled, Ordering::Relaxed);
}

/// Check if memory log is enabled, default is false
pub fn is_mem_log_enabled() -> bool {
  ENABLE_MEM_LOG.load(Ordering::Relaxed)
}

/// Set matrix unit log enabled
pub fn set_unit_log(enabled: bool) {
  ENABLE_UNIT_LOG.store(enabled, Ordering::Relaxed);
}

/// Check if matrix unit log is enabled, default is false
pub fn is_unit_log_enabled() -> bool {
  ENABLE_UNIT_LOG.load(Ordering::Relaxed)
}
