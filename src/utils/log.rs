/// Global logging configuration
use std::sync::atomic::{AtomicBool, Ordering};

static ENABLE_LOG: AtomicBool = AtomicBool::new(true);

/// Install the env_logger backend. Safe to call more than once; later calls
/// are no-ops.
pub fn init_log() {
  let _ = env_logger::Builder::from_default_env()
    .filter_level(log::LevelFilter::Info)
    .format_timestamp(None)
    .try_init();
}

/// Set logging enabled
pub fn set_log(enabled: bool) {
  ENABLE_LOG.store(enabled, Ordering::Relaxed);
}

/// Check if logging is enabled, default is true
pub fn is_log_enabled() -> bool {
  ENABLE_LOG.load(Ordering::Relaxed)
}

/// Print a log message with blue [Log] prefix
#[macro_export]
macro_rules! log_info {
  ($($arg:tt)*) => {
    if $crate::utils::log::is_log_enabled() {
      println!("\x1b[34m[Log]\x1b[0m {}", format!($($arg)*));
    }
  };
}

/// Print an error message with red [Err] prefix, ignoring the quiet switch
#[macro_export]
macro_rules! log_error {
  ($($arg:tt)*) => {
    eprintln!("\x1b[31m[Err]\x1b[0m {}", format!($($arg)*));
  };
}
