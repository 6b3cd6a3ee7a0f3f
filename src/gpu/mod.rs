/// Accelerator dispatch contract: instruction encodings, backends, scheduling
pub mod dispatch;
pub mod isa;
pub mod perf;
pub mod sched;

pub use dispatch::{MatmulBackend, SoftwareBackend};
pub use sched::UnitScheduler;
