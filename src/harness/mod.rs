pub mod memory;
pub mod shell;
pub mod testbench;
pub mod trace;

pub use memory::MainMemory;
pub use testbench::Testbench;
