//! Cycle-level simulator for a small RISC-V SoC with a matrix coprocessor.
//!
//! The `soc` module models the hardware (matrix units, top-level arbiter),
//! `harness` drives it (main memory, clock, testbench, debugger shell),
//! `gpu` holds the instruction encoding and the dispatch layer, and
//! `kernels` carries the int8/int16 software kernels that run against
//! either the simulated hardware or a pure software backend.
//!
//! Accumulation contract: the 4x4 primitive's int16 accumulator wraps
//! mod 2^16 instead of saturating or widening, and every software path
//! wraps the same way, so hardware and golden results agree bit for bit
//! even when a dot product exceeds the int16 range.

pub mod builtin;
pub mod config;
pub mod gpu;
pub mod harness;
pub mod kernels;
pub mod soc;
pub mod utils;

pub use gpu::isa::{MATRIX_DIM, NUM_GPU_UNITS};
pub use harness::Testbench;
pub use utils::log_config;
