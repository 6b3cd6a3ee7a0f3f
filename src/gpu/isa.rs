/// Custom instruction encodings for the matrix accelerator
use serde::{Deserialize, Serialize};

/// R-type opcode of the MATMUL issue instruction
pub const MATMUL_OPCODE: u32 = 0x0b;
/// R-type opcode of the STATUS probe instruction
pub const STATUS_OPCODE: u32 = 0x2b;

pub const MATMUL_FUNCT3: u32 = 0x0;
pub const STATUS_FUNCT3: u32 = 0x1;

/// Number of accelerator units
pub const NUM_GPU_UNITS: usize = 8;
/// The primitive operates on 4x4 tiles
pub const MATRIX_DIM: usize = 4;
pub const TILE_ELEMS: usize = MATRIX_DIM * MATRIX_DIM;

/// Architectural state word of one accelerator unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitState {
  Idle = 0,
  Busy = 1,
  Done = 2,
  Error = 3,
}

impl UnitState {
  pub fn from_bits(bits: u32) -> Self {
    match bits {
      0 => UnitState::Idle,
      1 => UnitState::Busy,
      2 => UnitState::Done,
      _ => UnitState::Error,
    }
  }

  pub fn bits(self) -> u32 {
    self as u32
  }
}

/// A decoded custom instruction as the CPU hands it to the accelerator:
/// the raw instruction word plus the source/destination register values
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct GpuCommand {
  pub inst: u32,
  /// rs1 value: A base for MATMUL, unit index for STATUS
  pub xs1: u32,
  /// rs2 value: B base for MATMUL
  pub xs2: u32,
  /// rd value: C base for MATMUL
  pub xd: u32,
}

impl GpuCommand {
  pub fn new(inst: u32, xs1: u32, xs2: u32, xd: u32) -> Self {
    Self { inst, xs1, xs2, xd }
  }
}

/// Assemble an R-type instruction word
pub fn encode_r_type(opcode: u32, rd: u32, funct3: u32, rs1: u32, rs2: u32, funct7: u32) -> u32 {
  (funct7 & 0x7f) << 25
    | (rs2 & 0x1f) << 20
    | (rs1 & 0x1f) << 15
    | (funct3 & 0x7) << 12
    | (rd & 0x1f) << 7
    | (opcode & 0x7f)
}

/// MATMUL issue word. The unit index rides in funct7 so the accelerator can
/// route without an ambient unit register; register slots follow the
/// t2/t0/t1 convention of the firmware sequence.
pub fn encode_matmul(unit: u32) -> u32 {
  encode_r_type(MATMUL_OPCODE, 7, MATMUL_FUNCT3, 5, 6, unit)
}

/// STATUS probe word (t4/t3 register slots, unit index travels in rs1's value)
pub fn encode_status() -> u32 {
  encode_r_type(STATUS_OPCODE, 29, STATUS_FUNCT3, 28, 0, 0)
}

/// Operations the accelerator decodes out of an instruction word
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpuOp {
  Matmul { unit: usize },
  Status,
}

pub fn decode(inst: u32) -> Option<GpuOp> {
  let opcode = inst & 0x7f;
  let funct3 = (inst >> 12) & 0x7;
  let funct7 = (inst >> 25) & 0x7f;

  match (opcode, funct3) {
    (MATMUL_OPCODE, MATMUL_FUNCT3) => Some(GpuOp::Matmul { unit: funct7 as usize }),
    (STATUS_OPCODE, STATUS_FUNCT3) => Some(GpuOp::Status),
    _ => None,
  }
}
