/// Cycle model of the GPU subsystem (the co-simulation DUT)
pub mod top;
pub mod unit;

pub use top::GpuTop;
pub use unit::MatrixUnit;

/// 512-bit memory bus: one burst is 16 little-endian 32-bit lanes
pub const BURST_LANES: usize = 16;
pub const BURST_BYTES: usize = BURST_LANES * 4;

/// 访存请求（一次一笔，64字节突发）
#[derive(Clone, Default)]
pub struct MemRequest {
  pub addr: u32,
  pub wdata: [u32; BURST_LANES],
  pub write: bool,
}

/// 访存响应（ack脉冲，读数据有效一拍）
#[derive(Clone, Default)]
pub struct MemResponse {
  pub rdata: [u32; BURST_LANES],
}
