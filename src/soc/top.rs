/// GpuTop - GPU子系统顶层：N个矩阵单元 + 指令译码 + 访存仲裁
use crate::builtin::{Module, Wire};
use crate::gpu::isa::{self, GpuCommand, GpuOp, UnitState};
use crate::soc::unit::MatrixUnit;
use crate::soc::{MemRequest, MemResponse};

pub struct GpuTop {
  name: String,

  // 矩阵计算单元
  pub units: Vec<MatrixUnit>,

  // 输入：CPU侧注入的自定义指令
  pub cmd_in: Wire<GpuCommand>,

  // 输出：STATUS探测的状态字
  pub status_out: Wire<u32>,

  // 共享访存端口（一次一笔在途请求）
  pub mem_req: Wire<MemRequest>,
  pub mem_resp: Wire<MemResponse>,

  // 当前持有访存端口的单元
  grant: Option<usize>,
}

impl GpuTop {
  pub fn new(name: impl Into<String>, num_units: usize, compute_latency: u32) -> Self {
    let units = (0..num_units)
      .map(|i| MatrixUnit::new(format!("matrix_unit{}", i), compute_latency))
      .collect();
    Self {
      name: name.into(),
      units,
      cmd_in: Wire::default(),
      status_out: Wire::default(),
      mem_req: Wire::default(),
      mem_resp: Wire::default(),
      grant: None,
    }
  }

  /// 发送指令（CPU侧把译码后的指令束写到输入线上）
  pub fn send_command(&mut self, cmd: GpuCommand) {
    self.cmd_in.set(cmd);
  }

  /// 取走STATUS响应（如果有）
  pub fn take_status(&mut self) -> Option<u32> {
    self.status_out.take()
  }

  pub fn num_units(&self) -> usize {
    self.units.len()
  }

  /// 各单元状态字（用于波形跟踪）
  pub fn unit_states(&self) -> Vec<u8> {
    self.units.iter().map(|u| u.state_bits()).collect()
  }
}

impl Module for GpuTop {
  fn run(&mut self) {
    // 从后向前运行：先把上一周期的响应送回单元，再推进单元，
    // 再译码本周期的指令，最后仲裁下一笔访存请求

    // 1. 访存响应路由给持有端口的单元
    if let Some(resp) = self.mem_resp.take() {
      if let Some(g) = self.grant.take() {
        self.units[g].mem_resp.set(resp);
      }
    }

    // 2. 推进所有单元
    for unit in self.units.iter_mut() {
      unit.run();
    }

    // 3. 指令译码
    if let Some(cmd) = self.cmd_in.take() {
      match isa::decode(cmd.inst) {
        Some(GpuOp::Matmul { unit }) => {
          if unit < self.units.len() {
            self.units[unit].start_matmul(cmd.xs1, cmd.xs2, cmd.xd);
          } else {
            log::warn!("{}: MATMUL for out-of-range unit {}", self.name, unit);
          }
        }
        Some(GpuOp::Status) => {
          let unit = cmd.xs1 as usize;
          let state = if unit < self.units.len() {
            self.units[unit].status()
          } else {
            UnitState::Error
          };
          self.status_out.set(state.bits());
        }
        None => {
          log::warn!("{}: undecodable instruction {:#010x}", self.name, cmd.inst);
        }
      }
    }

    // 4. 固定优先级仲裁：端口空闲时转发编号最小的待发请求
    if self.grant.is_none() {
      for (i, unit) in self.units.iter_mut().enumerate() {
        if let Some(req) = unit.mem_req.take() {
          self.mem_req.set(req);
          self.grant = Some(i);
          break;
        }
      }
    }
  }

  fn reset(&mut self) {
    for unit in self.units.iter_mut() {
      unit.reset();
    }
    self.cmd_in = Wire::default();
    self.status_out = Wire::default();
    self.mem_req = Wire::default();
    self.mem_resp = Wire::default();
    self.grant = None;
  }

  fn name(&self) -> &str {
    &self.name
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::gpu::isa::TILE_ELEMS;
  use crate::harness::memory::MainMemory;
  use crate::kernels::matmul::matmul_4x4_scalar;

  /// One full MATMUL through the top level with a real memory model behind it
  #[test]
  fn matmul_through_the_top() {
    let mut top = GpuTop::new("gpu_top", 2, 8);
    let mut mem = MainMemory::new("mem", 0x1000, 2);

    let mut a = [0i8; TILE_ELEMS];
    let mut b = [0i8; TILE_ELEMS];
    for i in 0..TILE_ELEMS {
      a[i] = (i as i8) - 7;
      b[i] = 3 - (i as i8 % 5);
    }
    mem.write_bytes(0x100, &a.map(|v| v as u8));
    mem.write_bytes(0x140, &b.map(|v| v as u8));

    top.send_command(GpuCommand::new(isa::encode_matmul(1), 0x100, 0x140, 0x180));

    // run until unit 1 reports done, probing every 8 cycles
    let mut done = false;
    for _ in 0..40 {
      for _ in 0..8 {
        top.run();
        mem.service(&mut top.mem_req, &mut top.mem_resp);
      }
      top.send_command(GpuCommand::new(isa::encode_status(), 1, 0, 0));
      top.run();
      mem.service(&mut top.mem_req, &mut top.mem_resp);
      match top.take_status().map(UnitState::from_bits) {
        Some(UnitState::Done) | Some(UnitState::Idle) => {
          done = true;
          break;
        }
        Some(UnitState::Error) => panic!("unit errored"),
        _ => {}
      }
    }
    assert!(done, "matmul never completed");

    let want = matmul_4x4_scalar(&a, &b);
    let bytes = mem.read_bytes(0x180, 32);
    for i in 0..TILE_ELEMS {
      let got = i16::from_le_bytes([bytes[2 * i], bytes[2 * i + 1]]);
      assert_eq!(got, want[i], "mismatch at element {}", i);
    }
  }

  #[test]
  fn status_for_invalid_unit_is_error() {
    let mut top = GpuTop::new("gpu_top", 2, 4);
    top.send_command(GpuCommand::new(isa::encode_status(), 7, 0, 0));
    top.run();
    assert_eq!(top.take_status().map(UnitState::from_bits), Some(UnitState::Error));
  }
}
