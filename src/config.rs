use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;

/// 仿真器配置, 对应 config/default.toml
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
  #[serde(default)]
  pub simulation: SimulationSection,
  #[serde(default)]
  pub gpu: GpuSection,
  #[serde(default)]
  pub trace: TraceSection,
}

impl Default for AppConfig {
  fn default() -> Self {
    AppConfig {
      simulation: SimulationSection::default(),
      gpu: GpuSection::default(),
      trace: TraceSection::default(),
    }
  }
}

/// 仿真环境配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimulationSection {
  /// 主存容量 (字节)
  #[serde(default = "default_memory_bytes")]
  pub memory_bytes: usize,
  /// 主存访问延迟 (周期)
  #[serde(default = "default_mem_latency")]
  pub mem_latency: u32,
  /// 复位保持周期数
  #[serde(default = "default_reset_cycles")]
  pub reset_cycles: u32,
  /// 静默模式, 关闭 [Log] 输出
  #[serde(default)]
  pub quiet: bool,
  /// 单步调试模式
  #[serde(default)]
  pub step_mode: bool,
}

impl Default for SimulationSection {
  fn default() -> Self {
    SimulationSection {
      memory_bytes: default_memory_bytes(),
      mem_latency: default_mem_latency(),
      reset_cycles: default_reset_cycles(),
      quiet: false,
      step_mode: false,
    }
  }
}

/// 矩阵协处理器配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GpuSection {
  /// 矩阵单元数量
  #[serde(default = "default_num_units")]
  pub num_units: usize,
  /// 单元计算延迟 (周期)
  #[serde(default = "default_compute_latency")]
  pub compute_latency: u32,
  /// 等待单元空闲时的最大轮询次数, 0 表示不限制
  #[serde(default = "default_poll_budget")]
  pub poll_budget: u32,
}

impl Default for GpuSection {
  fn default() -> Self {
    GpuSection {
      num_units: default_num_units(),
      compute_latency: default_compute_latency(),
      poll_budget: default_poll_budget(),
    }
  }
}

/// 波形跟踪配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TraceSection {
  /// 跟踪输出文件, 空字符串表示关闭
  #[serde(default)]
  pub file: String,
}

impl Default for TraceSection {
  fn default() -> Self {
    TraceSection {
      file: String::new(),
    }
  }
}

fn default_memory_bytes() -> usize {
  1024 * 1024
}

fn default_mem_latency() -> u32 {
  2
}

fn default_reset_cycles() -> u32 {
  5
}

fn default_num_units() -> usize {
  8
}

fn default_compute_latency() -> u32 {
  16
}

fn default_poll_budget() -> u32 {
  1_000_000
}

/// 加载默认配置文件 config/default.toml
pub fn load_default_config() -> io::Result<AppConfig> {
  let manifest_dir = env!("CARGO_MANIFEST_DIR");
  let default_path = Path::new(manifest_dir).join("config").join("default.toml");
  load_config_file(&default_path)
}

/// 从指定路径加载 TOML 配置文件
pub fn load_config_file(path: &Path) -> io::Result<AppConfig> {
  let content = fs::read_to_string(path)
    .map_err(|e| io::Error::new(e.kind(), format!("无法读取配置文件 {:?}: {}", path, e)))?;
  let config: AppConfig = toml::from_str(&content)
    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, format!("解析TOML配置失败: {}", e)))?;
  Ok(config)
}

/// 合并配置: overlay 中与默认值不同的字段覆盖 base
pub fn merge_config(base: &mut AppConfig, overlay: &AppConfig) {
  let defaults = AppConfig::default();

  if overlay.simulation.memory_bytes != defaults.simulation.memory_bytes {
    base.simulation.memory_bytes = overlay.simulation.memory_bytes;
  }
  if overlay.simulation.mem_latency != defaults.simulation.mem_latency {
    base.simulation.mem_latency = overlay.simulation.mem_latency;
  }
  if overlay.simulation.reset_cycles != defaults.simulation.reset_cycles {
    base.simulation.reset_cycles = overlay.simulation.reset_cycles;
  }
  if overlay.simulation.quiet {
    base.simulation.quiet = true;
  }
  if overlay.simulation.step_mode {
    base.simulation.step_mode = true;
  }

  if overlay.gpu.num_units != defaults.gpu.num_units {
    base.gpu.num_units = overlay.gpu.num_units;
  }
  if overlay.gpu.compute_latency != defaults.gpu.compute_latency {
    base.gpu.compute_latency = overlay.gpu.compute_latency;
  }
  if overlay.gpu.poll_budget != defaults.gpu.poll_budget {
    base.gpu.poll_budget = overlay.gpu.poll_budget;
  }

  if !overlay.trace.file.is_empty() {
    base.trace.file = overlay.trace.file.clone();
  }
}

/// 应用命令行参数覆盖
pub fn apply_cli_overrides(
  config: &mut AppConfig,
  quiet: bool,
  step_mode: bool,
  trace_file: &Option<String>,
  num_units: Option<usize>,
  mem_latency: Option<u32>,
) {
  if quiet {
    config.simulation.quiet = true;
  }
  if step_mode {
    config.simulation.step_mode = true;
  }
  if let Some(file) = trace_file {
    config.trace.file = file.clone();
  }
  if let Some(n) = num_units {
    config.gpu.num_units = n;
  }
  if let Some(latency) = mem_latency {
    config.simulation.mem_latency = latency;
  }
}

/// 校验配置合法性
pub fn validate_config(config: &AppConfig) -> io::Result<()> {
  if config.simulation.memory_bytes < 64 * 1024 {
    return Err(io::Error::new(
      io::ErrorKind::InvalidData,
      format!(
        "主存容量过小: {} 字节, 至少需要 {} 字节",
        config.simulation.memory_bytes,
        64 * 1024
      ),
    ));
  }
  // MATMUL 在 funct7 域携带单元号, 只有 7 位
  if config.gpu.num_units == 0 || config.gpu.num_units > 127 {
    return Err(io::Error::new(
      io::ErrorKind::InvalidData,
      format!("矩阵单元数量必须在 1..=127 之间: {}", config.gpu.num_units),
    ));
  }
  if config.simulation.mem_latency == 0 {
    return Err(io::Error::new(
      io::ErrorKind::InvalidData,
      "主存延迟必须大于 0".to_string(),
    ));
  }
  if config.gpu.compute_latency == 0 {
    return Err(io::Error::new(
      io::ErrorKind::InvalidData,
      "计算延迟必须大于 0".to_string(),
    ));
  }
  Ok(())
}

/// 加载并合并全部配置源
/// 优先级: 命令行参数 > 用户配置文件 > 默认配置文件 > 内建默认值
pub fn load_and_merge_configs(
  custom_config_path: Option<&str>,
  quiet: bool,
  step_mode: bool,
  trace_file: &Option<String>,
  num_units: Option<usize>,
  mem_latency: Option<u32>,
) -> io::Result<AppConfig> {
  // 1. 默认配置文件, 缺失时退回内建默认值
  let mut config = match load_default_config() {
    Ok(c) => c,
    Err(e) if e.kind() == io::ErrorKind::NotFound => AppConfig::default(),
    Err(e) => return Err(e),
  };

  // 2. 用户配置文件
  if let Some(path) = custom_config_path {
    let user_config = load_config_file(Path::new(path))?;
    merge_config(&mut config, &user_config);
  }

  // 3. 命令行覆盖
  apply_cli_overrides(&mut config, quiet, step_mode, trace_file, num_units, mem_latency);

  // 4. 校验
  validate_config(&config)?;

  Ok(config)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn default_config_is_valid() {
    let config = AppConfig::default();
    assert_eq!(config.simulation.memory_bytes, 1024 * 1024);
    assert_eq!(config.simulation.mem_latency, 2);
    assert_eq!(config.gpu.num_units, 8);
    assert_eq!(config.gpu.compute_latency, 16);
    assert!(validate_config(&config).is_ok());
  }

  #[test]
  fn partial_toml_fills_in_defaults() {
    let config: AppConfig = toml::from_str("[gpu]\nnum_units = 4\n").unwrap();
    assert_eq!(config.gpu.num_units, 4);
    assert_eq!(config.gpu.compute_latency, 16);
    assert_eq!(config.simulation.memory_bytes, 1024 * 1024);
    assert!(config.trace.file.is_empty());
  }

  #[test]
  fn merge_prefers_non_default_overlay_fields() {
    let mut base = AppConfig::default();
    base.simulation.mem_latency = 4;

    let mut overlay = AppConfig::default();
    overlay.gpu.num_units = 2;
    overlay.trace.file = "trace.jsonl".to_string();

    merge_config(&mut base, &overlay);
    assert_eq!(base.gpu.num_units, 2);
    assert_eq!(base.trace.file, "trace.jsonl");
    // overlay 保持默认的字段不覆盖 base
    assert_eq!(base.simulation.mem_latency, 4);
  }

  #[test]
  fn cli_overrides_win() {
    let mut config = AppConfig::default();
    apply_cli_overrides(
      &mut config,
      true,
      false,
      &Some("out.jsonl".to_string()),
      Some(16),
      Some(3),
    );
    assert!(config.simulation.quiet);
    assert!(!config.simulation.step_mode);
    assert_eq!(config.trace.file, "out.jsonl");
    assert_eq!(config.gpu.num_units, 16);
    assert_eq!(config.simulation.mem_latency, 3);
  }

  #[test]
  fn validate_rejects_bad_unit_counts() {
    let mut config = AppConfig::default();
    config.gpu.num_units = 0;
    assert!(validate_config(&config).is_err());
    config.gpu.num_units = 128;
    assert!(validate_config(&config).is_err());
    config.gpu.num_units = 127;
    assert!(validate_config(&config).is_ok());
  }
}
