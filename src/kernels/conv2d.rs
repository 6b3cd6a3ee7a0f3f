/// 2D convolution kernels: direct, GEMM-based (im2col), 3x3-specialized,
/// depthwise
use crate::gpu::isa::TILE_ELEMS;
use crate::gpu::sched::UnitScheduler;
use crate::kernels::matmul::gemm_tiled;

/// Capacity of the default im2col scratch, in bytes
pub const IM2COL_SCRATCH_BYTES: usize = 32768;

/// Shape of one convolution call. Output dimensions derive from it; a
/// geometry whose output would be empty is rejected before any write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvGeometry {
  pub input_h: usize,
  pub input_w: usize,
  pub channels: usize,
  pub num_filters: usize,
  pub kernel_h: usize,
  pub kernel_w: usize,
  pub stride_h: usize,
  pub stride_w: usize,
  pub pad_h: usize,
  pub pad_w: usize,
}

impl ConvGeometry {
  /// `output = (input + 2*pad - kernel) / stride + 1`, rejecting shapes
  /// where the kernel does not fit the padded input
  pub fn output_dims(&self) -> Result<(usize, usize), String> {
    if self.input_h == 0
      || self.input_w == 0
      || self.channels == 0
      || self.num_filters == 0
      || self.kernel_h == 0
      || self.kernel_w == 0
    {
      return Err("convolution shape parameters must be positive".to_string());
    }
    if self.stride_h == 0 || self.stride_w == 0 {
      return Err("convolution stride must be positive".to_string());
    }

    let padded_h = self.input_h + 2 * self.pad_h;
    let padded_w = self.input_w + 2 * self.pad_w;
    let span_h = padded_h.checked_sub(self.kernel_h).ok_or_else(|| {
      format!(
        "kernel {}x{} does not fit padded input {}x{}",
        self.kernel_h, self.kernel_w, padded_h, padded_w
      )
    })?;
    let span_w = padded_w.checked_sub(self.kernel_w).ok_or_else(|| {
      format!(
        "kernel {}x{} does not fit padded input {}x{}",
        self.kernel_h, self.kernel_w, padded_h, padded_w
      )
    })?;

    Ok((span_h / self.stride_h + 1, span_w / self.stride_w + 1))
  }

  /// Rows of the im2col column matrix (one per kernel tap per channel)
  pub fn col_rows(&self) -> usize {
    self.channels * self.kernel_h * self.kernel_w
  }
}

/// Unfold the input into a dense column matrix in [c][kh][kw][oh][ow] order,
/// matching the [filter][c*kh*kw] kernel layout of the GEMM path. Positions
/// outside the input read as zero. Returns the (rows, cols) shape written.
pub fn im2col(input: &[i8], col: &mut [i8], g: &ConvGeometry) -> Result<(usize, usize), String> {
  let (out_h, out_w) = g.output_dims()?;
  let col_rows = g.col_rows();
  let col_cols = out_h * out_w;

  if input.len() < g.channels * g.input_h * g.input_w {
    return Err(format!(
      "input size {} < channels*h*w={}",
      input.len(),
      g.channels * g.input_h * g.input_w
    ));
  }
  if col.len() < col_rows * col_cols {
    return Err(format!("column buffer size {} < {}", col.len(), col_rows * col_cols));
  }

  let mut idx = 0;
  for c in 0..g.channels {
    for kh in 0..g.kernel_h {
      for kw in 0..g.kernel_w {
        for oh in 0..out_h {
          for ow in 0..out_w {
            let ih = (oh * g.stride_h + kh) as isize - g.pad_h as isize;
            let iw = (ow * g.stride_w + kw) as isize - g.pad_w as isize;

            col[idx] = if ih >= 0 && (ih as usize) < g.input_h && iw >= 0 && (iw as usize) < g.input_w {
              input[c * g.input_h * g.input_w + ih as usize * g.input_w + iw as usize]
            } else {
              0
            };
            idx += 1;
          }
        }
      }
    }
  }

  Ok((col_rows, col_cols))
}

/// Single-plane direct convolution, the golden model for one channel and one
/// filter. Taps outside the input contribute zero.
pub fn conv2d_direct(
  input: &[i8],
  kernel: &[i8],
  output: &mut [i16],
  g: &ConvGeometry,
) -> Result<(), String> {
  if g.channels != 1 || g.num_filters != 1 {
    return Err(format!(
      "direct path handles a single plane, got {} channels x {} filters",
      g.channels, g.num_filters
    ));
  }
  let (out_h, out_w) = g.output_dims()?;
  check_conv_sizes(input, kernel, output, g, out_h, out_w)?;

  for oh in 0..out_h {
    for ow in 0..out_w {
      let mut sum: i16 = 0;
      for kh in 0..g.kernel_h {
        for kw in 0..g.kernel_w {
          let ih = (oh * g.stride_h + kh) as isize - g.pad_h as isize;
          let iw = (ow * g.stride_w + kw) as isize - g.pad_w as isize;
          if ih >= 0 && (ih as usize) < g.input_h && iw >= 0 && (iw as usize) < g.input_w {
            let x = input[ih as usize * g.input_w + iw as usize] as i16;
            let w = kernel[kh * g.kernel_w + kw] as i16;
            sum = sum.wrapping_add(x * w);
          }
        }
      }
      output[oh * out_w + ow] = sum;
    }
  }
  Ok(())
}

/// Multi-channel multi-filter scalar convolution, the harness's golden model.
/// Kernel layout is [filter][channel][kh][kw]; per-channel partial sums
/// accumulate with wrap-around into one plane per filter.
pub fn conv2d_reference(
  input: &[i8],
  kernel: &[i8],
  output: &mut [i16],
  g: &ConvGeometry,
) -> Result<(), String> {
  let (out_h, out_w) = g.output_dims()?;
  check_conv_sizes(input, kernel, output, g, out_h, out_w)?;

  for f in 0..g.num_filters {
    for oh in 0..out_h {
      for ow in 0..out_w {
        let mut sum: i16 = 0;
        for c in 0..g.channels {
          for kh in 0..g.kernel_h {
            for kw in 0..g.kernel_w {
              let ih = (oh * g.stride_h + kh) as isize - g.pad_h as isize;
              let iw = (ow * g.stride_w + kw) as isize - g.pad_w as isize;
              if ih >= 0 && (ih as usize) < g.input_h && iw >= 0 && (iw as usize) < g.input_w {
                let x = input[c * g.input_h * g.input_w + ih as usize * g.input_w + iw as usize] as i16;
                let w = kernel[(f * g.channels + c) * g.kernel_h * g.kernel_w + kh * g.kernel_w + kw] as i16;
                sum = sum.wrapping_add(x * w);
              }
            }
          }
        }
        output[f * out_h * out_w + oh * out_w + ow] = sum;
      }
    }
  }
  Ok(())
}

/// Caller-owned scratch for the GEMM convolution path. The front-end refuses
/// shapes whose column matrix exceeds the capacity, leaving outputs untouched.
pub struct Im2colScratch {
  buf: Vec<i8>,
}

impl Im2colScratch {
  pub fn new() -> Self {
    Self::with_capacity(IM2COL_SCRATCH_BYTES)
  }

  pub fn with_capacity(bytes: usize) -> Self {
    Self { buf: vec![0; bytes] }
  }

  pub fn capacity(&self) -> usize {
    self.buf.len()
  }
}

impl Default for Im2colScratch {
  fn default() -> Self {
    Self::new()
  }
}

/// GEMM-based convolution: im2col into the scratch, then
/// kernel[F x C*kh*kw] times col[C*kh*kw x OH*OW] on the accelerator
pub fn conv2d_gemm(
  sched: &mut UnitScheduler,
  input: &[i8],
  kernel: &[i8],
  output: &mut [i16],
  g: &ConvGeometry,
  scratch: &mut Im2colScratch,
) -> Result<(), String> {
  let (out_h, out_w) = g.output_dims()?;
  let col_rows = g.col_rows();
  let col_cols = out_h * out_w;
  let col_size = col_rows * col_cols;

  if col_size > scratch.capacity() {
    log::error!(
      "im2col scratch too small: need {} bytes, have {}",
      col_size,
      scratch.capacity()
    );
    return Err(format!(
      "im2col scratch too small: need {} bytes, have {}",
      col_size,
      scratch.capacity()
    ));
  }
  check_conv_sizes(input, kernel, output, g, out_h, out_w)?;

  im2col(input, &mut scratch.buf[..col_size], g)?;

  gemm_tiled(
    sched,
    kernel,
    &scratch.buf[..col_size],
    output,
    g.num_filters,
    col_cols,
    col_rows,
  )
}

/// Specialized 3x3 stride-1 convolution. Each dispatch covers a 2x2 output
/// block: a 4x4 input patch (zero-padded past the input edges) multiplies a
/// 4x4 matrix holding the real 3x3 kernel in its top-left corner, and only
/// the top-left 2x2 of the product accumulates into the output. The other
/// lanes are computed and discarded; that is the cost of matching the
/// primitive's shape. Each kept lane folds one patch row against one kernel
/// column, so this path is not a substitute for the dense (kh, kw) sum that
/// the GEMM path produces. Output planes are zeroed on entry.
pub fn conv2d_3x3_optimized(
  sched: &mut UnitScheduler,
  input: &[i8],
  kernel: &[i8],
  output: &mut [i16],
  g: &ConvGeometry,
) -> Result<(), String> {
  if g.kernel_h != 3 || g.kernel_w != 3 || g.stride_h != 1 || g.stride_w != 1 || g.pad_h != 0 || g.pad_w != 0 {
    return Err("3x3 path requires a 3x3 kernel with stride 1 and no padding".to_string());
  }
  let (out_h, out_w) = g.output_dims()?;
  check_conv_sizes(input, kernel, output, g, out_h, out_w)?;

  for v in output[..g.num_filters * out_h * out_w].iter_mut() {
    *v = 0;
  }

  let num_units = sched.num_units();
  for f in 0..g.num_filters {
    let unit = f % num_units;
    for c in 0..g.channels {
      let mut kernel_matrix = [0i8; TILE_ELEMS];
      for i in 0..3 {
        for j in 0..3 {
          kernel_matrix[i * 4 + j] = kernel[(f * g.channels + c) * 9 + i * 3 + j];
        }
      }

      for oh in (0..out_h).step_by(2) {
        for ow in (0..out_w).step_by(2) {
          let mut input_patch = [0i8; TILE_ELEMS];
          for i in 0..4 {
            for j in 0..4 {
              let ih = oh + i;
              let iw = ow + j;
              if ih < g.input_h && iw < g.input_w {
                input_patch[i * 4 + j] = input[c * g.input_h * g.input_w + ih * g.input_w + iw];
              }
            }
          }

          let mut product = [0i16; TILE_ELEMS];
          sched.matmul_4x4(unit, &input_patch, &kernel_matrix, &mut product)?;

          for i in 0..2 {
            for j in 0..2 {
              if oh + i < out_h && ow + j < out_w {
                let idx = f * out_h * out_w + (oh + i) * out_w + (ow + j);
                output[idx] = output[idx].wrapping_add(product[i * 4 + j]);
              }
            }
          }
        }
      }
    }
  }
  Ok(())
}

/// Depthwise convolution: each channel convolves independently with its own
/// [kh][kw] kernel plane, no cross-channel reduction
pub fn depthwise_conv2d(
  input: &[i8],
  kernel: &[i8],
  output: &mut [i16],
  g: &ConvGeometry,
) -> Result<(), String> {
  if g.num_filters != g.channels {
    return Err(format!(
      "depthwise output channels must equal input channels, got {} filters for {} channels",
      g.num_filters, g.channels
    ));
  }
  let (out_h, out_w) = g.output_dims()?;
  if input.len() < g.channels * g.input_h * g.input_w {
    return Err(format!(
      "input size {} < channels*h*w={}",
      input.len(),
      g.channels * g.input_h * g.input_w
    ));
  }
  if kernel.len() < g.channels * g.kernel_h * g.kernel_w {
    return Err(format!(
      "kernel size {} < channels*kh*kw={}",
      kernel.len(),
      g.channels * g.kernel_h * g.kernel_w
    ));
  }
  if output.len() < g.channels * out_h * out_w {
    return Err(format!(
      "output size {} < channels*oh*ow={}",
      output.len(),
      g.channels * out_h * out_w
    ));
  }

  for c in 0..g.channels {
    for oh in 0..out_h {
      for ow in 0..out_w {
        let mut sum: i16 = 0;
        for kh in 0..g.kernel_h {
          for kw in 0..g.kernel_w {
            let ih = (oh * g.stride_h + kh) as isize - g.pad_h as isize;
            let iw = (ow * g.stride_w + kw) as isize - g.pad_w as isize;
            if ih >= 0 && (ih as usize) < g.input_h && iw >= 0 && (iw as usize) < g.input_w {
              let x = input[c * g.input_h * g.input_w + ih as usize * g.input_w + iw as usize] as i16;
              let w = kernel[c * g.kernel_h * g.kernel_w + kh * g.kernel_w + kw] as i16;
              sum = sum.wrapping_add(x * w);
            }
          }
        }
        output[c * out_h * out_w + oh * out_w + ow] = sum;
      }
    }
  }
  Ok(())
}

fn check_conv_sizes(
  input: &[i8],
  kernel: &[i8],
  output: &[i16],
  g: &ConvGeometry,
  out_h: usize,
  out_w: usize,
) -> Result<(), String> {
  if input.len() < g.channels * g.input_h * g.input_w {
    return Err(format!(
      "input size {} < channels*h*w={}",
      input.len(),
      g.channels * g.input_h * g.input_w
    ));
  }
  if kernel.len() < g.num_filters * g.col_rows() {
    return Err(format!(
      "kernel size {} < filters*channels*kh*kw={}",
      kernel.len(),
      g.num_filters * g.col_rows()
    ));
  }
  if output.len() < g.num_filters * out_h * out_w {
    return Err(format!(
      "output size {} < filters*oh*ow={}",
      output.len(),
      g.num_filters * out_h * out_w
    ));
  }
  Ok(())
}
