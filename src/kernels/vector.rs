/// Element-wise vector helpers used around the matrix kernels
pub fn vector_add_int8(a: &[i8], b: &[i8], out: &mut [i8]) -> Result<(), String> {
  check_lens(a.len(), b.len(), out.len())?;
  for i in 0..out.len() {
    out[i] = a[i].wrapping_add(b[i]);
  }
  Ok(())
}

pub fn vector_add_int16(a: &[i16], b: &[i16], out: &mut [i16]) -> Result<(), String> {
  check_lens(a.len(), b.len(), out.len())?;
  for i in 0..out.len() {
    out[i] = a[i].wrapping_add(b[i]);
  }
  Ok(())
}

pub fn vector_scale_int8(a: &[i8], scale: i8, out: &mut [i8]) -> Result<(), String> {
  if a.len() < out.len() {
    return Err(format!("vector size {} < output size {}", a.len(), out.len()));
  }
  for i in 0..out.len() {
    out[i] = a[i].wrapping_mul(scale);
  }
  Ok(())
}

/// ReLU: negatives clamp to zero
pub fn vector_relu_int8(a: &[i8], out: &mut [i8]) -> Result<(), String> {
  if a.len() < out.len() {
    return Err(format!("vector size {} < output size {}", a.len(), out.len()));
  }
  for i in 0..out.len() {
    out[i] = a[i].max(0);
  }
  Ok(())
}

fn check_lens(a: usize, b: usize, out: usize) -> Result<(), String> {
  if a < out || b < out {
    return Err(format!("vector sizes {} x {} < output size {}", a, b, out));
  }
  Ok(())
}
