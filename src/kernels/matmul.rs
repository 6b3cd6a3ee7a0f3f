/// INT8 matrix multiply kernels: 4x4 primitive and the tiled large-matrix path
use crate::gpu::isa::{MATRIX_DIM, TILE_ELEMS};
use crate::gpu::sched::UnitScheduler;

/// Golden 4x4 multiply. INT8 operands widen to INT16 and accumulate with
/// wrap-around; the accelerated path is bitwise identical for all inputs.
pub fn matmul_4x4_scalar(a: &[i8; TILE_ELEMS], b: &[i8; TILE_ELEMS]) -> [i16; TILE_ELEMS] {
  let mut c = [0i16; TILE_ELEMS];
  for i in 0..MATRIX_DIM {
    for j in 0..MATRIX_DIM {
      let mut sum: i16 = 0;
      for k in 0..MATRIX_DIM {
        let prod = (a[i * MATRIX_DIM + k] as i16) * (b[k * MATRIX_DIM + j] as i16);
        sum = sum.wrapping_add(prod);
      }
      c[i * MATRIX_DIM + j] = sum;
    }
  }
  c
}

/// Scalar GEMM golden model, same arithmetic contract as the tiled path
pub fn gemm_scalar(
  a: &[i8],
  b: &[i8],
  c: &mut [i16],
  rows: usize,
  cols: usize,
  inner: usize,
) -> Result<(), String> {
  check_gemm_sizes(a, b, c, rows, cols, inner)?;

  for i in 0..rows {
    for j in 0..cols {
      let mut sum: i16 = 0;
      for k in 0..inner {
        let prod = (a[i * inner + k] as i16) * (b[k * cols + j] as i16);
        sum = sum.wrapping_add(prod);
      }
      c[i * cols + j] = sum;
    }
  }
  Ok(())
}

/// Tiled GEMM over the accelerator. Operands are carved into 4x4 tiles with
/// zero padding on ragged edges; partial products accumulate per k-tile into
/// the in-bounds positions of C. Every tile issue advances the round-robin
/// cursor.
pub fn gemm_tiled(
  sched: &mut UnitScheduler,
  a: &[i8],
  b: &[i8],
  c: &mut [i16],
  rows: usize,
  cols: usize,
  inner: usize,
) -> Result<(), String> {
  check_gemm_sizes(a, b, c, rows, cols, inner)?;

  for ti in (0..rows).step_by(MATRIX_DIM) {
    for tj in (0..cols).step_by(MATRIX_DIM) {
      // zero the in-bounds portion of this output tile
      for i in 0..MATRIX_DIM {
        for j in 0..MATRIX_DIM {
          let (row, col) = (ti + i, tj + j);
          if row < rows && col < cols {
            c[row * cols + col] = 0;
          }
        }
      }

      for tk in (0..inner).step_by(MATRIX_DIM) {
        let mut tile_a = [0i8; TILE_ELEMS];
        let mut tile_b = [0i8; TILE_ELEMS];

        for i in 0..MATRIX_DIM {
          for k in 0..MATRIX_DIM {
            let (row, col) = (ti + i, tk + k);
            if row < rows && col < inner {
              tile_a[i * MATRIX_DIM + k] = a[row * inner + col];
            }
          }
        }

        for k in 0..MATRIX_DIM {
          for j in 0..MATRIX_DIM {
            let (row, col) = (tk + k, tj + j);
            if row < inner && col < cols {
              tile_b[k * MATRIX_DIM + j] = b[row * cols + col];
            }
          }
        }

        let unit = sched.pick_next();
        let mut tile_c = [0i16; TILE_ELEMS];
        sched.matmul_4x4(unit, &tile_a, &tile_b, &mut tile_c)?;

        for i in 0..MATRIX_DIM {
          for j in 0..MATRIX_DIM {
            let (row, col) = (ti + i, tj + j);
            if row < rows && col < cols {
              let idx = row * cols + col;
              c[idx] = c[idx].wrapping_add(tile_c[i * MATRIX_DIM + j]);
            }
          }
        }
      }
    }
  }
  Ok(())
}

fn check_gemm_sizes(
  a: &[i8],
  b: &[i8],
  c: &[i16],
  rows: usize,
  cols: usize,
  inner: usize,
) -> Result<(), String> {
  if rows == 0 || cols == 0 || inner == 0 {
    return Err(format!("matrix dimensions must be positive, got {}x{}x{}", rows, cols, inner));
  }
  if a.len() < rows * inner {
    return Err(format!("Matrix A size {} < rows*inner={}", a.len(), rows * inner));
  }
  if b.len() < inner * cols {
    return Err(format!("Matrix B size {} < inner*cols={}", b.len(), inner * cols));
  }
  if c.len() < rows * cols {
    return Err(format!("Matrix C size {} < rows*cols={}", c.len(), rows * cols));
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::gpu::dispatch::SoftwareBackend;

  fn identity(n: usize) -> Vec<i8> {
    let mut m = vec![0i8; n * n];
    for i in 0..n {
      m[i * n + i] = 1;
    }
    m
  }

  /// A = [1..16], B = I: C must equal A element for element
  #[test]
  fn scalar_4x4_times_identity() {
    let mut a = [0i8; TILE_ELEMS];
    for (i, v) in a.iter_mut().enumerate() {
      *v = i as i8 + 1;
    }
    let mut b = [0i8; TILE_ELEMS];
    for i in 0..4 {
      b[i * 4 + i] = 1;
    }

    let c = matmul_4x4_scalar(&a, &b);
    for i in 0..TILE_ELEMS {
      assert_eq!(c[i], (i as i16) + 1, "mismatch at element {}", i);
    }
  }

  /// All-127 operands: each dot product is 4*127*127 = 64516, which wraps
  /// to -1020 in INT16. The unsigned reading of every element is 64516.
  #[test]
  fn scalar_4x4_wraparound() {
    let a = [127i8; TILE_ELEMS];
    let b = [127i8; TILE_ELEMS];
    let c = matmul_4x4_scalar(&a, &b);
    for &v in c.iter() {
      assert_eq!(v, -1020);
      assert_eq!(v as u16, 64516);
    }
  }

  #[test]
  fn scalar_4x4_known_values() {
    // row 0 of A dotted with column 0 of B: 1*1 + 2*3 + (-3)*5 + 4*7 = 20
    let a: [i8; TILE_ELEMS] = [1, 2, -3, 4, 0, 1, 0, -1, 5, 5, 5, 5, -2, 0, 2, 0];
    let b: [i8; TILE_ELEMS] = [1, 2, 0, 0, 3, 4, 0, 1, 5, 6, 1, 0, 7, 8, 0, -1];
    let c = matmul_4x4_scalar(&a, &b);
    assert_eq!(c[0], 20);
    // 1*2 + 2*4 + (-3)*6 + 4*8 = 24
    assert_eq!(c[1], 24);
    // row 2 is all fives: 5*(1+3+5+7) = 80, 5*(2+4+6+8) = 100
    assert_eq!(c[8], 80);
    assert_eq!(c[9], 100);
  }

  /// Ragged 5x5: A[i][j] = i+j against the identity comes back unchanged
  #[test]
  fn tiled_5x5_identity() {
    let n = 5;
    let mut a = vec![0i8; n * n];
    for i in 0..n {
      for j in 0..n {
        a[i * n + j] = (i + j) as i8;
      }
    }
    let b = identity(n);
    let mut c = vec![0i16; n * n];

    let mut backend = SoftwareBackend::default();
    let mut sched = UnitScheduler::new(&mut backend);
    gemm_tiled(&mut sched, &a, &b, &mut c, n, n, n).unwrap();

    for i in 0..n * n {
      assert_eq!(c[i], a[i] as i16, "mismatch at element {}", i);
    }
  }

  /// Identity on the left: I * B must come back as B, including the ragged
  /// partial tiles of a 6x4 operand
  #[test]
  fn tiled_identity_on_the_left() {
    let (rows, cols) = (6, 4);
    let a = identity(rows);
    let mut b = vec![0i8; rows * cols];
    for (i, v) in b.iter_mut().enumerate() {
      *v = ((i * 19 + 2) % 256) as u8 as i8;
    }
    let mut c = vec![0i16; rows * cols];

    let mut backend = SoftwareBackend::default();
    let mut sched = UnitScheduler::new(&mut backend);
    gemm_tiled(&mut sched, &a, &b, &mut c, rows, cols, rows).unwrap();

    for i in 0..rows * cols {
      assert_eq!(c[i], b[i] as i16, "mismatch at element {}", i);
    }
  }

  #[test]
  fn tiled_matches_scalar_rectangular() {
    let (rows, cols, inner) = (6, 7, 5);
    let mut a = vec![0i8; rows * inner];
    let mut b = vec![0i8; inner * cols];
    for (i, v) in a.iter_mut().enumerate() {
      *v = ((i * 7) % 256) as u8 as i8;
    }
    for (i, v) in b.iter_mut().enumerate() {
      *v = ((i * 13 + 3) % 256) as u8 as i8;
    }

    let mut want = vec![0i16; rows * cols];
    gemm_scalar(&a, &b, &mut want, rows, cols, inner).unwrap();

    let mut backend = SoftwareBackend::default();
    let mut sched = UnitScheduler::new(&mut backend);
    let mut got = vec![0i16; rows * cols];
    gemm_tiled(&mut sched, &a, &b, &mut got, rows, cols, inner).unwrap();

    assert_eq!(got, want);
  }

  /// 32x32 with the benchmark patterns; accumulation wraps, results still
  /// agree bitwise between the tiled and scalar paths
  #[test]
  fn tiled_matches_scalar_32x32() {
    let n = 32;
    let mut a = vec![0i8; n * n];
    let mut b = vec![0i8; n * n];
    for i in 0..n * n {
      a[i] = ((i % 256) as i32 - 128) as i8;
      b[i] = (((i * 7) % 256) as i32 - 128) as i8;
    }

    let mut want = vec![0i16; n * n];
    gemm_scalar(&a, &b, &mut want, n, n, n).unwrap();

    let mut backend = SoftwareBackend::default();
    let mut sched = UnitScheduler::new(&mut backend);
    let mut got = vec![0i16; n * n];
    gemm_tiled(&mut sched, &a, &b, &mut got, n, n, n).unwrap();

    assert_eq!(got, want);
    // 8x8x8 tiles issued
    assert_eq!(sched.issued(), 512);
  }

  #[test]
  fn gemm_rejects_short_buffers() {
    let a = vec![0i8; 10];
    let b = vec![0i8; 25];
    let mut c = vec![0i16; 25];
    let err = gemm_scalar(&a, &b, &mut c, 5, 5, 5).unwrap_err();
    assert!(err.contains("Matrix A size"), "unexpected error: {}", err);

    let err = gemm_scalar(&[], &[], &mut [], 0, 4, 4).unwrap_err();
    assert!(err.contains("positive"), "unexpected error: {}", err);
  }
}
