/// INT8 compute kernels built on the accelerator dispatch surface
pub mod conv2d;
pub mod matmul;
pub mod vector;

pub use conv2d::{ConvGeometry, Im2colScratch};
