//! Image kernels shared by the pipeline stages
//!
//! Everything here works on `ndarray` buffers in H×W×C (or H×W) layout with
//! `f32` samples. Intermediate sums are accumulated in `f64`.

pub mod filters;
pub mod histogram;
pub mod morphology;
pub mod poisson;
pub mod shapes;
pub mod warp;

pub use filters::{box_blur, gaussian_blur, reflect101};
pub use histogram::match_histogram;
pub use morphology::{dilate, erode};
pub use poisson::seamless_clone;
pub use warp::{remap_affine, remap_plane, resize, warp_affine, BorderMode};
