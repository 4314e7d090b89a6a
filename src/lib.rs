#![deny(dead_code)]
#![deny(unused_imports)]

pub mod distance;
pub mod em;
pub mod kernel;
mod linalg;
pub mod matching;
pub mod probability;
pub mod types;

pub use distance::{init_sigma2, pairwise_distance};
pub use em::{EStep, compute_e_step, compute_e_step_with_params, uniform_prior};
pub use kernel::{build_gaussian_kernel, build_radial_basis, gaussian_kernel, gaussian_radial_basis};
pub use matching::{Matches, match_candidates};
pub use types::{EStepParams, GaussianKernelSpec, RadialBasisSpec, RegistrationError};
