use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type shared by every routine in the crate.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistrationError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error(
        "Dimension mismatch in {context}: expected {expected}, found {found}."
    )]
    DimensionMismatch {
        context: &'static str,
        expected: usize,
        found: usize,
    },

    #[error(
        "Numerically degenerate result in {context}: {count} non-finite entries (first at index {first_index})."
    )]
    NumericDegenerate {
        context: &'static str,
        count: usize,
        first_index: usize,
    },
}

pub fn default_kernel_sigma() -> f64 {
    0.6
}

pub fn default_rbf_beta() -> f64 {
    2.0
}

pub fn default_e_step_parallel_threshold() -> usize {
    4096
}

/// Parameters of the normalized Gaussian smoothing kernel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GaussianKernelSpec {
    /// Side length of the square kernel.
    pub size: usize,
    #[serde(default = "default_kernel_sigma")]
    pub sigma: f64,
}

impl GaussianKernelSpec {
    pub fn new(size: usize) -> Self {
        Self {
            size,
            sigma: default_kernel_sigma(),
        }
    }
}

/// Width parameter of the Gaussian radial basis `exp(-0.5 (d / beta)^2)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RadialBasisSpec {
    #[serde(default = "default_rbf_beta")]
    pub beta: f64,
}

impl Default for RadialBasisSpec {
    fn default() -> Self {
        Self {
            beta: default_rbf_beta(),
        }
    }
}

/// Per-round parameters of a Gaussian-mixture E-step.
///
/// `sigma2` is the isotropic variance of every mixture component and `omega`
/// the weight of the uniform outlier component. A caller driving EM updates
/// both between rounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EStepParams {
    pub sigma2: f64,
    #[serde(default)]
    pub omega: f64,
    /// Minimum `M * N` before the kernel block is filled on the rayon pool.
    #[serde(default = "default_e_step_parallel_threshold")]
    pub parallel_threshold: usize,
}

impl EStepParams {
    pub fn new(sigma2: f64, omega: f64) -> Self {
        Self {
            sigma2,
            omega,
            parallel_threshold: default_e_step_parallel_threshold(),
        }
    }

    pub fn validate(&self) -> Result<(), RegistrationError> {
        if !self.sigma2.is_finite() || self.sigma2 <= 0.0 {
            return Err(RegistrationError::InvalidArgument(format!(
                "sigma2 must be finite and positive, got {}",
                self.sigma2
            )));
        }
        if !(self.omega.is_finite() && (0.0..1.0).contains(&self.omega)) {
            return Err(RegistrationError::InvalidArgument(format!(
                "omega must lie in [0, 1), got {}",
                self.omega
            )));
        }
        Ok(())
    }
}
