use crate::distance::pairwise_distance;
use crate::linalg::utils::KahanSum;
use crate::probability::{gaussian_density, gaussian_rbf};
use crate::types::{GaussianKernelSpec, RadialBasisSpec, RegistrationError};
use ndarray::{Array2, ArrayView2};

/// Square Gaussian smoothing kernel normalized to unit mass.
///
/// Cell `[i, j]` samples the isotropic density at the pixel center
/// `(i + 0.5, j + 0.5)` relative to the kernel center `(size/2, size/2)`,
/// and the whole grid is then rescaled to sum to one. The result is
/// symmetric under a 180° rotation of its indices.
pub fn gaussian_kernel(size: usize, sigma: f64) -> Result<Array2<f64>, RegistrationError> {
    if size == 0 {
        return Err(RegistrationError::InvalidArgument(
            "gaussian_kernel: size must be positive".to_string(),
        ));
    }
    if !sigma.is_finite() || sigma <= 0.0 {
        return Err(RegistrationError::InvalidArgument(format!(
            "gaussian_kernel: sigma must be finite and positive, got {sigma}"
        )));
    }

    let center = 0.5 * size as f64;
    let mut kernel = Array2::<f64>::zeros((size, size));
    let mut total = KahanSum::default();
    for ((i, j), cell) in kernel.indexed_iter_mut() {
        let di = i as f64 + 0.5 - center;
        let dj = j as f64 + 0.5 - center;
        let w = gaussian_density((di * di + dj * dj).sqrt(), sigma);
        *cell = w;
        total.add(w);
    }

    let total = total.sum();
    if total <= 0.0 || !total.is_finite() {
        // Every cell underflowed; only reachable for even sizes with a tiny sigma.
        return Err(RegistrationError::NumericDegenerate {
            context: "gaussian_kernel",
            count: size * size,
            first_index: 0,
        });
    }
    kernel.mapv_inplace(|w| w / total);
    Ok(kernel)
}

pub fn build_gaussian_kernel(spec: &GaussianKernelSpec) -> Result<Array2<f64>, RegistrationError> {
    gaussian_kernel(spec.size, spec.sigma)
}

/// Gaussian radial basis Gram matrix of a point set:
/// `G[[i, j]] = exp(−0.5·(‖x_i − x_j‖ / β)²)`.
///
/// Symmetric with a unit diagonal. Entries of far-apart pairs may underflow
/// to zero.
pub fn gaussian_radial_basis(
    x: ArrayView2<'_, f64>,
    beta: f64,
) -> Result<Array2<f64>, RegistrationError> {
    if !beta.is_finite() || beta <= 0.0 {
        return Err(RegistrationError::InvalidArgument(format!(
            "gaussian_radial_basis: beta must be finite and positive, got {beta}"
        )));
    }
    let mut gram = pairwise_distance(x, x)?;
    gram.mapv_inplace(|d| gaussian_rbf(d, beta));
    Ok(gram)
}

pub fn build_radial_basis(
    x: ArrayView2<'_, f64>,
    spec: &RadialBasisSpec,
) -> Result<Array2<f64>, RegistrationError> {
    gaussian_radial_basis(x, spec.beta)
}
