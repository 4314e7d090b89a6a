/// 1/sqrt(2π).
const INV_SQRT_2PI: f64 = 0.398_942_280_401_432_7;

/// Isotropic Gaussian weight of a point at distance `d` from the mean:
/// `1/(σ√(2π)) · exp(−d²/(2σ²))`.
#[inline]
pub fn gaussian_density(d: f64, sigma: f64) -> f64 {
    INV_SQRT_2PI / sigma * (-(d * d) / (2.0 * sigma * sigma)).exp()
}

/// Gaussian radial basis `exp(−0.5·(d/β)²)`. Equals 1 at `d = 0`.
#[inline]
pub fn gaussian_rbf(d: f64, beta: f64) -> f64 {
    let r = d / beta;
    (-0.5 * r * r).exp()
}

/// Unnormalized mixture component weight for squared distance `dist2`
/// under isotropic variance `sigma2`.
#[inline]
pub fn gaussian_affinity(dist2: f64, sigma2: f64) -> f64 {
    (-dist2 / (2.0 * sigma2)).exp()
}
