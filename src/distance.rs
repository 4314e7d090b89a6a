use crate::linalg::utils::{column_totals, gram_trace, squared_distance};
use crate::types::RegistrationError;
use ndarray::parallel::prelude::*;
use ndarray::{Array2, ArrayView2, Axis};

/// Rejects empty or non-finite point sets.
pub(crate) fn check_point_set(
    points: ArrayView2<'_, f64>,
    name: &str,
    context: &str,
) -> Result<(), RegistrationError> {
    if points.nrows() == 0 {
        return Err(RegistrationError::InvalidArgument(format!(
            "{context}: point set {name} is empty"
        )));
    }
    if points.ncols() == 0 {
        return Err(RegistrationError::InvalidArgument(format!(
            "{context}: point set {name} has zero dimensions"
        )));
    }
    if points.iter().any(|v| !v.is_finite()) {
        return Err(RegistrationError::InvalidArgument(format!(
            "{context}: point set {name} contains non-finite coordinates"
        )));
    }
    Ok(())
}

pub(crate) fn check_same_dimension(
    reference: ArrayView2<'_, f64>,
    other: ArrayView2<'_, f64>,
    context: &'static str,
) -> Result<(), RegistrationError> {
    if reference.ncols() != other.ncols() {
        return Err(RegistrationError::DimensionMismatch {
            context,
            expected: reference.ncols(),
            found: other.ncols(),
        });
    }
    Ok(())
}

/// Euclidean distances between every point of `x` (N×D) and every point of
/// `y` (M×D).
///
/// The result is M×N with `result[[m, n]] = ‖x[n] − y[m]‖₂`, so rows follow
/// `y` and columns follow `x`.
pub fn pairwise_distance(
    x: ArrayView2<'_, f64>,
    y: ArrayView2<'_, f64>,
) -> Result<Array2<f64>, RegistrationError> {
    check_point_set(x, "X", "pairwise_distance")?;
    check_point_set(y, "Y", "pairwise_distance")?;
    check_same_dimension(x, y, "pairwise_distance")?;

    let n = x.nrows();
    let m = y.nrows();
    let mut distances = Array2::<f64>::zeros((m, n));
    distances
        .axis_iter_mut(Axis(0))
        .into_par_iter()
        .enumerate()
        .for_each(|(i, mut row)| {
            let ym = y.row(i);
            for j in 0..n {
                row[j] = squared_distance(x.row(j), ym).sqrt();
            }
        });
    Ok(distances)
}

/// Initial isotropic variance for a Gaussian-mixture matcher between `x`
/// (N×D) and `y` (M×D):
///
/// `σ² = [M·tr(XᵀX) + N·tr(YᵀY) − 2·(1ᵀX)(1ᵀY)ᵀ] / (2MN)`
///
/// which is half the mean squared distance over all N·M pairs. The value is
/// zero when every point of both sets coincides, and is not clamped.
pub fn init_sigma2(
    x: ArrayView2<'_, f64>,
    y: ArrayView2<'_, f64>,
) -> Result<f64, RegistrationError> {
    check_point_set(x, "X", "init_sigma2")?;
    check_point_set(y, "Y", "init_sigma2")?;
    check_same_dimension(x, y, "init_sigma2")?;

    let n = x.nrows() as f64;
    let m = y.nrows() as f64;
    let t1 = m * gram_trace(x);
    let t2 = n * gram_trace(y);
    let t3 = 2.0 * column_totals(x).dot(&column_totals(y));
    let sigma2 = (t1 + t2 - t3) / (2.0 * m * n);

    if sigma2 <= 0.0 {
        log::debug!(
            "init_sigma2 produced non-positive variance {:.3e} for N={} M={}; point sets are degenerate",
            sigma2,
            x.nrows(),
            y.nrows()
        );
    }
    Ok(sigma2)
}
