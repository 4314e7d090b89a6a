//! One expectation step of a Gaussian-mixture point matcher.
//!
//! Every point `t_m` of the current model set is the mean of an isotropic
//! Gaussian with variance `σ²`, and a uniform component of weight `ω` absorbs
//! outliers among the data points `x_n`. The step produces the posterior
//! `Po[m, n]` together with the sufficient statistics and the registration
//! cost a caller needs to update the transform and `σ²` for the next round.

use crate::distance::{check_point_set, check_same_dimension};
use crate::linalg::utils::{column_totals, kahan_total, row_squared_norms, row_totals, squared_distance};
use crate::probability::gaussian_affinity;
use crate::types::{EStepParams, RegistrationError};
use ndarray::parallel::prelude::*;
use ndarray::{Array1, Array2, ArrayView2, ArrayViewMut1, Axis};

/// Output of [`compute_e_step`].
#[derive(Debug, Clone)]
pub struct EStep {
    /// `Po`, M×N. Column `n` distributes data point `n` over the model points.
    pub posterior: Array2<f64>,
    /// `P1 = Po·1`, mass received by each model point (length M).
    pub p1: Array1<f64>,
    /// `Pᵀ1 = Poᵀ·1`, mass assigned from each data point (length N). This is
    /// the diagonal of `Px`.
    pub pt1: Array1<f64>,
    /// `Np = 1ᵀ·Po·1`.
    pub np: f64,
    /// `tr(XᵀPxX) − 2·tr(TᵀPoX) + tr(TᵀPyT)`.
    pub trace_term: f64,
    /// `Q = Np·ln(σ²) + trace_term / (2σ²)`.
    pub cost: f64,
    /// Data points whose normalizer was zero. Their posterior column is `NaN`.
    pub degenerate_columns: Vec<usize>,
}

impl EStep {
    /// Turns zero-mass columns or a non-finite cost into an error.
    pub fn ensure_finite(self) -> Result<Self, RegistrationError> {
        if let Some(&first_index) = self.degenerate_columns.first() {
            return Err(RegistrationError::NumericDegenerate {
                context: "compute_e_step",
                count: self.degenerate_columns.len(),
                first_index,
            });
        }
        if !self.cost.is_finite() {
            let bad = self.posterior.iter().filter(|v| !v.is_finite()).count();
            let first_index = self
                .posterior
                .iter()
                .position(|v| !v.is_finite())
                .unwrap_or(0);
            return Err(RegistrationError::NumericDegenerate {
                context: "compute_e_step",
                count: bad,
                first_index,
            });
        }
        Ok(self)
    }
}

/// Prior weights of one for every (model, data) pair.
pub fn uniform_prior(num_model_points: usize, num_data_points: usize) -> Array2<f64> {
    Array2::<f64>::ones((num_model_points, num_data_points))
}

/// E-step for data `x` (N×D), model points `t` (M×D) and prior `pm` (M×N).
///
/// Uses the default parallel threshold; see [`compute_e_step_with_params`].
pub fn compute_e_step(
    x: ArrayView2<'_, f64>,
    t: ArrayView2<'_, f64>,
    pm: ArrayView2<'_, f64>,
    sigma2: f64,
    omega: f64,
) -> Result<EStep, RegistrationError> {
    compute_e_step_with_params(x, t, pm, &EStepParams::new(sigma2, omega))
}

/// E-step with explicit parameters.
///
/// With `ω = 0` a data point far from every model point can underflow all of
/// its Gaussian terms. The column is then `NaN` and listed in
/// [`EStep::degenerate_columns`]; any `ω > 0` keeps every normalizer at
/// least `ω/N`.
pub fn compute_e_step_with_params(
    x: ArrayView2<'_, f64>,
    t: ArrayView2<'_, f64>,
    pm: ArrayView2<'_, f64>,
    params: &EStepParams,
) -> Result<EStep, RegistrationError> {
    params.validate()?;
    check_point_set(x, "X", "compute_e_step")?;
    check_point_set(t, "T", "compute_e_step")?;
    check_same_dimension(x, t, "compute_e_step")?;

    let n = x.nrows();
    let m = t.nrows();
    if pm.nrows() != m {
        return Err(RegistrationError::DimensionMismatch {
            context: "compute_e_step prior rows",
            expected: m,
            found: pm.nrows(),
        });
    }
    if pm.ncols() != n {
        return Err(RegistrationError::DimensionMismatch {
            context: "compute_e_step prior columns",
            expected: n,
            found: pm.ncols(),
        });
    }
    if pm.iter().any(|v| !v.is_finite()) {
        return Err(RegistrationError::InvalidArgument(
            "compute_e_step: prior weights must be finite".to_string(),
        ));
    }

    let sigma2 = params.sigma2;
    let omega = params.omega;
    let inlier_weight = 1.0 - omega;

    // Unnormalized responsibilities (1−ω)·Pm·exp(−‖x_n − t_m‖²/(2σ²)).
    let fill_row = |mi: usize, mut row: ArrayViewMut1<'_, f64>| {
        let tm = t.row(mi);
        for ni in 0..n {
            let dist2 = squared_distance(x.row(ni), tm);
            row[ni] = inlier_weight * pm[[mi, ni]] * gaussian_affinity(dist2, sigma2);
        }
    };
    let mut posterior = Array2::<f64>::zeros((m, n));
    if m.saturating_mul(n) >= params.parallel_threshold {
        posterior
            .axis_iter_mut(Axis(0))
            .into_par_iter()
            .enumerate()
            .for_each(|(mi, row)| fill_row(mi, row));
    } else {
        posterior
            .axis_iter_mut(Axis(0))
            .enumerate()
            .for_each(|(mi, row)| fill_row(mi, row));
    }

    let outlier_mass = omega / n as f64;
    let normalizer = column_totals(posterior.view()).mapv(|s| s + outlier_mass);
    let degenerate_columns: Vec<usize> = normalizer
        .iter()
        .enumerate()
        .filter(|&(_, &z)| z == 0.0)
        .map(|(ni, _)| ni)
        .collect();
    if !degenerate_columns.is_empty() {
        log::warn!(
            "compute_e_step: {} of {} data points have zero mixture mass (sigma2={:.3e}, omega={}); posterior columns are NaN",
            degenerate_columns.len(),
            n,
            sigma2,
            omega
        );
    }
    for mut row in posterior.rows_mut() {
        row /= &normalizer;
    }

    let p1 = row_totals(posterior.view());
    let pt1 = column_totals(posterior.view());
    let np = kahan_total(p1.view());

    // tr(XᵀPxX) = Σ_n Pᵀ1[n]·‖x_n‖², tr(TᵀPyT) = Σ_m P1[m]·‖t_m‖²,
    // tr(TᵀPoX) = Σ_{m,n} Po[m,n]·(t_m·x_n).
    let data_term = pt1.dot(&row_squared_norms(x));
    let model_term = p1.dot(&row_squared_norms(t));
    let cross = t.dot(&x.t());
    let cross_term = (&posterior * &cross).sum();
    let trace_term = data_term - 2.0 * cross_term + model_term;
    let cost = np * sigma2.ln() + trace_term / (2.0 * sigma2);

    log::debug!(
        "compute_e_step: M={} N={} Np={:.6} Q={:.6e}",
        m,
        n,
        np,
        cost
    );

    Ok(EStep {
        posterior,
        p1,
        pt1,
        np,
        trace_term,
        cost,
        degenerate_columns,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn single_pair_without_outliers_has_unit_posterior() {
        let x = array![[0.3, -1.2]];
        let t = array![[1.0, 0.5]];
        let pm = uniform_prior(1, 1);
        for &sigma2 in &[0.1, 1.0, 10.0, 250.0] {
            let step = compute_e_step(x.view(), t.view(), pm.view(), sigma2, 0.0).expect("e-step");
            assert_abs_diff_eq!(step.posterior[[0, 0]], 1.0, epsilon = 1e-12);
            assert_abs_diff_eq!(step.np, 1.0, epsilon = 1e-12);
            assert!(step.degenerate_columns.is_empty());
        }
    }

    #[test]
    fn columns_sum_to_one_without_outliers() {
        let x = array![[0.0, 0.0], [1.0, 0.0], [0.0, 1.0], [2.0, 2.0]];
        let t = array![[0.1, 0.0], [0.9, 0.1], [0.0, 1.2]];
        let pm = uniform_prior(3, 4);
        let step = compute_e_step(x.view(), t.view(), pm.view(), 0.5, 0.0).expect("e-step");
        for &mass in step.pt1.iter() {
            assert_abs_diff_eq!(mass, 1.0, epsilon = 1e-12);
        }
        assert_abs_diff_eq!(step.np, 4.0, epsilon = 1e-12);
        assert_abs_diff_eq!(step.p1.sum(), step.np, epsilon = 1e-12);
    }

    #[test]
    fn outlier_weight_leaves_mass_on_uniform_component() {
        let x = array![[0.0, 0.0], [1.0, 0.0], [5.0, 5.0]];
        let t = array![[0.0, 0.1], [1.0, -0.1]];
        let pm = uniform_prior(2, 3);
        let step = compute_e_step(x.view(), t.view(), pm.view(), 0.25, 0.2).expect("e-step");
        assert!(step.pt1.iter().all(|&mass| mass > 0.0 && mass < 1.0));
        assert!(step.np < 3.0);
        // The far point is mostly explained by the uniform component.
        assert!(step.pt1[2] < 1e-6);
        assert!(step.pt1[0] > 0.9);
    }

    #[test]
    fn posterior_prefers_the_nearest_model_point() {
        let x = array![[0.0, 0.0, 0.0], [3.0, 0.0, 0.0], [0.0, 3.0, 0.0]];
        let t = x.clone();
        let pm = uniform_prior(3, 3);
        let step = compute_e_step(x.view(), t.view(), pm.view(), 0.2, 0.1).expect("e-step");
        for ni in 0..3 {
            for mi in 0..3 {
                if mi != ni {
                    assert!(step.posterior[[ni, ni]] > step.posterior[[mi, ni]]);
                }
            }
        }
    }

    #[test]
    fn cost_matches_dense_trace_formula() {
        let x = array![[0.0, 1.0], [2.0, -1.0], [0.5, 0.5], [-1.0, 0.0]];
        let t = array![[0.1, 0.9], [1.8, -0.7], [-0.8, 0.2]];
        let pm = array![
            [1.0, 0.5, 0.2, 0.1],
            [0.3, 1.0, 0.4, 0.2],
            [0.2, 0.1, 0.6, 1.0]
        ];
        let sigma2 = 0.7;
        let step = compute_e_step(x.view(), t.view(), pm.view(), sigma2, 0.05).expect("e-step");

        let px = Array2::from_diag(&step.pt1);
        let py = Array2::from_diag(&step.p1);
        let a = x.t().dot(&px).dot(&x).diag().sum();
        let b = t.t().dot(&step.posterior).dot(&x).diag().sum();
        let c = t.t().dot(&py).dot(&t).diag().sum();
        let expected_tmp = a - 2.0 * b + c;
        let expected_q = step.posterior.sum() * sigma2.ln() + expected_tmp / (2.0 * sigma2);

        assert_abs_diff_eq!(step.trace_term, expected_tmp, epsilon = 1e-10);
        assert_abs_diff_eq!(step.cost, expected_q, epsilon = 1e-10);
        assert_abs_diff_eq!(step.np, step.posterior.sum(), epsilon = 1e-12);
    }

    #[test]
    fn parallel_and_sequential_paths_agree_exactly() {
        let x = Array2::from_shape_fn((17, 3), |(i, j)| ((i * 7 + j * 3) % 11) as f64 * 0.3);
        let t = Array2::from_shape_fn((13, 3), |(i, j)| ((i * 5 + j) % 9) as f64 * 0.35 + 0.05);
        let pm = uniform_prior(13, 17);
        let mut params = EStepParams::new(1.3, 0.1);
        params.parallel_threshold = 0;
        let par = compute_e_step_with_params(x.view(), t.view(), pm.view(), &params).expect("par");
        params.parallel_threshold = usize::MAX;
        let seq = compute_e_step_with_params(x.view(), t.view(), pm.view(), &params).expect("seq");
        assert_eq!(par.posterior, seq.posterior);
        assert_eq!(par.p1, seq.p1);
        assert_eq!(par.pt1, seq.pt1);
        assert_eq!(par.np.to_bits(), seq.np.to_bits());
        assert_eq!(par.cost.to_bits(), seq.cost.to_bits());
    }

    #[test]
    fn underflowing_column_is_reported_as_degenerate() {
        let x = array![[0.0, 0.0], [100.0, 0.0]];
        let t = array![[0.0, 0.1]];
        let pm = uniform_prior(1, 2);
        let step = compute_e_step(x.view(), t.view(), pm.view(), 1e-2, 0.0).expect("e-step");
        assert_eq!(step.degenerate_columns, vec![1]);
        assert!(step.posterior[[0, 1]].is_nan());
        assert_abs_diff_eq!(step.posterior[[0, 0]], 1.0, epsilon = 1e-12);
        match step.ensure_finite().unwrap_err() {
            RegistrationError::NumericDegenerate {
                count, first_index, ..
            } => {
                assert_eq!(count, 1);
                assert_eq!(first_index, 1);
            }
            other => panic!("expected NumericDegenerate, got {other:?}"),
        }
    }

    #[test]
    fn invalid_inputs_are_rejected() {
        let x = array![[0.0, 0.0], [1.0, 1.0]];
        let t = array![[0.0, 0.0]];
        let pm = uniform_prior(1, 2);
        assert!(compute_e_step(x.view(), t.view(), pm.view(), 0.0, 0.1).is_err());
        assert!(compute_e_step(x.view(), t.view(), pm.view(), 1.0, 1.0).is_err());

        let wrong_prior = uniform_prior(2, 2);
        match compute_e_step(x.view(), t.view(), wrong_prior.view(), 1.0, 0.1).unwrap_err() {
            RegistrationError::DimensionMismatch {
                expected, found, ..
            } => {
                assert_eq!(expected, 1);
                assert_eq!(found, 2);
            }
            other => panic!("expected DimensionMismatch, got {other:?}"),
        }

        let t3 = array![[0.0, 0.0, 0.0]];
        assert!(matches!(
            compute_e_step(x.view(), t3.view(), pm.view(), 1.0, 0.1),
            Err(RegistrationError::DimensionMismatch { .. })
        ));
    }
}
