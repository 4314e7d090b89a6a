use ndarray::{Array1, ArrayView1, ArrayView2, Axis};

#[derive(Default, Clone, Copy)]
pub(crate) struct KahanSum {
    sum: f64,
    c: f64,
}

impl KahanSum {
    pub(crate) fn add(&mut self, value: f64) {
        let y = value - self.c;
        let t = self.sum + y;
        self.c = (t - self.sum) - y;
        self.sum = t;
    }

    pub(crate) fn sum(self) -> f64 {
        self.sum
    }
}

/// Compensated sum of a lane.
pub(crate) fn kahan_total(values: ArrayView1<'_, f64>) -> f64 {
    let mut acc = KahanSum::default();
    for &v in values {
        acc.add(v);
    }
    acc.sum()
}

/// Per-column sums over rows (`1ᵀ A`), compensated.
pub(crate) fn column_totals(matrix: ArrayView2<'_, f64>) -> Array1<f64> {
    matrix
        .axis_iter(Axis(1))
        .map(kahan_total)
        .collect()
}

/// Per-row sums over columns (`A 1`), compensated.
pub(crate) fn row_totals(matrix: ArrayView2<'_, f64>) -> Array1<f64> {
    matrix
        .axis_iter(Axis(0))
        .map(kahan_total)
        .collect()
}

/// Squared Euclidean norm of each row; the diagonal of `A Aᵀ`.
pub(crate) fn row_squared_norms(points: ArrayView2<'_, f64>) -> Array1<f64> {
    points
        .axis_iter(Axis(0))
        .map(|row| row.dot(&row))
        .collect()
}

/// `tr(Aᵀ A)`, i.e. the squared Frobenius norm.
pub(crate) fn gram_trace(points: ArrayView2<'_, f64>) -> f64 {
    kahan_total(row_squared_norms(points).view())
}

/// Squared Euclidean distance between two equally sized rows.
#[inline]
pub(crate) fn squared_distance(a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
    let mut dist2 = 0.0;
    for (&x, &y) in a.iter().zip(b.iter()) {
        let delta = x - y;
        dist2 += delta * delta;
    }
    dist2
}
