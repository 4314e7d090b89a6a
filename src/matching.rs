use crate::types::RegistrationError;
use ndarray::{Array1, Array2, ArrayView2};
use rayon::prelude::*;

/// Best candidate per query plus the second-best / best ambiguity ratio.
#[derive(Debug, Clone, PartialEq)]
pub struct Matches {
    /// `(query_index, candidate_row)` pairs, ascending by query.
    pub correspondences: Vec<(usize, usize)>,
    /// Cost of the best candidate of each query.
    pub best_costs: Array1<f64>,
    /// `second_best / best` per query. A best cost of zero gives `inf`, or
    /// `NaN` when the runner-up is also zero.
    pub ratios: Array1<f64>,
}

impl Matches {
    pub fn len(&self) -> usize {
        self.correspondences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.correspondences.is_empty()
    }

    /// Correspondences as an N×2 index matrix `[query, candidate]`.
    pub fn to_index_matrix(&self) -> Array2<usize> {
        let mut out = Array2::<usize>::zeros((self.correspondences.len(), 2));
        for (row, &(query, candidate)) in self.correspondences.iter().enumerate() {
            out[[row, 0]] = query;
            out[[row, 1]] = candidate;
        }
        out
    }

    /// Correspondences whose ambiguity ratio is at least `min_ratio`.
    /// `NaN` ratios never pass.
    pub fn filter_by_ratio(&self, min_ratio: f64) -> Vec<(usize, usize)> {
        self.correspondences
            .iter()
            .zip(self.ratios.iter())
            .filter(|&(_, &ratio)| ratio >= min_ratio)
            .map(|(&pair, _)| pair)
            .collect()
    }

    /// Queries whose best cost is zero or whose ratio is undefined.
    pub fn degenerate_queries(&self) -> Vec<usize> {
        self.best_costs
            .iter()
            .zip(self.ratios.iter())
            .enumerate()
            .filter(|&(_, (&best, &ratio))| best == 0.0 || ratio.is_nan())
            .map(|(q, _)| q)
            .collect()
    }
}

/// Nearest and second-nearest candidate for every column of a cost matrix.
///
/// `pd` is M×N with candidates along rows and queries along columns. The best
/// row is the first minimum of each column. The runner-up is the minimum of
/// the same column with only that one cell excluded; other columns do not
/// claim rows. With a single candidate row the runner-up is `+inf`.
pub fn match_candidates(pd: ArrayView2<'_, f64>) -> Result<Matches, RegistrationError> {
    if pd.nrows() == 0 || pd.ncols() == 0 {
        return Err(RegistrationError::InvalidArgument(format!(
            "match_candidates: cost matrix must be non-empty, got {}x{}",
            pd.nrows(),
            pd.ncols()
        )));
    }
    if pd.iter().any(|v| v.is_nan()) {
        return Err(RegistrationError::InvalidArgument(
            "match_candidates: cost matrix contains NaN".to_string(),
        ));
    }

    let n = pd.ncols();
    let per_query: Vec<(usize, f64, f64)> = (0..n)
        .into_par_iter()
        .map(|query| {
            let column = pd.column(query);
            let mut best_row = 0usize;
            let mut best = column[0];
            for (row, &cost) in column.iter().enumerate().skip(1) {
                if cost < best {
                    best = cost;
                    best_row = row;
                }
            }
            let runner_up = column
                .iter()
                .enumerate()
                .filter(|&(row, _)| row != best_row)
                .map(|(_, &cost)| cost)
                .fold(f64::INFINITY, f64::min);
            (best_row, best, runner_up / best)
        })
        .collect();

    let correspondences = per_query
        .iter()
        .enumerate()
        .map(|(query, &(best_row, _, _))| (query, best_row))
        .collect();
    let best_costs = per_query.iter().map(|&(_, best, _)| best).collect();
    let ratios = per_query.iter().map(|&(_, _, ratio)| ratio).collect();

    let matches = Matches {
        correspondences,
        best_costs,
        ratios,
    };
    let degenerate = matches.degenerate_queries();
    if !degenerate.is_empty() {
        log::debug!(
            "match_candidates: {} of {} queries have a zero best cost (first query {})",
            degenerate.len(),
            n,
            degenerate[0]
        );
    }
    Ok(matches)
}
