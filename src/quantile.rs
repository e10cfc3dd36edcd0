//! Equal-frequency binning over a population

use std::cmp::Ordering;

/// Quantile of already sorted values, interpolating linearly between the
/// two closest ranks.
///
/// `sorted` must be non-empty and `q` within `[0, 1]`.
pub fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    debug_assert!(!sorted.is_empty());
    let position = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let fraction = position - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * fraction
}

/// The `bins + 1` boundaries splitting `values` into equal-frequency bins
pub fn quantile_edges(values: &[f64], bins: usize) -> Vec<f64> {
    if values.is_empty() || bins == 0 {
        return Vec::new();
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    (0..=bins)
        .map(|i| quantile_sorted(&sorted, i as f64 / bins as f64))
        .collect()
}

/// Assign each value to one of `bins` equal-frequency bins.
///
/// Bins are right-closed, `(e[i], e[i + 1]]`, with the smallest value placed
/// in bin 0. Returns bin indices in input order, or `None` when the
/// boundaries are not strictly increasing (too few values, or too many
/// identical ones).
pub fn qcut(values: &[f64], bins: usize) -> Option<Vec<usize>> {
    let edges = quantile_edges(values, bins);
    if edges.len() < 2 || edges.windows(2).any(|pair| pair[0] >= pair[1]) {
        return None;
    }

    let inner = &edges[1..];
    let assigned = values
        .iter()
        .map(|&value| inner.partition_point(|&edge| edge < value).min(bins - 1))
        .collect();
    Some(assigned)
}

/// Ranks `1..=n` in ascending value order; equal values are ranked in the
/// order they appear.
pub fn rank_first(values: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    // sort_by is stable, which gives ties their first-seen order
    order.sort_by(|&a, &b| values[a].partial_cmp(&values[b]).unwrap_or(Ordering::Equal));

    let mut ranks = vec![0.0; values.len()];
    for (rank, index) in order.into_iter().enumerate() {
        ranks[index] = (rank + 1) as f64;
    }
    ranks
}
