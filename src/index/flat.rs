pub(super) fn nearest(vectors: &[f32], dimension: usize, query: &[f32], k: usize) -> Vec<(usize, f32)> {
    if k == 0 || dimension == 0 {
        return Vec::new();
    }

    let mut scored = vectors
        .chunks_exact(dimension)
        .enumerate()
        .map(|(id, vector)| (id, l2_distance(vector, query)))
        .collect::<Vec<_>>();

    let by_rank = |left: &(usize, f32), right: &(usize, f32)| {
        left.1.total_cmp(&right.1).then(left.0.cmp(&right.0))
    };
    if scored.len() > k {
        scored.select_nth_unstable_by(k - 1, by_rank);
        scored.truncate(k);
    }
    scored.sort_by(by_rank);
    scored
}

pub(super) fn l2_distance(left: &[f32], right: &[f32]) -> f32 {
    left.iter()
        .zip(right)
        .map(|(a, b)| {
            let diff = f64::from(*a) - f64::from(*b);
            diff * diff
        })
        .sum::<f64>()
        .sqrt() as f32
}
