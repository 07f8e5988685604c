//! Farthest-point keypoint sampling.
//!
//! Greedy selection: starting from the first point, repeatedly pick the
//! point whose minimum distance to the already-selected set is largest.
//! Selection order is load-bearing: every per-keypoint feature table
//! downstream aligns rows positionally with the order produced here, so
//! ties break toward the lower index and the whole procedure is
//! deterministic.

use ndarray::ArrayView2;
use rayon::prelude::*;

use crate::error::FusionError;

/// Keypoints sampled from a raw cloud.
///
/// `indices[i]` is the row of the input cloud that `xyz[i]` was taken
/// from; auxiliary channels are dropped.
#[derive(Debug, Clone)]
pub struct Keypoints {
    pub indices: Vec<usize>,
    pub xyz: Vec<[f32; 3]>,
}

impl Keypoints {
    pub fn len(&self) -> usize {
        self.xyz.len()
    }

    pub fn is_empty(&self) -> bool {
        self.xyz.is_empty()
    }
}

/// Sample exactly `k` keypoints by farthest-point sampling.
///
/// O(N·k): each round updates every point's distance to the selected set
/// in parallel and takes the argmax. A cloud with fewer than `k` points is
/// rejected rather than padded.
///
/// # Arguments
/// * `points` - Input cloud `(N, C)`, C >= 3; only xyz participates
/// * `k` - Number of keypoints to select
pub fn farthest_point_sample(points: ArrayView2<f32>, k: usize) -> Result<Keypoints, FusionError> {
    let n = points.nrows();
    if n < k {
        return Err(FusionError::InsufficientPoints {
            available: n,
            requested: k,
        });
    }

    let xyz: Vec<[f32; 3]> = points
        .rows()
        .into_iter()
        .map(|row| [row[0], row[1], row[2]])
        .collect();

    let mut min_dist_sq = vec![f32::INFINITY; n];
    let mut selected = vec![false; n];
    let mut indices = Vec::with_capacity(k);
    let mut current = 0usize;

    for _ in 0..k {
        indices.push(current);
        selected[current] = true;
        if indices.len() == k {
            break;
        }
        let anchor = xyz[current];

        // One fused pass: fold the new anchor into each point's distance
        // to the selected set, then argmax over unselected points. Ties go
        // to the lower index so the reduction order cannot change results.
        let (next, _) = min_dist_sq
            .par_iter_mut()
            .zip(xyz.par_iter())
            .zip(selected.par_iter())
            .enumerate()
            .map(|(i, ((d, p), &taken))| {
                let dx = p[0] - anchor[0];
                let dy = p[1] - anchor[1];
                let dz = p[2] - anchor[2];
                let dist = dx * dx + dy * dy + dz * dz;
                if dist < *d {
                    *d = dist;
                }
                if taken {
                    (i, f32::NEG_INFINITY)
                } else {
                    (i, *d)
                }
            })
            .reduce(
                || (usize::MAX, f32::NEG_INFINITY),
                |a, b| {
                    if b.1 > a.1 || (b.1 == a.1 && b.0 < a.0) {
                        b
                    } else {
                        a
                    }
                },
            );
        current = next;
    }

    let keypoint_xyz = indices.iter().map(|&i| xyz[i]).collect();
    Ok(Keypoints {
        indices,
        xyz: keypoint_xyz,
    })
}
