//! Point bucketing into a capped sparse voxel grid.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use ndarray::{Array2, ArrayView2};
use tracing::{debug, warn};

use super::types::{GridSpec, VoxelCoord};
use crate::config::FusionConfig;

/// Counts of points discarded during voxelization.
///
/// Overflowing a capacity cap drops points deterministically instead of
/// raising an error; callers that care can inspect these counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DropStats {
    /// Points outside the configured half-open bounds.
    pub out_of_bounds: usize,
    /// Points whose voxel had already reached the per-voxel cap.
    pub full_voxel: usize,
    /// Points that would have opened a new voxel after the voxel cap.
    pub full_grid: usize,
}

impl DropStats {
    /// Total number of points that did not contribute to any voxel.
    pub fn total(&self) -> usize {
        self.out_of_bounds + self.full_voxel + self.full_grid
    }
}

/// Sparse voxel set produced by [`voxelize`].
///
/// Voxels appear in input-encounter order: the first point that opens a
/// voxel fixes its row index, so repeated runs over the same cloud produce
/// identical layouts.
#[derive(Debug, Clone)]
pub struct SparseVoxels {
    /// Per-voxel element-wise sum of accepted point rows, `(Nv, C)`.
    /// Not yet averaged; the VFE divides by occupancy.
    pub feature_sums: Array2<f32>,
    /// Per-voxel integer coordinates as `(batch, z, y, x)` rows, batch 0.
    pub coordinates: Vec<[i32; 4]>,
    /// Points accepted into each voxel, capped at the per-voxel limit.
    pub occupancy: Vec<u32>,
    /// Points discarded by bounds filtering or capacity caps.
    pub drop_stats: DropStats,
}

impl SparseVoxels {
    /// Number of occupied voxels.
    pub fn len(&self) -> usize {
        self.coordinates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coordinates.is_empty()
    }
}

/// Bucket a point cloud into the sparse voxel grid.
///
/// Each point lands in the voxel `floor((p - origin) / voxel_size)`;
/// out-of-bounds points are rejected. Acceptance is strictly first-come:
/// once a voxel holds `max_points_per_voxel` points, or the grid holds
/// `max_voxels` voxels, later arrivals are dropped silently and counted.
///
/// # Arguments
/// * `points` - Input cloud, `(N, C)` with C = 3 spatial + auxiliary channels
/// * `spec` - Grid geometry derived from the configuration
/// * `config` - Capacity caps
///
/// A cloud with no in-bounds points yields an empty voxel set; downstream
/// stages treat that as degenerate, not fatal.
pub fn voxelize(points: ArrayView2<f32>, spec: &GridSpec, config: &FusionConfig) -> SparseVoxels {
    let channels = points.ncols();
    let cap = config.max_points_per_voxel as u32;

    let mut index: HashMap<VoxelCoord, usize> = HashMap::new();
    let mut sums: Vec<f32> = Vec::new();
    let mut coordinates: Vec<[i32; 4]> = Vec::new();
    let mut occupancy: Vec<u32> = Vec::new();
    let mut stats = DropStats::default();

    // Sequential over points: encounter order decides which points win a
    // slot, and that order must be reproducible.
    for point in points.rows() {
        let xyz = [point[0], point[1], point[2]];
        let Some(coord) = spec.voxel_index(&xyz) else {
            stats.out_of_bounds += 1;
            continue;
        };

        match index.entry(coord) {
            Entry::Occupied(slot) => {
                let i = *slot.get();
                if occupancy[i] < cap {
                    occupancy[i] += 1;
                    let base = i * channels;
                    for (c, &v) in point.iter().enumerate() {
                        sums[base + c] += v;
                    }
                } else {
                    stats.full_voxel += 1;
                }
            }
            Entry::Vacant(slot) => {
                if coordinates.len() >= config.max_voxels {
                    stats.full_grid += 1;
                    continue;
                }
                slot.insert(coordinates.len());
                coordinates.push(coord.to_batched_zyx(0));
                occupancy.push(1);
                sums.extend(point.iter().copied());
            }
        }
    }

    if stats.total() > 0 {
        debug!(
            out_of_bounds = stats.out_of_bounds,
            full_voxel = stats.full_voxel,
            full_grid = stats.full_grid,
            "voxelizer dropped points"
        );
    }
    if coordinates.is_empty() {
        warn!("no points fell inside the voxel grid bounds");
    }

    let feature_sums = Array2::from_shape_vec((coordinates.len(), channels), sums)
        .expect("sum buffer matches voxel count");

    SparseVoxels {
        feature_sums,
        coordinates,
        occupancy,
        drop_stats: stats,
    }
}
