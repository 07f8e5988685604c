//! Test utilities: synthetic clouds, proposal fixtures, and deterministic
//! stub collaborators.
//!
//! The stubs implement the collaborator contracts with simple, fully
//! deterministic arithmetic so pipeline behavior can be tested without any
//! learned weights. Random box proposals are a test fixture only; real
//! proposals come from an external detection-proposal stage.

use ndarray::{Array2, Array5, ArrayView2};

use crate::backbone::{BackboneOutput, DenseVolume, ScaleFeatures, SetAbstraction, SparseBackbone};
use crate::config::ScaleConfig;
use crate::error::FusionError;
use crate::roi::BoxProposal;
use crate::search::PointSearch;
use crate::voxel::{GridSpec, VoxelCoord};

/// Minimal LCG so fixtures stay reproducible without extra dependencies.
struct Lcg {
    state: u64,
}

impl Lcg {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    fn next_f32(&mut self) -> f32 {
        self.state = self
            .state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        ((self.state >> 33) as f32) / (u32::MAX >> 1) as f32
    }

    fn range(&mut self, lo: f32, hi: f32) -> f32 {
        lo + self.next_f32() * (hi - lo)
    }
}

/// Generate a uniform random cloud `(n, channels)`.
///
/// Spatial channels are uniform in `[min, max)` per axis; auxiliary
/// channels are uniform in `[0, 1)`.
pub fn make_uniform_cloud(
    n: usize,
    channels: usize,
    min: [f32; 3],
    max: [f32; 3],
    seed: u64,
) -> Array2<f32> {
    let mut rng = Lcg::new(seed);
    let mut data = Vec::with_capacity(n * channels);
    for _ in 0..n {
        for c in 0..channels {
            if c < 3 {
                data.push(rng.range(min[c], max[c]));
            } else {
                data.push(rng.range(0.0, 1.0));
            }
        }
    }
    Array2::from_shape_vec((n, channels), data).expect("buffer matches requested shape")
}

/// Generate random box proposals inside the given extent.
///
/// Test fixture standing in for the external proposal stage.
pub fn make_random_proposals(n: usize, extent: [f32; 3], seed: u64) -> Vec<BoxProposal> {
    let mut rng = Lcg::new(seed);
    (0..n)
        .map(|_| BoxProposal {
            center: [
                rng.range(0.0, extent[0]),
                rng.range(0.0, extent[1]),
                rng.range(0.0, extent[2]),
            ],
            size: [
                rng.range(0.5, extent[0] / 4.0),
                rng.range(0.5, extent[1] / 4.0),
                rng.range(0.5, extent[2].max(1.0)),
            ],
            heading: rng.range(0.0, std::f32::consts::TAU),
        })
        .collect()
}

/// Deterministic sparse backbone stub.
///
/// Each backbone scale keeps every stride-th input voxel, reusing the
/// voxel's averaged features unchanged; the dense volume is a fixed ramp
/// over its indices. Shapes follow the real contract: scales in
/// increasing-stride order, volume plane at the final stride.
pub struct StubBackbone {
    grid: GridSpec,
    /// Strides of the backbone scales (the raw-point stage excluded).
    strides: Vec<usize>,
    volume_channels: usize,
    volume_depth: usize,
}

impl StubBackbone {
    /// Build a stub for the configured scales.
    ///
    /// `scales` is the full stage list including the raw-point stage at
    /// index 0, which the backbone does not serve.
    pub fn new(
        grid: GridSpec,
        scales: &[ScaleConfig],
        volume_channels: usize,
        volume_depth: usize,
    ) -> Self {
        Self {
            grid,
            strides: scales.iter().skip(1).map(|s| s.stride).collect(),
            volume_channels,
            volume_depth,
        }
    }
}

impl SparseBackbone for StubBackbone {
    fn forward(
        &self,
        features: ArrayView2<f32>,
        coordinates: &[[i32; 4]],
        _batch_size: usize,
    ) -> Result<BackboneOutput, FusionError> {
        let scales = self
            .strides
            .iter()
            .map(|&stride| {
                let keep: Vec<usize> = (0..coordinates.len()).step_by(stride.max(1)).collect();
                let centers: Vec<[f32; 3]> = keep
                    .iter()
                    .map(|&i| {
                        let [_, z, y, x] = coordinates[i];
                        self.grid.voxel_center(&VoxelCoord::new(x, y, z))
                    })
                    .collect();
                let table = Array2::from_shape_fn((keep.len(), features.ncols()), |(r, c)| {
                    features[(keep[r], c)]
                });
                ScaleFeatures {
                    centers,
                    features: table,
                }
            })
            .collect();

        let final_stride = self.strides.last().copied().unwrap_or(1);
        let (h, w) = self.grid.bev_shape(final_stride);
        let volume = Array5::from_shape_fn(
            (1, self.volume_channels, self.volume_depth, h, w),
            |(_, c, d, y, x)| 0.1 * (c + d) as f32 + 0.01 * x as f32 + 0.001 * y as f32,
        );

        Ok(BackboneOutput {
            scales,
            volume: DenseVolume::new(volume)?,
        })
    }
}

/// Deterministic set-abstraction stub.
///
/// For each keypoint, ball-queries the scale's centers with the
/// configured radius and neighbor cap, averages the neighbors per input
/// channel, and tiles the averages across the configured output width.
/// Empty neighborhoods yield the zero row.
pub struct StubSetAbstraction {
    scale: ScaleConfig,
}

impl StubSetAbstraction {
    pub fn new(scale: ScaleConfig) -> Self {
        Self { scale }
    }
}

impl SetAbstraction for StubSetAbstraction {
    fn extract(
        &self,
        centers: &[[f32; 3]],
        features: ArrayView2<f32>,
        keypoints: &[[f32; 3]],
    ) -> Result<Array2<f32>, FusionError> {
        let c_in = features.nrows();
        if c_in > 0 && features.ncols() != centers.len() {
            return Err(FusionError::Contract(format!(
                "channel-major features are ({}, {}) for {} centers",
                c_in,
                features.ncols(),
                centers.len()
            )));
        }

        let mut out = Array2::zeros((keypoints.len(), self.scale.out_channels));
        let Some(search) = PointSearch::from_points(centers) else {
            return Ok(out);
        };

        for (k, keypoint) in keypoints.iter().enumerate() {
            let neighbors =
                search.within_capped(keypoint, self.scale.radius, self.scale.max_neighbors);
            if neighbors.is_empty() || c_in == 0 {
                continue;
            }
            let inv = 1.0 / neighbors.len() as f32;
            let means: Vec<f32> = (0..c_in)
                .map(|c| neighbors.iter().map(|&n| features[(c, n)]).sum::<f32>() * inv)
                .collect();
            for c_out in 0..self.scale.out_channels {
                out[(k, c_out)] = means[c_out % c_in];
            }
        }
        Ok(out)
    }
}
