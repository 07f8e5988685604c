//! Pipeline configuration.
//!
//! All records here are immutable value types: build one, validate it,
//! then share it by read-only reference. Nothing in the pipeline mutates
//! configuration after construction, so collaborators can never observe
//! aliased or partially updated parameter lists.

use crate::error::ConfigError;

/// Axis-aligned bounds of the voxelized region.
///
/// Each axis covers the half-open interval `[min, max)`: a point exactly
/// on `max` belongs to no voxel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridBounds {
    pub min: [f32; 3],
    pub max: [f32; 3],
}

impl GridBounds {
    pub fn new(min: [f32; 3], max: [f32; 3]) -> Self {
        Self { min, max }
    }

    /// Whether a point falls inside the half-open bounds.
    pub fn contains(&self, point: &[f32; 3]) -> bool {
        (0..3).all(|i| point[i] >= self.min[i] && point[i] < self.max[i])
    }
}

/// Configuration for one feature-grouping stage.
///
/// The first configured scale is the synthetic raw-point stage (stride 1);
/// each following scale corresponds positionally to one sparse backbone
/// output, in increasing-stride order. The last stride also drives the
/// BEV index arithmetic.
#[derive(Debug, Clone, Copy)]
pub struct ScaleConfig {
    /// Ball-query radius used by this stage's set-abstraction module.
    pub radius: f32,
    /// Neighbor cap for the ball query.
    pub max_neighbors: usize,
    /// Channel count this stage's extractor produces per keypoint.
    pub out_channels: usize,
    /// Voxel stride of this stage relative to the base grid.
    pub stride: usize,
}

/// Configuration for ROI grid pooling.
#[derive(Debug, Clone, Copy)]
pub struct RoiPoolConfig {
    /// Lattice resolution per axis; each box yields `resolution³` grid points.
    pub grid_resolution: usize,
    /// Ball-query radius around each grid point.
    pub radius: f32,
}

/// Top-level configuration for the fusion pipeline.
#[derive(Debug, Clone)]
pub struct FusionConfig {
    /// Voxel side lengths in meters (x, y, z).
    pub voxel_size: [f32; 3],
    /// Region of interest; points outside are discarded.
    pub grid_bounds: GridBounds,
    /// Hard cap on the number of voxels. Later voxels are dropped.
    pub max_voxels: usize,
    /// Hard cap on points accumulated per voxel. Later points are dropped.
    pub max_points_per_voxel: usize,
    /// Number of keypoints sampled from the raw cloud.
    pub num_keypoints: usize,
    /// Input cloud width: 3 spatial channels plus auxiliary scalars.
    pub point_channels: usize,
    /// Grouping stages, raw-point stage first, then one per backbone scale.
    pub scales: Vec<ScaleConfig>,
    /// ROI grid pooling parameters.
    pub roi: RoiPoolConfig,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            voxel_size: [0.05, 0.05, 0.1],
            grid_bounds: GridBounds::new([0.0, -40.0, -3.0], [70.4, 40.0, 1.0]),
            max_voxels: 40_000,
            max_points_per_voxel: 5,
            num_keypoints: 2048,
            point_channels: 4,
            scales: vec![
                ScaleConfig {
                    radius: 0.4,
                    max_neighbors: 16,
                    out_channels: 32,
                    stride: 1,
                },
                ScaleConfig {
                    radius: 0.8,
                    max_neighbors: 16,
                    out_channels: 64,
                    stride: 4,
                },
                ScaleConfig {
                    radius: 1.6,
                    max_neighbors: 32,
                    out_channels: 128,
                    stride: 8,
                },
            ],
            roi: RoiPoolConfig {
                grid_resolution: 6,
                radius: 1.0,
            },
        }
    }
}

impl FusionConfig {
    /// Validate the configuration before any computation runs.
    ///
    /// Returns the first violation found; a configuration that passes is
    /// safe for every downstream stage.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.voxel_size.iter().any(|&s| s <= 0.0 || !s.is_finite()) {
            return Err(ConfigError::NonPositiveVoxelSize(self.voxel_size));
        }
        let b = &self.grid_bounds;
        if (0..3).any(|i| b.min[i] >= b.max[i]) {
            return Err(ConfigError::InvalidBounds {
                min: b.min,
                max: b.max,
            });
        }
        if self.max_voxels == 0 {
            return Err(ConfigError::ZeroParameter { name: "max_voxels" });
        }
        if self.max_points_per_voxel == 0 {
            return Err(ConfigError::ZeroParameter {
                name: "max_points_per_voxel",
            });
        }
        if self.num_keypoints == 0 {
            return Err(ConfigError::ZeroParameter {
                name: "num_keypoints",
            });
        }
        if self.point_channels < 3 {
            return Err(ConfigError::TooFewChannels(self.point_channels));
        }
        if self.scales.is_empty() {
            return Err(ConfigError::NoScales);
        }
        let strides: Vec<usize> = self.scales.iter().map(|s| s.stride).collect();
        if strides.windows(2).any(|w| w[0] > w[1]) || strides[0] == 0 {
            return Err(ConfigError::UnorderedStrides(strides));
        }
        for (index, scale) in self.scales.iter().enumerate() {
            if scale.radius <= 0.0 || !scale.radius.is_finite() {
                return Err(ConfigError::NonPositiveRadius {
                    index,
                    radius: scale.radius,
                });
            }
        }
        if self.roi.grid_resolution == 0 {
            return Err(ConfigError::ZeroParameter {
                name: "roi.grid_resolution",
            });
        }
        if self.roi.radius <= 0.0 || !self.roi.radius.is_finite() {
            return Err(ConfigError::NonPositiveRoiRadius(self.roi.radius));
        }
        Ok(())
    }

    /// Stride of the final backbone scale, used by the BEV gatherer.
    pub fn final_stride(&self) -> usize {
        self.scales.last().map(|s| s.stride).unwrap_or(1)
    }

    /// Total fused channel count excluding the BEV contribution.
    pub fn scale_channels(&self) -> usize {
        self.scales.iter().map(|s| s.out_channels).sum()
    }
}
