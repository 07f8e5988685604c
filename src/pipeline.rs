//! Top-level fusion pipeline.
//!
//! Wires the stages into one synchronous forward pass:
//! voxelize → VFE → sparse backbone → keypoint sampling → per-scale
//! grouping + BEV gathering → descriptor fusion → ROI grid pooling.
//! Every stage consumes the previous stage's complete output; there are
//! no partial or streaming results. All intermediates are owned by the
//! pass and dropped when it returns.
//!
//! # Usage
//!
//! ```ignore
//! use pv_fusion::FusionPipeline;
//!
//! let pipeline = FusionPipeline::builder()
//!     .config(config)
//!     .backbone(Box::new(my_backbone))
//!     .extractors(my_extractors)
//!     .build()?;
//!
//! let output = pipeline.forward(cloud.view(), &proposals)?;
//! println!("pooled: {:?}", output.pooled.shape());
//! ```

use ndarray::{Array2, Array3, ArrayView2};
use tracing::{debug, warn};

use crate::backbone::{SetAbstraction, SparseBackbone};
use crate::bev::BevGatherer;
use crate::config::FusionConfig;
use crate::error::FusionError;
use crate::fusion::fuse_keypoint_features;
use crate::roi::{BoxProposal, RoiGridPool};
use crate::sampling::farthest_point_sample;
use crate::voxel::{extract_voxel_features, voxelize, DropStats, GridSpec};

/// Result of one forward pass.
#[derive(Debug)]
pub struct FusionOutput {
    /// Pooled ROI features, `(num_boxes, R³, total_channels)`.
    pub pooled: Array3<f32>,
    /// Fused per-keypoint descriptors, `(K, total_channels)`.
    pub descriptors: Array2<f32>,
    /// Sampled keypoint positions, row-aligned with `descriptors`.
    pub keypoints: Vec<[f32; 3]>,
    /// Points the voxelizer discarded (bounds or capacity).
    pub drop_stats: DropStats,
}

/// The fusion pipeline.
///
/// Holds the validated configuration and the injected collaborators.
/// `forward` takes `&self`, so one pipeline may serve concurrent passes
/// on independent inputs; the collaborators' learned parameters are the
/// only cross-call state and are read-only.
pub struct FusionPipeline {
    config: FusionConfig,
    grid: GridSpec,
    backbone: Box<dyn SparseBackbone>,
    extractors: Vec<Box<dyn SetAbstraction>>,
    bev: BevGatherer,
    roi: RoiGridPool,
}

impl FusionPipeline {
    /// Create a pipeline from a configuration and collaborators.
    ///
    /// The configuration is validated up front; one extractor is required
    /// per configured scale (the raw-point stage included).
    pub fn new(
        config: FusionConfig,
        backbone: Box<dyn SparseBackbone>,
        extractors: Vec<Box<dyn SetAbstraction>>,
    ) -> Result<Self, FusionError> {
        config.validate()?;
        if extractors.len() != config.scales.len() {
            return Err(FusionError::Contract(format!(
                "{} extractors provided for {} configured scales",
                extractors.len(),
                config.scales.len()
            )));
        }
        let grid = GridSpec::new(&config);
        let bev = BevGatherer::new(&grid, config.final_stride());
        let roi = RoiGridPool::new(config.roi);
        Ok(Self {
            config,
            grid,
            backbone,
            extractors,
            bev,
            roi,
        })
    }

    /// Create a builder for configuring the pipeline.
    pub fn builder() -> FusionPipelineBuilder {
        FusionPipelineBuilder::new()
    }

    pub fn config(&self) -> &FusionConfig {
        &self.config
    }

    pub fn grid(&self) -> &GridSpec {
        &self.grid
    }

    /// Total fused channel count given the BEV plane width.
    pub fn fused_channels(&self, bev_channels: usize) -> usize {
        self.config.scale_channels() + bev_channels
    }

    /// Run one forward pass over a point cloud and its box proposals.
    ///
    /// # Arguments
    /// * `points` - Raw cloud, `(N, point_channels)` f32
    /// * `proposals` - Box proposals from the external proposal stage
    ///
    /// Fatal conditions (config mismatch, too few points, contract
    /// violations) abort the pass; degenerate regions (empty voxel set,
    /// empty neighborhoods) degrade to zero features for the affected
    /// elements only.
    pub fn forward(
        &self,
        points: ArrayView2<f32>,
        proposals: &[BoxProposal],
    ) -> Result<FusionOutput, FusionError> {
        if points.ncols() != self.config.point_channels {
            return Err(FusionError::ChannelMismatch {
                got: points.ncols(),
                expected: self.config.point_channels,
            });
        }

        let voxels = voxelize(points, &self.grid, &self.config);
        let drop_stats = voxels.drop_stats;
        let voxel_features = extract_voxel_features(&voxels);
        debug!(
            voxels = voxels.len(),
            dropped = drop_stats.total(),
            "voxelization complete"
        );

        let backbone_out = self
            .backbone
            .forward(voxel_features.view(), &voxels.coordinates, 1)?;

        let (_, d, h, w) = backbone_out.volume.shape();
        let (expected_h, expected_w) = self.grid.bev_shape(self.config.final_stride());
        if (h, w) != (expected_h, expected_w) {
            warn!(
                got = ?(h, w),
                expected = ?(expected_h, expected_w),
                "dense volume plane differs from the strided canonical grid shape"
            );
        }
        if d > self.grid.padded_depth() {
            warn!(
                depth = d,
                padded_depth = self.grid.padded_depth(),
                "dense volume is deeper than the padded grid"
            );
        }

        let keypoints = farthest_point_sample(points, self.config.num_keypoints)?;
        let bev_features = self.bev.gather(&backbone_out.volume, &keypoints.xyz)?;
        let descriptors = fuse_keypoint_features(
            points,
            &backbone_out.scales,
            &bev_features,
            &keypoints.xyz,
            &self.extractors,
            &self.config.scales,
        )?;
        let pooled = self.roi.pool(proposals, &keypoints.xyz, &descriptors)?;

        Ok(FusionOutput {
            pooled,
            descriptors,
            keypoints: keypoints.xyz,
            drop_stats,
        })
    }
}

/// Builder for [`FusionPipeline`].
pub struct FusionPipelineBuilder {
    config: FusionConfig,
    backbone: Option<Box<dyn SparseBackbone>>,
    extractors: Vec<Box<dyn SetAbstraction>>,
}

impl FusionPipelineBuilder {
    pub fn new() -> Self {
        Self {
            config: FusionConfig::default(),
            backbone: None,
            extractors: Vec::new(),
        }
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: FusionConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the number of sampled keypoints.
    pub fn num_keypoints(mut self, num_keypoints: usize) -> Self {
        self.config.num_keypoints = num_keypoints;
        self
    }

    /// Set the ROI lattice resolution per axis.
    pub fn grid_resolution(mut self, resolution: usize) -> Self {
        self.config.roi.grid_resolution = resolution;
        self
    }

    /// Set the ROI ball-query radius.
    pub fn roi_radius(mut self, radius: f32) -> Self {
        self.config.roi.radius = radius;
        self
    }

    /// Inject the sparse backbone.
    pub fn backbone(mut self, backbone: Box<dyn SparseBackbone>) -> Self {
        self.backbone = Some(backbone);
        self
    }

    /// Append one set-abstraction extractor (stage order).
    pub fn extractor(mut self, extractor: Box<dyn SetAbstraction>) -> Self {
        self.extractors.push(extractor);
        self
    }

    /// Replace the whole extractor list.
    pub fn extractors(mut self, extractors: Vec<Box<dyn SetAbstraction>>) -> Self {
        self.extractors = extractors;
        self
    }

    /// Build the pipeline, validating the configuration.
    pub fn build(self) -> Result<FusionPipeline, FusionError> {
        let backbone = self
            .backbone
            .ok_or_else(|| FusionError::Contract("no sparse backbone was provided".into()))?;
        FusionPipeline::new(self.config, backbone, self.extractors)
    }
}

impl Default for FusionPipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
