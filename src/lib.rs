//! Point-voxel feature fusion for 3D point cloud detection pipelines.
//!
//! This library fuses three geometric views of one LiDAR cloud - the raw
//! points, a sparse voxel grid, and a dense bird's-eye-view plane - into a
//! single descriptor per sampled keypoint, then pools those descriptors
//! onto a regular grid inside each 3D box proposal.
//!
//! # Architecture
//!
//! One forward pass runs the stages in strict order:
//! 1. Voxelization: bucket points into a capped sparse grid
//! 2. Voxel feature extraction: masked averaging per voxel
//! 3. Sparse backbone (injected): multi-scale sparse features + one dense volume
//! 4. Keypoint sampling: farthest-point sampling over the raw cloud
//! 5. Per-scale grouping (injected set-abstraction modules) + BEV gathering
//! 6. Descriptor fusion: channel-wise concatenation in scale order
//! 7. ROI grid pooling: ball query + max pool per box grid point
//!
//! The backbone and set-abstraction modules are opaque learned transforms
//! behind trait contracts; any conformant implementation can be plugged in.
//!
//! # Usage
//!
//! ```ignore
//! use pv_fusion::{FusionConfig, FusionPipeline};
//!
//! let pipeline = FusionPipeline::builder()
//!     .config(FusionConfig::default())
//!     .backbone(my_backbone)
//!     .extractors(my_extractors)
//!     .build()?;
//!
//! let output = pipeline.forward(cloud.view(), &proposals)?;
//! // output.pooled: (num_boxes, R^3, total_channels)
//! ```

pub mod backbone;
pub mod bev;
pub mod config;
pub mod error;
pub mod fusion;
pub mod pipeline;
pub mod roi;
pub mod sampling;
pub mod search;
pub mod test_utils;
pub mod voxel;

pub use backbone::{BackboneOutput, DenseVolume, ScaleFeatures, SetAbstraction, SparseBackbone};
pub use bev::BevGatherer;
pub use config::{FusionConfig, GridBounds, RoiPoolConfig, ScaleConfig};
pub use error::{ConfigError, FusionError};
pub use fusion::fuse_keypoint_features;
pub use pipeline::{FusionOutput, FusionPipeline, FusionPipelineBuilder};
pub use roi::{BoxProposal, RoiGridPool};
pub use sampling::{farthest_point_sample, Keypoints};
pub use search::PointSearch;
pub use voxel::{extract_voxel_features, voxelize, DropStats, GridSpec, SparseVoxels, VoxelCoord};
