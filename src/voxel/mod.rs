//! Sparse voxel grid construction.
//!
//! Converts an irregular point cloud into the sparse voxel representation
//! the backbone consumes:
//! 1. Bucket points into grid cells, capping per-voxel occupancy and the
//!    total voxel count ([`voxelize`]).
//! 2. Reduce each voxel's points to one feature vector by masked
//!    averaging ([`extract_voxel_features`]).
//!
//! Grid geometry, including the canonical reversed-and-padded backbone
//! shape, lives in [`types::GridSpec`].

pub mod types;
pub mod vfe;
pub mod voxelizer;

pub use types::{GridSpec, VoxelCoord};
pub use vfe::extract_voxel_features;
pub use voxelizer::{voxelize, DropStats, SparseVoxels};
