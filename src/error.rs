//! Error types for the fusion pipeline.
//!
//! Only genuinely fatal conditions are errors: malformed configuration,
//! too few points to sample the requested keypoints, and collaborator
//! outputs that violate their shape contracts. Degenerate-but-valid
//! situations (empty voxel set, empty ball-query neighborhoods, capacity
//! overflow) are not errors; they degrade to well-defined zero or empty
//! outputs and are reported through [`DropStats`](crate::voxel::DropStats)
//! and `tracing` diagnostics.

use thiserror::Error;

/// Fatal errors surfaced by the fusion pipeline.
#[derive(Error, Debug)]
pub enum FusionError {
    /// Malformed configuration, rejected before any computation.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Fewer raw points than requested keypoints. Never silently padded.
    #[error("not enough points for keypoint sampling: have {available}, need {requested}")]
    InsufficientPoints { available: usize, requested: usize },

    /// Input cloud width disagrees with the configured channel count.
    #[error("input point cloud has {got} channels, configuration expects {expected}")]
    ChannelMismatch { got: usize, expected: usize },

    /// A collaborator (sparse backbone or set-abstraction module) returned
    /// output violating its documented shape contract.
    #[error("collaborator contract violation: {0}")]
    Contract(String),
}

/// Configuration validation failures.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("voxel size must be positive on every axis, got {0:?}")]
    NonPositiveVoxelSize([f32; 3]),

    #[error("grid bounds must satisfy min < max per axis, got min {min:?} max {max:?}")]
    InvalidBounds { min: [f32; 3], max: [f32; 3] },

    #[error("{name} must be non-zero")]
    ZeroParameter { name: &'static str },

    #[error("point cloud must carry at least 3 spatial channels, got {0}")]
    TooFewChannels(usize),

    #[error("at least one feature scale must be configured")]
    NoScales,

    #[error("scale strides must be non-decreasing, got {0:?}")]
    UnorderedStrides(Vec<usize>),

    #[error("scale {index}: ball-query radius must be positive, got {radius}")]
    NonPositiveRadius { index: usize, radius: f32 },

    #[error("ROI ball-query radius must be positive, got {0}")]
    NonPositiveRoiRadius(f32),
}
