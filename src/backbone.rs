//! Collaborator contracts: sparse backbone and set-abstraction modules.
//!
//! Both collaborators are opaque learned transforms injected as trait
//! objects. The crate never inspects their internals; it only enforces the
//! shape contracts documented here, so any conformant implementation can
//! be substituted (including the deterministic stubs in
//! [`test_utils`](crate::test_utils)).

use ndarray::{Array2, Array5, ArrayView2};

use crate::error::FusionError;

/// One backbone scale: sparse voxel centers and their feature rows.
///
/// `features` row `i` belongs to `centers[i]`; scales arrive in
/// increasing-stride order and the ordering is stable within one call.
#[derive(Debug, Clone)]
pub struct ScaleFeatures {
    pub centers: Vec<[f32; 3]>,
    /// `(Ns, Cs)` feature table, one row per center.
    pub features: Array2<f32>,
}

impl ScaleFeatures {
    pub fn len(&self) -> usize {
        self.centers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.centers.is_empty()
    }

    pub fn channels(&self) -> usize {
        self.features.ncols()
    }
}

/// Terminal dense feature volume, `(batch, channel, depth, height, width)`.
///
/// Only the BEV gatherer consumes this; everything else stays sparse.
#[derive(Debug, Clone)]
pub struct DenseVolume {
    data: Array5<f32>,
}

impl DenseVolume {
    /// Wrap a backbone volume, enforcing the unit-batch contract.
    pub fn new(data: Array5<f32>) -> Result<Self, FusionError> {
        if data.shape()[0] != 1 {
            return Err(FusionError::Contract(format!(
                "dense volume must have batch size 1, got {}",
                data.shape()[0]
            )));
        }
        Ok(Self { data })
    }

    pub fn data(&self) -> &Array5<f32> {
        &self.data
    }

    /// `(channels, depth, height, width)` of the unit-batch volume.
    pub fn shape(&self) -> (usize, usize, usize, usize) {
        let s = self.data.shape();
        (s[1], s[2], s[3], s[4])
    }
}

/// Everything the backbone hands back from one forward call.
#[derive(Debug, Clone)]
pub struct BackboneOutput {
    /// Per-scale sparse feature sets, increasing stride.
    pub scales: Vec<ScaleFeatures>,
    /// Final dense volume for BEV gathering.
    pub volume: DenseVolume,
}

/// Sparse 3D backbone contract.
///
/// Accepts per-voxel features plus their `(batch, z, y, x)` integer
/// coordinates and returns the multi-scale sparse outputs and the final
/// dense volume. Learned parameters are read-only shared state, so one
/// instance may serve concurrent forward passes on independent inputs.
pub trait SparseBackbone: Send + Sync {
    fn forward(
        &self,
        features: ArrayView2<f32>,
        coordinates: &[[i32; 4]],
        batch_size: usize,
    ) -> Result<BackboneOutput, FusionError>;
}

/// Set-abstraction (grouping + pooling) module contract.
///
/// `centers` and `features` describe one scale's elements, with `features`
/// in channel-major layout `(Cs, Ns)`; the caller handles all
/// transposition. Returns one feature row per query keypoint, `(K, C')`.
/// Purely functional: no side effects, no retained state.
pub trait SetAbstraction: Send + Sync {
    fn extract(
        &self,
        centers: &[[f32; 3]],
        features: ArrayView2<f32>,
        keypoints: &[[f32; 3]],
    ) -> Result<Array2<f32>, FusionError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array5;

    #[test]
    fn test_dense_volume_requires_unit_batch() {
        let ok = DenseVolume::new(Array5::zeros((1, 4, 2, 8, 8)));
        assert!(ok.is_ok());
        assert_eq!(ok.unwrap().shape(), (4, 2, 8, 8));

        let err = DenseVolume::new(Array5::zeros((2, 4, 2, 8, 8)));
        assert!(matches!(err, Err(FusionError::Contract(_))));
    }

    #[test]
    fn test_scale_features_accessors() {
        let scale = ScaleFeatures {
            centers: vec![[0.0, 0.0, 0.0], [1.0, 1.0, 1.0]],
            features: Array2::zeros((2, 16)),
        };
        assert_eq!(scale.len(), 2);
        assert_eq!(scale.channels(), 16);
        assert!(!scale.is_empty());
    }
}
