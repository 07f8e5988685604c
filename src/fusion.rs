//! Per-keypoint feature fusion across scales.
//!
//! Each grouping stage contributes one `(K, Cs)` table: the synthetic
//! raw-point stage first, then one stage per backbone scale, then the BEV
//! table. Rows align positionally with the keypoint order, and the fused
//! descriptor is the channel-wise concatenation in stage order.

use ndarray::{concatenate, Array2, ArrayView2, Axis};

use crate::backbone::{ScaleFeatures, SetAbstraction};
use crate::config::ScaleConfig;
use crate::error::FusionError;

/// Fuse per-scale and BEV features into one descriptor table `(K, total)`.
///
/// The raw cloud acts as stage 0: its xyz columns are the centers and any
/// auxiliary channels are the features, transposed to the channel-major
/// layout the set-abstraction contract expects. Backbone scales follow
/// positionally; `extractors[i]` serves `scales_cfg[i]`.
///
/// Invariant: the fused channel count equals the sum of configured
/// per-stage `out_channels` plus the BEV width. Any extractor output that
/// breaks its configured shape is a contract error naming the stage.
pub fn fuse_keypoint_features(
    points: ArrayView2<f32>,
    backbone_scales: &[ScaleFeatures],
    bev_features: &Array2<f32>,
    keypoints: &[[f32; 3]],
    extractors: &[Box<dyn SetAbstraction>],
    scales_cfg: &[ScaleConfig],
) -> Result<Array2<f32>, FusionError> {
    if extractors.len() != scales_cfg.len() {
        return Err(FusionError::Contract(format!(
            "{} extractors for {} configured scales",
            extractors.len(),
            scales_cfg.len()
        )));
    }
    if backbone_scales.len() + 1 != scales_cfg.len() {
        return Err(FusionError::Contract(format!(
            "backbone returned {} scales, expected {}",
            backbone_scales.len(),
            scales_cfg.len() - 1
        )));
    }

    let k = keypoints.len();

    // Stage 0: raw points. xyz are the centers, the remaining channels
    // the features.
    let raw_centers: Vec<[f32; 3]> = points
        .rows()
        .into_iter()
        .map(|row| [row[0], row[1], row[2]])
        .collect();
    let raw_features = points.slice(ndarray::s![.., 3..]).t().to_owned();

    let mut tables: Vec<Array2<f32>> = Vec::with_capacity(scales_cfg.len() + 1);
    for (index, (extractor, cfg)) in extractors.iter().zip(scales_cfg).enumerate() {
        let table = if index == 0 {
            extractor.extract(&raw_centers, raw_features.view(), keypoints)?
        } else {
            let scale = &backbone_scales[index - 1];
            // Transpose at the seam: storage is row-major per element,
            // the collaborator wants channel-major.
            extractor.extract(&scale.centers, scale.features.t(), keypoints)?
        };
        if table.nrows() != k || table.ncols() != cfg.out_channels {
            return Err(FusionError::Contract(format!(
                "stage {index} produced a ({}, {}) table, expected ({k}, {})",
                table.nrows(),
                table.ncols(),
                cfg.out_channels
            )));
        }
        tables.push(table);
    }

    if bev_features.nrows() != k {
        return Err(FusionError::Contract(format!(
            "BEV table has {} rows, expected {k}",
            bev_features.nrows()
        )));
    }
    tables.push(bev_features.clone());

    let views: Vec<ArrayView2<f32>> = tables.iter().map(|t| t.view()).collect();
    concatenate(Axis(1), &views).map_err(|e| FusionError::Contract(format!("fused concat: {e}")))
}
