//! Bird's-eye-view feature gathering.
//!
//! The final dense volume is the only place where coarse global context
//! survives the sparse representation, so each keypoint samples it once:
//! the depth axis is collapsed into channels, giving a `(C·D, H, W)`
//! plane, the keypoint's world xy is converted to fractional image
//! coordinates at the final backbone stride, normalized to `[-1, +1]`
//! over the clamp extent `(W-1, H-1)`, and the plane is bilinearly
//! interpolated at the pixel position that normalized coordinate selects,
//! with border-clamped taps.

use ndarray::Array2;
use rayon::prelude::*;

use crate::backbone::DenseVolume;
use crate::error::FusionError;
use crate::voxel::GridSpec;

/// Gathers per-keypoint features from the dense BEV plane.
#[derive(Debug, Clone, Copy)]
pub struct BevGatherer {
    origin: [f32; 2],
    voxel_size: [f32; 2],
    stride: usize,
}

impl BevGatherer {
    /// Build a gatherer for the grid geometry and final backbone stride.
    pub fn new(spec: &GridSpec, final_stride: usize) -> Self {
        Self {
            origin: [spec.origin[0], spec.origin[1]],
            voxel_size: [spec.voxel_size[0], spec.voxel_size[1]],
            stride: final_stride.max(1),
        }
    }

    /// Fractional image coordinates `(x, y)` of a keypoint, clamped to
    /// the valid pixel range.
    ///
    /// Keypoints that project outside the plane clamp to the border pixel
    /// rather than being dropped: a sampled keypoint always gets a BEV
    /// feature.
    fn image_index(&self, keypoint: &[f32; 3], height: usize, width: usize) -> (f32, f32) {
        let sx = self.voxel_size[0] * self.stride as f32;
        let sy = self.voxel_size[1] * self.stride as f32;
        let x = (keypoint[0] - self.origin[0]) / sx;
        let y = (keypoint[1] - self.origin[1]) / sy;
        (
            x.clamp(0.0, (width - 1) as f32),
            y.clamp(0.0, (height - 1) as f32),
        )
    }

    /// Sample the collapsed volume at every keypoint.
    ///
    /// Returns a `(K, C·D)` table aligned with the keypoint order.
    pub fn gather(
        &self,
        volume: &DenseVolume,
        keypoints: &[[f32; 3]],
    ) -> Result<Array2<f32>, FusionError> {
        let (c, d, h, w) = volume.shape();
        if c * d == 0 || h == 0 || w == 0 {
            return Err(FusionError::Contract(format!(
                "dense volume has a zero dimension: (C={c}, D={d}, H={h}, W={w})"
            )));
        }
        let channels = c * d;
        let data = volume.data();

        let rows: Vec<Vec<f32>> = keypoints
            .par_iter()
            .map(|kp| {
                let (ix, iy) = self.image_index(kp, h, w);
                // Normalization spans the clamp extent, the sampler spans
                // the full plane: an in-range index i lands at the pixel
                // position i·(W-1)/(W-2), taps border-clamped.
                let xn = normalize_index(ix, w - 1);
                let yn = normalize_index(iy, h - 1);

                let x = sample_position(xn, w).clamp(0.0, (w - 1) as f32);
                let y = sample_position(yn, h).clamp(0.0, (h - 1) as f32);
                let x0 = x.floor() as usize;
                let y0 = y.floor() as usize;
                let x1 = (x0 + 1).min(w - 1);
                let y1 = (y0 + 1).min(h - 1);
                let tx = x - x0 as f32;
                let ty = y - y0 as f32;

                let w00 = (1.0 - tx) * (1.0 - ty);
                let w10 = tx * (1.0 - ty);
                let w01 = (1.0 - tx) * ty;
                let w11 = tx * ty;

                let mut row = Vec::with_capacity(channels);
                for ci in 0..c {
                    for di in 0..d {
                        let v = w00 * data[(0, ci, di, y0, x0)]
                            + w10 * data[(0, ci, di, y0, x1)]
                            + w01 * data[(0, ci, di, y1, x0)]
                            + w11 * data[(0, ci, di, y1, x1)];
                        row.push(v);
                    }
                }
                row
            })
            .collect();

        let mut flat = Vec::with_capacity(keypoints.len() * channels);
        for row in rows {
            flat.extend(row);
        }
        Array2::from_shape_vec((keypoints.len(), channels), flat)
            .map_err(|e| FusionError::Contract(format!("BEV table shape: {e}")))
    }
}

/// Map an index in `[0, dim-1]` to the normalized range `[-1, +1]`.
///
/// `idx = 0` maps to exactly -1 and `idx = dim-1` to exactly +1. The
/// gatherer passes the clamp extent `W-1` as `dim`, so clamped indices
/// may normalize slightly past +1; the sampler clamps the resulting
/// position back to the plane.
pub(crate) fn normalize_index(idx: f32, dim: usize) -> f32 {
    if dim > 1 {
        2.0 * idx / (dim - 1) as f32 - 1.0
    } else {
        -1.0
    }
}

/// Pixel position a normalized coordinate samples on a plane of `extent`
/// pixels: -1 lands on pixel 0 and +1 on pixel `extent - 1`.
pub(crate) fn sample_position(norm: f32, extent: usize) -> f32 {
    if extent > 1 {
        (norm + 1.0) * 0.5 * (extent - 1) as f32
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FusionConfig, GridBounds};
    use approx::assert_relative_eq;
    use ndarray::Array5;

    fn test_spec() -> GridSpec {
        // 16 x 8 voxels in xy at size 1.0, so the stride-1 BEV plane is
        // W=16, H=8.
        let config = FusionConfig {
            voxel_size: [1.0, 1.0, 1.0],
            grid_bounds: GridBounds::new([0.0, 0.0, 0.0], [16.0, 8.0, 4.0]),
            ..Default::default()
        };
        GridSpec::new(&config)
    }

    fn constant_volume(value: f32, c: usize, d: usize, h: usize, w: usize) -> DenseVolume {
        DenseVolume::new(Array5::from_elem((1, c, d, h, w), value)).unwrap()
    }

    #[test]
    fn test_normalize_endpoints_are_exact() {
        for dim in [2usize, 7, 25, 200] {
            assert_relative_eq!(normalize_index(0.0, dim), -1.0);
            assert_relative_eq!(normalize_index((dim - 1) as f32, dim), 1.0);
        }
    }

    #[test]
    fn test_sample_position_inverts_normalization_on_matching_extents() {
        for dim in [2usize, 7, 25, 200] {
            for idx in 0..dim {
                let n = normalize_index(idx as f32, dim);
                assert_relative_eq!(sample_position(n, dim), idx as f32, epsilon = 1e-4);
            }
        }
    }

    #[test]
    fn test_gather_map_stretches_across_the_plane() {
        // Plane width 16: normalization spans the 15-slot clamp extent,
        // sampling spans all 16 pixels, so index i lands at i * 15 / 14.
        let n = normalize_index(7.0, 15);
        assert_relative_eq!(sample_position(n, 16), 7.0 * 15.0 / 14.0, epsilon = 1e-4);
    }

    #[test]
    fn test_gather_constant_volume() {
        let spec = test_spec();
        let gatherer = BevGatherer::new(&spec, 1);
        let volume = constant_volume(3.5, 4, 2, 8, 16);

        let keypoints = vec![[0.5, 0.5, 0.0], [7.25, 3.75, 1.0], [15.0, 7.0, 2.0]];
        let features = gatherer.gather(&volume, &keypoints).unwrap();

        assert_eq!(features.shape(), &[3, 8]);
        for &v in features.iter() {
            assert_relative_eq!(v, 3.5, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_out_of_range_keypoint_clamps_to_border() {
        let spec = test_spec();
        let gatherer = BevGatherer::new(&spec, 1);

        // Ramp along x so each border has a distinct value.
        let volume = DenseVolume::new(Array5::from_shape_fn((1, 1, 1, 8, 16), |(_, _, _, _, x)| {
            x as f32
        }))
        .unwrap();

        let keypoints = vec![[-100.0, 4.0, 0.0], [1000.0, 4.0, 0.0]];
        let features = gatherer.gather(&volume, &keypoints).unwrap();

        assert_relative_eq!(features[(0, 0)], 0.0, epsilon = 1e-5);
        assert_relative_eq!(features[(1, 0)], 15.0, epsilon = 1e-5);
    }

    #[test]
    fn test_bilinear_interpolation_on_ramp() {
        let spec = test_spec();
        let gatherer = BevGatherer::new(&spec, 1);
        let volume = DenseVolume::new(Array5::from_shape_fn((1, 1, 1, 8, 16), |(_, _, _, _, x)| {
            x as f32
        }))
        .unwrap();

        // Index x = 3.5 samples the ramp at 3.5 * 15 / 14 = 3.75.
        let keypoints = vec![[3.5, 2.0, 0.0]];
        let features = gatherer.gather(&volume, &keypoints).unwrap();
        assert_relative_eq!(features[(0, 0)], 3.75, epsilon = 1e-5);
    }

    #[test]
    fn test_stride_scales_the_projection() {
        let spec = test_spec();
        // Stride 2 halves the plane: W=8, H=4.
        let gatherer = BevGatherer::new(&spec, 2);
        let volume = DenseVolume::new(Array5::from_shape_fn((1, 1, 1, 4, 8), |(_, _, _, _, x)| {
            x as f32
        }))
        .unwrap();

        // World x = 6.0 at stride 2 is index 3, sampled at 3 * 7 / 6 = 3.5.
        let keypoints = vec![[6.0, 2.0, 0.0]];
        let features = gatherer.gather(&volume, &keypoints).unwrap();
        assert_relative_eq!(features[(0, 0)], 3.5, epsilon = 1e-5);
    }

    #[test]
    fn test_channel_count_is_c_times_d() {
        let spec = test_spec();
        let gatherer = BevGatherer::new(&spec, 1);
        let volume = constant_volume(1.0, 32, 8, 8, 16);

        let keypoints = vec![[4.0, 4.0, 0.0]];
        let features = gatherer.gather(&volume, &keypoints).unwrap();
        assert_eq!(features.shape(), &[1, 256]);
    }

    #[test]
    fn test_empty_keypoints_yield_empty_table() {
        let spec = test_spec();
        let gatherer = BevGatherer::new(&spec, 1);
        let volume = constant_volume(1.0, 2, 2, 8, 16);

        let features = gatherer.gather(&volume, &[]).unwrap();
        assert_eq!(features.shape(), &[0, 4]);
    }
}
