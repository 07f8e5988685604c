//! Voxel feature extraction by masked averaging.

use ndarray::Array2;

use super::voxelizer::SparseVoxels;

/// Reduce each voxel's accumulated point features to their element-wise mean.
///
/// The voxelizer only ever sums the points it actually accepted, so the
/// mean is the sum divided by `max(occupancy, 1)`; slots beyond the true
/// occupancy never entered the sum. A zero-occupancy voxel yields the zero
/// vector. Pure function, no learned state.
pub fn extract_voxel_features(voxels: &SparseVoxels) -> Array2<f32> {
    let mut features = voxels.feature_sums.clone();
    for (mut row, &occ) in features.rows_mut().into_iter().zip(&voxels.occupancy) {
        let inv = 1.0 / occ.max(1) as f32;
        row.mapv_inplace(|v| v * inv);
    }
    features
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voxel::DropStats;
    use approx::assert_relative_eq;
    use ndarray::array;

    fn voxels_from(sums: Array2<f32>, occupancy: Vec<u32>) -> SparseVoxels {
        let coordinates = (0..occupancy.len()).map(|i| [0, 0, 0, i as i32]).collect();
        SparseVoxels {
            feature_sums: sums,
            coordinates,
            occupancy,
            drop_stats: DropStats::default(),
        }
    }

    #[test]
    fn test_mean_over_occupied_points() {
        let voxels = voxels_from(array![[3.0, 6.0, 9.0], [4.0, 4.0, 4.0]], vec![3, 2]);
        let features = extract_voxel_features(&voxels);

        assert_relative_eq!(features[(0, 0)], 1.0);
        assert_relative_eq!(features[(0, 1)], 2.0);
        assert_relative_eq!(features[(0, 2)], 3.0);
        assert_relative_eq!(features[(1, 0)], 2.0);
    }

    #[test]
    fn test_zero_occupancy_yields_zero_vector() {
        let voxels = voxels_from(array![[0.0, 0.0, 0.0]], vec![0]);
        let features = extract_voxel_features(&voxels);
        assert_eq!(features, array![[0.0, 0.0, 0.0]]);
    }

    #[test]
    fn test_single_point_passes_through() {
        let voxels = voxels_from(array![[1.5, -2.0, 0.25, 7.0]], vec![1]);
        let features = extract_voxel_features(&voxels);
        assert_eq!(features, array![[1.5, -2.0, 0.25, 7.0]]);
    }
}
