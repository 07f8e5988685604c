//! KD-tree based radius search over point sets.
//!
//! Ball queries show up at two seams of the pipeline: the stub grouping
//! stages and ROI grid pooling both need "all keypoints within radius r of
//! a query point". The tree is built once per point set and shared across
//! queries; indices returned always refer to the slice the tree was built
//! from.

use kiddo::immutable::float::kdtree::ImmutableKdTree;
use kiddo::SquaredEuclidean;

/// Bucket size for the KD-tree.
///
/// Larger than the kiddo default so planar LiDAR clouds, where many points
/// share near-identical coordinates on one axis, do not degenerate the
/// tree.
const BUCKET_SIZE: usize = 256;

/// Radius-search index over a fixed set of 3D points.
#[derive(Debug)]
pub struct PointSearch {
    /// Generic args: A=f32 (coordinate), T=u64 (index), K=3 (dims), B=bucket size.
    kdtree: ImmutableKdTree<f32, u64, 3, BUCKET_SIZE>,
}

impl PointSearch {
    /// Build a search index over a point set.
    ///
    /// Returns `None` for an empty set; every query against a missing
    /// index is by definition an empty neighborhood.
    pub fn from_points(points: &[[f32; 3]]) -> Option<Self> {
        if points.is_empty() {
            return None;
        }
        let kdtree: ImmutableKdTree<f32, u64, 3, BUCKET_SIZE> = points.into();
        Some(Self { kdtree })
    }

    /// Indices of all points within `radius` of `point`, nearest first.
    pub fn within(&self, point: &[f32; 3], radius: f32) -> Vec<usize> {
        let radius_sq = radius * radius;
        self.kdtree
            .within::<SquaredEuclidean>(point, radius_sq)
            .iter()
            .map(|nn| nn.item as usize)
            .collect()
    }

    /// Like [`PointSearch::within`], but truncated to the `cap` nearest
    /// neighbors.
    pub fn within_capped(&self, point: &[f32; 3], radius: f32, cap: usize) -> Vec<usize> {
        let mut indices = self.within(point, radius);
        indices.truncate(cap);
        indices
    }

    /// Number of indexed points.
    pub fn len(&self) -> usize {
        self.kdtree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.kdtree.size() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_set_has_no_index() {
        assert!(PointSearch::from_points(&[]).is_none());
    }

    #[test]
    fn test_radius_search_line() {
        let points = vec![
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [2.0, 0.0, 0.0],
            [10.0, 0.0, 0.0],
        ];
        let search = PointSearch::from_points(&points).unwrap();
        assert_eq!(search.len(), 4);

        let hits = search.within(&[0.0, 0.0, 0.0], 1.5);
        assert_eq!(hits.len(), 2);
        assert!(hits.contains(&0));
        assert!(hits.contains(&1));

        let hits = search.within(&[1.0, 0.0, 0.0], 1.5);
        assert_eq!(hits.len(), 3);

        assert!(search.within(&[-5.0, 0.0, 0.0], 1.0).is_empty());
    }

    #[test]
    fn test_results_are_nearest_first() {
        let points = vec![[3.0, 0.0, 0.0], [1.0, 0.0, 0.0], [2.0, 0.0, 0.0]];
        let search = PointSearch::from_points(&points).unwrap();

        let hits = search.within(&[0.0, 0.0, 0.0], 5.0);
        assert_eq!(hits, vec![1, 2, 0]);
    }

    #[test]
    fn test_capped_search_keeps_nearest() {
        let points = vec![
            [1.0, 0.0, 0.0],
            [2.0, 0.0, 0.0],
            [3.0, 0.0, 0.0],
            [4.0, 0.0, 0.0],
        ];
        let search = PointSearch::from_points(&points).unwrap();

        let hits = search.within_capped(&[0.0, 0.0, 0.0], 10.0, 2);
        assert_eq!(hits, vec![0, 1]);
    }

    #[test]
    fn test_3d_neighborhood() {
        let mut points = Vec::new();
        for x in 0..3 {
            for y in 0..3 {
                for z in 0..3 {
                    points.push([x as f32, y as f32, z as f32]);
                }
            }
        }
        let search = PointSearch::from_points(&points).unwrap();

        // Radius 1.1 around the cube center: center + 6 face neighbors.
        let hits = search.within(&[1.0, 1.0, 1.0], 1.1);
        assert_eq!(hits.len(), 7);
    }
}
