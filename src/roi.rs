//! ROI grid pooling over box proposals.
//!
//! Each proposal gets a fixed R×R×R lattice of grid points spanning its
//! extents. Grid points are placed in box-local coordinates, rotated by
//! the box heading and translated to world space, and each one max-pools
//! the fused descriptors of the keypoints inside its ball-query radius.
//! Boxes are fully independent, so the pooling is data-parallel per box.

use nalgebra::{Rotation3, Vector3};
use ndarray::{Array2, Array3};
use rayon::prelude::*;

use crate::config::RoiPoolConfig;
use crate::error::FusionError;
use crate::search::PointSearch;

/// One 3D box proposal: center, extents, and heading about +Z.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoxProposal {
    pub center: [f32; 3],
    pub size: [f32; 3],
    pub heading: f32,
}

impl BoxProposal {
    /// World coordinates of this box's `resolution³` grid points.
    ///
    /// Grid points sit at the cell centers of a regular lattice spanning
    /// the box: local offset `((i + 0.5) / R - 0.5) * size` per axis,
    /// rotated by the heading and translated by the box center. The
    /// flattened order is x-major, then y, then z, and is part of the
    /// output layout. A zero-size box collapses every grid point onto the
    /// center, which is degenerate but valid.
    pub fn grid_points(&self, resolution: usize) -> Vec<[f32; 3]> {
        let r = resolution;
        let rot = Rotation3::from_axis_angle(&Vector3::z_axis(), self.heading);
        let mut points = Vec::with_capacity(r * r * r);
        for i in 0..r {
            for j in 0..r {
                for k in 0..r {
                    let local = Vector3::new(
                        ((i as f32 + 0.5) / r as f32 - 0.5) * self.size[0],
                        ((j as f32 + 0.5) / r as f32 - 0.5) * self.size[1],
                        ((k as f32 + 0.5) / r as f32 - 0.5) * self.size[2],
                    );
                    let world = rot * local + Vector3::from(self.center);
                    points.push([world.x, world.y, world.z]);
                }
            }
        }
        points
    }
}

/// Pools fused keypoint descriptors onto per-box grids.
#[derive(Debug, Clone, Copy)]
pub struct RoiGridPool {
    config: RoiPoolConfig,
}

impl RoiGridPool {
    pub fn new(config: RoiPoolConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RoiPoolConfig {
        &self.config
    }

    /// Pool descriptors for every proposal.
    ///
    /// Returns `(num_boxes, R³, channels)`. A grid point with no keypoint
    /// within the radius yields the zero vector; an empty keypoint set
    /// therefore yields an all-zero output rather than an error.
    ///
    /// # Arguments
    /// * `proposals` - Box proposals, processed independently
    /// * `keypoints` - Keypoint positions, row-aligned with `descriptors`
    /// * `descriptors` - Fused `(K, C)` descriptor table
    pub fn pool(
        &self,
        proposals: &[BoxProposal],
        keypoints: &[[f32; 3]],
        descriptors: &Array2<f32>,
    ) -> Result<Array3<f32>, FusionError> {
        if keypoints.len() != descriptors.nrows() {
            return Err(FusionError::Contract(format!(
                "{} keypoints but {} descriptor rows",
                keypoints.len(),
                descriptors.nrows()
            )));
        }

        let resolution = self.config.grid_resolution;
        let cells = resolution * resolution * resolution;
        let channels = descriptors.ncols();
        let radius = self.config.radius;

        // One shared index over the keypoints; None means every query is
        // an empty neighborhood.
        let search = PointSearch::from_points(keypoints);

        let box_blocks: Vec<Vec<f32>> = proposals
            .par_iter()
            .map(|proposal| {
                let mut block = vec![0.0f32; cells * channels];
                let Some(search) = search.as_ref() else {
                    return block;
                };
                for (cell, grid_point) in proposal.grid_points(resolution).iter().enumerate() {
                    let neighbors = search.within(grid_point, radius);
                    if neighbors.is_empty() {
                        continue;
                    }
                    let out = &mut block[cell * channels..(cell + 1) * channels];
                    for (o, &v) in out.iter_mut().zip(descriptors.row(neighbors[0]).iter()) {
                        *o = v;
                    }
                    for &n in &neighbors[1..] {
                        let row = descriptors.row(n);
                        for (o, &v) in out.iter_mut().zip(row.iter()) {
                            if v > *o {
                                *o = v;
                            }
                        }
                    }
                }
                block
            })
            .collect();

        let mut flat = Vec::with_capacity(proposals.len() * cells * channels);
        for block in box_blocks {
            flat.extend(block);
        }
        Array3::from_shape_vec((proposals.len(), cells, channels), flat)
            .map_err(|e| FusionError::Contract(format!("pooled table shape: {e}")))
    }
}
