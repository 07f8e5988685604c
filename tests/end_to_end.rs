//! Full-pipeline integration tests with stub collaborators.

use anyhow::Result;

use pv_fusion::test_utils::{
    make_random_proposals, make_uniform_cloud, StubBackbone, StubSetAbstraction,
};
use pv_fusion::{
    BoxProposal, FusionConfig, FusionError, FusionPipeline, GridBounds, GridSpec, RoiPoolConfig,
    ScaleConfig, SetAbstraction,
};

fn scenario_config() -> FusionConfig {
    FusionConfig {
        voxel_size: [0.25, 0.25, 0.5],
        grid_bounds: GridBounds::new([0.0, 0.0, 0.0], [50.0, 50.0, 50.0]),
        max_voxels: 40_000,
        max_points_per_voxel: 5,
        num_keypoints: 2048,
        point_channels: 4,
        scales: vec![
            ScaleConfig {
                radius: 0.4,
                max_neighbors: 16,
                out_channels: 32,
                stride: 1,
            },
            ScaleConfig {
                radius: 1.6,
                max_neighbors: 16,
                out_channels: 64,
                stride: 4,
            },
            ScaleConfig {
                radius: 3.2,
                max_neighbors: 32,
                out_channels: 128,
                stride: 8,
            },
        ],
        roi: RoiPoolConfig {
            grid_resolution: 6,
            radius: 1.0,
        },
    }
}

fn scenario_pipeline(config: &FusionConfig) -> Result<FusionPipeline> {
    let grid = GridSpec::new(config);
    // (C=128, D=2) dense volume: 256 BEV channels at the final stride.
    let backbone = StubBackbone::new(grid, &config.scales, 128, 2);
    let extractors: Vec<Box<dyn SetAbstraction>> = config
        .scales
        .iter()
        .map(|s| Box::new(StubSetAbstraction::new(*s)) as Box<dyn SetAbstraction>)
        .collect();
    Ok(FusionPipeline::builder()
        .config(config.clone())
        .backbone(Box::new(backbone))
        .extractors(extractors)
        .build()?)
}

#[test]
fn test_end_to_end_scenario_shapes() -> Result<()> {
    let config = scenario_config();
    let pipeline = scenario_pipeline(&config)?;

    let cloud = make_uniform_cloud(
        120_000,
        4,
        [0.0, 0.0, 0.0],
        [50.0, 50.0, 50.0],
        0xC0FFEE,
    );
    let proposals = make_random_proposals(25, [50.0, 50.0, 50.0], 0xBEEF);

    let out = pipeline.forward(cloud.view(), &proposals)?;

    // 32 + 64 + 128 scale channels plus 128 * 2 BEV channels.
    assert_eq!(out.descriptors.shape(), &[2048, 480]);
    assert_eq!(out.keypoints.len(), 2048);
    assert_eq!(out.pooled.shape(), &[25, 216, 480]);

    // 120k points into a capped 40k-voxel grid: overflow is expected,
    // deterministic, and reported rather than raised.
    assert!(out.drop_stats.full_grid > 0);
    assert!(out.pooled.iter().all(|v| v.is_finite()));
    Ok(())
}

#[test]
fn test_channel_invariant_holds_for_other_widths() -> Result<()> {
    let mut config = scenario_config();
    config.num_keypoints = 256;
    config.scales[0].out_channels = 7;
    config.scales[1].out_channels = 13;
    config.scales[2].out_channels = 19;

    let grid = GridSpec::new(&config);
    let backbone = StubBackbone::new(grid, &config.scales, 5, 3); // 15 BEV channels
    let extractors: Vec<Box<dyn SetAbstraction>> = config
        .scales
        .iter()
        .map(|s| Box::new(StubSetAbstraction::new(*s)) as Box<dyn SetAbstraction>)
        .collect();
    let pipeline = FusionPipeline::builder()
        .config(config.clone())
        .backbone(Box::new(backbone))
        .extractors(extractors)
        .build()?;

    let cloud = make_uniform_cloud(5_000, 4, [0.0, 0.0, 0.0], [50.0, 50.0, 50.0], 21);
    let out = pipeline.forward(cloud.view(), &[])?;

    assert_eq!(out.descriptors.shape(), &[256, 7 + 13 + 19 + 15]);
    Ok(())
}

#[test]
fn test_degenerate_box_still_pools() -> Result<()> {
    let mut config = scenario_config();
    config.num_keypoints = 128;
    let pipeline = scenario_pipeline(&config)?;

    let cloud = make_uniform_cloud(2_000, 4, [0.0, 0.0, 0.0], [50.0, 50.0, 50.0], 33);
    let proposals = vec![BoxProposal {
        center: [25.0, 25.0, 25.0],
        size: [0.0, 0.0, 0.0],
        heading: 1.2,
    }];

    let out = pipeline.forward(cloud.view(), &proposals)?;
    assert_eq!(out.pooled.shape(), &[1, 216, 480]);
    assert!(out.pooled.iter().all(|v| v.is_finite()));
    Ok(())
}

#[test]
fn test_cloud_outside_bounds_degrades_without_error() -> Result<()> {
    let mut config = scenario_config();
    config.num_keypoints = 64;
    let pipeline = scenario_pipeline(&config)?;

    // Every point is outside the grid: zero voxels, zero scale features.
    // The pass still completes and the BEV stage still samples the volume.
    let cloud = make_uniform_cloud(500, 4, [100.0, 100.0, 100.0], [120.0, 120.0, 120.0], 55);
    let proposals = make_random_proposals(2, [50.0, 50.0, 50.0], 3);

    let out = pipeline.forward(cloud.view(), &proposals)?;
    assert_eq!(out.descriptors.shape(), &[64, 480]);
    assert_eq!(out.drop_stats.out_of_bounds, 500);
    Ok(())
}

#[test]
fn test_too_few_points_is_fatal() {
    let config = scenario_config();
    let pipeline = scenario_pipeline(&config).unwrap();

    let cloud = make_uniform_cloud(100, 4, [0.0, 0.0, 0.0], [50.0, 50.0, 50.0], 1);
    let result = pipeline.forward(cloud.view(), &[]);
    assert!(matches!(
        result,
        Err(FusionError::InsufficientPoints {
            available: 100,
            requested: 2048
        })
    ));
}
