//! 程序运行函数.

use crate::result::SweepResult;
use brain_roi::atlas::build_mask;
use brain_roi::{AtlasIndex, GridAttr, RoiResult};
use std::thread;
use utils::loader;

/// 阈值扫描步长.
const STEP: usize = 5;

/// 实际运行. 对脑区 `region` 在每个阈值下构建掩码并统计体素数.
pub fn run(region: &str) -> RoiResult<SweepResult> {
    let atlas = loader::atlas_from_env_or_home()?;
    let index = AtlasIndex::harvard_oxford(atlas.labels())?;
    let channels = index.get_region_channels(region)?;

    // 0, 5, ..., 100.
    let thresholds: Vec<f32> = (0..=100).step_by(STEP).map(|t| t as f32).collect();

    println!("Running threshold sweep for `{region}`...");
    let chunk = thresholds.len().div_ceil(utils::cpus().max(1));
    let counts = thread::scope(|s| {
        let handles: Vec<_> = thresholds
            .chunks(chunk)
            .map(|ts| {
                let atlas = &atlas;
                s.spawn(move || {
                    ts.iter()
                        .map(|&t| build_mask(atlas, channels, t).map(|m| (t, m.count())))
                        .collect::<RoiResult<Vec<_>>>()
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|th| th.join().expect("Thread joining error"))
            .collect::<RoiResult<Vec<_>>>()
    })?;

    Ok(SweepResult::new(
        region,
        channels.len(),
        atlas.voxel_volume(),
        counts.into_iter().flatten(),
    ))
}
