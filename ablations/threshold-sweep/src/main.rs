//! 掩码大小对阈值的敏感性分析.
//!
//! 用法: `threshold-sweep [脑区名]`, 默认为 `Prefrontal Cortex`.
//! 图谱目录由 `$BRAIN_ROI_ATLAS_DIR` 指定, 否则为 `$HOME/dataset/atlas`.

use brain_roi::Region;

mod result;
mod runner;

fn main() {
    simple_logger::init_with_level(log::Level::Info).unwrap();

    let region = std::env::args()
        .nth(1)
        .unwrap_or_else(|| Region::PrefrontalCortex.name().to_string());
    match runner::run(&region) {
        Ok(result) => result.analyze().expect("Writing to stdout error"),
        Err(e) => {
            log::error!("threshold sweep failed: {e}");
            std::process::exit(1);
        }
    }
}
