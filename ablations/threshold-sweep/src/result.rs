//! 实验结果.

use std::io::{self, Write};

/// 阈值扫描结果.
pub struct SweepResult {
    region: String,
    channels: usize,
    voxel_volume: f64,
    data: Vec<(f32, usize)>,
}

impl SweepResult {
    /// 由 `(阈值, 体素数)` 序列创建.
    pub fn new<I: IntoIterator<Item = (f32, usize)>>(
        region: &str,
        channels: usize,
        voxel_volume: f64,
        it: I,
    ) -> Self {
        Self {
            region: region.to_string(),
            channels,
            voxel_volume,
            data: it.into_iter().collect(),
        }
    }

    /// 阈值升高时体素数是否单调不增?
    pub fn is_monotonic(&self) -> bool {
        self.data.windows(2).all(|w| w[0].0 <= w[1].0 && w[0].1 >= w[1].1)
    }

    /// 将结果写进 `w` 中.
    fn describe_into<W: Write>(&self, w: &mut W) -> io::Result<()> {
        const S4: &str = "    ";

        writeln!(w, "Region `{}` ({} channels):", self.region, self.channels)?;
        for (t, n) in self.data.iter() {
            writeln!(
                w,
                "{S4}threshold {t:>5.1}: {n:>8} voxels, {:>12.1} mm^3",
                *n as f64 * self.voxel_volume
            )?;
        }
        write!(w, "{S4}Monotonic: {}", self.is_monotonic())?;
        Ok(())
    }

    /// 分析运行结果.
    pub fn analyze(&self) -> io::Result<()> {
        let mut out = io::stdout().lock();
        utils::sep_to(&mut out)?;
        self.describe_into(&mut out)?;
        writeln!(out)?;
        utils::sep_to(&mut out)
    }
}
