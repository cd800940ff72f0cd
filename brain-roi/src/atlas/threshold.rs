//! 概率阈值化: 将图谱通道合成为二值掩码.

use ndarray::{Array3, Zip};

use super::{Atlas, AtlasIndex};
use crate::consts::prob::{self, DEFAULT_THRESHOLD};
use crate::data::{GridAttr, Mask};
use crate::error::RoiResult;

/// 对 `channels` 中每个通道的概率平面做 `probability >= threshold` 判定,
/// 并以逻辑或合并到一个初始全 `false` 的三维掩码中. 通道处理顺序不影响结果.
///
/// 结果掩码携带图谱的仿射矩阵与 header.
/// 任一通道越界时返回 `Err(RoiError::ChannelOutOfRange)`.
pub fn build_mask<'a, I>(atlas: &Atlas, channels: I, threshold: f32) -> RoiResult<Mask>
where
    I: IntoIterator<Item = &'a usize>,
{
    let [x, y, z] = atlas.spatial_shape();
    let mut acc = Array3::from_elem((x, y, z), false);
    for &c in channels {
        let plane = atlas.channel(c)?;
        Zip::from(&mut acc)
            .and(&plane)
            .for_each(|m, &p| *m |= p >= threshold);
    }
    Ok(Mask::new(acc, atlas.affine()).with_header(atlas.header()))
}

/// 按脑区名构建掩码. 阈值可调, 便于做敏感性分析.
#[derive(Debug, Clone, Copy)]
pub struct MaskBuilder<'a> {
    atlas: &'a Atlas,
    index: &'a AtlasIndex,
    threshold: f32,
}

impl<'a> MaskBuilder<'a> {
    /// 使用默认阈值 [`DEFAULT_THRESHOLD`] 创建.
    #[inline]
    pub fn new(atlas: &'a Atlas, index: &'a AtlasIndex) -> Self {
        Self {
            atlas,
            index,
            threshold: DEFAULT_THRESHOLD,
        }
    }

    /// 替换阈值. 超出 `[0, 100]` 的阈值会得到全真或全假的掩码.
    #[inline]
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        if !prob::is_valid(threshold) {
            log::warn!("threshold {threshold} is outside [{}, {}]", prob::MIN, prob::MAX);
        }
        self.threshold = threshold;
        self
    }

    /// 当前阈值.
    #[inline]
    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// 脑区索引.
    #[inline]
    pub fn index(&self) -> &'a AtlasIndex {
        self.index
    }

    /// 图谱.
    #[inline]
    pub fn atlas(&self) -> &'a Atlas {
        self.atlas
    }

    /// 构建脑区 `region` 的二值掩码.
    ///
    /// 未知脑区返回 `Err(RoiError::UnknownRegion)`.
    pub fn build(&self, region: &str) -> RoiResult<Mask> {
        let channels = self.index.get_region_channels(region)?;
        let mask = build_mask(self.atlas, channels, self.threshold)?;
        log::info!(
            "mask `{region}` built at threshold {}: {} voxels from {} channels",
            self.threshold,
            mask.count(),
            channels.len()
        );
        Ok(mask)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Affine;
    use ndarray::{array, Array4};

    /// 标签为 `['Frontal Pole', 'Other1', 'Other2']` 的 2×2×2 图谱.
    fn tiny_atlas() -> Atlas {
        let frontal = array![[[60.0f32, 40.0], [70.0, 10.0]], [[0.0, 0.0], [0.0, 0.0]]];
        let mut maps = Array4::<f32>::zeros((2, 2, 2, 3));
        maps.index_axis_mut(ndarray::Axis(3), 0).assign(&frontal);
        maps.index_axis_mut(ndarray::Axis(3), 2).fill(55.0);
        let labels = ["Frontal Pole", "Other1", "Other2"].map(String::from).to_vec();
        Atlas::new(maps, labels, Affine::from_scaling([2.0, 2.0, 2.0])).unwrap()
    }

    #[test]
    fn test_pfc_example() {
        let atlas = tiny_atlas();
        let index = AtlasIndex::new(atlas.labels(), &[("PFC", &["Frontal Pole"])]).unwrap();
        let mask = MaskBuilder::new(&atlas, &index).build("PFC").unwrap();

        let expected = array![[[true, false], [true, false]], [[false, false], [false, false]]];
        assert_eq!(mask.data(), expected.view());
        assert_eq!(mask.affine(), atlas.affine());
    }

    #[test]
    fn test_threshold_inclusive() {
        let atlas = tiny_atlas();
        let index = AtlasIndex::new(atlas.labels(), &[]).unwrap();
        let mask = MaskBuilder::new(&atlas, &index)
            .with_threshold(60.0)
            .build("Frontal Pole")
            .unwrap();
        assert!(mask[[0, 0, 0]]);
        assert_eq!(mask.count(), 2);
    }

    #[test]
    fn test_or_is_order_free() {
        let atlas = tiny_atlas();
        let a = build_mask(&atlas, &[0, 2], 50.0).unwrap();
        let b = build_mask(&atlas, &[2, 0], 50.0).unwrap();
        assert_eq!(a.data(), b.data());
        // 通道 2 全为 55, 与任意通道取并后全为真.
        assert_eq!(a.count(), 8);
    }

    #[test]
    fn test_threshold_monotonic() {
        let atlas = tiny_atlas();
        let channels = [0usize, 1, 2];
        let mut prev = usize::MAX;
        for t in 0..=100 {
            let n = build_mask(&atlas, &channels, t as f32).unwrap().count();
            assert!(n <= prev, "threshold {t}: {n} > {prev}");
            prev = n;
        }
        assert_eq!(build_mask(&atlas, &channels, 0.0).unwrap().count(), 8);
    }

    #[test]
    fn test_unknown_region_and_bad_channel() {
        let atlas = tiny_atlas();
        let index = AtlasIndex::new(atlas.labels(), &[]).unwrap();
        assert!(MaskBuilder::new(&atlas, &index).build("PFC").is_err());
        assert!(build_mask(&atlas, &[3], 50.0).is_err());
    }
}
