//! 概率脑图谱及其脑区索引.
//!
//! 图谱是一个 `(x, y, z, channel)` 的四维概率体, 第 `c` 个通道记录了各体素属于第 `c`
//! 个脑区的可能性 (0 ~ 100). 图谱在进程内只加载一次, 此后只读.

use std::fs;
use std::path::Path;

use ndarray::{Array4, ArrayView3, Axis};
use nifti::{IntoNdArray, NiftiHeader, NiftiObject, ReaderOptions};

use crate::consts::BACKGROUND_LABEL;
use crate::data::{Affine, BoxedHeader, Grid, GridAttr};
use crate::error::{RoiError, RoiResult};

pub mod region;
pub mod threshold;

pub use region::{AtlasIndex, Region, HARVARD_OXFORD_COMPOSITES};
pub use threshold::{build_mask, MaskBuilder};

/// 只读的概率图谱.
#[derive(Debug, Clone)]
pub struct Atlas {
    header: Option<BoxedHeader>,
    affine: Affine,
    maps: Array4<f32>,
    labels: Vec<String>,
}

impl GridAttr for Atlas {
    #[inline]
    fn grid(&self) -> Grid {
        let (x, y, z, _) = self.maps.dim();
        Grid::new([x, y, z], self.affine)
    }
}

impl Atlas {
    /// 由概率体和标签列表创建图谱. `labels` 不包含背景,
    /// 且长度必须与通道数一致, 否则返回 `Err(RoiError::AtlasLabelMismatch)`.
    pub fn new(maps: Array4<f32>, labels: Vec<String>, affine: Affine) -> RoiResult<Self> {
        let channels = maps.len_of(Axis(3));
        if channels != labels.len() {
            return Err(RoiError::AtlasLabelMismatch {
                channels,
                labels: labels.len(),
            });
        }
        Ok(Self {
            header: None,
            affine,
            maps,
            labels,
        })
    }

    /// 从四维 nifti 概率体文件和逐行标签文件加载图谱.
    ///
    /// 标签文件每行一个标签, 空行被忽略. 若第一个标签为 [`BACKGROUND_LABEL`],
    /// 则将其视为保留的背景标签并跳过.
    pub fn open<P: AsRef<Path>, Q: AsRef<Path>>(maps_path: P, labels_path: Q) -> RoiResult<Self> {
        let obj = ReaderOptions::new().read_file(maps_path.as_ref())?;
        let header = obj.header().clone();
        let affine = Affine::from_header(&header);
        let maps = obj.into_volume().into_ndarray::<f32>()?;
        let ndim = maps.ndim();
        let maps = maps
            .into_dimensionality()
            .map_err(|_| RoiError::UnexpectedDimensionality(ndim))?;

        let labels = parse_labels(&fs::read_to_string(labels_path.as_ref())?);
        log::debug!(
            "atlas loaded from {:?}: {} labels",
            maps_path.as_ref(),
            labels.len()
        );

        let mut atlas = Self::new(maps, labels, affine)?;
        atlas.header = Some(Box::new(header));
        Ok(atlas)
    }

    /// 图谱标签, 按通道顺序排列, 不含背景.
    #[inline]
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// 概率通道个数.
    #[inline]
    pub fn len_channels(&self) -> usize {
        self.labels.len()
    }

    /// 来源 header (如果有).
    #[inline]
    pub fn header(&self) -> Option<&NiftiHeader> {
        self.header.as_deref()
    }

    /// 获取第 `channel` 个通道的概率平面.
    ///
    /// 通道越界时返回 `Err(RoiError::ChannelOutOfRange)`.
    pub fn channel(&self, channel: usize) -> RoiResult<ArrayView3<'_, f32>> {
        let len = self.len_channels();
        if channel >= len {
            return Err(RoiError::ChannelOutOfRange { channel, len });
        }
        Ok(self.maps.index_axis(Axis(3), channel))
    }

    /// 构建该图谱上的脑区索引, 并注册 Harvard-Oxford 复合脑区.
    #[inline]
    pub fn harvard_oxford_index(&self) -> RoiResult<AtlasIndex> {
        AtlasIndex::harvard_oxford(&self.labels)
    }
}

/// 解析逐行标签文本. 去掉首尾空白、空行, 以及首个背景标签.
fn parse_labels(text: &str) -> Vec<String> {
    let mut labels: Vec<String> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect();
    if labels.first().is_some_and(|l| l == BACKGROUND_LABEL) {
        labels.remove(0);
    }
    labels
}
