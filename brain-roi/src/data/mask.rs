//! 三维二值掩码.

use std::ops::Index;
use std::path::Path;

use ndarray::{Array3, ArrayView3, Ix3};
use nifti::writer::WriterOptions;
use nifti::{IntoNdArray, NiftiHeader, NiftiObject, ReaderOptions};

use super::{Affine, BoxedHeader, Grid, GridAttr};
use crate::error::{RoiError, RoiResult};

/// 三维二值掩码, 与其来源网格具有相同的空间形状和仿射矩阵.
///
/// 掩码构建完成后只读, 可在多个受试者的加载任务间共享.
#[derive(Debug, Clone)]
pub struct Mask {
    affine: Affine,
    header: Option<BoxedHeader>,
    data: Array3<bool>,
}

impl GridAttr for Mask {
    #[inline]
    fn grid(&self) -> Grid {
        let (x, y, z) = self.data.dim();
        Grid::new([x, y, z], self.affine)
    }
}

impl Index<[usize; 3]> for Mask {
    type Output = bool;

    #[inline]
    fn index(&self, index: [usize; 3]) -> &Self::Output {
        &self.data[index]
    }
}

impl Mask {
    /// 根据裸数据和仿射矩阵直接创建掩码.
    #[inline]
    pub fn new(data: Array3<bool>, affine: Affine) -> Self {
        Self {
            affine,
            header: None,
            data,
        }
    }

    /// 创建指定网格上的全 `false` 掩码.
    #[inline]
    pub fn empty(grid: &Grid) -> Self {
        let [x, y, z] = grid.shape;
        Self::new(Array3::from_elem((x, y, z), false), grid.affine)
    }

    /// 附加 header. 写出 nifti 文件时会以该 header 为模板.
    #[inline]
    pub fn with_header(mut self, header: Option<&NiftiHeader>) -> Self {
        self.header = header.map(|h| Box::new(h.clone()));
        self
    }

    /// 来源 header (如果有).
    #[inline]
    pub fn header(&self) -> Option<&NiftiHeader> {
        self.header.as_deref()
    }

    /// 获得数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayView3<'_, bool> {
        self.data.view()
    }

    /// 消费自我, 获得底层数据.
    #[inline]
    pub fn into_data(self) -> Array3<bool> {
        self.data
    }

    /// 掩码中 `true` 体素的个数.
    #[inline]
    pub fn count(&self) -> usize {
        self.data.iter().filter(|b| **b).count()
    }

    /// 掩码是否全为 `false`?
    #[inline]
    pub fn is_empty(&self) -> bool {
        !self.data.iter().any(|b| *b)
    }

    /// 将掩码以 `u8` (0 / 1) 写出为 nii 或 nii.gz 文件.
    ///
    /// 若掩码携带来源 header, 则以其为模板; 否则使用默认 header.
    /// 两种情况下 sform 都会被设置为 `self.affine()`, 以保证读回后网格一致.
    pub fn write_nifti<P: AsRef<Path>>(&self, path: P) -> RoiResult<()> {
        let mut header = self.header.as_deref().cloned().unwrap_or_default();
        self.affine.write_to_header(&mut header);
        // 概率图谱可能带有缩放参数, 二值数据不需要.
        header.scl_slope = 1.0;
        header.scl_inter = 0.0;

        let data = self.data.mapv(u8::from);
        WriterOptions::new(path.as_ref())
            .reference_header(&header)
            .write_nifti(&data)?;
        Ok(())
    }

    /// 读取 [`Self::write_nifti`] 写出的 (或任意三维) nifti 掩码文件. 非零体素视为 `true`.
    pub fn open<P: AsRef<Path>>(path: P) -> RoiResult<Self> {
        let obj = ReaderOptions::new().read_file(path.as_ref())?;
        let header = obj.header().clone();
        let affine = Affine::from_header(&header);
        let data = obj.into_volume().into_ndarray::<f32>()?;
        let ndim = data.ndim();
        let data = data
            .into_dimensionality::<Ix3>()
            .map_err(|_| RoiError::UnexpectedDimensionality(ndim))?
            .mapv(|v| v != 0.0);
        Ok(Self {
            affine,
            header: Some(Box::new(header)),
            data,
        })
    }
}
