use std::path::Path;

use ndarray::{Array2, Array3, Array4, ArrayD, ArrayView3, ArrayViewD, Axis, Ix3, Ix4};
use nifti::{IntoNdArray, NiftiHeader, NiftiObject, ReaderOptions};

use crate::consts::{Dimension, SPATIAL_NDIM};
use crate::error::{LoadError, LoadResult, RoiError, RoiResult};

pub mod affine;
pub mod mask;

pub use affine::{affines_match, Affine, Grid, GridAttr, Point3};
pub use mask::Mask;

/// `NiftiHeader` 是栈上大对象, 移动该对象的开销很可观.
/// 因此我们将其分配到堆上.
pub(crate) type BoxedHeader = Box<NiftiHeader>;

/// 受试者体数据. 以 `(x, y, z)` 或 `(x, y, z, t)` 的顺序保存,
/// 并显式携带维度标记与仿射矩阵.
///
/// 原始扫描以 `f32` 加载以控制内存; 经过掩码后的结果以 `f64` 保存.
#[derive(Debug, Clone)]
pub struct Volume<A = f32> {
    dim: Dimension,
    affine: Affine,
    header: Option<BoxedHeader>,
    data: ArrayD<A>,
}

impl<A> GridAttr for Volume<A> {
    #[inline]
    fn grid(&self) -> Grid {
        let s = self.data.shape();
        Grid::new([s[0], s[1], s[2]], self.affine)
    }
}

impl<A> Volume<A> {
    /// 从任意维度数组创建. 只接受三维或四维数据,
    /// 否则返回 `Err(RoiError::UnexpectedDimensionality)`.
    pub fn new(data: ArrayD<A>, affine: Affine) -> RoiResult<Self> {
        let dim =
            Dimension::from_ndim(data.ndim()).ok_or(RoiError::UnexpectedDimensionality(data.ndim()))?;
        Ok(Self {
            dim,
            affine,
            header: None,
            data,
        })
    }

    /// 从三维数组创建.
    #[inline]
    pub fn from_3d(data: Array3<A>, affine: Affine) -> Self {
        Self {
            dim: Dimension::Three,
            affine,
            header: None,
            data: data.into_dyn(),
        }
    }

    /// 从四维数组创建. 最后一维是时间.
    #[inline]
    pub fn from_4d(data: Array4<A>, affine: Affine) -> Self {
        Self {
            dim: Dimension::Four,
            affine,
            header: None,
            data: data.into_dyn(),
        }
    }

    /// 附加 NIfTI header. 仿射矩阵仍以 `self.affine()` 为准.
    #[inline]
    pub fn with_header(mut self, header: NiftiHeader) -> Self {
        self.header = Some(Box::new(header));
        self
    }

    /// 替换仿射矩阵. 用于重采样后数据已落在新网格上的情形.
    #[inline]
    pub fn with_affine(mut self, affine: Affine) -> Self {
        self.affine = affine;
        self
    }

    /// 维度标记.
    #[inline]
    pub fn dim(&self) -> Dimension {
        self.dim
    }

    /// 原始 NIfTI header (如果有).
    #[inline]
    pub fn header(&self) -> Option<&NiftiHeader> {
        self.header.as_deref()
    }

    /// 完整形状.
    #[inline]
    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    /// 时间点个数. 三维数据视为只有一个时间点.
    #[inline]
    pub fn len_t(&self) -> usize {
        match self.dim {
            Dimension::Three => 1,
            Dimension::Four => self.data.shape()[SPATIAL_NDIM],
        }
    }

    /// 获得数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayViewD<'_, A> {
        self.data.view()
    }

    /// 消费自我, 获得底层数据.
    #[inline]
    pub fn into_data(self) -> ArrayD<A> {
        self.data
    }

    /// 获取第 `t` 个时间点的三维视图. 三维数据只有 `t == 0`.
    ///
    /// 当 `t` 越界时 panic.
    pub(crate) fn frame(&self, t: usize) -> ArrayView3<'_, A> {
        let v = match self.dim {
            Dimension::Three => {
                assert_eq!(t, 0, "3D volume has a single frame");
                self.data.view()
            }
            Dimension::Four => self.data.index_axis(Axis(SPATIAL_NDIM), t),
        };
        // 维数已由 `self.dim` 保证, 可直接 unwrap.
        v.into_dimensionality::<Ix3>().unwrap()
    }

    /// 获取能按升序迭代时间点三维视图的迭代器.
    #[inline]
    pub fn frame_iter(&self) -> impl ExactSizeIterator<Item = ArrayView3<'_, A>> {
        (0..self.len_t()).map(move |t| self.frame(t))
    }

    /// 以四维视图获取数据. 三维数据视作只有一个时间点.
    pub(crate) fn as_4d(&self) -> ndarray::ArrayView4<'_, A> {
        let v = match self.dim {
            Dimension::Three => self.data.view().insert_axis(Axis(SPATIAL_NDIM)),
            Dimension::Four => self.data.view(),
        };
        // 维数已由 `self.dim` 保证, 可直接 unwrap.
        v.into_dimensionality::<Ix4>().unwrap()
    }

    /// 用相同的维度标记、仿射矩阵和 header 包装新数据.
    /// `data` 的形状由调用者保证与原维度一致.
    pub(crate) fn with_same_meta<B>(&self, data: ArrayD<B>) -> Volume<B> {
        debug_assert_eq!(data.ndim(), self.dim.ndim());
        Volume {
            dim: self.dim,
            affine: self.affine,
            header: self.header.clone(),
            data,
        }
    }
}

impl<A: Copy + Into<f64>> Volume<A> {
    /// 按 `(x, y, z[, t])` 的逻辑顺序展平为一行特征.
    #[inline]
    pub fn to_feature_row(&self) -> Vec<f64> {
        self.data.iter().map(|v| (*v).into()).collect()
    }

    /// 展平为 `t × (x·y·z)` 矩阵. 三维数据得到单行矩阵.
    pub fn to_time_by_voxel(&self) -> Array2<f64> {
        let (n_t, n_v) = (self.len_t(), self.spatial_size());
        let mut out = Array2::<f64>::zeros((n_t, n_v));
        for (mut row, frame) in out.axis_iter_mut(Axis(0)).zip(self.frame_iter()) {
            row.iter_mut()
                .zip(frame.iter())
                .for_each(|(o, v)| *o = (*v).into());
        }
        out
    }
}

impl Volume<f32> {
    /// 打开 nii / nii.gz 文件格式的体数据. 数据以 `f32` 加载.
    ///
    /// 末尾长度为 1 的多余维度 (包括只有一个时间点的第四维) 会被压缩掉. 压缩后仍非三维或四维时返回
    /// `Err(LoadError::UnexpectedDimensionality)`.
    pub fn open<P: AsRef<Path>>(path: P) -> LoadResult<Self> {
        let obj = ReaderOptions::new().read_file(path.as_ref())?;
        let header = obj.header().clone();
        let affine = Affine::from_header(&header);

        let mut data = obj.into_volume().into_ndarray::<f32>()?;
        while data.ndim() > Dimension::Four.ndim() && data.shape()[data.ndim() - 1] == 1 {
            let last = Axis(data.ndim() - 1);
            data = data.index_axis_move(last, 0);
        }
        if data.ndim() == Dimension::Four.ndim() && data.shape()[SPATIAL_NDIM] == 1 {
            data = data.index_axis_move(Axis(SPATIAL_NDIM), 0);
        }

        let dim = Dimension::from_ndim(data.ndim())
            .ok_or(LoadError::UnexpectedDimensionality(data.ndim()))?;
        Ok(Self {
            dim,
            affine,
            header: Some(Box::new(header)),
            data,
        })
    }
}

/// 将 `(x, y, z, t)` 四维数组按维度标记恢复为体数据数组.
pub(crate) fn from_4d_with_dim<A>(data: Array4<A>, dim: Dimension) -> ArrayD<A> {
    match dim {
        Dimension::Three => data.index_axis_move(Axis(SPATIAL_NDIM), 0).into_dyn(),
        Dimension::Four => data.into_dyn(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array, ArrayD, IxDyn};

    #[test]
    fn test_reject_unexpected_dimensionality() {
        let d2 = ArrayD::<f32>::zeros(IxDyn(&[2, 2]));
        let d5 = ArrayD::<f32>::zeros(IxDyn(&[2, 2, 2, 2, 2]));
        assert!(matches!(
            Volume::new(d2, Affine::IDENTITY),
            Err(RoiError::UnexpectedDimensionality(2))
        ));
        assert!(matches!(
            Volume::new(d5, Affine::IDENTITY),
            Err(RoiError::UnexpectedDimensionality(5))
        ));
    }

    #[test]
    fn test_dimension_tag() {
        let v3 = Volume::new(ArrayD::<f32>::zeros(IxDyn(&[2, 3, 4])), Affine::IDENTITY).unwrap();
        assert_eq!(v3.dim(), Dimension::Three);
        assert_eq!(v3.len_t(), 1);
        assert_eq!(v3.spatial_shape(), [2, 3, 4]);

        let v4 = Volume::from_4d(Array4::<f32>::zeros((2, 3, 4, 5)), Affine::IDENTITY);
        assert_eq!(v4.dim(), Dimension::Four);
        assert_eq!(v4.len_t(), 5);
        assert_eq!(v4.spatial_shape(), [2, 3, 4]);
        assert_eq!(v4.frame_iter().len(), 5);
    }

    #[test]
    fn test_time_by_voxel() {
        let data = Array::from_shape_fn((2, 1, 1, 3), |(x, _, _, t)| (x * 10 + t) as f32);
        let v = Volume::from_4d(data, Affine::IDENTITY);
        let m = v.to_time_by_voxel();
        assert_eq!(m.shape(), &[3, 2]);
        assert_eq!(m[[0, 0]], 0.0);
        assert_eq!(m[[2, 0]], 2.0);
        assert_eq!(m[[1, 1]], 11.0);

        // 展平按 (x, y, z, t) 逻辑顺序.
        assert_eq!(v.to_feature_row(), vec![0.0, 1.0, 2.0, 10.0, 11.0, 12.0]);
    }
}
