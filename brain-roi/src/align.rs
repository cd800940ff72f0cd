//! 网格配准: 将掩码或体数据重采样到另一个体数据的空间网格上.
//!
//! 逐体素运算要求两侧网格一致 (形状相同且仿射矩阵在容差内相同).
//! 网格不一致时, 要么显式重采样, 要么报错; 绝不隐式广播或裁剪.

use std::borrow::Cow;

use ndarray::{Array3, Array4, ArrayView3, Axis, Zip};

use crate::consts::AFFINE_TOLERANCE;
use crate::data::{self, Affine, Grid, GridAttr, Mask, Point3, Volume};
use crate::error::{RoiError, RoiResult};

/// 插值方式.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Interpolation {
    /// 最近邻. 用于掩码, 保持二值.
    Nearest,

    /// 三线性插值. 用于连续的图像数据.
    Continuous,
}

/// 检查两个网格是否一致. 不一致时返回 `Err(RoiError::ShapeMismatch)`.
pub fn ensure_same_grid(a: &Grid, b: &Grid, tolerance: f64) -> RoiResult<()> {
    if a.is_compatible(b, tolerance) {
        Ok(())
    } else {
        Err(RoiError::ShapeMismatch {
            left_shape: a.shape,
            right_shape: b.shape,
            affines_match: a.affine.approx_eq(&b.affine, tolerance),
        })
    }
}

/// 网格配准器.
#[derive(Copy, Clone, Debug)]
pub struct VolumeAligner {
    tolerance: f64,
}

impl Default for VolumeAligner {
    #[inline]
    fn default() -> Self {
        Self::new(AFFINE_TOLERANCE)
    }
}

impl VolumeAligner {
    /// 使用逐元素容差 `tolerance` 创建.
    #[inline]
    pub fn new(tolerance: f64) -> Self {
        Self { tolerance }
    }

    /// 仿射矩阵比较容差.
    #[inline]
    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// 两个仿射矩阵是否在容差内逐元素一致?
    #[inline]
    pub fn affines_match(&self, a: &Affine, b: &Affine) -> bool {
        a.approx_eq(b, self.tolerance)
    }

    /// 将掩码对齐到 `target` 的空间网格 (四维数据即第一个时间点的网格).
    ///
    /// 网格已一致时直接借用原掩码; 否则以最近邻重采样得到新掩码.
    pub fn align_mask<'m, A>(&self, mask: &'m Mask, target: &Volume<A>) -> RoiResult<Cow<'m, Mask>> {
        let grid = target.grid();
        if mask.grid().is_compatible(&grid, self.tolerance) {
            return Ok(Cow::Borrowed(mask));
        }
        log::debug!(
            "resampling mask {:?} onto grid {:?}",
            mask.spatial_shape(),
            grid.shape
        );
        resample_mask(mask, &grid).map(Cow::Owned)
    }

    /// 将体数据的每个时间点重采样到 `grid` 上. 维度标记保持不变.
    ///
    /// 网格已一致时返回副本.
    pub fn align_volume(
        &self,
        volume: &Volume<f32>,
        grid: &Grid,
        interpolation: Interpolation,
    ) -> RoiResult<Volume<f32>> {
        if volume.grid().is_compatible(grid, self.tolerance) {
            return Ok(volume.clone());
        }
        let src = volume.as_4d();
        let [x, y, z] = grid.shape;
        let mut out = Array4::<f32>::zeros((x, y, z, volume.len_t()));
        for (mut dst, frame) in out.axis_iter_mut(Axis(3)).zip(src.axis_iter(Axis(3))) {
            let resampled = resample_frame(frame, &volume.affine(), grid, interpolation)?;
            dst.assign(&resampled);
        }
        let aligned = volume.with_same_meta(data::from_4d_with_dim(out, volume.dim()));
        Ok(aligned.with_affine(grid.affine))
    }
}

/// 以最近邻方式将掩码重采样到 `target` 网格上. 源网格之外的体素为 `false`.
pub fn resample_mask(mask: &Mask, target: &Grid) -> RoiResult<Mask> {
    let to_src = source_index_map(&mask.affine(), target)?;
    let src = mask.data();
    let out = sample_grid(target, |p| sample_nearest(&src, to_src.apply(p)).unwrap_or(false));
    Ok(Mask::new(out, target.affine))
}

/// 将单个三维帧重采样到 `target` 网格上. 源网格之外的体素为 0.
pub fn resample_frame(
    src: ArrayView3<'_, f32>,
    src_affine: &Affine,
    target: &Grid,
    interpolation: Interpolation,
) -> RoiResult<Array3<f32>> {
    let to_src = source_index_map(src_affine, target)?;
    let out = match interpolation {
        Interpolation::Nearest => {
            sample_grid(target, |p| sample_nearest(&src, to_src.apply(p)).unwrap_or(0.0))
        }
        Interpolation::Continuous => {
            sample_grid(target, |p| sample_trilinear(&src, to_src.apply(p)).unwrap_or(0.0))
        }
    };
    Ok(out)
}

/// 目标体素索引 -> 源体素索引 (浮点) 的变换: `inv(src) · target`.
fn source_index_map(src_affine: &Affine, target: &Grid) -> RoiResult<Affine> {
    let inv = src_affine.inverse().ok_or(RoiError::SingularAffine)?;
    Ok(inv.compose(&target.affine))
}

/// 对 `target` 网格的每个体素调用 `f`.
fn sample_grid<T, F>(target: &Grid, f: F) -> Array3<T>
where
    T: Copy + Default + Send + Sync,
    F: Fn(Point3) -> T + Sync + Send,
{
    let [x, y, z] = target.shape;
    let mut out = Array3::<T>::from_elem((x, y, z), T::default());
    let op = |(i, j, k): (usize, usize, usize), v: &mut T| {
        *v = f([i as f64, j as f64, k as f64]);
    };
    #[cfg(feature = "rayon")]
    Zip::indexed(&mut out).par_for_each(op);
    #[cfg(not(feature = "rayon"))]
    Zip::indexed(&mut out).for_each(op);
    out
}

/// 最近邻取值. 越界返回 `None`.
fn sample_nearest<T: Copy>(src: &ArrayView3<'_, T>, p: Point3) -> Option<T> {
    let (nx, ny, nz) = src.dim();
    let idx = |v: f64, n: usize| {
        let r = v.round();
        (r >= 0.0 && r < n as f64).then_some(r as usize)
    };
    Some(src[[idx(p[0], nx)?, idx(p[1], ny)?, idx(p[2], nz)?]])
}

/// 三线性插值. 点必须落在 `[0, n - 1]` 内 (允许微小误差), 否则返回 `None`.
fn sample_trilinear(src: &ArrayView3<'_, f32>, p: Point3) -> Option<f32> {
    const EPS: f64 = 1e-6;
    let (nx, ny, nz) = src.dim();
    // 返回 (下界索引, 上界索引, 上界权重).
    let axis = |v: f64, n: usize| {
        if n == 0 {
            return None;
        }
        let hi = (n - 1) as f64;
        if v < -EPS || v > hi + EPS {
            return None;
        }
        let v = v.clamp(0.0, hi);
        let i0 = v.floor() as usize;
        let i1 = (i0 + 1).min(n - 1);
        Some((i0, i1, v - i0 as f64))
    };
    let (x0, x1, wx) = axis(p[0], nx)?;
    let (y0, y1, wy) = axis(p[1], ny)?;
    let (z0, z1, wz) = axis(p[2], nz)?;

    let at = |x: usize, y: usize, z: usize| src[[x, y, z]] as f64;
    let lerp = |a: f64, b: f64, w: f64| a + (b - a) * w;
    let c00 = lerp(at(x0, y0, z0), at(x1, y0, z0), wx);
    let c10 = lerp(at(x0, y1, z0), at(x1, y1, z0), wx);
    let c01 = lerp(at(x0, y0, z1), at(x1, y0, z1), wx);
    let c11 = lerp(at(x0, y1, z1), at(x1, y1, z1), wx);
    let c0 = lerp(c00, c10, wy);
    let c1 = lerp(c01, c11, wy);
    Some(lerp(c0, c1, wz) as f32)
}
