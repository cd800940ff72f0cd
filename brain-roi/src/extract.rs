//! 感兴趣区提取: 用三维掩码选取体数据中的体素.

use ndarray::{Array3, Array4, Axis, Zip};

use crate::align::ensure_same_grid;
use crate::data::{self, GridAttr, Mask, Volume};
use crate::error::RoiResult;

/// 将 `mask` 作用于 `volume`: 掩码内保留原值, 掩码外置 0. 输出维度与输入一致,
/// 四维数据的每个时间点都使用同一个三维掩码.
///
/// 累加以 `f64` 进行. 掩码和体数据 (第一个时间点) 网格不一致时返回
/// `Err(RoiError::ShapeMismatch)`, 调用者应先用 [`crate::align::VolumeAligner`] 对齐.
pub fn extract(volume: &Volume<f32>, mask: &Mask, tolerance: f64) -> RoiResult<Volume<f64>> {
    ensure_same_grid(&mask.grid(), &volume.grid(), tolerance)?;

    let src = volume.as_4d();
    let m = mask.data();
    let mut out = Array4::<f64>::zeros(src.raw_dim());
    for (mut dst, frame) in out.axis_iter_mut(Axis(3)).zip(src.axis_iter(Axis(3))) {
        Zip::from(&mut dst)
            .and(&frame)
            .and(&m)
            .for_each(|o, &v, &keep| {
                if keep {
                    *o = v as f64;
                }
            });
    }
    Ok(volume.with_same_meta(data::from_4d_with_dim(out, volume.dim())))
}

/// 时间信噪比: 每个体素沿时间轴的均值除以 (总体) 标准差.
///
/// 标准差为 0 的体素得到 `NaN`. 三维数据没有时间轴, 返回 `None`.
pub fn temporal_snr<A: Copy + Into<f64>>(volume: &Volume<A>) -> Option<Array3<f64>> {
    if !volume.dim().is_4d() {
        return None;
    }
    let data = volume.as_4d().mapv(Into::<f64>::into);
    let mean = data.mean_axis(Axis(3))?;
    let std = data.std_axis(Axis(3), 0.0);
    let mut snr = mean;
    Zip::from(&mut snr).and(&std).for_each(|m, &s| {
        *m = if s == 0.0 { f64::NAN } else { *m / s };
    });
    Some(snr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::Dimension;
    use crate::data::{Affine, Grid};
    use crate::error::RoiError;
    use ndarray::{Array, Array3};

    const TOL: f64 = crate::consts::AFFINE_TOLERANCE;

    #[test]
    fn test_all_false_mask_gives_zeros() {
        let affine = Affine::from_scaling([2.0, 2.0, 2.0]);
        let vol = Volume::from_3d(Array3::<f32>::from_elem((3, 4, 5), 7.0), affine);
        let mask = Mask::empty(&Grid::new([3, 4, 5], affine));

        let out = extract(&vol, &mask, TOL).unwrap();
        assert_eq!(out.dim(), Dimension::Three);
        assert_eq!(out.shape(), &[3, 4, 5]);
        assert!(out.data().iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_4d_broadcast() {
        let data = Array::from_shape_fn((2, 2, 1, 3), |(x, y, _, t)| (x * 10 + y + t * 100) as f32);
        let vol = Volume::from_4d(data, Affine::IDENTITY);
        let m = Array::from_shape_fn((2, 2, 1), |(x, y, _)| x == y);
        let mask = Mask::new(m, Affine::IDENTITY);

        let out = extract(&vol, &mask, TOL).unwrap();
        assert_eq!(out.dim(), Dimension::Four);
        assert_eq!(out.shape(), &[2, 2, 1, 3]);
        for t in 0..3 {
            let f = out.frame(t);
            assert_eq!(f[[0, 0, 0]], (t * 100) as f64);
            assert_eq!(f[[1, 1, 0]], (11 + t * 100) as f64);
            assert_eq!(f[[0, 1, 0]], 0.0);
            assert_eq!(f[[1, 0, 0]], 0.0);
        }
    }

    #[test]
    fn test_mismatch_rejected() {
        let vol = Volume::from_3d(Array3::<f32>::ones((2, 2, 2)), Affine::IDENTITY);
        let shifted = Mask::empty(&Grid::new(
            [2, 2, 2],
            Affine::from_scaling_translation([1.0, 1.0, 1.0], [0.5, 0.0, 0.0]),
        ));
        assert!(matches!(
            extract(&vol, &shifted, TOL),
            Err(RoiError::ShapeMismatch { affines_match: false, .. })
        ));

        let smaller = Mask::empty(&Grid::new([2, 2, 1], Affine::IDENTITY));
        assert!(matches!(
            extract(&vol, &smaller, TOL),
            Err(RoiError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_within_tolerance_accepted() {
        let vol = Volume::from_3d(Array3::<f32>::ones((2, 2, 2)), Affine::IDENTITY);
        let nudged = Affine::from_scaling_translation([1.0, 1.0, 1.0], [0.005, 0.0, 0.0]);
        let mask = Mask::new(Array3::from_elem((2, 2, 2), true), nudged);
        let out = extract(&vol, &mask, TOL).unwrap();
        assert_eq!(out.data().sum(), 8.0);
    }

    #[test]
    fn test_temporal_snr() {
        let data = Array::from_shape_fn((2, 1, 1, 4), |(x, _, _, t)| {
            if x == 0 {
                5.0f32
            } else {
                [1.0, 3.0, 1.0, 3.0][t]
            }
        });
        let vol = Volume::from_4d(data, Affine::IDENTITY);
        let snr = temporal_snr(&vol).unwrap();
        assert!(snr[[0, 0, 0]].is_nan());
        assert!((snr[[1, 0, 0]] - 2.0).abs() < 1e-12);

        let v3 = Volume::from_3d(Array3::<f32>::ones((1, 1, 1)), Affine::IDENTITY);
        assert!(temporal_snr(&v3).is_none());
    }
}
