//! 体素索引到物理空间坐标的仿射变换, 以及空间网格.

use nifti::NiftiHeader;

use crate::consts::AFFINE_TOLERANCE;

/// 三维浮点坐标 / 向量.
pub type Point3 = [f64; 3];

/// 4×4 仿射矩阵, 行优先存储. 最后一行恒为 `[0, 0, 0, 1]`.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Affine([[f64; 4]; 4]);

impl Default for Affine {
    #[inline]
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Affine {
    /// 单位变换.
    pub const IDENTITY: Affine = Affine([
        [1.0, 0.0, 0.0, 0.0],
        [0.0, 1.0, 0.0, 0.0],
        [0.0, 0.0, 1.0, 0.0],
        [0.0, 0.0, 0.0, 1.0],
    ]);

    /// 从行优先矩阵创建. 最后一行会被强制设置为 `[0, 0, 0, 1]`.
    #[inline]
    pub fn new(mut m: [[f64; 4]; 4]) -> Self {
        m[3] = [0.0, 0.0, 0.0, 1.0];
        Self(m)
    }

    /// 仅包含各轴缩放的仿射矩阵.
    #[inline]
    pub fn from_scaling([sx, sy, sz]: Point3) -> Self {
        Self::new([
            [sx, 0.0, 0.0, 0.0],
            [0.0, sy, 0.0, 0.0],
            [0.0, 0.0, sz, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ])
    }

    /// 包含各轴缩放和平移的仿射矩阵.
    #[inline]
    pub fn from_scaling_translation(scale: Point3, [tx, ty, tz]: Point3) -> Self {
        let mut a = Self::from_scaling(scale);
        a.0[0][3] = tx;
        a.0[1][3] = ty;
        a.0[2][3] = tz;
        a
    }

    /// 从 NIfTI header 中读取仿射矩阵.
    ///
    /// 优先使用 sform (`sform_code > 0`), 其次 qform (`qform_code > 0`),
    /// 都不可用时退化为 `pixdim` 给出的缩放矩阵.
    pub fn from_header(h: &NiftiHeader) -> Self {
        if h.sform_code > 0 {
            let row = |r: &[f32; 4]| [r[0] as f64, r[1] as f64, r[2] as f64, r[3] as f64];
            return Self::new([
                row(&h.srow_x),
                row(&h.srow_y),
                row(&h.srow_z),
                [0.0, 0.0, 0.0, 1.0],
            ]);
        }
        let [_, dx, dy, dz, ..] = h.pixdim;
        let scale = [dx as f64, dy as f64, dz as f64].map(|d| if d > 0.0 { d } else { 1.0 });
        if h.qform_code > 0 {
            return Self::from_quatern(h, scale);
        }
        Self::from_scaling(scale)
    }

    /// 通过 qform 四元数参数构建.
    fn from_quatern(h: &NiftiHeader, [dx, dy, dz]: Point3) -> Self {
        let (b, c, d) = (h.quatern_b as f64, h.quatern_c as f64, h.quatern_d as f64);
        let a = (1.0 - (b * b + c * c + d * d)).max(0.0).sqrt();
        // pixdim[0] 只能是 -1 或 1, 其他值按 1 处理.
        let qfac = if h.pixdim[0] < 0.0 { -1.0 } else { 1.0 };
        let r = [
            [a * a + b * b - c * c - d * d, 2.0 * (b * c - a * d), 2.0 * (b * d + a * c)],
            [2.0 * (b * c + a * d), a * a + c * c - b * b - d * d, 2.0 * (c * d - a * b)],
            [2.0 * (b * d - a * c), 2.0 * (c * d + a * b), a * a + d * d - b * b - c * c],
        ];
        let s = [dx, dy, dz * qfac];
        let t = [
            h.quatern_x as f64,
            h.quatern_y as f64,
            h.quatern_z as f64,
        ];
        let mut m = [[0.0; 4]; 4];
        for i in 0..3 {
            for j in 0..3 {
                m[i][j] = r[i][j] * s[j];
            }
            m[i][3] = t[i];
        }
        Self::new(m)
    }

    /// 将仿射矩阵写入 NIfTI header 的 sform 字段.
    pub fn write_to_header(&self, h: &mut NiftiHeader) {
        let row = |r: &[f64; 4]| [r[0] as f32, r[1] as f32, r[2] as f32, r[3] as f32];
        h.srow_x = row(&self.0[0]);
        h.srow_y = row(&self.0[1]);
        h.srow_z = row(&self.0[2]);
        h.sform_code = 1;
        let [vx, vy, vz] = self.voxel_sizes();
        h.pixdim[1] = vx as f32;
        h.pixdim[2] = vy as f32;
        h.pixdim[3] = vz as f32;
    }

    /// 获取底层矩阵.
    #[inline]
    pub fn matrix(&self) -> &[[f64; 4]; 4] {
        &self.0
    }

    /// 将体素索引 (浮点) 变换到物理空间.
    #[inline]
    pub fn apply(&self, [x, y, z]: Point3) -> Point3 {
        let m = &self.0;
        [
            m[0][0] * x + m[0][1] * y + m[0][2] * z + m[0][3],
            m[1][0] * x + m[1][1] * y + m[1][2] * z + m[1][3],
            m[2][0] * x + m[2][1] * y + m[2][2] * z + m[2][3],
        ]
    }

    /// 矩阵乘法 `self * rhs`. 结果先作用 `rhs`, 再作用 `self`.
    pub fn compose(&self, rhs: &Affine) -> Affine {
        let mut m = [[0.0; 4]; 4];
        for (i, row) in m.iter_mut().enumerate() {
            for (j, v) in row.iter_mut().enumerate() {
                *v = (0..4).map(|k| self.0[i][k] * rhs.0[k][j]).sum();
            }
        }
        Affine::new(m)
    }

    /// 求逆. 线性部分奇异时返回 `None`.
    pub fn inverse(&self) -> Option<Affine> {
        let m = &self.0;
        let cof = |r0: usize, r1: usize, c0: usize, c1: usize| {
            m[r0][c0] * m[r1][c1] - m[r0][c1] * m[r1][c0]
        };
        let det = m[0][0] * cof(1, 2, 1, 2) - m[0][1] * cof(1, 2, 0, 2) + m[0][2] * cof(1, 2, 0, 1);
        if det.abs() < f64::EPSILON {
            return None;
        }
        let inv_det = 1.0 / det;
        // 伴随矩阵 (余子式转置).
        let r = [
            [cof(1, 2, 1, 2), -cof(0, 2, 1, 2), cof(0, 1, 1, 2)],
            [-cof(1, 2, 0, 2), cof(0, 2, 0, 2), -cof(0, 1, 0, 2)],
            [cof(1, 2, 0, 1), -cof(0, 2, 0, 1), cof(0, 1, 0, 1)],
        ];
        let mut out = [[0.0; 4]; 4];
        for i in 0..3 {
            for j in 0..3 {
                out[i][j] = r[i][j] * inv_det;
            }
            out[i][3] = -(0..3).map(|k| out[i][k] * m[k][3]).sum::<f64>();
        }
        Some(Affine::new(out))
    }

    /// 逐元素比较, 所有元素差的绝对值均不超过 `tolerance` 时返回 `true`.
    pub fn approx_eq(&self, other: &Affine, tolerance: f64) -> bool {
        self.0
            .iter()
            .flatten()
            .zip(other.0.iter().flatten())
            .all(|(a, b)| (a - b).abs() <= tolerance)
    }

    /// 各体素轴在物理空间中的长度 (线性部分的列范数), 以毫米为单位.
    pub fn voxel_sizes(&self) -> Point3 {
        let m = &self.0;
        [0, 1, 2].map(|j| (0..3).map(|i| m[i][j].powi(2)).sum::<f64>().sqrt())
    }
}

/// 以默认容差 [`AFFINE_TOLERANCE`] 逐元素比较两个仿射矩阵.
#[inline]
pub fn affines_match(a: &Affine, b: &Affine) -> bool {
    a.approx_eq(b, AFFINE_TOLERANCE)
}

/// 空间网格: 三维形状加仿射矩阵. 两个体数据只有在网格兼容时才能逐体素运算.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Grid {
    /// `(x, y, z)` 方向的体素个数.
    pub shape: [usize; 3],

    /// 体素到物理空间的变换.
    pub affine: Affine,
}

impl Grid {
    /// 创建网格.
    #[inline]
    pub fn new(shape: [usize; 3], affine: Affine) -> Self {
        Self { shape, affine }
    }

    /// 体素个数.
    #[inline]
    pub fn size(&self) -> usize {
        self.shape.iter().product()
    }

    /// 形状一致, 且仿射矩阵在 `tolerance` 容差内一致.
    #[inline]
    pub fn is_compatible(&self, other: &Grid, tolerance: f64) -> bool {
        self.shape == other.shape && self.affine.approx_eq(&other.affine, tolerance)
    }
}

/// 拥有空间网格的结构的共用属性.
pub trait GridAttr {
    /// 获取空间网格.
    fn grid(&self) -> Grid;

    /// 获取三维空间形状.
    #[inline]
    fn spatial_shape(&self) -> [usize; 3] {
        self.grid().shape
    }

    /// 获取仿射矩阵.
    #[inline]
    fn affine(&self) -> Affine {
        self.grid().affine
    }

    /// 获取空间体素个数.
    #[inline]
    fn spatial_size(&self) -> usize {
        self.grid().size()
    }

    /// 获取单个体素分辨率, 以毫米为单位.
    #[inline]
    fn voxel_sizes(&self) -> Point3 {
        self.affine().voxel_sizes()
    }

    /// 获取单个体素的实际体积值, 以立方毫米为单位.
    #[inline]
    fn voxel_volume(&self) -> f64 {
        self.voxel_sizes().iter().product()
    }
}
