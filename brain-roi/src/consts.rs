//! 通用常量.

/// 概率图谱中, 体素属于某脑区的概率取值范围 (百分比).
pub mod prob {
    /// 概率下限.
    pub const MIN: f32 = 0.0;

    /// 概率上限.
    pub const MAX: f32 = 100.0;

    /// 默认阈值. 概率不小于该值的体素被视为属于该脑区.
    pub const DEFAULT_THRESHOLD: f32 = 50.0;

    /// 概率值是否在合法范围内?
    #[inline]
    pub fn is_valid(p: f32) -> bool {
        (MIN..=MAX).contains(&p)
    }
}

/// 图谱标签文件中保留的背景标签名.
pub const BACKGROUND_LABEL: &str = "Background";

/// 比较两个仿射矩阵时默认的逐元素容差.
pub const AFFINE_TOLERANCE: f64 = 1e-2;

/// 打乱受试者顺序时默认使用的随机种子.
pub const SHUFFLE_SEED: u64 = 42;

/// 训练集占比的分子. 训练集占比为 `TRAIN_NUMER / TRAIN_DENOM`.
pub const TRAIN_NUMER: usize = 2;

/// 训练集占比的分母.
pub const TRAIN_DENOM: usize = 3;

/// 默认工作线程数的上限.
pub const MAX_DEFAULT_WORKERS: usize = 4;

/// 受试者 NIfTI 文件的默认扩展名.
pub const NIFTI_GZ_EXT: &str = "nii.gz";

/// 参与者表中受试者 id 所在列的默认列名.
pub const PARTICIPANT_ID_COLUMN: &str = "participant_id";

/// 空间维度数.
pub const SPATIAL_NDIM: usize = 3;

/// 体数据维度.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Dimension {
    /// 三维结构像, `(x, y, z)`.
    Three,

    /// 四维时间序列, `(x, y, z, t)`.
    Four,
}

impl Dimension {
    /// 从维数构建. 仅支持 3 和 4.
    #[inline]
    pub const fn from_ndim(ndim: usize) -> Option<Self> {
        match ndim {
            3 => Some(Self::Three),
            4 => Some(Self::Four),
            _ => None,
        }
    }

    /// 对应的维数.
    #[inline]
    pub const fn ndim(&self) -> usize {
        match self {
            Self::Three => 3,
            Self::Four => 4,
        }
    }

    /// 是否为四维?
    #[inline]
    pub const fn is_4d(&self) -> bool {
        matches!(self, Self::Four)
    }
}
