//! 运行时错误.

use std::io;

/// 致命错误. 出现即中止当前操作, 不会重试.
#[derive(Debug, thiserror::Error)]
pub enum RoiError {
    /// 脑区名既不是图谱的基础标签, 也不是已注册的复合脑区.
    #[error("unknown region `{0}`")]
    UnknownRegion(String),

    /// 复合脑区引用了图谱中不存在的基础标签.
    #[error("composite region `{composite}` references missing label `{missing}`")]
    InvalidComposite {
        /// 复合脑区名.
        composite: String,
        /// 缺失的基础标签名.
        missing: String,
    },

    /// 复合脑区名与已有脑区名重复.
    #[error("region `{0}` is defined more than once")]
    DuplicateRegion(String),

    /// 通道索引超出图谱通道数.
    #[error("channel {channel} out of range, atlas has {len} channels")]
    ChannelOutOfRange {
        /// 请求的通道.
        channel: usize,
        /// 图谱通道数.
        len: usize,
    },

    /// 图谱标签数与概率通道数不一致.
    #[error("atlas has {channels} channels but {labels} labels")]
    AtlasLabelMismatch {
        /// 概率通道数.
        channels: usize,
        /// 标签数 (不含背景).
        labels: usize,
    },

    /// 两个体数据的空间网格 (形状或仿射矩阵) 不一致, 且未经过配准.
    #[error("grid mismatch: {left_shape:?} vs {right_shape:?} (affines match: {affines_match})")]
    ShapeMismatch {
        /// 左侧空间形状.
        left_shape: [usize; 3],
        /// 右侧空间形状.
        right_shape: [usize; 3],
        /// 仿射矩阵是否在容差内一致.
        affines_match: bool,
    },

    /// 仿射矩阵不可逆, 无法在两个网格间重采样.
    #[error("affine is singular, cannot resample")]
    SingularAffine,

    /// 堆叠特征行时行长度不一致. 这意味着系统性的图谱/脑区/网格错配.
    #[error("jagged batch: subject `{subject}` has {found} features, expected {expected}")]
    JaggedBatch {
        /// 出错的受试者.
        subject: String,
        /// 期望的行长度.
        expected: usize,
        /// 实际行长度.
        found: usize,
    },

    /// 不支持的体数据维度. 目前只支持 3D 和 4D.
    #[error("cannot work with {0}D data")]
    UnexpectedDimensionality(usize),

    /// 表格文件缺少所需的列.
    #[error("column `{0}` not found in table header")]
    MissingColumn(String),

    /// NIfTI 读写错误.
    #[error(transparent)]
    Nifti(#[from] nifti::NiftiError),

    /// 底层 I/O 错误.
    #[error(transparent)]
    Io(#[from] io::Error),

    /// 无法构建工作线程池.
    #[cfg(feature = "rayon")]
    #[error(transparent)]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    /// 写出 npz 文件错误.
    #[error(transparent)]
    Npz(#[from] ndarray_npy::WriteNpzError),

    /// 读取 npz 文件错误.
    #[error(transparent)]
    NpzRead(#[from] ndarray_npy::ReadNpzError),
}

/// 单个受试者加载失败的原因. 在批处理粒度上可恢复:
/// 该受试者会被记录并跳过, 批处理继续.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// 文件不存在或无法读取.
    #[error("i/o: {0}")]
    Io(#[from] io::Error),

    /// 文件头或数据损坏.
    #[error("nifti: {0}")]
    Nifti(#[from] nifti::NiftiError),

    /// 不支持的维度.
    #[error("cannot work with {0}D data")]
    UnexpectedDimensionality(usize),

    /// 文件头给出的仿射矩阵不可逆 (例如全零的 sform).
    #[error("subject affine is singular")]
    SingularAffine,

    /// 找不到该受试者的预测目标.
    #[error("no target for subject")]
    MissingTarget,

    /// 预测目标宽度与其他受试者不一致.
    #[error("target has width {found}, expected {expected}")]
    TargetWidth {
        /// 期望宽度.
        expected: usize,
        /// 实际宽度.
        found: usize,
    },
}

/// 致命错误的 `Result`.
pub type RoiResult<T> = Result<T, RoiError>;

/// 单个受试者加载的 `Result`.
pub type LoadResult<T> = Result<T, LoadError>;
