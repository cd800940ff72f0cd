//! 流水线配置.

use std::num::NonZeroUsize;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::consts::prob::DEFAULT_THRESHOLD;
use crate::consts::{AFFINE_TOLERANCE, MAX_DEFAULT_WORKERS, SHUFFLE_SEED};

/// 零列剔除时参与判定的样本范围.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum PruneScope {
    /// 按全部已加载样本判定. 验证集信息会影响保留哪些列.
    #[default]
    FullBatch,

    /// 只按训练集判定, 验证集沿用训练集保留的列.
    TrainingOnly,
}

/// 数据集构建配置.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PipelineConfig {
    /// 图谱概率阈值, 含端点. 取值 `[0, 100]`.
    pub threshold: f32,

    /// 仿射矩阵逐元素比较容差.
    pub affine_tolerance: f64,

    /// 受试者顺序洗牌种子.
    pub seed: u64,

    /// 并行加载的工作线程数. `None` 表示使用 [`default_workers`].
    pub workers: Option<NonZeroUsize>,

    /// 零列剔除范围.
    pub prune: PruneScope,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            affine_tolerance: AFFINE_TOLERANCE,
            seed: SHUFFLE_SEED,
            workers: None,
            prune: PruneScope::FullBatch,
        }
    }
}

impl PipelineConfig {
    /// 替换阈值.
    #[inline]
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    /// 替换仿射容差.
    #[inline]
    pub fn with_affine_tolerance(mut self, tolerance: f64) -> Self {
        self.affine_tolerance = tolerance;
        self
    }

    /// 替换洗牌种子.
    #[inline]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// 指定工作线程数. 0 会被提升为 1.
    #[inline]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = NonZeroUsize::new(workers.max(1));
        self
    }

    /// 替换零列剔除范围.
    #[inline]
    pub fn with_prune(mut self, prune: PruneScope) -> Self {
        self.prune = prune;
        self
    }

    /// 实际使用的工作线程数.
    #[inline]
    pub fn effective_workers(&self) -> usize {
        self.workers.map_or_else(default_workers, NonZeroUsize::get)
    }
}

/// 默认工作线程数: `min(4, 核心数 - 1)`, 至少为 1.
pub fn default_workers() -> usize {
    let cpus = std::thread::available_parallelism().map_or_else(|_| num_cpus::get(), usize::from);
    MAX_DEFAULT_WORKERS.min(cpus.saturating_sub(1)).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let c = PipelineConfig::default();
        assert_eq!(c.threshold, 50.0);
        assert_eq!(c.affine_tolerance, 1e-2);
        assert_eq!(c.seed, 42);
        assert!(c.workers.is_none());
        assert_eq!(c.prune, PruneScope::FullBatch);
    }

    #[test]
    fn test_workers() {
        assert!((1..=MAX_DEFAULT_WORKERS).contains(&default_workers()));
        assert_eq!(PipelineConfig::default().with_workers(0).effective_workers(), 1);
        assert_eq!(PipelineConfig::default().with_workers(7).effective_workers(), 7);
    }
}
