#![warn(missing_docs)] // <= 合适时移除它.
// #![warn(clippy::missing_docs_in_private_items)]  // <= too strict.

//! 核心库. 基于概率脑图谱构建脑区 (ROI) 掩码, 将其配准到受试者的 NIfTI 体数据上,
//! 提取感兴趣区体素并组装成可直接用于训练的特征矩阵.
//!
//! 该 crate 目前仅提供 `safe` 接口.
//!
//! # 流程
//!
//! 1. [`atlas::AtlasIndex`] 将脑区名映射到图谱通道集合 (复合脑区是基础标签的并集);
//! 2. [`atlas::MaskBuilder`] 对通道概率做阈值化并取并, 得到三维二值掩码;
//! 3. [`align::VolumeAligner`] 将掩码重采样到每个受试者的原生网格上;
//! 4. [`extract::extract`] 用掩码选取体素, 四维数据的每个时间点共享同一掩码;
//! 5. [`dataset::DatasetBuilder`] 洗牌, 并行加载, 展平, 剔除零列, 按 2:1 划分训练集/验证集.
//!
//! # 注意
//!
//! 1. 单个受试者的加载失败不会中止批处理, 而是记录在结果中并跳过.
//!   网格不一致, 行长度不一致等系统性错误则直接返回 `Err`.
//! 2. 逐体素运算之前总是检查网格 (形状 + 仿射矩阵) 一致性, 从不隐式广播或裁剪.
//!
//! # Features
//!
//! - `rayon`: 多线程并行加载受试者与重采样.
//! - `serde`: 配置与基础类型的序列化.

pub mod align;

pub mod atlas;

pub mod config;

pub mod consts;

/// 体数据, 掩码与仿射矩阵等基础数据结构.
pub mod data;

pub mod dataset;

pub mod error;

pub mod extract;

pub mod prelude;

pub use align::{Interpolation, VolumeAligner};
pub use atlas::{Atlas, AtlasIndex, MaskBuilder, Region};
pub use config::{PipelineConfig, PruneScope};
pub use data::{Affine, Grid, GridAttr, Mask, Volume};
pub use dataset::{build_dataset, DatasetBuilder, DatasetResult, Split};
pub use error::{LoadError, RoiError, RoiResult};
