//! 🧠欢迎光临🧠
//!
//! 涵盖了本 crate 一系列常用的功能.

pub use crate::align::{ensure_same_grid, Interpolation, VolumeAligner};
pub use crate::atlas::{build_mask, Atlas, AtlasIndex, MaskBuilder, Region};
pub use crate::config::{PipelineConfig, PruneScope};
pub use crate::consts::Dimension;
pub use crate::data::{affines_match, Affine, Grid, GridAttr, Mask, Volume};
pub use crate::dataset::{
    build_dataset, home_dataset_dir_with, DatasetBuilder, DatasetResult, NiftiDirLoader,
    ParticipantsTable, SkippedSubject, Split, TargetLookup, VolumeLoader,
};
pub use crate::error::{LoadError, LoadResult, RoiError, RoiResult};
pub use crate::extract::{extract, temporal_snr};
