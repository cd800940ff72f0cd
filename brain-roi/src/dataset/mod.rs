//! 数据集操作.

use std::path::{Path, PathBuf};

mod builder;
pub mod loader;
mod npz;
pub mod target;

pub use builder::{
    build_dataset, nonzero_columns, DatasetBuilder, DatasetResult, SkippedSubject, Split,
};
pub use loader::{default_filename, FilenameBuilder, NiftiDirLoader, VolumeLoader};
pub use npz::{read_npz, NPZ_ENTRIES};
pub use target::{ParticipantsTable, TargetLookup};

/// 获取 `{用户主目录}/dataset` 目录.
pub fn home_dataset_dir() -> Option<PathBuf> {
    home_dataset_dir_with::<&str, _>([])
}

/// 获取 `{用户主目录}/dataset` 目录下给定继续项组成的全路径.
pub fn home_dataset_dir_with<P: AsRef<Path>, I: IntoIterator<Item = P>>(it: I) -> Option<PathBuf> {
    let mut ans = dirs::home_dir()?;
    ans.push("dataset");
    ans.extend(it);
    Some(ans)
}
