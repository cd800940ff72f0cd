//! 对 `brain-roi::dataset` 的更一层封装. 提供从环境变量或主目录定位的图谱与数据加载器.

use brain_roi::dataset::{home_dataset_dir_with, NiftiDirLoader};
use brain_roi::{Atlas, RoiResult};
use std::env;
use std::path::{Path, PathBuf};

/// 图谱目录下的概率体文件名.
pub const ATLAS_MAPS_FILE: &str = "HarvardOxford-cort-prob-2mm.nii.gz";

/// 图谱目录下的标签文件名. 每行一个标签, 第一行为背景.
pub const ATLAS_LABELS_FILE: &str = "HarvardOxford-cort-labels.txt";

/// 若环境变量 `key` 非空, 则返回其值; 否则返回 `$HOME/dataset/{parts..}`.
fn dir_from_env_or_home(key: &str, parts: &[&str]) -> PathBuf {
    match env::var(key) {
        Ok(d) if !d.is_empty() => PathBuf::from(d),
        _ => home_dataset_dir_with(parts)
            .unwrap_or_else(|| ["dataset"].iter().chain(parts).collect()),
    }
}

/// 获取图谱目录.
///
/// 1. 若环境变量 `$BRAIN_ROI_ATLAS_DIR` 非空, 则返回其值;
/// 2. 否则, 返回 `$HOME/dataset/atlas`.
pub fn atlas_dir_from_env_or_home() -> PathBuf {
    dir_from_env_or_home("BRAIN_ROI_ATLAS_DIR", &["atlas"])
}

/// 从目录 `dir` 加载图谱.
pub fn atlas<P: AsRef<Path>>(dir: P) -> RoiResult<Atlas> {
    let dir = dir.as_ref();
    Atlas::open(dir.join(ATLAS_MAPS_FILE), dir.join(ATLAS_LABELS_FILE))
}

/// 从 `$BRAIN_ROI_ATLAS_DIR` 或者 `$HOME/dataset/atlas` 下加载图谱.
#[inline]
pub fn atlas_from_env_or_home() -> RoiResult<Atlas> {
    atlas(atlas_dir_from_env_or_home())
}

/// 获取受试者体数据目录.
///
/// 1. 若环境变量 `$BRAIN_ROI_DATA_DIR` 非空, 则返回其值;
/// 2. 否则, 返回 `$HOME/dataset/func`.
pub fn data_dir_from_env_or_home() -> PathBuf {
    dir_from_env_or_home("BRAIN_ROI_DATA_DIR", &["func"])
}

/// 从 `$BRAIN_ROI_DATA_DIR` 或者 `$HOME/dataset/func` 下加载 `{id}.nii.gz`.
#[inline]
pub fn volume_loader_from_env_or_home() -> NiftiDirLoader {
    NiftiDirLoader::new(data_dir_from_env_or_home())
}
