//! 将构建好的数据集写出为 npz 归档.

use std::fs::File;
use std::path::Path;

use ndarray::Array2;
use ndarray_npy::{NpzReader, NpzWriter};

use super::builder::DatasetResult;
use crate::error::RoiResult;

/// 归档中的数组名.
pub const NPZ_ENTRIES: [&str; 4] = ["x_train", "x_valid", "y_train", "y_valid"];

impl DatasetResult {
    /// 将 `x_train`, `x_valid`, `y_train`, `y_valid` 写入 `path` (未压缩 npz).
    pub fn write_npz<P: AsRef<Path>>(&self, path: P) -> RoiResult<()> {
        let file = File::create(path.as_ref())?;
        let mut npz = NpzWriter::new(file);
        let arrays = [&self.x_train, &self.x_valid, &self.y_train, &self.y_valid];
        for (name, arr) in NPZ_ENTRIES.into_iter().zip(arrays) {
            npz.add_array(name, arr)?;
        }
        npz.finish()?;
        log::info!("dataset written to {}", path.as_ref().display());
        Ok(())
    }
}

/// 从 [`DatasetResult::write_npz`] 写出的归档读回四个矩阵,
/// 顺序同 [`NPZ_ENTRIES`].
pub fn read_npz<P: AsRef<Path>>(path: P) -> RoiResult<[Array2<f64>; 4]> {
    let file = File::open(path.as_ref())?;
    let mut npz = NpzReader::new(file)?;
    Ok([
        npz.by_name(NPZ_ENTRIES[0])?,
        npz.by_name(NPZ_ENTRIES[1])?,
        npz.by_name(NPZ_ENTRIES[2])?,
        npz.by_name(NPZ_ENTRIES[3])?,
    ])
}
