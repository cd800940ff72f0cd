//! 受试者体数据加载器.

use std::path::{Path, PathBuf};

use crate::consts::NIFTI_GZ_EXT;
use crate::data::Volume;
use crate::error::LoadResult;

/// 文件名构造器. 接受受试者 id, 获得文件名.
pub type FilenameBuilder = fn(&str) -> String;

/// 按受试者 id 加载体数据. 加载器会被多个工作线程同时调用.
pub trait VolumeLoader: Sync {
    /// 加载受试者 `id` 的体数据. 失败只影响该受试者.
    fn load(&self, id: &str) -> LoadResult<Volume<f32>>;
}

impl<F> VolumeLoader for F
where
    F: Fn(&str) -> LoadResult<Volume<f32>> + Sync,
{
    #[inline]
    fn load(&self, id: &str) -> LoadResult<Volume<f32>> {
        self(id)
    }
}

/// 默认文件名: `{id}.nii.gz`.
pub fn default_filename(id: &str) -> String {
    format!("{id}.{NIFTI_GZ_EXT}")
}

/// 从单个目录加载 nifti 体数据, 并在内部自动转换文件名.
#[derive(Debug, Clone)]
pub struct NiftiDirLoader {
    dir: PathBuf,
    builder: FilenameBuilder,
}

impl NiftiDirLoader {
    /// 使用默认文件名构造器 [`default_filename`] 创建.
    ///
    /// 目录不存在时不会立即报错, 而是在加载每个受试者时返回 I/O 错误.
    #[inline]
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self::with_builder(dir, default_filename)
    }

    /// 使用自定义文件名构造器创建.
    #[inline]
    pub fn with_builder<P: AsRef<Path>>(dir: P, builder: FilenameBuilder) -> Self {
        Self {
            dir: dir.as_ref().to_owned(),
            builder,
        }
    }

    /// 数据目录.
    #[inline]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// 受试者 `id` 对应的完整路径.
    #[inline]
    pub fn path_of(&self, id: &str) -> PathBuf {
        self.dir.join((self.builder)(id))
    }
}

impl VolumeLoader for NiftiDirLoader {
    fn load(&self, id: &str) -> LoadResult<Volume<f32>> {
        Volume::open(self.path_of(id))
    }
}
