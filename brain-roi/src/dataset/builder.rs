//! 从受试者体数据构建特征矩阵与目标矩阵, 并划分训练集/验证集.

use std::ops::Range;

use itertools::{izip, Itertools};
use ndarray::{s, Array2, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use super::loader::VolumeLoader;
use super::target::TargetLookup;
use crate::align::VolumeAligner;
use crate::atlas::{Atlas, AtlasIndex, MaskBuilder};
use crate::config::{PipelineConfig, PruneScope};
use crate::consts::{TRAIN_DENOM, TRAIN_NUMER};
use crate::data::{GridAttr, Mask};
use crate::error::{LoadError, RoiError, RoiResult};
use crate::extract::extract;

cfg_if::cfg_if! {
    if #[cfg(feature = "rayon")] {
        use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
        use rayon::ThreadPoolBuilder;
    }
}

/// 训练集/验证集划分. `[0, index)` 为训练集, `[index, len)` 为验证集.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Split {
    index: usize,
    len: usize,
}

impl Split {
    /// 按 2:1 划分 `len` 个样本, 划分点向下取整.
    #[inline]
    pub fn new(len: usize) -> Self {
        Self {
            index: len * TRAIN_NUMER / TRAIN_DENOM,
            len,
        }
    }

    /// 划分点.
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    /// 样本总数.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// 是否没有样本?
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// 训练集行范围.
    #[inline]
    pub fn train_range(&self) -> Range<usize> {
        0..self.index
    }

    /// 验证集行范围.
    #[inline]
    pub fn valid_range(&self) -> Range<usize> {
        self.index..self.len
    }
}

/// 被跳过的受试者及原因.
#[derive(Debug)]
pub struct SkippedSubject {
    /// 受试者 id.
    pub id: String,

    /// 跳过原因.
    pub cause: LoadError,
}

/// 数据集构建结果.
///
/// `x_*` 与 `y_*` 的第 `i` 行总是同一个受试者, 即 `subjects[i]` (验证集从 `split.index()` 开始).
#[derive(Debug)]
pub struct DatasetResult {
    /// 训练集特征.
    pub x_train: Array2<f64>,

    /// 验证集特征.
    pub x_valid: Array2<f64>,

    /// 训练集目标.
    pub y_train: Array2<f64>,

    /// 验证集目标.
    pub y_valid: Array2<f64>,

    /// 被跳过的受试者, 按洗牌后的顺序.
    pub skipped: Vec<SkippedSubject>,

    /// 划分.
    pub split: Split,

    /// 成功加载的受试者, 按行顺序.
    pub subjects: Vec<String>,

    /// 剔除零列后保留的列在原始展平特征中的索引.
    pub kept_columns: Vec<usize>,
}

impl DatasetResult {
    /// 成功加载的受试者个数.
    #[inline]
    pub fn loaded(&self) -> usize {
        self.split.len()
    }

    /// 特征维数.
    #[inline]
    pub fn n_features(&self) -> usize {
        self.kept_columns.len()
    }
}

/// 单个受试者的特征行与目标.
struct Sample {
    row: Vec<f64>,
    target: Vec<f64>,
}

/// 数据集构建器.
#[derive(Copy, Clone, Debug, Default)]
pub struct DatasetBuilder {
    config: PipelineConfig,
}

impl DatasetBuilder {
    /// 使用配置 `config` 创建.
    #[inline]
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// 当前配置.
    #[inline]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// 以已构建好的掩码 `mask` 构建数据集.
    ///
    /// 受试者顺序先按种子洗牌, 然后并行地加载, 对齐, 提取并展平. 单个受试者的加载失败
    /// (包括缺少目标) 只会记入 [`DatasetResult::skipped`]. 以下情况返回 `Err`:
    ///
    /// - 特征行长度不一致, 返回 `Err(RoiError::JaggedBatch)`;
    /// - 配准或提取失败 (例如仿射矩阵奇异);
    /// - 无法创建工作线程池.
    pub fn build<S, L, T>(
        &self,
        mask: &Mask,
        subject_ids: &[S],
        loader: &L,
        targets: &T,
    ) -> RoiResult<DatasetResult>
    where
        S: AsRef<str>,
        L: VolumeLoader + ?Sized,
        T: TargetLookup + ?Sized,
    {
        let mut ids: Vec<String> = subject_ids.iter().map(|s| s.as_ref().to_string()).collect();
        let mut rng = StdRng::seed_from_u64(self.config.seed);
        ids.shuffle(&mut rng);

        let workers = self.config.effective_workers();
        log::info!(
            "building dataset: {} subjects, {} mask voxels, {workers} workers",
            ids.len(),
            mask.count()
        );

        let aligner = VolumeAligner::new(self.config.affine_tolerance);
        let process = |id: &String| process_subject(id, mask, &aligner, loader, targets);

        #[cfg(feature = "rayon")]
        let outcomes: Vec<_> = {
            let pool = ThreadPoolBuilder::new().num_threads(workers).build()?;
            log::debug!("thread pool ready with {} threads", pool.current_num_threads());
            pool.install(|| ids.par_iter().map(process).collect())
        };
        #[cfg(not(feature = "rayon"))]
        let outcomes: Vec<_> = ids.iter().map(process).collect();

        // 按洗牌顺序 (而不是完成顺序) 汇总.
        let mut samples = Vec::with_capacity(ids.len());
        let mut subjects = Vec::with_capacity(ids.len());
        let mut skipped = Vec::new();
        for (id, outcome) in ids.into_iter().zip(outcomes) {
            match outcome? {
                Ok(sample) => {
                    if let Some(cause) = check_consistency(&samples, &sample, &id)? {
                        log::warn!("skipping subject `{id}`: {cause}");
                        skipped.push(SkippedSubject { id, cause });
                    } else {
                        samples.push(sample);
                        subjects.push(id);
                    }
                }
                Err(cause) => {
                    log::warn!("skipping subject `{id}`: {cause}");
                    skipped.push(SkippedSubject { id, cause });
                }
            }
        }

        let (x, y) = stack(&samples);
        drop(samples);
        let split = Split::new(x.nrows());

        let decide_rows = match self.config.prune {
            PruneScope::FullBatch => 0..split.len(),
            PruneScope::TrainingOnly => split.train_range(),
        };
        let kept_columns = nonzero_columns(x.view(), decide_rows);
        log::debug!(
            "pruned {} of {} columns",
            x.ncols() - kept_columns.len(),
            x.ncols()
        );
        let x = x.select(Axis(1), &kept_columns);

        let i = split.index();
        let result = DatasetResult {
            x_train: x.slice(s![..i, ..]).to_owned(),
            x_valid: x.slice(s![i.., ..]).to_owned(),
            y_train: y.slice(s![..i, ..]).to_owned(),
            y_valid: y.slice(s![i.., ..]).to_owned(),
            skipped,
            split,
            subjects,
            kept_columns,
        };
        log::info!(
            "dataset built: {} train, {} valid, {} skipped, {} features",
            result.x_train.nrows(),
            result.x_valid.nrows(),
            result.skipped.len(),
            result.n_features()
        );
        Ok(result)
    }
}

/// 先为 `region` 构建掩码, 再构建数据集.
///
/// 未知脑区返回 `Err(RoiError::UnknownRegion)`; 其余同 [`DatasetBuilder::build`].
pub fn build_dataset<S, L, T>(
    atlas: &Atlas,
    index: &AtlasIndex,
    region: &str,
    subject_ids: &[S],
    loader: &L,
    targets: &T,
    config: PipelineConfig,
) -> RoiResult<DatasetResult>
where
    S: AsRef<str>,
    L: VolumeLoader + ?Sized,
    T: TargetLookup + ?Sized,
{
    let mask = MaskBuilder::new(atlas, index)
        .with_threshold(config.threshold)
        .build(region)?;
    DatasetBuilder::new(config).build(&mask, subject_ids, loader, targets)
}

/// 处理单个受试者. 外层 `Err` 是致命错误, 内层 `Err` 表示跳过.
fn process_subject<L, T>(
    id: &str,
    mask: &Mask,
    aligner: &VolumeAligner,
    loader: &L,
    targets: &T,
) -> RoiResult<Result<Sample, LoadError>>
where
    L: VolumeLoader + ?Sized,
    T: TargetLookup + ?Sized,
{
    let Some(target) = targets.target(id) else {
        return Ok(Err(LoadError::MissingTarget));
    };
    let volume = match loader.load(id) {
        Ok(v) => v,
        Err(e) => return Ok(Err(e)),
    };
    if volume.affine().inverse().is_none() {
        return Ok(Err(LoadError::SingularAffine));
    }
    let mask = aligner.align_mask(mask, &volume)?;
    let roi = extract(&volume, &mask, aligner.tolerance())?;
    Ok(Ok(Sample {
        row: roi.to_feature_row(),
        target,
    }))
}

/// 与已接受的第一个样本比较. 目标宽度不一致时返回跳过原因;
/// 特征行长度不一致是致命错误.
fn check_consistency(
    accepted: &[Sample],
    sample: &Sample,
    id: &str,
) -> RoiResult<Option<LoadError>> {
    let Some(first) = accepted.first() else {
        return Ok(None);
    };
    if first.row.len() != sample.row.len() {
        return Err(RoiError::JaggedBatch {
            subject: id.to_string(),
            expected: first.row.len(),
            found: sample.row.len(),
        });
    }
    if first.target.len() != sample.target.len() {
        return Ok(Some(LoadError::TargetWidth {
            expected: first.target.len(),
            found: sample.target.len(),
        }));
    }
    Ok(None)
}

/// 将样本堆叠为特征矩阵和目标矩阵. 各样本的长度已由调用者保证一致.
fn stack(samples: &[Sample]) -> (Array2<f64>, Array2<f64>) {
    let n = samples.len();
    let (n_feat, n_tgt) = samples
        .first()
        .map_or((0, 0), |s| (s.row.len(), s.target.len()));
    let mut x = Array2::<f64>::zeros((n, n_feat));
    let mut y = Array2::<f64>::zeros((n, n_tgt));
    for (mut xr, mut yr, s) in izip!(x.rows_mut(), y.rows_mut(), samples) {
        xr.iter_mut().zip(&s.row).for_each(|(o, v)| *o = *v);
        yr.iter_mut().zip(&s.target).for_each(|(o, v)| *o = *v);
    }
    (x, y)
}

/// 在 `rows` 范围内至少有一个非零值的列.
pub fn nonzero_columns(x: ArrayView2<'_, f64>, rows: Range<usize>) -> Vec<usize> {
    x.slice(s![rows, ..])
        .axis_iter(Axis(1))
        .positions(|col| col.iter().any(|v| *v != 0.0))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Affine, Grid, Volume};
    use crate::error::LoadResult;
    use ndarray::{array, Array, Array3};
    use std::collections::HashMap;

    fn ids(n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("sub-{i:02}")).collect()
    }

    fn targets(ids: &[String]) -> HashMap<String, f64> {
        ids.iter()
            .enumerate()
            .map(|(i, id)| (id.clone(), i as f64 * 1.5 + 20.0))
            .collect()
    }

    /// 受试者编号决定体素值; 体素 `(0, 0, 0)` 始终为 0.
    fn synthetic(id: &str) -> LoadResult<Volume<f32>> {
        let k: usize = id.trim_start_matches("sub-").parse().unwrap_or(0);
        let data = Array::from_shape_fn((2, 2, 2, 3), |(x, y, z, t)| {
            if x + y + z == 0 {
                0.0
            } else {
                (k * 100 + x * 4 + y * 2 + z + t * 10) as f32
            }
        });
        Ok(Volume::from_4d(data, Affine::IDENTITY))
    }

    fn full_mask() -> Mask {
        Mask::new(Array3::from_elem((2, 2, 2), true), Affine::IDENTITY)
    }

    #[test]
    fn test_split_sizes() {
        for (n, index) in [(0, 0), (1, 0), (2, 1), (3, 2), (10, 6)] {
            let split = Split::new(n);
            assert_eq!(split.index(), index, "n = {n}");
            assert_eq!(split.train_range().len() + split.valid_range().len(), n);
        }
        assert!(Split::new(0).is_empty());
    }

    #[test]
    fn test_deterministic() {
        let ids = ids(9);
        let t = targets(&ids);
        let builder = DatasetBuilder::new(PipelineConfig::default().with_workers(3));
        let a = builder.build(&full_mask(), &ids, &synthetic, &t).unwrap();
        let b = builder.build(&full_mask(), &ids, &synthetic, &t).unwrap();
        assert_eq!(a.subjects, b.subjects);
        assert_eq!(a.x_train, b.x_train);
        assert_eq!(a.x_valid, b.x_valid);
        assert_eq!(a.y_train, b.y_train);
        assert_eq!(a.y_valid, b.y_valid);

        // 另一个种子通常得到不同的顺序, 但集合不变.
        let c = DatasetBuilder::new(PipelineConfig::default().with_seed(7))
            .build(&full_mask(), &ids, &synthetic, &t)
            .unwrap();
        let mut sa = a.subjects.clone();
        let mut sc = c.subjects.clone();
        sa.sort();
        sc.sort();
        assert_eq!(sa, sc);
    }

    #[test]
    fn test_rows_follow_targets() {
        let ids = ids(6);
        let t = targets(&ids);
        let r = DatasetBuilder::default()
            .build(&full_mask(), &ids, &synthetic, &t)
            .unwrap();
        let y: Vec<f64> = r.y_train.iter().chain(r.y_valid.iter()).copied().collect();
        for (row, id) in r.subjects.iter().enumerate() {
            assert_eq!(y[row], t[id]);
        }
        let x = ndarray::concatenate(Axis(0), &[r.x_train.view(), r.x_valid.view()]).unwrap();
        for (row, id) in r.subjects.iter().enumerate() {
            let k: usize = id.trim_start_matches("sub-").parse().unwrap();
            // 体素 (0, 0, 1) 在 t = 0 时的值.
            let col = r.kept_columns.iter().position(|c| *c == 3).unwrap();
            assert_eq!(x[[row, col]], (k * 100 + 1) as f64);
        }
    }

    #[test]
    fn test_one_failure_in_three() {
        let ids = ids(3);
        let t = targets(&ids);
        let loader = |id: &str| -> LoadResult<Volume<f32>> {
            if id == "sub-02" {
                Err(LoadError::UnexpectedDimensionality(2))
            } else {
                synthetic(id)
            }
        };
        let r = DatasetBuilder::default()
            .build(&full_mask(), &ids, &loader, &t)
            .unwrap();
        assert_eq!(r.loaded(), 2);
        assert_eq!(r.skipped.len(), 1);
        assert_eq!(r.skipped[0].id, "sub-02");
        assert!(matches!(r.skipped[0].cause, LoadError::UnexpectedDimensionality(2)));
        assert_eq!(r.x_train.nrows(), 1);
        assert_eq!(r.x_valid.nrows(), 1);
        assert_eq!(r.y_train.nrows() + r.y_valid.nrows(), 2);
        assert!(!r.subjects.contains(&"sub-02".to_string()));

        // 剩下的两行仍与各自的目标和体数据对应.
        let x = ndarray::concatenate(Axis(0), &[r.x_train.view(), r.x_valid.view()]).unwrap();
        let y = ndarray::concatenate(Axis(0), &[r.y_train.view(), r.y_valid.view()]).unwrap();
        let col = r.kept_columns.iter().position(|c| *c == 3).unwrap();
        for (row, id) in r.subjects.iter().enumerate() {
            let k: usize = id.trim_start_matches("sub-").parse().unwrap();
            assert_eq!(y[[row, 0]], t[id]);
            assert_eq!(x[[row, col]], (k * 100 + 1) as f64);
        }
    }

    #[test]
    fn test_singular_subject_affine_skipped() {
        let ids = ids(3);
        let t = targets(&ids);
        let mut m = Array3::from_elem((2, 2, 2), false);
        m[[1, 1, 1]] = true;
        let mask = Mask::new(m, Affine::IDENTITY);
        let loader = |id: &str| -> LoadResult<Volume<f32>> {
            let affine = if id == "sub-02" {
                Affine::new([[0.0; 4]; 4])
            } else {
                Affine::IDENTITY
            };
            Ok(Volume::from_3d(Array3::from_elem((2, 2, 2), 5.0), affine))
        };
        let r = DatasetBuilder::default().build(&mask, &ids, &loader, &t).unwrap();
        assert_eq!(r.loaded(), 2);
        assert_eq!(r.skipped.len(), 1);
        assert_eq!(r.skipped[0].id, "sub-02");
        assert!(matches!(r.skipped[0].cause, LoadError::SingularAffine));
        assert!(!r.subjects.contains(&"sub-02".to_string()));
        assert_eq!(r.n_features(), 1);
        assert!(r.x_train.iter().chain(r.x_valid.iter()).all(|v| *v == 5.0));
    }

    #[test]
    fn test_missing_target_skipped() {
        let ids = ids(4);
        let mut t = targets(&ids);
        t.remove("sub-03");
        let r = DatasetBuilder::default()
            .build(&full_mask(), &ids, &synthetic, &t)
            .unwrap();
        assert_eq!(r.loaded(), 3);
        assert!(matches!(r.skipped[0].cause, LoadError::MissingTarget));
    }

    #[test]
    fn test_target_width_skipped() {
        let ids = ids(3);
        let mut t: HashMap<String, Vec<f64>> =
            ids.iter().map(|id| (id.clone(), vec![1.0, 2.0])).collect();
        let r0 = DatasetBuilder::default()
            .build(&full_mask(), &ids, &synthetic, &t)
            .unwrap();
        // 洗牌后排在最后的受试者使用不同宽度的目标.
        let last = r0.subjects.last().unwrap().clone();
        t.insert(last.clone(), vec![1.0]);
        let r = DatasetBuilder::default()
            .build(&full_mask(), &ids, &synthetic, &t)
            .unwrap();
        assert_eq!(r.loaded(), 2);
        assert_eq!(r.skipped[0].id, last);
        assert!(matches!(
            r.skipped[0].cause,
            LoadError::TargetWidth { expected: 2, found: 1 }
        ));
        assert_eq!(r.y_train.ncols(), 2);
    }

    #[test]
    fn test_jagged_batch() {
        // 第二个受试者网格更大, 掩码重采样后体素数不同.
        let ids = ids(2);
        let t = targets(&ids);
        let loader = |id: &str| -> LoadResult<Volume<f32>> {
            let shape = if id == "sub-01" { (2, 2, 2) } else { (3, 2, 2) };
            Ok(Volume::from_3d(Array3::ones(shape), Affine::IDENTITY))
        };
        let err = DatasetBuilder::default()
            .build(&full_mask(), &ids, &loader, &t)
            .unwrap_err();
        assert!(matches!(err, RoiError::JaggedBatch { .. }));
    }

    #[test]
    fn test_shared_mask_on_matching_grid() {
        let grid = Grid::new([2, 2, 2], Affine::from_scaling([2.0, 2.0, 2.0]));
        let mask = Mask::new(Array3::from_elem((2, 2, 2), true), grid.affine);
        let ids = ids(3);
        let t = targets(&ids);
        let loader = |_: &str| -> LoadResult<Volume<f32>> {
            Ok(Volume::from_3d(Array3::from_elem((2, 2, 2), 1.0), grid.affine))
        };
        let r = DatasetBuilder::default().build(&mask, &ids, &loader, &t).unwrap();
        assert_eq!(r.n_features(), 8);
    }

    #[test]
    fn test_empty_batch() {
        let none: [&str; 0] = [];
        let r = DatasetBuilder::default()
            .build(&full_mask(), &none, &synthetic, &HashMap::<String, f64>::new())
            .unwrap();
        assert_eq!(r.loaded(), 0);
        assert_eq!(r.x_train.nrows(), 0);
        assert_eq!(r.x_valid.nrows(), 0);
    }

    #[test]
    fn test_pruning() {
        let ids = ids(4);
        let t = targets(&ids);
        let r = DatasetBuilder::default()
            .build(&full_mask(), &ids, &synthetic, &t)
            .unwrap();
        // 体素 (0, 0, 0) 的 3 个时间点恒为 0, 被剔除.
        assert_eq!(r.n_features(), 8 * 3 - 3);
        assert!(!r.kept_columns.contains(&0));
        assert_eq!(r.x_train.ncols(), r.n_features());
        assert_eq!(r.x_valid.ncols(), r.n_features());
    }

    #[test]
    fn test_nonzero_columns_scope() {
        let x = array![[0.0, 1.0, 0.0], [0.0, 0.0, 0.0], [0.0, 0.0, 5.0]];
        assert_eq!(nonzero_columns(x.view(), 0..3), vec![1, 2]);
        // 只看训练行时, 只在验证行出现的列被剔除.
        assert_eq!(nonzero_columns(x.view(), 0..2), vec![1]);
        assert!(nonzero_columns(x.view(), 0..0).is_empty());
    }

    #[test]
    fn test_training_only_prune_uses_train_columns() {
        let ids = ids(6);
        let t = targets(&ids);
        let r = DatasetBuilder::new(PipelineConfig::default().with_prune(PruneScope::TrainingOnly))
            .build(&full_mask(), &ids, &synthetic, &t)
            .unwrap();
        assert_eq!(r.x_valid.ncols(), r.x_train.ncols());
        for j in 0..r.x_train.ncols() {
            assert!(r.x_train.column(j).iter().any(|v| *v != 0.0));
        }
    }
}
