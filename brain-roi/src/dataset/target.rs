//! 预测目标查询.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::consts::PARTICIPANT_ID_COLUMN;
use crate::error::{RoiError, RoiResult};

/// 按受试者 id 查询预测目标 (一个或多个数值). 会被多个工作线程同时调用.
pub trait TargetLookup: Sync {
    /// 查询受试者 `id` 的目标. 找不到时返回 `None`, 该受试者会被跳过.
    fn target(&self, id: &str) -> Option<Vec<f64>>;
}

impl TargetLookup for HashMap<String, f64> {
    #[inline]
    fn target(&self, id: &str) -> Option<Vec<f64>> {
        self.get(id).map(|v| vec![*v])
    }
}

impl TargetLookup for HashMap<String, Vec<f64>> {
    #[inline]
    fn target(&self, id: &str) -> Option<Vec<f64>> {
        self.get(id).cloned()
    }
}

/// 制表符分隔的受试者信息表 (BIDS `participants.tsv`).
///
/// 第一行是表头. 只保留所有目标列都能解析为数值的行; `n/a` 等非数值单元格所在的行被忽略,
/// 对应受试者在构建数据集时会因缺少目标而被跳过.
#[derive(Debug, Clone, Default)]
pub struct ParticipantsTable {
    columns: Vec<String>,
    rows: HashMap<String, Vec<f64>>,
}

impl ParticipantsTable {
    /// 读取并解析 `path`.
    ///
    /// 文件无法读取时返回 `Err(RoiError::Io)`; 表头缺少 `id_column` 或任一
    /// `target_columns` 时返回 `Err(RoiError::MissingColumn)`.
    pub fn open<P: AsRef<Path>>(
        path: P,
        id_column: &str,
        target_columns: &[&str],
    ) -> RoiResult<Self> {
        let text = fs::read_to_string(path.as_ref())?;
        Self::parse(&text, id_column, target_columns)
    }

    /// 读取 BIDS 格式的 `participants.tsv`, id 列为 [`PARTICIPANT_ID_COLUMN`].
    #[inline]
    pub fn open_bids<P: AsRef<Path>>(path: P, target_columns: &[&str]) -> RoiResult<Self> {
        Self::open(path, PARTICIPANT_ID_COLUMN, target_columns)
    }

    /// 解析表格文本. 规则同 [`Self::open`].
    pub fn parse(text: &str, id_column: &str, target_columns: &[&str]) -> RoiResult<Self> {
        let mut lines = text.lines().filter(|l| !l.trim().is_empty());
        let header: Vec<&str> = lines
            .next()
            .map(|h| h.split('\t').map(str::trim).collect())
            .unwrap_or_default();
        let position = |name: &str| {
            header
                .iter()
                .position(|h| *h == name)
                .ok_or_else(|| RoiError::MissingColumn(name.to_string()))
        };
        let id_pos = position(id_column)?;
        let target_pos = target_columns
            .iter()
            .map(|c| position(c))
            .collect::<RoiResult<Vec<_>>>()?;

        let mut rows = HashMap::new();
        let mut dropped = 0usize;
        for line in lines {
            let cells: Vec<&str> = line.split('\t').map(str::trim).collect();
            let Some(id) = cells.get(id_pos) else {
                dropped += 1;
                continue;
            };
            let values: Option<Vec<f64>> = target_pos
                .iter()
                .map(|&p| cells.get(p).and_then(|c| parse_cell(c)))
                .collect();
            match values {
                Some(v) => {
                    rows.insert(id.to_string(), v);
                }
                None => dropped += 1,
            }
        }
        if dropped > 0 {
            log::debug!("participants table: {dropped} rows without numeric targets");
        }

        Ok(Self {
            columns: target_columns.iter().map(|c| c.to_string()).collect(),
            rows,
        })
    }

    /// 目标列名.
    #[inline]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// 有完整数值目标的受试者个数.
    #[inline]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// 是否没有任何有效行?
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// 所有有效受试者 id, 顺序不定.
    #[inline]
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.rows.keys().map(String::as_str)
    }
}

impl TargetLookup for ParticipantsTable {
    #[inline]
    fn target(&self, id: &str) -> Option<Vec<f64>> {
        self.rows.get(id).cloned()
    }
}

/// 解析单元格. 非有限数值 (包括 `n/a`) 返回 `None`.
fn parse_cell(cell: &str) -> Option<f64> {
    cell.parse::<f64>().ok().filter(|v| v.is_finite())
}
