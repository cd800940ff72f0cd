//! 脑区名到图谱通道索引集合的映射.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

use crate::error::{RoiError, RoiResult};

/// 复合脑区定义: `(复合脑区名, 组成它的基础标签名)`.
pub type CompositeDef<'a> = (&'a str, &'a [&'a str]);

/// Harvard-Oxford 皮层概率图谱上的复合脑区.
///
/// 每个复合脑区是若干基础标签的显式并集. 新增脑区只需在此追加一项.
pub const HARVARD_OXFORD_COMPOSITES: &[CompositeDef<'static>] = &[
    (
        "Prefrontal Cortex",
        &[
            "Frontal Pole",
            "Superior Frontal Gyrus",
            "Middle Frontal Gyrus",
            "Inferior Frontal Gyrus, pars triangularis",
            "Inferior Frontal Gyrus, pars opercularis",
            "Frontal Medial Cortex",
            "Paracingulate Gyrus",
            "Cingulate Gyrus, anterior division",
            "Frontal Orbital Cortex",
        ],
    ),
    (
        "Temporal Lobe",
        &[
            "Temporal Pole",
            "Superior Temporal Gyrus, anterior division",
            "Superior Temporal Gyrus, posterior division",
            "Middle Temporal Gyrus, anterior division",
            "Middle Temporal Gyrus, posterior division",
            "Middle Temporal Gyrus, temporooccipital part",
            "Inferior Temporal Gyrus, anterior division",
            "Inferior Temporal Gyrus, posterior division",
            "Inferior Temporal Gyrus, temporooccipital part",
            "Parahippocampal Gyrus, anterior division",
            "Parahippocampal Gyrus, posterior division",
            "Temporal Fusiform Cortex, anterior division",
            "Temporal Fusiform Cortex, posterior division",
            "Temporal Occipital Fusiform Cortex",
            "Planum Polare",
            "Heschl's Gyrus (includes H1 and H2)",
            "Planum Temporale",
        ],
    ),
];

/// 内置复合脑区的类型化句柄.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Region {
    /// 前额叶皮层.
    PrefrontalCortex,

    /// 颞叶.
    TemporalLobe,
}

impl Region {
    /// 所有内置复合脑区.
    pub const ALL: [Region; 2] = [Region::PrefrontalCortex, Region::TemporalLobe];

    /// 脑区名, 与 [`HARVARD_OXFORD_COMPOSITES`] 中的名字一致.
    #[inline]
    pub const fn name(&self) -> &'static str {
        match self {
            Region::PrefrontalCortex => "Prefrontal Cortex",
            Region::TemporalLobe => "Temporal Lobe",
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Region {
    type Err = RoiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Region::ALL
            .into_iter()
            .find(|r| r.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| RoiError::UnknownRegion(s.to_string()))
    }
}

impl AsRef<str> for Region {
    #[inline]
    fn as_ref(&self) -> &str {
        self.name()
    }
}

/// 脑区在索引中的种类.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RegionKind {
    /// 图谱自带的单通道标签.
    Primitive,

    /// 若干基础标签的并集.
    Composite,
}

/// 脑区索引. 构建完成后只读.
///
/// 基础标签按图谱原生顺序获得连续的通道号 (背景已被排除);
/// 复合脑区在构建时即对照当前标签表校验, 而不是在构建掩码时.
#[derive(Debug, Clone)]
pub struct AtlasIndex {
    regions: HashMap<String, (RegionKind, BTreeSet<usize>)>,
    order: Vec<String>,
}

impl AtlasIndex {
    /// 由图谱标签和复合脑区表构建索引.
    ///
    /// # 返回值
    ///
    /// - 复合脑区引用了不存在的基础标签时, 返回 `Err(RoiError::InvalidComposite)`;
    /// - 复合脑区名与已有名字重复时, 返回 `Err(RoiError::DuplicateRegion)`;
    /// - 其他情况下成功.
    pub fn new<S: AsRef<str>>(labels: &[S], composites: &[CompositeDef<'_>]) -> RoiResult<Self> {
        let mut regions = HashMap::with_capacity(labels.len() + composites.len());
        let mut order = Vec::with_capacity(labels.len() + composites.len());

        for (channel, label) in labels.iter().enumerate() {
            let label = label.as_ref().to_string();
            // 图谱标签重名时保留第一个通道.
            if regions.contains_key(&label) {
                log::warn!("atlas label `{label}` repeated at channel {channel}, ignored");
                continue;
            }
            regions.insert(
                label.clone(),
                (RegionKind::Primitive, BTreeSet::from([channel])),
            );
            order.push(label);
        }

        for (name, parts) in composites {
            if regions.contains_key(*name) {
                return Err(RoiError::DuplicateRegion(name.to_string()));
            }
            let mut channels = BTreeSet::new();
            for part in parts.iter() {
                match regions.get(*part) {
                    Some((RegionKind::Primitive, c)) => channels.extend(c.iter().copied()),
                    _ => {
                        return Err(RoiError::InvalidComposite {
                            composite: name.to_string(),
                            missing: part.to_string(),
                        })
                    }
                }
            }
            regions.insert(name.to_string(), (RegionKind::Composite, channels));
            order.push(name.to_string());
        }

        Ok(Self { regions, order })
    }

    /// 由图谱标签构建索引, 并注册 [`HARVARD_OXFORD_COMPOSITES`].
    #[inline]
    pub fn harvard_oxford<S: AsRef<str>>(labels: &[S]) -> RoiResult<Self> {
        Self::new(labels, HARVARD_OXFORD_COMPOSITES)
    }

    /// 获取脑区 `name` 对应的通道索引集合. 重复调用结果一致.
    ///
    /// 若 `name` 既不是基础标签也不是已注册的复合脑区,
    /// 返回 `Err(RoiError::UnknownRegion)`.
    pub fn get_region_channels(&self, name: &str) -> RoiResult<&BTreeSet<usize>> {
        self.regions
            .get(name)
            .map(|(_, c)| c)
            .ok_or_else(|| RoiError::UnknownRegion(name.to_string()))
    }

    /// 脑区种类. 未知脑区返回 `None`.
    #[inline]
    pub fn kind(&self, name: &str) -> Option<RegionKind> {
        self.regions.get(name).map(|(k, _)| *k)
    }

    /// 是否为复合脑区?
    #[inline]
    pub fn is_composite(&self, name: &str) -> bool {
        matches!(self.kind(name), Some(RegionKind::Composite))
    }

    /// 按注册顺序 (先基础标签, 后复合脑区) 迭代所有脑区名.
    #[inline]
    pub fn region_names(&self) -> impl ExactSizeIterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    /// 脑区总数.
    #[inline]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// 是否没有任何脑区?
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
