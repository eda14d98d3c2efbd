#![forbid(unsafe_code)]

use super::{
    DamosAccessPattern, DamosFilter, DamosQuotas, DamosStats, DamosTriedRegion, DamosWatermarks,
    decode_list, encode_list,
};
use crate::error::DecodeError;
use crate::fmt::indent_lines;
use crate::kvpairs::KvMap;
use std::fmt;
use std::str::FromStr;

/// What a scheme does to the regions matching its access pattern.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum DamosAction {
    Willneed,
    Cold,
    Pageout,
    Hugepage,
    Nohugepage,
    LruPrio,
    LruDeprio,
    /// Only count matching regions.
    #[default]
    Stat,
}

impl DamosAction {
    pub const ALL: [DamosAction; 8] = [
        Self::Willneed,
        Self::Cold,
        Self::Pageout,
        Self::Hugepage,
        Self::Nohugepage,
        Self::LruPrio,
        Self::LruDeprio,
        Self::Stat,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Willneed => "willneed",
            Self::Cold => "cold",
            Self::Pageout => "pageout",
            Self::Hugepage => "hugepage",
            Self::Nohugepage => "nohugepage",
            Self::LruPrio => "lru_prio",
            Self::LruDeprio => "lru_deprio",
            Self::Stat => "stat",
        }
    }

    /// Numeric code of the legacy debugfs `schemes` file, which predates the
    /// LRU sorting actions.
    pub fn debugfs_code(&self) -> Option<u64> {
        match self {
            Self::Willneed => Some(0),
            Self::Cold => Some(1),
            Self::Pageout => Some(2),
            Self::Hugepage => Some(3),
            Self::Nohugepage => Some(4),
            Self::Stat => Some(5),
            Self::LruPrio | Self::LruDeprio => None,
        }
    }

    pub fn from_debugfs_code(code: u64) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|action| action.debugfs_code() == Some(code))
    }
}

impl fmt::Display for DamosAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DamosAction {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|action| action.as_str() == s)
            .ok_or_else(|| DecodeError::UnknownVariant {
                kind: "damos action",
                value: s.to_string(),
            })
    }
}

/// A DAMON-based operation scheme: apply `action` to regions matching
/// `access_pattern`, gated by quotas, watermarks and filters.
///
/// `stats` and `tried_regions` are filled in from the kernel on request and
/// take no part in equality.
#[derive(Debug, Clone)]
pub struct Damos {
    pub name: String,
    pub access_pattern: DamosAccessPattern,
    pub action: DamosAction,
    pub quotas: DamosQuotas,
    pub watermarks: DamosWatermarks,
    pub filters: Vec<DamosFilter>,
    pub stats: Option<DamosStats>,
    pub tried_regions: Option<Vec<DamosTriedRegion>>,
}

impl Damos {
    const ENTITY: &'static str = "scheme";

    pub fn new(
        name: impl Into<String>,
        access_pattern: DamosAccessPattern,
        action: DamosAction,
        quotas: DamosQuotas,
        watermarks: DamosWatermarks,
        filters: Vec<DamosFilter>,
    ) -> Self {
        Self {
            name: name.into(),
            access_pattern,
            action,
            quotas,
            watermarks,
            filters,
            stats: None,
            tried_regions: None,
        }
    }

    pub fn to_kvpairs(&self) -> KvMap {
        KvMap::new()
            .with("name", self.name.as_str())
            .with("action", self.action.as_str())
            .with("access_pattern", self.access_pattern.to_kvpairs())
            .with("quotas", self.quotas.to_kvpairs())
            .with("watermarks", self.watermarks.to_kvpairs())
            .with("filters", encode_list(&self.filters, DamosFilter::to_kvpairs))
    }

    pub fn from_kvpairs(kv: &KvMap) -> Result<Self, DecodeError> {
        let e = Self::ENTITY;
        let name = kv.str(e, "name")?;
        let access_pattern = match kv.opt_map(e, "access_pattern")? {
            Some(pattern) => DamosAccessPattern::from_kvpairs(pattern)?,
            None => DamosAccessPattern::default(),
        };
        let action = match kv.opt_str(e, "action")? {
            Some(action) => action.parse()?,
            None => DamosAction::default(),
        };
        let quotas = match kv.opt_map(e, "quotas")? {
            Some(quotas) => DamosQuotas::from_kvpairs(quotas)?,
            None => DamosQuotas::default(),
        };
        let watermarks = match kv.opt_map(e, "watermarks")? {
            Some(watermarks) => DamosWatermarks::from_kvpairs(watermarks)?,
            None => DamosWatermarks::default(),
        };
        let filters = decode_list(kv, e, "filters", DamosFilter::from_kvpairs)?;
        Ok(Self::new(name, access_pattern, action, quotas, watermarks, filters))
    }
}

impl fmt::Display for Damos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} (action: {})", self.name, self.action)?;
        writeln!(f, "target access pattern")?;
        writeln!(f, "{}", indent_lines(&self.access_pattern.to_string(), 4))?;
        writeln!(f, "quotas")?;
        writeln!(f, "{}", indent_lines(&self.quotas.to_string(), 4))?;
        writeln!(f, "watermarks")?;
        writeln!(f, "{}", indent_lines(&self.watermarks.to_string(), 4))?;
        write!(f, "filters")?;
        for filter in &self.filters {
            write!(f, "\n{}", indent_lines(&filter.to_string(), 4))?;
        }
        if let Some(stats) = &self.stats {
            write!(f, "\nstatistics\n{}", indent_lines(&stats.to_string(), 4))?;
        }
        if let Some(regions) = &self.tried_regions {
            write!(f, "\ntried regions")?;
            for region in regions {
                write!(f, "\n{}", indent_lines(&region.to_string(), 4))?;
            }
        }
        Ok(())
    }
}

impl PartialEq for Damos {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.access_pattern == other.access_pattern
            && self.action == other.action
            && self.quotas == other.quotas
            && self.watermarks == other.watermarks
            && self.filters == other.filters
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FilterType, NrAccesses, NrAccessesUnit, WatermarkMetric};
    use pretty_assertions::assert_eq;

    fn pageout_scheme() -> Damos {
        Damos::new(
            "cold_pages",
            DamosAccessPattern::new(
                "4KiB",
                "max",
                NrAccesses::new("0%", "0%", NrAccessesUnit::Percent).unwrap(),
                crate::model::Age::new("2m", "max", crate::model::AgeUnit::Usec).unwrap(),
            )
            .unwrap(),
            DamosAction::Pageout,
            DamosQuotas::new("10ms", "128MiB", "1s").unwrap(),
            DamosWatermarks::new(WatermarkMetric::FreeMemRate, "5s", 500, 400, 200).unwrap(),
            vec![DamosFilter::new("0", FilterType::Anon, "", true)],
        )
    }

    #[test]
    fn name_only_scheme_takes_defaults() {
        let kv = KvMap::new().with("name", "0");
        let scheme = Damos::from_kvpairs(&kv).unwrap();
        assert_eq!(scheme.name, "0");
        assert_eq!(scheme.action, DamosAction::Stat);
        assert_eq!(scheme.access_pattern, DamosAccessPattern::default());
        assert_eq!(scheme.access_pattern.min_sz_bytes, 0);
        assert_eq!(scheme.access_pattern.max_sz_bytes, u64::MAX);
        assert_eq!(scheme.quotas, DamosQuotas::default());
        assert!(scheme.quotas.is_unlimited());
        assert_eq!(scheme.watermarks.metric, WatermarkMetric::None);
        assert!(scheme.filters.is_empty());
        assert!(scheme.stats.is_none());
        assert!(scheme.tried_regions.is_none());
    }

    #[test]
    fn scheme_requires_name() {
        let kv = KvMap::new().with("action", "pageout");
        assert_eq!(
            Damos::from_kvpairs(&kv),
            Err(DecodeError::MissingField {
                entity: "scheme",
                field: "name"
            })
        );
    }

    #[test]
    fn scheme_roundtrip() {
        let scheme = pageout_scheme();
        let kv = scheme.to_kvpairs();
        assert_eq!(
            kv.keys().collect::<Vec<_>>(),
            ["name", "action", "access_pattern", "quotas", "watermarks", "filters"]
        );
        assert_eq!(kv, scheme.to_kvpairs());
        assert_eq!(Damos::from_kvpairs(&kv).unwrap(), scheme);
    }

    #[test]
    fn equality_ignores_stats_and_tried_regions() {
        let mut refreshed = pageout_scheme();
        refreshed.stats = Some(DamosStats {
            nr_tried: 42,
            ..DamosStats::default()
        });
        refreshed.tried_regions = Some(vec![DamosTriedRegion {
            start: 0,
            end: 4_096,
            nr_accesses: 0,
            age: 3,
        }]);
        assert_eq!(refreshed, pageout_scheme());

        let mut other_stats = refreshed.clone();
        other_stats.stats = Some(DamosStats {
            nr_tried: 7,
            ..DamosStats::default()
        });
        assert_eq!(refreshed, other_stats);
    }

    #[test]
    fn equality_covers_filters() {
        let mut unfiltered = pageout_scheme();
        unfiltered.filters.clear();
        assert_ne!(unfiltered, pageout_scheme());
    }

    #[test]
    fn action_codes() {
        assert_eq!("lru_prio".parse::<DamosAction>().unwrap(), DamosAction::LruPrio);
        assert!("swapout".parse::<DamosAction>().is_err());
        assert_eq!(DamosAction::Stat.debugfs_code(), Some(5));
        assert_eq!(DamosAction::LruDeprio.debugfs_code(), None);
        assert_eq!(DamosAction::from_debugfs_code(2), Some(DamosAction::Pageout));
        assert_eq!(DamosAction::from_debugfs_code(9), None);
    }

    #[test]
    fn display_lists_refreshed_data() {
        let mut scheme = Damos::from_kvpairs(&KvMap::new().with("name", "0")).unwrap();
        assert!(!scheme.to_string().contains("statistics"));
        scheme.stats = Some(DamosStats::default());
        scheme.tried_regions = Some(Vec::new());
        let text = scheme.to_string();
        assert!(text.starts_with("0 (action: stat)\ntarget access pattern\n"));
        assert!(text.contains("\nstatistics\n    tried 0 times (0 B)"));
        assert!(text.ends_with("\ntried regions"));
    }
}
