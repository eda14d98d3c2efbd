#![forbid(unsafe_code)]

//! Optional DAMON capabilities, in the order kernels gained them.

use crate::error::DecodeError;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Feature {
    /// Kernel-side access recording. Never merged upstream.
    Record,
    Schemes,
    InitRegions,
    Vaddr,
    Fvaddr,
    Paddr,
    InitRegionsTargetIdx,
    SchemesSpeedLimit,
    SchemesQuotas,
    SchemesPrioritization,
    SchemesWmarks,
    SchemesStatSucc,
    SchemesStatQtExceed,
    SchemesTriedRegions,
    SchemesFilters,
}

impl Feature {
    pub const ALL: [Feature; 15] = [
        Self::Record,
        Self::Schemes,
        Self::InitRegions,
        Self::Vaddr,
        Self::Fvaddr,
        Self::Paddr,
        Self::InitRegionsTargetIdx,
        Self::SchemesSpeedLimit,
        Self::SchemesQuotas,
        Self::SchemesPrioritization,
        Self::SchemesWmarks,
        Self::SchemesStatSucc,
        Self::SchemesStatQtExceed,
        Self::SchemesTriedRegions,
        Self::SchemesFilters,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Record => "record",
            Self::Schemes => "schemes",
            Self::InitRegions => "init_regions",
            Self::Vaddr => "vaddr",
            Self::Fvaddr => "fvaddr",
            Self::Paddr => "paddr",
            Self::InitRegionsTargetIdx => "init_regions_target_idx",
            Self::SchemesSpeedLimit => "schemes_speed_limit",
            Self::SchemesQuotas => "schemes_quotas",
            Self::SchemesPrioritization => "schemes_prioritization",
            Self::SchemesWmarks => "schemes_wmarks",
            Self::SchemesStatSucc => "schemes_stat_succ",
            Self::SchemesStatQtExceed => "schemes_stat_qt_exceed",
            Self::SchemesTriedRegions => "schemes_tried_regions",
            Self::SchemesFilters => "schemes_filters",
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Feature {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|feature| feature.as_str() == s)
            .ok_or_else(|| DecodeError::UnknownVariant {
                kind: "feature",
                value: s.to_string(),
            })
    }
}

/// Features the selected interface was found to support.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeatureSet {
    supported: BTreeSet<Feature>,
}

impl FeatureSet {
    pub fn new(supported: impl IntoIterator<Item = Feature>) -> Self {
        Self {
            supported: supported.into_iter().collect(),
        }
    }

    pub fn insert(&mut self, feature: Feature) {
        self.supported.insert(feature);
    }

    pub fn is_supported(&self, feature: Feature) -> bool {
        self.supported.contains(&feature)
    }

    /// Unknown feature names are reported as unsupported.
    pub fn supported(&self, name: &str) -> bool {
        name.parse()
            .map(|feature| self.is_supported(feature))
            .unwrap_or(false)
    }

    pub fn iter(&self) -> impl Iterator<Item = Feature> + '_ {
        self.supported.iter().copied()
    }

    /// Every known feature paired with its support, in declaration order.
    pub fn table(&self) -> impl Iterator<Item = (Feature, bool)> + '_ {
        Feature::ALL
            .into_iter()
            .map(|feature| (feature, self.is_supported(feature)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_roundtrip_in_order() {
        let names: Vec<_> = Feature::ALL.iter().map(Feature::as_str).collect();
        assert_eq!(names[0], "record");
        assert_eq!(names[14], "schemes_filters");
        for feature in Feature::ALL {
            assert_eq!(feature.as_str().parse::<Feature>().unwrap(), feature);
        }
    }

    #[test]
    fn unknown_names_are_unsupported() {
        let set = FeatureSet::new([Feature::Schemes, Feature::Paddr]);
        assert!(set.supported("schemes"));
        assert!(set.supported("paddr"));
        assert!(!set.supported("vaddr"));
        assert!(!set.supported("schemes_quota_goals"));
        assert!(!set.supported(""));
    }

    #[test]
    fn table_lists_every_feature() {
        let set = FeatureSet::new([Feature::Vaddr]);
        let table: Vec<_> = set.table().collect();
        assert_eq!(table.len(), Feature::ALL.len());
        assert_eq!(table[3], (Feature::Vaddr, true));
        assert_eq!(table.iter().filter(|(_, on)| *on).count(), 1);
    }
}
