#![forbid(unsafe_code)]

use super::text_to_bool;
use crate::error::DecodeError;
use crate::kvpairs::KvMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterType {
    /// Anonymous pages.
    Anon,
    /// Pages charged to a memory cgroup.
    Memcg,
}

impl FilterType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Anon => "anon",
            Self::Memcg => "memcg",
        }
    }
}

impl fmt::Display for FilterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilterType {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "anon" => Ok(Self::Anon),
            "memcg" => Ok(Self::Memcg),
            other => Err(DecodeError::UnknownVariant {
                kind: "filter type",
                value: other.to_string(),
            }),
        }
    }
}

/// Narrows the memory a scheme acts on. `matching` selects whether memory of
/// `filter_type` is filtered out (`true`) or everything else is.
#[derive(Debug, Clone)]
pub struct DamosFilter {
    pub name: String,
    pub filter_type: FilterType,
    /// Empty unless `filter_type` is [`FilterType::Memcg`].
    pub memcg_path: String,
    pub matching: bool,
}

impl DamosFilter {
    const ENTITY: &'static str = "filter";

    pub fn new(
        name: impl Into<String>,
        filter_type: FilterType,
        memcg_path: impl Into<String>,
        matching: bool,
    ) -> Self {
        let memcg_path = match filter_type {
            FilterType::Memcg => memcg_path.into(),
            FilterType::Anon => String::new(),
        };
        Self {
            name: name.into(),
            filter_type,
            memcg_path,
            matching,
        }
    }

    pub fn to_kvpairs(&self) -> KvMap {
        KvMap::new()
            .with("name", self.name.as_str())
            .with("filter_type", self.filter_type.as_str())
            .with("memcg_path", self.memcg_path.as_str())
            .with("matching", self.matching.to_string())
    }

    pub fn from_kvpairs(kv: &KvMap) -> Result<Self, DecodeError> {
        let e = Self::ENTITY;
        let filter_type: FilterType = kv.str(e, "filter_type")?.parse()?;
        let memcg_path = match filter_type {
            FilterType::Memcg => kv.opt_str(e, "memcg_path")?.unwrap_or_default(),
            FilterType::Anon => "",
        };
        Ok(Self::new(
            kv.str(e, "name")?,
            filter_type,
            memcg_path,
            kv.parse(e, "matching", text_to_bool)?,
        ))
    }
}

impl fmt::Display for DamosFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "filter_type {}, ", self.filter_type)?;
        if self.filter_type == FilterType::Memcg {
            write!(f, "memcg_path {}, ", self.memcg_path)?;
        }
        write!(f, "matching {}", self.matching)
    }
}

impl PartialEq for DamosFilter {
    fn eq(&self, other: &Self) -> bool {
        self.to_string() == other.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn memcg_filter_roundtrip() {
        let filter = DamosFilter::new("0", FilterType::Memcg, "/workload.slice", true);
        let kv = filter.to_kvpairs();
        assert_eq!(
            kv.keys().collect::<Vec<_>>(),
            ["name", "filter_type", "memcg_path", "matching"]
        );
        assert_eq!(DamosFilter::from_kvpairs(&kv).unwrap(), filter);
        assert_eq!(
            filter.to_string(),
            "filter_type memcg, memcg_path /workload.slice, matching true"
        );
    }

    #[test]
    fn anon_filter_drops_memcg_path() {
        let kv = KvMap::new()
            .with("name", "1")
            .with("filter_type", "anon")
            .with("memcg_path", "/ignored")
            .with("matching", "N");
        let filter = DamosFilter::from_kvpairs(&kv).unwrap();
        assert_eq!(filter.memcg_path, "");
        assert!(!filter.matching);
        assert_eq!(filter.to_string(), "filter_type anon, matching false");
    }

    #[test]
    fn filter_requires_type() {
        let kv = KvMap::new().with("name", "0").with("matching", "true");
        assert_eq!(
            DamosFilter::from_kvpairs(&kv),
            Err(DecodeError::MissingField {
                entity: "filter",
                field: "filter_type"
            })
        );
    }
}
