#![forbid(unsafe_code)]

use super::{DamonRegion, decode_required_list, encode_list, text_to_pid};
use crate::error::DecodeError;
use crate::fmt::format_nr;
use crate::kvpairs::KvMap;
use std::fmt;

/// A monitored process (virtual address spaces) or raw address space
/// (physical). Empty `regions` lets the kernel pick the regions itself.
#[derive(Debug, Clone)]
pub struct DamonTarget {
    pub name: String,
    pub pid: Option<u32>,
    pub regions: Vec<DamonRegion>,
}

impl DamonTarget {
    const ENTITY: &'static str = "target";

    pub fn new(name: impl Into<String>, pid: Option<u32>, regions: Vec<DamonRegion>) -> Self {
        Self {
            name: name.into(),
            pid,
            regions,
        }
    }

    pub fn to_kvpairs(&self) -> KvMap {
        let mut kv = KvMap::new().with("name", self.name.as_str());
        if let Some(pid) = self.pid {
            kv.insert("pid", format_nr(pid as u64, true));
        }
        kv.with("regions", encode_list(&self.regions, DamonRegion::to_kvpairs))
    }

    pub fn from_kvpairs(kv: &KvMap) -> Result<Self, DecodeError> {
        let pid = match kv.opt_str(Self::ENTITY, "pid")? {
            Some(_) => Some(kv.parse(Self::ENTITY, "pid", text_to_pid)?),
            None => None,
        };
        Ok(Self {
            name: kv.str(Self::ENTITY, "name")?.to_string(),
            pid,
            regions: decode_required_list(
                kv,
                Self::ENTITY,
                "regions",
                DamonRegion::from_kvpairs,
            )?,
        })
    }
}

impl fmt::Display for DamonTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.pid {
            Some(pid) => write!(f, "{} (pid: {})", self.name, pid)?,
            None => write!(f, "{} (pid: none)", self.name)?,
        }
        for region in &self.regions {
            write!(f, "\nregion {region}")?;
        }
        Ok(())
    }
}

impl PartialEq for DamonTarget {
    fn eq(&self, other: &Self) -> bool {
        self.to_string() == other.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kvpairs::KvValue;
    use pretty_assertions::assert_eq;

    #[test]
    fn target_roundtrip_with_regions() {
        let target = DamonTarget::new(
            "0",
            Some(1_234),
            vec![
                DamonRegion::new("0x1000", "0x2000").unwrap(),
                DamonRegion::new("0x3000", "0x5000").unwrap(),
            ],
        );
        let kv = target.to_kvpairs();
        assert_eq!(kv.keys().collect::<Vec<_>>(), ["name", "pid", "regions"]);
        assert_eq!(DamonTarget::from_kvpairs(&kv).unwrap(), target);
        assert_eq!(
            target.to_string(),
            "0 (pid: 1234)\nregion [4,096, 8,192) (4.00 KiB)\nregion [12,288, 20,480) (8.00 KiB)"
        );
    }

    #[test]
    fn target_without_pid_or_regions() {
        let kv = KvMap::new()
            .with("name", "paddr")
            .with("regions", Vec::<KvValue>::new());
        let target = DamonTarget::from_kvpairs(&kv).unwrap();
        assert_eq!(target.pid, None);
        assert!(target.regions.is_empty());
        assert_eq!(DamonTarget::from_kvpairs(&target.to_kvpairs()).unwrap(), target);
    }

    #[test]
    fn target_requires_regions_key() {
        let kv = KvMap::new().with("name", "0").with("pid", "1234");
        assert_eq!(
            DamonTarget::from_kvpairs(&kv),
            Err(DecodeError::MissingField {
                entity: "target",
                field: "regions"
            })
        );
    }

    #[test]
    fn target_requires_name() {
        let kv = KvMap::new().with("pid", "42");
        assert_eq!(
            DamonTarget::from_kvpairs(&kv),
            Err(DecodeError::MissingField {
                entity: "target",
                field: "name"
            })
        );
    }

    #[test]
    fn target_rejects_oversized_pid() {
        let kv = KvMap::new().with("name", "0").with("pid", "99999999999");
        assert!(matches!(
            DamonTarget::from_kvpairs(&kv),
            Err(DecodeError::Invalid { field: "pid", .. })
        ));
    }
}
