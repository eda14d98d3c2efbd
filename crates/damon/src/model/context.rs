#![forbid(unsafe_code)]

use super::{
    Damos, DamonIntervals, DamonNrRegionsRange, DamonRecord, DamonTarget, decode_list,
    decode_required_list, encode_list,
};
use crate::error::DecodeError;
use crate::fmt::indent_lines;
use crate::kvpairs::KvMap;
use std::fmt;
use std::str::FromStr;

/// Address space family a context monitors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DamonOps {
    /// Virtual address spaces of processes.
    Vaddr,
    /// Fixed virtual address ranges of processes.
    Fvaddr,
    /// The physical address space.
    Paddr,
}

impl DamonOps {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vaddr => "vaddr",
            Self::Fvaddr => "fvaddr",
            Self::Paddr => "paddr",
        }
    }

    /// Whether targets of this family are identified by a process id.
    pub fn has_pid(&self) -> bool {
        matches!(self, Self::Vaddr | Self::Fvaddr)
    }
}

pub fn target_has_pid(ops: DamonOps) -> bool {
    ops.has_pid()
}

impl fmt::Display for DamonOps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DamonOps {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "vaddr" => Ok(Self::Vaddr),
            "fvaddr" => Ok(Self::Fvaddr),
            "paddr" => Ok(Self::Paddr),
            other => Err(DecodeError::UnknownVariant {
                kind: "operations set",
                value: other.to_string(),
            }),
        }
    }
}

/// One monitoring context: what to watch, how often, and which schemes to
/// apply to it.
#[derive(Debug, Clone, PartialEq)]
pub struct DamonCtx {
    pub name: String,
    pub intervals: DamonIntervals,
    pub nr_regions: DamonNrRegionsRange,
    pub ops: DamonOps,
    pub targets: Vec<DamonTarget>,
    pub schemes: Vec<Damos>,
    pub record_request: Option<DamonRecord>,
}

impl DamonCtx {
    const ENTITY: &'static str = "context";

    pub fn new(
        name: impl Into<String>,
        intervals: DamonIntervals,
        nr_regions: DamonNrRegionsRange,
        ops: DamonOps,
        targets: Vec<DamonTarget>,
        schemes: Vec<Damos>,
    ) -> Self {
        Self {
            name: name.into(),
            intervals,
            nr_regions,
            ops,
            targets,
            schemes,
            record_request: None,
        }
    }

    pub fn to_kvpairs(&self) -> KvMap {
        let mut kv = KvMap::new()
            .with("name", self.name.as_str())
            .with("intervals", self.intervals.to_kvpairs())
            .with("nr_regions", self.nr_regions.to_kvpairs())
            .with("ops", self.ops.as_str())
            .with("targets", encode_list(&self.targets, DamonTarget::to_kvpairs))
            .with("schemes", encode_list(&self.schemes, Damos::to_kvpairs));
        if let Some(record) = &self.record_request {
            kv.insert("record_request", record.to_kvpairs());
        }
        kv
    }

    pub fn from_kvpairs(kv: &KvMap) -> Result<Self, DecodeError> {
        let e = Self::ENTITY;
        let intervals = match kv.opt_map(e, "intervals")? {
            Some(intervals) => DamonIntervals::from_kvpairs(intervals)?,
            None => DamonIntervals::default(),
        };
        let nr_regions = match kv.opt_map(e, "nr_regions")? {
            Some(nr_regions) => DamonNrRegionsRange::from_kvpairs(nr_regions)?,
            None => DamonNrRegionsRange::default(),
        };
        let record_request = kv
            .opt_map(e, "record_request")?
            .map(DamonRecord::from_kvpairs)
            .transpose()?;
        Ok(Self {
            name: kv.str(e, "name")?.to_string(),
            intervals,
            nr_regions,
            ops: kv.str(e, "ops")?.parse()?,
            targets: decode_required_list(kv, e, "targets", DamonTarget::from_kvpairs)?,
            schemes: decode_list(kv, e, "schemes", Damos::from_kvpairs)?,
            record_request,
        })
    }
}

impl fmt::Display for DamonCtx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} (ops: {})", self.name, self.ops)?;
        writeln!(f, "intervals: {}", self.intervals)?;
        writeln!(f, "nr_regions: {}", self.nr_regions)?;
        if let Some(record) = &self.record_request {
            writeln!(f, "record: {record}")?;
        }
        write!(f, "targets")?;
        for target in &self.targets {
            write!(f, "\n{}", indent_lines(&target.to_string(), 4))?;
        }
        write!(f, "\nschemes")?;
        for scheme in &self.schemes {
            write!(f, "\n{}", indent_lines(&scheme.to_string(), 4))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kvpairs::KvValue;
    use pretty_assertions::assert_eq;

    fn minimal() -> KvMap {
        KvMap::new()
            .with("name", "0")
            .with("ops", "paddr")
            .with(
                "targets",
                vec![KvValue::Map(
                    KvMap::new()
                        .with("name", "0")
                        .with("regions", Vec::<KvValue>::new()),
                )],
            )
    }

    #[test]
    fn missing_optional_fields_take_defaults() {
        let ctx = DamonCtx::from_kvpairs(&minimal()).unwrap();
        assert_eq!(ctx.intervals, DamonIntervals::default());
        assert_eq!(
            (ctx.intervals.sample, ctx.intervals.aggr, ctx.intervals.ops_update),
            (5_000, 100_000, 1_000_000)
        );
        assert_eq!(ctx.nr_regions, DamonNrRegionsRange::default());
        assert_eq!(ctx.ops, DamonOps::Paddr);
        assert_eq!(ctx.targets.len(), 1);
        assert!(ctx.schemes.is_empty());
        assert!(ctx.record_request.is_none());
    }

    #[test]
    fn context_requires_targets_and_ops() {
        let mut kv = KvMap::new().with("name", "0").with("ops", "vaddr");
        assert_eq!(
            DamonCtx::from_kvpairs(&kv),
            Err(DecodeError::MissingField {
                entity: "context",
                field: "targets"
            })
        );
        kv = KvMap::new().with("name", "0").with("targets", Vec::<KvValue>::new());
        assert_eq!(
            DamonCtx::from_kvpairs(&kv),
            Err(DecodeError::MissingField {
                entity: "context",
                field: "ops"
            })
        );
    }

    #[test]
    fn context_roundtrip() {
        let mut ctx = DamonCtx::new(
            "0",
            DamonIntervals::new("10ms", "200ms", "2s").unwrap(),
            DamonNrRegionsRange::new("20", "2000").unwrap(),
            DamonOps::Vaddr,
            vec![DamonTarget::new("0", Some(4_242), Vec::new())],
            vec![Damos::from_kvpairs(&KvMap::new().with("name", "0")).unwrap()],
        );
        ctx.record_request = Some(DamonRecord::new("4KiB", "/tmp/damon.data").unwrap());
        let kv = ctx.to_kvpairs();
        assert_eq!(
            kv.keys().collect::<Vec<_>>(),
            ["name", "intervals", "nr_regions", "ops", "targets", "schemes", "record_request"]
        );
        assert_eq!(DamonCtx::from_kvpairs(&kv).unwrap(), ctx);
    }

    #[test]
    fn pid_follows_ops() {
        assert!(target_has_pid(DamonOps::Vaddr));
        assert!(target_has_pid(DamonOps::Fvaddr));
        assert!(!target_has_pid(DamonOps::Paddr));
        assert!("kaddr".parse::<DamonOps>().is_err());
    }
}
