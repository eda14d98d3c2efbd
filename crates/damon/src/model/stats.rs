#![forbid(unsafe_code)]

use crate::error::DecodeError;
use crate::fmt::{format_addr_range, format_nr, format_sz, text_to_nr};
use crate::kvpairs::KvMap;
use std::fmt;

/// Counters the kernel keeps for a scheme.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DamosStats {
    pub nr_tried: u64,
    pub sz_tried: u64,
    pub nr_applied: u64,
    pub sz_applied: u64,
    pub qt_exceeds: u64,
}

impl DamosStats {
    const ENTITY: &'static str = "stats";

    pub fn to_kvpairs(&self) -> KvMap {
        KvMap::new()
            .with("nr_tried", format_nr(self.nr_tried, true))
            .with("sz_tried", format_nr(self.sz_tried, true))
            .with("nr_applied", format_nr(self.nr_applied, true))
            .with("sz_applied", format_nr(self.sz_applied, true))
            .with("qt_exceeds", format_nr(self.qt_exceeds, true))
    }

    pub fn from_kvpairs(kv: &KvMap) -> Result<Self, DecodeError> {
        let e = Self::ENTITY;
        Ok(Self {
            nr_tried: kv.parse_or(e, "nr_tried", 0, text_to_nr)?,
            sz_tried: kv.parse_or(e, "sz_tried", 0, text_to_nr)?,
            nr_applied: kv.parse_or(e, "nr_applied", 0, text_to_nr)?,
            sz_applied: kv.parse_or(e, "sz_applied", 0, text_to_nr)?,
            qt_exceeds: kv.parse_or(e, "qt_exceeds", 0, text_to_nr)?,
        })
    }
}

impl fmt::Display for DamosStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "tried {} times ({})",
            self.nr_tried,
            format_sz(self.sz_tried, false)
        )?;
        writeln!(
            f,
            "applied {} times ({})",
            self.nr_applied,
            format_sz(self.sz_applied, false)
        )?;
        write!(f, "quota exceeded {} times", self.qt_exceeds)
    }
}

/// A region the kernel checked against a scheme's access pattern during the
/// last aggregation interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DamosTriedRegion {
    pub start: u64,
    pub end: u64,
    pub nr_accesses: u64,
    pub age: u64,
}

impl DamosTriedRegion {
    const ENTITY: &'static str = "tried_region";

    pub fn to_kvpairs(&self) -> KvMap {
        KvMap::new()
            .with("start", format_nr(self.start, true))
            .with("end", format_nr(self.end, true))
            .with("nr_accesses", format_nr(self.nr_accesses, true))
            .with("age", format_nr(self.age, true))
    }

    pub fn from_kvpairs(kv: &KvMap) -> Result<Self, DecodeError> {
        let e = Self::ENTITY;
        Ok(Self {
            start: kv.parse(e, "start", text_to_nr)?,
            end: kv.parse(e, "end", text_to_nr)?,
            nr_accesses: kv.parse(e, "nr_accesses", text_to_nr)?,
            age: kv.parse(e, "age", text_to_nr)?,
        })
    }
}

impl fmt::Display for DamosTriedRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: nr_accesses: {}, age: {}",
            format_addr_range(self.start, self.end, false),
            format_nr(self.nr_accesses, false),
            format_nr(self.age, false)
        )
    }
}
