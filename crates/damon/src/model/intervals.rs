#![forbid(unsafe_code)]

use crate::error::{DecodeError, ParseError};
use crate::fmt::{format_nr, format_time_us, text_to_nr, text_to_us};
use crate::kvpairs::KvMap;
use std::fmt;

/// Sampling, aggregation and operations update intervals, in microseconds.
#[derive(Debug, Clone, Copy)]
pub struct DamonIntervals {
    pub sample: u64,
    pub aggr: u64,
    pub ops_update: u64,
}

impl DamonIntervals {
    const ENTITY: &'static str = "intervals";

    pub fn new(sample: &str, aggr: &str, ops_update: &str) -> Result<Self, ParseError> {
        Ok(Self {
            sample: text_to_us(sample)?,
            aggr: text_to_us(aggr)?,
            ops_update: text_to_us(ops_update)?,
        })
    }

    pub const fn from_us(sample: u64, aggr: u64, ops_update: u64) -> Self {
        Self {
            sample,
            aggr,
            ops_update,
        }
    }

    /// How many samples are taken per aggregation, i.e. the largest possible
    /// `nr_accesses` of a region.
    pub fn max_nr_accesses(&self) -> u64 {
        if self.sample == 0 {
            return 0;
        }
        self.aggr / self.sample
    }

    pub fn to_kvpairs(&self) -> KvMap {
        KvMap::new()
            .with("sample", format_time_us(self.sample, true))
            .with("aggr", format_time_us(self.aggr, true))
            .with("ops_update", format_time_us(self.ops_update, true))
    }

    pub fn from_kvpairs(kv: &KvMap) -> Result<Self, DecodeError> {
        Ok(Self {
            sample: kv.parse(Self::ENTITY, "sample", text_to_us)?,
            aggr: kv.parse(Self::ENTITY, "aggr", text_to_us)?,
            ops_update: kv.parse(Self::ENTITY, "ops_update", text_to_us)?,
        })
    }
}

impl Default for DamonIntervals {
    fn default() -> Self {
        Self::from_us(5_000, 100_000, 1_000_000)
    }
}

impl fmt::Display for DamonIntervals {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "sample {}, aggr {}, update {}",
            format_time_us(self.sample, false),
            format_time_us(self.aggr, false),
            format_time_us(self.ops_update, false)
        )
    }
}

impl PartialEq for DamonIntervals {
    fn eq(&self, other: &Self) -> bool {
        self.to_string() == other.to_string()
    }
}

/// Lower and upper bound of the number of regions DAMON tracks per target.
#[derive(Debug, Clone, Copy)]
pub struct DamonNrRegionsRange {
    pub min_nr_regions: u64,
    pub max_nr_regions: u64,
}

impl DamonNrRegionsRange {
    const ENTITY: &'static str = "nr_regions";

    pub fn new(min: &str, max: &str) -> Result<Self, ParseError> {
        Ok(Self {
            min_nr_regions: text_to_nr(min)?,
            max_nr_regions: text_to_nr(max)?,
        })
    }

    /// Like [`DamonNrRegionsRange::new`] on numbers, but rejects `min > max`.
    pub fn new_checked(min: u64, max: u64) -> Result<Self, DecodeError> {
        let range = Self {
            min_nr_regions: min,
            max_nr_regions: max,
        };
        range.validate()?;
        Ok(range)
    }

    pub fn validate(&self) -> Result<(), DecodeError> {
        if self.min_nr_regions > self.max_nr_regions {
            return Err(DecodeError::InvalidRange {
                entity: Self::ENTITY,
                min: self.min_nr_regions,
                max: self.max_nr_regions,
            });
        }
        Ok(())
    }

    pub fn to_kvpairs(&self) -> KvMap {
        KvMap::new()
            .with("min_nr_regions", format_nr(self.min_nr_regions, true))
            .with("max_nr_regions", format_nr(self.max_nr_regions, true))
    }

    pub fn from_kvpairs(kv: &KvMap) -> Result<Self, DecodeError> {
        Ok(Self {
            min_nr_regions: kv.parse(Self::ENTITY, "min_nr_regions", text_to_nr)?,
            max_nr_regions: kv.parse(Self::ENTITY, "max_nr_regions", text_to_nr)?,
        })
    }
}

impl Default for DamonNrRegionsRange {
    fn default() -> Self {
        Self {
            min_nr_regions: 10,
            max_nr_regions: 1_000,
        }
    }
}

impl fmt::Display for DamonNrRegionsRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {}]",
            format_nr(self.min_nr_regions, false),
            format_nr(self.max_nr_regions, false)
        )
    }
}

impl PartialEq for DamonNrRegionsRange {
    fn eq(&self, other: &Self) -> bool {
        self.to_string() == other.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn intervals_from_text() {
        let intervals = DamonIntervals::new("5ms", "100ms", "1s").unwrap();
        assert_eq!(intervals.sample, 5_000);
        assert_eq!(intervals.aggr, 100_000);
        assert_eq!(intervals.ops_update, 1_000_000);
        assert_eq!(
            intervals.to_string(),
            "sample 5.00 ms, aggr 100.00 ms, update 1.00 s"
        );
        assert_eq!(intervals, DamonIntervals::default());
        assert_eq!(intervals.max_nr_accesses(), 20);
    }

    #[test]
    fn intervals_kvpairs_roundtrip() {
        let intervals = DamonIntervals::from_us(1_234, 98_765, 2_000_001);
        let kv = intervals.to_kvpairs();
        assert_eq!(kv.keys().collect::<Vec<_>>(), ["sample", "aggr", "ops_update"]);
        let back = DamonIntervals::from_kvpairs(&kv).unwrap();
        assert_eq!(back.sample, 1_234);
        assert_eq!(back.aggr, 98_765);
        assert_eq!(back.ops_update, 2_000_001);
        assert_eq!(kv, back.to_kvpairs());
    }

    #[test]
    fn intervals_require_every_field() {
        let kv = KvMap::new().with("sample", "5 ms").with("aggr", "100 ms");
        assert_eq!(
            DamonIntervals::from_kvpairs(&kv),
            Err(DecodeError::MissingField {
                entity: "intervals",
                field: "ops_update"
            })
        );
    }

    #[test]
    fn nr_regions_are_not_validated_by_default() {
        let range = DamonNrRegionsRange::new("1000", "10").unwrap();
        assert_eq!(range.to_string(), "[1,000, 10]");
        assert!(range.validate().is_err());
        assert!(DamonNrRegionsRange::new_checked(1_000, 10).is_err());
        assert!(DamonNrRegionsRange::new_checked(10, 1_000).is_ok());
    }

    #[test]
    fn nr_regions_kvpairs_roundtrip() {
        let range = DamonNrRegionsRange::default();
        let kv = range.to_kvpairs();
        assert_eq!(kv.str("nr_regions", "max_nr_regions"), Ok("1000"));
        assert_eq!(DamonNrRegionsRange::from_kvpairs(&kv).unwrap(), range);
    }
}
