#![forbid(unsafe_code)]

use super::DamonIntervals;
use crate::error::{DecodeError, ParseError};
use crate::fmt::{
    MAX_SENTINEL, MIN_SENTINEL, format_nr, format_percent, format_sz, format_time_us,
    text_to_bytes, text_to_nr, text_to_nr_unit, text_to_percent, text_to_us,
};
use crate::kvpairs::KvMap;
use std::fmt;
use std::str::FromStr;

const ENTITY: &str = "access_pattern";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NrAccessesUnit {
    Percent,
    SampleIntervals,
}

impl NrAccessesUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Percent => "percent",
            Self::SampleIntervals => "sample_intervals",
        }
    }
}

impl FromStr for NrAccessesUnit {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "percent" | "%" => Ok(Self::Percent),
            "sample_intervals" | "" => Ok(Self::SampleIntervals),
            other => Err(DecodeError::UnknownVariant {
                kind: "nr_accesses unit",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AgeUnit {
    Usec,
    AggrIntervals,
}

impl AgeUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Usec => "usec",
            Self::AggrIntervals => "aggr_intervals",
        }
    }
}

impl FromStr for AgeUnit {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "usec" => Ok(Self::Usec),
            "aggr_intervals" | "" => Ok(Self::AggrIntervals),
            other => Err(DecodeError::UnknownVariant {
                kind: "age unit",
                value: other.to_string(),
            }),
        }
    }
}

/// Access frequency bounds, either as a percentage of the maximum possible
/// accesses per aggregation or as a raw count of sampling intervals.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NrAccesses {
    Percent { min: f64, max: f64 },
    SampleIntervals { min: u64, max: u64 },
}

impl NrAccesses {
    pub fn new(min: &str, max: &str, unit: NrAccessesUnit) -> Result<Self, ParseError> {
        Ok(match unit {
            NrAccessesUnit::Percent => Self::Percent {
                min: parse_percent_value(min)?,
                max: parse_percent_value(max)?,
            },
            NrAccessesUnit::SampleIntervals => Self::SampleIntervals {
                min: text_to_nr(min)?,
                max: text_to_nr(max)?,
            },
        })
    }

    pub fn unit(&self) -> NrAccessesUnit {
        match self {
            Self::Percent { .. } => NrAccessesUnit::Percent,
            Self::SampleIntervals { .. } => NrAccessesUnit::SampleIntervals,
        }
    }

    fn bound_strings(&self) -> (String, String) {
        match *self {
            Self::Percent { min, max } => {
                (format!("{} %", format_percent(min)), format!("{} %", format_percent(max)))
            }
            Self::SampleIntervals { min, max } => {
                let unit = NrAccessesUnit::SampleIntervals.as_str();
                (
                    format!("{} {unit}", format_nr(min, true)),
                    format!("{} {unit}", format_nr(max, true)),
                )
            }
        }
    }

    /// Resolve the unit from text: a percentage when both bounds parse as one,
    /// otherwise a count with an optional unit word.
    fn decode(min: &str, max: &str) -> Result<Self, DecodeError> {
        if let (Ok(min), Ok(max)) = (text_to_percent(min), text_to_percent(max)) {
            return Ok(Self::Percent { min, max });
        }
        let (min, min_unit) = decode_nr_unit(min, "min_nr_accesses")?;
        let (max, max_unit) = decode_nr_unit(max, "max_nr_accesses")?;
        let unit = if max_unit.is_empty() { min_unit } else { max_unit };
        match unit.parse::<NrAccessesUnit>()? {
            NrAccessesUnit::SampleIntervals => Ok(Self::SampleIntervals { min, max }),
            NrAccessesUnit::Percent => Ok(Self::Percent {
                min: min as f64,
                max: max as f64,
            }),
        }
    }
}

/// Age bounds, either in microseconds or in aggregation intervals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Age {
    Usec { min: u64, max: u64 },
    AggrIntervals { min: u64, max: u64 },
}

impl Age {
    pub fn new(min: &str, max: &str, unit: AgeUnit) -> Result<Self, ParseError> {
        Ok(match unit {
            AgeUnit::Usec => Self::Usec {
                min: text_to_us(min)?,
                max: text_to_us(max)?,
            },
            AgeUnit::AggrIntervals => Self::AggrIntervals {
                min: text_to_nr(min)?,
                max: text_to_nr(max)?,
            },
        })
    }

    pub fn unit(&self) -> AgeUnit {
        match self {
            Self::Usec { .. } => AgeUnit::Usec,
            Self::AggrIntervals { .. } => AgeUnit::AggrIntervals,
        }
    }

    fn bound_strings(&self) -> (String, String) {
        match *self {
            Self::Usec { min, max } => (format_time_us(min, true), format_time_us(max, true)),
            Self::AggrIntervals { min, max } => {
                let unit = AgeUnit::AggrIntervals.as_str();
                (
                    format!("{} {unit}", format_nr(min, true)),
                    format!("{} {unit}", format_nr(max, true)),
                )
            }
        }
    }

    /// Resolve the unit from text: microseconds when both bounds parse as a
    /// duration, otherwise a count with an optional unit word.
    fn decode(min: &str, max: &str) -> Result<Self, DecodeError> {
        if let (Ok(min), Ok(max)) = (text_to_us(min), text_to_us(max)) {
            return Ok(Self::Usec { min, max });
        }
        let (min, min_unit) = decode_nr_unit(min, "min_age")?;
        let (max, max_unit) = decode_nr_unit(max, "max_age")?;
        let unit = if max_unit.is_empty() { min_unit } else { max_unit };
        match unit.parse::<AgeUnit>()? {
            AgeUnit::AggrIntervals => Ok(Self::AggrIntervals { min, max }),
            AgeUnit::Usec => Ok(Self::Usec { min, max }),
        }
    }
}

fn parse_percent_value(text: &str) -> Result<f64, ParseError> {
    let trimmed = text.trim();
    if trimmed.ends_with('%') || trimmed == MIN_SENTINEL || trimmed == MAX_SENTINEL {
        text_to_percent(trimmed)
    } else {
        text_to_percent(&format!("{trimmed}%"))
    }
}

fn bound<'a>(
    kv: &'a KvMap,
    field: &'static str,
    default: &'static str,
) -> Result<&'a str, DecodeError> {
    Ok(kv.opt_str(ENTITY, field)?.unwrap_or(default))
}

fn decode_nr_unit(text: &str, field: &'static str) -> Result<(u64, String), DecodeError> {
    text_to_nr_unit(text).map_err(|source| DecodeError::Invalid {
        entity: ENTITY,
        field,
        source,
    })
}

/// Access pattern bounds converted to the units the kernel takes: access
/// counts in sampling intervals and ages in aggregation intervals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelAccessPattern {
    pub min_sz_bytes: u64,
    pub max_sz_bytes: u64,
    pub min_nr_accesses: u64,
    pub max_nr_accesses: u64,
    pub min_age: u64,
    pub max_age: u64,
}

/// The size, access frequency and age window a scheme applies to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DamosAccessPattern {
    pub min_sz_bytes: u64,
    pub max_sz_bytes: u64,
    pub nr_accesses: NrAccesses,
    pub age: Age,
}

impl DamosAccessPattern {
    pub fn new(
        min_sz_bytes: &str,
        max_sz_bytes: &str,
        nr_accesses: NrAccesses,
        age: Age,
    ) -> Result<Self, ParseError> {
        Ok(Self {
            min_sz_bytes: text_to_bytes(min_sz_bytes)?,
            max_sz_bytes: text_to_bytes(max_sz_bytes)?,
            nr_accesses,
            age,
        })
    }

    pub fn nr_accesses_unit(&self) -> NrAccessesUnit {
        self.nr_accesses.unit()
    }

    pub fn age_unit(&self) -> AgeUnit {
        self.age.unit()
    }

    pub fn to_kernel_units(&self, intervals: &DamonIntervals) -> KernelAccessPattern {
        let (min_nr_accesses, max_nr_accesses) = match self.nr_accesses {
            NrAccesses::SampleIntervals { min, max } => (min, max),
            NrAccesses::Percent { min, max } => {
                let full = intervals.max_nr_accesses() as f64;
                let to_count = |percent: f64| (percent * full / 100.0).round() as u64;
                (to_count(min), to_count(max))
            }
        };
        let (min_age, max_age) = match self.age {
            Age::AggrIntervals { min, max } => (min, max),
            Age::Usec { min, max } => {
                let to_aggrs = |us: u64| match (us, intervals.aggr) {
                    (u64::MAX, _) => u64::MAX,
                    (_, 0) => 0,
                    (us, aggr) => us / aggr,
                };
                (to_aggrs(min), to_aggrs(max))
            }
        };
        KernelAccessPattern {
            min_sz_bytes: self.min_sz_bytes,
            max_sz_bytes: self.max_sz_bytes,
            min_nr_accesses,
            max_nr_accesses,
            min_age,
            max_age,
        }
    }

    pub fn to_kvpairs(&self) -> KvMap {
        let (min_nr_accesses, max_nr_accesses) = self.nr_accesses.bound_strings();
        let (min_age, max_age) = self.age.bound_strings();
        KvMap::new()
            .with("min_sz_bytes", format_sz(self.min_sz_bytes, true))
            .with("max_sz_bytes", format_sz(self.max_sz_bytes, true))
            .with("min_nr_accesses", min_nr_accesses)
            .with("max_nr_accesses", max_nr_accesses)
            .with("min_age", min_age)
            .with("max_age", max_age)
    }

    /// Missing bounds default to the open end of their range.
    pub fn from_kvpairs(kv: &KvMap) -> Result<Self, DecodeError> {
        Ok(Self {
            min_sz_bytes: kv.parse_or(ENTITY, "min_sz_bytes", 0, text_to_bytes)?,
            max_sz_bytes: kv.parse_or(ENTITY, "max_sz_bytes", u64::MAX, text_to_bytes)?,
            nr_accesses: NrAccesses::decode(
                bound(kv, "min_nr_accesses", MIN_SENTINEL)?,
                bound(kv, "max_nr_accesses", MAX_SENTINEL)?,
            )?,
            age: Age::decode(
                bound(kv, "min_age", MIN_SENTINEL)?,
                bound(kv, "max_age", MAX_SENTINEL)?,
            )?,
        })
    }
}

impl Default for DamosAccessPattern {
    /// Matches every region.
    fn default() -> Self {
        Self {
            min_sz_bytes: 0,
            max_sz_bytes: u64::MAX,
            nr_accesses: NrAccesses::Percent {
                min: 0.0,
                max: 100.0,
            },
            age: Age::Usec {
                min: 0,
                max: u64::MAX,
            },
        }
    }
}

impl fmt::Display for DamosAccessPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "sz: [{}, {}]",
            format_sz(self.min_sz_bytes, false),
            format_sz(self.max_sz_bytes, false)
        )?;
        match self.nr_accesses {
            NrAccesses::Percent { min, max } => writeln!(
                f,
                "nr_accesses: [{} %, {} %]",
                format_percent(min),
                format_percent(max)
            )?,
            NrAccesses::SampleIntervals { min, max } => {
                let unit = NrAccessesUnit::SampleIntervals.as_str();
                writeln!(
                    f,
                    "nr_accesses: [{} {unit}, {} {unit}]",
                    format_nr(min, false),
                    format_nr(max, false)
                )?
            }
        }
        match self.age {
            Age::Usec { min, max } => write!(
                f,
                "age: [{}, {}]",
                format_time_us(min, true),
                format_time_us(max, true)
            ),
            Age::AggrIntervals { min, max } => {
                let unit = AgeUnit::AggrIntervals.as_str();
                write!(
                    f,
                    "age: [{} {unit}, {} {unit}]",
                    format_nr(min, false),
                    format_nr(max, false)
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn pattern_kv(min_nr: &str, max_nr: &str) -> KvMap {
        KvMap::new()
            .with("min_sz_bytes", "4 KiB")
            .with("max_sz_bytes", "max")
            .with("min_nr_accesses", min_nr)
            .with("max_nr_accesses", max_nr)
            .with("min_age", "1 s")
            .with("max_age", "max")
    }

    #[test]
    fn default_spans_everything() {
        let pattern = DamosAccessPattern::default();
        assert_eq!(pattern.nr_accesses_unit(), NrAccessesUnit::Percent);
        assert_eq!(pattern.age_unit(), AgeUnit::Usec);
        assert_eq!(
            pattern.to_string(),
            "sz: [0 B, max]\nnr_accesses: [0 %, 100 %]\nage: [0 us, max]"
        );
        assert_eq!(
            DamosAccessPattern::from_kvpairs(&KvMap::new()).unwrap(),
            pattern
        );
    }

    #[test]
    fn percent_bounds_decode_as_percent() {
        let pattern = DamosAccessPattern::from_kvpairs(&pattern_kv("5%", "50 %")).unwrap();
        assert_eq!(pattern.nr_accesses_unit(), NrAccessesUnit::Percent);
        assert_eq!(pattern.nr_accesses, NrAccesses::Percent { min: 5.0, max: 50.0 });
        assert_eq!(pattern.min_sz_bytes, 4_096);
        assert_eq!(pattern.age, Age::Usec { min: 1_000_000, max: u64::MAX });
    }

    #[test]
    fn bare_numbers_fall_back_to_counts() {
        let pattern = DamosAccessPattern::from_kvpairs(&pattern_kv("5", "10")).unwrap();
        assert_eq!(pattern.nr_accesses_unit(), NrAccessesUnit::SampleIntervals);
        assert_eq!(pattern.nr_accesses, NrAccesses::SampleIntervals { min: 5, max: 10 });
    }

    #[test]
    fn counted_ages_fall_back_to_aggr_intervals() {
        let kv = pattern_kv("min", "max")
            .with("min_age", "3 aggr_intervals")
            .with("max_age", "max aggr_intervals");
        let pattern = DamosAccessPattern::from_kvpairs(&kv).unwrap();
        assert_eq!(pattern.age, Age::AggrIntervals { min: 3, max: u64::MAX });
    }

    #[test]
    fn unknown_unit_word_is_rejected() {
        let kv = pattern_kv("5 pages", "10 pages");
        assert_eq!(
            DamosAccessPattern::from_kvpairs(&kv),
            Err(DecodeError::UnknownVariant {
                kind: "nr_accesses unit",
                value: "pages".into()
            })
        );
    }

    #[test]
    fn kvpairs_roundtrip_both_representations() {
        let percent = DamosAccessPattern::new(
            "4KiB",
            "2MiB",
            NrAccesses::new("10", "80%", NrAccessesUnit::Percent).unwrap(),
            Age::new("100ms", "1h", AgeUnit::Usec).unwrap(),
        )
        .unwrap();
        let counts = DamosAccessPattern::new(
            "min",
            "max",
            NrAccesses::new("0", "3", NrAccessesUnit::SampleIntervals).unwrap(),
            Age::new("10", "max", AgeUnit::AggrIntervals).unwrap(),
        )
        .unwrap();

        for pattern in [percent, counts] {
            let kv = pattern.to_kvpairs();
            assert_eq!(kv, pattern.to_kvpairs());
            assert_eq!(DamosAccessPattern::from_kvpairs(&kv).unwrap(), pattern);
        }
    }

    #[test]
    fn converts_to_kernel_units() {
        let intervals = DamonIntervals::default();
        let pattern = DamosAccessPattern::from_kvpairs(&pattern_kv("50%", "max")).unwrap();
        let kernel = pattern.to_kernel_units(&intervals);
        assert_eq!(kernel.min_nr_accesses, 10);
        assert_eq!(kernel.max_nr_accesses, 20);
        assert_eq!(kernel.min_age, 10);
        assert_eq!(kernel.max_age, u64::MAX);
        assert_eq!(kernel.min_sz_bytes, 4_096);
    }
}
