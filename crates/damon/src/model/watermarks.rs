#![forbid(unsafe_code)]

use crate::error::{DecodeError, ParseError};
use crate::fmt::{format_nr, format_time_us, text_to_nr, text_to_us};
use crate::kvpairs::KvMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum WatermarkMetric {
    /// Schemes are always active.
    #[default]
    None,
    /// Free memory ratio of the system, in permil.
    FreeMemRate,
}

impl WatermarkMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::FreeMemRate => "free_mem_rate",
        }
    }

    /// Index used by the legacy debugfs `schemes` file.
    pub fn debugfs_code(&self) -> u64 {
        match self {
            Self::None => 0,
            Self::FreeMemRate => 1,
        }
    }

    pub fn from_debugfs_code(code: u64) -> Option<Self> {
        match code {
            0 => Some(Self::None),
            1 => Some(Self::FreeMemRate),
            _ => None,
        }
    }
}

impl fmt::Display for WatermarkMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WatermarkMetric {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "none" => Ok(Self::None),
            "free_mem_rate" => Ok(Self::FreeMemRate),
            other => Err(DecodeError::UnknownVariant {
                kind: "watermark metric",
                value: other.to_string(),
            }),
        }
    }
}

/// Activates a scheme only while `metric` sits between the low and high
/// watermarks. The default is always active.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DamosWatermarks {
    pub metric: WatermarkMetric,
    pub interval_us: u64,
    pub high_permil: u64,
    pub mid_permil: u64,
    pub low_permil: u64,
}

impl DamosWatermarks {
    const ENTITY: &'static str = "watermarks";

    pub fn new(
        metric: WatermarkMetric,
        interval: &str,
        high_permil: u64,
        mid_permil: u64,
        low_permil: u64,
    ) -> Result<Self, ParseError> {
        Ok(Self {
            metric,
            interval_us: text_to_us(interval)?,
            high_permil,
            mid_permil,
            low_permil,
        })
    }

    pub fn to_kvpairs(&self) -> KvMap {
        KvMap::new()
            .with("metric", self.metric.as_str())
            .with("interval_us", format_time_us(self.interval_us, true))
            .with("high_permil", format_nr(self.high_permil, true))
            .with("mid_permil", format_nr(self.mid_permil, true))
            .with("low_permil", format_nr(self.low_permil, true))
    }

    pub fn from_kvpairs(kv: &KvMap) -> Result<Self, DecodeError> {
        let e = Self::ENTITY;
        let metric = match kv.opt_str(e, "metric")? {
            Some(metric) => metric.parse()?,
            None => WatermarkMetric::None,
        };
        Ok(Self {
            metric,
            interval_us: kv.parse_or(e, "interval_us", 0, text_to_us)?,
            high_permil: kv.parse_or(e, "high_permil", 0, text_to_nr)?,
            mid_permil: kv.parse_or(e, "mid_permil", 0, text_to_nr)?,
            low_permil: kv.parse_or(e, "low_permil", 0, text_to_nr)?,
        })
    }
}

impl fmt::Display for DamosWatermarks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{}/{}/{} permil",
            self.high_permil, self.mid_permil, self.low_permil
        )?;
        write!(
            f,
            "metric {}, interval {}",
            self.metric,
            format_time_us(self.interval_us, false)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn default_is_always_active() {
        let wmarks = DamosWatermarks::from_kvpairs(&KvMap::new()).unwrap();
        assert_eq!(wmarks, DamosWatermarks::default());
        assert_eq!(wmarks.metric, WatermarkMetric::None);
        assert_eq!(
            (wmarks.interval_us, wmarks.high_permil, wmarks.mid_permil, wmarks.low_permil),
            (0, 0, 0, 0)
        );
    }

    #[test]
    fn watermarks_roundtrip() {
        let wmarks =
            DamosWatermarks::new(WatermarkMetric::FreeMemRate, "5s", 500, 400, 200).unwrap();
        let kv = wmarks.to_kvpairs();
        assert_eq!(kv.str("watermarks", "metric"), Ok("free_mem_rate"));
        assert_eq!(DamosWatermarks::from_kvpairs(&kv).unwrap(), wmarks);
        assert_eq!(
            wmarks.to_string(),
            "500/400/200 permil\nmetric free_mem_rate, interval 5.00 s"
        );
    }

    #[test]
    fn unknown_metric_is_rejected() {
        let kv = KvMap::new().with("metric", "cpu_load");
        assert!(matches!(
            DamosWatermarks::from_kvpairs(&kv),
            Err(DecodeError::UnknownVariant { kind: "watermark metric", .. })
        ));
    }
}
