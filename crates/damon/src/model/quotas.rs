#![forbid(unsafe_code)]

use crate::error::{DecodeError, ParseError};
use crate::fmt::{format_nr, format_sz, format_time_ms, text_to_bytes, text_to_ms, text_to_nr};
use crate::kvpairs::KvMap;
use std::fmt;

/// Time and size budget for a scheme's action per reset interval, and the
/// weights used to prioritize regions once the budget is tight. All zero
/// means unlimited.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DamosQuotas {
    pub time_ms: u64,
    pub sz_bytes: u64,
    pub reset_interval_ms: u64,
    pub weight_sz_permil: u64,
    pub weight_nr_accesses_permil: u64,
    pub weight_age_permil: u64,
}

impl DamosQuotas {
    const ENTITY: &'static str = "quotas";

    pub fn new(time_ms: &str, sz_bytes: &str, reset_interval_ms: &str) -> Result<Self, ParseError> {
        Ok(Self {
            time_ms: text_to_ms(time_ms)?,
            sz_bytes: text_to_bytes(sz_bytes)?,
            reset_interval_ms: text_to_ms(reset_interval_ms)?,
            ..Self::default()
        })
    }

    pub fn with_weights(self, sz_permil: u64, nr_accesses_permil: u64, age_permil: u64) -> Self {
        Self {
            weight_sz_permil: sz_permil,
            weight_nr_accesses_permil: nr_accesses_permil,
            weight_age_permil: age_permil,
            ..self
        }
    }

    pub fn is_unlimited(&self) -> bool {
        self.time_ms == 0 && self.sz_bytes == 0
    }

    pub fn to_kvpairs(&self) -> KvMap {
        KvMap::new()
            .with("time_ms", format_time_ms(self.time_ms, true))
            .with("sz_bytes", format_sz(self.sz_bytes, true))
            .with("reset_interval_ms", format_time_ms(self.reset_interval_ms, true))
            .with("weight_sz_permil", format_nr(self.weight_sz_permil, true))
            .with(
                "weight_nr_accesses_permil",
                format_nr(self.weight_nr_accesses_permil, true),
            )
            .with("weight_age_permil", format_nr(self.weight_age_permil, true))
    }

    pub fn from_kvpairs(kv: &KvMap) -> Result<Self, DecodeError> {
        let e = Self::ENTITY;
        Ok(Self {
            time_ms: kv.parse_or(e, "time_ms", 0, text_to_ms)?,
            sz_bytes: kv.parse_or(e, "sz_bytes", 0, text_to_bytes)?,
            reset_interval_ms: kv.parse_or(e, "reset_interval_ms", 0, text_to_ms)?,
            weight_sz_permil: kv.parse_or(e, "weight_sz_permil", 0, text_to_nr)?,
            weight_nr_accesses_permil: kv.parse_or(e, "weight_nr_accesses_permil", 0, text_to_nr)?,
            weight_age_permil: kv.parse_or(e, "weight_age_permil", 0, text_to_nr)?,
        })
    }
}

impl fmt::Display for DamosQuotas {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} / {} per {}",
            format_sz(self.sz_bytes, false),
            format_time_ms(self.time_ms, false),
            format_time_ms(self.reset_interval_ms, false)
        )?;
        write!(
            f,
            "priority: sz {} permil, nr_accesses {} permil, age {} permil",
            self.weight_sz_permil, self.weight_nr_accesses_permil, self.weight_age_permil
        )
    }
}
