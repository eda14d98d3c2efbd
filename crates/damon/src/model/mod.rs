#![forbid(unsafe_code)]

//! DAMON entities.
//!
//! Every entity has a canonical `Display` form, serializes into a [`KvMap`]
//! with `to_kvpairs` and is rebuilt with `from_kvpairs`. Construction only
//! parses text through [`crate::fmt`]; cross-field invariants such as
//! `min <= max` are left to the caller and the kernel, except through the
//! explicit `new_checked` constructors.
//!
//! [`KvMap`]: crate::kvpairs::KvMap

mod access_pattern;
mod context;
mod filter;
mod intervals;
mod kdamond;
mod quotas;
mod record;
mod region;
mod scheme;
mod stats;
mod target;
mod watermarks;

pub use access_pattern::{Age, AgeUnit, DamosAccessPattern, KernelAccessPattern, NrAccesses, NrAccessesUnit};
pub use context::{DamonCtx, DamonOps, target_has_pid};
pub use filter::{DamosFilter, FilterType};
pub use intervals::{DamonIntervals, DamonNrRegionsRange};
pub use kdamond::{Kdamond, KdamondState};
pub use quotas::DamosQuotas;
pub use record::DamonRecord;
pub use region::DamonRegion;
pub use scheme::{Damos, DamosAction};
pub use stats::{DamosStats, DamosTriedRegion};
pub use target::DamonTarget;
pub use watermarks::{DamosWatermarks, WatermarkMetric};

use crate::error::{DecodeError, ParseError};
use crate::fmt::text_to_nr;
use crate::kvpairs::{KvMap, KvValue};

pub(crate) fn text_to_pid(text: &str) -> Result<u32, ParseError> {
    let pid = text_to_nr(text)?;
    u32::try_from(pid).map_err(|_| ParseError::BadMagnitude(text.to_string()))
}

pub(crate) fn text_to_bool(text: &str) -> Result<bool, ParseError> {
    match text.trim() {
        "true" | "Y" | "y" | "yes" | "1" => Ok(true),
        "false" | "N" | "n" | "no" | "0" => Ok(false),
        other => Err(ParseError::BadMagnitude(other.to_string())),
    }
}

/// Decode every element of an optional list field with `decode`.
pub(crate) fn decode_list<T>(
    kv: &KvMap,
    entity: &'static str,
    field: &'static str,
    decode: impl Fn(&KvMap) -> Result<T, DecodeError>,
) -> Result<Vec<T>, DecodeError> {
    match kv.opt_list(entity, field)? {
        None => Ok(Vec::new()),
        Some(items) => decode_items(items, entity, field, decode),
    }
}

/// Like [`decode_list`], for a list field that must be present even when empty.
pub(crate) fn decode_required_list<T>(
    kv: &KvMap,
    entity: &'static str,
    field: &'static str,
    decode: impl Fn(&KvMap) -> Result<T, DecodeError>,
) -> Result<Vec<T>, DecodeError> {
    decode_items(kv.list(entity, field)?, entity, field, decode)
}

fn decode_items<T>(
    items: &[KvValue],
    entity: &'static str,
    field: &'static str,
    decode: impl Fn(&KvMap) -> Result<T, DecodeError>,
) -> Result<Vec<T>, DecodeError> {
    items
        .iter()
        .map(|item| decode(item.expect_map(entity, field)?))
        .collect()
}

pub(crate) fn encode_list<T>(items: &[T], encode: impl Fn(&T) -> KvMap) -> Vec<KvValue> {
    items.iter().map(|item| KvValue::Map(encode(item))).collect()
}
