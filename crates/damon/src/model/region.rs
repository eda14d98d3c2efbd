#![forbid(unsafe_code)]

use crate::error::{DecodeError, ParseError};
use crate::fmt::{format_addr_range, format_nr, text_to_nr};
use crate::kvpairs::KvMap;
use std::fmt;

/// Half-open address range `[start, end)`.
#[derive(Debug, Clone, Copy)]
pub struct DamonRegion {
    pub start: u64,
    pub end: u64,
}

impl DamonRegion {
    const ENTITY: &'static str = "region";

    pub fn new(start: &str, end: &str) -> Result<Self, ParseError> {
        Ok(Self {
            start: text_to_nr(start)?,
            end: text_to_nr(end)?,
        })
    }

    /// Like [`DamonRegion::new`] on numbers, but rejects `start > end`.
    pub fn new_checked(start: u64, end: u64) -> Result<Self, DecodeError> {
        if start > end {
            return Err(DecodeError::InvalidRange {
                entity: Self::ENTITY,
                min: start,
                max: end,
            });
        }
        Ok(Self { start, end })
    }

    pub fn size(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub fn to_kvpairs(&self) -> KvMap {
        KvMap::new()
            .with("start", format_nr(self.start, true))
            .with("end", format_nr(self.end, true))
    }

    pub fn from_kvpairs(kv: &KvMap) -> Result<Self, DecodeError> {
        Ok(Self {
            start: kv.parse(Self::ENTITY, "start", text_to_nr)?,
            end: kv.parse(Self::ENTITY, "end", text_to_nr)?,
        })
    }
}

impl fmt::Display for DamonRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_addr_range(self.start, self.end, false))
    }
}

impl PartialEq for DamonRegion {
    fn eq(&self, other: &Self) -> bool {
        self.to_string() == other.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn region_from_hex_text() {
        let region = DamonRegion::new("0x1000", "0x2000").unwrap();
        let kv = region.to_kvpairs();
        assert_eq!(kv, KvMap::new().with("start", "4096").with("end", "8192"));
        assert_eq!(DamonRegion::from_kvpairs(&kv).unwrap(), region);
        assert_eq!(region.to_string(), "[4,096, 8,192) (4.00 KiB)");
        assert_eq!(region.size(), 4_096);
    }

    #[test]
    fn inverted_region_only_rejected_when_checked() {
        assert!(DamonRegion::new("0x2000", "0x1000").is_ok());
        assert_eq!(
            DamonRegion::new_checked(8_192, 4_096),
            Err(DecodeError::InvalidRange {
                entity: "region",
                min: 8_192,
                max: 4_096
            })
        );
    }
}
