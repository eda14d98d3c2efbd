#![forbid(unsafe_code)]

use crate::error::{DecodeError, ParseError};
use crate::fmt::{format_sz, text_to_bytes};
use crate::kvpairs::KvMap;
use std::fmt;
use std::path::PathBuf;

/// Output sink of the kernel-side record feature. Only some downstream
/// kernels expose it, and only through debugfs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DamonRecord {
    pub rfile_buf: u64,
    pub rfile_path: PathBuf,
}

impl DamonRecord {
    const ENTITY: &'static str = "record_request";

    pub fn new(rfile_buf: &str, rfile_path: impl Into<PathBuf>) -> Result<Self, ParseError> {
        Ok(Self {
            rfile_buf: text_to_bytes(rfile_buf)?,
            rfile_path: rfile_path.into(),
        })
    }

    pub fn to_kvpairs(&self) -> KvMap {
        KvMap::new()
            .with("rfile_buf", format_sz(self.rfile_buf, true))
            .with("rfile_path", self.rfile_path.display().to_string())
    }

    pub fn from_kvpairs(kv: &KvMap) -> Result<Self, DecodeError> {
        Ok(Self {
            rfile_buf: kv.parse(Self::ENTITY, "rfile_buf", text_to_bytes)?,
            rfile_path: PathBuf::from(kv.str(Self::ENTITY, "rfile_path")?),
        })
    }
}

impl fmt::Display for DamonRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "path: {}, buffer sz: {}",
            self.rfile_path.display(),
            format_sz(self.rfile_buf, false)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_roundtrip() {
        let record = DamonRecord::new("1MiB", "/tmp/damon.data").unwrap();
        assert_eq!(record.rfile_buf, 1 << 20);
        let kv = record.to_kvpairs();
        assert_eq!(kv.str("record_request", "rfile_buf"), Ok("1 MiB"));
        assert_eq!(DamonRecord::from_kvpairs(&kv).unwrap(), record);
        assert_eq!(record.to_string(), "path: /tmp/damon.data, buffer sz: 1.00 MiB");
    }
}
