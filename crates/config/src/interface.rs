use crate::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The kernel interface used to control DAMON.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Interface {
    /// Use sysfs if the kernel exposes it, debugfs otherwise.
    #[default]
    #[serde(rename = "auto")]
    Auto,

    /// The structured `/sys/kernel/mm/damon/admin` hierarchy. One file per
    /// field, one directory per kdamond, context, target and scheme.
    #[serde(rename = "sysfs")]
    Sysfs,

    /// The legacy flat-file interface under `/sys/kernel/debug/damon`.
    /// Deprecated by the kernel; supports a single kdamond.
    #[serde(rename = "debugfs")]
    Debugfs,
}

impl Interface {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Sysfs => "sysfs",
            Self::Debugfs => "debugfs",
        }
    }
}

impl fmt::Display for Interface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Interface {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "auto" => Ok(Self::Auto),
            "sysfs" => Ok(Self::Sysfs),
            "debugfs" => Ok(Self::Debugfs),
            other => Err(Error::InvalidInterface(other.to_string())),
        }
    }
}
