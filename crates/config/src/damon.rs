use crate::interface::Interface;
use serde::{Deserialize, Serialize};
use serde_with::serde_as;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_SYSFS_ROOT: &str = "/sys/kernel/mm/damon/admin";
pub const DEFAULT_DEBUGFS_ROOT: &str = "/sys/kernel/debug/damon";

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Damon {
    /// Which kernel interface to drive.
    ///
    /// See [`Interface`] for possible values. `auto` prefers sysfs and falls
    /// back to debugfs when the sysfs hierarchy is missing.
    pub interface: Interface,

    /// Root of the DAMON sysfs hierarchy.
    pub sysfs_root: PathBuf,

    /// Root of the DAMON debugfs files.
    pub debugfs_root: PathBuf,

    /// How often the state of kdamonds is re-read while waiting for them to
    /// be turned on or off. **Measured in milliseconds**.
    #[serde_as(as = "serde_with::DurationMilliSeconds")]
    pub poll_interval: Duration,

    /// Give up waiting for kdamonds to be turned on or off after this long.
    /// **Measured in milliseconds**.
    ///
    /// # Note
    ///
    /// Unset means wait forever. Early kernels turn kdamonds on and off
    /// asynchronously, so the wait only ends when the kernel reports the
    /// requested state.
    #[serde_as(as = "Option<serde_with::DurationMilliSeconds>")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poll_timeout: Option<Duration>,

    /// Log every file written to the kernel interface.
    pub debug_damon: bool,
}

impl Default for Damon {
    fn default() -> Self {
        Self {
            interface: Interface::Auto,
            sysfs_root: PathBuf::from(DEFAULT_SYSFS_ROOT),
            debugfs_root: PathBuf::from(DEFAULT_DEBUGFS_ROOT),
            poll_interval: Duration::from_secs(1),
            poll_timeout: None,
            debug_damon: false,
        }
    }
}
