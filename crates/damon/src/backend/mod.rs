#![forbid(unsafe_code)]

pub mod debugfs;
pub mod fs;
pub mod sysfs;

pub use debugfs::DebugfsBackend;
pub use sysfs::SysfsBackend;

use crate::error::Error;
use crate::features::FeatureSet;
use crate::model::{DamosStats, DamosTriedRegion, Kdamond, KdamondState};
use config::Interface;
use std::path::Path;

/// A kernel interface to DAMON.
pub trait Backend: Send + Sync {
    /// Which interface this is. Never [`Interface::Auto`].
    fn interface(&self) -> Interface;

    /// Directory holding the interface's control files.
    fn root(&self) -> &Path;

    /// Whether the running kernel exposes this interface.
    fn is_available(&self) -> bool;

    /// Probe which optional features the kernel supports.
    fn probe_features(&self) -> Result<FeatureSet, Error>;

    fn current_kdamonds(&self) -> Result<Vec<Kdamond>, Error>;

    fn current_kdamond_names(&self) -> Result<Vec<String>, Error>;

    fn is_kdamond_running(&self, name: &str) -> Result<bool, Error>;

    fn kdamond_pid(&self, name: &str) -> Result<Option<u32>, Error>;

    /// Write a full configuration, replacing whatever the kernel holds.
    fn apply_kdamonds(&self, kdamonds: &[Kdamond]) -> Result<(), Error>;

    /// Update the inputs of running kdamonds in place.
    fn commit_inputs(&self, _kdamonds: &[Kdamond]) -> Result<(), Error> {
        Err(Error::Unsupported {
            interface: self.interface(),
            operation: "committing inputs to running kdamonds",
        })
    }

    /// Fresh scheme statistics of kdamond `name`, per context and scheme.
    fn update_schemes_stats(&self, name: &str) -> Result<Vec<Vec<DamosStats>>, Error>;

    /// Regions each scheme of kdamond `name` was last tried on, per context
    /// and scheme.
    fn update_schemes_tried_regions(
        &self,
        _name: &str,
    ) -> Result<Vec<Vec<Vec<DamosTriedRegion>>>, Error> {
        Err(Error::Unsupported {
            interface: self.interface(),
            operation: "schemes tried regions",
        })
    }

    /// Request kdamonds `names` to be turned `state`. The kernel may apply
    /// the request asynchronously.
    fn turn_damon(&self, state: KdamondState, names: &[String]) -> Result<(), Error>;
}
