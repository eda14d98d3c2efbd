#![forbid(unsafe_code)]

mod damon;
mod error;
mod interface;

pub use damon::{DEFAULT_DEBUGFS_ROOT, DEFAULT_SYSFS_ROOT, Damon};
pub use error::Error;
pub use interface::Interface;

use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct Config {
    pub damon: Damon,
}

impl Config {
    /// Load configuration from a TOML file. Missing fields are filled with defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let text = std::fs::read_to_string(path)?;
        let mut config: Config = toml_edit::de::from_str(&text)?;
        config.apply_defaults();
        Ok(config)
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Error> {
        let toml = toml_edit::ser::to_string_pretty(self)?;
        std::fs::write(path, toml)?;
        Ok(())
    }

    /// Load configuration from multiple TOML files. Later files override earlier ones.
    pub fn load_multiple<T, U>(paths: U) -> Result<Self, Error>
    where
        T: AsRef<Path>,
        U: IntoIterator<Item = T>,
    {
        let mut merged = toml_edit::DocumentMut::new();
        for path in paths {
            let path = path.as_ref();
            if !path.exists() {
                continue;
            }
            let text = std::fs::read_to_string(path)?;
            let doc: toml_edit::DocumentMut = text.parse()?;
            overlay_table(&mut merged, &doc);
        }
        let mut config: Config = toml_edit::de::from_str(&merged.to_string())?;
        config.apply_defaults();
        Ok(config)
    }

    fn apply_defaults(&mut self) {
        // A zero interval would turn the wait for kdamonds into a busy loop.
        if self.damon.poll_interval.is_zero() {
            self.damon.poll_interval = Damon::default().poll_interval;
        }
    }
}

/// Copy every key of `overlay` into `base`. Tables are descended into, so a
/// drop-in file only replaces the keys it names.
fn overlay_table(base: &mut toml_edit::Table, overlay: &toml_edit::Table) {
    use toml_edit::Item;
    for (key, item) in overlay.iter() {
        if let (Some(Item::Table(base_table)), Item::Table(table)) = (base.get_mut(key), item) {
            overlay_table(base_table, table);
        } else {
            base.insert(key, item.clone());
        }
    }
}
