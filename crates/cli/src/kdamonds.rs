//! Kdamonds files.
//!
//! A kdamonds file is TOML holding one `[[kdamonds]]` table per kdamond, laid
//! out like [`Kdamond::to_kvpairs`]. Numbers and booleans are accepted
//! wherever the key-value tree expects text.

use anyhow::Context;
use damon::{Kdamond, KvMap};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

#[derive(Debug, Default, Serialize, Deserialize)]
struct KdamondsFile {
    #[serde(default)]
    kdamonds: Vec<KvMap>,
}

pub fn parse(text: &str) -> anyhow::Result<Vec<Kdamond>> {
    let file: KdamondsFile = toml_edit::de::from_str(text)?;
    file.kdamonds
        .iter()
        .enumerate()
        .map(|(idx, kv)| {
            Kdamond::from_kvpairs(kv).with_context(|| format!("kdamond #{idx} is invalid"))
        })
        .collect()
}

pub fn to_string(kdamonds: &[Kdamond]) -> anyhow::Result<String> {
    let file = KdamondsFile {
        kdamonds: kdamonds.iter().map(Kdamond::to_kvpairs).collect(),
    };
    Ok(toml_edit::ser::to_string_pretty(&file)?)
}

pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Vec<Kdamond>> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let kdamonds = parse(&text).with_context(|| format!("failed to load {}", path.display()))?;
    debug!(path = %path.display(), count = kdamonds.len(), "loaded kdamonds");
    Ok(kdamonds)
}

pub fn save(path: impl AsRef<Path>, kdamonds: &[Kdamond]) -> anyhow::Result<()> {
    let path = path.as_ref();
    std::fs::write(path, to_string(kdamonds)?)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}
