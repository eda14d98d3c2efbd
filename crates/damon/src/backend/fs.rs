#![forbid(unsafe_code)]

//! Plain file access to the DAMON control files.

use crate::error::Error;
use crate::kvpairs::{KvMap, KvValue};
use std::fs;
use std::io;
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

/// Read a control file, without the trailing newline the kernel appends.
pub fn read_file(path: &Path) -> Result<String, Error> {
    let content = fs::read_to_string(path).map_err(|e| Error::kernel_io(path, e))?;
    Ok(content.trim_end_matches('\n').to_string())
}

/// Read a control file holding a single value.
pub fn read_value<T: FromStr>(path: &Path) -> Result<T, Error> {
    let content = read_file(path)?;
    content
        .trim()
        .parse()
        .map_err(|_| Error::kernel_data(path, content))
}

pub fn write_file(path: &Path, content: &str) -> Result<(), Error> {
    debug!(path = %path.display(), content, "write");
    fs::write(path, content).map_err(|e| {
        debug!(path = %path.display(), error = %e, "write failed");
        Error::kernel_io(path, e)
    })
}

/// Entries of `dir` with numeric names first in numeric order.
fn sorted_entries(dir: &Path) -> io::Result<Vec<fs::DirEntry>> {
    let mut entries = fs::read_dir(dir)?.collect::<io::Result<Vec<_>>>()?;
    entries.sort_by_cached_key(|entry| {
        let name = entry.file_name().to_string_lossy().into_owned();
        (name.parse::<u64>().map_err(|_| ()), name)
    });
    Ok(entries)
}

/// Numerically sorted names of the numbered subdirectories of `dir`, e.g.
/// the regions under a scheme's `tried_regions`.
pub fn numbered_dirs(dir: &Path) -> Result<Vec<String>, Error> {
    let entries = sorted_entries(dir).map_err(|e| Error::kernel_io(dir, e))?;
    Ok(entries
        .into_iter()
        .filter(|entry| entry.path().is_dir())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .filter(|name| name.parse::<u64>().is_ok())
        .collect())
}

/// Mirror the directory tree under `root` into a map: one nested map per
/// directory and one string per file. Files that cannot be read, such as
/// write-only command files, are left out.
pub fn read_tree(root: &Path) -> Result<KvMap, Error> {
    let mut tree = KvMap::new();
    for entry in sorted_entries(root).map_err(|e| Error::kernel_io(root, e))? {
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();
        if path.is_dir() {
            tree.insert(name, read_tree(&path)?);
            continue;
        }
        match fs::read_to_string(&path) {
            Ok(content) => tree.insert(name, content.trim_end_matches('\n')),
            Err(e) => debug!(path = %path.display(), error = %e, "skipping unreadable file"),
        }
    }
    Ok(tree)
}

/// Inverse of [`read_tree`]: strings are written to files, maps descend into
/// directories and list items into directories named by their index. Writes
/// happen in map order, so count files can precede the entries they size.
pub fn write_tree(root: &Path, tree: &KvMap) -> Result<(), Error> {
    for (name, value) in tree {
        write_value(&root.join(name), value)?;
    }
    Ok(())
}

fn write_value(path: &Path, value: &KvValue) -> Result<(), Error> {
    match value {
        KvValue::Str(content) => write_file(path, content),
        KvValue::Map(tree) => write_tree(path, tree),
        KvValue::List(items) => {
            for (idx, item) in items.iter().enumerate() {
                write_value(&path.join(idx.to_string()), item)?;
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn tree_roundtrip_through_directories() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("kdamonds/0")).unwrap();
        fs::create_dir_all(dir.path().join("kdamonds/10")).unwrap();
        fs::create_dir_all(dir.path().join("kdamonds/2")).unwrap();

        let tree = KvMap::new().with(
            "kdamonds",
            KvMap::new()
                .with("nr_kdamonds", "3")
                .with("0", KvMap::new().with("state", "off"))
                .with("2", KvMap::new().with("state", "on"))
                .with("10", KvMap::new().with("state", "off")),
        );
        write_tree(dir.path(), &tree).unwrap();

        let read = read_tree(dir.path()).unwrap();
        let kdamonds = read.map("tree", "kdamonds").unwrap();
        assert_eq!(
            kdamonds.keys().collect::<Vec<_>>(),
            ["0", "2", "10", "nr_kdamonds"]
        );
        assert_eq!(
            kdamonds.map("tree", "2").unwrap().str("tree", "state"),
            Ok("on")
        );
        assert_eq!(
            numbered_dirs(&dir.path().join("kdamonds")).unwrap(),
            ["0", "2", "10"]
        );
    }

    #[test]
    fn read_value_reports_bad_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nr_kdamonds");
        fs::write(&path, "two\n").unwrap();
        assert!(matches!(
            read_value::<u64>(&path),
            Err(Error::KernelData { content, .. }) if content == "two"
        ));
        fs::write(&path, "2\n").unwrap();
        assert_eq!(read_value::<u64>(&path).unwrap(), 2);
    }

    #[test]
    fn missing_file_is_kernel_io_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            read_file(&dir.path().join("monitor_on")),
            Err(Error::KernelIo { .. })
        ));
    }
}
