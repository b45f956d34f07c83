//! Recursive directory discovery of plugin candidates.
//!
//! A count-only pass and a populate pass share one `walk` so they cannot
//! physically diverge in traversal order, but the caller still compares
//! the two counts in case the directory mutates between the two
//! `read_dir` calls, failing fatally if they disagree.

use std::path::{Path, PathBuf};

use crate::error::CoreError;

pub const PLUGIN_EXTENSION: &str = ".so";
pub const DEFAULT_PLUGIN_DIRNAME: &str = "plugins";

/// One discovered shared object: its full path and its logical name
/// (path relative to the framework root, extension stripped).
#[derive(Debug, Clone)]
pub struct Candidate {
    pub full_path: PathBuf,
    pub logical_name: String,
}

/// Walk `root` recursively and return every `.so` file found, sorted by
/// full path. Fatal if the directory changes shape between the counting
/// pass and the populating pass.
pub fn enumerate(root: &Path) -> anyhow::Result<Vec<Candidate>> {
    let counted = walk(root, root, None)?;

    let mut out = Vec::new();
    let populated = walk(root, root, Some(&mut out))?;

    if counted != populated {
        return Err(CoreError::DiscoveryCountMismatch {
            root: root.to_path_buf(),
            counted,
            populated,
        }
        .into());
    }

    out.sort_by(|a, b| a.full_path.cmp(&b.full_path));
    Ok(out)
}

/// Depth-first walk of `dir`. `out == None` means count-only; `out ==
/// Some(vec)` appends a `Candidate` for every match. Returns the number of
/// matching files seen, regardless of mode.
fn walk(dir: &Path, root: &Path, mut out: Option<&mut Vec<Candidate>>) -> anyhow::Result<usize> {
    let entries = std::fs::read_dir(dir).map_err(|source| CoreError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut count = 0;
    for entry in entries {
        let entry = entry.map_err(|source| CoreError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        let file_type = entry.file_type().map_err(|source| CoreError::Io {
            path: path.clone(),
            source,
        })?;

        if file_type.is_dir() {
            count += walk(&path, root, out.as_deref_mut())?;
            continue;
        }

        let name = match path.file_name().and_then(|n| n.to_str()) {
            Some(n) => n,
            None => continue,
        };
        if !name.contains(PLUGIN_EXTENSION) {
            continue;
        }

        count += 1;
        if let Some(ref mut vec) = out {
            vec.push(Candidate {
                logical_name: logical_name_of(&path, root),
                full_path: path,
            });
        }
    }
    Ok(count)
}

fn logical_name_of(full_path: &Path, root: &Path) -> String {
    let relative = full_path
        .strip_prefix(root)
        .unwrap_or(full_path)
        .to_string_lossy()
        .into_owned();
    relative
        .strip_suffix(PLUGIN_EXTENSION)
        .unwrap_or(&relative)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn flat_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("lib1.so"), b"").unwrap();
        fs::write(dir.path().join("readme.txt"), b"").unwrap();

        let found = enumerate(dir.path()).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].logical_name, "lib1");
    }

    #[test]
    fn nested_subdirectory_sorts_after_top_level() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("lib1.so"), b"").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub/lib4.so"), b"").unwrap();

        let found = enumerate(dir.path()).unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].logical_name, "lib1");
        assert_eq!(found[1].logical_name, "sub/lib4");
    }

    #[test]
    fn empty_directory_yields_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let found = enumerate(dir.path()).unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn missing_root_is_an_error() {
        assert!(enumerate(Path::new("/nonexistent/plugins/dir")).is_err());
    }
}
