use std::fs;
use std::io;
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// File selection predicate
// ---------------------------------------------------------------------------

/// Which files of the input tree take part in a batch run.
///
/// A file passes when its name ends with `extension` and contains both
/// `contains` and `name_filter`. Empty strings impose no constraint.
#[derive(Debug, Clone, Default)]
pub struct FileSelector {
    pub extension: String,
    pub contains: String,
    pub name_filter: String,
}

impl FileSelector {
    pub fn matches(&self, file_name: &str) -> bool {
        if !self.name_filter.is_empty() && !file_name.contains(&self.name_filter) {
            return false;
        }
        if !self.contains.is_empty() && !file_name.contains(&self.contains) {
            return false;
        }
        file_name.ends_with(&self.extension)
    }
}

/// A selected source file: the directory it was found in plus its name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub dir: PathBuf,
    pub name: String,
}

impl SourceFile {
    pub fn path(&self) -> PathBuf {
        self.dir.join(&self.name)
    }

    /// Identifier of the file's measurement table: its path below `root`
    /// with separators replaced by `_`, e.g. `day2/a.tif` -> `day2_a.tif`.
    pub fn table_name(&self, root: &Path) -> String {
        let rel = self.dir.strip_prefix(root).unwrap_or(Path::new(""));
        let mut parts: Vec<String> = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        parts.push(self.name.clone());
        parts.join("_")
    }
}

// ---------------------------------------------------------------------------
// Directory walk
// ---------------------------------------------------------------------------

/// Recursively collect matching files under `root`.
///
/// Within a directory, files are visited before sub-directories and both are
/// sorted by name, so the order is stable across platforms.
pub fn collect_files(root: &Path, selector: &FileSelector) -> io::Result<Vec<SourceFile>> {
    let mut out = Vec::new();
    walk(root, selector, &mut out)?;
    Ok(out)
}

fn walk(dir: &Path, selector: &FileSelector, out: &mut Vec<SourceFile>) -> io::Result<()> {
    let mut files = Vec::new();
    let mut subdirs = Vec::new();

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            subdirs.push(path);
        } else if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            if selector.matches(name) {
                files.push(name.to_string());
            } else {
                log::debug!("Skipping {}", path.display());
            }
        }
    }

    files.sort();
    subdirs.sort();

    out.extend(files.into_iter().map(|name| SourceFile {
        dir: dir.to_path_buf(),
        name,
    }));
    for sub in subdirs {
        walk(&sub, selector, out)?;
    }
    Ok(())
}
