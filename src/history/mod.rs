// src/history/mod.rs

use anyhow::{Context, Result};
use std::{
    collections::HashSet,
    fs,
    path::PathBuf,
};

/// Suffix of in-flight downloads; such files are never treated as materialized.
pub const PARTIAL_SUFFIX: &str = ".part";

/// The local working directory of downloaded exports.
///
/// The set of file names in this directory is the record of what has already
/// been fetched; there is no separate manifest.
#[derive(Debug, Clone)]
pub struct LocalArchive {
    dir: PathBuf,
}

impl LocalArchive {
    /// Open the archive at `dir`, creating the directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("creating data directory {:?}", &dir))?;
        Ok(Self { dir })
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        is_export_name(name) && self.path_for(name).is_file()
    }

    /// Names of all materialized exports.
    pub fn names(&self) -> Result<HashSet<String>> {
        Ok(self.entries()?.into_iter().map(|(name, _)| name).collect())
    }

    /// Paths of all materialized exports, sorted by file name.
    pub fn exports(&self) -> Result<Vec<PathBuf>> {
        Ok(self.entries()?.into_iter().map(|(_, path)| path).collect())
    }

    fn entries(&self) -> Result<Vec<(String, PathBuf)>> {
        let mut out = Vec::new();
        let rd = fs::read_dir(&self.dir)
            .with_context(|| format!("listing data directory {:?}", &self.dir))?;
        for entry in rd {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if is_export_name(&name) {
                out.push((name, entry.path()));
            }
        }
        out.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(out)
    }
}

fn is_export_name(name: &str) -> bool {
    !name.starts_with('.') && !name.ends_with(PARTIAL_SUFFIX)
}
