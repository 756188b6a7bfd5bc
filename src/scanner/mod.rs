//! Data-directory scanner.
//!
//! Finds the JSON data files under a directory and works out which domain
//! each one belongs to from its file name.

use crate::import::domain_from_path;
use crate::models::Domain;
use anyhow::{bail, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

/// Configuration for data-file scanning.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Directory names never descended into.
    pub excludes: Vec<String>,
    /// Maximum file size in bytes
    pub max_file_size: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            excludes: vec!["target", "node_modules", "__pycache__"]
                .into_iter()
                .map(String::from)
                .collect(),
            max_file_size: 10 * 1024 * 1024, // 10MB
        }
    }
}

/// A data file and the domain it feeds.
#[derive(Debug, Clone, PartialEq)]
pub struct DataFile {
    pub path: PathBuf,
    pub domain: Domain,
    pub size: u64,
}

/// Scanner for data files under one root directory.
pub struct DataScanner {
    config: ScanConfig,
    root: PathBuf,
}

impl DataScanner {
    pub fn new(root: PathBuf, config: ScanConfig) -> Self {
        Self { config, root }
    }

    /// All matching files, sorted by path.
    pub fn scan(&self) -> Result<Vec<DataFile>> {
        if !self.root.is_dir() {
            bail!("Data directory not found: {}", self.root.display());
        }

        let mut files = Vec::new();
        let walker = WalkDir::new(&self.root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !self.is_excluded(e));

        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    debug!("Cannot read entry: {}", e);
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }
            if let Some(file) = self.classify(entry.path()) {
                files.push(file);
            }
        }

        files.sort_by(|a, b| a.path.cmp(&b.path));
        debug!("Found {} data files under {}", files.len(), self.root.display());
        Ok(files)
    }

    /// Check a single path against the scan criteria.
    pub fn classify(&self, path: &Path) -> Option<DataFile> {
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));
        if !is_json {
            return None;
        }

        let domain = domain_from_path(path)?;

        let size = match std::fs::metadata(path) {
            Ok(m) => m.len(),
            Err(_) => return None,
        };
        if size > self.config.max_file_size {
            warn!(
                "Skipping {} ({} bytes exceeds limit of {})",
                path.display(),
                size,
                self.config.max_file_size
            );
            return None;
        }

        Some(DataFile {
            path: path.to_path_buf(),
            domain,
            size,
        })
    }

    fn is_excluded(&self, entry: &DirEntry) -> bool {
        let name = entry.file_name().to_string_lossy();

        // Hidden files
        if name.starts_with('.') {
            return true;
        }

        entry.file_type().is_dir() && self.config.excludes.iter().any(|p| name == p.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(dir: &Path, rel: &str, content: &str) {
        let path = dir.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_scan_selects_domain_files_sorted() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "sales_q2.json", "[]");
        touch(dir.path(), "production.json", "[]");
        touch(dir.path(), "nested/反馈.json", "[]");
        touch(dir.path(), "notes.json", "[]");
        touch(dir.path(), "inventory.csv", "");
        touch(dir.path(), ".hidden/sales.json", "[]");
        touch(dir.path(), ".sales.json", "[]");
        touch(dir.path(), "node_modules/sales.json", "[]");

        let scanner = DataScanner::new(dir.path().to_path_buf(), ScanConfig::default());
        let files = scanner.scan().unwrap();

        let found: Vec<(String, Domain)> = files
            .iter()
            .map(|f| {
                (
                    f.path.strip_prefix(dir.path()).unwrap().to_string_lossy().to_string(),
                    f.domain,
                )
            })
            .collect();

        assert_eq!(
            found,
            vec![
                ("nested/反馈.json".to_string(), Domain::Feedback),
                ("production.json".to_string(), Domain::Production),
                ("sales_q2.json".to_string(), Domain::Sales),
            ]
        );
    }

    #[test]
    fn test_size_limit() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "sales.json", "[[\"A\", 1, 2.0]]");

        let scanner = DataScanner::new(
            dir.path().to_path_buf(),
            ScanConfig {
                max_file_size: 4,
                ..ScanConfig::default()
            },
        );
        assert!(scanner.scan().unwrap().is_empty());
    }

    #[test]
    fn test_missing_directory() {
        let scanner = DataScanner::new(PathBuf::from("/nonexistent/data"), ScanConfig::default());
        assert!(scanner.scan().is_err());
    }
}
