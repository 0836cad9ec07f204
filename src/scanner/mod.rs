//! Workspace scanner
//!
//! Walks the workspace (respecting .gitignore) while skipping excluded
//! directory names, excluded root-relative prefixes and the protected
//! automation directory. Used for candidate module discovery and for the
//! repository-wide placeholder scan.

use crate::config::GateConfig;
use crate::errors::{GateError, GateResult};
use ignore::WalkBuilder;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Normalize a root-relative path: forward slashes, no `.` segments,
/// `..` resolved lexically, no leading or trailing slash.
pub fn normalize_rel(path: &str) -> String {
    let unified = path.replace('\\', "/");
    let mut parts: Vec<&str> = Vec::new();
    for segment in unified.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            s => parts.push(s),
        }
    }
    parts.join("/")
}

/// Root-relative key for `path` (unchanged if outside `root`)
pub fn rel_key(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    normalize_rel(&rel.to_string_lossy())
}

fn is_under(rel: &str, prefix: &str) -> bool {
    if prefix.is_empty() {
        return false;
    }
    rel == prefix
        || rel
            .strip_prefix(prefix)
            .map(|rest| rest.starts_with('/'))
            .unwrap_or(false)
}

/// Directories the gate must never scan, write into or execute from.
///
/// Comparison is case-insensitive so a case-folding filesystem cannot be
/// used to sidestep the check.
#[derive(Debug, Clone, Default)]
pub struct ProtectedPaths {
    prefixes: Vec<String>,
}

impl ProtectedPaths {
    pub fn new(prefixes: &[String]) -> Self {
        Self {
            prefixes: prefixes
                .iter()
                .map(|p| normalize_rel(p).to_lowercase())
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }

    pub fn contains_rel(&self, rel: &str) -> bool {
        let rel = normalize_rel(rel).to_lowercase();
        self.prefixes.iter().any(|p| is_under(&rel, p))
    }

    pub fn contains(&self, root: &Path, path: &Path) -> bool {
        self.contains_rel(&rel_key(root, path))
    }

    /// Fail with `ProtectedPath` if `path` lies inside a protected directory
    pub fn guard(&self, root: &Path, path: &Path) -> GateResult<()> {
        if self.contains(root, path) {
            warn!("Refusing protected path {}", path.display());
            return Err(GateError::ProtectedPath(path.to_path_buf()));
        }
        Ok(())
    }

    pub fn prefixes(&self) -> &[String] {
        &self.prefixes
    }
}

/// Exclusion rules evaluated for every directory entry
#[derive(Debug, Clone)]
struct ExclusionRules {
    root: PathBuf,
    dir_names: Vec<String>,
    prefixes: Vec<String>,
    protected: ProtectedPaths,
}

impl ExclusionRules {
    fn allows(&self, path: &Path, is_dir: bool) -> bool {
        if is_dir {
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                if self.dir_names.iter().any(|d| d == name) {
                    return false;
                }
            }
        }
        let rel = rel_key(&self.root, path);
        if rel.is_empty() {
            return true;
        }
        !(self.protected.contains_rel(&rel) || self.prefixes.iter().any(|p| is_under(&rel, p)))
    }
}

/// Result of a walk: paths plus the number of entries that errored
#[derive(Debug, Default)]
pub struct ScanOutput {
    pub paths: Vec<PathBuf>,
    pub skipped_entries: usize,
}

pub struct WorkspaceScanner {
    rules: ExclusionRules,
}

impl WorkspaceScanner {
    /// Scanner for `root` with the configured exclusions, the protected
    /// directories and the gate's own quarantine and snapshot directories.
    pub fn new(root: &Path, config: &GateConfig) -> Self {
        let mut prefixes: Vec<String> = config
            .exclude
            .paths
            .iter()
            .map(|p| normalize_rel(p))
            .collect();
        prefixes.push(normalize_rel(&config.paths.quarantine));
        prefixes.push(normalize_rel(&config.paths.snapshots));
        prefixes.retain(|p| !p.is_empty());

        Self {
            rules: ExclusionRules {
                root: root.to_path_buf(),
                dir_names: config.exclude.effective_dirs(),
                prefixes,
                protected: ProtectedPaths::new(&config.scan.protected),
            },
        }
    }

    /// Add more excluded root-relative prefixes
    pub fn excluding<I, S>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for p in prefixes {
            let p = normalize_rel(p.as_ref());
            if !p.is_empty() && !self.rules.prefixes.contains(&p) {
                self.rules.prefixes.push(p);
            }
        }
        self
    }

    pub fn root(&self) -> &Path {
        &self.rules.root
    }

    /// Every non-excluded file, sorted
    pub fn walk_files(&self) -> ScanOutput {
        self.walk(|_| true)
    }

    /// Files whose names contain one of `keywords` and whose extension is
    /// one of `extensions` (both case-insensitive), sorted
    pub fn scan_candidates(&self, keywords: &[String], extensions: &[String]) -> ScanOutput {
        let keywords: Vec<String> = keywords.iter().map(|k| k.to_lowercase()).collect();
        let extensions: Vec<String> = extensions.iter().map(|e| e.to_lowercase()).collect();

        let output = self.walk(|path| {
            let name = match path.file_name().and_then(|n| n.to_str()) {
                Some(n) => n.to_lowercase(),
                None => return false,
            };
            let ext_ok = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| extensions.contains(&e.to_lowercase()))
                .unwrap_or(false);
            ext_ok && keywords.iter().any(|k| name.contains(k.as_str()))
        });

        debug!(
            "Scan found {} candidate modules ({} entries skipped)",
            output.paths.len(),
            output.skipped_entries
        );
        output
    }

    fn walk<F>(&self, keep: F) -> ScanOutput
    where
        F: Fn(&Path) -> bool,
    {
        let mut builder = WalkBuilder::new(&self.rules.root);
        builder
            .hidden(false)
            .parents(false)
            .git_ignore(true)
            .git_global(false)
            .git_exclude(true)
            .require_git(false)
            .add_custom_ignore_filename(".fitnessignore");

        let rules = self.rules.clone();
        builder.filter_entry(move |entry| {
            if entry.depth() == 0 {
                return true;
            }
            let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
            rules.allows(entry.path(), is_dir)
        });

        let mut output = ScanOutput::default();
        for result in builder.build() {
            let entry = match result {
                Ok(entry) => entry,
                Err(err) => {
                    warn!("Skipping unreadable entry during scan: {}", err);
                    output.skipped_entries += 1;
                    continue;
                }
            };

            let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
            if !is_file {
                continue;
            }
            let path = entry.path();
            // filter_entry already pruned these; re-checked so a walker bug
            // can never surface a protected file
            if !self.rules.allows(path, false) {
                continue;
            }
            if keep(path) {
                output.paths.push(path.to_path_buf());
            }
        }

        output.paths.sort();
        output
    }
}
