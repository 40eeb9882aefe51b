use ignore::WalkBuilder;
use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};

use crate::error::DiscoveryError;
use crate::format::{ConfigFileRef, NamePattern};

/// Directory names that are never descended into
pub const DEFAULT_EXCLUDED_DIRS: [&str; 4] = [".git", "_meta", "node_modules", "plugins"];

/// Knobs for a single discovery pass
#[derive(Debug, Clone)]
pub struct DiscoveryOptions {
    /// Directory names pruned from the walk wherever they appear
    pub excluded_dirs: BTreeSet<String>,
    /// Apply `.gitignore`/`.ignore` rules on top of the exclusions
    pub respect_gitignore: bool,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            excluded_dirs: DEFAULT_EXCLUDED_DIRS.iter().map(|d| d.to_string()).collect(),
            respect_gitignore: false,
        }
    }
}

impl DiscoveryOptions {
    /// Add extra excluded directory names to the defaults
    pub fn with_excluded<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excluded_dirs.extend(names.into_iter().map(Into::into));
        self
    }

    fn is_excluded(&self, name: &str) -> bool {
        self.excluded_dirs.contains(name)
    }

    /// True if any directory segment of `relative` is excluded
    fn excludes_path(&self, relative: &Path) -> bool {
        relative
            .parent()
            .map(|parent| {
                parent.components().any(|c| match c {
                    Component::Normal(seg) => seg.to_str().is_some_and(|s| self.is_excluded(s)),
                    _ => false,
                })
            })
            .unwrap_or(false)
    }
}

/// Find every file under `root` whose name matches `pattern`.
///
/// `scope` restricts the walk to the given paths (resolved against `root`);
/// an empty scope walks the whole root. Results are relative to `root`,
/// sorted and free of duplicates.
pub fn find_config_files(
    root: &Path,
    scope: &[String],
    pattern: &NamePattern,
    options: &DiscoveryOptions,
) -> Result<Vec<ConfigFileRef>, DiscoveryError> {
    if !root.is_dir() {
        return Err(DiscoveryError::InvalidRoot(root.to_path_buf()));
    }
    let root = root
        .canonicalize()
        .map_err(|_| DiscoveryError::InvalidRoot(root.to_path_buf()))?;

    let mut found = BTreeSet::new();

    for start in resolve_scope(&root, scope)? {
        let excluded = options.clone();
        let walker = WalkBuilder::new(&start)
            .hidden(true) // Skip hidden files and directories
            .git_ignore(options.respect_gitignore)
            .git_global(options.respect_gitignore)
            .git_exclude(options.respect_gitignore)
            .ignore(options.respect_gitignore)
            .parents(options.respect_gitignore)
            .filter_entry(move |entry| {
                let is_dir = entry.file_type().map(|ft| ft.is_dir()).unwrap_or(false);
                if !is_dir || entry.depth() == 0 {
                    return true;
                }
                !entry
                    .file_name()
                    .to_str()
                    .is_some_and(|name| excluded.is_excluded(name))
            })
            .build();

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(error = %e, "skipping unreadable entry");
                    continue;
                }
            };
            if !entry.file_type().map(|ft| ft.is_file()).unwrap_or(false) {
                continue;
            }

            let matches = entry
                .file_name()
                .to_str()
                .is_some_and(|name| pattern.matches(name));
            if !matches {
                continue;
            }

            let Ok(relative) = entry.path().strip_prefix(&root) else {
                continue;
            };
            // Scope paths may themselves sit below an excluded directory
            if options.excludes_path(relative) {
                continue;
            }

            tracing::debug!(file = %relative.display(), "found config file");
            found.insert(relative.to_path_buf());
        }
    }

    Ok(found.into_iter().map(ConfigFileRef::new).collect())
}

fn resolve_scope(root: &Path, scope: &[String]) -> Result<Vec<PathBuf>, DiscoveryError> {
    if scope.is_empty() {
        return Ok(vec![root.to_path_buf()]);
    }

    scope
        .iter()
        .map(|p| {
            let joined = root.join(p);
            let resolved = joined
                .canonicalize()
                .map_err(|_| DiscoveryError::PathNotFound(PathBuf::from(p)))?;
            if !resolved.starts_with(root) {
                return Err(DiscoveryError::OutsideRoot(PathBuf::from(p)));
            }
            Ok(resolved)
        })
        .collect()
}
