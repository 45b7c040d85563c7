//! Lazy, depth-first enumeration of local files.
//!
//! [`walk`] yields every regular file under a root, tagged as either a
//! [`WalkItem::File`] candidate or a [`WalkItem::Excluded`] file. Entries
//! that cannot be read come back as [`WalkItem::Unreadable`] and the walk
//! carries on with their siblings.
//!
//! Symlinks are followed. A symlink that points back at one of its own
//! ancestors is reported as unreadable instead of being descended into.
//! Sibling order is whatever the filesystem returns.

use std::path::{Path, PathBuf};

/// Substring rules deciding which file names are never uploaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExclusionRules {
    patterns: Vec<String>,
}

impl Default for ExclusionRules {
    /// Excludes `.htaccess` files and anything that looks like a log.
    fn default() -> Self {
        Self {
            patterns: vec![".htaccess".to_string(), ".log".to_string()],
        }
    }
}

impl ExclusionRules {
    /// Rules that exclude nothing.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            patterns: Vec::new(),
        }
    }

    /// Adds a substring; any file name containing it is excluded.
    #[must_use]
    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        let pattern = pattern.into();
        if !pattern.is_empty() && !self.patterns.contains(&pattern) {
            self.patterns.push(pattern);
        }
        self
    }

    /// Returns `true` if `file_name` contains any excluded substring.
    #[must_use]
    pub fn is_excluded(&self, file_name: &str) -> bool {
        self.patterns.iter().any(|p| file_name.contains(p.as_str()))
    }

    /// The configured substrings.
    #[must_use]
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }
}

/// One event from a tree walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalkItem {
    /// A regular file to diff.
    File(PathBuf),
    /// A regular file skipped by an exclusion rule.
    Excluded(PathBuf),
    /// A directory or entry that could not be read.
    Unreadable {
        /// Offending path, when known.
        path: Option<PathBuf>,
        /// Why it could not be read.
        message: String,
    },
}

/// Iterator returned by [`walk`].
pub struct Walk {
    inner: walkdir::IntoIter,
    rules: ExclusionRules,
}

/// Walks `root` depth-first, yielding files as they are found.
#[must_use]
pub fn walk(root: &Path, rules: &ExclusionRules) -> Walk {
    Walk {
        inner: walkdir::WalkDir::new(root).follow_links(true).into_iter(),
        rules: rules.clone(),
    }
}

impl Iterator for Walk {
    type Item = WalkItem;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = match self.inner.next()? {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e.path().map(Path::to_path_buf);
                    let message = e.io_error().map_or_else(|| e.to_string(), ToString::to_string);
                    log::warn!(
                        "Skipping unreadable path {}: {message}",
                        path.as_deref().map_or_else(|| "?".into(), Path::to_string_lossy)
                    );
                    return Some(WalkItem::Unreadable { path, message });
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }

            let excluded = self
                .rules
                .is_excluded(&entry.file_name().to_string_lossy());
            let path = entry.into_path();

            return Some(if excluded {
                log::debug!("Excluded: {}", path.display());
                WalkItem::Excluded(path)
            } else {
                WalkItem::File(path)
            });
        }
    }
}
