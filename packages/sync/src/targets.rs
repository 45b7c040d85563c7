//! Sync targets for a WordPress multisite install.
//!
//! Media for the main site lives in `wp-content/uploads`; legacy per-blog
//! media lives in `wp-content/blogs.dir/{blog_id}`. Keys mirror the path
//! relative to the install root.

use std::path::{Path, PathBuf};

use s3_diff_sync_models::SyncTarget;

use crate::report::RunReporter;

/// Main-site uploads directory, relative to the install root.
pub const UPLOADS_DIR: &[&str] = &["wp-content", "uploads"];

/// Parent of the per-blog directories, relative to the install root.
pub const BLOGS_DIR: &[&str] = &["wp-content", "blogs.dir"];

fn join_all(root: &Path, segments: &[&str]) -> PathBuf {
    segments.iter().fold(root.to_path_buf(), |path, s| path.join(s))
}

/// Builds a target whose prefix is `segments` joined by `/`.
fn target(label: String, install_root: &Path, segments: &[&str]) -> SyncTarget {
    SyncTarget {
        label,
        prefix: format!("{}/", segments.join("/")),
        local_root: join_all(install_root, segments),
        key_root: install_root.to_path_buf(),
    }
}

/// Target for the main site's `wp-content/uploads` tree.
#[must_use]
pub fn uploads_target(install_root: &Path) -> SyncTarget {
    target("uploads".to_string(), install_root, UPLOADS_DIR)
}

/// Target for one blog's `wp-content/blogs.dir/{blog_id}` tree.
///
/// # Errors
///
/// Returns [`std::io::ErrorKind::InvalidInput`] if `blog_id` is empty or
/// is not a single path segment.
pub fn blog_target(install_root: &Path, blog_id: &str) -> std::io::Result<SyncTarget> {
    if blog_id.is_empty()
        || blog_id == "."
        || blog_id == ".."
        || blog_id.contains(['/', '\\'])
    {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("invalid blog id '{blog_id}'"),
        ));
    }

    let segments: Vec<&str> = BLOGS_DIR
        .iter()
        .copied()
        .chain(std::iter::once(blog_id))
        .collect();
    Ok(target(format!("blog {blog_id}"), install_root, &segments))
}

/// Targets found under an install root, plus the paths that could not be
/// listed while looking for them.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Discovery {
    /// Targets to sync, in order.
    pub targets: Vec<SyncTarget>,
    /// Paths skipped during discovery, with the error that caused it.
    pub unreadable: Vec<(PathBuf, String)>,
}

impl Discovery {
    /// Records every skipped path as unreadable in the run log.
    pub fn report_to(&self, reporter: &RunReporter) {
        for (path, message) in &self.unreadable {
            reporter.record_unreadable(Some(path.as_path()), message);
        }
    }
}

/// Lists the targets for one run.
///
/// With `blog_id`, only that blog is synced. Otherwise the main uploads
/// tree comes first, followed by every subdirectory of `blogs.dir` in name
/// order. A missing `blogs.dir` just means there are no blog targets. A
/// `blogs.dir` (or an entry in it) that cannot be read is logged and kept
/// in [`Discovery::unreadable`]; the uploads target is still returned.
///
/// # Errors
///
/// Returns an I/O error if `blog_id` is invalid.
pub fn discover_targets(install_root: &Path, blog_id: Option<&str>) -> std::io::Result<Discovery> {
    if let Some(id) = blog_id {
        return Ok(Discovery {
            targets: vec![blog_target(install_root, id)?],
            unreadable: Vec::new(),
        });
    }

    let mut discovery = Discovery {
        targets: vec![uploads_target(install_root)],
        unreadable: Vec::new(),
    };

    let blogs_dir = join_all(install_root, BLOGS_DIR);
    let entries = match std::fs::read_dir(&blogs_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            log::info!("No {} directory, skipping blog targets", blogs_dir.display());
            return Ok(discovery);
        }
        Err(e) => {
            log::warn!("Cannot list {}, skipping blog targets: {e}", blogs_dir.display());
            discovery.unreadable.push((blogs_dir, e.to_string()));
            return Ok(discovery);
        }
    };

    let mut blog_ids = Vec::new();
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                log::warn!("Skipping unreadable entry in {}: {e}", blogs_dir.display());
                discovery.unreadable.push((blogs_dir.clone(), e.to_string()));
                continue;
            }
        };
        if !entry.path().is_dir() {
            continue;
        }
        match entry.file_name().into_string() {
            Ok(name) => blog_ids.push(name),
            Err(name) => log::warn!("Skipping blog directory with non-UTF-8 name {name:?}"),
        }
    }
    blog_ids.sort();

    for id in &blog_ids {
        match blog_target(install_root, id) {
            Ok(target) => discovery.targets.push(target),
            Err(e) => {
                log::warn!("Skipping blog directory '{id}': {e}");
                discovery.unreadable.push((blogs_dir.join(id), e.to_string()));
            }
        }
    }

    Ok(discovery)
}
