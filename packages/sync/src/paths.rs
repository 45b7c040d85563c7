//! Mapping between local file paths and bucket keys.

use std::path::{Component, Path};

use crate::SyncError;

/// Bucket key separator.
pub const KEY_SEPARATOR: &str = "/";

/// Converts a local path into its bucket key.
///
/// The key is `local_path` relative to `key_root`, with components joined
/// by `/` and no leading separator, e.g. `/root/wp-content/uploads/a.jpg`
/// under `/root` becomes `wp-content/uploads/a.jpg`.
///
/// # Errors
///
/// * [`SyncError::InvariantViolation`] if `local_path` is not strictly
///   inside `key_root`, or the relative part contains `..` or other
///   non-name components.
/// * [`SyncError::NonUtf8Path`] if a component is not valid UTF-8 and so
///   has no faithful key.
pub fn to_key(local_path: &Path, key_root: &Path) -> Result<String, SyncError> {
    let violation = || SyncError::InvariantViolation {
        path: local_path.display().to_string(),
        root: key_root.display().to_string(),
    };

    let relative = local_path.strip_prefix(key_root).map_err(|_| violation())?;

    let mut segments = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(name) => {
                let name = name.to_str().ok_or_else(|| SyncError::NonUtf8Path {
                    path: local_path.display().to_string(),
                })?;
                segments.push(name);
            }
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(violation());
            }
        }
    }

    if segments.is_empty() {
        return Err(violation());
    }

    Ok(segments.join(KEY_SEPARATOR))
}
