//! Store configuration loaded from the environment.
//!
//! # Environment Variables
//!
//! | Variable | Required | Description |
//! |---|---|---|
//! | `S3_UPLOADS_BUCKET` | Yes | Bucket name, optionally followed by `/path` |
//! | `S3_UPLOADS_REGION` | Yes | Bucket region |
//! | `S3_UPLOADS_KEY` | Yes | Access key id |
//! | `S3_UPLOADS_SECRET` | Yes | Secret access key |
//! | `S3_UPLOADS_ENDPOINT` | No | Endpoint URL for S3-compatible stores |

/// Variables that must be set before a run can start.
pub const REQUIRED_VARS: &[&str] = &[
    "S3_UPLOADS_BUCKET",
    "S3_UPLOADS_REGION",
    "S3_UPLOADS_KEY",
    "S3_UPLOADS_SECRET",
];

/// Optional endpoint override.
pub const ENDPOINT_VAR: &str = "S3_UPLOADS_ENDPOINT";

/// Errors raised while validating store configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// One or more required variables are unset or empty.
    #[error("Missing environment variable(s): {}", names.join(", "))]
    Missing {
        /// Every missing variable, in [`REQUIRED_VARS`] order.
        names: Vec<String>,
    },

    /// A variable is set but unusable.
    #[error("Invalid value for {name}: {message}")]
    Invalid {
        /// Variable name.
        name: String,
        /// What is wrong with it.
        message: String,
    },
}

/// Validated connection settings for the bucket.
#[derive(Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Bucket name.
    pub bucket: String,
    /// Anything after the first `/` of `S3_UPLOADS_BUCKET`.
    pub bucket_path: Option<String>,
    /// Bucket region.
    pub region: String,
    /// Access key id.
    pub access_key_id: String,
    /// Secret access key.
    pub secret_access_key: String,
    /// Custom endpoint URL, if any.
    pub endpoint: Option<String>,
}

impl std::fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreConfig")
            .field("bucket", &self.bucket)
            .field("bucket_path", &self.bucket_path)
            .field("region", &self.region)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

impl StoreConfig {
    /// Reads the configuration from process environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] naming every required variable that
    /// is unset, or [`ConfigError::Invalid`] for a malformed bucket.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from an arbitrary variable lookup.
    ///
    /// Empty values count as unset.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] naming every required variable that
    /// is unset, or [`ConfigError::Invalid`] for a malformed bucket.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let missing: Vec<String> = REQUIRED_VARS
            .iter()
            .filter(|name| get(name).is_none())
            .map(|name| (*name).to_string())
            .collect();
        if !missing.is_empty() {
            return Err(ConfigError::Missing { names: missing });
        }

        let raw_bucket = get("S3_UPLOADS_BUCKET").unwrap_or_default();
        let (bucket, bucket_path) = split_bucket(&raw_bucket);
        if bucket.is_empty() {
            return Err(ConfigError::Invalid {
                name: "S3_UPLOADS_BUCKET".to_string(),
                message: format!("no bucket name in '{raw_bucket}'"),
            });
        }

        Ok(Self {
            bucket,
            bucket_path,
            region: get("S3_UPLOADS_REGION").unwrap_or_default(),
            access_key_id: get("S3_UPLOADS_KEY").unwrap_or_default(),
            secret_access_key: get("S3_UPLOADS_SECRET").unwrap_or_default(),
            endpoint: get(ENDPOINT_VAR),
        })
    }
}

/// Splits `bucket/some/path` into the bucket name and the trailing path.
fn split_bucket(raw: &str) -> (String, Option<String>) {
    let raw = raw.trim();
    match raw.split_once('/') {
        Some((bucket, rest)) => {
            let rest = rest.trim_matches('/');
            (
                bucket.to_string(),
                (!rest.is_empty()).then(|| rest.to_string()),
            )
        }
        None => (raw.to_string(), None),
    }
}
