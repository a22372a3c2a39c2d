//! Object-store credentials and location, read from `ZARR_S3_*` environment variables
//! and an optional `.env` file.

use std::collections::BTreeMap;

use figment::{
    Figment,
    providers::{Env, Serialized},
};
use serde::{Deserialize, Deserializer, Serialize};

use crate::{Error, Result};

/// Prefix shared by the environment variables read by [`S3Settings::from_env`].
pub const ENV_PREFIX: &str = "ZARR_S3_";

/// File read for `ZARR_S3_*` values, in the working directory or one of its parents.
pub const DOTENV_FILE: &str = ".env";

/// Name of the dataset written under the bucket.
pub const DEFAULT_DATASET_ROOT: &str = "hello-hackathon.zarr";

/// `ZARR_S3_*` entries of the nearest [`DOTENV_FILE`], keyed by lowercase field name.
fn dotenv_settings() -> Result<BTreeMap<String, String>> {
    let entries = match dotenvy::from_filename_iter(DOTENV_FILE) {
        Ok(entries) => entries,
        Err(e) if e.not_found() => return Ok(BTreeMap::new()),
        Err(e) => {
            return Err(Error::configuration(format!(
                "could not read {DOTENV_FILE}: {e}"
            )));
        }
    };
    let mut settings = BTreeMap::new();
    for entry in entries {
        let (key, value) =
            entry.map_err(|e| Error::configuration(format!("invalid {DOTENV_FILE}: {e}")))?;
        if let Some(field) = key.strip_prefix(ENV_PREFIX) {
            settings.insert(field.to_ascii_lowercase(), value);
        }
    }
    log::debug!("read {} settings from {DOTENV_FILE}", settings.len());
    Ok(settings)
}

/// Accept strings as well as values the environment provider parsed as numbers or booleans.
fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        String(String),
        Unsigned(u64),
        Signed(i64),
        Float(f64),
        Bool(bool),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::String(s) => s,
        Raw::Unsigned(n) => n.to_string(),
        Raw::Signed(n) => n.to_string(),
        Raw::Float(n) => n.to_string(),
        Raw::Bool(b) => b.to_string(),
    })
}

/// Connection details of the S3-compatible object store.
///
/// Built once and passed by reference to every stage that needs it.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct S3Settings {
    /// `ZARR_S3_ENDPOINT`, e.g. `http://localhost:9000`.
    #[serde(deserialize_with = "lenient_string")]
    pub endpoint: String,
    /// `ZARR_S3_BUCKET_NAME`.
    #[serde(deserialize_with = "lenient_string")]
    pub bucket_name: String,
    /// `ZARR_S3_ACCESS_KEY_ID`.
    #[serde(deserialize_with = "lenient_string")]
    pub access_key_id: String,
    /// `ZARR_S3_SECRET_ACCESS_KEY`.
    #[serde(deserialize_with = "lenient_string")]
    pub secret_access_key: String,
}

impl std::fmt::Debug for S3Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Settings")
            .field("endpoint", &self.endpoint)
            .field("bucket_name", &self.bucket_name)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .finish()
    }
}

impl S3Settings {
    /// Settings sources: the [`DOTENV_FILE`], overridden by the process environment.
    ///
    /// The process environment is not modified.
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] if the [`DOTENV_FILE`] exists but cannot be parsed.
    pub fn figment() -> Result<Figment> {
        Ok(Figment::new()
            .merge(Serialized::defaults(dotenv_settings()?))
            .merge(Env::prefixed(ENV_PREFIX)))
    }

    /// Read settings from the [`DOTENV_FILE`] and the process environment.
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] if any of the four variables is missing or empty.
    pub fn from_env() -> Result<Self> {
        Self::from_figment(&Self::figment()?)
    }

    /// Extract settings from an arbitrary figment.
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] if any field is missing or empty.
    pub fn from_figment(figment: &Figment) -> Result<Self> {
        let settings: Self = figment.extract().map_err(|e| {
            Error::configuration(format!("could not read {ENV_PREFIX}* settings: {e}"))
        })?;
        settings.validate()?;
        log::debug!("loaded object store settings: {settings:?}");
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        for (value, var) in [
            (&self.endpoint, "ENDPOINT"),
            (&self.bucket_name, "BUCKET_NAME"),
            (&self.access_key_id, "ACCESS_KEY_ID"),
            (&self.secret_access_key, "SECRET_ACCESS_KEY"),
        ] {
            if value.trim().is_empty() {
                return Err(Error::configuration(format!("{ENV_PREFIX}{var} is required")));
            }
        }
        Ok(())
    }

    /// URI of `dataset_root` in the bucket: `{endpoint}/{bucket}/{dataset_root}`.
    pub fn dataset_uri(&self, dataset_root: &str) -> String {
        format!(
            "{}/{}/{}",
            self.endpoint.trim_end_matches('/'),
            self.bucket_name,
            dataset_root.trim_matches('/')
        )
    }
}
