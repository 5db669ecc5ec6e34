//! Layered configuration loader and path helpers.
//!
//! Uses Figment to merge `embedkit.toml` + `embedkit.<env>.toml` + `EMBEDKIT_*`
//! env vars (nested keys separated by `__`, e.g. `EMBEDKIT_EMBEDDING__BATCH_SIZE`).
//! Paths read from config go through [`expand_path`].

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use std::borrow::Cow;
use std::env;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

pub const ENV_PREFIX: &str = "EMBEDKIT_";

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());
        Self::load_from(Path::new("."), &env_name)
    }

    /// Load config files from `dir` for the given environment name.
    pub fn load_from(dir: &Path, env_name: &str) -> Result<Self> {
        let mut figment = Figment::new().merge(Toml::file(dir.join("embedkit.toml")));
        match env_name {
            "dev" | "development" => figment = figment.merge(Toml::file(dir.join("embedkit.dev.toml"))),
            "prod" | "production" => figment = figment.merge(Toml::file(dir.join("embedkit.prod.toml"))),
            "test" | "testing" => figment = figment.merge(Toml::file(dir.join("embedkit.test.toml"))),
            _ => {}
        }
        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));
        tracing::debug!(env = env_name, dir = %dir.display(), "configuration loaded");
        Ok(Self { figment })
    }

    pub fn from_figment(figment: Figment) -> Self {
        Self { figment }
    }

    /// Set a dotted `key` above every other layer (used for command-line flags).
    pub fn with_override<T: serde::Serialize>(self, key: &str, value: T) -> Self {
        Self { figment: self.figment.merge(Serialized::default(key, value)) }
    }

    pub fn get<T>(&self, key: &str) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| Error::InvalidConfig(format!("Failed to get '{}': {}", key, e)))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.figment.contains(key)
    }
}

/// `~` and `$VAR`/`${VAR}` expansion for paths taken from config. Unknown
/// variables are left as written.
pub fn expand_path(raw: impl AsRef<str>) -> PathBuf {
    let raw = raw.as_ref();
    let with_vars = shellexpand::env(raw).unwrap_or(Cow::Borrowed(raw));
    PathBuf::from(shellexpand::tilde(&with_vars).into_owned())
}
