//! Configuration loading and settings persistence for voxpage.
//!
//! The config file lives at `~/.voxpage/config.toml`:
//!
//! ```toml
//! [settings]
//! api_key = "${MISTRAL_API_KEY}"
//! model = "large"
//! speech_rate = 1.0
//! voice_name = ""
//!
//! [remote]
//! endpoint = "https://api.mistral.ai/v1/chat/completions"
//!
//! [page]
//! rebuild_debounce_ms = 2000
//! highlight_ms = 3000
//! ```
//!
//! A missing file resolves to defaults. Only the `[settings]` table is ever
//! written back; other sections and comments are preserved via `toml_edit`.

mod atomic_write;

pub use atomic_write::atomic_write_owner_only;

use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use voxpage_types::{ApiKey, ModelChoice, Settings, SettingsPatch, SpeechRate};

pub const DEFAULT_REBUILD_DEBOUNCE_MS: u64 = 2000;
pub const DEFAULT_HIGHLIGHT_MS: u64 = 3000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not determine home directory for config")]
    NoHome,
    #[error("failed to read config at {path}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("failed to edit config at {path}: {source}")]
    Edit {
        path: PathBuf,
        source: toml_edit::TomlError,
    },
    #[error("failed to write config at {path}: {source}")]
    Write { path: PathBuf, source: io::Error },
    #[error("config at {path} has a non-table `{key}` entry")]
    NotATable { path: PathBuf, key: &'static str },
}

impl ConfigError {
    pub fn path(&self) -> Option<&Path> {
        match self {
            ConfigError::NoHome => None,
            ConfigError::Read { path, .. }
            | ConfigError::Parse { path, .. }
            | ConfigError::Edit { path, .. }
            | ConfigError::Write { path, .. }
            | ConfigError::NotATable { path, .. } => Some(path),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct VoxConfig {
    pub settings: Option<RawSettings>,
    pub remote: Option<RemoteConfig>,
    pub page: Option<PageConfig>,
}

#[derive(Default, Deserialize)]
pub struct RawSettings {
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub speech_rate: Option<SpeechRate>,
    pub voice_name: Option<String>,
}

// Manual Debug impl to prevent leaking API keys in logs.
impl std::fmt::Debug for RawSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawSettings")
            .field(
                "api_key",
                &if self.api_key.is_some() {
                    "[REDACTED]"
                } else {
                    "None"
                },
            )
            .field("model", &self.model)
            .field("speech_rate", &self.speech_rate)
            .field("voice_name", &self.voice_name)
            .finish()
    }
}

impl RawSettings {
    /// Resolve to concrete settings, expanding `${VAR}` references in the key.
    #[must_use]
    pub fn resolve(&self) -> Settings {
        Settings {
            api_key: self
                .api_key
                .as_deref()
                .map(|raw| ApiKey::new(expand_env_vars(raw)))
                .unwrap_or_default(),
            model: self
                .model
                .as_deref()
                .map(ModelChoice::parse)
                .unwrap_or_default(),
            speech_rate: self.speech_rate.unwrap_or_default(),
            voice_name: self
                .voice_name
                .clone()
                .filter(|name| !name.trim().is_empty()),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct RemoteConfig {
    pub endpoint: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PageConfig {
    pub rebuild_debounce_ms: Option<u64>,
    pub highlight_ms: Option<u64>,
}

impl VoxConfig {
    #[must_use]
    pub fn resolved_settings(&self) -> Settings {
        self.settings
            .as_ref()
            .map(RawSettings::resolve)
            .unwrap_or_default()
    }

    #[must_use]
    pub fn endpoint(&self) -> Option<&str> {
        self.remote
            .as_ref()
            .and_then(|remote| remote.endpoint.as_deref())
            .map(str::trim)
            .filter(|endpoint| !endpoint.is_empty())
    }

    #[must_use]
    pub fn rebuild_debounce(&self) -> Duration {
        Duration::from_millis(
            self.page
                .as_ref()
                .and_then(|page| page.rebuild_debounce_ms)
                .unwrap_or(DEFAULT_REBUILD_DEBOUNCE_MS),
        )
    }

    #[must_use]
    pub fn highlight_duration(&self) -> Duration {
        Duration::from_millis(
            self.page
                .as_ref()
                .and_then(|page| page.highlight_ms)
                .unwrap_or(DEFAULT_HIGHLIGHT_MS),
        )
    }
}

/// Expand `${VAR}` references. Unset variables expand to the empty string;
/// an unclosed `${` is kept literally.
pub fn expand_env_vars(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(start) = rest.find("${") {
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            break;
        };
        out.push_str(&rest[..start]);
        let var = &after[..end];
        if !var.is_empty() {
            out.push_str(&env::var(var).unwrap_or_default());
        }
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    out
}

fn is_env_reference(raw: &str) -> bool {
    let raw = raw.trim();
    raw.starts_with("${") && raw.ends_with('}')
}

#[must_use]
pub fn config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".voxpage"))
}

#[must_use]
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("config.toml"))
}

/// File-backed settings store.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    /// Store at the default location (`~/.voxpage/config.toml`).
    pub fn open_default() -> Result<Self, ConfigError> {
        config_path().map(Self::at).ok_or(ConfigError::NoHome)
    }

    #[must_use]
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load_config(&self) -> Result<VoxConfig, ConfigError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "No config file; using defaults");
                return Ok(VoxConfig::default());
            }
            Err(err) => {
                tracing::warn!("Failed to read config at {:?}: {}", self.path, err);
                return Err(ConfigError::Read {
                    path: self.path.clone(),
                    source: err,
                });
            }
        };

        toml::from_str(&content).map_err(|err| {
            tracing::warn!("Failed to parse config at {:?}: {}", self.path, err);
            ConfigError::Parse {
                path: self.path.clone(),
                source: err,
            }
        })
    }

    pub fn load(&self) -> Result<Settings, ConfigError> {
        self.load_config().map(|config| config.resolved_settings())
    }

    /// Persist all four settings keys.
    ///
    /// If the file currently stores the key as a `${VAR}` reference that still
    /// expands to the same value, the reference is kept instead of the literal.
    pub fn save(&self, settings: &Settings) -> Result<(), ConfigError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
                path: self.path.clone(),
                source,
            })?;
            secure_dir(parent);
        }

        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => String::new(),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        let mut doc = content
            .parse::<toml_edit::DocumentMut>()
            .map_err(|source| ConfigError::Edit {
                path: self.path.clone(),
                source,
            })?;

        if !doc.contains_key("settings") {
            doc["settings"] = toml_edit::Item::Table(toml_edit::Table::new());
        }
        let Some(table) = doc
            .get_mut("settings")
            .and_then(toml_edit::Item::as_table_like_mut)
        else {
            return Err(ConfigError::NotATable {
                path: self.path.clone(),
                key: "settings",
            });
        };

        let existing_key = table
            .get("api_key")
            .and_then(toml_edit::Item::as_str)
            .filter(|raw| is_env_reference(raw))
            .filter(|raw| expand_env_vars(raw) == settings.api_key.as_str())
            .map(str::to_string);
        let key_value = existing_key.unwrap_or_else(|| settings.api_key.as_str().to_string());

        table.insert("api_key", toml_edit::value(key_value));
        table.insert("model", toml_edit::value(settings.model.as_str()));
        table.insert("speech_rate", toml_edit::value(settings.speech_rate.get()));
        table.insert(
            "voice_name",
            toml_edit::value(settings.voice_name.clone().unwrap_or_default()),
        );

        atomic_write_owner_only(&self.path, doc.to_string().as_bytes()).map_err(|source| {
            ConfigError::Write {
                path: self.path.clone(),
                source,
            }
        })?;

        tracing::debug!(path = %self.path.display(), model = %settings.model, "Settings saved");
        Ok(())
    }

    /// Load, merge a partial update, save, and return the merged settings.
    pub fn apply(&self, patch: SettingsPatch) -> Result<Settings, ConfigError> {
        let mut settings = self.load()?;
        settings.apply(patch);
        self.save(&settings)?;
        Ok(settings)
    }
}

// Tighten the config directory to user-only access when we own it.
#[cfg(unix)]
fn secure_dir(dir: &Path) {
    use std::os::unix::fs::{MetadataExt, PermissionsExt};

    let Ok(metadata) = fs::metadata(dir) else {
        return;
    };
    let our_uid = unsafe { libc::getuid() };
    if metadata.uid() != our_uid {
        return;
    }
    let mode = metadata.permissions().mode() & 0o777;
    if mode & 0o077 != 0
        && let Err(e) = fs::set_permissions(dir, fs::Permissions::from_mode(0o700))
    {
        tracing::warn!(path = %dir.display(), "Failed to restrict config dir: {e}");
    }
}

#[cfg(not(unix))]
fn secure_dir(_dir: &Path) {}
