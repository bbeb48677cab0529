//! Last-used parameter persistence.
//!
//! Values are plain strings under flat keys such as `last_hillshade_azimuth`,
//! matching what the host web application keeps in browser storage.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingsError {
    Unavailable,
    Corrupt(String),
    Io(String),
}

impl std::fmt::Display for SettingsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SettingsError::Unavailable => write!(f, "settings storage unavailable"),
            SettingsError::Corrupt(msg) => write!(f, "settings storage corrupt: {msg}"),
            SettingsError::Io(msg) => write!(f, "settings storage error: {msg}"),
        }
    }
}

impl std::error::Error for SettingsError {}

/// String key/value storage that survives across sessions.
///
/// Takes `&self` because one store is shared by every panel.
pub trait SettingsStore {
    fn get(&self, key: &str) -> Result<Option<String>, SettingsError>;
    fn set(&self, key: &str, value: &str) -> Result<(), SettingsError>;
}

/// `last_<namespace>_<field>`, e.g. `last_watershed_snap_distance`.
pub fn last_used_key(namespace: &str, field: &str) -> String {
    format!("last_{namespace}_{field}")
}

/// Reads a numeric setting, falling back to `default` when it is missing,
/// unreadable or not a finite number.
pub fn read_f64(store: &dyn SettingsStore, key: &str, default: f64) -> f64 {
    match store.get(key) {
        Ok(Some(raw)) => match raw.trim().parse::<f64>() {
            Ok(v) if v.is_finite() => v,
            _ => {
                warn!(key, raw = %raw, "ignoring unparsable setting");
                default
            }
        },
        Ok(None) => default,
        Err(err) => {
            warn!(key, "settings read failed: {err}");
            default
        }
    }
}

/// Persists a numeric setting. Failures are logged, never propagated.
pub fn write_f64(store: &dyn SettingsStore, key: &str, value: f64) -> bool {
    match store.set(key, &value.to_string()) {
        Ok(()) => true,
        Err(err) => {
            warn!(key, "settings write failed: {err}");
            false
        }
    }
}

#[derive(Debug, Default)]
pub struct InMemorySettings {
    values: RefCell<BTreeMap<String, String>>,
}

impl InMemorySettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_values<I, K, V>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let values = values
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self {
            values: RefCell::new(values),
        }
    }

    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.values.borrow().clone()
    }
}

impl SettingsStore for InMemorySettings {
    fn get(&self, key: &str) -> Result<Option<String>, SettingsError> {
        Ok(self.values.borrow().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), SettingsError> {
        self.values
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Settings persisted as a flat JSON object on disk, written through on
/// every `set`.
#[derive(Debug)]
pub struct JsonFileSettings {
    path: PathBuf,
    values: RefCell<BTreeMap<String, String>>,
}

impl JsonFileSettings {
    /// Opens `path`, starting empty if the file does not exist yet.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, SettingsError> {
        let path = path.into();
        let values = match std::fs::read_to_string(&path) {
            Ok(raw) if raw.trim().is_empty() => BTreeMap::new(),
            Ok(raw) => serde_json::from_str::<BTreeMap<String, String>>(&raw)
                .map_err(|e| SettingsError::Corrupt(e.to_string()))?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => return Err(SettingsError::Io(format!("read {path:?}: {err}"))),
        };
        Ok(Self {
            path,
            values: RefCell::new(values),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, values: &BTreeMap<String, String>) -> Result<(), SettingsError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .map_err(|e| SettingsError::Io(format!("create {parent:?}: {e}")))?;
        }
        let raw = serde_json::to_string_pretty(values)
            .map_err(|e| SettingsError::Io(e.to_string()))?;

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, raw).map_err(|e| SettingsError::Io(format!("write {tmp:?}: {e}")))?;
        std::fs::rename(&tmp, &self.path)
            .map_err(|e| SettingsError::Io(format!("rename {tmp:?}: {e}")))?;
        Ok(())
    }
}

impl SettingsStore for JsonFileSettings {
    fn get(&self, key: &str) -> Result<Option<String>, SettingsError> {
        Ok(self.values.borrow().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), SettingsError> {
        let mut values = self.values.borrow_mut();
        values.insert(key.to_string(), value.to_string());
        self.flush(&values)
    }
}
