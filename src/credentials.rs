//! Client-local API key storage.
//!
//! The pipeline itself only ever receives an already-resolved key; these
//! stores live at the edge (the CLI).

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use crate::error::{Result, ValidationError};
use crate::types::ProviderTag;

pub type KeyMap = BTreeMap<ProviderTag, String>;

/// Mapping from vendor to API key. Blank keys are treated as absent.
pub trait CredentialStore: Send + Sync {
    fn get(&self, provider: ProviderTag) -> Result<Option<String>>;

    /// Store a key; a blank key removes the entry.
    fn set(&self, provider: ProviderTag, key: &str) -> Result<()>;

    fn load_all(&self) -> Result<KeyMap>;
}

fn clean(keys: KeyMap) -> KeyMap {
    keys.into_iter()
        .map(|(tag, key)| (tag, key.trim().to_string()))
        .filter(|(_, key)| !key.is_empty())
        .collect()
}

fn apply(keys: &mut KeyMap, provider: ProviderTag, key: &str) {
    let key = key.trim();
    if key.is_empty() {
        keys.remove(&provider);
    } else {
        keys.insert(provider, key.to_string());
    }
}

fn redacted(keys: &KeyMap) -> Vec<ProviderTag> {
    keys.keys().copied().collect()
}

#[derive(Default)]
pub struct MemoryCredentialStore {
    keys: Mutex<KeyMap>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key(mut self, provider: ProviderTag, key: &str) -> Self {
        let keys = self.keys.get_mut().unwrap_or_else(PoisonError::into_inner);
        apply(keys, provider, key);
        self
    }

    /// Lock the map; a poisoned lock is recovered, never reported as empty.
    fn keys(&self) -> MutexGuard<'_, KeyMap> {
        self.keys.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for MemoryCredentialStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let providers = redacted(&self.keys());
        f.debug_struct("MemoryCredentialStore")
            .field("providers", &providers)
            .finish()
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get(&self, provider: ProviderTag) -> Result<Option<String>> {
        Ok(self.load_all()?.remove(&provider))
    }

    fn set(&self, provider: ProviderTag, key: &str) -> Result<()> {
        apply(&mut self.keys(), provider, key);
        Ok(())
    }

    fn load_all(&self) -> Result<KeyMap> {
        Ok(clean(self.keys().clone()))
    }
}

/// JSON file of `{"<provider>": "<key>"}`. A missing file is an empty store.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write(&self, keys: &KeyMap) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let raw: BTreeMap<&str, &str> = keys
            .iter()
            .map(|(tag, key)| (tag.as_str(), key.as_str()))
            .collect();
        fs::write(&self.path, serde_json::to_string_pretty(&raw)?)?;
        debug!(path = %self.path.display(), providers = keys.len(), "credentials saved");
        Ok(())
    }
}

impl CredentialStore for FileCredentialStore {
    fn get(&self, provider: ProviderTag) -> Result<Option<String>> {
        Ok(self.load_all()?.remove(&provider))
    }

    fn set(&self, provider: ProviderTag, key: &str) -> Result<()> {
        let mut keys = self.load_all()?;
        apply(&mut keys, provider, key);
        self.write(&keys)
    }

    fn load_all(&self) -> Result<KeyMap> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(KeyMap::new()),
            Err(err) => return Err(err.into()),
        };
        if text.trim().is_empty() {
            return Ok(KeyMap::new());
        }

        let raw: BTreeMap<String, String> = serde_json::from_str(&text)?;
        let mut keys = KeyMap::new();
        for (name, key) in raw {
            match name.parse::<ProviderTag>() {
                Ok(tag) => {
                    keys.insert(tag, key);
                }
                Err(_) => warn!(provider = %name, "ignoring key for unknown provider"),
            }
        }
        Ok(clean(keys))
    }
}

/// Pick the key for `provider`: an explicit key wins over the store.
pub fn resolve(
    store: &dyn CredentialStore,
    provider: ProviderTag,
    explicit: Option<&str>,
) -> Result<String> {
    if let Some(key) = explicit.map(str::trim).filter(|k| !k.is_empty()) {
        return Ok(key.to_string());
    }
    store
        .get(provider)?
        .ok_or_else(|| ValidationError::MissingApiKey(provider).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use tempfile::tempdir;

    #[test]
    fn test_memory_store_blank_is_absent() {
        let store = MemoryCredentialStore::new().with_key(ProviderTag::Qwen, " sk-q ");
        assert_eq!(store.get(ProviderTag::Qwen).unwrap().as_deref(), Some("sk-q"));

        store.set(ProviderTag::Qwen, "   ").unwrap();
        assert_eq!(store.get(ProviderTag::Qwen).unwrap(), None);
        assert!(store.load_all().unwrap().is_empty());
    }

    #[test]
    fn test_memory_store_survives_poisoned_lock() {
        let store = std::sync::Arc::new(MemoryCredentialStore::new().with_key(ProviderTag::Glm, "k-1"));
        let holder = std::sync::Arc::clone(&store);
        let _ = std::thread::spawn(move || {
            let _guard = holder.keys.lock().unwrap();
            panic!("writer crashed");
        })
        .join();
        assert!(store.keys.is_poisoned());

        store.set(ProviderTag::Qwen, "k-2").unwrap();
        assert_eq!(store.get(ProviderTag::Qwen).unwrap().as_deref(), Some("k-2"));
        assert_eq!(store.get(ProviderTag::Glm).unwrap().as_deref(), Some("k-1"));
    }

    #[test]
    fn test_memory_store_debug_hides_keys() {
        let store = MemoryCredentialStore::new().with_key(ProviderTag::OpenAi, "sk-hidden");
        let debug = format!("{:?}", store);
        assert!(debug.contains("OpenAi"));
        assert!(!debug.contains("sk-hidden"));
    }

    #[test]
    fn test_file_store_round_trip() {
        let dir = tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path().join("nested").join("keys.json"));
        assert!(store.load_all().unwrap().is_empty());

        store.set(ProviderTag::Anthropic, "sk-ant").unwrap();
        store.set(ProviderTag::Glm, "glm-key").unwrap();
        store.set(ProviderTag::Glm, "").unwrap();

        let reopened = FileCredentialStore::new(store.path());
        let keys = reopened.load_all().unwrap();
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[&ProviderTag::Anthropic], "sk-ant");

        let text = fs::read_to_string(store.path()).unwrap();
        assert!(text.contains("\"anthropic\""));
    }

    #[test]
    fn test_file_store_ignores_unknown_and_blank() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("keys.json");
        fs::write(&path, r#"{"openai":"sk-1","mistral":"x","qwen":"  "}"#).unwrap();

        let keys = FileCredentialStore::new(&path).load_all().unwrap();
        assert_eq!(keys.into_iter().collect::<Vec<_>>(), vec![(ProviderTag::OpenAi, "sk-1".to_string())]);
    }

    #[test]
    fn test_resolve_prefers_explicit_key() {
        let store = MemoryCredentialStore::new().with_key(ProviderTag::DeepSeek, "stored");
        assert_eq!(resolve(&store, ProviderTag::DeepSeek, Some("flag")).unwrap(), "flag");
        assert_eq!(resolve(&store, ProviderTag::DeepSeek, Some(" ")).unwrap(), "stored");
        assert!(matches!(
            resolve(&store, ProviderTag::MiniMax, None),
            Err(PipelineError::Validation(ValidationError::MissingApiKey(ProviderTag::MiniMax)))
        ));
    }
}
