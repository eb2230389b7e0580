use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use pps_core::{Candidate, PinnedSnapshot};
use uuid::Uuid;

use crate::StoreError;

pub type PreferenceMap = BTreeMap<String, String>;

/// Synchronous, durable key-value store for per-user overlay state.
///
/// `transact` runs the closure as one critical section; every typed
/// read-modify-write goes through it so concurrent callers never observe a
/// half-applied toggle.
pub trait PreferenceStore: Send + Sync {
    fn transact(&self, apply: &mut dyn FnMut(&mut PreferenceMap)) -> Result<(), StoreError>;

    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut out = None;
        self.transact(&mut |map: &mut PreferenceMap| out = map.get(key).cloned())?;
        Ok(out)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.transact(&mut |map: &mut PreferenceMap| {
            map.insert(key.to_string(), value.to_string());
        })
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.transact(&mut |map: &mut PreferenceMap| {
            map.remove(key);
        })
    }
}

#[derive(Debug, Default)]
pub struct MemoryPreferenceStore {
    map: Mutex<PreferenceMap>,
}

impl MemoryPreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.map.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PreferenceStore for MemoryPreferenceStore {
    fn transact(&self, apply: &mut dyn FnMut(&mut PreferenceMap)) -> Result<(), StoreError> {
        let mut map = self.map.lock().map_err(|_| StoreError::Poisoned)?;
        apply(&mut *map);
        Ok(())
    }
}

/// JSON file backend. Writes go to a temp file in the same directory and are
/// renamed over the target, so a crash never leaves a truncated file.
#[derive(Debug)]
pub struct FilePreferenceStore {
    path: PathBuf,
    map: Mutex<PreferenceMap>,
}

impl FilePreferenceStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let map = match fs::read_to_string(&path) {
            Ok(text) if text.trim().is_empty() => PreferenceMap::new(),
            Ok(text) => serde_json::from_str(&text)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => PreferenceMap::new(),
            Err(err) => return Err(err.into()),
        };
        Ok(Self {
            path,
            map: Mutex::new(map),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, map: &PreferenceMap) -> Result<(), StoreError> {
        let parent = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent)?;

        let temp_path = parent.join(format!(".{}.prefs.tmp", Uuid::new_v4()));
        let bytes = serde_json::to_vec_pretty(map)?;
        let written = fs::File::create(&temp_path).and_then(|mut file| {
            file.write_all(&bytes)?;
            file.sync_all()
        });
        if let Err(err) = written.and_then(|_| fs::rename(&temp_path, &self.path)) {
            let _ = fs::remove_file(&temp_path);
            return Err(err.into());
        }
        Ok(())
    }
}

impl PreferenceStore for FilePreferenceStore {
    fn transact(&self, apply: &mut dyn FnMut(&mut PreferenceMap)) -> Result<(), StoreError> {
        let mut map = self.map.lock().map_err(|_| StoreError::Poisoned)?;
        let mut next = map.clone();
        apply(&mut next);
        if next != *map {
            self.persist(&next)?;
            *map = next;
        }
        Ok(())
    }
}

/// Overlay state for one viewer, read once per listing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PinOverlay {
    pub pinned: HashSet<String>,
    pub interested: HashSet<String>,
    pub snapshots: Vec<PinnedSnapshot>,
}

impl PinOverlay {
    pub fn is_pinned(&self, candidate: &Candidate) -> bool {
        candidate
            .overlay_keys()
            .iter()
            .any(|k| self.pinned.contains(k))
    }

    pub fn is_interested(&self, candidate: &Candidate) -> bool {
        candidate
            .overlay_keys()
            .iter()
            .any(|k| self.interested.contains(k))
    }
}

const PINNED: &str = "pinned";
const INTERESTED: &str = "interested";
const SNAPSHOTS: &str = "pinned_snapshots";

/// Typed view over a [`PreferenceStore`], keyed by `(user_id, candidate_key)`.
#[derive(Clone)]
pub struct PinRepository {
    store: Arc<dyn PreferenceStore>,
}

impl PinRepository {
    pub fn new(store: Arc<dyn PreferenceStore>) -> Self {
        Self { store }
    }

    /// The user id is length-prefixed so ids containing `:` cannot share a
    /// prefix with another user's flags.
    fn flag_prefix(kind: &str, user_id: &str) -> String {
        format!("{kind}:{}:{user_id}:", user_id.len())
    }

    fn flag_key(kind: &str, user_id: &str, key: &str) -> String {
        format!("{}{key}", Self::flag_prefix(kind, user_id))
    }

    fn snapshots_key(user_id: &str) -> String {
        format!("{SNAPSHOTS}:{user_id}")
    }

    fn read_snapshots(map: &PreferenceMap, user_id: &str) -> Result<Vec<PinnedSnapshot>, StoreError> {
        match map.get(&Self::snapshots_key(user_id)) {
            Some(raw) => Ok(serde_json::from_str(raw)?),
            None => Ok(Vec::new()),
        }
    }

    fn write_snapshots(
        map: &mut PreferenceMap,
        user_id: &str,
        snapshots: &[PinnedSnapshot],
    ) -> Result<(), StoreError> {
        let key = Self::snapshots_key(user_id);
        if snapshots.is_empty() {
            map.remove(&key);
        } else {
            map.insert(key, serde_json::to_string(snapshots)?);
        }
        Ok(())
    }

    pub fn overlay(&self, user_id: &str) -> Result<PinOverlay, StoreError> {
        let mut result = Ok(PinOverlay::default());
        self.store.transact(&mut |map: &mut PreferenceMap| {
            let collect = |kind: &str| {
                let prefix = Self::flag_prefix(kind, user_id);
                map.iter()
                    .filter(|(k, v)| k.starts_with(&prefix) && v.as_str() == "true")
                    .map(|(k, _)| k[prefix.len()..].to_string())
                    .collect::<HashSet<_>>()
            };
            result = Self::read_snapshots(map, user_id).map(|snapshots| PinOverlay {
                pinned: collect(PINNED),
                interested: collect(INTERESTED),
                snapshots,
            });
        })?;
        result
    }

    pub fn is_pinned(&self, user_id: &str, keys: &[String]) -> Result<bool, StoreError> {
        let mut pinned = false;
        self.store.transact(&mut |map: &mut PreferenceMap| {
            pinned = keys
                .iter()
                .any(|k| map.get(&Self::flag_key(PINNED, user_id, k)).map(String::as_str) == Some("true"));
        })?;
        Ok(pinned)
    }

    /// Flips the pin state for `keys` in one critical section and returns the
    /// new state. Pinning inserts `snapshot` unless one already matches a key;
    /// unpinning removes the flags and every matching snapshot.
    pub fn toggle(
        &self,
        user_id: &str,
        keys: &[String],
        snapshot: Option<PinnedSnapshot>,
    ) -> Result<bool, StoreError> {
        let mut result = Ok(false);
        self.store.transact(&mut |map: &mut PreferenceMap| {
            result = Self::toggle_in(map, user_id, keys, snapshot.as_ref());
        })?;
        result
    }

    fn toggle_in(
        map: &mut PreferenceMap,
        user_id: &str,
        keys: &[String],
        snapshot: Option<&PinnedSnapshot>,
    ) -> Result<bool, StoreError> {
        let currently = keys
            .iter()
            .any(|k| map.get(&Self::flag_key(PINNED, user_id, k)).map(String::as_str) == Some("true"));
        let mut snapshots = Self::read_snapshots(map, user_id)?;
        if currently {
            for k in keys {
                map.remove(&Self::flag_key(PINNED, user_id, k));
            }
            snapshots.retain(|s| !s.matches_any(keys));
        } else {
            for k in keys {
                map.insert(Self::flag_key(PINNED, user_id, k), "true".to_string());
            }
            if let Some(snapshot) = snapshot {
                if !snapshots.iter().any(|s| s.matches_any(keys)) {
                    snapshots.push(snapshot.clone());
                }
            }
        }
        Self::write_snapshots(map, user_id, &snapshots)?;
        Ok(!currently)
    }

    pub fn set_interested(&self, user_id: &str, keys: &[String], interested: bool) -> Result<(), StoreError> {
        self.store.transact(&mut |map: &mut PreferenceMap| {
            for k in keys {
                let key = Self::flag_key(INTERESTED, user_id, k);
                if interested {
                    map.insert(key, "true".to_string());
                } else {
                    map.remove(&key);
                }
            }
        })
    }
}
