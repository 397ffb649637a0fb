//! Key sets and the reloadable key store.
//!
//! A [`KeySet`] is an immutable snapshot. [`KeyStore`] publishes snapshots
//! through an [`ArcSwap`], so verification always runs against one
//! consistent set while rotation swaps in a new one.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use tracing::{debug, info};

use super::key::VerificationKey;
use crate::error::KeyError;

/// Immutable mapping from key id to verification key.
#[derive(Debug, Default)]
pub struct KeySet {
    keys: HashMap<String, Arc<VerificationKey>>,
    generation: u64,
}

impl KeySet {
    /// Builds a key set from keys.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::DuplicateKid`] if two keys share an id.
    pub fn new(keys: impl IntoIterator<Item = VerificationKey>) -> Result<Self, KeyError> {
        let mut map = HashMap::new();
        for key in keys {
            let kid = key.kid().to_string();
            if map.insert(kid.clone(), Arc::new(key)).is_some() {
                return Err(KeyError::DuplicateKid(kid));
            }
        }
        Ok(Self {
            keys: map,
            generation: 0,
        })
    }

    /// Creates an empty key set.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Looks up a key by id.
    #[must_use]
    pub fn get(&self, kid: &str) -> Option<&Arc<VerificationKey>> {
        self.keys.get(kid)
    }

    /// Number of keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Returns `true` if no keys are loaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Generation this set was published under. Zero until published.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Key ids, sorted.
    #[must_use]
    pub fn kids(&self) -> Vec<&str> {
        let mut kids: Vec<&str> = self.keys.keys().map(String::as_str).collect();
        kids.sort_unstable();
        kids
    }
}

/// Reloadable handle to the live key set.
///
/// Every write publishes a new [`KeySet`] with the next generation number.
#[derive(Debug)]
pub struct KeyStore {
    current: ArcSwap<KeySet>,
}

impl Default for KeyStore {
    fn default() -> Self {
        Self::new(KeySet::empty())
    }
}

impl KeyStore {
    /// Creates a store publishing `initial` as generation 1.
    #[must_use]
    pub fn new(initial: KeySet) -> Self {
        let initial = KeySet {
            generation: 1,
            ..initial
        };
        Self {
            current: ArcSwap::from_pointee(initial),
        }
    }

    /// Current snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Arc<KeySet> {
        self.current.load_full()
    }

    /// Generation of the current snapshot.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.current.load().generation
    }

    /// Returns `true` if at least one key is loaded.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        !self.current.load().is_empty()
    }

    /// Replaces the whole key set. Returns the new generation.
    pub fn replace(&self, keys: KeySet) -> u64 {
        let keys = Arc::new(keys);
        let previous = self.current.rcu(|current| {
            Arc::new(KeySet {
                keys: keys.keys.clone(),
                generation: current.generation + 1,
            })
        });
        let generation = previous.generation + 1;
        info!(generation, keys = keys.len(), "Key set replaced");
        generation
    }

    /// Adds a key, replacing any key with the same id. Returns the new generation.
    pub fn add_key(&self, key: VerificationKey) -> u64 {
        let key = Arc::new(key);
        let kid = key.kid().to_string();
        let previous = self.current.rcu(|current| {
            let mut keys = current.keys.clone();
            keys.insert(kid.clone(), Arc::clone(&key));
            Arc::new(KeySet {
                keys,
                generation: current.generation + 1,
            })
        });
        let generation = previous.generation + 1;
        info!(kid = %kid, generation, "Key added");
        generation
    }

    /// Retires a key. Returns the new generation, or `None` if the key was
    /// not present and nothing changed.
    pub fn retire(&self, kid: &str) -> Option<u64> {
        let mut removed = false;
        let previous = self.current.rcu(|current| {
            let mut keys = current.keys.clone();
            removed = keys.remove(kid).is_some();
            if !removed {
                return Arc::clone(current);
            }
            Arc::new(KeySet {
                keys,
                generation: current.generation + 1,
            })
        });
        if !removed {
            debug!(kid = %kid, "Retire requested for unknown key");
            return None;
        }
        let generation = previous.generation + 1;
        info!(kid = %kid, generation, "Key retired");
        Some(generation)
    }
}
