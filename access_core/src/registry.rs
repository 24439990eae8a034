//! The process-wide registry of access profiles.
//!
//! Purely a keyed store with lifecycle and concurrency guarantees: it
//! resolves presented access keys to profiles, tracks whether anything
//! changed since the last persistence flush, and runs the periodic sweep
//! that expires stale search caches across all profiles.
//!
//! The registry lock guards only the key-to-profile map. Looking a
//! profile up and operating on it are two separate lock acquisitions, so
//! a long sequence of authorizations never stalls an admin adding a new
//! grant. Lock ordering is always registry first, profile second.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::ser::SerializeSeq;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::error::{AccessError, Result};
use crate::key::AccessKey;
use crate::profile::AccessProfile;

/// All permission grants known to the process, keyed by access key.
#[derive(Debug, Default)]
pub struct AccessRegistry {
    state: Mutex<RegistryState>,
}

#[derive(Debug, Default)]
struct RegistryState {
    profiles: HashMap<AccessKey, Arc<AccessProfile>>,
    dirty: bool,
}

impl AccessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the entry for the profile's current key.
    pub fn add(&self, profile: Arc<AccessProfile>) {
        let key = profile.key();
        let mut state = self.state.lock();

        debug!("adding access profile {key}");

        state.profiles.insert(key, profile);
        state.dirty = true;
    }

    /// Delete each matching entry. Missing keys are silently ignored;
    /// the registry is marked dirty only if something was removed.
    pub fn remove<I>(&self, keys: I)
    where
        I: IntoIterator<Item = AccessKey>,
    {
        let mut state = self.state.lock();

        for key in keys {
            if state.profiles.remove(&key).is_some() {
                debug!("removed access profile {key}");
                state.dirty = true;
            }
        }
    }

    /// Resolve a presented access key to its profile.
    ///
    /// This is the canonical first step of every inbound API request; an
    /// unknown key is an ordinary rejected request, not a crash.
    pub fn get(&self, key: &AccessKey) -> Result<Arc<AccessProfile>> {
        let state = self.state.lock();

        state
            .profiles
            .get(key)
            .cloned()
            .ok_or(AccessError::UnknownAccessKey)
    }

    /// Snapshot of every profile, safe to iterate without holding the
    /// registry lock.
    pub fn list(&self) -> Vec<Arc<AccessProfile>> {
        self.state.lock().profiles.values().cloned().collect()
    }

    /// Atomically swap the entire mapping, e.g. when bulk-editing grants
    /// from an administrative UI.
    pub fn replace_all<I>(&self, profiles: I)
    where
        I: IntoIterator<Item = Arc<AccessProfile>>,
    {
        let profiles: HashMap<AccessKey, Arc<AccessProfile>> =
            profiles.into_iter().map(|p| (p.key(), p)).collect();

        let mut state = self.state.lock();

        debug!("replacing all access profiles ({} entries)", profiles.len());

        state.profiles = profiles;
        state.dirty = true;
    }

    /// Has the mapping been mutated since the last flush?
    ///
    /// Best-effort coordination for an external save routine, not a
    /// transaction log: a crash between mutation and flush loses the
    /// unflushed change.
    pub fn is_dirty(&self) -> bool {
        self.state.lock().dirty
    }

    pub fn mark_clean(&self) {
        self.state.lock().dirty = false;
    }

    pub fn len(&self) -> usize {
        self.state.lock().profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Expire stale search caches across all profiles.
    ///
    /// Invoked on a fixed interval by an external timer; access-time
    /// checks also self-heal lazily, this is just the proactive path.
    pub fn run_maintenance_sweep(&self) {
        self.run_maintenance_sweep_at(Utc::now());
    }

    /// As [`run_maintenance_sweep`](Self::run_maintenance_sweep), at an
    /// explicit instant.
    pub fn run_maintenance_sweep_at(&self, now: DateTime<Utc>) {
        // Snapshot under the registry lock, sweep outside it; profile
        // locks are taken one at a time.
        let profiles = self.list();

        debug!("sweeping {} access profiles for expired caches", profiles.len());

        for profile in profiles {
            profile.sweep_expired_cache(now);
        }
    }
}

impl Serialize for AccessRegistry {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let profiles = {
            let state = self.state.lock();
            let mut profiles: Vec<Arc<AccessProfile>> =
                state.profiles.values().cloned().collect();
            // Sorted by key bytes so the output is deterministic.
            profiles.sort_by_key(|p| p.key());
            profiles
        };

        let mut seq = serializer.serialize_seq(Some(profiles.len()))?;
        for profile in &profiles {
            seq.serialize_element(profile.as_ref())?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for AccessRegistry {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let profiles = Vec::<AccessProfile>::deserialize(deserializer)?;

        let profiles: HashMap<AccessKey, Arc<AccessProfile>> = profiles
            .into_iter()
            .map(|p| (p.key(), Arc::new(p)))
            .collect();

        Ok(AccessRegistry {
            state: Mutex::new(RegistryState {
                profiles,
                dirty: false,
            }),
        })
    }
}
