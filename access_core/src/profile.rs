//! Per-caller permission profiles.
//!
//! An [`AccessProfile`] is one caller's capability grant: an access key,
//! the set of granted permission kinds, a tag filter restricting what may
//! be searched, and a short-lived cache of the last authorized search
//! result. The cache is the second-order constraint of the whole system:
//! a caller may only fetch items it previously discovered through an
//! authorized search, and that authorization decays after a fixed window.
//!
//! Every operation takes the profile's own lock for its whole duration,
//! so no caller ever observes a half-updated cache pair. Profiles lock
//! independently of each other and of the registry.

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeSet, HashSet};
use tracing::debug;

use crate::error::{AccessError, Result};
use crate::filter::TagFilter;
use crate::key::AccessKey;
use crate::permission::Permission;

/// How long a recorded search result stays valid for item access, in
/// seconds. Successful item-access checks slide the window forward.
pub const SEARCH_RESULT_TTL_SECS: i64 = 4 * 3600;

/// Label given to profiles rebuilt from persisted data; the wire format
/// carries no name, so the administrative layer re-labels after loading.
pub const DEFAULT_PROFILE_NAME: &str = "api permissions";

fn ttl() -> Duration {
    Duration::seconds(SEARCH_RESULT_TTL_SECS)
}

/// One caller's capability grant.
#[derive(Debug)]
pub struct AccessProfile {
    state: Mutex<ProfileState>,
}

#[derive(Debug)]
struct ProfileState {
    name: String,
    key: AccessKey,
    permissions: HashSet<Permission>,
    tag_filter: TagFilter,
    last_search_results: Option<HashSet<u64>>,
    search_results_expiry: DateTime<Utc>,
}

impl ProfileState {
    /// Treat an expired cache as absent, clearing it on the way out.
    fn live_results(&mut self, now: DateTime<Utc>) -> Option<&HashSet<u64>> {
        if self.last_search_results.is_some() && now >= self.search_results_expiry {
            self.last_search_results = None;
        }
        self.last_search_results.as_ref()
    }
}

impl AccessProfile {
    /// Create a grant with a freshly generated access key.
    pub fn new(
        name: impl Into<String>,
        permissions: HashSet<Permission>,
        tag_filter: TagFilter,
    ) -> Self {
        Self::from_parts(name, AccessKey::generate(), permissions, tag_filter)
    }

    /// Create a grant around an existing key, e.g. when rebuilding from
    /// persisted data. The search-result cache starts empty.
    pub fn from_parts(
        name: impl Into<String>,
        key: AccessKey,
        permissions: HashSet<Permission>,
        tag_filter: TagFilter,
    ) -> Self {
        AccessProfile {
            state: Mutex::new(ProfileState {
                name: name.into(),
                key,
                permissions,
                tag_filter,
                last_search_results: None,
                search_results_expiry: DateTime::<Utc>::MIN_UTC,
            }),
        }
    }

    /// The access key currently bound to this grant.
    pub fn key(&self) -> AccessKey {
        self.state.lock().key
    }

    pub fn name(&self) -> String {
        self.state.lock().name.clone()
    }

    pub fn set_name(&self, name: impl Into<String>) {
        self.state.lock().name = name.into();
    }

    pub fn permissions(&self) -> HashSet<Permission> {
        self.state.lock().permissions.clone()
    }

    /// Replace the granted permission set wholesale.
    pub fn set_permissions(&self, permissions: HashSet<Permission>) {
        self.state.lock().permissions = permissions;
    }

    pub fn tag_filter(&self) -> TagFilter {
        self.state.lock().tag_filter.clone()
    }

    /// Replace the tag filter wholesale.
    pub fn set_tag_filter(&self, tag_filter: TagFilter) {
        self.state.lock().tag_filter = tag_filter;
    }

    /// Is the given permission granted? No side effects.
    pub fn has_permission(&self, permission: Permission) -> bool {
        self.state.lock().permissions.contains(&permission)
    }

    /// Precondition guard: fail unless the permission is granted.
    pub fn require_permission(&self, permission: Permission) -> Result<()> {
        if self.has_permission(permission) {
            Ok(())
        } else {
            Err(AccessError::MissingPermission(permission))
        }
    }

    /// May this profile run a search using exactly these tags?
    ///
    /// Conservative by design: the search is rejected the moment the
    /// filter would remove any single requested tag. No partial-match
    /// semantics, no negation, no OR.
    pub fn can_search(&self, tags: &BTreeSet<String>) -> bool {
        let state = self.state.lock();
        state.tag_filter.filter(tags).len() == tags.len()
    }

    /// Record the item ids of an authorized search, starting the
    /// authorization window.
    ///
    /// No-op when the filter allows everything: an unrestricted caller
    /// needs no cached authorization, so the cache stays empty forever.
    pub fn record_search_result(&self, item_ids: HashSet<u64>) {
        self.record_search_result_at(item_ids, Utc::now());
    }

    /// As [`record_search_result`](Self::record_search_result), at an
    /// explicit instant.
    pub fn record_search_result_at(&self, item_ids: HashSet<u64>, now: DateTime<Utc>) {
        let mut state = self.state.lock();

        if state.tag_filter.allows_everything() {
            return;
        }

        state.last_search_results = Some(item_ids);
        state.search_results_expiry = now + ttl();
    }

    /// May this profile access every one of the requested items?
    ///
    /// Unrestricted filters pass unconditionally. Otherwise every id must
    /// be in the last recorded search result; on success the expiry is
    /// extended to a full window from now, so an active caller is never
    /// starved mid-session. Failed checks do not extend the window.
    pub fn authorize_item_access(&self, item_ids: &HashSet<u64>) -> Result<()> {
        self.authorize_item_access_at(item_ids, Utc::now())
    }

    /// As [`authorize_item_access`](Self::authorize_item_access), at an
    /// explicit instant.
    pub fn authorize_item_access_at(
        &self,
        item_ids: &HashSet<u64>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut state = self.state.lock();

        if state.tag_filter.allows_everything() {
            return Ok(());
        }

        let Some(results) = state.live_results(now) else {
            return Err(AccessError::StaleSearchResults);
        };

        let requested = item_ids.len();
        let authorized = item_ids.intersection(results).count();

        if authorized != requested {
            return Err(AccessError::PartialAuthorization {
                requested,
                authorized,
            });
        }

        state.search_results_expiry = now + ttl();

        Ok(())
    }

    /// Clear the search-result cache if its window has lapsed.
    /// Idempotent; does nothing when nothing has expired.
    pub fn sweep_expired_cache(&self, now: DateTime<Utc>) {
        let mut state = self.state.lock();

        if state.last_search_results.is_some() && now >= state.search_results_expiry {
            state.last_search_results = None;
        }
    }

    /// Is a search result currently cached?
    pub fn has_cached_search(&self) -> bool {
        self.state.lock().last_search_results.is_some()
    }

    /// Replace the access key with a freshly generated one, revoking the
    /// old credential without touching the rest of the grant. Returns the
    /// new key so the administrative layer can show it once.
    pub fn regenerate_key(&self) -> AccessKey {
        let mut state = self.state.lock();
        let new_key = AccessKey::generate();

        debug!("regenerating access key {} -> {}", state.key, new_key);

        state.key = new_key;
        new_key
    }

    /// Stable human summary of the grant, for display only.
    ///
    /// Basic permission descriptions sorted lexicographically, plus a
    /// search-scope clause when searching is granted.
    pub fn describe(&self) -> String {
        let state = self.state.lock();

        let mut descriptions: Vec<&str> = state
            .permissions
            .iter()
            .map(|p| p.description())
            .collect();
        descriptions.sort_unstable();

        let mut summary = if descriptions.is_empty() {
            "is not allowed to do anything".to_string()
        } else {
            descriptions.join(", ")
        };

        if state.permissions.contains(&Permission::SearchFiles) {
            summary.push_str("; can search: ");
            summary.push_str(&state.tag_filter.permitted_description());
        }

        summary
    }
}

/// Wire form: `(lowercase hex key, sorted permission codes, tag filter)`.
#[derive(Serialize)]
struct ProfileTupleRef<'a>(String, Vec<u8>, &'a TagFilter);

#[derive(Deserialize)]
struct ProfileTuple(String, Vec<u8>, TagFilter);

impl Serialize for AccessProfile {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let state = self.state.lock();

        let mut codes: Vec<u8> = state.permissions.iter().map(|p| p.code()).collect();
        codes.sort_unstable();

        ProfileTupleRef(state.key.to_hex(), codes, &state.tag_filter).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for AccessProfile {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let ProfileTuple(hex_key, codes, tag_filter) = ProfileTuple::deserialize(deserializer)?;

        let key = AccessKey::from_hex(&hex_key).map_err(serde::de::Error::custom)?;

        let mut permissions = HashSet::with_capacity(codes.len());
        for code in codes {
            permissions.insert(Permission::try_from(code).map_err(serde::de::Error::custom)?);
        }

        Ok(AccessProfile::from_parts(
            DEFAULT_PROFILE_NAME,
            key,
            permissions,
            tag_filter,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn ids(values: &[u64]) -> HashSet<u64> {
        values.iter().copied().collect()
    }

    fn search_profile(filter: TagFilter) -> AccessProfile {
        AccessProfile::new(
            "search bot",
            HashSet::from([Permission::SearchFiles]),
            filter,
        )
    }

    #[test]
    fn test_require_permission() {
        let profile = AccessProfile::new(
            "tagger",
            HashSet::from([Permission::AddTags]),
            TagFilter::All,
        );

        assert!(profile.has_permission(Permission::AddTags));
        assert!(profile.require_permission(Permission::AddTags).is_ok());

        let err = profile
            .require_permission(Permission::AddFiles)
            .unwrap_err();
        assert_eq!(err, AccessError::MissingPermission(Permission::AddFiles));
        assert!(err.to_string().contains("import files"));
    }

    #[test]
    fn test_can_search_rejects_any_filtered_tag() {
        let profile = search_profile(TagFilter::deny_list(["secret"]));

        assert!(!profile.can_search(&tags(&["cat", "secret"])));
        assert!(profile.can_search(&tags(&["cat", "dog"])));
    }

    #[test]
    fn test_record_then_authorize_subset_succeeds() {
        let profile = search_profile(TagFilter::deny_list(["secret"]));

        profile.record_search_result(ids(&[1, 2, 3]));

        assert!(profile.authorize_item_access(&ids(&[1, 2])).is_ok());
        assert!(profile.authorize_item_access(&ids(&[1, 2, 3])).is_ok());
    }

    #[test]
    fn test_authorize_outside_recorded_set_is_partial() {
        let profile = search_profile(TagFilter::deny_list(["secret"]));

        profile.record_search_result(ids(&[1, 2, 3]));

        let err = profile.authorize_item_access(&ids(&[1, 4])).unwrap_err();
        assert_eq!(
            err,
            AccessError::PartialAuthorization {
                requested: 2,
                authorized: 1,
            }
        );
    }

    #[test]
    fn test_never_searched_is_stale() {
        let profile = search_profile(TagFilter::deny_list(["secret"]));

        let err = profile.authorize_item_access(&ids(&[1])).unwrap_err();
        assert_eq!(err, AccessError::StaleSearchResults);
    }

    #[test]
    fn test_allow_all_filter_never_caches() {
        let profile = search_profile(TagFilter::All);

        profile.record_search_result(ids(&[1, 2, 3]));
        assert!(!profile.has_cached_search());

        // Arbitrary ids pass without any recorded search.
        assert!(profile.authorize_item_access(&ids(&[99, 100])).is_ok());
    }

    #[test]
    fn test_expiry_sweep_clears_cache() {
        let profile = search_profile(TagFilter::deny_list(["secret"]));
        let t0 = Utc::now();

        profile.record_search_result_at(ids(&[1, 2, 3]), t0);
        assert!(profile.has_cached_search());

        // Just inside the window: nothing happens.
        profile.sweep_expired_cache(t0 + ttl() - Duration::seconds(1));
        assert!(profile.has_cached_search());

        profile.sweep_expired_cache(t0 + ttl() + Duration::seconds(1));
        assert!(!profile.has_cached_search());

        let err = profile
            .authorize_item_access_at(&ids(&[1]), t0 + ttl() + Duration::seconds(2))
            .unwrap_err();
        assert_eq!(err, AccessError::StaleSearchResults);
    }

    #[test]
    fn test_expired_cache_is_stale_even_without_sweep() {
        let profile = search_profile(TagFilter::deny_list(["secret"]));
        let t0 = Utc::now();

        profile.record_search_result_at(ids(&[1]), t0);

        let err = profile
            .authorize_item_access_at(&ids(&[1]), t0 + ttl() + Duration::seconds(1))
            .unwrap_err();
        assert_eq!(err, AccessError::StaleSearchResults);
    }

    #[test]
    fn test_successful_access_slides_the_window() {
        let profile = search_profile(TagFilter::deny_list(["secret"]));
        let t0 = Utc::now();
        let t1 = t0 + Duration::hours(3);

        profile.record_search_result_at(ids(&[1, 2, 3]), t0);

        // A successful check at t1 extends expiry to t1 + TTL.
        assert!(profile.authorize_item_access_at(&ids(&[1]), t1).is_ok());

        // A sweep past the original window no longer clears the cache.
        profile.sweep_expired_cache(t0 + ttl() + Duration::seconds(1));
        assert!(profile.has_cached_search());
        assert!(profile
            .authorize_item_access_at(&ids(&[2, 3]), t0 + ttl() + Duration::seconds(1))
            .is_ok());
    }

    #[test]
    fn test_failed_access_does_not_slide_the_window() {
        let profile = search_profile(TagFilter::deny_list(["secret"]));
        let t0 = Utc::now();

        profile.record_search_result_at(ids(&[1]), t0);

        // A denied probe just before expiry must not keep the cache alive.
        let probe_time = t0 + ttl() - Duration::seconds(1);
        assert!(profile
            .authorize_item_access_at(&ids(&[42]), probe_time)
            .is_err());

        profile.sweep_expired_cache(t0 + ttl());
        assert!(!profile.has_cached_search());
    }

    #[test]
    fn test_rerecording_restarts_the_window() {
        let profile = search_profile(TagFilter::deny_list(["secret"]));
        let t0 = Utc::now();
        let t1 = t0 + Duration::hours(2);

        profile.record_search_result_at(ids(&[1]), t0);
        profile.record_search_result_at(ids(&[7, 8]), t1);

        profile.sweep_expired_cache(t0 + ttl() + Duration::seconds(1));
        assert!(profile.has_cached_search());

        // The new result set replaced the old one.
        assert!(profile
            .authorize_item_access_at(&ids(&[7]), t1 + Duration::seconds(1))
            .is_ok());
        assert!(profile
            .authorize_item_access_at(&ids(&[1]), t1 + Duration::seconds(1))
            .is_err());
    }

    #[test]
    fn test_regenerate_key_replaces_credential() {
        let profile = search_profile(TagFilter::All);
        let old_key = profile.key();

        let new_key = profile.regenerate_key();

        assert_ne!(old_key, new_key);
        assert_eq!(profile.key(), new_key);
        // Rest of the grant is untouched.
        assert!(profile.has_permission(Permission::SearchFiles));
    }

    #[test]
    fn test_describe() {
        let profile = AccessProfile::new(
            "bot",
            HashSet::from([Permission::SearchFiles, Permission::AddTags]),
            TagFilter::deny_list(["secret"]),
        );
        assert_eq!(
            profile.describe(),
            "add tags to files, search for files; can search: anything except: secret"
        );

        let nothing = AccessProfile::new("idle", HashSet::new(), TagFilter::All);
        assert_eq!(nothing.describe(), "is not allowed to do anything");

        let no_search = AccessProfile::new(
            "importer",
            HashSet::from([Permission::AddFiles]),
            TagFilter::All,
        );
        assert_eq!(no_search.describe(), "import files");
    }

    #[test]
    fn test_serialized_shape_is_the_wire_tuple() {
        let profile = AccessProfile::from_parts(
            "bot",
            AccessKey::from_bytes([1u8; 32]),
            HashSet::from([Permission::SearchFiles, Permission::AddUrls]),
            TagFilter::All,
        );

        let value = serde_json::to_value(&profile).unwrap();
        let tuple = value.as_array().unwrap();

        assert_eq!(tuple.len(), 3);
        assert_eq!(tuple[0], serde_json::json!("01".repeat(32)));
        // Codes are sorted numerically.
        assert_eq!(tuple[1], serde_json::json!([0, 3]));
    }

    #[test]
    fn test_serde_round_trip() {
        let profile = AccessProfile::new(
            "bot",
            HashSet::from([Permission::SearchFiles, Permission::AddTags]),
            TagFilter::deny_list(["secret"]),
        );
        profile.record_search_result(ids(&[1, 2]));

        let json = serde_json::to_string(&profile).unwrap();
        let rebuilt: AccessProfile = serde_json::from_str(&json).unwrap();

        assert_eq!(rebuilt.key(), profile.key());
        assert_eq!(rebuilt.permissions(), profile.permissions());
        assert_eq!(rebuilt.tag_filter(), profile.tag_filter());
        // The cache is never persisted; a restart starts empty.
        assert!(!rebuilt.has_cached_search());
    }

    #[test]
    fn test_deserialize_rejects_unknown_code() {
        let json = format!("[\"{}\", [0, 9], \"All\"]", "01".repeat(32));
        assert!(serde_json::from_str::<AccessProfile>(&json).is_err());
    }

    #[test]
    fn test_concurrent_record_and_authorize_on_one_profile() {
        use std::sync::Arc;
        use std::thread;

        let profile = Arc::new(search_profile(TagFilter::deny_list(["secret"])));
        profile.record_search_result(ids(&[0, 1, 2, 3, 4, 5, 6, 7, 8, 9]));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let p = Arc::clone(&profile);
                thread::spawn(move || {
                    for _ in 0..100 {
                        if i % 2 == 0 {
                            p.record_search_result(ids(&[0, 1, 2, 3, 4, 5, 6, 7, 8, 9]));
                        } else {
                            // Either outcome is fine; the check must never
                            // see a torn cache pair or panic.
                            let _ = p.authorize_item_access(&ids(&[1, 2]));
                        }
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert!(profile.authorize_item_access(&ids(&[3, 4])).is_ok());
    }
}
