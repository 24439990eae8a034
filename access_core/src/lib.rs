//! Capability-based access control for a local automation API.
//!
//! Two layers:
//!
//! 1. [`AccessProfile`]: one caller's grant. It carries an unguessable
//!    [`AccessKey`] bearer credential, a set of granted [`Permission`]
//!    kinds, a [`TagFilter`] bounding what the caller may search, and a
//!    short-lived cache of the last authorized search result. A caller may
//!    only fetch items it previously discovered through an authorized
//!    search, and that authorization decays after a fixed window.
//!
//! 2. [`AccessRegistry`]: the process-wide collection of profiles, keyed
//!    by access key. It owns persistence dirty-tracking and a periodic
//!    maintenance sweep that expires stale search caches.
//!
//! The registry does not interpret requests. The embedding API layer
//! resolves a presented key with [`AccessRegistry::get`], guards each
//! operation with [`AccessProfile::require_permission`], and brackets
//! search/fetch flows with [`AccessProfile::record_search_result`] and
//! [`AccessProfile::authorize_item_access`].

pub mod error;
pub mod filter;
pub mod key;
pub mod permission;
pub mod profile;
pub mod registry;

pub use error::{AccessError, Result};
pub use filter::TagFilter;
pub use key::AccessKey;
pub use permission::Permission;
pub use profile::{AccessProfile, SEARCH_RESULT_TTL_SECS};
pub use registry::AccessRegistry;
