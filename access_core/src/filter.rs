//! Tag filters bounding what a caller may search.
//!
//! A filter classifies every tag as allowed or denied. "Allow everything"
//! is a distinguished case: a profile with an unrestricted filter never
//! needs to cache search results, because every item is already visible
//! to it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A rule value classifying tags as allowed or denied.
///
/// This is a closed enum decoded by explicit matches; there is no
/// general boolean policy language here. A caller wanting OR-composition
/// or negation must decompose into multiple single-tag checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TagFilter {
    /// Every tag passes.
    All,
    /// Only the listed tags pass.
    AllowList(BTreeSet<String>),
    /// Every tag passes except the listed ones.
    DenyList(BTreeSet<String>),
    /// Only listed tags pass, minus listed exceptions.
    Combined {
        allow: BTreeSet<String>,
        deny: BTreeSet<String>,
    },
}

impl TagFilter {
    /// Build an allow-list filter from anything iterable.
    pub fn allow_list<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        TagFilter::AllowList(tags.into_iter().map(Into::into).collect())
    }

    /// Build a deny-list filter from anything iterable.
    pub fn deny_list<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        TagFilter::DenyList(tags.into_iter().map(Into::into).collect())
    }

    /// Does this filter pass the given tag?
    pub fn allows(&self, tag: &str) -> bool {
        match self {
            TagFilter::All => true,
            TagFilter::AllowList(allow) => allow.contains(tag),
            TagFilter::DenyList(deny) => !deny.contains(tag),
            TagFilter::Combined { allow, deny } => allow.contains(tag) && !deny.contains(tag),
        }
    }

    /// The subset of `tags` this filter passes.
    pub fn filter(&self, tags: &BTreeSet<String>) -> BTreeSet<String> {
        tags.iter()
            .filter(|tag| self.allows(tag))
            .cloned()
            .collect()
    }

    /// True when no tag can ever be filtered out.
    pub fn allows_everything(&self) -> bool {
        match self {
            TagFilter::All => true,
            TagFilter::AllowList(_) => false,
            TagFilter::DenyList(deny) => deny.is_empty(),
            TagFilter::Combined { .. } => false,
        }
    }

    /// Human description of the permitted search scope, for display only.
    pub fn permitted_description(&self) -> String {
        fn joined(tags: &BTreeSet<String>) -> String {
            tags.iter().cloned().collect::<Vec<_>>().join(", ")
        }

        match self {
            TagFilter::All => "anything".to_string(),
            TagFilter::AllowList(allow) => format!("only: {}", joined(allow)),
            TagFilter::DenyList(deny) => {
                if deny.is_empty() {
                    "anything".to_string()
                } else {
                    format!("anything except: {}", joined(deny))
                }
            }
            TagFilter::Combined { allow, deny } => {
                format!("only: {}, except: {}", joined(allow), joined(deny))
            }
        }
    }
}

impl Default for TagFilter {
    fn default() -> Self {
        TagFilter::All
    }
}
