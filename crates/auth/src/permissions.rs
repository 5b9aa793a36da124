use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Permission identifier (e.g. "job_post.create").
///
/// The wildcard `"*"` grants everything within the tenant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub const WILDCARD: Permission = Permission::from_static("*");

    pub const READ_JOB_POST: Permission = Permission::from_static("job_post.read");
    pub const CREATE_JOB_POST: Permission = Permission::from_static("job_post.create");
    pub const UPDATE_JOB_POST: Permission = Permission::from_static("job_post.update");
    pub const DELETE_JOB_POST: Permission = Permission::from_static("job_post.delete");
    /// Approve or reject posts waiting in moderation.
    pub const MODERATE_JOB_POST: Permission = Permission::from_static("job_post.moderate");

    pub const SEARCH: Permission = Permission::from_static("search.read");
    /// Write profile rows into the search index.
    pub const UPDATE_SEARCH_INDEX: Permission = Permission::from_static("search.update_index");

    /// Maintain facet values, assets and collections.
    pub const MANAGE_CATALOG: Permission = Permission::from_static("catalog.manage");

    /// Inspect queues and flush job buffers.
    pub const MANAGE_JOB_QUEUES: Permission = Permission::from_static("system.job_queues");

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_wildcard(&self) -> bool {
        self.as_str() == "*"
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
