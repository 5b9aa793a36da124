use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::Permission;

/// Role identifier used for RBAC.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(Cow<'static, str>);

impl Role {
    pub const CUSTOMER: Role = Role(Cow::Borrowed("customer"));
    pub const ADMINISTRATOR: Role = Role(Cow::Borrowed("administrator"));

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_administrator(&self) -> bool {
        self == &Role::ADMINISTRATOR
    }

    /// Static role→permission policy.
    ///
    /// Unknown roles grant nothing.
    pub fn permissions(&self) -> Vec<Permission> {
        match self.as_str() {
            "administrator" => vec![Permission::WILDCARD],
            "customer" => vec![
                Permission::READ_JOB_POST,
                Permission::CREATE_JOB_POST,
                Permission::UPDATE_JOB_POST,
                Permission::DELETE_JOB_POST,
                Permission::SEARCH,
            ],
            _ => Vec::new(),
        }
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
