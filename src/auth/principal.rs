//! Authenticated identity.

use serde::{Deserialize, Serialize};

/// Identity resolved from a verified bearer token.
///
/// Lives in request extensions for the duration of one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    #[serde(alias = "_id")]
    pub id: String,
    pub email: String,
    #[serde(alias = "username")]
    pub handle: String,
    #[serde(default = "active_by_default")]
    pub is_active: bool,
}

fn active_by_default() -> bool {
    true
}

/// Result of optional authentication: `None` for anonymous callers.
#[derive(Debug, Clone, Default)]
pub struct MaybePrincipal(pub Option<Principal>);

impl MaybePrincipal {
    pub fn principal(&self) -> Option<&Principal> {
        self.0.as_ref()
    }
}
