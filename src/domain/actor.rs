use serde::{Deserialize, Serialize};
use std::fmt;

pub const SYSTEM_ACTOR: &str = "system";

/// Who performed an action. Passed explicitly into every event-producing call.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Actor(String);

impl Actor {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn system() -> Self {
        Self(SYSTEM_ACTOR.to_string())
    }

    /// Authenticated principal, or the system actor when there is none
    pub fn from_principal(principal: Option<&str>) -> Self {
        match principal.map(str::trim) {
            Some(name) if !name.is_empty() => Self::new(name),
            _ => Self::system(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
