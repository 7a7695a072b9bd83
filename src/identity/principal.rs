use serde::{Deserialize, Serialize};

/// The public face of a local account: what a session is authenticated as
/// and what the identity page shows. Never carries credentials.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PublicIdentity {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub fullname: String,
}

impl PublicIdentity {
    /// Full name when the account has one, otherwise the login name.
    pub fn display_name(&self) -> &str {
        if self.fullname.trim().is_empty() { &self.name } else { &self.fullname }
    }
}
