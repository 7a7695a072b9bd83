use url::Url;

use crate::error::{IdentityError, IdentityResult};

/// Maps local usernames to identity URLs served by this provider, and back.
#[derive(Debug, Clone)]
pub struct IdentityUrls {
    root: Url,
}

impl IdentityUrls {
    pub fn new(root_url: &str) -> IdentityResult<Self> {
        let mut root = Url::parse(root_url)
            .map_err(|e| IdentityError::Config(format!("invalid root URL {:?}: {}", root_url, e)))?;
        if !root.path().ends_with('/') {
            let path = format!("{}/", root.path());
            root.set_path(&path);
        }
        root.set_query(None);
        root.set_fragment(None);
        Ok(Self { root })
    }

    pub fn root_url(&self) -> String { self.root.to_string() }

    /// URL of a path on this server, relative to the root URL.
    pub fn server_url(&self, path: &str) -> String {
        match self.root.join(path) {
            Ok(u) => u.to_string(),
            Err(_) => format!("{}{}", self.root, path),
        }
    }

    pub fn openid_endpoint(&self) -> String { self.server_url("openidserver") }
    pub fn login_url(&self) -> String { self.server_url("login") }
    pub fn logout_url(&self) -> String { self.server_url("logout") }
    pub fn consent_url(&self) -> String { self.server_url("consent") }

    pub fn identity_url_for(&self, username: &str) -> String {
        self.server_url(&format!("id/{}", urlencoding::encode(username)))
    }

    /// The local username an identity URL names, if it is one of ours.
    pub fn username_from_identity(&self, identity: &str) -> Option<String> {
        let url = Url::parse(identity).ok()?;
        if url.origin() != self.root.origin() {
            return None;
        }
        let rest = url.path().strip_prefix(self.root.path())?;
        let name = rest.strip_prefix("id/")?;
        if name.is_empty() || name.contains('/') {
            return None;
        }
        urlencoding::decode(name).ok().map(|n| n.into_owned())
    }
}
