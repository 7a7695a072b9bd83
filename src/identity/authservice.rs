use std::fmt;
use std::path::PathBuf;

use tracing::info;

use crate::error::{IdentityError, IdentityResult};
use crate::security;

use super::principal::PublicIdentity;

#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

// Keep the password out of logs and panic messages
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials").field("username", &self.username).field("password", &"<redacted>").finish()
    }
}

/// Account lookup and credential verification.
pub trait AuthService: Send + Sync {
    /// Fails with `AuthenticationFailed` for an unknown account and for a bad
    /// password alike.
    fn authenticate(&self, credentials: &Credentials) -> IdentityResult<PublicIdentity>;
    /// Fails with `NotFound` for an unknown account.
    fn lookup(&self, username: &str) -> IdentityResult<PublicIdentity>;
}

/// Accounts from a JSON user directory with argon2 password hashes.
pub struct LocalAuthService {
    pub users_file: PathBuf,
}

impl LocalAuthService {
    pub fn new(users_file: impl Into<PathBuf>) -> Self { Self { users_file: users_file.into() } }
}

impl AuthService for LocalAuthService {
    fn authenticate(&self, credentials: &Credentials) -> IdentityResult<PublicIdentity> {
        let dir = security::read_users(&self.users_file)?;
        let Some(record) = dir.find(&credentials.username) else {
            info!(target: "login", "authentication failed");
            return Err(IdentityError::AuthenticationFailed);
        };
        if !security::verify_password(&record.password_hash, &credentials.password) {
            info!(target: "login", "authentication failed");
            return Err(IdentityError::AuthenticationFailed);
        }
        info!(target: "login", user = %record.name, "authenticated");
        Ok(record.public())
    }

    fn lookup(&self, username: &str) -> IdentityResult<PublicIdentity> {
        let dir = security::read_users(&self.users_file)?;
        dir.find(username).map(|r| r.public()).ok_or_else(|| IdentityError::NotFound { name: username.to_string() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn creds(u: &str, p: &str) -> Credentials {
        Credentials { username: u.into(), password: p.into() }
    }

    #[test]
    fn authenticate_good_and_bad_credentials() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("users.json");
        security::add_user(&path, "alice", "wonderland", Some("Alice Example"), Some(1001)).unwrap();
        let svc = LocalAuthService::new(&path);

        let who = svc.authenticate(&creds("alice", "wonderland")).unwrap();
        assert_eq!(who, PublicIdentity { id: 1001, name: "alice".into(), fullname: "Alice Example".into() });

        assert!(matches!(svc.authenticate(&creds("alice", "nope")), Err(IdentityError::AuthenticationFailed)));
        assert!(matches!(svc.authenticate(&creds("nobody", "wonderland")), Err(IdentityError::AuthenticationFailed)));
    }

    #[test]
    fn lookup_known_and_unknown() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("users.json");
        security::add_user(&path, "bob", "pw", None, None).unwrap();
        let svc = LocalAuthService::new(&path);
        assert_eq!(svc.lookup("bob").unwrap().name, "bob");
        assert!(matches!(svc.lookup("carol"), Err(IdentityError::NotFound { .. })));
    }

    #[test]
    fn missing_directory_authenticates_nobody() {
        let tmp = tempdir().unwrap();
        let svc = LocalAuthService::new(tmp.path().join("absent.json"));
        assert!(matches!(svc.authenticate(&creds("root", "")), Err(IdentityError::AuthenticationFailed)));
    }

    #[test]
    fn credentials_debug_hides_password() {
        let s = format!("{:?}", creds("alice", "hunter2"));
        assert!(s.contains("alice"));
        assert!(!s.contains("hunter2"));
    }
}
