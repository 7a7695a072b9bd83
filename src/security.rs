//! Local account directory: a JSON file of users with argon2 password hashes.
//! `LocalAuthService` reads it on every call; `gracie_passwd` maintains it.

use std::path::Path;

use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use password_hash::{PasswordHash, SaltString};
use serde::{Deserialize, Serialize};

use crate::error::{IdentityError, IdentityResult};
use crate::identity::PublicIdentity;

/// First id handed out when the directory is empty.
pub const FIRST_USER_ID: u32 = 1000;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserRecord {
    pub name: String,
    pub id: u32,
    #[serde(default)]
    pub fullname: String,
    pub password_hash: String,
}

impl UserRecord {
    pub fn public(&self) -> PublicIdentity {
        PublicIdentity { id: self.id, name: self.name.clone(), fullname: self.fullname.clone() }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserDirectory {
    #[serde(default)]
    pub users: Vec<UserRecord>,
}

impl UserDirectory {
    pub fn find(&self, name: &str) -> Option<&UserRecord> {
        self.users.iter().find(|u| u.name == name)
    }

    fn next_id(&self) -> u32 {
        self.users.iter().map(|u| u.id.saturating_add(1)).max().unwrap_or(FIRST_USER_ID).max(FIRST_USER_ID)
    }
}

pub fn hash_password(password: &str) -> IdentityResult<String> {
    let mut salt_bytes = [0u8; 16];
    getrandom::getrandom(&mut salt_bytes).map_err(|e| IdentityError::Entropy(e.to_string()))?;
    let salt = SaltString::encode_b64(&salt_bytes).map_err(|e| IdentityError::UserDirectory(e.to_string()))?;
    let argon2 = Argon2::default();
    let phc = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| IdentityError::UserDirectory(e.to_string()))?
        .to_string();
    Ok(phc)
}

pub fn verify_password(hash: &str, password: &str) -> bool {
    if let Ok(parsed) = PasswordHash::new(hash) {
        let argon2 = Argon2::default();
        argon2.verify_password(password.as_bytes(), &parsed).is_ok()
    } else { false }
}

/// A missing file is an empty directory.
pub fn read_users(path: &Path) -> IdentityResult<UserDirectory> {
    if !path.exists() { return Ok(UserDirectory::default()); }
    let bytes = std::fs::read(path)?;
    if bytes.iter().all(|b| b.is_ascii_whitespace()) { return Ok(UserDirectory::default()); }
    Ok(serde_json::from_slice(&bytes)?)
}

pub fn write_users(path: &Path, dir: &UserDirectory) -> IdentityResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() { std::fs::create_dir_all(parent)?; }
    }
    let bytes = serde_json::to_vec_pretty(dir)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(tmp, path)?;
    Ok(())
}

/// Add a user, replacing any existing entry of the same name (which keeps its id
/// unless one is given).
pub fn add_user(path: &Path, name: &str, password: &str, fullname: Option<&str>, id: Option<u32>) -> IdentityResult<UserRecord> {
    if name.is_empty() || name.contains('/') || name.chars().any(char::is_whitespace) {
        return Err(IdentityError::UserDirectory(format!("invalid username {:?}", name)));
    }
    let mut dir = read_users(path)?;
    let existing = dir.find(name).cloned();
    dir.users.retain(|u| u.name != name);
    let record = UserRecord {
        name: name.to_string(),
        id: id.or(existing.as_ref().map(|u| u.id)).unwrap_or_else(|| dir.next_id()),
        fullname: fullname
            .map(str::to_string)
            .or(existing.map(|u| u.fullname))
            .unwrap_or_default(),
        password_hash: hash_password(password)?,
    };
    dir.users.push(record.clone());
    write_users(path, &dir)?;
    Ok(record)
}

/// Returns whether a user was removed.
pub fn delete_user(path: &Path, name: &str) -> IdentityResult<bool> {
    let mut dir = read_users(path)?;
    let before = dir.users.len();
    dir.users.retain(|u| u.name != name);
    if dir.users.len() == before { return Ok(false); }
    write_users(path, &dir)?;
    Ok(true)
}
