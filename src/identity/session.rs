use base64::Engine;
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::{IdentityError, IdentityResult};
use crate::protocol::AssertionRequest;
use crate::tprintln;

use super::principal::PublicIdentity;
use super::table::MemoryTable;

pub type SessionToken = String;

/// Per-browser state, keyed by the opaque token carried in the session cookie.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    /// Assigned by the store on creation; empty until then.
    pub session_id: SessionToken,
    pub username: Option<String>,
    /// Populated whenever `username` is.
    pub auth_entry: Option<PublicIdentity>,
    /// The identity request interrupted by a login or consent prompt.
    pub pending_request: Option<AssertionRequest>,
    pub created_at: DateTime<Utc>,
}

/// Things that happen to a session over its life.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Authenticated(PublicIdentity),
    RequestPending(AssertionRequest),
    RequestAnswered,
}

impl Default for Session {
    fn default() -> Self {
        Self { session_id: String::new(), username: None, auth_entry: None, pending_request: None, created_at: Utc::now() }
    }
}

impl Session {
    /// A fresh unauthenticated session.
    pub fn new() -> Self { Self::default() }

    pub fn is_authenticated(&self) -> bool { self.username.is_some() }

    /// Pure transition: the session as it is after `event`.
    pub fn apply(self, event: SessionEvent) -> Session {
        match event {
            SessionEvent::Authenticated(entry) => Session {
                username: Some(entry.name.clone()),
                auth_entry: Some(entry),
                ..self
            },
            SessionEvent::RequestPending(request) => Session { pending_request: Some(request), ..self },
            SessionEvent::RequestAnswered => Session { pending_request: None, ..self },
        }
    }
}

pub trait SessionStore: Send + Sync {
    /// Store `session` under a fresh token and return the token.
    fn create(&self, session: Session) -> IdentityResult<SessionToken>;
    fn get(&self, session_id: &str) -> IdentityResult<Session>;
    /// Run `f` against the stored session as one atomic read-modify-write.
    fn update(&self, session_id: &str, f: &mut dyn FnMut(&mut Session)) -> IdentityResult<()>;
    fn remove(&self, session_id: &str) -> IdentityResult<()>;
}

fn gen_id() -> IdentityResult<SessionToken> {
    // 256-bit random token base64url without padding
    let mut buf = [0u8; 32];
    getrandom::getrandom(&mut buf).map_err(|e| IdentityError::Entropy(e.to_string()))?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(buf))
}

/// Abbreviated token for log lines.
pub fn token_prefix(token: &str) -> &str {
    token.get(..8).unwrap_or(token)
}

#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: MemoryTable<SessionToken, Session>,
}

impl MemorySessionStore {
    pub fn new() -> Self { Self::default() }

    pub fn len(&self) -> usize { self.sessions.len() }

    pub fn is_empty(&self) -> bool { self.sessions.is_empty() }
}

impl SessionStore for MemorySessionStore {
    fn create(&self, mut session: Session) -> IdentityResult<SessionToken> {
        loop {
            let sid = gen_id()?;
            session.session_id = sid.clone();
            if self.sessions.put_if_absent(sid.clone(), session.clone()) {
                tprintln!("session.create sid={}", token_prefix(&sid));
                debug!(target: "session", sid = token_prefix(&sid), "session created");
                return Ok(sid);
            }
            debug!(target: "session", "session token collision; regenerating");
        }
    }

    fn get(&self, session_id: &str) -> IdentityResult<Session> {
        self.sessions.get(session_id).ok_or(IdentityError::SessionNotFound)
    }

    fn update(&self, session_id: &str, f: &mut dyn FnMut(&mut Session)) -> IdentityResult<()> {
        self.sessions.update(session_id, |s| f(s)).ok_or(IdentityError::SessionNotFound)
    }

    fn remove(&self, session_id: &str) -> IdentityResult<()> {
        match self.sessions.delete(session_id) {
            Some(_) => {
                debug!(target: "session", sid = token_prefix(session_id), "session removed");
                Ok(())
            }
            None => Err(IdentityError::SessionNotFound),
        }
    }
}
