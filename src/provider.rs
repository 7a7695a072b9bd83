//!
//! OpenID provider context
//! -----------------------
//! `Provider` owns the injected collaborators (session store, consent store,
//! authentication service, protocol library) and turns each browser round
//! trip into an [`Outcome`] for the HTTP layer to render.
//!
//! Responsibilities:
//! - Resolving the session cookie to a live session (fresh one when absent or stale).
//! - The protocol endpoint: decode, route browser modes through the decision table,
//!   hand every other mode to the protocol library unchanged.
//! - LoginFlow (`login.rs`) and ConsentFlow (`consent.rs`), which resume the
//!   request parked in the session.
//!
//! All read-modify-write sequences on a session run inside
//! [`SessionStore::update`], so two requests carrying the same cookie never
//! interleave between "look at the pending request" and "clear it".

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::decision::{Decision, IdentityRequestDecider};
use crate::error::{IdentityError, IdentityResult};
use crate::identity::{
    token_prefix, AuthService, ConsumerAuthStore, IdentityUrls, MemoryConsumerAuthStore, MemorySessionStore, Session,
    SessionEvent, SessionStore,
};
use crate::protocol::{AssertionRequest, ProtocolRequest, ProtocolServer, Query, WebResponse};

mod consent;
mod login;

pub use consent::ConsentDecision;

/// What a request resolved to, before rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// An encoded protocol answer, sent verbatim.
    Protocol(WebResponse),
    Redirect(String),
    /// No protocol request in the query: the generic informational page.
    About,
    ProtocolError(String),
    LoginPrompt { required_identity: String, want_username: Option<String> },
    ConsentPrompt { identity: String, trust_root: String },
    /// Keeps the submitted username (never the password) for correction.
    LoginFailed { username: String },
    WrongIdentity { required_identity: String, want_username: Option<String> },
}

pub struct Provider {
    sessions: Arc<dyn SessionStore>,
    consumer_auth: Arc<dyn ConsumerAuthStore>,
    auth_service: Arc<dyn AuthService>,
    protocol: Arc<dyn ProtocolServer>,
    urls: IdentityUrls,
}

impl Provider {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        consumer_auth: Arc<dyn ConsumerAuthStore>,
        auth_service: Arc<dyn AuthService>,
        protocol: Arc<dyn ProtocolServer>,
        urls: IdentityUrls,
    ) -> Self {
        Self { sessions, consumer_auth, auth_service, protocol, urls }
    }

    /// A provider whose sessions and consent decisions live for the life of the process.
    pub fn in_memory(auth_service: Arc<dyn AuthService>, protocol: Arc<dyn ProtocolServer>, urls: IdentityUrls) -> Self {
        Self::new(
            Arc::new(MemorySessionStore::new()),
            Arc::new(MemoryConsumerAuthStore::new()),
            auth_service,
            protocol,
            urls,
        )
    }

    pub fn urls(&self) -> &IdentityUrls { &self.urls }
    pub fn sessions(&self) -> &dyn SessionStore { self.sessions.as_ref() }
    pub fn consumer_auth(&self) -> &dyn ConsumerAuthStore { self.consumer_auth.as_ref() }
    pub fn auth_service(&self) -> &dyn AuthService { self.auth_service.as_ref() }

    fn decider(&self) -> IdentityRequestDecider<'_> {
        IdentityRequestDecider::new(self.consumer_auth.as_ref(), &self.urls)
    }

    pub fn begin_session(&self) -> IdentityResult<Session> {
        let sid = self.sessions.create(Session::new())?;
        self.sessions.get(&sid)
    }

    /// The session named by the cookie token, or a fresh unauthenticated one
    /// when the token is absent or unknown.
    pub fn resume_session(&self, token: Option<&str>) -> IdentityResult<Session> {
        if let Some(token) = token {
            match self.sessions.get(token) {
                Ok(session) => return Ok(session),
                Err(IdentityError::SessionNotFound) => {
                    debug!(target: "session", sid = token_prefix(token), "unknown session cookie; starting a new session");
                }
                Err(e) => return Err(e),
            }
        }
        self.begin_session()
    }

    /// Drop the session (stale tokens included) and start a new empty one.
    pub fn logout(&self, session_id: &str) -> IdentityResult<Session> {
        match self.sessions.remove(session_id) {
            Ok(()) => info!(target: "session", sid = token_prefix(session_id), "removed authentication session"),
            Err(IdentityError::SessionNotFound) => {}
            Err(e) => return Err(e),
        }
        self.begin_session()
    }

    pub fn handle_protocol_request(&self, session_id: &str, query: &Query) -> IdentityResult<Outcome> {
        let request = match self.protocol.decode(query) {
            Ok(Some(request)) => request,
            Ok(None) => return Ok(Outcome::About),
            Err(IdentityError::Protocol(message)) => {
                warn!(target: "openid", %message, "undecodable protocol request");
                return Ok(Outcome::ProtocolError(message));
            }
            Err(e) => return Err(e),
        };
        match request {
            ProtocolRequest::Direct(direct) => {
                info!(target: "openid", mode = %direct.mode, "delegating direct request to protocol library");
                Ok(Outcome::Protocol(self.protocol.handle_direct(&direct)))
            }
            ProtocolRequest::Browser(request) => self.handle_browser_request(session_id, request),
        }
    }

    fn handle_browser_request(&self, session_id: &str, request: AssertionRequest) -> IdentityResult<Outcome> {
        info!(
            target: "openid",
            mode = request.mode.as_str(),
            identity = %request.identity,
            trust_root = %request.trust_root,
            "received browser request"
        );
        let decider = self.decider();
        let mut decision = Decision::LoginRequired;
        let updated = self.sessions.update(session_id, &mut |s| {
            decision = decider.evaluate(Some(&*s), &request);
            let event = if decision.is_terminal() {
                SessionEvent::RequestAnswered
            } else {
                SessionEvent::RequestPending(request.clone())
            };
            *s = s.clone().apply(event);
        });
        match updated {
            Ok(()) => {}
            // Logged out by a concurrent request: decide as an anonymous browser
            Err(IdentityError::SessionNotFound) => decision = decider.evaluate(None, &request),
            Err(e) => return Err(e),
        }
        info!(target: "openid", ?decision, "decided browser request");
        Ok(self.outcome_for(decision, &request))
    }

    pub(crate) fn outcome_for(&self, decision: Decision, request: &AssertionRequest) -> Outcome {
        match decision {
            Decision::Positive => Outcome::Protocol(self.positive_answer(request)),
            Decision::NegativeTrySetup => Outcome::Protocol(self.negative_answer(request, true)),
            Decision::LoginRequired => Outcome::LoginPrompt {
                required_identity: request.identity.clone(),
                want_username: self.urls.username_from_identity(&request.identity),
            },
            Decision::ConsentPending => Outcome::ConsentPrompt {
                identity: request.identity.clone(),
                trust_root: request.trust_root.clone(),
            },
        }
    }

    fn positive_answer(&self, request: &AssertionRequest) -> WebResponse {
        let response = self.protocol.sign(self.protocol.answer(request, true, None));
        self.protocol.encode(&response)
    }

    fn negative_answer(&self, request: &AssertionRequest, offer_setup: bool) -> WebResponse {
        let endpoint = self.urls.openid_endpoint();
        let server_url = if offer_setup { Some(endpoint.as_str()) } else { None };
        self.protocol.encode(&self.protocol.answer(request, false, server_url))
    }
}
