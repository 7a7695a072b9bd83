use tracing::{info, warn};

use crate::decision::Decision;
use crate::error::{IdentityError, IdentityResult};
use crate::identity::{Credentials, SessionEvent};
use crate::protocol::AssertionRequest;

use super::{Outcome, Provider};

/// What logging in did to the request parked in the session.
enum Resumed {
    Nothing,
    WrongIdentity(AssertionRequest),
    Decided(Decision, AssertionRequest),
}

impl Provider {
    /// Verify credentials, authenticate the session, and resume the pending
    /// identity request if there is one.
    pub fn login_submit(&self, session_id: &str, username: &str, password: &str) -> IdentityResult<Outcome> {
        let credentials = Credentials { username: username.to_string(), password: password.to_string() };
        let entry = match self.auth_service.authenticate(&credentials) {
            Ok(entry) => entry,
            Err(IdentityError::AuthenticationFailed) | Err(IdentityError::NotFound { .. }) => {
                info!(target: "login", "login failed");
                return Ok(Outcome::LoginFailed { username: username.to_string() });
            }
            Err(e) => return Err(e),
        };

        let logged_in_as = self.urls.identity_url_for(&entry.name);
        let decider = self.decider();
        let mut resumed = Resumed::Nothing;
        let updated = self.sessions.update(session_id, &mut |s| {
            *s = s.clone().apply(SessionEvent::Authenticated(entry.clone()));
            resumed = match s.pending_request.clone() {
                None => Resumed::Nothing,
                // Keep the request parked so the user can log in again as the right identity
                Some(request) if request.identity != logged_in_as => Resumed::WrongIdentity(request),
                Some(request) => {
                    let decision = decider.evaluate(Some(&*s), &request);
                    if decision.is_terminal() {
                        *s = s.clone().apply(SessionEvent::RequestAnswered);
                    }
                    Resumed::Decided(decision, request)
                }
            };
        });
        match updated {
            Ok(()) => {}
            Err(IdentityError::SessionNotFound) => {
                warn!(target: "login", "session ended before login completed");
                return Ok(Outcome::Redirect(self.urls.login_url()));
            }
            Err(e) => return Err(e),
        }
        info!(target: "login", user = %entry.name, "session authenticated");

        Ok(match resumed {
            Resumed::Nothing => Outcome::Redirect(self.urls.root_url()),
            Resumed::WrongIdentity(request) => {
                info!(target: "login", user = %entry.name, required = %request.identity, "logged in as the wrong identity");
                Outcome::WrongIdentity {
                    want_username: self.urls.username_from_identity(&request.identity),
                    required_identity: request.identity,
                }
            }
            Resumed::Decided(decision, request) => self.outcome_for(decision, &request),
        })
    }

    /// The user declined to log in: refuse the pending request, if any.
    pub fn login_cancel(&self, session_id: &str) -> IdentityResult<Outcome> {
        let mut pending = None;
        let updated = self.sessions.update(session_id, &mut |s| {
            pending = s.pending_request.clone();
            *s = s.clone().apply(SessionEvent::RequestAnswered);
        });
        match updated {
            Ok(()) | Err(IdentityError::SessionNotFound) => {}
            Err(e) => return Err(e),
        }
        Ok(match pending {
            Some(request) => {
                info!(target: "login", trust_root = %request.trust_root, "login cancelled; refusing pending request");
                Outcome::Protocol(self.negative_answer(&request, false))
            }
            None => Outcome::Redirect(self.urls.root_url()),
        })
    }
}
