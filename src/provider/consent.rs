use tracing::info;

use crate::decision::{session_identity, Decision};
use crate::error::{IdentityError, IdentityResult};
use crate::identity::SessionEvent;
use crate::protocol::AssertionRequest;

use super::{Outcome, Provider};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsentDecision {
    Approve,
    Deny,
}

impl ConsentDecision {
    pub fn approved(self) -> bool { matches!(self, ConsentDecision::Approve) }
}

enum Resolution {
    WrongIdentity,
    /// Stored, but no matching request was waiting.
    Recorded,
    Denied(AssertionRequest),
    Decided(Decision, AssertionRequest),
}

impl Provider {
    /// Record an approve/deny decision for (identity, trust root) and answer
    /// the request that was waiting for it. The submission only counts when
    /// the session is authenticated as exactly `identity`.
    pub fn consent_submit(
        &self,
        session_id: &str,
        identity: &str,
        trust_root: &str,
        decision: ConsentDecision,
    ) -> IdentityResult<Outcome> {
        let decider = self.decider();
        let mut resolution = Resolution::WrongIdentity;
        let updated = self.sessions.update(session_id, &mut |s| {
            if session_identity(Some(&*s), &self.urls).as_deref() != Some(identity) {
                resolution = Resolution::WrongIdentity;
                return;
            }
            self.consumer_auth.store(identity, trust_root, decision.approved());
            let request = match s.pending_request.clone() {
                Some(r) if r.identity == identity && r.trust_root == trust_root => r,
                _ => {
                    resolution = Resolution::Recorded;
                    return;
                }
            };
            resolution = match decision {
                ConsentDecision::Deny => {
                    *s = s.clone().apply(SessionEvent::RequestAnswered);
                    Resolution::Denied(request)
                }
                ConsentDecision::Approve => {
                    let next = decider.evaluate(Some(&*s), &request);
                    if next.is_terminal() {
                        *s = s.clone().apply(SessionEvent::RequestAnswered);
                    }
                    Resolution::Decided(next, request)
                }
            };
        });
        match updated {
            Ok(()) => {}
            // No session authenticates as anybody
            Err(IdentityError::SessionNotFound) => resolution = Resolution::WrongIdentity,
            Err(e) => return Err(e),
        }

        Ok(match resolution {
            Resolution::WrongIdentity => {
                info!(target: "consent", required = %identity, "consent submitted by a session not authenticated as the identity");
                Outcome::WrongIdentity {
                    required_identity: identity.to_string(),
                    want_username: self.urls.username_from_identity(identity),
                }
            }
            Resolution::Recorded => Outcome::Redirect(self.urls.root_url()),
            Resolution::Denied(request) => Outcome::Protocol(self.negative_answer(&request, false)),
            Resolution::Decided(next, request) => self.outcome_for(next, &request),
        })
    }
}
