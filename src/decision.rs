//! The checkid decision table.
//!
//! Every browser-mode request is decided from scratch from three facts: the
//! request mode, whether the browser session is authenticated as exactly the
//! requested identity, and whether that identity has approved the relying
//! site's trust root. [`decide`] is the table itself; [`IdentityRequestDecider`]
//! gathers the facts from a session and the consent store.

use crate::identity::{ConsumerAuthStore, IdentityUrls, Session};
use crate::protocol::{AssertionRequest, Mode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Answer with a positive assertion.
    Positive,
    /// Answer negatively, pointing the relying site at setup mode.
    NegativeTrySetup,
    /// Ask the user to log in; the request waits in the session.
    LoginRequired,
    /// Ask the user to approve or deny the site; the request waits in the session.
    ConsentPending,
}

impl Decision {
    /// Terminal decisions answer the request; the others park it in the session.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Decision::Positive | Decision::NegativeTrySetup)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestFacts {
    pub mode: Mode,
    pub is_session_identity: bool,
    pub is_authorized: bool,
}

pub fn decide(facts: RequestFacts) -> Decision {
    match (facts.mode, facts.is_session_identity, facts.is_authorized) {
        (Mode::CheckidImmediate, true, true) => Decision::Positive,
        // Immediate mode never prompts
        (Mode::CheckidImmediate, _, _) => Decision::NegativeTrySetup,
        (Mode::CheckidSetup, true, true) => Decision::Positive,
        (Mode::CheckidSetup, true, false) => Decision::ConsentPending,
        (Mode::CheckidSetup, false, _) => Decision::LoginRequired,
    }
}

/// The identity URL a session is authenticated as, if any.
pub fn session_identity(session: Option<&Session>, urls: &IdentityUrls) -> Option<String> {
    session.and_then(|s| s.username.as_deref()).map(|u| urls.identity_url_for(u))
}

pub struct IdentityRequestDecider<'a> {
    consumer_auth: &'a dyn ConsumerAuthStore,
    urls: &'a IdentityUrls,
}

impl<'a> IdentityRequestDecider<'a> {
    pub fn new(consumer_auth: &'a dyn ConsumerAuthStore, urls: &'a IdentityUrls) -> Self {
        Self { consumer_auth, urls }
    }

    pub fn facts(&self, session: Option<&Session>, request: &AssertionRequest) -> RequestFacts {
        let is_session_identity = session_identity(session, self.urls).is_some_and(|id| id == request.identity);
        RequestFacts {
            mode: request.mode,
            is_session_identity,
            is_authorized: self.consumer_auth.is_authorized(&request.identity, &request.trust_root),
        }
    }

    pub fn evaluate(&self, session: Option<&Session>, request: &AssertionRequest) -> Decision {
        decide(self.facts(session, request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{MemoryConsumerAuthStore, PublicIdentity, SessionEvent};

    fn facts(mode: Mode, is_session_identity: bool, is_authorized: bool) -> RequestFacts {
        RequestFacts { mode, is_session_identity, is_authorized }
    }

    #[test]
    fn decision_table() {
        use Decision::*;
        use Mode::*;
        assert_eq!(decide(facts(CheckidImmediate, true, true)), Positive);
        assert_eq!(decide(facts(CheckidImmediate, true, false)), NegativeTrySetup);
        assert_eq!(decide(facts(CheckidImmediate, false, true)), NegativeTrySetup);
        assert_eq!(decide(facts(CheckidImmediate, false, false)), NegativeTrySetup);
        assert_eq!(decide(facts(CheckidSetup, true, true)), Positive);
        assert_eq!(decide(facts(CheckidSetup, true, false)), ConsentPending);
        assert_eq!(decide(facts(CheckidSetup, false, true)), LoginRequired);
        assert_eq!(decide(facts(CheckidSetup, false, false)), LoginRequired);
    }

    #[test]
    fn only_answers_are_terminal() {
        assert!(Decision::Positive.is_terminal());
        assert!(Decision::NegativeTrySetup.is_terminal());
        assert!(!Decision::LoginRequired.is_terminal());
        assert!(!Decision::ConsentPending.is_terminal());
    }

    fn request(mode: Mode, identity: &str) -> AssertionRequest {
        AssertionRequest {
            mode,
            identity: identity.into(),
            trust_root: "http://rp.example/".into(),
            return_to: "http://rp.example/return".into(),
        }
    }

    fn session_as(name: &str) -> Session {
        Session::new().apply(SessionEvent::Authenticated(PublicIdentity { id: 1000, name: name.into(), fullname: String::new() }))
    }

    #[test]
    fn facts_require_exact_identity_match() {
        let urls = IdentityUrls::new("http://localhost:8000/").unwrap();
        let store = MemoryConsumerAuthStore::new();
        let decider = IdentityRequestDecider::new(&store, &urls);
        let alice = session_as("alice");

        let f = decider.facts(Some(&alice), &request(Mode::CheckidSetup, "http://localhost:8000/id/alice"));
        assert!(f.is_session_identity);
        let f = decider.facts(Some(&alice), &request(Mode::CheckidSetup, "http://localhost:8000/id/alice/"));
        assert!(!f.is_session_identity);
        let f = decider.facts(Some(&alice), &request(Mode::CheckidSetup, "http://localhost:8000/id/bob"));
        assert!(!f.is_session_identity);
        let f = decider.facts(None, &request(Mode::CheckidSetup, "http://localhost:8000/id/alice"));
        assert!(!f.is_session_identity);
        let f = decider.facts(Some(&Session::new()), &request(Mode::CheckidSetup, "http://localhost:8000/id/alice"));
        assert!(!f.is_session_identity);
    }

    #[test]
    fn authorization_changes_are_seen_immediately() {
        let urls = IdentityUrls::new("http://localhost:8000/").unwrap();
        let store = MemoryConsumerAuthStore::new();
        let decider = IdentityRequestDecider::new(&store, &urls);
        let alice = session_as("alice");
        let req = request(Mode::CheckidSetup, "http://localhost:8000/id/alice");

        assert_eq!(decider.evaluate(Some(&alice), &req), Decision::ConsentPending);
        store.store(&req.identity, &req.trust_root, true);
        assert_eq!(decider.evaluate(Some(&alice), &req), Decision::Positive);
        store.store(&req.identity, &req.trust_root, false);
        assert_eq!(decider.evaluate(Some(&alice), &req), Decision::ConsentPending);
    }
}
