//! Boundary to the identity protocol library.
//!
//! The decision engine only ever sees the facts of a request (mode, identity,
//! trust root, return URL) and asks the library to answer, sign and encode.
//! `OpenIdServer` is the bundled implementation of [`ProtocolServer`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::IdentityResult;

pub mod openid;

pub use openid::OpenIdServer;

/// Query parameters exactly as received on the protocol endpoint.
pub type Query = BTreeMap<String, String>;

/// Browser modes: the only modes the decision engine takes part in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mode {
    CheckidImmediate,
    CheckidSetup,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::CheckidImmediate => "checkid_immediate",
            Mode::CheckidSetup => "checkid_setup",
        }
    }

    pub fn parse(s: &str) -> Option<Mode> {
        match s {
            "checkid_immediate" => Some(Mode::CheckidImmediate),
            "checkid_setup" => Some(Mode::CheckidSetup),
            _ => None,
        }
    }
}

/// A decoded identity assertion request. Read-only input to the core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssertionRequest {
    pub mode: Mode,
    pub identity: String,
    pub trust_root: String,
    pub return_to: String,
}

/// Any mode other than the browser modes; handled by the library alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectRequest {
    pub mode: String,
    pub fields: Query,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolRequest {
    Browser(AssertionRequest),
    Direct(DirectRequest),
}

/// An answer to an [`AssertionRequest`], not yet encoded for the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssertionResponse {
    pub request: AssertionRequest,
    pub allow: bool,
    /// Protocol fields without the `openid.` prefix, in wire order.
    pub fields: BTreeMap<String, String>,
}

impl AssertionResponse {
    pub fn is_signed(&self) -> bool { self.fields.contains_key("sig") }
}

/// Transport-neutral encoded response: what the HTTP layer sends verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl WebResponse {
    pub fn redirect(location: String) -> Self {
        Self { status: 302, headers: vec![("Location".into(), location)], body: String::new() }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter().find(|(k, _)| k.eq_ignore_ascii_case(name)).map(|(_, v)| v.as_str())
    }
}

pub trait ProtocolServer: Send + Sync {
    /// `Ok(None)` when the query carries no protocol request at all.
    fn decode(&self, query: &Query) -> IdentityResult<Option<ProtocolRequest>>;

    /// Build an answer. `server_url` is this provider's protocol endpoint; a
    /// negative immediate answer uses it to tell the relying site where to
    /// retry in setup mode.
    fn answer(&self, request: &AssertionRequest, allow: bool, server_url: Option<&str>) -> AssertionResponse;

    fn sign(&self, response: AssertionResponse) -> AssertionResponse;

    fn encode(&self, response: &AssertionResponse) -> WebResponse;

    /// Answer a non-browser mode (association, signature checks, ...).
    fn handle_direct(&self, request: &DirectRequest) -> WebResponse;
}
