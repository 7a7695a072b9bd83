//! Bundled OpenID endpoint: request decoding, answer construction,
//! stateless HMAC-SHA256 signing and indirect/direct response encoding.
//!
//! Only stateless ("dumb") relying parties are supported: positive
//! assertions are signed with a provider-private secret and relying sites
//! confirm them with a `check_authentication` direct request.

use std::collections::BTreeMap;

use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{IdentityError, IdentityResult};
use crate::identity::MemoryTable;

use super::{AssertionRequest, AssertionResponse, DirectRequest, Mode, ProtocolRequest, ProtocolServer, Query, WebResponse};

type HmacSha256 = Hmac<Sha256>;

const PREFIX: &str = "openid.";
const STATELESS_HANDLE: &str = "gracie.stateless";
const SIGNED_FIELDS: &str = "mode,identity,return_to,response_nonce";
const KV_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

pub struct OpenIdServer {
    secret: Vec<u8>,
    /// Nonces of assertions already confirmed by `check_authentication`.
    spent_nonces: MemoryTable<String, ()>,
}

impl OpenIdServer {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self { secret: secret.into(), spent_nonces: MemoryTable::new() }
    }

    /// A server with a fresh 256-bit signing secret. Assertions signed by a
    /// previous process can no longer be checked after a restart.
    pub fn with_random_secret() -> IdentityResult<Self> {
        let mut secret = [0u8; 32];
        getrandom::getrandom(&mut secret).map_err(|e| IdentityError::Entropy(e.to_string()))?;
        Ok(Self::new(secret.to_vec()))
    }

    fn signature(&self, signed: &str, fields: &BTreeMap<String, String>) -> String {
        let mut mac = match HmacSha256::new_from_slice(&self.secret) {
            Ok(m) => m,
            Err(_) => return String::new(),
        };
        mac.update(key_value_form(signed, fields).as_bytes());
        base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes())
    }

    fn check_authentication(&self, fields: &Query) -> WebResponse {
        let (Some(signed), Some(sig)) = (fields.get("signed"), fields.get("sig")) else {
            return direct_error("check_authentication requires openid.signed and openid.sig");
        };
        // The relying site echoes the assertion with the mode swapped out
        let mut asserted: BTreeMap<String, String> = fields.clone();
        asserted.insert("mode".into(), "id_res".into());
        let expected = self.signature(signed, &asserted);
        let signature_ok = signed == SIGNED_FIELDS
            && !expected.is_empty()
            && constant_time_eq(expected.as_bytes(), sig.as_bytes());
        // Each assertion is confirmed at most once
        let is_valid = signature_ok
            && match fields.get("response_nonce") {
                Some(nonce) => self.spent_nonces.put_if_absent(nonce.clone(), ()),
                None => false,
            };
        if signature_ok && !is_valid {
            warn!(target: "openid", "check_authentication for an assertion already confirmed");
        }
        info!(target: "openid", is_valid, "check_authentication");
        let mut out = BTreeMap::new();
        out.insert("is_valid".to_string(), is_valid.to_string());
        direct_response(200, &out)
    }
}

/// `key:value\n` lines for the listed keys, in the listed order.
fn key_value_form(keys: &str, fields: &BTreeMap<String, String>) -> String {
    let mut out = String::new();
    for k in keys.split(',').map(str::trim).filter(|k| !k.is_empty()) {
        let v = fields.get(k).map(String::as_str).unwrap_or("");
        out.push_str(k);
        out.push(':');
        out.push_str(v);
        out.push('\n');
    }
    out
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    use subtle::ConstantTimeEq;
    a.ct_eq(b).into()
}

fn direct_response(status: u16, fields: &BTreeMap<String, String>) -> WebResponse {
    let mut body = String::new();
    for (k, v) in fields {
        body.push_str(&format!("{}:{}\n", k, v));
    }
    WebResponse { status, headers: vec![("Content-Type".into(), KV_CONTENT_TYPE.into())], body }
}

fn direct_error(message: &str) -> WebResponse {
    let mut out = BTreeMap::new();
    out.insert("error".to_string(), message.to_string());
    direct_response(400, &out)
}

fn form_urlencode<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> String {
    pairs
        .into_iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Where a relying site should send the user to retry an immediate request interactively.
fn setup_url(server_url: &str, request: &AssertionRequest) -> String {
    let query = form_urlencode([
        ("openid.mode", Mode::CheckidSetup.as_str()),
        ("openid.identity", request.identity.as_str()),
        ("openid.trust_root", request.trust_root.as_str()),
        ("openid.return_to", request.return_to.as_str()),
    ]);
    let sep = if server_url.contains('?') { '&' } else { '?' };
    format!("{}{}{}", server_url, sep, query)
}

/// Whether `return_to` lies under `trust_root`: same scheme and port, the
/// same host (or a subdomain, for a `*.` wildcard root), and a path below the
/// root's path.
fn trust_root_covers(trust_root: &str, return_to: &Url) -> bool {
    let (wildcard, root_text) = match trust_root.split_once("://*.") {
        Some((scheme, rest)) => (true, format!("{}://{}", scheme, rest)),
        None => (false, trust_root.to_string()),
    };
    let Ok(root) = Url::parse(&root_text) else { return false; };
    if root.fragment().is_some()
        || root.scheme() != return_to.scheme()
        || root.port_or_known_default() != return_to.port_or_known_default()
    {
        return false;
    }
    let (Some(root_host), Some(host)) = (root.host_str(), return_to.host_str()) else { return false; };
    let host_ok = if wildcard {
        host == root_host || host.ends_with(&format!(".{}", root_host))
    } else {
        host == root_host
    };
    if !host_ok {
        return false;
    }
    let (root_path, path) = (root.path(), return_to.path());
    path == root_path
        || (root_path.ends_with('/') && path.starts_with(root_path))
        || path.starts_with(&format!("{}/", root_path))
}

fn response_nonce() -> String {
    let mut salt = [0u8; 4];
    // The timestamp already makes the nonce unique per second; the salt only separates bursts
    if let Err(e) = getrandom::getrandom(&mut salt) {
        warn!(target: "openid", error = %e, "no entropy for nonce salt; using a zero salt");
    }
    format!("{}{}", chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ"), hex::encode(salt))
}

impl ProtocolServer for OpenIdServer {
    fn decode(&self, query: &Query) -> IdentityResult<Option<ProtocolRequest>> {
        let Some(mode) = query.get("openid.mode") else { return Ok(None); };
        let Some(mode_kind) = Mode::parse(mode) else {
            let fields = query
                .iter()
                .filter_map(|(k, v)| k.strip_prefix(PREFIX).map(|k| (k.to_string(), v.clone())))
                .collect();
            debug!(target: "openid", mode = %mode, "decoded direct request");
            return Ok(Some(ProtocolRequest::Direct(DirectRequest { mode: mode.clone(), fields })));
        };
        let identity = query
            .get("openid.identity")
            .ok_or_else(|| IdentityError::Protocol(format!("{} request without openid.identity", mode)))?;
        let return_to = query
            .get("openid.return_to")
            .ok_or_else(|| IdentityError::Protocol(format!("{} request without openid.return_to", mode)))?;
        let trust_root = query
            .get("openid.trust_root")
            .or_else(|| query.get("openid.realm"))
            .unwrap_or(return_to);
        for (name, value) in [("identity", identity), ("return_to", return_to), ("trust_root", trust_root)] {
            // Signed text is newline-delimited key:value lines
            if value.contains('\n') {
                return Err(IdentityError::Protocol(format!("openid.{} contains a line break", name)));
            }
        }
        let return_url =
            Url::parse(return_to).map_err(|e| IdentityError::Protocol(format!("malformed openid.return_to: {}", e)))?;
        if !trust_root_covers(trust_root, &return_url) {
            warn!(target: "openid", %trust_root, %return_to, "return_to outside trust_root");
            return Err(IdentityError::Protocol(format!(
                "openid.return_to {} is not under trust root {}",
                return_to, trust_root
            )));
        }
        Ok(Some(ProtocolRequest::Browser(AssertionRequest {
            mode: mode_kind,
            identity: identity.clone(),
            trust_root: trust_root.clone(),
            return_to: return_to.clone(),
        })))
    }

    fn answer(&self, request: &AssertionRequest, allow: bool, server_url: Option<&str>) -> AssertionResponse {
        let mut fields = BTreeMap::new();
        if allow {
            fields.insert("mode".into(), "id_res".into());
            fields.insert("identity".into(), request.identity.clone());
            fields.insert("return_to".into(), request.return_to.clone());
            fields.insert("response_nonce".into(), response_nonce());
        } else {
            match (request.mode, server_url) {
                (Mode::CheckidImmediate, Some(server_url)) => {
                    fields.insert("mode".into(), "id_res".into());
                    fields.insert("user_setup_url".into(), setup_url(server_url, request));
                }
                _ => {
                    fields.insert("mode".into(), "cancel".into());
                }
            }
        }
        AssertionResponse { request: request.clone(), allow, fields }
    }

    fn sign(&self, mut response: AssertionResponse) -> AssertionResponse {
        if !response.allow {
            warn!(target: "openid", "refusing to sign a negative assertion");
            return response;
        }
        response.fields.insert("assoc_handle".into(), STATELESS_HANDLE.into());
        let sig = self.signature(SIGNED_FIELDS, &response.fields);
        response.fields.insert("signed".into(), SIGNED_FIELDS.into());
        response.fields.insert("sig".into(), sig);
        response
    }

    fn encode(&self, response: &AssertionResponse) -> WebResponse {
        let pairs: Vec<(String, &str)> = response
            .fields
            .iter()
            .map(|(k, v)| (format!("{}{}", PREFIX, k), v.as_str()))
            .collect();
        let location = match Url::parse(&response.request.return_to) {
            Ok(mut url) => {
                url.query_pairs_mut().extend_pairs(pairs.iter().map(|(k, v)| (k.as_str(), *v)));
                url.to_string()
            }
            Err(_) => {
                let base = &response.request.return_to;
                let sep = if base.contains('?') { '&' } else { '?' };
                format!("{}{}{}", base, sep, form_urlencode(pairs.iter().map(|(k, v)| (k.as_str(), *v))))
            }
        };
        WebResponse::redirect(location)
    }

    fn handle_direct(&self, request: &DirectRequest) -> WebResponse {
        match request.mode.as_str() {
            "check_authentication" => self.check_authentication(&request.fields),
            "associate" => {
                let mut out = BTreeMap::new();
                out.insert("error".to_string(), "associations are not supported; use stateless mode".to_string());
                out.insert("error_code".to_string(), "unsupported-type".to_string());
                direct_response(400, &out)
            }
            other => direct_error(&format!("unsupported mode: {}", other)),
        }
    }
}
