//! Server configuration from CLI flags and `GRACIE_*` environment variables.
//! CLI arguments override environment, environment overrides defaults.

use std::path::PathBuf;

use crate::error::{IdentityError, IdentityResult};

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_USERS_FILE: &str = "users.json";

pub const USAGE: &str = "gracied - OpenID provider for local accounts\n\nUSAGE:\n  gracied [--host NAME] [--port N] [--root-url URL] [--users-file PATH]\n\nOPTIONS:\n  --host NAME         Address to listen on (env: GRACIE_HOST, default localhost)\n  --port N            Port to listen on (env: GRACIE_PORT, default 8000)\n  --root-url URL      Public root URL of the site (env: GRACIE_ROOT_URL, default http://<host>:<port>/)\n  --users-file PATH   User directory file (env: GRACIE_USERS_FILE, default users.json)\n  -h, --help          Show this help\n\nENVIRONMENT:\n  GRACIE_SECRET       Hex-encoded signing secret; a random one is generated when unset\n";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub root_url: String,
    pub users_file: PathBuf,
    /// Assertion signing secret; `None` means generate one at start-up.
    pub secret: Option<Vec<u8>>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            root_url: default_root_url(DEFAULT_HOST, DEFAULT_PORT),
            users_file: PathBuf::from(DEFAULT_USERS_FILE),
            secret: None,
        }
    }
}

/// `http://host[:port]/`, with the port left out when it is 80.
pub fn default_root_url(host: &str, port: u16) -> String {
    if port == 80 { format!("http://{}/", host) } else { format!("http://{}:{}/", host, port) }
}

pub fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}

fn parse_string_arg(args: &[String], flag: &str) -> Option<String> {
    let mut i = 0;
    while i < args.len() {
        if args[i] == flag {
            return args.get(i + 1).cloned();
        }
        i += 1;
    }
    None
}

fn parse_port_arg(args: &[String], flag: &str) -> Option<u16> {
    parse_string_arg(args, flag).and_then(|v| v.parse::<u16>().ok())
}

impl ServerConfig {
    /// Resolve the configuration. `env` looks up an environment variable;
    /// the binary passes `std::env::var(..).ok()`.
    pub fn from_args_and_env(args: &[String], env: impl Fn(&str) -> Option<String>) -> IdentityResult<Self> {
        let env_port = env("GRACIE_PORT").and_then(|v| v.parse::<u16>().ok());

        let host = parse_string_arg(args, "--host")
            .or_else(|| env("GRACIE_HOST"))
            .unwrap_or_else(|| DEFAULT_HOST.to_string());
        let port = parse_port_arg(args, "--port").or(env_port).unwrap_or(DEFAULT_PORT);
        let root_url = parse_string_arg(args, "--root-url")
            .or_else(|| env("GRACIE_ROOT_URL"))
            .unwrap_or_else(|| default_root_url(&host, port));
        let users_file = parse_string_arg(args, "--users-file")
            .or_else(|| env("GRACIE_USERS_FILE"))
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_USERS_FILE));
        let secret = match env("GRACIE_SECRET") {
            Some(hex_secret) if !hex_secret.trim().is_empty() => Some(
                hex::decode(hex_secret.trim())
                    .map_err(|e| IdentityError::Config(format!("GRACIE_SECRET is not valid hex: {}", e)))?,
            ),
            _ => None,
        };

        Ok(Self { host, port, root_url, users_file, secret })
    }
}
