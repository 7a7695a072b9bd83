//!
//! gracie_passwd
//! -------------
//! Maintain the user directory read by `gracied`.
//!
//!   gracie_passwd add <name> <password> [--fullname F] [--id N] [--users-file PATH]
//!   gracie_passwd remove <name> [--users-file PATH]

use std::env;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};

use gracie::config::{has_flag, DEFAULT_USERS_FILE};
use gracie::security;

const USAGE: &str = "gracie_passwd - maintain the gracie user directory\n\nUSAGE:\n  gracie_passwd add <name> <password> [--fullname F] [--id N] [--users-file PATH]\n  gracie_passwd remove <name> [--users-file PATH]\n\nThe users file defaults to $GRACIE_USERS_FILE, then users.json.\n";

/// Value following `flag`, and the positional arguments with all flags removed.
fn split_args(args: &[String]) -> (Vec<String>, Vec<(String, String)>) {
    let mut positional = Vec::new();
    let mut flags = Vec::new();
    let mut i = 0;
    while i < args.len() {
        let a = &args[i];
        if a.starts_with("--") && i + 1 < args.len() {
            flags.push((a.clone(), args[i + 1].clone()));
            i += 2;
            continue;
        }
        positional.push(a.clone());
        i += 1;
    }
    (positional, flags)
}

fn flag<'a>(flags: &'a [(String, String)], name: &str) -> Option<&'a str> {
    flags.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
}

fn main() -> Result<()> {
    let args: Vec<String> = env::args().skip(1).collect();
    if args.is_empty() || has_flag(&args, "--help") || has_flag(&args, "-h") {
        print!("{}", USAGE);
        return Ok(());
    }
    let (positional, flags) = split_args(&args);
    let users_file = flag(&flags, "--users-file")
        .map(PathBuf::from)
        .or_else(|| env::var("GRACIE_USERS_FILE").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_USERS_FILE));

    match positional.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
        ["add", name, password] => {
            let id = match flag(&flags, "--id") {
                Some(v) => Some(v.parse::<u32>().with_context(|| format!("--id expects a number, got {:?}", v))?),
                None => None,
            };
            let record = security::add_user(&users_file, name, password, flag(&flags, "--fullname"), id)
                .with_context(|| format!("While adding {} to {}", name, users_file.display()))?;
            println!("{} (id {}) saved to {}", record.name, record.id, users_file.display());
        }
        ["remove", name] => {
            let removed = security::delete_user(&users_file, name)
                .with_context(|| format!("While removing {} from {}", name, users_file.display()))?;
            if !removed {
                bail!("no such user: {}", name);
            }
            println!("{} removed from {}", name, users_file.display());
        }
        _ => {
            eprint!("{}", USAGE);
            bail!("unrecognised command");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_are_split_from_positionals() {
        let args: Vec<String> = ["add", "alice", "pw", "--fullname", "Alice Example", "--id", "1200"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let (positional, flags) = split_args(&args);
        assert_eq!(positional, vec!["add", "alice", "pw"]);
        assert_eq!(flag(&flags, "--fullname"), Some("Alice Example"));
        assert_eq!(flag(&flags, "--id"), Some("1200"));
        assert_eq!(flag(&flags, "--users-file"), None);
    }
}
