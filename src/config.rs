use std::env;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing environment variable {0}")]
    Missing(&'static str),
    #[error("invalid {name}: {value:?} is not a number")]
    InvalidNumber { name: &'static str, value: String },
    #[error("cannot expand {0}: home directory is unknown")]
    NoHomeDir(String),
}

#[derive(Clone, Debug)]
pub struct Config {
    pub api_id: i32,
    pub api_hash: String,
    pub phone: Option<String>,
    pub session_path: PathBuf,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        let api_id = env::var("TG_APPID").map_err(|_| ConfigError::Missing("TG_APPID"))?;
        let api_id = api_id
            .trim()
            .parse::<i32>()
            .map_err(|_| ConfigError::InvalidNumber {
                name: "TG_APPID",
                value: api_id.clone(),
            })?;

        let api_hash = env::var("TG_APPHASH")
            .ok()
            .filter(|hash| !hash.trim().is_empty())
            .ok_or(ConfigError::Missing("TG_APPHASH"))?;

        let phone = env::var("PHONE").ok().filter(|phone| !phone.is_empty());

        let session_path = match env::var("AUTH_FILE") {
            Ok(raw) if !raw.trim().is_empty() => expand_tilde(raw.trim())?,
            _ => default_session_path()?,
        };

        Ok(Self {
            api_id,
            api_hash,
            phone,
            session_path,
        })
    }
}

/// Expands a leading `~` or `~/` to the current user's home directory.
pub fn expand_tilde(raw: &str) -> Result<PathBuf, ConfigError> {
    let rest = if raw == "~" {
        ""
    } else if let Some(rest) = raw.strip_prefix("~/") {
        rest
    } else {
        return Ok(PathBuf::from(raw));
    };

    let home = dirs::home_dir().ok_or_else(|| ConfigError::NoHomeDir(raw.to_string()))?;
    Ok(join_home(&home, rest))
}

fn join_home(home: &Path, rest: &str) -> PathBuf {
    if rest.is_empty() {
        home.to_path_buf()
    } else {
        home.join(rest)
    }
}

fn default_session_path() -> Result<PathBuf, ConfigError> {
    expand_tilde("~/.local/share/tg-unread/session.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_paths_are_left_alone() {
        let path = expand_tilde("/var/lib/tg/session.json").expect("plain path");
        assert_eq!(path, PathBuf::from("/var/lib/tg/session.json"));

        let relative = expand_tilde("session.json").expect("relative path");
        assert_eq!(relative, PathBuf::from("session.json"));
    }

    #[test]
    fn user_relative_tilde_is_not_expanded() {
        // `~other/` names another user's home, which is left verbatim.
        let path = expand_tilde("~other/session.json").expect("verbatim");
        assert_eq!(path, PathBuf::from("~other/session.json"));
    }

    #[test]
    fn joins_rest_onto_home() {
        let home = Path::new("/home/alice");
        assert_eq!(join_home(home, ""), PathBuf::from("/home/alice"));
        assert_eq!(
            join_home(home, ".config/tg/session.json"),
            PathBuf::from("/home/alice/.config/tg/session.json")
        );
    }
}
