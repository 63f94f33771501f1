use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{
    env_subst::substitute_env,
    error::{Error, Result},
    schema::HublinkConfig,
};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &[
    "hublink.toml",
    "hublink.yaml",
    "hublink.yml",
    "hublink.json",
];

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> Result<HublinkConfig> {
    let raw = std::fs::read_to_string(path).map_err(|source| Error::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&substitute_env(&raw), path)
}

/// Discover and load config from standard locations, then apply `HUBLINK_*`
/// overrides.
///
/// Search order:
/// 1. `./hublink.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/hublink/hublink.{toml,yaml,yml,json}` (user-global)
///
/// Falls back to `HublinkConfig::default()` if nothing is found or the file
/// fails to parse.
pub fn discover_and_load() -> HublinkConfig {
    let mut cfg = match find_config_file() {
        Some(path) => {
            debug!(path = %path.display(), "loading config");
            load_config(&path).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
                HublinkConfig::default()
            })
        },
        None => {
            debug!("no config file found, using defaults");
            HublinkConfig::default()
        },
    };
    apply_env_overrides(&mut cfg);
    cfg
}

/// Find the first config file in standard locations.
pub fn find_config_file() -> Option<PathBuf> {
    let local = CONFIG_FILENAMES.iter().map(PathBuf::from);
    let global = config_dir()
        .into_iter()
        .flat_map(|dir| CONFIG_FILENAMES.iter().map(move |name| dir.join(name)));
    local.chain(global).find(|p| p.exists())
}

/// Returns the user-global config directory (`~/.config/hublink/`).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "hublink").map(|d| d.config_dir().to_path_buf())
}

/// Apply `HUBLINK_DATABASE_URL` and `HUBLINK_DATABASE_MAX_CONNECTIONS`.
pub fn apply_env_overrides(cfg: &mut HublinkConfig) {
    apply_env_overrides_with(cfg, |name| std::env::var(name).ok());
}

fn apply_env_overrides_with(cfg: &mut HublinkConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(url) = lookup("HUBLINK_DATABASE_URL").filter(|v| !v.is_empty()) {
        cfg.database.url = url;
    }
    if let Some(raw) = lookup("HUBLINK_DATABASE_MAX_CONNECTIONS") {
        match raw.parse() {
            Ok(n) => cfg.database.max_connections = n,
            Err(_) => warn!(value = %raw, "ignoring invalid HUBLINK_DATABASE_MAX_CONNECTIONS"),
        }
    }
}

fn parse_config(raw: &str, path: &Path) -> Result<HublinkConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        other => Err(Error::UnsupportedFormat {
            extension: other.to_string(),
        }),
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hublink.yaml");
        std::fs::write(
            &path,
            "antispam:\n  window_ms: 2000\ncontent:\n  profanity: [darn]\n",
        )
        .unwrap();

        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.antispam.window_ms, 2000);
        assert_eq!(cfg.content.profanity, vec!["darn".to_string()]);
    }

    #[test]
    fn loads_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hublink.json");
        std::fs::write(&path, r#"{"relay": {"max_reaction_kinds": 5}}"#).unwrap();

        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.relay.max_reaction_kinds, 5);
    }

    #[test]
    fn rejects_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hublink.ini");
        std::fs::write(&path, "").unwrap();

        let err = load_config(&path).unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat { ref extension } if extension == "ini"));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = load_config(Path::new("/nonexistent/hublink.toml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/hublink.toml"));
    }

    #[test]
    fn env_overrides_database() {
        let mut cfg = HublinkConfig::default();
        apply_env_overrides_with(&mut cfg, |name| match name {
            "HUBLINK_DATABASE_URL" => Some("sqlite::memory:".into()),
            "HUBLINK_DATABASE_MAX_CONNECTIONS" => Some("2".into()),
            _ => None,
        });
        assert_eq!(cfg.database.url, "sqlite::memory:");
        assert_eq!(cfg.database.max_connections, 2);
    }

    #[test]
    fn invalid_override_is_ignored() {
        let mut cfg = HublinkConfig::default();
        apply_env_overrides_with(&mut cfg, |name| {
            (name == "HUBLINK_DATABASE_MAX_CONNECTIONS").then(|| "many".to_string())
        });
        assert_eq!(cfg.database.max_connections, 8);
    }
}
