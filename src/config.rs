use std::path::Path;

use serde::Deserialize;

use crate::error::OktawaveError;
use crate::soap::DEFAULT_API_URL;

/// Bootstrap handoff settings (`[bootstrap]` section). Everything here is
/// opaque to the client core — it is packaged up and handed to the
/// external bootstrap command.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BootstrapConfig {
    /// Only create the OCI, skip the bootstrap handoff entirely.
    #[serde(default)]
    pub skip: bool,
    #[serde(default = "default_ssh_user")]
    pub ssh_user: String,
    /// When unset, the initial password is fetched from the instance's
    /// operation history.
    #[serde(default)]
    pub ssh_password: Option<String>,
    #[serde(default)]
    pub run_list: Vec<String>,
    /// JSON attribute blob for the first run; passed through verbatim.
    #[serde(default)]
    pub attributes: Option<String>,
    /// Config-management version to install; passed through verbatim.
    #[serde(default)]
    pub version: Option<String>,
    /// External command to run once sshd is reachable. Without one, the
    /// handoff parameters are printed instead.
    #[serde(default)]
    pub command: Option<String>,
}

fn default_ssh_user() -> String {
    "root".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub login: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default)]
    pub bootstrap: BootstrapConfig,
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Config {
            login: String::new(),
            password: String::new(),
            api_url: default_api_url(),
            bootstrap: BootstrapConfig::default(),
        }
    }
}

impl Config {
    /// Load the TOML config. A missing file is an error only when the
    /// path was given explicitly — the default path falls back to an
    /// empty config (credentials can come from env or flags).
    pub fn load(path: &Path, required: bool) -> Result<Config, OktawaveError> {
        if !path.exists() && !required {
            return Ok(Config::default());
        }
        let content = std::fs::read_to_string(path).map_err(|e| OktawaveError::ConfigLoad {
            path: path.display().to_string(),
            source: e,
        })?;
        parse_config(&content, &path.display().to_string())
    }

    /// Apply credential overrides (env vars, then CLI flags) — later
    /// non-empty values win.
    pub fn with_overrides(mut self, login: Option<String>, password: Option<String>) -> Config {
        if let Some(login) = login.filter(|s| !s.is_empty()) {
            self.login = login;
        }
        if let Some(password) = password.filter(|s| !s.is_empty()) {
            self.password = password;
        }
        self
    }

    /// Credentials must be present before any network call.
    pub fn validate(&self) -> Result<(), OktawaveError> {
        let mut missing = Vec::new();
        if self.login.is_empty() {
            missing.push("login");
        }
        if self.password.is_empty() {
            missing.push("password");
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(OktawaveError::Validation {
                message: format!(
                    "missing credentials: {} (set in the config file, OKTAWAVE_* env vars, or --login/--password)",
                    missing.join(", ")
                ),
            })
        }
    }
}

fn parse_config(content: &str, path: &str) -> Result<Config, OktawaveError> {
    toml::from_str(content).map_err(|e| OktawaveError::ConfigParse {
        path: path.to_string(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_config() {
        let config = parse_config(
            r#"
login = "user@example.com"
password = "secret"

[bootstrap]
ssh_user = "admin"
run_list = ["role[base]", "recipe[app]"]
command = "knife bootstrap"
"#,
            "test.toml",
        )
        .unwrap();
        assert_eq!(config.login, "user@example.com");
        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert_eq!(config.bootstrap.ssh_user, "admin");
        assert_eq!(config.bootstrap.run_list.len(), 2);
        assert!(!config.bootstrap.skip);
    }

    #[test]
    fn defaults_apply_to_empty_config() {
        let config = parse_config("", "test.toml").unwrap();
        assert!(config.login.is_empty());
        assert_eq!(config.bootstrap.ssh_user, "root");
        assert_eq!(config.api_url, DEFAULT_API_URL);
    }

    #[test]
    fn overrides_win_but_empty_values_do_not() {
        let config = parse_config("login = \"a\"\npassword = \"b\"", "test.toml")
            .unwrap()
            .with_overrides(Some("c".into()), Some(String::new()));
        assert_eq!(config.login, "c");
        assert_eq!(config.password, "b");
    }

    #[test]
    fn validate_lists_missing_credentials() {
        let err = Config::default().validate().unwrap_err();
        assert!(err.to_string().contains("login, password"));

        let ok = Config::default().with_overrides(Some("u".into()), Some("p".into()));
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn load_missing_optional_path_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        assert!(Config::load(&path, false).is_ok());
        assert!(matches!(
            Config::load(&path, true),
            Err(OktawaveError::ConfigLoad { .. })
        ));
    }
}
