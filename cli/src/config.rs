use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context};
use config::builder::{ConfigBuilder, DefaultState};
use config::{Config as RawConfig, ConfigError, Environment, File, FileFormat};
use reqimport_core::{Credentials, ImportSettings, PasswordGrant, Throttle};
use serde::Deserialize;

/// Looked up in the current directory when no `--config` is given.
pub const DEFAULT_CONFIG_FILE: &str = "reqimport.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Innovator base URL, e.g. `https://host/InnovatorServer`.
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Pre-issued bearer token. Takes precedence over the password grant.
    pub token: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub database: Option<String>,
    pub client_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImportConfig {
    pub document_id: String,
    pub managed_by_id: String,
    pub document_type_id: String,
    pub requirement_item_type: String,
    pub relationship_item_type: String,
    pub document_item_type: String,
    pub start_index: usize,
    pub pause_every: usize,
    pub pause_seconds: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub import: ImportConfig,
    pub logging: LoggingConfig,
}

fn with_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    RawConfig::builder()
        .set_default("server.url", "http://localhost/InnovatorServer")?
        .set_default("auth.client_id", "IOMApp")?
        .set_default("import.document_id", "543952AF0E7C449BAD92719067FEDAC9")?
        .set_default("import.managed_by_id", "5C1E015B631946D3AEE0B69D52070C42")?
        .set_default("import.document_type_id", "8DF7037346A64816B8BBD8700AFCFE15")?
        .set_default("import.requirement_item_type", "re_Requirement")?
        .set_default("import.relationship_item_type", "re_ReqDocBlockReference")?
        .set_default("import.document_item_type", "re_Requirement_Document")?
        .set_default("import.start_index", 0)?
        .set_default("import.pause_every", 10)?
        .set_default("import.pause_seconds", 2.0)?
        .set_default("logging.level", "info")
}

impl Config {
    /// Defaults, then the TOML file, then `REQIMPORT_*` environment
    /// variables (`REQIMPORT_AUTH__PASSWORD` sets `auth.password`).
    ///
    /// An explicit `path` must exist; the default file is optional.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::from(Path::new(DEFAULT_CONFIG_FILE)).required(false),
        };
        with_defaults()?
            .add_source(file)
            .add_source(
                Environment::with_prefix("REQIMPORT")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// Defaults overlaid with inline TOML only. No file or environment lookup.
    pub fn from_toml_str(toml: &str) -> Result<Self, ConfigError> {
        with_defaults()?
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?
            .try_deserialize()
    }

    pub fn credentials(&self) -> anyhow::Result<Credentials> {
        let auth = &self.auth;
        if let Some(token) = auth.token.as_deref().filter(|t| !t.trim().is_empty()) {
            return Ok(Credentials::Token(token.to_string()));
        }
        let (Some(username), Some(password)) =
            (auth.username.as_deref(), auth.password.as_deref())
        else {
            bail!("no credentials configured: set auth.token or auth.username and auth.password");
        };
        let database = auth
            .database
            .as_deref()
            .context("auth.database is required for the password grant")?;
        Ok(Credentials::Password(PasswordGrant {
            username: username.to_string(),
            password: password.to_string(),
            database: database.to_string(),
            client_id: auth.client_id.clone(),
        }))
    }

    pub fn import_settings(&self) -> anyhow::Result<ImportSettings> {
        let settings = ImportSettings {
            document_id: self.import.document_id.clone(),
            managed_by_id: self.import.managed_by_id.clone(),
            document_type_id: self.import.document_type_id.clone(),
            requirement_item_type: self.import.requirement_item_type.clone(),
            relationship_item_type: self.import.relationship_item_type.clone(),
        };
        settings.validate().context("invalid import configuration")?;
        Ok(settings)
    }

    pub fn throttle(&self) -> anyhow::Result<Throttle> {
        let pause = Duration::try_from_secs_f64(self.import.pause_seconds)
            .context("import.pause_seconds must be a non-negative number")?;
        Ok(Throttle {
            every: self.import.pause_every,
            pause,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_production_environment() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.import.document_id, "543952AF0E7C449BAD92719067FEDAC9");
        assert_eq!(config.import.relationship_item_type, "re_ReqDocBlockReference");
        assert_eq!(config.import.document_item_type, "re_Requirement_Document");
        assert_eq!(config.import.start_index, 0);
        assert_eq!(config.auth.client_id, "IOMApp");
        assert_eq!(config.throttle().unwrap(), Throttle::default());
    }

    #[test]
    fn file_values_override_defaults() {
        let config = Config::from_toml_str(
            r#"
            [server]
            url = "https://plm.example.com/InnovatorServer"

            [import]
            start_index = 3
            pause_seconds = 0.5
            "#,
        )
        .unwrap();
        assert_eq!(config.server.url, "https://plm.example.com/InnovatorServer");
        assert_eq!(config.import.start_index, 3);
        assert_eq!(config.throttle().unwrap().pause, Duration::from_millis(500));
    }

    #[test]
    fn token_wins_over_password() {
        let config = Config::from_toml_str(
            r#"
            [auth]
            token = "abc"
            username = "admin"
            password = "pw"
            "#,
        )
        .unwrap();
        assert_eq!(config.credentials().unwrap(), Credentials::Token("abc".into()));
    }

    #[test]
    fn password_grant_needs_database() {
        let config = Config::from_toml_str(
            r#"
            [auth]
            username = "admin"
            password = "pw"
            "#,
        )
        .unwrap();
        let err = config.credentials().unwrap_err();
        assert!(err.to_string().contains("auth.database"));
    }

    #[test]
    fn missing_credentials_is_an_error() {
        let config = Config::from_toml_str("").unwrap();
        assert!(config.credentials().is_err());
    }

    #[test]
    fn blank_identifier_is_rejected() {
        let config = Config::from_toml_str("[import]\nmanaged_by_id = \" \"\n").unwrap();
        let err = config.import_settings().unwrap_err();
        assert!(format!("{err:#}").contains("managed_by_id must not be empty"));
    }

    #[test]
    fn negative_pause_is_rejected() {
        let config = Config::from_toml_str("[import]\npause_seconds = -1.0\n").unwrap();
        assert!(config.throttle().is_err());
    }
}
