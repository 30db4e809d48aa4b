use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use url::Url;

use crate::apple::APPLE_JWKS_URI;

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: basic_toml::Error,
    },
    #[error("Invalid configuration: {0}")]
    Invalid(String),
    #[error("Failed to initialize logging: {0}")]
    Logger(#[from] log::SetLoggerError),
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RevokrsSettings {
    pub application: ApplicationSettings,
    pub apple: AppleSettings,
    pub directory: DirectorySettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationSettings {
    pub host: String,
    pub port: u16,
    /// Route that receives Apple's notifications
    pub notification_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppleSettings {
    /// App bundle identifier; notification tokens must carry it as `aud`
    pub bundle_id: String,
    pub jwks_uri: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectorySettings {
    /// Label joined with Apple's `sub` to form directory user IDs
    pub connection_name: String,
    /// Management API domain; empty means mutations are only logged
    pub domain: String,
    pub client_id: String,
    pub client_secret: String,
    /// Management API audience (defaults to `https://{domain}/api/v2/`)
    pub audience: Option<String>,
    /// Timeout applied to every outbound HTTP request
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
}

impl Default for ApplicationSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            notification_path: "/apple/notifications".to_string(),
        }
    }
}

impl Default for AppleSettings {
    fn default() -> Self {
        Self {
            bundle_id: String::new(),
            jwks_uri: APPLE_JWKS_URI.to_string(),
        }
    }
}

impl Default for DirectorySettings {
    fn default() -> Self {
        Self {
            connection_name: "apple".to_string(),
            domain: String::new(),
            client_id: String::new(),
            client_secret: String::new(),
            audience: None,
            timeout_seconds: 10,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl RevokrsSettings {
    /// Load settings from configuration files and environment variables, then
    /// initialize logging at the configured level
    ///
    /// Priority (highest first):
    /// 1. Environment variables (including those from `.env`)
    /// 2. Settings.toml in `REVOKRS_SECRETS_DIR` (if set and present)
    /// 3. Settings.toml in the current directory (if present)
    /// 4. Defaults
    ///
    /// # Errors
    ///
    /// Returns an error if a settings file cannot be read or parsed, or if the
    /// logger was already initialized
    pub fn load() -> Result<Self, SettingsError> {
        Self::load_env_file(Path::new(".env"));

        let mut settings = Self::load_base_settings()?;
        settings.apply_env_overrides();

        env_logger::Builder::new()
            .parse_filters(&settings.logging.level)
            .try_init()?;

        Ok(settings)
    }

    fn load_base_settings() -> Result<Self, SettingsError> {
        let mut settings = Self::default();

        let default_config_path = PathBuf::from("Settings.toml");
        if default_config_path.exists() {
            settings = Self::from_toml_file(&default_config_path)?;
            println!(
                "✓ Loaded base settings from {}",
                default_config_path.display()
            );
        }

        if let Ok(secrets_dir) = std::env::var("REVOKRS_SECRETS_DIR") {
            let secrets_path = Path::new(&secrets_dir).join("Settings.toml");
            if secrets_path.exists() {
                settings = Self::from_toml_file(&secrets_path)?;
                println!("✓ Overriding settings from {}", secrets_path.display());
            } else {
                println!(
                    "ℹ REVOKRS_SECRETS_DIR set but no Settings.toml found at: {}",
                    secrets_path.display()
                );
            }
        }

        Ok(settings)
    }

    /// Parse a TOML settings file; missing sections and keys take their defaults
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid TOML
    pub fn from_toml_file(path: &Path) -> Result<Self, SettingsError> {
        let content = fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        basic_toml::from_str(&content).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply environment variable overrides to settings
    pub fn apply_env_overrides(&mut self) {
        override_string("HOST", &mut self.application.host);
        if let Some(port) = env_value("PORT").and_then(|port| port.parse::<u16>().ok()) {
            self.application.port = port;
        }
        override_string("NOTIFICATION_PATH", &mut self.application.notification_path);

        override_string("APP_BUNDLE_ID", &mut self.apple.bundle_id);
        override_string("APPLE_JWKS_URI", &mut self.apple.jwks_uri);

        override_string("CONNECTION_NAME", &mut self.directory.connection_name);
        override_string("DIRECTORY_DOMAIN", &mut self.directory.domain);
        override_string("DIRECTORY_CLIENT_ID", &mut self.directory.client_id);
        override_string("DIRECTORY_CLIENT_SECRET", &mut self.directory.client_secret);
        if let Ok(audience) = std::env::var("DIRECTORY_AUDIENCE") {
            self.directory.audience = Some(audience).filter(|value| !value.trim().is_empty());
        }
        if let Some(timeout) =
            env_value("HTTP_TIMEOUT_SECONDS").and_then(|value| value.parse::<u64>().ok())
        {
            self.directory.timeout_seconds = timeout;
        }

        override_string("RUST_LOG", &mut self.logging.level);
    }

    /// Check that the settings describe a runnable receiver
    ///
    /// # Errors
    ///
    /// Returns `SettingsError::Invalid` naming the first problem found
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.apple.bundle_id.trim().is_empty() {
            return Err(SettingsError::Invalid(
                "APP_BUNDLE_ID must be set to the app's bundle identifier".to_string(),
            ));
        }
        if self.directory.connection_name.trim().is_empty() {
            return Err(SettingsError::Invalid(
                "CONNECTION_NAME must not be empty".to_string(),
            ));
        }
        if !self.application.notification_path.starts_with('/') {
            return Err(SettingsError::Invalid(format!(
                "NOTIFICATION_PATH must start with '/': {}",
                self.application.notification_path
            )));
        }
        Url::parse(&self.apple.jwks_uri).map_err(|e| {
            SettingsError::Invalid(format!("Invalid APPLE_JWKS_URI '{}': {e}", self.apple.jwks_uri))
        })?;

        if self.directory.is_configured() {
            if self.directory.client_id.is_empty() || self.directory.client_secret.is_empty() {
                return Err(SettingsError::Invalid(
                    "DIRECTORY_CLIENT_ID and DIRECTORY_CLIENT_SECRET are required when DIRECTORY_DOMAIN is set"
                        .to_string(),
                ));
            }
            self.directory
                .base_url()
                .map_err(|e| SettingsError::Invalid(format!("Invalid DIRECTORY_DOMAIN: {e}")))?;
        }

        Ok(())
    }

    /// Get the bind address for the server
    #[must_use]
    pub fn get_bind_address(&self) -> String {
        format!("{}:{}", self.application.host, self.application.port)
    }

    /// Shared outbound HTTP client for the key set and the directory
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialized
    pub fn http_client(&self) -> Result<reqwest::Client, reqwest::Error> {
        reqwest::Client::builder()
            .timeout(Duration::from_secs(self.directory.timeout_seconds))
            .user_agent(format!("revokrs/{}", crate::VERSION))
            .build()
    }

    /// Load environment variables from a `.env` file without replacing ones already set
    fn load_env_file(path: &Path) {
        if let Ok(contents) = fs::read_to_string(path) {
            for line in contents.lines() {
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }
                if let Some((key, value)) = line.split_once('=') {
                    let key = key.trim();
                    if std::env::var_os(key).is_none() {
                        std::env::set_var(key, value.trim().trim_matches('"'));
                    }
                }
            }
        }
    }
}

impl DirectorySettings {
    /// Whether a Management API is configured
    #[must_use]
    pub fn is_configured(&self) -> bool {
        !self.domain.trim().is_empty()
    }

    /// Base URL of the Management API
    ///
    /// A bare domain is served over HTTPS; a value with a scheme is used as is.
    ///
    /// # Errors
    ///
    /// Returns an error if the resulting URL cannot be parsed
    pub fn base_url(&self) -> Result<Url, url::ParseError> {
        let domain = self.domain.trim();
        let mut raw = if domain.contains("://") {
            domain.to_string()
        } else {
            format!("https://{domain}")
        };
        if !raw.ends_with('/') {
            raw.push('/');
        }
        Url::parse(&raw)
    }
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

fn override_string(name: &str, target: &mut String) {
    if let Some(value) = env_value(name) {
        *target = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    const ENV_VARS: &[&str] = &[
        "HOST",
        "PORT",
        "NOTIFICATION_PATH",
        "APP_BUNDLE_ID",
        "APPLE_JWKS_URI",
        "CONNECTION_NAME",
        "DIRECTORY_DOMAIN",
        "DIRECTORY_CLIENT_ID",
        "DIRECTORY_CLIENT_SECRET",
        "DIRECTORY_AUDIENCE",
        "HTTP_TIMEOUT_SECONDS",
        "RUST_LOG",
        "REVOKRS_SECRETS_DIR",
    ];

    fn clean_env_vars() {
        for name in ENV_VARS {
            std::env::remove_var(name);
        }
    }

    fn valid_settings() -> RevokrsSettings {
        let mut settings = RevokrsSettings::default();
        settings.apple.bundle_id = "com.example.app".to_string();
        settings
    }

    #[test]
    fn test_defaults() {
        let settings = RevokrsSettings::default();
        assert_eq!(settings.application.port, 8080);
        assert_eq!(settings.application.notification_path, "/apple/notifications");
        assert_eq!(settings.apple.jwks_uri, "https://appleid.apple.com/auth/keys");
        assert_eq!(settings.directory.connection_name, "apple");
        assert_eq!(settings.directory.timeout_seconds, 10);
        assert!(!settings.directory.is_configured());
        assert_eq!(settings.logging.level, "info");
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        clean_env_vars();
        std::env::set_var("PORT", "9090");
        std::env::set_var("APP_BUNDLE_ID", "com.example.env");
        std::env::set_var("CONNECTION_NAME", "siwa");
        std::env::set_var("DIRECTORY_DOMAIN", "tenant.example.com");
        std::env::set_var("DIRECTORY_AUDIENCE", "");
        std::env::set_var("HTTP_TIMEOUT_SECONDS", "3");

        let mut settings = RevokrsSettings::default();
        settings.directory.audience = Some("from-file".to_string());
        settings.apply_env_overrides();

        assert_eq!(settings.application.port, 9090);
        assert_eq!(settings.apple.bundle_id, "com.example.env");
        assert_eq!(settings.directory.connection_name, "siwa");
        assert_eq!(settings.directory.domain, "tenant.example.com");
        assert_eq!(settings.directory.audience, None);
        assert_eq!(settings.directory.timeout_seconds, 3);

        clean_env_vars();
    }

    #[test]
    #[serial]
    fn test_unparseable_numbers_keep_previous_values() {
        clean_env_vars();
        std::env::set_var("PORT", "not-a-port");
        std::env::set_var("HTTP_TIMEOUT_SECONDS", "-1");

        let mut settings = RevokrsSettings::default();
        settings.apply_env_overrides();

        assert_eq!(settings.application.port, 8080);
        assert_eq!(settings.directory.timeout_seconds, 10);

        clean_env_vars();
    }

    #[test]
    fn test_partial_toml_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[apple]\nbundle_id = \"com.example.toml\"\n\n[directory]\ndomain = \"tenant.example.com\"\nclient_id = \"id\"\nclient_secret = \"secret\""
        )
        .unwrap();

        let settings = RevokrsSettings::from_toml_file(file.path()).unwrap();
        assert_eq!(settings.apple.bundle_id, "com.example.toml");
        assert_eq!(settings.apple.jwks_uri, APPLE_JWKS_URI);
        assert_eq!(settings.directory.connection_name, "apple");
        assert!(settings.directory.is_configured());
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_invalid_toml_file_is_reported() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[apple\nbundle_id = ").unwrap();

        let err = RevokrsSettings::from_toml_file(file.path()).unwrap_err();
        assert!(matches!(err, SettingsError::Parse { .. }));

        let err = RevokrsSettings::from_toml_file(Path::new("/nonexistent/Settings.toml"))
            .unwrap_err();
        assert!(matches!(err, SettingsError::Io { .. }));
    }

    #[test]
    fn test_validation() {
        assert!(valid_settings().validate().is_ok());

        let settings = RevokrsSettings::default();
        assert!(matches!(settings.validate(), Err(SettingsError::Invalid(_))));

        let mut settings = valid_settings();
        settings.directory.connection_name = "  ".to_string();
        assert!(settings.validate().is_err());

        let mut settings = valid_settings();
        settings.apple.jwks_uri = "not a url".to_string();
        assert!(settings.validate().is_err());

        let mut settings = valid_settings();
        settings.application.notification_path = "apple".to_string();
        assert!(settings.validate().is_err());

        let mut settings = valid_settings();
        settings.directory.domain = "tenant.example.com".to_string();
        assert!(settings.validate().is_err());
        settings.directory.client_id = "id".to_string();
        settings.directory.client_secret = "secret".to_string();
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_directory_base_url() {
        let mut directory = DirectorySettings {
            domain: "tenant.example.com".to_string(),
            ..DirectorySettings::default()
        };
        assert_eq!(
            directory.base_url().unwrap().as_str(),
            "https://tenant.example.com/"
        );

        directory.domain = "http://127.0.0.1:4000".to_string();
        assert_eq!(
            directory.base_url().unwrap().as_str(),
            "http://127.0.0.1:4000/"
        );
    }

    #[test]
    #[serial]
    fn test_env_file_does_not_replace_existing_vars() {
        clean_env_vars();
        std::env::set_var("CONNECTION_NAME", "from-env");

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "# comment\nCONNECTION_NAME=from-file\nAPP_BUNDLE_ID=\"com.example.dotenv\"\n"
        )
        .unwrap();
        RevokrsSettings::load_env_file(file.path());

        assert_eq!(std::env::var("CONNECTION_NAME").unwrap(), "from-env");
        assert_eq!(std::env::var("APP_BUNDLE_ID").unwrap(), "com.example.dotenv");

        clean_env_vars();
    }
}
