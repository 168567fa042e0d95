use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub dialogue: DialogueConfig,
    pub numbering: NumberingConfig,
    pub whatsapp: WhatsappConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct DialogueConfig {
    /// In-flight conversations idle for longer than this restart from scratch.
    pub abandon_after_hours: u64,
    /// Bounded retries when two messages race on the same conversation row.
    pub state_retry_attempts: u32,
}

#[derive(Clone, Debug)]
pub struct NumberingConfig {
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
}

/// Delivery itself runs outside this service; the credential is carried so
/// `doctor` can verify the deployment is wired up.
#[derive(Clone, Debug)]
pub struct WhatsappConfig {
    pub enabled: bool,
    pub api_token: Option<SecretString>,
    pub phone_number_id: Option<String>,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub abandon_after_hours: Option<u64>,
    pub whatsapp_enabled: Option<bool>,
    pub whatsapp_api_token: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://artibot.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            dialogue: DialogueConfig { abandon_after_hours: 24, state_retry_attempts: 3 },
            numbering: NumberingConfig { max_attempts: 3, backoff_base_ms: 25, backoff_max_ms: 250 },
            whatsapp: WhatsappConfig { enabled: false, api_token: None, phone_number_id: None },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("artibot.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(dialogue) = patch.dialogue {
            if let Some(abandon_after_hours) = dialogue.abandon_after_hours {
                self.dialogue.abandon_after_hours = abandon_after_hours;
            }
            if let Some(state_retry_attempts) = dialogue.state_retry_attempts {
                self.dialogue.state_retry_attempts = state_retry_attempts;
            }
        }

        if let Some(numbering) = patch.numbering {
            if let Some(max_attempts) = numbering.max_attempts {
                self.numbering.max_attempts = max_attempts;
            }
            if let Some(backoff_base_ms) = numbering.backoff_base_ms {
                self.numbering.backoff_base_ms = backoff_base_ms;
            }
            if let Some(backoff_max_ms) = numbering.backoff_max_ms {
                self.numbering.backoff_max_ms = backoff_max_ms;
            }
        }

        if let Some(whatsapp) = patch.whatsapp {
            if let Some(enabled) = whatsapp.enabled {
                self.whatsapp.enabled = enabled;
            }
            if let Some(api_token) = whatsapp.api_token {
                self.whatsapp.api_token = Some(api_token.into());
            }
            if let Some(phone_number_id) = whatsapp.phone_number_id {
                self.whatsapp.phone_number_id = Some(phone_number_id);
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("ARTIBOT_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("ARTIBOT_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_u32("ARTIBOT_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("ARTIBOT_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("ARTIBOT_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("ARTIBOT_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("ARTIBOT_SERVER_PORT") {
            self.server.port = parse_u16("ARTIBOT_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("ARTIBOT_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("ARTIBOT_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        if let Some(value) = read_env("ARTIBOT_DIALOGUE_ABANDON_AFTER_HOURS") {
            self.dialogue.abandon_after_hours =
                parse_u64("ARTIBOT_DIALOGUE_ABANDON_AFTER_HOURS", &value)?;
        }
        if let Some(value) = read_env("ARTIBOT_DIALOGUE_STATE_RETRY_ATTEMPTS") {
            self.dialogue.state_retry_attempts =
                parse_u32("ARTIBOT_DIALOGUE_STATE_RETRY_ATTEMPTS", &value)?;
        }

        if let Some(value) = read_env("ARTIBOT_NUMBERING_MAX_ATTEMPTS") {
            self.numbering.max_attempts = parse_u32("ARTIBOT_NUMBERING_MAX_ATTEMPTS", &value)?;
        }
        if let Some(value) = read_env("ARTIBOT_NUMBERING_BACKOFF_BASE_MS") {
            self.numbering.backoff_base_ms =
                parse_u64("ARTIBOT_NUMBERING_BACKOFF_BASE_MS", &value)?;
        }
        if let Some(value) = read_env("ARTIBOT_NUMBERING_BACKOFF_MAX_MS") {
            self.numbering.backoff_max_ms = parse_u64("ARTIBOT_NUMBERING_BACKOFF_MAX_MS", &value)?;
        }

        if let Some(value) = read_env("ARTIBOT_WHATSAPP_ENABLED") {
            self.whatsapp.enabled = parse_bool("ARTIBOT_WHATSAPP_ENABLED", &value)?;
        }
        if let Some(value) = read_env("ARTIBOT_WHATSAPP_API_TOKEN") {
            self.whatsapp.api_token = Some(value.into());
        }
        if let Some(value) = read_env("ARTIBOT_WHATSAPP_PHONE_NUMBER_ID") {
            self.whatsapp.phone_number_id = Some(value);
        }

        let log_level = read_env("ARTIBOT_LOGGING_LEVEL").or_else(|| read_env("ARTIBOT_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("ARTIBOT_LOGGING_FORMAT").or_else(|| read_env("ARTIBOT_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(abandon_after_hours) = overrides.abandon_after_hours {
            self.dialogue.abandon_after_hours = abandon_after_hours;
        }
        if let Some(enabled) = overrides.whatsapp_enabled {
            self.whatsapp.enabled = enabled;
        }
        if let Some(api_token) = overrides.whatsapp_api_token {
            self.whatsapp.api_token = Some(api_token.into());
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_server(&self.server)?;
        validate_dialogue(&self.dialogue)?;
        validate_numbering(&self.numbering)?;
        validate_whatsapp(&self.whatsapp)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("artibot.toml"), PathBuf::from("config/artibot.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite:") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...` or `:memory:`)".to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_dialogue(dialogue: &DialogueConfig) -> Result<(), ConfigError> {
    if dialogue.abandon_after_hours == 0 || dialogue.abandon_after_hours > 720 {
        return Err(ConfigError::Validation(
            "dialogue.abandon_after_hours must be in range 1..=720".to_string(),
        ));
    }

    if dialogue.state_retry_attempts == 0 || dialogue.state_retry_attempts > 10 {
        return Err(ConfigError::Validation(
            "dialogue.state_retry_attempts must be in range 1..=10".to_string(),
        ));
    }

    Ok(())
}

fn validate_numbering(numbering: &NumberingConfig) -> Result<(), ConfigError> {
    if numbering.max_attempts == 0 || numbering.max_attempts > 10 {
        return Err(ConfigError::Validation(
            "numbering.max_attempts must be in range 1..=10".to_string(),
        ));
    }

    if numbering.backoff_base_ms == 0 || numbering.backoff_base_ms > numbering.backoff_max_ms {
        return Err(ConfigError::Validation(
            "numbering.backoff_base_ms must be nonzero and at most backoff_max_ms".to_string(),
        ));
    }

    Ok(())
}

fn validate_whatsapp(whatsapp: &WhatsappConfig) -> Result<(), ConfigError> {
    if !whatsapp.enabled {
        return Ok(());
    }

    let token_missing = whatsapp
        .api_token
        .as_ref()
        .map(|value| value.expose_secret().trim().is_empty())
        .unwrap_or(true);
    if token_missing {
        return Err(ConfigError::Validation(
            "whatsapp.enabled is true but whatsapp.api_token is missing".to_string(),
        ));
    }

    let number_missing =
        whatsapp.phone_number_id.as_ref().map(|value| value.trim().is_empty()).unwrap_or(true);
    if number_missing {
        return Err(ConfigError::Validation(
            "whatsapp.enabled is true but whatsapp.phone_number_id is missing".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    server: Option<ServerPatch>,
    dialogue: Option<DialoguePatch>,
    numbering: Option<NumberingPatch>,
    whatsapp: Option<WhatsappPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct DialoguePatch {
    abandon_after_hours: Option<u64>,
    state_retry_attempts: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct NumberingPatch {
    max_attempts: Option<u32>,
    backoff_base_ms: Option<u64>,
    backoff_max_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct WhatsappPatch {
    enabled: Option<bool>,
    api_token: Option<String>,
    phone_number_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn defaults_validate_without_any_file() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let config = AppConfig::load(LoadOptions::default())
            .map_err(|err| format!("config load failed: {err}"))?;

        ensure(config.database.url == "sqlite://artibot.db", "default database url expected")?;
        ensure(config.dialogue.abandon_after_hours == 24, "default abandon ttl expected")?;
        ensure(config.numbering.max_attempts == 3, "default numbering retries expected")?;
        ensure(!config.whatsapp.enabled, "whatsapp delivery should default to disabled")
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_WA_TOKEN", "wa-token-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("artibot.toml");
            fs::write(
                &path,
                r#"
[whatsapp]
enabled = true
api_token = "${TEST_WA_TOKEN}"
phone_number_id = "331122334455"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            let token = config.whatsapp.api_token.as_ref().map(|t| t.expose_secret().to_owned());
            ensure(
                token.as_deref() == Some("wa-token-from-env"),
                "api token should be loaded from environment",
            )
        })();

        clear_vars(&["TEST_WA_TOKEN"]);
        result
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("ARTIBOT_LOG_LEVEL", "warn");
        env::set_var("ARTIBOT_LOG_FORMAT", "pretty");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warn log level should come from env")?;
            ensure(
                matches!(config.logging.format, LogFormat::Pretty),
                "pretty log format should come from env",
            )
        })();

        clear_vars(&["ARTIBOT_LOG_LEVEL", "ARTIBOT_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_is_defaults_then_file_then_env_then_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("ARTIBOT_DATABASE_URL", "sqlite://from-env.db");
        env::set_var("ARTIBOT_DIALOGUE_ABANDON_AFTER_HOURS", "48");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("artibot.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://from-file.db"

[dialogue]
abandon_after_hours = 12

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    database_url: Some("sqlite://from-override.db".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://from-override.db",
                "programmatic override should win over env and file",
            )?;
            ensure(config.logging.level == "debug", "override log level should win")?;
            ensure(
                config.dialogue.abandon_after_hours == 48,
                "env abandon ttl should win over the file value",
            )
        })();

        clear_vars(&["ARTIBOT_DATABASE_URL", "ARTIBOT_DIALOGUE_ABANDON_AFTER_HOURS"]);
        result
    }

    #[test]
    fn enabled_whatsapp_without_credentials_fails_validation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("ARTIBOT_WHATSAPP_ENABLED", "true");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let mentions_token = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("whatsapp.api_token")
            );
            ensure(mentions_token, "validation failure should mention whatsapp.api_token")
        })();

        clear_vars(&["ARTIBOT_WHATSAPP_ENABLED"]);
        result
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("ARTIBOT_WHATSAPP_API_TOKEN", "wa-secret-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(!debug.contains("wa-secret-value"), "debug output should not contain the token")
        })();

        clear_vars(&["ARTIBOT_WHATSAPP_API_TOKEN"]);
        result
    }

    #[test]
    fn out_of_range_dialogue_ttl_is_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("ARTIBOT_DIALOGUE_ABANDON_AFTER_HOURS", "0");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => return Err("expected validation failure".to_string()),
                Err(error) => error,
            };
            ensure(
                matches!(
                    error,
                    ConfigError::Validation(ref message)
                        if message.contains("dialogue.abandon_after_hours")
                ),
                "validation failure should mention dialogue.abandon_after_hours",
            )
        })();

        clear_vars(&["ARTIBOT_DIALOGUE_ABANDON_AFTER_HOURS"]);
        result
    }
}
