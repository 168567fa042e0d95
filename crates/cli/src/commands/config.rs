use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use artibot_core::config::{AppConfig, LoadOptions};
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];

    lines.push(render_line(
        "database.url",
        &config.database.url,
        field_source(
            "database.url",
            &["ARTIBOT_DATABASE_URL"],
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        ),
    ));
    lines.push(render_line(
        "database.max_connections",
        &config.database.max_connections.to_string(),
        field_source(
            "database.max_connections",
            &["ARTIBOT_DATABASE_MAX_CONNECTIONS"],
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        ),
    ));
    lines.push(render_line(
        "database.timeout_secs",
        &config.database.timeout_secs.to_string(),
        field_source(
            "database.timeout_secs",
            &["ARTIBOT_DATABASE_TIMEOUT_SECS"],
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        ),
    ));

    lines.push(render_line(
        "server.bind_address",
        &config.server.bind_address,
        field_source(
            "server.bind_address",
            &["ARTIBOT_SERVER_BIND_ADDRESS"],
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        ),
    ));
    lines.push(render_line(
        "server.port",
        &config.server.port.to_string(),
        field_source(
            "server.port",
            &["ARTIBOT_SERVER_PORT"],
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        ),
    ));
    lines.push(render_line(
        "server.graceful_shutdown_secs",
        &config.server.graceful_shutdown_secs.to_string(),
        field_source(
            "server.graceful_shutdown_secs",
            &["ARTIBOT_SERVER_GRACEFUL_SHUTDOWN_SECS"],
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        ),
    ));

    lines.push(render_line(
        "dialogue.abandon_after_hours",
        &config.dialogue.abandon_after_hours.to_string(),
        field_source(
            "dialogue.abandon_after_hours",
            &["ARTIBOT_DIALOGUE_ABANDON_AFTER_HOURS"],
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        ),
    ));
    lines.push(render_line(
        "dialogue.state_retry_attempts",
        &config.dialogue.state_retry_attempts.to_string(),
        field_source(
            "dialogue.state_retry_attempts",
            &["ARTIBOT_DIALOGUE_STATE_RETRY_ATTEMPTS"],
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        ),
    ));

    lines.push(render_line(
        "numbering.max_attempts",
        &config.numbering.max_attempts.to_string(),
        field_source(
            "numbering.max_attempts",
            &["ARTIBOT_NUMBERING_MAX_ATTEMPTS"],
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        ),
    ));
    lines.push(render_line(
        "numbering.backoff_base_ms",
        &config.numbering.backoff_base_ms.to_string(),
        field_source(
            "numbering.backoff_base_ms",
            &["ARTIBOT_NUMBERING_BACKOFF_BASE_MS"],
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        ),
    ));
    lines.push(render_line(
        "numbering.backoff_max_ms",
        &config.numbering.backoff_max_ms.to_string(),
        field_source(
            "numbering.backoff_max_ms",
            &["ARTIBOT_NUMBERING_BACKOFF_MAX_MS"],
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        ),
    ));

    lines.push(render_line(
        "whatsapp.enabled",
        &config.whatsapp.enabled.to_string(),
        field_source(
            "whatsapp.enabled",
            &["ARTIBOT_WHATSAPP_ENABLED"],
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        ),
    ));

    let api_token = if config.whatsapp.api_token.is_some() { "<redacted>" } else { "<unset>" };
    lines.push(render_line(
        "whatsapp.api_token",
        api_token,
        field_source(
            "whatsapp.api_token",
            &["ARTIBOT_WHATSAPP_API_TOKEN"],
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        ),
    ));
    lines.push(render_line(
        "whatsapp.phone_number_id",
        config.whatsapp.phone_number_id.as_deref().unwrap_or("<unset>"),
        field_source(
            "whatsapp.phone_number_id",
            &["ARTIBOT_WHATSAPP_PHONE_NUMBER_ID"],
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        ),
    ));

    lines.push(render_line(
        "logging.level",
        &config.logging.level,
        field_source(
            "logging.level",
            &["ARTIBOT_LOGGING_LEVEL", "ARTIBOT_LOG_LEVEL"],
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        ),
    ));
    lines.push(render_line(
        "logging.format",
        &format!("{:?}", config.logging.format),
        field_source(
            "logging.format",
            &["ARTIBOT_LOGGING_FORMAT", "ARTIBOT_LOG_FORMAT"],
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        ),
    ));

    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    let root = PathBuf::from("artibot.toml");
    if root.exists() {
        return Some(root);
    }

    let nested = PathBuf::from("config/artibot.toml");
    if nested.exists() {
        return Some(nested);
    }

    None
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    for env_key in env_keys {
        if env::var_os(env_key).is_some() {
            return format!("env ({env_key})");
        }
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}
