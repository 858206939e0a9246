use secrecy::SecretString;
use thiserror::Error;

pub const DEFAULT_DIRECT_LINE_BASE_URL: &str = "https://europe.directline.botframework.com";
pub const DEFAULT_OPENID_METADATA_URL: &str =
    "https://login.botframework.com/v1/.well-known/openidconfiguration";
pub const DEFAULT_LOGIN_ENDPOINT: &str = "https://login.microsoftonline.com";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: `{value}`")]
    InvalidValue { key: String, value: String },
}

#[derive(Clone, Debug)]
pub struct Config {
    pub server: ServerConfig,
    pub direct_line: DirectLineConfig,
    pub language: LanguageConfig,
    pub bot: BotConfig,
    pub log_format: LogFormat,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
}

#[derive(Clone, Debug)]
pub struct DirectLineConfig {
    pub secret: Option<SecretString>,
    pub base_url: String,
    /// Lets `?debug=true` on the token endpoint echo raw upstream failures.
    pub debug_passthrough: bool,
}

#[derive(Clone, Debug)]
pub struct LanguageConfig {
    pub endpoint: Option<String>,
    pub key: Option<SecretString>,
    pub project: Option<String>,
    pub deployment: String,
    pub api_version: String,
    pub fallback_api_version: String,
}

#[derive(Clone, Debug)]
pub struct BotConfig {
    pub app_id: Option<String>,
    pub app_password: Option<SecretString>,
    pub tenant_id: Option<String>,
    pub app_type: AppType,
    pub openid_metadata_url: String,
    pub login_endpoint: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AppType {
    SingleTenant,
    MultiTenant,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let port = match read("PORT") {
            Some(value) => value.parse::<u16>().map_err(|_| invalid("PORT", &value))?,
            None => 3978,
        };

        let debug_passthrough = match read("TOKEN_DEBUG_PASSTHROUGH") {
            Some(value) => parse_bool("TOKEN_DEBUG_PASSTHROUGH", &value)?,
            None => false,
        };

        let app_type = match read("MicrosoftAppType") {
            Some(value) => match value.to_ascii_lowercase().as_str() {
                "singletenant" => AppType::SingleTenant,
                "multitenant" => AppType::MultiTenant,
                _ => return Err(invalid("MicrosoftAppType", &value)),
            },
            None => AppType::SingleTenant,
        };

        let log_format = match read("LOG_FORMAT") {
            Some(value) => match value.to_ascii_lowercase().as_str() {
                "compact" => LogFormat::Compact,
                "json" => LogFormat::Json,
                _ => return Err(invalid("LOG_FORMAT", &value)),
            },
            None => LogFormat::Compact,
        };

        Ok(Config {
            server: ServerConfig {
                bind_address: read("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0".to_string()),
                port,
            },
            direct_line: DirectLineConfig {
                secret: read("DIRECT_LINE_SECRET").map(SecretString::from),
                base_url: trim_trailing_slashes(
                    read("DIRECT_LINE_BASE_URL")
                        .unwrap_or_else(|| DEFAULT_DIRECT_LINE_BASE_URL.to_string()),
                ),
                debug_passthrough,
            },
            language: LanguageConfig {
                endpoint: read("LANGUAGE_ENDPOINT").map(trim_trailing_slashes),
                key: read("LANGUAGE_KEY").map(SecretString::from),
                project: read("CQA_PROJECT_NAME"),
                deployment: read("CQA_DEPLOYMENT").unwrap_or_else(|| "production".to_string()),
                api_version: read("LANGUAGE_API_VERSION")
                    .unwrap_or_else(|| "2023-04-01".to_string()),
                fallback_api_version: read("LANGUAGE_FALLBACK_API_VERSION")
                    .unwrap_or_else(|| "2021-10-01".to_string()),
            },
            bot: BotConfig {
                app_id: read("MicrosoftAppId"),
                app_password: read("MicrosoftAppPassword").map(SecretString::from),
                tenant_id: read("MicrosoftAppTenantId"),
                app_type,
                openid_metadata_url: read("BOT_OPENID_METADATA_URL")
                    .unwrap_or_else(|| DEFAULT_OPENID_METADATA_URL.to_string()),
                login_endpoint: trim_trailing_slashes(
                    read("BOT_LOGIN_ENDPOINT").unwrap_or_else(|| DEFAULT_LOGIN_ENDPOINT.to_string()),
                ),
            },
            log_format,
        })
    }
}

fn invalid(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue { key: key.to_string(), value: value.to_string() }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(invalid(key, value)),
    }
}

fn trim_trailing_slashes(value: String) -> String {
    value.trim_end_matches('/').to_string()
}
