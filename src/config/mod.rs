use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;

const DEVELOPMENT_JWT_SECRET: &str = "fallback-secret-key-for-development";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub database: DatabaseConfig,
    pub api: ApiConfig,
    pub security: SecurityConfig,
    pub otp: OtpConfig,
    pub sms: SmsConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub max_connections: u32,
    pub connection_timeout: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub port: u16,
    pub enable_request_logging: bool,
    pub max_upload_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    #[serde(skip_serializing)]
    pub jwt_secret: String,
    pub jwt_expiry_hours: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OtpConfig {
    pub code_length: usize,
    pub ttl_secs: i64,
    pub max_attempts: u32,
    /// Country calling code without the leading `+`
    pub country_code: String,
    /// Length of the national significant number (no trunk zero)
    pub national_length: usize,
    /// Message body; `{code}` is replaced with the passcode
    pub message_template: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmsConfig {
    pub account_sid: Option<String>,
    #[serde(skip_serializing)]
    pub auth_token: Option<String>,
    pub from_number: Option<String>,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub access_key: Option<String>,
    #[serde(skip_serializing)]
    pub secret_key: Option<String>,
    pub region: String,
    pub bucket: String,
    pub timeout_secs: u64,
}

impl SmsConfig {
    pub fn has_credentials(&self) -> bool {
        self.account_sid.is_some() && self.auth_token.is_some() && self.from_number.is_some()
    }
}

impl StorageConfig {
    pub fn has_credentials(&self) -> bool {
        self.access_key.is_some() && self.secret_key.is_some()
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        // Set defaults based on environment, then override with specific env vars
        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        // Database overrides
        if let Ok(v) = env::var("DATABASE_URL") {
            self.database.url = Some(v);
        }
        if let Ok(v) = env::var("DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = v.parse().unwrap_or(self.database.max_connections);
        }
        if let Ok(v) = env::var("DATABASE_CONNECTION_TIMEOUT") {
            self.database.connection_timeout = v.parse().unwrap_or(self.database.connection_timeout);
        }

        // API overrides
        if let Some(v) = env::var("API_PORT").ok().or_else(|| env::var("PORT").ok()) {
            self.api.port = v.parse().unwrap_or(self.api.port);
        }
        if let Ok(v) = env::var("API_ENABLE_REQUEST_LOGGING") {
            self.api.enable_request_logging = v.parse().unwrap_or(self.api.enable_request_logging);
        }
        if let Ok(v) = env::var("API_MAX_UPLOAD_BYTES") {
            self.api.max_upload_bytes = v.parse().unwrap_or(self.api.max_upload_bytes);
        }

        // Security overrides
        if let Some(v) = env::var("JWT_SECRET").ok().or_else(|| env::var("SECRET_KEY").ok()) {
            self.security.jwt_secret = v;
        }
        if let Ok(v) = env::var("SECURITY_JWT_EXPIRY_HOURS") {
            self.security.jwt_expiry_hours = v.parse().unwrap_or(self.security.jwt_expiry_hours);
        }

        // OTP overrides
        if let Ok(v) = env::var("OTP_CODE_LENGTH") {
            self.otp.code_length = v.parse().unwrap_or(self.otp.code_length);
        }
        if let Ok(v) = env::var("OTP_TTL_SECS") {
            self.otp.ttl_secs = v.parse().unwrap_or(self.otp.ttl_secs);
        }
        if let Ok(v) = env::var("OTP_MAX_ATTEMPTS") {
            self.otp.max_attempts = v.parse().unwrap_or(self.otp.max_attempts);
        }
        if let Ok(v) = env::var("OTP_COUNTRY_CODE") {
            self.otp.country_code = v.trim_start_matches('+').to_string();
        }
        if let Ok(v) = env::var("OTP_NATIONAL_LENGTH") {
            self.otp.national_length = v.parse().unwrap_or(self.otp.national_length);
        }
        if let Ok(v) = env::var("OTP_MESSAGE_TEMPLATE") {
            self.otp.message_template = v;
        }

        // SMS gateway overrides
        if let Ok(v) = env::var("TWILIO_SID") {
            self.sms.account_sid = Some(v);
        }
        if let Ok(v) = env::var("TWILIO_AUTH_TOKEN") {
            self.sms.auth_token = Some(v);
        }
        if let Ok(v) = env::var("TWILIO_PHONE") {
            self.sms.from_number = Some(v);
        }
        if let Ok(v) = env::var("SMS_TIMEOUT_SECS") {
            self.sms.timeout_secs = v.parse().unwrap_or(self.sms.timeout_secs);
        }

        // Object storage overrides
        if let Ok(v) = env::var("DO_SPACES_ACCESS_KEY") {
            self.storage.access_key = Some(v);
        }
        if let Ok(v) = env::var("DO_SPACES_SECRET_KEY") {
            self.storage.secret_key = Some(v);
        }
        if let Ok(v) = env::var("DO_SPACES_REGION") {
            self.storage.region = v;
        }
        if let Ok(v) = env::var("DO_SPACES_BUCKET") {
            self.storage.bucket = v;
        }
        if let Ok(v) = env::var("STORAGE_TIMEOUT_SECS") {
            self.storage.timeout_secs = v.parse().unwrap_or(self.storage.timeout_secs);
        }

        self
    }

    pub fn development() -> Self {
        Self {
            environment: Environment::Development,
            database: DatabaseConfig {
                url: None,
                max_connections: 10,
                connection_timeout: 30,
            },
            api: ApiConfig {
                port: 8000,
                enable_request_logging: true,
                max_upload_bytes: 10 * 1024 * 1024, // 10MB
            },
            security: SecurityConfig {
                jwt_secret: DEVELOPMENT_JWT_SECRET.to_string(),
                jwt_expiry_hours: 24,
            },
            otp: OtpConfig::default(),
            sms: SmsConfig {
                account_sid: None,
                auth_token: None,
                from_number: None,
                timeout_secs: 10,
            },
            storage: StorageConfig {
                access_key: None,
                secret_key: None,
                region: "sfo3".to_string(),
                bucket: "lessonplanhygienequest".to_string(),
                timeout_secs: 30,
            },
        }
    }

    fn staging() -> Self {
        let mut config = Self::development();
        config.environment = Environment::Staging;
        config.database.max_connections = 20;
        config.database.connection_timeout = 10;
        config.api.max_upload_bytes = 5 * 1024 * 1024; // 5MB
        config.security.jwt_secret = String::new();
        config
    }

    fn production() -> Self {
        let mut config = Self::development();
        config.environment = Environment::Production;
        config.database.max_connections = 50;
        config.database.connection_timeout = 5;
        config.api.enable_request_logging = false;
        config.api.max_upload_bytes = 5 * 1024 * 1024; // 5MB
        config.security.jwt_secret = String::new();
        config
    }

    /// Checks the settings that must be present before the server accepts traffic
    pub fn validate(&self) -> Result<(), String> {
        if self.security.jwt_secret.is_empty() {
            return Err("JWT_SECRET must be set outside development".to_string());
        }
        if self.environment == Environment::Production {
            if !self.storage.has_credentials() {
                return Err("DO_SPACES_ACCESS_KEY and DO_SPACES_SECRET_KEY are required in production".to_string());
            }
            if !self.sms.has_credentials() {
                return Err("TWILIO_SID, TWILIO_AUTH_TOKEN and TWILIO_PHONE are required in production".to_string());
            }
        }
        Ok(())
    }
}

impl Default for OtpConfig {
    fn default() -> Self {
        Self {
            code_length: 6,
            ttl_secs: 300,
            max_attempts: 3,
            country_code: "256".to_string(),
            national_length: 9,
            message_template: "Your verification code is {code}".to_string(),
        }
    }
}

// Global singleton config - initialized once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

// Convenience function for accessing config
pub fn config() -> &'static AppConfig {
    &CONFIG
}
