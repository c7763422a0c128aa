use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default = "default_schemes")]
    pub schemes: Vec<SchemeConfig>,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    5000
}

/// Admin route authentication.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    pub method: AuthMethod,
    /// Required when `method = "api_key"`.
    #[serde(default)]
    pub api_key: Option<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            method: AuthMethod::None,
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    None,
    ApiKey,
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("ticketline.db")
}

/// Payment gateway configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GatewayConfig {
    pub backend: GatewayBackend,
    /// Public key id handed to the buyer widget.
    pub key_id: String,
    /// Shared secret used for order creation and callback signatures.
    pub key_secret: String,
    #[serde(default = "default_gateway_url")]
    pub base_url: String,
    #[serde(default = "default_currency")]
    pub currency: String,
    /// Order creation timeout in seconds.
    #[serde(default = "default_gateway_timeout")]
    pub timeout_secs: u32,
}

/// Available payment gateways
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GatewayBackend {
    Razorpay,
    /// Orders are minted locally; useful for staging and tests.
    Mock,
}

fn default_gateway_url() -> String {
    "https://api.razorpay.com/v1".to_string()
}

fn default_currency() -> String {
    "INR".to_string()
}

fn default_gateway_timeout() -> u32 {
    15
}

/// Reservation ledger tuning
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LedgerConfig {
    /// How long an unpaid claim holds its number.
    #[serde(default = "default_claim_ttl")]
    pub claim_ttl_secs: u64,
    /// How often the expiry sweep runs (milliseconds).
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_ms: u64,
}

fn default_claim_ttl() -> u64 {
    900
}

fn default_sweep_interval() -> u64 {
    10_000
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            claim_ttl_secs: default_claim_ttl(),
            sweep_interval_ms: default_sweep_interval(),
        }
    }
}

/// One sales scheme ("skim").
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct SchemeConfig {
    pub id: u32,
    pub name: String,
    /// First ticket number in the pool.
    pub start: u32,
    /// Number of tickets in the pool.
    pub count: u32,
    /// Price per ticket in major currency units.
    pub ticket_price: u32,
    /// Label prefix, e.g. "AB" for `AB10001A`.
    pub prefix: String,
    /// Label suffix, e.g. "A" for `AB10001A`.
    pub suffix: String,
}

impl SchemeConfig {
    fn standard(id: u32, name: &str, ticket_price: u32, prefix: &str, suffix: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            start: (id - 1) * 10_000 + 10_001,
            count: 10_000,
            ticket_price,
            prefix: prefix.to_string(),
            suffix: suffix.to_string(),
        }
    }
}

fn default_schemes() -> Vec<SchemeConfig> {
    vec![
        SchemeConfig::standard(1, "Golden Chance", 50, "AB", "A"),
        SchemeConfig::standard(2, "Silver Luck", 100, "CD", "B"),
        SchemeConfig::standard(3, "Mega Blast", 200, "EF", "C"),
        SchemeConfig::standard(4, "Platinum Dream", 500, "GH", "D"),
    ]
}

/// Sanitized config for API responses (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub auth: SanitizedAuthConfig,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub gateway: SanitizedGatewayConfig,
    pub ledger: LedgerConfig,
    pub schemes: Vec<SchemeConfig>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedAuthConfig {
    pub method: AuthMethod,
    pub api_key_configured: bool,
}

/// Gateway config with the secret hidden
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedGatewayConfig {
    pub backend: GatewayBackend,
    pub key_id: String,
    pub key_secret_configured: bool,
    pub base_url: String,
    pub currency: String,
    pub timeout_secs: u32,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            auth: SanitizedAuthConfig {
                method: config.auth.method,
                api_key_configured: config
                    .auth
                    .api_key
                    .as_ref()
                    .is_some_and(|k| !k.is_empty()),
            },
            server: config.server.clone(),
            database: config.database.clone(),
            gateway: SanitizedGatewayConfig {
                backend: config.gateway.backend,
                key_id: config.gateway.key_id.clone(),
                key_secret_configured: !config.gateway.key_secret.is_empty(),
                base_url: config.gateway.base_url.clone(),
                currency: config.gateway.currency.clone(),
                timeout_secs: config.gateway.timeout_secs,
            },
            ledger: config.ledger.clone(),
            schemes: config.schemes.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[gateway]
backend = "mock"
key_id = "rzp_test_key"
key_secret = "shh"
"#;

    #[test]
    fn test_deserialize_minimal_config() {
        let config: Config = toml::from_str(MINIMAL).unwrap();
        assert_eq!(config.gateway.backend, GatewayBackend::Mock);
        assert_eq!(config.gateway.currency, "INR");
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.server.host.to_string(), "0.0.0.0");
        assert_eq!(config.auth.method, AuthMethod::None);
        assert_eq!(config.ledger.claim_ttl_secs, 900);
    }

    #[test]
    fn test_default_schemes_match_standard_pools() {
        let config: Config = toml::from_str(MINIMAL).unwrap();
        assert_eq!(config.schemes.len(), 4);

        let first = &config.schemes[0];
        assert_eq!(first.start, 10_001);
        assert_eq!(first.count, 10_000);
        assert_eq!(first.ticket_price, 50);

        let fourth = &config.schemes[3];
        assert_eq!(fourth.start, 40_001);
        assert_eq!(fourth.prefix, "GH");
        assert_eq!(fourth.suffix, "D");
    }

    #[test]
    fn test_deserialize_custom_schemes() {
        let toml = r#"
[gateway]
backend = "razorpay"
key_id = "rzp_live"
key_secret = "secret"

[[schemes]]
id = 7
name = "Diwali"
start = 1
count = 1000
ticket_price = 20
prefix = "DW"
suffix = ""
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.schemes.len(), 1);
        assert_eq!(config.schemes[0].id, 7);
        assert_eq!(config.schemes[0].count, 1000);
    }

    #[test]
    fn test_missing_gateway_fails() {
        let toml = r#"
[server]
port = 8080
"#;
        let result: Result<Config, _> = toml::from_str(toml);
        assert!(result.is_err());
    }

    #[test]
    fn test_sanitized_config_hides_secrets() {
        let mut config: Config = toml::from_str(MINIMAL).unwrap();
        config.auth = AuthConfig {
            method: AuthMethod::ApiKey,
            api_key: Some("admin-key".to_string()),
        };

        let sanitized = SanitizedConfig::from(&config);
        assert!(sanitized.gateway.key_secret_configured);
        assert!(sanitized.auth.api_key_configured);

        let json = serde_json::to_string(&sanitized).unwrap();
        assert!(!json.contains("shh"));
        assert!(!json.contains("admin-key"));
    }
}
