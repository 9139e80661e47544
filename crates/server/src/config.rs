use crate::credentials::HashParams;
use serde::Deserialize;
use std::net::IpAddr;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration build error: {0}")]
    Build(#[from] config::ConfigError),
    #[error("Invalid configuration: {0}")]
    Validation(String),
}

#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    /// Shared cache for tokens, codes and client metadata. When unset an
    /// in-process cache is used, which only works for a single instance.
    #[serde(default)]
    pub redis_url: Option<String>,
    /// Public host of this server. Used as the issuer of identity tokens.
    pub host: String,
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    pub identity: IdentityConfig,
    #[serde(default)]
    pub tokens: TokenConfig,
    #[serde(default)]
    pub oauth2: OAuth2Config,
    #[serde(default)]
    pub fetcher: FetcherConfig,
    #[serde(default)]
    pub credentials: HashParams,
    #[serde(default)]
    pub cookies: CookieConfig,
}

/// RSA key material used to sign identity tokens, PEM encoded.
#[derive(Clone, Deserialize)]
pub struct IdentityConfig {
    pub public_key_pem: String,
    pub private_key_pem: String,
}

impl std::fmt::Debug for IdentityConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityConfig")
            .field("public_key_pem", &self.public_key_pem)
            .field("private_key_pem", &"<redacted>")
            .finish()
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct TokenConfig {
    /// Access token lifetime in seconds
    #[serde(default = "default_access_token_lifetime")]
    pub access_token_lifetime: u64,
    /// Refresh token lifetime in seconds
    #[serde(default = "default_refresh_token_lifetime")]
    pub refresh_token_lifetime: u64,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            access_token_lifetime: default_access_token_lifetime(),
            refresh_token_lifetime: default_refresh_token_lifetime(),
        }
    }
}

impl TokenConfig {
    pub fn access_ttl(&self) -> Duration {
        Duration::from_secs(self.access_token_lifetime)
    }

    pub fn refresh_ttl(&self) -> Duration {
        Duration::from_secs(self.refresh_token_lifetime)
    }
}

/// What happens when a client's logo cannot be fetched and cached.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogoCachePolicy {
    /// Log and continue without a cached logo.
    #[default]
    BestEffort,
    /// Fail metadata resolution.
    Required,
}

#[derive(Clone, Debug, Deserialize)]
pub struct OAuth2Config {
    /// Authorization code lifetime in seconds
    #[serde(default = "default_code_lifetime")]
    pub code_lifetime: u64,
    #[serde(default = "default_client_metadata_cache_ttl")]
    pub client_metadata_cache_ttl: u64,
    #[serde(default)]
    pub logo_cache_policy: LogoCachePolicy,
    /// Accept `http://localhost` as a client id for local development.
    #[serde(default = "default_true")]
    pub allow_localhost_client: bool,
}

impl Default for OAuth2Config {
    fn default() -> Self {
        Self {
            code_lifetime: default_code_lifetime(),
            client_metadata_cache_ttl: default_client_metadata_cache_ttl(),
            logo_cache_policy: LogoCachePolicy::default(),
            allow_localhost_client: true,
        }
    }
}

impl OAuth2Config {
    pub fn code_ttl(&self) -> Duration {
        Duration::from_secs(self.code_lifetime)
    }

    pub fn metadata_ttl(&self) -> Duration {
        Duration::from_secs(self.client_metadata_cache_ttl)
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct FetcherConfig {
    #[serde(default = "default_fetch_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_metadata_max_bytes")]
    pub metadata_max_bytes: usize,
    #[serde(default = "default_logo_max_bytes")]
    pub logo_max_bytes: usize,
    /// Skip the public address check. Development and tests only.
    #[serde(default)]
    pub allow_private_networks: bool,
    /// Extra networks to refuse on top of the built-in non-public ranges.
    #[serde(default)]
    pub denied_nets: Vec<IpNet>,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_fetch_timeout_secs(),
            metadata_max_bytes: default_metadata_max_bytes(),
            logo_max_bytes: default_logo_max_bytes(),
            allow_private_networks: false,
            denied_nets: Vec::new(),
            user_agent: default_user_agent(),
        }
    }
}

impl FetcherConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct CookieConfig {
    /// Mark session cookies `Secure`. Only disable for plain-http development.
    #[serde(default = "default_true")]
    pub secure: bool,
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self { secure: true }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(try_from = "String")]
pub struct IpNet {
    pub addr: IpAddr,
    pub prefix: u8,
}

impl IpNet {
    pub fn contains(&self, ip: &IpAddr) -> bool {
        match (self.addr, ip) {
            (IpAddr::V4(a), IpAddr::V4(b)) => {
                let mask = if self.prefix == 0 {
                    0
                } else {
                    u32::MAX << (32 - self.prefix as u32)
                };
                (u32::from(a) & mask) == (u32::from(*b) & mask)
            }
            (IpAddr::V6(a), IpAddr::V6(b)) => {
                let a_bytes = a.octets();
                let b_bytes = b.octets();
                let full_bytes = (self.prefix / 8) as usize;
                let rem_bits = self.prefix % 8;
                if full_bytes > 16 {
                    return false;
                }
                if a_bytes[..full_bytes] != b_bytes[..full_bytes] {
                    return false;
                }
                if rem_bits == 0 {
                    return true;
                }
                let mask = (!0u8) << (8 - rem_bits);
                (a_bytes[full_bytes] & mask) == (b_bytes[full_bytes] & mask)
            }
            _ => false,
        }
    }
}

impl FromStr for IpNet {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (ip_part, prefix_part) = s
            .split_once('/')
            .ok_or_else(|| "CIDR must contain '/'".to_string())?;
        let addr = IpAddr::from_str(ip_part).map_err(|e| format!("Invalid IP: {e}"))?;
        let prefix: u8 = prefix_part
            .parse()
            .map_err(|e| format!("Invalid prefix: {e}"))?;
        let max = match addr {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        };
        if prefix as u32 > max {
            return Err("Prefix out of range".into());
        }
        Ok(IpNet { addr, prefix })
    }
}

impl TryFrom<String> for IpNet {
    type Error = String;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_access_token_lifetime() -> u64 {
    24 * 60 * 60
}

fn default_refresh_token_lifetime() -> u64 {
    90 * 24 * 60 * 60
}

fn default_code_lifetime() -> u64 {
    5 * 60
}

fn default_client_metadata_cache_ttl() -> u64 {
    60 * 60
}

fn default_fetch_timeout_secs() -> u64 {
    10
}

fn default_metadata_max_bytes() -> usize {
    5 * 1024
}

fn default_logo_max_bytes() -> usize {
    256 * 1024
}

fn default_user_agent() -> String {
    concat!("chat-trust-core/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_true() -> bool {
    true
}

impl AppConfig {
    /// Checks cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::Validation("host must not be empty".into()));
        }
        if self.host.contains("://") || self.host.contains('/') {
            return Err(ConfigError::Validation(
                "host must be a bare host name without scheme or path".into(),
            ));
        }
        if self.identity.public_key_pem.trim().is_empty()
            || self.identity.private_key_pem.trim().is_empty()
        {
            return Err(ConfigError::Validation(
                "identity.public_key_pem and identity.private_key_pem are required".into(),
            ));
        }
        if self.tokens.access_token_lifetime == 0 || self.tokens.refresh_token_lifetime == 0 {
            return Err(ConfigError::Validation(
                "token lifetimes must be > 0".into(),
            ));
        }
        if self.tokens.refresh_token_lifetime < self.tokens.access_token_lifetime {
            return Err(ConfigError::Validation(
                "tokens.refresh_token_lifetime must not be shorter than the access token lifetime"
                    .into(),
            ));
        }
        if self.oauth2.code_lifetime == 0
            || self.oauth2.code_lifetime >= self.tokens.access_token_lifetime
        {
            return Err(ConfigError::Validation(
                "oauth2.code_lifetime must be > 0 and shorter than the access token lifetime"
                    .into(),
            ));
        }
        if self.fetcher.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "fetcher.timeout_secs must be > 0".into(),
            ));
        }
        if self.fetcher.metadata_max_bytes == 0 || self.fetcher.logo_max_bytes == 0 {
            return Err(ConfigError::Validation(
                "fetcher body limits must be > 0".into(),
            ));
        }
        self.credentials
            .check()
            .map_err(|e| ConfigError::Validation(format!("credentials: {e}")))?;
        Ok(())
    }
}

/// Load application configuration from `config.yaml` + environment overrides.
///
/// Any environment variable matching the key path separated by double
/// underscores (e.g. `OAUTH2__CODE_LIFETIME`) overrides the file value.
/// The file is optional so a fully environment-driven deployment works too.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    use config::{Config, Environment, File};
    let cfg = Config::builder()
        .add_source(File::with_name("config.yaml").required(false))
        .add_source(Environment::default().separator("__"))
        .build()?;

    let app: AppConfig = cfg.try_deserialize()?;
    app.validate()?;
    Ok(app)
}

/// Convenience helper for binaries wanting panic-on-error behaviour.
pub fn load_config_or_panic() -> AppConfig {
    match load_config() {
        Ok(c) => c,
        Err(e) => panic!("Failed to load configuration: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    #[test]
    fn ipv4_basic_matching() {
        let net: IpNet = "192.168.1.0/24".parse().unwrap();
        assert!(net.contains(&IpAddr::V4(Ipv4Addr::new(192, 168, 1, 42))));
        assert!(!net.contains(&IpAddr::V4(Ipv4Addr::new(192, 168, 2, 1))));
    }

    #[test]
    fn ipv6_prefix_seven() {
        let net: IpNet = "fc00::/7".parse().unwrap();
        assert!(net.contains(&IpAddr::V6("fd12:3456::1".parse::<Ipv6Addr>().unwrap())));
        assert!(!net.contains(&IpAddr::V6("fe80::1".parse::<Ipv6Addr>().unwrap())));
    }

    #[test]
    fn parse_rejects_bad_prefix() {
        assert!("192.168.0.0/33".parse::<IpNet>().is_err());
        assert!("2001:db8::/129".parse::<IpNet>().is_err());
        assert!("10.0.0.1".parse::<IpNet>().is_err());
    }

    #[test]
    fn ipnet_deserializes_from_string() {
        let nets: Vec<IpNet> = serde_json::from_str(r#"["10.0.0.0/8", "::1/128"]"#).unwrap();
        assert_eq!(nets.len(), 2);
        assert_eq!(nets[0].prefix, 8);
        assert!(serde_json::from_str::<Vec<IpNet>>(r#"["nope"]"#).is_err());
    }

    #[test]
    fn logo_policy_defaults_to_best_effort() {
        assert_eq!(OAuth2Config::default().logo_cache_policy, LogoCachePolicy::BestEffort);
        let p: LogoCachePolicy = serde_json::from_str(r#""required""#).unwrap();
        assert_eq!(p, LogoCachePolicy::Required);
    }
}
