//! Configuration management for multipurge

use crate::error::{PurgeError, Result};
use crate::models::BackendId;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// Top-level purge configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PurgeConfig {
    /// Backends allowed to run (case-insensitive names)
    #[serde(default)]
    pub enabled_services: Vec<String>,

    /// Order in which backends are dispatched
    #[serde(default = "default_service_order")]
    pub service_order: Vec<String>,

    /// Cloudflare API settings
    #[serde(default)]
    pub cloudflare: CloudflareConfig,

    /// Varnish server settings
    #[serde(default)]
    pub varnish: VarnishConfig,

    /// Hand purges to the deferred queue instead of running them inline
    #[serde(default)]
    pub run_in_queue: bool,

    /// Maximum number of purge requests in flight (default: 8)
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_requests: usize,

    /// Idle pooled connections kept per host (default: 8)
    #[serde(default = "default_max_conns_per_host")]
    pub max_conns_per_host: usize,

    /// Per-request timeout in seconds (default: 10)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Canonical wiki origin used to resolve relative paths
    #[serde(default)]
    pub server: Option<String>,

    /// Paths always offered for manual purges
    #[serde(default)]
    pub static_purges: Vec<String>,

    /// Trigger endpoint configuration (optional)
    #[serde(default)]
    pub endpoint: Option<EndpointConfig>,
}

/// Cloudflare API backend settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CloudflareConfig {
    #[serde(default)]
    pub zone_id: Option<String>,

    /// Bearer token with cache purge permission
    #[serde(default)]
    pub api_token: Option<String>,

    /// Sent as `X-Auth-Key` when present
    #[serde(default)]
    pub account_id: Option<String>,

    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
}

/// Varnish backend settings
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct VarnishConfig {
    /// Bare IPs or full origins such as `http://varnish:6081`
    #[serde(default)]
    pub servers: Vec<String>,

    /// Host header sent with every PURGE
    #[serde(default)]
    pub host: Option<String>,
}

/// Configuration for the HTTP trigger endpoint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EndpointConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Address to bind the endpoint to (default: "127.0.0.1:9091")
    #[serde(default = "default_endpoint_address")]
    pub address: String,
}

impl Default for CloudflareConfig {
    fn default() -> Self {
        Self {
            zone_id: None,
            api_token: None,
            account_id: None,
            api_base_url: default_api_base_url(),
        }
    }
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            address: default_endpoint_address(),
        }
    }
}

// Default value functions for serde
fn default_service_order() -> Vec<String> {
    vec!["cloudflare".to_string(), "varnish".to_string()]
}

fn default_max_concurrent() -> usize {
    8
}

fn default_max_conns_per_host() -> usize {
    8
}

fn default_request_timeout() -> u64 {
    10
}

fn default_api_base_url() -> String {
    "https://api.cloudflare.com/client/v4".to_string()
}

fn default_endpoint_address() -> String {
    "127.0.0.1:9091".to_string()
}

impl Default for PurgeConfig {
    fn default() -> Self {
        PurgeConfig {
            enabled_services: Vec::new(),
            service_order: default_service_order(),
            cloudflare: CloudflareConfig::default(),
            varnish: VarnishConfig::default(),
            run_in_queue: false,
            max_concurrent_requests: default_max_concurrent(),
            max_conns_per_host: default_max_conns_per_host(),
            request_timeout_secs: default_request_timeout(),
            server: None,
            static_purges: Vec::new(),
            endpoint: None,
        }
    }
}

impl PurgeConfig {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            PurgeError::ConfigError(format!("Failed to read config file: {}", e))
        })?;

        Self::from_yaml(&content)
    }

    /// Parse and validate configuration from a YAML string
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: PurgeConfig = serde_yaml::from_str(content).map_err(|e| {
            PurgeError::ConfigError(format!("Failed to parse config file: {}", e))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    ///
    /// # Validation Rules
    /// - max_concurrent_requests must be > 0
    /// - request_timeout_secs must be > 0
    /// - every name in enabled_services and service_order must be a known backend
    /// - the endpoint address must parse as a socket address
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_requests == 0 {
            return Err(PurgeError::ConfigError(
                "max_concurrent_requests must be greater than 0".to_string(),
            ));
        }

        if self.request_timeout_secs == 0 {
            return Err(PurgeError::ConfigError(
                "request_timeout_secs must be greater than 0".to_string(),
            ));
        }

        for name in self.enabled_services.iter().chain(&self.service_order) {
            if let BackendId::Unknown(name) = BackendId::normalize(name) {
                return Err(PurgeError::ConfigError(format!(
                    "Invalid service '{}', must be 'cloudflare' or 'varnish'",
                    name
                )));
            }
        }

        if let Some(endpoint) = &self.endpoint {
            endpoint.socket_addr()?;
        }

        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Update configuration from another config
    ///
    /// The new configuration is validated before anything is applied, so a
    /// bad reload leaves the current settings untouched.
    pub fn update_from(&mut self, new_config: &PurgeConfig) -> Result<ConfigChanges> {
        new_config.validate()?;

        let mut changes = ConfigChanges::default();

        if self.enabled_services != new_config.enabled_services
            || self.service_order != new_config.service_order
        {
            changes.services_changed = true;
            self.enabled_services = new_config.enabled_services.clone();
            self.service_order = new_config.service_order.clone();
        }

        if self.cloudflare != new_config.cloudflare {
            changes.cloudflare_changed = true;
            self.cloudflare = new_config.cloudflare.clone();
        }

        if self.varnish != new_config.varnish {
            changes.varnish_changed = true;
            self.varnish = new_config.varnish.clone();
        }

        if self.run_in_queue != new_config.run_in_queue {
            changes.run_in_queue_changed = true;
            self.run_in_queue = new_config.run_in_queue;
        }

        if self.max_concurrent_requests != new_config.max_concurrent_requests
            || self.max_conns_per_host != new_config.max_conns_per_host
            || self.request_timeout_secs != new_config.request_timeout_secs
        {
            changes.http_client_changed = true;
            self.max_concurrent_requests = new_config.max_concurrent_requests;
            self.max_conns_per_host = new_config.max_conns_per_host;
            self.request_timeout_secs = new_config.request_timeout_secs;
        }

        if self.server != new_config.server || self.static_purges != new_config.static_purges {
            changes.manual_purge_changed = true;
            self.server = new_config.server.clone();
            self.static_purges = new_config.static_purges.clone();
        }

        if self.endpoint != new_config.endpoint {
            changes.endpoint_changed = true;
            self.endpoint = new_config.endpoint.clone();
        }

        Ok(changes)
    }

    /// Reload configuration from file and apply changes
    pub fn reload_from_file<P: AsRef<Path>>(&mut self, path: P) -> Result<ConfigChanges> {
        let new_config = Self::from_file(path)?;
        self.update_from(&new_config)
    }
}

impl EndpointConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        self.address.parse().map_err(|e| {
            PurgeError::ConfigError(format!(
                "Invalid endpoint address '{}': {}",
                self.address, e
            ))
        })
    }
}

/// Description of configuration changes after hot reload
#[derive(Debug, Default, Clone)]
pub struct ConfigChanges {
    pub services_changed: bool,
    pub cloudflare_changed: bool,
    pub varnish_changed: bool,
    pub run_in_queue_changed: bool,
    pub http_client_changed: bool,
    pub manual_purge_changed: bool,
    pub endpoint_changed: bool,
}

impl ConfigChanges {
    /// Check if any changes were made
    pub fn has_changes(&self) -> bool {
        self.services_changed
            || self.cloudflare_changed
            || self.varnish_changed
            || self.run_in_queue_changed
            || self.http_client_changed
            || self.manual_purge_changed
            || self.endpoint_changed
    }

    /// Check if the shared HTTP client must be rebuilt
    pub fn requires_client_rebuild(&self) -> bool {
        self.http_client_changed
    }

    /// Get a summary of changes
    pub fn summary(&self) -> Vec<String> {
        let mut changes = Vec::new();

        if self.services_changed {
            changes.push("services".to_string());
        }
        if self.cloudflare_changed {
            changes.push("cloudflare".to_string());
        }
        if self.varnish_changed {
            changes.push("varnish".to_string());
        }
        if self.run_in_queue_changed {
            changes.push("run_in_queue".to_string());
        }
        if self.http_client_changed {
            changes.push("http_client".to_string());
        }
        if self.manual_purge_changed {
            changes.push("manual_purge".to_string());
        }
        if self.endpoint_changed {
            changes.push("endpoint".to_string());
        }

        changes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PurgeConfig::default();
        assert!(config.enabled_services.is_empty());
        assert_eq!(config.service_order, vec!["cloudflare", "varnish"]);
        assert_eq!(config.max_concurrent_requests, 8);
        assert_eq!(config.max_conns_per_host, 8);
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
        assert_eq!(
            config.cloudflare.api_base_url,
            "https://api.cloudflare.com/client/v4"
        );
        assert!(!config.run_in_queue);
    }

    #[test]
    fn test_validate_valid_config() {
        let config = PurgeConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_zero_concurrent() {
        let mut config = PurgeConfig::default();
        config.max_concurrent_requests = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_zero_timeout() {
        let mut config = PurgeConfig::default();
        config.request_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_unknown_service() {
        let mut config = PurgeConfig::default();
        config.enabled_services = vec!["Varnish".to_string(), "akamai".to_string()];
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("akamai"));
    }

    #[test]
    fn test_validate_bad_endpoint_address() {
        let mut config = PurgeConfig::default();
        config.endpoint = Some(EndpointConfig {
            enabled: true,
            address: "not-an-address".to_string(),
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_yaml() {
        let yaml = r#"
enabled_services: [Cloudflare, Varnish]
service_order: [varnish, cloudflare]
cloudflare:
  zone_id: zone
  api_token: token
varnish:
  servers: ["10.0.0.1", "http://varnish:6081"]
  host: wiki.example.org
run_in_queue: true
"#;
        let config = PurgeConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.enabled_services.len(), 2);
        assert_eq!(config.cloudflare.zone_id.as_deref(), Some("zone"));
        assert_eq!(config.varnish.servers.len(), 2);
        assert_eq!(config.varnish.host.as_deref(), Some("wiki.example.org"));
        assert!(config.run_in_queue);
        // Defaults are applied
        assert_eq!(config.max_concurrent_requests, 8);
    }

    #[test]
    fn test_config_hot_reload() {
        let mut config = PurgeConfig::default();
        let mut new_config = PurgeConfig::default();

        let changes = config.update_from(&new_config).unwrap();
        assert!(!changes.has_changes());

        new_config.varnish.servers = vec!["10.0.0.2".to_string()];
        let changes = config.update_from(&new_config).unwrap();
        assert!(changes.varnish_changed);
        assert!(!changes.requires_client_rebuild());
        assert_eq!(config.varnish.servers, vec!["10.0.0.2"]);

        new_config.max_concurrent_requests = 16;
        let changes = config.update_from(&new_config).unwrap();
        assert!(changes.requires_client_rebuild());
        assert_eq!(changes.summary(), vec!["http_client"]);
    }

    #[test]
    fn test_config_hot_reload_validation() {
        let mut config = PurgeConfig::default();
        let mut new_config = PurgeConfig::default();

        new_config.max_concurrent_requests = 0;
        assert!(config.update_from(&new_config).is_err());
        assert_eq!(config.max_concurrent_requests, 8);
    }
}
