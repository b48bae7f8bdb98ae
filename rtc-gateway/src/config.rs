use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// One external UDP endpoint the proxy multiplexes every session over.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExternalConfig {
    pub host: String,
    pub port: u16,
}

/// Paths to a PEM certificate/key pair; when absent the gateway generates a
/// fresh self-signed ECDSA P-256 identity at startup (see `cert.rs`).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DtlsFilesConfig {
    #[serde(default)]
    pub cert: Option<String>,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub ca_file: Option<String>,
    #[serde(default)]
    pub ca_path: Option<String>,
}

/// Cookie key pool: `quantity` keys of `length` bytes, rotated every
/// `lifetime_usecs` microseconds. `length` MUST NOT exceed
/// `DTLS1_COOKIE_LENGTH` (20 bytes, RFC 6347 §4.2.1).
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct DtlsKeyPoolConfig {
    pub quantity: usize,
    pub length: usize,
    pub lifetime_usecs: u64,
}

impl Default for DtlsKeyPoolConfig {
    fn default() -> Self {
        DtlsKeyPoolConfig {
            quantity: 10,
            length: 20,
            lifetime_usecs: 300_000_000,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct LimitsConfig {
    pub transaction_lifetime_usecs: u64,
    pub connectivity_pace_usecs: u64,
    pub session_timeout_usecs: u64,
    pub keepalive_usecs: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        LimitsConfig {
            transaction_lifetime_usecs: 300_000_000,
            connectivity_pace_usecs: 50_000,
            session_timeout_usecs: 300_000_000,
            keepalive_usecs: 15_000_000,
        }
    }
}

impl LimitsConfig {
    pub fn connectivity_pace(&self) -> Duration {
        Duration::from_micros(self.connectivity_pace_usecs)
    }

    pub fn session_timeout(&self) -> Duration {
        Duration::from_micros(self.session_timeout_usecs)
    }

    pub fn transaction_lifetime(&self) -> Duration {
        Duration::from_micros(self.transaction_lifetime_usecs)
    }
}

/// Every configuration value the gateway needs, constructed in-process by
/// the caller (loading it from a file is out of scope here).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub external: ExternalConfig,
    #[serde(default)]
    pub dtls: DtlsFilesConfig,
    /// `SRTP_AES128_CM_SHA1_80:SRTP_AES128_CM_SHA1_32`-style colon-joined
    /// profile name list, most-preferred first.
    #[serde(default = "default_srtp_profiles")]
    pub srtp_profiles: String,
    #[serde(default)]
    pub dtls_key_pool: DtlsKeyPoolConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
}

fn default_srtp_profiles() -> String {
    "SRTP_AES128_CM_SHA1_80:SRTP_AES128_CM_SHA1_32".to_string()
}

impl GatewayConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        GatewayConfig {
            external: ExternalConfig { host: host.into(), port },
            dtls: DtlsFilesConfig::default(),
            srtp_profiles: default_srtp_profiles(),
            dtls_key_pool: DtlsKeyPoolConfig::default(),
            limits: LimitsConfig::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.external.host.parse::<std::net::IpAddr>().is_err() {
            return Err(Error::ConfigInvalid(format!("external host {} is not an IP address", self.external.host)));
        }
        if self.dtls_key_pool.length > 20 {
            return Err(Error::ConfigInvalid(format!(
                "dtls_key_pool.length {} exceeds DTLS1_COOKIE_LENGTH (20)",
                self.dtls_key_pool.length
            )));
        }
        if self.dtls_key_pool.quantity == 0 {
            return Err(Error::ConfigInvalid("dtls_key_pool.quantity must be > 0".to_string()));
        }
        if self.srtp_profiles_parsed().is_empty() {
            return Err(Error::ConfigInvalid("srtp_profiles must name at least one supported profile".to_string()));
        }
        Ok(())
    }

    pub fn external_addr(&self) -> Result<std::net::SocketAddr> {
        format!("{}:{}", self.external.host, self.external.port)
            .parse()
            .map_err(|_| Error::ConfigInvalid("external host/port do not form a socket address".to_string()))
    }

    pub fn srtp_profiles_parsed(&self) -> Vec<dtls::SrtpProfile> {
        self.srtp_profiles
            .split(':')
            .filter_map(|name| match name.trim() {
                "SRTP_AES128_CM_SHA1_80" => Some(dtls::SrtpProfile::Aes128CmSha1_80),
                "SRTP_AES128_CM_SHA1_32" => Some(dtls::SrtpProfile::Aes128CmSha1_32),
                "SRTP_AEAD_AES_128_GCM" => Some(dtls::SrtpProfile::AeadAes128Gcm),
                "SRTP_AEAD_AES_256_GCM" => Some(dtls::SrtpProfile::AeadAes256Gcm),
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        let cfg = GatewayConfig::new("127.0.0.1", 40000);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn rejects_oversized_cookie_length() {
        let mut cfg = GatewayConfig::new("127.0.0.1", 40000);
        cfg.dtls_key_pool.length = 64;
        assert!(matches!(cfg.validate(), Err(Error::ConfigInvalid(_))));
    }

    #[test]
    fn rejects_non_ip_host() {
        let cfg = GatewayConfig::new("not-an-ip", 40000);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn parses_profile_list_in_order() {
        let cfg = GatewayConfig::new("127.0.0.1", 40000);
        let profiles = cfg.srtp_profiles_parsed();
        assert_eq!(profiles, vec![dtls::SrtpProfile::Aes128CmSha1_80, dtls::SrtpProfile::Aes128CmSha1_32]);
    }
}
