use crate::config::{AddressFamilyConfig, DnsResolveMethodConfig, LogFormat, LogSpanEvents};
use anyhow::Context;
use hopwatch_core::defaults;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

const DEFAULT_CONFIG_FILE: &str = "hopwatch.toml";

/// Read `hopwatch.toml` from the current directory.
///
/// Returns the parsed `Some(ConfigFile)` if the config file exists, `None` otherwise.
pub fn read_default_config_file() -> anyhow::Result<Option<ConfigFile>> {
    let path = Path::new(DEFAULT_CONFIG_FILE);
    if path.exists() {
        Ok(Some(read_config_file(path)?))
    } else {
        Ok(None)
    }
}

/// Read the config from the given path.
pub fn read_config_file<P: AsRef<Path>>(path: P) -> anyhow::Result<ConfigFile> {
    let data = fs::read_to_string(path.as_ref())
        .with_context(|| format!("config file not found: {}", path.as_ref().display()))?;
    toml::from_str(&data)
        .with_context(|| format!("invalid config file: {}", path.as_ref().display()))
}

#[derive(Debug, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ConfigFile {
    pub log: Option<ConfigLog>,
    pub dns: Option<ConfigDns>,
    pub trace: Option<ConfigTrace>,
    pub ping: Option<ConfigPing>,
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            log: Some(ConfigLog::default()),
            dns: Some(ConfigDns::default()),
            trace: Some(ConfigTrace::default()),
            ping: Some(ConfigPing::default()),
        }
    }
}

#[derive(Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ConfigLog {
    pub log_format: Option<LogFormat>,
    pub log_filter: Option<String>,
    pub log_span_events: Option<LogSpanEvents>,
}

impl Default for ConfigLog {
    fn default() -> Self {
        Self {
            log_format: Some(super::constants::DEFAULT_LOG_FORMAT),
            log_filter: Some(String::from(super::constants::DEFAULT_LOG_FILTER)),
            log_span_events: Some(super::constants::DEFAULT_LOG_SPAN_EVENTS),
        }
    }
}

#[derive(Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ConfigDns {
    pub dns_resolve_method: Option<DnsResolveMethodConfig>,
    pub addr_family: Option<AddressFamilyConfig>,
    #[serde(default)]
    #[serde(deserialize_with = "humantime_deser")]
    pub dns_timeout: Option<Duration>,
    #[serde(default)]
    #[serde(deserialize_with = "humantime_deser")]
    pub dns_resolved_ttl: Option<Duration>,
    #[serde(default)]
    #[serde(deserialize_with = "humantime_deser")]
    pub dns_unresolved_ttl: Option<Duration>,
    pub dns_max_concurrent: Option<usize>,
    pub dns_skip_private: Option<bool>,
}

impl Default for ConfigDns {
    fn default() -> Self {
        Self {
            dns_resolve_method: Some(super::constants::DEFAULT_DNS_RESOLVE_METHOD),
            addr_family: Some(super::constants::DEFAULT_ADDR_FAMILY),
            dns_timeout: Some(hopwatch_dns::defaults::DEFAULT_TIMEOUT),
            dns_resolved_ttl: Some(hopwatch_dns::defaults::DEFAULT_RESOLVED_TTL),
            dns_unresolved_ttl: Some(hopwatch_dns::defaults::DEFAULT_UNRESOLVED_TTL),
            dns_max_concurrent: Some(hopwatch_dns::defaults::DEFAULT_MAX_CONCURRENT),
            dns_skip_private: Some(super::constants::DEFAULT_DNS_SKIP_PRIVATE),
        }
    }
}

#[derive(Debug, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ConfigTrace {
    pub max_ttl: Option<u8>,
    #[serde(default)]
    #[serde(deserialize_with = "humantime_deser")]
    pub timeout: Option<Duration>,
    #[serde(default)]
    #[serde(deserialize_with = "humantime_deser")]
    pub base_delay: Option<Duration>,
    #[serde(default)]
    #[serde(deserialize_with = "humantime_deser")]
    pub min_delay: Option<Duration>,
    #[serde(default)]
    #[serde(deserialize_with = "humantime_deser")]
    pub max_delay: Option<Duration>,
    pub high_loss_threshold: Option<f64>,
    pub low_loss_threshold: Option<f64>,
    pub payload_size: Option<u16>,
    pub parallel_requests: Option<u8>,
    pub max_samples: Option<usize>,
    pub dont_fragment: Option<bool>,
    pub rounds: Option<usize>,
}

impl Default for ConfigTrace {
    fn default() -> Self {
        Self {
            max_ttl: Some(defaults::DEFAULT_MAX_TTL),
            timeout: Some(defaults::DEFAULT_PROBE_TIMEOUT),
            base_delay: Some(defaults::DEFAULT_BASE_DELAY),
            min_delay: Some(defaults::DEFAULT_MIN_DELAY),
            max_delay: None,
            high_loss_threshold: Some(defaults::DEFAULT_HIGH_LOSS_THRESHOLD),
            low_loss_threshold: Some(defaults::DEFAULT_LOW_LOSS_THRESHOLD),
            payload_size: Some(defaults::DEFAULT_PAYLOAD_SIZE),
            parallel_requests: Some(defaults::DEFAULT_PARALLEL_REQUESTS),
            max_samples: Some(defaults::DEFAULT_MAX_SAMPLES),
            dont_fragment: Some(defaults::DEFAULT_DONT_FRAGMENT),
            rounds: None,
        }
    }
}

#[derive(Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ConfigPing {
    pub count: Option<usize>,
    #[serde(default)]
    #[serde(deserialize_with = "humantime_deser")]
    pub timeout: Option<Duration>,
    pub payload_size: Option<u16>,
    pub dont_fragment: Option<bool>,
}

impl Default for ConfigPing {
    fn default() -> Self {
        Self {
            count: Some(defaults::DEFAULT_PING_COUNT),
            timeout: Some(defaults::DEFAULT_PROBE_TIMEOUT),
            payload_size: Some(defaults::DEFAULT_PAYLOAD_SIZE),
            dont_fragment: Some(defaults::DEFAULT_DONT_FRAGMENT),
        }
    }
}

fn humantime_deser<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    humantime::parse_duration(&String::deserialize(deserializer)?)
        .map_err(serde::de::Error::custom)
        .map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config_sample() {
        let config: ConfigFile =
            toml::from_str(include_str!("../../hopwatch-config-sample.toml")).unwrap();
        pretty_assertions::assert_eq!(ConfigFile::default(), config);
    }

    #[test]
    fn test_parse_partial_config() {
        let config: ConfigFile = toml::from_str(
            r#"
            [trace]
            max-ttl = 30
            base-delay = "2s"
            "#,
        )
        .unwrap();
        let trace = config.trace.unwrap();
        assert_eq!(Some(30), trace.max_ttl);
        assert_eq!(Some(Duration::from_secs(2)), trace.base_delay);
        assert_eq!(None, trace.timeout);
        assert_eq!(None, config.dns);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let config = toml::from_str::<ConfigFile>("[trace]\nmax-hops = 30\n");
        assert!(config.is_err());
    }

    #[test]
    fn test_invalid_duration_rejected() {
        let config = toml::from_str::<ConfigFile>("[ping]\ntimeout = \"soon\"\n");
        assert!(config.is_err());
    }
}
