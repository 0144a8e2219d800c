//! monika.yml parser.
//!
//! The document is first deserialized into the `*File` structs, which
//! mirror the YAML with every field optional, and then resolved into
//! the immutable [`Config`] snapshot with defaults filled in.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ConfigError, ConfigResult};
use crate::types::*;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub probes: Vec<ProbeFile>,
    pub notifications: Vec<NotificationFile>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeFile {
    pub id: Option<String>,
    pub name: Option<String>,
    /// Seconds between cycles.
    pub interval: Option<u64>,
    pub requests: Vec<RequestFile>,
    pub ping: Option<PingFile>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PingFile {
    pub uri: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestFile {
    pub url: Option<String>,
    pub method: Option<String>,
    /// Milliseconds.
    pub timeout: Option<u64>,
    pub recovery_threshold: Option<u32>,
    pub incident_threshold: Option<u32>,
    pub alerts: Vec<AlertFile>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertFile {
    pub query: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationFile {
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    pub data: NotificationDataFile,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationDataFile {
    // discord
    pub url: Option<String>,

    // smtp
    pub recipients: Vec<String>,
    pub hostname: Option<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// An immutable, fully defaulted configuration snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    pub probes: Vec<Probe>,
    pub notifications: Vec<NotificationChannel>,
}

impl Config {
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(content: &str) -> ConfigResult<Self> {
        // An empty document deserializes to `()`, not to an empty mapping.
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let file: ConfigFile = serde_yaml::from_str(content)?;
        Self::resolve(file)
    }

    /// Apply defaults and validate a parsed document.
    pub fn resolve(file: ConfigFile) -> ConfigResult<Self> {
        let probes = file
            .probes
            .into_iter()
            .enumerate()
            .map(|(index, probe)| resolve_probe(index, probe))
            .collect::<ConfigResult<Vec<_>>>()?;

        let mut seen = HashSet::new();
        for probe in &probes {
            if !seen.insert(probe.id.as_str()) {
                return Err(ConfigError::DuplicateProbeId {
                    probe_id: probe.id.clone(),
                });
            }
        }

        let notifications = file
            .notifications
            .into_iter()
            .enumerate()
            .map(|(index, n)| resolve_notification(index, n))
            .collect();

        let config = Self {
            probes,
            notifications,
        };
        debug!(
            probes = config.probes.len(),
            notifications = config.notifications.len(),
            "configuration resolved"
        );
        Ok(config)
    }
}

fn resolve_probe(index: usize, probe: ProbeFile) -> ConfigResult<Probe> {
    let id = non_empty(probe.id).unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let name = non_empty(probe.name).unwrap_or_else(|| format!("Probe {}", index + 1));
    let interval = match probe.interval {
        Some(secs) if secs > 0 => Duration::from_secs(secs),
        _ => DEFAULT_INTERVAL,
    };

    let ping_target = probe.ping.and_then(|p| non_empty(p.uri));
    let kind = match ping_target {
        Some(target) => ProbeKind::Icmp { target },
        None => {
            if probe.requests.is_empty() {
                return Err(ConfigError::NoRequests { probe_id: id });
            }
            let requests = probe
                .requests
                .into_iter()
                .map(|r| resolve_request(&id, r))
                .collect::<ConfigResult<Vec<_>>>()?;
            ProbeKind::Http { requests }
        }
    };

    Ok(Probe {
        id,
        name,
        interval,
        kind,
    })
}

fn resolve_request(probe_id: &str, request: RequestFile) -> ConfigResult<Request> {
    let url = non_empty(request.url).ok_or_else(|| ConfigError::MissingUrl {
        probe_id: probe_id.to_string(),
    })?;

    let alerts = if request.alerts.is_empty() {
        Alert::default_set()
    } else {
        request
            .alerts
            .into_iter()
            .map(|a| Alert::new(a.query, a.message))
            .collect()
    };

    Ok(Request {
        url,
        method: non_empty(request.method).unwrap_or_else(|| DEFAULT_METHOD.to_string()),
        timeout: Duration::from_millis(positive(request.timeout).unwrap_or(DEFAULT_TIMEOUT_MS)),
        recovery_threshold: positive(request.recovery_threshold).unwrap_or(DEFAULT_THRESHOLD),
        incident_threshold: positive(request.incident_threshold).unwrap_or(DEFAULT_THRESHOLD),
        alerts,
    })
}

fn resolve_notification(index: usize, n: NotificationFile) -> NotificationChannel {
    let id = non_empty(n.id).unwrap_or_else(|| format!("notification-{}", index + 1));
    let data = n.data;
    let kind = match n.kind.as_str() {
        "discord" => ChannelKind::Discord {
            url: data.url.unwrap_or_default(),
        },
        "smtp" => ChannelKind::Smtp(SmtpSettings {
            hostname: data.hostname.unwrap_or_default(),
            port: data.port.unwrap_or(0),
            username: data.username.unwrap_or_default(),
            password: data.password.unwrap_or_default(),
            recipients: data.recipients,
        }),
        other => ChannelKind::Unknown {
            type_name: other.to_string(),
        },
    };
    NotificationChannel { id, kind }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

fn positive<T: Default + PartialOrd>(value: Option<T>) -> Option<T> {
    value.filter(|v| *v > T::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_http_probe() {
        let yaml = r#"
probes:
  - requests:
      - url: https://example.com
"#;
        let config = Config::from_yaml_str(yaml).unwrap();
        assert_eq!(config.probes.len(), 1);

        let probe = &config.probes[0];
        assert_eq!(probe.name, "Probe 1");
        assert!(!probe.id.is_empty());
        assert_eq!(probe.interval, Duration::from_secs(10));

        let request = &probe.requests()[0];
        assert_eq!(request.method, "GET");
        assert_eq!(request.timeout_ms(), 10_000);
        assert_eq!(request.incident_threshold, 5);
        assert_eq!(request.recovery_threshold, 5);
        assert_eq!(request.alerts, Alert::default_set());
    }

    #[test]
    fn test_explicit_values_are_kept() {
        let yaml = r#"
probes:
  - id: api
    name: Public API
    interval: 30
    requests:
      - url: https://example.com/health
        method: post
        timeout: 1500
        incident_threshold: 3
        recovery_threshold: 2
        alerts:
          - query: response.status != 200
            message: not ok
"#;
        let config = Config::from_yaml_str(yaml).unwrap();
        let probe = &config.probes[0];
        assert_eq!(probe.id, "api");
        assert_eq!(probe.name, "Public API");
        assert_eq!(probe.interval, Duration::from_secs(30));

        let request = &probe.requests()[0];
        assert_eq!(request.method, "post");
        assert_eq!(request.timeout, Duration::from_millis(1500));
        assert_eq!(request.incident_threshold, 3);
        assert_eq!(request.recovery_threshold, 2);
        assert_eq!(request.alerts, vec![Alert::new("response.status != 200", "not ok")]);
    }

    #[test]
    fn test_zero_interval_uses_default() {
        let yaml = r#"
probes:
  - interval: 0
    requests:
      - url: http://localhost:8080
"#;
        let config = Config::from_yaml_str(yaml).unwrap();
        assert_eq!(config.probes[0].interval, DEFAULT_INTERVAL);
    }

    #[test]
    fn test_ping_probe() {
        let yaml = r#"
probes:
  - name: gateway
    ping:
      uri: 192.168.1.1
"#;
        let config = Config::from_yaml_str(yaml).unwrap();
        let probe = &config.probes[0];
        assert_eq!(
            probe.kind,
            ProbeKind::Icmp {
                target: "192.168.1.1".to_string()
            }
        );
    }

    #[test]
    fn test_ping_wins_over_requests() {
        let yaml = r#"
probes:
  - ping:
      uri: example.com
    requests:
      - url: https://example.com
"#;
        let config = Config::from_yaml_str(yaml).unwrap();
        assert!(config.probes[0].is_icmp());
    }

    #[test]
    fn test_missing_url_is_an_error() {
        let yaml = r#"
probes:
  - id: broken
    requests:
      - method: GET
"#;
        let err = Config::from_yaml_str(yaml).unwrap_err();
        assert!(matches!(err, ConfigError::MissingUrl { ref probe_id } if probe_id == "broken"));
    }

    #[test]
    fn test_probe_without_requests_is_an_error() {
        let yaml = r#"
probes:
  - id: empty
"#;
        let err = Config::from_yaml_str(yaml).unwrap_err();
        assert!(matches!(err, ConfigError::NoRequests { .. }));
    }

    #[test]
    fn test_duplicate_id_is_an_error() {
        let yaml = r#"
probes:
  - id: dup
    requests:
      - url: https://a.example.com
  - id: dup
    ping:
      uri: b.example.com
"#;
        let err = Config::from_yaml_str(yaml).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateProbeId { ref probe_id } if probe_id == "dup"));
    }

    #[test]
    fn test_generated_ids_are_unique() {
        let yaml = r#"
probes:
  - requests:
      - url: https://a.example.com
  - requests:
      - url: https://b.example.com
"#;
        let config = Config::from_yaml_str(yaml).unwrap();
        assert_ne!(config.probes[0].id, config.probes[1].id);
    }

    #[test]
    fn test_malformed_yaml() {
        let err = Config::from_yaml_str("probes: [ {").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_empty_document() {
        let config = Config::from_yaml_str("").unwrap();
        assert!(config.probes.is_empty());
        assert!(config.notifications.is_empty());
    }

    #[test]
    fn test_notification_kinds() {
        let yaml = r#"
notifications:
  - id: chat
    type: discord
    data:
      url: https://discord.com/api/webhooks/1/abc
  - id: mail
    type: smtp
    data:
      hostname: smtp.example.com
      port: 587
      username: monika@example.com
      password: secret
      recipients:
        - ops@example.com
  - type: pager
"#;
        let config = Config::from_yaml_str(yaml).unwrap();
        assert_eq!(config.notifications.len(), 3);
        assert_eq!(
            config.notifications[0].kind,
            ChannelKind::Discord {
                url: "https://discord.com/api/webhooks/1/abc".to_string()
            }
        );

        match &config.notifications[1].kind {
            ChannelKind::Smtp(smtp) => {
                assert_eq!(smtp.hostname, "smtp.example.com");
                assert_eq!(smtp.port, 587);
                assert!(smtp.is_complete());
            }
            other => panic!("expected smtp, got {other:?}"),
        }

        assert_eq!(config.notifications[2].id, "notification-3");
        assert_eq!(config.notifications[2].type_name(), "pager");
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("monika.yml");
        std::fs::write(
            &path,
            "probes:\n  - requests:\n      - url: http://localhost\n",
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.probes.len(), 1);
    }

    #[test]
    fn test_from_missing_file() {
        let err = Config::from_file(Path::new("/nonexistent/monika.yml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
