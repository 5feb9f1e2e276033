use crate::args::Args;
use crate::registry::TargetCatalog;
use crate::service::Service;
use log::warn;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

/// Reasons the agent refuses to start.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("at least one --target is required")]
    NoTargets,

    #[error("invalid --target `{0}` (correct format: processname@host:port or groupname:processname@host:port)")]
    InvalidTarget(String),

    #[error("--registrator is required")]
    MissingRegistrator,

    #[error("invalid --registrator `{0}` (correct format: consul@host:port)")]
    InvalidRegistrator(String),

    #[error("unsupported registrator type `{0}` in --registrator (only `consul` is supported)")]
    UnsupportedRegistrator(String),

    #[error("invalid --registrator-config: {0}")]
    InvalidRegistratorConfig(#[from] serde_json::Error),

    #[error("invalid duration `{value}` for `{field}` in --registrator-config")]
    InvalidDuration { field: &'static str, value: String },
}

/// Timing of the TTL health check attached to every registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthPolicy {
    /// A check not renewed within this window turns critical.
    ttl: Duration,
    /// How often a registered service renews its check.
    renew_interval: Duration,
    /// How long a critical service stays listed before the registry drops it.
    deregister_after: Duration,
}

impl Default for HealthPolicy {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(3),
            renew_interval: Duration::from_secs(1),
            deregister_after: Duration::from_secs(60),
        }
    }
}

impl HealthPolicy {
    pub fn new(ttl: Duration, renew_interval: Duration, deregister_after: Duration) -> Self {
        Self {
            ttl,
            renew_interval,
            deregister_after,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn renew_interval(&self) -> Duration {
        self.renew_interval
    }

    pub fn deregister_after(&self) -> Duration {
        self.deregister_after
    }
}

/// User supplied `--registrator-config`; any subset of the fields.
#[derive(Debug, Default, Deserialize)]
pub struct RegistratorConfig {
    ttl: Option<String>,
    update_interval: Option<String>,
    deregister_interval: Option<String>,
}

impl RegistratorConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Applies defaults to missing fields and parses the durations.
    pub fn normalize(&self) -> Result<HealthPolicy, ConfigError> {
        let defaults = HealthPolicy::default();
        let policy = HealthPolicy {
            ttl: Self::field("ttl", &self.ttl, defaults.ttl)?,
            renew_interval: Self::field(
                "update_interval",
                &self.update_interval,
                defaults.renew_interval,
            )?,
            deregister_after: Self::field(
                "deregister_interval",
                &self.deregister_interval,
                defaults.deregister_after,
            )?,
        };

        if policy.renew_interval >= policy.ttl {
            warn!(
                "Config: update_interval ({:?}) is not shorter than ttl ({:?}); checks may flap",
                policy.renew_interval, policy.ttl
            );
        }
        Ok(policy)
    }

    fn field(
        field: &'static str,
        value: &Option<String>,
        default: Duration,
    ) -> Result<Duration, ConfigError> {
        match value.as_deref() {
            None | Some("") => Ok(default),
            Some(raw) => parse_duration(raw)
                .filter(|d| !d.is_zero())
                .ok_or_else(|| ConfigError::InvalidDuration {
                    field,
                    value: raw.to_string(),
                }),
        }
    }
}

/// Parses Go style durations: `300ms`, `3s`, `1m30s`, `1.5h`.
pub fn parse_duration(input: &str) -> Option<Duration> {
    if input == "0" {
        return Some(Duration::ZERO);
    }
    if input.is_empty() {
        return None;
    }

    let mut nanos = 0f64;
    let mut rest = input;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let number: f64 = rest[..number_len].parse().ok()?;
        rest = &rest[number_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let scale = match &rest[..unit_len] {
            "ns" => 1.0,
            "us" | "µs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            _ => return None,
        };
        rest = &rest[unit_len..];
        nanos += number * scale;
    }
    Some(Duration::from_nanos(nanos.round() as u64))
}

/// Renders a duration the way the registry HTTP APIs accept it, in the
/// largest unit that keeps it exact.
pub fn format_duration(duration: Duration) -> String {
    let nanos = duration.subsec_nanos();
    if nanos == 0 {
        format!("{}s", duration.as_secs())
    } else if nanos % 1_000_000 == 0 {
        format!("{}ms", duration.as_millis())
    } else if nanos % 1_000 == 0 {
        format!("{}us", duration.as_micros())
    } else {
        format!("{}ns", duration.as_nanos())
    }
}

/// Splits `name@host:port`.
fn parse_address(address: &str) -> Option<(&str, &str, u16)> {
    let (name, host_port) = address.split_once('@')?;
    if host_port.contains('@') {
        return None;
    }
    let mut parts = host_port.split(':');
    let (host, port) = (parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }
    Some((name, host, port.parse().ok()?))
}

/// Parses one `--target`.
///
/// `process@host:port` is qualified as `process:process`, the group name
/// supervisord gives a program without an explicit group. A loopback host is
/// replaced with this machine's hostname so that other nodes can reach it.
pub fn parse_target(address: &str) -> Result<Service, ConfigError> {
    let local = hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok());
    parse_target_on(address, local.as_deref())
}

fn parse_target_on(address: &str, local_hostname: Option<&str>) -> Result<Service, ConfigError> {
    let (name, host, port) =
        parse_address(address).ok_or_else(|| ConfigError::InvalidTarget(address.to_string()))?;
    if name.is_empty() || host.is_empty() {
        return Err(ConfigError::InvalidTarget(address.to_string()));
    }

    let name = if name.contains(':') {
        name.to_string()
    } else {
        format!("{}:{}", name, name)
    };

    let host = match (host, local_hostname) {
        ("localhost" | "127.0.0.1", Some(local)) if !local.is_empty() => local,
        _ => host,
    };

    Ok(Service::new(&name, host, port))
}

/// Registry backends the agent can talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistratorKind {
    Consul,
}

/// Parsed `--registrator`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistratorAddress {
    kind: RegistratorKind,
    host: String,
    port: u16,
}

impl RegistratorAddress {
    pub fn parse(address: &str) -> Result<Self, ConfigError> {
        let (kind, host, port) = parse_address(address)
            .ok_or_else(|| ConfigError::InvalidRegistrator(address.to_string()))?;
        let kind = match kind {
            "consul" => RegistratorKind::Consul,
            other => return Err(ConfigError::UnsupportedRegistrator(other.to_string())),
        };
        Ok(Self {
            kind,
            host: host.to_string(),
            port,
        })
    }

    pub fn kind(&self) -> RegistratorKind {
        self.kind
    }

    /// `host:port` of the registry endpoint.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Everything the agent needs, validated before the first notification.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    targets: TargetCatalog,
    registrator: RegistratorAddress,
    policy: HealthPolicy,
}

impl AgentConfig {
    pub fn from_args(args: &Args) -> Result<Self, ConfigError> {
        if args.targets.is_empty() {
            return Err(ConfigError::NoTargets);
        }
        let targets = args
            .targets
            .iter()
            .map(|target| parse_target(target))
            .collect::<Result<Vec<_>, _>>()?;

        let registrator = args
            .registrator
            .as_deref()
            .ok_or(ConfigError::MissingRegistrator)
            .and_then(RegistratorAddress::parse)?;

        let policy = match args.registrator_config.as_deref() {
            Some(json) if !json.trim().is_empty() => RegistratorConfig::from_json(json)?,
            _ => RegistratorConfig::default(),
        }
        .normalize()?;

        Ok(Self {
            targets: TargetCatalog::new(targets),
            registrator,
            policy,
        })
    }

    pub fn targets(&self) -> &TargetCatalog {
        &self.targets
    }

    pub fn registrator(&self) -> &RegistratorAddress {
        &self.registrator
    }

    pub fn policy(&self) -> HealthPolicy {
        self.policy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn args(argv: &[&str]) -> Args {
        Args::parse_from(std::iter::once("service-registrar").chain(argv.iter().copied()))
    }

    #[test]
    fn test_unqualified_target_is_normalized() {
        let service = parse_target_on("web@host:8080", None).unwrap();
        assert_eq!(service.name(), "web:web");
        assert_eq!(service.id().as_str(), "web:web@host:8080");

        let service = parse_target_on("app:web@host:8080", None).unwrap();
        assert_eq!(service.name(), "app:web");
        assert_eq!(service.port(), 8080);
    }

    #[test]
    fn test_loopback_host_is_replaced() {
        let service = parse_target_on("web@localhost:80", Some("node-7")).unwrap();
        assert_eq!(service.host(), "node-7");
        let service = parse_target_on("web@127.0.0.1:80", Some("node-7")).unwrap();
        assert_eq!(service.host(), "node-7");
        let service = parse_target_on("web@127.0.0.1:80", None).unwrap();
        assert_eq!(service.host(), "127.0.0.1");
        let service = parse_target_on("web@10.1.1.1:80", Some("node-7")).unwrap();
        assert_eq!(service.host(), "10.1.1.1");
    }

    #[test]
    fn test_invalid_targets() {
        for target in [
            "web",
            "web@host",
            "web@host:port",
            "web@host:80:81",
            "web@host:70000",
            "a@b@host:80",
            "@host:80",
            "web@:80",
        ] {
            assert!(
                matches!(parse_target_on(target, None), Err(ConfigError::InvalidTarget(_))),
                "target {:?} should be rejected",
                target
            );
        }
    }

    #[test]
    fn test_registrator_address() {
        let registrator = RegistratorAddress::parse("consul@10.0.0.1:8500").unwrap();
        assert_eq!(registrator.kind(), RegistratorKind::Consul);
        assert_eq!(registrator.endpoint(), "10.0.0.1:8500");

        assert!(matches!(
            RegistratorAddress::parse("etcd@10.0.0.1:2379"),
            Err(ConfigError::UnsupportedRegistrator(kind)) if kind == "etcd"
        ));
        assert!(matches!(
            RegistratorAddress::parse("consul:8500"),
            Err(ConfigError::InvalidRegistrator(_))
        ));
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("3s"), Some(Duration::from_secs(3)));
        assert_eq!(parse_duration("500ms"), Some(Duration::from_millis(500)));
        assert_eq!(parse_duration("1m30s"), Some(Duration::from_secs(90)));
        assert_eq!(parse_duration("1.5h"), Some(Duration::from_secs(5400)));
        assert_eq!(parse_duration("0"), Some(Duration::ZERO));
        assert_eq!(parse_duration(""), None);
        assert_eq!(parse_duration("3"), None);
        assert_eq!(parse_duration("s"), None);
        assert_eq!(parse_duration("3 s"), None);
        assert_eq!(parse_duration("3d"), None);
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(60)), "60s");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1500ms");
        assert_eq!(format_duration(Duration::from_micros(500)), "500us");
        assert_eq!(format_duration(Duration::from_nanos(1_000_250)), "1000250ns");
    }

    #[test]
    fn test_sub_millisecond_ttl_survives_formatting() {
        let policy = RegistratorConfig::from_json(r#"{"ttl":"500us"}"#)
            .unwrap()
            .normalize()
            .unwrap();
        assert_eq!(format_duration(policy.ttl()), "500us");
        assert_eq!(parse_duration(&format_duration(policy.ttl())), Some(policy.ttl()));
    }

    #[test]
    fn test_health_policy_defaults() {
        let policy = RegistratorConfig::default().normalize().unwrap();
        assert_eq!(policy, HealthPolicy::default());
        assert_eq!(policy.ttl(), Duration::from_secs(3));
        assert_eq!(policy.renew_interval(), Duration::from_secs(1));
        assert_eq!(policy.deregister_after(), Duration::from_secs(60));
    }

    #[test]
    fn test_partial_registrator_config() {
        let policy = RegistratorConfig::from_json(r#"{"ttl":"10s"}"#)
            .unwrap()
            .normalize()
            .unwrap();
        assert_eq!(policy.ttl(), Duration::from_secs(10));
        assert_eq!(policy.renew_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_bad_registrator_config() {
        assert!(matches!(
            RegistratorConfig::from_json("{not json"),
            Err(ConfigError::InvalidRegistratorConfig(_))
        ));
        let err = RegistratorConfig::from_json(r#"{"update_interval":"0s"}"#)
            .unwrap()
            .normalize()
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidDuration {
                field: "update_interval",
                ..
            }
        ));
    }

    #[test]
    fn test_agent_config_from_args() {
        let config = AgentConfig::from_args(&args(&[
            "--target",
            "app:web@host:8080",
            "--target",
            "api@host:9000",
            "--registrator",
            "consul@127.0.0.1:8500",
            "--registrator-config",
            r#"{"deregister_interval":"5m"}"#,
        ]))
        .unwrap();
        assert_eq!(config.targets().len(), 2);
        assert_eq!(config.targets().targets()[1].name(), "api:api");
        assert_eq!(config.registrator().endpoint(), "127.0.0.1:8500");
        assert_eq!(config.policy().deregister_after(), Duration::from_secs(300));
    }

    #[test]
    fn test_agent_config_requires_targets_and_registrator() {
        assert!(matches!(
            AgentConfig::from_args(&args(&["--registrator", "consul@h:1"])),
            Err(ConfigError::NoTargets)
        ));
        assert!(matches!(
            AgentConfig::from_args(&args(&["--target", "web@h:1"])),
            Err(ConfigError::MissingRegistrator)
        ));
        assert!(matches!(
            AgentConfig::from_args(&args(&["--target", "web", "--registrator", "consul@h:1"])),
            Err(ConfigError::InvalidTarget(_))
        ));
    }
}
