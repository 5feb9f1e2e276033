use std::fmt;
use supervisor_events::Event;

/// Registry key of a target service: `name@host:port`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServiceId(String);

impl ServiceId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ServiceId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A statically configured target: the process to watch and where it serves.
///
/// `name` is always qualified as `group:process` once configuration has been
/// loaded, so matching against events is a plain comparison.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Service {
    name: String,
    host: String,
    port: u16,
}

impl Service {
    pub fn new(name: &str, host: &str, port: u16) -> Self {
        Self {
            name: name.to_string(),
            host: host.to_string(),
            port,
        }
    }

    pub fn id(&self) -> ServiceId {
        ServiceId(format!("{}@{}:{}", self.name, self.host, self.port))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// True when `name` is exactly `group:process` of the event.
    pub fn matches(&self, event: &Event) -> bool {
        self.name
            .strip_prefix(event.group_name())
            .and_then(|rest| rest.strip_prefix(':'))
            == Some(event.process_name())
    }
}
