use crate::error::ProtocolError;
use std::fmt;
use std::str::FromStr;

pub const EVENT_PROCESS_STATE_RUNNING: &str = "PROCESS_STATE_RUNNING";
pub const EVENT_PROCESS_STATE_STOPPING: &str = "PROCESS_STATE_STOPPING";
pub const EVENT_PROCESS_STATE_EXITED: &str = "PROCESS_STATE_EXITED";

/// Splits `content` into `key:value` pairs.
///
/// Tokens are separated by single spaces and empty tokens are skipped. Only the
/// first `:` separates key from value, so values may carry colons of their own.
pub(crate) fn tokenize(content: &str) -> Result<Vec<(&str, &str)>, ProtocolError> {
    content
        .split(' ')
        .filter(|token| !token.is_empty())
        .map(|token| {
            token
                .split_once(':')
                .ok_or_else(|| ProtocolError::MalformedToken(token.to_string()))
        })
        .collect()
}

fn parse_integer<T: FromStr>(key: &'static str, value: &str) -> Result<T, ProtocolError> {
    value.parse().map_err(|_| ProtocolError::InvalidInteger {
        key,
        value: value.to_string(),
    })
}

/// Metadata line that precedes every notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    ver: String,
    server: String,
    serial: u64,
    pool: String,
    pool_serial: u64,
    event_name: String,
    len: usize,
}

impl Header {
    pub fn new(event_name: &str, len: usize) -> Self {
        Self {
            ver: "3.0".to_string(),
            server: "supervisor".to_string(),
            serial: 0,
            pool: "listener".to_string(),
            pool_serial: 0,
            event_name: event_name.to_string(),
            len,
        }
    }

    pub fn with_serial(mut self, serial: u64, pool_serial: u64) -> Self {
        self.serial = serial;
        self.pool_serial = pool_serial;
        self
    }

    pub fn with_pool(mut self, pool: &str) -> Self {
        self.pool = pool.to_string();
        self
    }

    /// Builds a header from one header line (without its trailing newline).
    ///
    /// Unknown keys are ignored; `eventname` and `len` are mandatory.
    pub fn decode(line: &str) -> Result<Self, ProtocolError> {
        let mut ver = String::new();
        let mut server = String::new();
        let mut serial = 0;
        let mut pool = String::new();
        let mut pool_serial = 0;
        let mut event_name = None;
        let mut len = None;

        for (key, value) in tokenize(line)? {
            match key {
                "ver" => ver = value.to_string(),
                "server" => server = value.to_string(),
                "serial" => serial = parse_integer("serial", value)?,
                "pool" => pool = value.to_string(),
                "poolserial" => pool_serial = parse_integer("poolserial", value)?,
                "eventname" => event_name = Some(value.to_string()),
                "len" => len = Some(parse_integer("len", value)?),
                _ => {}
            }
        }

        Ok(Self {
            ver,
            server,
            serial,
            pool,
            pool_serial,
            event_name: event_name.ok_or(ProtocolError::MissingField("eventname"))?,
            len: len.ok_or(ProtocolError::MissingField("len"))?,
        })
    }

    /// Renders the header line, without the trailing newline.
    pub fn encode(&self) -> String {
        format!(
            "ver:{} server:{} serial:{} pool:{} poolserial:{} eventname:{} len:{}",
            self.ver,
            self.server,
            self.serial,
            self.pool,
            self.pool_serial,
            self.event_name,
            self.len
        )
    }

    pub fn ver(&self) -> &str {
        &self.ver
    }
    pub fn server(&self) -> &str {
        &self.server
    }
    pub fn serial(&self) -> u64 {
        self.serial
    }
    pub fn pool(&self) -> &str {
        &self.pool
    }
    pub fn pool_serial(&self) -> u64 {
        self.pool_serial
    }
    pub fn event_name(&self) -> &str {
        &self.event_name
    }
    pub fn len(&self) -> usize {
        self.len
    }
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// The event types a listener acts on, plus everything else by name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// The process moved to RUNNING.
    ProcessRunning,
    /// The process is being stopped.
    ProcessStopping,
    /// The process exited.
    ProcessExited,
    Unrecognized(String),
}

impl EventKind {
    pub fn from_name(name: &str) -> Self {
        match name {
            EVENT_PROCESS_STATE_RUNNING => EventKind::ProcessRunning,
            EVENT_PROCESS_STATE_STOPPING => EventKind::ProcessStopping,
            EVENT_PROCESS_STATE_EXITED => EventKind::ProcessExited,
            other => EventKind::Unrecognized(other.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            EventKind::ProcessRunning => EVENT_PROCESS_STATE_RUNNING,
            EventKind::ProcessStopping => EVENT_PROCESS_STATE_STOPPING,
            EventKind::ProcessExited => EVENT_PROCESS_STATE_EXITED,
            EventKind::Unrecognized(name) => name,
        }
    }

    pub fn is_recognized(&self) -> bool {
        !matches!(self, EventKind::Unrecognized(_))
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Process states as reported in `from_state`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ProcessState {
    Stopped,
    Starting,
    Running,
    Backoff,
    Stopping,
    Exited,
    Fatal,
    Unknown,
    Other(String),
}

impl ProcessState {
    pub fn as_str(&self) -> &str {
        match self {
            ProcessState::Stopped => "STOPPED",
            ProcessState::Starting => "STARTING",
            ProcessState::Running => "RUNNING",
            ProcessState::Backoff => "BACKOFF",
            ProcessState::Stopping => "STOPPING",
            ProcessState::Exited => "EXITED",
            ProcessState::Fatal => "FATAL",
            ProcessState::Unknown => "UNKNOWN",
            ProcessState::Other(name) => name,
        }
    }
}

impl From<&str> for ProcessState {
    fn from(name: &str) -> Self {
        match name {
            "STOPPED" => ProcessState::Stopped,
            "STARTING" => ProcessState::Starting,
            "RUNNING" => ProcessState::Running,
            "BACKOFF" => ProcessState::Backoff,
            "STOPPING" => ProcessState::Stopping,
            "EXITED" => ProcessState::Exited,
            "FATAL" => ProcessState::Fatal,
            "UNKNOWN" => ProcessState::Unknown,
            other => ProcessState::Other(other.to_string()),
        }
    }
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed payload of one process lifecycle notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    kind: EventKind,
    process_name: String,
    group_name: String,
    from_state: Option<ProcessState>,
    pid: Option<u32>,
}

impl Event {
    pub fn new(kind: EventKind, process_name: &str, group_name: &str) -> Self {
        Self {
            kind,
            process_name: process_name.to_string(),
            group_name: group_name.to_string(),
            from_state: None,
            pid: None,
        }
    }

    pub fn with_from_state(mut self, state: ProcessState) -> Self {
        self.from_state = Some(state);
        self
    }

    pub fn with_pid(mut self, pid: u32) -> Self {
        self.pid = Some(pid);
        self
    }

    /// Builds an event from the header's event name and the raw payload.
    ///
    /// The payload of an unrecognized event type is consumed but never
    /// tokenized or validated: its format is event specific (free-form for log
    /// events) and nothing downstream reads it.
    pub fn decode(event_name: &str, payload: &[u8]) -> Result<Self, ProtocolError> {
        let kind = EventKind::from_name(event_name);
        if !kind.is_recognized() {
            return Ok(Self::new(kind, "", ""));
        }

        let content = String::from_utf8_lossy(payload);
        let mut event = Self::new(kind, "", "");
        for (key, value) in tokenize(content.trim_end_matches(['\r', '\n']))? {
            match key {
                "processname" => event.process_name = value.to_string(),
                "groupname" => event.group_name = value.to_string(),
                "from_state" => event.from_state = Some(ProcessState::from(value)),
                "pid" => event.pid = Some(parse_integer("pid", value)?),
                _ => {}
            }
        }
        Ok(event)
    }

    /// Renders the payload tokens.
    pub fn encode(&self) -> String {
        let mut tokens = vec![
            format!("processname:{}", self.process_name),
            format!("groupname:{}", self.group_name),
        ];
        if let Some(state) = &self.from_state {
            tokens.push(format!("from_state:{}", state));
        }
        if let Some(pid) = self.pid {
            tokens.push(format!("pid:{}", pid));
        }
        tokens.join(" ")
    }

    pub fn kind(&self) -> &EventKind {
        &self.kind
    }
    pub fn process_name(&self) -> &str {
        &self.process_name
    }
    pub fn group_name(&self) -> &str {
        &self.group_name
    }
    pub fn from_state(&self) -> Option<&ProcessState> {
        self.from_state.as_ref()
    }
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// `group:process`, the name configured targets are matched against.
    pub fn qualified_name(&self) -> String {
        format!("{}:{}", self.group_name, self.process_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_keeps_colons_in_values() {
        let tokens = tokenize("processname:web  groupname:app url:http://x:1 ").unwrap();
        assert_eq!(
            tokens,
            vec![
                ("processname", "web"),
                ("groupname", "app"),
                ("url", "http://x:1")
            ]
        );
    }

    #[test]
    fn test_tokenize_rejects_token_without_separator() {
        let err = tokenize("processname:web garbage").unwrap_err();
        assert!(matches!(err, ProtocolError::MalformedToken(t) if t == "garbage"));
    }

    #[test]
    fn test_decode_supervisord_header() {
        let line = "ver:3.0 server:supervisor serial:21 pool:listener poolserial:10 \
                    eventname:PROCESS_STATE_RUNNING len:54";
        let header = Header::decode(line).unwrap();
        assert_eq!(header.ver(), "3.0");
        assert_eq!(header.server(), "supervisor");
        assert_eq!(header.serial(), 21);
        assert_eq!(header.pool(), "listener");
        assert_eq!(header.pool_serial(), 10);
        assert_eq!(header.event_name(), EVENT_PROCESS_STATE_RUNNING);
        assert_eq!(header.len(), 54);
    }

    #[test]
    fn test_header_ignores_unknown_keys() {
        let header = Header::decode("eventname:TICK_5 len:0 extra:value").unwrap();
        assert_eq!(header.event_name(), "TICK_5");
        assert!(header.is_empty());
        assert_eq!(header.ver(), "");
    }

    #[test]
    fn test_header_rejects_bad_integers() {
        for line in [
            "eventname:X len:abc",
            "eventname:X len:-1",
            "eventname:X len:0 serial:1.5",
            "eventname:X len:0 poolserial:",
        ] {
            let err = Header::decode(line).unwrap_err();
            assert!(
                matches!(err, ProtocolError::InvalidInteger { .. }),
                "expected InvalidInteger for {:?}, got {:?}",
                line,
                err
            );
        }
    }

    #[test]
    fn test_header_requires_framing_fields() {
        assert!(matches!(
            Header::decode("ver:3.0 len:4").unwrap_err(),
            ProtocolError::MissingField("eventname")
        ));
        assert!(matches!(
            Header::decode("eventname:PROCESS_STATE_RUNNING").unwrap_err(),
            ProtocolError::MissingField("len")
        ));
    }

    #[test]
    fn test_header_encoding_decodes_to_same_value() {
        let header = Header::new(EVENT_PROCESS_STATE_EXITED, 71)
            .with_serial(42, 7)
            .with_pool("registrar");
        assert_eq!(Header::decode(&header.encode()).unwrap(), header);
    }

    #[test]
    fn test_event_encoding_decodes_to_same_value() {
        let event = Event::new(EventKind::ProcessExited, "web", "app")
            .with_from_state(ProcessState::Running)
            .with_pid(123);
        let decoded = Event::decode(event.kind().name(), event.encode().as_bytes()).unwrap();
        assert_eq!(decoded, event);

        let bare = Event::new(EventKind::ProcessRunning, "worker", "pool");
        let decoded = Event::decode(bare.kind().name(), bare.encode().as_bytes()).unwrap();
        assert_eq!(decoded, bare);
    }

    #[test]
    fn test_decode_running_payload() {
        let event = Event::decode(
            EVENT_PROCESS_STATE_RUNNING,
            b"processname:web groupname:app from_state:STARTING pid:123",
        )
        .unwrap();
        assert_eq!(event.kind(), &EventKind::ProcessRunning);
        assert_eq!(event.qualified_name(), "app:web");
        assert_eq!(event.from_state(), Some(&ProcessState::Starting));
        assert_eq!(event.pid(), Some(123));
    }

    #[test]
    fn test_decode_rejects_bad_pid() {
        let err = Event::decode(
            EVENT_PROCESS_STATE_EXITED,
            b"processname:web groupname:app pid:abc",
        )
        .unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidInteger { key: "pid", .. }));
    }

    #[test]
    fn test_unrecognized_payload_is_not_tokenized() {
        let event = Event::decode(
            "PROCESS_LOG_STDOUT",
            b"processname:web groupname:app pid:1 channel:stdout\nfree form output",
        )
        .unwrap();
        assert_eq!(
            event.kind(),
            &EventKind::Unrecognized("PROCESS_LOG_STDOUT".to_string())
        );
        assert_eq!(event.process_name(), "");
    }

    #[test]
    fn test_process_state_names() {
        assert_eq!(ProcessState::from("RUNNING"), ProcessState::Running);
        assert_eq!(
            ProcessState::from("SLEEPING"),
            ProcessState::Other("SLEEPING".to_string())
        );
        assert_eq!(ProcessState::Backoff.to_string(), "BACKOFF");
    }
}
