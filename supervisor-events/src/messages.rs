/// Written by the listener before every notification.
pub const READY_TOKEN: &str = "READY\n";

/// Prefix of the framed result: `RESULT <len>\n<payload>`.
pub const RESULT_PREFIX: &str = "RESULT ";

/// Outcome reported back to the supervisor for one notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ack {
    Ok,
    Fail,
}

impl Ack {
    pub fn from_success(success: bool) -> Self {
        if success {
            Ack::Ok
        } else {
            Ack::Fail
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Ack::Ok => "OK",
            Ack::Fail => "FAIL",
        }
    }

    /// Frames the outcome as a result token.
    pub fn encode(&self) -> String {
        let payload = self.as_str();
        format!("{}{}\n{}", RESULT_PREFIX, payload.len(), payload)
    }

    pub fn parse(payload: &str) -> Option<Self> {
        match payload {
            "OK" => Some(Ack::Ok),
            "FAIL" => Some(Ack::Fail),
            _ => None,
        }
    }
}
