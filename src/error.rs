#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The target host or container could not be reached at all.
    #[error("cannot reach {url}: {reason}")]
    Connectivity { url: String, reason: String },

    /// A response arrived but was malformed: bad JSON, a missing field or the
    /// wrong content type.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The response was well-formed but semantically wrong.
    #[error("assertion failed: {0}")]
    Assertion(String),

    /// The container tooling itself is unavailable or misbehaved.
    #[error("probe error: {0}")]
    Probe(String),

    #[error("agent error: {0}")]
    Agent(String),

    #[error("check '{0}' is already registered")]
    DuplicateCheck(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn connectivity(url: impl Into<String>, reason: impl ToString) -> Self {
        Self::Connectivity {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::Connectivity { .. })
    }

    /// The request was sent but nothing came back in time
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Connectivity { reason, .. } if reason == crate::probe::TIMED_OUT)
    }
}

impl From<rmcp::ServiceError> for Error {
    fn from(err: rmcp::ServiceError) -> Self {
        Error::Protocol(format!("MCP request failed: {err}"))
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connectivity_error_carries_url() {
        let err = Error::connectivity("http://localhost:8765/api/stats", "connection refused");
        assert!(err.is_connectivity());
        assert_eq!(
            err.to_string(),
            "cannot reach http://localhost:8765/api/stats: connection refused"
        );
    }

    #[test]
    fn timeouts_are_a_kind_of_connectivity_error() {
        let err = Error::connectivity("http://localhost:8765/mcp/w", "request timed out");
        assert!(err.is_connectivity());
        assert!(err.is_timeout());
        assert!(!Error::connectivity("http://localhost:8765", "connection refused").is_timeout());
    }

    #[test]
    fn protocol_error_message() {
        let err = Error::Protocol("missing field 'totalServers'".into());
        assert!(!err.is_connectivity());
        assert!(err.to_string().contains("totalServers"));
    }
}
