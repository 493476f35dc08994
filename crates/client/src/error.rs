use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// How the invoking engine should treat a failed operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recoverability {
    /// The whole operation may be retried as-is.
    Recoverable,
    /// Retrying will not help; the fault needs operator attention.
    NonRecoverable,
}

#[derive(Debug, Error)]
pub enum Error {
    /// The caller supplied configuration the plugin cannot work with.
    #[error("{0}")]
    Configuration(String),

    /// The HTTP round trip ran past the configured deadline.
    #[error("request to {url} timed out")]
    Timeout {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The service could not be reached at all (DNS, refused connection,
    /// broken transport).
    #[error("request to {url} failed: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The service answered with a non-success status. The reason is the
    /// body's `error` field when the body is JSON, else the HTTP reason
    /// phrase.
    #[error("Error: {status}, Reason: {reason}")]
    Service { status: u16, reason: String },

    /// The service reported success but the body did not parse as an
    /// allocation.
    #[error("malformed response from {url}: {source}")]
    MalformedResponse {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// A runtime property this operation depends on is not set. Raised by
    /// release when no prior acquire succeeded.
    #[error("missing required runtime property '{0}'")]
    MissingProperty(&'static str),

    /// Reading or writing local key material failed.
    #[error("key file {}: {source}", .path.display())]
    KeyFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    /// Only timeouts are worth retrying; everything else either cannot
    /// succeed on retry or risks leaking a remote allocation.
    pub fn recoverability(&self) -> Recoverability {
        match self {
            Error::Timeout { .. } => Recoverability::Recoverable,
            _ => Recoverability::NonRecoverable,
        }
    }

    pub fn is_recoverable(&self) -> bool {
        self.recoverability() == Recoverability::Recoverable
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_error_message_carries_status_and_reason() {
        let err = Error::Service {
            status: 500,
            reason: "boom".to_string(),
        };
        let message = err.to_string();
        assert!(message.contains("500"));
        assert!(message.contains("boom"));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn local_faults_are_non_recoverable() {
        assert!(!Error::Configuration("Requested OS must be a string".into()).is_recoverable());
        assert!(!Error::MissingProperty("host_id").is_recoverable());
    }
}
