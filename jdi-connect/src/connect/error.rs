// Connector error taxonomy
//
// Every establishment call reports failures synchronously through this type.
// Nothing here is retried; the caller owns retry and backoff.

use crate::connect::process::TargetProcess;
use crate::connect::transport::Transport;
use crate::protocol::JdwpError;
use std::process::ExitStatus;
use std::time::Duration;
use thiserror::Error;

pub type ConnectResult<T> = Result<T, ConnectError>;

#[derive(Debug, Error)]
pub enum ConnectError {
    /// One or more arguments are missing, unknown, or fail their own validity check
    #[error("Illegal connector arguments: {}", .0.join(", "))]
    IllegalArguments(Vec<String>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Only raised when the connector's timeout argument is set and elapses
    #[error("Timed out after {}ms waiting for target over {}", .timeout.as_millis(), .transport)]
    Timeout {
        transport: Transport,
        timeout: Duration,
    },

    /// The launched target exited before it connected back
    #[error("Target VM failed to start: {status}")]
    VmStartFailure {
        process: Box<TargetProcess>,
        status: ExitStatus,
    },

    #[error("Invalid handshake")]
    InvalidHandshake,

    #[error("JDWP error: {0}")]
    Jdwp(JdwpError),
}

impl ConnectError {
    pub fn illegal(name: impl Into<String>) -> Self {
        ConnectError::IllegalArguments(vec![name.into()])
    }

    pub(crate) fn not_listening(detail: &str) -> Self {
        ConnectError::Io(std::io::Error::new(
            std::io::ErrorKind::NotConnected,
            detail.to_string(),
        ))
    }

    /// Transport-level failure, including timeouts and a failed handshake
    pub fn is_io(&self) -> bool {
        matches!(
            self,
            ConnectError::Io(_) | ConnectError::Timeout { .. } | ConnectError::InvalidHandshake
        )
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ConnectError::Timeout { .. })
    }

    /// Offending argument names, in the order the connector reported them
    pub fn argument_names(&self) -> Option<&[String]> {
        match self {
            ConnectError::IllegalArguments(names) => Some(names),
            _ => None,
        }
    }
}

impl From<JdwpError> for ConnectError {
    fn from(err: JdwpError) -> Self {
        match err {
            JdwpError::Io(e) => ConnectError::Io(e),
            JdwpError::InvalidHandshake => ConnectError::InvalidHandshake,
            other => ConnectError::Jdwp(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_is_an_io_failure() {
        let err = ConnectError::Timeout {
            transport: Transport::Socket,
            timeout: Duration::from_millis(250),
        };

        assert!(err.is_io());
        assert!(err.is_timeout());
        assert_eq!(
            err.to_string(),
            "Timed out after 250ms waiting for target over dt_socket"
        );
    }

    #[test]
    fn test_illegal_arguments_lists_names() {
        let err = ConnectError::IllegalArguments(vec!["port".into(), "hostname".into()]);

        assert!(!err.is_io());
        assert_eq!(err.argument_names().unwrap(), ["port", "hostname"]);
        assert_eq!(err.to_string(), "Illegal connector arguments: port, hostname");
    }

    #[test]
    fn test_jdwp_errors_fold_into_taxonomy() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        assert!(matches!(ConnectError::from(JdwpError::Io(io)), ConnectError::Io(_)));
        assert!(matches!(
            ConnectError::from(JdwpError::InvalidHandshake),
            ConnectError::InvalidHandshake
        ));
        assert!(matches!(
            ConnectError::from(JdwpError::ConnectionClosed),
            ConnectError::Jdwp(JdwpError::ConnectionClosed)
        ));
    }
}
