use thiserror::Error;

use crate::net::InetAddress;

/// Error kinds surfaced by topology inference.
///
/// Recoverable probing conditions (timeouts, empty IP-ID sample lists, DNS
/// failures) never appear here: they are absorbed at the probe-worker
/// boundary and recorded as null values in the IP table.
#[derive(Error, Debug)]
pub enum TopologyError {
    #[error("probe primitive unavailable: {0}")]
    ProbeUnavailable(String),

    #[error("malformed subnet record (line {line}): {reason}")]
    MalformedInput { line: usize, reason: String },

    #[error("interface {interface} lies outside subnet {prefix}/{prefix_len}")]
    InvariantViolation {
        interface: InetAddress,
        prefix: InetAddress,
        prefix_len: u8,
    },

    #[error("route cannot be fitted into the tree: {0}")]
    InconsistentRoute(String),

    #[error("unrecoverable probe failure: {0}")]
    ProbeFailure(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TopologyError {
    /// Process exit code for this error per the tool contract:
    /// 1 input/config, 2 privilege, 3 probe failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            TopologyError::MalformedInput { .. }
            | TopologyError::InvariantViolation { .. }
            | TopologyError::InconsistentRoute(_)
            | TopologyError::InvalidConfig(_)
            | TopologyError::Io(_) => 1,
            TopologyError::ProbeUnavailable(_) => 2,
            TopologyError::ProbeFailure(_) => 3,
        }
    }
}
