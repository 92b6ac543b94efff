//! Error taxonomy shared by every crate in the workspace.
//!
//! Errors are values: every database verb and provider operation returns
//! `Result<T, Error>`. Per-element outcomes inside a batch (a missing key in
//! `get`, a slot that is too small) are *not* errors — they are encoded into
//! the result size slots as [sentinels](crate::sentinel).

/// Error type for database and provider operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A structural problem with the request: size mismatch, empty key,
    /// buffer region too small for the declared layout.
    InvalidArgs(String),

    /// No database with the requested id is registered.
    InvalidDatabase,

    /// The requested backend type tag is unknown.
    InvalidBackend(String),

    /// The JSON configuration failed validation.
    InvalidConfig(String),

    /// The provider configuration document itself is malformed.
    InvalidProvider(String),

    /// The verb, or one of the requested mode bits, is not implemented
    /// by the target backend.
    OpUnsupported,

    /// The operation is valid but not permitted on this database.
    OpForbidden,

    /// A key required to be present was not found.
    KeyNotFound,

    /// A key required to be absent was found.
    KeyExists,

    /// An output buffer is too small for the whole result.
    BufferSize,

    /// A `WAIT`-mode read outlived its deadline.
    Timeout,

    /// The backend detected corrupted stored data.
    Corruption(String),

    /// An I/O failure in the backend.
    Io(String),

    /// The operation should be retried by the caller.
    TryAgain,

    /// The operation was aborted, e.g. a waiter woken by database teardown.
    Aborted,

    /// The backend is busy and cannot service the request.
    Busy,

    /// Anything that does not fit the taxonomy above.
    Other(String),
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::InvalidArgs(msg) => write!(f, "invalid argument: {}", msg),
            Error::InvalidDatabase => write!(f, "invalid database id"),
            Error::InvalidBackend(tag) => write!(f, "invalid backend type: {}", tag),
            Error::InvalidConfig(msg) => write!(f, "invalid configuration: {}", msg),
            Error::InvalidProvider(msg) => write!(f, "invalid provider configuration: {}", msg),
            Error::OpUnsupported => write!(f, "unsupported operation"),
            Error::OpForbidden => write!(f, "forbidden operation"),
            Error::KeyNotFound => write!(f, "key not found"),
            Error::KeyExists => write!(f, "key exists"),
            Error::BufferSize => write!(f, "buffer too small"),
            Error::Timeout => write!(f, "timeout"),
            Error::Corruption(msg) => write!(f, "data corruption: {}", msg),
            Error::Io(msg) => write!(f, "io error: {}", msg),
            Error::TryAgain => write!(f, "try again"),
            Error::Aborted => write!(f, "operation aborted"),
            Error::Busy => write!(f, "busy"),
            Error::Other(msg) => write!(f, "error: {}", msg),
        }
    }
}

impl Error {
    /// Stable numeric code for the wire. `0` is reserved for success and is
    /// never produced here.
    pub fn code(&self) -> u32 {
        match self {
            Error::InvalidArgs(_) => 1,
            Error::InvalidDatabase => 2,
            Error::InvalidBackend(_) => 3,
            Error::InvalidConfig(_) => 4,
            Error::InvalidProvider(_) => 5,
            Error::OpUnsupported => 6,
            Error::OpForbidden => 7,
            Error::KeyNotFound => 8,
            Error::KeyExists => 9,
            Error::BufferSize => 10,
            Error::Timeout => 11,
            Error::Corruption(_) => 12,
            Error::Io(_) => 13,
            Error::TryAgain => 14,
            Error::Aborted => 15,
            Error::Busy => 16,
            Error::Other(_) => 17,
        }
    }

    /// Converts a structural-check failure message into `InvalidArgs`.
    pub fn invalid_args(msg: impl Into<String>) -> Self {
        Error::InvalidArgs(msg.into())
    }
}

/// Result type alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_assign_distinct_wire_codes() {
        // given
        let errors = [
            Error::invalid_args("x"),
            Error::InvalidDatabase,
            Error::InvalidBackend("zset".into()),
            Error::InvalidConfig("bad".into()),
            Error::InvalidProvider("bad".into()),
            Error::OpUnsupported,
            Error::OpForbidden,
            Error::KeyNotFound,
            Error::KeyExists,
            Error::BufferSize,
            Error::Timeout,
            Error::Corruption("bad".into()),
            Error::Io("bad".into()),
            Error::TryAgain,
            Error::Aborted,
            Error::Busy,
            Error::Other("bad".into()),
        ];

        // when
        let mut codes: Vec<u32> = errors.iter().map(Error::code).collect();
        codes.sort_unstable();
        codes.dedup();

        // then - every variant has its own nonzero code
        assert_eq!(codes.len(), errors.len());
        assert!(codes.iter().all(|&c| c != 0));
    }

    #[test]
    fn should_render_message_payloads() {
        assert_eq!(
            Error::invalid_args("zero-sized key").to_string(),
            "invalid argument: zero-sized key"
        );
        assert_eq!(
            Error::InvalidBackend("rocks".into()).to_string(),
            "invalid backend type: rocks"
        );
    }
}
