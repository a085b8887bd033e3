use thiserror::Error;

/// Main error type for berlink operations
///
/// Every variant except `Connection` and `Timeout` is a protocol violation:
/// a session that observes one reports it and closes, it never tries to
/// resynchronize mid-stream.
#[derive(Error, Debug)]
pub enum BerlinkError {
    #[error("connection error: {0}")]
    Connection(#[from] std::io::Error),

    #[error("truncated header: {0}")]
    TruncatedHeader(String),

    #[error("length encoding of {0} octets exceeds the 32-bit limit")]
    LengthTooLarge(usize),

    #[error("payload of {length} bytes exceeds the allowed maximum of {limit}")]
    PayloadTooLarge { length: i64, limit: i64 },

    #[error("unexpected end of content: {0}")]
    UnexpectedEndOfContent(String),

    #[error("invalid constructed read: {0}")]
    InvalidConstructedRead(String),

    #[error("read of {wanted} bytes at offset {offset} is out of bounds for a buffer of {len} bytes")]
    Bounds {
        offset: usize,
        wanted: usize,
        len: usize,
    },

    #[error("timeout")]
    Timeout,

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("not connected")]
    NotConnected,
}

impl BerlinkError {
    /// Short stable name of the error kind, for event reporting and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            BerlinkError::Connection(_) => "Connection",
            BerlinkError::TruncatedHeader(_) => "TruncatedHeader",
            BerlinkError::LengthTooLarge(_) => "LengthTooLarge",
            BerlinkError::PayloadTooLarge { .. } => "PayloadTooLarge",
            BerlinkError::UnexpectedEndOfContent(_) => "UnexpectedEndOfContent",
            BerlinkError::InvalidConstructedRead(_) => "InvalidConstructedRead",
            BerlinkError::Bounds { .. } => "Bounds",
            BerlinkError::Timeout => "Timeout",
            BerlinkError::InvalidData(_) => "InvalidData",
            BerlinkError::NotConnected => "NotConnected",
        }
    }
}

/// Result type alias for berlink operations
pub type BerlinkResult<T> = Result<T, BerlinkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe");
        let err: BerlinkError = io.into();
        assert_eq!(err.kind(), "Connection");
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(BerlinkError::Timeout.kind(), "Timeout");
        assert_eq!(
            BerlinkError::Bounds {
                offset: 3,
                wanted: 2,
                len: 4
            }
            .kind(),
            "Bounds"
        );
    }
}
