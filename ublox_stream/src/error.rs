use std::{fmt, io};

/// Errors returned by a single frame parser; never leave the ring-buffer dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    /// The bytes at the cursor are not this protocol's framing
    NotFound,
    /// Not enough bytes are buffered yet to decide, come back later
    Incomplete,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::NotFound => f.write_str("no frame found at cursor"),
            ParseError::Incomplete => f.write_str("frame incomplete, more data needed"),
        }
    }
}

impl std::error::Error for ParseError {}

/// Error returned by device level operations
#[derive(Debug)]
pub enum Error {
    /// Deadline reached with no qualifying frame
    Timeout,
    /// Nothing matching was found in the data
    NotFound,
    /// The device rejected the command with UBX-ACK-NACK
    Nack { class: u8, id: u8 },
    /// A buffer for the response could not be allocated, or the ring buffer
    /// refused the data
    NoMemory,
    /// The underlying read or write failed
    Transport(io::Error),
    InvalidParameter(&'static str),
    /// The operation is not possible on this transport
    NotSupported,
    /// A reply arrived but was not the one the protocol calls for
    UnexpectedResponse,
    /// The device did not behave as expected
    Platform(&'static str),
    UnknownDevice,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Timeout => f.write_str("timed out waiting for message"),
            Error::NotFound => f.write_str("message not found"),
            Error::Nack { class, id } => {
                write!(f, "command 0x{:02x} 0x{:02x} rejected with NACK", class, id)
            },
            Error::NoMemory => f.write_str("out of memory"),
            Error::Transport(e) => write!(f, "transport error: {}", e),
            Error::InvalidParameter(what) => write!(f, "invalid parameter: {}", what),
            Error::NotSupported => f.write_str("not supported on this transport"),
            Error::UnexpectedResponse => f.write_str("unexpected response"),
            Error::Platform(what) => write!(f, "device check failed: {}", what),
            Error::UnknownDevice => f.write_str("unknown device handle"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Transport(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Transport(e)
    }
}

pub type Result<T> = core::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nack_display_names_the_command() {
        let e = Error::Nack {
            class: 0x06,
            id: 0x01,
        };
        assert_eq!(e.to_string(), "command 0x06 0x01 rejected with NACK");
    }

    #[test]
    fn io_error_becomes_transport() {
        let e: Error = io::Error::new(io::ErrorKind::BrokenPipe, "gone").into();
        assert!(matches!(e, Error::Transport(_)));
        assert!(std::error::Error::source(&e).is_some());
    }
}
