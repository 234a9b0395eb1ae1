/*!
Specialized `Error` and `Result` types for memproxy.
*/

use std::{error, fmt, result};

use log::{debug, error, info, trace, warn};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct Error(pub ErrorOrigin, pub ErrorKind);

impl Error {
    /// Returns a static string representing the type of error.
    pub fn as_str(&self) -> &'static str {
        self.1.to_str()
    }

    /// Returns a static string representing the type of error.
    pub fn into_str(self) -> &'static str {
        self.as_str()
    }

    pub const fn into_i32(self) -> i32 {
        let origin = ((self.0 as i32 + 1) & 0xFFFi32) << 4;
        let kind = ((self.1 as i32 + 1) & 0xFFFi32) << 16;
        -(1 + origin + kind)
    }

    pub fn from_i32(error: i32) -> Self {
        let origin = ((-error - 1) >> 4i32) & 0xFFFi32;
        let kind = ((-error - 1) >> 16i32) & 0xFFFi32;

        let error_origin = ErrorOrigin::ALL
            .iter()
            .copied()
            .find(|o| *o as i32 + 1 == origin)
            .unwrap_or(ErrorOrigin::Other);

        let error_kind = ErrorKind::ALL
            .iter()
            .copied()
            .find(|k| *k as i32 + 1 == kind)
            .unwrap_or(ErrorKind::Unknown);

        Self(error_origin, error_kind)
    }

    pub fn log_error(self, err: impl fmt::Display) -> Self {
        error!("{}: {} ({})", self.0.to_str(), self.1.to_str(), err);
        self
    }

    pub fn log_warn(self, err: impl fmt::Display) -> Self {
        warn!("{}: {} ({})", self.0.to_str(), self.1.to_str(), err);
        self
    }

    pub fn log_info(self, err: impl fmt::Display) -> Self {
        info!("{}: {} ({})", self.0.to_str(), self.1.to_str(), err);
        self
    }

    pub fn log_debug(self, err: impl fmt::Display) -> Self {
        debug!("{}: {} ({})", self.0.to_str(), self.1.to_str(), err);
        self
    }

    pub fn log_trace(self, err: impl fmt::Display) -> Self {
        trace!("{}: {} ({})", self.0.to_str(), self.1.to_str(), err);
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: {}", self.0.to_str(), self.1.to_str())
    }
}

impl error::Error for Error {}

#[repr(u16)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum ErrorOrigin {
    Args,

    PageCache,
    JobQueue,
    Worker,
    Intercept,

    RemoteChannel,
    Protocol,
    FFI,

    Other,
}

impl ErrorOrigin {
    const ALL: [ErrorOrigin; 9] = [
        ErrorOrigin::Args,
        ErrorOrigin::PageCache,
        ErrorOrigin::JobQueue,
        ErrorOrigin::Worker,
        ErrorOrigin::Intercept,
        ErrorOrigin::RemoteChannel,
        ErrorOrigin::Protocol,
        ErrorOrigin::FFI,
        ErrorOrigin::Other,
    ];

    /// Returns a static string representing the type of error.
    pub fn to_str(self) -> &'static str {
        match self {
            ErrorOrigin::Args => "args",

            ErrorOrigin::PageCache => "page cache",
            ErrorOrigin::JobQueue => "job queue",
            ErrorOrigin::Worker => "worker",
            ErrorOrigin::Intercept => "intercept",

            ErrorOrigin::RemoteChannel => "remote channel",
            ErrorOrigin::Protocol => "protocol",
            ErrorOrigin::FFI => "ffi",

            ErrorOrigin::Other => "other",
        }
    }
}

#[repr(u16)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum ErrorKind {
    Uninitialized,
    Configuration,
    ArgValidation,

    NotFound,
    OutOfBounds,
    Unaligned,
    NoTarget,

    Timeout,
    NoResponse,
    Encoding,
    MissingField,

    AlreadyRunning,
    NotRunning,

    Unknown,
}

impl ErrorKind {
    const ALL: [ErrorKind; 14] = [
        ErrorKind::Uninitialized,
        ErrorKind::Configuration,
        ErrorKind::ArgValidation,
        ErrorKind::NotFound,
        ErrorKind::OutOfBounds,
        ErrorKind::Unaligned,
        ErrorKind::NoTarget,
        ErrorKind::Timeout,
        ErrorKind::NoResponse,
        ErrorKind::Encoding,
        ErrorKind::MissingField,
        ErrorKind::AlreadyRunning,
        ErrorKind::NotRunning,
        ErrorKind::Unknown,
    ];

    /// Returns a static string representing the type of error.
    pub fn to_str(self) -> &'static str {
        match self {
            ErrorKind::Uninitialized => "unitialized",
            ErrorKind::Configuration => "configuration error",
            ErrorKind::ArgValidation => "the argument could not be validated",

            ErrorKind::NotFound => "not found",
            ErrorKind::OutOfBounds => "out of bounds",
            ErrorKind::Unaligned => "address is not page aligned",
            ErrorKind::NoTarget => "no target process attached",

            ErrorKind::Timeout => "timed out",
            ErrorKind::NoResponse => "no response",
            ErrorKind::Encoding => "encoding error",
            ErrorKind::MissingField => "missing field",

            ErrorKind::AlreadyRunning => "already running",
            ErrorKind::NotRunning => "not running",

            ErrorKind::Unknown => "unknown error",
        }
    }
}

/// Specialized `Result` type for memproxy results.
pub type Result<T> = result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::{Error, ErrorKind, ErrorOrigin};

    #[test]
    pub fn error_from_i32_invalid() {
        let mut err = Error::from_i32(-1);
        assert_eq!(err.0, ErrorOrigin::Other);
        assert_eq!(err.1, ErrorKind::Unknown);

        err = Error::from_i32(-2);
        assert_eq!(err.0, ErrorOrigin::Other);
        assert_eq!(err.1, ErrorKind::Unknown);

        err = Error::from_i32(-3);
        assert_eq!(err.0, ErrorOrigin::Other);
        assert_eq!(err.1, ErrorKind::Unknown);
    }

    #[test]
    pub fn error_to_from_i32() {
        let err = Error::from_i32(Error(ErrorOrigin::PageCache, ErrorKind::OutOfBounds).into_i32());
        assert_eq!(err.0, ErrorOrigin::PageCache);
        assert_eq!(err.1, ErrorKind::OutOfBounds);

        let err = Error::from_i32(Error(ErrorOrigin::FFI, ErrorKind::Unknown).into_i32());
        assert_eq!(err.0, ErrorOrigin::FFI);
        assert_eq!(err.1, ErrorKind::Unknown);
    }

    #[test]
    pub fn error_display() {
        let err = Error(ErrorOrigin::Protocol, ErrorKind::MissingField);
        assert_eq!(err.to_string(), "protocol: missing field");
        assert_eq!(err.as_str(), "missing field");
    }
}
