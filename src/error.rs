use std::fmt;

#[derive(Debug)]
pub enum Error {
    Http(reqwest::Error),
    /// Unexpected HTTP status that survived every retry.
    Status(u16),
    Authentication(String),
    Protocol(String),
    /// No dialect matched; one cause per rejected candidate.
    Unresolved(Vec<String>),
    InvalidSetting { field: String, value: String },
    Io(std::io::Error),
}

impl Error {
    /// Timeouts, resets and 5xx-style answers are worth another attempt;
    /// bad credentials and garbled payloads are not.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Http(e) => !e.is_builder() && !e.is_decode(),
            Error::Status(_) => true,
            _ => false,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Http(e) => write!(f, "HTTP error: {e}"),
            Error::Status(code) => write!(f, "unexpected HTTP status {code}"),
            Error::Authentication(msg) => write!(f, "authentication failed: {msg}"),
            Error::Protocol(msg) => write!(f, "protocol error: {msg}"),
            Error::Unresolved(causes) => {
                write!(f, "no supported dialect found")?;
                if !causes.is_empty() {
                    write!(f, " ({})", causes.join("; "))?;
                }
                Ok(())
            }
            Error::InvalidSetting { field, value } => {
                write!(f, "invalid value {value:?} for {field}")
            }
            Error::Io(e) => write!(f, "IO error: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Http(e) => Some(e),
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Http(e)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
