use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    NotConnected,
    InvalidMethod(String),
    InvalidDate(String),
    InvalidTimeUnit(String),
    TimeOutOfRange { amount: i64, unit: String },
    InvalidCredentialFile(PathBuf),
    ConfigDirUnavailable,
    Prompt(std::io::Error),
    HttpStatus(u16),
    IncompleteTransfer { path: PathBuf, written: u64 },
    Transport(String),
    IoError(std::io::Error),
    JsonError(serde_json::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match *self {
            Error::NotConnected => write!(f, "Not Connected"),
            Error::InvalidMethod(ref method) => write!(f, "invalid api method: {method}"),
            Error::InvalidDate(ref date) => write!(
                f,
                "invalid date '{date}', expected YYYY-MM-DD HH:MM:SS"
            ),
            Error::InvalidTimeUnit(ref unit) => write!(f, "invalid time unit: {unit}"),
            Error::TimeOutOfRange { amount, ref unit } => {
                write!(f, "{amount} {unit} ago is out of range")
            }
            Error::InvalidCredentialFile(ref path) => {
                write!(f, "unreadable credential file: {}", path.display())
            }
            Error::ConfigDirUnavailable => write!(f, "could not determine a config directory"),
            Error::Prompt(ref err) => write!(f, "password prompt failed: {err}"),
            Error::HttpStatus(status) => write!(f, "server answered with status {status}"),
            Error::IncompleteTransfer { ref path, written } => write!(
                f,
                "incomplete transfer to {} after {written} bytes",
                path.display()
            ),
            Error::Transport(ref msg) => write!(f, "{msg}"),
            Error::IoError(ref err) => write!(f, "{err}"),
            Error::JsonError(ref err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match *self {
            Error::Prompt(ref err) => Some(err),
            Error::IoError(ref err) => Some(err),
            Error::JsonError(ref err) => Some(err),
            _ => None,
        }
    }
}

impl std::convert::From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Error {
        Error::IoError(error)
    }
}

impl std::convert::From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Error {
        Error::JsonError(error)
    }
}

impl std::convert::From<reqwest::Error> for Error {
    fn from(error: reqwest::Error) -> Error {
        Error::Transport(error.to_string())
    }
}
