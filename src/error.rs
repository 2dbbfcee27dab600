use std::fmt;

#[derive(Debug)]
pub enum DaemonError {
    Config(String),
    TlsSetup(String),
    Io(std::io::Error),
    OutOfMemory,
}

impl fmt::Display for DaemonError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DaemonError::Config(msg) => write!(f, "config error: {msg}"),
            DaemonError::TlsSetup(msg) => write!(f, "tls setup error: {msg}"),
            DaemonError::Io(e) => write!(f, "io error: {e}"),
            DaemonError::OutOfMemory => write!(f, "out of memory"),
        }
    }
}

impl std::error::Error for DaemonError {}

impl From<std::io::Error> for DaemonError {
    fn from(e: std::io::Error) -> Self {
        DaemonError::Io(e)
    }
}
