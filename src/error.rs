use thiserror::Error;

/// Terminal failures for a widget session.
///
/// Every variant collapses the whole pipeline back to idle; none of them is
/// retried automatically. The embedding UI gets the `Display` rendering as a
/// single human-readable message.
#[derive(Debug, Error)]
pub enum Error {
    /// Required configuration is missing or invalid (e.g. no API key)
    #[error("configuration error: {0}")]
    Config(String),

    /// The host environment cannot capture audio at all
    #[error("audio capture is not supported in this environment: {0}")]
    UnsupportedEnvironment(String),

    /// An audio device exists but could not be acquired
    #[error("failed to acquire audio device: {0}")]
    DeviceAcquisition(String),

    /// The remote agent session failed
    #[error("agent session error: {0}")]
    Session(String),

    /// The session is closed (locally or by the remote)
    #[error("agent session is closed")]
    SessionClosed,
}

pub type Result<T> = std::result::Result<T, Error>;
