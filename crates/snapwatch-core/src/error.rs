use thiserror::Error;

/// The collector could not produce an authoritative snapshot.
///
/// A run that sees this must stop before touching the store: an empty or
/// partial snapshot persisted as the baseline would read as a mass removal.
#[derive(Debug, Error)]
pub enum CollectionError {
    #[error("{source_name} unreachable: {reason}")]
    Unreachable { source_name: String, reason: String },
    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("{source_name} returned malformed data: {reason}")]
    Malformed { source_name: String, reason: String },
    #[error("{source_name} returned partial data: {reason}")]
    Partial { source_name: String, reason: String },
}

impl CollectionError {
    pub fn unreachable(source_name: impl Into<String>, reason: impl ToString) -> Self {
        Self::Unreachable { source_name: source_name.into(), reason: reason.to_string() }
    }

    pub fn malformed(source_name: impl Into<String>, reason: impl ToString) -> Self {
        Self::Malformed { source_name: source_name.into(), reason: reason.to_string() }
    }

    pub fn partial(source_name: impl Into<String>, reason: impl ToString) -> Self {
        Self::Partial { source_name: source_name.into(), reason: reason.to_string() }
    }
}

/// A stored snapshot exists but cannot be read back.
#[derive(Debug, Error)]
#[error("snapshot for {target} is unreadable: {reason}")]
pub struct StoreCorruptError {
    pub target: String,
    pub reason: String,
}

/// The notification transport refused or failed the message.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("notifier misconfigured: {0}")]
    Config(String),
    #[error("dispatch failed: {0}")]
    Transport(String),
}
