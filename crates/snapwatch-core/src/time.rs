use std::time::{SystemTime, UNIX_EPOCH};

/// Seconds since the UNIX epoch.
pub type EpochSecs = i64;

pub fn now_unix() -> EpochSecs {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}
