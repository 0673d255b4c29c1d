use snapwatch_core::{DispatchError, Message};

/// Delivers a rendered message. One attempt per call; callers decide what
/// a failure means for the baseline.
pub trait Notifier: Send + Sync {
    fn describe(&self) -> String;
    fn send(&self, message: &Message) -> Result<(), DispatchError>;
}
