use std::sync::Mutex;

use snapwatch_core::{DispatchError, Message};

use crate::traits::Notifier;

/// Prints instead of sending. Used by `--dry-run`.
#[derive(Clone, Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn describe(&self) -> String {
        "log".to_string()
    }

    fn send(&self, message: &Message) -> Result<(), DispatchError> {
        tracing::info!(subject = %message.subject, "notification (not sent)");
        println!("Subject: {}\n\n{}", message.subject, message.body);
        Ok(())
    }
}

/// Keeps every message it was asked to send.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Message>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Message> {
        match self.sent.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl Notifier for RecordingNotifier {
    fn describe(&self) -> String {
        "recording".to_string()
    }

    fn send(&self, message: &Message) -> Result<(), DispatchError> {
        let mut guard = self.sent.lock().map_err(|_| DispatchError::Transport("recorder poisoned".into()))?;
        guard.push(message.clone());
        Ok(())
    }
}

/// Refuses every message with a transport error; counts attempts.
#[derive(Debug, Default)]
pub struct FailingNotifier {
    attempts: Mutex<usize>,
}

impl FailingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.lock().map(|n| *n).unwrap_or_default()
    }
}

impl Notifier for FailingNotifier {
    fn describe(&self) -> String {
        "failing".to_string()
    }

    fn send(&self, _message: &Message) -> Result<(), DispatchError> {
        if let Ok(mut n) = self.attempts.lock() {
            *n += 1;
        }
        Err(DispatchError::Transport("connection refused".into()))
    }
}
