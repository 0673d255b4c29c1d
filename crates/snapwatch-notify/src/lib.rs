mod doubles;
mod email;
mod traits;

pub use doubles::{FailingNotifier, LogNotifier, RecordingNotifier};
pub use email::{build_email, EmailConfig, EmailSettings, EnvSmtpNotifier, SmtpNotifier};
pub use traits::Notifier;
