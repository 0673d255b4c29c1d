use std::fmt;
use std::time::Duration;

use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{SmtpTransport, Transport};
use serde::{Deserialize, Serialize};
use snapwatch_core::{DispatchError, Message};

use crate::traits::Notifier;

/// `[email]` config section. Holds the *names* of the environment variables
/// carrying credentials, never the credentials themselves.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailSettings {
    pub username_env: String,
    pub password_env: String,
    pub recipient_env: String,
    pub cc_env: String,
    pub relay: String,
    pub port: u16,
    pub timeout_secs: u64,
}

impl Default for EmailSettings {
    fn default() -> Self {
        Self {
            username_env: "EMAIL_USERNAME".to_string(),
            password_env: "EMAIL_PASSWORD".to_string(),
            recipient_env: "EMAIL_RECIPIENT".to_string(),
            cc_env: "CC_RECIPIENT".to_string(),
            relay: "smtp.gmail.com".to_string(),
            port: 465,
            timeout_secs: 30,
        }
    }
}

impl EmailSettings {
    pub fn from_env(&self) -> Result<EmailConfig, DispatchError> {
        self.resolve_with(|name| std::env::var(name).ok())
    }

    /// Resolve credentials through `lookup`. Username, password and recipient
    /// are required; CC is optional and ignored when blank.
    pub fn resolve_with<F>(&self, lookup: F) -> Result<EmailConfig, DispatchError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| DispatchError::Config(format!("environment variable {} is not set", name)))
        };
        Ok(EmailConfig {
            sender: required(&self.username_env)?,
            secret: required(&self.password_env)?,
            recipient: required(&self.recipient_env)?,
            cc: lookup(&self.cc_env).map(|v| v.trim().to_string()).filter(|v| !v.is_empty()),
            relay: self.relay.clone(),
            port: self.port,
            timeout: Duration::from_secs(self.timeout_secs),
        })
    }
}

#[derive(Clone)]
pub struct EmailConfig {
    pub sender: String,
    pub secret: String,
    pub recipient: String,
    pub cc: Option<String>,
    pub relay: String,
    pub port: u16,
    pub timeout: Duration,
}

impl fmt::Debug for EmailConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmailConfig")
            .field("sender", &self.sender)
            .field("secret", &"<redacted>")
            .field("recipient", &self.recipient)
            .field("cc", &self.cc)
            .field("relay", &self.relay)
            .field("port", &self.port)
            .field("timeout", &self.timeout)
            .finish()
    }
}

fn mailbox(role: &str, raw: &str) -> Result<Mailbox, DispatchError> {
    raw.parse::<Mailbox>()
        .map_err(|e| DispatchError::Config(format!("invalid {} address {:?}: {}", role, raw, e)))
}

/// Plain-text email for `message`. The CC address, when configured, lands on
/// both the header and the envelope.
pub fn build_email(config: &EmailConfig, message: &Message) -> Result<lettre::Message, DispatchError> {
    let mut builder = lettre::Message::builder()
        .from(mailbox("sender", &config.sender)?)
        .to(mailbox("recipient", &config.recipient)?)
        .subject(message.subject.as_str())
        .header(ContentType::TEXT_PLAIN);
    if let Some(cc) = &config.cc {
        builder = builder.cc(mailbox("cc", cc)?);
    }
    builder
        .body(message.body.clone())
        .map_err(|e| DispatchError::Config(format!("cannot build email: {}", e)))
}

/// SMTP over implicit TLS (port 465 by default).
pub struct SmtpNotifier {
    config: EmailConfig,
    transport: SmtpTransport,
}

impl SmtpNotifier {
    pub fn new(config: EmailConfig) -> Result<Self, DispatchError> {
        let transport = SmtpTransport::relay(&config.relay)
            .map_err(|e| DispatchError::Config(format!("relay {}: {}", config.relay, e)))?
            .port(config.port)
            .credentials(Credentials::new(config.sender.clone(), config.secret.clone()))
            .timeout(Some(config.timeout))
            .build();
        Ok(Self { config, transport })
    }
}

impl Notifier for SmtpNotifier {
    fn describe(&self) -> String {
        format!("smtp {}:{} -> {}", self.config.relay, self.config.port, self.config.recipient)
    }

    fn send(&self, message: &Message) -> Result<(), DispatchError> {
        let email = build_email(&self.config, message)?;
        self.transport
            .send(&email)
            .map_err(|e| DispatchError::Transport(e.to_string()))?;
        tracing::info!(recipient = %self.config.recipient, subject = %message.subject, "email sent");
        Ok(())
    }
}

/// SMTP notifier that reads credentials from the environment on each send.
/// Runs that send nothing never need `EMAIL_*` to be set.
pub struct EnvSmtpNotifier {
    settings: EmailSettings,
}

impl EnvSmtpNotifier {
    pub fn new(settings: EmailSettings) -> Self {
        Self { settings }
    }
}

impl Notifier for EnvSmtpNotifier {
    fn describe(&self) -> String {
        format!("smtp {}:{} -> ${}", self.settings.relay, self.settings.port, self.settings.recipient_env)
    }

    fn send(&self, message: &Message) -> Result<(), DispatchError> {
        SmtpNotifier::new(self.settings.from_env()?)?.send(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn message() -> Message {
        Message { subject: "[snapwatch] camry: 1 new".into(), body: "+ https://dealer.example/used/1\n".into() }
    }

    #[test]
    fn resolves_credentials_from_named_variables() {
        let vars = env(&[
            ("EMAIL_USERNAME", "alerts@example.com"),
            ("EMAIL_PASSWORD", "app-password"),
            ("EMAIL_RECIPIENT", "me@example.com"),
            ("CC_RECIPIENT", "  "),
        ]);
        let cfg = EmailSettings::default().resolve_with(|k| vars.get(k).cloned()).unwrap();
        assert_eq!(cfg.sender, "alerts@example.com");
        assert_eq!(cfg.cc, None);
        assert_eq!(cfg.port, 465);
        assert!(!format!("{:?}", cfg).contains("app-password"));
    }

    #[test]
    fn missing_password_is_a_config_error() {
        let vars = env(&[("EMAIL_USERNAME", "a@example.com"), ("EMAIL_RECIPIENT", "b@example.com")]);
        let err = EmailSettings::default().resolve_with(|k| vars.get(k).cloned()).unwrap_err();
        assert!(matches!(err, DispatchError::Config(ref m) if m.contains("EMAIL_PASSWORD")));
    }

    #[test]
    fn cc_goes_on_header_and_envelope() {
        let cfg = EmailConfig {
            sender: "alerts@example.com".into(),
            secret: "x".into(),
            recipient: "me@example.com".into(),
            cc: Some("team@example.com".into()),
            relay: "smtp.gmail.com".into(),
            port: 465,
            timeout: Duration::from_secs(5),
        };
        let email = build_email(&cfg, &message()).unwrap();
        let to: Vec<String> = email.envelope().to().iter().map(|a| a.to_string()).collect();
        assert!(to.contains(&"me@example.com".to_string()));
        assert!(to.contains(&"team@example.com".to_string()));
        let raw = String::from_utf8(email.formatted()).unwrap();
        assert!(raw.contains("Cc: team@example.com"));
        assert!(raw.contains("Subject: [snapwatch] camry: 1 new"));
    }

    #[test]
    fn bad_address_is_rejected() {
        let cfg = EmailConfig {
            sender: "not an address".into(),
            secret: "x".into(),
            recipient: "me@example.com".into(),
            cc: None,
            relay: "smtp.gmail.com".into(),
            port: 465,
            timeout: Duration::from_secs(5),
        };
        assert!(matches!(build_email(&cfg, &message()), Err(DispatchError::Config(_))));
    }

    #[test]
    fn env_notifier_reports_unset_variables_at_send_time() {
        let settings = EmailSettings {
            username_env: "SNAPWATCH_TEST_UNSET_USER".into(),
            password_env: "SNAPWATCH_TEST_UNSET_PASSWORD".into(),
            recipient_env: "SNAPWATCH_TEST_UNSET_RECIPIENT".into(),
            ..EmailSettings::default()
        };
        let notifier = EnvSmtpNotifier::new(settings);
        assert!(notifier.describe().contains("SNAPWATCH_TEST_UNSET_RECIPIENT"));
        let err = notifier.send(&message()).unwrap_err();
        assert!(matches!(err, DispatchError::Config(ref m) if m.contains("SNAPWATCH_TEST_UNSET_USER")));
    }

    #[test]
    fn settings_section_defaults() {
        let s: EmailSettings = toml::from_str("relay = \"smtp.example.com\"").unwrap();
        assert_eq!(s.relay, "smtp.example.com");
        assert_eq!(s.username_env, "EMAIL_USERNAME");
        assert_eq!(s.port, 465);
    }
}
