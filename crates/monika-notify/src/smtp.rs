//! SMTP mail sender.
//!
//! Port 465 uses implicit TLS, 587 upgrades with STARTTLS, and any other
//! port talks plain SMTP. Messages are wrapped in a small HTML template.

use std::time::Duration;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::{Credentials, Mechanism};
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{debug, info};

use monika_config::{ChannelKind, NotificationChannel, SmtpSettings};

use crate::error::{NotifyError, NotifyResult};
use crate::notifier::Notifier;

const SEND_TIMEOUT: Duration = Duration::from_secs(10);

const SUBJECT: &str = "Monika Notification";

const TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
  <body style="font-family: sans-serif; color: #1f2937;">
    <h2 style="margin-bottom: 16px;">Monika</h2>
    <p style="line-height: 1.5;">{{body}}</p>
  </body>
</html>
"#;

/// Sends notification mail through an SMTP relay.
#[derive(Debug, Default)]
pub struct SmtpNotifier;

impl SmtpNotifier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    fn kind(&self) -> &'static str {
        "smtp"
    }

    async fn send(&self, channel: &NotificationChannel, message: &str) -> NotifyResult<()> {
        let ChannelKind::Smtp(settings) = &channel.kind else {
            return Err(NotifyError::WrongChannel {
                id: channel.id.clone(),
                expected: "smtp",
                actual: channel.type_name().to_string(),
            });
        };
        if !settings.is_complete() {
            return Err(NotifyError::Config(format!(
                "smtp channel {} needs hostname, port and recipients",
                channel.id
            )));
        }

        let email = build_message(settings, message)?;
        let transport = build_transport(settings)?;

        transport
            .send(email)
            .await
            .map_err(|e| NotifyError::Smtp(e.to_string()))?;

        info!(channel = %channel.id, recipients = settings.recipients.len(), "smtp notification sent");
        Ok(())
    }
}

fn build_transport(settings: &SmtpSettings) -> NotifyResult<AsyncSmtpTransport<Tokio1Executor>> {
    let host = settings.hostname.as_str();
    let builder = match settings.port {
        465 => AsyncSmtpTransport::<Tokio1Executor>::relay(host),
        587 => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host),
        _ => Ok(AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)),
    }
    .map_err(|e| NotifyError::Smtp(e.to_string()))?;

    let mut builder = builder.port(settings.port).timeout(Some(SEND_TIMEOUT));
    if !settings.username.is_empty() {
        builder = builder
            .credentials(Credentials::new(
                settings.username.clone(),
                settings.password.clone(),
            ))
            .authentication(vec![Mechanism::Login, Mechanism::Plain]);
    }
    Ok(builder.build())
}

fn build_message(settings: &SmtpSettings, message: &str) -> NotifyResult<Message> {
    let from: Mailbox = format!("Monika <{}>", settings.username)
        .parse()
        .map_err(|e| NotifyError::Config(format!("invalid sender address: {e}")))?;

    let mut builder = Message::builder()
        .from(from)
        .subject(SUBJECT)
        .header(ContentType::TEXT_HTML);
    for recipient in &settings.recipients {
        let to: Mailbox = recipient
            .parse()
            .map_err(|e| NotifyError::Config(format!("invalid recipient {recipient}: {e}")))?;
        builder = builder.to(to);
    }

    debug!(recipients = ?settings.recipients, "smtp message built");
    builder
        .body(render_html(message))
        .map_err(|e| NotifyError::Smtp(e.to_string()))
}

/// Render a plain-text message into the mail template.
pub fn render_html(message: &str) -> String {
    let mut escaped = String::with_capacity(message.len());
    for c in message.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            '\n' => escaped.push_str("<br>"),
            _ => escaped.push(c),
        }
    }
    TEMPLATE.replace("{{body}}", &escaped)
}
