use std::time::Duration;

use async_trait::async_trait;
use lettre::{
    message::{Mailbox, MultiPart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

use crate::templates::EmailTemplate;
use crate::{Alert, AlertType, NotificationChannel, NotificationConfig, NotificationError, SmtpTls};

/// Email channel. Each alert goes out as one multipart (plain + HTML)
/// message addressed to every recipient.
pub struct SmtpNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Vec<Mailbox>,
}

fn parse_recipients(addresses: &[String]) -> Vec<Mailbox> {
    addresses
        .iter()
        .filter_map(|addr| match addr.parse() {
            Ok(mailbox) => Some(mailbox),
            Err(e) => {
                tracing::warn!("Skipping invalid recipient {}: {}", addr, e);
                None
            }
        })
        .collect()
}

fn build_transport(
    host: &str,
    config: &NotificationConfig,
    timeout: Duration,
) -> Result<AsyncSmtpTransport<Tokio1Executor>, NotificationError> {
    let builder = match config.smtp_tls {
        SmtpTls::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(host),
        SmtpTls::StartTls => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host),
        SmtpTls::None => Ok(AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)),
    }
    .map_err(|e| NotificationError::Smtp(format!("SMTP transport error: {}", e)))?
    .port(config.smtp_port)
    .timeout(Some(timeout));

    let builder = match (&config.smtp_username, &config.smtp_password) {
        (Some(user), Some(pass)) => builder.credentials(Credentials::new(user.clone(), pass.clone())),
        _ => builder,
    };
    Ok(builder.build())
}

/// `[AutoTrade] <title>`, with the traded symbols appended for order alerts.
fn subject(alert: &Alert) -> String {
    match &alert.alert_type {
        AlertType::TradesSubmitted { items } if !items.is_empty() => {
            let symbols: Vec<&str> = items.iter().map(|i| i.symbol.as_str()).collect();
            format!("[AutoTrade] {} ({})", alert.title, symbols.join(", "))
        }
        _ => format!("[AutoTrade] {}", alert.title),
    }
}

impl SmtpNotifier {
    pub fn new(config: &NotificationConfig) -> Result<Self, NotificationError> {
        let host = config
            .smtp_host
            .as_deref()
            .ok_or_else(|| NotificationError::Config("SMTP_HOST not set".into()))?;
        let from: Mailbox = config
            .smtp_from
            .as_deref()
            .ok_or_else(|| NotificationError::Config("SMTP_FROM_ADDRESS not set".into()))?
            .parse()
            .map_err(|e| NotificationError::Config(format!("Invalid from address: {}", e)))?;

        let to = parse_recipients(&config.smtp_to);
        if to.is_empty() {
            return Err(NotificationError::Config(
                "No valid NOTIFICATION_EMAIL_TO addresses".into(),
            ));
        }

        Ok(Self {
            transport: build_transport(host, config, config.send_timeout())?,
            from,
            to,
        })
    }

    fn build_message(&self, alert: &Alert) -> Result<Message, NotificationError> {
        let builder = self
            .to
            .iter()
            .fold(Message::builder().from(self.from.clone()), |b, r| b.to(r.clone()));

        builder
            .subject(subject(alert))
            .multipart(MultiPart::alternative_plain_html(
                EmailTemplate::render_plain(alert),
                EmailTemplate::render(alert),
            ))
            .map_err(|e| NotificationError::Smtp(format!("Failed to build email: {}", e)))
    }
}

#[async_trait]
impl NotificationChannel for SmtpNotifier {
    async fn send(&self, alert: &Alert) -> Result<(), NotificationError> {
        let email = self.build_message(alert)?;
        self.transport
            .send(email)
            .await
            .map_err(|e| NotificationError::Smtp(format!("Failed to send email: {}", e)))?;
        Ok(())
    }

    fn name(&self) -> &str {
        "smtp"
    }
}
