use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info};

use crate::config::MailConfig;

#[derive(Debug, Clone, Serialize)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub text: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: EmailMessage) -> anyhow::Result<()>;
}

/// Posts messages as JSON to an HTTP mail relay.
pub struct HttpMailer {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
    from: String,
}

#[derive(Serialize)]
struct RelayPayload<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    text: &'a str,
}

impl HttpMailer {
    pub fn new(url: String, api_key: Option<String>, from: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
            api_key,
            from,
        }
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, message: EmailMessage) -> anyhow::Result<()> {
        let payload = RelayPayload {
            from: &self.from,
            to: &message.to,
            subject: &message.subject,
            text: &message.text,
        };
        let mut req = self.client.post(&self.url).json(&payload);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        req.send()
            .await
            .context("mail relay request")?
            .error_for_status()
            .context("mail relay response")?;
        info!(to = %message.to, subject = %message.subject, "mail sent");
        Ok(())
    }
}

/// Development mailer: writes the message to the log. The body carries
/// live reset links, so it only appears at `debug`.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: EmailMessage) -> anyhow::Result<()> {
        info!(to = %message.to, subject = %message.subject, "mail (log only)");
        debug!(to = %message.to, text = %message.text, "mail body");
        Ok(())
    }
}

pub fn from_config(cfg: &MailConfig) -> Arc<dyn Mailer> {
    match &cfg.api_url {
        Some(url) => Arc::new(HttpMailer::new(url.clone(), cfg.api_key.clone(), cfg.from.clone())),
        None => Arc::new(LogMailer),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{io, sync::Mutex};

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn log_mailer_keeps_body_out_of_info_logs() {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        LogMailer
            .send(EmailMessage {
                to: "ada@example.com".into(),
                subject: "Your password reset token".into(),
                text: "http://tours.test/users/resetPassword/0123abcdef".into(),
            })
            .await
            .unwrap();

        let logged = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert!(logged.contains("ada@example.com"));
        assert!(!logged.contains("0123abcdef"));
    }
}
