//! Notification surfaces that alerts are posted to.

use std::collections::HashMap;

use async_trait::async_trait;
use light_monitor::{Alert, SlotId};
use threema_gateway::{ApiBuilder, E2eApi, PublicKey, RecipientKey, SecretKey};
use tokio::sync::mpsc::UnboundedReceiver;

use crate::config::Threema;

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Threema gateway error: {0}")]
    Gateway(String),
    #[error("Delivery failed for {failed} (out of {total} recipients)")]
    Recipients { failed: String, total: usize },
}

#[async_trait]
pub trait NotificationSurface: Send {
    /// Short name used in log output
    fn name(&self) -> &'static str;

    /// Show an alert, replacing any alert in the same slot where supported.
    async fn post(&mut self, alert: &Alert) -> Result<(), NotifyError>;
}

/// Surface that writes alerts to the log.
///
/// Keeps the currently shown alert per slot, so a new alert in the same slot
/// replaces the previous one.
#[derive(Debug, Default)]
pub struct LogSurface {
    shown: HashMap<SlotId, Alert>,
}

impl LogSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// The alert currently shown in `slot`
    #[cfg(test)]
    pub fn shown(&self, slot: SlotId) -> Option<&Alert> {
        self.shown.get(&slot)
    }

    #[cfg(test)]
    pub fn shown_count(&self) -> usize {
        self.shown.len()
    }
}

#[async_trait]
impl NotificationSurface for LogSurface {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn post(&mut self, alert: &Alert) -> Result<(), NotifyError> {
        let slot = alert.slot().0;
        match self.shown.insert(alert.slot(), alert.clone()) {
            Some(previous) => tracing::info!(
                slot,
                replaced_lux = previous.lux(),
                "{}: {}",
                alert.title(),
                alert.body()
            ),
            None => tracing::info!(slot, "{}: {}", alert.title(), alert.body()),
        }
        Ok(())
    }
}

/// Sends a text message to a single recipient.
#[async_trait]
pub trait MessageSender: Send {
    async fn send_text(&mut self, recipient: &str, text: &str) -> Result<(), NotifyError>;
}

/// Threema Gateway in end-to-end mode. Public keys are looked up once.
pub struct ThreemaGateway {
    api: E2eApi,
    public_keys: HashMap<String, PublicKey>,
}

impl ThreemaGateway {
    pub fn new(
        gateway_id: String,
        gateway_secret: String,
        private_key: SecretKey,
    ) -> anyhow::Result<Self> {
        let api = ApiBuilder::new(gateway_id, gateway_secret)
            .with_private_key(private_key)
            .into_e2e()?;
        Ok(Self {
            api,
            public_keys: HashMap::new(),
        })
    }

    async fn public_key(&mut self, recipient: &str) -> Result<PublicKey, NotifyError> {
        if let Some(key) = self.public_keys.get(recipient) {
            return Ok(key.clone());
        }
        let key = self
            .api
            .lookup_pubkey(recipient)
            .await
            .map_err(|e| NotifyError::Gateway(e.to_string()))?;
        self.public_keys.insert(recipient.to_string(), key.clone());
        Ok(key)
    }
}

#[async_trait]
impl MessageSender for ThreemaGateway {
    async fn send_text(&mut self, recipient: &str, text: &str) -> Result<(), NotifyError> {
        let key = RecipientKey(self.public_key(recipient).await?);
        let encrypted = self.api.encrypt_text_msg(text, &key);
        let message_id = self
            .api
            .send(recipient, &encrypted, false)
            .await
            .map_err(|e| NotifyError::Gateway(e.to_string()))?;
        tracing::debug!(recipient, message_id = message_id.as_str(), "Sent Threema message");
        Ok(())
    }
}

/// Surface that sends alerts as end-to-end encrypted Threema messages.
///
/// Messages cannot be retracted, so slots have no effect here.
pub struct ThreemaSurface<S = ThreemaGateway> {
    sender: S,
    recipients: Vec<String>,
}

impl ThreemaSurface<ThreemaGateway> {
    pub fn new(config: Threema) -> anyhow::Result<Self> {
        let gateway =
            ThreemaGateway::new(config.gateway_id, config.gateway_secret, config.private_key)?;
        Ok(Self::with_sender(gateway, config.recipients))
    }
}

impl<S: MessageSender> ThreemaSurface<S> {
    pub fn with_sender(sender: S, recipients: Vec<String>) -> Self {
        Self { sender, recipients }
    }
}

#[async_trait]
impl<S: MessageSender> NotificationSurface for ThreemaSurface<S> {
    fn name(&self) -> &'static str {
        "threema"
    }

    /// Every recipient is tried, even if an earlier one failed.
    async fn post(&mut self, alert: &Alert) -> Result<(), NotifyError> {
        let text = format!("{}\n{}", alert.title(), alert.body());
        let mut failed = Vec::new();
        for recipient in &self.recipients {
            if let Err(e) = self.sender.send_text(recipient, &text).await {
                tracing::warn!(recipient = recipient.as_str(), "Sending alert failed: {}", e);
                failed.push(recipient.as_str());
            }
        }
        if failed.is_empty() {
            Ok(())
        } else {
            Err(NotifyError::Recipients {
                failed: failed.join(", "),
                total: self.recipients.len(),
            })
        }
    }
}

/// Posts alerts to every surface.
pub struct Dispatcher {
    surfaces: Vec<Box<dyn NotificationSurface>>,
}

impl Dispatcher {
    pub fn new(surfaces: Vec<Box<dyn NotificationSurface>>) -> Self {
        Self { surfaces }
    }

    /// Post a single alert. Returns the number of surfaces that accepted it.
    ///
    /// A failing surface is logged and does not keep the others from
    /// receiving the alert.
    pub async fn dispatch(&mut self, alert: &Alert) -> usize {
        let mut delivered = 0;
        for surface in self.surfaces.iter_mut() {
            match surface.post(alert).await {
                Ok(()) => delivered += 1,
                Err(e) => tracing::error!(surface = surface.name(), "Posting alert failed: {}", e),
            }
        }
        delivered
    }

    /// Post alerts until all senders are gone.
    pub async fn run(&mut self, mut alerts: UnboundedReceiver<Alert>) {
        while let Some(alert) = alerts.recv().await {
            self.dispatch(&alert).await;
        }
        tracing::debug!("Alert channel closed");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use light_monitor::AlertConfig;
    use tokio::sync::mpsc;

    use super::*;

    /// Surface that records what it was asked to post
    struct Recording {
        posted: Arc<Mutex<Vec<Alert>>>,
    }

    #[async_trait]
    impl NotificationSurface for Recording {
        fn name(&self) -> &'static str {
            "recording"
        }

        async fn post(&mut self, alert: &Alert) -> Result<(), NotifyError> {
            self.posted.lock().unwrap().push(alert.clone());
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl NotificationSurface for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn post(&mut self, _alert: &Alert) -> Result<(), NotifyError> {
            Err(NotifyError::Gateway("unreachable".to_string()))
        }
    }

    #[tokio::test]
    async fn test_log_surface_replaces_slot() {
        let config = AlertConfig::default();
        let mut surface = LogSurface::new();

        surface.post(&Alert::new(&config, 250.0)).await.unwrap();
        surface.post(&Alert::new(&config, 300.0)).await.unwrap();

        assert_eq!(surface.shown_count(), 1);
        let shown = surface.shown(config.slot()).unwrap();
        assert_eq!(shown.lux(), 300.0);
        assert!(shown.body().contains("300.0"));
    }

    #[tokio::test]
    async fn test_log_surface_separate_slots() {
        let mut surface = LogSurface::new();
        let first = AlertConfig::new(SlotId(1), "first").unwrap();
        let second = AlertConfig::new(SlotId(2), "second").unwrap();

        surface.post(&Alert::new(&first, 250.0)).await.unwrap();
        surface.post(&Alert::new(&second, 260.0)).await.unwrap();

        assert_eq!(surface.shown_count(), 2);
        assert_eq!(surface.shown(SlotId(1)).unwrap().title(), "first");
        assert_eq!(surface.shown(SlotId(2)).unwrap().title(), "second");
    }

    #[tokio::test]
    async fn test_dispatch_survives_failing_surface() {
        let posted = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = Dispatcher::new(vec![
            Box::new(Failing),
            Box::new(Recording {
                posted: posted.clone(),
            }),
        ]);

        let alert = Alert::new(&AlertConfig::default(), 250.0);
        assert_eq!(dispatcher.dispatch(&alert).await, 1);
        assert_eq!(posted.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_run_drains_channel() {
        let posted = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = Dispatcher::new(vec![Box::new(Recording {
            posted: posted.clone(),
        })]);

        let (tx, rx) = mpsc::unbounded_channel();
        let config = AlertConfig::default();
        tx.send(Alert::new(&config, 250.0)).unwrap();
        tx.send(Alert::new(&config, 400.0)).unwrap();
        drop(tx);

        dispatcher.run(rx).await;

        let posted = posted.lock().unwrap();
        let lux: Vec<f32> = posted.iter().map(Alert::lux).collect();
        assert_eq!(lux, vec![250.0, 400.0]);
    }

    /// Sender that fails for some recipients and records the others
    struct Gateway {
        unknown: Vec<&'static str>,
        delivered: Vec<(String, String)>,
    }

    #[async_trait]
    impl MessageSender for Gateway {
        async fn send_text(&mut self, recipient: &str, text: &str) -> Result<(), NotifyError> {
            if self.unknown.iter().any(|id| *id == recipient) {
                return Err(NotifyError::Gateway(format!("Unknown ID {}", recipient)));
            }
            self.delivered.push((recipient.to_string(), text.to_string()));
            Ok(())
        }
    }

    fn recipients(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|id| id.to_string()).collect()
    }

    #[tokio::test]
    async fn test_threema_sends_title_and_body() {
        let gateway = Gateway {
            unknown: vec![],
            delivered: vec![],
        };
        let mut surface = ThreemaSurface::with_sender(gateway, recipients(&["AAAAAAAA"]));

        surface
            .post(&Alert::new(&AlertConfig::default(), 250.0))
            .await
            .unwrap();

        assert_eq!(
            surface.sender.delivered,
            vec![(
                "AAAAAAAA".to_string(),
                "Light Level Notification\nCurrent light level: 250.0 lux".to_string()
            )]
        );
    }

    #[tokio::test]
    async fn test_threema_bad_recipient_does_not_block_others() {
        let gateway = Gateway {
            unknown: vec!["BADID000"],
            delivered: vec![],
        };
        let mut surface =
            ThreemaSurface::with_sender(gateway, recipients(&["BADID000", "AAAAAAAA", "BBBBBBBB"]));

        let result = surface
            .post(&Alert::new(&AlertConfig::default(), 250.0))
            .await;

        let delivered: Vec<&str> = surface
            .sender
            .delivered
            .iter()
            .map(|(recipient, _)| recipient.as_str())
            .collect();
        assert_eq!(delivered, vec!["AAAAAAAA", "BBBBBBBB"]);
        match result {
            Err(NotifyError::Recipients { failed, total }) => {
                assert_eq!(failed, "BADID000");
                assert_eq!(total, 3);
            }
            other => panic!("Unexpected result: {:?}", other),
        }
    }
}
