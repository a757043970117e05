//! Alert payload handed to a notification surface.

use core::fmt::Write;

use heapless::String;

/// Maximum length of an alert title in bytes
pub const ALERT_TITLE_BYTES: usize = 64;
/// Maximum length of an alert body in bytes. Large enough for any `f32`.
pub const ALERT_BODY_BYTES: usize = 64;

pub const DEFAULT_ALERT_TITLE: &str = "Light Level Notification";

/// Notification slot. Posting to an occupied slot replaces its alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotId(pub u32);

impl Default for SlotId {
    fn default() -> Self {
        Self(101)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlertConfig {
    slot: SlotId,
    title: String<ALERT_TITLE_BYTES>,
}

impl AlertConfig {
    /// Returns `None` if the title does not fit into [`ALERT_TITLE_BYTES`].
    pub fn new(slot: SlotId, title: &str) -> Option<Self> {
        let mut owned = String::new();
        owned.push_str(title).ok()?;
        Some(Self { slot, title: owned })
    }

    pub fn slot(&self) -> SlotId {
        self.slot
    }

    pub fn title(&self) -> &str {
        self.title.as_str()
    }
}

impl Default for AlertConfig {
    fn default() -> Self {
        let mut title = String::new();
        // The default title is shorter than the capacity
        let _ = title.push_str(DEFAULT_ALERT_TITLE);
        Self {
            slot: SlotId::default(),
            title,
        }
    }
}

/// A single alert. It has no identity apart from its slot.
#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    slot: SlotId,
    title: String<ALERT_TITLE_BYTES>,
    body: String<ALERT_BODY_BYTES>,
    lux: f32,
}

impl Alert {
    pub fn new(config: &AlertConfig, lux: f32) -> Self {
        let mut body = String::new();
        // Debug formatting keeps the fractional part ("250.0", not "250").
        // The body buffer fits the longest rendering, so this cannot fail.
        let _ = write!(body, "Current light level: {:?} lux", lux);
        Self {
            slot: config.slot,
            title: config.title.clone(),
            body,
            lux,
        }
    }

    pub fn slot(&self) -> SlotId {
        self.slot
    }

    pub fn title(&self) -> &str {
        self.title.as_str()
    }

    pub fn body(&self) -> &str {
        self.body.as_str()
    }

    /// The reading that triggered this alert
    pub fn lux(&self) -> f32 {
        self.lux
    }
}
