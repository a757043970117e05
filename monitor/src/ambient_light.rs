//! Ambient light classifier.
//!
//! Every reading is classified on its own. There is no hysteresis, so a value
//! hovering around a threshold will flip classification on every reading.
use crate::alert::{Alert, AlertConfig};

/// Default upper bound (inclusive) for "dark" readings, in lux
pub const DEFAULT_DARK_THRESHOLD: f32 = 10.0;
/// Default lower bound (inclusive) for "bright" readings, in lux
pub const DEFAULT_BRIGHT_THRESHOLD: f32 = 200.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    /// Lux values at or below this value are considered dark
    dark: f32,
    /// Lux values at or above this value are considered bright
    bright: f32,
}

impl Thresholds {
    /// Create a new threshold pair.
    ///
    /// Returns `None` unless both values are finite and `dark < bright`.
    pub fn new(dark: f32, bright: f32) -> Option<Self> {
        if dark.is_finite() && bright.is_finite() && dark < bright {
            Some(Self { dark, bright })
        } else {
            None
        }
    }

    pub fn dark(&self) -> f32 {
        self.dark
    }

    pub fn bright(&self) -> f32 {
        self.bright
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            dark: DEFAULT_DARK_THRESHOLD,
            bright: DEFAULT_BRIGHT_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Dark,
    Bright,
    Intermediate,
}

impl Classification {
    /// Whether a reading with this classification should raise an alert.
    pub fn triggers_alert(&self) -> bool {
        matches!(self, Self::Bright)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dark => "dark",
            Self::Bright => "bright",
            Self::Intermediate => "intermediate",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MonitorConfig {
    pub thresholds: Thresholds,
    pub alert: AlertConfig,
}

/// Light-level monitor.
///
/// Holds only configuration, never the previous reading.
#[derive(Debug, Clone, Default)]
pub struct LightMonitor {
    config: MonitorConfig,
}

impl LightMonitor {
    pub fn new(config: MonitorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Classify a single reading.
    ///
    /// Values are not validated: negative values are dark and NaN is
    /// intermediate. Both boundaries are inclusive, and the dark check wins.
    pub fn on_reading(&self, lux: f32) -> Classification {
        let thresholds = &self.config.thresholds;
        if lux <= thresholds.dark {
            Classification::Dark
        } else if lux >= thresholds.bright {
            Classification::Bright
        } else {
            Classification::Intermediate
        }
    }

    /// Build the alert payload for a reading.
    pub fn alert_for(&self, lux: f32) -> Alert {
        Alert::new(&self.config.alert, lux)
    }
}
