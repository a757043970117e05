//! Ambient light classification and alert payloads.
//!
//! The crate is `no_std` so that it can run next to the sensor as well as in
//! the observer service.
#![cfg_attr(not(test), no_std)]

pub mod alert;
pub mod ambient_light;

pub use alert::{Alert, AlertConfig, SlotId};
pub use ambient_light::{Classification, LightMonitor, MonitorConfig, Thresholds};
