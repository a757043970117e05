//! Delivery of sensor readings to subscribed listeners.
//!
//! The sensor device prints one reading per line over serial. A reader
//! thread parses those lines and publishes the lux values to a [`SensorHub`],
//! which calls every registered listener synchronously.

use std::{
    io::{self, BufRead},
    sync::{Arc, Mutex, MutexGuard, Weak},
};

use lazy_static::lazy_static;
use regex::Regex;

type Listener = Box<dyn FnMut(f32) + Send>;

#[derive(Default)]
struct Listeners {
    next_id: u64,
    entries: Vec<(u64, Listener)>,
}

fn lock(listeners: &Mutex<Listeners>) -> MutexGuard<'_, Listeners> {
    // A panicking listener must not take the whole hub down with it
    listeners.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Clone, Default)]
pub struct SensorHub {
    listeners: Arc<Mutex<Listeners>>,
}

impl SensorHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener for lux readings.
    ///
    /// The listener stays registered for as long as the returned
    /// [`Subscription`] is alive. Listeners are called with the hub locked,
    /// so they must not subscribe or publish themselves.
    #[must_use = "dropping the subscription unregisters the listener immediately"]
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: FnMut(f32) + Send + 'static,
    {
        let mut listeners = lock(&self.listeners);
        let id = listeners.next_id;
        listeners.next_id += 1;
        listeners.entries.push((id, Box::new(listener)));
        tracing::debug!(id, "Sensor listener registered");
        Subscription {
            id,
            listeners: Arc::downgrade(&self.listeners),
        }
    }

    /// Deliver a reading to all listeners, in registration order.
    ///
    /// Returns the number of listeners that were called.
    pub fn publish(&self, lux: f32) -> usize {
        let mut listeners = lock(&self.listeners);
        for (_, listener) in listeners.entries.iter_mut() {
            listener(lux);
        }
        listeners.entries.len()
    }

    pub fn listener_count(&self) -> usize {
        lock(&self.listeners).entries.len()
    }
}

/// Registration guard returned by [`SensorHub::subscribe`].
///
/// Dropping it unregisters the listener.
pub struct Subscription {
    id: u64,
    listeners: Weak<Mutex<Listeners>>,
}

impl Subscription {
    /// Unregister the listener now.
    pub fn cancel(self) {
        // Drop does the work
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        // The hub may already be gone
        if let Some(listeners) = self.listeners.upgrade() {
            lock(&listeners).entries.retain(|(id, _)| *id != self.id);
            tracing::debug!(id = self.id, "Sensor listener unregistered");
        }
    }
}

/// Parse a line of sensor output and return the lux value, if any.
///
/// Accepted are `:: Lux: <value>` lines and lines that only contain a
/// number. Everything else (status output, other sensors) is ignored.
pub fn parse_line(line: &str) -> Option<f32> {
    // Patterns
    lazy_static! {
        static ref LUX_RE: Regex =
            Regex::new(r"^(?:::\s*Lux:\s*)?(?P<lux>[-+]?(?:[0-9]+\.?[0-9]*|\.[0-9]+)(?:[eE][-+]?[0-9]+)?)$")
                .unwrap();
    }

    LUX_RE
        .captures(line.trim())
        .and_then(|capture| capture["lux"].parse().ok())
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReaderStats {
    /// Lines read in total
    pub lines: u64,
    /// Lines that contained a reading
    pub readings: u64,
    /// Lines that were not recognized
    pub ignored: u64,
}

/// Read lines until EOF and publish every reading to the hub.
///
/// Timeouts and undecodable lines are skipped. Any other read error (e.g. an
/// unplugged device) ends the stream like EOF does.
pub fn pump_readings<R: BufRead>(mut reader: R, hub: &SensorHub) -> ReaderStats {
    let mut stats = ReaderStats::default();
    let mut line_buffer = String::new();
    loop {
        match reader.read_line(&mut line_buffer) {
            Ok(0) => break,
            Ok(_size) => {
                stats.lines += 1;
                match parse_line(&line_buffer) {
                    Some(lux) => {
                        stats.readings += 1;
                        hub.publish(lux);
                    }
                    None => {
                        stats.ignored += 1;
                        tracing::trace!(line = line_buffer.trim(), "Ignoring line");
                    }
                }
            }
            Err(e) if e.kind() == io::ErrorKind::TimedOut => {
                tracing::debug!("Timeout while waiting for sensor data");
            }
            Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                // read_line consumed the bytes, so the next line is clean
                stats.ignored += 1;
                tracing::debug!("Ignoring line that is not valid UTF-8");
            }
            Err(e) => {
                tracing::error!("Error while reading, stopping: {}", e);
                break;
            }
        }
        line_buffer.clear();
    }
    stats
}
