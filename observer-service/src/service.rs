//! Wiring between sensor, monitor and notification surfaces.

use std::{
    io::{self, BufRead, BufReader},
    time::Duration,
};

use anyhow::Context;
use light_monitor::{Alert, Classification, LightMonitor};
use tokio::sync::{mpsc, oneshot};

use crate::{
    config::{Config, Serial, Threema},
    notify::{Dispatcher, LogSurface, NotificationSurface, ThreemaSurface},
    sensor::{pump_readings, SensorHub},
};

/// Reading used for `--test-alert`
pub const TEST_ALERT_LUX: f32 = 10.123;

/// Create the reading listener.
///
/// Every reading is classified and logged. Bright readings are turned into
/// alerts and sent to the dispatcher.
pub fn reading_listener(
    monitor: LightMonitor,
    alerts: mpsc::UnboundedSender<Alert>,
) -> impl FnMut(f32) + Send + 'static {
    move |lux| {
        let classification = monitor.on_reading(lux);
        tracing::debug!(lux, classification = classification.as_str(), "Lux reading");
        match classification {
            Classification::Dark => tracing::info!(lux, "It's dark"),
            Classification::Bright => tracing::info!(lux, "It's bright"),
            Classification::Intermediate => tracing::info!(lux, "Intermediate light level"),
        }
        if classification.triggers_alert() && alerts.send(monitor.alert_for(lux)).is_err() {
            tracing::warn!(lux, "Alert channel closed, dropping alert");
        }
    }
}

fn build_dispatcher(threema: Option<Threema>) -> anyhow::Result<Dispatcher> {
    let mut surfaces: Vec<Box<dyn NotificationSurface>> = vec![Box::new(LogSurface::new())];
    if let Some(threema) = threema {
        let recipients = threema.recipients.len();
        surfaces.push(Box::new(
            ThreemaSurface::new(threema).context("Failed to set up Threema gateway")?,
        ));
        tracing::info!(recipients, "Threema notifications enabled");
    }
    Ok(Dispatcher::new(surfaces))
}

/// Open the reading source: the serial port if configured, stdin otherwise.
fn open_source(serial: Option<&Serial>) -> anyhow::Result<Box<dyn BufRead + Send>> {
    match serial {
        Some(serial) => {
            let raw_port = serialport::new(serial.port.to_string_lossy(), serial.baudrate)
                .timeout(Duration::from_secs(30))
                .open()
                .context(format!("Failed to open serial port at {:?}", serial.port))?;
            tracing::info!(port = ?serial.port, baudrate = serial.baudrate, "Reading from serial port");
            Ok(Box::new(BufReader::new(raw_port)))
        }
        None => {
            tracing::info!("No serial port configured, reading from stdin");
            Ok(Box::new(BufReader::new(io::stdin())))
        }
    }
}

/// Post a single alert to all surfaces and return.
pub async fn send_test_alert(config: Config) -> anyhow::Result<()> {
    let mut dispatcher = build_dispatcher(config.threema)?;
    let alert = LightMonitor::new(config.monitor).alert_for(TEST_ALERT_LUX);
    let delivered = dispatcher.dispatch(&alert).await;
    tracing::info!(delivered, "Test alert posted");
    Ok(())
}

/// Monitor readings until the sensor stream ends or Ctrl-C is pressed.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let dispatcher = build_dispatcher(config.threema)?;
    let source = open_source(config.serial.as_ref())?;
    run_with(LightMonitor::new(config.monitor), source, dispatcher).await
}

/// Pump `source` through the monitor and post alerts with `dispatcher`.
///
/// Returns once the source is exhausted (or Ctrl-C is pressed) and all
/// pending alerts have been posted.
pub async fn run_with(
    monitor: LightMonitor,
    source: Box<dyn BufRead + Send>,
    mut dispatcher: Dispatcher,
) -> anyhow::Result<()> {
    let hub = SensorHub::new();
    let (alert_tx, alert_rx) = mpsc::unbounded_channel();
    let subscription = hub.subscribe(reading_listener(monitor, alert_tx));
    tracing::debug!(listeners = hub.listener_count(), "Monitor subscribed");

    // The blocking reader gets its own thread. It is not joined: a serial
    // read cannot be interrupted, and the process exits after shutdown.
    let (done_tx, done_rx) = oneshot::channel();
    let reader_hub = hub.clone();
    std::thread::Builder::new()
        .name("sensor-reader".to_string())
        .spawn(move || {
            let stats = pump_readings(source, &reader_hub);
            let _ = done_tx.send(stats);
        })
        .context("Failed to spawn sensor reader thread")?;

    let dispatcher_task = tokio::spawn(async move { dispatcher.run(alert_rx).await });

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for Ctrl-C")?;
            tracing::info!("Interrupted, shutting down");
        }
        stats = done_rx => {
            match stats {
                Ok(stats) => tracing::info!(
                    lines = stats.lines,
                    readings = stats.readings,
                    ignored = stats.ignored,
                    "Sensor stream ended"
                ),
                Err(_) => tracing::warn!("Sensor reader stopped unexpectedly"),
            }
        }
    }

    // Unregistering the listener drops the alert sender, which lets the
    // dispatcher drain the remaining alerts and finish.
    subscription.cancel();
    dispatcher_task.await.context("Alert dispatcher failed")?;
    Ok(())
}
