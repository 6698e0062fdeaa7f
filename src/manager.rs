use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use btleplug::api::{Central as _, CentralEvent, Manager as _, Peripheral as _, ScanFilter};
use futures::StreamExt as _;
use log::{debug, error, info, warn};
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};

use crate::ibeacon;
use crate::messages::StateReport;
use crate::mqtt::MqttClient;
use crate::occupancy::Presence;
use crate::registry::Registry;
use crate::reporter::{Notifier, Reporter};

pub struct Manager {
    adapter: btleplug::platform::Adapter,
    presence: Arc<Presence>,
    reports: mpsc::UnboundedReceiver<StateReport>,
    notifier: Notifier,
    mqtt_event_loop: Option<rumqttc::EventLoop>,
    update_interval: Duration,
}

/// Picks the adapter at `index` (the first one by default).
pub async fn adapter(index: Option<usize>) -> anyhow::Result<btleplug::platform::Adapter> {
    let bt_manager = btleplug::platform::Manager::new()
        .await
        .context("failed to open Bluetooth manager")?;
    let adapters = bt_manager
        .adapters()
        .await
        .context("failed to list Bluetooth adapters")?;
    let index = index.unwrap_or_default();
    let count = adapters.len();
    adapters
        .into_iter()
        .nth(index)
        .with_context(|| format!("no Bluetooth adapter {index} ({count} available)"))
}

async fn handle_btle_events(
    adapter: &btleplug::platform::Adapter,
    presence: &Presence,
) -> anyhow::Result<()> {
    let mut events = adapter.events().await?;
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("quit detected. Stopping ops");
                break;
            }
            event = events.next() => {
                match event {
                    Some(CentralEvent::DeviceDiscovered(id))
                    | Some(CentralEvent::DeviceUpdated(id))
                    | Some(CentralEvent::ManufacturerDataAdvertisement { id, .. }) => {
                        if let Err(err) = handle_advertisement(adapter, &id, presence).await {
                            debug!("Skipping advertisement from {:?}: {:?}", id, err);
                        }
                    }
                    Some(_) => {}
                    None => {
                        warn!("No more events");
                        break;
                    }
                }
            }
        }
    }
    Ok(())
}

async fn handle_advertisement(
    adapter: &btleplug::platform::Adapter,
    id: &btleplug::platform::PeripheralId,
    presence: &Presence,
) -> Result<(), btleplug::Error> {
    let peripheral = adapter.peripheral(id).await?;
    let Some(properties) = peripheral.properties().await? else {
        return Ok(());
    };
    let Some(rssi) = properties.rssi else {
        return Ok(());
    };

    let now = std::time::Instant::now();
    for (company_id, payload) in &properties.manufacturer_data {
        if *company_id != ibeacon::APPLE_COMPANY_ID {
            continue;
        }
        let data = ibeacon::manufacturer_bytes(*company_id, payload);
        presence.observe(&data, rssi, now);
    }
    Ok(())
}

/// Evaluates occupancy every `period`, starting one period from now.
async fn run_ticker(presence: Arc<Presence>, period: Duration) {
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        let state = presence.evaluate(std::time::Instant::now());
        debug!("Occupancy {} ({} beacons tracked)", state, presence.tracked());
    }
}

impl Manager {
    pub fn new(
        adapter: btleplug::platform::Adapter,
        registry: Registry,
        notifier: Notifier,
        mqtt_event_loop: Option<rumqttc::EventLoop>,
        update_interval: Duration,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Manager {
            adapter,
            presence: Arc::new(Presence::new(registry, tx)),
            reports: rx,
            notifier,
            mqtt_event_loop,
            update_interval,
        }
    }

    pub async fn run_loop(self) -> anyhow::Result<()> {
        let Manager {
            adapter,
            presence,
            reports,
            notifier,
            mqtt_event_loop,
            update_interval,
        } = self;

        if presence.registry().is_empty() {
            warn!("No beacons configured, occupancy will always be inactive");
        }

        adapter
            .start_scan(ScanFilter::default())
            .await
            .context("failed to start Bluetooth scan")?;

        if let Some(mut eventloop) = mqtt_event_loop {
            tokio::task::spawn(async move {
                MqttClient::event_loop(&mut eventloop).await;
            });
        }

        let reporter = tokio::task::spawn(Reporter::new(reports, notifier.clone()).run());
        let ticker = tokio::task::spawn(run_ticker(presence.clone(), update_interval));

        let result = handle_btle_events(&adapter, &presence).await;
        if let Err(err) = &result {
            error!("Error handling BTLE events: {:?}", err);
        }

        ticker.abort();
        reporter.abort();

        if let Err(err) = adapter.stop_scan().await {
            error!("Error stopping scan: {:?}", err);
        }
        if let Some(mqtt) = &notifier.mqtt {
            if let Err(err) = mqtt.disconnect() {
                error!("Error disconnecting MQTT client: {:?}", err);
            }
        }
        if let Some(state) = presence.current() {
            info!("Last occupancy: {}", state);
        }
        info!("Exiting manager event loop");

        result
    }
}
