use std::future::Future;

use log::{debug, error, info};
use tokio::sync::mpsc;

use crate::hass::{HassClient, HassError};
use crate::messages::{ReportTrigger, StateReport};
use crate::mqtt::{MqttClient, MqttError};

#[derive(thiserror::Error, Debug)]
pub enum NotifyError {
    #[error("Home Assistant: {0}")]
    Hass(#[from] HassError),
    #[error("MQTT: {0}")]
    Mqtt(#[from] MqttError),
}

/// Something that accepts occupancy reports.
pub trait Notify {
    fn report(&self, report: &StateReport)
    -> impl Future<Output = Result<(), NotifyError>> + Send;
}

/// Every configured home automation backend.
#[derive(Debug, Clone, Default)]
pub struct Notifier {
    pub hass: Option<HassClient>,
    pub mqtt: Option<MqttClient>,
}

impl Notify for Notifier {
    /// Tries every backend; the first failure is returned after all were
    /// attempted.
    async fn report(&self, report: &StateReport) -> Result<(), NotifyError> {
        let mut result = Ok(());
        if let Some(hass) = &self.hass {
            if let Err(err) = hass.update_state(report).await {
                result = Err(err.into());
            }
        }
        if let Some(mqtt) = &self.mqtt {
            if let Err(err) = mqtt.announce_state(report) {
                if result.is_ok() {
                    result = Err(err.into());
                } else {
                    error!("Error announcing state on MQTT: {}", err);
                }
            }
        }
        result
    }
}

/// Sole consumer of state reports. A report is fully handled before the next
/// one is received.
pub struct Reporter<N> {
    rx: mpsc::UnboundedReceiver<StateReport>,
    notifier: N,
}

impl<N: Notify> Reporter<N> {
    pub fn new(rx: mpsc::UnboundedReceiver<StateReport>, notifier: N) -> Self {
        Reporter { rx, notifier }
    }

    pub async fn run(mut self) {
        while let Some(report) = self.rx.recv().await {
            match &report.trigger {
                ReportTrigger::NewActivity(name) => {
                    info!("Reporting {} (new activity for {})", report.state, name);
                }
                ReportTrigger::Sweep => debug!("Reporting {}", report.state),
            }

            if let Err(err) = self.notifier.report(&report).await {
                error!("Error reporting state {}: {}", report.state, err);
            }
        }
        debug!("Report channel closed");
    }
}
