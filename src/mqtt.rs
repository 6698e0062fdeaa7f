use std::time::Duration;

use log::{debug, error, info};
use rumqttc::{MqttOptions, QoS};

use crate::{
    config,
    messages::{StateReport, StateUpdate},
};

/// Pause before polling again after a connection error.
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct MqttClient {
    client: rumqttc::AsyncClient,
    topic: String,
}

#[derive(thiserror::Error, Debug)]
pub enum MqttError {
    #[error(transparent)]
    Client(#[from] rumqttc::ClientError),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl MqttClient {
    pub fn new(config: &config::MqttConfig, entity: &str) -> (Self, rumqttc::EventLoop) {
        let publisher_id = config
            .publisher_id
            .as_ref()
            .unwrap_or(&"occupancy-rs".to_string())
            .to_string();

        let mut mqttoptions = MqttOptions::new(
            publisher_id.clone(),
            config.host.clone(),
            config.port.unwrap_or(1883),
        );

        mqttoptions.set_keep_alive(Duration::from_secs(config.keep_alive_seconds.unwrap_or(5)));

        if let (Some(username), Some(password)) =
            (config.username.as_ref(), config.password.as_ref())
        {
            mqttoptions.set_credentials(username.clone(), password.clone());
        }

        let (client, eventloop) = rumqttc::AsyncClient::new(mqttoptions, 10);

        let topic_path = config.topic_path.clone().unwrap_or("occupancy".to_string());
        (
            MqttClient {
                client,
                topic: state_topic(&topic_path, &publisher_id, entity),
            },
            eventloop,
        )
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Drives the connection. Publishes are only sent while this is polled.
    pub async fn event_loop(eventloop: &mut rumqttc::EventLoop) {
        loop {
            match eventloop.poll().await {
                Ok(rumqttc::Event::Incoming(rumqttc::Packet::ConnAck(_))) => {
                    debug!("Connection acknowledged");
                }
                Ok(rumqttc::Event::Incoming(rumqttc::Packet::PubAck(_))) => {
                    debug!("Publish acknowledged");
                }
                Ok(_) => {}
                Err(e) => {
                    error!("Error polling MQTT event loop: {:?}", e);
                    tokio::time::sleep(RECONNECT_DELAY).await;
                }
            }
        }
    }

    /// Queues a retained state message. Fails instead of waiting when the
    /// request queue is full, e.g. while the broker is unreachable.
    pub fn announce_state(&self, report: &StateReport) -> Result<(), MqttError> {
        info!("Announcing {} on MQTT topic {}", report.state, self.topic);
        let payload = serde_json::to_string(&StateUpdate::from(report))?;
        self.client
            .try_publish(self.topic.clone(), QoS::AtLeastOnce, true, payload)?;
        Ok(())
    }

    pub fn disconnect(&self) -> Result<(), rumqttc::ClientError> {
        debug!("Disconnecting MQTT client");
        self.client.try_disconnect()
    }
}

fn state_topic(topic_path: &str, publisher_id: &str, entity: &str) -> String {
    format!(
        "{}/{}/{}/occupancy",
        topic_path,
        sanitize_name(publisher_id),
        sanitize_name(entity)
    )
}

fn sanitize_name(name: &str) -> String {
    // Lower-case, every non-alphanumeric character becomes an underscore
    name.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect::<String>()
}
