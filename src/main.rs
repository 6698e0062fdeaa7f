use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::{error, info};

mod config;
mod hass;
mod ibeacon;
mod manager;
mod messages;
mod mqtt;
mod occupancy;
mod registry;
mod reporter;
mod tracker;

/// Reports room occupancy from nearby iBeacons.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,
}

/// Exit status when the Bluetooth radio cannot be brought up.
const RADIO_FAILURE: u8 = 1;

#[tokio::main]
async fn main() -> ExitCode {
    pretty_env_logger::formatted_timed_builder()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let args = Args::parse();

    let config = match config::AppConfig::load(&args.config) {
        Ok(config) => config,
        Err(err) => {
            error!("{}", err);
            return ExitCode::from(err.exit_code());
        }
    };

    let registry = registry::Registry::new(&config.beacons);
    for (name, watch) in registry.iter() {
        info!(
            "added beacon watch for: {}({})",
            name,
            ibeacon::canonical_uuid(&watch.uuid)
        );
    }

    let mut notifier = reporter::Notifier::default();
    if let Some(hass_config) = &config.hass {
        match hass::HassClient::new(hass_config, &config.entity) {
            Ok(client) => {
                info!("Reporting to Home Assistant at {}", client.uri());
                notifier.hass = Some(client);
            }
            Err(err) => {
                let err = config::ConfigError::Invalid(err.to_string());
                error!("{}", err);
                return ExitCode::from(err.exit_code());
            }
        }
    }

    let mut mqtt_event_loop = None;
    if let Some(mqtt_config) = &config.mqtt {
        let (client, eventloop) = mqtt::MqttClient::new(mqtt_config, &config.entity);
        info!("Reporting to MQTT topic {}", client.topic());
        notifier.mqtt = Some(client);
        mqtt_event_loop = Some(eventloop);
    }

    let adapter = match manager::adapter(config.adapter).await {
        Ok(adapter) => adapter,
        Err(err) => {
            error!("failed init: {:#}", err);
            return ExitCode::from(RADIO_FAILURE);
        }
    };

    let core = manager::Manager::new(
        adapter,
        registry,
        notifier,
        mqtt_event_loop,
        config.update_interval(),
    );
    if let Err(err) = core.run_loop().await {
        error!("{:#}", err);
        return ExitCode::from(RADIO_FAILURE);
    }

    ExitCode::SUCCESS
}
