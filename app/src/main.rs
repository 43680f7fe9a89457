use std::sync::Arc;
use std::time::Duration;

use infrastructure::{EventBus, Mqtt};
use settings::Settings;
use tokio::sync::mpsc;

use crate::camera::CameraHub;
use crate::device::{DeviceEvent, DeviceReconciler};
use crate::snapshot::SnapshotFetcher;
use crate::station::StationPoller;

mod adapter;
mod camera;
mod core;
mod device;
mod settings;
mod snapshot;
mod station;

struct Infrastructure {
    mqtt_client: Mqtt,
}

#[tokio::main(flavor = "multi_thread")]
pub async fn main() {
    let settings = Settings::new().expect("Error reading configuration");

    let mut infrastructure = Infrastructure::init(&settings)
        .await
        .expect("Error initializing infrastructure");

    let device_events = EventBus::<DeviceEvent>::new(64);
    let (stations_tx, stations_rx) = mpsc::channel(4);

    let cameras = Arc::new(CameraHub::new(settings.camera.clone(), settings.debug).expect("Invalid camera configuration"));

    let (homebridge_host, homebridge_responses) = settings
        .homebridge
        .new_host(&mut infrastructure.mqtt_client)
        .await
        .expect("Error initializing Homebridge");

    let reconciler = Arc::new(DeviceReconciler::new(
        homebridge_host,
        cameras.clone(),
        device_events.emitter(),
    ));

    let station_poller = StationPoller::new(
        settings.bloomsky.new_client().expect("Error creating Bloomsky client"),
        settings.bloomsky.poll_interval(settings.debug),
        stations_tx,
    );

    let snapshot_fetcher = SnapshotFetcher::new(
        settings.camera.cache_dir.clone(),
        Duration::from_secs(settings.bloomsky.timeout_secs),
    )
    .expect("Error creating snapshot client");
    let snapshot_events = device_events.subscribe();

    let http_server_exec = {
        let http_reconciler = reconciler.clone();
        let http_cameras = cameras.clone();
        let http_server = settings.http_server.clone();

        async move {
            http_server
                .run_server(move || {
                    vec![adapter::camera_api::new_routes(
                        http_reconciler.clone(),
                        http_cameras.clone(),
                    )]
                })
                .await
                .expect("HTTP server execution failed");
        }
    };

    tracing::info!("Starting infrastructure processing");
    let process_infrastucture = infrastructure.process();

    tracing::info!("Starting main loop");

    tokio::select!(
        _ = process_infrastucture => {},
        _ = station_poller.run() => {},
        _ = reconciler.run(stations_rx) => {},
        _ = snapshot_fetcher.run(snapshot_events) => {},
        _ = homebridge_responses.run() => {},
        _ = http_server_exec => {},
    );
}

impl Infrastructure {
    pub async fn init(settings: &Settings) -> anyhow::Result<Self> {
        settings
            .monitoring
            .clone()
            .with_debug(settings.debug)
            .init()
            .expect("Error initializing monitoring");

        let mqtt_client = settings.mqtt.new_client();

        Ok(Self { mqtt_client })
    }

    async fn process(self) {
        tokio::select!(
            _ = self.mqtt_client.process() => {},
        )
    }
}
