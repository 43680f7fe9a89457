use std::sync::Arc;

use infrastructure::{EventEmitter, meter};
use tokio::sync::{Mutex, mpsc};

use crate::camera::CameraHub;
use crate::station::Station;

use super::{AccessoryHost, DeviceEvent, DeviceId, DeviceRecord, DeviceRegistry};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcileReport {
    pub created: Vec<DeviceId>,
    pub updated: Vec<DeviceId>,
    pub reachable: bool,
}

pub struct DeviceReconciler<H> {
    registry: Mutex<DeviceRegistry>,
    host: H,
    cameras: Arc<CameraHub>,
    events: EventEmitter<DeviceEvent>,
}

impl<H: AccessoryHost> DeviceReconciler<H> {
    pub fn new(host: H, cameras: Arc<CameraHub>, events: EventEmitter<DeviceEvent>) -> Self {
        Self {
            registry: Mutex::new(DeviceRegistry::new()),
            host,
            cameras,
            events,
        }
    }

    pub async fn run(&self, mut stations_rx: mpsc::Receiver<Vec<Station>>) {
        while let Some(stations) = stations_rx.recv().await {
            let report = self.reconcile(&stations).await;
            tracing::info!(
                "Reconciled {} stations: {} created, {} updated, reachable={}",
                stations.len(),
                report.created.len(),
                report.updated.len(),
                report.reachable
            );
        }

        tracing::error!("Station channel closed, stopping reconciliation");
    }

    //Stations are visited in order without deduplication
    pub async fn reconcile(&self, stations: &[Station]) -> ReconcileReport {
        let mut registry = self.registry.lock().await;
        let mut report = ReconcileReport::default();

        for station in stations {
            let id = DeviceId::from_station_id(&station.device_id);

            if let Some(known) = registry.find(&id) {
                let has_accessory = known.handle.is_some();
                let record = registry.upsert(station).clone();

                //Creation is retried on every poll until the host accepts the accessory
                if has_accessory {
                    if let Err(e) = self.host.apply_reading(&record).await {
                        tracing::error!("Error applying reading of device {} ({}): {:?}", id, record.station_id, e);
                    }
                } else {
                    tracing::info!("Retrying accessory creation for device {}", id);
                    self.create_accessory(&mut registry, &record).await;
                }

                self.events.send(DeviceEvent::Updated {
                    id,
                    image_url: record.image_url.clone(),
                });
                report.updated.push(id);
            } else {
                tracing::info!("Adding new device {} for station {}", id, station.device_id);
                let record = registry.upsert(station).clone();

                self.create_accessory(&mut registry, &record).await;
                self.attach_camera(&record).await;

                self.events.send(DeviceEvent::Created {
                    id,
                    image_url: record.image_url.clone(),
                });
                report.created.push(id);
            }
        }

        report.reachable = !stations.is_empty();
        registry.set_global_reachability(report.reachable);
        meter::set("devices", registry.len() as f64, &[]);

        for record in registry.records() {
            if let Err(e) = self.host.set_reachability(record).await {
                tracing::error!("Error setting reachability of device {}: {:?}", record.id, e);
            }
        }

        report
    }

    async fn create_accessory(&self, registry: &mut DeviceRegistry, record: &DeviceRecord) {
        match self.host.create_accessory(record).await {
            Ok(handle) => registry.set_handle(&record.id, handle),
            Err(e) => tracing::error!("Error creating accessory for device {}: {:?}", record.id, e),
        }
    }

    async fn attach_camera(&self, record: &DeviceRecord) {
        let camera = match self.cameras.attach(&record.id) {
            Ok(camera) => camera,
            Err(e) => {
                tracing::error!("Error creating camera for device {}: {:?}", record.id, e);
                return;
            }
        };

        for controller in camera.controllers() {
            if let Err(e) = self.host.attach_stream_controller(record, controller.as_ref()).await {
                tracing::error!(
                    "Error attaching stream controller {} of device {}: {:?}",
                    controller.index(),
                    record.id,
                    e
                );
            }
        }
    }

    #[cfg(test)]
    pub fn host(&self) -> &H {
        &self.host
    }

    pub async fn devices(&self) -> Vec<DeviceRecord> {
        self.registry.lock().await.records().cloned().collect()
    }

    #[cfg(test)]
    pub async fn find(&self, id: &DeviceId) -> Option<DeviceRecord> {
        self.registry.lock().await.find(id).cloned()
    }

    pub async fn remove(&self, id: &DeviceId) -> Option<DeviceRecord> {
        let removed = self.registry.lock().await.remove(id)?;
        self.unregister(&removed).await;
        Some(removed)
    }

    pub async fn remove_all(&self) -> Vec<DeviceRecord> {
        let removed = self.registry.lock().await.remove_all();
        for record in removed.iter() {
            self.unregister(record).await;
        }
        removed
    }

    async fn unregister(&self, record: &DeviceRecord) {
        tracing::info!("Removing device {} ({})", record.id, record.station_id);

        self.cameras.detach(&record.id);
        if let Err(e) = self.host.remove_accessory(record).await {
            tracing::error!("Error removing accessory of device {}: {:?}", record.id, e);
        }
    }
}
