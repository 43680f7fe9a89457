use std::collections::BTreeMap;

use crate::station::Station;

use super::{AccessoryHandle, DeviceId, DeviceRecord};

#[derive(Debug, Default)]
pub struct DeviceRegistry {
    records: BTreeMap<DeviceId, DeviceRecord>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    //New records start unreachable until the next reachability pass
    pub fn upsert(&mut self, station: &Station) -> &DeviceRecord {
        let id = DeviceId::from_station_id(&station.device_id);

        self.records
            .entry(id)
            .and_modify(|record| record.apply(station))
            .or_insert_with(|| DeviceRecord::new(station))
    }

    pub fn find(&self, id: &DeviceId) -> Option<&DeviceRecord> {
        self.records.get(id)
    }

    pub fn set_handle(&mut self, id: &DeviceId, handle: AccessoryHandle) {
        if let Some(record) = self.records.get_mut(id) {
            record.handle = Some(handle);
        }
    }

    pub fn set_global_reachability(&mut self, reachable: bool) {
        for record in self.records.values_mut() {
            record.reachable = reachable;
        }
    }

    pub fn remove(&mut self, id: &DeviceId) -> Option<DeviceRecord> {
        self.records.remove(id)
    }

    pub fn remove_all(&mut self) -> Vec<DeviceRecord> {
        std::mem::take(&mut self.records).into_values().collect()
    }

    pub fn records(&self) -> impl Iterator<Item = &DeviceRecord> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::unit::DegreeCelsius;
    use crate::station::fixture::station;

    #[test]
    fn test_upsert_creates_record() {
        let mut registry = DeviceRegistry::new();

        let record = registry.upsert(&station("A", "SKY1", 2600.0)).clone();

        assert_eq!(record.id, DeviceId::from_station_id("A"));
        assert_eq!(record.station_id, "A");
        assert!(!record.reachable);
        assert!(record.handle.is_none());
        assert_eq!(registry.find(&record.id), Some(&record));
    }

    #[test]
    fn test_upsert_is_idempotent() {
        let mut once = DeviceRegistry::new();
        let mut twice = DeviceRegistry::new();
        let a = station("A", "SKY1", 1800.0);

        once.upsert(&a);
        twice.upsert(&a);
        twice.upsert(&a);

        let id = DeviceId::from_station_id("A");
        assert_eq!(once.find(&id), twice.find(&id));
        assert_eq!(twice.len(), 1);
    }

    #[test]
    fn test_upsert_overwrites_readings_and_keeps_host_state() {
        let mut registry = DeviceRegistry::new();
        let id = DeviceId::from_station_id("A");
        registry.upsert(&station("A", "SKY1", 2600.0));
        registry.set_handle(&id, AccessoryHandle("acc".to_string()));
        registry.set_global_reachability(true);

        let mut changed = station("A", "SKY1", 1300.0);
        changed.data.temperature = DegreeCelsius(-4.0);
        let record = registry.upsert(&changed);

        assert_eq!(record.readings.temperature, DegreeCelsius(-4.0));
        assert_eq!(record.battery.as_ref().map(|b| b.level.0), Some(50.0));
        assert_eq!(record.handle, Some(AccessoryHandle("acc".to_string())));
        assert!(record.reachable);
    }

    #[test]
    fn test_find_unknown_is_none() {
        let registry = DeviceRegistry::new();
        assert!(registry.find(&DeviceId::from_station_id("nope")).is_none());
    }

    #[test]
    fn test_global_reachability_applies_to_all() {
        let mut registry = DeviceRegistry::new();
        registry.upsert(&station("A", "SKY1", 2600.0));
        registry.upsert(&station("B", "SKY2", 2600.0));

        registry.set_global_reachability(true);
        assert!(registry.records().all(|r| r.reachable));

        registry.set_global_reachability(false);
        assert!(registry.records().all(|r| !r.reachable));
    }

    #[test]
    fn test_remove_and_remove_all() {
        let mut registry = DeviceRegistry::new();
        registry.upsert(&station("A", "SKY1", 2600.0));
        registry.upsert(&station("B", "SKY1", 2600.0));
        registry.upsert(&station("C", "SKY1", 2600.0));

        let removed = registry.remove(&DeviceId::from_station_id("A"));
        assert_eq!(removed.map(|r| r.station_id), Some("A".to_string()));
        assert!(registry.remove(&DeviceId::from_station_id("A")).is_none());

        assert_eq!(registry.remove_all().len(), 2);
        assert!(registry.is_empty());
    }
}
