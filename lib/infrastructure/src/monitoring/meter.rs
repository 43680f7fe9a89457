use cached::proc_macro::cached;
use opentelemetry::KeyValue;
use opentelemetry::metrics::{Counter, Gauge};

const METER_NAME: &str = "skybridge";

pub fn increment(name: &'static str, labels: &[(&str, &str)]) {
    counter(name).add(1, &attributes(labels))
}

pub fn set(name: &'static str, value: f64, labels: &[(&str, &str)]) {
    gauge(name).record(value, &attributes(labels))
}

fn attributes(labels: &[(&str, &str)]) -> Vec<KeyValue> {
    labels
        .iter()
        .map(|(key, value)| KeyValue::new(key.to_string(), value.to_string()))
        .collect()
}

#[cached]
fn counter(name: &'static str) -> Counter<u64> {
    opentelemetry::global::meter(METER_NAME).u64_counter(name).build()
}

#[cached]
fn gauge(name: &'static str) -> Gauge<f64> {
    opentelemetry::global::meter(METER_NAME).f64_gauge(name).build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attributes_keep_label_order() {
        let attributes = attributes(&[("result", "ok"), ("station", "A")]);

        assert_eq!(
            attributes,
            vec![KeyValue::new("result", "ok"), KeyValue::new("station", "A")]
        );
    }

    #[test]
    fn test_recording_without_provider_is_noop() {
        increment("test_counter", &[("result", "ok")]);
        set("test_gauge", 1.0, &[]);
    }
}
