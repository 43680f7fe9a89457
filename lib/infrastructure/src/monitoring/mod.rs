pub mod meter;

use std::error::Error;
use std::time::Duration;

use opentelemetry::KeyValue;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge;
use opentelemetry_otlp::{ExporterBuildError, WithExportConfig};
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::logs::SdkLoggerProvider;
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::trace::SdkTracerProvider;
use tracing::Subscriber;
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{EnvFilter, Layer, Registry};

const OTLP_METRIC_INTERVAL: Duration = Duration::from_secs(15);
const STDOUT_METRIC_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, serde::Deserialize)]
pub struct MonitoringConfig {
    pub service_name: String,
    pub app_name: String,
    pub logs: EnvFilterConfig,
    pub traces: EnvFilterConfig,
    pub otlp: Option<OtlpConfig>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct EnvFilterConfig {
    pub default_level: String,
    #[serde(default)]
    pub filters: Vec<String>,
}

//Without url, telemetry is printed to stdout
#[derive(Debug, Clone, serde::Deserialize)]
pub struct OtlpConfig {
    pub url: Option<String>,
}

impl EnvFilterConfig {
    fn env_filter(&self) -> Result<EnvFilter, tracing_subscriber::filter::ParseError> {
        EnvFilter::builder()
            .with_default_directive(self.default_level.parse()?)
            .parse(self.filters.join(","))
    }
}

impl MonitoringConfig {
    //Verbose mode lowers the default level of console logs only, traces keep their own filter
    pub fn with_debug(mut self, debug: bool) -> Self {
        if debug {
            self.logs.default_level = "debug".to_string();
        }
        self
    }

    pub fn init(&self) -> Result<(), Box<dyn Error>> {
        opentelemetry::global::set_text_map_propagator(TraceContextPropagator::default());

        let telemetry = match &self.otlp {
            Some(otlp) => Some(self.telemetry_layer::<Registry>(Exporter::from(otlp))?),
            None => None,
        };
        let console = tracing_subscriber::fmt::layer().with_filter(self.logs.env_filter()?);

        tracing_subscriber::registry().with(telemetry).with(console).init();

        Ok(())
    }

    //Spans and log records are exported, metrics are registered as global meter provider
    fn telemetry_layer<S>(&self, exporter: Exporter) -> Result<impl Layer<S>, Box<dyn Error>>
    where
        S: Subscriber + for<'a> LookupSpan<'a>,
    {
        let resource = Resource::builder()
            .with_attribute(KeyValue::new("service.name", self.service_name.clone()))
            .with_attribute(KeyValue::new("app.name", self.app_name.clone()))
            .build();

        opentelemetry::global::set_meter_provider(exporter.meter_provider(resource.clone())?);

        let tracer = exporter.tracer_provider(resource.clone())?.tracer(self.app_name.clone());
        let logger_provider = exporter.logger_provider(resource)?;

        let spans = OpenTelemetryLayer::new(tracer).with_filter(self.traces.env_filter()?);
        //KNOWN ISSUE: exported log records lack trace-id and span attributes
        let logs = OpenTelemetryTracingBridge::new(&logger_provider).with_filter(self.logs.env_filter()?);

        Ok(spans.and_then(logs))
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Exporter {
    Otlp(String),
    Stdout,
}

impl From<&OtlpConfig> for Exporter {
    fn from(config: &OtlpConfig) -> Self {
        match &config.url {
            Some(url) => Exporter::Otlp(url.clone()),
            None => Exporter::Stdout,
        }
    }
}

impl Exporter {
    fn tracer_provider(&self, resource: Resource) -> Result<SdkTracerProvider, ExporterBuildError> {
        let builder = SdkTracerProvider::builder().with_resource(resource);

        let builder = match self {
            Exporter::Otlp(url) => builder.with_batch_exporter(
                opentelemetry_otlp::SpanExporter::builder()
                    .with_tonic()
                    .with_endpoint(url.clone())
                    .build()?,
            ),
            Exporter::Stdout => builder.with_simple_exporter(opentelemetry_stdout::SpanExporter::default()),
        };

        Ok(builder.build())
    }

    fn logger_provider(&self, resource: Resource) -> Result<SdkLoggerProvider, ExporterBuildError> {
        let builder = SdkLoggerProvider::builder().with_resource(resource);

        let builder = match self {
            Exporter::Otlp(url) => builder.with_batch_exporter(
                opentelemetry_otlp::LogExporter::builder()
                    .with_tonic()
                    .with_endpoint(url.clone())
                    .build()?,
            ),
            Exporter::Stdout => builder.with_simple_exporter(opentelemetry_stdout::LogExporter::default()),
        };

        Ok(builder.build())
    }

    //Readers are generic over their exporter, so each arm attaches its own
    fn meter_provider(&self, resource: Resource) -> Result<SdkMeterProvider, ExporterBuildError> {
        let builder = SdkMeterProvider::builder().with_resource(resource);

        let builder = match self {
            Exporter::Otlp(url) => builder.with_reader(
                PeriodicReader::builder(
                    opentelemetry_otlp::MetricExporter::builder()
                        .with_tonic()
                        .with_endpoint(url.clone())
                        .build()?,
                )
                .with_interval(OTLP_METRIC_INTERVAL)
                .build(),
            ),
            Exporter::Stdout => builder.with_reader(
                PeriodicReader::builder(opentelemetry_stdout::MetricExporter::default())
                    .with_interval(STDOUT_METRIC_INTERVAL)
                    .build(),
            ),
        };

        Ok(builder.build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(default_level: &str) -> MonitoringConfig {
        MonitoringConfig {
            service_name: "skybridge".to_string(),
            app_name: "skybridge".to_string(),
            logs: EnvFilterConfig {
                default_level: default_level.to_string(),
                filters: vec!["rumqttc=warn".to_string()],
            },
            traces: EnvFilterConfig {
                default_level: "info".to_string(),
                filters: vec![],
            },
            otlp: None,
        }
    }

    #[test]
    fn test_debug_lowers_log_level() {
        let config = config("info").with_debug(true);

        assert_eq!(config.logs.default_level, "debug");
        assert_eq!(config.traces.default_level, "info");
    }

    #[test]
    fn test_debug_disabled_keeps_log_level() {
        let config = config("warn").with_debug(false);

        assert_eq!(config.logs.default_level, "warn");
    }

    #[test]
    fn test_env_filter_from_config() {
        assert!(config("info").logs.env_filter().is_ok());
    }

    #[tokio::test]
    async fn test_stdout_meter_provider_is_built() {
        let provider = Exporter::Stdout.meter_provider(Resource::builder().build());

        assert!(provider.is_ok());
    }

    #[test]
    fn test_exporter_from_config() {
        assert_eq!(
            Exporter::from(&OtlpConfig {
                url: Some("http://collector:4317".to_string())
            }),
            Exporter::Otlp("http://collector:4317".to_string())
        );
        assert_eq!(Exporter::from(&OtlpConfig { url: None }), Exporter::Stdout);
    }
}
