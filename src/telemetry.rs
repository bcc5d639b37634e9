use opentelemetry::{
    global,
    metrics::{Counter, Histogram, MeterProvider},
    KeyValue,
};
use opentelemetry_sdk::metrics::SdkMeterProvider;
use prometheus::Registry;
use std::collections::HashSet;

pub struct Metrics {
    provider: SdkMeterProvider,
    uploaded_files: Counter<u64>,
    uploaded_bytes: Counter<u64>,
    detections: Counter<u64>,
    detection_duration: Histogram<u64>,
    upstream_failures: Counter<u64>,
    pub registry: Registry,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();
        let exporter = opentelemetry_prometheus::exporter()
            .with_registry(registry.clone())
            .build()?;

        let provider = SdkMeterProvider::builder().with_reader(exporter).build();

        let meter = provider.meter("detection_gateway");
        // The global slot only gets a clone: replacing it must not shut down
        // the exporter behind `registry`.
        global::set_meter_provider(provider.clone());

        let uploaded_files = meter
            .u64_counter("uploaded_files_total")
            .with_description("Number of files stored through the upload endpoint")
            .build();

        let uploaded_bytes = meter
            .u64_counter("uploaded_bytes_total")
            .with_description("Bytes stored through the upload endpoint")
            .build();

        let detections = meter
            .u64_counter("detections_total")
            .with_description("Completed object detection requests")
            .build();

        let boundaries = generate_boundaries((50, 250, 1000, 5000, 30000));

        let detection_duration = meter
            .u64_histogram("detection_duration_ms")
            .with_boundaries(boundaries)
            .with_description("Duration of vision API calls in milliseconds")
            .build();

        let upstream_failures = meter
            .u64_counter("upstream_failures_total")
            .with_description("Failed vision API calls by failure kind")
            .build();

        Ok(Metrics {
            provider,
            uploaded_files,
            uploaded_bytes,
            detections,
            detection_duration,
            upstream_failures,
            registry,
        })
    }

    pub fn shutdown(&self) {
        if let Err(e) = self.provider.shutdown() {
            tracing::warn!("Failed to shut down meter provider: {}", e);
        }
    }

    pub fn record_upload(&self, size: u64, content_type: &str) {
        let attributes = vec![KeyValue::new("content_type", content_type.to_string())];
        self.uploaded_files.add(1, &attributes);
        self.uploaded_bytes.add(size, &attributes);
    }

    pub fn record_detection(&self, boxes: usize) {
        let found = if boxes > 0 { "true" } else { "false" };
        self.detections.add(1, &[KeyValue::new("objects_found", found)]);
    }

    pub fn record_detection_duration(&self, duration_ms: u64) {
        self.detection_duration.record(duration_ms, &[]);
    }

    pub fn record_upstream_failure(&self, kind: &'static str) {
        self.upstream_failures
            .add(1, &[KeyValue::new("kind", kind)]);
    }
}

fn generate_boundaries(parts: (i32, i32, i32, i32, i32)) -> Vec<f64> {
    let first_step: usize = 50;
    let middle_step: usize = 250;
    let end_step: usize = 1000;
    let tail_step: usize = 5000;
    let first_part = (parts.0..=parts.1).step_by(first_step);
    let middle_part = (parts.1..=parts.2).step_by(middle_step);
    let end_part = (parts.2..=parts.3).step_by(end_step);
    let tail_part = (parts.3..=parts.4).step_by(tail_step);

    let mut seen = HashSet::new();
    first_part
        .chain(middle_part)
        .chain(end_part)
        .chain(tail_part)
        .filter(|&x| seen.insert(x))
        .map(|x| x as f64)
        .collect()
}
