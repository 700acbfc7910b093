//! Thread-safe metrics registry with get-or-create gauge families.

use std::collections::HashMap;

use parking_lot::RwLock;
use prometheus::{
    Encoder, Gauge, GaugeVec, Histogram, HistogramOpts, IntCounter, Opts, Registry, TextEncoder,
};
use thiserror::Error;

/// Content type of the text exposition format.
pub const TEXT_CONTENT_TYPE: &str = prometheus::TEXT_FORMAT;

/// Errors raised by the metrics registry.
#[derive(Debug, Error)]
pub enum MetricsError {
    /// Underlying prometheus error (invalid name, duplicate registration, ...).
    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),

    /// A gauge family was requested with a different label schema than it was created with.
    #[error("metric '{name}' is registered with labels {registered:?}, got {requested:?}")]
    LabelMismatch {
        name: String,
        registered: Vec<String>,
        requested: Vec<String>,
    },

    /// Exposition output was not UTF-8.
    #[error("exposition is not valid UTF-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),
}

/// Identity of a single gauge series: metric name plus ordered label pairs.
///
/// Two specs with the same name and label values address the same series;
/// setting either updates one shared value.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesSpec {
    name: &'static str,
    help: &'static str,
    labels: Vec<(&'static str, String)>,
}

impl SeriesSpec {
    /// Create a series spec without labels.
    pub fn new(name: &'static str, help: &'static str) -> Self {
        Self {
            name,
            help,
            labels: Vec::new(),
        }
    }

    /// Append a label pair. Order defines the family's label schema.
    #[must_use]
    pub fn label(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.labels.push((key, value.into()));
        self
    }

    /// Metric name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    fn label_names(&self) -> Vec<&'static str> {
        self.labels.iter().map(|(k, _)| *k).collect()
    }

    fn label_values(&self) -> Vec<&str> {
        self.labels.iter().map(|(_, v)| v.as_str()).collect()
    }
}

struct GaugeFamily {
    labels: Vec<&'static str>,
    vec: GaugeVec,
}

/// Process-wide registry shared by all scrapes and collectors.
///
/// All writes go through prometheus' internally synchronized metric types;
/// the family map is guarded by a `parking_lot::RwLock` so callers never lock
/// around registry writes themselves.
pub struct MetricsRegistry {
    registry: Registry,
    families: RwLock<HashMap<&'static str, GaugeFamily>>,
}

impl MetricsRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            registry: Registry::new(),
            families: RwLock::new(HashMap::new()),
        }
    }

    /// Set the value of a gauge series, creating its family on first use.
    ///
    /// # Errors
    /// Returns `MetricsError::LabelMismatch` if the family already exists with
    /// a different label schema.
    pub fn set_gauge(&self, series: &SeriesSpec, value: f64) -> Result<(), MetricsError> {
        let family = self.gauge_family(series)?;
        family
            .get_metric_with_label_values(&series.label_values())?
            .set(value);
        Ok(())
    }

    /// Current value of a gauge series, if it has ever been set.
    ///
    /// Reads from a gathered snapshot so that probing never creates a series.
    pub fn gauge_value(&self, series: &SeriesSpec) -> Option<f64> {
        let family = self
            .registry
            .gather()
            .into_iter()
            .find(|mf| mf.get_name() == series.name)?;

        family
            .get_metric()
            .iter()
            .find(|metric| {
                let pairs = metric.get_label();
                pairs.len() == series.labels.len()
                    && series.labels.iter().all(|(k, v)| {
                        pairs
                            .iter()
                            .any(|p| p.get_name() == *k && p.get_value() == v.as_str())
                    })
            })
            .map(|metric| metric.get_gauge().get_value())
    }

    /// Register a plain gauge.
    pub fn register_gauge(&self, name: &str, help: &str) -> Result<Gauge, MetricsError> {
        let gauge = Gauge::with_opts(Opts::new(name, help))?;
        self.registry.register(Box::new(gauge.clone()))?;
        Ok(gauge)
    }

    /// Register a monotonically increasing counter.
    pub fn register_counter(&self, name: &str, help: &str) -> Result<IntCounter, MetricsError> {
        let counter = IntCounter::with_opts(Opts::new(name, help))?;
        self.registry.register(Box::new(counter.clone()))?;
        Ok(counter)
    }

    /// Register a histogram with explicit buckets.
    pub fn register_histogram(
        &self,
        name: &str,
        help: &str,
        buckets: Vec<f64>,
    ) -> Result<Histogram, MetricsError> {
        let histogram = Histogram::with_opts(HistogramOpts::new(name, help).buckets(buckets))?;
        self.registry.register(Box::new(histogram.clone()))?;
        Ok(histogram)
    }

    /// Render every registered metric in the text exposition format.
    pub fn render(&self) -> Result<String, MetricsError> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }

    /// Number of dynamically created gauge families.
    pub fn family_count(&self) -> usize {
        self.families.read().len()
    }

    fn gauge_family(&self, series: &SeriesSpec) -> Result<GaugeVec, MetricsError> {
        let requested = series.label_names();

        if let Some(family) = self.families.read().get(series.name) {
            return Self::check_labels(series.name, family, &requested);
        }

        let mut families = self.families.write();
        // Another writer may have created the family between the two locks.
        if let Some(family) = families.get(series.name) {
            return Self::check_labels(series.name, family, &requested);
        }

        let vec = GaugeVec::new(Opts::new(series.name, series.help), &requested)?;
        self.registry.register(Box::new(vec.clone()))?;
        families.insert(
            series.name,
            GaugeFamily {
                labels: requested,
                vec: vec.clone(),
            },
        );
        tracing::trace!(metric = series.name, "Gauge family registered");
        Ok(vec)
    }

    fn check_labels(
        name: &str,
        family: &GaugeFamily,
        requested: &[&'static str],
    ) -> Result<GaugeVec, MetricsError> {
        if family.labels == requested {
            Ok(family.vec.clone())
        } else {
            Err(MetricsError::LabelMismatch {
                name: name.to_string(),
                registered: family.labels.iter().map(|s| s.to_string()).collect(),
                requested: requested.iter().map(|s| s.to_string()).collect(),
            })
        }
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MetricsRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsRegistry")
            .field("family_count", &self.family_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn tunnel(name: &str) -> SeriesSpec {
        SeriesSpec::new("test_tunnels_up", "Tunnel health")
            .label("name", name)
            .label("colo", "AMS")
    }

    #[test]
    fn test_set_gauge_creates_family_once() {
        let registry = MetricsRegistry::new();
        registry.set_gauge(&tunnel("a"), 1.0).unwrap();
        registry.set_gauge(&tunnel("b"), 0.0).unwrap();

        assert_eq!(registry.family_count(), 1);
        assert_eq!(registry.gauge_value(&tunnel("a")), Some(1.0));
        assert_eq!(registry.gauge_value(&tunnel("b")), Some(0.0));
    }

    #[test]
    fn test_same_identity_updates_existing_series() {
        let registry = MetricsRegistry::new();
        registry.set_gauge(&tunnel("a"), 1.0).unwrap();
        registry.set_gauge(&tunnel("a"), 3.0).unwrap();

        let output = registry.render().unwrap();
        let lines: Vec<_> = output
            .lines()
            .filter(|l| l.starts_with("test_tunnels_up{"))
            .collect();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].ends_with(" 3"));
    }

    #[test]
    fn test_label_schema_mismatch_rejected() {
        let registry = MetricsRegistry::new();
        registry.set_gauge(&tunnel("a"), 1.0).unwrap();

        let other = SeriesSpec::new("test_tunnels_up", "Tunnel health").label("id", "x");
        let err = registry.set_gauge(&other, 1.0).unwrap_err();
        assert!(matches!(err, MetricsError::LabelMismatch { .. }));
        assert_eq!(registry.gauge_value(&other), None);
    }

    #[test]
    fn test_duplicate_fixed_registration_fails() {
        let registry = MetricsRegistry::new();
        registry.register_counter("test_calls_total", "calls").unwrap();
        assert!(registry.register_counter("test_calls_total", "calls").is_err());
    }

    #[test]
    fn test_render_contains_help_and_type() {
        let registry = MetricsRegistry::new();
        registry.set_gauge(&tunnel("a"), 1.0).unwrap();
        let output = registry.render().unwrap();

        assert!(output.contains("# HELP test_tunnels_up Tunnel health"));
        assert!(output.contains("# TYPE test_tunnels_up gauge"));
        assert!(output.contains(r#"test_tunnels_up{colo="AMS",name="a"} 1"#));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writers_share_one_series() {
        let registry = Arc::new(MetricsRegistry::new());
        let mut handles = Vec::new();

        for i in 0..16 {
            let registry = Arc::clone(&registry);
            handles.push(tokio::spawn(async move {
                for _ in 0..100 {
                    registry.set_gauge(&tunnel("shared"), 7.0).unwrap();
                    registry.set_gauge(&tunnel(&format!("t{i}")), 1.0).unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(registry.family_count(), 1);
        assert_eq!(registry.gauge_value(&tunnel("shared")), Some(7.0));
        let output = registry.render().unwrap();
        let shared = output.matches(r#"name="shared""#).count();
        assert_eq!(shared, 1);
    }
}
