use prometheus::Encoder;
use prometheus::IntCounterVec;
use prometheus::Opts;
use prometheus::Registry;
use prometheus::TextEncoder;
use std::collections::BTreeMap;

/// Records the rows successfully handed over to the ingestion sink.
pub trait FlushMetrics: Send + Sync + 'static {
    fn flushed_rows(&self, datasource: &str, rows: usize);
}

pub const FLUSHED_ROWS_METRIC: &str = "event_router_flushed_rows_total";

/// The Prometheus metrics of the event router, exported on `GET /metrics`.
#[derive(Clone)]
pub struct RouterMetrics {
    registry: Registry,
    flushed_rows: IntCounterVec,
}

impl RouterMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();
        let flushed_rows = IntCounterVec::new(
            Opts::new(
                FLUSHED_ROWS_METRIC,
                "Total rows delivered to the ingestion endpoint",
            ),
            &["datasource"],
        )?;
        registry.register(Box::new(flushed_rows.clone()))?;

        Ok(RouterMetrics {
            registry,
            flushed_rows,
        })
    }

    /// The number of rows delivered so far for a datasource
    pub fn flushed_rows_total(&self, datasource: &str) -> u64 {
        self.flushed_rows.with_label_values(&[datasource]).get()
    }

    /// The number of rows delivered so far, per datasource
    pub fn flushed_rows_snapshot(&self) -> BTreeMap<String, u64> {
        let mut snapshot = BTreeMap::new();
        for family in self.registry.gather() {
            if family.get_name() != FLUSHED_ROWS_METRIC {
                continue;
            }
            for metric in family.get_metric() {
                let datasource = metric
                    .get_label()
                    .iter()
                    .find(|label| label.get_name() == "datasource")
                    .map(|label| label.get_value().to_string());
                if let Some(datasource) = datasource {
                    snapshot.insert(datasource, metric.get_counter().get_value() as u64);
                }
            }
        }
        snapshot
    }

    /// Encode all metrics in Prometheus text format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|err| prometheus::Error::Msg(err.to_string()))
    }
}

impl FlushMetrics for RouterMetrics {
    fn flushed_rows(&self, datasource: &str, rows: usize) {
        self.flushed_rows
            .with_label_values(&[datasource])
            .inc_by(rows as u64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_rows_per_datasource() {
        let metrics = RouterMetrics::new().unwrap();

        metrics.flushed_rows("ds1", 3);
        metrics.flushed_rows("ds2", 1);
        metrics.flushed_rows("ds1", 4);

        assert_eq!(metrics.flushed_rows_total("ds1"), 7);
        assert_eq!(metrics.flushed_rows_total("ds2"), 1);
        assert_eq!(
            metrics.flushed_rows_snapshot(),
            BTreeMap::from([("ds1".to_string(), 7), ("ds2".to_string(), 1)])
        );
    }

    #[test]
    fn encode_in_prometheus_text_format() {
        let metrics = RouterMetrics::new().unwrap();
        metrics.flushed_rows("ds1", 2);

        let text = metrics.encode().unwrap();

        assert!(text.contains("# TYPE event_router_flushed_rows_total counter"));
        assert!(text.contains(r#"event_router_flushed_rows_total{datasource="ds1"} 2"#));
    }

    #[test]
    fn no_rows_flushed_yet() {
        let metrics = RouterMetrics::new().unwrap();

        assert!(metrics.flushed_rows_snapshot().is_empty());
        assert_eq!(metrics.flushed_rows_total("ds1"), 0);
    }
}
