//! Helpers for building `MetricFamily` values by hand.

use prometheus::proto::{Counter, Gauge, LabelPair, Metric, MetricFamily, MetricType};

/// Builds a gauge or counter family one sample at a time.
#[derive(Debug, Clone)]
pub struct FamilyBuilder {
    family: MetricFamily,
}

impl FamilyBuilder {
    pub fn gauge(name: &str, help: &str) -> Self {
        Self::new(name, help, MetricType::GAUGE)
    }

    pub fn counter(name: &str, help: &str) -> Self {
        Self::new(name, help, MetricType::COUNTER)
    }

    fn new(name: &str, help: &str, kind: MetricType) -> Self {
        let mut family = MetricFamily::default();
        family.set_name(name.to_string());
        family.set_help(help.to_string());
        family.set_field_type(kind);
        Self { family }
    }

    /// Append one sample with the given labels.
    pub fn sample(mut self, labels: &[(&str, &str)], value: f64) -> Self {
        let mut metric = Metric::default();
        for (name, val) in labels {
            let mut pair = LabelPair::default();
            pair.set_name(name.to_string());
            pair.set_value(val.to_string());
            metric.mut_label().push(pair);
        }

        match self.family.get_field_type() {
            MetricType::COUNTER => {
                let mut counter = Counter::default();
                counter.set_value(value);
                metric.set_counter(counter);
            }
            _ => {
                let mut gauge = Gauge::default();
                gauge.set_value(value);
                metric.set_gauge(gauge);
            }
        }

        self.family.mut_metric().push(metric);
        self
    }

    pub fn build(self) -> MetricFamily {
        self.family
    }
}

/// Single-sample gauge family.
pub fn gauge(name: &str, help: &str, labels: &[(&str, &str)], value: f64) -> MetricFamily {
    FamilyBuilder::gauge(name, help).sample(labels, value).build()
}
