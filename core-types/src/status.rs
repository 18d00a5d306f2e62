// Copyright (c) James Kassemi, SC, US. All rights reserved.

use serde::{Deserialize, Serialize};

/// Discrete health level exposed by a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum OverallStatus {
    #[default]
    Ok,
    Warn,
    Crit,
}

/// Metric sample emitted by a component-specific reporter.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSample {
    pub metric: String,
    pub value: f64,
    pub labels: Vec<(String, String)>,
}

impl MetricSample {
    pub fn gauge(metric: impl Into<String>, value: f64) -> Self {
        Self {
            metric: metric.into(),
            value,
            labels: Vec::new(),
        }
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.push((key.into(), value.into()));
        self
    }
}

/// Seam for wiring component counters into whatever exporter the host runs.
pub trait ServiceMetricsReporter: Send + Sync {
    fn service_name(&self) -> &'static str;
    fn overall(&self) -> OverallStatus;
    fn collect_metrics(&self) -> Vec<MetricSample>;
}

/// `service_name` + label, lowercased with non-alphanumerics replaced by `_`.
pub fn metric_name(service: &str, label: &str) -> String {
    let mut out = String::with_capacity(service.len() + label.len() + 1);
    for ch in service.chars().chain(std::iter::once('_')).chain(label.chars()) {
        if ch.is_ascii_alphanumeric() {
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push('_');
        }
    }
    out
}
