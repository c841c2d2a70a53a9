//! Prometheus text exposition format.
//!
//! Renders gauge series into the Prometheus text exposition format for
//! scraping by a Prometheus server or compatible agent.

use std::collections::BTreeMap;

use crate::gauges::{Gauge, Labels};

/// Render gauge series into Prometheus text format.
///
/// Every gauge gets its HELP and TYPE lines even when it has no samples.
pub fn render_prometheus(series: &BTreeMap<Gauge, BTreeMap<Labels, f64>>) -> String {
    let mut out = String::new();

    for gauge in Gauge::ALL {
        out.push_str(&format!("# HELP {} {}.\n", gauge.name(), gauge.help()));
        out.push_str(&format!("# TYPE {} gauge\n", gauge.name()));

        let Some(samples) = series.get(&gauge) else {
            continue;
        };
        for (labels, value) in samples {
            out.push_str(&format!("{}{{{}}} {}\n", gauge.name(), render_labels(labels), value));
        }
    }

    out
}

fn render_labels(labels: &Labels) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{k}=\"{}\"", escape(v)))
        .collect::<Vec<_>>()
        .join(",")
}

fn escape(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}
