//! Rendering of projected metric families in the OpenMetrics text format.
//!
//! Every scrape builds its own [`Registry`] from the families of that scrape
//! and drops it once the body is encoded; nothing is kept between scrapes.

use std::fmt::Write;
use std::sync::atomic::AtomicU64;

use prometheus_client::encoding::text::encode;
use prometheus_client::encoding::{EncodeLabelValue, LabelValueEncoder};
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;

use crate::projection::MetricFamily;

/// Content type of the rendered body.
pub const CONTENT_TYPE: &str = "application/openmetrics-text; version=1.0.0; charset=utf-8";

type FloatGauge = Gauge<f64, AtomicU64>;

/// Label value escaped for the text format.
///
/// Channel and device names are free text set on the device and may hold
/// `\`, `"` or line breaks.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct LabelValue(String);

impl EncodeLabelValue for LabelValue {
    fn encode(&self, encoder: &mut LabelValueEncoder<'_>) -> Result<(), std::fmt::Error> {
        for c in self.0.chars() {
            match c {
                '\\' => encoder.write_str("\\\\")?,
                '"' => encoder.write_str("\\\"")?,
                '\n' => encoder.write_str("\\n")?,
                c => encoder.write_char(c)?,
            }
        }
        Ok(())
    }
}

type LabelSet = Vec<(String, LabelValue)>;

/// Build a fresh registry holding one gauge (family) per projected family.
pub fn build_registry(families: &[MetricFamily]) -> Registry {
    let mut registry = Registry::default();

    for family in families {
        if family.label_names.is_empty() {
            let gauge = FloatGauge::default();
            if let Some(observation) = family.observations.last() {
                gauge.set(observation.value);
            }
            registry.register(family.full_name(), family.help, gauge);
        } else {
            let gauges = Family::<LabelSet, FloatGauge>::default();
            for observation in &family.observations {
                let labels: LabelSet = family
                    .labels(observation)
                    .into_iter()
                    .map(|(name, value)| (name, LabelValue(value)))
                    .collect();
                // Identical label sets collapse into one series, last value wins
                gauges.get_or_create(&labels).set(observation.value);
            }
            registry.register(family.full_name(), family.help, gauges);
        }
    }

    registry
}

/// Render families as an exposition body.
pub fn render(families: &[MetricFamily]) -> Result<String, std::fmt::Error> {
    let registry = build_registry(families);
    let mut body = String::new();
    encode(&mut body, &registry)?;
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projection::Observation;

    fn make_family(
        name: &'static str,
        label_names: &'static [&'static str],
        observations: Vec<(Vec<&str>, f64)>,
    ) -> MetricFamily {
        MetricFamily {
            subsystem: "test",
            name,
            help: "Test family",
            label_names,
            observations: observations
                .into_iter()
                .map(|(labels, value)| Observation {
                    label_values: labels.into_iter().map(String::from).collect(),
                    value,
                })
                .collect(),
        }
    }

    #[test]
    fn test_render_unlabelled_gauge() {
        let body = render(&[make_family("plain", &[], vec![(vec![], 42.5)])]).unwrap();

        assert!(body.contains("# TYPE stagesmarts_test_plain gauge"));
        assert!(body.contains("stagesmarts_test_plain 42.5"));
        assert!(body.ends_with("# EOF\n"));
    }

    #[test]
    fn test_render_labelled_gauge() {
        let body = render(&[make_family(
            "pair",
            &["end_a", "end_b"],
            vec![(vec!["L1", "N"], 230.5), (vec!["L1", "L2"], 400.25)],
        )])
        .unwrap();

        assert!(body.contains("# TYPE stagesmarts_test_pair gauge"));
        assert!(body.contains("stagesmarts_test_pair{end_a=\"L1\",end_b=\"N\"} 230.5"));
        assert!(body.contains("stagesmarts_test_pair{end_a=\"L1\",end_b=\"L2\"} 400.25"));
    }

    #[test]
    fn test_duplicate_label_sets_collapse() {
        let body = render(&[make_family(
            "dup",
            &["name"],
            vec![(vec!["a"], 1.5), (vec!["a"], 2.5)],
        )])
        .unwrap();

        let series: Vec<&str> = body
            .lines()
            .filter(|line| line.starts_with("stagesmarts_test_dup{"))
            .collect();
        assert_eq!(series, vec!["stagesmarts_test_dup{name=\"a\"} 2.5"]);
    }

    #[test]
    fn test_label_values_are_escaped() {
        let body = render(&[make_family(
            "info",
            &["name"],
            vec![(vec!["FOH \"Rack\"\\x\nline2"], 2.5)],
        )])
        .unwrap();

        assert!(
            body.contains(r#"stagesmarts_test_info{name="FOH \"Rack\"\\x\nline2"} 2.5"#),
            "body: {}",
            body
        );
        assert!(!body.lines().any(|line| line.starts_with("line2")));
    }

    #[test]
    fn test_help_is_terminated_with_period() {
        let body = render(&[make_family("plain", &[], vec![(vec![], 1.5)])]).unwrap();

        assert!(body.contains("# HELP stagesmarts_test_plain Test family.\n"));
    }

    #[test]
    fn test_families_keep_order() {
        let body = render(&[
            make_family("second", &[], vec![(vec![], 1.5)]),
            make_family("first", &[], vec![(vec![], 2.5)]),
        ])
        .unwrap();

        let second = body.find("# TYPE stagesmarts_test_second").unwrap();
        let first = body.find("# TYPE stagesmarts_test_first").unwrap();
        assert!(second < first);
    }

    #[test]
    fn test_registries_are_independent() {
        let first = render(&[make_family("value", &[], vec![(vec![], 1.5)])]).unwrap();
        let second = render(&[make_family("other", &[], vec![(vec![], 2.5)])]).unwrap();

        assert!(first.contains("stagesmarts_test_value"));
        assert!(!second.contains("stagesmarts_test_value"));
    }
}
