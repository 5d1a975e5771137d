//! Projection of a [`SystemSnapshot`] onto Prometheus gauge families.
//!
//! Metric names, label names and label values are what the dashboards of the
//! deployed exporter query, so they are part of the contract.

use std::collections::HashMap;

use thiserror::Error;

use crate::model::{ChannelIdentity, SystemSnapshot};

/// Namespace prefixed to every family name.
pub const NAMESPACE: &str = "stagesmarts";

/// Channels per group (CIB board), used to number channels across groups.
pub const CHANNELS_PER_GROUP: u32 = 6;

const CHANNEL_LABELS: &[&str] = &["number", "group", "groupNum", "name"];

/// Errors raised while projecting a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProjectionError {
    /// A reading the projection needs was not sent by the device.
    #[error("missing field `{field}`")]
    MissingField { field: String },
}

/// One gauge observation: label values (in the family's label order) and
/// the value.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub label_values: Vec<String>,
    pub value: f64,
}

impl Observation {
    fn new<const N: usize>(label_values: [&str; N], value: f64) -> Self {
        Self {
            label_values: label_values.iter().map(|v| v.to_string()).collect(),
            value,
        }
    }
}

/// A gauge family with its observations.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricFamily {
    pub subsystem: &'static str,
    pub name: &'static str,
    pub help: &'static str,
    pub label_names: &'static [&'static str],
    pub observations: Vec<Observation>,
}

impl MetricFamily {
    fn new(
        subsystem: &'static str,
        name: &'static str,
        help: &'static str,
        label_names: &'static [&'static str],
    ) -> Self {
        Self {
            subsystem,
            name,
            help,
            label_names,
            observations: Vec::new(),
        }
    }

    /// Full Prometheus name: `{namespace}_{subsystem}_{name}`.
    pub fn full_name(&self) -> String {
        format!("{}_{}_{}", NAMESPACE, self.subsystem, self.name)
    }

    /// Label pairs of an observation, in declaration order.
    pub fn labels(&self, observation: &Observation) -> Vec<(String, String)> {
        self.label_names
            .iter()
            .map(|name| name.to_string())
            .zip(observation.label_values.iter().cloned())
            .collect()
    }

    fn observe(&mut self, observation: Observation) {
        self.observations.push(observation);
    }

    fn single(mut self, value: f64) -> Self {
        self.observe(Observation::new([], value));
        self
    }
}

/// Labels of a channel: its number across all groups, its group and its
/// position within the group, all one-based.
///
/// `groupNum` is the channel's ordinal within its group, not a group number.
pub fn channel_labels(id: ChannelIdentity) -> [String; 3] {
    let group = u32::from(id.group);
    let channel = u32::from(id.channel);
    [
        (group * CHANNELS_PER_GROUP + channel + 1).to_string(),
        (group + 1).to_string(),
        (channel + 1).to_string(),
    ]
}

fn require<T: Copy>(reading: Option<T>, field: &str) -> Result<T, ProjectionError> {
    reading.ok_or_else(|| ProjectionError::MissingField {
        field: field.to_string(),
    })
}

/// Map a snapshot to its metric families.
///
/// Fails on the first reading that is missing; no families are returned in
/// that case.
pub fn project(snapshot: &SystemSnapshot) -> Result<Vec<MetricFamily>, ProjectionError> {
    let on_battery = MetricFamily::new("system", "on_battery", "System on battery", &[])
        .single(require(snapshot.on_battery, "onBattery")?.as_f64());

    let main = snapshot
        .main_input
        .as_ref()
        .ok_or_else(|| ProjectionError::MissingField {
            field: "mainInputValues".to_string(),
        })?;

    let mut voltage = MetricFamily::new(
        "main",
        "voltage",
        "Main input voltage in V",
        &["end_a", "end_b"],
    );
    for (end_a, end_b, reading, field) in [
        ("L1", "N", main.l1_voltage, "mainInputValues.L1V"),
        ("L2", "N", main.l2_voltage, "mainInputValues.L2V"),
        ("L3", "N", main.l3_voltage, "mainInputValues.L3V"),
        ("L1", "L2", main.l1_l2_voltage, "mainInputValues.L1L2V"),
        ("L2", "L3", main.l2_l3_voltage, "mainInputValues.L2L3V"),
        ("L3", "L1", main.l3_l1_voltage, "mainInputValues.L3L1V"),
    ] {
        voltage.observe(Observation::new(
            [end_a, end_b],
            require(reading, field)?.as_f64(),
        ));
    }

    let mut current = MetricFamily::new("main", "current", "Main input current in A", &["line"]);
    for (line, reading, field) in [
        ("L1", main.l1_current, "mainInputValues.L1I"),
        ("L2", main.l2_current, "mainInputValues.L2I"),
        ("L3", main.l3_current, "mainInputValues.L3I"),
        ("N", main.neutral_current, "mainInputValues.NI"),
    ] {
        current.observe(Observation::new([line], require(reading, field)?.as_f64()));
    }

    let frequency = MetricFamily::new("main", "frequency", "Main input frequency in Hz", &[])
        .single(require(main.frequency, "mainInputValues.freq")?.as_f64());

    let temperature =
        MetricFamily::new("system", "temperature", "System temperature in °C", &[])
            .single(require(snapshot.temperature, "temperature")?.as_f64());

    let breakers = snapshot
        .breakers
        .as_ref()
        .ok_or_else(|| ProjectionError::MissingField {
            field: "breakers".to_string(),
        })?;
    let main_breaker = require(breakers.main_breaker, "breakers.mainBreakerStatus")?;
    let e_stop = require(breakers.emergency_stop, "breakers.eStopStatus")?;
    let neutral_relay = require(breakers.neutral_relay, "breakers.neutralRelayStatus")?;

    let mut breaker_status =
        MetricFamily::new("main", "breaker_status", "Breaker status", &["breaker"]);
    breaker_status.observe(Observation::new(["main"], main_breaker.as_f64()));
    breaker_status.observe(Observation::new(["e-stop"], e_stop.as_f64()));
    // Deployed dashboards expect earth-relay to carry the e-stop reading.
    // TODO: switch to `breakers.earth_relay` once the dashboards are migrated.
    breaker_status.observe(Observation::new(["earth-relay"], e_stop.as_f64()));
    breaker_status.observe(Observation::new(["neutral-relay"], neutral_relay.as_f64()));

    let (channels_current, channels_in_use) = project_channels(snapshot)?;

    let device_name = snapshot
        .config
        .name
        .as_deref()
        .ok_or_else(|| ProjectionError::MissingField {
            field: "config.name".to_string(),
        })?;
    let mut info = MetricFamily::new("main", "info", "System info", &["name"]);
    info.observe(Observation::new([device_name], 1.0));

    Ok(vec![
        on_battery,
        voltage,
        current,
        frequency,
        temperature,
        breaker_status,
        channels_current,
        channels_in_use,
        info,
    ])
}

fn project_channels(
    snapshot: &SystemSnapshot,
) -> Result<(MetricFamily, MetricFamily), ProjectionError> {
    let channels = snapshot
        .output_channels
        .as_ref()
        .ok_or_else(|| ProjectionError::MissingField {
            field: "outputChannels.channel".to_string(),
        })?;

    // Later entries overwrite earlier ones: the last config in document order wins.
    let names: HashMap<ChannelIdentity, &str> = snapshot
        .config
        .channels
        .iter()
        .map(|config| (config.id(), config.name.as_str()))
        .collect();

    let mut current = MetricFamily::new(
        "channels",
        "current",
        "Output channel current",
        CHANNEL_LABELS,
    );
    let mut in_use = MetricFamily::new(
        "channels",
        "in_use",
        "Output channel usage indicator",
        CHANNEL_LABELS,
    );

    for (index, channel) in channels.iter().enumerate() {
        let field = |name: &str| format!("outputChannels.channel[{}].{}", index, name);
        let current_value = channel.current.ok_or_else(|| ProjectionError::MissingField {
            field: field("channelI"),
        })?;
        let in_use_value = channel.in_use.ok_or_else(|| ProjectionError::MissingField {
            field: field("channelInUse"),
        })?;

        let [number, group, group_num] = channel_labels(channel.id);
        let name = names.get(&channel.id).copied().unwrap_or("");
        let labels = [number.as_str(), group.as_str(), group_num.as_str(), name];

        current.observe(Observation::new(labels, current_value.as_f64()));
        in_use.observe(Observation::new(labels, in_use_value.as_f64()));
    }

    Ok((current, in_use))
}
