//! Domain model of one PDU snapshot, as returned by `getcurrentpduvalues`.
//!
//! Readings are `Option`s: a key the device left out is not a decode error,
//! it only fails the projection that needs it. A key that is present but
//! malformed always fails the decode.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::decode::{
    BooleanReading, DecodeError, NumericReading, decode, optional_singleton, singleton,
    u8_string,
};

/// Key wrapping the whole payload in the API response.
pub const ROOT_KEY: &str = "smartPDU";

/// Address of an output channel: the group (CIB board) and the channel
/// within that group, both zero-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
pub struct ChannelIdentity {
    #[serde(rename = "CIBid", deserialize_with = "u8_string")]
    pub group: u8,
    #[serde(rename = "Channelid", deserialize_with = "u8_string")]
    pub channel: u8,
}

impl ChannelIdentity {
    pub fn new(group: u8, channel: u8) -> Self {
        Self { group, channel }
    }
}

/// Readings of the main (three phase) input.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct MainInputReadings {
    #[serde(rename = "L1V", deserialize_with = "optional_singleton")]
    pub l1_voltage: Option<NumericReading>,
    #[serde(rename = "L2V", deserialize_with = "optional_singleton")]
    pub l2_voltage: Option<NumericReading>,
    #[serde(rename = "L3V", deserialize_with = "optional_singleton")]
    pub l3_voltage: Option<NumericReading>,
    #[serde(rename = "L1L2V", deserialize_with = "optional_singleton")]
    pub l1_l2_voltage: Option<NumericReading>,
    #[serde(rename = "L2L3V", deserialize_with = "optional_singleton")]
    pub l2_l3_voltage: Option<NumericReading>,
    #[serde(rename = "L3L1V", deserialize_with = "optional_singleton")]
    pub l3_l1_voltage: Option<NumericReading>,
    #[serde(rename = "L1I", deserialize_with = "optional_singleton")]
    pub l1_current: Option<NumericReading>,
    #[serde(rename = "L2I", deserialize_with = "optional_singleton")]
    pub l2_current: Option<NumericReading>,
    #[serde(rename = "L3I", deserialize_with = "optional_singleton")]
    pub l3_current: Option<NumericReading>,
    #[serde(rename = "NI", deserialize_with = "optional_singleton")]
    pub neutral_current: Option<NumericReading>,
    #[serde(rename = "freq", deserialize_with = "optional_singleton")]
    pub frequency: Option<NumericReading>,
    #[serde(rename = "PF", deserialize_with = "optional_singleton")]
    pub power_factor: Option<NumericReading>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BreakerStatus {
    #[serde(rename = "mainBreakerStatus", deserialize_with = "optional_singleton")]
    pub main_breaker: Option<BooleanReading>,
    #[serde(rename = "eStopStatus", deserialize_with = "optional_singleton")]
    pub emergency_stop: Option<BooleanReading>,
    #[serde(rename = "earthRelayStatus", deserialize_with = "optional_singleton")]
    pub earth_relay: Option<BooleanReading>,
    #[serde(rename = "neutralRelayStatus", deserialize_with = "optional_singleton")]
    pub neutral_relay: Option<BooleanReading>,
}

/// Live readings of one output channel.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OutputChannel {
    #[serde(rename = "$")]
    pub id: ChannelIdentity,
    #[serde(rename = "channelI", default, deserialize_with = "optional_singleton")]
    pub current: Option<NumericReading>,
    #[serde(rename = "channelMaxI", default, deserialize_with = "optional_singleton")]
    pub max_current: Option<NumericReading>,
    #[serde(rename = "channelInUse", default, deserialize_with = "optional_singleton")]
    pub in_use: Option<BooleanReading>,
}

/// Static configuration of one output channel. Unlike the live readings,
/// none of these fields is wrapped in an array.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ChannelConfig {
    #[serde(rename = "CIBid", deserialize_with = "u8_string")]
    pub group: u8,
    #[serde(rename = "Channelid", deserialize_with = "u8_string")]
    pub channel: u8,
    /// User-assigned channel name, empty when unset.
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub supervised: Option<BooleanReading>,
    #[serde(rename = "thresholdmin", default)]
    pub threshold_min: Option<NumericReading>,
    #[serde(rename = "thresholdmax", default)]
    pub threshold_max: Option<NumericReading>,
}

impl ChannelConfig {
    pub fn id(&self) -> ChannelIdentity {
        ChannelIdentity::new(self.group, self.channel)
    }
}

/// The `config` object: device name and channel configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Display name of the device.
    pub name: Option<String>,
    /// Channel configuration in document order.
    pub channels: Vec<ChannelConfig>,
}

/// Everything the device reported for one scrape.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct SystemSnapshot {
    #[serde(rename = "onBattery", deserialize_with = "optional_singleton")]
    pub on_battery: Option<BooleanReading>,
    #[serde(rename = "mainInputValues", deserialize_with = "optional_singleton")]
    pub main_input: Option<MainInputReadings>,
    #[serde(deserialize_with = "temperature")]
    pub temperature: Option<NumericReading>,
    #[serde(deserialize_with = "optional_singleton")]
    pub breakers: Option<BreakerStatus>,
    /// Output channels in document order, `None` when the device sent no
    /// channel list.
    #[serde(rename = "outputChannels", deserialize_with = "output_channels")]
    pub output_channels: Option<Vec<OutputChannel>>,
    pub config: DeviceConfig,
}

/// `{"smartPDU": {...}}`
#[derive(Debug, Deserialize)]
struct Document {
    #[serde(rename = "smartPDU")]
    pdu: SystemSnapshot,
}

impl SystemSnapshot {
    /// Decode a raw API response body.
    pub fn from_slice(raw: &[u8]) -> Result<Self, DecodeError> {
        let document: Value = serde_json::from_slice(raw).map_err(DecodeError::invalid_json)?;
        Self::from_document(&document)
    }

    /// Decode the API response document.
    pub fn from_document(document: &Value) -> Result<Self, DecodeError> {
        decode::<Document>(document).map(|document| document.pdu)
    }
}

/// `[{"_": "42.5"}]`
fn temperature<'de, D>(deserializer: D) -> Result<Option<NumericReading>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    struct Temperature {
        #[serde(rename = "_", default)]
        value: Option<NumericReading>,
    }

    singleton::<_, Temperature>(deserializer).map(|temperature| temperature.value)
}

/// `[{"channel": [...]}]`
fn output_channels<'de, D>(deserializer: D) -> Result<Option<Vec<OutputChannel>>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    struct Channels {
        #[serde(default)]
        channel: Option<Vec<OutputChannel>>,
    }

    singleton::<_, Channels>(deserializer).map(|channels| channels.channel)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::DecodeErrorKind;
    use serde_json::json;

    const FIXTURE: &str = include_str!("../tests/fixtures/pdu_values.json");

    #[test]
    fn test_decode_fixture() {
        let snapshot = SystemSnapshot::from_slice(FIXTURE.as_bytes()).unwrap();

        assert_eq!(snapshot.on_battery, Some(BooleanReading(false)));
        assert_eq!(snapshot.temperature, Some(NumericReading(42.5)));
        assert_eq!(snapshot.config.name.as_deref(), Some("FOH Rack"));

        let main = snapshot.main_input.unwrap();
        assert_eq!(main.l1_voltage, Some(NumericReading(230.5)));
        assert_eq!(main.l3_l1_voltage, Some(NumericReading(399.8)));
        assert_eq!(main.frequency, Some(NumericReading(50.0)));
        assert_eq!(main.power_factor, Some(NumericReading(0.97)));

        let breakers = snapshot.breakers.unwrap();
        assert_eq!(breakers.main_breaker, Some(BooleanReading(true)));
        assert_eq!(breakers.emergency_stop, Some(BooleanReading(false)));
        assert_eq!(breakers.earth_relay, Some(BooleanReading(true)));

        let channels = snapshot.output_channels.unwrap();
        assert_eq!(channels.len(), 3);
        assert_eq!(channels[2].id, ChannelIdentity::new(1, 2));
        assert_eq!(channels[2].max_current, Some(NumericReading(16.0)));

        let configs = &snapshot.config.channels;
        assert_eq!(configs.len(), 3);
        assert_eq!(configs[0].name, "Stage1");
        assert_eq!(configs[0].id(), ChannelIdentity::new(0, 0));
        assert_eq!(configs[0].supervised, Some(BooleanReading(true)));
        assert_eq!(configs[0].threshold_max, Some(NumericReading(16.0)));
    }

    #[test]
    fn test_absent_readings_are_none() {
        let snapshot = SystemSnapshot::from_document(&json!({ "smartPDU": {} })).unwrap();

        assert_eq!(snapshot, SystemSnapshot::default());
    }

    #[test]
    fn test_unknown_keys_are_ignored() {
        let document = json!({ "smartPDU": { "firmware": ["1.2"], "onBattery": ["true"] } });
        let snapshot = SystemSnapshot::from_document(&document).unwrap();

        assert_eq!(snapshot.on_battery, Some(BooleanReading(true)));
    }

    #[test]
    fn test_missing_root() {
        let err = SystemSnapshot::from_document(&json!({ "somethingElse": {} })).unwrap_err();

        match err.kind {
            DecodeErrorKind::UnexpectedShape(message) => assert!(message.contains("smartPDU")),
            other => panic!("unexpected kind: {:?}", other),
        }
    }

    #[test]
    fn test_invalid_json() {
        let err = SystemSnapshot::from_slice(b"{\"smartPDU\": ").unwrap_err();
        assert!(matches!(err.kind, DecodeErrorKind::InvalidJson(_)));
    }

    #[test]
    fn test_on_battery_two_elements() {
        let document = json!({ "smartPDU": { "onBattery": ["false", "true"] } });
        let err = SystemSnapshot::from_document(&document).unwrap_err();

        assert_eq!(err.field, "smartPDU.onBattery");
        assert_eq!(
            err.kind,
            DecodeErrorKind::SingletonArityViolation { observed: 2 }
        );
    }

    #[test]
    fn test_temperature_number_literal() {
        let document = json!({ "smartPDU": { "temperature": [{ "_": 42.5 }] } });
        let err = SystemSnapshot::from_document(&document).unwrap_err();

        assert_eq!(err.field, "smartPDU.temperature[0]._");
        assert_eq!(err.kind, DecodeErrorKind::UnexpectedNumericEncoding);
    }

    #[test]
    fn test_numeric_literal_in_channel() {
        let document = json!({ "smartPDU": { "outputChannels": [{ "channel": [
            { "$": { "CIBid": "0", "Channelid": "0" }, "channelI": ["1.0"] },
            { "$": { "CIBid": "0", "Channelid": "1" }, "channelI": [1.0] }
        ]}]}});
        let err = SystemSnapshot::from_document(&document).unwrap_err();

        assert_eq!(err.field, "smartPDU.outputChannels[0].channel[1].channelI[0]");
        assert_eq!(err.kind, DecodeErrorKind::UnexpectedNumericEncoding);
    }

    #[test]
    fn test_channel_without_identity() {
        let document = json!({ "smartPDU": { "outputChannels": [{ "channel": [
            { "channelI": ["1.0"] }
        ]}]}});
        let err = SystemSnapshot::from_document(&document).unwrap_err();

        assert_eq!(err.field, "smartPDU.outputChannels[0].channel[0]");
        match err.kind {
            DecodeErrorKind::UnexpectedShape(message) => assert!(message.contains('$')),
            other => panic!("unexpected kind: {:?}", other),
        }
    }

    #[test]
    fn test_negative_identity_in_config() {
        let document = json!({ "smartPDU": { "config": { "channels": [
            { "CIBid": "-1", "Channelid": "0", "name": "x" }
        ]}}});
        let err = SystemSnapshot::from_document(&document).unwrap_err();

        assert_eq!(err.field, "smartPDU.config.channels[0].CIBid");
        assert_eq!(err.kind, DecodeErrorKind::MalformedIdentity);
    }

    #[test]
    fn test_config_entry_without_name() {
        let document = json!({ "smartPDU": { "config": { "name": "PDU", "channels": [
            { "CIBid": "0", "Channelid": "3" }
        ]}}});
        let snapshot = SystemSnapshot::from_document(&document).unwrap();

        let config = &snapshot.config.channels[0];
        assert_eq!(config.id(), ChannelIdentity::new(0, 3));
        assert_eq!(config.name, "");
        assert!(config.supervised.is_none());
    }

    #[test]
    fn test_config_flag_is_not_wrapped() {
        let document = json!({ "smartPDU": { "config": { "channels": [
            { "CIBid": "0", "Channelid": "0", "supervised": ["true"] }
        ]}}});
        let err = SystemSnapshot::from_document(&document).unwrap_err();

        assert_eq!(err.field, "smartPDU.config.channels[0].supervised");
        assert_eq!(err.kind, DecodeErrorKind::UnexpectedBooleanEncoding);
    }
}
