//! Builds the wire requests for control commands. Every builder is pure: it
//! takes the device's current control state and the caller's settings and
//! returns the request to send.

use tracing::debug;

use crate::dialect::{self, DialectDescriptor};
use crate::flat::{self, FieldMap};
use crate::tree::{self, TreeAttribute, TreeRequest};
use crate::types::{Settings, Temperature};
use crate::{Error, Result};

pub const SET_CONTROL_INFO: &str = "aircon/set_control_info";
pub const SET_HOLIDAY: &str = "common/set_holiday";
pub const SET_SPECIAL_MODE: &str = "aircon/set_special_mode";
pub const SET_ZONE_SETTING: &str = "aircon/set_zone_setting";
pub const GET_ZONE_SETTING: &str = "aircon/get_zone_setting";
pub const GET_CONTROL_INFO: &str = "aircon/get_control_info";
pub const SKYFI_STATUS: &str = "ac.cgi";
pub const SKYFI_SET: &str = "set.cgi";
pub const SKYFI_SET_ZONE: &str = "setzone.cgi";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// GET with an already encoded query string.
    Get { path: String, query: String },
    /// POST of a parameter-tree batch to `dsiot/multireq`.
    Tree(TreeRequest),
}

impl Command {
    fn get<K: AsRef<str>, V: AsRef<str>>(path: &str, params: &[(K, V)]) -> Self {
        Command::Get {
            path: path.to_string(),
            query: flat::encode(params),
        }
    }

    pub fn path(&self) -> &str {
        match self {
            Command::Get { path, .. } => path,
            Command::Tree(_) => tree::MULTIREQ_PATH,
        }
    }
}

fn invalid(field: &str, value: &str) -> Error {
    Error::InvalidSetting {
        field: field.to_string(),
        value: value.to_string(),
    }
}

/// Translates one human setting to its wire code. Labels win over codes so
/// that a fan rate of `"3"` means the third step, not wire code 3.
pub fn encode_setting(descriptor: &DialectDescriptor, field: &str, value: &str) -> Result<String> {
    if let Some(table) = descriptor.table(field) {
        return table
            .iter()
            .find(|(_, human)| human.eq_ignore_ascii_case(value))
            .or_else(|| table.iter().find(|(wire, _)| *wire == value))
            .map(|(wire, _)| wire.to_string())
            .ok_or_else(|| invalid(field, value));
    }
    if field == "stemp" && Temperature::from_wire(value).is_none() {
        return Err(invalid(field, value));
    }
    Ok(value.to_string())
}

fn value<'a>(values: &'a FieldMap, field: &str) -> &'a str {
    values.get(field).map_or("", String::as_str)
}

/// Overlays `settings` on the device's control state the way the BRP069
/// family expects: `off` keeps the current mode with `pow=0`, and fields the
/// caller left out take the unit's remembered per-mode values.
fn merge_control(descriptor: &DialectDescriptor, current: &FieldMap, settings: &Settings) -> Result<FieldMap> {
    let mut values = current.clone();
    for (field, human) in settings.iter() {
        if field == "mode" && settings.is_power_off() {
            continue;
        }
        values.insert(field.to_string(), encode_setting(descriptor, field, human)?);
    }

    if settings.is_power_off() {
        values.insert("pow".to_string(), "0".to_string());
        values.insert("mode".to_string(), value(current, "mode").to_string());
    } else if settings.contains("mode") || settings.is_empty() {
        values.insert("pow".to_string(), "1".to_string());
    }

    let mode = value(&values, "mode").to_string();
    for (field, prefix) in [("stemp", "dt"), ("shum", "dh"), ("f_rate", "dfr")] {
        if !settings.contains(field)
            && let Some(remembered) = current.get(&format!("{prefix}{mode}"))
        {
            values.insert(field.to_string(), remembered.clone());
        }
    }
    Ok(values)
}

pub fn basic_control(descriptor: &DialectDescriptor, current: &FieldMap, settings: &Settings) -> Result<Command> {
    let values = merge_control(descriptor, current, settings)?;
    let mut params = vec![
        ("mode", value(&values, "mode")),
        ("pow", value(&values, "pow")),
        ("shum", value(&values, "shum")),
        ("stemp", value(&values, "stemp")),
    ];
    if values.contains_key("f_rate") {
        params.push(("f_rate", value(&values, "f_rate")));
    }
    if values.contains_key("f_dir_ud") && values.contains_key("f_dir_lr") {
        let (ud, lr) = dialect::split_swing_axes(value(&values, "f_dir"));
        params.push(("f_dir_ud", ud));
        params.push(("f_dir_lr", lr));
    } else if values.contains_key("f_dir") {
        params.push(("f_dir", value(&values, "f_dir")));
    }
    debug!(path = SET_CONTROL_INFO, ?params, "control request");
    Ok(Command::get(SET_CONTROL_INFO, &params))
}

/// AirBase carries auto fan as a separate `f_auto` flag and only accepts
/// the first character of the rate.
pub fn airbase_control(descriptor: &DialectDescriptor, current: &FieldMap, settings: &Settings) -> Result<Command> {
    let mut values = merge_control(descriptor, current, settings)?;
    if current.contains_key("f_auto") {
        if settings.contains("f_rate") {
            let auto = if value(&values, "f_rate").contains('a') { "1" } else { "0" };
            values.insert("f_auto".to_string(), auto.to_string());
        } else if let Some(auto) = current.get(&format!("auto{}", value(&values, "mode"))) {
            values.insert("f_auto".to_string(), auto.clone());
            if auto == "1"
                && let Some(rate) = values.get_mut("f_rate")
                && !rate.ends_with('a')
            {
                rate.push('a');
            }
        }
    }

    let f_rate = value(&values, "f_rate").chars().next().map(String::from).unwrap_or_default();
    let params = [
        ("f_airside", values.get("f_airside").map_or("0", String::as_str)),
        ("f_auto", values.get("f_auto").map_or("0", String::as_str)),
        ("f_dir", values.get("f_dir").map_or("0", String::as_str)),
        ("f_rate", f_rate.as_str()),
        ("lpw", ""),
        ("mode", value(&values, "mode")),
        ("pow", value(&values, "pow")),
        ("shum", value(&values, "shum")),
        ("stemp", value(&values, "stemp")),
    ];
    debug!(path = SET_CONTROL_INFO, ?params, "airbase control request");
    Ok(Command::get(SET_CONTROL_INFO, &params))
}

/// SkyFi takes `p` (power), `t` (target), `f` (fan) and `m` (mode); powering
/// off sends `p=0` alone.
pub fn skyfi_control(descriptor: &DialectDescriptor, current: &FieldMap, settings: &Settings) -> Result<Command> {
    if settings.is_power_off() {
        return Ok(Command::get(SKYFI_SET, &[("p", "0")]));
    }
    let mut values = current.clone();
    for (field, human) in settings.iter() {
        values.insert(field.to_string(), encode_setting(descriptor, field, human)?);
    }
    if settings.contains("mode") {
        values.insert("pow".to_string(), "1".to_string());
    }
    let params = [
        ("p", value(&values, "pow")),
        ("t", value(&values, "stemp")),
        ("f", value(&values, "f_rate")),
        ("m", value(&values, "mode")),
    ];
    debug!(path = SKYFI_SET, ?params, "skyfi control request");
    Ok(Command::get(SKYFI_SET, &params))
}

/// Largest target one hex byte can carry at half-degree resolution.
const FW_MAX_TARGET: f64 = 127.5;

fn status_attribute(name: &str, value: impl Into<String>, group: &'static str) -> TreeAttribute {
    TreeAttribute::new(name, value, &["e_1002", group], tree::INDOOR_STATUS)
}

/// Firmware 2.8 writes individual parameters; which parameter holds the
/// target, fan rate or swing depends on the mode the unit ends up in.
pub fn firmware_control(descriptor: &DialectDescriptor, current: &FieldMap, settings: &Settings) -> Result<Command> {
    let mut attributes = Vec::new();
    if settings.is_power_off() {
        attributes.push(status_attribute("p_01", "00", "e_A002"));
        return Ok(Command::Tree(TreeRequest::new(attributes)));
    }

    let mut mode = value(current, "mode").to_string();
    if let Some(human) = settings.get("mode") {
        mode = encode_setting(descriptor, "mode", human)?;
        attributes.push(status_attribute("p_01", "01", "e_A002"));
        attributes.push(status_attribute("p_01", mode.clone(), "e_3001"));
    }
    let mode_label = descriptor.to_human("mode", &mode);

    if let Some(stemp) = settings.get("stemp")
        && let Some(param) = dialect::lookup(dialect::FW_MODE_TEMP_PARAM, &mode_label)
    {
        let target = Temperature::from_wire(stemp)
            .filter(|t| (0.0..=FW_MAX_TARGET).contains(&t.celsius()))
            .ok_or_else(|| invalid("stemp", stemp))?;
        attributes.push(status_attribute(param, tree::temp_to_hex(target.celsius(), 2.0), "e_3001"));
    }

    if let Some(rate) = settings.get("f_rate")
        && let Some(param) = dialect::lookup(dialect::FW_MODE_FAN_PARAM, &mode_label)
    {
        attributes.push(status_attribute(param, encode_setting(descriptor, "f_rate", rate)?, "e_3001"));
    }

    if let Some(swing) = settings.get("f_dir")
        && let Some((vertical, horizontal)) = dialect::lookup(dialect::FW_MODE_SWING_PARAMS, &mode_label)
    {
        let swing = encode_setting(descriptor, "f_dir", swing)?;
        let axis = |on: bool| if on { dialect::FW_SWING_AXIS_ON } else { dialect::FW_SWING_AXIS_OFF };
        attributes.push(status_attribute(vertical, axis(matches!(swing.as_str(), "vertical" | "both")), "e_3001"));
        attributes.push(status_attribute(horizontal, axis(matches!(swing.as_str(), "horizontal" | "both")), "e_3001"));
    }

    debug!(count = attributes.len(), mode = %mode_label, "firmware control request");
    Ok(Command::Tree(TreeRequest::new(attributes)))
}

fn on_off(descriptor: &DialectDescriptor, field: &str, value: &str) -> Result<String> {
    let wire = encode_setting(descriptor, field, value)?;
    if matches!(wire.as_str(), "0" | "1") {
        Ok(wire)
    } else {
        Err(invalid(field, value))
    }
}

pub fn holiday(descriptor: &DialectDescriptor, mode: &str) -> Result<Command> {
    let en_hol = on_off(descriptor, "en_hol", mode)?;
    Ok(Command::get(SET_HOLIDAY, &[("en_hol", en_hol)]))
}

pub fn advanced_mode(descriptor: &DialectDescriptor, kind: &str, value: &str) -> Result<Command> {
    let kind = encode_setting(descriptor, "spmode_kind", kind)?;
    let value = on_off(descriptor, "spmode", value)?;
    Ok(Command::get(SET_SPECIAL_MODE, &[("spmode_kind", kind), ("set_spmode", value)]))
}

pub fn streamer(descriptor: &DialectDescriptor, mode: &str) -> Result<Command> {
    let value = on_off(descriptor, "en_streamer", mode)?;
    Ok(Command::get(SET_SPECIAL_MODE, &[("en_streamer", value)]))
}

/// Splits an AirBase `;`-separated, percent-encoded zone group.
pub fn zone_group(raw: &str) -> Vec<String> {
    flat::percent_decode(raw).split(';').map(str::to_string).collect()
}

/// The zone temperature group that applies to the unit's active mode.
pub fn zone_temperature_field(values: &FieldMap) -> Option<&'static str> {
    let mut mode = value(values, "mode");
    if mode == "3" {
        mode = value(values, "operate");
    }
    match mode {
        "1" => Some("lztemp_h"),
        "2" => Some("lztemp_c"),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoneField {
    Power,
    Temperature,
}

/// Rewrites one entry of an AirBase zone group. The query is assembled by
/// hand: zone names come back percent-encoded and must be echoed verbatim.
pub fn airbase_zone(zone_state: &FieldMap, mode_state: &FieldMap, zone: usize, field: ZoneField, new_value: &str) -> Result<Command> {
    let key = match field {
        ZoneField::Power => "zone_onoff",
        ZoneField::Temperature => zone_temperature_field(mode_state).unwrap_or("lztemp"),
    };
    let raw = zone_state
        .get(key)
        .ok_or_else(|| Error::Protocol(format!("zone setting has no {key}")))?;
    let mut group = zone_group(raw);
    let slot = group
        .get_mut(zone)
        .ok_or_else(|| invalid("zone", &zone.to_string()))?;
    *slot = new_value.to_string();
    let encoded = urlencoding::encode(&group.join(";")).to_lowercase();

    let mut values = zone_state.clone();
    values.insert(key.to_string(), encoded);
    let mut keys = vec!["zone_name", "zone_onoff"];
    if values.contains_key("lztemp_c") {
        keys.extend(["lztemp_c", "lztemp_h"]);
    }
    let query = keys
        .iter()
        .map(|k| format!("{k}={}", value(&values, k)))
        .collect::<Vec<_>>()
        .join("&");
    debug!(path = SET_ZONE_SETTING, zone, ?field, "zone request");
    Ok(Command::Get {
        path: SET_ZONE_SETTING.to_string(),
        query,
    })
}

pub fn skyfi_zone(zone: usize, on: bool) -> Command {
    let z = (zone + 1).to_string();
    Command::get(SKYFI_SET_ZONE, &[("z", z.as_str()), ("s", if on { "1" } else { "0" })])
}
