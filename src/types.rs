use std::collections::BTreeMap;
use std::fmt;
use std::net::IpAddr;

use serde::Deserialize;

/// Temperature in Celsius. Flat dialects carry it as a decimal string with
/// half-degree precision.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Temperature(f64);

impl Temperature {
    pub fn from_celsius(c: f64) -> Self {
        Self(c)
    }

    pub fn celsius(&self) -> f64 {
        self.0
    }

    /// Parses a wire value. Sensors that are absent report `-`, `--` or `M`.
    pub fn from_wire(raw: &str) -> Option<Self> {
        raw.trim().parse::<f64>().ok().filter(|v| v.is_finite()).map(Self)
    }

    /// Round to half a degree, the precision the adapters accept.
    pub fn to_wire(&self) -> String {
        format!("{:.1}", (self.0 * 2.0).round() / 2.0)
    }
}

impl fmt::Display for Temperature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}\u{00b0}C", self.0)
    }
}

/// Answer to a capability-dependent read.
#[derive(Debug, Clone, PartialEq)]
pub enum Reading<T> {
    Value(T),
    /// The dialect has the field but the device reports no value
    /// (missing sensor, `-` sentinel).
    Absent,
    /// The resolved dialect or device does not provide this at all.
    Unsupported,
}

impl<T> Reading<T> {
    pub fn value(self) -> Option<T> {
        match self {
            Reading::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_ref(&self) -> Reading<&T> {
        match self {
            Reading::Value(v) => Reading::Value(v),
            Reading::Absent => Reading::Absent,
            Reading::Unsupported => Reading::Unsupported,
        }
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, Reading::Unsupported)
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Reading<U> {
        match self {
            Reading::Value(v) => Reading::Value(f(v)),
            Reading::Absent => Reading::Absent,
            Reading::Unsupported => Reading::Unsupported,
        }
    }

    /// Keeps the value only if `f` accepts it, otherwise reports `Absent`.
    pub fn and_then<U>(self, f: impl FnOnce(T) -> Option<U>) -> Reading<U> {
        match self {
            Reading::Value(v) => f(v).map_or(Reading::Absent, Reading::Value),
            Reading::Absent => Reading::Absent,
            Reading::Unsupported => Reading::Unsupported,
        }
    }
}

/// Outcome of a command that not every dialect implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Sent,
    Unsupported,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EnergyMode {
    Total,
    Cool,
    Heat,
}

impl EnergyMode {
    pub const ALL: [EnergyMode; 3] = [EnergyMode::Total, EnergyMode::Cool, EnergyMode::Heat];

    pub fn as_str(&self) -> &'static str {
        match self {
            EnergyMode::Total => "total",
            EnergyMode::Cool => "cool",
            EnergyMode::Heat => "heat",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnergyPeriod {
    Today,
    Yesterday,
    Last7Days,
    ThisYear,
    LastYear,
}

/// Human-level settings delta, keyed by canonical field name
/// (`mode`, `stemp`, `shum`, `f_rate`, `f_dir`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Settings {
    values: BTreeMap<String, String>,
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(field.into(), value.into());
        self
    }

    /// `"off"` powers the unit down; any other mode powers it on.
    pub fn mode(self, mode: impl Into<String>) -> Self {
        self.set("mode", mode)
    }

    pub fn target_temperature(self, temp: Temperature) -> Self {
        self.set("stemp", temp.to_wire())
    }

    pub fn target_humidity(self, humidity: u8) -> Self {
        self.set("shum", humidity.to_string())
    }

    pub fn fan_rate(self, rate: impl Into<String>) -> Self {
        self.set("f_rate", rate)
    }

    pub fn swing(self, swing: impl Into<String>) -> Self {
        self.set("f_dir", swing)
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.values.get(field).map(String::as_str)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.values.contains_key(field)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_power_off(&self) -> bool {
        self.get("mode").is_some_and(|mode| mode.eq_ignore_ascii_case("off"))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Zone {
    pub name: String,
    pub on: bool,
    pub temperature: Option<f64>,
}

/// Emitted for every canonical field a refresh or command changed.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldChange {
    pub resource: String,
    pub field: String,
    pub old: Option<String>,
    pub new: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Credentials {
    /// SkyFi controllers: sent as the first query parameter of every call.
    #[serde(default)]
    pub password: Option<String>,
    /// BRP072C adapters: registration key for the HTTPS dialect.
    #[serde(default)]
    pub key: Option<String>,
    /// Terminal uuid registered with the key; derived from the crate name when unset.
    #[serde(default)]
    pub uuid: Option<String>,
}

impl Credentials {
    pub fn password(password: impl Into<String>) -> Self {
        Self { password: Some(password.into()), ..Self::default() }
    }

    pub fn key(key: impl Into<String>) -> Self {
        Self { key: Some(key.into()), ..Self::default() }
    }
}

/// A resolved device address.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Endpoint {
    pub host: String,
    #[serde(default)]
    pub port: Option<u16>,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: Option<u16>) -> Self {
        Self { host: host.into(), port }
    }

    /// Accepts `ip`, `ip:port`, `[v6]:port` and `host:port`. Bare names
    /// without a port return `None` so they can go through discovery.
    pub fn parse(target: &str) -> Option<Self> {
        if let Ok(ip) = target.parse::<IpAddr>() {
            return Some(Self::new(ip.to_string(), None));
        }
        if let Ok(addr) = target.parse::<std::net::SocketAddr>() {
            return Some(Self::new(addr.ip().to_string(), Some(addr.port())));
        }
        let (host, port) = target.rsplit_once(':')?;
        let port = port.parse().ok()?;
        (!host.is_empty()).then(|| Self::new(host, Some(port)))
    }

    /// `host[:port]` with IPv6 literals bracketed.
    pub fn authority(&self, default_port: Option<u16>) -> String {
        let host = if self.host.contains(':') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        };
        match self.port.or(default_port) {
            Some(port) => format!("{host}:{port}"),
            None => host,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.authority(None))
    }
}
