//! Static description of each adapter family: resources, enum tables and
//! response post-processing.

use std::time::Duration;

use tracing::trace;

use crate::flat::{self, FieldMap};
use crate::tree::{self, MultiResponse};
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    /// BRP069 and compatible plain-HTTP adapters.
    Basic,
    /// BRP15B61 AirBase controllers behind the `skyfi/` prefix.
    AirBase,
    /// SkyFi controllers on port 2000, password in every query.
    SkyFi,
    /// BRP072C adapters: HTTPS, terminal registration with a key.
    Secure,
    /// Adapters running firmware 2.8 (`dsiot/multireq` parameter trees).
    Firmware28,
}

impl Dialect {
    pub fn descriptor(self) -> &'static DialectDescriptor {
        match self {
            Dialect::Basic => &BASIC,
            Dialect::AirBase => &AIRBASE,
            Dialect::SkyFi => &SKYFI,
            Dialect::Secure => &SECURE,
            Dialect::Firmware28 => &FIRMWARE_28,
        }
    }

    /// Dialects sharing the BRP069 control endpoints.
    pub fn is_basic_family(self) -> bool {
        matches!(self, Dialect::Basic | Dialect::Secure | Dialect::AirBase)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    /// `ret=OK,key=value,...`
    Flat,
    /// `key=value&key=value`
    Query,
    /// JSON parameter trees.
    Tree,
}

pub type Table = &'static [(&'static str, &'static str)];

#[derive(Debug)]
pub struct ResourceDescriptor {
    pub path: &'static str,
    pub params: &'static [(&'static str, &'static str)],
    /// Canonical fields the resource is expected to populate.
    pub fields: &'static [&'static str],
}

const fn resource(path: &'static str, fields: &'static [&'static str]) -> ResourceDescriptor {
    ResourceDescriptor { path, params: &[], fields }
}

#[derive(Debug)]
pub struct DialectDescriptor {
    pub dialect: Dialect,
    pub name: &'static str,
    pub codec: Codec,
    pub scheme: &'static str,
    pub default_port: Option<u16>,
    pub path_prefix: &'static str,
    /// Everything fetched when the session initialises.
    pub resources: &'static [ResourceDescriptor],
    /// Polled on every refresh cycle once stale.
    pub info_resources: &'static [&'static str],
    /// Added to the refresh cycle when the device reports energy counters.
    pub energy_resources: &'static [&'static str],
    pub translations: &'static [(&'static str, Table)],
    /// Fields the family never supports, whatever the device answers.
    pub unsupported: &'static [&'static str],
    /// Wire name → canonical name.
    pub aliases: &'static [(&'static str, &'static str)],
    pub max_concurrent_requests: usize,
    /// Pause after every request; some controllers drop back-to-back calls.
    pub request_pause: Option<Duration>,
    pub relaxed_tls: bool,
}

impl DialectDescriptor {
    pub fn table(&self, field: &str) -> Option<Table> {
        self.translations
            .iter()
            .find(|(name, _)| *name == field)
            .map(|(_, table)| *table)
    }

    /// Wire code → human label, falling back to the raw code.
    pub fn to_human(&self, field: &str, wire: &str) -> String {
        self.table(field)
            .and_then(|t| t.iter().find(|(w, _)| *w == wire))
            .map_or_else(|| wire.to_string(), |(_, h)| h.to_string())
    }

    /// Human label → wire code, case-insensitive, falling back to the input.
    pub fn to_wire(&self, field: &str, human: &str) -> String {
        self.table(field)
            .and_then(|t| t.iter().find(|(_, h)| h.eq_ignore_ascii_case(human)))
            .map_or_else(|| human.to_string(), |(w, _)| w.to_string())
    }

    pub fn labels(&self, field: &str) -> Vec<&'static str> {
        self.table(field)
            .map(|t| t.iter().map(|(_, h)| *h).collect())
            .unwrap_or_default()
    }

    pub fn resource(&self, path: &str) -> Option<&'static ResourceDescriptor> {
        self.resources.iter().find(|r| r.path == path)
    }

    pub fn declares(&self, field: &str) -> bool {
        self.resources.iter().any(|r| r.fields.contains(&field))
    }

    pub fn is_unsupported(&self, field: &str) -> bool {
        self.unsupported.contains(&field)
    }

    /// Human mode, with power-off reported as the virtual `"off"` mode.
    pub fn human_mode(&self, pow: Option<&str>, mode: &str) -> String {
        if pow == Some("0") {
            return "off".to_string();
        }
        self.to_human("mode", mode)
    }

    /// Turns one response body into canonical fields.
    pub fn decode(&self, body: &str) -> Result<FieldMap> {
        trace!(dialect = self.name, body, "decoding response");
        let mut fields = match self.codec {
            Codec::Flat => flat::decode(body)?,
            Codec::Query => flat::decode_query(body)?,
            Codec::Tree => return decode_firmware_status(&tree::parse(body)?),
        };
        self.normalize(&mut fields);
        Ok(fields)
    }

    /// Brings wire fields into canonical form: split swing axes, AirBase
    /// auto fan flag, SkyFi aliases. Also applied to the parameters of a
    /// sent command before they are merged into the cache.
    pub fn normalize(&self, fields: &mut FieldMap) {
        merge_swing_axes(fields);
        match self.dialect {
            Dialect::AirBase => join_auto_fan(fields),
            Dialect::SkyFi => apply_skyfi_aliases(fields, self.aliases),
            _ => {}
        }
    }
}

/// Some units (Alira X) split swing into two axes; fold them into `f_dir`.
fn merge_swing_axes(fields: &mut FieldMap) {
    let combined = match (
        fields.get("f_dir_ud").map(String::as_str),
        fields.get("f_dir_lr").map(String::as_str),
    ) {
        (Some("0"), Some("0")) => "0",
        (Some("S"), Some("0")) => "1",
        (Some("0"), Some("S")) => "2",
        (Some("S"), Some("S")) => "3",
        _ => return,
    };
    fields.insert("f_dir".to_string(), combined.to_string());
}

/// Splits `f_dir` back into the two-axis form.
pub fn split_swing_axes(f_dir: &str) -> (&'static str, &'static str) {
    let ud = if matches!(f_dir, "1" | "3") { "S" } else { "0" };
    let lr = if matches!(f_dir, "2" | "3") { "S" } else { "0" };
    (ud, lr)
}

/// AirBase reports auto fan as a separate flag; expose it as a suffixed
/// rate (`f_rate=1,f_auto=1` → `1a`).
fn join_auto_fan(fields: &mut FieldMap) {
    if fields.get("f_auto").map(String::as_str) == Some("1")
        && let Some(rate) = fields.get_mut("f_rate")
        && !rate.ends_with('a')
    {
        rate.push('a');
    }
}

fn apply_skyfi_aliases(fields: &mut FieldMap, aliases: &[(&str, &str)]) {
    if fields.get("fanflags").map(String::as_str) == Some("3")
        && let Some(speed) = fields.get_mut("fanspeed")
        && let Ok(raw) = speed.parse::<u32>()
    {
        *speed = (raw + 4).to_string();
    }
    for (wire, canonical) in aliases {
        if let Some(value) = fields.get(*wire).cloned() {
            fields.insert(canonical.to_string(), value);
        }
    }
}

const FW_PATH_STATUS: [&str; 3] = ["dgc_status", "e_1002", "e_3001"];
const FW_PATH_POWER: [&str; 4] = ["dgc_status", "e_1002", "e_A002", "p_01"];
const FW_PATH_ROOM: [&str; 3] = ["dgc_status", "e_1002", "e_A00B"];
const FW_PATH_OUTSIDE: [&str; 4] = ["dgc_status", "e_1003", "e_A00D", "p_01"];

/// Per-mode parameter holding the target temperature.
pub const FW_MODE_TEMP_PARAM: &[(&str, &str)] = &[("cool", "p_02"), ("hot", "p_03"), ("auto", "p_1D")];

/// Per-mode (vertical, horizontal) swing parameters.
pub const FW_MODE_SWING_PARAMS: &[(&str, (&str, &str))] = &[
    ("auto", ("p_20", "p_21")),
    ("cool", ("p_05", "p_06")),
    ("hot", ("p_07", "p_08")),
    ("fan", ("p_24", "p_25")),
    ("dry", ("p_22", "p_23")),
];

pub const FW_MODE_FAN_PARAM: &[(&str, &str)] =
    &[("auto", "p_26"), ("cool", "p_09"), ("hot", "p_0A"), ("fan", "p_28")];

pub const FW_SWING_AXIS_OFF: &str = "000000";
pub const FW_SWING_AXIS_ON: &str = "0F0000";

pub fn lookup<T: Copy>(table: &[(&str, T)], key: &str) -> Option<T> {
    table.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
}

fn status_param<'a>(resp: &'a MultiResponse, param: &str) -> Result<&'a str> {
    let [root, unit, group] = FW_PATH_STATUS;
    tree::find_str(resp, tree::INDOOR_STATUS, &[root, unit, group, param])
}

fn firmware_swing(resp: &MultiResponse, mode_label: &str) -> &'static str {
    let Some((vertical, horizontal)) = lookup(FW_MODE_SWING_PARAMS, mode_label) else {
        return "off";
    };
    let axis_on = |param| status_param(resp, param).is_ok_and(|v| v.contains('F'));
    match (axis_on(vertical), axis_on(horizontal)) {
        (true, true) => "both",
        (true, false) => "vertical",
        (false, true) => "horizontal",
        (false, false) => "off",
    }
}

/// Maps the firmware 2.8 status trees onto the canonical field names shared
/// with the flat dialects. Mode, fan rate and swing keep their wire codes;
/// temperatures become decimal strings.
pub fn decode_firmware_status(resp: &MultiResponse) -> Result<FieldMap> {
    let mut fields = FieldMap::new();
    fields.insert(
        "mac".to_string(),
        tree::find_str(resp, tree::ADAPTER_INFO, &["adp_i", "mac"])?.to_string(),
    );

    let is_off = tree::find_str(resp, tree::INDOOR_STATUS, &FW_PATH_POWER)? == "00";
    fields.insert("pow".to_string(), if is_off { "0" } else { "1" }.to_string());

    let mode = status_param(resp, "p_01")?.to_string();
    let mode_label = FIRMWARE_28.to_human("mode", &mode);

    let [root, unit, room] = FW_PATH_ROOM;
    let htemp = tree::find_str(resp, tree::INDOOR_STATUS, &[root, unit, room, "p_01"])?;
    fields.insert("htemp".to_string(), format!("{:.1}", tree::hex_to_temp(htemp, 1.0)?));

    let otemp = tree::find_str(resp, tree::OUTDOOR_STATUS, &FW_PATH_OUTSIDE)
        .and_then(|v| tree::hex_to_temp(v, 2.0));
    fields.insert(
        "otemp".to_string(),
        otemp.map_or_else(|_| "-".to_string(), |t| format!("{t:.1}")),
    );

    let hhum = tree::find_str(resp, tree::INDOOR_STATUS, &[root, unit, room, "p_02"])
        .and_then(tree::hex_to_int);
    fields.insert(
        "hhum".to_string(),
        hhum.map_or_else(|_| "--".to_string(), |h| h.to_string()),
    );

    let stemp = match lookup(FW_MODE_TEMP_PARAM, &mode_label) {
        Some(param) => format!("{:.1}", tree::hex_to_temp(status_param(resp, param)?, 2.0)?),
        None => "--".to_string(),
    };
    fields.insert("stemp".to_string(), stemp);

    let f_rate = lookup(FW_MODE_FAN_PARAM, &mode_label)
        .and_then(|param| status_param(resp, param).ok())
        .unwrap_or("0A00");
    fields.insert("f_rate".to_string(), f_rate.to_string());
    fields.insert("f_dir".to_string(), firmware_swing(resp, &mode_label).to_string());
    fields.insert("mode".to_string(), mode);

    if let Ok(runtime) = tree::find_value(resp, tree::WEEK_POWER, &["week_power", "today_runtime"]) {
        let runtime = runtime.as_str().map_or_else(|| runtime.to_string(), str::to_string);
        fields.insert("today_runtime".to_string(), runtime);
    }
    if let Ok(serde_json::Value::Array(datas)) =
        tree::find_value(resp, tree::WEEK_POWER, &["week_power", "datas"])
        && !datas.is_empty()
    {
        let joined = datas.iter().map(|v| v.to_string()).collect::<Vec<_>>().join("/");
        fields.insert("datas".to_string(), joined);
    }
    Ok(fields)
}

const ON_OFF: Table = &[("0", "off"), ("1", "on")];

const BASIC_MODE: Table = &[
    ("2", "dry"),
    ("3", "cool"),
    ("4", "hot"),
    ("6", "fan"),
    ("0", "auto"),
    ("1", "auto-1"),
    ("7", "auto-7"),
    ("10", "off"),
];

const BASIC_FAN_RATE: Table = &[
    ("A", "auto"),
    ("B", "silence"),
    ("3", "1"),
    ("4", "2"),
    ("5", "3"),
    ("6", "4"),
    ("7", "5"),
];

const BASIC_SWING: Table = &[("0", "off"), ("1", "vertical"), ("2", "horizontal"), ("3", "3d")];

const ADVANCED: Table = &[
    ("", "off"),
    ("2", "powerful"),
    ("2/13", "powerful streamer"),
    ("12", "econo"),
    ("12/13", "econo streamer"),
    ("13", "streamer"),
];

const SPECIAL_MODE_KIND: Table = &[("0", "streamer"), ("1", "powerful"), ("2", "econo")];

const BASIC_TRANSLATIONS: &[(&str, Table)] = &[
    ("mode", BASIC_MODE),
    ("f_rate", BASIC_FAN_RATE),
    ("f_dir", BASIC_SWING),
    ("en_hol", ON_OFF),
    ("en_streamer", ON_OFF),
    ("adv", ADVANCED),
    ("spmode_kind", SPECIAL_MODE_KIND),
    ("spmode", ON_OFF),
];

const BASIC_RESOURCES: &[ResourceDescriptor] = &[
    resource("common/basic_info", &["type", "reg", "ver", "pow", "err", "name", "mac", "en_hol", "ssid1"]),
    resource("common/get_remote_method", &["method", "notice_ip_int", "notice_sync_int"]),
    resource("aircon/get_sensor_info", &["htemp", "hhum", "otemp", "err", "cmpfreq"]),
    resource("aircon/get_model_info", &["model", "humd", "en_frate", "en_fdir", "s_fdir", "en_spmode"]),
    resource("aircon/get_control_info", &["pow", "mode", "adv", "stemp", "shum", "f_rate", "f_dir"]),
    resource("aircon/get_target", &["target"]),
    resource("aircon/get_price", &["price_int", "price_dec"]),
    resource("common/get_holiday", &["en_hol"]),
    resource("common/get_notify", &["auto_off_flg", "auto_off_tm"]),
    resource(
        "aircon/get_day_power_ex",
        &["curr_day_cool", "curr_day_heat", "prev_1day_cool", "prev_1day_heat"],
    ),
    resource("aircon/get_week_power", &["today_runtime", "datas"]),
    resource("aircon/get_year_power", &["previous_year", "this_year"]),
    resource("common/get_datetime", &["cur"]),
];

const BASIC_INFO: &[&str] = &["aircon/get_sensor_info", "aircon/get_control_info"];
const BASIC_ENERGY: &[&str] = &["aircon/get_day_power_ex", "aircon/get_week_power"];

const BRP069: DialectDescriptor = DialectDescriptor {
    dialect: Dialect::Basic,
    name: "basic",
    codec: Codec::Flat,
    scheme: "http",
    default_port: None,
    path_prefix: "",
    resources: BASIC_RESOURCES,
    info_resources: BASIC_INFO,
    energy_resources: BASIC_ENERGY,
    translations: BASIC_TRANSLATIONS,
    unsupported: &[],
    aliases: &[],
    max_concurrent_requests: 1,
    request_pause: None,
    relaxed_tls: false,
};

pub static BASIC: DialectDescriptor = BRP069;

pub static SECURE: DialectDescriptor = DialectDescriptor {
    dialect: Dialect::Secure,
    name: "secure",
    scheme: "https",
    relaxed_tls: true,
    ..BRP069
};

const AIRBASE_MODE: Table = &[("0", "fan"), ("1", "hot"), ("2", "cool"), ("3", "auto"), ("7", "dry")];

const AIRBASE_FAN_RATE: Table = &[
    ("0", "auto"),
    ("1", "low"),
    ("3", "mid"),
    ("5", "high"),
    ("1a", "low/auto"),
    ("3a", "mid/auto"),
    ("5a", "high/auto"),
];

const AIRBASE_TRANSLATIONS: &[(&str, Table)] = &[
    ("mode", AIRBASE_MODE),
    ("f_rate", AIRBASE_FAN_RATE),
    ("f_dir", BASIC_SWING),
    ("en_hol", ON_OFF),
    ("en_streamer", ON_OFF),
    ("adv", ADVANCED),
    ("spmode_kind", SPECIAL_MODE_KIND),
    ("spmode", ON_OFF),
];

const AIRBASE_RESOURCES: &[ResourceDescriptor] = &[
    resource("common/basic_info", &["type", "ver", "pow", "err", "name", "mac"]),
    resource("aircon/get_control_info", &["pow", "mode", "stemp", "shum", "f_rate", "f_auto", "f_dir"]),
    resource("aircon/get_model_info", &["model", "frate_steps", "en_frate_auto"]),
    resource("aircon/get_sensor_info", &["htemp", "otemp", "err"]),
    resource("aircon/get_zone_setting", &["zone_name", "zone_onoff", "lztemp_c", "lztemp_h"]),
];

pub static AIRBASE: DialectDescriptor = DialectDescriptor {
    dialect: Dialect::AirBase,
    name: "airbase",
    path_prefix: "skyfi/",
    resources: AIRBASE_RESOURCES,
    info_resources: &["aircon/get_sensor_info", "aircon/get_control_info", "aircon/get_zone_setting"],
    energy_resources: &[],
    translations: AIRBASE_TRANSLATIONS,
    unsupported: &["en_hol", "f_dir"],
    ..BRP069
};

/// Sensor fields AirBase units may omit entirely; `-` marks "no sensor".
pub const AIRBASE_DEFAULTS: &[(&str, &str)] = &[("htemp", "-"), ("otemp", "-"), ("shum", "--")];

const SKYFI_MODE: Table = &[
    ("0", "off"),
    ("1", "auto"),
    ("2", "hot"),
    ("3", "auto-3"),
    ("4", "dry"),
    ("8", "cool"),
    ("9", "auto-9"),
    ("16", "fan"),
];

const SKYFI_FAN_RATE: Table = &[
    ("1", "low"),
    ("2", "medium"),
    ("3", "high"),
    ("5", "low/auto"),
    ("6", "medium/auto"),
    ("7", "high/auto"),
];

pub static SKYFI: DialectDescriptor = DialectDescriptor {
    dialect: Dialect::SkyFi,
    name: "skyfi",
    codec: Codec::Query,
    scheme: "http",
    default_port: Some(2000),
    path_prefix: "",
    resources: &[
        resource("ac.cgi", &["pow", "stemp", "htemp", "otemp", "f_rate", "mode"]),
        resource("zones.cgi", &["nz"]),
    ],
    info_resources: &["ac.cgi", "zones.cgi"],
    energy_resources: &[],
    translations: &[("mode", SKYFI_MODE), ("f_rate", SKYFI_FAN_RATE)],
    unsupported: &["en_hol", "f_dir"],
    aliases: &[
        ("outsidetemp", "otemp"),
        ("roomtemp", "htemp"),
        ("settemp", "stemp"),
        ("opmode", "pow"),
        ("fanspeed", "f_rate"),
        ("acmode", "mode"),
    ],
    max_concurrent_requests: 1,
    request_pause: Some(Duration::from_millis(300)),
    relaxed_tls: false,
};

const FW_MODE: Table = &[
    ("0300", "auto"),
    ("0200", "cool"),
    ("0100", "hot"),
    ("0000", "fan"),
    ("0500", "dry"),
];

const FW_FAN_RATE: Table = &[
    ("0A00", "auto"),
    ("0B00", "quiet"),
    ("0300", "1"),
    ("0400", "2"),
    ("0500", "3"),
    ("0600", "4"),
    ("0700", "5"),
];

const FW_SWING: Table = &[
    ("off", "off"),
    ("vertical", "vertical"),
    ("horizontal", "horizontal"),
    ("both", "3d"),
];

pub static FIRMWARE_28: DialectDescriptor = DialectDescriptor {
    dialect: Dialect::Firmware28,
    name: "firmware-2.8",
    codec: Codec::Tree,
    scheme: "http",
    default_port: None,
    path_prefix: "",
    resources: &[resource(
        tree::MULTIREQ_PATH,
        &["mac", "pow", "mode", "htemp", "otemp", "hhum", "stemp", "f_rate", "f_dir", "datas"],
    )],
    info_resources: &[tree::MULTIREQ_PATH],
    energy_resources: &[],
    translations: &[("mode", FW_MODE), ("f_rate", FW_FAN_RATE), ("f_dir", FW_SWING)],
    unsupported: &["en_hol"],
    aliases: &[],
    max_concurrent_requests: 4,
    request_pause: None,
    relaxed_tls: false,
};
