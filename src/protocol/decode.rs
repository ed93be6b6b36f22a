//! Per-id payload decoding.
//!
//! Each known message id maps to a list of [`FieldSpec`]s describing where a
//! parameter lives in the 16-byte payload and how to interpret it. The table
//! is the integration contract for extending the decoder as more ids are
//! reverse-engineered: add a row, nothing else changes.
//!
//! Decoding is total and pure. Unknown ids yield an empty update set. A
//! payload that ends mid-field yields [`ParamValue::Unparsed`] for the
//! truncated field while every field that fully fits still decodes.
//!
//! Numeric fields use the device's binary-point format: a big-endian integer
//! whose low `frac_bits` bits are fractional, so the physical value is
//! `raw / 2^frac_bits`.
use chrono::{Days, NaiveDate};
use serde::Serialize;
use std::fmt;

/// A decoded parameter value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ParamValue {
    /// Scalar with physical unit (unit may be empty for plain counts).
    Number { value: f64, unit: &'static str },
    /// Bit-field word mapped to the names of the set flags.
    Flags(Vec<&'static str>),
    /// Enumerated word mapped to a single name.
    Enum(&'static str),
    /// Fixed-width text, trimmed.
    Text(String),
    /// Days-since-2000-01-01 date field.
    Date(NaiveDate),
    /// Raw bytes for fields without a known interpretation.
    Raw(Vec<u8>),
    /// Field was declared but could not be parsed (truncated payload or
    /// out-of-range enum value).
    Unparsed,
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Number { value, unit } if unit.is_empty() => write!(f, "{}", value),
            ParamValue::Number { value, unit } => write!(f, "{} {}", value, unit),
            ParamValue::Flags(flags) => write!(f, "[{}]", flags.join(", ")),
            ParamValue::Enum(name) => write!(f, "{}", name),
            ParamValue::Text(s) => write!(f, "{}", s),
            ParamValue::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            ParamValue::Raw(bytes) => {
                for b in bytes {
                    write!(f, "{:02x}", b)?;
                }
                Ok(())
            }
            ParamValue::Unparsed => write!(f, "(unparsed)"),
        }
    }
}

/// How to interpret one field's bytes.
#[derive(Debug, Clone, Copy)]
pub enum FieldKind {
    BinaryPoint {
        frac_bits: u32,
        signed: bool,
        unit: &'static str,
    },
    Unsigned {
        unit: &'static str,
    },
    Flags(&'static [(u16, &'static str)]),
    Enum(&'static [(u16, &'static str)]),
    Text,
    Date,
    Raw,
}

/// One parameter's location and interpretation within a payload.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub offset: usize,
    pub width: usize,
    pub kind: FieldKind,
}

const fn field(name: &'static str, offset: usize, width: usize, kind: FieldKind) -> FieldSpec {
    FieldSpec {
        name,
        offset,
        width,
        kind,
    }
}

const fn bp(frac_bits: u32, signed: bool, unit: &'static str) -> FieldKind {
    FieldKind::BinaryPoint {
        frac_bits,
        signed,
        unit,
    }
}

const fn uint(unit: &'static str) -> FieldKind {
    FieldKind::Unsigned { unit }
}

// Flag and enum tables, bit masks / values as observed on real devices.

static TEST_INTERVAL: &[(u16, &str)] = &[
    (1, "DISABLED"),
    (2, "STARTUP"),
    (4, "EACH 7 DAYS SINCE STARTUP"),
    (8, "EACH 14 DAYS SINCE STARTUP"),
    (16, "EACH 7 DAYS SINCE LAST"),
    (32, "EACH 14 DAYS SINCE LAST"),
];

static SENSITIVITY: &[(u16, &str)] = &[(1, "HIGH"), (2, "MEDIUM"), (4, "LOW")];

static VOLTAGE_CONFIG: &[(u16, &str)] = &[
    (1, "100"),
    (2, "120"),
    (4, "200"),
    (8, "208"),
    (16, "220"),
    (32, "230"),
    (64, "240"),
    (2048, "115"),
];

static LOADSHED_CONFIG: &[(u16, &str)] = &[
    (1, "USE_OFF_DELAY"),
    (2, "MANUAL_RESTART_REQUIRED"),
    (4, "RESERVED_BIT"),
    (8, "TIME_ON_BATTERY"),
    (16, "RUNTIME_REMAINING"),
    (32, "ON_OVERLOAD"),
];

static BATT_LIFETIME_STATUS: &[(u16, &str)] = &[
    (1, "OK"),
    (2, "NEAR EOL"),
    (4, "OVER EOL"),
    (8, "NEAR EOL ACK"),
    (16, "OVER EOL ACK"),
];

static SELFTEST_STATUS: &[(u16, &str)] = &[
    (1, "PENDING"),
    (2, "IN PROGRESS"),
    (4, "PASSED"),
    (8, "FAILED"),
    (16, "REFUSED"),
    (32, "ABORTED"),
    (64, "SOURCE PROTOCOL"),
    (128, "SOURCE UI"),
    (256, "SOURCE INTERNAL"),
    (512, "INVALID STATE"),
    (1024, "INTERNAL FAULT"),
    (2048, "SOC UNACCEPTABLE"),
];

static CALIBRATION_STATUS: &[(u16, &str)] = &[
    (1, "PENDING"),
    (2, "IN PROGRESS"),
    (4, "PASSED"),
    (8, "FAILED"),
    (16, "REFUSED"),
    (32, "ABORTED"),
    (64, "SOURCE PROTOCOL"),
    (128, "SOURCE UI"),
    (256, "SOURCE INTERNAL"),
    (512, "INVALID STATE"),
    (1024, "INTERNAL FAULT"),
    (2048, "SOC UNACCEPTABLE"),
    (4096, "LOAD CHANGED"),
    (8192, "AC INPUT NOT ACCEPTABLE"),
    (16384, "LOAD TOO LOW"),
    (32768, "OVERCHARGE IN PROGRESS"),
];

static UI_STATUS: &[(u16, &str)] = &[
    (1, "CONT. TEST IN PROGRESS"),
    (2, "AUDIBLE ALARM IN PROGRESS"),
    (4, "AUDIBLE ALARM MUTED"),
];

static INPUT_STATUS: &[(u16, &str)] = &[
    (1, "ACCEPTABLE"),
    (2, "PENDING ACCEPTABLE"),
    (4, "LOW VOLTAGE"),
    (8, "HIGH VOLTAGE"),
    (16, "DISTORTED"),
    (32, "BOOST"),
    (64, "TRIM"),
    (128, "LOW FREQUENCY"),
    (256, "HIGH FREQUENCY"),
    (512, "PHASE NOT LOCKED"),
    (1024, "DELTA PHASE OUT OF RANGE"),
    (2048, "NEUTRAL NOT CONNECTED"),
    (4096, "NOT ACCEPTABLE"),
    (8192, "PLUG RATING EXCEEDED"),
];

static POWSYS_ERROR: &[(u16, &str)] = &[
    (1, "OUTPUT OVERLOAD"),
    (2, "OUTPUT SHORT CIRCUIT"),
    (4, "OUTPUT OVERVOLTAGE"),
    (8, "TRANSFORMER DC IMBALANCE"),
    (16, "OVERTEMPERATURE"),
    (32, "BACKFEEDING"),
    (64, "AVR RELAY FAULT"),
    (128, "PFC INPUT RELAY FAULT"),
    (256, "OUTPUT RELAY FAULT"),
    (512, "BYPASS RELAY FAULT"),
    (1024, "FAN FAULT"),
    (2048, "PFC FAULT"),
    (4096, "DC BUS OVERVOLTAGE"),
    (8192, "INVERTER FAULT"),
];

static GENERAL_ERROR: &[(u16, &str)] = &[
    (1, "SITE WIRING FAULT"),
    (2, "EEPROM ERROR"),
    (4, "AD CONVERTER ERROR"),
    (8, "LOGIC PSU FAULT"),
    (16, "INTERNAL COMM FAULT"),
    (32, "UI BUTTON FAULT"),
    (128, "EPO ACTIVE"),
];

static BATTERY_ERROR: &[(u16, &str)] = &[
    (1, "DISCONNECTED"),
    (2, "OVERVOLTAGE"),
    (4, "NEEDS REPLACEMENT"),
    (8, "OVERTEMPERATURE"),
    (16, "CHARGER FAULT"),
    (32, "TEMP SENSOR FAULT"),
    (64, "BATTERY BUS SOFT START FAULT"),
    (128, "HIGH TEMPERATURE"),
    (256, "GENERAL ERROR"),
    (512, "COMM ERROR"),
];

static OUTLET_STATUS: &[(u16, &str)] = &[
    (1, "OUTLET ON"),
    (2, "OUTLET OFF"),
    (4, "REBOOTING"),
    (8, "SHUTTING DOWN"),
    (16, "SLEEPING"),
    (128, "OUTLET OVERLOAD"),
    (256, "PENDING OUTLET ON"),
    (512, "PENDING OUTLET OFF"),
    (1024, "WAIT ON AC"),
    (2048, "WAIT ON MIN RUNTIME"),
    (4096, "LOW RUNTIME"),
];

static UPS_STATUS: &[(u16, &str)] = &[
    (1, "RESERVED BIT"),
    (2, "ONLINE"),
    (4, "ON BATTERY"),
    (8, "BYPASS ON"),
    (16, "OUTPUT OFF"),
    (32, "FAULT"),
    (64, "INPUT BAD"),
    (128, "TESTING"),
    (256, "PENDING OUTPUT ON"),
    (512, "PENDING OUTPUT OFF"),
    (8192, "GREEN MODE"),
    (16384, "INFORMATIONAL ALERT"),
];

// Documented in the APC Modbus register maps.
static STATUS_CHANGE_CAUSE: &[(u16, &str)] = &[
    (0, "SystemInitialization"),
    (1, "HighInputVoltage"),
    (2, "LowInputVoltage"),
    (3, "DistortedInput"),
    (4, "RapidChangeOfInputVoltage"),
    (5, "HighInputFrequency"),
    (6, "LowInputFrequency"),
    (7, "FreqAndOrPhaseDifference"),
    (8, "AcceptableInput"),
    (9, "AutomaticTest"),
    (10, "TestEnded"),
    (11, "LocalUICommand"),
    (12, "ProtocolCommand"),
    (13, "LowBatteryVoltage"),
    (14, "GeneralError"),
    (15, "PowerSystemError"),
    (16, "BatterySystemError"),
    (17, "ErrorCleared"),
    (18, "AutomaticRestart"),
    (19, "DistortedInverterOutput"),
    (20, "InverterOutputAcceptable"),
    (21, "EPOInterface"),
    (22, "InputPhaseDeltaOutOfRange"),
    (23, "InputNeutralNotConnected"),
    (24, "ATSTransfer"),
    (25, "ConfigurationChange"),
    (26, "AlertAsserted"),
    (27, "AlertCleared"),
    (28, "PlugRatingExceeded"),
    (29, "OutletGroupStateChange"),
    (30, "FailureBypassExpired"),
];

/// id -> field list. Linear scan; the table is small and read-only.
static RULES: &[(u8, &[FieldSpec])] = &[
    (
        0x00,
        &[
            field("protocol_version", 0, 1, uint("")),
            field("msg_size", 1, 1, uint("")),
            field("num_ids", 2, 1, uint("")),
            field("series_id", 3, 2, uint("")),
            field("series_data_version", 5, 1, uint("")),
        ],
    ),
    (
        0x40,
        &[
            field("serial_nb", 0, 14, FieldKind::Text),
            field("production_date", 14, 2, FieldKind::Date),
        ],
    ),
    (0x41, &[field("ups_type_1", 0, 16, FieldKind::Text)]),
    (0x42, &[field("ups_type_2", 0, 16, FieldKind::Text)]),
    (0x43, &[field("ups_sku_1", 0, 16, FieldKind::Text)]),
    (0x44, &[field("ups_sku_2", 0, 4, FieldKind::Text)]),
    (
        0x45,
        &[
            field("fw_version_1", 0, 8, FieldKind::Text),
            field("fw_version_2", 8, 8, FieldKind::Text),
        ],
    ),
    (
        0x46,
        &[
            field("fw_version_3", 0, 8, FieldKind::Text),
            field("fw_version_4", 8, 8, FieldKind::Text),
        ],
    ),
    (
        0x47,
        &[
            field("battery_install_date", 0, 2, FieldKind::Date),
            field("battery_lifetime", 2, 2, uint("days")),
            field("battery_near_eol_alarm_notification", 4, 2, uint("days")),
            field("battery_near_eol_alarm_reminder", 6, 2, uint("days")),
        ],
    ),
    (0x48, &[field("battery_sku", 0, 16, FieldKind::Text)]),
    (0x49, &[field("ups_name", 0, 16, FieldKind::Text)]),
    (
        0x4A,
        &[
            field("allowed_operating_mode", 0, 2, uint("")),
            field("power_quality_config", 2, 2, uint("")),
            field(
                "battery_replacetest_interval",
                4,
                2,
                FieldKind::Flags(TEST_INTERVAL),
            ),
            field("battery_replacement_due", 6, 2, FieldKind::Date),
            field("low_runtime_alarm_config", 8, 2, uint("s")),
            field("voltage_accept_max", 10, 2, uint("V")),
            field("voltage_accept_min", 12, 2, uint("V")),
            field("voltage_sensitivity", 15, 1, FieldKind::Enum(SENSITIVITY)),
        ],
    ),
    (
        0x4B,
        &[
            field("apparent_power_rating", 0, 2, uint("VA")),
            field("real_power_rating", 2, 2, uint("W")),
            field("voltage_config", 4, 2, FieldKind::Enum(VOLTAGE_CONFIG)),
        ],
    ),
    (
        0x4C,
        &[
            field("power_on_delay", 0, 2, uint("s")),
            field("power_off_delay", 2, 2, uint("s")),
            field("reboot_delay", 4, 4, uint("s")),
            field("runtime_minimum_return", 8, 2, bp(0, false, "s")),
            field("loadshed_config", 10, 2, FieldKind::Flags(LOADSHED_CONFIG)),
            field("loadshed_runtime_remaining", 12, 2, bp(0, false, "s")),
            field("loadshed_runtime_limit", 14, 2, bp(0, false, "s")),
        ],
    ),
    (0x4D, &[field("outlet_name", 0, 16, FieldKind::Text)]),
    (0x4E, &[field("interface_disable", 4, 2, uint(""))]),
    (0x5C, &[field("communication_method", 8, 2, uint(""))]),
    (
        0x6C,
        &[field(
            "battery_lifetime_status",
            6,
            2,
            FieldKind::Flags(BATT_LIFETIME_STATUS),
        )],
    ),
    (
        0x6D,
        &[
            field("battery_voltage", 0, 2, bp(5, true, "V")),
            field("battery_soc", 2, 2, bp(9, false, "%")),
            field("battery_replacetest_cmd", 4, 2, uint("")),
            field(
                "battery_replacetest_status",
                6,
                2,
                FieldKind::Flags(SELFTEST_STATUS),
            ),
            field(
                "runtime_calibration_status",
                10,
                2,
                FieldKind::Flags(CALIBRATION_STATUS),
            ),
            field("runtime_remaining", 14, 2, bp(0, false, "s")),
        ],
    ),
    (0x6E, &[field("runtime_remaining_2", 0, 4, bp(0, false, "s"))]),
    (
        0x6F,
        &[
            field("temperature", 0, 2, bp(7, true, "degC")),
            field("user_interface_cmd", 2, 2, uint("")),
            field("user_interface_status", 4, 2, FieldKind::Flags(UI_STATUS)),
            field("voltage_out", 6, 2, bp(6, false, "V")),
            field("current_out", 8, 2, bp(5, false, "A")),
            field("frequency_out", 10, 2, bp(7, false, "Hz")),
            field("apparent_power_pctused", 12, 2, bp(8, false, "%")),
            field("real_power_pctused", 14, 2, bp(8, false, "%")),
        ],
    ),
    (
        0x70,
        &[
            field("input_status", 2, 2, FieldKind::Flags(INPUT_STATUS)),
            field("voltage_in", 4, 2, bp(6, false, "V")),
            field("frequency_in", 6, 2, bp(7, false, "Hz")),
            field("green_mode", 8, 2, bp(0, true, "")),
            field("powsys_error", 10, 2, FieldKind::Flags(POWSYS_ERROR)),
            field("general_error", 12, 2, FieldKind::Flags(GENERAL_ERROR)),
            field("battery_error", 14, 2, FieldKind::Flags(BATTERY_ERROR)),
        ],
    ),
    (
        0x71,
        &[
            field("ups_cmd", 0, 2, uint("")),
            field("outlet_cmd", 8, 2, uint("")),
        ],
    ),
    (
        0x72,
        &[field("outlet_status", 0, 2, FieldKind::Flags(OUTLET_STATUS))],
    ),
    (
        0x76,
        &[
            field("ups_status", 8, 2, FieldKind::Flags(UPS_STATUS)),
            field(
                "status_chg_cause",
                10,
                2,
                FieldKind::Enum(STATUS_CHANGE_CAUSE),
            ),
        ],
    ),
    (
        0x79,
        &[
            field("temperature_2", 4, 2, bp(7, true, "degC")),
            field("humidity_pct", 6, 2, bp(9, false, "%")),
            field("temperature_3", 14, 2, bp(7, true, "degC")),
        ],
    ),
    (0x7A, &[field("humidity_pct_2", 0, 2, bp(9, false, "%"))]),
    (
        0x7E,
        &[
            field("password_1", 8, 4, FieldKind::Raw),
            field("password_2", 12, 4, FieldKind::Raw),
        ],
    ),
];

/// Look up the field list for a message id, if one is known.
pub fn rule_for(id: u8) -> Option<&'static [FieldSpec]> {
    RULES
        .iter()
        .find(|(rule_id, _)| *rule_id == id)
        .map(|(_, fields)| *fields)
}

/// All ids the decoder knows about.
pub fn known_ids() -> Vec<u8> {
    RULES.iter().map(|(id, _)| *id).collect()
}

/// Decode a payload into parameter updates. Unknown ids produce an empty
/// set. Duplicate names within one payload are allowed; the store applies
/// them in order so the last one wins.
pub fn decode(id: u8, payload: &[u8]) -> Vec<(&'static str, ParamValue)> {
    let Some(fields) = rule_for(id) else {
        return Vec::new();
    };
    let mut out = Vec::with_capacity(fields.len());
    for f in fields {
        let end = f.offset + f.width;
        if end > payload.len() {
            // Truncated trailing field: report it as unparsed, but only if
            // any of it is present at all.
            if f.offset < payload.len() {
                out.push((f.name, ParamValue::Unparsed));
            }
            continue;
        }
        out.push((f.name, decode_field(&payload[f.offset..end], &f.kind)));
    }
    out
}

fn decode_field(raw: &[u8], kind: &FieldKind) -> ParamValue {
    match *kind {
        FieldKind::BinaryPoint {
            frac_bits,
            signed,
            unit,
        } => ParamValue::Number {
            value: bp_to_f64(raw, frac_bits, signed),
            unit,
        },
        FieldKind::Unsigned { unit } => ParamValue::Number {
            value: be_uint(raw) as f64,
            unit,
        },
        FieldKind::Flags(table) => {
            let word = be_uint(raw) as u16;
            ParamValue::Flags(
                table
                    .iter()
                    .filter(|(mask, _)| word & mask == *mask)
                    .map(|(_, name)| *name)
                    .collect(),
            )
        }
        FieldKind::Enum(table) => {
            let word = be_uint(raw) as u16;
            match table.iter().find(|(value, _)| *value == word) {
                Some((_, name)) => ParamValue::Enum(name),
                None => ParamValue::Unparsed,
            }
        }
        FieldKind::Text => ParamValue::Text(String::from_utf8_lossy(raw).trim().to_string()),
        FieldKind::Date => match NaiveDate::from_ymd_opt(2000, 1, 1)
            .and_then(|epoch| epoch.checked_add_days(Days::new(be_uint(raw))))
        {
            Some(date) => ParamValue::Date(date),
            None => ParamValue::Unparsed,
        },
        FieldKind::Raw => ParamValue::Raw(raw.to_vec()),
    }
}

fn be_uint(raw: &[u8]) -> u64 {
    raw.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b))
}

/// Binary-point to float: big-endian integer divided by `2^frac_bits`,
/// optionally two's-complement signed at the field's wire width.
pub fn bp_to_f64(raw: &[u8], frac_bits: u32, signed: bool) -> f64 {
    let acc = be_uint(raw);
    let bits = (raw.len() * 8) as u32;
    let value = if signed && bits > 0 && bits < 64 && acc & (1 << (bits - 1)) != 0 {
        acc as i64 - (1i64 << bits)
    } else {
        acc as i64
    };
    value as f64 / f64::from(1u32 << frac_bits)
}

/// Float to 16-bit binary-point wire bytes, for outbound writes.
pub fn f64_to_bp(value: f64, frac_bits: u32) -> [u8; 2] {
    ((value * f64::from(1u32 << frac_bits)) as i64 as u16).to_be_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binary_point_conversions() {
        assert_eq!(bp_to_f64(&[0x1E, 0x00], 6, false), 120.0);
        assert_eq!(bp_to_f64(&[0xFF, 0xFF], 0, true), -1.0);
        assert_eq!(bp_to_f64(&[0x00, 0x40], 7, false), 0.5);
        assert_eq!(f64_to_bp(120.0, 6), [0x1E, 0x00]);
    }

    #[test]
    fn sign_extension_matches_width() {
        // 0x80 as a signed 8-bit binary-point value with frac 0 is -128
        assert_eq!(bp_to_f64(&[0x80], 0, true), -128.0);
        assert_eq!(bp_to_f64(&[0x80], 0, false), 128.0);
    }
}
