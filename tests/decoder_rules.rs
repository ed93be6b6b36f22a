//! Decode-rule behavior: known layouts, unknown ids, truncation, purity.
mod common;

use chrono::NaiveDate;
use microlink::protocol::decode::{decode, known_ids, rule_for, ParamValue};

fn value_of<'a>(
    updates: &'a [(&'static str, ParamValue)],
    name: &str,
) -> Option<&'a ParamValue> {
    updates
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, v)| v)
}

#[test]
fn unknown_id_decodes_to_nothing() {
    assert!(rule_for(0x33).is_none());
    assert!(decode(0x33, &[0xFF; 16]).is_empty());
    // Even with garbage lengths.
    assert!(decode(0x33, &[]).is_empty());
}

#[test]
fn decoding_is_pure() {
    let payload = [0x12u8; 16];
    assert_eq!(decode(0x6F, &payload), decode(0x6F, &payload));
}

#[test]
fn output_metrics_binary_point_scaling() {
    let mut payload = [0u8; 16];
    // voltage_out at offset 6, fractional point at bit 6: 120.0 V -> 0x1E00
    payload[6] = 0x1E;
    payload[7] = 0x00;
    // frequency_out at offset 10, fractional point at bit 7: 50.0 Hz
    let freq = (50.0_f64 * 128.0) as u16;
    payload[10..12].copy_from_slice(&freq.to_be_bytes());

    let updates = decode(0x6F, &payload);
    assert_eq!(
        value_of(&updates, "voltage_out"),
        Some(&ParamValue::Number {
            value: 120.0,
            unit: "V"
        })
    );
    assert_eq!(
        value_of(&updates, "frequency_out"),
        Some(&ParamValue::Number {
            value: 50.0,
            unit: "Hz"
        })
    );
}

#[test]
fn signed_binary_point_temperature() {
    let mut payload = [0u8; 16];
    // temperature at offset 0, fractional point at bit 7, signed.
    // -2.5 degC -> -320 as i16
    payload[0..2].copy_from_slice(&(-320i16).to_be_bytes());
    let updates = decode(0x6F, &payload);
    assert_eq!(
        value_of(&updates, "temperature"),
        Some(&ParamValue::Number {
            value: -2.5,
            unit: "degC"
        })
    );
}

#[test]
fn battery_error_flags() {
    let mut payload = [0u8; 16];
    // battery_error word at offset 14: DISCONNECTED | NEEDS REPLACEMENT
    payload[14..16].copy_from_slice(&(0b0101u16).to_be_bytes());
    let updates = decode(0x70, &payload);
    assert_eq!(
        value_of(&updates, "battery_error"),
        Some(&ParamValue::Flags(vec!["DISCONNECTED", "NEEDS REPLACEMENT"]))
    );
    // All-clear word decodes to an empty flag list, not an absent parameter.
    let updates = decode(0x70, &[0u8; 16]);
    assert_eq!(
        value_of(&updates, "battery_error"),
        Some(&ParamValue::Flags(vec![]))
    );
}

#[test]
fn status_change_cause_enum() {
    let mut payload = [0u8; 16];
    payload[10..12].copy_from_slice(&8u16.to_be_bytes());
    let updates = decode(0x76, &payload);
    assert_eq!(
        value_of(&updates, "status_chg_cause"),
        Some(&ParamValue::Enum("AcceptableInput"))
    );
    // Out-of-range cause is flagged, not dropped or defaulted.
    payload[10..12].copy_from_slice(&999u16.to_be_bytes());
    let updates = decode(0x76, &payload);
    assert_eq!(
        value_of(&updates, "status_chg_cause"),
        Some(&ParamValue::Unparsed)
    );
}

#[test]
fn text_fields_are_trimmed() {
    let mut payload = [b' '; 16];
    payload[..12].copy_from_slice(b"Smart-UPS 15");
    let updates = decode(0x41, &payload);
    assert_eq!(
        value_of(&updates, "ups_type_1"),
        Some(&ParamValue::Text("Smart-UPS 15".to_string()))
    );
}

#[test]
fn date_fields_count_days_since_2000() {
    let mut payload = [0u8; 16];
    let updates = decode(0x40, &payload);
    assert_eq!(
        value_of(&updates, "production_date"),
        Some(&ParamValue::Date(
            NaiveDate::from_ymd_opt(2000, 1, 1).unwrap()
        ))
    );
    payload[14..16].copy_from_slice(&366u16.to_be_bytes());
    let updates = decode(0x40, &payload);
    assert_eq!(
        value_of(&updates, "production_date"),
        Some(&ParamValue::Date(
            NaiveDate::from_ymd_opt(2001, 1, 1).unwrap()
        ))
    );
}

#[test]
fn truncated_payload_decodes_leading_fields() {
    // One byte short of the full 0x6F layout: the last field
    // (real_power_pctused, offset 14 width 2) is truncated.
    let payload = [0u8; 15];
    let updates = decode(0x6F, &payload);
    assert_eq!(
        value_of(&updates, "apparent_power_pctused"),
        Some(&ParamValue::Number {
            value: 0.0,
            unit: "%"
        })
    );
    assert_eq!(
        value_of(&updates, "real_power_pctused"),
        Some(&ParamValue::Unparsed)
    );
    // A field entirely beyond the payload is skipped, not reported.
    let updates = decode(0x6F, &[0u8; 5]);
    assert!(value_of(&updates, "voltage_out").is_none());
    assert_eq!(
        value_of(&updates, "user_interface_status"),
        Some(&ParamValue::Unparsed)
    );
}

#[test]
fn empty_payload_never_panics_for_any_known_id() {
    for id in known_ids() {
        let _ = decode(id, &[]);
        let _ = decode(id, &[0xAB]);
    }
}

#[test]
fn password_bytes_stay_raw() {
    let mut payload = [0u8; 16];
    payload[8..12].copy_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF]);
    let updates = decode(0x7E, &payload);
    assert_eq!(
        value_of(&updates, "password_1"),
        Some(&ParamValue::Raw(vec![0xDE, 0xAD, 0xBE, 0xEF]))
    );
}
