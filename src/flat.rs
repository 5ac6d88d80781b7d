//! Flat `key=value` wire format spoken by the HTTP adapters.

use std::borrow::Cow;
use std::collections::BTreeMap;

use crate::{Error, Result};

/// Canonical field name → raw wire value.
pub type FieldMap = BTreeMap<String, String>;

fn is_word(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Byte length of the key when `s` starts with `\w+=`.
fn key_at(s: &str) -> Option<usize> {
    let end = s
        .char_indices()
        .find(|&(_, c)| !is_word(c))
        .map_or(s.len(), |(i, _)| i);
    (end > 0 && s[end..].starts_with('=')).then_some(end)
}

/// Matches one `key=value` pair at the start of `s`. A comma ends the value
/// only when another `key=` follows it; a bare `=` inside the value rejects
/// the pair. Returns the key, the value and the bytes consumed.
fn match_pair(s: &str) -> Option<(&str, &str, usize)> {
    let key_len = key_at(s)?;
    let value_start = key_len + 1;
    let tail = &s[value_start..];
    for (i, c) in tail.char_indices() {
        match c {
            '=' => return None,
            ',' if key_at(&tail[i + 1..]).is_some() => {
                return Some((&s[..key_len], &tail[..i], value_start + i + 1));
            }
            _ => {}
        }
    }
    Some((&s[..key_len], tail, s.len()))
}

/// Drops one trailing `\n` or `\r\n`, the way `$` matches before a final
/// newline.
fn strip_line_end(body: &str) -> &str {
    body.strip_suffix('\n')
        .map_or(body, |b| b.strip_suffix('\r').unwrap_or(b))
}

/// Splits a flat body into its pairs, scanning forward like a regex
/// `finditer` over `(\w+)=([^=]*?)(?:,(?=\w+=)|$)`.
pub fn split_pairs(body: &str) -> Vec<(&str, &str)> {
    let body = strip_line_end(body);
    let mut pairs = Vec::new();
    let mut pos = 0;
    while pos < body.len() {
        let rest = &body[pos..];
        match match_pair(rest) {
            Some((key, value, consumed)) => {
                pairs.push((key, value));
                pos += consumed;
            }
            None => pos += rest.chars().next().map_or(1, char::len_utf8),
        }
    }
    pairs
}

pub fn percent_decode(value: &str) -> String {
    urlencoding::decode(value)
        .map(Cow::into_owned)
        .unwrap_or_else(|_| value.to_string())
}

/// Decodes a `ret=OK,...` body. A body whose `ret` is anything but `OK` is the
/// device's "no data" answer and yields an empty map.
pub fn decode(body: &str) -> Result<FieldMap> {
    let mut fields: FieldMap = split_pairs(body)
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    let ret = fields
        .remove("ret")
        .ok_or_else(|| Error::Protocol("missing 'ret' field in response".to_string()))?;
    if ret != "OK" {
        return Ok(FieldMap::new());
    }
    if let Some(name) = fields.get_mut("name") {
        *name = percent_decode(name);
    }
    Ok(fields)
}

/// Decodes the `&`-separated variant used by SkyFi controllers.
pub fn decode_query(body: &str) -> Result<FieldMap> {
    body.trim()
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            pair.split_once('=')
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .ok_or_else(|| Error::Protocol(format!("malformed pair {pair:?}")))
        })
        .collect()
}

/// Builds a query string, keeping the caller's parameter order.
pub fn encode<K: AsRef<str>, V: AsRef<str>>(params: &[(K, V)]) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", k.as_ref(), urlencoding::encode(v.as_ref())))
        .collect::<Vec<_>>()
        .join("&")
}

/// `409F38D107AC` → `40:9F:38:D1:07:AC`.
pub fn format_mac(raw: &str) -> String {
    raw.as_bytes()
        .chunks(2)
        .map(|pair| String::from_utf8_lossy(pair).into_owned())
        .collect::<Vec<_>>()
        .join(":")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_basic_info() {
        let fields =
            decode("ret=OK,type=aircon,reg=eu,dst=1,ver=1_14_68,rev=C3FF8A6,pow=1").unwrap();
        assert_eq!(fields.len(), 6);
        assert_eq!(fields["ver"], "1_14_68");
        assert_eq!(fields["pow"], "1");
        assert!(!fields.contains_key("ret"));
    }

    #[test]
    fn decode_keeps_commas_inside_values() {
        let body = "ret=OK,ssid1=Loading 2,4G...,radio1=-33,ssid=DaikinAP47108,grp_name=,en_grp=0";
        let fields = decode(body).unwrap();
        assert_eq!(fields["ssid1"], "Loading 2,4G...");
        assert_eq!(fields["radio1"], "-33");
        assert_eq!(fields["grp_name"], "");
        assert_eq!(fields["en_grp"], "0");
    }

    #[test]
    fn stray_equals_sign_resyncs_on_next_key() {
        let body = "ret=OK,ssid1=Loadi=ng 2,4G...,radio1=-33,en_grp=0";
        let fields = decode(body).unwrap();
        assert!(!fields.contains_key("ssid1"));
        assert_eq!(fields["Loadi"], "ng 2,4G...");
        assert_eq!(fields["radio1"], "-33");
    }

    #[test]
    fn trailing_newline_is_not_part_of_the_value() {
        let fields = decode("ret=OK,pow=1\n").unwrap();
        assert_eq!(fields["pow"], "1");
        let fields = decode("ret=OK,htemp=22.0,otemp=-\r\n").unwrap();
        assert_eq!(fields["otemp"], "-");
        assert_eq!(split_pairs("ret=OK\n"), vec![("ret", "OK")]);
        assert_eq!(split_pairs("ret=OK,name=a\nb"), vec![("ret", "OK"), ("name", "a\nb")]);
    }

    #[test]
    fn decode_is_idempotent() {
        let body = "ret=OK,ssid1=Wifi,WithComma,pow=1,mode=3,stemp=24.0";
        let first = decode(body).unwrap();
        assert_eq!(decode(body).unwrap(), first);
        assert_eq!(first["ssid1"], "Wifi,WithComma");

        // Re-serialising the decoded map reproduces the same fields.
        let again: Vec<String> = first.iter().map(|(k, v)| format!("{k}={v}")).collect();
        assert_eq!(decode(&format!("ret=OK,{}", again.join(","))).unwrap(), first);
    }

    #[test]
    fn shared_vocabulary_round_trips() {
        let params = [
            ("mode", "3"),
            ("pow", "1"),
            ("stemp", "24.0"),
            ("shum", "0"),
            ("f_rate", "A"),
            ("f_dir", "3"),
        ];
        let expected: FieldMap = params.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();

        let flat_body: Vec<String> = params.iter().map(|(k, v)| format!("{k}={v}")).collect();
        assert_eq!(decode(&format!("ret=OK,{}", flat_body.join(","))).unwrap(), expected);
        assert_eq!(decode_query(&encode(&params)).unwrap(), expected);
    }

    #[test]
    fn non_ok_ret_is_empty() {
        assert!(decode("ret=KO,type=aircon,reg=eu").unwrap().is_empty());
        assert!(decode("ret=PARAM NG").unwrap().is_empty());
    }

    #[test]
    fn missing_ret_is_protocol_error() {
        let err = decode("type=aircon,pow=1").unwrap_err();
        assert!(matches!(err, Error::Protocol(_)), "got {err:?}");
        assert!(matches!(decode("").unwrap_err(), Error::Protocol(_)));
    }

    #[test]
    fn name_is_percent_decoded() {
        let fields = decode("ret=OK,name=%4e%6f%74%74%65,icon=3").unwrap();
        assert_eq!(fields["name"], "Notte");
    }

    #[test]
    fn decode_query_pairs() {
        let fields = decode_query("opmode=0&units=.&settemp=24.0&zone1=Zone%201").unwrap();
        assert_eq!(fields["settemp"], "24.0");
        assert_eq!(fields["zone1"], "Zone%201");
        assert!(matches!(decode_query("a=1&oops"), Err(Error::Protocol(_))));
    }

    #[test]
    fn encode_keeps_order_and_escapes() {
        let query = encode(&[("pass", "p w"), ("t", "24.0"), ("lpw", "")]);
        assert_eq!(query, "pass=p%20w&t=24.0&lpw=");
    }

    #[test]
    fn mac_formatting() {
        assert_eq!(format_mac("409F38D107AC"), "40:9F:38:D1:07:AC");
    }
}
