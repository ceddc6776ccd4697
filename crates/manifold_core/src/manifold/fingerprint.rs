//! Manifold fingerprints.
//!
//! A fingerprint is a SHA-1 digest over the settings fields that shape the
//! solution manifold. Two settings objects with equal fingerprints score any
//! (angle, stretch) pair identically; the digest doubles as the file name of
//! the cached landscape.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha1::{Digest, Sha1};

use crate::error::Result;
use crate::settings::Settings;

/// Settings fields that change the landscape, in hashing order.
pub const CONTRIBUTING_FIELDS: [&str; 17] = [
    "PitchMinimum",
    "UseSemitones",
    "Gravity",
    "VolumeMinimum",
    "PitchMaximum",
    "SemitoneSpan",
    "TargetValidDiameter",
    "VolumeMaximum",
    "PitchSpan",
    "AngleMinimum",
    "FieldWidth",
    "Target",
    "AngleMaximum",
    "StretchMinimum",
    "StretchMaximum",
    "Obstacle",
    "VolumeSpan",
];

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ManifoldFingerprint(String);

impl ManifoldFingerprint {
    pub fn as_hex(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ManifoldFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Hashes the contributing fields of `settings`.
///
/// Nested objects contribute each of their values in sorted-key order, so the
/// key order of the input never matters. A missing contributing field is an
/// error rather than a silent default.
pub fn fingerprint(settings: &Settings) -> Result<ManifoldFingerprint> {
    let mut hasher = Sha1::new();
    let mut buffer = String::new();
    for key in CONTRIBUTING_FIELDS {
        let element = settings.require(key)?;
        match element {
            Value::Object(map) => {
                let mut subkeys: Vec<&String> = map.keys().collect();
                subkeys.sort();
                for subkey in subkeys {
                    buffer.clear();
                    render_value(&map[subkey.as_str()], &mut buffer);
                    hasher.update(buffer.as_bytes());
                }
            }
            other => {
                buffer.clear();
                render_value(other, &mut buffer);
                hasher.update(buffer.as_bytes());
            }
        }
    }
    let digest = hasher.finalize();
    let hex = digest.iter().map(|byte| format!("{byte:02x}")).collect();
    Ok(ManifoldFingerprint(hex))
}

/// Renders a settings value in the textual form used for hashing.
fn render_value(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("None"),
        Value::Bool(true) => out.push_str("True"),
        Value::Bool(false) => out.push_str("False"),
        Value::Number(n) => {
            if n.is_i64() || n.is_u64() {
                out.push_str(&n.to_string());
            } else if let Some(f) = n.as_f64() {
                out.push_str(&render_float(f));
            }
        }
        Value::String(s) => out.push_str(s),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                render_nested(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                out.push('\'');
                out.push_str(key);
                out.push_str("': ");
                render_nested(&map[key.as_str()], out);
            }
            out.push('}');
        }
    }
}

// Strings inside containers are quoted and floats use their repr form.
fn render_nested(value: &Value, out: &mut String) {
    match value {
        Value::String(s) => {
            out.push('\'');
            out.push_str(s);
            out.push('\'');
        }
        Value::Number(n) if n.is_f64() => {
            if let Some(f) = n.as_f64() {
                out.push_str(&render_float_repr(f));
            }
        }
        other => render_value(other, out),
    }
}

fn render_non_finite(value: f64) -> String {
    if value.is_nan() {
        "nan".to_string()
    } else if value > 0.0 {
        "inf".to_string()
    } else {
        "-inf".to_string()
    }
}

fn exponent_form(mantissa: &str, exponent: i32) -> String {
    let sign = if exponent < 0 { '-' } else { '+' };
    format!("{mantissa}e{sign}{:02}", exponent.unsigned_abs())
}

/// Twelve significant digits with trailing zeros dropped. Integral values keep
/// a trailing `.0`; decimal exponents below -4 or from 11 up use exponent form.
fn render_float(value: f64) -> String {
    if !value.is_finite() {
        return render_non_finite(value);
    }
    let scientific = format!("{value:.11e}");
    let Some((mantissa, exponent)) = scientific.split_once('e') else {
        return scientific;
    };
    let Ok(exponent) = exponent.parse::<i32>() else {
        return scientific;
    };
    if exponent < -4 || exponent >= 11 {
        let mantissa = mantissa.trim_end_matches('0').trim_end_matches('.');
        return exponent_form(mantissa, exponent);
    }
    let fixed = format!("{value:.*}", (11 - exponent) as usize);
    let digits = fixed.trim_end_matches('0').trim_end_matches('.');
    if digits.contains('.') {
        digits.to_string()
    } else {
        format!("{digits}.0")
    }
}

/// Shortest round-trip form, used for floats inside lists and objects.
/// Integral values keep a trailing `.0`; magnitudes outside `[1e-4, 1e16)` use
/// exponent form.
fn render_float_repr(value: f64) -> String {
    if !value.is_finite() {
        return render_non_finite(value);
    }
    let magnitude = value.abs();
    if magnitude != 0.0 && !(1e-4..1e16).contains(&magnitude) {
        let text = format!("{value:e}");
        return match text.split_once('e') {
            Some((mantissa, exponent)) => match exponent.parse::<i32>() {
                Ok(exponent) => exponent_form(mantissa, exponent),
                Err(_) => text,
            },
            None => text,
        };
    }
    if value.fract() == 0.0 {
        format!("{value:.1}")
    } else {
        format!("{value}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::settings::fixtures::sample_settings;
    use serde_json::json;

    #[test]
    fn identical_settings_share_a_fingerprint() {
        let a = fingerprint(&sample_settings()).expect("fingerprint");
        let b = fingerprint(&sample_settings()).expect("fingerprint");
        assert_eq!(a, b);
        assert_eq!(a.as_hex().len(), 40);
    }

    #[test]
    fn matches_reference_digest() {
        // Digest of the sample settings computed independently of this crate.
        let token = fingerprint(&sample_settings()).expect("fingerprint");
        assert_eq!(token.as_hex(), REFERENCE_DIGEST);
    }

    #[test]
    fn nested_key_order_does_not_matter() {
        let mut reordered = sample_settings();
        reordered.insert(
            "Obstacle",
            json!({ "Width": 20.0, "Height": 120.0, "y": 0.0, "x": 300.0 }),
        );
        reordered.insert("Target", json!({ "x": 600.0, "y": 25.0 }));
        assert_eq!(
            fingerprint(&sample_settings()).expect("fingerprint"),
            fingerprint(&reordered).expect("fingerprint")
        );
    }

    #[test]
    fn contributing_fields_change_the_fingerprint() {
        let base = fingerprint(&sample_settings()).expect("fingerprint");
        for key in CONTRIBUTING_FIELDS {
            let mut changed = sample_settings();
            let replacement = match changed.get(key) {
                Some(Value::Bool(b)) => json!(!b),
                Some(Value::Object(_)) => json!({ "x": -1.0 }),
                _ => json!(12345.5),
            };
            changed.insert(key, replacement);
            assert_ne!(
                base,
                fingerprint(&changed).expect("fingerprint"),
                "changing {key} should change the fingerprint"
            );
        }
    }

    #[test]
    fn non_contributing_fields_are_ignored() {
        let base = fingerprint(&sample_settings()).expect("fingerprint");
        let mut changed = sample_settings();
        changed.insert("SubjectName", json!("S99"));
        changed.insert("TrialCount", json!(7));
        changed.insert("Notes", json!("second session"));
        assert_eq!(base, fingerprint(&changed).expect("fingerprint"));
    }

    #[test]
    fn missing_field_fails_instead_of_defaulting() {
        let mut fields = sample_settings().fields().clone();
        fields.remove("Gravity");
        let settings = Settings::new(fields);
        assert!(matches!(
            fingerprint(&settings),
            Err(Error::MissingSetting(key)) if key == "Gravity"
        ));
    }

    #[test]
    fn float_rendering() {
        assert_eq!(render_float(9.81), "9.81");
        assert_eq!(render_float(100.0), "100.0");
        assert_eq!(render_float(-0.5), "-0.5");
        assert_eq!(render_float(1e-5), "1e-05");
        assert_eq!(render_float(2.5e20), "2.5e+20");
        assert_eq!(render_float(-0.0), "-0.0");
    }

    #[test]
    fn top_level_floats_keep_twelve_significant_digits() {
        assert_eq!(render_float(0.1 + 0.2), "0.3");
        assert_eq!(render_float(1.0 / 3.0), "0.333333333333");
        assert_eq!(render_float(1.05), "1.05");
        assert_eq!(render_float(0.00012345678901234), "0.000123456789012");
        assert_eq!(render_float(999_999.999_999_9), "1000000.0");
        assert_eq!(render_float(99_999_999_999.0), "99999999999.0");
        assert_eq!(render_float(1e11), "1e+11");
        assert_eq!(render_float(123_456_789_012_345.0), "1.23456789012e+14");
        assert_eq!(render_float(5e-324), "4.94065645841e-324");
    }

    #[test]
    fn nested_floats_use_shortest_form() {
        let mut out = String::new();
        render_value(&json!([0.1 + 0.2, 1e16, 1e15, 2.0]), &mut out);
        assert_eq!(out, "[0.30000000000000004, 1e+16, 1000000000000000.0, 2.0]");
    }

    #[test]
    fn value_rendering() {
        let mut out = String::new();
        render_value(&json!([1, "a", true, null]), &mut out);
        assert_eq!(out, "[1, 'a', True, None]");
    }

    const REFERENCE_DIGEST: &str = "4241cd727d9e7807450eef809b05915b6e209929";
}
