//! Scalar coercion for loosely typed dataset fields.
//!
//! The published documents mix numbers, numeric strings, booleans spelled as
//! words, nulls and absent keys for the same field. Every helper here takes the
//! raw field (if any) plus an explicit default and never fails.

use serde_json::Value;

/// Parse as floating point; `NaN`, infinities, absence or any other shape
/// yield `default`.
pub fn coerce_f64(value: Option<&Value>, default: f64) -> f64 {
    coerce_opt_f64(value).unwrap_or(default)
}

/// Same as [`coerce_f64`] with `None` as the default.
pub fn coerce_opt_f64(value: Option<&Value>) -> Option<f64> {
    let parsed = match value? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    parsed.is_finite().then_some(parsed)
}

/// Integer fields (stack sizes, sink points, slot counts). Fractions truncate.
pub fn coerce_i64(value: Option<&Value>, default: i64) -> i64 {
    match value {
        Some(Value::Number(n)) if n.is_i64() => n.as_i64().unwrap_or(default),
        other => coerce_opt_f64(other).map(|f| f.trunc() as i64).unwrap_or(default),
    }
}

/// Native booleans pass through; `true/yes/1` and `false/no/0` are recognised
/// in strings (case-insensitive) and as the numbers 1 and 0.
pub fn coerce_bool(value: Option<&Value>, default: bool) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" => true,
            "false" | "no" | "0" => false,
            _ => default,
        },
        Some(Value::Number(n)) => match n.as_f64() {
            Some(f) if f == 1.0 => true,
            Some(f) if f == 0.0 => false,
            _ => default,
        },
        _ => default,
    }
}

/// Trimmed non-empty text. Numbers and booleans are rendered; containers and
/// nulls are treated as absent.
pub fn coerce_string(value: Option<&Value>) -> Option<String> {
    let text = match value? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

/// Physical form of an item. Unknown spellings fall back to solid.
pub fn coerce_form(value: Option<&Value>) -> String {
    let raw = coerce_string(value).unwrap_or_default().to_ascii_lowercase();
    let form = match raw.as_str() {
        "liquid" | "rf_liquid" | "fluid" => "liquid",
        "gas" | "rf_gas" => "gas",
        _ => "solid",
    };
    form.to_string()
}

/// Fluid colours arrive either as a CSS-ish string or as an `{r,g,b,a}` object.
/// Objects are rendered as `rgba(r, g, b, a)`; an all-zero colour means "none".
pub fn coerce_color(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Object(map) => {
            let channel = |k: &str| coerce_f64(map.get(k), 0.0);
            let (r, g, b, a) = (channel("r"), channel("g"), channel("b"), channel("a"));
            if r == 0.0 && g == 0.0 && b == 0.0 && a == 0.0 {
                return None;
            }
            Some(format!("rgba({r}, {g}, {b}, {a})"))
        }
        other => coerce_string(Some(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn numbers_from_numbers_and_strings() {
        assert_eq!(coerce_f64(Some(&json!(2.5)), 0.0), 2.5);
        assert_eq!(coerce_f64(Some(&json!(" 30 ")), 0.0), 30.0);
        assert_eq!(coerce_f64(Some(&json!("NaN")), 7.0), 7.0);
        assert_eq!(coerce_f64(Some(&json!("abc")), 1.0), 1.0);
        assert_eq!(coerce_f64(Some(&json!(true)), 3.0), 3.0);
        assert_eq!(coerce_f64(Some(&json!([1])), 3.0), 3.0);
        assert_eq!(coerce_f64(None, 4.0), 4.0);
        assert_eq!(coerce_opt_f64(Some(&Value::Null)), None);
        assert_eq!(coerce_opt_f64(Some(&json!("12.75"))), Some(12.75));
    }

    #[test]
    fn integers_truncate() {
        assert_eq!(coerce_i64(Some(&json!(100)), 0), 100);
        assert_eq!(coerce_i64(Some(&json!("50.9")), 0), 50);
        assert_eq!(coerce_i64(Some(&json!(null)), 9), 9);
    }

    #[test]
    fn booleans_accept_words_and_digits() {
        for raw in [json!(true), json!("TRUE"), json!("yes"), json!("1"), json!(1)] {
            assert!(coerce_bool(Some(&raw), false), "{raw} should be true");
        }
        for raw in [json!(false), json!("False"), json!("NO"), json!("0"), json!(0)] {
            assert!(!coerce_bool(Some(&raw), true), "{raw} should be false");
        }
        assert!(coerce_bool(Some(&json!("perhaps")), true));
        assert!(!coerce_bool(Some(&json!(2)), false));
        assert!(coerce_bool(None, true));
    }

    #[test]
    fn strings_are_trimmed_and_blank_is_absent() {
        assert_eq!(coerce_string(Some(&json!("  Iron Ore "))), Some("Iron Ore".into()));
        assert_eq!(coerce_string(Some(&json!("   "))), None);
        assert_eq!(coerce_string(Some(&json!(5))), Some("5".into()));
        assert_eq!(coerce_string(Some(&json!({"a": 1}))), None);
    }

    #[test]
    fn forms_and_colors() {
        assert_eq!(coerce_form(Some(&json!("RF_LIQUID"))), "liquid");
        assert_eq!(coerce_form(Some(&json!("gas"))), "gas");
        assert_eq!(coerce_form(None), "solid");
        assert_eq!(
            coerce_color(Some(&json!({"r": 122, "g": 0, "b": 255, "a": 255}))),
            Some("rgba(122, 0, 255, 255)".into())
        );
        assert_eq!(coerce_color(Some(&json!({"r": 0, "g": 0, "b": 0, "a": 0}))), None);
        assert_eq!(coerce_color(Some(&json!("#ff8800"))), Some("#ff8800".into()));
    }
}
