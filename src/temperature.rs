use serde_json::Value;

/// Extracts a temperature from a raw payload.
///
/// Accepts `{"temperature": <number>}` or a bare number, where a comma may
/// stand in for the decimal point (`"21,3"`). Anything else yields `None`;
/// not every message on the topic has to carry a reading.
pub fn parse_temperature(payload: &str) -> Option<f64> {
    if let Ok(Value::Object(object)) = serde_json::from_str::<Value>(payload) {
        if let Some(value) = object.get("temperature").and_then(Value::as_f64) {
            return Some(value);
        }
    }

    let normalized = payload.trim().replacen(',', ".", 1);
    normalized
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_temperature_field() {
        assert_eq!(parse_temperature(r#"{"temperature": 21.5}"#), Some(21.5));
        assert_eq!(parse_temperature(r#"{"temperature": -4, "unit": "C"}"#), Some(-4.0));
    }

    #[test]
    fn test_bare_numbers() {
        assert_eq!(parse_temperature("21,3"), Some(21.3));
        assert_eq!(parse_temperature("19.75"), Some(19.75));
        assert_eq!(parse_temperature(" 22\n"), Some(22.0));
    }

    #[test]
    fn test_unusable_payloads() {
        assert_eq!(parse_temperature("not a number"), None);
        assert_eq!(parse_temperature(r#"{"foo": 1}"#), None);
        assert_eq!(parse_temperature(r#"{"temperature": "21.5"}"#), None);
        assert_eq!(parse_temperature(""), None);
        assert_eq!(parse_temperature("NaN"), None);
        assert_eq!(parse_temperature("inf"), None);
    }
}
