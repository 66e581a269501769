//! System-settings redaction pass (component C9).
//!
//! Any object field whose lowercased key contains one of a fixed set of
//! sensitive substrings is replaced with the literal string `[REDACTED]`,
//! recursively into nested maps and arrays.

const SENSITIVE_SUBSTRINGS: &[&str] =
    &["password", "api_key", "secret", "access_key", "secret_key", "token", "key", "credential", "credentials"];

const REDACTED_PLACEHOLDER: &str = "[REDACTED]";

/// Redact `value` in place.
pub fn redact_value(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::Object(map) => {
            for (key, entry) in map.iter_mut() {
                if is_sensitive_key(key) {
                    *entry = serde_json::Value::String(REDACTED_PLACEHOLDER.to_owned());
                } else {
                    redact_value(entry);
                }
            }
        }
        serde_json::Value::Array(items) => {
            for item in items.iter_mut() {
                redact_value(item);
            }
        }
        _ => {}
    }
}

fn is_sensitive_key(key: &str) -> bool {
    let lower = key.to_ascii_lowercase();
    SENSITIVE_SUBSTRINGS.iter().any(|needle| lower.contains(needle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn redacts_top_level_sensitive_field() {
        let mut value = json!({"smtp_password": "hunter2", "smtp_host": "mail.example.com"});
        redact_value(&mut value);
        assert_eq!(value["smtp_password"], "[REDACTED]");
        assert_eq!(value["smtp_host"], "mail.example.com");
    }

    #[test]
    fn redacts_recursively_into_nested_maps() {
        let mut value = json!({"oidc_settings": {"client_secret": "shh", "issuer": "https://idp"}});
        redact_value(&mut value);
        assert_eq!(value["oidc_settings"]["client_secret"], "[REDACTED]");
        assert_eq!(value["oidc_settings"]["issuer"], "https://idp");
    }

    #[test]
    fn redacts_within_arrays() {
        let mut value = json!({"storage_backends": [{"access_key": "AKIA123"}, {"access_key": "AKIA456"}]});
        redact_value(&mut value);
        assert_eq!(value["storage_backends"][0]["access_key"], "[REDACTED]");
        assert_eq!(value["storage_backends"][1]["access_key"], "[REDACTED]");
    }

    #[test]
    fn substring_match_is_case_insensitive() {
        let mut value = json!({"Security_API_Key": "abc"});
        redact_value(&mut value);
        assert_eq!(value["Security_API_Key"], "[REDACTED]");
    }

    #[test]
    fn unrelated_keys_are_untouched() {
        let mut value = json!({"storage_region": "us-east-1"});
        redact_value(&mut value);
        assert_eq!(value["storage_region"], "us-east-1");
    }
}
