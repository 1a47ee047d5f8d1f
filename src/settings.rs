//! Default application settings and recursive defaulting.
//!
//! Settings are a free-form JSON mapping validated against
//! [`crate::validation::schemas::SETTINGS`] at assembly time. User-supplied
//! settings are merged over the generated defaults; the user always wins,
//! missing keys are filled in recursively.

use serde_json::{json, Value};

/// Generate the default settings mapping: a fresh short instance id, version
/// `"1"`, the crate's own server banner and one `default` worker pool sized
/// to the machine.
#[must_use]
pub fn default_settings() -> Value {
    let threads = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    json!({
        "name": "trellis",
        "id": short_id(),
        "version": "1",
        "deprecated_versions": [],
        "server": format!("trellis/{}", env!("CARGO_PKG_VERSION")),
        "threads": {"default": threads}
    })
}

/// Recursively fill missing keys in `settings` from `defaults`.
///
/// Existing values always win; nested objects are merged key by key.
pub fn merge_defaults(defaults: &Value, settings: &mut Value) {
    let (Value::Object(defaults), Value::Object(settings)) = (defaults, settings) else {
        return;
    };
    for (key, default_value) in defaults {
        match settings.get_mut(key) {
            None => {
                settings.insert(key.clone(), default_value.clone());
            }
            Some(existing) if existing.is_object() && default_value.is_object() => {
                merge_defaults(default_value, existing);
            }
            Some(_) => {}
        }
    }
}

/// Short random instance id (the low, random half of a ULID).
fn short_id() -> String {
    let ulid = ulid::Ulid::new().to_string();
    ulid[ulid.len() - 8..].to_ascii_lowercase()
}
