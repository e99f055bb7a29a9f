//! Cache key derivation from request identity.
//!
//! Keys have the form `[<prefix>:]<METHOD>:<path>[?<query>]`, where `<query>`
//! is the merged query parameters serialized as `name=value` pairs, sorted by
//! name and joined with `&`.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::http::{QueryMap, Request};

/// Builds the cache key for `request`.
///
/// `defaults` are merged under the request's own query parameters, so a value
/// present on the request always wins. Parameters whose effective value is
/// null, or is not a scalar, are left out. An empty prefix is the same as no
/// prefix, and a prefix that already ends in `:` does not get a second one.
///
/// # Examples
///
/// ```
/// use rttp_cache::{Method, Request, cache::build_key};
///
/// let request = Request::new(Method::Get, "/a/b/c").with_query("def", 123);
/// assert_eq!(build_key(&request, Some("MyPrefix:"), None), "MyPrefix:GET:/a/b/c?def=123");
/// ```
pub fn build_key(request: &Request, prefix: Option<&str>, defaults: Option<&QueryMap>) -> String {
    let mut effective: BTreeMap<&str, &Value> = BTreeMap::new();
    if let Some(defaults) = defaults {
        effective.extend(defaults.iter().map(|(name, value)| (name.as_str(), value)));
    }
    effective.extend(request.query().iter().map(|(name, value)| (name.as_str(), value)));

    let query = effective
        .into_iter()
        .filter_map(|(name, value)| render(value).map(|value| format!("{name}={value}")))
        .collect::<Vec<_>>()
        .join("&");

    let mut key = String::new();
    if let Some(prefix) = prefix.filter(|prefix| !prefix.is_empty()) {
        key.push_str(prefix.strip_suffix(':').unwrap_or(prefix));
        key.push(':');
    }
    key.push_str(request.method().as_str());
    key.push(':');
    key.push_str(request.path());
    if !query.is_empty() {
        key.push('?');
        key.push_str(&query);
    }
    key
}

fn render(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Bool(flag) => Some(flag.to_string()),
        Value::Number(number) => Some(number.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}
