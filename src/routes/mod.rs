pub mod auth;
pub mod export;
pub mod notes;
pub mod tags;

/// Percent-encodes a tag name for use as a single path segment or query value.
pub fn encode_component(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}
