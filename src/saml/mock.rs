//! Mock identity provider artifacts.
//!
//! The mock IdP skips the upstream exchange entirely: the "artifact" it
//! hands back already carries the test subject, base64-wrapped behind a
//! recognizable prefix so a mock artifact can never be mistaken for (or
//! forged as) a real one by a provider on a real binding.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};

const MOCK_PREFIX: &str = "mock-";

/// Wrap a test subject into a mock artifact.
pub fn encode_mock_artifact(subject: &str) -> String {
    format!("{}{}", MOCK_PREFIX, URL_SAFE_NO_PAD.encode(subject))
}

/// Unwrap a mock artifact back into the planted subject. Returns `None`
/// for anything that is not a well-formed mock artifact.
pub fn decode_mock_artifact(artifact: &str) -> Option<String> {
    let encoded = artifact.strip_prefix(MOCK_PREFIX)?;
    let bytes = URL_SAFE_NO_PAD.decode(encoded).ok()?;
    String::from_utf8(bytes).ok()
}
