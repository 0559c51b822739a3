//! Deterministic fake credentials for tests.
//!
//! Generated at runtime so no key-shaped literal sits in the source tree.

const ALNUM: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
const BASE64_URL: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789_-";

fn make_from(alphabet: &[u8], len: usize, seed: usize) -> String {
    let mut output = String::with_capacity(len);
    let mut idx = seed % alphabet.len();

    for _ in 0..len {
        output.push(alphabet[idx] as char);
        idx = (idx + 7) % alphabet.len();
    }

    output
}

/// Check whether tests against real provider endpoints should run.
///
/// `COMPFORGE_REAL_LLM_TESTS=1` enables them; they are off by default.
#[must_use]
pub fn llm_tests_enabled() -> bool {
    std::env::var("COMPFORGE_REAL_LLM_TESTS")
        .ok()
        .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

pub fn gemini_api_key() -> String {
    format!("AIza{}", make_from(BASE64_URL, 35, 3))
}

pub fn anthropic_api_key() -> String {
    format!("sk-ant-api03-{}", make_from(BASE64_URL, 95, 47))
}

pub fn openai_project_key() -> String {
    format!("sk-proj-{}", make_from(BASE64_URL, 48, 48))
}

/// A key too short to match any generic key pattern; only exact-value
/// scrubbing can remove it.
pub fn short_opaque_key() -> String {
    format!("k{}", make_from(ALNUM, 11, 21))
}
