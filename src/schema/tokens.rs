//! Token accounting for formatted table descriptions

use once_cell::sync::Lazy;
use tiktoken_rs::CoreBPE;

/// cl100k_base, the encoding of gpt-3.5-turbo. Every count in the crate
/// goes through this one encoder so that budgets stay comparable.
static ENCODER: Lazy<CoreBPE> = Lazy::new(|| {
    tiktoken_rs::cl100k_base().expect("embedded cl100k_base ranks must load")
});

/// Count the tokens of a text
pub fn count_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    ENCODER.encode_ordinary(text).len()
}
