//! Instruction prompt formatting.
//!
//! Mamba Codestral follows the Mistral instruct convention: the raw user
//! text is wrapped in a fixed delimiter pair and the model signals the end
//! of its turn with [`EOS`](crate::engine::llama::EOS).

use crate::engine::llama::EOS;

const PREFIX: &str = "<s>[INST] ";
const SUFFIX: &str = " [/INST]";

/// Wrap raw user text in the instruction delimiters.
pub fn format_instruction(input: &str) -> String {
    format!("{PREFIX}{input}{SUFFIX}")
}

/// Stop sequences for one chat turn.
pub fn stop_sequences() -> Vec<String> {
    vec![EOS.to_string()]
}
