//! Prompt template substitution.
//!
//! Templates contain `{name}` placeholders. Bound placeholders are replaced
//! by their value; unbound ones are left untouched. Substitution is a
//! single pass, so a bound value that itself contains `{...}` text is
//! never expanded again.

use std::collections::HashMap;

/// Reserved placeholder bound to the previous step's final output.
pub const PREV_OUTPUT_VAR: &str = "prev_output";

/// Prompt used when a step's template resolves to nothing.
pub const FALLBACK_PROMPT: &str =
    "Generate this framework document using the provided context documents.";

/// Replace every `{name}` whose `name` has a binding.
///
/// Never fails: placeholders without a binding, stray braces and
/// unterminated `{` are copied verbatim.
pub fn resolve(template: &str, bindings: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];

        match after.find(['{', '}']) {
            Some(close) if after.as_bytes()[close] == b'}' => {
                let name = &after[..close];
                match bindings.get(name) {
                    Some(value) => out.push_str(value),
                    None => {
                        out.push('{');
                        out.push_str(name);
                        out.push('}');
                    }
                }
                rest = &after[close + 1..];
            }
            // Nested or unterminated brace: emit it literally and rescan.
            _ => {
                out.push('{');
                rest = after;
            }
        }
    }

    out.push_str(rest);
    out
}

/// Build the prompt for one step.
///
/// `variables` are the pipeline/run bindings; `prior_output` is always
/// bound to [`PREV_OUTPUT_VAR`] and wins over a user variable of the same
/// name. A blank template, or one that resolves to blank text, yields
/// [`FALLBACK_PROMPT`] so the generation call never receives empty content.
pub fn resolve_step_prompt(
    template: &str,
    variables: &HashMap<String, String>,
    prior_output: &str,
) -> String {
    if template.trim().is_empty() {
        return FALLBACK_PROMPT.to_string();
    }

    let mut bindings = variables.clone();
    bindings.insert(PREV_OUTPUT_VAR.to_string(), prior_output.to_string());

    let resolved = resolve(template, &bindings);
    if resolved.trim().is_empty() {
        FALLBACK_PROMPT.to_string()
    } else {
        resolved
    }
}
