//! Greedy context assembly under a similarity threshold and a byte budget.

use crate::similarity::RankedFragment;

/// Default minimum similarity for a fragment to be used as context.
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.75;
/// Default upper bound for the assembled context, in UTF-8 bytes.
pub const DEFAULT_MAX_CONTEXT_BYTES: usize = 8192;

const SEPARATOR: &str = "\n\n";

/// Concatenates the best fragments into one context string.
///
/// `ranked` must be sorted by descending score. Fragments scoring below
/// `threshold` are skipped; the first fragment that would push the context past
/// `max_bytes` ends the assembly. Fragments are separated by a blank line and
/// the separators count against the budget. An empty string means nothing
/// relevant was found.
pub fn assemble(ranked: &[RankedFragment<'_>], threshold: f32, max_bytes: usize) -> String {
    let mut context = String::new();
    for fragment in ranked.iter().filter(|fragment| fragment.score >= threshold) {
        let separator = if context.is_empty() { "" } else { SEPARATOR };
        let cost = separator.len() + fragment.text.len();
        if context.len() + cost > max_bytes {
            break;
        }
        context.push_str(separator);
        context.push_str(fragment.text);
    }
    context
}
