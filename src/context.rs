//! Final context assembly for the generation step.
//!
//! The generation component (external to this crate) receives one string
//! of passages, most relevant first, separated so the model can tell
//! passage boundaries apart. An empty result set yields `None` — the
//! explicit "no relevant context" signal — so the answer step can state
//! truthfully that nothing was found instead of fabricating content.

use askdoc_core::models::RankedResult;

/// Separator between passages in the assembled context.
pub const PASSAGE_SEPARATOR: &str = "\n\n---\n\n";

/// Concatenate the final passages into a prompt-ready context string.
///
/// Returns `None` when there are no passages.
pub fn assemble(results: &[RankedResult]) -> Option<String> {
    if results.is_empty() {
        return None;
    }
    Some(
        results
            .iter()
            .map(|r| r.text.as_str())
            .collect::<Vec<_>>()
            .join(PASSAGE_SEPARATOR),
    )
}
