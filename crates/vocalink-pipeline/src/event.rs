use crate::error::ProviderError;

/// Session-scoped error events surfaced by the stages.
///
/// Stage-local faults stay inside their stage; these are the failures that
/// cross the stage boundary to the session controller.
#[derive(Debug)]
pub enum SessionEvent {
    /// The completion round trip for one interaction gave up (retry budget
    /// exhausted or a permanent fault). The caller has already been served
    /// the fallback response.
    CompletionFailed {
        interaction_id: u64,
        error: ProviderError,
    },
    /// Synthesis of one segment failed; other segments are unaffected.
    SynthesisFailed { index: u64, error: ProviderError },
}
