//! Conversation history for one call session.

use vocalink_types::{Role, Turn};

/// Context length beyond which [`ConversationContext::should_reset`]
/// reports true. At exactly the threshold it still reports false.
pub const RESET_THRESHOLD: usize = 10;

/// Ordered role-tagged history, owned exclusively by the completion stage
/// of one session.
///
/// Invariant: the history always begins with exactly the original system
/// instruction and the original assistant greeting; [`reset`] truncates
/// back to those two entries and nothing else ever removes them.
///
/// [`reset`]: ConversationContext::reset
#[derive(Debug, Clone)]
pub struct ConversationContext {
    turns: Vec<Turn>,
    reset_threshold: usize,
}

impl ConversationContext {
    pub fn new(system_instruction: impl Into<String>, greeting: impl Into<String>) -> Self {
        Self {
            turns: vec![
                Turn::system(system_instruction),
                Turn::assistant(greeting),
            ],
            reset_threshold: RESET_THRESHOLD,
        }
    }

    pub fn with_reset_threshold(mut self, threshold: usize) -> Self {
        self.reset_threshold = threshold;
        self
    }

    /// Appends one completed turn.
    pub fn push(&mut self, role: Role, content: impl Into<String>) {
        self.turns.push(Turn::new(role, content));
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// True when the history has grown past the reset threshold. The caller
    /// decides whether and when to act on it.
    pub fn should_reset(&self) -> bool {
        self.turns.len() > self.reset_threshold
    }

    /// Truncates back to the system instruction and greeting.
    pub fn reset(&mut self) {
        self.turns.truncate(2);
    }
}
