//! Collapsible "Thinking..." rewrite for reasoning models
//!
//! Reasoning models stream their chain of thought between `<think>` tags. When
//! enabled, the fragment that opens the thought is replaced by an open HTML
//! `<details>` block and the fragment that closes it by `</details>`, so a
//! markdown/HTML renderer can fold the reasoning away.

use std::borrow::Cow;

/// Replaces the fragment that opens the thought
pub const THINKING_OPEN: &str = "<details style=\"color:gray;background-color: #f8f8f8;padding: 8px;border-radius: 4px;\" open> <summary> Thinking... </summary>";

/// Replaces the fragment that closes the thought
pub const THINKING_CLOSE: &str = "</details>";

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
enum ThinkState {
    #[default]
    Waiting,
    Open,
    Closed,
}

/// Per-stream rewrite state
#[derive(Debug, Default, Clone)]
pub struct ThinkingRewriter {
    state: ThinkState,
}

impl ThinkingRewriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rewrite one answer fragment
    pub fn rewrite<'a>(&mut self, answer: &'a str) -> Cow<'a, str> {
        match self.state {
            ThinkState::Waiting if answer.to_lowercase().contains("think") => {
                self.state = ThinkState::Open;
                Cow::Borrowed(THINKING_OPEN)
            }
            ThinkState::Open if answer.to_lowercase().contains("</think>") => {
                self.state = ThinkState::Closed;
                Cow::Borrowed(THINKING_CLOSE)
            }
            _ => Cow::Borrowed(answer),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_and_close_once() {
        let mut rewriter = ThinkingRewriter::new();

        assert_eq!(rewriter.rewrite("<think>"), THINKING_OPEN);
        assert_eq!(rewriter.rewrite("weighing options"), "weighing options");
        assert_eq!(rewriter.rewrite("</THINK>"), THINKING_CLOSE);
        assert_eq!(rewriter.rewrite("Answer: 42"), "Answer: 42");
        // Later tags pass through untouched
        assert_eq!(rewriter.rewrite("<think>"), "<think>");
        assert_eq!(rewriter.rewrite("</think>"), "</think>");
    }

    #[test]
    fn test_close_tag_before_open_is_untouched() {
        let mut rewriter = ThinkingRewriter::new();
        assert_eq!(rewriter.rewrite("plain text"), "plain text");
        // A close tag also contains "think", so it opens the block first
        assert_eq!(rewriter.rewrite("</think>"), THINKING_OPEN);
        assert_eq!(rewriter.rewrite("</think>"), THINKING_CLOSE);
    }
}
