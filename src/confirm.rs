//! Interactive confirmation, injected so tests can script answers.
//!
//! Every manual decision point (uninstall, service restart, toolkit extras)
//! goes through [`Confirm`]. On non-interactive input the answer is always
//! the safe one: no.

use std::io::{self, IsTerminal};

use crate::error::HostError;

pub trait Confirm {
    fn confirm(&self, prompt: &str) -> Result<bool, HostError>;
}

/// Prompts on the controlling terminal via dialoguer.
pub struct TerminalConfirm {
    /// `--yes` / config `assume_yes`: answer yes without prompting.
    pub assume_yes: bool,
}

impl Confirm for TerminalConfirm {
    fn confirm(&self, prompt: &str) -> Result<bool, HostError> {
        if self.assume_yes {
            log::debug!("auto-confirmed: {prompt}");
            return Ok(true);
        }
        if !io::stdin().is_terminal() {
            log::warn!("no terminal for prompt, assuming no: {prompt}");
            return Ok(false);
        }

        dialoguer::Confirm::new()
            .with_prompt(prompt)
            .default(false)
            .interact()
            .map_err(|e| HostError::Io(io::Error::other(e)))
    }
}

#[cfg(test)]
pub mod scripted {
    //! Deterministic answers for tests.

    use super::Confirm;
    use crate::error::HostError;
    use std::cell::RefCell;
    use std::collections::VecDeque;

    /// Answers every prompt the same way.
    pub struct StaticConfirm {
        pub answer: bool,
        pub prompts: RefCell<Vec<String>>,
    }

    impl StaticConfirm {
        pub fn yes() -> Self {
            Self {
                answer: true,
                prompts: RefCell::new(Vec::new()),
            }
        }

        pub fn no() -> Self {
            Self {
                answer: false,
                prompts: RefCell::new(Vec::new()),
            }
        }
    }

    impl Confirm for StaticConfirm {
        fn confirm(&self, prompt: &str) -> Result<bool, HostError> {
            self.prompts.borrow_mut().push(prompt.to_string());
            Ok(self.answer)
        }
    }

    /// Replays a fixed sequence of answers, then falls back to no.
    pub struct SequenceConfirm {
        answers: RefCell<VecDeque<bool>>,
    }

    impl SequenceConfirm {
        pub fn new(answers: &[bool]) -> Self {
            Self {
                answers: RefCell::new(answers.iter().copied().collect()),
            }
        }
    }

    impl Confirm for SequenceConfirm {
        fn confirm(&self, _prompt: &str) -> Result<bool, HostError> {
            Ok(self.answers.borrow_mut().pop_front().unwrap_or(false))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scripted::{SequenceConfirm, StaticConfirm};

    #[test]
    fn assume_yes_never_prompts() {
        let confirm = TerminalConfirm { assume_yes: true };
        assert!(confirm.confirm("Proceed?").unwrap());
    }

    #[test]
    fn non_interactive_stdin_defaults_to_no() {
        // Under the test harness stdin is not a terminal, so the prompt is
        // never shown and the safe answer comes back.
        let confirm = TerminalConfirm { assume_yes: false };
        assert!(!confirm.confirm("Uninstall docker?").unwrap());
    }

    #[test]
    fn static_confirm_records_prompts() {
        let confirm = StaticConfirm::no();
        assert!(!confirm.confirm("Uninstall docker?").unwrap());
        assert_eq!(confirm.prompts.borrow().as_slice(), ["Uninstall docker?"]);
    }

    #[test]
    fn sequence_confirm_defaults_to_no_when_exhausted() {
        let confirm = SequenceConfirm::new(&[true]);
        assert!(confirm.confirm("first").unwrap());
        assert!(!confirm.confirm("second").unwrap());
    }
}
