//! Privilege and precondition gate.
//!
//! Runs before any mutating action. Blocks synchronously; a gate failure
//! means the action never started, so nothing is partially applied.

use std::fmt;

use crate::error::HostError;
use crate::host::HostContext;

/// Environment facts a component may require before it can be mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fact {
    /// Debian or a Debian derivative (apt/dpkg/dkms tooling assumed).
    DebianFamily,
    /// An apt source with the non-free component enabled.
    NonFreeRepo,
}

impl fmt::Display for Fact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DebianFamily => write!(f, "Debian-family distribution"),
            Self::NonFreeRepo => write!(f, "non-free apt component"),
        }
    }
}

/// Verify root privileges plus every required fact. Returns the first
/// failure; mutating callers must not proceed past an `Err`.
pub fn check(host: &HostContext, facts: &[Fact]) -> Result<(), HostError> {
    if !host.is_root() {
        return Err(HostError::MissingPrivilege);
    }

    for fact in facts {
        let holds = match fact {
            Fact::DebianFamily => host.debian_family,
            Fact::NonFreeRepo => host.non_free_enabled,
        };
        if !holds {
            return Err(HostError::MissingPrecondition(format!(
                "{fact} is required but was not detected"
            )));
        }
    }

    Ok(())
}
