//! Isolate tiers, strongest separation first.

use serde::{Deserialize, Serialize};

/// One isolate implementation, ordered by strength of separation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Worker subprocess inside the OS kernel sandbox (bwrap /
    /// Seatbelt), minimal environment, rlimits.
    Kernel,
    /// Worker subprocess with minimal environment and rlimits, no
    /// kernel wrap.
    Subprocess,
    /// Engine on a dedicated thread with instruction and value budgets.
    Thread,
    /// Engine inline on the host runtime. Hardened semantics only; no
    /// enforceable memory cap.
    InProcess,
}

impl Tier {
    /// All tiers in fallback order.
    #[must_use]
    pub fn ladder() -> [Tier; 4] {
        [Self::Kernel, Self::Subprocess, Self::Thread, Self::InProcess]
    }

    /// The next weaker tier, if any.
    #[must_use]
    pub fn next(self) -> Option<Tier> {
        match self {
            Self::Kernel => Some(Self::Subprocess),
            Self::Subprocess => Some(Self::Thread),
            Self::Thread => Some(Self::InProcess),
            Self::InProcess => None,
        }
    }

    /// Stable label used in audit events.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Kernel => "kernel",
            Self::Subprocess => "subprocess",
            Self::Thread => "thread",
            Self::InProcess => "in_process",
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ladder_order() {
        let ladder = Tier::ladder();
        assert_eq!(ladder[0], Tier::Kernel);
        assert_eq!(ladder[3], Tier::InProcess);
        assert_eq!(Tier::Kernel.next(), Some(Tier::Subprocess));
        assert_eq!(Tier::InProcess.next(), None);
    }

    #[test]
    fn test_labels_are_stable() {
        assert_eq!(Tier::Kernel.label(), "kernel");
        assert_eq!(Tier::InProcess.label(), "in_process");
    }
}
