//! Fault injection
//!
//! Faults are set per resource kind and live in the scope's store, so they
//! are seen by every handle on the same scope.

use serde::{Deserialize, Serialize};

/// Misbehaviour of one resource kind
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fault {
    /// Creation calls are rejected
    #[serde(default)]
    pub fail_create: bool,

    /// Created objects end up in ERROR instead of ACTIVE
    #[serde(default)]
    pub error_state: bool,

    /// Created objects stay pending forever
    #[serde(default)]
    pub never_ready: bool,

    /// Deletion calls are rejected
    #[serde(default)]
    pub fail_delete: bool,

    /// Deletions let through before `fail_delete` applies
    #[serde(default)]
    pub deletes_before_failing: u32,

    /// Number of upcoming reads that fail before reads succeed again
    #[serde(default)]
    pub transient_read_errors: u32,

    /// Limit `error_state` and `never_ready` to the next `n` created objects
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub times: Option<u32>,
}

impl Fault {
    pub fn fail_create() -> Self {
        Self {
            fail_create: true,
            ..Self::default()
        }
    }

    pub fn error_state() -> Self {
        Self {
            error_state: true,
            ..Self::default()
        }
    }

    pub fn never_ready() -> Self {
        Self {
            never_ready: true,
            ..Self::default()
        }
    }

    pub fn fail_delete() -> Self {
        Self {
            fail_delete: true,
            ..Self::default()
        }
    }

    pub fn transient_reads(count: u32) -> Self {
        Self {
            transient_read_errors: count,
            ..Self::default()
        }
    }

    /// Let the next `deletions` deletions succeed first
    pub fn after(mut self, deletions: u32) -> Self {
        self.deletes_before_failing = deletions;
        self
    }

    pub fn times(mut self, count: u32) -> Self {
        self.times = Some(count);
        self
    }

    /// Whether newly created objects are affected
    pub fn spoils_creation(&self) -> bool {
        self.error_state || self.never_ready
    }

    pub fn is_clear(&self) -> bool {
        *self == Self::default()
    }
}

/// What a pending object turns into once its remaining reads run out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Transition {
    Activate,
    Fail,
    Vanish,
}

/// Pending work on one object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub remaining: u32,
    pub then: Transition,
}

impl Progress {
    pub fn new(remaining: u32, then: Transition) -> Self {
        Self { remaining, then }
    }

    /// Count one read; returns the transition once it is due
    pub fn tick(&mut self) -> Option<Transition> {
        if self.remaining == 0 {
            return Some(self.then);
        }
        self.remaining -= 1;
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_ticks_down() {
        let mut progress = Progress::new(2, Transition::Activate);
        assert_eq!(progress.tick(), None);
        assert_eq!(progress.tick(), None);
        assert_eq!(progress.tick(), Some(Transition::Activate));
    }

    #[test]
    fn test_fault_constructors() {
        assert!(Fault::default().is_clear());
        assert!(Fault::fail_create().fail_create);
        assert!(!Fault::never_ready().is_clear());
        assert_eq!(Fault::transient_reads(3).transient_read_errors, 3);
        assert_eq!(Fault::error_state().times(1).times, Some(1));
        assert!(Fault::never_ready().spoils_creation());
        assert!(!Fault::fail_delete().spoils_creation());
        assert_eq!(Fault::fail_delete().after(1).deletes_before_failing, 1);
    }

    #[test]
    fn test_fault_from_partial_json() {
        let fault: Fault = serde_json::from_str(r#"{"fail_delete": true}"#).unwrap();
        assert_eq!(fault, Fault::fail_delete());
    }
}
