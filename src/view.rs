//! View state machine
//!
//! Decides which screen is active. Analysis and Search need a stored profile;
//! a navigation the guard refuses leaves the current screen untouched.

use crate::logging;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewState {
    Profile,
    Analysis,
    Search,
}

impl ViewState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViewState::Profile => "profile",
            ViewState::Analysis => "analysis",
            ViewState::Search => "search",
        }
    }

    fn requires_profile(&self) -> bool {
        !matches!(self, ViewState::Profile)
    }

    /// Screen to open with, given whether a profile is stored.
    pub fn initial(has_profile: bool) -> ViewState {
        if has_profile {
            ViewState::Analysis
        } else {
            ViewState::Profile
        }
    }
}

/// A refused navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuardViolation {
    pub from: ViewState,
    pub to: ViewState,
}

impl fmt::Display for GuardViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cannot open {} from {} without a saved profile",
            self.to.as_str(),
            self.from.as_str()
        )
    }
}

#[derive(Debug)]
pub struct ViewStateMachine {
    current: ViewState,
}

impl ViewStateMachine {
    pub fn new(has_profile: bool) -> Self {
        Self {
            current: ViewState::initial(has_profile),
        }
    }

    pub fn current(&self) -> ViewState {
        self.current
    }

    /// Move to `target` if the guard allows it.
    pub fn navigate(&mut self, target: ViewState, has_profile: bool) -> Result<ViewState, GuardViolation> {
        if target.requires_profile() && !has_profile {
            let violation = GuardViolation {
                from: self.current,
                to: target,
            };
            logging::log_navigation(None, &format!("Guard violation: {}", violation));
            return Err(violation);
        }

        if self.current != target {
            logging::log_navigation(
                None,
                &format!("{} -> {}", self.current.as_str(), target.as_str()),
            );
        }
        self.current = target;
        Ok(self.current)
    }

    /// A profile was just saved: show its analysis.
    pub fn profile_saved(&mut self) -> ViewState {
        self.current = ViewState::Analysis;
        self.current
    }

    /// Re-apply the initial rule, as on a fresh login.
    pub fn reset(&mut self, has_profile: bool) {
        self.current = ViewState::initial(has_profile);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state_follows_profile_presence() {
        assert_eq!(ViewStateMachine::new(false).current(), ViewState::Profile);
        assert_eq!(ViewStateMachine::new(true).current(), ViewState::Analysis);
    }

    #[test]
    fn test_guarded_navigation_without_profile() {
        let mut machine = ViewStateMachine::new(false);

        for target in [ViewState::Analysis, ViewState::Search] {
            let err = machine.navigate(target, false).unwrap_err();
            assert_eq!(err.from, ViewState::Profile);
            assert_eq!(err.to, target);
            assert_eq!(machine.current(), ViewState::Profile);
        }

        assert_eq!(machine.navigate(ViewState::Profile, false), Ok(ViewState::Profile));
    }

    #[test]
    fn test_free_movement_with_profile() {
        let mut machine = ViewStateMachine::new(true);
        assert_eq!(machine.navigate(ViewState::Search, true), Ok(ViewState::Search));
        assert_eq!(machine.navigate(ViewState::Analysis, true), Ok(ViewState::Analysis));
        assert_eq!(machine.navigate(ViewState::Profile, true), Ok(ViewState::Profile));
        assert_eq!(machine.navigate(ViewState::Search, true), Ok(ViewState::Search));
    }

    #[test]
    fn test_profile_saved_moves_to_analysis() {
        let mut machine = ViewStateMachine::new(false);
        assert_eq!(machine.profile_saved(), ViewState::Analysis);
    }

    #[test]
    fn test_reset() {
        let mut machine = ViewStateMachine::new(true);
        machine.navigate(ViewState::Search, true).unwrap();
        machine.reset(false);
        assert_eq!(machine.current(), ViewState::Profile);
    }

    #[test]
    fn test_guard_violation_message() {
        assert!(GuardViolation {
            from: ViewState::Profile,
            to: ViewState::Search
        }
        .to_string()
        .contains("search"));
    }
}
