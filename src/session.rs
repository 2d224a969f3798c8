//! Session gate
//!
//! A minimal email challenge flow standing in for the identity provider. The
//! authenticated subject is what every other component is keyed by.

use crate::error::{EngineError, Result};
use crate::logging;
use rand::Rng;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    ChallengeIssued { email: String, code: String },
    Authenticated { subject: String },
}

#[derive(Debug)]
pub struct SessionGate {
    state: SessionState,
    /// When set, every challenge uses this code instead of a random one
    fixed_code: Option<String>,
}

impl SessionGate {
    pub fn new(fixed_code: Option<String>) -> Self {
        Self {
            state: SessionState::Unauthenticated,
            fixed_code,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn subject(&self) -> Option<&str> {
        match &self.state {
            SessionState::Authenticated { subject } => Some(subject),
            _ => None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.subject().is_some()
    }

    /// Issue a challenge for `email` and return the code to deliver.
    ///
    /// Starting over replaces any earlier challenge or session.
    pub fn begin(&mut self, email: &str) -> Result<String> {
        let email = email.trim();
        if email.is_empty() {
            return Err(EngineError::validation("email is required"));
        }

        let code = match &self.fixed_code {
            Some(code) => code.clone(),
            None => format!("{:06}", rand::rng().random_range(0..1_000_000u32)),
        };

        logging::log_session(Some(email), "Challenge issued");
        self.state = SessionState::ChallengeIssued {
            email: email.to_string(),
            code: code.clone(),
        };
        Ok(code)
    }

    /// Complete the challenge. Returns the authenticated subject.
    pub fn verify(&mut self, code: &str) -> Result<String> {
        let email = match &self.state {
            SessionState::ChallengeIssued { email, code: expected } => {
                if code.trim() != expected {
                    logging::log_session(Some(email), "Challenge code rejected");
                    return Err(EngineError::session("invalid challenge code"));
                }
                email.clone()
            }
            SessionState::Unauthenticated => {
                return Err(EngineError::session("no challenge has been issued"));
            }
            SessionState::Authenticated { .. } => {
                return Err(EngineError::session("already signed in"));
            }
        };

        logging::log_session(Some(&email), "Signed in");
        self.state = SessionState::Authenticated {
            subject: email.clone(),
        };
        Ok(email)
    }

    pub fn logout(&mut self) {
        if let Some(subject) = self.subject() {
            logging::log_session(Some(subject), "Signed out");
        }
        self.state = SessionState::Unauthenticated;
    }
}
