//! Session lifecycle state machine.
//!
//! ```text
//! Loading ──loaded──▶ InProgress ──begin_submit──▶ Submitting ──succeeded──▶ Submitted
//!                          ▲                            │
//!                          └──────────failed────────────┘
//! ```

use thiserror::Error;

/// What started a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitTrigger {
    /// Explicit user confirmation.
    User,
    /// The countdown reached zero.
    Timer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Loading,
    InProgress,
    Submitting(SubmitTrigger),
    Submitted,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum PhaseError {
    #[error("session is still loading")]
    NotLoaded,
    #[error("a submission is already in flight")]
    SubmitInFlight,
    #[error("session was already submitted")]
    AlreadySubmitted,
    #[error("no submission is in flight")]
    NotSubmitting,
    #[error("session is already loaded")]
    AlreadyLoaded,
}

impl SessionPhase {
    /// Loader finished.
    ///
    /// # Errors
    ///
    /// Returns `PhaseError::AlreadyLoaded` unless currently `Loading`.
    pub fn loaded(&mut self) -> Result<(), PhaseError> {
        match self {
            Self::Loading => {
                *self = Self::InProgress;
                Ok(())
            }
            _ => Err(PhaseError::AlreadyLoaded),
        }
    }

    /// Claim the single submission slot.
    ///
    /// # Errors
    ///
    /// Returns an error unless currently `InProgress`; the phase is unchanged.
    pub fn begin_submit(&mut self, trigger: SubmitTrigger) -> Result<(), PhaseError> {
        self.ensure_editable()?;
        *self = Self::Submitting(trigger);
        Ok(())
    }

    /// Submission failed; allow edits and retries again.
    ///
    /// # Errors
    ///
    /// Returns `PhaseError::NotSubmitting` unless currently `Submitting`.
    pub fn submit_failed(&mut self) -> Result<(), PhaseError> {
        match self {
            Self::Submitting(_) => {
                *self = Self::InProgress;
                Ok(())
            }
            _ => Err(PhaseError::NotSubmitting),
        }
    }

    /// Submission accepted by the backend. Terminal.
    ///
    /// # Errors
    ///
    /// Returns `PhaseError::NotSubmitting` unless currently `Submitting`.
    pub fn submit_succeeded(&mut self) -> Result<(), PhaseError> {
        match self {
            Self::Submitting(_) => {
                *self = Self::Submitted;
                Ok(())
            }
            _ => Err(PhaseError::NotSubmitting),
        }
    }

    /// Edits are only accepted while `InProgress`.
    ///
    /// # Errors
    ///
    /// Returns the reason the session does not accept edits.
    pub fn ensure_editable(&self) -> Result<(), PhaseError> {
        match self {
            Self::InProgress => Ok(()),
            Self::Loading => Err(PhaseError::NotLoaded),
            Self::Submitting(_) => Err(PhaseError::SubmitInFlight),
            Self::Submitted => Err(PhaseError::AlreadySubmitted),
        }
    }

    #[must_use]
    pub fn is_submitted(&self) -> bool {
        matches!(self, Self::Submitted)
    }
}
