//! One-time-password window and attempt rules.
//!
//! Code generation and hashing live in the engine; this module only decides,
//! given a challenge's bookkeeping and the current time, whether a
//! submission may be checked at all and what a wrong code costs.

use chrono::{DateTime, Duration, Utc};

use crate::error::{CoreError, CoreResult};
use crate::{DEFAULT_OTP_MAX_ATTEMPTS, DEFAULT_OTP_VALIDITY_SECS};

/// Default number of digits in a code.
pub const DEFAULT_OTP_CODE_LENGTH: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OtpPolicy {
    pub validity: Duration,
    pub code_length: usize,
    pub max_attempts: u32,
}

impl Default for OtpPolicy {
    fn default() -> Self {
        Self {
            validity: Duration::seconds(DEFAULT_OTP_VALIDITY_SECS),
            code_length: DEFAULT_OTP_CODE_LENGTH,
            max_attempts: DEFAULT_OTP_MAX_ATTEMPTS,
        }
    }
}

/// The bookkeeping part of a stored challenge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChallengeState {
    pub expires_at: DateTime<Utc>,
    pub attempts: u32,
    pub consumed: bool,
}

impl OtpPolicy {
    pub fn expires_at(&self, issued_at: DateTime<Utc>) -> DateTime<Utc> {
        issued_at + self.validity
    }

    /// Decides whether a submission may be compared against the stored hash.
    ///
    /// Expiry wins over everything: a correct code after the window is
    /// still `OtpExpired`. A consumed challenge reads as expired too.
    pub fn precheck(&self, state: &ChallengeState, now: DateTime<Utc>) -> CoreResult<()> {
        if state.consumed || now > state.expires_at {
            return Err(CoreError::OtpExpired);
        }
        if state.attempts >= self.max_attempts {
            return Err(CoreError::TooManyAttempts);
        }
        Ok(())
    }

    /// The error for a wrong code, given the attempt count after recording it.
    pub fn mismatch_error(&self, attempts_after: u32) -> CoreError {
        if attempts_after >= self.max_attempts {
            CoreError::TooManyAttempts
        } else {
            CoreError::InvalidOtp
        }
    }
}
