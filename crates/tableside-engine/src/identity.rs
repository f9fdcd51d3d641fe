//! # Identity Resolution
//!
//! Who is sitting at a session: an anonymous guest, or a customer who proved
//! control of an email address or phone number with a one-time code.
//!
//! ## Sign-in Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  create_customer(name, identifier, org, table)                         │
//! │    ├─ upsert customer (unverified)                                     │
//! │    ├─ store argon2(code), expires_at = now + validity, attempts = 0    │
//! │    └─ OtpDispatcher::dispatch(identifier, code)  ──► SMS / email        │
//! │                                                                         │
//! │  verify(identifier, code)                                              │
//! │    ├─ expired or consumed          → Expired                           │
//! │    ├─ attempts exhausted           → TooManyAttempts                   │
//! │    ├─ reserve attempt (CAS)        → counted before comparing          │
//! │    ├─ hash mismatch                → InvalidOtp                        │
//! │    └─ match → one transaction: consume, stamp session, mark verified   │
//! │                                                                         │
//! │  resend(identifier) → new code, new window, attempts reset             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The plain code never touches the database.

use std::sync::Mutex;

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::Rng;
use tracing::{debug, info, warn};

use tableside_core::validation::{
    parse_identifier, validate_customer_name, validate_key, validate_otp_format,
};
use tableside_core::{CoreError, Customer, Identifier, OccupantKind, PendingVerification, TableSession};
use tableside_db::VerifyOutcome;

use crate::error::{EngineError, EngineResult};
use crate::notify::ChangeKind;
use crate::{session_keys, Engine};

// =============================================================================
// OTP Delivery
// =============================================================================

/// Hands a freshly issued code to whatever delivers it (SMS gateway, mailer).
#[async_trait]
pub trait OtpDispatcher: Send + Sync {
    async fn dispatch(
        &self,
        identifier: &Identifier,
        code: &str,
        expires_at: DateTime<Utc>,
    ) -> EngineResult<()>;
}

/// Writes codes to the log. For development.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingDispatcher;

#[async_trait]
impl OtpDispatcher for LoggingDispatcher {
    async fn dispatch(
        &self,
        identifier: &Identifier,
        code: &str,
        expires_at: DateTime<Utc>,
    ) -> EngineResult<()> {
        info!(identifier = identifier.as_str(), code, %expires_at, "OTP issued (logging dispatcher)");
        Ok(())
    }
}

/// A code captured by [`RecordingDispatcher`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentOtp {
    pub identifier: String,
    pub code: String,
    pub expires_at: DateTime<Utc>,
}

/// Keeps every dispatched code in memory so tests can read them back.
#[derive(Debug, Default)]
pub struct RecordingDispatcher {
    sent: Mutex<Vec<SentOtp>>,
}

impl RecordingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// The most recent code sent to `identifier` (normalized form).
    pub fn last_code(&self, identifier: &str) -> Option<String> {
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .rev()
            .find(|s| s.identifier == identifier)
            .map(|s| s.code.clone())
    }

    pub fn sent(&self) -> Vec<SentOtp> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl OtpDispatcher for RecordingDispatcher {
    async fn dispatch(
        &self,
        identifier: &Identifier,
        code: &str,
        expires_at: DateTime<Utc>,
    ) -> EngineResult<()> {
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(SentOtp {
                identifier: identifier.as_str().to_string(),
                code: code.to_string(),
                expires_at,
            });
        Ok(())
    }
}

// =============================================================================
// Codes
// =============================================================================

fn generate_code(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect()
}

/// Argon2id with a small memory cost: codes live for a minute and are
/// guarded by the attempt limit.
fn hasher() -> EngineResult<Argon2<'static>> {
    let params = Params::new(4 * 1024, 2, 1, None)
        .map_err(|e| EngineError::Internal(format!("argon2 params: {e}")))?;
    Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
}

/// Hashing runs on the blocking pool so it never stalls the async workers.
async fn hash_code(code: &str) -> EngineResult<String> {
    let code = code.to_string();
    tokio::task::spawn_blocking(move || {
        let salt = SaltString::generate(&mut OsRng);
        hasher()?
            .hash_password(code.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| EngineError::Internal(format!("OTP hashing failed: {e}")))
    })
    .await
    .map_err(|e| EngineError::Internal(format!("OTP hashing task failed: {e}")))?
}

async fn code_matches(code: &str, stored_hash: &str) -> EngineResult<bool> {
    let code = code.to_string();
    let stored_hash = stored_hash.to_string();
    tokio::task::spawn_blocking(move || {
        let parsed = PasswordHash::new(&stored_hash)
            .map_err(|e| EngineError::Internal(format!("stored OTP hash unreadable: {e}")))?;
        Ok(hasher()?.verify_password(code.as_bytes(), &parsed).is_ok())
    })
    .await
    .map_err(|e| EngineError::Internal(format!("OTP check task failed: {e}")))?
}

// =============================================================================
// Service
// =============================================================================

pub struct IdentityService<'a> {
    engine: &'a Engine,
}

impl<'a> IdentityService<'a> {
    pub(crate) fn new(engine: &'a Engine) -> Self {
        IdentityService { engine }
    }

    /// Marks the session as taken by an anonymous guest.
    pub async fn create_guest(
        &self,
        organization_id: &str,
        session_id: &str,
    ) -> EngineResult<TableSession> {
        let (org, sid) = session_keys(organization_id, session_id)?;

        let session = self
            .engine
            .db()
            .sessions()
            .set_occupant(org, sid, OccupantKind::Guest, None, None)
            .await?
            .ok_or_else(|| EngineError::invalid_session(sid))?;

        debug!(session_id = sid, "Guest seated");
        self.engine.publish(
            org,
            ChangeKind::OccupantResolved {
                session_id: session.session_id.clone(),
                occupant_kind: OccupantKind::Guest,
            },
        );
        Ok(session)
    }

    /// Starts a customer sign-in from the table's active session and sends a code.
    pub async fn create_customer(
        &self,
        name: &str,
        identifier: &str,
        organization_id: &str,
        table_number: &str,
    ) -> EngineResult<PendingVerification> {
        let name = validate_customer_name(name)?;
        let identifier = parse_identifier(identifier)?;
        let org = validate_key("organizationId", organization_id)?;
        let table = validate_key("tableNumber", table_number)?;

        let db = self.engine.db();
        let session = db
            .sessions()
            .active_for_table(org, table)
            .await?
            .ok_or_else(|| EngineError::invalid_session(format!("for table {table}")))?;

        let policy = self.engine.otp_policy();
        let code = generate_code(policy.code_length);
        let issued_at = self.engine.now();
        let expires_at = policy.expires_at(issued_at);

        let customer = db
            .customers()
            .start_sign_in(
                &name,
                &identifier,
                &session.session_id,
                &hash_code(&code).await?,
                issued_at,
                expires_at,
            )
            .await?;

        self.engine
            .dispatcher()
            .dispatch(&identifier, &code, expires_at)
            .await?;

        info!(
            customer_id = %customer.customer_id,
            session_id = %session.session_id,
            "Verification code sent"
        );

        Ok(PendingVerification {
            customer_id: customer.customer_id,
            identifier: identifier.as_str().to_string(),
            expires_at,
        })
    }

    /// Checks a submitted code and, if it matches, binds the customer to the session.
    pub async fn verify(&self, identifier: &str, otp: &str) -> EngineResult<Customer> {
        let identifier = parse_identifier(identifier)?;
        let policy = self.engine.otp_policy();
        // Malformed codes are rejected before they can cost an attempt
        validate_otp_format(otp, policy.code_length)?;

        let key = identifier.as_str();
        let customers = self.engine.db().customers();
        let challenge = customers
            .challenge(key)
            .await?
            .ok_or_else(|| EngineError::not_found("Verification", key))?;

        let now = self.engine.now();
        policy.precheck(&challenge.state(), now)?;

        // The attempt is spent before the comparison so parallel guesses share one budget
        let Some(attempts) = customers
            .reserve_attempt(key, &challenge.code_hash, policy.max_attempts)
            .await?
        else {
            return Err(self.refused_attempt(key, now).await);
        };

        if !code_matches(otp.trim(), &challenge.code_hash).await? {
            warn!(identifier = key, attempts, "Wrong verification code");
            return Err(policy.mismatch_error(attempts).into());
        }

        match customers.complete_verification(key, &challenge.code_hash, now).await? {
            VerifyOutcome::Verified { customer, session } => {
                self.engine.publish(
                    &session.organization_id,
                    ChangeKind::OccupantResolved {
                        session_id: session.session_id.clone(),
                        occupant_kind: OccupantKind::Customer,
                    },
                );
                Ok(customer)
            }
            VerifyOutcome::AlreadyConsumed => Err(CoreError::OtpExpired.into()),
            VerifyOutcome::SessionInactive => {
                warn!(identifier = key, session_id = %challenge.session_id, "Verified for an ended session");
                Err(EngineError::invalid_session(challenge.session_id))
            }
        }
    }

    /// Explains why an attempt could not be reserved, from the challenge as it is now.
    async fn refused_attempt(&self, key: &str, now: DateTime<Utc>) -> EngineError {
        let current = match self.engine.db().customers().challenge(key).await {
            Ok(Some(challenge)) => challenge,
            Ok(None) => return EngineError::not_found("Verification", key),
            Err(e) => return e.into(),
        };
        match self.engine.otp_policy().precheck(&current.state(), now) {
            Err(e) => e.into(),
            // re-issued under us: the code was checked against a replaced challenge
            Ok(()) => CoreError::OtpExpired.into(),
        }
    }

    /// Issues a new code for an existing challenge. The previous code stops working.
    pub async fn resend(&self, identifier: &str) -> EngineResult<PendingVerification> {
        let identifier = parse_identifier(identifier)?;
        let key = identifier.as_str();

        let policy = self.engine.otp_policy();
        let code = generate_code(policy.code_length);
        let issued_at = self.engine.now();
        let expires_at = policy.expires_at(issued_at);

        let challenge = self
            .engine
            .db()
            .customers()
            .reissue(key, &hash_code(&code).await?, issued_at, expires_at)
            .await?
            .ok_or_else(|| EngineError::not_found("Verification", key))?;

        self.engine
            .dispatcher()
            .dispatch(&identifier, &code, expires_at)
            .await?;

        debug!(identifier = key, "Verification code re-sent");

        Ok(PendingVerification {
            customer_id: challenge.customer_id,
            identifier: key.to_string(),
            expires_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{engine, ORG};
    use chrono::Duration;
    use tableside_core::error::ErrorKind;

    const EMAIL: &str = "asha@example.com";

    #[test]
    fn test_code_shape() {
        let code = generate_code(6);
        assert_eq!(code.len(), 6);
        assert!(code.chars().all(|c| c.is_ascii_digit()));
    }

    #[tokio::test]
    async fn test_hash_round_trip_off_the_runtime() {
        let code = generate_code(6);
        let hash = hash_code(&code).await.unwrap();
        assert!(!hash.contains(&code));
        assert!(code_matches(&code, &hash).await.unwrap());
        assert!(!code_matches("not-it", &hash).await.unwrap());
        assert!(code_matches(&code, "garbage").await.is_err());
    }

    #[tokio::test]
    async fn test_guest() {
        let (engine, _) = engine().await;
        let session = engine.reservations().reserve(ORG, "T1", None).await.unwrap();

        let guest = engine.identity().create_guest(ORG, &session.session_id).await.unwrap();
        assert_eq!(guest.occupant_kind, OccupantKind::Guest);

        let err = engine.identity().create_guest(ORG, "nope").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn test_sign_in_and_verify() {
        let (engine, h) = engine().await;
        let session = engine.reservations().reserve(ORG, "T1", None).await.unwrap();

        let pending = engine
            .identity()
            .create_customer("Asha", " Asha@Example.com ", ORG, "T1")
            .await
            .unwrap();
        assert_eq!(pending.identifier, EMAIL);
        assert_eq!(pending.expires_at, engine.now() + Duration::seconds(59));

        let code = h.otp.last_code(EMAIL).unwrap();
        let customer = engine.identity().verify(EMAIL, &code).await.unwrap();
        assert!(customer.verified);
        assert_eq!(customer.customer_id, pending.customer_id);

        let session = engine
            .reservations()
            .get_session(ORG, &session.session_id)
            .await
            .unwrap();
        assert_eq!(session.occupant_kind, OccupantKind::Customer);
        assert_eq!(session.customer_id.as_deref(), Some(customer.customer_id.as_str()));

        // the code is single use
        let err = engine.identity().verify(EMAIL, &code).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Expired);
    }

    #[tokio::test]
    async fn test_sign_in_requires_active_session() {
        let (engine, _) = engine().await;
        let err = engine
            .identity()
            .create_customer("Asha", EMAIL, ORG, "T1")
            .await
            .unwrap_err();
        assert!(matches!(err.as_core(), Some(CoreError::InvalidSession(_))));

        let err = engine
            .identity()
            .create_customer("", EMAIL, ORG, "T1")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_expired_code_is_rejected_even_if_correct() {
        let (engine, h) = engine().await;
        engine.reservations().reserve(ORG, "T1", None).await.unwrap();
        engine
            .identity()
            .create_customer("Ravi", "+91 98765 43210", ORG, "T1")
            .await
            .unwrap();
        let code = h.otp.last_code("+919876543210").unwrap();

        h.clock.advance(Duration::seconds(60));
        let err = engine.identity().verify("+919876543210", &code).await.unwrap_err();
        assert!(matches!(err.as_core(), Some(CoreError::OtpExpired)));
    }

    #[tokio::test]
    async fn test_attempt_limit() {
        let (engine, h) = engine().await;
        engine.reservations().reserve(ORG, "T1", None).await.unwrap();
        engine.identity().create_customer("Asha", EMAIL, ORG, "T1").await.unwrap();
        let code = h.otp.last_code(EMAIL).unwrap();
        let wrong = if code == "000000" { "111111" } else { "000000" };

        let svc = engine.identity();
        assert!(matches!(
            svc.verify(EMAIL, wrong).await.unwrap_err().as_core(),
            Some(CoreError::InvalidOtp)
        ));
        assert!(matches!(
            svc.verify(EMAIL, wrong).await.unwrap_err().as_core(),
            Some(CoreError::InvalidOtp)
        ));
        assert!(matches!(
            svc.verify(EMAIL, wrong).await.unwrap_err().as_core(),
            Some(CoreError::TooManyAttempts)
        ));
        // locked out even with the right code
        assert!(matches!(
            svc.verify(EMAIL, &code).await.unwrap_err().as_core(),
            Some(CoreError::TooManyAttempts)
        ));

        // malformed input is not an attempt
        assert_eq!(svc.verify(EMAIL, "12").await.unwrap_err().kind(), ErrorKind::Validation);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_parallel_guesses_share_the_attempt_budget() {
        let (engine, h) = engine().await;
        engine.reservations().reserve(ORG, "T1", None).await.unwrap();
        engine.identity().create_customer("Asha", EMAIL, ORG, "T1").await.unwrap();
        let code = h.otp.last_code(EMAIL).unwrap();

        let mut guesses: Vec<String> = (0..5)
            .map(|i| {
                let wrong = format!("{:06}", (i + 1) * 111_111);
                if wrong == code { "999999".to_string() } else { wrong }
            })
            .collect();
        guesses.push(code.clone());

        let svc = engine.identity();
        let results = futures::future::join_all(guesses.iter().map(|g| svc.verify(EMAIL, g))).await;

        let max = engine.otp_policy().max_attempts;
        let challenge = engine.db().customers().challenge(EMAIL).await.unwrap().unwrap();
        assert!(challenge.attempts <= i64::from(max), "attempts = {}", challenge.attempts);

        let wrong_checked = results
            .iter()
            .filter(|r| matches!(r.as_ref().err().and_then(|e| e.as_core()), Some(CoreError::InvalidOtp)))
            .count();
        let verified = results.iter().filter(|r| r.is_ok()).count();
        assert!(verified <= 1);
        // at most `max` guesses ever reached the hash comparison
        assert!(wrong_checked + verified <= max as usize);
        for result in &results {
            if let Err(err) = result {
                assert!(matches!(
                    err.as_core(),
                    Some(CoreError::InvalidOtp | CoreError::TooManyAttempts | CoreError::OtpExpired)
                ));
            }
        }
    }

    #[tokio::test]
    async fn test_resend_replaces_code_and_resets_attempts() {
        let (engine, h) = engine().await;
        engine.reservations().reserve(ORG, "T1", None).await.unwrap();
        engine.identity().create_customer("Asha", EMAIL, ORG, "T1").await.unwrap();
        let first = h.otp.last_code(EMAIL).unwrap();

        h.clock.advance(Duration::seconds(45));
        let pending = engine.identity().resend(EMAIL).await.unwrap();
        assert_eq!(pending.expires_at, engine.now() + Duration::seconds(59));
        let second = h.otp.last_code(EMAIL).unwrap();
        assert_eq!(h.otp.sent().len(), 2);

        if first != second {
            assert!(matches!(
                engine.identity().verify(EMAIL, &first).await.unwrap_err().as_core(),
                Some(CoreError::InvalidOtp)
            ));
        }

        // past the first window, inside the second
        h.clock.advance(Duration::seconds(30));
        assert!(engine.identity().verify(EMAIL, &second).await.unwrap().verified);

        assert_eq!(
            engine.identity().resend("nobody@example.com").await.unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[tokio::test]
    async fn test_verify_after_session_ended() {
        let (engine, h) = engine().await;
        engine.reservations().reserve(ORG, "T1", None).await.unwrap();
        engine.identity().create_customer("Asha", EMAIL, ORG, "T1").await.unwrap();
        engine.reservations().release(ORG, "T1").await.unwrap();

        let code = h.otp.last_code(EMAIL).unwrap();
        let err = engine.identity().verify(EMAIL, &code).await.unwrap_err();
        assert!(matches!(err.as_core(), Some(CoreError::InvalidSession(_))));

        // nothing was committed
        let customer = engine
            .db()
            .customers()
            .find_by_identifier(&Identifier::Email(EMAIL.into()))
            .await
            .unwrap()
            .unwrap();
        assert!(!customer.verified);
    }

    #[tokio::test]
    async fn test_unknown_identifier() {
        let (engine, _) = engine().await;
        let err = engine.identity().verify(EMAIL, "123456").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
