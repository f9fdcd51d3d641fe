//! # Customer Repository
//!
//! Customers and their OTP challenges.
//!
//! ## Sign-in Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  start_sign_in      upsert customer (unverified) + replace challenge   │
//! │       │             (one transaction)                                   │
//! │       ▼                                                                 │
//! │  challenge          engine checks window / attempts                    │
//! │       │                                                                 │
//! │  reserve_attempt    count the attempt before comparing (CAS on hash)   │
//! │       │                                                                 │
//! │       └── right code ──► complete_verification (same hash)             │
//! │                          consume challenge + stamp session +           │
//! │                          mark verified (one transaction)               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Only the argon2 hash of a code is ever stored.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::{debug, info};

use tableside_core::otp::ChallengeState;
use tableside_core::{Customer, Identifier, TableSession};

use crate::error::DbResult;
use crate::repository::generate_id;
use crate::repository::session::{SessionRow, SESSION_COLUMNS};

// =============================================================================
// Rows
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct CustomerRow {
    customer_id: String,
    name: String,
    email: Option<String>,
    phone: Option<String>,
    verified: bool,
    created_at: DateTime<Utc>,
    verified_at: Option<DateTime<Utc>>,
}

impl From<CustomerRow> for Customer {
    fn from(row: CustomerRow) -> Self {
        Customer {
            customer_id: row.customer_id,
            name: row.name,
            email: row.email,
            phone: row.phone,
            verified: row.verified,
            created_at: row.created_at,
            verified_at: row.verified_at,
        }
    }
}

const CUSTOMER_COLUMNS: &str =
    "customer_id, name, email, phone, verified, created_at, verified_at";

/// A stored OTP challenge.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OtpChallenge {
    pub identifier: String,
    pub customer_id: String,
    /// The session the customer is signing in from.
    pub session_id: String,
    pub code_hash: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub attempts: i64,
    pub consumed_at: Option<DateTime<Utc>>,
}

impl OtpChallenge {
    pub fn state(&self) -> ChallengeState {
        ChallengeState {
            expires_at: self.expires_at,
            attempts: u32::try_from(self.attempts).unwrap_or(u32::MAX),
            consumed: self.consumed_at.is_some(),
        }
    }
}

const CHALLENGE_COLUMNS: &str =
    "identifier, customer_id, session_id, code_hash, issued_at, expires_at, attempts, consumed_at";

/// Result of finishing a verification.
#[derive(Debug)]
pub enum VerifyOutcome {
    Verified {
        customer: Customer,
        session: TableSession,
    },
    /// Someone else used the challenge first.
    AlreadyConsumed,
    /// The session the code was issued for has ended; nothing was written.
    SessionInactive,
}

/// Column that holds this kind of identifier.
fn identifier_column(identifier: &Identifier) -> &'static str {
    match identifier {
        Identifier::Email(_) => "email",
        Identifier::Phone(_) => "phone",
    }
}

// =============================================================================
// Repository
// =============================================================================

#[derive(Debug, Clone)]
pub struct CustomerRepository {
    pool: SqlitePool,
}

impl CustomerRepository {
    pub fn new(pool: SqlitePool) -> Self {
        CustomerRepository { pool }
    }

    pub async fn get(&self, customer_id: &str) -> DbResult<Option<Customer>> {
        let row: Option<CustomerRow> = sqlx::query_as(&format!(
            "SELECT {CUSTOMER_COLUMNS} FROM customers WHERE customer_id = ?1"
        ))
        .bind(customer_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Customer::from))
    }

    pub async fn find_by_identifier(&self, identifier: &Identifier) -> DbResult<Option<Customer>> {
        let row: Option<CustomerRow> = sqlx::query_as(&format!(
            "SELECT {CUSTOMER_COLUMNS} FROM customers WHERE {} = ?1",
            identifier_column(identifier)
        ))
        .bind(identifier.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Customer::from))
    }

    /// Creates or renames the customer and replaces any challenge for the identifier.
    pub async fn start_sign_in(
        &self,
        name: &str,
        identifier: &Identifier,
        session_id: &str,
        code_hash: &str,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> DbResult<Customer> {
        let column = identifier_column(identifier);
        let mut tx = self.pool.begin().await?;

        let existing: Option<CustomerRow> = sqlx::query_as(&format!(
            "UPDATE customers SET name = ?1 WHERE {column} = ?2 RETURNING {CUSTOMER_COLUMNS}"
        ))
        .bind(name)
        .bind(identifier.as_str())
        .fetch_optional(&mut *tx)
        .await?;

        let customer = match existing {
            Some(row) => Customer::from(row),
            None => {
                let customer = Customer {
                    customer_id: generate_id(),
                    name: name.to_string(),
                    email: identifier.email().map(str::to_string),
                    phone: identifier.phone().map(str::to_string),
                    verified: false,
                    created_at: issued_at,
                    verified_at: None,
                };
                sqlx::query(
                    r#"
                    INSERT INTO customers (customer_id, name, email, phone, verified, created_at)
                    VALUES (?1, ?2, ?3, ?4, 0, ?5)
                    "#,
                )
                .bind(&customer.customer_id)
                .bind(&customer.name)
                .bind(&customer.email)
                .bind(&customer.phone)
                .bind(customer.created_at)
                .execute(&mut *tx)
                .await?;
                customer
            }
        };

        sqlx::query(
            r#"
            INSERT INTO otp_challenges
                (identifier, customer_id, session_id, code_hash, issued_at, expires_at, attempts, consumed_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, NULL)
            ON CONFLICT(identifier) DO UPDATE SET
                customer_id = excluded.customer_id,
                session_id  = excluded.session_id,
                code_hash   = excluded.code_hash,
                issued_at   = excluded.issued_at,
                expires_at  = excluded.expires_at,
                attempts    = 0,
                consumed_at = NULL
            "#,
        )
        .bind(identifier.as_str())
        .bind(&customer.customer_id)
        .bind(session_id)
        .bind(code_hash)
        .bind(issued_at)
        .bind(expires_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        debug!(
            customer_id = %customer.customer_id,
            session_id,
            "Sign-in challenge stored"
        );
        Ok(customer)
    }

    pub async fn challenge(&self, identifier: &str) -> DbResult<Option<OtpChallenge>> {
        let challenge: Option<OtpChallenge> = sqlx::query_as(&format!(
            "SELECT {CHALLENGE_COLUMNS} FROM otp_challenges WHERE identifier = ?1"
        ))
        .bind(identifier)
        .fetch_optional(&self.pool)
        .await?;

        Ok(challenge)
    }

    /// Counts one attempt against the challenge keyed by `code_hash`.
    ///
    /// Returns the attempt count after the increment, or `None` when the
    /// challenge was consumed, re-keyed, or already out of attempts. Callers
    /// compare the code only after this succeeds, so concurrent guesses
    /// cannot spend more than `max_attempts` between them.
    pub async fn reserve_attempt(
        &self,
        identifier: &str,
        code_hash: &str,
        max_attempts: u32,
    ) -> DbResult<Option<u32>> {
        let attempts: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE otp_challenges SET attempts = attempts + 1
            WHERE identifier = ?1 AND code_hash = ?2 AND consumed_at IS NULL AND attempts < ?3
            RETURNING attempts
            "#,
        )
        .bind(identifier)
        .bind(code_hash)
        .bind(i64::from(max_attempts))
        .fetch_optional(&self.pool)
        .await?;

        Ok(attempts.map(|n| u32::try_from(n).unwrap_or(u32::MAX)))
    }

    /// Overwrites the code of an existing challenge and reopens its window.
    ///
    /// Returns `None` when no challenge was ever issued for the identifier.
    pub async fn reissue(
        &self,
        identifier: &str,
        code_hash: &str,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> DbResult<Option<OtpChallenge>> {
        let challenge: Option<OtpChallenge> = sqlx::query_as(&format!(
            "UPDATE otp_challenges
                SET code_hash = ?2, issued_at = ?3, expires_at = ?4, attempts = 0, consumed_at = NULL
              WHERE identifier = ?1
             RETURNING {CHALLENGE_COLUMNS}"
        ))
        .bind(identifier)
        .bind(code_hash)
        .bind(issued_at)
        .bind(expires_at)
        .fetch_optional(&self.pool)
        .await?;

        Ok(challenge)
    }

    /// Consumes the challenge, stamps the bound session and marks the customer verified.
    ///
    /// `code_hash` is the hash the code was checked against. A challenge that
    /// was re-issued since then reads as [`VerifyOutcome::AlreadyConsumed`].
    pub async fn complete_verification(
        &self,
        identifier: &str,
        code_hash: &str,
        now: DateTime<Utc>,
    ) -> DbResult<VerifyOutcome> {
        let mut tx = self.pool.begin().await?;

        let consumed: Option<(String, String)> = sqlx::query_as(
            r#"
            UPDATE otp_challenges SET consumed_at = ?2
            WHERE identifier = ?1 AND code_hash = ?3 AND consumed_at IS NULL
            RETURNING customer_id, session_id
            "#,
        )
        .bind(identifier)
        .bind(now)
        .bind(code_hash)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((customer_id, session_id)) = consumed else {
            tx.rollback().await?;
            return Ok(VerifyOutcome::AlreadyConsumed);
        };

        let session: Option<SessionRow> = sqlx::query_as(&format!(
            "UPDATE table_sessions SET occupant_kind = 'CUSTOMER', customer_id = ?2
              WHERE session_id = ?1 AND is_active = 1
             RETURNING {SESSION_COLUMNS}"
        ))
        .bind(&session_id)
        .bind(&customer_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(session) = session else {
            tx.rollback().await?;
            return Ok(VerifyOutcome::SessionInactive);
        };

        let customer: CustomerRow = sqlx::query_as(&format!(
            "UPDATE customers SET verified = 1, verified_at = COALESCE(verified_at, ?2)
              WHERE customer_id = ?1
             RETURNING {CUSTOMER_COLUMNS}"
        ))
        .bind(&customer_id)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(customer_id = %customer_id, session_id = %session_id, "Customer verified");

        Ok(VerifyOutcome::Verified {
            customer: customer.into(),
            session: session.into(),
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
