//! # Table Repository
//!
//! Table rows and the two transactions that move a table between
//! AVAILABLE and RESERVED.
//!
//! ## Reserve
//! ```text
//! BEGIN
//!   UPDATE restaurant_tables SET status = 'RESERVED'
//!    WHERE organization_id = ? AND table_number = ? AND status = 'AVAILABLE'
//!   ── 0 rows? ── read status, ROLLBACK, report why
//!   INSERT INTO table_sessions (...)      ← partial unique index backs it
//! COMMIT
//! ```
//! The compare-and-swap is the first statement, so of N concurrent reserves
//! exactly one sees a row change.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::{debug, info};

use tableside_core::{OccupantKind, Table, TableSession, TableStatus};

use crate::error::DbResult;
use crate::repository::cart::discard_session_cart;
use crate::repository::generate_id;

#[derive(Debug, sqlx::FromRow)]
struct TableRow {
    organization_id: String,
    table_number: String,
    status: TableStatus,
    capacity: i64,
    section: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<TableRow> for Table {
    fn from(row: TableRow) -> Self {
        Table {
            organization_id: row.organization_id,
            table_number: row.table_number,
            status: row.status,
            capacity: row.capacity,
            section: row.section,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

const TABLE_COLUMNS: &str =
    "organization_id, table_number, status, capacity, section, created_at, updated_at";

/// Result of a reserve attempt.
#[derive(Debug)]
pub enum ReserveOutcome {
    Reserved(TableSession),
    /// The table exists but is not AVAILABLE.
    NotAvailable(TableStatus),
    NoSuchTable,
}

/// Result of a release attempt.
#[derive(Debug, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// The table went RESERVED → AVAILABLE; carries the ended session, if any.
    Released { ended_session: Option<String> },
    AlreadyAvailable,
    /// Staff are cleaning the table; release leaves it alone.
    Cleaning,
    NoSuchTable,
}

#[derive(Debug, Clone)]
pub struct TableRepository {
    pool: SqlitePool,
}

impl TableRepository {
    pub fn new(pool: SqlitePool) -> Self {
        TableRepository { pool }
    }

    /// Registers a table in AVAILABLE state.
    pub async fn insert(
        &self,
        organization_id: &str,
        table_number: &str,
        capacity: i64,
        section: Option<&str>,
        now: DateTime<Utc>,
    ) -> DbResult<Table> {
        sqlx::query(
            r#"
            INSERT INTO restaurant_tables
                (organization_id, table_number, status, capacity, section, created_at, updated_at)
            VALUES (?1, ?2, 'AVAILABLE', ?3, ?4, ?5, ?5)
            "#,
        )
        .bind(organization_id)
        .bind(table_number)
        .bind(capacity)
        .bind(section)
        .bind(now)
        .execute(&self.pool)
        .await?;

        debug!(organization_id, table_number, "Table registered");

        Ok(Table {
            organization_id: organization_id.to_string(),
            table_number: table_number.to_string(),
            status: TableStatus::Available,
            capacity,
            section: section.map(str::to_string),
            created_at: now,
            updated_at: now,
        })
    }

    pub async fn get(&self, organization_id: &str, table_number: &str) -> DbResult<Option<Table>> {
        let row: Option<TableRow> = sqlx::query_as(&format!(
            "SELECT {TABLE_COLUMNS} FROM restaurant_tables
             WHERE organization_id = ?1 AND table_number = ?2"
        ))
        .bind(organization_id)
        .bind(table_number)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Table::from))
    }

    pub async fn list(&self, organization_id: &str) -> DbResult<Vec<Table>> {
        let rows: Vec<TableRow> = sqlx::query_as(&format!(
            "SELECT {TABLE_COLUMNS} FROM restaurant_tables
             WHERE organization_id = ?1 ORDER BY table_number"
        ))
        .bind(organization_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Table::from).collect())
    }

    /// Atomically flips AVAILABLE → RESERVED and opens a session.
    pub async fn reserve(
        &self,
        organization_id: &str,
        table_number: &str,
        reserved_source: Option<&str>,
        now: DateTime<Utc>,
    ) -> DbResult<ReserveOutcome> {
        let mut tx = self.pool.begin().await?;

        let swapped = sqlx::query(
            r#"
            UPDATE restaurant_tables SET status = 'RESERVED', updated_at = ?3
            WHERE organization_id = ?1 AND table_number = ?2 AND status = 'AVAILABLE'
            "#,
        )
        .bind(organization_id)
        .bind(table_number)
        .bind(now)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if swapped == 0 {
            let status: Option<TableStatus> = sqlx::query_scalar(
                "SELECT status FROM restaurant_tables WHERE organization_id = ?1 AND table_number = ?2",
            )
            .bind(organization_id)
            .bind(table_number)
            .fetch_optional(&mut *tx)
            .await?;
            tx.rollback().await?;

            return Ok(match status {
                Some(status) => ReserveOutcome::NotAvailable(status),
                None => ReserveOutcome::NoSuchTable,
            });
        }

        let session = TableSession {
            session_id: generate_id(),
            organization_id: organization_id.to_string(),
            table_number: table_number.to_string(),
            occupant_kind: OccupantKind::None,
            customer_id: None,
            reserved_source: reserved_source.map(str::to_string),
            is_active: true,
            created_at: now,
            ended_at: None,
        };

        sqlx::query(
            r#"
            INSERT INTO table_sessions
                (session_id, organization_id, table_number, occupant_kind,
                 customer_id, reserved_source, is_active, created_at)
            VALUES (?1, ?2, ?3, 'NONE', NULL, ?4, 1, ?5)
            "#,
        )
        .bind(&session.session_id)
        .bind(organization_id)
        .bind(table_number)
        .bind(reserved_source)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(
            organization_id,
            table_number,
            session_id = %session.session_id,
            "Table reserved"
        );

        Ok(ReserveOutcome::Reserved(session))
    }

    /// Ends the active session (if any) and flips RESERVED → AVAILABLE.
    pub async fn release(
        &self,
        organization_id: &str,
        table_number: &str,
        now: DateTime<Utc>,
    ) -> DbResult<ReleaseOutcome> {
        let mut tx = self.pool.begin().await?;

        let swapped = sqlx::query(
            r#"
            UPDATE restaurant_tables SET status = 'AVAILABLE', updated_at = ?3
            WHERE organization_id = ?1 AND table_number = ?2 AND status = 'RESERVED'
            "#,
        )
        .bind(organization_id)
        .bind(table_number)
        .bind(now)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if swapped == 0 {
            let status: Option<TableStatus> = sqlx::query_scalar(
                "SELECT status FROM restaurant_tables WHERE organization_id = ?1 AND table_number = ?2",
            )
            .bind(organization_id)
            .bind(table_number)
            .fetch_optional(&mut *tx)
            .await?;
            tx.rollback().await?;

            return Ok(match status {
                Some(TableStatus::Cleaning) => ReleaseOutcome::Cleaning,
                Some(_) => ReleaseOutcome::AlreadyAvailable,
                None => ReleaseOutcome::NoSuchTable,
            });
        }

        let ended_session = end_active_session(&mut *tx, organization_id, table_number, now).await?;
        tx.commit().await?;

        info!(
            organization_id,
            table_number,
            ended_session = ?ended_session,
            "Table released"
        );

        Ok(ReleaseOutcome::Released { ended_session })
    }

    /// Moves a table `from → to` if it is currently in `from`. Returns whether it moved.
    pub async fn transition(
        &self,
        organization_id: &str,
        table_number: &str,
        from: TableStatus,
        to: TableStatus,
        now: DateTime<Utc>,
    ) -> DbResult<bool> {
        let changed = sqlx::query(
            r#"
            UPDATE restaurant_tables SET status = ?4, updated_at = ?5
            WHERE organization_id = ?1 AND table_number = ?2 AND status = ?3
            "#,
        )
        .bind(organization_id)
        .bind(table_number)
        .bind(from)
        .bind(to)
        .bind(now)
        .execute(&self.pool)
        .await?
        .rows_affected();

        debug!(organization_id, table_number, %from, %to, changed, "Table transition");
        Ok(changed > 0)
    }
}

/// Ends the active session of a table inside an open transaction. Its cart goes with it.
pub(crate) async fn end_active_session(
    conn: &mut sqlx::SqliteConnection,
    organization_id: &str,
    table_number: &str,
    now: DateTime<Utc>,
) -> DbResult<Option<String>> {
    let ended: Option<String> = sqlx::query_scalar(
        r#"
        UPDATE table_sessions SET is_active = 0, ended_at = ?3
        WHERE organization_id = ?1 AND table_number = ?2 AND is_active = 1
        RETURNING session_id
        "#,
    )
    .bind(organization_id)
    .bind(table_number)
    .bind(now)
    .fetch_optional(&mut *conn)
    .await?;

    if let Some(session_id) = &ended {
        discard_session_cart(&mut *conn, session_id).await?;
    }
    Ok(ended)
}

// =============================================================================
// Unit Tests
// =============================================================================
