//! # Session Repository
//!
//! Reads of table sessions and the occupant stamp. Opening and ending
//! sessions happens in [`TableRepository`](super::table::TableRepository)
//! together with the table status flip.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use tableside_core::{OccupantKind, TableSession};

use crate::error::DbResult;

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct SessionRow {
    session_id: String,
    organization_id: String,
    table_number: String,
    occupant_kind: OccupantKind,
    customer_id: Option<String>,
    reserved_source: Option<String>,
    is_active: bool,
    created_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
}

impl From<SessionRow> for TableSession {
    fn from(row: SessionRow) -> Self {
        TableSession {
            session_id: row.session_id,
            organization_id: row.organization_id,
            table_number: row.table_number,
            occupant_kind: row.occupant_kind,
            customer_id: row.customer_id,
            reserved_source: row.reserved_source,
            is_active: row.is_active,
            created_at: row.created_at,
            ended_at: row.ended_at,
        }
    }
}

pub(crate) const SESSION_COLUMNS: &str = "session_id, organization_id, table_number, occupant_kind, \
     customer_id, reserved_source, is_active, created_at, ended_at";

#[derive(Debug, Clone)]
pub struct SessionRepository {
    pool: SqlitePool,
}

impl SessionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SessionRepository { pool }
    }

    /// Any session by id, active or ended.
    pub async fn get(&self, session_id: &str) -> DbResult<Option<TableSession>> {
        let row: Option<SessionRow> = sqlx::query_as(&format!(
            "SELECT {SESSION_COLUMNS} FROM table_sessions WHERE session_id = ?1"
        ))
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(TableSession::from))
    }

    /// The live session of a table, if any.
    pub async fn active_for_table(
        &self,
        organization_id: &str,
        table_number: &str,
    ) -> DbResult<Option<TableSession>> {
        let row: Option<SessionRow> = sqlx::query_as(&format!(
            "SELECT {SESSION_COLUMNS} FROM table_sessions
             WHERE organization_id = ?1 AND table_number = ?2 AND is_active = 1"
        ))
        .bind(organization_id)
        .bind(table_number)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(TableSession::from))
    }

    /// Stamps who is sitting at an active session.
    ///
    /// `reserved_source` only overwrites when supplied. Returns the updated
    /// session, or `None` when no active session of that organization matched.
    pub async fn set_occupant(
        &self,
        organization_id: &str,
        session_id: &str,
        kind: OccupantKind,
        customer_id: Option<&str>,
        reserved_source: Option<&str>,
    ) -> DbResult<Option<TableSession>> {
        let row: Option<SessionRow> = sqlx::query_as(&format!(
            "UPDATE table_sessions
                SET occupant_kind = ?3,
                    customer_id = ?4,
                    reserved_source = COALESCE(?5, reserved_source)
              WHERE session_id = ?1 AND organization_id = ?2 AND is_active = 1
             RETURNING {SESSION_COLUMNS}"
        ))
        .bind(session_id)
        .bind(organization_id)
        .bind(kind)
        .bind(customer_id)
        .bind(reserved_source)
        .fetch_optional(&self.pool)
        .await?;

        debug!(session_id, ?kind, updated = row.is_some(), "Session occupant stamped");
        Ok(row.map(TableSession::from))
    }
}
