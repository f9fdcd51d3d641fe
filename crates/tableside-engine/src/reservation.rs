//! # Table Reservation
//!
//! ```text
//!              reserve                      release
//!  AVAILABLE ───────────► RESERVED ─────────────────► AVAILABLE
//!      │                  (one active session)
//!      │ mark_cleaning                 mark_cleaned
//!      └──────────────► CLEANING ───────────────────► AVAILABLE
//! ```
//!
//! `reserve` is a single compare-and-swap on the table row followed by the
//! session insert, in one transaction. Of N phones scanning the same QR code
//! at once exactly one gets a session; the rest get `Conflict`.

use tracing::{info, warn};

use tableside_core::validation::validate_key;
use tableside_core::{
    CoreError, OccupantKind, Table, TableAvailability, TableSession, TableStatus,
    ValidationError,
};
use tableside_db::{ReleaseOutcome, ReserveOutcome};

use crate::error::{EngineError, EngineResult};
use crate::notify::ChangeKind;
use crate::{session_keys, Engine};

const MAX_SOURCE_LEN: usize = 64;
const MAX_CAPACITY: i64 = 100;

pub struct ReservationService<'a> {
    engine: &'a Engine,
}

impl<'a> ReservationService<'a> {
    pub(crate) fn new(engine: &'a Engine) -> Self {
        ReservationService { engine }
    }

    // =========================================================================
    // Registry
    // =========================================================================

    /// Adds a table in AVAILABLE state.
    pub async fn register_table(
        &self,
        organization_id: &str,
        table_number: &str,
        capacity: i64,
        section: Option<&str>,
    ) -> EngineResult<Table> {
        let (org, table) = table_keys(organization_id, table_number)?;
        if !(1..=MAX_CAPACITY).contains(&capacity) {
            return Err(ValidationError::OutOfRange {
                field: "capacity".into(),
                min: 1,
                max: MAX_CAPACITY,
            }
            .into());
        }
        let section = section.map(str::trim).filter(|s| !s.is_empty());

        let table = self
            .engine
            .db()
            .tables()
            .insert(org, table, capacity, section, self.engine.now())
            .await?;

        self.engine.publish(
            org,
            ChangeKind::TableStatusChanged {
                table_number: table.table_number.clone(),
                status: table.status,
            },
        );
        Ok(table)
    }

    pub async fn get_table(&self, organization_id: &str, table_number: &str) -> EngineResult<Table> {
        let (org, table) = table_keys(organization_id, table_number)?;
        self.engine
            .db()
            .tables()
            .get(org, table)
            .await?
            .ok_or_else(|| EngineError::not_found("Table", table))
    }

    pub async fn list_tables(&self, organization_id: &str) -> EngineResult<Vec<Table>> {
        let org = validate_key("organizationId", organization_id)?;
        Ok(self.engine.db().tables().list(org).await?)
    }

    // =========================================================================
    // Sessions
    // =========================================================================

    /// Whether the table can be sat at right now. A pure read.
    pub async fn check_status(
        &self,
        organization_id: &str,
        table_number: &str,
    ) -> EngineResult<TableAvailability> {
        let table = self.get_table(organization_id, table_number).await?;
        Ok(TableAvailability::from(&table))
    }

    /// Claims an AVAILABLE table and opens its session.
    pub async fn reserve(
        &self,
        organization_id: &str,
        table_number: &str,
        reserved_source: Option<&str>,
    ) -> EngineResult<TableSession> {
        let (org, table) = table_keys(organization_id, table_number)?;
        let source = normalize_source(reserved_source)?;

        let outcome = self
            .engine
            .db()
            .tables()
            .reserve(org, table, source.as_deref(), self.engine.now())
            .await?;

        match outcome {
            ReserveOutcome::Reserved(session) => {
                self.engine.publish(
                    org,
                    ChangeKind::TableStatusChanged {
                        table_number: table.to_string(),
                        status: TableStatus::Reserved,
                    },
                );
                self.engine.publish(
                    org,
                    ChangeKind::SessionStarted {
                        table_number: table.to_string(),
                        session_id: session.session_id.clone(),
                    },
                );
                Ok(session)
            }
            ReserveOutcome::NotAvailable(status) => {
                warn!(organization_id = org, table_number = table, %status, "Reservation refused");
                Err(CoreError::TableUnavailable {
                    table_number: table.to_string(),
                    status: status.to_string(),
                    operation: "reserve".to_string(),
                }
                .into())
            }
            ReserveOutcome::NoSuchTable => Err(EngineError::not_found("Table", table)),
        }
    }

    /// True only for an active session of this organization.
    ///
    /// Anything else (unknown id, ended session, another organization,
    /// malformed id) is `false`, not an error.
    pub async fn join_by_code(&self, organization_id: &str, session_id: &str) -> EngineResult<bool> {
        let Ok((org, sid)) = session_keys(organization_id, session_id) else {
            return Ok(false);
        };

        let session = self.engine.db().sessions().get(sid).await?;
        Ok(session.is_some_and(|s| s.is_active_in(org)))
    }

    /// A session of this organization, active or ended.
    pub async fn get_session(
        &self,
        organization_id: &str,
        session_id: &str,
    ) -> EngineResult<TableSession> {
        let (org, sid) = session_keys(organization_id, session_id)?;
        self.engine
            .db()
            .sessions()
            .get(sid)
            .await?
            .filter(|s| s.organization_id == org)
            .ok_or_else(|| EngineError::not_found("Session", sid))
    }

    pub async fn active_session(
        &self,
        organization_id: &str,
        table_number: &str,
    ) -> EngineResult<Option<TableSession>> {
        let (org, table) = table_keys(organization_id, table_number)?;
        Ok(self.engine.db().sessions().active_for_table(org, table).await?)
    }

    /// Records who is sitting at the session: a customer when `customer_id`
    /// is given, otherwise a guest. Only a customer who has completed OTP
    /// verification can be seated this way.
    pub async fn update_customer_table_details(
        &self,
        organization_id: &str,
        session_id: &str,
        customer_id: Option<&str>,
        reserved_source: Option<&str>,
    ) -> EngineResult<TableSession> {
        let (org, sid) = session_keys(organization_id, session_id)?;
        let source = normalize_source(reserved_source)?;
        let db = self.engine.db();

        let customer_id = match customer_id.map(str::trim).filter(|c| !c.is_empty()) {
            Some(id) => {
                let id = validate_key("customerId", id)?;
                let customer = db
                    .customers()
                    .get(id)
                    .await?
                    .ok_or_else(|| EngineError::not_found("Customer", id))?;
                if !customer.verified {
                    warn!(customer_id = id, session_id = sid, "Unverified customer offered as occupant");
                    return Err(CoreError::Unauthorized(format!("Customer {id} is not verified")).into());
                }
                Some(id)
            }
            None => None,
        };
        let kind = if customer_id.is_some() {
            OccupantKind::Customer
        } else {
            OccupantKind::Guest
        };

        let session = db
            .sessions()
            .set_occupant(org, sid, kind, customer_id, source.as_deref())
            .await?
            .ok_or_else(|| EngineError::invalid_session(sid))?;

        self.engine.publish(
            org,
            ChangeKind::OccupantResolved {
                session_id: session.session_id.clone(),
                occupant_kind: session.occupant_kind,
            },
        );
        Ok(session)
    }

    /// Ends the active session and frees the table.
    ///
    /// Releasing an AVAILABLE table is a no-op. Returns the id of the
    /// session that was ended, if any.
    pub async fn release(
        &self,
        organization_id: &str,
        table_number: &str,
    ) -> EngineResult<Option<String>> {
        let (org, table) = table_keys(organization_id, table_number)?;

        match self
            .engine
            .db()
            .tables()
            .release(org, table, self.engine.now())
            .await?
        {
            ReleaseOutcome::Released { ended_session } => {
                self.engine.publish(
                    org,
                    ChangeKind::TableStatusChanged {
                        table_number: table.to_string(),
                        status: TableStatus::Available,
                    },
                );
                if let Some(session_id) = &ended_session {
                    self.engine.publish(
                        org,
                        ChangeKind::SessionEnded {
                            table_number: table.to_string(),
                            session_id: session_id.clone(),
                        },
                    );
                }
                Ok(ended_session)
            }
            ReleaseOutcome::AlreadyAvailable => Ok(None),
            ReleaseOutcome::Cleaning => Err(unavailable(table, TableStatus::Cleaning, "release")),
            ReleaseOutcome::NoSuchTable => Err(EngineError::not_found("Table", table)),
        }
    }

    // =========================================================================
    // Housekeeping
    // =========================================================================

    pub async fn mark_cleaning(&self, organization_id: &str, table_number: &str) -> EngineResult<Table> {
        self.housekeeping(
            organization_id,
            table_number,
            TableStatus::Available,
            TableStatus::Cleaning,
            "mark for cleaning",
        )
        .await
    }

    pub async fn mark_cleaned(&self, organization_id: &str, table_number: &str) -> EngineResult<Table> {
        self.housekeeping(
            organization_id,
            table_number,
            TableStatus::Cleaning,
            TableStatus::Available,
            "mark as cleaned",
        )
        .await
    }

    async fn housekeeping(
        &self,
        organization_id: &str,
        table_number: &str,
        from: TableStatus,
        to: TableStatus,
        operation: &str,
    ) -> EngineResult<Table> {
        let (org, table) = table_keys(organization_id, table_number)?;
        let tables = self.engine.db().tables();

        let moved = tables
            .transition(org, table, from, to, self.engine.now())
            .await?;
        let current = tables
            .get(org, table)
            .await?
            .ok_or_else(|| EngineError::not_found("Table", table))?;

        if !moved {
            return Err(unavailable(table, current.status, operation));
        }

        info!(organization_id = org, table_number = table, %from, %to, "Table housekeeping");
        self.engine.publish(
            org,
            ChangeKind::TableStatusChanged {
                table_number: table.to_string(),
                status: to,
            },
        );
        Ok(current)
    }
}

fn table_keys<'a>(organization_id: &'a str, table_number: &'a str) -> EngineResult<(&'a str, &'a str)> {
    Ok((
        validate_key("organizationId", organization_id)?,
        validate_key("tableNumber", table_number)?,
    ))
}

fn normalize_source(source: Option<&str>) -> EngineResult<Option<String>> {
    let Some(source) = source.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    if source.chars().count() > MAX_SOURCE_LEN {
        return Err(ValidationError::TooLong {
            field: "reservedSource".into(),
            max: MAX_SOURCE_LEN,
        }
        .into());
    }
    Ok(Some(source.to_string()))
}

fn unavailable(table: &str, status: TableStatus, operation: &str) -> EngineError {
    CoreError::TableUnavailable {
        table_number: table.to_string(),
        status: status.to_string(),
        operation: operation.to_string(),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{engine, ORG};
    use tableside_core::error::ErrorKind;

    #[tokio::test]
    async fn test_reserve_then_conflict() {
        let (engine, _) = engine().await;
        let svc = engine.reservations();

        let session = svc.reserve(ORG, "T1", Some("QR")).await.unwrap();
        assert!(session.is_active);
        assert_eq!(session.occupant_kind, OccupantKind::None);
        assert_eq!(session.reserved_source.as_deref(), Some("QR"));

        let status = svc.check_status(ORG, "T1").await.unwrap();
        assert!(!status.is_available());
        assert_eq!(status.status, TableStatus::Reserved);

        let err = svc.reserve(ORG, "T1", None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn test_unknown_table_and_bad_input() {
        let (engine, _) = engine().await;
        let svc = engine.reservations();

        assert_eq!(
            svc.check_status(ORG, "T99").await.unwrap_err().kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            svc.reserve(ORG, "T99", None).await.unwrap_err().kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            svc.reserve(ORG, "  ", None).await.unwrap_err().kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            svc.register_table(ORG, "T7", 0, None).await.unwrap_err().kind(),
            ErrorKind::Validation
        );
    }

    #[tokio::test]
    async fn test_join_by_code() {
        let (engine, _) = engine().await;
        let svc = engine.reservations();
        let session = svc.reserve(ORG, "T1", None).await.unwrap();

        assert!(svc.join_by_code(ORG, &session.session_id).await.unwrap());
        assert!(!svc.join_by_code("other-org", &session.session_id).await.unwrap());
        assert!(!svc.join_by_code(ORG, "no-such-session").await.unwrap());
        assert!(!svc.join_by_code(ORG, "").await.unwrap());

        svc.release(ORG, "T1").await.unwrap();
        assert!(!svc.join_by_code(ORG, &session.session_id).await.unwrap());
        // ended sessions stay readable
        assert!(!svc.get_session(ORG, &session.session_id).await.unwrap().is_active);
    }

    #[tokio::test]
    async fn test_occupant_details() {
        let (engine, _) = engine().await;
        let svc = engine.reservations();
        let session = svc.reserve(ORG, "T1", None).await.unwrap();

        let guest = svc
            .update_customer_table_details(ORG, &session.session_id, None, Some("waiter"))
            .await
            .unwrap();
        assert_eq!(guest.occupant_kind, OccupantKind::Guest);
        assert_eq!(guest.reserved_source.as_deref(), Some("waiter"));

        let err = svc
            .update_customer_table_details(ORG, &session.session_id, Some("ghost"), None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = svc
            .update_customer_table_details(ORG, "missing", None, None)
            .await
            .unwrap_err();
        assert!(matches!(err.as_core(), Some(CoreError::InvalidSession(_))));
    }

    #[tokio::test]
    async fn test_occupant_customer_must_be_verified() {
        let (engine, h) = engine().await;
        let svc = engine.reservations();
        let seated = svc.reserve(ORG, "T1", None).await.unwrap();
        svc.reserve(ORG, "T2", None).await.unwrap();

        // signed in at T2 but never entered the code
        let pending = engine
            .identity()
            .create_customer("Asha", "asha@example.com", ORG, "T2")
            .await
            .unwrap();

        let err = svc
            .update_customer_table_details(ORG, &seated.session_id, Some(&pending.customer_id), None)
            .await
            .unwrap_err();
        assert!(matches!(err.as_core(), Some(CoreError::Unauthorized(_))));
        assert_eq!(err.kind(), ErrorKind::Unauthorized);

        let unchanged = svc.get_session(ORG, &seated.session_id).await.unwrap();
        assert_eq!(unchanged.occupant_kind, seated.occupant_kind);
        assert!(unchanged.customer_id.is_none());

        let code = h.otp.last_code("asha@example.com").unwrap();
        engine.identity().verify("asha@example.com", &code).await.unwrap();

        let session = svc
            .update_customer_table_details(ORG, &seated.session_id, Some(&pending.customer_id), None)
            .await
            .unwrap();
        assert_eq!(session.occupant_kind, OccupantKind::Customer);
        assert_eq!(session.customer_id.as_deref(), Some(pending.customer_id.as_str()));
    }

    #[tokio::test]
    async fn test_release_is_idempotent_and_reopens_table() {
        let (engine, _) = engine().await;
        let svc = engine.reservations();
        let session = svc.reserve(ORG, "T1", None).await.unwrap();

        assert_eq!(svc.release(ORG, "T1").await.unwrap(), Some(session.session_id));
        assert_eq!(svc.release(ORG, "T1").await.unwrap(), None);
        assert!(svc.check_status(ORG, "T1").await.unwrap().is_available());
        assert!(svc.active_session(ORG, "T1").await.unwrap().is_none());

        let again = svc.reserve(ORG, "T1", None).await.unwrap();
        assert!(again.is_active);
    }

    #[tokio::test]
    async fn test_release_drops_the_cart() {
        let (engine, _) = engine().await;
        let session = engine.reservations().reserve(ORG, "T1", None).await.unwrap();
        let request = tableside_core::AddToCart {
            variant_id: "V1".into(),
            quantity: 2,
            addons: vec![],
            customizations: vec![],
            special_instructions: None,
        };
        engine.carts().add(ORG, &session.session_id, &request).await.unwrap();

        engine.reservations().release(ORG, "T1").await.unwrap();
        let rows = engine.db().carts().list(ORG, &session.session_id).await.unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_cleaning_cycle() {
        let (engine, _) = engine().await;
        let svc = engine.reservations();

        let table = svc.mark_cleaning(ORG, "T1").await.unwrap();
        assert_eq!(table.status, TableStatus::Cleaning);
        assert_eq!(svc.reserve(ORG, "T1", None).await.unwrap_err().kind(), ErrorKind::Conflict);
        assert_eq!(svc.release(ORG, "T1").await.unwrap_err().kind(), ErrorKind::Conflict);
        assert_eq!(svc.mark_cleaning(ORG, "T1").await.unwrap_err().kind(), ErrorKind::Conflict);

        svc.mark_cleaned(ORG, "T1").await.unwrap();
        assert!(svc.check_status(ORG, "T1").await.unwrap().is_available());
        assert_eq!(svc.mark_cleaned(ORG, "T1").await.unwrap_err().kind(), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn test_reserve_publishes_events() {
        let (engine, _) = engine().await;
        let mut sub = engine.feed().subscribe(ORG);
        let session = engine.reservations().reserve(ORG, "T2", None).await.unwrap();

        let first = sub.recv().await.unwrap();
        assert_eq!(
            first.kind,
            ChangeKind::TableStatusChanged {
                table_number: "T2".into(),
                status: TableStatus::Reserved
            }
        );
        let second = sub.recv().await.unwrap();
        assert_eq!(
            second.kind,
            ChangeKind::SessionStarted {
                table_number: "T2".into(),
                session_id: session.session_id
            }
        );
    }
}
