//! # Order Item Pipeline
//!
//! The status state machine every order line walks through after checkout,
//! and which staff role owns each step.
//!
//! ## State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  ASSIGNED ──► ACCEPTED ──► PREPARING ──► READY_TO_SERVE ──► SERVED     │
//! │     │            │             │         (kitchen edges)   (waiter)     │
//! │     └────────────┴─────────────┴──► CANCELLED | OUT_OF_STOCK            │
//! │                                      (kitchen)                          │
//! │                                                                         │
//! │  Terminal: SERVED, CANCELLED, OUT_OF_STOCK (no outgoing edges)         │
//! │  No skipping, no backward moves.                                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Boards
//! ```text
//! NEW       = ASSIGNED, ACCEPTED, PREPARING, CANCELLED, OUT_OF_STOCK
//! ONGOING   = READY_TO_SERVE
//! COMPLETED = SERVED
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};

// =============================================================================
// Item Status
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export)]
pub enum ItemStatus {
    /// Fresh from checkout, waiting for the kitchen to pick it up.
    #[default]
    Assigned,
    Accepted,
    Preparing,
    ReadyToServe,
    Served,
    Cancelled,
    OutOfStock,
}

impl ItemStatus {
    pub const ALL: [ItemStatus; 7] = [
        ItemStatus::Assigned,
        ItemStatus::Accepted,
        ItemStatus::Preparing,
        ItemStatus::ReadyToServe,
        ItemStatus::Served,
        ItemStatus::Cancelled,
        ItemStatus::OutOfStock,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Assigned => "ASSIGNED",
            ItemStatus::Accepted => "ACCEPTED",
            ItemStatus::Preparing => "PREPARING",
            ItemStatus::ReadyToServe => "READY_TO_SERVE",
            ItemStatus::Served => "SERVED",
            ItemStatus::Cancelled => "CANCELLED",
            ItemStatus::OutOfStock => "OUT_OF_STOCK",
        }
    }

    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ItemStatus::Served | ItemStatus::Cancelled | ItemStatus::OutOfStock
        )
    }

    /// The role that owns the edge `self → to`, or `None` when there is no such edge.
    pub fn edge_owner(&self, to: ItemStatus) -> Option<StaffRole> {
        use ItemStatus::*;

        match (self, to) {
            (Assigned, Accepted) | (Accepted, Preparing) | (Preparing, ReadyToServe) => {
                Some(StaffRole::Kitchen)
            }
            (Assigned | Accepted | Preparing, Cancelled | OutOfStock) => Some(StaffRole::Kitchen),
            (ReadyToServe, Served) => Some(StaffRole::Waiter),
            _ => None,
        }
    }

    /// Checks that `role` may move an item from `self` to `to`.
    ///
    /// Only the owning role may take an edge. ADMIN owns none.
    pub fn check_transition(&self, to: ItemStatus, role: StaffRole) -> CoreResult<()> {
        if self.edge_owner(to) == Some(role) {
            Ok(())
        } else {
            Err(CoreError::IllegalTransition {
                from: *self,
                to,
                role,
            })
        }
    }

    /// Statuses `role` may move this item to next.
    pub fn next_for(&self, role: StaffRole) -> Vec<ItemStatus> {
        ItemStatus::ALL
            .into_iter()
            .filter(|to| self.check_transition(*to, role).is_ok())
            .collect()
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ItemStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ValidationError::InvalidFormat {
                field: "itemStatus".to_string(),
                reason: format!("unknown status '{}'", s),
            })
    }
}

// =============================================================================
// Staff Role
// =============================================================================

/// Role carried in a staff token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export)]
pub enum StaffRole {
    Kitchen,
    Waiter,
    Admin,
}

impl fmt::Display for StaffRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StaffRole::Kitchen => "KITCHEN",
            StaffRole::Waiter => "WAITER",
            StaffRole::Admin => "ADMIN",
        })
    }
}

// =============================================================================
// Board Group
// =============================================================================

/// Column of the kitchen / waiter board an item shows up in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export)]
pub enum BoardGroup {
    New,
    Ongoing,
    Completed,
}

impl BoardGroup {
    pub fn of(status: ItemStatus) -> BoardGroup {
        match status {
            ItemStatus::Assigned
            | ItemStatus::Accepted
            | ItemStatus::Preparing
            | ItemStatus::Cancelled
            | ItemStatus::OutOfStock => BoardGroup::New,
            ItemStatus::ReadyToServe => BoardGroup::Ongoing,
            ItemStatus::Served => BoardGroup::Completed,
        }
    }

    /// The statuses that land in this group.
    pub fn statuses(&self) -> Vec<ItemStatus> {
        ItemStatus::ALL
            .into_iter()
            .filter(|s| BoardGroup::of(*s) == *self)
            .collect()
    }
}

impl FromStr for BoardGroup {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "new" => Ok(BoardGroup::New),
            "ongoing" => Ok(BoardGroup::Ongoing),
            "completed" => Ok(BoardGroup::Completed),
            other => Err(ValidationError::InvalidFormat {
                field: "board".to_string(),
                reason: format!("unknown board '{}'", other),
            }),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use ItemStatus::*;

    #[test]
    fn test_kitchen_happy_path() {
        assert!(Assigned.check_transition(Accepted, StaffRole::Kitchen).is_ok());
        assert!(Accepted.check_transition(Preparing, StaffRole::Kitchen).is_ok());
        assert!(Preparing.check_transition(ReadyToServe, StaffRole::Kitchen).is_ok());
    }

    #[test]
    fn test_only_waiter_serves() {
        assert!(ReadyToServe.check_transition(Served, StaffRole::Waiter).is_ok());
        assert!(ReadyToServe.check_transition(Served, StaffRole::Kitchen).is_err());
        // and the waiter owns nothing else
        assert!(Assigned.check_transition(Accepted, StaffRole::Waiter).is_err());
        assert!(Preparing.check_transition(Cancelled, StaffRole::Waiter).is_err());
    }

    #[test]
    fn test_admin_owns_no_pipeline_edge() {
        for from in ItemStatus::ALL {
            for to in ItemStatus::ALL {
                assert!(
                    matches!(
                        from.check_transition(to, StaffRole::Admin),
                        Err(CoreError::IllegalTransition { role: StaffRole::Admin, .. })
                    ),
                    "{} -> {}",
                    from,
                    to
                );
            }
            assert!(from.next_for(StaffRole::Admin).is_empty());
        }
    }

    #[test]
    fn test_no_skipping_or_going_back() {
        assert!(Assigned.check_transition(Preparing, StaffRole::Kitchen).is_err());
        assert!(Assigned.check_transition(ReadyToServe, StaffRole::Admin).is_err());
        assert!(Preparing.check_transition(Accepted, StaffRole::Kitchen).is_err());
        assert!(Served.check_transition(Preparing, StaffRole::Kitchen).is_err());
        assert!(Assigned.check_transition(Assigned, StaffRole::Kitchen).is_err());
    }

    #[test]
    fn test_terminal_states_have_no_edges() {
        for from in ItemStatus::ALL.into_iter().filter(ItemStatus::is_terminal) {
            for role in [StaffRole::Kitchen, StaffRole::Waiter, StaffRole::Admin] {
                assert!(from.next_for(role).is_empty(), "{} as {}", from, role);
            }
        }
    }

    #[test]
    fn test_cancel_only_before_ready() {
        for from in [Assigned, Accepted, Preparing] {
            assert!(from.check_transition(Cancelled, StaffRole::Kitchen).is_ok());
            assert!(from.check_transition(OutOfStock, StaffRole::Kitchen).is_ok());
        }
        assert!(ReadyToServe.check_transition(Cancelled, StaffRole::Kitchen).is_err());
    }

    #[test]
    fn test_illegal_transition_error_carries_states() {
        let err = Served.check_transition(Preparing, StaffRole::Kitchen).unwrap_err();
        match err {
            CoreError::IllegalTransition { from, to, role } => {
                assert_eq!(from, Served);
                assert_eq!(to, Preparing);
                assert_eq!(role, StaffRole::Kitchen);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_board_groups_partition_statuses() {
        assert_eq!(BoardGroup::of(Assigned), BoardGroup::New);
        assert_eq!(BoardGroup::of(OutOfStock), BoardGroup::New);
        assert_eq!(BoardGroup::of(ReadyToServe), BoardGroup::Ongoing);
        assert_eq!(BoardGroup::of(Served), BoardGroup::Completed);

        let total: usize = [BoardGroup::New, BoardGroup::Ongoing, BoardGroup::Completed]
            .iter()
            .map(|g| g.statuses().len())
            .sum();
        assert_eq!(total, ItemStatus::ALL.len());
    }

    #[test]
    fn test_parse() {
        assert_eq!("ready_to_serve".parse::<ItemStatus>().unwrap(), ReadyToServe);
        assert_eq!("OUT_OF_STOCK".parse::<ItemStatus>().unwrap(), OutOfStock);
        assert!("DONE".parse::<ItemStatus>().is_err());
        assert_eq!("Ongoing".parse::<BoardGroup>().unwrap(), BoardGroup::Ongoing);
        assert!("later".parse::<BoardGroup>().is_err());
    }
}
