//! Request and response bodies of the HTTP API.
//!
//! Shared by `apps/api` and `tableside-client` so both ends agree on field
//! names; exported to TypeScript for the web screens.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::pipeline::ItemStatus;
use crate::types::OrderType;

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ReserveRequest {
    #[serde(default)]
    pub reserved_source: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ReleaseResponse {
    pub ended_session_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ValidateSessionResponse {
    pub valid: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct OccupantRequest {
    #[serde(default)]
    pub customer_id: Option<String>,
    #[serde(default)]
    pub reserved_source: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CreateCustomerRequest {
    pub name: String,
    /// Email address or phone number.
    pub identifier: String,
    pub table_number: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct VerifyOtpRequest {
    pub identifier: String,
    pub otp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ResendOtpRequest {
    pub identifier: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ChangeQuantityRequest {
    pub quantity: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CheckoutRequest {
    pub table_number: String,
    #[serde(default)]
    pub order_type: OrderType,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct UpdateStatusRequest {
    pub status: ItemStatus,
    /// The status the caller last saw; the move fails if the item has moved since.
    #[serde(default)]
    pub expected: Option<ItemStatus>,
}

/// Header carrying a checkout's idempotency key.
pub const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";
