//! The table session a device is acting in.
//!
//! Held in memory only. After a restart the front end rehydrates it from the
//! server with the session id it was given (QR, link, waiter), never from
//! a local cache.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionContext {
    pub org_id: String,
    pub session_id: String,
    pub table_number: String,
}

impl SessionContext {
    pub fn new(
        org_id: impl Into<String>,
        session_id: impl Into<String>,
        table_number: impl Into<String>,
    ) -> Self {
        SessionContext {
            org_id: org_id.into(),
            session_id: session_id.into(),
            table_number: table_number.into(),
        }
    }
}
