//! # HTTP Client
//!
//! One method per API route.
//!
//! ## Retry Policy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  reads (status, validate, cart, orders, boards)   retried with backoff  │
//! │  checkout with an idempotency key                 retried with backoff  │
//! │  reserve, checkout without key, other writes      single attempt        │
//! │                                                                         │
//! │  retried on: connect errors, timeouts, 5xx, 408                         │
//! │  never on:   other 4xx                                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Cart and order calls act in the current [`SessionContext`]. Without one,
//! or when the server reports the session gone, they fail with
//! [`ClientError::SessionLost`] and the context is dropped.

use std::future::Future;
use std::sync::RwLock;

use backoff::backoff::Backoff;
use reqwest::{Method, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use tableside_core::api::{
    ChangeQuantityRequest, CheckoutRequest, CreateCustomerRequest, OccupantRequest,
    ReleaseResponse, ResendOtpRequest, ReserveRequest, UpdateStatusRequest,
    ValidateSessionResponse, VerifyOtpRequest, IDEMPOTENCY_KEY_HEADER,
};
use tableside_core::{
    AddToCart, BoardEntry, BoardGroup, Cart, CartItem, Customer, ItemStatus, Order, OrderItem,
    OrderType, PendingVerification, Table, TableAvailability, TableSession,
};

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::session::SessionContext;

pub struct TablesideClient {
    http: reqwest::Client,
    base_url: Url,
    config: ClientConfig,
    token: Option<String>,
    session: RwLock<Option<SessionContext>>,
}

impl std::fmt::Debug for TablesideClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TablesideClient")
            .field("base_url", &self.base_url.as_str())
            .field("has_token", &self.token.is_some())
            .field("session", &self.session())
            .finish()
    }
}

impl TablesideClient {
    pub fn new(config: ClientConfig) -> ClientResult<Self> {
        config.validate()?;
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| ClientError::Config(format!("base_url: {e}")))?;
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;

        Ok(TablesideClient {
            http,
            base_url,
            config,
            token: None,
            session: RwLock::new(None),
        })
    }

    /// Staff bearer token, for pipeline, board, payment and table admin calls.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn set_token(&mut self, token: Option<String>) {
        self.token = token;
    }

    // =========================================================================
    // Session Context
    // =========================================================================

    pub fn session(&self) -> Option<SessionContext> {
        self.session
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn set_session(&self, context: SessionContext) {
        *self.session.write().unwrap_or_else(|e| e.into_inner()) = Some(context);
    }

    pub fn clear_session(&self) {
        *self.session.write().unwrap_or_else(|e| e.into_inner()) = None;
    }

    fn require_session(&self) -> ClientResult<SessionContext> {
        self.session().ok_or(ClientError::SessionLost)
    }

    /// Maps the server's "session is gone" answer to `SessionLost`.
    fn in_session<T>(&self, result: ClientResult<T>) -> ClientResult<T> {
        match result {
            Err(e) if e.code() == Some("INVALID_SESSION") => {
                warn!("Server no longer recognizes the table session");
                self.clear_session();
                Err(ClientError::SessionLost)
            }
            other => other,
        }
    }

    // =========================================================================
    // Tables and Sessions
    // =========================================================================

    pub async fn check_table_status(&self, org: &str, table: &str) -> ClientResult<TableAvailability> {
        let url = self.url(&["api", "orgs", org, "tables", table, "status"])?;
        self.with_retry("check_table_status", || self.send(self.request(Method::GET, url.clone())))
            .await
    }

    /// Reserves the table and makes the new session current. Never retried:
    /// a lost response would turn a success into a conflict.
    pub async fn reserve(
        &self,
        org: &str,
        table: &str,
        reserved_source: Option<&str>,
    ) -> ClientResult<TableSession> {
        let url = self.url(&["api", "orgs", org, "tables", table, "reserve"])?;
        let body = ReserveRequest {
            reserved_source: reserved_source.map(str::to_string),
        };
        let session: TableSession = self
            .send(self.request(Method::POST, url).json(&body))
            .await?;

        self.set_session(SessionContext::new(
            &session.organization_id,
            &session.session_id,
            &session.table_number,
        ));
        Ok(session)
    }

    /// Joins an existing session (shared QR or link) after checking it is live.
    pub async fn join(&self, org: &str, session_id: &str, table: &str) -> ClientResult<SessionContext> {
        let url = self.url(&["api", "orgs", org, "sessions", session_id, "validate"])?;
        let answer: ValidateSessionResponse = self
            .with_retry("validate_session", || self.send(self.request(Method::GET, url.clone())))
            .await?;

        if !answer.valid {
            self.clear_session();
            return Err(ClientError::SessionLost);
        }
        let context = SessionContext::new(org, session_id, table);
        self.set_session(context.clone());
        Ok(context)
    }

    pub async fn release_table(&self, org: &str, table: &str) -> ClientResult<ReleaseResponse> {
        let url = self.url(&["api", "orgs", org, "tables", table, "release"])?;
        self.send(self.request(Method::POST, url)).await
    }

    pub async fn mark_cleaning(&self, org: &str, table: &str) -> ClientResult<Table> {
        let url = self.url(&["api", "orgs", org, "tables", table, "cleaning"])?;
        self.send(self.request(Method::POST, url)).await
    }

    pub async fn mark_cleaned(&self, org: &str, table: &str) -> ClientResult<Table> {
        let url = self.url(&["api", "orgs", org, "tables", table, "cleaned"])?;
        self.send(self.request(Method::POST, url)).await
    }

    pub async fn update_occupant(
        &self,
        customer_id: Option<&str>,
        reserved_source: Option<&str>,
    ) -> ClientResult<TableSession> {
        let ctx = self.require_session()?;
        let url = self.session_url(&ctx, "occupant")?;
        let body = OccupantRequest {
            customer_id: customer_id.map(str::to_string),
            reserved_source: reserved_source.map(str::to_string),
        };
        let result = self.send(self.request(Method::PUT, url).json(&body)).await;
        self.in_session(result)
    }

    // =========================================================================
    // Identity
    // =========================================================================

    pub async fn create_guest(&self) -> ClientResult<TableSession> {
        let ctx = self.require_session()?;
        let url = self.session_url(&ctx, "guest")?;
        let result = self.send(self.request(Method::POST, url)).await;
        self.in_session(result)
    }

    /// Starts sign-in for the current table; a code goes to `identifier`.
    pub async fn create_customer(&self, name: &str, identifier: &str) -> ClientResult<PendingVerification> {
        let ctx = self.require_session()?;
        let url = self.url(&["api", "orgs", ctx.org_id.as_str(), "customers"])?;
        let body = CreateCustomerRequest {
            name: name.to_string(),
            identifier: identifier.to_string(),
            table_number: ctx.table_number.clone(),
        };
        let result = self.send(self.request(Method::POST, url).json(&body)).await;
        self.in_session(result)
    }

    pub async fn verify_otp(&self, identifier: &str, otp: &str) -> ClientResult<Customer> {
        let url = self.url(&["api", "customers", "verify"])?;
        let body = VerifyOtpRequest {
            identifier: identifier.to_string(),
            otp: otp.to_string(),
        };
        let result = self.send(self.request(Method::POST, url).json(&body)).await;
        self.in_session(result)
    }

    pub async fn resend_otp(&self, identifier: &str) -> ClientResult<PendingVerification> {
        let url = self.url(&["api", "customers", "resend"])?;
        let body = ResendOtpRequest {
            identifier: identifier.to_string(),
        };
        self.send(self.request(Method::POST, url).json(&body)).await
    }

    // =========================================================================
    // Cart
    // =========================================================================

    pub async fn get_cart(&self) -> ClientResult<Cart> {
        let ctx = self.require_session()?;
        let url = self.cart_url(&ctx, None)?;
        let result = self
            .with_retry("get_cart", || self.send(self.request(Method::GET, url.clone())))
            .await;
        self.in_session(result)
    }

    pub async fn add_to_cart(&self, request: &AddToCart) -> ClientResult<CartItem> {
        let ctx = self.require_session()?;
        let url = self.cart_url(&ctx, None)?;
        let result = self.send(self.request(Method::POST, url).json(request)).await;
        self.in_session(result)
    }

    pub async fn change_quantity(&self, cart_item_id: &str, quantity: i64) -> ClientResult<CartItem> {
        let ctx = self.require_session()?;
        let url = self.cart_url(&ctx, Some(cart_item_id))?;
        let body = ChangeQuantityRequest { quantity };
        let result = self.send(self.request(Method::PATCH, url).json(&body)).await;
        self.in_session(result)
    }

    pub async fn remove_cart_item(&self, cart_item_id: &str) -> ClientResult<()> {
        let ctx = self.require_session()?;
        let url = self.cart_url(&ctx, Some(cart_item_id))?;
        let result = self.send_empty(self.request(Method::DELETE, url)).await;
        self.in_session(result)
    }

    pub async fn clear_cart(&self) -> ClientResult<()> {
        let ctx = self.require_session()?;
        let url = self.cart_url(&ctx, None)?;
        let result = self.send_empty(self.request(Method::DELETE, url)).await;
        self.in_session(result)
    }

    // =========================================================================
    // Orders
    // =========================================================================

    /// Places an order from the cart. Retried only when `idempotency_key` is
    /// given, since the server then returns the same order for a repeat.
    pub async fn checkout(
        &self,
        order_type: OrderType,
        idempotency_key: Option<&str>,
    ) -> ClientResult<Order> {
        let ctx = self.require_session()?;
        let url = self.session_url(&ctx, "checkout")?;
        let body = CheckoutRequest {
            table_number: ctx.table_number.clone(),
            order_type,
        };

        let attempt = || {
            let mut req = self.request(Method::POST, url.clone()).json(&body);
            if let Some(key) = idempotency_key {
                req = req.header(IDEMPOTENCY_KEY_HEADER, key);
            }
            self.send(req)
        };

        let result = match idempotency_key {
            Some(_) => self.with_retry("checkout", attempt).await,
            None => attempt().await,
        };
        self.in_session(result)
    }

    pub async fn orders(&self) -> ClientResult<Vec<Order>> {
        let ctx = self.require_session()?;
        let url = self.session_url(&ctx, "orders")?;
        self.with_retry("orders", || self.send(self.request(Method::GET, url.clone())))
            .await
    }

    // =========================================================================
    // Staff
    // =========================================================================

    pub async fn update_item_status(
        &self,
        org: &str,
        order_item_id: &str,
        status: ItemStatus,
        expected: Option<ItemStatus>,
    ) -> ClientResult<OrderItem> {
        let url = self.url(&["api", "orgs", org, "order-items", order_item_id, "status"])?;
        let body = UpdateStatusRequest { status, expected };
        self.send(self.request(Method::PATCH, url).json(&body)).await
    }

    pub async fn board(&self, org: &str, group: BoardGroup) -> ClientResult<Vec<BoardEntry>> {
        let name = match group {
            BoardGroup::New => "new",
            BoardGroup::Ongoing => "ongoing",
            BoardGroup::Completed => "completed",
        };
        let url = self.url(&["api", "orgs", org, "boards", name])?;
        self.with_retry("board", || self.send(self.request(Method::GET, url.clone())))
            .await
    }

    pub async fn complete_payment(&self, org: &str, order_id: &str) -> ClientResult<Order> {
        let url = self.url(&["api", "orgs", org, "orders", order_id, "payment"])?;
        self.send(self.request(Method::POST, url)).await
    }

    // =========================================================================
    // Plumbing
    // =========================================================================

    fn url(&self, segments: &[&str]) -> ClientResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ClientError::Config("base_url cannot carry a path".into()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn session_url(&self, ctx: &SessionContext, tail: &str) -> ClientResult<Url> {
        self.url(&["api", "orgs", ctx.org_id.as_str(), "sessions", ctx.session_id.as_str(), tail])
    }

    fn cart_url(&self, ctx: &SessionContext, item: Option<&str>) -> ClientResult<Url> {
        let mut url = self.session_url(ctx, "cart")?;
        if let Some(item) = item {
            url = self.url_under(url, item)?;
        }
        Ok(url)
    }

    fn url_under(&self, mut url: Url, segment: &str) -> ClientResult<Url> {
        url.path_segments_mut()
            .map_err(|_| ClientError::Config("base_url cannot carry a path".into()))?
            .push(segment);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let req = self.http.request(method, url);
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn send<T: DeserializeOwned>(&self, req: RequestBuilder) -> ClientResult<T> {
        let response = req.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::from_response(status, &body));
        }
        response
            .json()
            .await
            .map_err(|e| ClientError::InvalidResponse(e.to_string()))
    }

    async fn send_empty(&self, req: RequestBuilder) -> ClientResult<()> {
        let response = req.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::from_response(status, &body));
        }
        Ok(())
    }

    /// Runs `op` until it succeeds, fails with a non-retryable error, or the
    /// retry budget is spent.
    async fn with_retry<T, F, Fut>(&self, what: &str, mut op: F) -> ClientResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ClientResult<T>>,
    {
        let mut backoff = self.config.backoff();
        let mut retries = 0;

        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && retries < self.config.max_retries => {
                    let Some(delay) = backoff.next_backoff() else {
                        return Err(e);
                    };
                    retries += 1;
                    debug!(call = what, attempt = retries, ?delay, error = %e, "Retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use axum::extract::State;
    use axum::http::{HeaderMap, StatusCode};
    use axum::response::IntoResponse;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::json;

    #[derive(Clone, Default)]
    struct Hits {
        count: Arc<AtomicUsize>,
        keys: Arc<std::sync::Mutex<Vec<String>>>,
    }

    impl Hits {
        fn bump(&self) -> usize {
            self.count.fetch_add(1, Ordering::SeqCst) + 1
        }

        fn get(&self) -> usize {
            self.count.load(Ordering::SeqCst)
        }
    }

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });
        format!("http://{addr}")
    }

    fn client(base_url: String) -> TablesideClient {
        TablesideClient::new(ClientConfig {
            base_url,
            timeout: Duration::from_secs(5),
            max_retries: 2,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
        })
        .unwrap()
    }

    fn unavailable() -> impl IntoResponse {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"code": "UPSTREAM_ERROR", "message": "try again"})),
        )
    }

    async fn flaky_status(State(hits): State<Hits>) -> axum::response::Response {
        if hits.bump() <= 2 {
            return unavailable().into_response();
        }
        Json(json!({"tableNumber": "T1", "status": "AVAILABLE", "available": true})).into_response()
    }

    async fn always_down(State(hits): State<Hits>, headers: HeaderMap) -> axum::response::Response {
        hits.bump();
        if let Some(key) = headers.get(IDEMPOTENCY_KEY_HEADER) {
            hits.keys
                .lock()
                .unwrap()
                .push(key.to_str().unwrap().to_string());
        }
        unavailable().into_response()
    }

    async fn conflict(State(hits): State<Hits>) -> axum::response::Response {
        hits.bump();
        (
            StatusCode::CONFLICT,
            Json(json!({"code": "CONFLICT", "message": "Table T1 is RESERVED"})),
        )
            .into_response()
    }

    async fn session_gone(State(hits): State<Hits>) -> axum::response::Response {
        hits.bump();
        (
            StatusCode::CONFLICT,
            Json(json!({"code": "INVALID_SESSION", "message": "Session is not active: s1"})),
        )
            .into_response()
    }

    #[tokio::test]
    async fn test_reads_retry_through_server_errors() {
        let hits = Hits::default();
        let router = Router::new()
            .route("/api/orgs/{org}/tables/{table}/status", get(flaky_status))
            .with_state(hits.clone());
        let client = client(serve(router).await);

        let status = client.check_table_status("o1", "T1").await.unwrap();
        assert!(status.is_available());
        assert_eq!(hits.get(), 3);
    }

    #[tokio::test]
    async fn test_retry_budget_is_bounded() {
        let hits = Hits::default();
        let router = Router::new()
            .route("/api/orgs/{org}/boards/{group}", get(always_down))
            .with_state(hits.clone());
        let client = client(serve(router).await);

        let err = client.board("o1", BoardGroup::New).await.unwrap_err();
        assert_eq!(err.status(), Some(503));
        assert_eq!(hits.get(), 3);
    }

    #[tokio::test]
    async fn test_reserve_is_never_retried() {
        let hits = Hits::default();
        let router = Router::new()
            .route("/api/orgs/{org}/tables/{table}/reserve", post(always_down))
            .with_state(hits.clone());
        let client = client(serve(router).await);

        assert!(client.reserve("o1", "T1", None).await.is_err());
        assert_eq!(hits.get(), 1);
        assert!(client.session().is_none());
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        let hits = Hits::default();
        let router = Router::new()
            .route("/api/orgs/{org}/tables/{table}/status", get(conflict))
            .with_state(hits.clone());
        let client = client(serve(router).await);

        let err = client.check_table_status("o1", "T1").await.unwrap_err();
        assert_eq!(err.code(), Some("CONFLICT"));
        assert_eq!(hits.get(), 1);
    }

    #[tokio::test]
    async fn test_checkout_retries_only_with_key() {
        let hits = Hits::default();
        let router = Router::new()
            .route("/api/orgs/{org}/sessions/{sid}/checkout", post(always_down))
            .with_state(hits.clone());
        let client = client(serve(router).await);
        client.set_session(SessionContext::new("o1", "s1", "T1"));

        assert!(client.checkout(OrderType::DineIn, None).await.is_err());
        assert_eq!(hits.get(), 1);

        assert!(client.checkout(OrderType::DineIn, Some("k-1")).await.is_err());
        assert_eq!(hits.get(), 4);
        assert_eq!(*hits.keys.lock().unwrap(), vec!["k-1", "k-1", "k-1"]);
    }

    #[tokio::test]
    async fn test_session_lost() {
        let hits = Hits::default();
        let router = Router::new()
            .route("/api/orgs/{org}/sessions/{sid}/cart", get(session_gone))
            .with_state(hits.clone());
        let client = client(serve(router).await);

        // no context: nothing is sent
        assert!(matches!(client.get_cart().await, Err(ClientError::SessionLost)));
        assert_eq!(hits.get(), 0);

        client.set_session(SessionContext::new("o1", "s1", "T1"));
        assert!(matches!(client.get_cart().await, Err(ClientError::SessionLost)));
        assert_eq!(hits.get(), 1);
        assert!(client.session().is_none());
    }

    #[test]
    fn test_urls_are_escaped() {
        let client = client("http://localhost:8080/".into());
        let url = client.url(&["api", "orgs", "a b", "tables", "T/1", "status"]).unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:8080/api/orgs/a%20b/tables/T%2F1/status"
        );
    }
}
