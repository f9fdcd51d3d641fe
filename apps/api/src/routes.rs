//! # HTTP Routes
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  /health                                                                │
//! │  /api/orgs/{org}/tables/{table}/status|reserve|release|cleaning|cleaned │
//! │  /api/orgs/{org}/sessions/{sid}/validate|occupant|guest                 │
//! │  /api/orgs/{org}/sessions/{sid}/cart[/{item}]|checkout|orders           │
//! │  /api/orgs/{org}/customers          /api/customers/verify|resend        │
//! │  /api/orgs/{org}/order-items/{item}/status              (staff)         │
//! │  /api/orgs/{org}/boards/{group}                         (staff)         │
//! │  /api/orgs/{org}/orders/{order}/payment                 (admin)         │
//! │  /api/orgs/{org}/events                                 (SSE)           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Handlers only unpack the request, check the staff token where one is
//! required, and call the engine.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{FromRequest, Path, Request, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post, put};
use axum::{middleware, Json, Router};
use serde_json::json;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;

use tableside_core::api::{
    ChangeQuantityRequest, CheckoutRequest, CreateCustomerRequest, OccupantRequest,
    ReleaseResponse, ReserveRequest, ResendOtpRequest, UpdateStatusRequest,
    ValidateSessionResponse, VerifyOtpRequest, IDEMPOTENCY_KEY_HEADER,
};
use tableside_core::{
    AddToCart, BoardEntry, BoardGroup, Cart, CartItem, Customer, Order, OrderItem,
    PendingVerification, StaffRole, Table, TableAvailability, TableSession,
};

use crate::auth::Staff;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// JSON body whose rejections use the API error shape.
pub struct ApiJson<T>(pub T);

impl<T, S> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = axum::extract::rejection::JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(ApiJson(value))
    }
}

pub fn router(state: AppState) -> Router {
    let timeout = Duration::from_secs(state.engine.config().server.request_timeout_secs);

    let tables = Router::new()
        .route("/status", get(table_status))
        .route("/reserve", post(reserve))
        .route("/release", post(release))
        .route("/cleaning", post(mark_cleaning))
        .route("/cleaned", post(mark_cleaned));

    let sessions = Router::new()
        .route("/validate", get(validate_session))
        .route("/occupant", put(update_occupant))
        .route("/guest", post(create_guest))
        .route("/cart", get(get_cart).post(add_to_cart).delete(clear_cart))
        .route(
            "/cart/{item}",
            patch(change_quantity).delete(remove_cart_item),
        )
        .route("/checkout", post(checkout))
        .route("/orders", get(orders_by_session));

    let org = Router::new()
        .nest("/tables/{table}", tables)
        .nest("/sessions/{sid}", sessions)
        .route("/customers", post(create_customer))
        .route("/order-items/{item}/status", patch(update_item_status))
        .route("/boards/{group}", get(board))
        .route("/orders/{order}/payment", post(complete_payment))
        .route("/events", get(events));

    Router::new()
        .route("/health", get(health))
        .nest("/api/orgs/{org}", org)
        .route("/api/customers/verify", post(verify_otp))
        .route("/api/customers/resend", post(resend_otp))
        .layer(TimeoutLayer::new(timeout))
        .layer(middleware::map_response(timeout_body))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Gives the bare 408 from the timeout layer the usual error body.
async fn timeout_body(response: Response) -> Response {
    if response.status() == StatusCode::REQUEST_TIMEOUT
        && !response.headers().contains_key(CONTENT_TYPE)
    {
        return ApiError::timeout().into_response();
    }
    response
}

async fn health(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    let database = state.engine.db().health_check().await;
    let status = if database {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(json!({
            "status": if database { "ok" } else { "degraded" },
            "database": database,
        })),
    )
}

// =============================================================================
// Tables
// =============================================================================

async fn table_status(
    State(state): State<AppState>,
    Path((org, table)): Path<(String, String)>,
) -> ApiResult<Json<TableAvailability>> {
    Ok(Json(state.engine.reservations().check_status(&org, &table).await?))
}

async fn reserve(
    State(state): State<AppState>,
    Path((org, table)): Path<(String, String)>,
    ApiJson(body): ApiJson<ReserveRequest>,
) -> ApiResult<(StatusCode, Json<TableSession>)> {
    let session = state
        .engine
        .reservations()
        .reserve(&org, &table, body.reserved_source.as_deref())
        .await?;
    Ok((StatusCode::CREATED, Json(session)))
}

async fn release(
    State(state): State<AppState>,
    staff: Staff,
    Path((org, table)): Path<(String, String)>,
) -> ApiResult<Json<ReleaseResponse>> {
    staff.authorize(&org, &[StaffRole::Admin])?;
    let ended_session_id = state.engine.reservations().release(&org, &table).await?;
    Ok(Json(ReleaseResponse { ended_session_id }))
}

async fn mark_cleaning(
    State(state): State<AppState>,
    staff: Staff,
    Path((org, table)): Path<(String, String)>,
) -> ApiResult<Json<Table>> {
    staff.authorize(&org, &[StaffRole::Admin])?;
    Ok(Json(state.engine.reservations().mark_cleaning(&org, &table).await?))
}

async fn mark_cleaned(
    State(state): State<AppState>,
    staff: Staff,
    Path((org, table)): Path<(String, String)>,
) -> ApiResult<Json<Table>> {
    staff.authorize(&org, &[StaffRole::Admin])?;
    Ok(Json(state.engine.reservations().mark_cleaned(&org, &table).await?))
}

// =============================================================================
// Sessions & Identity
// =============================================================================

async fn validate_session(
    State(state): State<AppState>,
    Path((org, sid)): Path<(String, String)>,
) -> ApiResult<Json<ValidateSessionResponse>> {
    let valid = state.engine.reservations().join_by_code(&org, &sid).await?;
    Ok(Json(ValidateSessionResponse { valid }))
}

async fn update_occupant(
    State(state): State<AppState>,
    Path((org, sid)): Path<(String, String)>,
    ApiJson(body): ApiJson<OccupantRequest>,
) -> ApiResult<Json<TableSession>> {
    let session = state
        .engine
        .reservations()
        .update_customer_table_details(
            &org,
            &sid,
            body.customer_id.as_deref(),
            body.reserved_source.as_deref(),
        )
        .await?;
    Ok(Json(session))
}

async fn create_guest(
    State(state): State<AppState>,
    Path((org, sid)): Path<(String, String)>,
) -> ApiResult<Json<TableSession>> {
    Ok(Json(state.engine.identity().create_guest(&org, &sid).await?))
}

async fn create_customer(
    State(state): State<AppState>,
    Path(org): Path<String>,
    ApiJson(body): ApiJson<CreateCustomerRequest>,
) -> ApiResult<(StatusCode, Json<PendingVerification>)> {
    let pending = state
        .engine
        .identity()
        .create_customer(&body.name, &body.identifier, &org, &body.table_number)
        .await?;
    Ok((StatusCode::CREATED, Json(pending)))
}

async fn verify_otp(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<VerifyOtpRequest>,
) -> ApiResult<Json<Customer>> {
    Ok(Json(state.engine.identity().verify(&body.identifier, &body.otp).await?))
}

async fn resend_otp(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<ResendOtpRequest>,
) -> ApiResult<Json<PendingVerification>> {
    Ok(Json(state.engine.identity().resend(&body.identifier).await?))
}

// =============================================================================
// Cart & Orders
// =============================================================================

async fn get_cart(
    State(state): State<AppState>,
    Path((org, sid)): Path<(String, String)>,
) -> ApiResult<Json<Cart>> {
    Ok(Json(state.engine.carts().get(&org, &sid).await?))
}

async fn add_to_cart(
    State(state): State<AppState>,
    Path((org, sid)): Path<(String, String)>,
    ApiJson(body): ApiJson<AddToCart>,
) -> ApiResult<(StatusCode, Json<CartItem>)> {
    let item = state.engine.carts().add(&org, &sid, &body).await?;
    Ok((StatusCode::CREATED, Json(item)))
}

async fn change_quantity(
    State(state): State<AppState>,
    Path((org, sid, item)): Path<(String, String, String)>,
    ApiJson(body): ApiJson<ChangeQuantityRequest>,
) -> ApiResult<Json<CartItem>> {
    let item = state
        .engine
        .carts()
        .change_quantity(&org, &sid, &item, body.quantity)
        .await?;
    Ok(Json(item))
}

async fn remove_cart_item(
    State(state): State<AppState>,
    Path((org, sid, item)): Path<(String, String, String)>,
) -> ApiResult<StatusCode> {
    state.engine.carts().remove(&org, &sid, &item).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn clear_cart(
    State(state): State<AppState>,
    Path((org, sid)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    state.engine.carts().clear(&org, &sid).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn checkout(
    State(state): State<AppState>,
    Path((org, sid)): Path<(String, String)>,
    headers: HeaderMap,
    ApiJson(body): ApiJson<CheckoutRequest>,
) -> ApiResult<(StatusCode, Json<Order>)> {
    let key = headers
        .get(IDEMPOTENCY_KEY_HEADER)
        .map(|value| {
            value
                .to_str()
                .map_err(|_| ApiError::validation("Idempotency-Key must be printable ASCII"))
        })
        .transpose()?;

    let order = state
        .engine
        .checkout()
        .checkout(&org, &sid, &body.table_number, body.order_type, key)
        .await?;
    Ok((StatusCode::CREATED, Json(order)))
}

async fn orders_by_session(
    State(state): State<AppState>,
    Path((org, sid)): Path<(String, String)>,
) -> ApiResult<Json<Vec<Order>>> {
    Ok(Json(state.engine.checkout().get_orders_by_session(&org, &sid).await?))
}

// =============================================================================
// Staff
// =============================================================================

async fn update_item_status(
    State(state): State<AppState>,
    staff: Staff,
    Path((org, item)): Path<(String, String)>,
    ApiJson(body): ApiJson<UpdateStatusRequest>,
) -> ApiResult<Json<OrderItem>> {
    staff.authorize(&org, &[])?;
    let item = state
        .engine
        .pipeline()
        .update_status(&org, &item, body.status, staff.role(), body.expected)
        .await?;
    Ok(Json(item))
}

async fn board(
    State(state): State<AppState>,
    staff: Staff,
    Path((org, group)): Path<(String, String)>,
) -> ApiResult<Json<Vec<BoardEntry>>> {
    staff.authorize(&org, &[])?;
    let group: BoardGroup = group.parse()?;
    Ok(Json(state.engine.pipeline().board(&org, group).await?))
}

async fn complete_payment(
    State(state): State<AppState>,
    staff: Staff,
    Path((org, order)): Path<(String, String)>,
) -> ApiResult<Json<Order>> {
    staff.authorize(&org, &[StaffRole::Admin])?;
    Ok(Json(state.engine.pipeline().complete_payment(&org, &order).await?))
}

// =============================================================================
// Change Feed
// =============================================================================

async fn events(
    State(state): State<AppState>,
    Path(org): Path<String>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = BroadcastStream::new(state.engine.feed().receiver()).filter_map(move |message| {
        match message {
            Ok(change) if change.organization_id == org => {
                match Event::default().event(change.kind.name()).json_data(&change) {
                    Ok(event) => Some(Ok(event)),
                    Err(e) => {
                        warn!(error = %e, "Could not encode change event");
                        None
                    }
                }
            }
            Ok(_) => None,
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                warn!(skipped, organization_id = %org, "Event stream lagged");
                None
            }
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{header, Method, Request};
    use serde_json::Value;
    use tower::ServiceExt;

    use tableside_core::{Addon, MenuItemVariant};
    use tableside_db::Database;
    use tableside_engine::{ChangeKind, Engine, EngineConfig, RecordingDispatcher};

    use super::*;
    use crate::auth::test_tokens::{token, SECRET};

    const ORG: &str = "org-1";

    struct TestApp {
        app: Router,
        engine: Engine,
        otp: Arc<RecordingDispatcher>,
    }

    async fn test_app() -> TestApp {
        let mut config = EngineConfig::in_memory();
        config.auth.jwt_secret = SECRET.to_string();

        let db = Database::new(config.db_config()).await.unwrap();
        let catalog = db.catalog();
        catalog
            .upsert_variant(&MenuItemVariant {
                variant_id: "V1".into(),
                organization_id: ORG.into(),
                menu_item_id: "M1".into(),
                menu_item_name: "Masala Dosa".into(),
                variant_name: "Regular".into(),
                base_price_cents: 100,
                discount_bps: 0,
                is_available: true,
            })
            .await
            .unwrap();
        catalog
            .upsert_addon(&Addon {
                addon_id: "A1".into(),
                organization_id: ORG.into(),
                menu_item_id: "M1".into(),
                name: "Extra chutney".into(),
                additional_charge_cents: 20,
                max_quantity: 3,
                is_default: false,
                is_available: true,
            })
            .await
            .unwrap();

        let otp = Arc::new(RecordingDispatcher::new());
        let engine = Engine::builder(db, config).dispatcher(otp.clone()).build();
        engine
            .reservations()
            .register_table(ORG, "T1", 4, None)
            .await
            .unwrap();

        TestApp {
            app: router(AppState::new(engine.clone())),
            engine,
            otp,
        }
    }

    impl TestApp {
        async fn call(
            &self,
            method: Method,
            uri: &str,
            token: Option<&str>,
            body: Option<Value>,
        ) -> (StatusCode, Value) {
            let mut request = Request::builder().method(method).uri(uri);
            if let Some(token) = token {
                request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
            }
            let request = match body {
                Some(body) => request
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
                None => request.body(Body::empty()).unwrap(),
            };

            let response = self.app.clone().oneshot(request).await.unwrap();
            let status = response.status();
            let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
                .await
                .unwrap();
            let json = if bytes.is_empty() {
                Value::Null
            } else {
                serde_json::from_slice(&bytes).unwrap()
            };
            (status, json)
        }

        async fn reserve(&self) -> String {
            let (status, session) = self
                .call(
                    Method::POST,
                    &format!("/api/orgs/{ORG}/tables/T1/reserve"),
                    None,
                    Some(json!({ "reservedSource": "qr" })),
                )
                .await;
            assert_eq!(status, StatusCode::CREATED);
            session["sessionId"].as_str().unwrap().to_string()
        }

        async fn place_order(&self, sid: &str) -> Value {
            let (status, _) = self
                .call(
                    Method::POST,
                    &format!("/api/orgs/{ORG}/sessions/{sid}/cart"),
                    None,
                    Some(json!({ "variantId": "V1", "quantity": 2 })),
                )
                .await;
            assert_eq!(status, StatusCode::CREATED);

            let (status, order) = self
                .call(
                    Method::POST,
                    &format!("/api/orgs/{ORG}/sessions/{sid}/checkout"),
                    None,
                    Some(json!({ "tableNumber": "T1" })),
                )
                .await;
            assert_eq!(status, StatusCode::CREATED);
            order
        }

        async fn checkout_with_key(&self, sid: &str, key: &str) -> Value {
            let request = Request::builder()
                .method(Method::POST)
                .uri(format!("/api/orgs/{ORG}/sessions/{sid}/checkout"))
                .header(header::CONTENT_TYPE, "application/json")
                .header(IDEMPOTENCY_KEY_HEADER, key)
                .body(Body::from(json!({ "tableNumber": "T1" }).to_string()))
                .unwrap();
            let response = self.app.clone().oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::CREATED);
            let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
                .await
                .unwrap();
            serde_json::from_slice(&bytes).unwrap()
        }
    }

    #[tokio::test]
    async fn test_health() {
        let app = test_app().await;
        let (status, body) = app.call(Method::GET, "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["database"], true);
    }

    #[tokio::test]
    async fn test_customer_flow() {
        let app = test_app().await;
        let status_uri = format!("/api/orgs/{ORG}/tables/T1/status");

        let (_, before) = app.call(Method::GET, &status_uri, None, None).await;
        assert_eq!(before["available"], true);

        let sid = app.reserve().await;
        let (_, after) = app.call(Method::GET, &status_uri, None, None).await;
        assert_eq!(after["available"], false);

        let (status, valid) = app
            .call(Method::GET, &format!("/api/orgs/{ORG}/sessions/{sid}/validate"), None, None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(valid["valid"], true);

        let cart_uri = format!("/api/orgs/{ORG}/sessions/{sid}/cart");
        let (status, line) = app
            .call(
                Method::POST,
                &cart_uri,
                None,
                Some(json!({
                    "variantId": "V1",
                    "quantity": 2,
                    "addons": [{ "addonId": "A1", "quantity": 1 }],
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(line["lineTotalCents"], 240);

        let (_, cart) = app.call(Method::GET, &cart_uri, None, None).await;
        assert_eq!(cart["grandTotalCents"], 240);

        let (status, order) = app
            .call(
                Method::POST,
                &format!("/api/orgs/{ORG}/sessions/{sid}/checkout"),
                None,
                Some(json!({ "tableNumber": "T1" })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(order["totalCents"], 240);
        assert_eq!(order["orderType"], "DINE_IN");

        let (_, cart) = app.call(Method::GET, &cart_uri, None, None).await;
        assert_eq!(cart["items"].as_array().unwrap().len(), 0);

        let (_, orders) = app
            .call(Method::GET, &format!("/api/orgs/{ORG}/sessions/{sid}/orders"), None, None)
            .await;
        assert_eq!(orders.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_cart_line_edits() {
        let app = test_app().await;
        let sid = app.reserve().await;
        let cart_uri = format!("/api/orgs/{ORG}/sessions/{sid}/cart");

        let (_, line) = app
            .call(Method::POST, &cart_uri, None, Some(json!({ "variantId": "V1", "quantity": 1 })))
            .await;
        let item_uri = format!("{cart_uri}/{}", line["cartItemId"].as_str().unwrap());

        let (status, line) = app
            .call(Method::PATCH, &item_uri, None, Some(json!({ "quantity": 3 })))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(line["lineTotalCents"], 300);

        let (status, _) = app.call(Method::DELETE, &item_uri, None, None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, body) = app
            .call(Method::PATCH, &item_uri, None, Some(json!({ "quantity": 2 })))
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "NOT_FOUND");

        let (status, _) = app.call(Method::DELETE, &cart_uri, None, None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_error_mapping() {
        let app = test_app().await;
        let sid = app.reserve().await;

        let (status, body) = app
            .call(
                Method::POST,
                &format!("/api/orgs/{ORG}/tables/T1/reserve"),
                None,
                Some(json!({})),
            )
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["code"], "CONFLICT");

        let (status, body) = app
            .call(Method::GET, &format!("/api/orgs/{ORG}/sessions/nope/cart"), None, None)
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["code"], "INVALID_SESSION");

        let (status, body) = app
            .call(
                Method::POST,
                &format!("/api/orgs/{ORG}/sessions/{sid}/checkout"),
                None,
                Some(json!({ "tableNumber": "T1" })),
            )
            .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["code"], "EMPTY_CART");

        let cart_uri = format!("/api/orgs/{ORG}/sessions/{sid}/cart");
        let (status, body) = app
            .call(Method::POST, &cart_uri, None, Some(json!({ "variantId": "V9", "quantity": 1 })))
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "UNKNOWN_VARIANT");

        let (status, body) = app
            .call(Method::POST, &cart_uri, None, Some(json!({ "variantId": "V1", "quantity": 0 })))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "VALIDATION_ERROR");

        let (status, body) = app
            .call(Method::POST, &cart_uri, None, Some(json!({ "quantity": "two" })))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_checkout_idempotency_header() {
        let app = test_app().await;
        let sid = app.reserve().await;
        app.call(
            Method::POST,
            &format!("/api/orgs/{ORG}/sessions/{sid}/cart"),
            None,
            Some(json!({ "variantId": "V1", "quantity": 1 })),
        )
        .await;

        let first = app.checkout_with_key(&sid, "retry-1").await;
        let second = app.checkout_with_key(&sid, "retry-1").await;
        assert_eq!(first["orderId"], second["orderId"]);

        let (_, orders) = app
            .call(Method::GET, &format!("/api/orgs/{ORG}/sessions/{sid}/orders"), None, None)
            .await;
        assert_eq!(orders.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_otp_flow() {
        let app = test_app().await;
        app.reserve().await;

        let (status, pending) = app
            .call(
                Method::POST,
                &format!("/api/orgs/{ORG}/customers"),
                None,
                Some(json!({
                    "name": "Asha",
                    "identifier": "asha@example.com",
                    "tableNumber": "T1",
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert!(pending.is_object());

        let code = app.otp.last_code("asha@example.com").unwrap();
        let wrong = if code == "000000" { "111111" } else { "000000" };

        let (status, body) = app
            .call(
                Method::POST,
                "/api/customers/verify",
                None,
                Some(json!({ "identifier": "asha@example.com", "otp": wrong })),
            )
            .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["code"], "INVALID_OTP");

        let (status, customer) = app
            .call(
                Method::POST,
                "/api/customers/verify",
                None,
                Some(json!({ "identifier": "asha@example.com", "otp": code })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(customer["name"], "Asha");
    }

    #[tokio::test]
    async fn test_staff_tokens() {
        let app = test_app().await;
        let board = format!("/api/orgs/{ORG}/boards/new");

        let (status, body) = app.call(Method::GET, &board, None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "UNAUTHORIZED");

        let (status, _) = app
            .call(Method::GET, &board, Some("garbage"), None)
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let foreign = token("org-2", StaffRole::Kitchen);
        let (status, _) = app.call(Method::GET, &board, Some(&foreign), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let kitchen = token(ORG, StaffRole::Kitchen);
        let (status, entries) = app.call(Method::GET, &board, Some(&kitchen), None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(entries.as_array().unwrap().is_empty());

        let (status, body) = app
            .call(Method::GET, &format!("/api/orgs/{ORG}/boards/lunch"), Some(&kitchen), None)
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "VALIDATION_ERROR");

        let (status, _) = app
            .call(Method::POST, &format!("/api/orgs/{ORG}/tables/T1/release"), Some(&kitchen), None)
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_pipeline_and_payment() {
        let app = test_app().await;
        let sid = app.reserve().await;
        let order = app.place_order(&sid).await;
        let order_id = order["orderId"].as_str().unwrap();
        let item_uri = format!(
            "/api/orgs/{ORG}/order-items/{}/status",
            order["items"][0]["orderItemId"].as_str().unwrap()
        );

        let kitchen = token(ORG, StaffRole::Kitchen);
        let waiter = token(ORG, StaffRole::Waiter);
        let admin = token(ORG, StaffRole::Admin);
        let payment = format!("/api/orgs/{ORG}/orders/{order_id}/payment");

        let (status, _) = app.call(Method::POST, &payment, Some(&waiter), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, body) = app.call(Method::POST, &payment, Some(&admin), None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["code"], "CONFLICT");

        for next in ["ACCEPTED", "PREPARING", "READY_TO_SERVE"] {
            let (status, item) = app
                .call(Method::PATCH, &item_uri, Some(&kitchen), Some(json!({ "status": next })))
                .await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(item["itemStatus"], next);
        }

        let (status, body) = app
            .call(Method::PATCH, &item_uri, Some(&kitchen), Some(json!({ "status": "SERVED" })))
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["code"], "ILLEGAL_TRANSITION");

        let (status, _) = app
            .call(
                Method::PATCH,
                &item_uri,
                Some(&waiter),
                Some(json!({ "status": "SERVED", "expected": "READY_TO_SERVE" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);

        let (_, completed) = app
            .call(Method::GET, &format!("/api/orgs/{ORG}/boards/completed"), Some(&waiter), None)
            .await;
        assert_eq!(completed.as_array().unwrap().len(), 1);

        let (status, paid) = app.call(Method::POST, &payment, Some(&admin), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(paid["isPaymentCompleted"], true);

        let (_, table) = app
            .call(Method::GET, &format!("/api/orgs/{ORG}/tables/T1/status"), None, None)
            .await;
        assert_eq!(table["available"], true);
    }

    #[tokio::test]
    async fn test_event_stream_filters_by_org() {
        let app = test_app().await;
        let request = Request::builder()
            .uri(format!("/api/orgs/{ORG}/events"))
            .body(Body::empty())
            .unwrap();
        let response = app.app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/event-stream"
        );

        app.engine.feed().publish(
            "org-2",
            ChangeKind::CartChanged { session_id: "elsewhere".into() },
        );
        app.engine.feed().publish(
            ORG,
            ChangeKind::CartChanged { session_id: "s-1".into() },
        );

        let mut body = response.into_body().into_data_stream();
        let chunk = tokio::time::timeout(Duration::from_secs(5), body.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let text = String::from_utf8(chunk.to_vec()).unwrap();
        assert!(text.contains("event: CART_CHANGED"));
        assert!(text.contains("s-1"));
        assert!(!text.contains("elsewhere"));
    }
}
