//! End-to-end visits through the engine: reserve, identify, order, cook,
//! serve, pay.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use futures::future::join_all;

use tableside_core::error::ErrorKind;
use tableside_core::{
    AddToCart, Addon, AddonRequest, CoreError, CustomizationGroup, CustomizationOption,
    ItemStatus, ManualClock, MenuItemVariant, OccupantKind, OrderType, SelectionType, StaffRole,
    TableStatus,
};
use tableside_db::Database;
use tableside_engine::{Engine, EngineConfig, RecordingDispatcher};

const O1: &str = "O1";

struct Fixture {
    engine: Engine,
    clock: Arc<ManualClock>,
    otp: Arc<RecordingDispatcher>,
}

async fn fixture() -> Fixture {
    fixture_with(EngineConfig::in_memory()).await
}

async fn fixture_with(config: EngineConfig) -> Fixture {
    let db = Database::new(config.db_config()).await.unwrap();

    let catalog = db.catalog();
    catalog
        .upsert_variant(&MenuItemVariant {
            variant_id: "V1".into(),
            organization_id: O1.into(),
            menu_item_id: "M1".into(),
            menu_item_name: "Plain Dosa".into(),
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
            organization_id: O1.into(),
            menu_item_id: "M1".into(),
            name: "Podi".into(),
            additional_charge_cents: 20,
            max_quantity: 3,
            is_default: false,
            is_available: true,
        })
        .await
        .unwrap();
    catalog
        .upsert_group(&CustomizationGroup {
            group_id: "G1".into(),
            organization_id: O1.into(),
            menu_item_id: "M1".into(),
            name: "Add-ons".into(),
            selection_type: SelectionType::Multiple,
            is_required: false,
            options: vec![
                CustomizationOption {
                    option_id: "OPT1".into(),
                    group_id: "G1".into(),
                    name: "Onion".into(),
                    additional_charge_cents: 7,
                },
                CustomizationOption {
                    option_id: "OPT2".into(),
                    group_id: "G1".into(),
                    name: "Cheese".into(),
                    additional_charge_cents: 13,
                },
            ],
        })
        .await
        .unwrap();

    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2026, 5, 1, 19, 30, 0).unwrap(),
    ));
    let otp = Arc::new(RecordingDispatcher::new());
    let engine = Engine::builder(db, config)
        .clock(clock.clone())
        .dispatcher(otp.clone())
        .build();

    engine
        .reservations()
        .register_table(O1, "T1", 4, Some("Main"))
        .await
        .unwrap();

    Fixture { engine, clock, otp }
}

fn dosa(quantity: i64, podi: i64, options: &[&str]) -> AddToCart {
    AddToCart {
        variant_id: "V1".into(),
        quantity,
        addons: if podi > 0 {
            vec![AddonRequest {
                addon_id: "A1".into(),
                quantity: podi,
            }]
        } else {
            vec![]
        },
        customizations: options.iter().map(|o| o.to_string()).collect(),
        special_instructions: None,
    }
}

#[tokio::test]
async fn reserve_add_checkout_totals_240() {
    let f = fixture().await;
    let session = f.engine.reservations().reserve(O1, "T1", Some("QR")).await.unwrap();
    let sid = &session.session_id;

    f.engine.carts().add(O1, sid, &dosa(2, 1, &[])).await.unwrap();
    let cart = f.engine.carts().get(O1, sid).await.unwrap();
    assert_eq!(cart.grand_total_cents, 240);

    let order = f
        .engine
        .checkout()
        .checkout(O1, sid, "T1", OrderType::DineIn, None)
        .await
        .unwrap();
    assert_eq!(order.items[0].total_price_cents, 240);
    assert_eq!(order.order_reference, "TT1-20260501-0001");
    assert!(f.engine.carts().get(O1, sid).await.unwrap().items.is_empty());
}

#[tokio::test]
async fn grand_total_is_sum_of_lines_for_any_combination() {
    let f = fixture().await;
    let sid = f
        .engine
        .reservations()
        .reserve(O1, "T1", None)
        .await
        .unwrap()
        .session_id;

    let combos: [(i64, i64, &[&str]); 6] = [
        (1, 0, &[]),
        (3, 1, &[]),
        (2, 2, &["OPT1"]),
        (1, 3, &["OPT1", "OPT2"]),
        (5, 0, &["OPT2", "OPT2"]),
        (4, 1, &["OPT2", "OPT1"]),
    ];
    for (qty, podi, options) in combos {
        let mut request = dosa(qty, podi, options);
        // distinct instructions keep every combination on its own line
        request.special_instructions = Some(format!("combo {qty}-{podi}-{}", options.len()));
        let item = f.engine.carts().add(O1, &sid, &request).await.unwrap();

        let option_total: i64 = options
            .iter()
            .collect::<std::collections::BTreeSet<_>>()
            .into_iter()
            .map(|o| if *o == "OPT1" { 7 } else { 13 })
            .sum();
        let unit = 100 + 20 * podi + option_total;
        assert_eq!(item.unit_price_cents, unit);
        assert_eq!(item.line_total_cents, unit * qty);
    }

    let cart = f.engine.carts().get(O1, &sid).await.unwrap();
    let sum: i64 = cart.items.iter().map(|i| i.line_total_cents).sum();
    assert_eq!(cart.grand_total_cents, sum);

    let order = f
        .engine
        .checkout()
        .checkout(O1, &sid, "T1", OrderType::DineIn, None)
        .await
        .unwrap();
    let item_sum: i64 = order.items.iter().map(|i| i.total_price_cents).sum();
    assert_eq!(item_sum, sum);
    assert_eq!(order.total_cents, sum);
}

#[tokio::test]
async fn concurrent_reserves_yield_one_session() {
    let f = fixture().await;
    let attempts = (0..8).map(|_| {
        let engine = f.engine.clone();
        async move { engine.reservations().reserve(O1, "T1", Some("QR")).await }
    });
    let results = join_all(attempts).await;

    let won = results.iter().filter(|r| r.is_ok()).count();
    let conflicts = results
        .iter()
        .filter(|r| matches!(r, Err(e) if e.kind() == ErrorKind::Conflict))
        .count();
    assert_eq!(won, 1);
    assert_eq!(conflicts, 7);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn two_spawned_reserves_one_conflict() {
    let f = fixture().await;
    let a = tokio::spawn({
        let engine = f.engine.clone();
        async move { engine.reservations().reserve(O1, "T1", None).await }
    });
    let b = tokio::spawn({
        let engine = f.engine.clone();
        async move { engine.reservations().reserve(O1, "T1", None).await }
    });
    let (a, b) = (a.await.unwrap(), b.await.unwrap());

    assert!(a.is_ok() != b.is_ok());
    let err = a.err().or(b.err()).unwrap();
    assert!(matches!(err.as_core(), Some(CoreError::TableUnavailable { .. })));
}

/// A database file under the temp dir, removed with its WAL files on drop.
struct TempDb(PathBuf);

impl TempDb {
    fn new(name: &str) -> Self {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        TempDb(std::env::temp_dir().join(format!("tableside-{name}-{}-{nanos}.db", std::process::id())))
    }
}

impl Drop for TempDb {
    fn drop(&mut self) {
        for suffix in ["", "-wal", "-shm"] {
            let mut path = self.0.clone().into_os_string();
            path.push(suffix);
            let _ = std::fs::remove_file(path);
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn pooled_file_database_admits_one_reserve() {
    let file = TempDb::new("reserve-race");
    let mut config = EngineConfig::default();
    config.database.path = Some(file.0.clone());
    config.database.max_connections = 8;
    let f = fixture_with(config).await;

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let engine = f.engine.clone();
            tokio::spawn(async move { engine.reservations().reserve(O1, "T1", None).await })
        })
        .collect();

    let mut won = Vec::new();
    let mut conflicts = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(session) => won.push(session),
            Err(e) if e.kind() == ErrorKind::Conflict => conflicts += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!(won.len(), 1);
    assert_eq!(conflicts, 15);

    let active = f.engine.reservations().active_session(O1, "T1").await.unwrap().unwrap();
    assert_eq!(active.session_id, won[0].session_id);
    f.engine.db().close().await;
}

#[tokio::test]
async fn otp_expires_after_sixty_seconds() {
    let f = fixture().await;
    let session = f.engine.reservations().reserve(O1, "T1", None).await.unwrap();
    f.engine
        .identity()
        .create_customer("Meera", "meera@example.com", O1, "T1")
        .await
        .unwrap();
    let code = f.otp.last_code("meera@example.com").unwrap();

    f.clock.advance(Duration::seconds(60));
    let err = f.engine.identity().verify("meera@example.com", &code).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Expired);

    // a fresh code works and binds the customer to the session
    f.engine.identity().resend("meera@example.com").await.unwrap();
    let code = f.otp.last_code("meera@example.com").unwrap();
    let customer = f.engine.identity().verify("meera@example.com", &code).await.unwrap();

    let session = f
        .engine
        .reservations()
        .get_session(O1, &session.session_id)
        .await
        .unwrap();
    assert_eq!(session.occupant_kind, OccupantKind::Customer);
    assert_eq!(session.customer_id, Some(customer.customer_id));
}

#[tokio::test]
async fn waiter_serves_then_kitchen_cannot_reopen() {
    let f = fixture().await;
    let sid = f
        .engine
        .reservations()
        .reserve(O1, "T1", None)
        .await
        .unwrap()
        .session_id;
    f.engine.carts().add(O1, &sid, &dosa(1, 0, &[])).await.unwrap();
    let order = f
        .engine
        .checkout()
        .checkout(O1, &sid, "T1", OrderType::DineIn, None)
        .await
        .unwrap();
    let item = &order.items[0].order_item_id;

    let pipeline = f.engine.pipeline();
    for status in [ItemStatus::Accepted, ItemStatus::Preparing, ItemStatus::ReadyToServe] {
        pipeline
            .update_status(O1, item, status, StaffRole::Kitchen, None)
            .await
            .unwrap();
    }
    pipeline
        .update_status(O1, item, ItemStatus::Served, StaffRole::Waiter, None)
        .await
        .unwrap();

    let err = pipeline
        .update_status(O1, item, ItemStatus::Preparing, StaffRole::Kitchen, None)
        .await
        .unwrap_err();
    assert!(matches!(err.as_core(), Some(CoreError::IllegalTransition { .. })));

    let orders = f.engine.checkout().get_orders_by_session(O1, &sid).await.unwrap();
    assert_eq!(orders[0].items[0].item_status, ItemStatus::Served);
}

#[tokio::test]
async fn full_visit_ends_with_free_table() {
    let f = fixture().await;
    let mut feed = f.engine.feed().subscribe(O1);
    let sid = f
        .engine
        .reservations()
        .reserve(O1, "T1", None)
        .await
        .unwrap()
        .session_id;
    f.engine.identity().create_guest(O1, &sid).await.unwrap();

    // two rounds of ordering from the same session
    let mut orders = Vec::new();
    for round in 0..2 {
        f.engine.carts().add(O1, &sid, &dosa(1 + round, 0, &[])).await.unwrap();
        let key = format!("round-{round}");
        orders.push(
            f.engine
                .checkout()
                .checkout(O1, &sid, "T1", OrderType::DineIn, Some(&key))
                .await
                .unwrap(),
        );
    }
    assert_eq!(orders[1].order_reference, "TT1-20260501-0002");

    let pipeline = f.engine.pipeline();
    for order in &orders {
        let item = &order.items[0].order_item_id;
        pipeline
            .update_status(O1, item, ItemStatus::Cancelled, StaffRole::Kitchen, None)
            .await
            .unwrap();
    }

    pipeline.complete_payment(O1, &orders[0].order_id).await.unwrap();
    // one unpaid order left: still seated
    assert_eq!(
        f.engine.reservations().check_status(O1, "T1").await.unwrap().status,
        TableStatus::Reserved
    );

    pipeline.complete_payment(O1, &orders[1].order_id).await.unwrap();
    assert!(f.engine.reservations().check_status(O1, "T1").await.unwrap().is_available());
    assert!(!f.engine.reservations().join_by_code(O1, &sid).await.unwrap());

    let mut names = Vec::new();
    while let Some(event) = feed.try_recv() {
        names.push(event.kind.name());
    }
    assert_eq!(names.first(), Some(&"TABLE_STATUS_CHANGED"));
    assert_eq!(names.last(), Some(&"TABLE_STATUS_CHANGED"));
    assert!(names.contains(&"SESSION_ENDED"));
    assert_eq!(names.iter().filter(|n| **n == "ORDER_PLACED").count(), 2);
}
