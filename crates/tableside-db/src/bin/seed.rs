//! # Seed Data Generator
//!
//! Populates a database with a demo restaurant for development.
//!
//! ## Usage
//! ```bash
//! # Seed ./tableside_dev.db for organization "demo" with 12 tables
//! cargo run -p tableside-db --bin seed
//!
//! cargo run -p tableside-db --bin seed -- --org bistro --tables 20 --db ./data/tableside.db
//! ```
//!
//! ## Generated Data
//! - Tables `T1..Tn` (capacity 2, 4 or 6; "Patio" section for every fourth)
//! - A small South Indian menu, each item with one or more variants
//! - Addons per item, a required "Spice" group and an optional "Serve With" group

use chrono::Utc;
use std::env;
use tableside_core::{
    Addon, CustomizationGroup, CustomizationOption, MenuItemVariant, SelectionType,
};
use tableside_db::{Database, DbConfig};

/// (menu item id, name, [(variant, price cents, discount bps)])
const MENU: &[(&str, &str, &[(&str, i64, u32)])] = &[
    ("dosa", "Masala Dosa", &[("Regular", 1200, 0), ("Family", 2400, 500)]),
    ("idli", "Idli", &[("2 pcs", 600, 0), ("4 pcs", 1100, 0)]),
    ("vada", "Medu Vada", &[("2 pcs", 700, 0)]),
    ("uttapam", "Onion Uttapam", &[("Regular", 1300, 1000)]),
    ("coffee", "Filter Coffee", &[("Small", 300, 0), ("Large", 450, 0)]),
];

/// (name, charge cents, max quantity)
const ADDONS: &[(&str, i64, i64)] = &[
    ("Extra Chutney", 50, 3),
    ("Extra Sambar", 80, 2),
    ("Ghee", 100, 1),
];

const SPICE_LEVELS: &[(&str, i64)] = &[("Mild", 0), ("Medium", 0), ("Hot", 0), ("Extra Hot", 25)];

const SERVE_WITH: &[(&str, i64)] = &[
    ("Coconut Chutney", 0),
    ("Tomato Chutney", 0),
    ("Podi", 40),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    let mut org = String::from("demo");
    let mut tables: usize = 12;
    let mut db_path = String::from("./tableside_dev.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--org" | "-o" => {
                if i + 1 < args.len() {
                    org = args[i + 1].clone();
                    i += 1;
                }
            }
            "--tables" | "-t" => {
                if i + 1 < args.len() {
                    tables = args[i + 1].parse().unwrap_or(12);
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Tableside Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -o, --org <ID>      Organization id (default: demo)");
                println!("  -t, --tables <N>    Number of tables (default: 12)");
                println!("  -d, --db <PATH>     Database file path (default: ./tableside_dev.db)");
                println!("  -h, --help          Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("🌱 Tableside Seed Data Generator");
    println!("================================");
    println!("Database:     {}", db_path);
    println!("Organization: {}", org);
    println!("Tables:       {}", tables);
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;
    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    let existing = db.tables().list(&org).await?;
    if !existing.is_empty() {
        println!("⚠ Organization already has {} tables", existing.len());
        println!("  Skipping seed to avoid duplicates.");
        return Ok(());
    }

    let now = Utc::now();
    for n in 1..=tables {
        let capacity = [2, 4, 6][n % 3];
        let section = (n % 4 == 0).then_some("Patio");
        db.tables()
            .insert(&org, &format!("T{n}"), capacity, section, now)
            .await?;
    }
    println!("✓ Registered {} tables", tables);

    let catalog = db.catalog();
    let mut variants = 0;
    for (item_id, item_name, item_variants) in MENU {
        let menu_item_id = format!("{org}-{item_id}");

        for (variant_name, price, discount) in item_variants.iter() {
            catalog
                .upsert_variant(&MenuItemVariant {
                    variant_id: format!("{menu_item_id}-{}", slug(variant_name)),
                    organization_id: org.clone(),
                    menu_item_id: menu_item_id.clone(),
                    menu_item_name: item_name.to_string(),
                    variant_name: variant_name.to_string(),
                    base_price_cents: *price,
                    discount_bps: *discount,
                    is_available: true,
                })
                .await?;
            variants += 1;
        }

        // Coffee has no extras
        if *item_id == "coffee" {
            continue;
        }

        for (name, charge, max) in ADDONS {
            catalog
                .upsert_addon(&Addon {
                    addon_id: format!("{menu_item_id}-{}", slug(name)),
                    organization_id: org.clone(),
                    menu_item_id: menu_item_id.clone(),
                    name: name.to_string(),
                    additional_charge_cents: *charge,
                    max_quantity: *max,
                    is_default: false,
                    is_available: true,
                })
                .await?;
        }

        catalog
            .upsert_group(&group(&org, &menu_item_id, "Spice", SelectionType::Single, true, SPICE_LEVELS))
            .await?;
        catalog
            .upsert_group(&group(
                &org,
                &menu_item_id,
                "Serve With",
                SelectionType::Multiple,
                false,
                SERVE_WITH,
            ))
            .await?;
    }
    println!("✓ Seeded {} menu items ({} variants)", MENU.len(), variants);

    println!();
    println!("✓ Seed complete!");
    Ok(())
}

fn group(
    org: &str,
    menu_item_id: &str,
    name: &str,
    selection_type: SelectionType,
    is_required: bool,
    options: &[(&str, i64)],
) -> CustomizationGroup {
    let group_id = format!("{menu_item_id}-{}", slug(name));
    CustomizationGroup {
        options: options
            .iter()
            .map(|(option, charge)| CustomizationOption {
                option_id: format!("{group_id}-{}", slug(option)),
                group_id: group_id.clone(),
                name: option.to_string(),
                additional_charge_cents: *charge,
            })
            .collect(),
        group_id,
        organization_id: org.to_string(),
        menu_item_id: menu_item_id.to_string(),
        name: name.to_string(),
        selection_type,
        is_required,
    }
}

fn slug(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect()
}
