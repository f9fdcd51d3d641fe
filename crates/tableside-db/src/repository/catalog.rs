//! # Catalog Repository
//!
//! Menu variants, addons and customization groups. The ordering flow only
//! reads these; the `upsert_*` calls exist for the seed binary and tests
//! (menu administration is a separate service).

use sqlx::SqlitePool;
use tracing::debug;

use tableside_core::{
    Addon, CustomizationGroup, CustomizationOption, MenuItemExtras, MenuItemVariant, SelectionType,
};

use crate::error::DbResult;

// =============================================================================
// Rows
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct VariantRow {
    variant_id: String,
    organization_id: String,
    menu_item_id: String,
    menu_item_name: String,
    variant_name: String,
    base_price_cents: i64,
    discount_bps: i64,
    is_available: bool,
}

impl From<VariantRow> for MenuItemVariant {
    fn from(row: VariantRow) -> Self {
        MenuItemVariant {
            variant_id: row.variant_id,
            organization_id: row.organization_id,
            menu_item_id: row.menu_item_id,
            menu_item_name: row.menu_item_name,
            variant_name: row.variant_name,
            base_price_cents: row.base_price_cents,
            discount_bps: u32::try_from(row.discount_bps).unwrap_or(0),
            is_available: row.is_available,
        }
    }
}

const VARIANT_COLUMNS: &str = "variant_id, organization_id, menu_item_id, menu_item_name, \
     variant_name, base_price_cents, discount_bps, is_available";

#[derive(Debug, sqlx::FromRow)]
struct AddonRow {
    addon_id: String,
    organization_id: String,
    menu_item_id: String,
    name: String,
    additional_charge_cents: i64,
    max_quantity: i64,
    is_default: bool,
    is_available: bool,
}

impl From<AddonRow> for Addon {
    fn from(row: AddonRow) -> Self {
        Addon {
            addon_id: row.addon_id,
            organization_id: row.organization_id,
            menu_item_id: row.menu_item_id,
            name: row.name,
            additional_charge_cents: row.additional_charge_cents,
            max_quantity: row.max_quantity,
            is_default: row.is_default,
            is_available: row.is_available,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct GroupRow {
    group_id: String,
    organization_id: String,
    menu_item_id: String,
    name: String,
    selection_type: SelectionType,
    is_required: bool,
}

#[derive(Debug, sqlx::FromRow)]
struct OptionRow {
    option_id: String,
    group_id: String,
    name: String,
    additional_charge_cents: i64,
}

// =============================================================================
// Repository
// =============================================================================

#[derive(Debug, Clone)]
pub struct CatalogRepository {
    pool: SqlitePool,
}

impl CatalogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        CatalogRepository { pool }
    }

    /// A variant of this organization's menu.
    pub async fn get_variant(
        &self,
        organization_id: &str,
        variant_id: &str,
    ) -> DbResult<Option<MenuItemVariant>> {
        let row: Option<VariantRow> = sqlx::query_as(&format!(
            "SELECT {VARIANT_COLUMNS} FROM menu_item_variants
             WHERE variant_id = ?1 AND organization_id = ?2"
        ))
        .bind(variant_id)
        .bind(organization_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(MenuItemVariant::from))
    }

    pub async fn list_variants(&self, organization_id: &str) -> DbResult<Vec<MenuItemVariant>> {
        let rows: Vec<VariantRow> = sqlx::query_as(&format!(
            "SELECT {VARIANT_COLUMNS} FROM menu_item_variants
             WHERE organization_id = ?1 ORDER BY menu_item_name, variant_name"
        ))
        .bind(organization_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(MenuItemVariant::from).collect())
    }

    /// Addons and customization groups (with options) of one menu item.
    pub async fn extras_for_item(
        &self,
        organization_id: &str,
        menu_item_id: &str,
    ) -> DbResult<MenuItemExtras> {
        let addons: Vec<AddonRow> = sqlx::query_as(
            r#"
            SELECT addon_id, organization_id, menu_item_id, name, additional_charge_cents,
                   max_quantity, is_default, is_available
            FROM addons
            WHERE organization_id = ?1 AND menu_item_id = ?2
            ORDER BY name
            "#,
        )
        .bind(organization_id)
        .bind(menu_item_id)
        .fetch_all(&self.pool)
        .await?;

        let groups: Vec<GroupRow> = sqlx::query_as(
            r#"
            SELECT group_id, organization_id, menu_item_id, name, selection_type, is_required
            FROM customization_groups
            WHERE organization_id = ?1 AND menu_item_id = ?2
            ORDER BY position, group_id
            "#,
        )
        .bind(organization_id)
        .bind(menu_item_id)
        .fetch_all(&self.pool)
        .await?;

        let options: Vec<OptionRow> = sqlx::query_as(
            r#"
            SELECT o.option_id, o.group_id, o.name, o.additional_charge_cents
            FROM customization_options o
            JOIN customization_groups g ON g.group_id = o.group_id
            WHERE g.organization_id = ?1 AND g.menu_item_id = ?2
            ORDER BY o.position, o.option_id
            "#,
        )
        .bind(organization_id)
        .bind(menu_item_id)
        .fetch_all(&self.pool)
        .await?;

        let groups = groups
            .into_iter()
            .map(|g| CustomizationGroup {
                options: options
                    .iter()
                    .filter(|o| o.group_id == g.group_id)
                    .map(|o| CustomizationOption {
                        option_id: o.option_id.clone(),
                        group_id: o.group_id.clone(),
                        name: o.name.clone(),
                        additional_charge_cents: o.additional_charge_cents,
                    })
                    .collect(),
                group_id: g.group_id,
                organization_id: g.organization_id,
                menu_item_id: g.menu_item_id,
                name: g.name,
                selection_type: g.selection_type,
                is_required: g.is_required,
            })
            .collect();

        Ok(MenuItemExtras {
            addons: addons.into_iter().map(Addon::from).collect(),
            groups,
        })
    }

    pub async fn upsert_variant(&self, variant: &MenuItemVariant) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO menu_item_variants
                (variant_id, organization_id, menu_item_id, menu_item_name, variant_name,
                 base_price_cents, discount_bps, is_available)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(variant_id) DO UPDATE SET
                menu_item_name   = excluded.menu_item_name,
                variant_name     = excluded.variant_name,
                base_price_cents = excluded.base_price_cents,
                discount_bps     = excluded.discount_bps,
                is_available     = excluded.is_available
            "#,
        )
        .bind(&variant.variant_id)
        .bind(&variant.organization_id)
        .bind(&variant.menu_item_id)
        .bind(&variant.menu_item_name)
        .bind(&variant.variant_name)
        .bind(variant.base_price_cents)
        .bind(i64::from(variant.discount_bps))
        .bind(variant.is_available)
        .execute(&self.pool)
        .await?;

        debug!(variant_id = %variant.variant_id, "Variant upserted");
        Ok(())
    }

    pub async fn upsert_addon(&self, addon: &Addon) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO addons
                (addon_id, organization_id, menu_item_id, name, additional_charge_cents,
                 max_quantity, is_default, is_available)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(addon_id) DO UPDATE SET
                name                    = excluded.name,
                additional_charge_cents = excluded.additional_charge_cents,
                max_quantity            = excluded.max_quantity,
                is_default              = excluded.is_default,
                is_available            = excluded.is_available
            "#,
        )
        .bind(&addon.addon_id)
        .bind(&addon.organization_id)
        .bind(&addon.menu_item_id)
        .bind(&addon.name)
        .bind(addon.additional_charge_cents)
        .bind(addon.max_quantity)
        .bind(addon.is_default)
        .bind(addon.is_available)
        .execute(&self.pool)
        .await?;

        debug!(addon_id = %addon.addon_id, "Addon upserted");
        Ok(())
    }

    /// Replaces a group and its options. Option order follows the vector.
    pub async fn upsert_group(&self, group: &CustomizationGroup) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO customization_groups
                (group_id, organization_id, menu_item_id, name, selection_type, is_required, position)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6,
                    (SELECT COUNT(*) FROM customization_groups
                      WHERE organization_id = ?2 AND menu_item_id = ?3))
            ON CONFLICT(group_id) DO UPDATE SET
                name           = excluded.name,
                selection_type = excluded.selection_type,
                is_required    = excluded.is_required
            "#,
        )
        .bind(&group.group_id)
        .bind(&group.organization_id)
        .bind(&group.menu_item_id)
        .bind(&group.name)
        .bind(group.selection_type)
        .bind(group.is_required)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM customization_options WHERE group_id = ?1")
            .bind(&group.group_id)
            .execute(&mut *tx)
            .await?;

        for (index, option) in group.options.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO customization_options
                    (option_id, group_id, name, additional_charge_cents, position)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
            )
            .bind(&option.option_id)
            .bind(&group.group_id)
            .bind(&option.name)
            .bind(option.additional_charge_cents)
            .bind(index as i64)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        debug!(group_id = %group.group_id, options = group.options.len(), "Customization group upserted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::repository::test_support::{seeded, ORG};

    #[tokio::test]
    async fn test_variant_is_org_scoped() {
        let db = seeded().await;
        let catalog = db.catalog();

        let variant = catalog.get_variant(ORG, "V1").await.unwrap().unwrap();
        assert_eq!(variant.effective_price().cents(), 100);
        assert!(catalog.get_variant("other-org", "V1").await.unwrap().is_none());
        assert_eq!(catalog.list_variants(ORG).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_extras_keep_option_order() {
        let db = seeded().await;
        let extras = db.catalog().extras_for_item(ORG, "M1").await.unwrap();

        assert_eq!(extras.addons.len(), 1);
        assert_eq!(extras.addons[0].max_quantity, 2);
        assert_eq!(extras.groups.len(), 1);
        let names: Vec<&str> = extras.groups[0].options.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, vec!["Mild", "Hot"]);

        let none = db.catalog().extras_for_item(ORG, "M404").await.unwrap();
        assert!(none.addons.is_empty() && none.groups.is_empty());
    }

    #[tokio::test]
    async fn test_upsert_group_replaces_options() {
        let db = seeded().await;
        let catalog = db.catalog();
        let mut group = catalog.extras_for_item(ORG, "M1").await.unwrap().groups.remove(0);
        group.options.truncate(1);
        group.is_required = true;
        catalog.upsert_group(&group).await.unwrap();

        let reread = catalog.extras_for_item(ORG, "M1").await.unwrap();
        assert_eq!(reread.groups[0].options.len(), 1);
        assert!(reread.groups[0].is_required);
    }
}
