//! # Cart Line Pricing
//!
//! Turns an "add to cart" request into a fully priced, normalized line,
//! checking every id against the menu item's catalog entries.
//!
//! ## Pricing Rule
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  unit_price = effective variant price                                  │
//! │             + Σ addon.additional_charge × addon.quantity               │
//! │             + Σ option.additional_charge                               │
//! │                                                                         │
//! │  line_total = unit_price × quantity                                    │
//! │                                                                         │
//! │  Example: variant 100, addon 20 × 1, quantity 2                        │
//! │           unit 120, line 240                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Addons and options ride along with every unit: two burgers with extra
//! cheese means two portions of cheese.
//!
//! ## Selection Policy
//! - SINGLE group: the last option supplied for the group is kept
//! - MULTIPLE group: options accumulate, duplicates collapse
//! - Required groups must end up with at least one option
//!
//! Selections are returned in catalog order so two requests for the same
//! configuration produce equal lines regardless of tap order.

use std::collections::BTreeMap;

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::types::{
    AddToCart, Addon, AddonRequest, AddonSelection, CartItem, CustomizationGroup,
    CustomizationSelection, MenuItemExtras, MenuItemVariant, SelectionType,
};
use crate::validation::{normalize_instructions, validate_quantity};

// =============================================================================
// Priced Line
// =============================================================================

/// A validated cart line that has not been stored yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricedLine {
    pub variant_id: String,
    pub menu_item_name: String,
    pub variant_name: String,
    pub quantity: i64,
    pub unit_price: Money,
    pub addons: Vec<AddonSelection>,
    pub customizations: Vec<CustomizationSelection>,
    pub special_instructions: Option<String>,
}

impl PricedLine {
    pub fn line_total(&self) -> Money {
        self.unit_price.multiply_quantity(self.quantity)
    }

    /// True when `item` is the same dish configured the same way at the same price.
    ///
    /// Such a line absorbs the new quantity instead of becoming a second row.
    pub fn same_configuration(&self, item: &CartItem) -> bool {
        self.variant_id == item.variant_id
            && self.unit_price.cents() == item.unit_price_cents
            && self.addons == item.addons
            && self.customizations == item.customizations
            && self.special_instructions == item.special_instructions
    }
}

// =============================================================================
// Entry Point
// =============================================================================

/// Validates and prices one add-to-cart request.
///
/// `extras` must be the addons and groups of `variant.menu_item_id`; any
/// id in the request that is not among them is unknown for this item.
pub fn price_line(
    variant: &MenuItemVariant,
    extras: &MenuItemExtras,
    request: &AddToCart,
    max_quantity: i64,
) -> CoreResult<PricedLine> {
    validate_quantity(request.quantity, max_quantity)?;

    if !variant.is_available {
        return Err(CoreError::Unavailable {
            what: "Menu item".to_string(),
            id: variant.variant_id.clone(),
        });
    }

    let addons = resolve_addons(&extras.addons, &request.addons)?;
    let customizations = resolve_customizations(&extras.groups, &request.customizations)?;
    let special_instructions = normalize_instructions(request.special_instructions.as_deref())?;

    Ok(PricedLine {
        variant_id: variant.variant_id.clone(),
        menu_item_name: variant.menu_item_name.clone(),
        variant_name: variant.variant_name.clone(),
        quantity: request.quantity,
        unit_price: unit_price(variant, &addons, &customizations),
        addons,
        customizations,
        special_instructions,
    })
}

/// Price of one unit of a line with the given selections.
pub fn unit_price(
    variant: &MenuItemVariant,
    addons: &[AddonSelection],
    customizations: &[CustomizationSelection],
) -> Money {
    let addon_total: Money = addons.iter().map(AddonSelection::charge).sum();
    let option_total: Money = customizations
        .iter()
        .map(|c| Money::from_cents(c.additional_charge_cents))
        .sum();

    variant.effective_price() + addon_total + option_total
}

// =============================================================================
// Addons
// =============================================================================

/// Resolves requested addons against the item's addon list.
///
/// Each entry must be within `1..=max_quantity` on its own; repeated ids are
/// then summed and checked against the limit again.
pub fn resolve_addons(
    available: &[Addon],
    requested: &[AddonRequest],
) -> CoreResult<Vec<AddonSelection>> {
    let mut quantities: BTreeMap<&str, (&Addon, i64)> = BTreeMap::new();
    for req in requested {
        let addon = available
            .iter()
            .find(|a| a.addon_id == req.addon_id)
            .ok_or_else(|| CoreError::UnknownAddon(req.addon_id.clone()))?;

        if !addon.is_available {
            return Err(CoreError::Unavailable {
                what: "Addon".to_string(),
                id: addon.addon_id.clone(),
            });
        }

        let limit = |requested: i64| CoreError::AddonLimitExceeded {
            addon: addon.name.clone(),
            requested,
            max: addon.max_quantity,
        };
        if req.quantity < 1 || req.quantity > addon.max_quantity {
            return Err(limit(req.quantity));
        }

        let (_, total) = quantities.entry(addon.addon_id.as_str()).or_insert((addon, 0));
        let summed = *total;
        *total = summed
            .checked_add(req.quantity)
            .filter(|t| *t <= addon.max_quantity)
            .ok_or_else(|| limit(summed.saturating_add(req.quantity)))?;
    }

    Ok(quantities
        .into_values()
        .map(|(addon, quantity)| AddonSelection {
            addon_id: addon.addon_id.clone(),
            name: addon.name.clone(),
            quantity,
            additional_charge_cents: addon.additional_charge_cents,
        })
        .collect())
}

// =============================================================================
// Customizations
// =============================================================================

/// Applies the SINGLE / MULTIPLE / required rules to the tapped option ids.
pub fn resolve_customizations(
    groups: &[CustomizationGroup],
    option_ids: &[String],
) -> CoreResult<Vec<CustomizationSelection>> {
    // chosen option indices per group index
    let mut chosen: Vec<Vec<usize>> = vec![Vec::new(); groups.len()];

    for option_id in option_ids {
        let (g, o) = locate_option(groups, option_id)
            .ok_or_else(|| CoreError::UnknownOption(option_id.clone()))?;

        let picks = &mut chosen[g];
        match groups[g].selection_type {
            SelectionType::Single => {
                picks.clear();
                picks.push(o);
            }
            SelectionType::Multiple => {
                if !picks.contains(&o) {
                    picks.push(o);
                }
            }
        }
    }

    let mut selections = Vec::new();
    for (group, picks) in groups.iter().zip(chosen.iter_mut()) {
        if group.is_required && picks.is_empty() {
            return Err(CoreError::MissingRequiredCustomization {
                group: group.name.clone(),
            });
        }

        picks.sort_unstable();
        for &o in picks.iter() {
            let option = &group.options[o];
            selections.push(CustomizationSelection {
                group_id: group.group_id.clone(),
                group_name: group.name.clone(),
                option_id: option.option_id.clone(),
                option_name: option.name.clone(),
                additional_charge_cents: option.additional_charge_cents,
            });
        }
    }

    Ok(selections)
}

fn locate_option(groups: &[CustomizationGroup], option_id: &str) -> Option<(usize, usize)> {
    groups.iter().enumerate().find_map(|(g, group)| {
        group
            .options
            .iter()
            .position(|o| o.option_id == option_id)
            .map(|o| (g, o))
    })
}

// =============================================================================
// Unit Tests
// =============================================================================
