//! Promotional pricing.
//!
//! [`evaluate`] is the single place where cart totals are computed. The cart
//! view and checkout both call it with lines priced from the live catalog, so
//! a shopper never sees a total that checkout would not charge.
//!
//! Two promotion kinds exist:
//!
//! - **Buy X get Y** ([`DiscountKind::BuyXGetY`]): for every `buy + get`
//!   units of the restricted category, the `get` cheapest units are free.
//!   Units are pooled across lines before grouping.
//! - **Free shipping** ([`DiscountKind::FreeShipping`]): shipping drops to
//!   zero once the restricted category reaches a threshold quantity.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::{DiscountId, ProductType};

/// What a discount rule does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "discount_type", rename_all = "snake_case")]
pub enum DiscountKind {
    #[serde(rename = "bxgy")]
    BuyXGetY {
        buy: u32,
        get: u32,
        restriction: ProductType,
    },
    FreeShipping {
        threshold: u32,
        restriction: ProductType,
    },
}

/// A promotion as configured by staff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscountRule {
    pub id: DiscountId,
    pub code: Option<String>,
    pub name: String,
    #[serde(flatten)]
    pub kind: DiscountKind,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub is_active: bool,
    pub is_auto_apply: bool,
}

impl DiscountRule {
    /// Whether the rule is switched on and `now` falls inside its window.
    ///
    /// Both ends of the window are inclusive.
    #[must_use]
    pub fn applies_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.start_date <= now && now <= self.end_date
    }
}

/// One cart or order line as seen by the evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PricedLine {
    pub product_type: ProductType,
    pub unit_price: Decimal,
    pub quantity: u32,
}

impl PricedLine {
    #[must_use]
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

/// Result of pricing a set of lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PricingSummary {
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub discounted_subtotal: Decimal,
    /// Base shipping fee before promotions.
    pub shipping_fee: Decimal,
    pub discounted_shipping_fee: Decimal,
    pub total: Decimal,
    /// Rules that changed the outcome, in evaluation order.
    pub applied_discounts: Vec<DiscountId>,
}

/// Price `lines` under every rule in `rules` that is live at `now`.
///
/// Rules outside their window or switched off are ignored, as are duplicate
/// rule ids (a code-attached rule may also be auto-apply). The aggregate
/// discount never exceeds the subtotal.
#[must_use]
pub fn evaluate(
    lines: &[PricedLine],
    rules: &[DiscountRule],
    now: DateTime<Utc>,
    base_shipping_fee: Decimal,
) -> PricingSummary {
    let subtotal: Decimal = lines.iter().map(PricedLine::line_total).sum();

    let mut discount = Decimal::ZERO;
    let mut shipping = base_shipping_fee;
    let mut applied = Vec::new();

    for rule in rules.iter().filter(|r| r.applies_at(now)) {
        if applied.contains(&rule.id) {
            continue;
        }
        let effective = match rule.kind {
            DiscountKind::BuyXGetY {
                buy,
                get,
                restriction,
            } => {
                let amount = buy_x_get_y(lines, buy, get, restriction);
                discount += amount;
                amount > Decimal::ZERO
            }
            DiscountKind::FreeShipping {
                threshold,
                restriction,
            } => {
                let qualifies = restricted_quantity(lines, restriction) >= u64::from(threshold);
                if qualifies {
                    shipping = Decimal::ZERO;
                }
                qualifies
            }
        };
        if effective {
            applied.push(rule.id);
        }
    }

    let discount = discount.min(subtotal);
    let discounted_subtotal = (subtotal - discount).max(Decimal::ZERO);

    PricingSummary {
        subtotal,
        discount,
        discounted_subtotal,
        shipping_fee: base_shipping_fee,
        discounted_shipping_fee: shipping,
        total: discounted_subtotal + shipping,
        applied_discounts: applied,
    }
}

fn restricted_quantity(lines: &[PricedLine], restriction: ProductType) -> u64 {
    lines
        .iter()
        .filter(|l| l.product_type == restriction)
        .map(|l| u64::from(l.quantity))
        .sum()
}

fn buy_x_get_y(lines: &[PricedLine], buy: u32, get: u32, restriction: ProductType) -> Decimal {
    let group = u64::from(buy) + u64::from(get);
    if group == 0 || get == 0 {
        return Decimal::ZERO;
    }

    let mut restricted: Vec<&PricedLine> = lines
        .iter()
        .filter(|l| l.product_type == restriction)
        .collect();
    restricted.sort_by_key(|l| l.unit_price);

    let count = restricted_quantity(lines, restriction);
    let mut free_units = ((count / group) * u64::from(get)).min(count);

    // Cheapest units first, taken a line at a time.
    let mut discount = Decimal::ZERO;
    for line in restricted {
        if free_units == 0 {
            break;
        }
        let taken = free_units.min(u64::from(line.quantity));
        discount += line.unit_price * Decimal::from(taken);
        free_units -= taken;
    }
    discount
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{Duration, TimeZone};
    use rust_decimal::dec;

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 15, 12, 0, 0).unwrap()
    }

    fn rule(id: i32, kind: DiscountKind) -> DiscountRule {
        DiscountRule {
            id: DiscountId::new(id),
            code: None,
            name: format!("rule {id}"),
            kind,
            start_date: now() - Duration::days(1),
            end_date: now() + Duration::days(1),
            is_active: true,
            is_auto_apply: true,
        }
    }

    fn bxgy(id: i32, buy: u32, get: u32) -> DiscountRule {
        rule(
            id,
            DiscountKind::BuyXGetY {
                buy,
                get,
                restriction: ProductType::Faiachun,
            },
        )
    }

    fn free_shipping(id: i32, threshold: u32) -> DiscountRule {
        rule(
            id,
            DiscountKind::FreeShipping {
                threshold,
                restriction: ProductType::Faiachun,
            },
        )
    }

    fn line(price: Decimal, quantity: u32) -> PricedLine {
        PricedLine {
            product_type: ProductType::Faiachun,
            unit_price: price,
            quantity,
        }
    }

    #[test]
    fn test_no_rules_charges_base_shipping() {
        let summary = evaluate(&[line(dec!(12.50), 2)], &[], now(), dec!(5));
        assert_eq!(summary.subtotal, dec!(25.00));
        assert_eq!(summary.discount, Decimal::ZERO);
        assert_eq!(summary.discounted_shipping_fee, dec!(5));
        assert_eq!(summary.total, dec!(30.00));
        assert!(summary.applied_discounts.is_empty());
    }

    #[test]
    fn test_buy_three_get_one_frees_cheapest_unit() {
        let lines = [line(dec!(10), 4), line(dec!(20), 1)];
        let summary = evaluate(&lines, &[bxgy(1, 3, 1)], now(), dec!(5));

        assert_eq!(summary.subtotal, dec!(60));
        assert_eq!(summary.discount, dec!(10));
        assert_eq!(summary.discounted_subtotal, dec!(50));
        assert_eq!(summary.applied_discounts, vec![DiscountId::new(1)]);
    }

    #[test]
    fn test_buy_x_get_y_pools_units_across_lines() {
        // 8 units, buy 3 get 1 -> two free, the two cheapest.
        let lines = [line(dec!(30), 3), line(dec!(5), 2), line(dec!(12), 3)];
        let summary = evaluate(&lines, &[bxgy(1, 3, 1)], now(), dec!(5));
        assert_eq!(summary.discount, dec!(10));
    }

    #[test]
    fn test_buy_x_get_y_below_group_size_gives_nothing() {
        let summary = evaluate(&[line(dec!(10), 3)], &[bxgy(1, 3, 1)], now(), dec!(5));
        assert_eq!(summary.discount, Decimal::ZERO);
        assert!(summary.applied_discounts.is_empty());
    }

    #[test]
    fn test_buy_x_get_y_ignores_other_categories() {
        let bag = PricedLine {
            product_type: ProductType::Bag,
            unit_price: dec!(1),
            quantity: 10,
        };
        let summary = evaluate(&[bag, line(dec!(10), 2)], &[bxgy(1, 1, 1)], now(), dec!(5));
        assert_eq!(summary.discount, dec!(10));
    }

    #[test]
    fn test_zero_group_size_is_inert() {
        let summary = evaluate(&[line(dec!(10), 5)], &[bxgy(1, 0, 0)], now(), dec!(5));
        assert_eq!(summary.discount, Decimal::ZERO);
    }

    #[test]
    fn test_buy_zero_get_one_frees_everything_but_caps_at_subtotal() {
        let lines = [line(dec!(10), 3)];
        let summary = evaluate(&lines, &[bxgy(1, 0, 1), bxgy(2, 0, 1)], now(), dec!(5));
        assert_eq!(summary.discount, dec!(30));
        assert_eq!(summary.discounted_subtotal, Decimal::ZERO);
        assert_eq!(summary.total, dec!(5));
    }

    #[test]
    fn test_multiple_buy_x_get_y_rules_add_up() {
        let lines = [line(dec!(10), 4)];
        let summary = evaluate(&lines, &[bxgy(1, 3, 1), bxgy(2, 1, 1)], now(), dec!(5));
        // 10 from the first rule, 20 from the second.
        assert_eq!(summary.discount, dec!(30));
        assert_eq!(summary.discounted_subtotal, dec!(10));
    }

    #[test]
    fn test_free_shipping_at_threshold() {
        let summary = evaluate(&[line(dec!(15), 4)], &[free_shipping(1, 4)], now(), dec!(5));
        assert_eq!(summary.shipping_fee, dec!(5));
        assert_eq!(summary.discounted_shipping_fee, Decimal::ZERO);
        assert_eq!(summary.total, dec!(60));
    }

    #[test]
    fn test_free_shipping_below_threshold() {
        let summary = evaluate(&[line(dec!(15), 3)], &[free_shipping(1, 4)], now(), dec!(5));
        assert_eq!(summary.discounted_shipping_fee, dec!(5));
        assert_eq!(summary.total, dec!(50));
    }

    #[test]
    fn test_free_shipping_rules_are_idempotent() {
        let rules = [free_shipping(1, 2), free_shipping(2, 4)];
        let summary = evaluate(&[line(dec!(15), 4)], &rules, now(), dec!(5));
        assert_eq!(summary.discounted_shipping_fee, Decimal::ZERO);
        assert_eq!(summary.total, dec!(60));
    }

    #[test]
    fn test_rule_window_boundaries_are_inclusive() {
        let mut starts_now = bxgy(1, 1, 1);
        starts_now.start_date = now();
        let mut ends_now = bxgy(2, 1, 1);
        ends_now.end_date = now();

        assert!(starts_now.applies_at(now()));
        assert!(ends_now.applies_at(now()));
    }

    #[test]
    fn test_rules_outside_window_or_inactive_are_skipped() {
        let mut future = bxgy(1, 1, 1);
        future.start_date = now() + Duration::seconds(1);
        let mut expired = bxgy(2, 1, 1);
        expired.end_date = now() - Duration::seconds(1);
        let mut disabled = bxgy(3, 1, 1);
        disabled.is_active = false;

        let summary = evaluate(
            &[line(dec!(10), 2)],
            &[future, expired, disabled],
            now(),
            dec!(5),
        );
        assert_eq!(summary.discount, Decimal::ZERO);
    }

    #[test]
    fn test_duplicate_rule_ids_apply_once() {
        let rule = bxgy(7, 1, 1);
        let summary = evaluate(&[line(dec!(10), 2)], &[rule.clone(), rule], now(), dec!(5));
        assert_eq!(summary.discount, dec!(10));
        assert_eq!(summary.applied_discounts, vec![DiscountId::new(7)]);
    }

    #[test]
    fn test_buy_x_get_y_splits_a_line() {
        // 7 units, buy 2 get 1 -> two free: one at 4, one of the three at 9.
        let lines = [line(dec!(9), 3), line(dec!(4), 1), line(dec!(20), 3)];
        let summary = evaluate(&lines, &[bxgy(1, 2, 1)], now(), dec!(5));
        assert_eq!(summary.discount, dec!(13));
    }

    #[test]
    fn test_buy_x_get_y_handles_large_quantities() {
        let summary = evaluate(
            &[line(dec!(2), 30_000_000)],
            &[bxgy(1, 3, 1)],
            now(),
            dec!(5),
        );
        assert_eq!(summary.discount, Decimal::from(15_000_000));
    }

    #[test]
    fn test_empty_cart() {
        let summary = evaluate(&[], &[bxgy(1, 3, 1), free_shipping(2, 4)], now(), dec!(5));
        assert_eq!(summary.subtotal, Decimal::ZERO);
        assert_eq!(summary.total, dec!(5));
    }

    #[test]
    fn test_discount_kind_serializes_with_tag() {
        let json = serde_json::to_value(bxgy(1, 3, 1).kind).unwrap();
        assert_eq!(json["discount_type"], "bxgy");
        assert_eq!(json["buy"], 3);
        assert_eq!(json["restriction"], "faiachun");
    }
}
