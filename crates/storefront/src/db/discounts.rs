//! Promotion rule repository.

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgExecutor, PgPool};

use ryangel_core::{DiscountId, DiscountKind, DiscountRule, ProductType};

use super::RepositoryError;

const DISCOUNT_COLUMNS: &str = "id, code, name, discount_type, buy_quantity, get_quantity, \
                                threshold_quantity, product_type_restriction, \
                                start_date, end_date, is_active, is_auto_apply";

/// Mirror of the `shop.discount_type` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "shop.discount_type", rename_all = "snake_case")]
enum DiscountType {
    Bxgy,
    FreeShipping,
}

#[derive(Debug, sqlx::FromRow)]
struct DiscountRow {
    id: i32,
    code: Option<String>,
    name: String,
    discount_type: DiscountType,
    buy_quantity: Option<i32>,
    get_quantity: Option<i32>,
    threshold_quantity: i32,
    product_type_restriction: ProductType,
    start_date: DateTime<Utc>,
    end_date: DateTime<Utc>,
    is_active: bool,
    is_auto_apply: bool,
}

fn non_negative(value: i32, field: &str, id: i32) -> Result<u32, RepositoryError> {
    u32::try_from(value).map_err(|_| {
        RepositoryError::DataCorruption(format!("discount {id} has negative {field}"))
    })
}

impl TryFrom<DiscountRow> for DiscountRule {
    type Error = RepositoryError;

    fn try_from(row: DiscountRow) -> Result<Self, Self::Error> {
        let kind = match row.discount_type {
            DiscountType::Bxgy => {
                let (Some(buy), Some(get)) = (row.buy_quantity, row.get_quantity) else {
                    return Err(RepositoryError::DataCorruption(format!(
                        "bxgy discount {} is missing buy/get quantities",
                        row.id
                    )));
                };
                DiscountKind::BuyXGetY {
                    buy: non_negative(buy, "buy_quantity", row.id)?,
                    get: non_negative(get, "get_quantity", row.id)?,
                    restriction: row.product_type_restriction,
                }
            }
            DiscountType::FreeShipping => DiscountKind::FreeShipping {
                threshold: non_negative(row.threshold_quantity, "threshold_quantity", row.id)?,
                restriction: row.product_type_restriction,
            },
        };

        Ok(Self {
            id: DiscountId::new(row.id),
            code: row.code,
            name: row.name,
            kind,
            start_date: row.start_date,
            end_date: row.end_date,
            is_active: row.is_active,
            is_auto_apply: row.is_auto_apply,
        })
    }
}

/// Convert rows, dropping misconfigured rules instead of failing the cart.
fn usable_rules(rows: Vec<DiscountRow>) -> Vec<DiscountRule> {
    rows.into_iter()
        .filter_map(|row| {
            let id = row.id;
            DiscountRule::try_from(row)
                .inspect_err(|e| tracing::warn!(discount_id = id, error = %e, "Skipping discount"))
                .ok()
        })
        .collect()
}

/// Repository for promotion rules.
pub struct DiscountRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> DiscountRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Rules that price a cart at `now`: every live auto-apply rule plus the
    /// cart's code-attached rule when it is live.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn rules_for_cart(
        &self,
        attached: Option<DiscountId>,
        now: DateTime<Utc>,
    ) -> Result<Vec<DiscountRule>, RepositoryError> {
        rules_for_cart_inner(self.pool, attached, now).await
    }

    /// Find a code discount, case-insensitively. Window and status are not checked.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    /// Returns `RepositoryError::DataCorruption` if the rule is misconfigured.
    pub async fn get_by_code(&self, code: &str) -> Result<Option<DiscountRule>, RepositoryError> {
        let sql =
            format!("SELECT {DISCOUNT_COLUMNS} FROM shop.discount WHERE upper(code) = upper($1)");
        let row = sqlx::query_as::<_, DiscountRow>(&sql)
            .bind(code.trim())
            .fetch_optional(self.pool)
            .await?;

        row.map(TryInto::try_into).transpose()
    }
}

/// Same as [`DiscountRepository::rules_for_cart`], read inside a transaction.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn rules_for_cart_tx(
    conn: &mut PgConnection,
    attached: Option<DiscountId>,
    now: DateTime<Utc>,
) -> Result<Vec<DiscountRule>, RepositoryError> {
    rules_for_cart_inner(conn, attached, now).await
}

async fn rules_for_cart_inner<'e, E>(
    executor: E,
    attached: Option<DiscountId>,
    now: DateTime<Utc>,
) -> Result<Vec<DiscountRule>, RepositoryError>
where
    E: PgExecutor<'e>,
{
    let sql = format!(
        "SELECT {DISCOUNT_COLUMNS} FROM shop.discount \
         WHERE is_active AND start_date <= $1 AND end_date >= $1 \
           AND (is_auto_apply OR id = $2) \
         ORDER BY id"
    );
    let rows = sqlx::query_as::<_, DiscountRow>(&sql)
        .bind(now)
        .bind(attached)
        .fetch_all(executor)
        .await?;

    Ok(usable_rules(rows))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn row(discount_type: DiscountType) -> DiscountRow {
        let now = Utc::now();
        DiscountRow {
            id: 3,
            code: Some("CNY2025".to_string()),
            name: "Lunar New Year".to_string(),
            discount_type,
            buy_quantity: Some(3),
            get_quantity: Some(1),
            threshold_quantity: 4,
            product_type_restriction: ProductType::Faiachun,
            start_date: now - Duration::days(1),
            end_date: now + Duration::days(1),
            is_active: true,
            is_auto_apply: false,
        }
    }

    #[test]
    fn test_bxgy_row_converts() {
        let rule = DiscountRule::try_from(row(DiscountType::Bxgy)).unwrap();
        assert_eq!(
            rule.kind,
            DiscountKind::BuyXGetY {
                buy: 3,
                get: 1,
                restriction: ProductType::Faiachun
            }
        );
        assert_eq!(rule.code.as_deref(), Some("CNY2025"));
    }

    #[test]
    fn test_free_shipping_row_uses_threshold() {
        let rule = DiscountRule::try_from(row(DiscountType::FreeShipping)).unwrap();
        assert_eq!(
            rule.kind,
            DiscountKind::FreeShipping {
                threshold: 4,
                restriction: ProductType::Faiachun
            }
        );
    }

    #[test]
    fn test_bxgy_without_quantities_is_corrupt() {
        let mut bad = row(DiscountType::Bxgy);
        bad.get_quantity = None;
        assert!(matches!(
            DiscountRule::try_from(bad),
            Err(RepositoryError::DataCorruption(_))
        ));
    }

    #[test]
    fn test_usable_rules_skips_bad_rows() {
        let mut bad = row(DiscountType::Bxgy);
        bad.buy_quantity = Some(-1);
        let rules = usable_rules(vec![bad, row(DiscountType::FreeShipping)]);
        assert_eq!(rules.len(), 1);
    }
}
