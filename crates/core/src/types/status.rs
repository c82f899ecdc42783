//! Status and category enums shared by the API and the database.
//!
//! Each enum maps onto a Postgres enum in the `shop` schema when the
//! `postgres` feature is enabled, and serializes with the same spelling.

use serde::{Deserialize, Serialize};

/// Error returned when a string does not name a known variant.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid {kind}: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

macro_rules! string_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            /// Every variant, in declaration order.
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];

            /// The wire and database spelling of this variant.
            #[must_use]
            pub const fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    _ => Err(UnknownVariant {
                        kind: $kind,
                        value: s.to_owned(),
                    }),
                }
            }
        }
    };
}

/// Product category. Discount rules are restricted to one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "shop.product_type", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum ProductType {
    Faiachun,
    Bag,
}

string_enum!(ProductType, "product type", {
    Faiachun => "faiachun",
    Bag => "bag",
});

/// Print size chosen for a cart item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(feature = "postgres", sqlx(type_name = "shop.size_type"))]
pub enum SizeType {
    #[serde(rename = "v-rect")]
    #[cfg_attr(feature = "postgres", sqlx(rename = "v-rect"))]
    VRect,
    #[serde(rename = "square")]
    #[cfg_attr(feature = "postgres", sqlx(rename = "square"))]
    Square,
    #[serde(rename = "fat-v-rect")]
    #[cfg_attr(feature = "postgres", sqlx(rename = "fat-v-rect"))]
    FatVRect,
}

string_enum!(SizeType, "size type", {
    VRect => "v-rect",
    Square => "square",
    FatVRect => "fat-v-rect",
});

/// Lifecycle status of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "shop.order_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Pending,
    Confirmed,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
    Refunded,
}

string_enum!(OrderStatus, "order status", {
    Pending => "pending",
    Confirmed => "confirmed",
    Processing => "processing",
    Shipped => "shipped",
    Delivered => "delivered",
    Cancelled => "cancelled",
    Refunded => "refunded",
});

/// Milestone timestamp column stamped when an order enters a status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderMilestone {
    Confirmed,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderMilestone {
    /// Column name on `shop.orders`.
    #[must_use]
    pub const fn column(&self) -> &'static str {
        match self {
            Self::Confirmed => "confirmed_at",
            Self::Shipped => "shipped_at",
            Self::Delivered => "delivered_at",
            Self::Cancelled => "cancelled_at",
        }
    }
}

impl OrderStatus {
    /// The milestone this status stamps, if any.
    ///
    /// A milestone is written once; later transitions into the same status
    /// keep the original time.
    #[must_use]
    pub const fn milestone(&self) -> Option<OrderMilestone> {
        match self {
            Self::Confirmed => Some(OrderMilestone::Confirmed),
            Self::Shipped => Some(OrderMilestone::Shipped),
            Self::Delivered => Some(OrderMilestone::Delivered),
            Self::Cancelled => Some(OrderMilestone::Cancelled),
            Self::Pending | Self::Processing | Self::Refunded => None,
        }
    }
}

/// Payment status of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "shop.payment_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Paid,
    Failed,
    Refunded,
}

string_enum!(PaymentStatus, "payment status", {
    Pending => "pending",
    Paid => "paid",
    Failed => "failed",
    Refunded => "refunded",
});

/// How the shopper pays. Payment happens out of band; the order only records it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "shop.payment_method", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    #[default]
    Mpay,
    Boc,
    BankTransfer,
}

string_enum!(PaymentMethod, "payment method", {
    Mpay => "mpay",
    Boc => "boc",
    BankTransfer => "bank_transfer",
});

/// Review state of an uploaded payment proof.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "shop.payment_proof_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum PaymentProofStatus {
    #[default]
    Submitted,
    Verified,
    Rejected,
}

string_enum!(PaymentProofStatus, "payment proof status", {
    Submitted => "submitted",
    Verified => "verified",
    Rejected => "rejected",
});

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_size_type_uses_hyphenated_names() {
        assert_eq!(SizeType::FatVRect.to_string(), "fat-v-rect");
        assert_eq!("v-rect".parse::<SizeType>().unwrap(), SizeType::VRect);
        assert_eq!(
            serde_json::to_string(&SizeType::FatVRect).unwrap(),
            "\"fat-v-rect\""
        );
        let parsed: SizeType = serde_json::from_str("\"square\"").unwrap();
        assert_eq!(parsed, SizeType::Square);
    }

    #[test]
    fn test_display_matches_serde() {
        for status in OrderStatus::ALL {
            let json = serde_json::to_string(status).unwrap();
            assert_eq!(json, format!("\"{status}\""));
        }
        for method in PaymentMethod::ALL {
            let json = serde_json::to_string(method).unwrap();
            assert_eq!(json, format!("\"{method}\""));
        }
    }

    #[test]
    fn test_from_str_roundtrip() {
        for status in PaymentStatus::ALL {
            assert_eq!(status.as_str().parse::<PaymentStatus>().unwrap(), *status);
        }
        for kind in ProductType::ALL {
            assert_eq!(kind.as_str().parse::<ProductType>().unwrap(), *kind);
        }
    }

    #[test]
    fn test_from_str_rejects_unknown() {
        let err = "shipping".parse::<OrderStatus>().unwrap_err();
        assert_eq!(err.kind, "order status");
        assert_eq!(err.to_string(), "invalid order status: shipping");
    }

    #[test]
    fn test_milestones() {
        assert_eq!(
            OrderStatus::Shipped.milestone().map(|m| m.column()),
            Some("shipped_at")
        );
        assert_eq!(OrderStatus::Processing.milestone(), None);
        assert_eq!(OrderStatus::Refunded.milestone(), None);
    }

    #[test]
    fn test_defaults() {
        assert_eq!(OrderStatus::default(), OrderStatus::Pending);
        assert_eq!(PaymentStatus::default(), PaymentStatus::Pending);
        assert_eq!(PaymentMethod::default(), PaymentMethod::Mpay);
        assert_eq!(PaymentProofStatus::default(), PaymentProofStatus::Submitted);
    }
}
