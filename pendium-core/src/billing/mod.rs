//! Read-only Stripe billing integration
//!
//! The backend lists customers and subscriptions to build the revenue
//! snapshot KPI; it never mutates billing state. Failures here are surfaced
//! as [`Error::Billing`](crate::error::Error::Billing) so store-backed KPIs
//! keep working when Stripe is unreachable.

pub mod stripe;

pub use stripe::StripeClient;

use serde::Deserialize;

/// A Stripe customer record (the fields the revenue KPI needs).
#[derive(Debug, Clone, Deserialize)]
pub struct Customer {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    /// Unix timestamp (seconds)
    pub created: i64,
}

/// A Stripe subscription record.
#[derive(Debug, Clone, Deserialize)]
pub struct Subscription {
    pub id: String,
    /// Customer id this subscription belongs to
    pub customer: String,
    /// "active", "trialing", "canceled", ...
    pub status: String,
    /// Unix timestamp (seconds)
    pub created: i64,
    #[serde(default)]
    pub items: SubscriptionItems,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubscriptionItems {
    #[serde(default)]
    pub data: Vec<SubscriptionItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionItem {
    pub price: Price,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Price {
    /// Product identifier the price belongs to
    pub product: String,
}

impl Subscription {
    /// Product ids across all line items.
    pub fn product_ids(&self) -> impl Iterator<Item = &str> {
        self.items.data.iter().map(|item| item.price.product.as_str())
    }

    /// Whether any line item's product id marks this as the pro tier.
    ///
    /// Tier detection is a substring match on the product identifier, the
    /// same heuristic the billing dashboard uses.
    pub fn is_pro(&self) -> bool {
        self.product_ids()
            .any(|p| p.contains("pro") || p.contains("Pro"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subscription(products: &[&str]) -> Subscription {
        Subscription {
            id: "sub_1".to_string(),
            customer: "cus_1".to_string(),
            status: "active".to_string(),
            created: 0,
            items: SubscriptionItems {
                data: products
                    .iter()
                    .map(|p| SubscriptionItem {
                        price: Price {
                            product: p.to_string(),
                        },
                    })
                    .collect(),
            },
        }
    }

    #[test]
    fn test_pro_tier_detection() {
        assert!(subscription(&["prod_hippo_pro_monthly"]).is_pro());
        assert!(subscription(&["ProPlan2024"]).is_pro());
        assert!(!subscription(&["prod_basic_monthly"]).is_pro());
        assert!(!subscription(&[]).is_pro());
        assert!(subscription(&["prod_basic", "prod_pro_addon"]).is_pro());
    }

    #[test]
    fn test_subscription_deserializes_without_items() {
        let raw = r#"{ "id": "sub_9", "customer": "cus_9", "status": "trialing", "created": 1700000000 }"#;
        let sub: Subscription = serde_json::from_str(raw).unwrap();
        assert_eq!(sub.status, "trialing");
        assert!(sub.items.data.is_empty());
    }
}
