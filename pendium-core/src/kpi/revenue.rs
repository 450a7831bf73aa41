//! Revenue and subscription snapshot from Stripe listings.

use serde::Serialize;

use crate::billing::{Customer, Subscription};

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevenueSnapshot {
    pub total_customers: usize,
    pub active_pro: usize,
    pub trial_pro: usize,
    pub cancelled_pro: usize,
    pub active_basic: usize,
    pub trial_basic: usize,
    pub cancelled_basic: usize,
    /// Customers with no active or trialing subscription in the window
    pub no_subscription: i64,
    /// Paid active share of all customers, percent
    pub conversion_rate: f64,
}

/// Classify subscriptions pro/basic by product id and roll up the snapshot.
pub fn summarize(customers: &[Customer], subscriptions: &[Subscription]) -> RevenueSnapshot {
    let mut snapshot = RevenueSnapshot {
        total_customers: customers.len(),
        ..Default::default()
    };

    for sub in subscriptions {
        let pro = sub.is_pro();
        match sub.status.as_str() {
            "active" => {
                if pro {
                    snapshot.active_pro += 1;
                } else {
                    snapshot.active_basic += 1;
                }
            }
            "trialing" => {
                if pro {
                    snapshot.trial_pro += 1;
                } else {
                    snapshot.trial_basic += 1;
                }
            }
            "canceled" | "cancelled" => {
                if pro {
                    snapshot.cancelled_pro += 1;
                } else {
                    snapshot.cancelled_basic += 1;
                }
            }
            // past_due, unpaid, incomplete... do not enter the snapshot
            _ => {}
        }
    }

    let subscribed =
        snapshot.active_pro + snapshot.trial_pro + snapshot.active_basic + snapshot.trial_basic;
    snapshot.no_subscription = snapshot.total_customers as i64 - subscribed as i64;

    let paid_active = snapshot.active_pro + snapshot.active_basic;
    snapshot.conversion_rate = if snapshot.total_customers == 0 {
        0.0
    } else {
        paid_active as f64 / snapshot.total_customers as f64 * 100.0
    };

    snapshot
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::billing::{Price, SubscriptionItem, SubscriptionItems};

    fn customer(id: &str) -> Customer {
        Customer {
            id: id.to_string(),
            email: None,
            created: 0,
        }
    }

    fn subscription(id: &str, status: &str, product: &str) -> Subscription {
        Subscription {
            id: id.to_string(),
            customer: format!("cus_{}", id),
            status: status.to_string(),
            created: 0,
            items: SubscriptionItems {
                data: vec![SubscriptionItem {
                    price: Price {
                        product: product.to_string(),
                    },
                }],
            },
        }
    }

    #[test]
    fn test_snapshot_classification() {
        let customers: Vec<_> = (0..5).map(|i| customer(&format!("c{}", i))).collect();
        let subs = vec![
            subscription("s1", "active", "prod_pro_monthly"),
            subscription("s2", "trialing", "prod_pro_monthly"),
            subscription("s3", "active", "prod_basic_monthly"),
            subscription("s4", "canceled", "prod_basic_monthly"),
            subscription("s5", "past_due", "prod_pro_monthly"),
        ];

        let snapshot = summarize(&customers, &subs);
        assert_eq!(snapshot.total_customers, 5);
        assert_eq!(snapshot.active_pro, 1);
        assert_eq!(snapshot.trial_pro, 1);
        assert_eq!(snapshot.active_basic, 1);
        assert_eq!(snapshot.cancelled_basic, 1);
        assert_eq!(snapshot.cancelled_pro, 0);
        // 5 customers - 3 subscribed (active/trial)
        assert_eq!(snapshot.no_subscription, 2);
        // 2 paid active of 5 customers
        assert_eq!(snapshot.conversion_rate, 40.0);
    }

    #[test]
    fn test_empty_snapshot_is_zero_filled() {
        let snapshot = summarize(&[], &[]);
        assert_eq!(snapshot.total_customers, 0);
        assert_eq!(snapshot.no_subscription, 0);
        assert_eq!(snapshot.conversion_rate, 0.0);
    }
}
