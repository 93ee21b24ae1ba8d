//! Fake users/orders tables for the query-performance narratives.
//!
//! Nothing here talks to a real database. The data is generated once at
//! start-up and the query timings reported by the handlers are canned.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::Serialize;
use std::collections::HashMap;

pub const USER_COUNT: u64 = 100;
pub const ORDER_COUNT: u64 = 500;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: u64,
    pub name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: u64,
    pub user_id: u64,
    pub product: String,
    pub amount: u64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserWithOrders {
    #[serde(flatten)]
    pub user: User,
    pub orders: Vec<Order>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryLog {
    pub query: String,
    pub execution_time: u64, // ms
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SpenderSummary {
    pub user_id: u64,
    pub total_spent: u64,
    pub order_count: u64,
}

pub struct MockDatabase {
    pub users: Vec<User>,
    pub orders: Vec<Order>,
}

impl MockDatabase {
    pub fn generate<R: Rng + ?Sized>(rng: &mut R, now: DateTime<Utc>) -> Self {
        let users = (1..=USER_COUNT)
            .map(|id| User {
                id,
                name: format!("User {id}"),
                email: format!("user{id}@example.com"),
                created_at: now - Duration::seconds(rng.gen_range(0..365 * 24 * 60 * 60)),
            })
            .collect();

        let orders = (1..=ORDER_COUNT)
            .map(|id| Order {
                id,
                user_id: rng.gen_range(1..=USER_COUNT),
                product: format!("Product {}", rng.gen_range(1..=50)),
                amount: rng.gen_range(10..1010),
                created_at: now - Duration::seconds(rng.gen_range(0..180 * 24 * 60 * 60)),
            })
            .collect();

        Self { users, orders }
    }

    pub fn orders_for(&self, user_id: u64) -> Vec<Order> {
        self.orders
            .iter()
            .filter(|order| order.user_id == user_id)
            .cloned()
            .collect()
    }

    // First `limit` users with their orders attached
    pub fn users_with_orders(&self, limit: usize) -> Vec<UserWithOrders> {
        self.users
            .iter()
            .take(limit)
            .map(|user| UserWithOrders {
                user: user.clone(),
                orders: self.orders_for(user.id),
            })
            .collect()
    }

    pub fn find_by_email(&self, email: &str) -> Option<&User> {
        self.users.iter().find(|user| user.email == email)
    }

    /// `$match amount >= min` → `$group by user` → `$sort total desc` → `$limit`.
    pub fn top_spenders(&self, min_amount: u64, limit: usize) -> Vec<SpenderSummary> {
        let mut by_user: HashMap<u64, SpenderSummary> = HashMap::new();

        for order in self.orders.iter().filter(|o| o.amount >= min_amount) {
            let summary = by_user.entry(order.user_id).or_insert(SpenderSummary {
                user_id: order.user_id,
                total_spent: 0,
                order_count: 0,
            });
            summary.total_spent += order.amount;
            summary.order_count += 1;
        }

        let mut spenders: Vec<SpenderSummary> = by_user.into_values().collect();
        spenders.sort_by(|a, b| {
            b.total_spent
                .cmp(&a.total_spent)
                .then(a.user_id.cmp(&b.user_id))
        });
        spenders.truncate(limit);
        spenders
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn db() -> MockDatabase {
        MockDatabase::generate(&mut StdRng::seed_from_u64(11), Utc::now())
    }

    #[test]
    fn generates_expected_table_sizes() {
        let db = db();
        assert_eq!(db.users.len(), USER_COUNT as usize);
        assert_eq!(db.orders.len(), ORDER_COUNT as usize);
        assert!(db.orders.iter().all(|o| (1..=USER_COUNT).contains(&o.user_id)));
        assert!(db.orders.iter().all(|o| (10..1010).contains(&o.amount)));
    }

    #[test]
    fn users_with_orders_attaches_every_matching_order() {
        let db = db();
        let joined = db.users_with_orders(10);

        assert_eq!(joined.len(), 10);
        for row in &joined {
            assert!(row.orders.iter().all(|o| o.user_id == row.user.id));
            assert_eq!(row.orders.len(), db.orders_for(row.user.id).len());
        }
    }

    #[test]
    fn top_spenders_are_sorted_and_filtered() {
        let db = db();
        let top = db.top_spenders(100, 10);

        assert!(top.len() <= 10);
        assert!(top.windows(2).all(|w| w[0].total_spent >= w[1].total_spent));

        let first = &top[0];
        let expected: u64 = db
            .orders
            .iter()
            .filter(|o| o.user_id == first.user_id && o.amount >= 100)
            .map(|o| o.amount)
            .sum();
        assert_eq!(first.total_spent, expected);
    }

    #[test]
    fn find_by_email_matches_exactly() {
        let db = db();
        assert_eq!(db.find_by_email("user50@example.com").map(|u| u.id), Some(50));
        assert!(db.find_by_email("nobody@example.com").is_none());
    }
}
