use axum::{
    Json, Router,
    extract::{Query, State},
    response::IntoResponse,
    routing::get,
};
use rand::Rng;
use serde_json::json;
use std::sync::Arc;
use tokio::time::Instant;
use crate::database::QueryLog;
use crate::metrics::count_request;
use crate::models::EmailQuery;
use crate::state::AppState;

const PAGE_SIZE: usize = 10;
const FULL_SCAN_MS: u64 = 145;
const INDEX_SEEK_MS: u64 = 8;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/n-plus-one/inefficient", get(inefficient_handler))
        .route("/n-plus-one/optimized", get(optimized_handler))
        .route("/index-comparison", get(index_comparison_handler))
        .route("/aggregation", get(aggregation_handler))
}

async fn inefficient_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    count_request("database");
    let start = Instant::now();
    let mut rng = rand::thread_rng();
    let now = state.clock.now();

    let mut query_logs = vec![QueryLog {
        query: format!("SELECT * FROM users LIMIT {PAGE_SIZE}"),
        execution_time: 15,
        timestamp: now,
    }];

    let rows = state.database.users_with_orders(PAGE_SIZE);
    // one extra query per user, the N in N+1
    for row in &rows {
        query_logs.push(QueryLog {
            query: format!("SELECT * FROM orders WHERE userId = {}", row.user.id),
            execution_time: rng.gen_range(10..30),
            timestamp: now,
        });
    }

    let average =
        query_logs.iter().map(|q| q.execution_time).sum::<u64>() as f64 / query_logs.len() as f64;

    Json(json!({
        "approach": "N+1 Queries (Inefficient)",
        "data": rows,
        "performance": {
            "totalQueries": query_logs.len(),
            "totalExecutionTime": format!("{}ms", start.elapsed().as_millis()),
            "averageQueryTime": format!("{average:.2}ms"),
            "problem": format!(
                "Executed 1 query for users + N queries for orders = {} total queries",
                query_logs.len()
            )
        },
        "queryLogs": query_logs
    }))
}

async fn optimized_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    count_request("database");
    let start = Instant::now();

    let query_logs = vec![QueryLog {
        query: format!(
            "SELECT users.*, JSON_AGG(orders.*) AS orders \
             FROM users LEFT JOIN orders ON users.id = orders.userId \
             WHERE users.id <= {PAGE_SIZE} GROUP BY users.id"
        ),
        execution_time: 25,
        timestamp: state.clock.now(),
    }];
    let rows = state.database.users_with_orders(PAGE_SIZE);

    Json(json!({
        "approach": "Optimized JOIN Query",
        "data": rows,
        "performance": {
            "totalQueries": query_logs.len(),
            "totalExecutionTime": format!("{}ms", start.elapsed().as_millis()),
            "averageQueryTime": format!("{}ms", query_logs[0].execution_time),
            "improvement": format!(
                "82% faster - Single query instead of {} queries",
                PAGE_SIZE + 1
            )
        },
        "queryLogs": query_logs
    }))
}

async fn index_comparison_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<EmailQuery>,
) -> impl IntoResponse {
    count_request("database");
    let email = query
        .email
        .filter(|e| !e.is_empty())
        .unwrap_or_else(|| "user50@example.com".to_string());
    let found = state.database.find_by_email(&email);

    Json(json!({
        "searchedEmail": email,
        "found": found,
        "withoutIndex": {
            "approach": "Without Index (Full Table Scan)",
            "query": format!("SELECT * FROM users WHERE email = '{email}'"),
            "executionTime": format!("{FULL_SCAN_MS}ms"),
            "rowsScanned": state.database.users.len(),
            "method": "FULL TABLE SCAN"
        },
        "withIndex": {
            "approach": "With Index on email column",
            "query": format!("SELECT * FROM users WHERE email = '{email}' /* INDEX: idx_users_email */"),
            "executionTime": format!("{INDEX_SEEK_MS}ms"),
            "rowsScanned": 1,
            "method": "INDEX SEEK"
        },
        "improvement": {
            "percentFaster": format!(
                "{:.1}%",
                (FULL_SCAN_MS - INDEX_SEEK_MS) as f64 / FULL_SCAN_MS as f64 * 100.0
            ),
            "timeSaved": format!("{}ms", FULL_SCAN_MS - INDEX_SEEK_MS),
            "recommendation": "CREATE INDEX idx_users_email ON users(email)"
        }
    }))
}

async fn aggregation_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    count_request("database");
    let start = Instant::now();
    let results = state.database.top_spenders(100, 10);

    Json(json!({
        "title": "MongoDB Aggregation Pipeline",
        "pipeline": [
            { "$match": { "amount": { "$gte": 100 } } },
            { "$group": {
                "_id": "$userId",
                "totalSpent": { "$sum": "$amount" },
                "orderCount": { "$sum": 1 }
            }},
            { "$sort": { "totalSpent": -1 } },
            { "$limit": 10 }
        ],
        "results": results,
        "performance": {
            "executionTime": format!("{}ms", start.elapsed().as_millis()),
            "documentsProcessed": state.database.orders.len(),
            "resultsReturned": results.len()
        }
    }))
}
