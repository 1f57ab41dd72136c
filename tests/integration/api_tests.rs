//! API integration tests
//!
//! Require a running server whose database has user 1 (admin) and user 2
//! (regular user). Run with: cargo test -- --ignored

use booklend_server::models::{Role, UserClaims};
use chrono::{Duration, Utc};
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};

const BASE_URL: &str = "http://localhost:8080/api/v1";

/// Mint a bearer token with the server's secret
fn token_for(user_id: i32, role: Role) -> String {
    let secret =
        std::env::var("JWT_SECRET").unwrap_or_else(|_| "change-this-secret-in-production".to_string());
    let now = Utc::now();
    UserClaims {
        sub: format!("user{}", user_id),
        user_id,
        role,
        exp: (now + Duration::hours(1)).timestamp(),
        iat: now.timestamp(),
    }
    .create_token(&secret)
    .expect("Failed to sign token")
}

#[tokio::test]
#[ignore] // Run with: cargo test -- --ignored
async fn test_health_check() {
    let client = Client::new();

    let response = client
        .get(format!("{}/health", BASE_URL))
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());

    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
#[ignore]
async fn test_loans_require_token() {
    let client = Client::new();

    let response = client
        .get(format!("{}/loans", BASE_URL))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

/// Add a book to the caller's collection and return its ID
async fn create_book(client: &Client, token: &str, title: &str) -> i64 {
    let response = client
        .post(format!("{}/books", BASE_URL))
        .bearer_auth(token)
        .json(&json!({ "title": title, "author": "Integration Author" }))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), StatusCode::CREATED);
    let book: Value = response.json().await.expect("Failed to parse response");
    book["id"].as_i64().expect("No book id")
}

#[tokio::test]
#[ignore]
async fn test_book_crud() {
    let client = Client::new();
    let token = token_for(2, Role::User);
    let isbn = format!("it-{}", Utc::now().timestamp_nanos_opt().unwrap_or_default());

    let response = client
        .post(format!("{}/books", BASE_URL))
        .bearer_auth(&token)
        .json(&json!({ "title": "The Left Hand of Darkness", "isbn": isbn }))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), StatusCode::CREATED);
    let book: Value = response.json().await.expect("Failed to parse response");
    let book_id = book["id"].as_i64().expect("No book id");
    assert_eq!(book["read"], false);

    // Same ISBN twice for one owner is rejected
    let response = client
        .post(format!("{}/books", BASE_URL))
        .bearer_auth(&token)
        .json(&json!({ "title": "Duplicate", "isbn": isbn }))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = client
        .put(format!("{}/books/{}", BASE_URL, book_id))
        .bearer_auth(&token)
        .json(&json!({ "read": true }))
        .send()
        .await
        .expect("Failed to send request");
    assert!(response.status().is_success());
    let book: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(book["read"], true);
    assert_eq!(book["title"], "The Left Hand of Darkness");

    // Other users cannot see it
    let response = client
        .get(format!("{}/books/{}", BASE_URL, book_id))
        .bearer_auth(token_for(1, Role::Admin))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = client
        .delete(format!("{}/books/{}", BASE_URL, book_id))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = client
        .get(format!("{}/books/{}", BASE_URL, book_id))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
#[ignore]
async fn test_lend_and_return_book() {
    let client = Client::new();
    let token = token_for(1, Role::Admin);
    let due = (Utc::now() + Duration::days(14)).date_naive();
    let book_id = create_book(&client, &token, "Kindred").await;

    let response = client
        .post(format!("{}/loans", BASE_URL))
        .bearer_auth(&token)
        .json(&json!({
            "book_id": book_id,
            "borrower_name": "Integration Tester",
            "due_date": due.to_string()
        }))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), StatusCode::CREATED);
    let loan: Value = response.json().await.expect("Failed to parse response");
    let loan_id = loan["id"].as_i64().expect("No loan id");

    // A second active loan of the same book is rejected
    let response = client
        .post(format!("{}/loans", BASE_URL))
        .bearer_auth(&token)
        .json(&json!({ "book_id": book_id, "borrower_name": "Someone Else" }))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = client
        .post(format!("{}/loans/{}/return", BASE_URL, loan_id))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to send request");
    assert!(response.status().is_success());

    // Returning twice is a not-found
    let response = client
        .post(format!("{}/loans/{}/return", BASE_URL, loan_id))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
#[ignore]
async fn test_update_notification_settings() {
    let client = Client::new();
    let token = token_for(2, Role::User);

    let response = client
        .put(format!("{}/settings/notifications", BASE_URL))
        .bearer_auth(&token)
        .json(&json!({ "email_overdue_reminders": false }))
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());
    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["email_overdue_reminders"], false);
    assert_eq!(body["email_reminders_enabled"], true);
}

#[tokio::test]
#[ignore]
async fn test_manual_sweep_is_admin_only() {
    let client = Client::new();

    let response = client
        .post(format!("{}/admin/reminders/run", BASE_URL))
        .bearer_auth(token_for(2, Role::User))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = client
        .post(format!("{}/admin/reminders/run", BASE_URL))
        .bearer_auth(token_for(1, Role::Admin))
        .send()
        .await
        .expect("Failed to send request");
    assert!(response.status().is_success());

    let report: Value = response.json().await.expect("Failed to parse response");
    assert!(report["upcoming_sent"].is_u64());
    assert!(report["overdue_digests_sent"].is_u64());
}
