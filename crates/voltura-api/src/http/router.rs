//! Axum router configuration with middleware.
//!
//! All business routes are under `/api/`; `/health` sits at the root.
//! Middleware: CORS, request tracing.

use axum::Router;
use axum::extract::State;
use axum::routing::{get, patch, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::http::handlers;
use crate::state::AppState;

/// Build the complete API router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        // Concierge
        .route("/concierge/messages", post(handlers::concierge::create_message))
        .route("/concierge/reminders", post(handlers::concierge::create_reminder))
        .route("/concierge/sessions/{id}", get(handlers::session::get_session))
        .route(
            "/concierge/sessions/{id}/connect",
            post(handlers::session::connect_session),
        )
        .route(
            "/concierge/sessions/{id}/terminate",
            post(handlers::session::terminate_session),
        )
        // Quotations
        .route("/quotations", post(handlers::quotation::create_quotation))
        .route("/quotations/{id}", get(handlers::quotation::get_quotation))
        .route(
            "/quotations/{id}/accept",
            post(handlers::quotation::accept_quotation),
        )
        .route(
            "/quotations/{id}/reject",
            post(handlers::quotation::reject_quotation),
        )
        // Point of sale
        .route(
            "/inventory/items",
            get(handlers::pos::list_items).post(handlers::pos::create_item),
        )
        .route("/inventory/items/{id}/stock", patch(handlers::pos::adjust_stock))
        .route("/pos/sales", post(handlers::pos::create_sale))
        .route("/invoices/{id}", get(handlers::pos::get_invoice))
        .route("/invoices/{id}/payments", post(handlers::pos::record_payment))
        // CRM
        .route("/crm/customers", get(handlers::crm::list_customers))
        .route("/crm/customers/{id}", get(handlers::crm::get_customer))
        .route("/crm/jobs", get(handlers::crm::list_jobs))
        .route("/crm/jobs/{id}", get(handlers::crm::get_job))
        .route("/crm/jobs/{id}/status", patch(handlers::crm::update_job_status))
        .route(
            "/crm/jobs/{id}/reminders",
            get(handlers::concierge::list_job_reminders),
        )
        .route("/dashboard/summary", get(handlers::crm::dashboard_summary))
        // Workflow tasks
        .route("/tasks/failed", get(handlers::tasks::list_failed))
        .route("/tasks/{id}", get(handlers::tasks::get_task))
        // Realtime
        .route("/events", get(handlers::events::stream_events));

    Router::new()
        .nest("/api", api_routes)
        .route("/health", get(health_check))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /health - Liveness plus the sessions this process holds open.
async fn health_check(State(state): State<AppState>) -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "live_sessions": state.registry.live_sessions(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    async fn send(router: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                request = request.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let response = router
            .clone()
            .oneshot(request.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn router() -> Router {
        build_router(AppState::for_tests().await)
    }

    #[tokio::test]
    async fn test_health() {
        let router = router().await;
        let (status, body) = send(&router, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["live_sessions"], json!([]));
    }

    #[tokio::test]
    async fn test_unknown_session_reports_uninitialized() {
        let router = router().await;
        let (status, body) = send(&router, "GET", "/api/concierge/sessions/shop", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "uninitialized");
        assert_eq!(body["data"]["live"], false);
    }

    #[tokio::test]
    async fn test_manual_intake_creates_customer_and_job() {
        let router = router().await;
        let intake = json!({
            "session_id": "shop",
            "phone": "60123456789",
            "message": "Phone screen cracked",
        });

        let (status, first) = send(&router, "POST", "/api/concierge/messages", Some(intake.clone())).await;
        assert_eq!(status, StatusCode::CREATED);
        let (_, second) = send(&router, "POST", "/api/concierge/messages", Some(intake)).await;
        assert_eq!(first["data"]["job_id"], second["data"]["job_id"]);

        let (status, customers) = send(&router, "GET", "/api/crm/customers", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(customers["data"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_short_phone_is_rejected() {
        let router = router().await;
        let (status, body) = send(
            &router,
            "POST",
            "/api/concierge/messages",
            Some(json!({ "session_id": "shop", "phone": "123", "message": "hi" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["errors"][0]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_quotation_accept_is_idempotent() {
        let router = router().await;
        let (status, created) = send(
            &router,
            "POST",
            "/api/quotations",
            Some(json!({
                "customer": { "name": "Aina", "phone": "60123456789" },
                "line_items": [
                    { "description": "Screen", "quantity": 1, "unit_price": "250.00" },
                    { "description": "Labour", "quantity": 1, "unit_price": "31.00" }
                ]
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let id = created["data"]["id"].as_str().unwrap().to_string();

        let uri = format!("/api/quotations/{id}/accept");
        let (status, first) = send(&router, "POST", &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        let (_, second) = send(&router, "POST", &uri, None).await;
        assert_eq!(first["data"]["invoice"]["id"], second["data"]["invoice"]["id"]);
        assert_eq!(first["data"]["newly_accepted"], true);
        assert_eq!(second["data"]["newly_accepted"], false);

        let (status, _) = send(&router, "POST", &format!("/api/quotations/{id}/reject"), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_missing_entities_are_404() {
        let router = router().await;
        let id = uuid::Uuid::now_v7();
        for uri in [
            format!("/api/quotations/{id}"),
            format!("/api/invoices/{id}"),
            format!("/api/crm/customers/{id}"),
            format!("/api/crm/jobs/{id}"),
            format!("/api/tasks/{id}"),
        ] {
            let (status, body) = send(&router, "GET", &uri, None).await;
            assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
            assert_eq!(body["errors"][0]["code"], "NOT_FOUND");
        }
    }

    #[tokio::test]
    async fn test_stock_cannot_go_negative() {
        let router = router().await;
        let (status, item) = send(
            &router,
            "POST",
            "/api/inventory/items",
            Some(json!({ "sku": "BAT-01", "name": "Battery", "quantity": 2 })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let uri = format!("/api/inventory/items/{}/stock", item["data"]["id"].as_str().unwrap());

        let (status, body) = send(&router, "PATCH", &uri, Some(json!({ "quantity": -3 }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
        let (status, body) = send(&router, "PATCH", &uri, Some(json!({ "quantity": -2 }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["quantity"], 0);
    }

    #[tokio::test]
    async fn test_job_status_must_advance_in_order() {
        let router = router().await;
        let (_, intake) = send(
            &router,
            "POST",
            "/api/concierge/messages",
            Some(json!({ "session_id": "shop", "phone": "60123456789", "message": "Hello" })),
        )
        .await;
        let job_id = intake["data"]["job_id"].as_str().unwrap().to_string();
        let uri = format!("/api/crm/jobs/{job_id}/status");

        let (status, _) = send(&router, "PATCH", &uri, Some(json!({ "status": "DELIVERED" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, body) = send(&router, "PATCH", &uri, Some(json!({ "status": "IN_PROGRESS" }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "IN_PROGRESS");
    }

    #[tokio::test]
    async fn test_dashboard_summary() {
        let router = router().await;
        let (status, body) = send(&router, "GET", "/api/dashboard/summary", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["data"].is_object());
    }
}
