use axum::{
    middleware,
    routing::{get, post},
    Router,
};

mod client_scope;
mod flags;
mod health;
mod resolve;

pub use client_scope::CLIENT_ID_HEADER;
pub use health::health;

use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    let api_router = Router::new()
        .route("/flags", get(flags::routes::list))
        .route("/flags/{flag_id}/resolve", post(resolve::routes::resolve))
        .route("/resolve", post(resolve::routes::resolve_batch))
        .layer(middleware::from_fn(client_scope::client_scope));

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .nest("/api", api_router)
}

async fn root() -> &'static str {
    "Feature flag resolver"
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::evaluation::{FlagRegistry, MemoryStore, ResolutionEngine};
    use crate::EngineSettings;

    fn app(persist: bool) -> Router {
        app_with_store(persist, Arc::new(MemoryStore::new()))
    }

    fn app_with_store(persist: bool, store: Arc<MemoryStore>) -> Router {
        let snapshot = json!({
            "flags": [
                {
                    "id": "checkout",
                    "label": "Checkout",
                    "description": "New checkout flow",
                    "variants": [
                        { "uuid": "A", "label": "Off", "value": "{\"enabled\":false}" },
                        { "uuid": "B", "label": "On", "value": "{\"enabled\":true}" }
                    ],
                    "algorithms": [
                        {
                            "uuid": "beta",
                            "plugin_id": "percentage_rollout",
                            "weight": 0,
                            "configuration": { "percentages": { "B": 100 } },
                            "conditions": [
                                { "uuid": "tier", "plugin_id": "user_tier", "configuration": { "values": ["beta"] } }
                            ]
                        },
                        {
                            "uuid": "split",
                            "plugin_id": "percentage_rollout",
                            "weight": 1,
                            "configuration": { "percentages": { "A": 50, "B": 50 } }
                        }
                    ]
                },
                {
                    "id": "broken",
                    "label": "Broken",
                    "variants": [
                        { "uuid": "X", "label": "X", "value": "1" },
                        { "uuid": "Y", "label": "Y", "value": "2" }
                    ],
                    "algorithms": [
                        {
                            "uuid": "mystery",
                            "plugin_id": "does_not_exist",
                            "configuration": {}
                        }
                    ]
                }
            ]
        });

        let registry = Arc::new(FlagRegistry::from_json(&snapshot.to_string()).unwrap());
        let engine = ResolutionEngine::builder(registry)
            .settings(EngineSettings {
                persist,
                ..EngineSettings::default()
            })
            .build();

        routes().with_state(AppState::new(engine, store))
    }

    fn post_json(uri: &str, client_id: Option<&str>, body: Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json");
        if let Some(client_id) = client_id {
            builder = builder.header(CLIENT_ID_HEADER, client_id);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
        (status, body)
    }

    #[tokio::test]
    async fn test_health_reports_flag_count() {
        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let (status, body) = send(app(false), request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "status": 200, "flags": 2 }));
    }

    #[tokio::test]
    async fn test_list_flags() {
        let request = Request::builder().uri("/api/flags").body(Body::empty()).unwrap();
        let (status, body) = send(app(false), request).await;

        assert_eq!(status, StatusCode::OK);
        let flags = body["flags"].as_array().unwrap();
        assert_eq!(flags.len(), 2);
        assert_eq!(flags[0]["id"], "broken");
        assert_eq!(flags[1]["id"], "checkout");
        assert_eq!(flags[1]["variants"][1], json!({ "uuid": "B", "label": "On" }));
        assert_eq!(flags[1]["algorithms"], 2);
    }

    #[tokio::test]
    async fn test_resolve_with_matching_condition() {
        let request = post_json(
            "/api/flags/checkout/resolve",
            None,
            json!({ "context": { "user_id": "u1", "user_tier": "beta" } }),
        );
        let (status, body) = send(app(false), request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({
                "flag_id": "checkout",
                "variant_uuid": "B",
                "variant_label": "On",
                "value": { "enabled": true }
            })
        );
    }

    #[tokio::test]
    async fn test_resolve_without_body() {
        let request = Request::builder()
            .method("POST")
            .uri("/api/flags/checkout/resolve")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(app(false), request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["flag_id"], "checkout");
        assert!(body["variant_uuid"] == "A" || body["variant_uuid"] == "B");
    }

    #[tokio::test]
    async fn test_resolve_unknown_flag_is_404() {
        let request = post_json("/api/flags/nope/resolve", None, json!({}));
        let (status, body) = send(app(false), request).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, Value::String("feature flag \"nope\" not found".to_string()));
    }

    #[tokio::test]
    async fn test_resolve_unknown_plugin_is_500() {
        let request = post_json("/api/flags/broken/resolve", None, json!({}));
        let (status, _) = send(app(false), request).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_client_decisions_are_sticky() {
        let app = app(true);

        let first = post_json("/api/flags/checkout/resolve", Some("device-1"), json!({}));
        let (status, first) = send(app.clone(), first).await;
        assert_eq!(status, StatusCode::OK);

        for _ in 0..10 {
            let again = post_json("/api/flags/checkout/resolve", Some("device-1"), json!({}));
            let (_, again) = send(app.clone(), again).await;
            assert_eq!(again["variant_uuid"], first["variant_uuid"]);
        }
    }

    #[tokio::test]
    async fn test_rotating_client_ids_stay_within_store_capacity() {
        let store = Arc::new(MemoryStore::with_capacity(20));
        let app = app_with_store(true, store.clone());

        for client in 0..200 {
            let client_id = format!("device-{}", client);
            let request = post_json("/api/flags/checkout/resolve", Some(&client_id), json!({}));
            let (status, _) = send(app.clone(), request).await;
            assert_eq!(status, StatusCode::OK);
        }

        assert_eq!(store.len(), 20);
    }

    #[tokio::test]
    async fn test_invalid_client_id_is_rejected() {
        let request = post_json("/api/flags/checkout/resolve", Some("bad id!"), json!({}));
        let (status, _) = send(app(false), request).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_batch_resolve_reports_each_flag() {
        let request = post_json(
            "/api/resolve",
            None,
            json!({
                "flags": ["checkout", "nope", "broken"],
                "context": { "user_id": "u1", "user_tier": "beta" }
            }),
        );
        let (status, body) = send(app(false), request).await;

        assert_eq!(status, StatusCode::OK);
        let results = &body["results"];
        assert_eq!(results["checkout"]["variant_uuid"], "B");
        assert_eq!(results["nope"]["error"], "feature flag \"nope\" not found");
        assert!(results["broken"]["error"].as_str().unwrap().contains("does_not_exist"));
    }

    #[tokio::test]
    async fn test_batch_resolve_requires_flags() {
        let request = post_json("/api/resolve", None, json!({ "flags": [] }));
        let (status, _) = send(app(false), request).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
