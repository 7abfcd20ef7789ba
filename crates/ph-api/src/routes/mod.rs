pub mod vps;

use axum::routing::{get, post};
use axum::{Json, Router, middleware};

use crate::auth::auth_middleware;
use crate::state::AppState;

pub fn api_router(state: AppState) -> Router {
    let authed = Router::new()
        .route("/vps", post(vps::create_vps).get(vps::list_vps))
        .route("/vps/{id}", get(vps::get_vps).delete(vps::delete_vps))
        .route("/vps/{id}/start", post(vps::start_vps))
        .route("/vps/{id}/stop", post(vps::stop_vps))
        .route("/vps/{id}/credentials", post(vps::regenerate_credentials))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .route("/health", get(health))
        .merge(authed)
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use ph_core::{
        AdminSet, DeliveryError, Notification, NotificationSink, Orchestrator, OrchestratorConfig,
    };
    use ph_db::MemoryRegistry;
    use ph_infra::types::{ContainerSpec, ContainerState, RuntimeHandle};
    use ph_infra::{ContainerRuntime, Error as RuntimeError};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::*;
    use crate::config::{AppConfig, RegistryBackend};

    const KEY: &str = "test-key";
    const ADMIN: &str = "100";

    #[derive(Default)]
    struct FakeRuntime {
        containers: Mutex<HashMap<String, ContainerState>>,
        next: AtomicUsize,
    }

    impl FakeRuntime {
        fn set(&self, handle: &RuntimeHandle, state: ContainerState) -> ph_infra::Result<()> {
            match self.containers.lock().unwrap().get_mut(&handle.0) {
                Some(s) => {
                    *s = state;
                    Ok(())
                }
                None => Err(RuntimeError::NotFound(handle.0.clone())),
            }
        }
    }

    #[async_trait]
    impl ContainerRuntime for FakeRuntime {
        async fn create_container(&self, _spec: &ContainerSpec) -> ph_infra::Result<RuntimeHandle> {
            let handle = format!("{:064x}", self.next.fetch_add(1, Ordering::SeqCst));
            self.containers
                .lock()
                .unwrap()
                .insert(handle.clone(), ContainerState::Running);
            Ok(RuntimeHandle(handle))
        }

        async fn start(&self, handle: &RuntimeHandle) -> ph_infra::Result<()> {
            self.set(handle, ContainerState::Running)
        }

        async fn stop(&self, handle: &RuntimeHandle) -> ph_infra::Result<()> {
            self.set(handle, ContainerState::Stopped)
        }

        async fn remove(&self, handle: &RuntimeHandle) -> ph_infra::Result<()> {
            self.containers.lock().unwrap().remove(&handle.0);
            Ok(())
        }

        async fn inspect(&self, handle: &RuntimeHandle) -> ph_infra::Result<ContainerState> {
            self.containers
                .lock()
                .unwrap()
                .get(&handle.0)
                .copied()
                .ok_or_else(|| RuntimeError::NotFound(handle.0.clone()))
        }

        fn name(&self) -> &'static str {
            "fake"
        }
    }

    struct Accepting;

    #[async_trait]
    impl NotificationSink for Accepting {
        async fn deliver(&self, _: &str, _: &Notification) -> Result<(), DeliveryError> {
            Ok(())
        }
    }

    fn app() -> Router {
        let orchestrator = Orchestrator::new(
            Arc::new(MemoryRegistry::new()),
            Arc::new(FakeRuntime::default()),
            Arc::new(Accepting),
            AdminSet::new([ADMIN]),
            OrchestratorConfig::default(),
        );
        let config = AppConfig {
            registry_backend: RegistryBackend::Memory,
            database_url: None,
            listen_addr: "127.0.0.1:0".parse().unwrap(),
            intent_api_key: KEY.into(),
            admin_ids: ADMIN.into(),
            default_os_image: "ubuntu:22.04".into(),
            hostname_prefix: "powerhost".into(),
            notify_webhook_url: None,
            reconcile_interval_secs: 0,
            enforce_owner_on_power: false,
        };
        api_router(AppState {
            orchestrator,
            config,
        })
    }

    fn request(method: &str, uri: &str, caller: &str, body: Option<Value>) -> Request<Body> {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("authorization", format!("Bearer {KEY}"))
            .header("x-caller-id", caller)
            .header("x-caller-name", "Alice");
        match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let resp = app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    fn small() -> Option<Value> {
        Some(json!({ "memory_gib": 2, "cpu_cores": 1, "disk_gib": 10 }))
    }

    #[tokio::test]
    async fn health_needs_no_auth() {
        let app = app();
        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let (status, body) = send(&app, req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn wrong_key_is_rejected() {
        let app = app();
        let req = Request::builder()
            .uri("/vps")
            .header("authorization", "Bearer nope")
            .header("x-caller-id", ADMIN)
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(&app, req).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn missing_caller_is_bad_request() {
        let app = app();
        let req = Request::builder()
            .uri("/vps")
            .header("authorization", format!("Bearer {KEY}"))
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(&app, req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn create_hides_secrets() {
        let app = app();
        let (status, body) = send(&app, request("POST", "/vps", ADMIN, small())).await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["vps"]["status"], "running");
        assert_eq!(body["vps"]["username"], "alice");
        assert_eq!(body["vps"]["container"].as_str().unwrap().len(), 12);
        assert_eq!(body["delivery"]["state"], "delivered");
        assert!(body["vps"].get("password").is_none());
        assert!(body["vps"].get("access_token").is_none());
    }

    #[tokio::test]
    async fn create_by_non_admin_is_forbidden() {
        let app = app();
        let (status, body) = send(&app, request("POST", "/vps", "200", small())).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert!(body["error"].as_str().unwrap().contains("admins"));
    }

    #[tokio::test]
    async fn create_rejects_zero_memory() {
        let app = app();
        let body = Some(json!({ "memory_gib": 0, "cpu_cores": 1, "disk_gib": 10 }));
        let (status, _) = send(&app, request("POST", "/vps", ADMIN, body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn malformed_resources_are_bad_request_with_json_error() {
        let app = app();
        for body in [
            json!({ "memory_gib": 3_000_000_000u64, "cpu_cores": 1, "disk_gib": 10 }),
            json!({ "memory_gib": "two", "cpu_cores": 1, "disk_gib": 10 }),
            json!({ "cpu_cores": 1, "disk_gib": 10 }),
        ] {
            let (status, body) = send(&app, request("POST", "/vps", ADMIN, Some(body))).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert!(body["error"].as_str().unwrap().contains("memory_gib"));
        }
    }

    #[tokio::test]
    async fn full_lifecycle_over_http() {
        let app = app();
        let (_, body) = send(&app, request("POST", "/vps", ADMIN, small())).await;
        let id = body["vps"]["vps_id"].as_str().unwrap().to_string();

        let (status, body) = send(&app, request("POST", &format!("/vps/{id}/stop"), ADMIN, None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "stopped");

        let (status, body) = send(&app, request("GET", &format!("/vps/{id}"), ADMIN, None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "stopped");

        let (status, _) = send(&app, request("GET", &format!("/vps/{id}"), "300", None)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = send(
            &app,
            request("POST", &format!("/vps/{id}/credentials"), ADMIN, None),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["delivery"]["state"], "delivered");
        assert!(body.get("password").is_none());

        let (status, body) = send(&app, request("GET", "/vps", ADMIN, None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 1);

        let (status, _) = send(&app, request("DELETE", &format!("/vps/{id}"), "200", None)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = send(&app, request("DELETE", &format!("/vps/{id}"), ADMIN, None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "deleted");

        let (status, _) = send(&app, request("POST", &format!("/vps/{id}/start"), ADMIN, None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
