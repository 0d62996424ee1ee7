use crate::infra::{AppState, OutboxPlatform};
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use serde_json::json;
use squadron_intake::workflows::intake::{
    intake_router, ApplicationRepository, IntakeBot, Member,
};
use std::sync::Arc;
use tracing::info;

pub(crate) fn with_gateway_routes<R>(
    bot: Arc<IntakeBot<R, OutboxPlatform>>,
    outbox: Arc<OutboxPlatform>,
) -> Router
where
    R: ApplicationRepository + 'static,
{
    let relay = Router::new()
        .route("/api/v1/members", post(members_endpoint))
        .route("/api/v1/outbox", get(outbox_endpoint))
        .with_state(outbox);

    intake_router(bot)
        .merge(relay)
        .route("/health", get(healthcheck))
        .route("/ready", get(readiness_endpoint))
        .route("/metrics", get(metrics_endpoint))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

/// Replaces the member snapshot that role checks and roster queries read.
pub(crate) async fn members_endpoint(
    State(outbox): State<Arc<OutboxPlatform>>,
    Json(members): Json<Vec<Member>>,
) -> impl IntoResponse {
    let count = outbox.replace_members(members);
    info!(members = count, "member snapshot replaced");
    Json(json!({ "members": count }))
}

pub(crate) async fn outbox_endpoint(State(outbox): State<Arc<OutboxPlatform>>) -> impl IntoResponse {
    Json(outbox.drain())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use serde_json::Value;
    use squadron_intake::workflows::intake::{
        AnnouncementPool, BotSettings, ChannelId, CsvApplicationRepository, GroupDirectory,
        GroupDirectoryEntry, GuildId, IntakeAssets, LeadershipMarkers, Question, QuestionCatalog,
        ReviewSettings, RoleId,
    };
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;
    use tower::ServiceExt;

    struct Harness {
        router: Router,
        readiness: Arc<AtomicBool>,
        _store: tempfile::TempDir,
    }

    fn harness() -> Harness {
        let store = tempfile::tempdir().expect("tempdir");
        let catalog = QuestionCatalog::new(
            "Welcome to the application process.",
            vec![
                Question::single_select("Which squadron would you like to join?", Vec::new()),
                Question::free_text("What callsign would you like?"),
            ],
        )
        .expect("catalog builds");
        let directory = GroupDirectory::new(vec![GroupDirectoryEntry {
            role_id: RoleId(100),
            display_name: "Alpha".to_string(),
            is_recruiting: true,
        }]);
        let announcements =
            AnnouncementPool::new(vec!["Check six.".to_string()]).expect("pool builds");
        let repository = Arc::new(CsvApplicationRepository::new(
            store.path().join("applications.csv"),
            &catalog,
        ));
        let settings = BotSettings {
            review: ReviewSettings {
                guild_id: GuildId(1),
                review_channel: ChannelId(900),
                announcement_channel: ChannelId(901),
                general_role: RoleId(51),
                recruit_role: RoleId(52),
                nickname_template: "[HVY](R){callsign}".to_string(),
                organization_name: "Joint Task Force Heavy".to_string(),
                leadership_markers: LeadershipMarkers::default(),
            },
            admin_role: RoleId(50),
            intro_delay: Duration::ZERO,
            reconcile_interval: Duration::from_secs(60),
        };

        let outbox = Arc::new(OutboxPlatform::default());
        let bot = IntakeBot::new(
            IntakeAssets::new(catalog, directory, announcements),
            repository,
            outbox.clone(),
            settings,
        );
        let readiness = Arc::new(AtomicBool::new(false));
        let state = AppState {
            readiness: readiness.clone(),
            metrics: Arc::new(PrometheusBuilder::new().build_recorder().handle()),
        };

        Harness {
            router: with_gateway_routes(Arc::new(bot), outbox).layer(Extension(state)),
            readiness,
            _store: store,
        }
    }

    async fn read_json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body readable");
        serde_json::from_slice(&bytes).expect("valid json")
    }

    fn post_json(uri: &str, payload: Value) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(payload.to_string()))
            .expect("request builds")
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let response = harness()
            .router
            .oneshot(Request::get("/health").body(Body::empty()).expect("request"))
            .await
            .expect("route executes");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(read_json(response).await, json!({ "status": "ok" }));
    }

    #[tokio::test]
    async fn readiness_follows_the_flag() {
        let harness = harness();

        let initializing = harness
            .router
            .clone()
            .oneshot(Request::get("/ready").body(Body::empty()).expect("request"))
            .await
            .expect("route executes");
        assert_eq!(initializing.status(), StatusCode::SERVICE_UNAVAILABLE);

        harness.readiness.store(true, Ordering::Release);
        let ready = harness
            .router
            .oneshot(Request::get("/ready").body(Body::empty()).expect("request"))
            .await
            .expect("route executes");
        assert_eq!(ready.status(), StatusCode::OK);
        assert_eq!(read_json(ready).await, json!({ "status": "ready" }));
    }

    #[tokio::test]
    async fn metrics_are_plain_text() {
        let response = harness()
            .router
            .oneshot(Request::get("/metrics").body(Body::empty()).expect("request"))
            .await
            .expect("route executes");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|value| value.to_str().ok()),
            Some("text/plain; version=0.0.4")
        );
    }

    #[tokio::test]
    async fn relayed_events_fill_the_outbox() {
        let harness = harness();
        let router = harness.router.clone();

        let members = router
            .clone()
            .oneshot(post_json(
                "/api/v1/members",
                json!([
                    { "id": 7, "username": "goose" },
                    { "id": 1, "username": "boss", "roles": [50] }
                ]),
            ))
            .await
            .expect("route executes");
        assert_eq!(read_json(members).await, json!({ "members": 2 }));

        let event = router
            .clone()
            .oneshot(post_json(
                "/api/v1/events",
                json!({
                    "type": "slash_command",
                    "name": "apply",
                    "invoker_id": 7,
                    "invoker_username": "goose",
                    "token": "apply-7",
                }),
            ))
            .await
            .expect("route executes");
        assert_eq!(event.status(), StatusCode::ACCEPTED);
        assert_eq!(read_json(event).await, json!({ "outcome": "session" }));

        let drained = router
            .clone()
            .oneshot(Request::get("/api/v1/outbox").body(Body::empty()).expect("request"))
            .await
            .expect("route executes");
        let commands = read_json(drained).await;
        let commands = commands.as_array().expect("array payload");
        assert_eq!(commands.len(), 2);
        assert_eq!(commands[0]["command"], json!("direct_message"));
        assert_eq!(commands[0]["channel"], json!(7));
        assert_eq!(
            commands[0]["message"]["content"],
            json!("Welcome to the application process.")
        );
        assert_eq!(
            commands[1]["message"]["components"][0]["custom_id"],
            json!("squadron_select")
        );

        let empty = router
            .oneshot(Request::get("/api/v1/outbox").body(Body::empty()).expect("request"))
            .await
            .expect("route executes");
        assert_eq!(read_json(empty).await, json!([]));
    }

    #[tokio::test]
    async fn handle_is_refused_for_members_without_the_admin_role() {
        let harness = harness();
        let router = harness.router.clone();
        router
            .clone()
            .oneshot(post_json(
                "/api/v1/members",
                json!([{ "id": 7, "username": "goose" }]),
            ))
            .await
            .expect("route executes");

        let event = router
            .clone()
            .oneshot(post_json(
                "/api/v1/events",
                json!({
                    "type": "slash_command",
                    "name": "handle",
                    "invoker_id": 7,
                    "token": "handle-7",
                }),
            ))
            .await
            .expect("route executes");
        assert_eq!(read_json(event).await, json!({ "outcome": "unauthorized" }));

        let drained = router
            .oneshot(Request::get("/api/v1/outbox").body(Body::empty()).expect("request"))
            .await
            .expect("route executes");
        let commands = read_json(drained).await;
        assert_eq!(commands[0]["command"], json!("respond"));
        assert_eq!(commands[0]["token"], json!("handle-7"));
        assert_eq!(
            commands[0]["message"]["content"],
            json!("You do not have the required permissions to use this command.")
        );
    }
}
