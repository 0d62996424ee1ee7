use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;

use super::dispatcher::{DispatchError, IntakeBot, PlatformEvent};
use super::domain::{ApplicationStatus, UserId};
use super::engine::EngineError;
use super::platform::Platform;
use super::repository::{ApplicationRepository, RepositoryError};
use super::review::ReviewError;

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ApplicationsQuery {
    #[serde(default)]
    status: Option<String>,
}

/// HTTP surface for relayed platform events, stored applications and the roster export.
pub fn intake_router<R, P>(bot: Arc<IntakeBot<R, P>>) -> Router
where
    R: ApplicationRepository + 'static,
    P: Platform + 'static,
{
    Router::new()
        .route("/api/v1/events", post(event_handler::<R, P>))
        .route("/api/v1/applications", get(list_handler::<R, P>))
        .route(
            "/api/v1/applications/:applicant_id",
            get(record_handler::<R, P>),
        )
        .route("/api/v1/roster.csv", get(roster_handler::<R, P>))
        .with_state(bot)
}

pub(crate) async fn event_handler<R, P>(
    State(bot): State<Arc<IntakeBot<R, P>>>,
    axum::Json(event): axum::Json<PlatformEvent>,
) -> Response
where
    R: ApplicationRepository + 'static,
    P: Platform + 'static,
{
    match bot.dispatch(event).await {
        Ok(dispatched) => {
            let payload = json!({ "outcome": dispatched.label() });
            (StatusCode::ACCEPTED, axum::Json(payload)).into_response()
        }
        Err(err) => {
            let status = match &err {
                DispatchError::Engine(EngineError::Repository(_))
                | DispatchError::Review(ReviewError::Repository(_)) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
                _ => StatusCode::BAD_GATEWAY,
            };
            let payload = json!({ "error": err.to_string() });
            (status, axum::Json(payload)).into_response()
        }
    }
}

pub(crate) async fn list_handler<R, P>(
    State(bot): State<Arc<IntakeBot<R, P>>>,
    Query(query): Query<ApplicationsQuery>,
) -> Response
where
    R: ApplicationRepository + 'static,
    P: Platform + 'static,
{
    let records = match query.status.as_deref() {
        Some(raw) => {
            let Some(status) = ApplicationStatus::parse(raw) else {
                let payload = json!({ "error": format!("unknown application status '{raw}'") });
                return (StatusCode::BAD_REQUEST, axum::Json(payload)).into_response();
            };
            bot.repository().list_by_status(status)
        }
        None => bot.repository().list_all(),
    };

    match records {
        Ok(records) => {
            let views: Vec<_> = records.iter().map(|record| record.status_view()).collect();
            (StatusCode::OK, axum::Json(views)).into_response()
        }
        Err(err) => repository_failure(err),
    }
}

pub(crate) async fn record_handler<R, P>(
    State(bot): State<Arc<IntakeBot<R, P>>>,
    Path(applicant_id): Path<String>,
) -> Response
where
    R: ApplicationRepository + 'static,
    P: Platform + 'static,
{
    let Ok(applicant) = applicant_id.parse::<UserId>() else {
        let payload = json!({ "error": format!("'{applicant_id}' is not an applicant id") });
        return (StatusCode::BAD_REQUEST, axum::Json(payload)).into_response();
    };

    match bot.repository().fetch(applicant) {
        Ok(Some(record)) => (StatusCode::OK, axum::Json(record)).into_response(),
        Ok(None) => {
            let payload = json!({
                "applicant_id": applicant,
                "error": "no application on file",
            });
            (StatusCode::NOT_FOUND, axum::Json(payload)).into_response()
        }
        Err(err) => repository_failure(err),
    }
}

pub(crate) async fn roster_handler<R, P>(State(bot): State<Arc<IntakeBot<R, P>>>) -> Response
where
    R: ApplicationRepository + 'static,
    P: Platform + 'static,
{
    let rendered = match bot.roster().await {
        Ok(roster) => roster.to_csv().map_err(|err| err.to_string()),
        Err(err) => Err(err.to_string()),
    };

    match rendered {
        Ok(csv) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/csv; charset=utf-8")],
            csv,
        )
            .into_response(),
        Err(error) => {
            let payload = json!({ "error": error });
            (StatusCode::BAD_GATEWAY, axum::Json(payload)).into_response()
        }
    }
}

fn repository_failure(err: RepositoryError) -> Response {
    let payload = json!({ "error": err.to_string() });
    (StatusCode::INTERNAL_SERVER_ERROR, axum::Json(payload)).into_response()
}
