use super::AppState;
use super::auth::{Identity, require_auth};
use super::envelope::Success;
use crate::domain::enrollment::{EnrollmentAttempt, EnrollmentOutcome};
use crate::domain::payment::{ProcessorMode, SettlementProof, Tagged};
use crate::error::{Result, SettlementError};
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Extension, Json, Router, middleware};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::info;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigData {
    pub publishable_key: String,
    pub mode: ProcessorMode,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IntentRequest {
    #[serde(default)]
    course_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentData {
    pub client_secret: String,
    pub mode: ProcessorMode,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EnrollRequest {
    #[serde(default)]
    payment_info: Option<SettlementProof>,
}

/// Parses a JSON body, treating an empty body as `T::default()` when allowed.
fn parse_body<T: DeserializeOwned>(body: &Bytes, empty: Option<T>) -> Result<T> {
    if body.iter().all(u8::is_ascii_whitespace)
        && let Some(default) = empty
    {
        return Ok(default);
    }
    serde_json::from_slice(body)
        .map_err(|e| SettlementError::BadRequest(format!("Invalid request body: {e}")))
}

async fn health() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

async fn get_config(State(state): State<AppState>) -> Success<ConfigData> {
    let key = state.service.publishable_key();
    Success::new(
        "Payment configuration",
        ConfigData {
            mode: key.resolved_mode(),
            publishable_key: key.value.0,
        },
    )
}

async fn create_payment_intent(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    body: Bytes,
) -> Result<Success<IntentData>> {
    let student = identity.require_student()?;
    let request: IntentRequest = parse_body(&body, None)?;
    let course_id = request.course_id.unwrap_or_default();

    let intent = state.service.create_intent_for_course(&course_id).await?;
    info!(course = %course_id, student = %student, intent_id = %intent.value.id, "payment intent issued");
    let secret = Tagged {
        mode: intent.mode,
        value: intent.value.client_secret,
    };
    Ok(Success::new(
        "Payment intent created",
        IntentData {
            mode: secret.resolved_mode(),
            client_secret: secret.value.0,
        },
    ))
}

async fn enroll_student(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(course_id): Path<String>,
    body: Bytes,
) -> Result<Success<EnrollmentOutcome>> {
    let student = identity.require_student()?;
    let request: EnrollRequest = parse_body(&body, Some(EnrollRequest::default()))?;

    let attempt = EnrollmentAttempt::new(&course_id, student.as_str(), request.payment_info);
    let outcome = state.service.enroll(attempt).await?;
    Ok(Success::new(outcome.message(), outcome))
}

/// Builds the application router.
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/api/payments/stripe/get-config", get(get_config))
        .route(
            "/api/payments/stripe/create-payment-intent",
            post(create_payment_intent),
        )
        .route(
            "/api/courses/enroll-student/{course_id}",
            post(enroll_student),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .route("/health", get(health))
        .merge(api)
        .with_state(state)
}
