//! Bearer-token authentication for the checkout API.
//!
//! Tokens are HS256 JWTs issued by the platform's login service. Two claim
//! layouts are in circulation: identity nested under `payload`, or flat at
//! the top level. Both are accepted.

use super::AppState;
use crate::domain::course::StudentId;
use crate::error::{Result, SettlementError};
use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const STUDENT_ROLE: &str = "student";

/// Identity carried by a verified token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    pub role: String,
}

impl Identity {
    /// The caller as a student, or `Forbidden` for any other role.
    pub fn require_student(&self) -> Result<StudentId> {
        if self.role != STUDENT_ROLE {
            return Err(SettlementError::Forbidden(
                "Only students can enroll in courses".to_string(),
            ));
        }
        StudentId::parse(&self.id)
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Claims {
    Wrapped { payload: Identity },
    Flat(Identity),
}

impl Claims {
    fn into_identity(self) -> Identity {
        match self {
            Self::Wrapped { payload } => payload,
            Self::Flat(identity) => identity,
        }
    }
}

/// Verifies bearer tokens against the shared secret.
#[derive(Clone)]
pub struct JwtVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    pub fn new(secret: &str) -> Self {
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    pub fn verify(&self, token: &str) -> Result<Identity> {
        let data = decode::<Claims>(token, &self.key, &self.validation).map_err(|e| {
            debug!(error = %e, "rejected bearer token");
            SettlementError::Unauthorized(match e.kind() {
                ErrorKind::ExpiredSignature => "Session is expired please login again".to_string(),
                _ => "Invalid token, please login again".to_string(),
            })
        })?;
        Ok(data.claims.into_identity())
    }

    /// Verifies the `Authorization: Bearer` header value.
    pub fn verify_header(&self, header: Option<&str>) -> Result<Identity> {
        let token = header
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| {
                SettlementError::Unauthorized("Please login to access this resource".to_string())
            })?;
        self.verify(token)
    }
}

/// Middleware that requires a verified token and stores the [`Identity`] in
/// request extensions.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok());
    match state.verifier.verify_header(header) {
        Ok(identity) => {
            request.extensions_mut().insert(identity);
            next.run(request).await
        }
        Err(e) => e.into_response(),
    }
}
