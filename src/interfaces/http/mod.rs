//! HTTP surface of the settlement service (axum).

pub mod auth;
pub mod envelope;
pub mod routes;

use crate::application::enrollment::EnrollmentService;
use auth::JwtVerifier;
use std::sync::Arc;

pub use routes::router;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<EnrollmentService>,
    pub verifier: Arc<JwtVerifier>,
}

impl AppState {
    pub fn new(service: EnrollmentService, jwt_secret: &str) -> Self {
        Self {
            service: Arc::new(service),
            verifier: Arc::new(JwtVerifier::new(jwt_secret)),
        }
    }
}
