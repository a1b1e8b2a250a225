//! Typed client for the checkout HTTP API, used by the client payment flow.

use crate::domain::course::CourseId;
use crate::domain::enrollment::EnrollmentOutcome;
use crate::domain::payment::{ClientSecret, ProcessorMode, PublishableKey, SettlementProof, Tagged};
use crate::domain::ports::{CheckoutApi, EnrollmentReceipt};
use crate::error::{Result, SettlementError};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
enum Envelope<T> {
    Success { message: String, data: T },
    Error { kind: String, message: String },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigData {
    publishable_key: String,
    mode: ProcessorMode,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IntentData {
    client_secret: String,
    mode: ProcessorMode,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct IntentRequest<'a> {
    course_id: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EnrollRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    payment_info: Option<&'a SettlementProof>,
}

/// [`CheckoutApi`] over HTTP, authenticated with a bearer token.
pub struct HttpCheckoutApi {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpCheckoutApi {
    pub fn new(base_url: &str, token: Option<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SettlementError::InternalError(Box::new(e)))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<(String, T)> {
        let request = match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };
        let response = request.send().await.map_err(|e| {
            SettlementError::UpstreamPayment(format!("checkout API unreachable: {e}"))
        })?;

        let status = response.status();
        let body = response.bytes().await.map_err(|e| {
            SettlementError::UpstreamPayment(format!("checkout API response interrupted: {e}"))
        })?;
        debug!(%status, bytes = body.len(), "checkout API response");

        match serde_json::from_slice::<Envelope<T>>(&body) {
            Ok(Envelope::Success { message, data }) => Ok((message, data)),
            Ok(Envelope::Error { kind, message }) => Err(SettlementError::from_kind(&kind, message)),
            Err(e) => Err(match status {
                StatusCode::UNAUTHORIZED => {
                    SettlementError::Unauthorized("Please login again".to_string())
                }
                status if status.is_success() => {
                    SettlementError::internal(format!("malformed checkout API response: {e}"))
                }
                status => SettlementError::internal(format!("checkout API returned {status}")),
            }),
        }
    }
}

#[async_trait]
impl CheckoutApi for HttpCheckoutApi {
    async fn get_config(&self) -> Result<Tagged<PublishableKey>> {
        let url = format!("{}/api/payments/stripe/get-config", self.base_url);
        let (_, data): (_, ConfigData) = self.send(self.http.get(url)).await?;
        Ok(Tagged {
            mode: data.mode,
            value: PublishableKey(data.publishable_key),
        })
    }

    async fn create_payment_intent(&self, course_id: &CourseId) -> Result<Tagged<ClientSecret>> {
        let url = format!("{}/api/payments/stripe/create-payment-intent", self.base_url);
        let body = IntentRequest {
            course_id: course_id.as_str(),
        };
        let (_, data): (_, IntentData) = self.send(self.http.post(url).json(&body)).await?;
        Ok(Tagged {
            mode: data.mode,
            value: ClientSecret(data.client_secret),
        })
    }

    async fn enroll(
        &self,
        course_id: &CourseId,
        proof: Option<SettlementProof>,
    ) -> Result<EnrollmentReceipt> {
        let url = format!("{}/api/courses/enroll-student/{course_id}", self.base_url);
        let body = EnrollRequest {
            payment_info: proof.as_ref(),
        };
        let (message, outcome): (_, EnrollmentOutcome) =
            self.send(self.http.post(url).json(&body)).await?;
        Ok(EnrollmentReceipt { message, outcome })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_decodes_both_shapes() {
        let ok: Envelope<ConfigData> = serde_json::from_str(
            r#"{"status":"success","message":"ok","data":{"publishableKey":"pk_test_1","mode":"live"}}"#,
        )
        .unwrap();
        assert!(matches!(ok, Envelope::Success { data, .. } if data.mode == ProcessorMode::Live));

        let err: Envelope<ConfigData> = serde_json::from_str(
            r#"{"status":"error","kind":"not_found","message":"Course not found"}"#,
        )
        .unwrap();
        assert!(matches!(err, Envelope::Error { kind, .. } if kind == "not_found"));
    }

    #[test]
    fn test_enroll_request_omits_missing_proof() {
        let body = serde_json::to_string(&EnrollRequest { payment_info: None }).unwrap();
        assert_eq!(body, "{}");
    }

    #[tokio::test]
    async fn test_unreachable_api_is_upstream_error() {
        let api =
            HttpCheckoutApi::new("http://127.0.0.1:1", None, Duration::from_millis(200)).unwrap();
        assert!(matches!(
            api.get_config().await,
            Err(SettlementError::UpstreamPayment(_))
        ));
    }
}
