//! Payment gateway adapters: the Stripe REST client and the mock fallback
//! used when no processor is configured.

use crate::config::Config;
use crate::domain::payment::{
    ClientSecret, IntentStatus, MOCK_PREFIX, MinorUnits, PaymentIntent, PublishableKey, Tagged,
};
use crate::domain::ports::{PaymentGateway, PaymentGatewayBox};
use crate::error::{Result, SettlementError};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Publishable key handed out in mock mode.
pub const MOCK_PUBLISHABLE_KEY: &str = "mock_pk_development";

#[derive(Debug, Deserialize)]
struct StripeIntentDto {
    id: String,
    amount: i64,
    currency: String,
    status: IntentStatus,
    client_secret: Option<String>,
    created: i64,
    #[serde(default)]
    payment_method: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetail {
    message: Option<String>,
}

/// Talks to the Stripe REST API.
///
/// Every call is bounded by the client timeout; a timeout or transport
/// failure is an `UpstreamPayment` error, never a partial intent.
#[derive(Clone)]
pub struct StripeGateway {
    http: reqwest::Client,
    api_base: String,
    secret_key: String,
    publishable_key: Option<String>,
    currency: String,
}

impl StripeGateway {
    pub fn new(
        api_base: &str,
        secret_key: &str,
        publishable_key: Option<String>,
        currency: &str,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SettlementError::InternalError(Box::new(e)))?;
        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            secret_key: secret_key.to_string(),
            publishable_key,
            currency: currency.to_lowercase(),
        })
    }

    fn intent_from_dto(dto: StripeIntentDto) -> Result<PaymentIntent> {
        let secret = dto.client_secret.ok_or_else(|| {
            SettlementError::UpstreamPayment(format!(
                "payment intent {} was returned without a client secret",
                dto.id
            ))
        })?;
        let amount = MinorUnits::new(dto.amount)
            .map_err(|_| SettlementError::UpstreamPayment("negative intent amount".to_string()))?;
        Ok(PaymentIntent {
            id: dto.id,
            amount,
            currency: dto.currency.to_lowercase(),
            status: dto.status,
            client_secret: ClientSecret(secret),
            created: dto.created,
            payment_method: dto.payment_method,
        })
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn create_payment_intent(&self, amount: Decimal) -> Result<Tagged<PaymentIntent>> {
        let minor = MinorUnits::from_major(amount)?;
        let url = format!("{}/v1/payment_intents", self.api_base);
        let form = [
            ("amount", minor.to_string()),
            ("currency", self.currency.clone()),
            ("automatic_payment_methods[enabled]", "true".to_string()),
        ];

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.secret_key)
            .form(&form)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, timeout = e.is_timeout(), "payment intent request failed");
                SettlementError::UpstreamPayment(if e.is_timeout() {
                    "payment processor timed out".to_string()
                } else {
                    format!("payment processor unreachable: {e}")
                })
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<StripeErrorBody>()
                .await
                .ok()
                .and_then(|body| body.error.message)
                .unwrap_or_else(|| format!("payment processor returned {status}"));
            error!(%status, %message, "payment intent creation rejected");
            return Err(SettlementError::UpstreamPayment(message));
        }

        let dto: StripeIntentDto = response.json().await.map_err(|e| {
            SettlementError::UpstreamPayment(format!("unreadable payment intent response: {e}"))
        })?;
        let intent = Self::intent_from_dto(dto)?;
        info!(intent_id = %intent.id, amount = %intent.amount, currency = %intent.currency, "payment intent created");
        Ok(Tagged::live(intent))
    }

    fn publishable_key(&self) -> Tagged<PublishableKey> {
        match &self.publishable_key {
            Some(key) => Tagged::live(PublishableKey(key.clone())),
            None => Tagged::mock(PublishableKey(MOCK_PUBLISHABLE_KEY.to_string())),
        }
    }
}

/// Deterministic stand-in used while no processor is configured.
///
/// Intents are numbered in creation order, so the n-th intent is always
/// `mock_pi_<n>`. Secrets carry the mock prefix and can never pass for a
/// processor-issued secret.
#[derive(Default)]
pub struct MockGateway {
    sequence: AtomicU64,
    currency: String,
}

impl MockGateway {
    pub fn new(currency: &str) -> Self {
        Self {
            sequence: AtomicU64::new(0),
            currency: currency.to_lowercase(),
        }
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn create_payment_intent(&self, amount: Decimal) -> Result<Tagged<PaymentIntent>> {
        let minor = MinorUnits::from_major(amount)?;
        let n = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let id = format!("{MOCK_PREFIX}pi_{n:08}");
        warn!(intent_id = %id, "payment processor not configured, returning mock payment intent");
        Ok(Tagged::mock(PaymentIntent {
            client_secret: ClientSecret(format!("{id}_secret_mock")),
            id,
            amount: minor,
            currency: self.currency.clone(),
            status: IntentStatus::RequiresPaymentMethod,
            created: chrono::Utc::now().timestamp(),
            payment_method: None,
        }))
    }

    fn publishable_key(&self) -> Tagged<PublishableKey> {
        Tagged::mock(PublishableKey(MOCK_PUBLISHABLE_KEY.to_string()))
    }
}

/// Picks the real processor when a secret key is configured, the mock
/// otherwise.
pub fn gateway_from_config(config: &Config) -> Result<PaymentGatewayBox> {
    match &config.stripe_secret_key {
        Some(secret) => {
            if config.stripe_publishable_key.is_none() {
                warn!("STRIPE_PUBLISHABLE_KEY is not configured; clients will fall back to direct enrollment");
            }
            debug!(api_base = %config.stripe_api_base, "using Stripe payment gateway");
            Ok(Box::new(StripeGateway::new(
                &config.stripe_api_base,
                secret,
                config.stripe_publishable_key.clone(),
                &config.currency,
                config.payment_timeout,
            )?))
        }
        None => {
            warn!("STRIPE_SECRET_KEY is not configured; payments run in mock mode");
            Ok(Box::new(MockGateway::new(&config.currency)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::payment::{Classified, ProcessorMode};
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_mock_intent_is_deterministic_and_marked() {
        let gateway = MockGateway::new("INR");

        let first = gateway.create_payment_intent(dec!(4.99)).await.unwrap();
        let second = gateway.create_payment_intent(dec!(10)).await.unwrap();

        assert_eq!(first.mode, ProcessorMode::Mock);
        assert_eq!(first.value.id, "mock_pi_00000001");
        assert_eq!(second.value.id, "mock_pi_00000002");
        assert_eq!(first.value.amount.value(), 499);
        assert_eq!(first.value.currency, "inr");
        assert_eq!(first.value.status, IntentStatus::RequiresPaymentMethod);
        assert_eq!(
            first.value.client_secret.structural_mode(),
            ProcessorMode::Mock
        );
        assert_eq!(first.resolved_mode(), ProcessorMode::Mock);
    }

    #[tokio::test]
    async fn test_mock_rejects_negative_amount() {
        let gateway = MockGateway::new("inr");
        assert!(gateway.create_payment_intent(dec!(-1)).await.is_err());
    }

    #[test]
    fn test_mock_key_is_not_live() {
        let key = MockGateway::new("inr").publishable_key();
        assert_eq!(key.resolved_mode(), ProcessorMode::Mock);
        assert_eq!(key.value.structural_mode(), ProcessorMode::Mock);
    }

    #[test]
    fn test_stripe_gateway_without_publishable_key_hands_out_mock_key() {
        let gateway = StripeGateway::new(
            "http://127.0.0.1:1",
            "sk_test_x",
            None,
            "inr",
            Duration::from_millis(50),
        )
        .unwrap();
        assert_eq!(gateway.publishable_key().mode, ProcessorMode::Mock);
    }

    #[test]
    fn test_gateway_selection_follows_secret_key() {
        let unconfigured = gateway_from_config(&Config::default()).unwrap();
        assert_eq!(unconfigured.publishable_key().mode, ProcessorMode::Mock);

        let configured = gateway_from_config(&Config {
            stripe_secret_key: Some("sk_test_x".to_string()),
            stripe_publishable_key: Some("pk_test_x".to_string()),
            ..Config::default()
        })
        .unwrap();
        assert_eq!(
            configured.publishable_key().resolved_mode(),
            ProcessorMode::Live
        );
    }

    #[test]
    fn test_dto_without_secret_is_an_upstream_error() {
        let dto = StripeIntentDto {
            id: "pi_1".to_string(),
            amount: 100,
            currency: "INR".to_string(),
            status: IntentStatus::RequiresPaymentMethod,
            client_secret: None,
            created: 0,
            payment_method: None,
        };
        assert!(matches!(
            StripeGateway::intent_from_dto(dto),
            Err(SettlementError::UpstreamPayment(_))
        ));
    }
}
