use crate::domain::course::{CourseId, StudentId};
use crate::error::{Result, SettlementError};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Prefix carried by every value the mock gateway synthesizes.
///
/// No processor-issued identifier, key or secret ever starts with it, which
/// makes it the one discriminator between mock and live values.
pub const MOCK_PREFIX: &str = "mock_";

/// An amount in minor currency units (paise, cents).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MinorUnits(i64);

impl MinorUnits {
    pub fn new(value: i64) -> Result<Self> {
        if value >= 0 {
            Ok(Self(value))
        } else {
            Err(SettlementError::ValidationError(
                "Amount must not be negative".to_string(),
            ))
        }
    }

    /// Converts a major-unit amount, rounding to two decimal places first.
    pub fn from_major(amount: Decimal) -> Result<Self> {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(SettlementError::ValidationError(
                "Amount must not be negative".to_string(),
            ));
        }
        let minor = amount
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
            .checked_mul(Decimal::ONE_HUNDRED)
            .and_then(|value| i64::try_from(value.trunc()).ok())
            .ok_or_else(|| {
                SettlementError::ValidationError(format!("Amount {amount} is out of range"))
            })?;
        Ok(Self(minor))
    }

    /// Exact conversion back to major units.
    pub fn to_major(self) -> Decimal {
        Decimal::new(self.0, 2)
    }

    pub fn value(self) -> i64 {
        self.0
    }
}

impl fmt::Display for MinorUnits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Processor-side status of a payment intent. Observed, never driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentStatus {
    RequiresPaymentMethod,
    RequiresConfirmation,
    Succeeded,
    Failed,
    /// Any other processor status (processing, requires_action, canceled).
    #[serde(other)]
    Other,
}

impl fmt::Display for IntentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::RequiresPaymentMethod => "requires_payment_method",
            Self::RequiresConfirmation => "requires_confirmation",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Other => "other",
        };
        f.write_str(name)
    }
}

/// Whether a value came from the real processor or from the mock fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessorMode {
    Live,
    Mock,
}

/// Structural classification of a processor-facing value.
pub trait Classified {
    fn structural_mode(&self) -> ProcessorMode;
}

/// A gateway result tagged with the mode that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tagged<T> {
    pub mode: ProcessorMode,
    pub value: T,
}

impl<T> Tagged<T> {
    pub fn live(value: T) -> Self {
        Self {
            mode: ProcessorMode::Live,
            value,
        }
    }

    pub fn mock(value: T) -> Self {
        Self {
            mode: ProcessorMode::Mock,
            value,
        }
    }
}

impl<T: Classified> Tagged<T> {
    /// The mode callers must act on.
    ///
    /// A value is live only when the producer tagged it live AND it has the
    /// processor-issued shape; configuration and a given response can disagree.
    pub fn resolved_mode(&self) -> ProcessorMode {
        match (self.mode, self.value.structural_mode()) {
            (ProcessorMode::Live, ProcessorMode::Live) => ProcessorMode::Live,
            _ => ProcessorMode::Mock,
        }
    }
}

/// Publishable processor key handed to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PublishableKey(pub String);

impl Classified for PublishableKey {
    fn structural_mode(&self) -> ProcessorMode {
        let key = self.0.as_str();
        if key.starts_with("pk_live_") || key.starts_with("pk_test_") {
            ProcessorMode::Live
        } else {
            ProcessorMode::Mock
        }
    }
}

/// Opaque secret the client uses to confirm an intent with the processor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientSecret(pub String);

impl Classified for ClientSecret {
    fn structural_mode(&self) -> ProcessorMode {
        let secret = self.0.as_str();
        if (secret.starts_with("pi_") || secret.starts_with("seti_")) && secret.contains("_secret_")
        {
            ProcessorMode::Live
        } else {
            ProcessorMode::Mock
        }
    }
}

/// True for identifiers the processor assigns to payment intents.
pub fn is_processor_payment_id(id: &str) -> bool {
    id.starts_with("pi_") && id.len() > "pi_".len()
}

/// A single attempted charge, as created by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub amount: MinorUnits,
    pub currency: String,
    pub status: IntentStatus,
    pub client_secret: ClientSecret,
    /// Unix timestamp, seconds.
    pub created: i64,
    #[serde(default)]
    pub payment_method: Option<String>,
}

/// Snapshot of a confirmed intent asserting that payment happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementProof {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    #[serde(alias = "method")]
    pub payment_method: String,
    pub status: IntentStatus,
}

impl SettlementProof {
    /// Builds a proof from an intent the processor reported as confirmed.
    pub fn from_intent(intent: &PaymentIntent) -> Self {
        Self {
            id: intent.id.clone(),
            amount: intent.amount.value(),
            currency: intent.currency.clone(),
            payment_method: intent
                .payment_method
                .clone()
                .unwrap_or_else(|| "unspecified".to_string()),
            status: intent.status,
        }
    }

    pub fn validate(&self) -> Result<MinorUnits> {
        if !is_processor_payment_id(&self.id) {
            return Err(SettlementError::BadRequest(
                "Payment details do not carry a processor payment id".to_string(),
            ));
        }
        if self.currency.trim().is_empty() {
            return Err(SettlementError::BadRequest(
                "Payment details are missing a currency".to_string(),
            ));
        }
        if self.payment_method.trim().is_empty() {
            return Err(SettlementError::BadRequest(
                "Payment details are missing a payment method".to_string(),
            ));
        }
        if self.status != IntentStatus::Succeeded {
            return Err(SettlementError::BadRequest(format!(
                "Payment {} has not succeeded (status: {})",
                self.id, self.status
            )));
        }
        MinorUnits::new(self.amount)
            .map_err(|_| SettlementError::BadRequest("Payment amount is negative".to_string()))
    }
}

/// A settled payment. Append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecord {
    /// The settled processor payment id.
    pub payment_id: String,
    pub course_id: CourseId,
    pub student_id: StudentId,
    /// Major units.
    pub amount: Decimal,
    pub currency: String,
    pub payment_method: String,
    pub status: IntentStatus,
}

impl PaymentRecord {
    pub fn from_proof(
        proof: &SettlementProof,
        amount: MinorUnits,
        course_id: CourseId,
        student_id: StudentId,
    ) -> Self {
        Self {
            payment_id: proof.id.clone(),
            course_id,
            student_id,
            amount: amount.to_major(),
            currency: proof.currency.to_lowercase(),
            payment_method: proof.payment_method.clone(),
            status: proof.status,
        }
    }

    pub fn belongs_to(&self, course_id: &CourseId, student_id: &StudentId) -> bool {
        &self.course_id == course_id && &self.student_id == student_id
    }
}
