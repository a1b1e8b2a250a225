use super::course::{Course, CourseId, StudentId};
use super::enrollment::{AuditEvent, EnrollmentOutcome};
use super::payment::{
    ClientSecret, PaymentIntent, PaymentRecord, PublishableKey, SettlementProof, Tagged,
};
use crate::error::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;

#[async_trait]
pub trait CourseStore: Send + Sync {
    /// Inserts a course, or merges it into the stored record via
    /// [`Course::merge_catalog`] so enrolled students survive a reload.
    async fn store(&self, course: Course) -> Result<()>;
    async fn get(&self, course_id: &CourseId) -> Result<Option<Course>>;
    /// Atomically adds `student` to the enrolled set, bumping the counter only
    /// when the student was not already present. Returns whether it was added.
    async fn add_student(&self, course_id: &CourseId, student: &StudentId) -> Result<bool>;
    /// Resets the counter to the set size. Returns the old counter if changed.
    async fn repair_count(&self, course_id: &CourseId) -> Result<Option<u64>>;
    async fn get_all(&self) -> Result<Vec<Course>>;
}

#[async_trait]
pub trait PaymentRecordStore: Send + Sync {
    /// Appends a record unless one with the same payment id exists, checking
    /// and inserting as one step. Returns the record already stored under
    /// that id, or `None` when `record` was written.
    async fn append(&self, record: PaymentRecord) -> Result<Option<PaymentRecord>>;
    async fn get(&self, payment_id: &str) -> Result<Option<PaymentRecord>>;
    async fn for_course(&self, course_id: &CourseId) -> Result<Vec<PaymentRecord>>;
}

#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn record(&self, event: AuditEvent) -> Result<()>;
    async fn events(&self) -> Result<Vec<AuditEvent>>;
}

/// The payment processor, or its mock stand-in.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Creates an intent for `amount` major units in the gateway's currency.
    async fn create_payment_intent(&self, amount: Decimal) -> Result<Tagged<PaymentIntent>>;
    fn publishable_key(&self) -> Tagged<PublishableKey>;
}

pub type CourseStoreBox = Box<dyn CourseStore>;
pub type PaymentRecordStoreBox = Box<dyn PaymentRecordStore>;
pub type AuditLogBox = Box<dyn AuditLog>;
pub type PaymentGatewayBox = Box<dyn PaymentGateway>;

// Client side of the checkout.

/// The server API as seen by a checkout client.
#[async_trait]
pub trait CheckoutApi: Send + Sync {
    async fn get_config(&self) -> Result<Tagged<PublishableKey>>;
    async fn create_payment_intent(&self, course_id: &CourseId) -> Result<Tagged<ClientSecret>>;
    async fn enroll(
        &self,
        course_id: &CourseId,
        proof: Option<SettlementProof>,
    ) -> Result<EnrollmentReceipt>;
}

/// What the server said after an enrollment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrollmentReceipt {
    pub message: String,
    pub outcome: EnrollmentOutcome,
}

/// Rejection reported by the processor while confirming a payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmationError {
    pub message: String,
}

/// Processor-side confirmation, driven by the human paying.
#[async_trait]
pub trait ProcessorConfirmation: Send + Sync {
    async fn confirm(
        &self,
        key: &PublishableKey,
        secret: &ClientSecret,
    ) -> std::result::Result<PaymentIntent, ConfirmationError>;
}

/// The authentication collaborator, reduced to what checkout needs.
pub trait Session: Send + Sync {
    fn current_student(&self) -> Option<StudentId>;
}
