#![allow(dead_code)]

use async_trait::async_trait;
use coursepay::application::enrollment::EnrollmentService;
use coursepay::domain::course::{Course, CourseId, Price, StudentId};
use coursepay::domain::payment::{IntentStatus, PaymentRecord, SettlementProof};
use coursepay::domain::enrollment::AuditEvent;
use coursepay::domain::ports::{AuditLog, CourseStore, PaymentRecordStore};
use coursepay::error::{Result, SettlementError};
use coursepay::infrastructure::in_memory::{
    InMemoryAuditLog, InMemoryCourseStore, InMemoryPaymentRecordStore,
};
use coursepay::infrastructure::stripe::MockGateway;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::fs::File;
use std::io::Error;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub fn course_id(raw: &str) -> CourseId {
    CourseId::parse(raw).unwrap()
}

pub fn student(raw: &str) -> StudentId {
    StudentId::parse(raw).unwrap()
}

pub fn paid_course(id: &str, price: Decimal) -> Course {
    Course::new(course_id(id), Price::new(price).unwrap(), true).unwrap()
}

/// Free `c1` and paid `c2` at 4.99.
pub fn catalog() -> Vec<Course> {
    vec![Course::free(course_id("c1")), paid_course("c2", dec!(4.99))]
}

pub fn succeeded_proof(id: &str, amount: i64) -> SettlementProof {
    SettlementProof {
        id: id.to_string(),
        amount,
        currency: "inr".to_string(),
        payment_method: "card".to_string(),
        status: IntentStatus::Succeeded,
    }
}

/// In-memory service over the mock gateway, seeded with `courses`.
pub async fn service_with(courses: Vec<Course>) -> EnrollmentService {
    let store = InMemoryCourseStore::new();
    for course in courses {
        store.store(course).await.unwrap();
    }
    EnrollmentService::new(
        Box::new(store),
        Box::new(InMemoryPaymentRecordStore::new()),
        Box::new(InMemoryAuditLog::new()),
        Box::new(MockGateway::new("inr")),
    )
}

fn store_down() -> SettlementError {
    SettlementError::IoError(std::io::Error::other("store unavailable"))
}

/// Course store whose `add_student` always fails. Reads pass through.
#[derive(Default)]
pub struct FailingEnrollStore {
    pub inner: InMemoryCourseStore,
}

#[async_trait]
impl CourseStore for FailingEnrollStore {
    async fn store(&self, course: Course) -> Result<()> {
        self.inner.store(course).await
    }

    async fn get(&self, course_id: &CourseId) -> Result<Option<Course>> {
        self.inner.get(course_id).await
    }

    async fn add_student(&self, _: &CourseId, _: &StudentId) -> Result<bool> {
        Err(store_down())
    }

    async fn repair_count(&self, course_id: &CourseId) -> Result<Option<u64>> {
        self.inner.repair_count(course_id).await
    }

    async fn get_all(&self) -> Result<Vec<Course>> {
        self.inner.get_all().await
    }
}

/// Payment ledger that rejects every append.
#[derive(Default)]
pub struct FailingPaymentStore;

#[async_trait]
impl PaymentRecordStore for FailingPaymentStore {
    async fn append(&self, _: PaymentRecord) -> Result<Option<PaymentRecord>> {
        Err(store_down())
    }

    async fn get(&self, _: &str) -> Result<Option<PaymentRecord>> {
        Ok(None)
    }

    async fn for_course(&self, _: &CourseId) -> Result<Vec<PaymentRecord>> {
        Ok(Vec::new())
    }
}

/// Ledger whose lookups answer after `delay`, like a store behind a network
/// hop. The answer is read before the delay. Appends stay atomic.
#[derive(Default)]
pub struct SlowLookupPaymentStore {
    pub inner: InMemoryPaymentRecordStore,
    pub delay: Duration,
}

#[async_trait]
impl PaymentRecordStore for SlowLookupPaymentStore {
    async fn append(&self, record: PaymentRecord) -> Result<Option<PaymentRecord>> {
        self.inner.append(record).await
    }

    async fn get(&self, payment_id: &str) -> Result<Option<PaymentRecord>> {
        let found = self.inner.get(payment_id).await;
        tokio::time::sleep(self.delay).await;
        found
    }

    async fn for_course(&self, course_id: &CourseId) -> Result<Vec<PaymentRecord>> {
        self.inner.for_course(course_id).await
    }
}

/// Audit log that rejects its first `failures` writes, then recovers.
#[derive(Default)]
pub struct FlakyAuditLog {
    pub inner: InMemoryAuditLog,
    pub failures: AtomicUsize,
}

impl FlakyAuditLog {
    pub fn failing(times: usize) -> Self {
        Self {
            inner: InMemoryAuditLog::new(),
            failures: AtomicUsize::new(times),
        }
    }
}

#[async_trait]
impl AuditLog for FlakyAuditLog {
    async fn record(&self, event: AuditEvent) -> Result<()> {
        let failed = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failed {
            return Err(store_down());
        }
        self.inner.record(event).await
    }

    async fn events(&self) -> Result<Vec<AuditEvent>> {
        self.inner.events().await
    }
}

/// Attempts for `rows` distinct students on the paid course `c2`, every
/// other one carrying a processor proof.
pub fn generate_attempts_csv(path: &Path, rows: usize) -> std::result::Result<(), Error> {
    let file = File::create(path)?;
    let mut wtr = csv::WriterBuilder::new().from_writer(file);

    wtr.write_record(["course", "student", "payment_id", "amount", "currency", "method", "status"])?;

    for i in 1..=rows {
        let student = format!("s{i}");
        if i % 2 == 0 {
            let payment_id = format!("pi_{i:08}");
            wtr.write_record(["c2", student.as_str(), payment_id.as_str(), "499", "inr", "card", "succeeded"])?;
        } else {
            wtr.write_record(["c2", student.as_str(), "", "", "", "", ""])?;
        }
    }

    wtr.flush()?;
    Ok(())
}
