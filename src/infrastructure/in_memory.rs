use crate::domain::course::{Course, CourseId, StudentId};
use crate::domain::enrollment::AuditEvent;
use crate::domain::payment::PaymentRecord;
use crate::domain::ports::{AuditLog, CourseStore, PaymentRecordStore};
use crate::error::{Result, SettlementError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A thread-safe in-memory course store.
///
/// `add_student` mutates under the write lock, so concurrent enrollments of
/// different students never lose an update.
#[derive(Default, Clone)]
pub struct InMemoryCourseStore {
    courses: Arc<RwLock<HashMap<CourseId, Course>>>,
}

impl InMemoryCourseStore {
    /// Creates a new, empty in-memory course store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CourseStore for InMemoryCourseStore {
    async fn store(&self, course: Course) -> Result<()> {
        let mut courses = self.courses.write().await;
        match courses.get_mut(&course.id) {
            Some(stored) => stored.merge_catalog(course),
            None => {
                courses.insert(course.id.clone(), course);
            }
        }
        Ok(())
    }

    async fn get(&self, course_id: &CourseId) -> Result<Option<Course>> {
        let courses = self.courses.read().await;
        Ok(courses.get(course_id).cloned())
    }

    async fn add_student(&self, course_id: &CourseId, student: &StudentId) -> Result<bool> {
        let mut courses = self.courses.write().await;
        let course = courses
            .get_mut(course_id)
            .ok_or_else(|| SettlementError::NotFound("Course not found".to_string()))?;
        Ok(course.enroll(student.clone()))
    }

    async fn repair_count(&self, course_id: &CourseId) -> Result<Option<u64>> {
        let mut courses = self.courses.write().await;
        Ok(courses
            .get_mut(course_id)
            .and_then(|course| course.repair_count()))
    }

    async fn get_all(&self) -> Result<Vec<Course>> {
        let courses = self.courses.read().await;
        let mut all: Vec<Course> = courses.values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(all)
    }
}

/// A thread-safe in-memory, append-only payment ledger keyed by payment id.
#[derive(Default, Clone)]
pub struct InMemoryPaymentRecordStore {
    records: Arc<RwLock<HashMap<String, PaymentRecord>>>,
}

impl InMemoryPaymentRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PaymentRecordStore for InMemoryPaymentRecordStore {
    async fn append(&self, record: PaymentRecord) -> Result<Option<PaymentRecord>> {
        let mut records = self.records.write().await;
        if let Some(existing) = records.get(&record.payment_id) {
            return Ok(Some(existing.clone()));
        }
        records.insert(record.payment_id.clone(), record);
        Ok(None)
    }

    async fn get(&self, payment_id: &str) -> Result<Option<PaymentRecord>> {
        let records = self.records.read().await;
        Ok(records.get(payment_id).cloned())
    }

    async fn for_course(&self, course_id: &CourseId) -> Result<Vec<PaymentRecord>> {
        let records = self.records.read().await;
        let mut matching: Vec<PaymentRecord> = records
            .values()
            .filter(|record| &record.course_id == course_id)
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.payment_id.cmp(&b.payment_id));
        Ok(matching)
    }
}

/// In-memory audit trail, in insertion order.
#[derive(Default, Clone)]
pub struct InMemoryAuditLog {
    events: Arc<RwLock<Vec<AuditEvent>>>,
}

impl InMemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuditLog for InMemoryAuditLog {
    async fn record(&self, event: AuditEvent) -> Result<()> {
        self.events.write().await.push(event);
        Ok(())
    }

    async fn events(&self) -> Result<Vec<AuditEvent>> {
        Ok(self.events.read().await.clone())
    }
}
