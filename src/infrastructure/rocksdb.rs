use crate::domain::course::{Course, CourseId, StudentId};
use crate::domain::enrollment::AuditEvent;
use crate::domain::payment::PaymentRecord;
use crate::domain::ports::{AuditLog, CourseStore, PaymentRecordStore};
use crate::error::{Result, SettlementError};
use async_trait::async_trait;
use rocksdb::{ColumnFamilyDescriptor, DB, IteratorMode, Options};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;

/// Column Family for course records, keyed by course id.
pub const CF_COURSES: &str = "courses";
/// Column Family for the payment ledger, keyed by payment id.
pub const CF_PAYMENTS: &str = "payments";
/// Column Family for audit events, keyed by big-endian sequence number.
pub const CF_AUDIT: &str = "audit";

/// A persistent store implementation using RocksDB.
///
/// Courses, payments and audit events live in separate Column Families.
/// Read-modify-write operations (`add_student`, `repair_count`, `append`)
/// are serialized through one async mutex, so concurrent enrollments of
/// different students never overwrite each other.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
    write_lock: Arc<Mutex<()>>,
    audit_seq: Arc<AtomicU64>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let descriptors = [CF_COURSES, CF_PAYMENTS, CF_AUDIT]
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect::<Vec<_>>();
        let db = DB::open_cf_descriptors(&opts, path, descriptors)?;

        let store = Self {
            db: Arc::new(db),
            write_lock: Arc::new(Mutex::new(())),
            audit_seq: Arc::new(AtomicU64::new(0)),
        };
        let next = store.last_audit_seq()?.map_or(0, |seq| seq + 1);
        store.audit_seq.store(next, Ordering::SeqCst);
        Ok(store)
    }

    fn cf(&self, name: &str) -> Result<&rocksdb::ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| SettlementError::internal(format!("{name} column family not found")))
    }

    fn read<T: DeserializeOwned>(&self, cf_name: &str, key: &[u8]) -> Result<Option<T>> {
        let cf = self.cf(cf_name)?;
        match self.db.get_cf(cf, key)? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn write<T: Serialize>(&self, cf_name: &str, key: &[u8], value: &T) -> Result<()> {
        let cf = self.cf(cf_name)?;
        let bytes = serde_json::to_vec(value)
            .map_err(|e| SettlementError::internal(format!("Serialization error: {e}")))?;
        self.db.put_cf(cf, key, bytes)?;
        Ok(())
    }

    fn scan<T: DeserializeOwned>(&self, cf_name: &str) -> Result<Vec<T>> {
        let cf = self.cf(cf_name)?;
        self.db
            .iterator_cf(cf, IteratorMode::Start)
            .map(|item| {
                let (_key, value) = item
                    .map_err(|e| SettlementError::internal(format!("RocksDB iteration error: {e}")))?;
                decode(&value)
            })
            .collect()
    }

    fn last_audit_seq(&self) -> Result<Option<u64>> {
        let cf = self.cf(CF_AUDIT)?;
        match self.db.iterator_cf(cf, IteratorMode::End).next() {
            Some(item) => {
                let (key, _) = item
                    .map_err(|e| SettlementError::internal(format!("RocksDB iteration error: {e}")))?;
                let bytes: [u8; 8] = key
                    .as_ref()
                    .try_into()
                    .map_err(|_| SettlementError::internal("malformed audit key"))?;
                Ok(Some(u64::from_be_bytes(bytes)))
            }
            None => Ok(None),
        }
    }
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes)
        .map_err(|e| SettlementError::internal(format!("Deserialization error: {e}")))
}

#[async_trait]
impl CourseStore for RocksDBStore {
    async fn store(&self, course: Course) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let key = course.id.as_str().as_bytes();
        let merged = match self.read::<Course>(CF_COURSES, key)? {
            Some(mut stored) => {
                stored.merge_catalog(course);
                stored
            }
            None => course,
        };
        self.write(CF_COURSES, key, &merged)
    }

    async fn get(&self, course_id: &CourseId) -> Result<Option<Course>> {
        self.read(CF_COURSES, course_id.as_str().as_bytes())
    }

    async fn add_student(&self, course_id: &CourseId, student: &StudentId) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let key = course_id.as_str().as_bytes();
        let mut course: Course = self
            .read(CF_COURSES, key)?
            .ok_or_else(|| SettlementError::NotFound("Course not found".to_string()))?;
        let added = course.enroll(student.clone());
        if added {
            self.write(CF_COURSES, key, &course)?;
        }
        Ok(added)
    }

    async fn repair_count(&self, course_id: &CourseId) -> Result<Option<u64>> {
        let _guard = self.write_lock.lock().await;
        let key = course_id.as_str().as_bytes();
        let Some(mut course) = self.read::<Course>(CF_COURSES, key)? else {
            return Ok(None);
        };
        let previous = course.repair_count();
        if previous.is_some() {
            self.write(CF_COURSES, key, &course)?;
        }
        Ok(previous)
    }

    async fn get_all(&self) -> Result<Vec<Course>> {
        // Keys are course ids, so iteration order is already sorted.
        self.scan(CF_COURSES)
    }
}

#[async_trait]
impl PaymentRecordStore for RocksDBStore {
    async fn append(&self, record: PaymentRecord) -> Result<Option<PaymentRecord>> {
        let _guard = self.write_lock.lock().await;
        let key = record.payment_id.as_bytes();
        if let Some(existing) = self.read::<PaymentRecord>(CF_PAYMENTS, key)? {
            return Ok(Some(existing));
        }
        self.write(CF_PAYMENTS, key, &record)?;
        Ok(None)
    }

    async fn get(&self, payment_id: &str) -> Result<Option<PaymentRecord>> {
        self.read(CF_PAYMENTS, payment_id.as_bytes())
    }

    async fn for_course(&self, course_id: &CourseId) -> Result<Vec<PaymentRecord>> {
        Ok(self
            .scan::<PaymentRecord>(CF_PAYMENTS)?
            .into_iter()
            .filter(|record| &record.course_id == course_id)
            .collect())
    }
}

#[async_trait]
impl AuditLog for RocksDBStore {
    async fn record(&self, event: AuditEvent) -> Result<()> {
        let seq = self.audit_seq.fetch_add(1, Ordering::SeqCst);
        self.write(CF_AUDIT, &seq.to_be_bytes(), &event)
    }

    async fn events(&self) -> Result<Vec<AuditEvent>> {
        self.scan(CF_AUDIT)
    }
}
