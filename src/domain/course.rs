use crate::domain::payment::MinorUnits;
use crate::error::{Result, SettlementError};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Identifier of a course. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CourseId(String);

impl CourseId {
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(SettlementError::BadRequest(
                "Please provide course details".to_string(),
            ));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CourseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a student, as asserted by the authentication collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StudentId(String);

impl StudentId {
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(SettlementError::BadRequest(
                "Please provide valid student details".to_string(),
            ));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StudentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Non-negative course price in major currency units.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct Price(Decimal);

impl Price {
    pub const ZERO: Self = Self(Decimal::ZERO);

    pub fn new(value: Decimal) -> Result<Self> {
        if value.is_sign_negative() && !value.is_zero() {
            Err(SettlementError::ValidationError(
                "Price must not be negative".to_string(),
            ))
        } else {
            Ok(Self(value))
        }
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    pub fn to_minor_units(self) -> Result<MinorUnits> {
        MinorUnits::from_major(self.0)
    }
}

/// A course record as far as enrollment is concerned.
///
/// Authoring happens elsewhere; this subsystem only ever adds students.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Course {
    pub id: CourseId,
    pub price: Price,
    pub is_paid: bool,
    /// Enrolled students. Unique; ordered only for stable output.
    pub enrolled: BTreeSet<StudentId>,
    /// Should equal `enrolled.len()`; see [`Course::count_is_consistent`].
    pub enrollment_count: u64,
}

impl Course {
    /// Creates a course with nobody enrolled.
    ///
    /// A paid course must carry a positive price.
    pub fn new(id: CourseId, price: Price, is_paid: bool) -> Result<Self> {
        if is_paid && price.value().is_zero() {
            return Err(SettlementError::ValidationError(format!(
                "Paid course {id} must have a positive price"
            )));
        }
        Ok(Self {
            id,
            price,
            is_paid,
            enrolled: BTreeSet::new(),
            enrollment_count: 0,
        })
    }

    pub fn free(id: CourseId) -> Self {
        Self {
            id,
            price: Price::ZERO,
            is_paid: false,
            enrolled: BTreeSet::new(),
            enrollment_count: 0,
        }
    }

    /// Price is irrelevant once a course is not paid.
    pub fn is_free(&self) -> bool {
        !self.is_paid
    }

    pub fn is_enrolled(&self, student: &StudentId) -> bool {
        self.enrolled.contains(student)
    }

    /// Adds a student. Returns `false` when the student was already enrolled,
    /// in which case the counter is left untouched.
    pub fn enroll(&mut self, student: StudentId) -> bool {
        let added = self.enrolled.insert(student);
        if added {
            self.enrollment_count += 1;
        }
        added
    }

    /// Applies a catalog row to an existing record. Price and paid flag come
    /// from the catalog; its enrolled students are added, never removed.
    pub fn merge_catalog(&mut self, catalog: Course) {
        self.price = catalog.price;
        self.is_paid = catalog.is_paid;
        for student in catalog.enrolled {
            self.enroll(student);
        }
    }

    pub fn count_is_consistent(&self) -> bool {
        self.enrollment_count == self.enrolled.len() as u64
    }

    /// Resets the counter to the set cardinality. Returns the previous value
    /// when it changed.
    pub fn repair_count(&mut self) -> Option<u64> {
        if self.count_is_consistent() {
            return None;
        }
        let previous = self.enrollment_count;
        self.enrollment_count = self.enrolled.len() as u64;
        Some(previous)
    }
}
