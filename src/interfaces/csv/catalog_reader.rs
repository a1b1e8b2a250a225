use crate::domain::course::{Course, CourseId, Price, StudentId};
use crate::error::{Result, SettlementError};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;

#[derive(Debug, Deserialize)]
struct CatalogRecord {
    course: String,
    #[serde(default)]
    price: Option<Decimal>,
    paid: bool,
    /// Student ids separated by `;`.
    #[serde(default)]
    enrolled: Option<String>,
    /// Defaults to the size of `enrolled`.
    #[serde(default)]
    enrollment_count: Option<u64>,
}

impl CatalogRecord {
    fn into_course(self) -> Result<Course> {
        let id = CourseId::parse(&self.course)?;
        let price = Price::new(self.price.unwrap_or(Decimal::ZERO))?;
        let mut course = Course::new(id, price, self.paid)?;
        for student in self
            .enrolled
            .as_deref()
            .unwrap_or_default()
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            course.enroll(StudentId::parse(student)?);
        }
        if let Some(count) = self.enrollment_count {
            course.enrollment_count = count;
        }
        Ok(course)
    }
}

/// Reads a course catalog from a CSV source.
///
/// Columns: `course,price,paid,enrolled,enrollment_count`. A stored count
/// that disagrees with `enrolled` is loaded as-is so `verify` can repair it.
pub struct CatalogReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> CatalogReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    pub fn courses(self) -> impl Iterator<Item = Result<Course>> {
        self.reader.into_deserialize().map(|result| {
            result
                .map_err(SettlementError::from)
                .and_then(CatalogRecord::into_course)
        })
    }
}
