use crate::domain::enrollment::EnrollmentAttempt;
use crate::domain::payment::{IntentStatus, SettlementProof};
use crate::error::{Result, SettlementError};
use serde::Deserialize;
use std::io::Read;

#[derive(Debug, Deserialize)]
struct AttemptRecord {
    course: String,
    student: String,
    #[serde(default)]
    payment_id: Option<String>,
    /// Minor units.
    #[serde(default)]
    amount: Option<i64>,
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    status: Option<IntentStatus>,
}

impl AttemptRecord {
    fn into_attempt(self) -> Result<EnrollmentAttempt> {
        let proof = match self.payment_id.filter(|id| !id.is_empty()) {
            None => None,
            Some(id) => Some(SettlementProof {
                amount: self.amount.ok_or_else(|| {
                    SettlementError::BadRequest(format!("payment {id} has no amount"))
                })?,
                currency: self.currency.unwrap_or_default(),
                payment_method: self.method.unwrap_or_default(),
                status: self.status.ok_or_else(|| {
                    SettlementError::BadRequest(format!("payment {id} has no status"))
                })?,
                id,
            }),
        };
        Ok(EnrollmentAttempt::new(&self.course, &self.student, proof))
    }
}

/// Reads enrollment attempts from a CSV source.
///
/// Columns: `course,student,payment_id,amount,currency,method,status`. Rows
/// with a blank `payment_id` carry no payment proof. Whitespace is trimmed
/// and short rows are accepted.
pub struct AttemptReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> AttemptReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Lazily reads and converts attempts, one row at a time.
    pub fn attempts(self) -> impl Iterator<Item = Result<EnrollmentAttempt>> {
        self.reader.into_deserialize().map(|result| {
            result
                .map_err(SettlementError::from)
                .and_then(AttemptRecord::into_attempt)
        })
    }
}
