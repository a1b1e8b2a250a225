use crate::domain::course::{CourseId, StudentId};
use crate::domain::payment::SettlementProof;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// One request to enroll a student, exactly as submitted.
///
/// Identifiers stay raw here; the service validates them so that a missing id
/// surfaces as a `BadRequest` instead of a parse failure at the edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrollmentAttempt {
    pub course_id: String,
    pub student_id: String,
    pub proof: Option<SettlementProof>,
}

impl EnrollmentAttempt {
    pub fn new(course_id: &str, student_id: &str, proof: Option<SettlementProof>) -> Self {
        Self {
            course_id: course_id.to_string(),
            student_id: student_id.to_string(),
            proof,
        }
    }
}

/// Which branch of the settlement state machine an attempt took.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementPath {
    Free,
    PaidWithProof,
    PaidBypass,
}

/// Result of a successful `enroll` call.
///
/// Repeating an enrollment is a no-op that reports `newly_enrolled == false`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrollmentOutcome {
    pub course_id: CourseId,
    pub student_id: StudentId,
    pub path: SettlementPath,
    pub newly_enrolled: bool,
    pub payment_recorded: bool,
}

impl EnrollmentOutcome {
    pub fn message(&self) -> &'static str {
        match (self.newly_enrolled, self.path) {
            (false, _) => "Student is already enrolled in this course",
            (true, SettlementPath::Free) => "Successfully enrolled into the course",
            (true, SettlementPath::PaidWithProof) => {
                "Payment recorded and successfully enrolled into the course"
            }
            (true, SettlementPath::PaidBypass) => {
                "Enrolled without payment because payments are not configured"
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    /// A student entered a paid course without any payment proof.
    PaidEnrollmentBypass,
}

/// Persisted marker for enrollments that need a second look.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub kind: AuditKind,
    pub course_id: CourseId,
    pub student_id: StudentId,
    /// Unix timestamp, milliseconds.
    pub at_ms: i64,
}

/// When a paid course may be entered without a payment proof.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BypassPolicy {
    /// Always allowed, always audited.
    #[default]
    Always,
    /// Only while the payment gateway runs in mock mode.
    UnconfiguredOnly,
    Never,
}

impl FromStr for BypassPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "always" => Ok(Self::Always),
            "unconfigured-only" | "unconfigured_only" => Ok(Self::UnconfiguredOnly),
            "never" => Ok(Self::Never),
            other => Err(format!("unknown bypass policy '{other}'")),
        }
    }
}
