use crate::domain::course::{Course, CourseId, StudentId};
use crate::domain::enrollment::{
    AuditEvent, AuditKind, BypassPolicy, EnrollmentAttempt, EnrollmentOutcome, SettlementPath,
};
use crate::domain::payment::{
    MinorUnits, PaymentIntent, PaymentRecord, ProcessorMode, PublishableKey, SettlementProof,
    Tagged,
};
use crate::domain::ports::{AuditLogBox, CourseStoreBox, PaymentGatewayBox, PaymentRecordStoreBox};
use crate::error::{Result, SettlementError};
use tracing::{debug, error, info, warn};

/// Log target for enrollment audit signals.
pub const AUDIT_TARGET: &str = "coursepay::audit";

/// The enrollment settlement state machine.
///
/// `EnrollmentService` decides, for one (course, student) pair, whether to
/// record an enrollment and whether to also record a payment. A student is
/// never charged without being enrolled, and never enrolled into a paid course
/// without either a recorded payment or an audited bypass.
pub struct EnrollmentService {
    courses: CourseStoreBox,
    payments: PaymentRecordStoreBox,
    audit: AuditLogBox,
    gateway: PaymentGatewayBox,
    bypass_policy: BypassPolicy,
}

impl EnrollmentService {
    /// Creates a new `EnrollmentService`.
    ///
    /// # Arguments
    ///
    /// * `courses` - Course records and their enrolled sets.
    /// * `payments` - Append-only ledger of settled payments.
    /// * `audit` - Where bypass enrollments are marked.
    /// * `gateway` - The payment processor or its mock.
    pub fn new(
        courses: CourseStoreBox,
        payments: PaymentRecordStoreBox,
        audit: AuditLogBox,
        gateway: PaymentGatewayBox,
    ) -> Self {
        Self {
            courses,
            payments,
            audit,
            gateway,
            bypass_policy: BypassPolicy::default(),
        }
    }

    pub fn with_bypass_policy(mut self, policy: BypassPolicy) -> Self {
        self.bypass_policy = policy;
        self
    }

    /// Settles one enrollment attempt.
    ///
    /// Enrolling an already enrolled student is a no-op: no second payment
    /// record for the same payment id, no second counter increment, and the
    /// outcome reports `newly_enrolled == false`.
    pub async fn enroll(&self, attempt: EnrollmentAttempt) -> Result<EnrollmentOutcome> {
        let course_id = CourseId::parse(&attempt.course_id)?;
        let student_id = StudentId::parse(&attempt.student_id)?;

        let course = self
            .courses
            .get(&course_id)
            .await?
            .ok_or_else(|| SettlementError::NotFound("Course not found".to_string()))?;

        if course.is_free() {
            if attempt.proof.is_some() {
                debug!(course = %course_id, "ignoring payment details sent for a free course");
            }
            let newly_enrolled = self.courses.add_student(&course_id, &student_id).await?;
            info!(course = %course_id, student = %student_id, newly_enrolled, "free enrollment");
            return Ok(EnrollmentOutcome {
                course_id,
                student_id,
                path: SettlementPath::Free,
                newly_enrolled,
                payment_recorded: false,
            });
        }

        match attempt.proof {
            Some(proof) => {
                let expected = course.price.to_minor_units()?;
                self.settle_paid(course_id, student_id, &proof, expected)
                    .await
            }
            None => self.settle_bypass(&course, student_id).await,
        }
    }

    async fn settle_paid(
        &self,
        course_id: CourseId,
        student_id: StudentId,
        proof: &SettlementProof,
        expected: MinorUnits,
    ) -> Result<EnrollmentOutcome> {
        let amount = proof.validate()?;

        if let Some(existing) = self.payments.get(&proof.id).await?
            && !existing.belongs_to(&course_id, &student_id)
        {
            warn!(
                payment_id = %proof.id,
                course = %course_id,
                student = %student_id,
                settled_course = %existing.course_id,
                settled_student = %existing.student_id,
                "payment already settled for another enrollment"
            );
            return Err(SettlementError::BadRequest(
                "This payment has already been used for another enrollment".to_string(),
            ));
        }

        if amount != expected {
            warn!(
                payment_id = %proof.id,
                paid = %amount,
                price = %expected,
                "settled amount differs from course price"
            );
        }

        let record = PaymentRecord::from_proof(proof, amount, course_id.clone(), student_id.clone());
        let (enrolled, recorded) = tokio::join!(
            self.courses.add_student(&course_id, &student_id),
            self.payments.append(record)
        );
        // The ledger may have taken the id for another enrollment since the
        // check above.
        let recorded = recorded.and_then(|existing| match existing {
            Some(existing) if !existing.belongs_to(&course_id, &student_id) => {
                Err(SettlementError::BadRequest(format!(
                    "payment {} was settled for another enrollment ({}, {})",
                    proof.id, existing.course_id, existing.student_id
                )))
            }
            existing => Ok(existing.is_none()),
        });

        match (enrolled, recorded) {
            (Ok(newly_enrolled), Ok(payment_recorded)) => {
                if !newly_enrolled && payment_recorded {
                    warn!(
                        payment_id = %proof.id,
                        course = %course_id,
                        student = %student_id,
                        "payment recorded for a student who was already enrolled"
                    );
                }
                info!(
                    course = %course_id,
                    student = %student_id,
                    payment_id = %proof.id,
                    newly_enrolled,
                    payment_recorded,
                    "paid enrollment settled"
                );
                Ok(EnrollmentOutcome {
                    course_id,
                    student_id,
                    path: SettlementPath::PaidWithProof,
                    newly_enrolled,
                    payment_recorded,
                })
            }
            (enrolled, recorded) => {
                let enrollment_written = enrolled.is_ok();
                let payment_written = recorded.is_ok();
                let reason = [enrolled.err(), recorded.err()]
                    .into_iter()
                    .flatten()
                    .map(|e| e.to_string())
                    .collect::<Vec<_>>()
                    .join("; ");
                error!(
                    reconciliation_required = true,
                    course = %course_id,
                    student = %student_id,
                    payment_id = %proof.id,
                    enrollment_written,
                    payment_written,
                    %reason,
                    "paid enrollment only partially written"
                );
                Err(SettlementError::UpstreamWrite {
                    enrollment_written,
                    payment_written,
                    reason,
                })
            }
        }
    }

    /// The audit marker is written before the enrollment. A failed audit
    /// write enrolls nobody.
    async fn settle_bypass(
        &self,
        course: &Course,
        student_id: StudentId,
    ) -> Result<EnrollmentOutcome> {
        let course_id = course.id.clone();
        let processor_mode = self.gateway.publishable_key().resolved_mode();
        let allowed = match self.bypass_policy {
            BypassPolicy::Always => true,
            BypassPolicy::UnconfiguredOnly => processor_mode == ProcessorMode::Mock,
            BypassPolicy::Never => false,
        };
        if !allowed {
            info!(course = %course_id, student = %student_id, policy = ?self.bypass_policy, "unpaid enrollment into paid course refused");
            return Err(SettlementError::BadRequest(
                "Payment is required to enroll in this course".to_string(),
            ));
        }

        if course.is_enrolled(&student_id) {
            debug!(course = %course_id, student = %student_id, "bypass repeat for enrolled student");
            return Ok(EnrollmentOutcome {
                course_id,
                student_id,
                path: SettlementPath::PaidBypass,
                newly_enrolled: false,
                payment_recorded: false,
            });
        }

        warn!(
            target: AUDIT_TARGET,
            event = "paid_enrollment_bypass",
            course = %course_id,
            student = %student_id,
            processor = ?processor_mode,
            "student enrolled into paid course without payment"
        );
        let event = AuditEvent {
            kind: AuditKind::PaidEnrollmentBypass,
            course_id: course_id.clone(),
            student_id: student_id.clone(),
            at_ms: chrono::Utc::now().timestamp_millis(),
        };
        if let Err(e) = self.audit.record(event).await {
            error!(
                course = %course_id,
                student = %student_id,
                error = %e,
                "bypass audit marker not written, enrollment skipped"
            );
            return Err(SettlementError::UpstreamWrite {
                enrollment_written: false,
                payment_written: false,
                reason: format!("audit log write failed: {e}"),
            });
        }

        let newly_enrolled = self.courses.add_student(&course_id, &student_id).await?;
        if !newly_enrolled {
            debug!(course = %course_id, student = %student_id, "student enrolled concurrently, audit marker is a duplicate");
        }

        Ok(EnrollmentOutcome {
            course_id,
            student_id,
            path: SettlementPath::PaidBypass,
            newly_enrolled,
            payment_recorded: false,
        })
    }

    /// Creates a payment intent for a paid course at its current price.
    pub async fn create_intent_for_course(&self, course_id: &str) -> Result<Tagged<PaymentIntent>> {
        let course_id = CourseId::parse(course_id)?;
        let course = self
            .courses
            .get(&course_id)
            .await?
            .ok_or_else(|| SettlementError::NotFound("Course not found".to_string()))?;
        if course.is_free() {
            return Err(SettlementError::BadRequest(
                "This course is free; no payment is needed".to_string(),
            ));
        }
        self.gateway.create_payment_intent(course.price.value()).await
    }

    pub fn publishable_key(&self) -> Tagged<PublishableKey> {
        self.gateway.publishable_key()
    }

    pub fn courses(&self) -> &CourseStoreBox {
        &self.courses
    }

    pub fn payments(&self) -> &PaymentRecordStoreBox {
        &self.payments
    }

    pub fn audit(&self) -> &AuditLogBox {
        &self.audit
    }
}
