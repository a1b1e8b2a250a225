//! Checkout orchestration for a single course, from the paying student's
//! side.
//!
//! The flow never renders a payment form it cannot complete: a mock key, a
//! mock-shaped secret or an unreachable processor all divert to an explicit
//! "enroll directly" offer. Once the processor reports a successful payment,
//! enrollment failures are reported as a support case, never as "try again".

use crate::domain::course::CourseId;
use crate::domain::payment::{
    ClientSecret, IntentStatus, ProcessorMode, PublishableKey, SettlementProof,
};
use crate::domain::ports::{CheckoutApi, EnrollmentReceipt, ProcessorConfirmation, Session};
use crate::error::{Result, SettlementError};
use std::sync::Arc;
use tracing::{debug, error, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
    Init,
    /// No authenticated student; the caller should redirect and come back.
    AuthRequired,
    ConfigLoading,
    MockMode,
    IntentLoading,
    BypassOffered,
    PaymentUiReady,
    Confirming,
    Enrolling,
    Enrolled,
    EnrollFailed,
    ConfirmFailed,
}

impl FlowState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Enrolled | Self::EnrollFailed | Self::ConfirmFailed | Self::AuthRequired
        )
    }
}

/// What to show the student.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    SignInRequired { redirect: String },
    /// Processor missing or unreachable; direct enrollment is on offer.
    PaymentsNotConfigured { detail: Option<String> },
    /// The processor's own message, verbatim.
    ConfirmationFailed(String),
    Enrolled(String),
    /// Free or direct enrollment failed. Nothing was charged.
    EnrollmentFailed(String),
    /// Payment went through, enrollment did not.
    PaidButNotEnrolled { payment_id: String },
}

impl Notice {
    pub fn text(&self) -> String {
        match self {
            Self::SignInRequired { .. } => "Please login to continue with payment".to_string(),
            Self::PaymentsNotConfigured { detail } => {
                let mut text = "Payment processing is not configured. \
                    You can enroll directly without payment."
                    .to_string();
                if let Some(detail) = detail {
                    text.push_str(&format!(" ({detail})"));
                }
                text
            }
            Self::ConfirmationFailed(message) => message.clone(),
            Self::Enrolled(message) => message.clone(),
            Self::EnrollmentFailed(message) => {
                format!("{message}. You have not been charged, so it is safe to try again.")
            }
            Self::PaidButNotEnrolled { payment_id } => format!(
                "Your payment went through but we could not complete your enrollment. \
                 Please contact support with payment reference {payment_id}. \
                 Do not pay again."
            ),
        }
    }
}

/// Drives one student through checkout for one course.
pub struct ClientPaymentFlow {
    api: Arc<dyn CheckoutApi>,
    session: Arc<dyn Session>,
    course_id: CourseId,
    state: FlowState,
    trail: Vec<FlowState>,
    checkout: Option<(PublishableKey, ClientSecret)>,
    notice: Option<Notice>,
    receipt: Option<EnrollmentReceipt>,
}

impl ClientPaymentFlow {
    pub fn new(api: Arc<dyn CheckoutApi>, session: Arc<dyn Session>, course_id: CourseId) -> Self {
        Self {
            api,
            session,
            course_id,
            state: FlowState::Init,
            trail: vec![FlowState::Init],
            checkout: None,
            notice: None,
            receipt: None,
        }
    }

    pub fn state(&self) -> FlowState {
        self.state
    }

    /// Every state visited so far, in order.
    pub fn trail(&self) -> &[FlowState] {
        &self.trail
    }

    pub fn notice(&self) -> Option<&Notice> {
        self.notice.as_ref()
    }

    pub fn receipt(&self) -> Option<&EnrollmentReceipt> {
        self.receipt.as_ref()
    }

    /// Publishable key and client secret, once the payment UI may render.
    pub fn checkout(&self) -> Option<&(PublishableKey, ClientSecret)> {
        self.checkout.as_ref()
    }

    fn enter(&mut self, state: FlowState) {
        debug!(course = %self.course_id, from = ?self.state, to = ?state, "checkout transition");
        self.state = state;
        self.trail.push(state);
    }

    fn expect_state(&self, expected: FlowState, action: &str) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(SettlementError::ValidationError(format!(
                "cannot {action} while checkout is in state {:?}",
                self.state
            )))
        }
    }

    fn require_sign_in(&mut self) -> FlowState {
        self.notice = Some(Notice::SignInRequired {
            redirect: format!("/login?redirect=/courses/{}/payment", self.course_id),
        });
        self.enter(FlowState::AuthRequired);
        self.state
    }

    fn offer_bypass(&mut self, detail: Option<String>) -> FlowState {
        self.checkout = None;
        self.notice = Some(Notice::PaymentsNotConfigured { detail });
        self.enter(FlowState::BypassOffered);
        self.state
    }

    /// Loads processor config and, when live, a payment intent.
    ///
    /// Ends in `PaymentUiReady`, `BypassOffered` or `AuthRequired`. Caller
    /// errors (unknown or free course) are returned as errors.
    pub async fn start(&mut self) -> Result<FlowState> {
        self.expect_state(FlowState::Init, "start checkout")?;
        if self.session.current_student().is_none() {
            return Ok(self.require_sign_in());
        }

        self.enter(FlowState::ConfigLoading);
        let key = match self.api.get_config().await {
            Ok(key) => key,
            Err(SettlementError::Unauthorized(_)) => return Ok(self.require_sign_in()),
            Err(SettlementError::UpstreamPayment(message)) => {
                self.enter(FlowState::MockMode);
                return Ok(self.offer_bypass(Some(message)));
            }
            Err(e) => return Err(e),
        };
        if key.resolved_mode() == ProcessorMode::Mock {
            self.enter(FlowState::MockMode);
            return Ok(self.offer_bypass(None));
        }

        self.enter(FlowState::IntentLoading);
        let secret = match self.api.create_payment_intent(&self.course_id).await {
            Ok(secret) => secret,
            Err(SettlementError::Unauthorized(_)) => return Ok(self.require_sign_in()),
            Err(SettlementError::UpstreamPayment(message)) => {
                return Ok(self.offer_bypass(Some(message)));
            }
            Err(e) => return Err(e),
        };
        if secret.resolved_mode() == ProcessorMode::Mock {
            warn!(course = %self.course_id, "processor configured but intent secret is not processor-issued");
            return Ok(self.offer_bypass(None));
        }

        self.checkout = Some((key.value, secret.value));
        self.enter(FlowState::PaymentUiReady);
        Ok(self.state)
    }

    /// Accepts the direct-enrollment offer.
    pub async fn enroll_directly(&mut self) -> Result<FlowState> {
        self.expect_state(FlowState::BypassOffered, "enroll directly")?;
        self.enter(FlowState::Enrolling);
        match self.api.enroll(&self.course_id, None).await {
            Ok(receipt) => {
                self.notice = Some(Notice::Enrolled(receipt.message.clone()));
                self.receipt = Some(receipt);
                self.enter(FlowState::Enrolled);
            }
            Err(e) => {
                self.notice = Some(Notice::EnrollmentFailed(e.to_string()));
                self.enter(FlowState::EnrollFailed);
            }
        }
        Ok(self.state)
    }

    /// Confirms the payment with the processor, then settles enrollment.
    pub async fn confirm_payment(
        &mut self,
        processor: &dyn ProcessorConfirmation,
    ) -> Result<FlowState> {
        self.expect_state(FlowState::PaymentUiReady, "confirm payment")?;
        let Some((key, secret)) = self.checkout.clone() else {
            return Err(SettlementError::internal("payment UI ready without checkout data"));
        };

        self.enter(FlowState::Confirming);
        let intent = match processor.confirm(&key, &secret).await {
            Ok(intent) if intent.status == IntentStatus::Succeeded => intent,
            Ok(intent) => {
                warn!(intent_id = %intent.id, status = %intent.status, "confirmation returned without success");
                self.notice = Some(Notice::ConfirmationFailed(
                    "An unexpected error occurred.".to_string(),
                ));
                self.enter(FlowState::ConfirmFailed);
                return Ok(self.state);
            }
            Err(rejection) => {
                self.notice = Some(Notice::ConfirmationFailed(rejection.message));
                self.enter(FlowState::ConfirmFailed);
                return Ok(self.state);
            }
        };

        self.enter(FlowState::Enrolling);
        let proof = SettlementProof::from_intent(&intent);
        match self.api.enroll(&self.course_id, Some(proof)).await {
            Ok(receipt) => {
                self.notice = Some(Notice::Enrolled(receipt.message.clone()));
                self.receipt = Some(receipt);
                self.enter(FlowState::Enrolled);
            }
            Err(e) => {
                error!(
                    course = %self.course_id,
                    payment_id = %intent.id,
                    error = %e,
                    "payment succeeded but enrollment failed"
                );
                self.notice = Some(Notice::PaidButNotEnrolled {
                    payment_id: intent.id.clone(),
                });
                self.enter(FlowState::EnrollFailed);
            }
        }
        Ok(self.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::course::StudentId;
    use crate::domain::enrollment::{EnrollmentOutcome, SettlementPath};
    use crate::domain::payment::{MinorUnits, PaymentIntent, Tagged};
    use crate::domain::ports::ConfirmationError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct Student(Option<&'static str>);

    impl Session for Student {
        fn current_student(&self) -> Option<StudentId> {
            self.0.map(|id| StudentId::parse(id).unwrap())
        }
    }

    #[derive(Default)]
    struct FakeApi {
        key: Option<Tagged<PublishableKey>>,
        secret: Option<Tagged<ClientSecret>>,
        fail_enroll: bool,
        enrolled_with: Mutex<Vec<Option<SettlementProof>>>,
    }

    impl FakeApi {
        fn live() -> Self {
            Self {
                key: Some(Tagged::live(PublishableKey("pk_test_123".into()))),
                secret: Some(Tagged::live(ClientSecret("pi_1_secret_2".into()))),
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl CheckoutApi for FakeApi {
        async fn get_config(&self) -> Result<Tagged<PublishableKey>> {
            self.key
                .clone()
                .ok_or_else(|| SettlementError::UpstreamPayment("down".into()))
        }

        async fn create_payment_intent(&self, _: &CourseId) -> Result<Tagged<ClientSecret>> {
            self.secret
                .clone()
                .ok_or_else(|| SettlementError::UpstreamPayment("down".into()))
        }

        async fn enroll(
            &self,
            course_id: &CourseId,
            proof: Option<SettlementProof>,
        ) -> Result<EnrollmentReceipt> {
            let paid = proof.is_some();
            self.enrolled_with.lock().unwrap().push(proof);
            if self.fail_enroll {
                return Err(SettlementError::UpstreamWrite {
                    enrollment_written: false,
                    payment_written: true,
                    reason: "db down".into(),
                });
            }
            Ok(EnrollmentReceipt {
                message: "Successfully enrolled into the course".into(),
                outcome: EnrollmentOutcome {
                    course_id: course_id.clone(),
                    student_id: StudentId::parse("s1").unwrap(),
                    path: if paid {
                        SettlementPath::PaidWithProof
                    } else {
                        SettlementPath::PaidBypass
                    },
                    newly_enrolled: true,
                    payment_recorded: paid,
                },
            })
        }
    }

    struct Processor(std::result::Result<IntentStatus, &'static str>);

    #[async_trait]
    impl ProcessorConfirmation for Processor {
        async fn confirm(
            &self,
            _: &PublishableKey,
            _: &ClientSecret,
        ) -> std::result::Result<PaymentIntent, ConfirmationError> {
            match self.0 {
                Ok(status) => Ok(PaymentIntent {
                    id: "pi_abc".into(),
                    amount: MinorUnits::new(499).unwrap(),
                    currency: "inr".into(),
                    status,
                    client_secret: ClientSecret("pi_abc_secret_x".into()),
                    created: 0,
                    payment_method: Some("pm_card".into()),
                }),
                Err(message) => Err(ConfirmationError {
                    message: message.into(),
                }),
            }
        }
    }

    fn flow(api: FakeApi, student: Option<&'static str>) -> (ClientPaymentFlow, Arc<FakeApi>) {
        let api = Arc::new(api);
        let flow = ClientPaymentFlow::new(
            api.clone(),
            Arc::new(Student(student)),
            CourseId::parse("c2").unwrap(),
        );
        (flow, api)
    }

    #[tokio::test]
    async fn test_requires_sign_in() {
        let (mut flow, api) = flow(FakeApi::live(), None);
        assert_eq!(flow.start().await.unwrap(), FlowState::AuthRequired);
        assert!(matches!(
            flow.notice(),
            Some(Notice::SignInRequired { redirect }) if redirect.contains("/courses/c2/payment")
        ));
        assert!(api.enrolled_with.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mock_key_offers_bypass() {
        let api = FakeApi {
            key: Some(Tagged::mock(PublishableKey("mock_pk_development".into()))),
            ..FakeApi::default()
        };
        let (mut flow, api) = flow(api, Some("s2"));
        assert_eq!(flow.start().await.unwrap(), FlowState::BypassOffered);
        assert_eq!(
            flow.trail(),
            &[
                FlowState::Init,
                FlowState::ConfigLoading,
                FlowState::MockMode,
                FlowState::BypassOffered
            ]
        );
        assert!(flow.checkout().is_none());

        assert_eq!(flow.enroll_directly().await.unwrap(), FlowState::Enrolled);
        assert_eq!(api.enrolled_with.lock().unwrap().as_slice(), &[None]);
    }

    #[tokio::test]
    async fn test_mock_shaped_secret_overrides_live_config() {
        let api = FakeApi {
            secret: Some(Tagged::live(ClientSecret("mock_pi_1_secret_mock".into()))),
            ..FakeApi::live()
        };
        let (mut flow, _) = flow(api, Some("s1"));
        assert_eq!(flow.start().await.unwrap(), FlowState::BypassOffered);
    }

    #[tokio::test]
    async fn test_unreachable_processor_offers_bypass() {
        let (mut flow, _) = flow(FakeApi::default(), Some("s1"));
        assert_eq!(flow.start().await.unwrap(), FlowState::BypassOffered);
        assert!(matches!(
            flow.notice(),
            Some(Notice::PaymentsNotConfigured { detail: Some(_) })
        ));
    }

    #[tokio::test]
    async fn test_successful_payment_enrolls_with_proof() {
        let (mut flow, api) = flow(FakeApi::live(), Some("s1"));
        assert_eq!(flow.start().await.unwrap(), FlowState::PaymentUiReady);
        let state = flow
            .confirm_payment(&Processor(Ok(IntentStatus::Succeeded)))
            .await
            .unwrap();

        assert_eq!(state, FlowState::Enrolled);
        let calls = api.enrolled_with.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].as_ref().unwrap().id, "pi_abc");
    }

    #[tokio::test]
    async fn test_confirmation_error_is_verbatim_and_skips_enroll() {
        let (mut flow, api) = flow(FakeApi::live(), Some("s1"));
        flow.start().await.unwrap();
        let state = flow
            .confirm_payment(&Processor(Err("Your card was declined.")))
            .await
            .unwrap();

        assert_eq!(state, FlowState::ConfirmFailed);
        assert_eq!(flow.notice().unwrap().text(), "Your card was declined.");
        assert!(api.enrolled_with.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_paid_but_not_enrolled_never_says_try_again() {
        let api = FakeApi {
            fail_enroll: true,
            ..FakeApi::live()
        };
        let (mut flow, _) = flow(api, Some("s1"));
        flow.start().await.unwrap();
        let state = flow
            .confirm_payment(&Processor(Ok(IntentStatus::Succeeded)))
            .await
            .unwrap();

        assert_eq!(state, FlowState::EnrollFailed);
        let text = flow.notice().unwrap().text();
        assert!(text.contains("contact support"));
        assert!(text.contains("pi_abc"));
        assert!(!text.to_lowercase().contains("try again"));
    }

    #[tokio::test]
    async fn test_out_of_order_actions_are_rejected() {
        let (mut flow, _) = flow(FakeApi::live(), Some("s1"));
        assert!(flow.enroll_directly().await.is_err());
        flow.start().await.unwrap();
        assert!(flow.enroll_directly().await.is_err());
        assert!(flow.start().await.is_err());
    }
}
