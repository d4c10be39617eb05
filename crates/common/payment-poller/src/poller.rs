use std::time::Duration;

use bon::bon;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::PollError;
use crate::source::{PaymentStatusSource, RemoteStatus};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_MAX_ATTEMPTS: u32 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

#[bon]
impl PollPolicy {
    #[builder]
    pub fn new(
        #[builder(default = DEFAULT_POLL_INTERVAL)] interval: Duration,
        #[builder(default = DEFAULT_MAX_ATTEMPTS)] max_attempts: u32,
    ) -> Self {
        Self {
            interval,
            max_attempts,
        }
    }
}

/// Final result of polling one payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Success { mpesa_receipt_number: Option<String> },
    Failed,
    /// Still pending when the attempt budget ran out.
    Unknown,
    /// The backend has no payment with this id.
    NotFound,
}

impl PollOutcome {
    pub fn user_message(&self) -> &'static str {
        match self {
            PollOutcome::Success { .. } => "Payment received. Your plan is now active.",
            PollOutcome::Failed => "Payment failed. Please try again.",
            PollOutcome::Unknown => {
                "We could not confirm your payment yet. Check your payment history or contact support before paying again."
            }
            PollOutcome::NotFound => "We could not find this payment. Please start a new payment.",
        }
    }
}

/// Waits for a payment to leave `pending`, reading its status once per interval.
pub struct PaymentPoller<S> {
    source: S,
    policy: PollPolicy,
}

impl<S: PaymentStatusSource> PaymentPoller<S> {
    pub fn new(source: S, policy: PollPolicy) -> Self {
        Self { source, policy }
    }

    /// The first read happens one interval after the call. Failed reads use up
    /// an attempt without ending the loop, except for an unknown payment id.
    pub async fn wait_for(&self, payment_id: Uuid) -> PollOutcome {
        for attempt in 1..=self.policy.max_attempts {
            tokio::time::sleep(self.policy.interval).await;

            match self.source.fetch_status(payment_id).await {
                Ok(snapshot) => match snapshot.status {
                    RemoteStatus::Pending => {
                        debug!(%payment_id, attempt, "Payment still pending");
                    }
                    RemoteStatus::Success => {
                        info!(%payment_id, attempt, "Payment confirmed");
                        return PollOutcome::Success {
                            mpesa_receipt_number: snapshot.mpesa_receipt_number,
                        };
                    }
                    RemoteStatus::Failed => {
                        info!(%payment_id, attempt, "Payment failed");
                        return PollOutcome::Failed;
                    }
                },
                Err(PollError::NotFound(_)) => {
                    warn!(%payment_id, attempt, "Payment does not exist");
                    return PollOutcome::NotFound;
                }
                Err(e) => {
                    warn!(%payment_id, attempt, error = %e, "Failed to read payment status");
                }
            }
        }

        warn!(
            %payment_id,
            attempts = self.policy.max_attempts,
            "Gave up waiting for payment confirmation"
        );
        PollOutcome::Unknown
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use parking_lot::Mutex;
    use tokio::time::Instant;

    use super::*;
    use crate::source::StatusSnapshot;

    /// Replays scripted reads, then reports `pending` forever.
    struct ScriptedSource {
        script: Mutex<VecDeque<Result<StatusSnapshot, PollError>>>,
        reads: Mutex<Vec<Instant>>,
    }

    impl ScriptedSource {
        fn new(script: Vec<Result<StatusSnapshot, PollError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                reads: Mutex::new(Vec::new()),
            }
        }

        fn read_count(&self) -> usize {
            self.reads.lock().len()
        }
    }

    impl PaymentStatusSource for &ScriptedSource {
        async fn fetch_status(&self, _payment_id: Uuid) -> Result<StatusSnapshot, PollError> {
            self.reads.lock().push(Instant::now());
            self.script
                .lock()
                .pop_front()
                .unwrap_or(Ok(StatusSnapshot::new(RemoteStatus::Pending)))
        }
    }

    fn pending() -> Result<StatusSnapshot, PollError> {
        Ok(StatusSnapshot::new(RemoteStatus::Pending))
    }

    #[test]
    fn default_policy_is_ten_seconds_thirty_attempts() {
        let policy = PollPolicy::default();
        assert_eq!(policy.interval, Duration::from_secs(10));
        assert_eq!(policy.max_attempts, 30);
        assert_eq!(PollPolicy::builder().build(), policy);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_budget_is_unknown_without_extra_read() {
        let source = ScriptedSource::new(Vec::new());
        let poller = PaymentPoller::new(&source, PollPolicy::default());
        let started = Instant::now();

        let outcome = poller.wait_for(Uuid::now_v7()).await;

        assert_eq!(outcome, PollOutcome::Unknown);
        assert_eq!(source.read_count(), 30);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(300) && elapsed < Duration::from_secs(301));
        assert!(outcome.user_message().contains("contact support"));
    }

    #[tokio::test(start_paused = true)]
    async fn first_read_waits_one_interval() {
        let source = ScriptedSource::new(vec![Ok(StatusSnapshot::new(RemoteStatus::Failed))]);
        let poller = PaymentPoller::new(&source, PollPolicy::default());
        let started = Instant::now();

        let outcome = poller.wait_for(Uuid::now_v7()).await;

        assert_eq!(outcome, PollOutcome::Failed);
        assert_eq!(outcome.user_message(), "Payment failed. Please try again.");
        let reads = source.reads.lock();
        assert_eq!(reads.len(), 1);
        let first_read = reads[0] - started;
        assert!(first_read >= Duration::from_secs(10) && first_read < Duration::from_secs(11));
    }

    #[tokio::test(start_paused = true)]
    async fn success_stops_polling() {
        let source = ScriptedSource::new(vec![
            pending(),
            pending(),
            Ok(StatusSnapshot {
                status: RemoteStatus::Success,
                mpesa_receipt_number: Some("NLJ7RT61SV".into()),
            }),
        ]);
        let poller = PaymentPoller::new(&source, PollPolicy::default());

        let outcome = poller.wait_for(Uuid::now_v7()).await;

        assert_eq!(
            outcome,
            PollOutcome::Success {
                mpesa_receipt_number: Some("NLJ7RT61SV".into())
            }
        );
        assert_eq!(source.read_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn read_errors_consume_attempts() {
        let source = ScriptedSource::new(vec![
            Err(PollError::Status(503)),
            Err(PollError::Status(502)),
            pending(),
        ]);
        let policy = PollPolicy::builder().max_attempts(3).build();
        let poller = PaymentPoller::new(&source, policy);

        let outcome = poller.wait_for(Uuid::now_v7()).await;

        assert_eq!(outcome, PollOutcome::Unknown);
        assert_eq!(source.read_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_payment_stops_polling() {
        let payment_id = Uuid::now_v7();
        let source = ScriptedSource::new(vec![pending(), Err(PollError::NotFound(payment_id))]);
        let poller = PaymentPoller::new(&source, PollPolicy::default());
        let started = Instant::now();

        let outcome = poller.wait_for(payment_id).await;

        assert_eq!(outcome, PollOutcome::NotFound);
        assert_eq!(source.read_count(), 2);
        assert!(started.elapsed() < Duration::from_secs(21));
    }
}
