use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use be_payment_service::service::AppState;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

const DEFAULT_SUBSCRIPTION_SWEEP_SECS: u64 = 3600;
const DEFAULT_RECONCILE_SECS: u64 = 300;

/// How often the background billing jobs run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobSchedule {
    /// Subscription expiry sweep.
    pub subscription_sweep: Duration,
    /// Unlinked-payment activation and the stale pending payment reaper.
    pub reconcile: Duration,
}

impl Default for JobSchedule {
    fn default() -> Self {
        Self {
            subscription_sweep: Duration::from_secs(DEFAULT_SUBSCRIPTION_SWEEP_SECS),
            reconcile: Duration::from_secs(DEFAULT_RECONCILE_SECS),
        }
    }
}

impl JobSchedule {
    pub fn from_env() -> Result<Self, String> {
        let defaults = Self::default();
        Ok(Self {
            subscription_sweep: interval_from_env(
                "SUBSCRIPTION_SWEEP_INTERVAL_SECS",
                defaults.subscription_sweep,
            )?,
            reconcile: interval_from_env("RECONCILE_INTERVAL_SECS", defaults.reconcile)?,
        })
    }
}

fn interval_from_env(name: &str, default: Duration) -> Result<Duration, String> {
    match std::env::var(name) {
        Ok(raw) => parse_interval(name, &raw),
        Err(_) => Ok(default),
    }
}

fn parse_interval(name: &str, raw: &str) -> Result<Duration, String> {
    match raw.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
        _ => Err(format!("{name} must be a positive number of seconds, got '{raw}'")),
    }
}

/// Starts the expiry sweep, the unlinked-payment activation pass and the
/// stale pending payment reaper. Each task stops when `shutdown` fires.
pub fn spawn_billing_jobs(
    state: Arc<AppState>,
    schedule: JobSchedule,
    shutdown: watch::Receiver<()>,
) -> Vec<JoinHandle<()>> {
    let activator = state.activator.clone();
    let expiry = spawn_periodic(
        "subscription_expiry",
        schedule.subscription_sweep,
        shutdown.clone(),
        move || {
            let activator = activator.clone();
            async move {
                if let Err(e) = activator.expire_due().await {
                    error!("Failed to expire subscriptions: {}", e);
                }
            }
        },
    );

    let activator = state.activator.clone();
    let unlinked = spawn_periodic(
        "unlinked_payment_activation",
        schedule.reconcile,
        shutdown.clone(),
        move || {
            let activator = activator.clone();
            async move {
                if let Err(e) = activator.activate_unlinked_payments().await {
                    error!("Failed to activate unlinked payments: {}", e);
                }
            }
        },
    );

    let reaper = state.reaper();
    let stale = spawn_periodic("stale_payment_reaper", schedule.reconcile, shutdown, move || {
        let reaper = reaper.clone();
        async move {
            if let Err(e) = reaper.reap().await {
                error!("Failed to fail stale pending payments: {}", e);
            }
        }
    });

    vec![expiry, unlinked, stale]
}

fn spawn_periodic<F, Fut>(
    name: &'static str,
    period: Duration,
    mut shutdown: watch::Receiver<()>,
    mut job: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send,
{
    tokio::spawn(async move {
        info!(job = name, ?period, "Starting scheduled job");
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => job().await,
                _ = shutdown.changed() => {
                    info!(job = name, "Stopping scheduled job");
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn intervals_must_be_positive_seconds() {
        assert_eq!(
            parse_interval("RECONCILE_INTERVAL_SECS", " 60 "),
            Ok(Duration::from_secs(60))
        );
        assert!(parse_interval("RECONCILE_INTERVAL_SECS", "0").is_err());
        assert!(parse_interval("RECONCILE_INTERVAL_SECS", "hourly").is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn periodic_job_runs_each_tick_until_shutdown() {
        let runs = Arc::new(AtomicUsize::new(0));
        let (shutdown_tx, shutdown_rx) = watch::channel(());

        let counter = runs.clone();
        let handle = spawn_periodic("test", Duration::from_secs(60), shutdown_rx, move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        // First tick fires immediately, then one per period.
        tokio::time::sleep(Duration::from_secs(150)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 3);

        shutdown_tx.send(()).unwrap();
        handle.await.unwrap();

        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }
}
