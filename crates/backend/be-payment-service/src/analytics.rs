use std::time::Duration;

use posthog_rs::Event;
use tracing::warn;

const CAPTURE_TIMEOUT: Duration = Duration::from_secs(5);

fn capture_async(event: Event) {
    tokio::spawn(async move {
        match tokio::time::timeout(CAPTURE_TIMEOUT, posthog_rs::capture(event)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Failed to capture analytics event: {e}"),
            Err(_) => warn!("Analytics event capture timed out"),
        }
    });
}

pub fn track_stk_push_sent(amount: i64, has_plan: bool) {
    let mut event = Event::new_anon("stk_push_sent");
    event.insert_prop("amount", amount).ok();
    event.insert_prop("has_plan", has_plan).ok();
    capture_async(event);
}

pub fn track_stk_push_failed(has_plan: bool, error_kind: &str) {
    let mut event = Event::new_anon("stk_push_failed");
    event.insert_prop("has_plan", has_plan).ok();
    event.insert_prop("error_kind", error_kind).ok();
    capture_async(event);
}

pub fn track_payment_reconciled(status: &str, result_code: i64) {
    let mut event = Event::new_anon("payment_reconciled");
    event.insert_prop("status", status).ok();
    event.insert_prop("result_code", result_code).ok();
    capture_async(event);
}

pub fn track_callback_rejected(reason: &str) {
    let mut event = Event::new_anon("mpesa_callback_rejected");
    event.insert_prop("reason", reason).ok();
    capture_async(event);
}

pub fn track_subscription_activated(created: bool, via_callback: bool) {
    let mut event = Event::new_anon("subscription_activated");
    event.insert_prop("created", created).ok();
    event.insert_prop("via_callback", via_callback).ok();
    capture_async(event);
}

pub fn track_payment_status_checked(status: &str) {
    let mut event = Event::new_anon("payment_status_checked");
    event.insert_prop("status", status).ok();
    capture_async(event);
}
