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

pub fn track_checkout_session_created(plan: &str, signed_in: bool) {
    let mut event = Event::new_anon("checkout_session_created");
    event.insert_prop("plan", plan).ok();
    event.insert_prop("signed_in", signed_in).ok();
    capture_async(event);
}

pub fn track_checkout_session_creation_failed(plan: &str, error_kind: &str) {
    let mut event = Event::new_anon("checkout_session_creation_failed");
    event.insert_prop("plan", plan).ok();
    event.insert_prop("error_kind", error_kind).ok();
    capture_async(event);
}

pub fn track_subscription_status_checked(plan: &str, status: &str) {
    let mut event = Event::new_anon("subscription_status_checked");
    event.insert_prop("plan", plan).ok();
    event.insert_prop("status", status).ok();
    capture_async(event);
}

pub fn track_webhook_processed(event_type: &str, outcome: &str) {
    let mut event = Event::new_anon("webhook_processed");
    event.insert_prop("event_type", event_type).ok();
    event.insert_prop("outcome", outcome).ok();
    capture_async(event);
}
