//! Unit tests for session leasing, expiry and invalidation.
//!
//! The manager reads `tokio::time::Instant`, so expiry is driven with a
//! paused clock.

use std::sync::Arc;
use std::time::Duration;

use agent_scribe::agent::session::{
    is_session_error, session_label, SessionManager, SessionPolicy, SessionTicket,
};

fn manager(idle_secs: u64, max_turns: u32) -> SessionManager {
    SessionManager::new(SessionPolicy {
        idle_limit: Duration::from_secs(idle_secs),
        max_turns,
    })
}

#[tokio::test(start_paused = true)]
async fn first_lease_creates_then_reuses() {
    let sessions = manager(60, 5);
    let (first, created) = sessions.lease();
    assert!(created);
    let (second, created_again) = sessions.lease();
    assert!(!created_again);
    assert_eq!(first, second);
    assert!(uuid::Uuid::parse_str(&first).is_ok(), "id must be a uuid");
}

#[tokio::test(start_paused = true)]
async fn idle_expiry_mints_new_id() {
    let sessions = manager(60, 0);
    let (first, _) = sessions.lease();
    sessions.touch(&first, true);

    tokio::time::advance(Duration::from_secs(59)).await;
    let (still, created) = sessions.lease();
    assert_eq!(still, first);
    assert!(!created);

    tokio::time::advance(Duration::from_secs(60)).await;
    let (fresh, created) = sessions.lease();
    assert!(created);
    assert_ne!(fresh, first);
}

#[tokio::test(start_paused = true)]
async fn failed_touch_refreshes_idle_clock() {
    let sessions = manager(60, 0);
    let (id, _) = sessions.lease();

    tokio::time::advance(Duration::from_secs(50)).await;
    sessions.touch(&id, false);
    tokio::time::advance(Duration::from_secs(50)).await;

    let (same, created) = sessions.lease();
    assert!(!created);
    assert_eq!(same, id);
    assert_eq!(sessions.current().expect("session").turns, 0);
}

#[tokio::test(start_paused = true)]
async fn turn_limit_mints_new_id() {
    let sessions = manager(0, 2);
    let (id, _) = sessions.lease();
    sessions.touch(&id, true);
    assert_eq!(sessions.lease().0, id);
    sessions.touch(&id, true);

    let (fresh, created) = sessions.lease();
    assert!(created);
    assert_ne!(fresh, id);
    assert_eq!(sessions.current().expect("session").turns, 0);
}

#[tokio::test(start_paused = true)]
async fn zero_limits_disable_expiry() {
    let sessions = manager(0, 0);
    let (id, _) = sessions.lease();
    for _ in 0..50 {
        sessions.touch(&id, true);
    }
    tokio::time::advance(Duration::from_secs(86_400)).await;
    assert_eq!(sessions.lease(), (id, false));
}

#[tokio::test(start_paused = true)]
async fn stale_id_touch_and_reset_are_ignored() {
    let sessions = manager(60, 5);
    let (id, _) = sessions.lease();

    sessions.touch("not-the-current-id", true);
    sessions.touch("", true);
    assert_eq!(sessions.current().expect("session").turns, 0);

    sessions.reset("not-the-current-id");
    assert_eq!(sessions.current().expect("session").id, id);

    sessions.reset(&id);
    assert!(sessions.current().is_none());
}

#[tokio::test(start_paused = true)]
async fn session_error_resets_slot() {
    let sessions = manager(60, 5);
    let (id, _) = sessions.lease();

    assert!(!sessions.reset_on_session_error(&id, "rate limited"));
    assert!(sessions.current().is_some());

    assert!(sessions.reset_on_session_error(&id, "Error: Session abc NOT FOUND"));
    assert!(sessions.current().is_none());
}

#[test]
fn session_error_detection() {
    assert!(is_session_error("session not found"));
    assert!(is_session_error("Invalid SESSION id"));
    assert!(!is_session_error("not found"));
    assert!(!is_session_error("session expired"));
}

#[test]
fn label_is_first_uuid_segment() {
    assert_eq!(session_label("1b4e28ba-2fa1-11d2-883f-0016d3cca427"), "1b4e28ba");
    assert_eq!(session_label(""), "-");
}

#[tokio::test(start_paused = true)]
async fn ticket_settles_against_its_manager() {
    let sessions = Arc::new(manager(60, 5));
    let ticket = SessionTicket::lease(&sessions);
    assert!(ticket.created());

    ticket.succeed();
    assert_eq!(sessions.current().expect("session").turns, 1);

    let again = SessionTicket::lease(&sessions);
    assert!(!again.created());
    assert_eq!(again.id(), ticket.id());

    again.fail_with_stderr("session not found");
    assert!(sessions.current().is_none());
}
