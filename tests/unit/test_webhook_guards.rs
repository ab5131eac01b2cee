use chrono::{Duration as ChronoDuration, Utc};
use kommo::core::types::ErrorCategory;
use kommo::core::webhook::{
    compute_signature, verify_signature, verify_timestamp, DuplicateCache, EventType, WebhookEvent,
};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const SECRET: &str = "kommo-shared-secret";
const BODY: &[u8] = br#"{"event_type":"lead_added","entity_id":42,"created_at":1700000000}"#;

#[test]
fn test_signature_roundtrip_and_single_byte_mutations() {
    let signature = compute_signature(BODY, SECRET).unwrap();
    assert!(verify_signature(BODY, &signature, SECRET));
    assert!(verify_signature(BODY, &format!("sha256={}", signature), SECRET));
    assert!(!verify_signature(BODY, &signature, "other-secret"));

    for index in 0..BODY.len() {
        let mut mutated = BODY.to_vec();
        mutated[index] ^= 0x01;
        assert!(
            !verify_signature(&mutated, &signature, SECRET),
            "body mutation at {} verified",
            index
        );
    }

    let hex_digits = "0123456789abcdef";
    for index in 0..signature.len() {
        let mut mutated: Vec<char> = signature.chars().collect();
        let current = mutated[index];
        mutated[index] = hex_digits
            .chars()
            .find(|digit| *digit != current)
            .unwrap();
        let mutated: String = mutated.into_iter().collect();
        assert!(
            !verify_signature(BODY, &mutated, SECRET),
            "signature mutation at {} verified",
            index
        );
    }
}

#[test]
fn test_signature_rejects_garbage() {
    assert!(!verify_signature(BODY, "not-hex", SECRET));
    assert!(!verify_signature(BODY, "", SECRET));
    let signature = compute_signature(BODY, SECRET).unwrap();
    assert!(!verify_signature(BODY, &signature, ""));
}

#[test]
fn test_timestamp_window_with_default_max_age() {
    let max_age = Duration::from_secs(300);
    let now = Utc::now().timestamp();
    assert!(!verify_timestamp(now - 301, now, max_age));
    assert!(verify_timestamp(now - 100, now, max_age));
    assert!(verify_timestamp(now - 300, now, max_age));
    assert!(verify_timestamp(now + 100, now, max_age));
    assert!(!verify_timestamp(now + 301, now, max_age));
}

#[test]
fn test_duplicate_window_expiry() {
    let cache = DuplicateCache::new(Duration::from_secs(60));
    let event = WebhookEvent::parse(&json!({
        "entity_id": 42, "event_type": "lead_added", "created_at": 1700000000
    }))
    .unwrap();
    let start = Utc::now();
    let at = |offset: i64| (start + ChronoDuration::seconds(offset)).timestamp_millis();

    assert!(!cache.is_duplicate(&event, at(0)));
    assert!(cache.is_duplicate(&event, at(30)));
    assert!(!cache.is_duplicate(&event, at(61)));
    assert!(cache.is_duplicate(&event, at(62)));
}

#[test]
fn test_distinct_fingerprints_do_not_collide() {
    let cache = DuplicateCache::new(Duration::from_secs(60));
    let now = Utc::now().timestamp_millis();
    let lead = WebhookEvent::parse(&json!({"entity_id": 1, "event_type": "lead_added", "created_at": 10})).unwrap();
    let later = WebhookEvent::parse(&json!({"entity_id": 1, "event_type": "lead_added", "created_at": 11})).unwrap();
    let updated = WebhookEvent::parse(&json!({"entity_id": 1, "event_type": "lead_updated", "created_at": 10})).unwrap();
    assert!(!cache.is_duplicate(&lead, now));
    assert!(!cache.is_duplicate(&later, now));
    assert!(!cache.is_duplicate(&updated, now));
    assert_eq!(cache.len(), 3);
}

#[test]
fn test_concurrent_first_sightings_admit_exactly_one() {
    let cache = Arc::new(DuplicateCache::new(Duration::from_secs(60)));
    let firsts = Arc::new(AtomicUsize::new(0));
    let now = Utc::now().timestamp_millis();

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let cache = cache.clone();
            let firsts = firsts.clone();
            thread::spawn(move || {
                if !cache.check_fingerprint("lead_added:42:1700000000", now) {
                    firsts.fetch_add(1, Ordering::SeqCst);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(firsts.load(Ordering::SeqCst), 1);
}

#[test]
fn test_parse_valid_and_missing_entity() {
    let event = WebhookEvent::parse(&json!({
        "entity_id": 42, "event_type": "lead_added", "created_at": 1700000000
    }))
    .unwrap();
    assert_eq!(event.entity_id, 42);
    assert_eq!(event.event_type, "lead_added".parse::<EventType>().unwrap());
    assert_eq!(event.entity_type, "leads");

    let err = WebhookEvent::parse(&json!({"event_type": "lead_added", "created_at": 1700000000}))
        .unwrap_err();
    assert_eq!(err.category, ErrorCategory::MalformedEventError);
}

#[test]
fn test_unknown_event_type_is_malformed() {
    let err = WebhookEvent::parse(&json!({
        "entity_id": 1, "event_type": "pipeline_added", "created_at": 1
    }))
    .unwrap_err();
    assert_eq!(err.category, ErrorCategory::MalformedEventError);
    assert_eq!(EventType::all().count(), 15);
}
