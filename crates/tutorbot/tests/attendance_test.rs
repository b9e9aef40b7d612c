//! Attendance roll-calls driven through the engine.

mod common;

use std::sync::Arc;

use tempfile::TempDir;
use tutorbot::attendance::AttendanceError;
use tutorbot::error::EngineError;
use tutorbot::store::{FileRecordStore, RecordDir, RecordKey, RecordStore};

use common::{
    BrokenStore, CHANNEL, MockTransport, OPERATOR, admin, channel_message, dm, engine, member,
    visitor,
};

#[tokio::test]
async fn code_from_member_lands_in_saved_roster() {
    let tmp = TempDir::new().unwrap();
    let store = Arc::new(FileRecordStore::new(tmp.path()));
    let transport = MockTransport::new();
    let alice = member(1, "alice", Some("Alice"));
    transport.add_member(alice.clone());
    let (mut engine, _timers) = engine(&transport, store.clone());

    let started = engine.start_attendance(&admin(), "g1", "abc").await.unwrap();
    assert_eq!(started.code, "abc");
    assert!(engine.attendance().is_open("g1"));

    engine.handle_event(dm(&alice, "  ABC ")).await;
    assert_eq!(
        engine.attendance().roster("g1").unwrap(),
        ["Alice (alice)".to_string()]
    );
    assert_eq!(
        transport.direct_texts(alice.id),
        ["You are added to the attendance list."]
    );

    let report = engine.stop_attendance(&admin(), "g1").await.unwrap();
    assert!(report.saved());
    assert_eq!(report.roster, ["Alice (alice)"]);
    assert!(!engine.attendance().is_open("g1"));
    assert!(engine.attendance().roster("g1").unwrap().is_empty());

    let names = store.list(RecordDir::Attendance).await.unwrap();
    assert_eq!(names.len(), 1);
    assert!(names[0].starts_with("g1_"));
    let table = store
        .read_table(&RecordKey {
            dir: RecordDir::Attendance,
            name: names[0].clone(),
        })
        .await
        .unwrap();
    assert_eq!(table.header, ["Attendance"]);
    assert_eq!(table.rows, [["Alice (alice)"]]);

    let replies = transport.direct_texts(OPERATOR);
    assert_eq!(
        replies.first().map(String::as_str),
        Some("accepting messages in DM, please send attendance code.")
    );
    assert!(replies.contains(&"messages in DM are no longer accepted for code abc.".to_string()));
    assert_eq!(
        replies.last().map(String::as_str),
        Some("Attendance records have been saved to a CSV file.")
    );
}

#[tokio::test]
async fn code_posted_in_a_channel_is_acknowledged_there() {
    let tmp = TempDir::new().unwrap();
    let transport = MockTransport::new();
    let erin = member(6, "erin", None);
    transport.add_member(erin.clone());
    let (mut engine, _timers) = engine(&transport, Arc::new(FileRecordStore::new(tmp.path())));

    engine.start_attendance(&admin(), "g1", "abc").await.unwrap();
    engine.handle_event(channel_message(&erin, CHANNEL, "ABC")).await;
    engine.handle_event(channel_message(&erin, CHANNEL, "abc")).await;

    assert_eq!(engine.attendance().roster("g1").unwrap(), ["erin (erin)"]);
    let sent = transport.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].channel, CHANNEL);
    assert_eq!(sent[0].message.content, "You are added to the attendance list.");
    assert!(transport.direct_texts(erin.id).is_empty());
}

#[tokio::test]
async fn roster_card_lists_students() {
    let tmp = TempDir::new().unwrap();
    let transport = MockTransport::new();
    let (mut engine, _timers) = engine(&transport, Arc::new(FileRecordStore::new(tmp.path())));

    engine.start_attendance(&admin(), "G1", "xyz").await.unwrap();
    engine.stop_attendance(&admin(), "g1").await.unwrap();

    let card = transport
        .direct()
        .into_iter()
        .find_map(|d| d.message.card)
        .unwrap();
    assert_eq!(card.title, "Attendance for group g1 with code xyz");
    assert_eq!(card.fields[0].value, "No students in attendance.");
}

#[tokio::test]
async fn repeated_and_foreign_messages_are_ignored() {
    let tmp = TempDir::new().unwrap();
    let transport = MockTransport::new();
    let bob = member(2, "bob", None);
    transport.add_member(bob.clone());
    let stranger = member(3, "stranger", None);
    let (mut engine, _timers) = engine(&transport, Arc::new(FileRecordStore::new(tmp.path())));

    engine.start_attendance(&admin(), "g1", "abc").await.unwrap();
    engine.handle_event(dm(&bob, "abd")).await;
    assert!(engine.attendance().roster("g1").unwrap().is_empty());

    engine.handle_event(dm(&bob, "abc")).await;
    engine.handle_event(dm(&bob, "ABC")).await;
    engine.handle_event(dm(&stranger, "abc")).await;

    assert_eq!(engine.attendance().roster("g1").unwrap(), ["bob (bob)"]);
    assert_eq!(transport.direct_texts(bob.id).len(), 1);
    assert!(transport.direct_texts(stranger.id).is_empty());
}

#[tokio::test]
async fn starting_another_group_moves_the_code() {
    let tmp = TempDir::new().unwrap();
    let transport = MockTransport::new();
    let carol = member(4, "carol", None);
    transport.add_member(carol.clone());
    let (mut engine, _timers) = engine(&transport, Arc::new(FileRecordStore::new(tmp.path())));

    engine.start_attendance(&admin(), "g1", "abc").await.unwrap();
    let started = engine.start_attendance(&admin(), "g2", "def").await.unwrap();
    assert_eq!(started.group, "G2");
    assert_eq!(started.superseded.as_deref(), Some("g1"));
    assert!(!engine.attendance().is_open("g1"));

    engine.handle_event(dm(&carol, "abc")).await;
    engine.handle_event(dm(&carol, "def")).await;
    assert!(engine.attendance().roster("g1").unwrap().is_empty());
    assert_eq!(engine.attendance().roster("g2").unwrap(), ["carol (carol)"]);

    // Stopping the superseded group leaves the active code alone
    engine.stop_attendance(&admin(), "g1").await.unwrap();
    assert_eq!(engine.attendance().active_code(), Some("def"));
}

#[tokio::test]
async fn storage_failure_still_closes_the_group() {
    let transport = MockTransport::new();
    let dave = member(5, "dave", None);
    transport.add_member(dave.clone());
    let (mut engine, _timers) = engine(&transport, Arc::new(BrokenStore));

    engine.start_attendance(&admin(), "g1", "abc").await.unwrap();
    engine.handle_event(dm(&dave, "abc")).await;
    let report = engine.stop_attendance(&admin(), "g1").await.unwrap();

    assert!(!report.saved());
    assert!(report.persist_error.unwrap().contains("no space left"));
    assert_eq!(report.roster, ["dave (dave)"]);
    assert!(!engine.attendance().is_open("g1"));
    assert!(engine.attendance().roster("g1").unwrap().is_empty());
    assert_eq!(
        transport.direct_texts(OPERATOR).last().map(String::as_str),
        Some("⚠️ There was an error saving the attendance records.")
    );
}

#[tokio::test]
async fn unknown_group_and_unprivileged_actor_are_refused() {
    let tmp = TempDir::new().unwrap();
    let transport = MockTransport::new();
    let (mut engine, _timers) = engine(&transport, Arc::new(FileRecordStore::new(tmp.path())));

    let err = engine.start_attendance(&admin(), "g9", "abc").await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::Attendance(AttendanceError::UnknownGroup(ref g)) if g == "g9"
    ));
    assert_eq!(err.to_string(), "Incorrect group id.");

    let err = engine.start_attendance(&visitor(), "g1", "abc").await.unwrap_err();
    assert!(matches!(err, EngineError::PermissionDenied));
    assert!(!engine.attendance().is_open("g1"));

    let err = engine
        .start_attendance(&admin(), "g1", "far-too-long-code")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Attendance(AttendanceError::InvalidCode(_))
    ));
}
