//! End-to-end chat flows over in-memory sockets.
//!
//! Each test drives real client tasks and a real hub actor; only the
//! socket and the message store are substituted.
//!
//! Tests CAN use `.unwrap()` and `.expect()`.

mod common;

use common::{Harness, DOCTOR, PATIENT, SESSION};
use consult_core::{MessageKind, MessageStore, Role, SessionStore, UserId};
use consult_protocol::{InboundFrame, ServerFrame};
use consultd::client::{attach, ClientError, ConnectRequest};
use consultd::hub::{HubError, LeaveReason, RoomEvent};

// ============================================================================
// Lifecycle Scenarios
// ============================================================================

#[tokio::test]
async fn test_first_participant_creates_room_and_messages_persist() {
    let harness = Harness::new();
    let mut doctor = harness.connect(DOCTOR, Role::Doctor).await;

    assert_eq!(harness.members().await, vec![DOCTOR]);

    doctor.say("hello");
    harness.wait_for_saves(1).await;

    let history = harness.messages.history(SESSION).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].body, "hello");
    assert_eq!(history[0].sender_id, DOCTOR);

    // No peer, no echo
    doctor.expect_silence().await;
}

#[tokio::test]
async fn test_message_reaches_other_participant_once() {
    let harness = Harness::new();
    let mut doctor = harness.connect(DOCTOR, Role::Doctor).await;
    let mut patient = harness.connect(PATIENT, Role::Patient).await;

    assert_eq!(harness.members().await, vec![DOCTOR, PATIENT]);

    doctor.say("are you there?");

    match patient.expect_frame().await {
        ServerFrame::Message(message) => {
            assert_eq!(message.sender_id, DOCTOR);
            assert_eq!(message.session_id, SESSION);
            assert_eq!(message.message, "are you there?");
            assert_eq!(message.message_type, MessageKind::Text);
            assert_eq!(message.sender_name, "Dr. Grey");
            assert_eq!(message.sender_photo.as_deref(), Some("https://img/1.png"));
            assert!(!message.is_typing);
        }
        other => panic!("expected message, got {other:?}"),
    }

    patient.expect_silence().await;
    doctor.expect_silence().await;
}

#[tokio::test]
async fn test_typing_is_relayed_but_never_saved() {
    let harness = Harness::new();
    let doctor = harness.connect(DOCTOR, Role::Doctor).await;
    let mut patient = harness.connect(PATIENT, Role::Patient).await;

    for _ in 0..3 {
        doctor.send(&InboundFrame::typing());
    }

    for _ in 0..3 {
        assert_eq!(
            patient.expect_frame().await,
            ServerFrame::Typing {
                session_id: SESSION,
                sender_id: DOCTOR,
                is_typing: true,
            }
        );
    }

    patient.expect_silence().await;
    assert_eq!(harness.messages.save_calls(), 0);
    assert!(harness.messages.history(SESSION).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_disconnect_leaves_peer_unaffected() {
    let harness = Harness::new();
    let mut doctor = harness.connect(DOCTOR, Role::Doctor).await;
    let patient = harness.connect(PATIENT, Role::Patient).await;

    assert!(patient.peer.fail("connection reset"));
    harness.wait_for_members(&[DOCTOR]).await;
    patient.finished().await;

    doctor.say("still there?");
    harness.wait_for_saves(1).await;

    // The doctor sees neither an error nor its own message
    doctor.expect_silence().await;
    assert_eq!(harness.members().await, vec![DOCTOR]);
}

#[tokio::test]
async fn test_session_end_closes_room_and_refuses_late_joins() {
    let harness = Harness::new();
    let mut events = harness.hub.subscribe();
    let mut doctor = harness.connect(DOCTOR, Role::Doctor).await;
    let mut patient = harness.connect(PATIENT, Role::Patient).await;

    harness.sessions.end_session(SESSION).await.unwrap();

    for participant in [&mut doctor, &mut patient] {
        assert_eq!(
            participant.expect_frame().await,
            ServerFrame::session_ended(SESSION)
        );
        participant.expect_closed().await;
    }

    assert_eq!(harness.hub.room_count().await, 0);
    assert!(harness.hub.room_members(SESSION).await.is_none());

    let late = harness.try_connect(PATIENT, Role::Patient).await;
    assert!(matches!(
        late,
        Err(ClientError::Hub(HubError::SessionNotOngoing(id))) if id == SESSION
    ));
    assert_eq!(harness.hub.room_count().await, 0);

    // The room closed exactly once
    let mut closed = 0;
    while let Ok(event) = events.try_recv() {
        if event == (RoomEvent::RoomClosed { session_id: SESSION }) {
            closed += 1;
        }
    }
    assert_eq!(closed, 1);

    doctor.finished().await;
    patient.finished().await;
}

#[tokio::test]
async fn test_end_tombstone_wins_over_stale_store() {
    let harness = Harness::new();
    let _doctor = harness.connect(DOCTOR, Role::Doctor).await;

    // The hub learns of the end before the store does
    assert!(harness.hub.end_session(SESSION).await.unwrap());

    let late = harness.try_connect(DOCTOR, Role::Doctor).await;
    assert!(matches!(
        late,
        Err(ClientError::Hub(HubError::SessionNotOngoing(_)))
    ));
    assert_eq!(harness.hub.room_count().await, 0);
}

// ============================================================================
// Registration Rules
// ============================================================================

#[tokio::test]
async fn test_stranger_and_wrong_role_are_forbidden() {
    let harness = Harness::new();

    let stranger = harness.try_connect(UserId::new(99), Role::Patient).await;
    assert!(matches!(
        stranger,
        Err(ClientError::Hub(HubError::Forbidden { .. }))
    ));

    let impostor = harness.try_connect(PATIENT, Role::Doctor).await;
    assert!(matches!(
        impostor,
        Err(ClientError::Hub(HubError::Forbidden { .. }))
    ));

    assert_eq!(harness.hub.room_count().await, 0);
}

#[tokio::test]
async fn test_reconnect_replaces_previous_connection() {
    let harness = Harness::new();
    let mut events = harness.hub.subscribe();

    let mut first = harness.connect(DOCTOR, Role::Doctor).await;
    let mut second = harness.connect(DOCTOR, Role::Doctor).await;
    let patient = harness.connect(PATIENT, Role::Patient).await;

    // The replaced socket is closed without a notice
    first.expect_closed().await;
    let first_id = first.connection_id;
    first.finished().await;

    // The stale connection's unregister did not evict the replacement
    assert_eq!(harness.members().await, vec![DOCTOR, PATIENT]);

    patient.say("hi doctor");
    match second.expect_frame().await {
        ServerFrame::Message(message) => assert_eq!(message.message, "hi doctor"),
        other => panic!("expected message, got {other:?}"),
    }

    let mut replaced = false;
    while let Ok(event) = events.try_recv() {
        if let RoomEvent::MemberLeft {
            connection_id,
            reason: LeaveReason::Replaced,
            ..
        } = event
        {
            assert_eq!(connection_id, first_id);
            replaced = true;
        }
    }
    assert!(replaced);
}

#[tokio::test]
async fn test_unspawned_client_leaves_room_when_dropped() {
    let harness = Harness::new();
    let request = ConnectRequest {
        session_id: SESSION,
        user_id: PATIENT,
        role: Role::Patient,
    };

    let dropped = attach(&harness.hub, &harness.stores, &harness.chat, request)
        .await
        .unwrap();
    assert_eq!(harness.members().await, vec![PATIENT]);
    drop(dropped);
    harness.wait_for_members(&[]).await;

    let abandoned = attach(&harness.hub, &harness.stores, &harness.chat, request)
        .await
        .unwrap();
    abandoned.abandon().await;
    assert_eq!(harness.members().await, Vec::<UserId>::new());

    // The room itself stays until the session ends
    assert_eq!(harness.hub.room_count().await, 1);
}

// ============================================================================
// Failure Containment
// ============================================================================

#[tokio::test]
async fn test_persistence_failure_is_reported_to_sender_only() {
    let harness = Harness::new();
    let mut doctor = harness.connect(DOCTOR, Role::Doctor).await;
    let mut patient = harness.connect(PATIENT, Role::Patient).await;

    harness.messages.set_failing(true);
    doctor.say("lost");

    match doctor.expect_frame().await {
        ServerFrame::Error { message } => assert!(message.contains("could not be saved")),
        other => panic!("expected error notice, got {other:?}"),
    }
    patient.expect_silence().await;

    // The connection survives and the next message goes through
    harness.messages.set_failing(false);
    doctor.say("found");
    match patient.expect_frame().await {
        ServerFrame::Message(message) => assert_eq!(message.message, "found"),
        other => panic!("expected message, got {other:?}"),
    }
}

#[tokio::test]
async fn test_malformed_frames_get_error_notice_and_connection_stays() {
    let harness = Harness::new();
    let mut doctor = harness.connect(DOCTOR, Role::Doctor).await;
    let mut patient = harness.connect(PATIENT, Role::Patient).await;

    assert!(doctor.peer.send_text("{not json"));
    assert!(matches!(doctor.expect_frame().await, ServerFrame::Error { .. }));

    doctor.send(&InboundFrame::text("   "));
    assert_eq!(
        doctor.expect_frame().await,
        ServerFrame::error("text message is empty")
    );

    doctor.send(&InboundFrame::attachment("", "caption"));
    assert!(matches!(doctor.expect_frame().await, ServerFrame::Error { .. }));

    patient.expect_silence().await;
    assert_eq!(harness.messages.save_calls(), 0);

    doctor.say("valid");
    match patient.expect_frame().await {
        ServerFrame::Message(message) => assert_eq!(message.message, "valid"),
        other => panic!("expected message, got {other:?}"),
    }
}

// ============================================================================
// Ordering
// ============================================================================

#[tokio::test]
async fn test_single_sender_order_is_preserved() {
    let harness = Harness::new();
    let doctor = harness.connect(DOCTOR, Role::Doctor).await;
    let mut patient = harness.connect(PATIENT, Role::Patient).await;

    for i in 0..20 {
        doctor.say(&format!("message {i}"));
    }

    for i in 0..20 {
        match patient.expect_frame().await {
            ServerFrame::Message(message) => assert_eq!(message.message, format!("message {i}")),
            other => panic!("expected message, got {other:?}"),
        }
    }

    let history = harness.messages.history(SESSION).await.unwrap();
    let bodies: Vec<_> = history.iter().map(|m| m.body.as_str()).collect();
    let expected: Vec<String> = (0..20).map(|i| format!("message {i}")).collect();
    assert_eq!(bodies, expected.iter().map(String::as_str).collect::<Vec<_>>());
    assert!(history.windows(2).all(|w| w[0].id < w[1].id && w[0].created_at < w[1].created_at));
}

#[tokio::test]
async fn test_attachment_carries_reference() {
    let harness = Harness::new();
    let patient = harness.connect(PATIENT, Role::Patient).await;
    let mut doctor = harness.connect(DOCTOR, Role::Doctor).await;

    patient.send(&InboundFrame::attachment("uploads/scan.png", "my scan"));

    match doctor.expect_frame().await {
        ServerFrame::Message(message) => {
            assert_eq!(message.message_type, MessageKind::Attachment);
            assert_eq!(message.attachment, "uploads/scan.png");
            assert_eq!(message.message, "my scan");
            assert_eq!(message.sender_name, "Pat");
            assert_eq!(message.sender_photo, None);
        }
        other => panic!("expected message, got {other:?}"),
    }
}
