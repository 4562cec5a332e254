//! Event directory behaviour over the in-memory store.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use attendance_core::types::{EventForm, EventId, UserId};
use attendance_core::{ErrorClass, ServiceError};
use attendance_testing::{EventFormBuilder, TestHarness, test_time};
use chrono::Duration;

#[tokio::test]
async fn test_create_stores_only_set_fields() {
    let harness = TestHarness::new();
    let event_id = harness
        .create(EventFormBuilder::new("Book club").capacity(12).build())
        .await;

    let view = harness.directory.get(event_id, None).await.unwrap();
    assert_eq!(view.id, event_id);
    assert_eq!(view.owner_id, harness.organizer);
    assert_eq!(view.details.title.as_deref(), Some("Book club"));
    assert!(view.details.limit_count);
    assert_eq!(view.details.max_count, Some(12));
    assert!(view.details.description.is_none());
    assert!(view.details.deadline.is_none());
    assert!(!view.details.manual_stop);
    assert!(!view.joined);
}

#[tokio::test]
async fn test_get_reports_joined_for_viewer_only() {
    let harness = TestHarness::new();
    let member = UserId::new();
    let stranger = UserId::new();
    let event_id = harness.create(EventFormBuilder::new("Picnic").build()).await;
    harness.roster.join(member, event_id).await.unwrap();

    assert!(harness.directory.get(event_id, Some(member)).await.unwrap().joined);
    assert!(!harness.directory.get(event_id, Some(stranger)).await.unwrap().joined);
    assert!(!harness.directory.get(event_id, None).await.unwrap().joined);
}

#[tokio::test]
async fn test_get_missing_event_is_not_found_with_or_without_viewer() {
    let harness = TestHarness::new();
    let missing = EventId::new();

    for viewer in [None, Some(UserId::new())] {
        let err = harness.directory.get(missing, viewer).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound { event_id } if event_id == missing));
        assert_eq!(err.class(), ErrorClass::NotFound);
    }
}

#[tokio::test]
async fn test_list_is_newest_first_with_joined_flags() {
    let harness = TestHarness::new();
    let viewer = UserId::new();
    let first = harness.create(EventFormBuilder::new("First").build()).await;
    let second = harness.create(EventFormBuilder::new("Second").build()).await;
    let third = harness.create(EventFormBuilder::new("Third").build()).await;
    harness.roster.join(viewer, second).await.unwrap();

    let listed = harness.directory.list(Some(viewer)).await.unwrap();
    let summary: Vec<_> = listed.iter().map(|view| (view.id, view.joined)).collect();
    assert_eq!(summary, vec![(third, false), (second, true), (first, false)]);

    let anonymous = harness.directory.list(None).await.unwrap();
    assert_eq!(anonymous.len(), 3);
    assert!(anonymous.iter().all(|view| !view.joined));
}

#[tokio::test]
async fn test_list_empty_directory() {
    let harness = TestHarness::new();
    assert!(harness.directory.list(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_update_merges_set_fields() {
    let harness = TestHarness::new();
    let event_id = harness
        .create(EventFormBuilder::new("Hackathon").capacity(50).build())
        .await;

    harness
        .directory
        .update(
            event_id,
            EventForm {
                description: Some("Bring a laptop".to_string()),
                max_count: Some(80),
                ..EventForm::default()
            },
        )
        .await
        .unwrap();

    let details = harness.directory.get(event_id, None).await.unwrap().details;
    assert_eq!(details.title.as_deref(), Some("Hackathon"));
    assert_eq!(details.description.as_deref(), Some("Bring a laptop"));
    assert_eq!(details.max_count, Some(80));
    assert!(details.limit_count);
}

#[tokio::test]
async fn test_update_keeps_roster() {
    let harness = TestHarness::new();
    let user = UserId::new();
    let event_id = harness.create(EventFormBuilder::new("Choir").build()).await;
    harness.roster.join(user, event_id).await.unwrap();

    harness
        .directory
        .update(event_id, EventFormBuilder::new("Choir practice").build())
        .await
        .unwrap();

    let event = harness.store.event(event_id).unwrap();
    assert!(event.is_member(&user));
    assert_eq!(event.details.title.as_deref(), Some("Choir practice"));
}

#[tokio::test]
async fn test_update_missing_event_is_not_found() {
    let harness = TestHarness::new();
    let err = harness
        .directory
        .update(EventId::new(), EventForm::default())
        .await
        .unwrap_err();
    assert_eq!(err.code(), "NOT_FOUND");
    assert_eq!(harness.directory.list(None).await.unwrap().len(), 0);
}

#[tokio::test]
async fn test_is_stopped_follows_end() {
    let harness = TestHarness::new();
    let open = harness.create(EventFormBuilder::new("Open").build()).await;
    let ended = harness
        .create(
            EventFormBuilder::new("Ended")
                .end(test_time() - Duration::hours(1))
                .build(),
        )
        .await;
    let ending_now = harness
        .create(EventFormBuilder::new("Ending now").end(test_time()).build())
        .await;

    assert!(!harness.directory.is_stopped(open).await.unwrap());
    assert!(harness.directory.is_stopped(ended).await.unwrap());
    assert!(!harness.directory.is_stopped(ending_now).await.unwrap());

    let later = harness.at(test_time() + Duration::seconds(1));
    assert!(later.directory.is_stopped(ending_now).await.unwrap());
}

#[tokio::test]
async fn test_is_stopped_missing_event() {
    let harness = TestHarness::new();
    let err = harness.directory.is_stopped(EventId::new()).await.unwrap_err();
    assert!(matches!(err, ServiceError::NotFound { .. }));
}

#[tokio::test]
async fn test_stop_sets_end_to_now() {
    let harness = TestHarness::new();
    let event_id = harness
        .create(EventFormBuilder::new("Open mic").manual_stop().build())
        .await;

    let end = harness.directory.stop(event_id).await.unwrap();
    assert_eq!(end, test_time());
    assert_eq!(
        harness.directory.get(event_id, None).await.unwrap().details.end,
        Some(test_time())
    );

    let later = harness.at(test_time() + Duration::minutes(5));
    assert!(later.directory.is_stopped(event_id).await.unwrap());
}

#[tokio::test]
async fn test_stop_requires_manual_stop() {
    let harness = TestHarness::new();
    let event_id = harness.create(EventFormBuilder::new("Gala").build()).await;

    let err = harness.directory.stop(event_id).await.unwrap_err();
    assert_eq!(err.code(), "IS_NOT_MANUAL_STOP");
    assert_eq!(err.class(), ErrorClass::BadRequest);
    assert!(harness.store.event(event_id).unwrap().details.end.is_none());
}

#[tokio::test]
async fn test_stop_twice_is_rejected() {
    let harness = TestHarness::new();
    let event_id = harness
        .create(EventFormBuilder::new("Jam").manual_stop().build())
        .await;
    harness.directory.stop(event_id).await.unwrap();

    let later = harness.at(test_time() + Duration::hours(1));
    let err = later.directory.stop(event_id).await.unwrap_err();
    assert_eq!(err.code(), "HAS_STOPPED");
    assert_eq!(
        harness.store.event(event_id).unwrap().details.end,
        Some(test_time())
    );
}

#[tokio::test]
async fn test_stop_with_preset_end_is_rejected() {
    let harness = TestHarness::new();
    let event_id = harness
        .create(
            EventFormBuilder::new("Festival")
                .manual_stop()
                .end(test_time() + Duration::days(2))
                .build(),
        )
        .await;

    let err = harness.directory.stop(event_id).await.unwrap_err();
    assert!(matches!(err, ServiceError::HasStopped { .. }));
}

#[tokio::test]
async fn test_restart_clears_end() {
    let harness = TestHarness::new();
    let event_id = harness
        .create(EventFormBuilder::new("Quiz").manual_stop().build())
        .await;
    harness.directory.stop(event_id).await.unwrap();

    harness.directory.restart(event_id).await.unwrap();

    let later = harness.at(test_time() + Duration::hours(1));
    assert!(!later.directory.is_stopped(event_id).await.unwrap());
    assert!(harness.store.event(event_id).unwrap().details.end.is_none());
}

#[tokio::test]
async fn test_restart_errors() {
    let harness = TestHarness::new();
    let running = harness
        .create(EventFormBuilder::new("Running").manual_stop().build())
        .await;
    let automatic = harness
        .create(EventFormBuilder::new("Automatic").end(test_time()).build())
        .await;

    let err = harness.directory.restart(running).await.unwrap_err();
    assert_eq!(err.code(), "NOT_STOPPED");

    let err = harness.directory.restart(automatic).await.unwrap_err();
    assert_eq!(err.code(), "IS_NOT_MANUAL_STOP");
    assert_eq!(
        harness.store.event(automatic).unwrap().details.end,
        Some(test_time())
    );

    let err = harness.directory.restart(EventId::new()).await.unwrap_err();
    assert_eq!(err.code(), "NOT_FOUND");
}
