//! Behavioural tests for the in-memory chat service.
//!
//! The reconciler depends on these semantics, so the fake must honour them
//! the same way the HTTP client does.

use pitwall_chat::fakes::{ChatCall, MemoryChatService};
use pitwall_chat::{ChatService, EditOutcome, OutgoingMessage};

fn status(content: &str) -> OutgoingMessage {
    OutgoingMessage::new(content).with_marker("roster-status")
}

#[tokio::test]
async fn created_thread_holds_initial_message() {
    let chat = MemoryChatService::new();
    let handle = chat
        .create_resource("parent-1", "Race 1 - Team Red", &status("Welcome"))
        .await
        .unwrap();

    assert!(chat.resource_exists(&handle).await.unwrap());
    let thread = chat.thread(&handle).unwrap();
    assert_eq!(thread.parent_id, "parent-1");
    assert_eq!(thread.title, "Race 1 - Team Red");
    assert_eq!(thread.messages.len(), 1);
    assert!(thread.messages[0].author_is_automation);
}

#[tokio::test]
async fn deleted_thread_reports_missing() {
    let chat = MemoryChatService::new();
    chat.insert_thread("t1", "parent", "Race");
    assert!(chat.delete_thread("t1"));

    assert!(!chat.resource_exists("t1").await.unwrap());
    let err = chat.post_message("t1", &status("x")).await.unwrap_err();
    assert!(err.is_not_found());
    let outcome = chat.edit_message("t1", "msg-1", &status("x")).await.unwrap();
    assert_eq!(outcome, EditOutcome::NotFound);
}

#[tokio::test]
async fn recent_messages_are_newest_first_and_limited() {
    let chat = MemoryChatService::new();
    chat.insert_thread("t1", "parent", "Race");
    let first = chat.post_message("t1", &status("one")).await.unwrap();
    chat.post_human_message("t1", "hello").unwrap();
    let third = chat.post_message("t1", &status("three")).await.unwrap();

    let recent = chat.list_recent_messages("t1", 2).await.unwrap();
    assert_eq!(recent.len(), 2);
    assert_eq!(recent[0].id, third);
    assert!(!recent[1].author_is_automation);
    assert!(recent.iter().all(|m| m.id != first));
}

#[tokio::test]
async fn edit_replaces_content_in_place() {
    let chat = MemoryChatService::new();
    chat.insert_thread("t1", "parent", "Race");
    let id = chat.post_message("t1", &status("old")).await.unwrap();

    let outcome = chat.edit_message("t1", &id, &status("new")).await.unwrap();
    assert_eq!(outcome, EditOutcome::Edited);
    let messages = chat.messages("t1");
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].content, "new");

    assert!(chat.delete_message("t1", &id));
    let outcome = chat.edit_message("t1", &id, &status("newer")).await.unwrap();
    assert_eq!(outcome, EditOutcome::NotFound);
}

#[tokio::test]
async fn participants_are_deduplicated() {
    let chat = MemoryChatService::new();
    chat.insert_thread("t1", "parent", "Race");
    let users = vec!["u1".to_string(), "u2".to_string()];
    chat.add_participants("t1", &users).await.unwrap();
    chat.add_participants("t1", &users[..1]).await.unwrap();

    assert_eq!(chat.participants("t1"), users);
    assert!(matches!(
        chat.calls().last(),
        Some(ChatCall::AddParticipants { handle, .. }) if handle == "t1"
    ));
}
