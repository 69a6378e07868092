mod common;

use axum::http::Method;
use chrono::{Local, TimeZone, Utc};
use serde_json::json;

use common::{chunk, conversation_json, done, MockBackend, StreamScript};
use rag_console::models::Conversation;
use rag_console::state::ReferencePanel;

const CONVERSATIONS_PATH: &str = "/admin/rag/conversations";

#[tokio::test]
async fn rename_trims_and_reloads_the_list() {
    let backend = MockBackend::start().await;
    backend.seed_conversation(1, "Old", 0);
    let session = backend.session();
    session.refresh_conversations().await.unwrap();

    session.rename_conversation(1, "  Budget review  ").await.unwrap();

    let patch = backend.requests_to(Method::PATCH, "/admin/rag/conversations/1");
    assert_eq!(patch.len(), 1);
    assert_eq!(patch[0].body.as_ref().unwrap()["title"], "Budget review");
    assert_eq!(session.conversations().await[0].title, "Budget review");
}

#[tokio::test]
async fn blank_title_is_rejected_before_any_request() {
    let backend = MockBackend::start().await;
    backend.seed_conversation(1, "Keep", 0);
    let session = backend.session();

    let err = session.rename_conversation(1, "   ").await.unwrap_err();
    assert!(err.is_validation());
    assert!(backend.requests().is_empty());
}

#[tokio::test]
async fn toggle_saved_flips_the_flag() {
    let backend = MockBackend::start().await;
    backend.seed_conversation(1, "Pin me", 0);
    let session = backend.session();

    assert!(session.toggle_saved(1).await.unwrap());
    assert!(session.conversations().await[0].saved);
    assert!(!session.toggle_saved(1).await.unwrap());
    assert_eq!(backend.requests_to(Method::POST, "/admin/rag/conversations/1/save").len(), 2);
}

#[tokio::test]
async fn deleting_the_open_conversation_clears_it() {
    let backend = MockBackend::start().await;
    backend.seed_conversation(1, "Doomed", 2);
    backend.seed_conversation(2, "Other", 0);
    let session = backend.session();
    session.select_conversation(1).await.unwrap();

    session.delete_conversation(1).await.unwrap();

    assert_eq!(session.active_conversation_id().await, None);
    assert!(session.messages().await.is_empty());
    let remaining: Vec<i64> = session.conversations().await.iter().map(|c| c.id).collect();
    assert_eq!(remaining, vec![2]);
}

#[tokio::test]
async fn deleting_another_conversation_keeps_the_open_one() {
    let backend = MockBackend::start().await;
    backend.seed_conversation(1, "Open", 2);
    backend.seed_conversation(2, "Other", 0);
    let session = backend.session();
    session.select_conversation(1).await.unwrap();

    session.delete_conversation(2).await.unwrap();
    assert_eq!(session.active_conversation_id().await, Some(1));
    assert_eq!(session.messages().await.len(), 2);
}

#[tokio::test]
async fn new_conversation_opens_empty_and_lists_first() {
    let backend = MockBackend::start().await;
    backend.seed_conversation(1, "Existing", 2);
    let session = backend.session();
    session.select_conversation(1).await.unwrap();

    let id = session.new_conversation().await.unwrap();
    assert_eq!(id, 2);
    assert_eq!(session.active_conversation_id().await, Some(2));
    assert!(session.messages().await.is_empty());
    assert_eq!(session.last_known_message_count().await, 0);
    assert_eq!(session.conversations().await[0].id, 2);
    assert_eq!(backend.requests_to(Method::POST, CONVERSATIONS_PATH).len(), 1);
}

#[tokio::test]
async fn listing_is_grouped_by_saved_and_local_day() {
    let backend = MockBackend::start().await;
    backend.with(|s| {
        let mut saved = conversation_json(1, "Pinned", true);
        saved["updated_at"] = json!("2025-05-01T09:00:00Z");
        let mut old = conversation_json(2, "Last week", false);
        old["updated_at"] = json!("2025-06-05T09:00:00Z");
        let mut fresh = conversation_json(3, "Fresh", false);
        fresh["updated_at"] = json!(Utc::now().to_rfc3339());
        s.conversations = vec![saved, old, fresh];
    });
    let session = backend.session();
    session.refresh_conversations().await.unwrap();

    let groups = session.conversation_groups(Local::now()).await;
    let ids = |items: &[Conversation]| items.iter().map(|c| c.id).collect::<Vec<_>>();
    assert_eq!(ids(&groups.saved), vec![1]);
    assert_eq!(ids(&groups.today), vec![3]);
    assert_eq!(ids(&groups.recent), vec![2]);

    let now = Utc.with_ymd_and_hms(2025, 6, 10, 9, 0, 0).unwrap();
    assert_eq!(groups.recent[0].days_left(now), 2);
}

#[tokio::test]
async fn finished_answer_references_can_be_reopened() {
    let backend = MockBackend::start().await;
    backend.seed_conversation(1, "Refs", 0);
    backend.with(|s| {
        s.stream = StreamScript::Frames(vec![
            chunk("See the manual."),
            done(json!([
                { "filename": "manual.pdf", "similarity": 0.82, "chunk_text": "Section 2" },
                { "filename": "faq.md", "similarity": 0.4, "chunk_text": "Q3" }
            ])),
        ])
    });
    let session = backend.session();
    session.select_conversation(1).await.unwrap();
    session.send("where is it documented?").await.unwrap();

    let answer = session.messages().await.pop().unwrap();
    let panel = session.show_references(answer.references.clone()).await;
    assert_eq!(panel, ReferencePanel::Listed(2));
    assert_eq!(session.open_reference(0).await.unwrap().chunk_text, "Section 2");
    assert!(session.open_reference(2).await.is_none());

    assert_eq!(session.show_references(Vec::new()).await, ReferencePanel::Empty);
    assert!(session.open_reference(0).await.is_none());
}

#[tokio::test]
async fn malformed_stored_message_does_not_block_opening() {
    let backend = MockBackend::start().await;
    backend.seed_conversation(1, "Legacy", 0);
    backend.set_messages(
        1,
        vec![
            json!({ "id": 1, "role": "user", "content": "question" }),
            json!({ "id": 2, "role": null, "content": "orphaned row" }),
            json!({
                "id": 3,
                "role": "assistant",
                "content": "answer",
                "references": [{ "filename": "old.pdf", "similarity": null }]
            }),
        ],
    );
    let session = backend.session();

    session.select_conversation(1).await.unwrap();

    let messages = session.messages().await;
    let contents: Vec<&str> = messages.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["question", "answer"]);
    assert_eq!(session.last_known_message_count().await, 2);
    assert_eq!(messages[1].references[0].filename, "old.pdf");
    assert_eq!(messages[1].references[0].similarity, 0.0);
}
