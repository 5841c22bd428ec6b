use anyhow::Result;
use mockito::Matcher;
use test_utils::chats_fixture;

use super::MessagesApi;
use crate::domain::models::Message;

#[tokio::test]
async fn it_lists_messages_for_a_conversation() -> Result<()> {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/messages")
        .match_query(Matcher::UrlEncoded("conversationId".into(), "abc".into()))
        .match_header("Authorization", "Bearer tok")
        .with_status(200)
        .with_body(r#"[{"text":"hola","isFromAssistant":false,"conversationId":"abc"},{"text":"Hola!","isFromAssistant":true,"conversationId":"abc"}]"#)
        .create_async()
        .await;

    let api = MessagesApi::new(&server.url());
    let res = api.list("tok", "abc").await?;
    mock.assert_async().await;

    assert_eq!(res.len(), 2);
    assert!(!res[0].is_from_assistant);
    assert_eq!(res[1].text, "Hola!");
    return Ok(());
}

#[tokio::test]
async fn it_fails_listing_on_server_error() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/messages")
        .match_query(Matcher::Any)
        .with_status(500)
        .create_async()
        .await;

    let api = MessagesApi::new(&server.url());
    assert!(api.list("tok", "abc").await.is_err());
}

#[tokio::test]
async fn it_fetches_chats() -> Result<()> {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/messages/chats")
        .match_header("Authorization", "Bearer tok")
        .with_status(200)
        .with_body(chats_fixture())
        .create_async()
        .await;

    let api = MessagesApi::new(&format!("{}/", server.url()));
    let res = api.chats("tok").await?;
    mock.assert_async().await;

    assert_eq!(res.len(), 2);
    assert_eq!(res[0].conversation_id, "c-1");
    return Ok(());
}

#[tokio::test]
async fn it_saves_messages() -> Result<()> {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/messages")
        .match_header("Authorization", "Bearer tok")
        .match_body(Matcher::PartialJsonString(
            r#"{"text":"hola","isFromAssistant":false,"conversationId":"abc"}"#.to_string(),
        ))
        .with_status(201)
        .create_async()
        .await;

    let api = MessagesApi::new(&server.url());
    api.save("tok", &Message::user("hola", "abc")).await?;
    mock.assert_async().await;
    return Ok(());
}
