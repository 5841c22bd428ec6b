/// Server-sent body as produced by the assistant endpoint, including a
/// keep-alive comment and a trailing line after the terminator.
pub fn sse_fixture() -> &'static str {
    return r#"data: {"content":"Under "}

: keep-alive

data: {"content":"Article 1902, "}
data: {"content":"liability requires fault."}

data: [DONE]
data: {"content":"ignored"}
"#;
}

/// Chat list as returned by `GET /messages/chats`.
pub fn chats_fixture() -> &'static str {
    return r#"[
  {
    "conversationId": "c-1",
    "text": "Can my landlord keep the deposit if the lease ended early and the apartment was left clean?",
    "createdAt": "2024-03-01T10:15:00Z"
  },
  {
    "conversationId": "c-2",
    "text": "Short question",
    "createdAt": "not a date"
  }
]"#;
}
