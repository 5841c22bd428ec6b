use super::format_summaries;
use super::help_text;
use crate::domain::models::ConversationSummary;

#[test]
fn it_numbers_summaries_from_one() {
    let history = vec![
        ConversationSummary::new("c-1", "Can my landlord keep the deposit...", "2024-03-01 10:15"),
        ConversationSummary::new("c-2", "Short question", "not a date"),
    ];

    insta::assert_snapshot!(format_summaries(&history), @r###"
    1. Can my landlord keep the deposit... (2024-03-01 10:15) [c-1]
    2. Short question (not a date) [c-2]
    "###);
}

#[test]
fn it_explains_an_empty_history() {
    assert!(format_summaries(&[]).starts_with("There are no conversations yet"));
}

#[test]
fn it_lists_every_command_in_help() {
    let text = help_text();
    for command in ["/new", "/history", "/open", "/stop", "/retry", "/quit", "/help"] {
        assert!(text.contains(command), "missing {command}");
    }
}
