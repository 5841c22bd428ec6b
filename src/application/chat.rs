#[cfg(test)]
#[path = "chat_test.rs"]
mod tests;

use std::io::Write;
use std::sync::Arc;

use anyhow::Result;
use tokio::io::AsyncBufReadExt;
use tokio::io::BufReader;
use tokio::sync::mpsc;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use yansi::Paint;

use crate::configuration::Config;
use crate::configuration::ConfigKey;
use crate::domain::models::BackendName;
use crate::domain::models::ConversationSummary;
use crate::domain::models::Event;
use crate::domain::models::Message;
use crate::domain::models::PromptOptions;
use crate::domain::models::SharedStore;
use crate::domain::models::SlashCommand;
use crate::domain::models::CONVERSATION_ID_KEY;
use crate::domain::services::ConversationStore;
use crate::domain::services::PostOutcome;
use crate::domain::services::SessionManager;
use crate::domain::services::SessionSettings;
use crate::domain::services::StreamController;
use crate::domain::services::StreamSettings;
use crate::infrastructure::api::MessagesApi;
use crate::infrastructure::api::SessionApi;
use crate::infrastructure::auth::TokenProviderManager;
use crate::infrastructure::backends::BackendManager;
use crate::infrastructure::storage::FileStore;

pub fn help_text() -> String {
    let text = r#"
COMMANDS:
- /new (/n) - Starts a new conversation.
- /history (/hi) - Lists your past conversations, newest first.
- /open (/o) [NUMBER] - Opens a conversation from the numbers shown by /history.
- /stop (/s) - Stops the reply being generated.
- /retry (/r) - Retries creating the session after a failure.
- /quit /exit (/q) - Exit counsel.
- /help (/h) - Provides this help menu.

Typing a new prompt while a reply is still streaming replaces that reply.
        "#;

    return text.trim().to_string();
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChatArgs {
    pub options: PromptOptions,
    pub resume: bool,
}

pub fn tab_store() -> SharedStore {
    return Arc::new(FileStore::tab(&Config::state_dir()));
}

pub fn session_manager(tab: SharedStore) -> Result<SessionManager> {
    return Ok(SessionManager::new(
        SessionApi::default(),
        TokenProviderManager::get(),
        Arc::new(FileStore::local(&Config::state_dir())),
        tab,
        SessionSettings::from_config()?,
    ));
}

pub fn format_summaries(history: &[ConversationSummary]) -> String {
    if history.is_empty() {
        return "There are no conversations yet. Send a prompt to start one!".to_string();
    }

    return history
        .iter()
        .enumerate()
        .map(|(idx, summary)| {
            return format!(
                "{}. {} ({}) [{}]",
                idx + 1,
                summary.preview_text,
                summary.created_at,
                summary.conversation_id
            );
        })
        .collect::<Vec<String>>()
        .join("\n");
}

fn author_label(msg: &Message) -> String {
    if msg.is_error() {
        return Paint::red("error>").bold().to_string();
    }
    if msg.is_from_assistant {
        return Paint::cyan("counsel>").bold().to_string();
    }

    return Paint::green("you>").bold().to_string();
}

fn print_transcript(messages: &[Message]) {
    for msg in messages {
        println!("{} {}", author_label(msg), msg.text);
    }
}

/// Renders one event. Returns false once the chat should end.
fn render(event: Event) -> bool {
    match event {
        Event::ConversationChanged(id) => {
            println!("{}", Paint::new(format!("Conversation {id}")).dimmed());
        }
        Event::HistoryRefreshed(history) => {
            tracing::debug!(conversations = history.len(), "History refreshed");
        }
        Event::LoadingChanged(true) => {
            println!("{}", Paint::new("Waiting for a reply...").dimmed());
        }
        Event::LoadingChanged(false) => {}
        Event::MessagesLoaded(messages) => {
            print_transcript(&messages);
        }
        Event::NavigateToLanding() => {
            println!(
                "{}",
                Paint::red("Your session has ended. Sign in again and restart counsel.")
            );
            return false;
        }
        Event::ReplyDelta(delta) => {
            print!("{delta}");
            let _ = std::io::stdout().flush();
        }
        Event::ReplyFailed(msg) => {
            println!("\n{} {}", author_label(&msg), msg.text);
        }
        Event::ReplyFinished(_) => {
            println!();
        }
        Event::ReplyStarted() => {
            print!("{} ", Paint::cyan("counsel>").bold());
            let _ = std::io::stdout().flush();
        }
        Event::SessionCreated() => {
            println!("{}", Paint::new("Session ready.").dimmed());
        }
        Event::SessionFailed(err) => {
            println!(
                "{}",
                Paint::red(format!("{err}. Type /retry to try again."))
            );
        }
        Event::SessionInvalid(failures) => {
            println!(
                "{}",
                Paint::yellow(format!("Session check failed ({failures} in a row)."))
            );
        }
    }

    return true;
}

struct Chat {
    session: Arc<SessionManager>,
    controller: Arc<StreamController>,
    options: PromptOptions,
    history: Vec<ConversationSummary>,
}

impl Chat {
    async fn open(&mut self, command: &SlashCommand) -> Result<()> {
        let Some(idx) = command.index_arg() else {
            println!("Usage: /open NUMBER, see /history for the numbers.");
            return Ok(());
        };

        if self.history.is_empty() {
            self.history = self.controller.refresh_history().await?;
        }

        let Some(summary) = self.history.get(idx - 1).cloned() else {
            println!("There is no conversation number {idx}.");
            return Ok(());
        };

        self.controller.select_conversation(&summary).await?;
        return Ok(());
    }

    /// Returns false when the chat should end.
    async fn command(&mut self, command: SlashCommand) -> Result<bool> {
        if command.is_quit() {
            return Ok(false);
        }

        if command.is_new() {
            self.controller.start_new_conversation().await;
        } else if command.is_history() {
            self.history = self.controller.refresh_history().await?;
            println!("{}", format_summaries(&self.history));
        } else if command.is_open() {
            self.open(&command).await?;
        } else if command.is_stop() {
            self.controller.abort().await;
        } else if command.is_retry() {
            self.session.retry_create().await?;
        } else if command.is_help() {
            println!("{}", help_text());
        }

        return Ok(true);
    }
}

pub async fn start(args: ChatArgs) -> Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel::<Event>();

    let tab = tab_store();
    let session = SessionManager::install(session_manager(tab.clone())?.with_events(tx.clone()));
    if let Err(err) = session.set_authenticated(true).await {
        tracing::error!(error = ?err, "Unable to start a session");
    }

    let mut conversation_id = Config::get(ConfigKey::ConversationID);
    if conversation_id.is_empty() && args.resume {
        conversation_id = tab.get(CONVERSATION_ID_KEY).await?.unwrap_or_default();
    }

    let backend_name = BackendName::parse(Config::get(ConfigKey::Endpoint))
        .unwrap_or(BackendName::GptStream);
    let controller = StreamController::new(
        Arc::new(Mutex::new(ConversationStore::default())),
        BackendManager::get(backend_name)?,
        MessagesApi::default(),
        TokenProviderManager::get(),
        tab,
        StreamSettings::from_config()?,
    )
    .with_events(tx);

    let mut chat = Chat {
        session: session.clone(),
        controller: Arc::new(controller),
        options: args.options,
        history: vec![],
    };

    println!(
        "{}",
        Paint::new(format!(
            "counsel {} ({backend_name}). Type /help for commands.",
            env!("CARGO_PKG_VERSION")
        ))
        .dimmed()
    );

    if conversation_id.is_empty() {
        chat.controller.start_new_conversation().await;
    } else {
        let summary = ConversationSummary::new(&conversation_id, "", "");
        if let Err(err) = chat.controller.select_conversation(&summary).await {
            println!("{}", Paint::red(format!("Unable to load the conversation: {err}")));
        }
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut posts = JoinSet::new();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };

                if let Some(command) = SlashCommand::parse(&line) {
                    match chat.command(command).await {
                        Ok(true) => {}
                        Ok(false) => break,
                        Err(err) => println!("{}", Paint::red(err.to_string())),
                    }
                    continue;
                }

                let controller = chat.controller.clone();
                let options = chat.options.clone();
                posts.spawn(async move {
                    return controller.handle_post(&line, &options).await;
                });
            }
            Some(event) = rx.recv() => {
                if !render(event) {
                    break;
                }
            }
            Some(res) = posts.join_next() => {
                match res {
                    Ok(PostOutcome::Completed(_)) | Ok(PostOutcome::Ignored) => {}
                    Ok(outcome) => tracing::debug!(outcome = ?outcome, "Prompt ended early"),
                    Err(err) => tracing::error!(error = ?err, "Prompt task failed"),
                }
            }
        }
    }

    chat.controller.abort().await;
    session.stop_polling().await;
    return Ok(());
}
