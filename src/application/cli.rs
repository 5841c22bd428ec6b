use std::io;
use std::path;

use anyhow::bail;
use anyhow::Result;
use clap::builder::PossibleValuesParser;
use clap::value_parser;
use clap::Arg;
use clap::ArgAction;
use clap::ArgMatches;
use clap::Command;
use clap_complete::generate;
use clap_complete::Generator;
use clap_complete::Shell;
use dialoguer::theme::ColorfulTheme;
use dialoguer::Select;
use strum::VariantNames;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use yansi::Paint;

use super::chat::format_summaries;
use super::chat::help_text;
use super::chat::session_manager;
use super::chat::tab_store;
use super::chat::ChatArgs;
use crate::configuration::Config;
use crate::configuration::ConfigKey;
use crate::domain::models::BackendName;
use crate::domain::models::ConversationSummary;
use crate::domain::models::LibrarySelection;
use crate::domain::models::PromptOptions;
use crate::domain::services::tokens::acquire_token;
use crate::domain::services::StreamSettings;
use crate::infrastructure::api::MessagesApi;
use crate::infrastructure::auth::TokenProviderManager;

fn print_completions<G: Generator>(gen: G, cmd: &mut Command) {
    generate(gen, cmd, cmd.get_name().to_string(), &mut io::stdout());
    std::process::exit(0);
}

async fn fetch_history() -> Result<Vec<ConversationSummary>> {
    let tokens = TokenProviderManager::get();
    let bearer = acquire_token(tokens.as_ref(), StreamSettings::from_config()?.retry).await?;
    let chats = MessagesApi::default().chats(&bearer).await?;

    return Ok(chats
        .iter()
        .map(ConversationSummary::from_record)
        .collect());
}

async fn print_history_list() -> Result<()> {
    let history = fetch_history().await?;
    println!("{}", format_summaries(&history));
    return Ok(());
}

async fn select_conversation_interactive() -> Result<bool> {
    let history = fetch_history().await?;
    if history.is_empty() {
        println!("{}", format_summaries(&history));
        return Ok(false);
    }

    let options = history
        .iter()
        .map(|summary| {
            return format!("{} ({})", summary.preview_text, summary.created_at);
        })
        .collect::<Vec<String>>();

    let selected = Select::with_theme(&ColorfulTheme::default())
        .with_prompt("Which conversation would you like to open?")
        .default(0)
        .items(&options)
        .interact_opt()?;

    let Some(idx) = selected else {
        return Ok(false);
    };

    Config::set(ConfigKey::ConversationID, &history[idx].conversation_id);
    return Ok(true);
}

async fn create_config_file() -> Result<()> {
    let config_file_path_str = Config::default(ConfigKey::ConfigFile);
    let config_file_path = path::PathBuf::from(&config_file_path_str);
    if config_file_path.exists() {
        bail!(format!(
            "Config file already exists at {config_file_path_str}"
        ));
    }

    if let Some(parent) = config_file_path.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent).await?;
        }
    }

    let mut file = fs::File::create(&config_file_path).await?;
    file.write_all(Config::serialize_default(build()).as_bytes())
        .await?;

    println!("Created default config file at {config_file_path_str}");
    return Ok(());
}

fn chat_args(matches: &ArgMatches) -> Result<ChatArgs> {
    let mut libraries = vec![];
    if let Some(paths) = matches.get_many::<String>("library") {
        for library_path in paths {
            let Some(selection) = LibrarySelection::parse(library_path) else {
                bail!(format!(
                    "Invalid library path '{library_path}', expected page, page/section or page/section/subsection"
                ));
            };
            libraries.push(selection);
        }
    }

    return Ok(ChatArgs {
        options: PromptOptions {
            use_web_search: matches.get_flag("web-search"),
            libraries,
            focus: matches.get_one::<String>("focus").cloned(),
        },
        resume: matches.get_flag("resume"),
    });
}

async fn run_session_command(matches: &ArgMatches) -> Result<()> {
    match matches.subcommand() {
        Some(("create", _)) => {
            session_manager(tab_store())?.create_session().await?;
            println!("Session created.");
        }
        Some(("validate", _)) => {
            if session_manager(tab_store())?.validate_session().await {
                println!("Session is valid.");
            } else {
                println!("{}", Paint::yellow("Session is not valid."));
            }
        }
        Some(("destroy", _)) => {
            session_manager(tab_store())?.destroy_session().await;
            println!("Session destroyed and local state cleared.");
        }
        _ => {
            subcommand_session().print_long_help()?;
        }
    }

    return Ok(());
}

fn subcommand_completions() -> Command {
    return Command::new("completions")
        .about("Generates shell completions.")
        .arg(
            clap::Arg::new("shell")
                .short('s')
                .long("shell")
                .help("Which shell to generate completions for.")
                .action(ArgAction::Set)
                .value_parser(value_parser!(Shell))
                .required(true),
        );
}

fn subcommand_config() -> Command {
    return Command::new("config")
        .about("Configuration file options.")
        .subcommand(
            Command::new("create").about("Saves the default config file to the configuration file path. This command will fail if the file exists already.")
        )
        .subcommand(
            Command::new("default").about("Outputs the default configuration file to stdout.")
        )
        .subcommand(
            Command::new("path").about("Returns the default path for the configuration file.")
        );
}

fn arg_endpoint() -> Arg {
    return Arg::new(ConfigKey::Endpoint.to_string())
        .short('e')
        .long(ConfigKey::Endpoint.to_string())
        .env("COUNSEL_ENDPOINT")
        .num_args(1)
        .help(format!(
            "The streaming endpoint prompts are sent to. [default: {}]",
            Config::default(ConfigKey::Endpoint)
        ))
        .value_parser(PossibleValuesParser::new(BackendName::VARIANTS));
}

fn arg_millis(key: ConfigKey, env: &'static str, help: &str) -> Arg {
    return Arg::new(key.to_string())
        .long(key.to_string())
        .env(env)
        .num_args(1)
        .help(format!("{help} [default: {}]", Config::default(key)));
}

fn subcommand_chat() -> Command {
    return Command::new("chat")
        .about("Start a chat with the legal assistant.")
        .arg(arg_endpoint())
        .arg(
            Arg::new(ConfigKey::AssistantPath.to_string())
                .long(ConfigKey::AssistantPath.to_string())
                .env("COUNSEL_ASSISTANT_PATH")
                .num_args(1)
                .help(format!("Path of the assistant endpoint, relative to the API URL. [default: {}]", Config::default(ConfigKey::AssistantPath))),
        )
        .arg(
            Arg::new(ConfigKey::GptStreamPath.to_string())
                .long(ConfigKey::GptStreamPath.to_string())
                .env("COUNSEL_GPT_STREAM_PATH")
                .num_args(1)
                .help(format!("Path of the library-aware stream endpoint, relative to the API URL. [default: {}]", Config::default(ConfigKey::GptStreamPath))),
        )
        .arg(arg_millis(
            ConfigKey::StreamIdleTimeout,
            "COUNSEL_STREAM_IDLE_TIMEOUT",
            "Milliseconds to wait for the next piece of a reply before giving up. 0 waits forever.",
        ))
        .arg(arg_millis(
            ConfigKey::SessionPollInterval,
            "COUNSEL_SESSION_POLL_INTERVAL",
            "Milliseconds between background session checks.",
        ))
        .arg(
            Arg::new(ConfigKey::SessionMaxFailures.to_string())
                .long(ConfigKey::SessionMaxFailures.to_string())
                .env("COUNSEL_SESSION_MAX_FAILURES")
                .num_args(1)
                .help(format!("Failed session checks in a row before the session is destroyed. [default: {}]", Config::default(ConfigKey::SessionMaxFailures))),
        )
        .arg(
            Arg::new("web-search")
                .short('w')
                .long("web-search")
                .help("Let the assistant search the web. Only used by the gpt-stream endpoint.")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("library")
                .short('l')
                .long("library")
                .help("Library to use as context, as page, page/section or page/section/subsection. Can be repeated.")
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new("focus")
                .short('f')
                .long("focus")
                .num_args(1)
                .help("Free text narrowing what the assistant should focus on."),
        )
        .arg(
            Arg::new("resume")
                .short('r')
                .long("resume")
                .help("Continue the last conversation instead of starting a new one.")
                .action(ArgAction::SetTrue),
        );
}

fn subcommand_history() -> Command {
    return Command::new("history")
        .about("Browse past conversations.")
        .arg_required_else_help(true)
        .subcommand(Command::new("list").about("List past conversations, newest first."))
        .subcommand(
            Command::new("open")
                .about("Open a past conversation by ID and continue chatting. Omit the ID to pick one interactively.")
                .arg(
                    clap::Arg::new(ConfigKey::ConversationID.to_string())
                        .short('i')
                        .long("id")
                        .help("Conversation ID")
                        .required(false),
                ),
        );
}

fn subcommand_session() -> Command {
    return Command::new("session")
        .about("Manage the server-side session.")
        .arg_required_else_help(true)
        .subcommand(Command::new("create").about("Create a session and store its token."))
        .subcommand(Command::new("validate").about("Check the stored session against the server."))
        .subcommand(
            Command::new("destroy").about("Delete the session, clear local state and sign out."),
        );
}

pub fn build() -> Command {
    let commands_text = help_text()
        .split('\n')
        .map(|line| {
            if line.starts_with('-') {
                return format!("  {line}");
            }
            if line.starts_with("COMMANDS:") {
                return Paint::new(format!("CHAT {line}"))
                    .underline()
                    .bold()
                    .to_string();
            }
            return line.to_string();
        })
        .collect::<Vec<String>>()
        .join("\n");

    let about = format!(
        "{}\n\nVersion: {}\nCommit: {}",
        env!("CARGO_PKG_DESCRIPTION"),
        env!("CARGO_PKG_VERSION"),
        env!("VERGEN_GIT_DESCRIBE")
    );

    return Command::new("counsel")
        .about(about)
        .author(env!("CARGO_PKG_AUTHORS"))
        .version(env!("CARGO_PKG_VERSION"))
        .after_help(commands_text)
        .arg_required_else_help(false)
        .subcommand(subcommand_chat())
        .subcommand(subcommand_completions())
        .subcommand(subcommand_config())
        .subcommand(subcommand_history())
        .subcommand(subcommand_session())
        .arg(
            Arg::new(ConfigKey::ConfigFile.to_string())
                .short('c')
                .long(ConfigKey::ConfigFile.to_string())
                .env("COUNSEL_CONFIG_FILE")
                .num_args(1)
                .help(format!("Path to configuration file [default: {}]", Config::default(ConfigKey::ConfigFile)))
                .global(true)
        )
        .arg(
            Arg::new(ConfigKey::ApiURL.to_string())
                .long(ConfigKey::ApiURL.to_string())
                .env("COUNSEL_API_URL")
                .num_args(1)
                .help(format!("Base URL of the counsel API. [default: {}]", Config::default(ConfigKey::ApiURL)))
                .global(true),
        )
        .arg(
            Arg::new(ConfigKey::AuthToken.to_string())
                .long(ConfigKey::AuthToken.to_string())
                .env("COUNSEL_AUTH_TOKEN")
                .num_args(1)
                .help("Identity bearer token sent with every request.")
                .global(true),
        )
        .arg(
            Arg::new(ConfigKey::AuthTokenCommand.to_string())
                .long(ConfigKey::AuthTokenCommand.to_string())
                .env("COUNSEL_AUTH_TOKEN_COMMAND")
                .num_args(1)
                .help("Shell command printing a fresh identity token, run whenever one is needed. Takes precedence over auth-token.")
                .global(true),
        )
        .arg(
            Arg::new(ConfigKey::StateDir.to_string())
                .long(ConfigKey::StateDir.to_string())
                .env("COUNSEL_STATE_DIR")
                .num_args(1)
                .help(format!("Directory holding the session token and last conversation. [default: {}]", Config::default(ConfigKey::StateDir)))
                .global(true),
        )
        .arg(
            Arg::new(ConfigKey::TokenRetryAttempts.to_string())
                .long(ConfigKey::TokenRetryAttempts.to_string())
                .env("COUNSEL_TOKEN_RETRY_ATTEMPTS")
                .num_args(1)
                .help(format!("Attempts at fetching an identity token before giving up. [default: {}]", Config::default(ConfigKey::TokenRetryAttempts)))
                .global(true),
        )
        .arg(
            arg_millis(
                ConfigKey::TokenRetryDelay,
                "COUNSEL_TOKEN_RETRY_DELAY",
                "Milliseconds between identity token attempts.",
            )
            .global(true),
        );
}

/// Returns the chat to start, or None when the command already did its work.
pub async fn parse() -> Result<Option<ChatArgs>> {
    let matches = build().get_matches();

    match matches.subcommand() {
        Some(("chat", subcmd_matches)) => {
            Config::load(build(), vec![&matches, subcmd_matches]).await?;
            return Ok(Some(chat_args(subcmd_matches)?));
        }
        Some(("completions", subcmd_matches)) => {
            if let Some(completions) = subcmd_matches.get_one::<Shell>("shell").copied() {
                let mut app = build();
                print_completions(completions, &mut app);
            }
        }
        Some(("config", subcmd_matches)) => match subcmd_matches.subcommand() {
            Some(("create", _)) => {
                create_config_file().await?;
            }
            Some(("default", _)) => {
                println!("{}", Config::serialize_default(build()));
            }
            Some(("path", _)) => {
                println!("{}", Config::default(ConfigKey::ConfigFile));
            }
            _ => {
                subcommand_config().print_long_help()?;
            }
        },
        Some(("history", subcmd_matches)) => match subcmd_matches.subcommand() {
            Some(("list", list_matches)) => {
                Config::load(build(), vec![&matches, subcmd_matches, list_matches]).await?;
                print_history_list().await?;
            }
            Some(("open", open_matches)) => {
                Config::load(build(), vec![&matches, subcmd_matches, open_matches]).await?;
                if open_matches
                    .get_one::<String>(&ConfigKey::ConversationID.to_string())
                    .is_some()
                    || select_conversation_interactive().await?
                {
                    return Ok(Some(ChatArgs::default()));
                }
            }
            _ => {
                subcommand_history().print_long_help()?;
            }
        },
        Some(("session", subcmd_matches)) => {
            let mut all_matches = vec![&matches, subcmd_matches];
            if let Some((_, action_matches)) = subcmd_matches.subcommand() {
                all_matches.push(action_matches);
            }
            Config::load(build(), all_matches).await?;
            run_session_command(subcmd_matches).await?;
        }
        _ => {
            Config::load(build(), vec![&matches]).await?;
            return Ok(Some(ChatArgs::default()));
        }
    }

    return Ok(None);
}
