#[cfg(test)]
#[path = "config_test.rs"]
mod tests;

use std::path;
use std::time::Duration;

use anyhow::bail;
use anyhow::Result;
use clap::ArgMatches;
use clap::Command;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use strum::EnumIter;
use strum::EnumVariantNames;
use strum::IntoEnumIterator;
use tokio::fs;

use crate::domain::models::BackendName;

static CONFIG: Lazy<DashMap<String, String>> = Lazy::new(DashMap::new);

#[derive(Clone, Copy, Debug, Eq, PartialEq, EnumIter, EnumVariantNames, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum ConfigKey {
    ApiURL,
    AssistantPath,
    AuthToken,
    AuthTokenCommand,
    ConfigFile,
    ConversationID,
    Endpoint,
    GptStreamPath,
    SessionMaxFailures,
    SessionPollInterval,
    StateDir,
    StreamIdleTimeout,
    TokenRetryAttempts,
    TokenRetryDelay,
}

pub struct Config {}

impl Config {
    pub fn get(key: ConfigKey) -> String {
        if let Some(val) = CONFIG.get(&key.to_string()) {
            return val.to_string();
        }

        return "".to_string();
    }

    pub fn set(key: ConfigKey, value: &str) {
        CONFIG.insert(key.to_string(), value.to_string());
    }

    /// Reads a numeric key, falling back to its default when unset.
    pub fn get_u64(key: ConfigKey) -> Result<u64> {
        let mut val = Config::get(key);
        if val.is_empty() {
            val = Config::default(key);
        }

        return match val.trim().parse::<u64>() {
            Ok(num) => Ok(num),
            Err(_) => bail!(format!("config key '{key}' must be a number, got: {val}")),
        };
    }

    pub fn get_u32(key: ConfigKey) -> Result<u32> {
        let val = Config::get_u64(key)?;
        return match u32::try_from(val) {
            Ok(num) => Ok(num),
            Err(_) => bail!(format!("config key '{key}' is too large, got: {val}")),
        };
    }

    pub fn get_millis(key: ConfigKey) -> Result<Duration> {
        return Ok(Duration::from_millis(Config::get_u64(key)?));
    }

    pub fn state_dir() -> path::PathBuf {
        let mut dir = Config::get(ConfigKey::StateDir);
        if dir.is_empty() {
            dir = Config::default(ConfigKey::StateDir);
        }

        return path::PathBuf::from(dir);
    }

    pub fn default(key: ConfigKey) -> String {
        let default_endpoint = BackendName::GptStream.to_string();

        let config_path = dirs::config_dir()
            .unwrap_or_else(|| return path::PathBuf::from("."))
            .join("counsel/config.toml");
        let state_dir = dirs::cache_dir()
            .unwrap_or_else(|| return path::PathBuf::from("."))
            .join("counsel/state");

        let res = match key {
            ConfigKey::ApiURL => "http://localhost:3000/api",
            ConfigKey::AssistantPath => "/assistant",
            ConfigKey::AuthToken => "",
            ConfigKey::AuthTokenCommand => "",
            ConfigKey::Endpoint => default_endpoint.as_str(),
            ConfigKey::GptStreamPath => "/gpt/stream",
            ConfigKey::SessionMaxFailures => "5",
            ConfigKey::SessionPollInterval => "300000",
            ConfigKey::StreamIdleTimeout => "120000",
            ConfigKey::TokenRetryAttempts => "5",
            ConfigKey::TokenRetryDelay => "500",

            // Special
            ConfigKey::ConfigFile => return config_path.to_string_lossy().to_string(),
            ConfigKey::ConversationID => "",
            ConfigKey::StateDir => return state_dir.to_string_lossy().to_string(),
        };

        return res.to_string();
    }

    pub async fn load(cmd: Command, clap_arg_matches: Vec<&ArgMatches>) -> Result<()> {
        for key in ConfigKey::iter() {
            Config::set(key, &Config::default(key))
        }

        let mut config_file = Config::default(ConfigKey::ConfigFile);
        for matches in clap_arg_matches.as_slice() {
            if let Ok(Some(arg_config_file)) =
                matches.try_get_one::<String>(&ConfigKey::ConfigFile.to_string())
            {
                config_file = arg_config_file.to_string();
            }
        }

        let config_path = path::PathBuf::from(config_file);
        if config_path.exists() {
            let toml_str = fs::read_to_string(config_path).await?;
            let doc = toml_str.parse::<toml_edit::Document>()?;

            for key in ConfigKey::iter() {
                if let Some(val) = doc.get(&key.to_string()) {
                    // Use clap value parsers to do validation.
                    let mut possible_values = vec![];
                    if let Some(arg) = Config::find_arg(&cmd, key) {
                        if !arg.get_possible_values().is_empty() {
                            possible_values = arg
                                .get_possible_values()
                                .iter()
                                .map(|e| return e.get_name().to_string())
                                .collect::<Vec<String>>();
                        }
                    }

                    if let Some(val_int) = val.as_integer() {
                        Config::set(key, &val_int.to_string());
                    } else if let Some(val_str) = val.as_str() {
                        if val_str.is_empty() {
                            continue;
                        }
                        if !possible_values.is_empty()
                            && !possible_values.contains(&val_str.to_string())
                        {
                            bail!(format!("config.toml has an invalid value for key '{key}': {val_str}\nPossible values are: {}", possible_values.join(", ")));
                        }
                        Config::set(key, val_str);
                    }
                }
            }
        }

        for key in ConfigKey::iter() {
            for matches in clap_arg_matches.as_slice() {
                if let Ok(Some(val)) = matches.try_get_one::<String>(&key.to_string()) {
                    if val.is_empty() {
                        continue;
                    }
                    Config::set(key, val)
                }
            }
        }

        tracing::debug!(
            api_url = %Config::get(ConfigKey::ApiURL),
            endpoint = %Config::get(ConfigKey::Endpoint),
            state_dir = %Config::get(ConfigKey::StateDir),
            token_command = !Config::get(ConfigKey::AuthTokenCommand).is_empty(),
            "config"
        );

        return Ok(());
    }

    /// Finds the clap argument for a key, searching subcommands too since
    /// the chat options are only registered on `chat`.
    fn find_arg(cmd: &Command, key: ConfigKey) -> Option<clap::Arg> {
        let long = key.to_string();
        if let Some(arg) = cmd
            .get_arguments()
            .find(|e| return e.get_long() == Some(long.as_str()))
        {
            return Some(arg.clone());
        }

        for sub in cmd.get_subcommands() {
            if let Some(arg) = Config::find_arg(sub, key) {
                return Some(arg);
            }
        }

        return None;
    }

    pub fn serialize_default(cmd: Command) -> String {
        let toml_str = ConfigKey::iter()
            .filter_map(|key| {
                if key == ConfigKey::ConversationID || key == ConfigKey::ConfigFile {
                    return None;
                }

                let arg = Config::find_arg(&cmd, key)?;
                let mut description = arg.get_help()?.to_string();

                description = description
                    .split("[default:")
                    .next()
                    .unwrap_or_default()
                    .trim()
                    .to_string();

                if !arg.get_possible_values().is_empty() {
                    let possible_values = arg
                        .get_possible_values()
                        .iter()
                        .map(|e| return e.get_name().to_string())
                        .collect::<Vec<_>>()
                        .join(", ");
                    description = format!("{description} [possible values: {}]", possible_values);
                }

                let mut val = Config::default(key);
                if val.is_empty() || key == ConfigKey::StateDir {
                    val = format!("# {key} = \"\"");
                } else if val.parse::<i64>().is_ok() {
                    val = format!("{key} = {val}");
                } else {
                    val = format!("{key} = \"{val}\"");
                }

                return Some(format!("# {description}\n{val}"));
            })
            .collect::<Vec<String>>()
            .join("\n\n");

        return toml_str;
    }
}
