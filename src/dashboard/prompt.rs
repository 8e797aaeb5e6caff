//! `:` command line of the live dashboard

use crate::actions;
use crate::client::api::FirewallApi;
use crate::client::errors::{ApiError, ApiResult};

pub const PROMPT_HELP: &str =
    "open PORT | allow IP | delete IP | block IP | panel PORT | loglimit MB | strictify";

/// A parsed prompt line; arguments stay raw until the action validates them
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptCommand {
    Open(String),
    Allow(String),
    Delete(String),
    Block(String),
    PanelPort(String),
    LogLimit(String),
    Strictify,
}

impl PromptCommand {
    pub fn parse(line: &str) -> ApiResult<Self> {
        let mut words = line.split_whitespace();
        let verb = words
            .next()
            .ok_or_else(|| ApiError::validation(format!("Commands: {}", PROMPT_HELP)))?;
        let mut argument = || {
            words
                .next()
                .map(str::to_string)
                .ok_or_else(|| ApiError::validation(format!("'{}' needs an argument", verb)))
        };

        let command = match verb.to_ascii_lowercase().as_str() {
            "open" => PromptCommand::Open(argument()?),
            "allow" | "add" => PromptCommand::Allow(argument()?),
            "delete" | "del" | "rm" => PromptCommand::Delete(argument()?),
            "block" | "ban" => PromptCommand::Block(argument()?),
            "panel" => PromptCommand::PanelPort(argument()?),
            "loglimit" => PromptCommand::LogLimit(argument()?),
            "strictify" => PromptCommand::Strictify,
            other => {
                return Err(ApiError::validation(format!(
                    "Unknown command '{}'. Commands: {}",
                    other, PROMPT_HELP
                )));
            }
        };
        Ok(command)
    }

    pub async fn run(self, api: &dyn FirewallApi) -> ApiResult<String> {
        match self {
            PromptCommand::Open(port) => actions::open_port(api, &port).await,
            PromptCommand::Allow(ip) => actions::whitelist_add(api, &ip).await,
            PromptCommand::Delete(ip) => actions::whitelist_delete(api, &ip).await,
            PromptCommand::Block(ip) => actions::block_ip(api, &ip).await,
            PromptCommand::PanelPort(port) => actions::set_panel_port(api, &port).await,
            PromptCommand::LogLimit(text) => {
                let megabytes = text.trim().parse::<u32>().map_err(|_| {
                    ApiError::validation(format!("'{}' is not a size in megabytes", text))
                })?;
                actions::set_log_limit(api, megabytes).await
            }
            PromptCommand::Strictify => actions::strictify(api).await,
        }
    }
}
