#[cfg(test)]
#[path = "cli_test.rs"]
mod tests;

use clap::{Parser, Subcommand};
use eyre::{Context, Result};

use crate::config::{self, Configuration, load_configuration, lookup_config_path};

#[derive(Debug, Parser)]
#[command(
    version,
    about,
    long_about = r#"Relay OpenAI assistant runs to chat clients as a framed event stream

Default configuration file location looks up in the following order:
    * $XDG_CONFIG_HOME/chatty-relay/config.toml
    * $HOME/.config/chatty-relay/config.toml
    * $HOME/.chatty-relay.toml
"#,
    disable_version_flag = true
)]
pub struct Command {
    /// Configuration file path
    #[arg(short, long, value_name = "PATH", global = true)]
    config: Option<String>,

    /// Show the version
    #[arg(short, long)]
    version: bool,

    #[command(subcommand)]
    action: Option<Action>,
}

#[derive(Debug, Clone, PartialEq, Subcommand)]
pub enum Action {
    /// Run the relay server
    Serve {
        /// Listen address, overrides `server.listen`
        #[arg(short, long, value_name = "ADDR")]
        listen: Option<String>,
    },
    /// Chat with an assistant. Reads one message per line from stdin when
    /// no message is given.
    Chat {
        /// Local assistant id
        assistant: i64,

        /// Existing thread id. A new thread is created when omitted.
        #[arg(short, long)]
        thread: Option<i64>,

        /// Title of the thread to create
        #[arg(long, default_value = "New chat")]
        title: String,

        /// Send a single message and exit
        #[arg(short, long)]
        message: Option<String>,
    },
    /// Print the stored transcript of a thread
    Messages { thread: i64 },
    /// Rebuild the stored transcript of a thread from the upstream
    Sync { thread: i64 },
    /// List assistants
    Assistants,
    /// List threads of an assistant, newest first
    Threads { assistant: i64 },
}

impl Command {
    pub fn new() -> Command {
        Self::parse()
    }

    pub fn get_config(&self) -> Result<Configuration> {
        let config_path = self
            .config
            .clone()
            .unwrap_or_else(|| lookup_config_path().unwrap_or_default());

        if config_path.is_empty() {
            // No config path is specified just use the default config
            return Ok(Configuration::default());
        }
        load_configuration(config_path.as_str()).wrap_err("loading configuration")
    }

    pub fn version(&self) -> bool {
        self.version
    }

    pub fn print_version(&self) {
        println!("{}", config::version())
    }

    /// The requested action. Defaults to `serve`.
    pub fn action(&self) -> Action {
        self.action
            .clone()
            .unwrap_or(Action::Serve { listen: None })
    }
}
