use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

/// Default grace period for a language server to exit after `shutdown`
pub const DEFAULT_STOP_GRACE_MS: u64 = 2_000;

/// Default timeout for requests sent to the language server
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;

/// Which build of the host editor is running. Only picks the snippet directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HostChannel {
    #[default]
    Stable,
    Preview,
}

impl HostChannel {
    /// Name of the host's per-user application directory
    pub fn app_dir_name(self) -> &'static str {
        match self {
            HostChannel::Stable => "Code",
            HostChannel::Preview => "Code - Insiders",
        }
    }
}

/// How to launch the language server process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerCommand {
    pub program: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub cwd: Option<PathBuf>,
}

impl ServerCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            cwd: None,
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }
}

/// Command-line arguments of the console host
#[derive(Debug, Parser)]
#[command(name = "vls-client")]
#[command(about = "Console host for the template language server client")]
#[command(version)]
pub struct Args {
    /// Language server executable
    #[arg(long, default_value = "vls")]
    pub server: String,

    /// Extra argument passed to the language server (repeatable)
    #[arg(long = "server-arg", allow_hyphen_values = true)]
    pub server_args: Vec<String>,

    /// Working directory of the language server
    #[arg(long)]
    pub cwd: Option<PathBuf>,

    /// Use the preview build's snippet directory
    #[arg(long)]
    pub preview: bool,

    /// Grace period for the server to exit before it is killed
    #[arg(long, default_value_t = DEFAULT_STOP_GRACE_MS)]
    pub stop_grace_ms: u64,

    /// Timeout for requests sent to the server
    #[arg(long, default_value_t = DEFAULT_REQUEST_TIMEOUT_MS)]
    pub request_timeout_ms: u64,
}

/// Resolved client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server: ServerCommand,
    pub channel: HostChannel,
    pub snippet_dir: PathBuf,
    pub stop_grace: Duration,
    pub request_timeout: Duration,
}

impl ClientConfig {
    /// Builds a configuration with default timings for `server`.
    pub fn new(server: ServerCommand, channel: HostChannel) -> Self {
        Self {
            server,
            channel,
            snippet_dir: global_snippet_dir(channel),
            stop_grace: Duration::from_millis(DEFAULT_STOP_GRACE_MS),
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
        }
    }

    pub fn from_args(args: Args) -> Self {
        let channel = if args.preview {
            HostChannel::Preview
        } else {
            HostChannel::Stable
        };

        let mut server = ServerCommand::new(args.server).with_args(args.server_args);
        server.cwd = args.cwd;

        Self {
            stop_grace: Duration::from_millis(args.stop_grace_ms),
            request_timeout: Duration::from_millis(args.request_timeout_ms),
            ..Self::new(server, channel)
        }
    }
}

/// Returns the global scaffold snippet directory for the given host build.
///
/// Resolves to `<config dir>/<Code | Code - Insiders>/User/snippets/vls`, where
/// the config dir is `%APPDATA%` on Windows, `~/Library/Application Support`
/// on macOS and `$XDG_CONFIG_HOME` or `~/.config` elsewhere.
pub fn global_snippet_dir(channel: HostChannel) -> PathBuf {
    snippet_dir_with_base(channel, dirs::config_dir())
}

/// Returns the path to the data directory for vls-client.
/// Uses $XDG_DATA_HOME/vls-client if XDG_DATA_HOME is set,
/// otherwise falls back to ~/.local/share/vls-client,
/// or ./vls-client if neither is available.
pub fn data_dir() -> PathBuf {
    data_dir_with_env(std::env::var("XDG_DATA_HOME").ok(), dirs::home_dir())
}

pub const LOG_FILE_NAME: &str = "vls-client.log";

fn snippet_dir_with_base(channel: HostChannel, config_dir: Option<PathBuf>) -> PathBuf {
    config_dir
        .unwrap_or_else(|| PathBuf::from("."))
        .join(channel.app_dir_name())
        .join("User")
        .join("snippets")
        .join("vls")
}

fn data_dir_with_env(xdg_data_home: Option<String>, home_dir: Option<PathBuf>) -> PathBuf {
    let data_dir = xdg_data_home
        .map(PathBuf::from)
        .or_else(|| home_dir.map(|home| home.join(".local/share")))
        .unwrap_or_else(|| PathBuf::from("."));

    data_dir.join("vls-client")
}
