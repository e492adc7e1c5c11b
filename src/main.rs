use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

use vls_client::config::{Args, ClientConfig};
use vls_client::console::{ConsoleCommand, ConsoleHost, parse_line};
use vls_client::{Extension, log};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let _guard = log::init()?;

    let config = ClientConfig::from_args(args);
    info!("Starting vls-client with server {}", config.server.program);

    let host = Arc::new(ConsoleHost::new(std::io::stdout()));
    let extension = Extension::activate(host.clone(), &config).await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match parse_line(&line) {
            None => {}
            Some(ConsoleCommand::Quit) => break,
            Some(ConsoleCommand::Cat(uri)) => match host.read_document(&uri) {
                Some(content) => host.print(&content),
                None => host.print(&format!("no provider for {}", uri)),
            },
            Some(ConsoleCommand::Open(uri)) => host.set_active_document(uri),
            Some(ConsoleCommand::Run { id, args }) => {
                // Failures are already on the output channel.
                let _ = extension.execute_command(&id, args).await;
            }
        }
    }

    extension.deactivate().await;
    Ok(())
}
