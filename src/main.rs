use std::io::Write;

use chatty_relay::cli::{Action, Command};
use chatty_relay::client::{
    ChatClient, ClientError, ConversationState, Entry, EntryId, StreamEvent,
};
use chatty_relay::config::{Configuration, init_logger};
use chatty_relay::server;
use eyre::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};

#[tokio::main]
async fn main() -> Result<()> {
    let cmd = Command::new();
    if cmd.version() {
        cmd.print_version();
        return Ok(());
    }

    std::panic::set_hook(Box::new(|panic_info| {
        better_panic::Settings::auto().create_panic_handler()(panic_info);
    }));

    let mut config = cmd.get_config()?;
    init_logger(&config.log)?;
    log::debug!("logger initialized");

    let client = ChatClient::from_config(&config.client);
    match cmd.action() {
        Action::Serve { listen } => {
            if let Some(listen) = listen {
                config.server.listen = listen;
            }
            serve(&config).await
        }
        Action::Chat {
            assistant,
            thread,
            title,
            message,
        } => chat(&client, assistant, thread, &title, message).await,
        Action::Messages { thread } => {
            let mut state = ConversationState::new(thread);
            client.reload(&mut state).await?;
            for entry in state.entries() {
                print_entry(entry);
            }
            Ok(())
        }
        Action::Sync { thread } => {
            let res = client.sync(thread).await?;
            println!("synced {} of {} messages", res.synced, res.total);
            Ok(())
        }
        Action::Assistants => {
            for assistant in client.assistants().await? {
                println!(
                    "{}\t{}\t{}",
                    assistant.id, assistant.name, assistant.open_ai_assistant_id
                );
            }
            Ok(())
        }
        Action::Threads { assistant } => {
            for thread in client.threads(assistant).await? {
                println!(
                    "{}\t{}\t{}",
                    thread.id,
                    thread.created_at.format("%Y-%m-%d %H:%M"),
                    thread.thread_title
                );
            }
            Ok(())
        }
    }
}

async fn serve(config: &Configuration) -> Result<()> {
    if config.upstream.api_key().is_none() {
        log::warn!("upstream requests will be sent without an API key");
    }
    server::serve(config).await.wrap_err("running server")
}

async fn chat(
    client: &ChatClient,
    assistant_id: i64,
    thread_id: Option<i64>,
    title: &str,
    message: Option<String>,
) -> Result<()> {
    let thread_id = match thread_id {
        Some(id) => id,
        None => {
            let thread = client.create_thread(assistant_id, title).await?;
            eprintln!("created thread {}", thread.id);
            thread.id
        }
    };

    let mut state = ConversationState::new(thread_id);
    client.reload(&mut state).await?;

    if let Some(message) = message {
        return send(client, assistant_id, &mut state, &message).await;
    }

    for entry in state.entries() {
        print_entry(entry);
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.wrap_err("reading stdin")? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Err(err) = send(client, assistant_id, &mut state, line).await {
            eprintln!("Error: {}", err);
        }
    }
    Ok(())
}

async fn send(
    client: &ChatClient,
    assistant_id: i64,
    state: &mut ConversationState,
    content: &str,
) -> Result<()> {
    let result = client
        .send(assistant_id, state, content, |event| {
            if let StreamEvent::Token(text) = event {
                print!("{}", text);
                let _ = std::io::stdout().flush();
            }
        })
        .await;
    println!();

    match result {
        Ok(()) => Ok(()),
        Err(ClientError::Run(message)) => eyre::bail!("run failed: {}", message),
        Err(err) => Err(err.into()),
    }
}

fn print_entry(entry: &Entry) {
    let marker = match entry.id {
        EntryId::Durable(id) => id.to_string(),
        EntryId::Pending(_) => "pending".to_string(),
        EntryId::InProgress => "...".to_string(),
        EntryId::Stale(_) => "failed".to_string(),
    };
    println!("[{}] {}: {}", marker, entry.role, entry.content);
}
