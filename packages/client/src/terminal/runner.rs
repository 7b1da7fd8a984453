//! Terminal session: sign in, list contacts, then drive the synchronizer from stdin.

use std::sync::Arc;

use kizuna_shared::time::SystemClock;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::command::TerminalCommand;
use super::formatter::MessageFormatter;
use super::ui::{ScreenView, redisplay_prompt};
use crate::config::ClientConfig;
use crate::domain::{ChannelKind, ContactDirectory, Identity, UserProfile};
use crate::error::SessionError;
use crate::infrastructure::http::{HttpAuthGateway, HttpContactDirectory};
use crate::infrastructure::transport::WebSocketTransport;
use crate::session::Session;
use crate::sync::{SyncHandle, Synchronizer};

/// Run the terminal client until `/quit`, Ctrl+C or Ctrl+D.
///
/// Only a failed sign-in is reported as an error; everything after that is
/// logged and the session keeps going.
pub async fn run_terminal(
    config: ClientConfig,
    mobile: &str,
    password: &str,
) -> Result<(), SessionError> {
    let session = Arc::new(Session::new(Arc::new(HttpAuthGateway::new(
        config.http_base_url.clone(),
    ))));
    let identity = session.login(mobile, password).await?;
    let refresh_task = session.spawn_refresh_loop(config.token_refresh_interval);

    let contacts = fetch_contacts(&config, &identity).await;
    print!("{}", MessageFormatter::format_contacts(&contacts));

    let handle = Synchronizer::spawn(
        config,
        Arc::new(WebSocketTransport),
        Arc::new(SystemClock),
        session.identity(),
    );

    let prompt = format!("{}> ", identity.user.name);
    println!(
        "\nYou are '{}'. Use /chat <mobile> to open a conversation, then type messages and press Enter.\n",
        identity.user.name
    );

    let printer_task = spawn_printer(&handle, identity.user.id.clone(), prompt.clone());
    let mut input_rx = spawn_readline(prompt.clone());

    while let Some(line) = input_rx.recv().await {
        match TerminalCommand::parse(&line) {
            Ok(TerminalCommand::Quit) => break,
            Ok(command) => execute(&handle, &contacts, command).await,
            Err(e) => print!("{}", MessageFormatter::format_error(&e)),
        }
        redisplay_prompt(&prompt);
    }

    handle.shutdown().await;
    printer_task.abort();
    refresh_task.abort();
    Ok(())
}

async fn fetch_contacts(config: &ClientConfig, identity: &Identity) -> Vec<UserProfile> {
    let directory = HttpContactDirectory::new(config.http_base_url.clone());
    match directory.contacts(identity).await {
        Ok(contacts) => contacts,
        Err(e) => {
            tracing::warn!("Failed to fetch contacts: {}", e);
            Vec::new()
        }
    }
}

async fn execute(handle: &SyncHandle, contacts: &[UserProfile], command: TerminalCommand) {
    let result = match command {
        TerminalCommand::Chat(mobile) => {
            let contact = contacts
                .iter()
                .find(|contact| contact.mobile == mobile)
                .cloned()
                .unwrap_or_else(|| UserProfile {
                    name: mobile.clone(),
                    mobile: mobile.clone(),
                    ..UserProfile::default()
                });
            handle.open_direct_chat(contact).await.map(|chat_id| {
                println!("\nNow chatting in {}", chat_id);
            })
        }
        TerminalCommand::Chats => {
            let state = handle.state().borrow().clone();
            print!("{}", MessageFormatter::format_conversations(&state));
            Ok(())
        }
        TerminalCommand::Typing => handle.send_typing().await,
        TerminalCommand::Read(message_id) => handle.mark_read(message_id).await,
        TerminalCommand::Reconnect => handle.reconnect_all().await,
        TerminalCommand::Send(text) => handle.send_text(text).await,
        TerminalCommand::Quit => Ok(()),
    };

    if let Err(e) = result {
        tracing::warn!("Command failed: {}", e);
        print!("{}", MessageFormatter::format_error(&e));
    }
}

/// Print store changes and channel state transitions as they happen
fn spawn_printer(handle: &SyncHandle, self_id: String, prompt: String) -> JoinHandle<()> {
    let mut state_rx = handle.state();
    let mut connections_rx = handle.connection_states();

    tokio::spawn(async move {
        let mut view = ScreenView::new(self_id);
        let mut last_connections = *connections_rx.borrow_and_update();

        loop {
            tokio::select! {
                changed = state_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let state = state_rx.borrow_and_update().clone();
                    let output = view.render(&state);
                    if !output.is_empty() {
                        print!("{}", output);
                        redisplay_prompt(&prompt);
                    }
                }
                changed = connections_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let connections = *connections_rx.borrow_and_update();
                    for kind in ChannelKind::ALL {
                        let state = connections.get(kind);
                        if state != last_connections.get(kind) {
                            print!("{}", MessageFormatter::format_connection_state(kind, state));
                        }
                    }
                    last_connections = connections;
                    redisplay_prompt(&prompt);
                }
            }
        }
    })
}

/// Read lines on a blocking thread and forward them to the async side
fn spawn_readline(prompt: String) -> mpsc::UnboundedReceiver<String> {
    let (input_tx, input_rx) = mpsc::unbounded_channel::<String>();

    std::thread::spawn(move || {
        let mut rl = match DefaultEditor::new() {
            Ok(rl) => rl,
            Err(e) => {
                eprintln!("Failed to initialize readline: {}", e);
                return;
            }
        };

        loop {
            match rl.readline(&prompt) {
                Ok(line) => {
                    let line = line.trim();
                    if !line.is_empty() {
                        rl.add_history_entry(line).ok();
                        if input_tx.send(line.to_string()).is_err() {
                            break;
                        }
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    tracing::info!("Interrupted");
                    break;
                }
                Err(ReadlineError::Eof) => {
                    tracing::info!("EOF");
                    break;
                }
                Err(err) => {
                    tracing::error!("Readline error: {}", err);
                    break;
                }
            }
        }
    });

    input_rx
}
