use std::io::Write as _;

use anyhow::Context;
use chrono::{Local, Utc};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use rag_console::config::Settings;
use rag_console::console::{
    render_groups, render_reference, render_references, Command, Renderer, HELP,
};
use rag_console::errors::AppError;
use rag_console::service::{ChatSession, PollingReconciler};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present (development convenience)
    dotenvy::dotenv().ok();

    // Logs go to stderr so they never interleave with the transcript.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rag_console=info".into()),
        )
        .init();

    let settings = Settings::from_env().context("invalid RAG_* configuration")?;
    info!("Using admin backend at {}", settings.api_base);
    let session = ChatSession::new(settings.clone())?;

    // ── Render loop ───────────────────────────────────────────────────────────
    let mut events = session.subscribe();
    tokio::spawn(async move {
        let mut renderer = Renderer::new();
        loop {
            match events.recv().await {
                Ok(event) => {
                    if let Some(text) = renderer.render(&event) {
                        print!("{text}");
                        let _ = std::io::stdout().flush();
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Renderer fell behind; {skipped} events dropped")
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    // ── Session start ─────────────────────────────────────────────────────────
    if !session.api().client().has_token().await {
        match settings.admin_password.as_deref() {
            Some(password) => {
                session.api().client().login(password).await.context("admin login failed")?
            }
            None => println!("No admin token configured; sign in with /login <password>."),
        }
    }
    if session.api().client().has_token().await {
        load_sidebar(&session).await;
    }

    let mut poller = PollingReconciler::new(session.clone());
    poller.set_panel_visible(true);

    // ── Command loop ──────────────────────────────────────────────────────────
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let command = match Command::parse(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                println!("{e}");
                continue;
            }
        };

        match command {
            Command::Quit => break,
            Command::Help => println!("{HELP}"),
            Command::Send(text) => {
                // Sends run in the background so the user can switch
                // conversations while an answer streams.
                let session = session.clone();
                tokio::spawn(async move {
                    report(session.send(&text).await);
                });
            }
            Command::New => {
                report(session.new_conversation().await);
            }
            Command::List => list_conversations(&session).await,
            Command::Open(id) => {
                report(session.select_conversation(id).await);
            }
            Command::Close => session.close_conversation().await,
            Command::Rename(id, title) => {
                report(session.rename_conversation(id, &title).await);
            }
            Command::Save(id) => {
                if let Some(saved) = report(session.toggle_saved(id).await) {
                    println!("Conversation {id} {}", if saved { "saved" } else { "unsaved" });
                }
            }
            Command::Delete(id) => {
                report(session.delete_conversation(id).await);
            }
            Command::Docs => {
                if report(session.load_documents().await).is_some() {
                    print_documents(&session).await;
                }
            }
            Command::Doc(id, selected) => {
                if session.set_document_selected(id, selected).await {
                    print_documents(&session).await;
                } else {
                    println!("Unknown document {id}; run /docs first.");
                }
            }
            Command::Refs => {
                let (_, references) = session.shown_references().await;
                print!("{}", render_references(&references));
            }
            Command::Ref(index) => match session.open_reference(index).await {
                Some(reference) => print!("{}", render_reference(index, &reference)),
                None => println!("No reference {index}."),
            },
            Command::Login(password) => match session.api().client().login(&password).await {
                Ok(()) => {
                    load_sidebar(&session).await;
                    poller.start();
                }
                Err(e) => println!("! Sign-in failed: {e}"),
            },
            Command::Hide => poller.set_panel_visible(false),
            Command::Show => poller.set_panel_visible(true),
        }
        let _ = std::io::stdout().flush();
    }

    poller.stop();
    Ok(())
}

/// Prints what the session did not already announce as a notice.
fn report<T>(result: Result<T, AppError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) if e.is_validation() || e.is_busy() => {
            println!("! {e}");
            None
        }
        Err(e) => {
            debug!("Command failed: {e}");
            None
        }
    }
}

async fn load_sidebar(session: &ChatSession) {
    list_conversations(session).await;
    report(session.load_documents().await);
}

/// Listing failures are not announced by the session, so print them here.
async fn list_conversations(session: &ChatSession) {
    match session.refresh_conversations().await {
        Ok(_) => {
            let groups = session.conversation_groups(Local::now()).await;
            print!("{}", render_groups(&groups, Utc::now()));
        }
        Err(AppError::SessionExpired) => {}
        Err(e) => println!("! Could not load conversations: {e}"),
    }
}

async fn print_documents(session: &ChatSession) {
    for (document, selected) in session.documents().await {
        println!("  [{}] {} {}", if selected { "x" } else { " " }, document.id, document.filename);
    }
}
