use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::Parser;
use client_core::{
    HostedBackend, HostedBackendConfig, Messages, Navigator, SessionStore, SessionTracker,
    SyncError, TodoList, TrackerSettings,
};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::mpsc,
};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod view;

use commands::{Command, ItemRef, HELP};
use config::load_settings;

#[derive(Parser, Debug)]
#[command(about = "Terminal front end for the hosted to-do list")]
struct Args {
    /// Path to a TOML settings file (default: ./console.toml if present).
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    backend_url: Option<String>,
    #[arg(long)]
    anon_key: Option<String>,
}

/// Turns a hard-reload request into a resync on the input loop.
struct ConsoleNavigator {
    reload_tx: mpsc::UnboundedSender<String>,
}

#[async_trait]
impl Navigator for ConsoleNavigator {
    async fn hard_reload(&self, destination: &str) {
        if self.reload_tx.send(destination.to_string()).is_err() {
            debug!(destination, "reload requested after the input loop stopped");
        }
    }
}

struct App {
    tracker: SessionTracker,
    todos: Arc<TodoList>,
    messages: Messages,
}

impl App {
    /// Re-queries the session and reloads the list from scratch.
    async fn resync(&self) {
        let user = self.tracker.current_session().await;
        println!("{}", view::render_session(user.as_ref()));
        if user.is_some() {
            self.load_and_show().await;
        } else {
            self.show().await;
        }
    }

    async fn show(&self) {
        let items = self.todos.items().await;
        let loading = self.todos.is_loading().await;
        println!(
            "{}",
            view::render_list(items.as_deref(), loading, &self.messages)
        );
    }

    async fn load_and_show(&self) {
        match self.todos.load().await {
            Ok(_) => self.show().await,
            Err(err) => self.report(&err),
        }
    }

    fn report(&self, err: &SyncError) {
        println!("! {}", err.user_message(&self.messages));
    }

    async fn resolve(&self, target: &ItemRef) -> Option<shared::domain::TodoId> {
        let items = self.todos.items().await.unwrap_or_default();
        target.resolve(&items)
    }

    /// Returns `false` when the user asked to quit.
    async fn handle(&self, command: Command) -> bool {
        debug!(command = command.name(), "console command");
        match command {
            Command::SignIn { email, password } => {
                match self.tracker.sign_in(&email, &password).await {
                    Ok(notice) => println!("{notice}"),
                    Err(err) => println!("! {}", err.user_message()),
                }
            }
            Command::SignOut => {
                if let Err(err) = self.tracker.sign_out().await {
                    println!("! {}", err.user_message());
                }
            }
            Command::ResetPassword { email } => {
                match self.tracker.request_password_reset(&email).await {
                    Ok(notice) => println!("{notice}"),
                    Err(err) => println!("! {}", err.user_message()),
                }
            }
            Command::WhoAmI => {
                let user = self.tracker.store().current_user();
                println!("{}", view::render_session(user.as_ref()));
            }
            Command::List => self.load_and_show().await,
            Command::Add { title } => match self.todos.add(&title).await {
                Ok(_) => self.show().await,
                Err(err) => self.report(&err),
            },
            Command::Toggle { target } => match self.resolve(&target).await {
                Some(id) => match self.todos.toggle(&id).await {
                    Ok(_) => self.show().await,
                    Err(err) => self.report(&err),
                },
                None => println!("! {}", self.messages.unknown_item()),
            },
            Command::Remove { target } => match self.resolve(&target).await {
                Some(id) => match self.todos.remove(&id).await {
                    Ok(()) => self.show().await,
                    Err(err) => self.report(&err),
                },
                None => println!("! {}", self.messages.unknown_item()),
            },
            Command::Help => println!("{HELP}"),
            Command::Quit => return false,
        }
        true
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();

    let mut settings = load_settings(args.config.as_deref())?;
    if let Some(backend_url) = args.backend_url {
        settings.backend_url = backend_url;
    }
    if let Some(anon_key) = args.anon_key {
        settings.anon_key = anon_key;
    }
    config::validate(&settings)?;
    info!(backend_url = %settings.backend_url, table = %settings.todos_table, "starting console");

    let backend = Arc::new(
        HostedBackend::new(HostedBackendConfig {
            base_url: settings.backend_url.clone(),
            anon_key: settings.anon_key.clone(),
            todos_table: settings.todos_table.clone(),
        })
        .context("invalid backend url")?,
    );
    let tracker_settings = TrackerSettings::from_origin(&settings.site_origin, &settings.home_path)
        .context("invalid site origin or home path")?;

    let (reload_tx, mut reload_rx) = mpsc::unbounded_channel();
    let messages = Messages::new(settings.locale);
    let store = Arc::new(SessionStore::new());
    let app = App {
        tracker: SessionTracker::new(
            backend.clone(),
            store.clone(),
            Arc::new(ConsoleNavigator { reload_tx }),
            messages,
            tracker_settings,
        ),
        todos: Arc::new(TodoList::new(backend, store, messages)),
        messages,
    };

    let subscription = app.tracker.on_session_change(|user| {
        println!("* {}", view::render_session(user.as_ref()));
    });

    let user = app.tracker.current_session().await;
    println!("{}", view::render_session(user.as_ref()));
    match app.todos.wait_for_session_and_load().await {
        Ok(_) => app.show().await,
        Err(err) => app.report(&err),
    }
    println!("type 'help' for commands");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("failed to read stdin")? else {
                    break;
                };
                match Command::parse(&line) {
                    Ok(Some(command)) => {
                        if !app.handle(command).await {
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(usage) => println!("! {usage}"),
                }
            }
            Some(destination) = reload_rx.recv() => {
                info!(%destination, "resyncing after sign-in");
                app.resync().await;
            }
        }
    }

    subscription.unsubscribe().await;
    Ok(())
}
