use std::{sync::Arc, time::Duration};

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use client_core::{
    spawn_change_listener, ClientEvent, DashboardSession, HttpBackend, DEFAULT_REQUEST_TIMEOUT,
};
use shared::{
    dashboard::DashboardAggregate,
    domain::{LinkId, SectionId},
    protocol::{CreateLinkRequest, UpdateLinkRequest},
};
use tokio::sync::broadcast::error::RecvError;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
struct Args {
    #[arg(long, default_value = "http://127.0.0.1:8443")]
    server_url: String,
    #[arg(long)]
    username: String,
    #[arg(long, default_value_t = DEFAULT_REQUEST_TIMEOUT.as_secs())]
    timeout_secs: u64,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Prints the dashboard (default).
    Show,
    /// Moves a section to a zero-based position in the section list.
    Move { section_id: i64, to_index: usize },
    Pin { link_id: i64 },
    AddLink {
        title: String,
        url: String,
        #[arg(long)]
        section_id: Option<i64>,
        #[arg(long)]
        description: Option<String>,
    },
    /// Moves a link into another section; omit the id to unassign it.
    MoveLink {
        link_id: i64,
        section_id: Option<i64>,
    },
    DeleteLink { link_id: i64 },
    AddSection { name: String },
    RenameSection { section_id: i64, name: String },
    DeleteSection { section_id: i64 },
    /// Reprints the dashboard whenever it changes on the server.
    Watch,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();
    let args = Args::parse();

    let backend = HttpBackend::login(
        &args.server_url,
        &args.username,
        Duration::from_secs(args.timeout_secs),
    )
    .await?;
    let user_id = backend.user_id();
    info!(%user_id, "logged in");
    let session = Arc::new(DashboardSession::open(backend).await?);

    match args.command.unwrap_or(Command::Show) {
        Command::Show => {}
        Command::Move {
            section_id,
            to_index,
        } => {
            let moved = SectionId(section_id);
            let from_index = session
                .snapshot()
                .await
                .section_ids()
                .iter()
                .position(|id| *id == moved)
                .ok_or_else(|| anyhow!("no section {moved}"))?;
            session.move_section(moved, from_index, to_index).await?;
        }
        Command::Pin { link_id } => session.toggle_pin(LinkId(link_id)).await?,
        Command::AddLink {
            title,
            url,
            section_id,
            description,
        } => {
            let link = session
                .create_link(CreateLinkRequest {
                    title,
                    url,
                    description,
                    is_pinned: false,
                    section_id: section_id.map(SectionId),
                })
                .await?;
            println!("created link {} <{}>", link.id, link.url);
        }
        Command::MoveLink {
            link_id,
            section_id,
        } => {
            session
                .update_link(
                    LinkId(link_id),
                    UpdateLinkRequest::move_to(section_id.map(SectionId)),
                )
                .await?
        }
        Command::DeleteLink { link_id } => session.delete_link(LinkId(link_id)).await?,
        Command::AddSection { name } => {
            let section = session.create_section(&name).await?;
            println!("created section {} at position {}", section.id, section.order);
        }
        Command::RenameSection { section_id, name } => {
            session.rename_section(SectionId(section_id), &name).await?
        }
        Command::DeleteSection { section_id } => {
            let reassigned = session.delete_section(SectionId(section_id)).await?;
            println!("moved {reassigned} link(s) to the default section");
        }
        Command::Watch => return watch(session, &args.server_url).await,
    }

    if session.is_stale().await {
        println!("(could not refresh; showing the last known state)");
    }
    print_dashboard(&session.snapshot().await);
    Ok(())
}

async fn watch(session: Arc<DashboardSession<HttpBackend>>, server_url: &str) -> Result<()> {
    let user_id = session.backend().user_id();
    let mut events = session.subscribe();
    let listener = spawn_change_listener(session.clone(), server_url, user_id).await?;
    print_dashboard(&session.snapshot().await);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(ClientEvent::DashboardUpdated(dashboard)) => {
                    println!();
                    print_dashboard(&dashboard);
                }
                Ok(ClientEvent::MutationFailed { error, .. }) => println!("change failed: {error}"),
                Ok(ClientEvent::StateChanged(_)) => {}
                Err(RecvError::Lagged(_)) => print_dashboard(&session.snapshot().await),
                Err(RecvError::Closed) => break,
            },
        }
    }
    listener.abort();
    Ok(())
}

fn print_dashboard(dashboard: &DashboardAggregate) {
    if !dashboard.pinned_links.is_empty() {
        println!("Pinned");
        for link in &dashboard.pinned_links {
            println!("  [{}] {} <{}>", link.id, link.title, link.url);
        }
    }
    for (index, entry) in dashboard.sections.iter().enumerate() {
        println!("{index}. {} [{}]", entry.section.name, entry.section.id);
        if entry.links.is_empty() {
            println!("  (empty)");
        }
        for link in &entry.links {
            let pin = if link.is_pinned { "*" } else { " " };
            println!(" {pin}[{}] {} <{}>", link.id, link.title, link.url);
        }
    }
}
