use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use server_api::ApiContext;
use shared::{
    domain::{LinkId, SectionId, UserId},
    ordering,
    protocol::{CreateLinkRequest, UpdateLinkRequest},
};
use storage::Storage;
use tracing_subscriber::EnvFilter;

/// Seeds and inspects a LinkVault database without a running server.
#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, default_value = "sqlite://./data/linkvault.db")]
    database_url: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Creates the user (and its default section) or returns the existing id.
    CreateUser { username: String },
    Dashboard { user_id: i64 },
    AddSection { user_id: i64, name: String },
    AddLink {
        user_id: i64,
        title: String,
        url: String,
        #[arg(long)]
        section_id: Option<i64>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        pinned: bool,
    },
    Pin {
        user_id: i64,
        link_id: i64,
        #[arg(long)]
        off: bool,
    },
    /// Rewrites section ranks so they follow the given id order.
    Reorder {
        user_id: i64,
        #[arg(required = true)]
        section_ids: Vec<i64>,
    },
    DeleteSection { user_id: i64, section_id: i64 },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();
    let cli = Cli::parse();
    let storage = Storage::new(&cli.database_url)
        .await
        .with_context(|| format!("failed to open {}", cli.database_url))?;
    let ctx = ApiContext { storage };

    match cli.command {
        Command::CreateUser { username } => {
            let user_id = server_api::login(&ctx, &username).await?;
            println!("user_id={user_id}");
        }
        Command::Dashboard { user_id } => {
            let dashboard = server_api::fetch_dashboard(&ctx, UserId(user_id)).await?;
            if !dashboard.pinned_links.is_empty() {
                println!("Pinned");
                for link in &dashboard.pinned_links {
                    println!("  [{}] {} <{}>", link.id, link.title, link.url);
                }
            }
            for entry in &dashboard.sections {
                let marker = if entry.section.is_default { " (default)" } else { "" };
                println!(
                    "{}. {} [{}]{marker}",
                    entry.section.order, entry.section.name, entry.section.id
                );
                for link in &entry.links {
                    let pin = if link.is_pinned { "*" } else { " " };
                    println!("  {pin}[{}] {} <{}>", link.id, link.title, link.url);
                }
            }
        }
        Command::AddSection { user_id, name } => {
            let section = server_api::create_section(&ctx, UserId(user_id), &name).await?;
            println!("section_id={} order={}", section.id, section.order);
        }
        Command::AddLink {
            user_id,
            title,
            url,
            section_id,
            description,
            pinned,
        } => {
            let request = CreateLinkRequest {
                title,
                url,
                description,
                is_pinned: pinned,
                section_id: section_id.map(SectionId),
            };
            let link = server_api::create_link(&ctx, UserId(user_id), &request).await?;
            println!("link_id={} url={}", link.id, link.url);
        }
        Command::Pin {
            user_id,
            link_id,
            off,
        } => {
            let link = server_api::update_link(
                &ctx,
                UserId(user_id),
                LinkId(link_id),
                &UpdateLinkRequest::pin(!off),
            )
            .await?;
            println!("link_id={} is_pinned={}", link.id, link.is_pinned);
        }
        Command::Reorder {
            user_id,
            section_ids,
        } => {
            let sequence: Vec<SectionId> = section_ids.into_iter().map(SectionId).collect();
            let assignments = ordering::to_order_assignments(&sequence);
            server_api::reorder_sections(&ctx, UserId(user_id), &assignments).await?;
            println!("reordered {} sections", assignments.len());
        }
        Command::DeleteSection {
            user_id,
            section_id,
        } => {
            let response =
                server_api::delete_section(&ctx, UserId(user_id), SectionId(section_id)).await?;
            println!("deleted; reassigned_links={}", response.reassigned_links);
        }
    }

    Ok(())
}
