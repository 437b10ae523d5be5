use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;

use wallpaper_vault::import::ImportMetadata;
use wallpaper_vault::state::data::{ItemDetails, Rating, TagInput, WallpaperType};
use wallpaper_vault::{LibraryService, MoveSource, Settings};

/// Manage a wallpaper library: scan it, organise items into virtual folders,
/// tag them and import new ones
#[derive(Parser, Debug)]
#[command(name = "wallpaper-vault", version, about)]
struct Cli {
    /// Settings file (defaults to the per-user config directory)
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Library root to use for this run, overriding the settings
    #[arg(long, global = true)]
    library: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write a default settings file
    Init,
    /// Reconcile the library folder with the catalog
    Scan,
    /// List a virtual folder
    Ls {
        #[arg(default_value = "./")]
        vpath: String,
    },
    /// Show the whole virtual tree
    Tree,
    /// Create a virtual folder
    Mkdir {
        name: String,
        #[arg(long, default_value = "./")]
        parent: String,
    },
    /// Delete an empty virtual folder
    Rmdir { vpath: String },
    /// Move items (by id) and folders (by `./` path) into a folder
    Mv {
        #[arg(required = true)]
        sources: Vec<String>,
        #[arg(long)]
        to: String,
    },
    /// Set rating, tags, notes and description of an item
    Details {
        id: String,
        #[arg(long, default_value = "everyone")]
        rating: String,
        #[arg(long = "tag")]
        tags: Vec<String>,
        #[arg(long, default_value = "")]
        notes: String,
        #[arg(long, default_value = "")]
        description: String,
    },
    /// Record the executable of an application item
    AppPath {
        id: String,
        exe: String,
        #[arg(long = "type", default_value = "application")]
        kind: String,
    },
    /// List every tag in use
    Tags,
    /// Search item titles
    Search { query: String },
    /// Repair incomplete metadata from project descriptors
    Health,
    /// Import a folder into the library
    Import {
        source: PathBuf,
        /// Only show what would be imported
        #[arg(long)]
        dry_run: bool,
    },
    /// Delete item folders from disk and from the catalog
    Delete {
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Wipe the catalog and rebuild it from disk
    Clear,
    /// Make another folder the active library
    Switch { path: PathBuf },
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings_path = cli.settings.clone().unwrap_or_else(Settings::default_path);
    let mut settings = Settings::load(&settings_path)
        .with_context(|| format!("loading settings from {}", settings_path.display()))?;

    let log_level = if cli.verbose { "debug".to_string() } else { settings.log_level.clone() };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(&log_level))
        .init();

    if let Command::Init = cli.command {
        settings.save_to_file(&settings_path)?;
        println!("Settings written to {}", settings_path.display());
        return Ok(());
    }

    if let Some(library) = &cli.library {
        settings.library_path = Some(library.clone());
    }
    let service = LibraryService::open(settings, Some(settings_path))
        .await
        .context("opening the library (set library_path in the settings or pass --library)")?;

    match cli.command {
        Command::Init => {}
        Command::Scan => print_json(&service.reconcile().await?)?,
        Command::Ls { vpath } => {
            service.reconcile().await?;
            print_json(&service.list_children(&vpath).await)?;
        }
        Command::Tree => print_json(&service.tree().await)?,
        Command::Mkdir { name, parent } => {
            let vpath = service.create_folder(&name, &parent).await?;
            println!("{vpath}");
        }
        Command::Rmdir { vpath } => service.delete_folder(&vpath).await?,
        Command::Mv { sources, to } => {
            service.reconcile().await?;
            let sources: Vec<MoveSource> = sources.iter().map(|s| MoveSource::parse(s)).collect();
            let moved = service.move_items(&sources, &to).await?;
            info!("Moved {} entries", moved);
        }
        Command::Details {
            id,
            rating,
            tags,
            notes,
            description,
        } => {
            let details = ItemDetails {
                rating: Rating::parse(&rating),
                tags: tags.iter().map(|t| TagInput::from(t.as_str())).collect(),
                notes,
                description,
            };
            service.save_item_details(&id, details).await?;
        }
        Command::AppPath { id, exe, kind } => {
            service.save_app_path(&id, &exe, WallpaperType::parse(&kind)).await?;
        }
        Command::Tags => print_json(&service.all_tags().await)?,
        Command::Search { query } => {
            service.reconcile().await?;
            print_json(&service.search(&query).await)?;
        }
        Command::Health => print_json(&service.check_health().await?)?,
        Command::Import { source, dry_run } => {
            let scan = service.scan_import_folder(&source).await?;
            if dry_run {
                print_json(&scan)?;
            } else {
                let id = service.process_import(&source, ImportMetadata::from(&scan)).await?;
                println!("{id}");
            }
        }
        Command::Delete { ids } => print_json(&service.delete_items(&ids).await?)?,
        Command::Clear => print_json(&service.clear_all().await?)?,
        Command::Switch { path } => print_json(&service.switch_library(&path).await?)?,
    }

    Ok(())
}
