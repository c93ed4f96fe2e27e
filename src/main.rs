use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use media_archive::archive::{
    ensure_directory, ArchiveManager, ArchiveWatchdog, Repositories, ScanMode, StandaloneKind,
    Upload,
};
use media_archive::archive_store::{
    CollectionFields, ImageFields, SheetFields, SqliteArchiveStore, TrackFields, VideoFields,
};
use media_archive::config::{AppConfig, CliConfig, FileConfig};

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    if path_buf.is_absolute() {
        return Ok(path_buf);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(path_buf))
}

#[derive(Parser, Debug)]
#[command(name = "archive-cli", about = "Manage media archive records and their files")]
struct CliArgs {
    /// Root directory holding images/, music/, videos/ and sheets/.
    #[clap(long, value_parser = parse_path)]
    pub archive_root: Option<PathBuf>,

    /// Path to the SQLite archive database. Defaults to archive.db in the archive root.
    #[clap(long, value_parser = parse_path)]
    pub db_path: Option<PathBuf>,

    /// Path to a TOML config file. Its values override the flags above.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct UploadArgs {
    /// File to store as the record's artifact.
    #[clap(long, value_parser = parse_path)]
    file: Option<PathBuf>,

    /// Declared content type. Defaults to application/<file extension>.
    #[clap(long)]
    content_type: Option<String>,
}

#[derive(Args, Debug)]
struct CollectionArgs {
    #[clap(long = "type", default_value = "")]
    kind: String,
    #[clap(long, default_value = "")]
    name: String,
    #[clap(long, default_value = "")]
    artist: String,
    #[clap(long, default_value = "")]
    guests: String,
    #[clap(long, default_value = "")]
    year: String,
    #[clap(long, default_value = "")]
    label: String,
    #[clap(long, default_value = "")]
    record_number: String,
}

impl From<CollectionArgs> for CollectionFields {
    fn from(args: CollectionArgs) -> Self {
        CollectionFields {
            kind: args.kind,
            name: args.name,
            artist: args.artist,
            guests: args.guests,
            year: args.year,
            label: args.label,
            record_number: args.record_number,
        }
    }
}

#[derive(Args, Debug)]
struct TrackArgs {
    #[clap(long, default_value = "")]
    title: String,
    #[clap(long, default_value = "")]
    composer: String,
    #[clap(long, default_value = "")]
    lyrics: String,
}

impl From<TrackArgs> for TrackFields {
    fn from(args: TrackArgs) -> Self {
        TrackFields {
            title: args.title,
            composer: args.composer,
            lyrics: args.lyrics,
        }
    }
}

#[derive(Args, Debug)]
struct VideoArgs {
    #[clap(long, default_value = "")]
    title: String,
    #[clap(long, default_value = "")]
    year: String,
    #[clap(long, default_value = "")]
    people: String,
}

impl From<VideoArgs> for VideoFields {
    fn from(args: VideoArgs) -> Self {
        VideoFields {
            title: args.title,
            year: args.year,
            people: args.people,
        }
    }
}

#[derive(Args, Debug)]
struct ImageArgs {
    #[clap(long, default_value = "")]
    title: String,
    #[clap(long, default_value = "")]
    year: String,
    #[clap(long, default_value = "")]
    people: String,
    #[clap(long, default_value = "")]
    location: String,
}

impl From<ImageArgs> for ImageFields {
    fn from(args: ImageArgs) -> Self {
        ImageFields {
            title: args.title,
            year: args.year,
            people: args.people,
            location: args.location,
        }
    }
}

#[derive(Args, Debug)]
struct SheetArgs {
    #[clap(long, default_value = "")]
    title: String,
    #[clap(long, default_value = "")]
    year: String,
}

impl From<SheetArgs> for SheetFields {
    fn from(args: SheetArgs) -> Self {
        SheetFields {
            title: args.title,
            year: args.year,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ListKind {
    Collections,
    Videos,
    Images,
    Sheets,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a collection, optionally with cover art.
    AddCollection {
        #[command(flatten)]
        fields: CollectionArgs,
        #[command(flatten)]
        upload: UploadArgs,
    },
    UpdateCollection {
        id: String,
        #[command(flatten)]
        fields: CollectionArgs,
    },
    /// Delete a collection with its tracks, audio, bundle and cover art.
    DeleteCollection { id: String },
    AddTrack {
        collection_id: String,
        #[command(flatten)]
        fields: TrackArgs,
        #[command(flatten)]
        upload: UploadArgs,
    },
    UpdateTrack {
        collection_id: String,
        track_id: String,
        #[command(flatten)]
        fields: TrackArgs,
        #[command(flatten)]
        upload: UploadArgs,
    },
    DeleteTrack {
        collection_id: String,
        track_id: String,
    },
    /// Store a zip bundle for a collection and mark it downloadable.
    AttachBundle {
        collection_id: String,
        #[clap(long, value_parser = parse_path)]
        file: PathBuf,
        #[clap(long)]
        content_type: Option<String>,
    },
    DetachBundle { collection_id: String },
    AddVideo {
        #[command(flatten)]
        fields: VideoArgs,
        #[command(flatten)]
        upload: UploadArgs,
    },
    AddImage {
        #[command(flatten)]
        fields: ImageArgs,
        #[command(flatten)]
        upload: UploadArgs,
    },
    AddSheet {
        #[command(flatten)]
        fields: SheetArgs,
        #[command(flatten)]
        upload: UploadArgs,
    },
    UpdateVideo {
        id: String,
        #[command(flatten)]
        fields: VideoArgs,
    },
    UpdateImage {
        id: String,
        #[command(flatten)]
        fields: ImageArgs,
    },
    UpdateSheet {
        id: String,
        #[command(flatten)]
        fields: SheetArgs,
    },
    DeleteVideo { id: String },
    DeleteImage { id: String },
    DeleteSheet { id: String },
    /// Overwrite the artifact of an existing record.
    ReplaceArtifact {
        id: String,
        #[clap(long, value_parser = parse_path)]
        file: PathBuf,
        #[clap(long)]
        content_type: Option<String>,
    },
    List {
        #[clap(value_enum, default_value = "collections")]
        kind: ListKind,
    },
    /// Check bundle flags and look for orphan files.
    Scan {
        /// Fix flags and delete orphans instead of only reporting them.
        #[clap(long)]
        repair: bool,
    },
}

fn default_content_type(path: &Path) -> Result<String> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .with_context(|| format!("Cannot infer a content type for {:?}, use --content-type", path))?;
    Ok(format!("application/{}", extension.to_lowercase()))
}

async fn open_upload(file: &Path, content_type: Option<String>) -> Result<Upload> {
    let content_type = match content_type {
        Some(content_type) => content_type,
        None => default_content_type(file)?,
    };
    Upload::from_path(content_type, file)
        .await
        .with_context(|| format!("Failed to open {:?}", file))
}

async fn open_optional_upload(args: UploadArgs) -> Result<Option<Upload>> {
    match args.file {
        Some(file) => Ok(Some(open_upload(&file, args.content_type).await?)),
        None => Ok(None),
    }
}

async fn run_command(manager: &ArchiveManager, command: Command) -> Result<Value> {
    let output = match command {
        Command::AddCollection { fields, upload } => {
            let upload = open_optional_upload(upload).await?;
            serde_json::to_value(manager.create_collection(fields.into(), upload).await?)?
        }
        Command::UpdateCollection { id, fields } => {
            serde_json::to_value(manager.update_collection(&id, fields.into()).await?)?
        }
        Command::DeleteCollection { id } => {
            manager.delete_collection(&id).await?;
            json!({ "deleted": id })
        }
        Command::AddTrack {
            collection_id,
            fields,
            upload,
        } => {
            let upload = open_optional_upload(upload).await?;
            serde_json::to_value(
                manager
                    .append_track(&collection_id, fields.into(), upload)
                    .await?,
            )?
        }
        Command::UpdateTrack {
            collection_id,
            track_id,
            fields,
            upload,
        } => {
            let upload = open_optional_upload(upload).await?;
            serde_json::to_value(
                manager
                    .update_track(&collection_id, &track_id, fields.into(), upload)
                    .await?,
            )?
        }
        Command::DeleteTrack {
            collection_id,
            track_id,
        } => {
            manager.delete_track(&collection_id, &track_id).await?;
            json!({ "deleted": track_id })
        }
        Command::AttachBundle {
            collection_id,
            file,
            content_type,
        } => {
            let upload = open_upload(&file, content_type).await?;
            serde_json::to_value(manager.attach_bundle(&collection_id, upload).await?)?
        }
        Command::DetachBundle { collection_id } => {
            serde_json::to_value(manager.detach_bundle(&collection_id).await?)?
        }
        Command::AddVideo { fields, upload } => {
            let upload = open_optional_upload(upload).await?;
            serde_json::to_value(manager.create_video(fields.into(), upload).await?)?
        }
        Command::AddImage { fields, upload } => {
            let upload = open_optional_upload(upload).await?;
            serde_json::to_value(manager.create_image(fields.into(), upload).await?)?
        }
        Command::AddSheet { fields, upload } => {
            let upload = open_optional_upload(upload).await?;
            serde_json::to_value(manager.create_sheet(fields.into(), upload).await?)?
        }
        Command::UpdateVideo { id, fields } => {
            serde_json::to_value(manager.update_video(&id, fields.into()).await?)?
        }
        Command::UpdateImage { id, fields } => {
            serde_json::to_value(manager.update_image(&id, fields.into()).await?)?
        }
        Command::UpdateSheet { id, fields } => {
            serde_json::to_value(manager.update_sheet(&id, fields.into()).await?)?
        }
        Command::DeleteVideo { id } => {
            manager.delete_standalone(StandaloneKind::Video, &id).await?;
            json!({ "deleted": id })
        }
        Command::DeleteImage { id } => {
            manager.delete_standalone(StandaloneKind::Image, &id).await?;
            json!({ "deleted": id })
        }
        Command::DeleteSheet { id } => {
            manager.delete_standalone(StandaloneKind::Sheet, &id).await?;
            json!({ "deleted": id })
        }
        Command::ReplaceArtifact {
            id,
            file,
            content_type,
        } => {
            let upload = open_upload(&file, content_type).await?;
            let path = manager.replace_artifact(&id, upload).await?;
            json!({ "id": id, "path": path })
        }
        Command::List { kind } => match kind {
            ListKind::Collections => serde_json::to_value(manager.list_collections().await?)?,
            ListKind::Videos => serde_json::to_value(manager.list_videos().await?)?,
            ListKind::Images => serde_json::to_value(manager.list_images().await?)?,
            ListKind::Sheets => serde_json::to_value(manager.list_sheets().await?)?,
        },
        Command::Scan { repair } => {
            let mode = if repair {
                ScanMode::Repair
            } else {
                ScanMode::DryRun
            };
            let watchdog = ArchiveWatchdog::new(
                manager.config().clone(),
                manager.repositories().clone(),
            );
            let report = tokio::task::spawn_blocking(move || watchdog.run_scan(mode)).await??;
            serde_json::to_value(report)?
        }
    };
    Ok(output)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    // Logs go to stderr; stdout carries the JSON result.
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()?;

    let file_config = match &cli_args.config {
        Some(path) => Some(FileConfig::load(path)?),
        None => None,
    };
    let cli_config = CliConfig {
        archive_root: cli_args.archive_root.clone(),
        db_path: cli_args.db_path.clone(),
    };
    let app_config = AppConfig::resolve(&cli_config, file_config)?;

    ensure_directory(&app_config.archive.root).await?;
    info!(
        "Opening SQLite archive database at {:?}...",
        app_config.db_path
    );
    let store = SqliteArchiveStore::new(&app_config.db_path)?;
    let manager = ArchiveManager::new(app_config.archive.clone(), Repositories::sqlite(&store));

    let output = run_command(&manager, cli_args.command).await?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
