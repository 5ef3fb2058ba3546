use clap::{Parser, Subcommand};
use darkroom::config::{self, PipelineConfig};
use darkroom::export::{ExportOptions, ExportRequest, Exporter, MetadataTool, SizePresets};
use darkroom::imaging::{ImageBackend, RustBackend, is_supported_image};
use darkroom::metadata::MetadataExtractor;
use darkroom::output;
use darkroom::render::{LocalRenderer, RemoteRenderer, Renderer, serve_renders};
use darkroom::store::{JsonWorkStore, PhotoWorkSource};
use darkroom::thumbnail::ThumbnailService;
use darkroom::types::{Photo, PhotoId};
use log::LevelFilter;
use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Parser)]
#[command(name = "darkroom")]
#[command(about = "Photo metadata, export and thumbnail pipeline")]
#[command(long_about = "\
Photo metadata, export and thumbnail pipeline

Pending edits (rotation, crop) are read from a darkroom.json sidecar next to
each photo:

  photos/
  ├── darkroom.json        # {\"version\": 1, \"photos\": {\"IMG_1.JPG\": {\"rotationTurns\": 1}}}
  ├── IMG_1.JPG
  └── IMG_2.JPG

Export sizes:
  S, M, L      pixel budgets from [export] (6000, 200000, 1000000 by default)
  original     edited size, no resize
  custom       --side width|height --pixels N

Run 'darkroom gen-config' to generate a documented darkroom.toml.")]
#[command(version)]
struct Cli {
    /// Config file (default: ./darkroom.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print a metadata summary for each photo
    Meta {
        files: Vec<PathBuf>,
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Dump every readable metadata segment of a photo
    Exif {
        file: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Render photos with their edits into a folder
    Export(ExportArgs),
    /// Create missing thumbnails
    Thumbnail { files: Vec<PathBuf> },
    /// Print a stock darkroom.toml with all options documented
    GenConfig,
}

#[derive(clap::Args)]
struct ExportArgs {
    files: Vec<PathBuf>,
    /// Destination folder
    #[arg(long)]
    to: PathBuf,
    /// S, M, L, original or custom
    #[arg(long, default_value = "original")]
    size: String,
    /// Constrained side for --size custom: width or height
    #[arg(long)]
    side: Option<String>,
    /// Length of the constrained side for --size custom
    #[arg(long)]
    pixels: Option<u32>,
    /// jpg, webp or png
    #[arg(long, default_value = "jpg")]
    format: String,
    /// Encoding quality from 0.0 to 1.0
    #[arg(long, default_value_t = 0.9)]
    quality: f32,
    /// like-original or sequence
    #[arg(long, default_value = "like-original")]
    naming: String,
    /// File name prefix for sequence naming
    #[arg(long)]
    prefix: Option<String>,
    /// Copy the master's metadata onto each export
    #[arg(long)]
    with_metadata: bool,
    /// Replace existing files instead of adding a _NNN suffix
    #[arg(long)]
    overwrite: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Meta { files, json } => {
            let extractor = MetadataExtractor::new();
            for file in &files {
                let meta = extractor.extract_summary(file);
                if json {
                    println!("{}", serde_json::to_string_pretty(&meta)?);
                } else {
                    output::print_metadata(file, &meta);
                }
            }
        }
        Command::Exif { file, json } => match MetadataExtractor::new().extract_raw_segments(&file) {
            Some(data) if json => println!("{}", serde_json::to_string_pretty(&data)?),
            Some(data) => output::print_exif(&data),
            None => println!("No metadata in {}", file.display()),
        },
        Command::Export(args) => {
            let config = load_config(cli.config.as_deref())?;
            export(&config, args).await?;
        }
        Command::Thumbnail { files } => {
            let config = load_config(cli.config.as_deref())?;
            thumbnails(&config, &files).await?;
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// `info` by default, raised by `-v`, overridable through `RUST_LOG`.
fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig, config::ConfigError> {
    match path {
        Some(p) => config::load_config_file(p),
        None => config::load_config(Path::new(".")),
    }
}

/// Local renderer, or a render task behind a channel when delegation is on.
fn build_renderer(config: &PipelineConfig) -> Arc<dyn Renderer> {
    let local: Arc<dyn Renderer> = Arc::new(LocalRenderer::new(RustBackend::new()));
    if config.render.delegate {
        let (remote, rx) = RemoteRenderer::channel(1);
        tokio::spawn(serve_renders(rx, local));
        Arc::new(remote)
    } else {
        local
    }
}

fn epoch_millis(time: SystemTime) -> i64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Stable id for a file: FNV-1a over its canonical path.
fn photo_id_for(path: &Path) -> PhotoId {
    let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    canonical
        .to_string_lossy()
        .bytes()
        .fold(0xcbf2_9ce4_8422_2325, |hash, byte| {
            (hash ^ u64::from(byte)).wrapping_mul(0x0100_0000_01b3)
        })
}

/// Build a photo record for a file on disk, with edited size from its sidecar.
async fn load_photo(path: &Path, works: &JsonWorkStore) -> Result<Photo, Box<dyn Error>> {
    if !is_supported_image(path) {
        return Err(format!("unsupported image type: {}", path.display()).into());
    }
    let id = photo_id_for(path);
    let dims = RustBackend::new().identify(path)?;
    let meta = std::fs::metadata(path)?;
    let modified = epoch_millis(meta.modified()?);
    let created = meta.created().map(epoch_millis).unwrap_or(modified);

    let master_dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let master_filename = path
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .ok_or_else(|| format!("not a file: {}", path.display()))?;

    let photo = Photo {
        id,
        master_dir,
        master_filename,
        master_width: dims.width,
        master_height: dims.height,
        master_is_raw: false,
        edited_width: None,
        edited_height: None,
        created_at: created,
        updated_at: modified,
        imported_at: epoch_millis(SystemTime::now()),
        flagged: false,
        trashed: false,
    };
    let work = works.photo_work(&photo).await?;
    Ok(photo.with_work(&work))
}

async fn export(config: &PipelineConfig, args: ExportArgs) -> Result<(), Box<dyn Error>> {
    let options = ExportOptions::try_from(ExportRequest {
        format: args.format,
        quality: args.quality,
        size: args.size,
        custom_size_side: args.side,
        custom_size_pixels: args.pixels,
        with_metadata: args.with_metadata,
        file_name_style: args.naming,
        file_name_prefix: args.prefix,
        folder_path: args.to,
    })?;

    let works = Arc::new(JsonWorkStore::new());
    let exporter = Exporter::new(
        build_renderer(config),
        works.clone(),
        SizePresets::from(&config.export),
        MetadataTool::from(&config.metadata),
    );

    let mut failed = 0;
    for (index, file) in args.files.iter().enumerate() {
        let result = match load_photo(file, &works).await {
            Ok(photo) => exporter
                .export_photo(&photo, index, &options, args.overwrite)
                .await
                .map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };
        if result.is_err() {
            failed += 1;
        }
        println!("{}", output::format_result(index + 1, file, &result));
    }

    println!(
        "{}",
        output::format_summary("Exported", args.files.len() - failed, failed)
    );
    if failed > 0 {
        return Err(format!("{} of {} exports failed", failed, args.files.len()).into());
    }
    Ok(())
}

async fn thumbnails(config: &PipelineConfig, files: &[PathBuf]) -> Result<(), Box<dyn Error>> {
    let works = Arc::new(JsonWorkStore::new());
    let service = ThumbnailService::new(build_renderer(config), works.clone(), &config.thumbnails);

    let mut failed = 0;
    for (index, file) in files.iter().enumerate() {
        let result = match load_photo(file, &works).await {
            Ok(photo) => service
                .ensure_thumbnail(&photo)
                .await
                .map_err(|e| match e.failure() {
                    Some(inner) => inner.to_string(),
                    None => e.to_string(),
                }),
            Err(e) => Err(e.to_string()),
        };
        if result.is_err() {
            failed += 1;
        }
        println!("{}", output::format_result(index + 1, file, &result));
    }

    println!(
        "{}",
        output::format_summary("Thumbnailed", files.len() - failed, failed)
    );
    if failed > 0 {
        return Err(format!("{} of {} thumbnails failed", failed, files.len()).into());
    }
    Ok(())
}
