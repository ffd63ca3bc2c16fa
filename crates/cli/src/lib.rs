use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use doc_model::{Document, DocumentDescriptor, RenderMode, VirtualPageNumber};
use pageview_render::{DrawingSurface, RasterSurfaceFactory, Size};
use serde::Serialize;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;
use viewer_core::{
    scale_rate_for, ContentLayout, DrawOutcome, PageIndex, SyntheticProvider, ViewerConfig,
    ViewportController, ViewportState,
};

#[derive(Debug, Parser)]
#[command(name = "pageview-cli")]
#[command(about = "Virtual-page viewport renderer CLI")]
pub struct Cli {
    /// Viewer settings as JSON. Environment variables override it.
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Log progress to stderr.
    #[arg(long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print the page layout of a document as JSON.
    Layout {
        #[arg(value_name = "DOC")]
        file: PathBuf,
        #[arg(long, default_value_t = 1280.0)]
        width: f64,
        #[arg(long, default_value_t = 800.0)]
        height: f64,
    },
    /// Render the viewport at a scroll offset to a PNG.
    Render {
        #[arg(value_name = "DOC")]
        file: PathBuf,
        #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
        scroll: f64,
        /// Jump to a real page (1-based) instead of scrolling.
        #[arg(long, conflicts_with = "scroll")]
        page: Option<usize>,
        #[arg(long, default_value_t = 1280.0)]
        width: f64,
        #[arg(long, default_value_t = 800.0)]
        height: f64,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Print CLI version.
    Version,
}

#[derive(Debug, Serialize)]
struct LayoutOutput {
    id: u64,
    render_mode: RenderMode,
    real_page_count: usize,
    virtual_page_count: usize,
    total_height: f64,
    max_page_width: f64,
    scale_rate: f64,
    content_size: Size,
    pages: Vec<PageOutput>,
}

#[derive(Debug, Serialize)]
struct PageOutput {
    index: usize,
    offset_y: f64,
    scaled_offset_y: f64,
    width: f64,
    height: f64,
    virtual_pages: Vec<VirtualPageNumber>,
}

#[derive(Debug, Serialize)]
struct RenderOutput {
    output: String,
    surface_width: u32,
    surface_height: u32,
    #[serde(flatten)]
    outcome: DrawOutcome,
}

pub fn run<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);
    init_logging(cli.verbose);

    match cli.command {
        Commands::Layout { file, width, height } => {
            let config = load_config(cli.config.as_deref())?;
            run_layout(&file, width, height, &config)
        }
        Commands::Render { file, scroll, page, width, height, output } => {
            let config = load_config(cli.config.as_deref())?;
            run_render(&file, scroll, page, width, height, output.as_deref(), config)
        }
        Commands::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

// Logging setup stays in the binary so the libraries only emit events.
fn init_logging(verbose: bool) {
    let level = if verbose { "info" } else { "warn" };
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_millis()
        .try_init();
}

fn load_config(path: Option<&Path>) -> Result<ViewerConfig> {
    ViewerConfig::load(path).context("failed to load viewer config")
}

fn run_layout(file: &Path, width: f64, height: f64, config: &ViewerConfig) -> Result<()> {
    let document = load_document(file, config)?;
    let index = PageIndex::new(&document);
    let scale_rate = scale_rate_for(&document, width, height);
    let state = ViewportState {
        container_width: width,
        container_height: height,
        scale_rate,
        ..ViewportState::default()
    };
    let layout = ContentLayout::new(&document, &index, &state, &config.freeform);

    let pages = document
        .real_pages()
        .iter()
        .enumerate()
        .map(|(page_index, page)| PageOutput {
            index: page_index,
            offset_y: index.cumulative_height_before_real_page(page_index),
            scaled_offset_y: layout.offset_before(page_index),
            width: page.width,
            height: page.height,
            virtual_pages: page.virtual_pages.iter().map(|slice| slice.number).collect(),
        })
        .collect();

    let payload = LayoutOutput {
        id: document.id().0,
        render_mode: document.render_mode(),
        real_page_count: index.real_page_count(),
        virtual_page_count: index.virtual_page_count(),
        total_height: index.total_height(),
        max_page_width: index.max_page_width(),
        scale_rate,
        content_size: layout.size(),
        pages,
    };

    let json = serde_json::to_string_pretty(&payload)?;
    println!("{json}");

    Ok(())
}

fn run_render(
    file: &Path,
    scroll: f64,
    page: Option<usize>,
    width: f64,
    height: f64,
    output: Option<&Path>,
    config: ViewerConfig,
) -> Result<()> {
    if page == Some(0) {
        anyhow::bail!("--page is 1-based and must be >= 1");
    }

    let document = load_document(file, &config)?;
    info!(document = %document.id(), pages = document.real_page_count(), "rendering viewport");

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .context("failed to start async runtime")?;

    let provider = SyntheticProvider::new(document.clone());
    let mut controller =
        ViewportController::new(document, provider, RasterSurfaceFactory::default(), config);

    let outcome = runtime
        .block_on(async {
            match page {
                Some(page) => {
                    controller.set_container_size(width, height);
                    controller.jump_to_real_page(page - 1).await
                }
                None => controller.on_scroll_or_resize(scroll, width, height).await,
            }
        })
        .context("failed to render viewport")?;

    let surface = controller.surface().context("renderer produced no surface")?;
    let output =
        output.map(ToOwned::to_owned).unwrap_or_else(|| default_render_output(file));

    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent)?;
    }

    surface
        .image()
        .save(&output)
        .with_context(|| format!("failed to write image to {}", output.display()))?;

    let payload = RenderOutput {
        output: output.display().to_string(),
        surface_width: surface.width(),
        surface_height: surface.height(),
        outcome,
    };

    let json = serde_json::to_string_pretty(&payload)?;
    println!("{json}");

    Ok(())
}

fn load_document(file: &Path, config: &ViewerConfig) -> Result<Document> {
    ensure_file_exists(file)?;

    let raw = fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let descriptor: DocumentDescriptor =
        serde_json::from_str(&raw).context("failed to parse document description")?;

    descriptor.into_document(config.virtual_page_height).context("invalid document")
}

fn ensure_file_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        anyhow::bail!("file does not exist: {}", path.display());
    }

    if !path.is_file() {
        anyhow::bail!("path is not a file: {}", path.display());
    }

    Ok(())
}

fn default_render_output(file: &Path) -> PathBuf {
    let stem = file.file_stem().and_then(|name| name.to_str()).unwrap_or("document");

    file.with_file_name(format!("{stem}-viewport.png"))
}
