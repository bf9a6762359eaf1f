use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;

use photocard_rust::render::{run_batch, CardRenderer, RenderMode, RenderOptions};
use photocard_rust::{feed, fetch, fonts, logging, scorer, settings, sheet, social};

#[derive(Parser, Debug)]
#[command(
    name = "photocard-rust",
    version,
    about = "Render news photocards from a JSON feed"
)]
struct Cli {
    /// Read extra settings from a local TOML file
    #[arg(short = 'r', long = "settings", global = true)]
    settings: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(long = "verbose", global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render cards for every article in the feed
    Render(RenderArgs),
    /// Post a rendered card to a Facebook page
    Post(PostArgs),
    /// Score feed articles for virality with an LLM
    Score(ScoreArgs),
}

#[derive(clap::Args, Debug)]
struct RenderArgs {
    /// Template image with a black placeholder rectangle
    #[arg(short = 't', long = "template")]
    template: PathBuf,

    /// JSON feed (array, {"articles": [...]}, or a single object)
    #[arg(short = 'f', long = "feed")]
    feed: PathBuf,

    /// Output directory
    #[arg(short = 'o', long = "out", default_value = "photocards")]
    out: PathBuf,

    /// TTF/OTF font used for text measurement and rendering
    #[arg(long = "font")]
    font: Option<PathBuf>,

    /// Only render the first N articles (0 = all)
    #[arg(short = 'n', long = "limit", default_value_t = 0)]
    limit: usize,

    /// Draw text onto pre-rendered base images from this directory
    #[arg(long = "base-dir")]
    base_dir: Option<PathBuf>,

    /// Skip the text layer entirely
    #[arg(long = "no-text")]
    no_text: bool,

    /// Cache downloaded article images in this directory
    #[arg(long = "image-cache")]
    image_cache: Option<PathBuf>,

    /// Concurrent render jobs
    #[arg(short = 'j', long = "jobs", default_value_t = 1)]
    jobs: usize,

    /// Also bundle the rendered cards into a proof-sheet PDF
    #[arg(long = "pdf")]
    pdf: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
struct PostArgs {
    /// Rendered card to upload
    #[arg(short = 'c', long = "card")]
    card: PathBuf,

    /// Post caption
    #[arg(long = "caption", default_value = "")]
    caption: String,

    /// Page id (falls back to FACEBOOK_PAGE_ID)
    #[arg(long = "page-id")]
    page_id: Option<String>,

    /// Page access token (falls back to FACEBOOK_PAGE_TOKEN)
    #[arg(long = "token")]
    token: Option<String>,
}

#[derive(clap::Args, Debug)]
struct ScoreArgs {
    /// JSON feed to score
    #[arg(short = 'f', long = "feed")]
    feed: PathBuf,

    /// Model name or provider:model (e.g. openai:MODEL_ID)
    #[arg(short = 'm', long = "model")]
    model: Option<String>,

    /// API key (overrides environment variables)
    #[arg(short = 'k', long = "key")]
    key: Option<String>,

    /// Write the JSON report here instead of stdout
    #[arg(short = 'o', long = "out")]
    out: Option<PathBuf>,

    /// Only score the first N articles (0 = all)
    #[arg(short = 'n', long = "limit", default_value_t = 0)]
    limit: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose)?;
    let settings = settings::load_settings(cli.settings.as_deref())?;

    match cli.command {
        Command::Render(args) => run_render(args, settings).await,
        Command::Post(args) => run_post(args, settings).await,
        Command::Score(args) => run_score(args, settings).await,
    }
}

async fn run_render(args: RenderArgs, settings: settings::Settings) -> Result<()> {
    let articles = feed::read_feed(&args.feed)?;
    let template = photocard_rust::Template::load(&args.template, &settings.template)?;

    let font_path = args
        .font
        .clone()
        .or_else(|| settings.fonts.font_path.as_ref().map(PathBuf::from));
    let font = fonts::resolve_card_font(font_path.as_deref(), &settings.fonts.fallback_families);

    let mode = match args.base_dir {
        Some(base_dir) => RenderMode::TextOverlayOnly { base_dir },
        None => RenderMode::FullComposite,
    };
    let options = RenderOptions {
        mode,
        out_dir: args.out,
        limit: args.limit,
        jobs: args.jobs,
        with_text: !args.no_text,
    };

    let renderer = CardRenderer::new(template, settings, font);
    let fetcher = fetch::ImageFetcher::new(args.image_cache);
    let summary = run_batch(&renderer, &fetcher, &articles, &options).await?;
    info!(
        "done: {} rendered, {} skipped, {} failed",
        summary.rendered, summary.skipped, summary.failed
    );

    if let Some(pdf) = args.pdf {
        sheet::cards_to_pdf(&summary.outputs, &pdf)?;
    }
    Ok(())
}

async fn run_post(args: PostArgs, settings: settings::Settings) -> Result<()> {
    let credentials =
        social::resolve_credentials(args.page_id.as_deref(), args.token.as_deref())?;
    let id = social::post_photo(&settings.social, &credentials, &args.card, &args.caption).await?;
    println!("{}", id);
    Ok(())
}

async fn run_score(args: ScoreArgs, settings: settings::Settings) -> Result<()> {
    let articles = feed::read_feed(&args.feed)?;
    let options = scorer::ScoreOptions {
        model: args.model,
        key: args.key,
        limit: args.limit,
    };
    let report = scorer::score_articles(&settings.scorer, &articles, &options).await?;
    scorer::write_report(&report, args.out.as_deref())
}
