use anyhow::{anyhow, Context, Result};
use clap::Parser;
use diacare_admin::config::{self, Config};
use diacare_admin::engine::StatusFilter;
use diacare_admin::export;
use diacare_admin::gateway::ApiClient;
use diacare_admin::model::LineFollower;
use diacare_admin::view::FollowersView;
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Parser)]
#[command(about = "Export LINE followers to a dated CSV file in the export directory.")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    #[arg(long, default_value_t = 1)]
    page: u32,

    /// Page size; defaults to app.page_size
    #[arg(long)]
    limit: Option<u32>,

    #[arg(long, default_value = "")]
    search: String,

    #[arg(long, default_value = "all")]
    status: StatusFilter,

    /// Walk every page from --page onwards instead of exporting one page
    #[arg(long)]
    all_pages: bool,

    /// Write here instead of app.export_dir
    #[arg(long)]
    out_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(args.config.as_path()))
        .with_context(|| format!("failed to load {}", args.config.display()))?;
    run(&cfg, &args).await
}

async fn run(cfg: &Config, args: &Args) -> Result<()> {
    let client = ApiClient::from_config(cfg)?;

    let mut view = FollowersView::new(args.limit.unwrap_or(cfg.app.page_size));
    view.page_number = args.page.max(1);
    view.search = args.search.clone();
    view.status = args.status;

    let mut collected: Vec<LineFollower> = Vec::new();
    loop {
        view.load(&client)
            .await
            .map_err(|notice| anyhow!(notice.message))?;
        collected.extend(view.visible());
        let total_pages = view.total_pages();
        info!(
            page = view.page_number,
            total_pages,
            rows = collected.len(),
            "followers page fetched"
        );
        if !args.all_pages || u64::from(view.page_number) >= total_pages {
            break;
        }
        view.page_number += 1;
    }

    let body = export::export_csv(&collected, &export::follower_columns())?;
    let dir = match &args.out_dir {
        Some(dir) => dir.clone(),
        None => PathBuf::from(&cfg.app.export_dir),
    };
    let filename = export::followers_filename(chrono::Local::now().date_naive());
    let path = export::write_export(&dir, &filename, &body)
        .with_context(|| format!("failed to write export into {}", dir.display()))?;
    println!("Exported {} followers to {}", collected.len(), path.display());
    Ok(())
}
