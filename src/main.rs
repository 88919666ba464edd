use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use diacare_admin::config::{self, Config};
use diacare_admin::editor::{EditorError, Notice};
use diacare_admin::engine::{PatientCategory, SortKey, StatusFilter};
use diacare_admin::export;
use diacare_admin::gateway::{ApiClient, Gateway};
use diacare_admin::model::{BotSettings, FollowEventFlow, RiskLevel};
use diacare_admin::progress::SimulatedProgress;
use diacare_admin::render;
use diacare_admin::view::{
    FlowsView, FollowersView, PatientsView, RecommendationsView, SettingsView, ViewMode,
};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

#[derive(Debug, Parser)]
#[command(author, version, about = "Admin shell for the DiaCare Buddy LINE bot")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List patients
    Patients {
        #[arg(long, default_value = "")]
        search: String,
        /// all, high_risk, improving, stable
        #[arg(long, default_value = "all")]
        category: PatientCategory,
        /// date, count, risk, name
        #[arg(long, default_value = "date")]
        sort: SortKey,
        /// cards, table, analytics
        #[arg(long, default_value = "table")]
        view: ViewMode,
    },
    /// Show one patient's statistics and recent readings
    Patient {
        line_user_id: String,
        #[arg(long, default_value_t = 20)]
        readings: u32,
    },
    /// Generate an AI health recommendation for a patient
    Recommend {
        line_user_id: String,
        #[arg(long)]
        average_glucose: Option<f64>,
        #[arg(long)]
        a1c: Option<f64>,
        #[arg(long)]
        in_range: Option<f64>,
        #[arg(long)]
        total_readings: Option<u64>,
        #[arg(long, default_value = "")]
        notes: String,
        /// Comma-separated focus areas (diet, exercise, medication, ...)
        #[arg(long, value_delimiter = ',')]
        focus: Vec<String>,
    },
    /// List generated recommendations
    Recommendations {
        #[arg(long)]
        user: Option<String>,
        #[arg(long, default_value = "")]
        search: String,
        #[arg(long)]
        risk: Option<RiskLevel>,
        /// date, confidence, risk
        #[arg(long, default_value = "date")]
        sort: SortKey,
        /// cards, table, analytics
        #[arg(long, default_value = "table")]
        view: ViewMode,
        /// Write the loaded list as JSON into the export directory
        #[arg(long)]
        export: bool,
    },
    /// Bot and LINE channel settings
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
    /// Show the bot's LINE profile
    Profile,
    /// List registered LIFF apps
    Liff,
    /// Show LINE messaging insights
    Insights,
    /// Manage follow-event onboarding flows
    Flows {
        #[command(subcommand)]
        action: FlowAction,
    },
    /// List LINE followers
    Followers {
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long)]
        limit: Option<u32>,
        #[arg(long, default_value = "")]
        search: String,
        /// all, active, inactive, blocked, unfollowed
        #[arg(long, default_value = "all")]
        status: StatusFilter,
        #[arg(long, default_value = "date")]
        sort: SortKey,
        #[arg(long, default_value = "table")]
        view: ViewMode,
        /// Write the shown followers as CSV into the export directory
        #[arg(long)]
        export: bool,
    },
    /// Read a follower CSV export back and report what it holds
    FollowersImportCheck {
        #[arg(long)]
        file: PathBuf,
    },
}

#[derive(Debug, Subcommand)]
enum SettingsAction {
    Show,
    /// Replace all settings with the contents of a YAML file
    Save {
        #[arg(long)]
        file: PathBuf,
    },
    ConfigureWebhook,
    ConfigureLoginCallback,
}

#[derive(Debug, Subcommand)]
enum FlowAction {
    List,
    Create {
        #[arg(long)]
        file: PathBuf,
    },
    Update {
        #[arg(long)]
        id: String,
        #[arg(long)]
        file: PathBuf,
    },
    Delete {
        #[arg(long)]
        id: String,
    },
    /// Dry-run a flow against a fake follow event
    Test {
        #[arg(long)]
        id: String,
        #[arg(long, default_value = "Utest")]
        user: String,
        #[arg(long, default_value = "Test User")]
        name: String,
    },
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
    cfg.ensure_dirs()?;

    let client = ApiClient::from_config(&cfg)?;
    run(&cfg, &client, args.command).await
}

fn notice_err(notice: Notice) -> anyhow::Error {
    anyhow!(notice.message)
}

fn editor_err(err: EditorError, action: &str) -> anyhow::Error {
    anyhow!(Notice::from_editor(&err, action).message)
}

fn read_yaml<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_yaml::from_str(&content).with_context(|| format!("invalid YAML in {}", path.display()))
}

async fn run(cfg: &Config, gateway: &dyn Gateway, command: Command) -> Result<()> {
    let today = chrono::Local::now().date_naive();
    match command {
        Command::Patients {
            search,
            category,
            sort,
            view,
        } => {
            let mut patients = PatientsView::new(cfg.thresholds);
            patients.load(gateway).await.map_err(notice_err)?;
            patients.search = search;
            patients.category = category;
            patients.sort = sort;
            patients.mode = view;
            print!(
                "{}",
                render::patients(patients.mode, &patients.visible(), &patients.summary())
            );
        }
        Command::Patient {
            line_user_id,
            readings,
        } => {
            let (stats, recent) = futures::try_join!(
                gateway.get_patient_stats(&line_user_id),
                gateway.get_patient_readings(&line_user_id, readings)
            )?;
            print!("{}", render::patient_detail(&stats, &recent));
        }
        Command::Recommend {
            line_user_id,
            average_glucose,
            a1c,
            in_range,
            total_readings,
            notes,
            focus,
        } => {
            let mut patients = PatientsView::new(cfg.thresholds);
            patients.load(gateway).await.map_err(notice_err)?;
            let patient = patients
                .find(&line_user_id)
                .ok_or_else(|| anyhow!("patient {} not found", line_user_id))?;

            let mut recs = RecommendationsView::new(cfg.thresholds);
            recs.open_for(Some(patient));
            if let Some(draft) = recs.editor.draft_mut() {
                if let Some(v) = average_glucose {
                    draft.average_glucose = v;
                }
                if let Some(v) = a1c {
                    draft.a1c_level = v;
                }
                if let Some(v) = in_range {
                    draft.in_range_percentage = v;
                }
                if let Some(v) = total_readings {
                    draft.total_readings = v;
                }
                draft.notes = notes;
                draft.focus_areas = focus;
            }

            let mut progress = SimulatedProgress::from_config(&cfg.app.progress);
            let tick = Duration::from_millis(cfg.app.progress.tick_ms);
            let result = recs
                .generate(gateway, tick, &mut progress, |p| {
                    eprint!("\rGenerating recommendation... {:>3}%", p);
                    let _ = std::io::stderr().flush();
                })
                .await;
            eprintln!();
            let rec = result.map_err(|e| editor_err(e, "generate recommendation"))?;
            print!("{}", render::recommendation(&rec));
        }
        Command::Recommendations {
            user,
            search,
            risk,
            sort,
            view,
            export,
        } => {
            let mut recs = RecommendationsView::new(cfg.thresholds);
            recs.load(gateway, user.as_deref()).await.map_err(notice_err)?;
            recs.search = search;
            recs.risk = risk;
            recs.sort = sort;
            print!(
                "{}",
                render::recommendations(view, &recs.visible(), &recs.summary())
            );
            if export {
                let body = recs.export_json()?;
                let path = export::write_export(
                    Path::new(&cfg.app.export_dir),
                    &export::recommendations_filename(today),
                    &body,
                )?;
                println!(
                    "Exported {} recommendations to {}",
                    recs.all().len(),
                    path.display()
                );
            }
        }
        Command::Settings { action } => settings(gateway, action).await?,
        Command::Profile => print!("{}", render::bot_profile(&gateway.get_bot_profile().await?)),
        Command::Liff => print!("{}", render::liff_apps(&gateway.get_liff_apps().await?)),
        Command::Insights => print!("{}", render::insights(&gateway.get_line_insights().await?)),
        Command::Flows { action } => flows(gateway, action).await?,
        Command::Followers {
            page,
            limit,
            search,
            status,
            sort,
            view,
            export,
        } => {
            let mut followers = FollowersView::new(limit.unwrap_or(cfg.app.page_size));
            followers.page_number = page.max(1);
            followers.search = search;
            followers.status = status;
            followers.sort = sort;
            followers.load(gateway).await.map_err(notice_err)?;
            let visible = followers.visible();
            print!(
                "{}",
                render::followers(view, followers.page(), &visible, &followers.summary())
            );
            if export {
                let body = followers.export_csv(&export::follower_columns())?;
                let path = export::write_export(
                    Path::new(&cfg.app.export_dir),
                    &export::followers_filename(today),
                    &body,
                )?;
                println!("Exported {} followers to {}", visible.len(), path.display());
            }
        }
        Command::FollowersImportCheck { file } => {
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let table = export::parse_csv_export(&text)?;
            let ids = table
                .column("LINE User ID")
                .ok_or_else(|| anyhow!("{} has no LINE User ID column", file.display()))?;
            let blank = ids.iter().filter(|id| id.is_empty()).count();
            println!(
                "{}: {} rows, {} columns, {} without a LINE user id",
                file.display(),
                table.rows.len(),
                table.headers.len(),
                blank
            );
        }
    }
    Ok(())
}

async fn settings(gateway: &dyn Gateway, action: SettingsAction) -> Result<()> {
    match action {
        SettingsAction::Show => {
            let mut view = SettingsView::new();
            view.load(gateway).await.map_err(notice_err)?;
            if let Some(s) = view.settings() {
                print!("{}", render::settings(s));
            }
        }
        SettingsAction::Save { file } => {
            let replacement: BotSettings = read_yaml(&file)?;
            let mut view = SettingsView::new();
            view.load(gateway).await.map_err(notice_err)?;
            if !view.edit() {
                bail!("bot settings are not loaded");
            }
            if let Some(draft) = view.editor.draft_mut() {
                *draft = replacement;
            }
            let saved = view
                .save(gateway)
                .await
                .map_err(|e| editor_err(e, "save bot settings"))?;
            info!("bot settings saved");
            print!("{}", render::settings(&saved));
        }
        SettingsAction::ConfigureWebhook => {
            let outcome = gateway.configure_webhook().await?;
            if outcome.message.is_empty() {
                println!("Webhook configured");
            } else {
                println!("{}", outcome.message);
            }
        }
        SettingsAction::ConfigureLoginCallback => {
            let outcome = gateway.configure_login_callback().await?;
            if outcome.message.is_empty() {
                println!("Login callback configured");
            } else {
                println!("{}", outcome.message);
            }
        }
    }
    Ok(())
}

async fn flows(gateway: &dyn Gateway, action: FlowAction) -> Result<()> {
    let mut view = FlowsView::new();
    match action {
        FlowAction::List => {
            view.load(gateway).await.map_err(notice_err)?;
            print!("{}", render::flows(view.all()));
        }
        FlowAction::Create { file } => {
            let mut draft: FollowEventFlow = read_yaml(&file)?;
            draft.id.clear();
            view.open_new(draft);
            let saved = view
                .save(gateway)
                .await
                .map_err(|e| editor_err(e, "save follow flow"))?;
            println!("Created follow flow {} ({})", saved.name, saved.id);
        }
        FlowAction::Update { id, file } => {
            view.load(gateway).await.map_err(notice_err)?;
            let mut replacement: FollowEventFlow = read_yaml(&file)?;
            if !view.open_existing(&id) {
                bail!("follow flow {} not found", id);
            }
            replacement.id = id;
            if let Some(draft) = view.editor.draft_mut() {
                *draft = replacement;
            }
            let saved = view
                .save(gateway)
                .await
                .map_err(|e| editor_err(e, "save follow flow"))?;
            println!("Updated follow flow {} ({})", saved.name, saved.id);
        }
        FlowAction::Delete { id } => {
            view.delete(gateway, &id)
                .await
                .map_err(|e| anyhow!(Notice::from_gateway(&e, "delete follow flow").message))?;
            println!("Deleted follow flow {}", id);
        }
        FlowAction::Test { id, user, name } => {
            let result = gateway.handle_follow_event(&id, &user, &name).await?;
            print!("{}", render::dry_run(&result));
        }
    }
    Ok(())
}
