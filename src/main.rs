use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use placement_eligibility::config::{self, Settings};
use placement_eligibility::db::{self, PgStore};
use placement_eligibility::report::{self, Format};
use placement_eligibility::{Criteria, DataStore, Engine, MemoryStore, PipelineName, Weights};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "placement-eligibility")]
#[command(about = "Placement eligibility, readiness ranking and cohort analytics", long_about = None)]
struct Cli {
    /// Read students from a JSON dataset instead of Postgres
    #[arg(long, global = true)]
    dataset: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load seed students
    Seed,
    /// List students matching every filter
    Eligible {
        /// Criterion as key=value, repeatable
        #[arg(long = "filter", value_parser = parse_filter)]
        filters: Vec<(String, String)>,
        /// JSON object of criteria, applied before --filter
        #[arg(long)]
        criteria: Option<PathBuf>,
        /// Order by composite readiness score
        #[arg(long)]
        rank: bool,
        #[arg(long)]
        weights: Option<PathBuf>,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },
    /// Rank every student by readiness
    Rank {
        #[arg(long)]
        weights: Option<PathBuf>,
        #[arg(long, default_value_t = 10)]
        limit: usize,
        #[arg(long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },
    /// Run one analytics pipeline by name, slug or number
    Pipeline {
        name: String,
        #[arg(long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },
    /// Generate a markdown insights report
    Report {
        #[arg(long, default_value = "placement-report.md")]
        out: PathBuf,
    },
    /// Show the values available to each filter
    Options,
    /// Show headline counts and averages for the whole dataset
    Summary,
    /// Show everything recorded for one student
    Profile {
        #[arg(long)]
        id: i64,
    },
}

fn parse_filter(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))?;
    Ok((key.trim().to_string(), value.to_string()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Some(path) = cli.dataset.as_deref() {
        if matches!(cli.command, Commands::InitDb | Commands::Seed) {
            bail!("init-db and seed need Postgres; run them without --dataset");
        }
        tracing::info!(path = %path.display(), "using dataset file");
        let store = MemoryStore::from_json_file(path)?;
        return run(Engine::new(store), cli.command).await;
    }

    let settings = Settings::from_env()?;
    let pool = PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .connect(settings.require_database_url()?)
        .await
        .context("failed to connect to Postgres")?;

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let students = db::seed(&pool).await?;
            println!("Seeded {students} students.");
        }
        command => run(Engine::new(PgStore::new(pool)), command).await?,
    }

    Ok(())
}

async fn run<S: DataStore>(engine: Engine<S>, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Eligible {
            filters,
            criteria,
            rank,
            weights,
            limit,
            format,
        } => {
            let criteria = load_criteria(criteria.as_deref(), &filters)?;
            if rank {
                let weights = load_weights(weights.as_deref())?;
                let ranked = engine.rank_eligible(&criteria, &weights).await?;
                print!("{}", report::render_rows(format, &ranked, limit)?);
            } else {
                let students = engine.find_eligible(&criteria).await?;
                if students.is_empty() && format == Format::Text {
                    println!("No students match these criteria.");
                    return Ok(());
                }
                print!("{}", report::render_rows(format, &students, limit)?);
            }
        }
        Commands::Rank {
            weights,
            limit,
            format,
        } => {
            let weights = load_weights(weights.as_deref())?;
            let ranked = engine.rank_eligible(&Criteria::default(), &weights).await?;
            print!("{}", report::render_rows(format, &ranked, Some(limit))?);
        }
        Commands::Pipeline { name, format } => {
            let name: PipelineName = name.parse()?;
            let table = engine.run_pipeline(name).await?;
            if format == Format::Text {
                println!("{}. {}", name.number(), name);
            }
            print!("{}", report::render_table(format, &table)?);
        }
        Commands::Report { out } => {
            let dataset = engine.load_dataset().await?;
            let report = report::build_report(&dataset, chrono::Local::now().date_naive())?;
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
        Commands::Options => {
            let options = engine.filter_options().await?;
            println!("{}", serde_json::to_string_pretty(&options)?);
        }
        Commands::Summary => {
            let summary = engine.summary().await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Commands::Profile { id } => match engine.student_detail(id).await? {
            Some(detail) => println!("{}", serde_json::to_string_pretty(&detail)?),
            None => bail!("no student with id {id}"),
        },
        command @ (Commands::InitDb | Commands::Seed) => {
            bail!("{command:?} needs a Postgres connection")
        }
    }

    Ok(())
}

fn load_criteria(path: Option<&Path>, filters: &[(String, String)]) -> anyhow::Result<Criteria> {
    let mut criteria = match path {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read criteria {}", path.display()))?;
            let value: serde_json::Value = serde_json::from_str(&content)
                .with_context(|| format!("failed to parse criteria {}", path.display()))?;
            Criteria::from_json(&value)?
        }
        None => Criteria::default(),
    };
    for (key, value) in filters {
        criteria.set(key, value)?;
    }
    Ok(criteria)
}

fn load_weights(path: Option<&Path>) -> anyhow::Result<Weights> {
    match path {
        Some(path) => config::load_weights(path),
        None => Ok(Weights::default()),
    }
}
