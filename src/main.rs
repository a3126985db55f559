use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing::info;

use campus_ranking::config::Config;
use campus_ranking::filter::StudentFilter;
use campus_ranking::store::{postgres, MemoryStore, PgStore, RecordStore};
use campus_ranking::{logging, output, report};
use campus_ranking::{RankError, Ranker, RankingParams, RankingRequest, RankingResponse};

#[derive(Parser)]
#[command(name = "campus-ranking")]
#[command(about = "Student rankings and derived statistics for a 42 campus", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load demo campus data
    Seed,
    /// Rank students and print the JSON response
    Rank {
        #[command(flatten)]
        query: QueryArgs,
        /// Rank against a JSON snapshot instead of Postgres
        #[arg(long)]
        fixture: Option<PathBuf>,
    },
    /// Write a ranking page as CSV
    Export {
        #[command(flatten)]
        query: QueryArgs,
        #[arg(long)]
        fixture: Option<PathBuf>,
        #[arg(long, default_value = "ranking.csv")]
        out: PathBuf,
    },
    /// Generate a markdown report of a ranking page
    Report {
        #[command(flatten)]
        query: QueryArgs,
        #[arg(long)]
        fixture: Option<PathBuf>,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// Print a student's logged time per weekday
    Attendance {
        login: String,
        #[arg(long)]
        fixture: Option<PathBuf>,
    },
}

/// Ranking parameters, named as in the query string.
#[derive(Args)]
struct QueryArgs {
    #[arg(long = "campus-id")]
    campus_id: Option<String>,
    #[arg(long)]
    search: Option<String>,
    /// Combined `month-year` token, e.g. `march-2024`
    #[arg(long)]
    pool: Option<String>,
    #[arg(long = "pool-month")]
    pool_month: Option<String>,
    #[arg(long = "pool-year")]
    pool_year: Option<String>,
    #[arg(long)]
    status: Option<String>,
    #[arg(long, default_value = "login")]
    sort: String,
    #[arg(long, default_value = "asc")]
    order: String,
    #[arg(long)]
    limit: Option<String>,
    #[arg(long)]
    page: Option<String>,
    #[arg(long)]
    skip: Option<String>,
}

impl From<QueryArgs> for RankingParams {
    fn from(args: QueryArgs) -> Self {
        RankingParams {
            campus_id: args.campus_id,
            search: args.search,
            pool: args.pool,
            pool_month: args.pool_month,
            pool_year: args.pool_year,
            status: args.status,
            sort: Some(args.sort),
            order: Some(args.order),
            limit: args.limit,
            page: args.page,
            skip: args.skip,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();
    let cli = Cli::parse();
    let config = Config::from_env()?;

    match cli.command {
        Commands::InitDb => {
            let store = connect(&config).await?;
            postgres::init_db(store.pool()).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let store = connect(&config).await?;
            postgres::seed(store.pool()).await?;
            println!("Seed data inserted.");
        }
        Commands::Rank { query, fixture } => {
            let ranker = ranker(&config, fixture).await?;
            match ranker.respond(&query.into()).await {
                Ok(response) => println!("{}", serde_json::to_string_pretty(&response)?),
                Err(err) => exit_with(err)?,
            }
        }
        Commands::Export {
            query,
            fixture,
            out,
        } => {
            let ranker = ranker(&config, fixture).await?;
            let (request, response) = rank_checked(&ranker, query.into()).await?;
            let field = request.sort.derived().map(|key| key.field_name());
            output::export_csv(&out, &response, field)?;
            println!(
                "Wrote {} students to {}.",
                response.students.len(),
                out.display()
            );
        }
        Commands::Report {
            query,
            fixture,
            out,
        } => {
            let ranker = ranker(&config, fixture).await?;
            let (request, response) = rank_checked(&ranker, query.into()).await?;
            let report = report::build_report(&request, &response);
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
        Commands::Attendance { login, fixture } => {
            let store = record_store(&config, fixture).await?;
            let params = RankingParams {
                search: Some(login.clone()),
                ..Default::default()
            };
            let filter = StudentFilter::from_request(&RankingRequest::from_params(&params)?);
            let totals = store
                .attendance(&filter)
                .await?
                .into_source()
                .weekday_seconds(&login);
            print!("{}", report::build_weekday_table(&login, &totals));
        }
    }

    Ok(())
}

async fn connect(config: &Config) -> anyhow::Result<PgStore> {
    let store = PgStore::connect(config.database_url()?, config.max_connections)
        .await
        .context("failed to connect to Postgres")?;
    Ok(store)
}

async fn record_store(
    config: &Config,
    fixture: Option<PathBuf>,
) -> anyhow::Result<Arc<dyn RecordStore>> {
    let store: Arc<dyn RecordStore> = match fixture {
        Some(path) => {
            info!(path = %path.display(), "reading fixture snapshot");
            Arc::new(MemoryStore::from_json_file(&path)?)
        }
        None => Arc::new(connect(config).await?),
    };
    Ok(store)
}

async fn ranker(config: &Config, fixture: Option<PathBuf>) -> anyhow::Result<Ranker> {
    let store = record_store(config, fixture).await?;
    Ok(Ranker::new(store, &config.ranking))
}

async fn rank_checked(
    ranker: &Ranker,
    params: RankingParams,
) -> anyhow::Result<(RankingRequest, RankingResponse)> {
    let request = RankingRequest::from_params(&params)?;
    let page = ranker.rank(&request).await?;
    Ok((request, RankingResponse::from_page(page)))
}

/// Prints the error body on stdout and exits with a status-derived code.
fn exit_with(err: RankError) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(&err.to_body())?);
    eprintln!("status {}", err.status_code());
    let code = if err.status_code() < 500 { 2 } else { 1 };
    std::process::exit(code);
}
