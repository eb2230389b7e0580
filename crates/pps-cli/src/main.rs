use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use pps_adapters::StaticSessionProvider;
use pps_core::{CandidateFilter, DuplicateProbeFields};
use pps_storage::PgCandidateStore;
use pps_sync::{BatchEvent, EnrichmentOutcome, OutcomeLevel, Portal, PortalConfig};
use tokio::sync::mpsc;
use tracing::{debug, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "pps-cli")]
#[command(about = "Partner portal sync command-line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the JSON API.
    Serve {
        #[arg(long, env = "PPS_WEB_PORT", default_value_t = 8000)]
        port: u16,
    },
    /// Apply database migrations.
    Migrate,
    /// Print the candidate list for a tab.
    List {
        #[arg(long, default_value = "all")]
        filter: CandidateFilter,
        #[arg(long)]
        query: Option<String>,
    },
    /// Probe the ATS for an existing record.
    CheckDuplicate {
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        linkedin: Option<String>,
        #[arg(long)]
        name: Option<String>,
    },
    /// Look up contact details for one profile; nothing is saved.
    Enrich { linkedin_url: String },
    /// Enrich every candidate on a tab and save what is found.
    EnrichBatch {
        #[arg(long, default_value = "mine")]
        filter: CandidateFilter,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = PortalConfig::from_env();

    let Some(command) = cli.command else {
        return pps_web::serve_from_env().await;
    };

    debug!(?command, "dispatching");
    match command {
        Commands::Serve { port } => {
            pps_web::serve(&config, port).await?;
        }
        Commands::Migrate => {
            let Some(url) = config.database_url.as_deref() else {
                bail!("DATABASE_URL must be set to run migrations");
            };
            let store = PgCandidateStore::connect(url)
                .await
                .context("connecting to candidate database")?;
            store.migrate().await.context("running migrations")?;
            info!("migrations applied");
        }
        Commands::List { filter, query } => {
            let portal = Portal::from_config(&config).await?;
            let viewer = Portal::resolve_viewer(&StaticSessionProvider::from_env()).await;
            let rows = portal
                .list_candidates(&viewer, filter, query.as_deref())
                .await
                .context("listing candidates")?;
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
        Commands::CheckDuplicate {
            email,
            phone,
            linkedin,
            name,
        } => {
            let portal = Portal::from_config(&config).await?;
            let result = portal
                .check_duplicate(&DuplicateProbeFields {
                    email,
                    full_name: name,
                    linkedin_url: linkedin,
                    phone,
                })
                .await;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Commands::Enrich { linkedin_url } => {
            let portal = Portal::from_config(&config).await?;
            match portal.lookup_contact(&linkedin_url).await? {
                EnrichmentOutcome::Found { contact } => {
                    println!(
                        "email={} phone={}",
                        contact.email.as_deref().unwrap_or("-"),
                        contact.phone.as_deref().unwrap_or("-")
                    );
                }
                EnrichmentOutcome::NoContactInfo => println!("no public contact info found"),
            }
        }
        Commands::EnrichBatch { filter } => {
            let portal = Portal::from_config(&config).await?;
            let viewer = Portal::resolve_viewer(&StaticSessionProvider::from_env()).await;
            let candidates = portal
                .list_candidates(&viewer, filter, None)
                .await
                .context("listing candidates")?;

            let (tx, mut rx) = mpsc::unbounded_channel::<BatchEvent>();
            let printer = tokio::spawn(async move {
                while let Some(event) = rx.recv().await {
                    println!(
                        "[{}/{}] {:?} {}: {}",
                        event.progress.processed,
                        event.progress.total,
                        event.outcome.level,
                        event.outcome.name,
                        event.outcome.message
                    );
                }
            });
            let report = portal.run_batch(&viewer, &candidates, Some(&tx)).await?;
            drop(tx);
            printer.await.context("progress printer stopped")?;
            info!(items = report.outcomes.len(), "batch finished");

            println!(
                "batch complete: success={} warning={} error={} skipped={}",
                report.count(OutcomeLevel::Success),
                report.count(OutcomeLevel::Warning),
                report.count(OutcomeLevel::Error),
                report.count(OutcomeLevel::Skipped)
            );
        }
    }

    Ok(())
}
