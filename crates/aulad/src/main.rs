use std::ffi::OsStr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use aula_config::{EmbeddingProviderKind, ensure_workspace_config, validate_config};
use aula_core::CatalogId;
use aula_infer::{EmbeddingProviderOverrides, load_embedding_provider};
use aula_rank::{ContextHint, RankingService};
use aulad::output::{OutputFormat, RelatedLists, write_predictions, write_recommendations};
use aulad::sources::{JsonCatalogFile, JsonHistoryFile};
use clap::Parser;
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "AULA_LOG";

#[derive(Debug, Parser)]
#[command(author, version, about = "AULA search intelligence")]
struct Cli {
    #[arg(
        long,
        default_value = ".",
        help = "Workspace root holding .aula/config.toml"
    )]
    workspace: PathBuf,

    #[arg(long, help = "Catalog JSON file with courses, topics and resources")]
    catalog: PathBuf,

    #[arg(long, help = "Search history JSON file (array of query records)")]
    history: Option<PathBuf>,

    #[arg(
        long,
        requires = "history",
        conflicts_with = "recommend",
        help = "Print the most popular course, topic and resource"
    )]
    trends: bool,

    #[arg(long, help = "Print courses, topics and resources related to a live query")]
    recommend: Option<String>,

    #[arg(
        long = "direct-id",
        requires = "recommend",
        help = "Catalog id already shown as a direct result (repeatable)"
    )]
    direct_ids: Vec<CatalogId>,

    #[arg(
        long = "area",
        requires = "recommend",
        help = "Area the user is browsing in (repeatable)"
    )]
    areas: Vec<String>,

    #[arg(
        long = "career",
        requires = "recommend",
        help = "Career the user is browsing in (repeatable)"
    )]
    careers: Vec<String>,

    #[arg(
        long,
        default_value = "table",
        value_parser = parse_output_format,
        help = "Output format: table or json"
    )]
    output: OutputFormat,

    #[arg(long, help = "Enable semantic scoring regardless of config")]
    embeddings: bool,

    #[arg(long, value_parser = parse_embedding_provider)]
    embedding_provider: Option<EmbeddingProviderKind>,

    #[arg(long)]
    embedding_model: Option<String>,

    #[arg(long)]
    embedding_endpoint: Option<String>,

    #[arg(long, help = "Emit logs as JSON lines")]
    log_json: bool,
}

fn main() -> Result<()> {
    let cli = parse_cli();
    init_tracing(cli.log_json);
    run(cli)
}

fn parse_cli() -> Cli {
    let mut args: Vec<_> = std::env::args_os().collect();
    if args.get(1).is_some_and(|arg| arg == OsStr::new("--")) {
        args.remove(1);
    }

    Cli::parse_from(args)
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn run(cli: Cli) -> Result<()> {
    let workspace = cli.workspace.canonicalize().with_context(|| {
        format!(
            "failed to resolve workspace path {}",
            cli.workspace.display()
        )
    })?;

    let config = ensure_workspace_config(&workspace).with_context(|| {
        format!(
            "failed to load or create workspace config at {}",
            aula_config::config_path(&workspace).display()
        )
    })?;
    for warning in validate_config(&config) {
        eprintln!("AULA config warning [{}]: {}", warning.code, warning.message);
    }

    let provider = load_embedding_provider(
        &config.embeddings,
        EmbeddingProviderOverrides {
            enabled: cli.embeddings.then_some(true),
            provider: cli.embedding_provider,
            model: cli.embedding_model,
            endpoint: cli.embedding_endpoint,
        },
    );
    if let Some(loaded) = &provider {
        tracing::info!(
            provider = %loaded.provider_name,
            model = %loaded.model_name,
            "semantic scoring enabled"
        );
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;
    let service = RankingService::new(config, provider);
    let catalog = JsonCatalogFile::new(&cli.catalog);
    let mut out = std::io::stdout();

    runtime.block_on(async move {
        service.refresh_from(&catalog).await.with_context(|| {
            format!("failed to load catalog from {}", catalog.path().display())
        })?;

        if let Some(query) = cli.recommend.as_deref() {
            let hint = ContextHint {
                areas: cli.areas,
                careers: cli.careers,
            };
            let courses = service
                .recommend_related_courses(query, &cli.direct_ids, &hint)
                .await
                .context("related course ranking failed")?;
            let topics = service
                .recommend_related_topics(query, &cli.direct_ids)
                .await
                .context("related topic ranking failed")?;
            let resources = service
                .recommend_related_resources(query, &cli.direct_ids)
                .await
                .context("related resource ranking failed")?;
            let lists = RelatedLists {
                courses: &courses,
                topics: &topics,
                resources: &resources,
            };
            return write_recommendations(query, lists, cli.output, &mut out);
        }

        if cli.trends {
            let Some(history_path) = cli.history.as_ref() else {
                anyhow::bail!("--trends requires --history");
            };
            let history = JsonHistoryFile::new(history_path);
            let predictions = service
                .predict_all(&history, chrono::Utc::now())
                .await
                .with_context(|| {
                    format!("failed to score history from {}", history_path.display())
                })?;
            return write_predictions(&predictions, cli.output, &mut out);
        }

        anyhow::bail!("nothing to do: pass --trends or --recommend <query>")
    })
}

fn parse_output_format(value: &str) -> Result<OutputFormat, String> {
    value.parse()
}

fn parse_embedding_provider(value: &str) -> Result<EmbeddingProviderKind, String> {
    value.parse()
}
