//! Command line front end for menu category reconciliation.
//!
//! Usage:
//!     menuscope table --source-type competitor --source-id c-1
//!     menuscope accept "Sandwiches" --source-type operator --source-id op
//!     menuscope auto-map --source-id op --threshold 0.8 --dry-run
//!     menuscope comparison

use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use menuscope_backend_http::{CategoryApi, HttpCategoryApi, HttpConfig};
use menuscope_features::{auto_map_candidates, ColorAllocator, ConfidenceBand};
use menuscope_model::{ModelError, SourceKey, SourceType, Threshold};
use menuscope_store::{ReconcileConfig, Reconciler};
use menuscope_table::{pricing_insights, render_comparison, render_text, ReconciliationTable};

#[derive(Parser)]
#[command(name = "menuscope")]
#[command(about = "Reconcile menu categories against the canonical taxonomy")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Pricing service URL (overrides MENUSCOPE_API_URL)
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Tenant code sent as X-Tenant-ID (overrides MENUSCOPE_TENANT)
    #[arg(long, global = true)]
    tenant: Option<String>,

    /// Request timeout in seconds (overrides MENUSCOPE_TIMEOUT_SECS)
    #[arg(long, global = true)]
    timeout_secs: Option<u64>,
}

#[derive(Args, Debug, Clone, PartialEq)]
struct SourceArgs {
    /// Menu source kind (operator, competitor)
    #[arg(long, default_value = "operator")]
    source_type: SourceType,

    /// Operator or competitor identifier
    #[arg(long)]
    source_id: String,
}

impl SourceArgs {
    fn key(&self) -> SourceKey {
        SourceKey::new(self.source_type, self.source_id.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Commands {
    /// Check backend health
    Health,

    /// List canonical categories
    Canonical,

    /// Create the predefined canonical categories
    Seed,

    /// List persisted mappings of a source
    Mappings {
        #[command(flatten)]
        source: SourceArgs,
    },

    /// List suggestions for a source's unmapped categories
    Suggest {
        #[command(flatten)]
        source: SourceArgs,
    },

    /// Show the reconciliation table
    Table {
        #[command(flatten)]
        source: SourceArgs,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: Format,
    },

    /// Accept the suggestion for one raw category
    Accept {
        /// Raw category label
        raw: String,

        #[command(flatten)]
        source: SourceArgs,
    },

    /// Map a raw category to a canonical category by hand
    Map {
        /// Raw category label
        raw: String,

        /// Canonical category id
        canonical_id: String,

        #[command(flatten)]
        source: SourceArgs,
    },

    /// Accept every suggestion at or above the threshold
    AutoMap {
        #[command(flatten)]
        source: SourceArgs,

        /// Minimum confidence, inclusive (the backend refuses values below 0.3)
        #[arg(short, long, default_value_t = Threshold::default(), value_parser = parse_auto_map_threshold)]
        threshold: Threshold,

        /// Only list what would be mapped
        #[arg(long)]
        dry_run: bool,
    },

    /// Compare operator prices with the market per canonical category
    Comparison,
}

fn parse_auto_map_threshold(s: &str) -> Result<Threshold, ModelError> {
    s.parse::<Threshold>()?.for_auto_map()
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("menuscope=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    let mut config = HttpConfig::from_env()?;
    if let Some(url) = cli.api_url {
        config.base_url = url;
    }
    if let Some(tenant) = cli.tenant {
        config.tenant = Some(tenant);
    }
    if let Some(secs) = cli.timeout_secs {
        config.timeout_secs = Some(secs);
    }
    let api = HttpCategoryApi::new(config)?;

    match cli.command {
        Commands::Health => run_health(&api).await?,
        Commands::Canonical => run_canonical(&api).await?,
        Commands::Seed => run_seed(&api).await?,
        Commands::Mappings { source } => run_mappings(&api, &source.key()).await?,
        Commands::Suggest { source } => run_suggest(&api, &source.key()).await?,
        Commands::Table { source, format } => {
            let reconciler = mounted(api, source.key(), ReconcileConfig::default()).await?;
            print_table(&reconciler.table().await, format)?;
        }
        Commands::Accept { raw, source } => {
            let reconciler = mounted(api, source.key(), ReconcileConfig::default()).await?;
            let saved = reconciler.accept(&raw).await?;
            println!("Mapped '{}' -> {}", saved.raw_category, saved.canonical_category_id);
            print_table(&reconciler.table().await, Format::Text)?;
        }
        Commands::Map {
            raw,
            canonical_id,
            source,
        } => {
            let reconciler = mounted(api, source.key(), ReconcileConfig::default()).await?;
            let saved = reconciler.repick(&raw, &canonical_id).await?;
            println!("Mapped '{}' -> {}", saved.raw_category, saved.canonical_category_id);
            print_table(&reconciler.table().await, Format::Text)?;
        }
        Commands::AutoMap {
            source,
            threshold,
            dry_run,
        } => {
            if dry_run {
                run_auto_map_preview(&api, &source.key(), threshold).await?;
            } else {
                let config = ReconcileConfig {
                    auto_map_threshold: threshold,
                    ..Default::default()
                };
                let reconciler = mounted(api, source.key(), config).await?;
                let outcome = reconciler.auto_map().await?;
                match outcome.message {
                    Some(message) => println!("{message}"),
                    None => println!(
                        "Auto-mapped {} categories at >= {}",
                        outcome.mapped, threshold
                    ),
                }
                print_table(&reconciler.table().await, Format::Text)?;
            }
        }
        Commands::Comparison => run_comparison(&api).await?,
    }

    Ok(())
}

/// Build a reconciler for `source` and run its initial load.
async fn mounted(
    api: HttpCategoryApi,
    source: SourceKey,
    config: ReconcileConfig,
) -> Result<Reconciler<HttpCategoryApi>> {
    let raw = api.raw_categories(&source).await?;
    tracing::debug!(source = %source, count = raw.len(), "Loaded raw categories");

    let reconciler = Reconciler::new(api, source, raw, config);
    reconciler.mount().await;
    Ok(reconciler)
}

fn print_table(table: &ReconciliationTable, format: Format) -> Result<()> {
    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(table)?),
        Format::Text => print!("{}", render_text(table)),
    }
    Ok(())
}

async fn run_health(api: &HttpCategoryApi) -> Result<()> {
    print!("Checking {} backend... ", api.name());

    match api.health_check().await {
        Ok(()) => {
            println!("OK");
            Ok(())
        }
        Err(e) => {
            println!("FAILED: {}", e);
            std::process::exit(1);
        }
    }
}

async fn run_canonical(api: &HttpCategoryApi) -> Result<()> {
    let canonical = api.canonical_categories().await?;
    if canonical.is_empty() {
        println!("No canonical categories. Run `menuscope seed` to create the defaults.");
        return Ok(());
    }

    for category in &canonical {
        println!("{:<38} {}", category.id, category.name);
        if let Some(description) = &category.description {
            println!("{:<38} {}", "", description);
        }
    }
    println!("---");
    println!("Total: {} categories", canonical.len());
    Ok(())
}

async fn run_seed(api: &HttpCategoryApi) -> Result<()> {
    let created = api.seed_canonical().await?;
    if created.is_empty() {
        println!("Canonical categories already seeded");
    } else {
        println!("Created {} canonical categories:", created.len());
        for category in &created {
            println!("  {}", category.name);
        }
    }
    Ok(())
}

async fn run_mappings(api: &HttpCategoryApi, source: &SourceKey) -> Result<()> {
    let mappings = api.mappings(source).await?;
    println!("Mappings for {}", source);
    println!("---");

    for mapping in &mappings {
        let target = mapping
            .canonical_category
            .as_ref()
            .map(|c| c.name.as_str())
            .unwrap_or(mapping.canonical_category_id.as_str());
        let origin = if mapping.is_manual { "manual" } else { "auto" };
        let confidence = mapping
            .confidence_score
            .map(|s| format!(" ({:.0}%)", s * 100.0))
            .unwrap_or_default();
        println!("{} -> {} [{}]{}", mapping.raw_category, target, origin, confidence);
    }

    println!("---");
    println!("Total: {} mappings", mappings.len());
    Ok(())
}

async fn run_suggest(api: &HttpCategoryApi, source: &SourceKey) -> Result<()> {
    let suggestions = api.suggestions(source).await?;
    if suggestions.is_empty() {
        println!("No unmapped categories for {}", source);
        return Ok(());
    }

    for suggestion in &suggestions {
        let band = ConfidenceBand::of(suggestion.confidence_score);
        println!(
            "{} -> {} ({:.0}%, {})",
            suggestion.raw_category,
            suggestion.canonical_category_name,
            suggestion.confidence_score * 100.0,
            band.as_str()
        );
        for alternative in &suggestion.alternatives {
            println!("   or {} ({:.0}%)", alternative.name, alternative.score * 100.0);
        }
    }
    Ok(())
}

async fn run_auto_map_preview(
    api: &HttpCategoryApi,
    source: &SourceKey,
    threshold: Threshold,
) -> Result<()> {
    let suggestions = api.suggestions(source).await?;
    let candidates = auto_map_candidates(&suggestions, threshold);

    println!("Would map {} of {} categories at >= {}", candidates.len(), suggestions.len(), threshold);
    for candidate in candidates {
        println!(
            "  {} -> {} ({:.0}%)",
            candidate.raw_category,
            candidate.canonical_category_name,
            candidate.confidence_score * 100.0
        );
    }
    Ok(())
}

async fn run_comparison(api: &HttpCategoryApi) -> Result<()> {
    let comparison = api.comparison().await?;
    let mut colors = ColorAllocator::default();
    print!("{}", render_comparison(&comparison, &mut colors));

    let insights = pricing_insights(&comparison);
    println!("---");
    for insight in &insights.insights {
        println!("* {}", insight);
    }
    println!("{}", insights.summary);
    Ok(())
}
