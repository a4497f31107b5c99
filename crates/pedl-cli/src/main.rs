//! PEDL CLI - Command-line interface
//!
//! Usage:
//!   pedl predict --p1 <names|file> --p2 <names|file> --out <dir>
//!   pedl summarize <dir>
//!   pedl build-training-set --triples <file> --out <file> --out-blinded <file>

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use pedl_core::{AppConfig, EvidenceProvider, SummaryAggregate, TiePolicy};
use pedl_evidence::{
    EntityResolver, FallbackEvidence, PubtatorStore, RemoteEvidenceClient, StatementDatabase,
};
use pedl_extractor::{
    read_entity_list, read_triples, CorpusCrawler, ExtractionRanker, PairGenerator, Predictor,
    Shard, SummaryAggregator,
};
use pedl_scoring::create_scoring_client;

#[derive(Parser)]
#[command(name = "pedl")]
#[command(about = "Distantly supervised relation extraction from PubMed")]
#[command(version)]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Predict relations between two lists of entities
    Predict(PredictArgs),
    /// Merge per-pair result files into one table
    Summarize(SummarizeArgs),
    /// Build a distantly supervised training set from known relations
    BuildTrainingSet(TrainingSetArgs),
}

#[derive(Args)]
struct PredictArgs {
    /// First entities: symbols, ids, or a single file with one per line
    #[arg(long, num_args = 1.., required = true)]
    p1: Vec<String>,

    /// Second entities: symbols, ids, or a single file with one per line
    #[arg(long, num_args = 1.., required = true)]
    p2: Vec<String>,

    /// Output directory, one file per pair
    #[arg(long)]
    out: PathBuf,

    /// Local PubTator file or directory
    #[arg(long)]
    pubtator: Option<PathBuf>,

    /// Query the evidence service for what the local PubTator copy lacks
    #[arg(long)]
    api_fallback: bool,

    /// Curated statement databases (extended SIF)
    #[arg(long, num_args = 1..)]
    dbs: Vec<PathBuf>,

    /// Gene table (gene_id<TAB>symbol)
    #[arg(long)]
    gene_table: Option<PathBuf>,

    #[arg(long)]
    scoring_url: Option<String>,

    #[arg(long)]
    evidence_url: Option<String>,

    #[arg(long)]
    model: Option<String>,

    #[arg(long)]
    cutoff: Option<f64>,

    #[arg(long)]
    batch_size: Option<usize>,

    /// Only predict p1 -> p2
    #[arg(long)]
    skip_reverse: bool,

    /// literal | emit-once
    #[arg(long)]
    tie_policy: Option<TiePolicy>,
}

#[derive(Args)]
struct SummarizeArgs {
    /// Directory of per-pair result files
    path: PathBuf,

    /// Output table (default: <path>.tsv)
    #[arg(long)]
    out: Option<PathBuf>,

    #[arg(long, default_value_t = 0.0)]
    cutoff: f64,

    /// Fold all association types together
    #[arg(long)]
    no_association_type: bool,

    /// sum | max
    #[arg(long, default_value = "sum")]
    aggregate: SummaryAggregate,
}

#[derive(Args)]
struct TrainingSetArgs {
    /// Known relations: head_type, head_id, tail_type, tail_id, relation
    #[arg(long)]
    triples: PathBuf,

    #[arg(long)]
    out: PathBuf,

    #[arg(long)]
    out_blinded: PathBuf,

    #[arg(long)]
    pubtator: Option<PathBuf>,

    /// Query the evidence service for what the local PubTator copy lacks
    #[arg(long)]
    api_fallback: bool,

    #[arg(long)]
    evidence_url: Option<String>,

    #[arg(long)]
    n_worker: Option<usize>,

    #[arg(long)]
    worker_id: Option<usize>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => AppConfig::from_file(path)?.with_env_override()?,
        None => AppConfig::from_env()?,
    };
    init_tracing(&config, cli.verbose);

    match cli.command {
        Commands::Predict(args) => predict(config, args).await,
        Commands::Summarize(args) => summarize(args),
        Commands::BuildTrainingSet(args) => build_training_set(config, args).await,
    }
}

fn init_tracing(config: &AppConfig, verbose: bool) {
    let level = if verbose {
        "debug"
    } else {
        config.logging.level.as_str()
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| level.into());

    if config.logging.json_format {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn evidence_provider(config: &AppConfig) -> anyhow::Result<Box<dyn EvidenceProvider>> {
    let Some(path) = &config.evidence.pubtator else {
        return Ok(Box::new(RemoteEvidenceClient::from_config(&config.evidence)?));
    };

    tracing::info!("Loading PubTator documents from {}", path.display());
    let store = PubtatorStore::open(path)?.with_pmids_per_batch(config.evidence.pmids_per_batch);
    tracing::info!("Loaded {} documents", store.len());

    if !config.evidence.api_fallback {
        return Ok(Box::new(store));
    }
    tracing::info!("Falling back to {} for missing evidence", config.evidence.remote_url);
    let remote = RemoteEvidenceClient::from_config(&config.evidence)?;
    Ok(Box::new(
        FallbackEvidence::new(Box::new(store), Box::new(remote))
            .with_pmids_per_batch(config.evidence.pmids_per_batch),
    ))
}

async fn predict(mut config: AppConfig, args: PredictArgs) -> anyhow::Result<()> {
    if let Some(path) = args.pubtator {
        config.evidence.pubtator = Some(path);
    }
    config.evidence.api_fallback |= args.api_fallback;
    if let Some(path) = args.gene_table {
        config.evidence.gene_table = Some(path);
    }
    if let Some(url) = args.evidence_url {
        config.evidence.remote_url = url;
    }
    if let Some(url) = args.scoring_url {
        config.scoring.base_url = url;
    }
    if let Some(model) = args.model {
        config.scoring.model = model;
    }
    if let Some(batch_size) = args.batch_size {
        config.scoring.batch_size = batch_size;
    }
    if let Some(cutoff) = args.cutoff {
        config.extraction.cutoff = cutoff;
    }
    if let Some(tie_policy) = args.tie_policy {
        config.extraction.tie_policy = tie_policy;
    }
    let skip_reverse = args.skip_reverse || config.extraction.skip_reverse;

    let resolver = match &config.evidence.gene_table {
        Some(path) => EntityResolver::from_tsv(path)?,
        None => EntityResolver::new(),
    };
    let p1s = resolver.resolve_all(&read_entity_list(&args.p1)?)?;
    let p2s = resolver.resolve_all(&read_entity_list(&args.p2)?)?;

    let evidence = evidence_provider(&config)?;
    let pairs = PairGenerator::new(evidence.is_local())
        .with_max_remote_pairs(config.extraction.max_remote_pairs)
        .generate(&p1s, &p2s, skip_reverse)?;
    tracing::info!("Querying {} pairs via {}", pairs.len(), evidence.name());

    let databases = args
        .dbs
        .iter()
        .map(|path| StatementDatabase::open(path, &resolver))
        .collect::<pedl_core::Result<Vec<_>>>()?;

    let scorer = create_scoring_client(&config.scoring)?;
    let ranker = ExtractionRanker::new(config.extraction.cutoff)
        .with_tie_policy(config.extraction.tie_policy);

    let predictor = Predictor::new(evidence, scorer, resolver)
        .with_databases(databases)
        .with_batch_size(config.scoring.batch_size)
        .with_ranker(ranker);
    predictor.run(&pairs, &args.out).await?;

    Ok(())
}

fn summarize(args: SummarizeArgs) -> anyhow::Result<()> {
    let out = SummaryAggregator::new(args.cutoff)
        .with_no_association_type(args.no_association_type)
        .with_aggregate(args.aggregate)
        .summarize(&args.path, args.out.as_deref())?;
    println!("{}", out.display());
    Ok(())
}

async fn build_training_set(mut config: AppConfig, args: TrainingSetArgs) -> anyhow::Result<()> {
    if let Some(path) = args.pubtator {
        config.evidence.pubtator = Some(path);
    }
    if let Some(url) = args.evidence_url {
        config.evidence.remote_url = url;
    }
    config.evidence.api_fallback |= args.api_fallback;
    if let Some(n_worker) = args.n_worker {
        config.crawl.n_worker = n_worker;
    }
    if let Some(worker_id) = args.worker_id {
        config.crawl.worker_id = worker_id;
    }

    let shard = Shard::new(config.crawl.worker_id, config.crawl.n_worker)?;
    let relations = read_triples(&args.triples)?;
    let evidence = evidence_provider(&config)?;

    CorpusCrawler::new(evidence.as_ref(), shard)
        .build_training_set(&relations, &args.out, &args.out_blinded)
        .await?;

    Ok(())
}
