use std::{path::PathBuf, time::Duration};

use anyhow::Context as _;
use chrono::Local;
use coalition_engine::{
    EngineConfig, FeatureMatrix, FeatureProvider as _, ResultSink as _, RosterKey, RunReport,
    ShapleyEngine, ValueWeights, WeightedValueFunction,
};
use coalition_stats::descriptive::DescriptiveStats;

use crate::{
    provider::FileFeatureProvider,
    sink::JsonResultSink,
    store::JsonCoalitionStore,
    util::{self, Output},
};

#[derive(Default, Debug, Clone, clap::Args)]
pub(crate) struct AnalyzeArg {
    /// Team identifier
    #[arg(long)]
    team_id: String,
    /// Season identifier
    #[arg(long)]
    season: String,
    /// JSON file with value weights (missing fields keep their defaults)
    #[arg(long)]
    value_weights: Option<PathBuf>,
    /// Largest roster solved by exact enumeration
    #[arg(long)]
    exact_threshold: Option<usize>,
    /// Permutation budget of the approximate solver
    #[arg(long)]
    max_iterations: Option<usize>,
    /// Target standard error relative to the grand coalition value
    #[arg(long)]
    confidence_tolerance: Option<f64>,
    /// Worker threads (defaults to available cores)
    #[arg(long)]
    workers: Option<usize>,
    /// Directory holding `<team>_<season>.json` or `.csv` feature files
    #[arg(long, default_value = ".")]
    data_dir: PathBuf,
    /// Sampling seed for reproducible approximate runs
    #[arg(long)]
    seed: Option<u64>,
    /// Abort the analysis after this many seconds
    #[arg(long)]
    timeout_secs: Option<f64>,
    /// Fail when the approximation does not converge
    #[arg(long)]
    strict: bool,
    /// Output file path
    #[arg(long)]
    output: Option<PathBuf>,
    /// JSON file persisting coalition values between runs
    #[arg(long)]
    cache_file: Option<PathBuf>,
}

impl AnalyzeArg {
    fn engine_config(&self) -> anyhow::Result<EngineConfig> {
        let defaults = EngineConfig::default();
        let timeout = self
            .timeout_secs
            .map(Duration::try_from_secs_f64)
            .transpose()
            .context("--timeout-secs must be a non-negative number of seconds")?;
        Ok(EngineConfig {
            exact_threshold: self.exact_threshold.unwrap_or(defaults.exact_threshold),
            max_iterations: self.max_iterations.unwrap_or(defaults.max_iterations),
            confidence_tolerance: self
                .confidence_tolerance
                .unwrap_or(defaults.confidence_tolerance),
            workers: self.workers,
            seed: self.seed,
            timeout,
            strict_convergence: self.strict,
            ..defaults
        })
    }
}

pub(crate) fn run(arg: &AnalyzeArg) -> anyhow::Result<()> {
    let key = RosterKey::new(&arg.team_id, &arg.season);
    let weights = match &arg.value_weights {
        Some(path) => util::read_json_file("value weights", path)?,
        None => ValueWeights::default(),
    };
    let engine =
        ShapleyEngine::new(arg.engine_config()?).context("invalid engine configuration")?;

    eprintln!("Loading roster {key} from {}...", arg.data_dir.display());
    let table = FileFeatureProvider::new(&arg.data_dir)
        .fetch(&key)
        .with_context(|| format!("Failed to load roster {key}"))?;
    let (set, features) = FeatureMatrix::from_table(key.to_string(), &table)
        .with_context(|| format!("Invalid feature data for roster {key}"))?;
    eprintln!("Loaded {} members", set.len());

    let value_fn =
        WeightedValueFunction::new(&features, weights).context("invalid value weights")?;
    let report = match &arg.cache_file {
        Some(path) => {
            let store = JsonCoalitionStore::new(path, weights, &set);
            engine.analyze_cached(&set, &value_fn, &store)
        }
        None => engine.analyze(&set, &value_fn),
    }
    .with_context(|| format!("Failed to analyze roster {key}"))?;

    print_summary(&report);

    let mut sink = JsonResultSink::new(Output::from_output_path(arg.output.clone())?);
    sink.accept(&report.results, &report.metadata)
        .with_context(|| format!("Failed to write results to {}", sink.display_path()))?;
    Ok(())
}

fn print_summary(report: &RunReport) {
    let meta = &report.metadata;
    eprintln!();
    eprintln!(
        "Roster {} ({} members), {} solver, started {}",
        meta.membership_set_id,
        meta.member_count,
        meta.solver,
        meta.started_at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S"),
    );
    eprintln!("  v(N):                 {:.6}", meta.grand_value);
    if let Some(iterations) = meta.iterations {
        eprintln!(
            "  Permutations:         {iterations} (converged: {})",
            meta.converged.unwrap_or(false)
        );
    }
    if let Some(seed) = meta.seed {
        eprintln!("  Seed:                 {seed}");
    }
    eprintln!("  Achieved confidence:  {:.4}", meta.achieved_confidence);
    eprintln!("  Reconciliation error: {:+.3e}", meta.reconciliation_error);
    eprintln!(
        "  Cache:                {} entries, {:.1}% hits",
        meta.cache.entries,
        meta.cache.hit_rate() * 100.0
    );
    eprintln!(
        "  Workers / duration:   {} / {:.3}s",
        meta.workers, meta.duration_secs
    );
    eprintln!();

    let id_width = report
        .results
        .iter()
        .map(|r| r.member_id.0.len())
        .max()
        .unwrap_or(0)
        .max("member".len());
    eprintln!(
        "  {:>4}  {:<id_width$}  {:>12}  {:>8}  {:>10}",
        "rank", "member", "raw", "share", "std err"
    );
    for result in &report.results {
        let se = result
            .standard_error
            .map_or_else(|| "-".to_owned(), |se| format!("{se:.6}"));
        eprintln!(
            "  {:>4}  {:<id_width$}  {:>12.6}  {:>7.2}%  {:>10}",
            result.rank,
            result.member_id.0,
            result.raw_value,
            result.share * 100.0,
            se
        );
    }

    if let Some(stats) = DescriptiveStats::new(report.results.iter().map(|r| r.share * 100.0)) {
        eprintln!();
        eprintln!(
            "  Share %: mean {:.2}, median {:.2}, std dev {:.2}, min {:.2}, max {:.2}",
            stats.mean, stats.median, stats.std_dev, stats.min, stats.max
        );
    }
}
