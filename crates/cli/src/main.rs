use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use common::{config, AnnotatorConfig, ChoiceKind, ChoiceLedger, ChoiceRecord};
use oracle::{DecisionOracle, OracleConfig};
use std::path::{Path, PathBuf};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "optimist")]
#[command(about = "Optimistic annotation of program graphs under replayable control", long_about = None)]
struct Cli {
    /// Tracing filter directive (e.g. `info`, `oracle=debug`).
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the annotation pass over a JSON module.
    Annotate(AnnotateArgs),
    /// Validate a global control string and list its decisions.
    Decode {
        /// Control string, e.g. `#f0f#c61`.
        control: String,
    },
    /// Print the choice-kind registry.
    Kinds,
}

#[derive(Args)]
struct AnnotateArgs {
    /// Module to annotate (JSON).
    module: PathBuf,
    /// Where to write the annotated module; stdout if omitted.
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Configuration file.
    #[arg(long, default_value = config::CONFIG_FILE)]
    config: PathBuf,
    /// Global control string.
    #[arg(long)]
    control: Option<String>,
    /// Unresolved sites take the most aggressive choice.
    #[arg(long)]
    default_optimistic: bool,
    /// Eligible pass instances; negative is unlimited.
    #[arg(long, allow_negative_numbers = true)]
    runs: Option<i64>,
    /// Comma separated function name patterns.
    #[arg(long)]
    only_functions: Option<String>,
    /// Print every resolved choice.
    #[arg(long)]
    print_choices: bool,
    /// Print default resolutions of the last eligible instance.
    #[arg(long)]
    print_opportunities: bool,
    /// How many times to run the pass on the same oracle.
    #[arg(long, default_value_t = 1)]
    passes: u32,
    /// Archive the recorded choices to this file.
    #[arg(long)]
    ledger: Option<PathBuf>,
    /// Print annotation counters after each pass.
    #[arg(long)]
    stats: bool,
}

fn main() -> anyhow::Result<()> {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("warning: .env: {}", e);
        }
    }

    let cli = Cli::parse();
    let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();

    match &cli.command {
        Commands::Annotate(args) => cmd_annotate(args)?,
        Commands::Decode { control } => cmd_decode(control)?,
        Commands::Kinds => cmd_kinds(),
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// annotate
// ---------------------------------------------------------------------------

/// Defaults, then the TOML file, then `OPTIMIST_*`, then flags.
fn layered_config(args: &AnnotateArgs) -> anyhow::Result<AnnotatorConfig> {
    let mut config = AnnotatorConfig::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    config.apply_env().context("reading OPTIMIST_* environment")?;

    if let Some(control) = &args.control {
        config.control = control.clone();
    }
    if let Some(runs) = args.runs {
        config.runs = runs;
    }
    if let Some(patterns) = &args.only_functions {
        config.only_functions = config::split_patterns(patterns);
    }
    config.default_optimistic |= args.default_optimistic;
    config.print_choices |= args.print_choices;
    config.print_opportunities |= args.print_opportunities;
    Ok(config)
}

fn cmd_annotate(args: &AnnotateArgs) -> anyhow::Result<()> {
    let config = layered_config(args)?;
    let options = annotator::PassOptions::from_config(&config)?;
    let mut module = ir::Module::load(&args.module)
        .with_context(|| format!("reading module {}", args.module.display()))?;
    let mut oracle = DecisionOracle::new(OracleConfig::from(&config));
    let mut recorded: Vec<ChoiceRecord> = Vec::new();

    for _ in 0..args.passes {
        let outcome = annotator::run_pass(&mut module, &mut oracle, &options)
            .with_context(|| format!("annotating {}", module.name))?;

        if !outcome.annotatable.is_empty() {
            eprintln!(
                "Annotatable Functions [{}][{}]:",
                outcome.instance.unwrap_or(0),
                oracle.instances().started()
            );
            for (ordinal, name) in &outcome.annotatable {
                eprintln!("no {ordinal}: {name}");
            }
        }
        for record in oracle.take_trace() {
            eprintln!("{record}");
            recorded.push(record);
        }
        if args.stats && !outcome.statistics.is_empty() {
            eprint!("{}", outcome.statistics);
        }
    }

    if let Some(path) = &args.ledger {
        let mut ledger = ChoiceLedger::from_records(&recorded);
        ledger
            .save(path)
            .with_context(|| format!("writing ledger {}", path.display()))?;
        tracing::info!(path = %path.display(), entries = ledger.len(), "ledger saved");
    }

    write_module(&module, args.output.as_deref())
}

fn write_module(module: &ir::Module, output: Option<&Path>) -> anyhow::Result<()> {
    match output {
        Some(path) => module
            .save(path)
            .with_context(|| format!("writing module {}", path.display())),
        None => {
            println!("{}", module.to_json()?);
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// decode
// ---------------------------------------------------------------------------

fn cmd_decode(control: &str) -> anyhow::Result<()> {
    let seeds = codec::decode_global(control).context("decoding control string")?;

    println!("+------------------------------------------+");
    println!("| CONTROL STRING                           |");
    println!("+------------------------------------------+");
    println!("| Decisions      : {:>23} |", seeds.len());
    println!("+------------------------------------------+");

    let mut positions = std::collections::HashMap::new();
    for seed in &seeds {
        let position = positions.entry((seed.kind, seed.function)).or_insert(0u32);
        *position += 1;
        println!(
            "  fn {:>3}  {} pos {:>3}  choice {}",
            seed.function,
            seed.kind.label(),
            position,
            seed.choice()
        );
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// kinds
// ---------------------------------------------------------------------------

fn cmd_kinds() {
    println!("{:>3}  {:<4}  {:<16}  {:>5}  name", "ord", "code", "label", "card");
    for kind in ChoiceKind::ALL {
        let cardinality = kind
            .fixed_cardinality()
            .map_or_else(|| "site".to_string(), |c| c.to_string());
        println!(
            "{:>3}  {:<4}  {:<16}  {:>5}  {kind}",
            kind.ordinal(),
            kind.code(),
            kind.label(),
            cardinality
        );
    }
}
