use clap::Parser;
use refeval::{CacheConfig, EvalError, Evaluator, EvaluatorConfig};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Resolve $ref / $use / $merge directives in a YAML or JSON document.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Document to evaluate
    document: PathBuf,
    /// File used as the `local` scope
    #[arg(long)]
    local: Option<PathBuf>,
    /// File used as the `global` scope
    #[arg(long)]
    global: Option<PathBuf>,
    /// Evaluator settings (YAML or JSON)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Print JSON instead of YAML
    #[arg(long)]
    json: bool,
    /// Disable the reference cache
    #[arg(long)]
    no_cache: bool,
    /// Log resolution steps to stderr
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if args.verbose { "refeval=debug" } else { "warn" }));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match run(&args) {
        Ok(out) => print!("{out}"),
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    }
}

fn run(args: &Args) -> Result<String, EvalError> {
    let config = match &args.config {
        Some(path) => EvaluatorConfig::from_file(path)?,
        None => EvaluatorConfig {
            cache: CacheConfig::from_env(),
            ..EvaluatorConfig::default()
        },
    };

    let mut builder = Evaluator::builder().config(config);
    if let Some(path) = &args.local {
        builder = builder.local_scope(refeval::load_file(path)?);
    }
    if let Some(path) = &args.global {
        builder = builder.global_scope(refeval::load_file(path)?);
    }
    if args.no_cache {
        builder = builder.without_cache();
    }
    let evaluator = builder.build();

    let out = refeval::eval_file(&args.document, &evaluator)?;
    if args.json {
        Ok(refeval::to_json_string(&out)? + "\n")
    } else {
        refeval::to_yaml_string(&out)
    }
}
