use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;
use tracelens::config::Config;
use tracelens::context::{load_file_tree, RepoContext};
use tracelens::diagnose::{classify, AnalysisRequest, Analyzer, Language, Provider};
use tracelens::history::{HistoryEntry, HistoryStore};
use tracelens::report;
use tracelens::util::split_headline;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "tracelens",
    about = "Turn a runtime error into a structured diagnosis",
    version
)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Analyze an error and suggest fixes
    Analyze(AnalyzeArgs),
    /// Print the locally computed severity of an error
    Classify(ErrorInput),
    /// Show or clear past analyses
    History {
        /// Number of entries to show
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
        /// Delete all recorded analyses
        #[arg(long)]
        clear: bool,
        /// Print entries as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show or change configuration
    Config {
        /// Print the current configuration
        #[arg(long)]
        show: bool,
        /// Store an API key for the configured provider in the system keychain
        #[arg(long, value_name = "KEY")]
        set_key: Option<String>,
        /// Reasoning service to use (openrouter, gemini)
        #[arg(long)]
        provider: Option<String>,
        /// Model id to request
        #[arg(long)]
        model: Option<String>,
        /// Endpoint override
        #[arg(long)]
        api_base: Option<String>,
    },
}

#[derive(Args, Debug)]
struct ErrorInput {
    /// Error text (reads stdin when neither --error nor --error-file is given)
    #[arg(short, long, conflicts_with = "error_file")]
    error: Option<String>,

    /// File containing the error and stack trace
    #[arg(long, value_name = "PATH")]
    error_file: Option<PathBuf>,
}

impl ErrorInput {
    fn read(&self) -> Result<String> {
        let text = if let Some(text) = &self.error {
            text.clone()
        } else if let Some(path) = &self.error_file {
            std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?
        } else if !io::stdin().is_terminal() {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read error text from stdin")?;
            buf
        } else {
            bail!("No error text given. Pass --error, --error-file, or pipe it on stdin.");
        };
        Ok(text)
    }
}

#[derive(Args, Debug)]
struct AnalyzeArgs {
    #[command(flatten)]
    input: ErrorInput,

    /// Language the error comes from
    #[arg(short, long)]
    language: String,

    /// Comma-separated tech stack (detected from --repo when omitted)
    #[arg(long, value_delimiter = ',')]
    stack: Vec<String>,

    /// Local checkout to take the file tree and stack from
    #[arg(long, value_name = "DIR")]
    repo: Option<PathBuf>,

    /// JSON array of repository paths exported by another tool
    #[arg(long, value_name = "PATH")]
    tree_file: Option<PathBuf>,

    /// Source file with the code around the failure
    #[arg(long, value_name = "PATH")]
    code_file: Option<PathBuf>,

    /// Print the analysis as JSON
    #[arg(long)]
    json: bool,

    /// Do not record this analysis in the local history
    #[arg(long)]
    no_history: bool,
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "tracelens=debug",
        _ => "tracelens=trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Analyze(args) => run_analyze(args).await,
        Command::Classify(input) => {
            let (headline, trace) = split_headline(&input.read()?);
            let severity = classify(&headline, trace.as_deref(), None);
            println!("{}", report::render_severity(severity));
            Ok(())
        }
        Command::History { limit, clear, json } => run_history(limit, clear, json),
        Command::Config {
            show,
            set_key,
            provider,
            model,
            api_base,
        } => run_config(show, set_key, provider, model, api_base),
    }
}

async fn run_analyze(args: AnalyzeArgs) -> Result<()> {
    let config = Config::load();
    let settings = config.pipeline_settings()?;
    let analyzer = Analyzer::from_settings(&settings);
    if !analyzer.is_configured() {
        warn!(
            "no API key for {}; set {} or run `tracelens config --set-key`",
            settings.provider,
            settings.provider.key_env_var()
        );
    }

    let language = Language::from_name(&args.language);
    if language == Language::Unknown {
        warn!(
            "unrecognized language `{}`; repository files will not be used as candidates",
            args.language
        );
    }

    let mut context = match &args.repo {
        Some(dir) => RepoContext::scan(dir)?,
        None => RepoContext::default(),
    };
    if let Some(tree_file) = &args.tree_file {
        context.file_tree = load_file_tree(tree_file)?;
    }

    let tech_stack = if !args.stack.is_empty() {
        args.stack.clone()
    } else if !context.tech_stack.is_empty() {
        context.tech_stack.clone()
    } else if !config.default_tech_stack.is_empty() {
        config.default_tech_stack.clone()
    } else {
        language.default_stack()
    };
    debug!(?tech_stack, files = context.file_tree.len(), "request context ready");

    let raw_error = args.input.read()?;
    let (headline, trace) = split_headline(&raw_error);
    let mut request = AnalysisRequest::new(headline.clone(), language)
        .with_tech_stack(tech_stack)
        .with_file_tree(context.file_tree);
    if let Some(trace) = trace {
        request = request.with_stack_trace(trace);
    }
    if let Some(code_file) = &args.code_file {
        let code = std::fs::read_to_string(code_file)
            .with_context(|| format!("Failed to read {}", code_file.display()))?;
        request = request.with_code_context(code);
    }

    let result = analyzer.analyze(&request).await?;

    if !args.no_history {
        let recorded = HistoryStore::open_default(config.history_limit).and_then(|store| {
            store.append(HistoryEntry::new(headline, language, result.clone()))
        });
        if let Err(err) = recorded {
            warn!("could not record analysis in history: {:#}", err);
        }
    }

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&result).context("Failed to serialize analysis")?
        );
    } else {
        print!("{}", report::render_analysis(&result));
    }
    Ok(())
}

fn run_history(limit: usize, clear: bool, json: bool) -> Result<()> {
    let config = Config::load();
    let store = HistoryStore::open_default(config.history_limit)?;
    if clear {
        store.clear()?;
        println!("History cleared ({}).", store.path().display());
        return Ok(());
    }
    let entries = store.recent(limit)?;
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&entries).context("Failed to serialize history")?
        );
    } else {
        print!("{}", report::render_history(&entries));
    }
    Ok(())
}

fn run_config(
    show: bool,
    set_key: Option<String>,
    provider: Option<String>,
    model: Option<String>,
    api_base: Option<String>,
) -> Result<()> {
    let mut config = Config::load();
    let mut changed = false;

    if let Some(name) = provider {
        config.provider = Provider::from_name(&name)
            .with_context(|| format!("Unknown provider `{}` (expected openrouter or gemini)", name))?;
        changed = true;
    }
    if let Some(model) = model {
        config.model = Some(model).filter(|m| !m.trim().is_empty());
        changed = true;
    }
    if let Some(base) = api_base {
        config.api_base = Some(base).filter(|b| !b.trim().is_empty());
        changed = true;
    }
    if changed {
        config.pipeline_settings()?;
        config.save()?;
        println!("Saved {}", Config::config_location());
    }

    if let Some(key) = set_key {
        config.set_api_key(&key)?;
        println!("API key for {} stored in the system keychain.", config.provider);
    }

    if show || !changed {
        println!("{}", Config::config_location());
        println!(
            "{}",
            serde_json::to_string_pretty(&config).context("Failed to serialize config")?
        );
        let key_state = if config.api_key().is_some() {
            "configured"
        } else {
            "missing"
        };
        println!("api key: {}", key_state);
    }
    Ok(())
}
