// Module-specific lints configuration
#![allow(clippy::uninlined_format_args)]

use anyhow::{Context, Result, anyhow};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{Shell, generate};
use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError, info, warn};
use std::fs::File;
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};

use srtweave::app_config::{self, Config, ProviderConnection};
use srtweave::app_controller::Controller;

/// Backend kinds selectable from the command line
#[derive(Debug, Clone, ValueEnum)]
enum CliProvider {
    #[value(name = "openai")]
    OpenAI,
    Anthropic,
    LocalProxy,
    Ollama,
}

impl CliProvider {
    /// Switch `current` to this backend, keeping its URL, key and model when
    /// the kind is unchanged
    fn apply(self, current: ProviderConnection) -> ProviderConnection {
        let key = current.api_key().map(str::to_string);
        match (self, current) {
            (CliProvider::OpenAI, c @ ProviderConnection::OpenAi { .. })
            | (CliProvider::Anthropic, c @ ProviderConnection::Anthropic { .. })
            | (CliProvider::LocalProxy, c @ ProviderConnection::LocalProxy { .. })
            | (CliProvider::Ollama, c @ ProviderConnection::Ollama { .. }) => c,
            (CliProvider::OpenAI, _) => ProviderConnection::openai(key.unwrap_or_default()),
            (CliProvider::Anthropic, _) => ProviderConnection::anthropic(key.unwrap_or_default()),
            (CliProvider::LocalProxy, _) => ProviderConnection::default(),
            (CliProvider::Ollama, _) => ProviderConnection::ollama(),
        }
    }
}

/// CLI Wrapper for LogLevel to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliLogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<CliLogLevel> for app_config::LogLevel {
    fn from(cli_level: CliLogLevel) -> Self {
        match cli_level {
            CliLogLevel::Error => app_config::LogLevel::Error,
            CliLogLevel::Warn => app_config::LogLevel::Warn,
            CliLogLevel::Info => app_config::LogLevel::Info,
            CliLogLevel::Debug => app_config::LogLevel::Debug,
            CliLogLevel::Trace => app_config::LogLevel::Trace,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Translate subtitle files (default command)
    Translate(TranslateArgs),

    /// Generate shell completions for srtweave
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Parser, Debug)]
struct TranslateArgs {
    /// Input .srt file or directory to process
    #[arg(value_name = "INPUT_PATH")]
    input_path: PathBuf,

    #[command(flatten)]
    overrides: Overrides,
}

/// Options shared by the default invocation and `translate`
#[derive(clap::Args, Debug, Clone)]
struct Overrides {
    /// Force overwrite of existing output files
    #[arg(short, long)]
    force_overwrite: bool,

    /// Translation backend to use
    #[arg(short, long, value_enum)]
    provider: Option<CliProvider>,

    /// Model name to use for translation
    #[arg(short, long)]
    model: Option<String>,

    /// Source language code (e.g., 'en', 'es', 'fr') or 'auto'
    #[arg(short, long)]
    source_language: Option<String>,

    /// Target language code (e.g., 'en', 'es', 'fr')
    #[arg(short, long)]
    target_language: Option<String>,

    /// Maximum concurrent in-flight batches per file
    #[arg(short = 'j', long)]
    threads: Option<usize>,

    /// Cues per batch
    #[arg(short, long)]
    batch_size: Option<usize>,

    /// Directory for translated files (defaults to next to each input)
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Configuration file path
    #[arg(short, long, default_value = "srtweave.json")]
    config_path: String,

    /// Set logging level
    #[arg(short, long, value_enum)]
    log_level: Option<CliLogLevel>,

    /// Only check that the provider answers, then exit
    #[arg(long)]
    test_connection: bool,
}

/// srtweave - batch subtitle translation with LLMs
///
/// Translates SRT subtitle files through OpenAI-compatible or Anthropic
/// backends, in context-aware batches with bounded concurrency.
#[derive(Parser, Debug)]
#[command(name = "srtweave")]
#[command(version)]
#[command(about = "Batch subtitle translation with LLMs")]
#[command(long_about = "srtweave translates SRT subtitle files in context-aware batches using LLM providers.

EXAMPLES:
    srtweave movie.srt                          # Translate using default config
    srtweave -f movie.srt                       # Force overwrite existing output
    srtweave -p openai -m gpt-4o movie.srt      # Use specific provider and model
    srtweave -s en -t es movie.srt              # Translate from English to Spanish
    srtweave -j 6 -b 40 movie.srt               # 6 parallel batches of 40 cues
    srtweave --log-level debug /subtitles/      # Process a directory with debug logging
    srtweave completions bash > srtweave.bash   # Generate bash completions

CONFIGURATION:
    Configuration is stored in srtweave.json by default. You can specify a different
    config file with --config-path. If the config file doesn't exist, a default one
    will be created automatically.

SUPPORTED PROVIDERS:
    openai       - OpenAI API (requires API key)
    anthropic    - Anthropic API (requires API key)
    local-proxy  - OpenAI-compatible proxy (default: http://localhost:8317/v1)
    ollama       - Local Ollama server (default: llama3.2:3b)")]
struct CommandLineOptions {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Input .srt file or directory to process
    #[arg(value_name = "INPUT_PATH")]
    input_path: Option<PathBuf>,

    #[command(flatten)]
    overrides: Overrides,
}

// @struct: Custom logger implementation
struct CustomLogger {
    level: LevelFilter,
}

impl CustomLogger {
    // @creates: New logger with specified level
    fn new(level: LevelFilter) -> Self {
        CustomLogger { level }
    }

    // @initializes: Global logger
    fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
        log::set_boxed_logger(Box::new(CustomLogger::new(level)))?;
        log::set_max_level(level);
        Ok(())
    }

    // @returns: ANSI color and emoji for a level
    fn decoration(level: Level) -> (&'static str, &'static str) {
        match level {
            Level::Error => ("1;31", "❌"),
            Level::Warn => ("1;33", "🚧"),
            Level::Info => ("1;32", " "),
            Level::Debug => ("1;36", "🔍"),
            Level::Trace => ("1;35", "📋"),
        }
    }
}

impl Log for CustomLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let now = chrono::Local::now().format("%H:%M:%S.%3f");
            let (color, emoji) = Self::decoration(record.level());
            let _ = writeln!(
                std::io::stderr(),
                "\x1B[{}m{} {} {}\x1B[0m",
                color,
                now,
                emoji,
                record.args()
            );
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // The level is lowered or raised once the config is loaded
    CustomLogger::init(LevelFilter::Trace)?;
    log::set_max_level(LevelFilter::Info);

    let cli = CommandLineOptions::parse();

    match cli.command {
        Some(Commands::Completions { shell }) => {
            let mut cmd = CommandLineOptions::command();
            generate(shell, &mut cmd, "srtweave", &mut std::io::stdout());
            Ok(())
        }
        Some(Commands::Translate(args)) => run_translate(args).await,
        None => {
            let input_path = cli.input_path.ok_or_else(|| {
                anyhow!("INPUT_PATH is required when no subcommand is specified")
            })?;
            run_translate(TranslateArgs {
                input_path,
                overrides: cli.overrides,
            })
            .await
        }
    }
}

/// Read the config file, creating a default one when it is missing
fn load_config(config_path: &str) -> Result<Config> {
    if Path::new(config_path).exists() {
        let file = File::open(config_path)
            .with_context(|| format!("Failed to open config file: {}", config_path))?;
        let config: Config = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("Failed to parse config file: {}", config_path))?;
        return Ok(config);
    }

    warn!("Config file not found at '{}', creating default config.", config_path);
    let config = Config::default();
    let config_json = serde_json::to_string_pretty(&config)
        .context("Failed to serialize default config to JSON")?;
    std::fs::write(config_path, config_json)
        .with_context(|| format!("Failed to write default config to file: {}", config_path))?;
    Ok(config)
}

/// Apply command-line overrides on top of the file configuration
fn apply_overrides(mut config: Config, options: &Overrides) -> Config {
    if let Some(provider) = &options.provider {
        config.provider = provider.clone().apply(config.provider);
    }
    if let Some(model) = &options.model {
        config.provider = config.provider.with_model(model.clone());
    }
    if let Some(source_lang) = &options.source_language {
        config.source_language = source_lang.clone();
    }
    if let Some(target_lang) = &options.target_language {
        config.target_language = target_lang.clone();
    }
    if let Some(threads) = options.threads {
        config.threads = threads;
    }
    if let Some(batch_size) = options.batch_size {
        config.batch.batch_size = batch_size;
    }
    if let Some(log_level) = &options.log_level {
        config.log_level = log_level.clone().into();
    }
    config
}

async fn run_translate(args: TranslateArgs) -> Result<()> {
    let options = &args.overrides;
    if let Some(level) = &options.log_level {
        let level: app_config::LogLevel = level.clone().into();
        log::set_max_level(LevelFilter::from(&level));
    }

    let config = apply_overrides(load_config(&options.config_path)?, options);
    config.validate().context("Configuration validation failed")?;
    log::set_max_level(LevelFilter::from(&config.log_level));

    let mut controller = Controller::with_config(config)?;
    if let Some(dir) = &options.output_dir {
        controller = controller.with_output_dir(dir.clone());
    }

    if options.test_connection {
        return controller.test_connection().await;
    }

    if args.input_path.is_file() {
        if let Some(job) = controller.run(args.input_path.clone(), options.force_overwrite).await? {
            info!(
                "{}: {}/{} cues translated, {} failed batch(es)",
                job.status, job.done_cues, job.total_cues, job.failed_batches
            );
        }
    } else if args.input_path.is_dir() {
        let summary = controller
            .run_folder(args.input_path.clone(), options.force_overwrite)
            .await?;
        if summary.failed > 0 {
            return Err(anyhow!("{} file(s) failed to translate", summary.failed));
        }
    } else {
        return Err(anyhow!("Input path does not exist: {:?}", args.input_path));
    }

    Ok(())
}
