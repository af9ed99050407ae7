use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use colored::*;
use imagegen::{
    codec,
    config::{AppConfig, DEFAULT_CONFIG_FILE},
    logger::{self, LogLevel, LoggerConfig},
    validation, BatchCoordinator, BatchObserver, GenerationClient, GenerationRequest, ImageGenError,
    ImageModel, ImageSize, Result,
};
use tokio::runtime::Handle;

#[derive(Debug, Parser)]
#[command(name = "imagegen", version, about = "Generate several images from one prompt, concurrently")]
struct Cli {
    /// Config file holding the API key and URL
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run one batch and save every image that comes back
    Generate(GenerateArgs),
    /// Inspect or edit the stored configuration
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Probe the API endpoint with the configured key
    Check,
    /// List supported models and sizes
    Models,
}

#[derive(Debug, Args)]
struct GenerateArgs {
    prompt: String,
    #[arg(short = 'n', long, default_value_t = imagegen::DEFAULT_IMAGES)]
    count: usize,
    #[arg(long, default_value_t = ImageSize::default())]
    size: ImageSize,
    #[arg(long, default_value_t = ImageModel::default())]
    model: ImageModel,
    /// Directory the images are written to
    #[arg(long)]
    out: Option<PathBuf>,
    #[arg(long)]
    api_key: Option<String>,
    #[arg(long)]
    api_url: Option<String>,
}

#[derive(Debug, Subcommand)]
enum ConfigCommand {
    Show,
    SetKey { api_key: String },
    SetUrl { api_url: String },
    Clear,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{} {}", "error:".red().bold(), err);
            std::process::exit(1);
        }
    }
}

async fn run(cli: Cli) -> Result<i32> {
    let env_loaded = dotenv::dotenv().is_ok();

    let level = if cli.verbose { LogLevel::Debug } else { LogLevel::Info };
    logger::init_with_config(LoggerConfig::new().with_level(level).with_file_output("logs"))?;
    logger::log_startup_info(env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
    if env_loaded {
        log::info!("✅ .env file loaded");
    } else {
        log::debug!("No .env file found, using process environment");
    }

    let config = AppConfig::load(&cli.config)?.merge_env();
    logger::log_config_info(&config);

    match cli.command {
        Command::Generate(args) => generate(config, args).await,
        Command::Config(cmd) => configure(config, cmd),
        Command::Check => check(&config).await,
        Command::Models => {
            println!("{}", "Models:".bold());
            for (id, name) in ImageModel::supported_models() {
                println!("  {:<14} {}", id, name);
            }
            println!("{}", "Sizes:".bold());
            for size in ImageSize::ALL {
                println!("  {:<14} {}", size.as_str(), size.label());
            }
            Ok(0)
        }
    }
}

async fn generate(mut config: AppConfig, args: GenerateArgs) -> Result<i32> {
    if let Some(key) = args.api_key {
        config.api_key = Some(key);
    }
    if let Some(url) = args.api_url {
        config.api_url = url;
    }
    if let Some(dir) = args.out {
        config.output_dir = dir;
    }

    let api_key = config
        .api_key()
        .ok_or_else(|| ImageGenError::Config("no API key configured; run `imagegen config set-key <KEY>`".into()))?
        .to_string();

    let request = GenerationRequest::new(args.prompt)
        .with_count(args.count)
        .with_size(args.size)
        .with_model(args.model)
        .with_credentials(api_key, config.api_url().to_string());
    validation::validate_request(&request)?;

    let coordinator = Arc::new(BatchCoordinator::http(Handle::current(), &config));
    let started = Utc::now();
    let handle = coordinator.start(request)?;

    let interrupt = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("\n{}", "Interrupted, waiting for in-flight images...".yellow());
                coordinator.cancel();
            }
        })
    };

    println!(
        "🎨 Generating {} image(s) into {}",
        handle.total(),
        config.output_dir.display()
    );
    let mut sink = SaveToDisk::new(config.output_dir.clone(), started, handle.total());
    let summary = handle.run(&mut sink).await;
    interrupt.abort();

    println!();
    println!(
        "{} {} saved, {} failed",
        "Done:".bold(),
        sink.saved.len().to_string().green(),
        (summary.total() - sink.saved.len()).to_string().red()
    );
    for path in &sink.saved {
        println!("  {}", path.display());
    }

    Ok(if sink.saved.is_empty() { 1 } else { 0 })
}

/// Writes each image as soon as it arrives and keeps a one-line progress
/// bar on stdout.
struct SaveToDisk {
    dir: PathBuf,
    started: DateTime<Utc>,
    total: usize,
    saved: Vec<PathBuf>,
}

impl SaveToDisk {
    fn new(dir: PathBuf, started: DateTime<Utc>, total: usize) -> Self {
        Self {
            dir,
            started,
            total,
            saved: Vec::with_capacity(total),
        }
    }
}

impl BatchObserver for SaveToDisk {
    fn on_progress(&mut self, fraction: f32) {
        let width = self.total.max(1) * 4;
        let filled = (fraction * width as f32).round() as usize;
        print!(
            "\r[{}{}] {:>3.0}%",
            "#".repeat(filled).cyan(),
            "-".repeat(width - filled.min(width)),
            fraction * 100.0
        );
        let _ = io::stdout().flush();
    }

    fn on_image(&mut self, index: usize, base64: &str) {
        let path = self.dir.join(codec::default_file_name(index, self.started));
        match codec::save(base64, &path) {
            Ok(()) => {
                println!("\r✅ Image {} saved to {}", index + 1, path.display());
                self.saved.push(path);
            }
            Err(err) => println!("\r❌ Image {} could not be saved: {}", index + 1, err),
        }
    }

    fn on_error(&mut self, _index: usize, message: &str) {
        println!("\r❌ {}", message.red());
    }

    fn on_finished(&mut self) {}
}

fn configure(mut config: AppConfig, cmd: ConfigCommand) -> Result<i32> {
    match cmd {
        ConfigCommand::Show => {
            println!("Config file: {}", config.config_file.display());
            println!("API URL:     {}", config.api_url());
            println!("API key:     {}", config.masked_api_key());
            println!("Output dir:  {}", config.output_dir.display());
            println!("Timeout:     {}s", config.timeout.as_secs());
        }
        ConfigCommand::SetKey { api_key } => {
            validation::validate_api_key(&api_key)?;
            config.set_api_key(api_key.trim())?;
            println!("✅ API key saved ({})", config.masked_api_key());
        }
        ConfigCommand::SetUrl { api_url } => {
            validation::validate_url(&api_url)?;
            config.set_api_url(api_url.trim())?;
            println!("✅ API URL saved ({})", config.api_url());
        }
        ConfigCommand::Clear => {
            config.clear()?;
            println!("🗑️  Stored configuration cleared");
        }
    }
    Ok(0)
}

async fn check(config: &AppConfig) -> Result<i32> {
    let client = GenerationClient::from_config(config)?;
    println!("🔌 Checking {} ...", client.api_url());
    if client.check_connection().await? {
        println!("{}", "✅ Endpoint reachable".green());
        Ok(0)
    } else {
        println!("{}", "❌ Endpoint answered with an unexpected status".red());
        Ok(1)
    }
}
