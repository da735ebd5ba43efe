use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use depvet::{
    config::Config,
    error::{exit_codes, Error},
    manifest::{parse_package_arg, Project},
    model::{AggregatedResult, Package},
    orchestrator::{Orchestrator, ScanPhase},
    output::{format_json, print_cli_table, print_decision, print_result, OutputFormat},
    policy::decide,
    prompt,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "depvet")]
#[command(
    author,
    version,
    about = "Vet npm dependencies for malware and known vulnerabilities before installing"
)]
struct Cli {
    /// Use this config file instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging on stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan a project's dependencies and report findings
    Scan {
        /// Project directory containing package.json
        #[arg(short, long, default_value = ".")]
        dir: PathBuf,

        /// Output format (table, json)
        #[arg(short, long)]
        format: Option<String>,

        /// Which dependencies to scan
        #[arg(long, value_enum, default_value_t = Include::All)]
        include: Include,

        /// Write JSON results to file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Vet dependencies plus packages about to be installed; exit 0 means
    /// installation may proceed
    Check {
        /// Packages to be added, as name or name@version
        packages: Vec<String>,

        /// Project directory containing package.json
        #[arg(short, long, default_value = ".")]
        dir: PathBuf,

        /// Confirm an overridable security block without prompting
        #[arg(long)]
        force: bool,

        /// Skip devDependencies
        #[arg(long)]
        prod: bool,
    },

    /// List configured scanners
    ListScanners,

    /// Show or create config file
    Config {
        /// Generate default config file
        #[arg(long)]
        init: bool,

        /// Show config file path
        #[arg(long)]
        path: bool,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Include {
    All,
    Prod,
    Dev,
}

impl Include {
    fn includes_dev(self) -> bool {
        matches!(self, Include::All | Include::Dev)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            let code = e
                .downcast_ref::<Error>()
                .map(Error::exit_code)
                .unwrap_or(exit_codes::ERROR);
            ExitCode::from(code)
        }
    }
}

async fn run(cli: Cli) -> Result<u8> {
    let config_path = cli.config.clone().unwrap_or_else(Config::config_path);
    let config = Config::load_from(&config_path)?;

    init_tracing(cli.verbose || config.ui.verbose);

    match cli.command {
        Commands::Scan {
            dir,
            format,
            include,
            output,
        } => {
            let format_str = format.unwrap_or_else(|| config.ui.default_format.clone());
            let format = OutputFormat::from_str(&format_str).map_err(|e| anyhow::anyhow!(e))?;
            run_scan(config, &dir, format, include, output).await
        }
        Commands::Check {
            packages,
            dir,
            force,
            prod,
        } => run_check(config, &dir, &packages, force, !prod).await,
        Commands::ListScanners => {
            list_scanners(&config);
            Ok(exit_codes::SUCCESS)
        }
        Commands::Config { init, path } => {
            handle_config(&config_path, init, path)?;
            Ok(exit_codes::SUCCESS)
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "depvet=debug,warn" } else { "warn" };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .try_init();
}

async fn run_scan(
    mut config: Config,
    dir: &Path,
    format: OutputFormat,
    include: Include,
    output_file: Option<PathBuf>,
) -> Result<u8> {
    let is_interactive = format == OutputFormat::Table;
    let project = Project::new(dir);
    require_manifest(&project)?;

    prompt::acknowledge_coverage(
        &mut config,
        is_interactive,
        &mut std::io::stdin().lock(),
        &mut std::io::stderr(),
    )?;

    let packages = project.dependencies(include.includes_dev())?;
    if packages.is_empty() {
        if is_interactive {
            println!("No packages to scan.");
        } else {
            print_result(&AggregatedResult::empty(), format)?;
        }
        return Ok(exit_codes::SUCCESS);
    }

    let orchestrator = Orchestrator::from_config(&config);
    if orchestrator.available_scanners().is_empty() {
        warn!("no scanners available, only the blocklist applies");
        if is_interactive {
            eprintln!("warning: No scanners available, only the blocklist is checked");
        }
    }

    let result = scan_packages(&orchestrator, &packages, is_interactive).await?;

    if let Some(path) = output_file {
        std::fs::write(&path, format_json(&result)?)?;
        if is_interactive {
            println!("Results written to: {}", path.display());
        }
    } else {
        print_result(&result, format)?;
    }

    let decision = decide(&result, orchestrator.policy());
    print_decision(&decision);

    if decision.is_blocked() {
        Ok(exit_codes::SECURITY_BLOCK)
    } else {
        Ok(exit_codes::SUCCESS)
    }
}

async fn run_check(
    mut config: Config,
    dir: &Path,
    new_packages: &[String],
    force: bool,
    include_dev: bool,
) -> Result<u8> {
    if !config.scanning.enabled {
        eprintln!("warning: Security scanning is disabled in config");
        return Ok(exit_codes::SUCCESS);
    }

    let project = Project::new(dir);
    if new_packages.is_empty() {
        require_manifest(&project)?;
    }

    prompt::acknowledge_coverage(
        &mut config,
        true,
        &mut std::io::stdin().lock(),
        &mut std::io::stderr(),
    )?;

    let mut packages: Vec<Package> = if project.has_manifest() {
        project.dependencies(include_dev).unwrap_or_else(|e| {
            warn!(error = %e, "could not read project dependencies");
            eprintln!("warning: Could not parse dependencies, scanning new packages only");
            Vec::new()
        })
    } else {
        Vec::new()
    };
    packages.extend(new_packages.iter().map(|arg| parse_package_arg(arg)));

    if packages.is_empty() {
        println!("No packages to scan.");
        return Ok(exit_codes::SUCCESS);
    }

    let orchestrator = Orchestrator::from_config(&config);
    if orchestrator.available_scanners().is_empty() {
        warn!("no scanners available, only the blocklist applies");
        eprintln!("warning: No scanners available, only the blocklist is checked");
    }

    let result = scan_packages(&orchestrator, &packages, true).await?;
    print_cli_table(&result)?;

    let decision = decide(&result, orchestrator.policy());
    print_decision(&decision);

    if !decision.is_blocked() {
        println!();
        println!("OK to install.");
        return Ok(exit_codes::SUCCESS);
    }

    prompt::resolve_block(
        decision,
        force,
        &mut std::io::stdin().lock(),
        &mut std::io::stderr(),
    )?;
    Ok(exit_codes::SUCCESS)
}

fn require_manifest(project: &Project) -> Result<()> {
    if project.has_manifest() {
        return Ok(());
    }
    Err(Error::Manifest {
        path: project.manifest_path().display().to_string(),
        reason: "no package.json found".to_string(),
    }
    .into())
}

async fn scan_packages(
    orchestrator: &Orchestrator,
    packages: &[Package],
    is_interactive: bool,
) -> Result<AggregatedResult> {
    debug!(packages = packages.len(), "starting scan");

    if !is_interactive {
        return Ok(orchestrator.scan(packages).await?);
    }

    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.enable_steady_tick(Duration::from_millis(100));
    pb.set_message(format!("Scanning {} packages...", packages.len()));

    let result = orchestrator
        .scan_with_progress(packages, |name, phase| match phase {
            ScanPhase::Started => pb.set_message(format!("Scanning with {}...", name)),
            ScanPhase::Finished => pb.println(format!("  {} complete", name)),
        })
        .await;

    pb.finish_and_clear();
    Ok(result?)
}

fn list_scanners(config: &Config) {
    let orchestrator = Orchestrator::from_config(config);

    println!("Configured scanners:");
    println!();

    if orchestrator.scanners().is_empty() {
        println!("  (none enabled)");
        return;
    }

    for scanner in orchestrator.scanners() {
        let available = if scanner.is_available() { "yes" } else { "no" };
        let coverage = if scanner.detects_malware() {
            "malware, typosquats, CVEs"
        } else {
            "CVEs"
        };

        println!("  {:<12} [available: {}]", scanner.name(), available);
        println!("  {:<12} Detects: {}", "", coverage);
        println!("  {:<12} Timeout: {}s", "", scanner.timeout().as_secs());
        println!();
    }

    if !config.has_socket_token() {
        println!("Set SOCKET_API_TOKEN to enable malware detection via Socket.dev.");
    }
}

fn handle_config(config_path: &Path, init: bool, show_path: bool) -> Result<()> {
    if show_path {
        println!("{}", config_path.display());
        return Ok(());
    }

    if init {
        if config_path.exists() {
            println!("Config file already exists at: {}", config_path.display());
            return Ok(());
        }

        let config = Config::default();
        config.save_to(config_path)?;
        println!("Created config file at: {}", config_path.display());
        println!();
        println!("Default configuration:");
        println!("{}", Config::generate_default_config());
        return Ok(());
    }

    if config_path.exists() {
        let content = std::fs::read_to_string(config_path)?;
        println!("Config file: {}", config_path.display());
        println!();
        println!("{}", content);
    } else {
        println!("No config file found.");
        println!("Run 'depvet config --init' to create one.");
        println!();
        println!("Config path: {}", config_path.display());
    }

    Ok(())
}
