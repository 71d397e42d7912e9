use std::path::Path;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use carik_plugins::application::errors::ExtensionError;
use carik_plugins::application::services::{
    DependencyInstaller, ExtensionManager, InstallOutcome, LifecycleManager,
};
use carik_plugins::domain::entities::{RegistryListing, RegistryStatus};
use carik_plugins::domain::traits::{CodeLoader, Host};
use carik_plugins::infrastructure::cache::ArtifactCache;
use carik_plugins::infrastructure::config::{Config, YamlPluginStore};
use carik_plugins::infrastructure::fetcher::Fetcher;
use carik_plugins::infrastructure::host::ConfigHost;
use carik_plugins::infrastructure::http::ReqwestHttpClient;
use carik_plugins::infrastructure::loader::{entry_extension, DylibLoader, RecordingLoader};
use carik_plugins::infrastructure::process::TokioCommandRunner;
use carik_plugins::infrastructure::registry::RegistryClient;

#[derive(Parser)]
#[command(name = "carik-plugins")]
#[command(about = "Install, update and load carik-bot plugins", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, default_value = "config.yaml")]
    config: String,

    /// Record loads instead of loading plugin libraries
    #[arg(long)]
    dry_run: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Load configured plugins and accept commands on the console
    Run,
    /// Install a plugin by registry name or owner/repo/name[@branch]
    Install { plugin: String },
    /// Remove an installed plugin
    Remove { plugin: String },
    /// Update one plugin, or every configured plugin
    Update { plugin: Option<String> },
    /// List loaded plugins
    Loaded,
    /// Browse the plugin registry
    Registry { name: Option<String> },
    /// Show version
    Version,
    /// Generate default config
    InitConfig,
}

fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Version => {
            println!("carik-plugins v{}", env!("CARGO_PKG_VERSION"));
            return;
        }
        Commands::InitConfig => {
            init_config();
            return;
        }
        _ => {}
    }

    let config = load_config(&cli.config);
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!("Failed to start runtime: {}", e);
            std::process::exit(1);
        }
    };

    let code = runtime.block_on(async move {
        let manager = match build_manager(&config, cli.dry_run) {
            Ok(manager) => Arc::new(manager),
            Err(e) => {
                tracing::error!("Failed to initialize extension manager: {}", e);
                return 1;
            }
        };

        if let Err(e) = manager.registry().refresh().await {
            tracing::warn!("Failed to fetch plugin registry: {}", e);
        }

        match cli.command {
            Commands::Run => run_console(manager).await,
            command => {
                if let Err(e) = manager.startup().await {
                    tracing::error!("Startup failed: {}", e);
                    return 1;
                }
                match execute(&manager, command).await {
                    Ok(output) => {
                        println!("{}", output);
                        0
                    }
                    Err(e) => {
                        eprintln!("Error: {}", e);
                        1
                    }
                }
            }
        }
    });

    std::process::exit(code);
}

fn load_config(path: &str) -> Config {
    if !Path::new(path).exists() {
        return Config::load_env();
    }

    match Config::load(path) {
        Ok(mut config) => {
            config.apply_env();
            config
        }
        Err(e) => {
            tracing::warn!("Failed to load config: {}, using defaults", e);
            Config::load_env()
        }
    }
}

fn build_manager(config: &Config, dry_run: bool) -> Result<ExtensionManager, ExtensionError> {
    let host: Arc<dyn Host> = Arc::new(ConfigHost::from_config(config)?);
    let http = Arc::new(ReqwestHttpClient::new(config.plugins.http_timeout_secs)?);
    let loader: Arc<dyn CodeLoader> = if dry_run {
        Arc::new(RecordingLoader::new())
    } else {
        Arc::new(DylibLoader::new())
    };

    let registry = Arc::new(RegistryClient::new(
        config.plugins.registry_url.clone(),
        http.clone(),
    ));
    let fetcher = Fetcher::new(
        &config.plugins.directory,
        config.plugins.archive_host.clone(),
        http,
        ArtifactCache::new(&config.plugins.cache_directory),
    );
    let dependencies = DependencyInstaller::new(
        Arc::new(TokioCommandRunner::new(config.dependencies.timeout_secs)),
        loader.clone(),
        config.dependencies.manifest.clone(),
        config.dependencies.program.clone(),
        config.dependencies.args.clone(),
    )
    .with_package_dir(config.dependencies.package_dir.clone());
    let lifecycle = LifecycleManager::new(loader, host.clone(), entry_extension());
    let store = Arc::new(YamlPluginStore::new(&config.plugins.state_file));

    Ok(ExtensionManager::new(
        host,
        registry,
        fetcher,
        dependencies,
        lifecycle,
        store,
    ))
}

async fn execute(manager: &ExtensionManager, command: Commands) -> Result<String, ExtensionError> {
    match command {
        Commands::Install { plugin } => match manager.install(&plugin).await? {
            InstallOutcome::Loaded(plugin) => Ok(format!(
                "Successfully installed {}.\nPlugins have full control over the bot, only install plugins from developers you trust.",
                plugin
            )),
            InstallOutcome::InstalledNotLoaded(plugin) => Ok(format!(
                "Installed {}, but it is not loaded because plugin loading is disabled.\nSet ENABLE_PLUGINS=true and restart to load it.",
                plugin
            )),
        },
        Commands::Remove { plugin } => {
            let plugin = manager.remove(&plugin).await?;
            Ok(format!("Uninstalled {}.", plugin))
        }
        Commands::Update { plugin: Some(plugin) } => {
            let plugin = manager.update(&plugin).await?;
            Ok(format!("Updated {}.", plugin.name))
        }
        Commands::Update { plugin: None } => {
            let reports = manager.update_all().await?;
            if reports.is_empty() {
                return Ok("No plugins are installed.".to_string());
            }
            let lines: Vec<String> = reports
                .into_iter()
                .map(|report| match report.result {
                    Ok(plugin) => format!("updated  {}", plugin),
                    Err(e) => format!("failed   {}: {}", report.plugin, e),
                })
                .collect();
            Ok(lines.join("\n"))
        }
        Commands::Loaded => {
            let loaded = manager.list_loaded()?;
            if loaded.is_empty() {
                return Ok("There are no plugins currently loaded.".to_string());
            }
            let lines: Vec<String> = loaded.iter().map(|plugin| plugin.to_string()).collect();
            Ok(format!("Loaded plugins:\n{}", lines.join("\n")))
        }
        Commands::Registry { name: Some(name) } => {
            let listing = manager.registry_entry(&name).await?;
            Ok(describe(&listing, manager.fetcher().archive_host()))
        }
        Commands::Registry { name: None } => {
            let listings = manager.registry_listing().await?;
            let lines: Vec<String> = listings
                .iter()
                .map(|listing| {
                    let marker = match listing.status {
                        RegistryStatus::Loaded => " [loaded]",
                        RegistryStatus::RequiresVersion(_) => " [needs newer bot]",
                        RegistryStatus::Installable => "",
                    };
                    let description = listing.entry.description.replace('\n', " ");
                    format!("{} - {}{}", listing.entry.short_name, description, marker)
                })
                .collect();
            Ok(lines.join("\n"))
        }
        Commands::Run | Commands::Version | Commands::InitConfig => Ok(String::new()),
    }
}

fn describe(listing: &RegistryListing, archive_host: &str) -> String {
    let entry = &listing.entry;
    let mut text = format!(
        "{} ({})\n{}",
        entry.title.as_deref().unwrap_or(&entry.short_name),
        entry.repository,
        entry.description
    );
    if let Ok(plugin) = entry.plugin_ref() {
        text.push_str(&format!("\n{}", plugin.link(archive_host)));
    }
    text.push_str(&format!("\nInstall with: install {}\n", entry.short_name));
    text.push_str(match &listing.status {
        RegistryStatus::Loaded => "This plugin is currently loaded.",
        RegistryStatus::Installable => "Your bot is able to install this plugin.",
        RegistryStatus::RequiresVersion(_) => "Your bot is unable to install this plugin.",
    });
    if let RegistryStatus::RequiresVersion(version) = &listing.status {
        text.push_str(&format!(" Minimum required version is v{}.", version));
    }
    text
}

/// Serve console commands while the startup pass runs in the background
async fn run_console(manager: Arc<ExtensionManager>) -> i32 {
    let startup = {
        let manager = manager.clone();
        tokio::spawn(async move {
            match manager.startup().await {
                Ok(report) => tracing::info!(
                    "Startup finished: {} loaded, {} failed",
                    report.loaded.len(),
                    report.failed.len()
                ),
                Err(e) => tracing::error!("Startup failed: {}", e),
            }
        })
    };

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        let _ = stdout.write_all(b"> ").await;
        let _ = stdout.flush().await;

        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::error!("Failed to read input: {}", e);
                break;
            }
        };

        let mut words = line.split_whitespace();
        let command = match (words.next(), words.next()) {
            (None, _) => continue,
            (Some("quit" | "exit"), _) => break,
            (Some("add" | "install"), Some(plugin)) => Commands::Install {
                plugin: plugin.to_string(),
            },
            (Some("remove" | "del"), Some(plugin)) => Commands::Remove {
                plugin: plugin.to_string(),
            },
            (Some("update"), plugin) => Commands::Update {
                plugin: plugin.map(str::to_string),
            },
            (Some("loaded"), _) => Commands::Loaded,
            (Some("registry"), name) => Commands::Registry {
                name: name.map(str::to_string),
            },
            _ => {
                println!("Commands: add <plugin>, remove <plugin>, update [plugin], loaded, registry [name], quit");
                continue;
            }
        };

        match execute(&manager, command).await {
            Ok(output) => println!("{}", output),
            Err(e) => println!("Error: {}", e),
        }
    }

    startup.abort();
    0
}

fn init_config() {
    match serde_yaml::to_string(&Config::default()) {
        Ok(yaml) => {
            println!("{}", yaml);
            println!("\nSave this to config.yaml and adjust as needed.");
        }
        Err(e) => eprintln!("Failed to render config: {}", e),
    }
}
