mod cli;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use log::{debug, error};

use plugweave_core::classloader::InMemoryClassLoaderFactory;
use plugweave_core::kernel::constants::{APP_NAME, APP_VERSION};
use plugweave_core::manifest::FsDocumentLoader;
use plugweave_core::plugin_system::{DefaultPluginManager, PluginManager};
use plugweave_core::{LoaderSettings, Result};

/// Plugweave: plugin descriptor loading and classloader wiring
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct CliArgs {
    /// Settings file (.json, .yaml or .toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory the default plugin and config directories live under
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Extra plugin directory or archive; overrides installed versions
    #[arg(long = "plugin-path", global = true)]
    plugin_paths: Vec<PathBuf>,

    /// Host build number used for compatibility checks
    #[arg(long, global = true)]
    build: Option<String>,

    /// Give content modules their own classloaders
    #[arg(long, global = true)]
    isolate: bool,

    /// Accept plugins that declare no platform module dependency
    #[arg(long, global = true)]
    allow_legacy: bool,

    /// Log more; repeat for debug output
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Load every plugin and print the report (the default)
    Load {
        /// Show each plugin's classloader parents
        #[arg(long)]
        loaders: bool,
    },
    /// Manage plugins
    Plugin {
        #[command(subcommand)]
        command: PluginCommand,
    },
    /// Show what a plugin requires and what requires it
    Deps {
        /// The plugin id
        id: String,
    },
}

#[derive(Subcommand, Debug)]
enum PluginCommand {
    /// List the ids in the disabled plugins file
    Disabled {},
    /// Enable a plugin (persist setting)
    Enable {
        /// The id of the plugin to enable
        id: String,
    },
    /// Disable a plugin (persist setting)
    Disable {
        /// The id of the plugin to disable
        id: String,
    },
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .try_init();
}

fn settings_from(args: &CliArgs) -> Result<LoaderSettings> {
    let mut settings = match (&args.config, &args.root) {
        (Some(path), _) => LoaderSettings::load(path)?,
        (None, Some(root)) => LoaderSettings::with_root(root),
        (None, None) => LoaderSettings::default(),
    };
    settings.apply_env_overrides()?;

    settings.extra_plugin_paths.extend(args.plugin_paths.iter().cloned());
    if let Some(build) = &args.build {
        settings.apply_overrides(|key| (key == plugweave_core::storage::config::ENV_BUILD).then(|| build.clone()))?;
    }
    if args.isolate {
        settings.isolation.enabled = true;
    }
    if args.allow_legacy {
        settings.require_module_dependency = false;
    }
    Ok(settings)
}

async fn run(args: CliArgs) -> Result<ExitCode> {
    let settings = settings_from(&args)?;
    debug!("Settings: {:?}", settings);
    let manager = DefaultPluginManager::new(
        settings,
        Arc::new(FsDocumentLoader::new()),
        Arc::new(InMemoryClassLoaderFactory::new()),
    );

    match args.command.unwrap_or(Commands::Load { loaders: false }) {
        Commands::Load { loaders } => {
            let (set, report) = manager.build_plugin_set().await?;
            cli::print_report(&set, &report, loaders);
        }
        Commands::Deps { id } => {
            manager.load().await?;
            if !manager.is_plugin_enabled(&id).await? {
                eprintln!("Plugin '{}' is not enabled", id);
                return Ok(ExitCode::FAILURE);
            }
            let dependencies = manager.get_plugin_dependencies(&id).await?;
            let dependents = manager.get_dependent_plugins(&id).await?;
            cli::print_relations(&id, &dependencies, &dependents);
        }
        Commands::Plugin { command } => match command {
            PluginCommand::Disabled {} => {
                let ids = manager.state().disabled_ids()?;
                if ids.is_empty() {
                    println!("No plugins disabled.");
                }
                for id in ids {
                    println!("{}", id);
                }
            }
            PluginCommand::Enable { id } => {
                manager.enable_plugin(&id).await?;
                println!("Plugin '{}' enabled.", id);
            }
            PluginCommand::Disable { id } => {
                manager.disable_plugin(&id).await?;
                println!("Plugin '{}' disabled.", id);
            }
        },
    }
    Ok(ExitCode::SUCCESS)
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = CliArgs::parse();
    init_logging(args.verbose);
    debug!("{} {}", APP_NAME, APP_VERSION);

    match run(args).await {
        Ok(code) => code,
        Err(e) => {
            error!("{}", e);
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
