//! Kernel Registry CLI
//!
//! Commands for deploying, binding, freezing and inspecting kernel instances.

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use kernel_registry::{Address, HashScheme, IdentityHash, KernelConfig, KernelRegistry};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "kernel-registry")]
#[command(about = "Versioned, freezable implementation registry")]
struct Cli {
    /// Config file to load (optional)
    #[arg(short, long)]
    config: Option<String>,

    /// Path to kernel registry (overrides config)
    #[arg(short, long)]
    registry: Option<PathBuf>,

    /// Address acting as the caller for mutating commands
    #[arg(long)]
    caller: Option<Address>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new registry directory
    Init,

    /// Deploy a new kernel instance
    Deploy {
        name: String,
        version: String,
        /// Frozen instance to inherit from
        #[arg(short, long)]
        parent: Option<Address>,
    },

    /// Bind a contract name to an implementation
    Add {
        instance: Address,
        contract: String,
        implementation: Address,
    },

    /// Freeze an instance
    Freeze { instance: Address },

    /// Look up the implementation of a contract
    Get { instance: Address, contract: String },

    /// Show details of an instance
    Show { instance: Address },

    /// List all instances
    List,

    /// Compute the identity hash of a name and version
    Hash {
        name: String,
        version: String,
        #[arg(long, value_enum)]
        scheme: Option<SchemeArg>,
    },

    /// Verify record checksums
    Verify {
        /// Instance address, or "all"
        #[arg(default_value = "all")]
        instance: String,
    },

    /// View and manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show the effective configuration as TOML
    Show,
    /// Write the default configuration to a file
    Init {
        #[arg(default_value = "kernel.toml")]
        output: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum SchemeArg {
    Concatenated,
    LengthPrefixed,
}

impl From<SchemeArg> for HashScheme {
    fn from(arg: SchemeArg) -> Self {
        match arg {
            SchemeArg::Concatenated => HashScheme::Concatenated,
            SchemeArg::LengthPrefixed => HashScheme::LengthPrefixed,
        }
    }
}

fn main() {
    let cli = Cli::parse();

    let loaded = match cli.config.as_deref() {
        Some(path) => KernelConfig::load_from(Some(path)),
        None => KernelConfig::load(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Err(e) = run(cli, config) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn open_registry(cli: &Cli, config: &KernelConfig) -> anyhow::Result<KernelRegistry> {
    let path = cli
        .registry
        .clone()
        .unwrap_or_else(|| config.registry_path());
    let registry = KernelRegistry::open(&path, config.registry.clone())
        .with_context(|| format!("opening registry at {}", path.display()))?;
    Ok(registry.with_output(config.output.format))
}

fn caller(cli: &Cli) -> anyhow::Result<Address> {
    match cli.caller {
        Some(caller) if !caller.is_zero() => Ok(caller),
        Some(_) => bail!("--caller must not be the zero address"),
        None => bail!("--caller is required for this command"),
    }
}

fn run(cli: Cli, config: KernelConfig) -> anyhow::Result<()> {
    match &cli.command {
        Commands::Init => {
            let registry = open_registry(&cli, &config)?;
            println!("✅ Registry initialized at {:?}", registry.root());
        }

        Commands::Deploy {
            name,
            version,
            parent,
        } => {
            let caller = caller(&cli)?;
            let mut registry = open_registry(&cli, &config)?;
            let address = registry.deploy(&caller, name, version, *parent)?;
            println!("📦 Deployed {} v{} at {}", name, version, address);
        }

        Commands::Add {
            instance,
            contract,
            implementation,
        } => {
            let caller = caller(&cli)?;
            let mut registry = open_registry(&cli, &config)?;
            let receipt = registry.add_implementation(&caller, instance, contract, *implementation)?;
            for log in &receipt.logs {
                println!("{}", serde_json::to_string(log)?);
            }
        }

        Commands::Freeze { instance } => {
            let caller = caller(&cli)?;
            let mut registry = open_registry(&cli, &config)?;
            registry.freeze(&caller, instance)?;
            println!("🔒 {} is frozen", instance);
        }

        Commands::Get { instance, contract } => {
            let registry = open_registry(&cli, &config)?;
            let kernel = registry
                .get(instance)
                .with_context(|| format!("no kernel instance at {}", instance))?;

            match kernel.resolve(contract) {
                Some(resolution) if resolution.is_inherited() => println!(
                    "{} (inherited from {} v{})",
                    resolution.implementation, resolution.name, resolution.version
                ),
                Some(resolution) => println!("{}", resolution.implementation),
                None => {
                    eprintln!("No implementation for '{}'", contract);
                    std::process::exit(1);
                }
            }
        }

        Commands::Show { instance } => {
            let registry = open_registry(&cli, &config)?;
            let kernel = registry
                .get(instance)
                .with_context(|| format!("no kernel instance at {}", instance))?;
            let record = registry
                .record(instance)
                .with_context(|| format!("no record for {}", instance))?;

            println!("📦 Kernel: {} v{}", kernel.name(), kernel.version());
            println!("👤 Developer: {}", kernel.developer());
            println!("📅 Deployed: {}", record.deployed_at.format("%Y-%m-%d %H:%M:%S"));
            match record.parent {
                Some(parent) => println!("🌳 Parent: {} (depth {})", parent, kernel.depth()),
                None => println!("🌳 Parent: none"),
            }
            println!("🔒 Frozen: {}", kernel.is_frozen());
            println!("🔑 Hash: {}", kernel.hash_with(config.registry.hash_scheme));
            println!();
            println!("📄 Implementations:");
            for (contract, implementation) in kernel.effective_bindings() {
                let marker = if kernel.bindings().contains_key(&contract) {
                    ""
                } else {
                    " (inherited)"
                };
                println!("  {} -> {}{}", contract, implementation, marker);
            }
        }

        Commands::List => {
            let registry = open_registry(&cli, &config)?;
            let instances = registry.instances();

            if instances.is_empty() {
                println!("No kernel instances deployed yet.");
            } else {
                println!("📚 Kernel instances:");
                for (address, kernel) in instances {
                    let marker = if kernel.is_frozen() { " (frozen)" } else { "" };
                    println!(
                        "  {} {} v{} [{} bindings]{}",
                        address,
                        kernel.name(),
                        kernel.version(),
                        kernel.bindings().len(),
                        marker
                    );
                }
            }
        }

        Commands::Hash {
            name,
            version,
            scheme,
        } => {
            let scheme = scheme
                .map(HashScheme::from)
                .unwrap_or(config.registry.hash_scheme);
            println!("{}", IdentityHash::compute(name, version, scheme));
        }

        Commands::Verify { instance } => {
            let registry = open_registry(&cli, &config)?;

            let targets: Vec<Address> = if instance == "all" {
                registry.instances().into_iter().map(|(a, _)| a).collect()
            } else {
                vec![instance.parse()?]
            };

            let mut all_valid = true;
            for address in targets {
                if registry.verify(&address)? {
                    println!("  ✅ {} - valid", address);
                } else {
                    println!("  ❌ {} - INVALID", address);
                    all_valid = false;
                }
            }

            if !all_valid {
                std::process::exit(1);
            }
        }

        Commands::Config { command } => match command {
            ConfigCommands::Show => {
                println!("{}", toml::to_string_pretty(&config)?);
            }
            ConfigCommands::Init { output } => {
                if std::path::Path::new(output).exists() {
                    bail!("{} already exists", output);
                }
                KernelConfig::default().save(output)?;
                println!("✅ Wrote default configuration to {}", output);
            }
        },
    }

    Ok(())
}
