//! evc: eduVPN client engine console
//!
//! Loads a catalog snapshot, queries it, and walks the connection
//! lifecycle against an in-memory console host.

mod console;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use console::{ConsoleHost, HostEvent};
use crossbeam_channel::Receiver;
use evc_core::{
    ConnectAttempt, Engine, EngineConfig, HostCallbacks, OrganizationList, ProxyDescriptor,
    ResolvedServer, ServerList, ServerType, TokenBlob,
};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

// Use mimalloc as the global allocator for reduced memory fragmentation
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// eduVPN client engine console
#[derive(Parser)]
#[command(name = "evc")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Catalog snapshot (JSON with `organizations` and `servers`)
    #[arg(short = 'C', long, default_value = "catalog.json")]
    catalog: PathBuf,

    /// Engine configuration (.toml or .json)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List or search organizations
    Orgs {
        /// Search query
        #[arg(short, long)]
        search: Option<String>,
    },

    /// List or search servers
    Servers {
        #[arg(short, long)]
        search: Option<String>,
    },

    /// Resolve a server and print the selected profile
    Resolve {
        #[command(flatten)]
        target: Target,

        /// Redirect URI for the authorization URL
        #[arg(long, default_value = "http://127.0.0.1:8000/callback")]
        return_to: String,
    },

    /// Run a connection lifecycle against the console host
    Simulate {
        #[command(flatten)]
        target: Target,

        /// Secure internet country to switch to first
        #[arg(long)]
        location: Option<String>,

        /// Fail the attempt with this reason instead of connecting
        #[arg(long)]
        fail: Option<String>,

        /// Hand a proxy descriptor to the host while connecting
        #[arg(long)]
        proxy_fd: Option<i32>,

        /// Run the dropped-connection monitor once connected
        #[arg(long)]
        monitor: bool,

        /// Simulate a link that receives nothing
        #[arg(long)]
        stalled: bool,
    },
}

/// Which server to use
#[derive(Args)]
struct Target {
    /// Organization id (its secure internet home is used)
    #[arg(long)]
    org: Option<String>,

    /// Server type: institute_access, secure_internet or custom
    #[arg(long = "type")]
    server_type: Option<ServerType>,

    /// Server identifier
    #[arg(long)]
    id: Option<String>,

    /// Profile to select
    #[arg(long)]
    profile: Option<String>,
}

/// On-disk catalog snapshot
#[derive(Debug, Default, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    organizations: OrganizationList,
    #[serde(default)]
    servers: ServerList,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = match &cli.config {
        Some(path) => EngineConfig::from_file(path)
            .with_context(|| format!("Failed to load config {:?}", path))?,
        None => EngineConfig::default(),
    };
    let catalog = load_catalog(&cli.catalog)?;

    let stalled = matches!(cli.command, Commands::Simulate { stalled: true, .. });
    let (host, events) = ConsoleHost::new(if stalled { 0 } else { 1500 });
    let engine = Engine::init(config, HostCallbacks::from_host(Arc::new(host)))
        .context("Failed to initialize engine")?;

    ingest(&engine, catalog)?;
    drain(&events, cli.verbose);

    let result = run(&engine, &events, cli.command).await;
    drain(&events, true);
    engine.shutdown().context("Engine shutdown failed")?;
    result
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

fn load_catalog(path: &Path) -> Result<CatalogFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read catalog {:?}", path))?;
    parse_catalog(&content).with_context(|| format!("Invalid catalog {:?}", path))
}

fn parse_catalog(content: &str) -> Result<CatalogFile> {
    Ok(serde_json::from_str(content)?)
}

fn ingest(engine: &Engine, catalog: CatalogFile) -> Result<()> {
    // Version 0 is what the engine starts with, so it cannot be committed
    if catalog.organizations.version > 0 {
        engine
            .replace_organizations(catalog.organizations)
            .context("Organization list rejected")?;
    }
    if catalog.servers.version > 0 {
        engine
            .replace_servers(catalog.servers)
            .context("Server list rejected")?;
    }
    info!(
        "Catalog loaded: {} organizations, {} servers",
        engine.current_organizations().len(),
        engine.current_servers().len()
    );
    Ok(())
}

async fn run(engine: &Engine, events: &Receiver<HostEvent>, command: Commands) -> Result<()> {
    match command {
        Commands::Orgs { search } => {
            for org in engine.search_organizations(search.as_deref().unwrap_or("")) {
                let home = org.secure_internet_home().unwrap_or("-");
                println!("{:<24} {:<40} {}", org.org_id(), org.display_name(), home);
            }
            Ok(())
        }
        Commands::Servers { search } => {
            for server in engine.search_servers(search.as_deref().unwrap_or("")) {
                println!(
                    "{:<16} {:<40} {:<24} {}",
                    server.server_type.as_str(),
                    server.identifier,
                    server.display_name,
                    server.profiles.len()
                );
            }
            Ok(())
        }
        Commands::Resolve { target, return_to } => {
            let resolved = resolve(engine, &target)?;
            print_resolved(&resolved);
            println!("authorize:  {}", resolved.authorization_url(&return_to));
            Ok(())
        }
        Commands::Simulate {
            target,
            location,
            fail,
            proxy_fd,
            monitor,
            stalled: _,
        } => {
            if let Some(code) = location {
                engine.set_secure_location(&code)?;
            }
            simulate(engine, events, &target, fail, proxy_fd, monitor).await
        }
    }
}

fn resolve(engine: &Engine, target: &Target) -> Result<ResolvedServer> {
    let resolved = match (&target.org, target.server_type, &target.id) {
        (Some(org), None, None) => engine.resolve_organization(org)?,
        (None, Some(server_type), Some(id)) => engine.resolve(server_type, id)?,
        _ => bail!("Pass either --org, or --type together with --id"),
    };
    match &target.profile {
        Some(profile) => {
            let organization = resolved.organization.clone();
            let mut selected =
                engine.select_profile(resolved.server_type(), resolved.identifier(), profile)?;
            selected.organization = organization;
            Ok(selected)
        }
        None => Ok(resolved),
    }
}

fn connect(engine: &Engine, target: &Target) -> Result<ConnectAttempt> {
    let profile = target.profile.as_deref();
    let attempt = match (&target.org, target.server_type, &target.id) {
        (Some(org), None, None) => engine.connect_organization(org, profile)?,
        (None, Some(server_type), Some(id)) => engine.connect(server_type, id, profile)?,
        _ => bail!("Pass either --org, or --type together with --id"),
    };
    Ok(attempt)
}

async fn simulate(
    engine: &Engine,
    events: &Receiver<HostEvent>,
    target: &Target,
    fail: Option<String>,
    proxy_fd: Option<i32>,
    monitor: bool,
) -> Result<()> {
    let attempt = connect(engine, target)?;
    print_resolved(&attempt.server);
    drain(events, true);

    if attempt.token.is_none() {
        info!("No stored token, pretending to authorize");
        engine.store_token(
            attempt.server.server_type(),
            attempt.server.identifier(),
            &TokenBlob::from("simulated-token"),
        )?;
    }
    if let Some(fd) = proxy_fd {
        engine.proxy_ready(ProxyDescriptor::new(fd))?;
    }
    drain(events, true);

    if let Some(reason) = fail {
        engine.connection_failed(&reason)?;
        engine.acknowledge_failure()?;
        drain(events, true);
        return Ok(());
    }

    engine.connection_established()?;
    drain(events, true);

    if monitor {
        let dropped = engine.drop_monitor()?.run().await?;
        if dropped {
            warn!("Connection looks dropped");
        }
        println!("dropped:    {}", dropped);
    }
    println!("rx bytes:   {}", engine.rx_bytes()?);

    engine.disconnect()?;
    engine.teardown_complete()?;
    drain(events, true);
    Ok(())
}

fn print_resolved(resolved: &ResolvedServer) {
    println!("server:     {} ({})", resolved.identifier(), resolved.server_type());
    println!("name:       {}", resolved.server.display_name);
    match &resolved.profile {
        Some(profile) => println!(
            "profile:    {} [{}]{}",
            profile.id,
            resolved.profile_index,
            if profile.default_gateway { " default gateway" } else { "" }
        ),
        None => println!("profile:    -"),
    }
    if !resolved.server.country_code.is_empty() {
        println!("location:   {}", resolved.server.country_code);
    }
    if resolved.expired {
        println!("expired:    yes");
    }
    for warning in &resolved.warnings {
        println!("warning:    {}", warning);
    }
}

fn drain(events: &Receiver<HostEvent>, show: bool) {
    for event in events.try_iter() {
        if !show {
            continue;
        }
        match event {
            HostEvent::StateChanged { old, new } => println!("state:      {} -> {}", old, new),
            HostEvent::TokenStored { server, server_type } => {
                println!("token:      stored for {} {}", server_type, server)
            }
            HostEvent::ProxyReady(fd) => println!("proxy:      {}", fd),
            HostEvent::ListRefreshed => println!("catalog:    refreshed"),
        }
    }
}
