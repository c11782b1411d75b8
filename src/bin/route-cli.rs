use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use serde_json::json;

use kv_route_proxy::cli::{
    add_route, delete_route, parse_metadata_pair, read_document_file, search_routes, update_route,
    write_document_file, NewRoute, RouteChanges, RouteConfigService,
};
use kv_route_proxy::config::{self, ProxySettings, SettingsOverrides, StoreBackend};
use kv_route_proxy::document::{validate_document, ConfigurationDocument, ImportStrategy, RouteEntry};
use kv_route_proxy::observability::logging;
use kv_route_proxy::store::connect_store;

#[derive(Parser)]
#[command(name = "route-cli")]
#[command(about = "Manage the routing document of kv-route-proxy", long_about = None)]
struct Cli {
    /// Settings file shared with the proxy (TOML)
    #[arg(short, long, env = "PROXY_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[arg(long, env = "PROXY_STORE_BACKEND", global = true)]
    store: Option<StoreBackend>,

    #[arg(long, env = "PROXY_NATS_URL", global = true)]
    nats_url: Option<String>,

    #[arg(long, env = "PROXY_BUCKET", global = true)]
    bucket: Option<String>,

    #[arg(long, env = "PROXY_KEY", global = true)]
    key: Option<String>,

    #[arg(long, env = "PROXY_FILE", global = true)]
    file: Option<PathBuf>,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    /// Log store traffic to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List routes, optionally filtered
    List {
        /// Case-insensitive match on id, hosts, path or cluster
        #[arg(short, long)]
        search: Option<String>,
    },
    /// Show one route with its cluster
    Show { route_id: String },
    /// Add a route and its cluster
    Add(AddArgs),
    /// Change an existing route
    Update(UpdateArgs),
    /// Delete a route and its cluster
    Delete { route_id: String },
    /// Write the stored document to a file
    Export { file: PathBuf },
    /// Combine a document file with the stored document
    Import {
        file: PathBuf,
        #[arg(long, default_value = "merge")]
        strategy: ImportStrategy,
    },
    /// Validate a document file, or the stored document
    Validate { file: Option<PathBuf> },
}

#[derive(Args)]
struct AddArgs {
    /// Host to match; repeat for several. None matches any host.
    #[arg(long = "host")]
    hosts: Vec<String>,

    /// Path template, catch-all when omitted
    #[arg(long)]
    path: Option<String>,

    /// Absolute destination URL; repeat for several
    #[arg(long = "destination", required = true)]
    destinations: Vec<String>,

    /// Redirect www.<host> to <host>
    #[arg(long)]
    redirect_www: bool,

    /// Forward the client's Host header unchanged
    #[arg(long)]
    original_host_header: bool,

    /// Extra metadata as KEY=VALUE
    #[arg(long = "meta", value_parser = parse_meta)]
    metadata: Vec<(String, String)>,
}

#[derive(Args)]
struct UpdateArgs {
    route_id: String,

    /// Replace the hosts; repeat for several
    #[arg(long = "host", conflicts_with = "any_host")]
    hosts: Vec<String>,

    /// Match any host
    #[arg(long)]
    any_host: bool,

    #[arg(long)]
    path: Option<String>,

    /// Replace the destinations; repeat for several
    #[arg(long = "destination")]
    destinations: Vec<String>,

    #[arg(long)]
    redirect_www: Option<bool>,

    #[arg(long)]
    original_host_header: Option<bool>,

    #[arg(long = "meta", value_parser = parse_meta)]
    metadata: Vec<(String, String)>,

    #[arg(long = "remove-meta")]
    remove_metadata: Vec<String>,
}

fn parse_meta(pair: &str) -> Result<(String, String), String> {
    parse_metadata_pair(pair).ok_or_else(|| format!("expected KEY=VALUE, got '{pair}'"))
}

impl Cli {
    fn settings(&self) -> anyhow::Result<ProxySettings> {
        let overrides = SettingsOverrides {
            store_backend: self.store,
            nats_url: self.nats_url.clone(),
            bucket: self.bucket.clone(),
            key: self.key.clone(),
            file_path: self.file.clone(),
            ..Default::default()
        };
        Ok(config::resolve_settings(self.config.as_deref(), &overrides)?)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    logging::init_cli_logging(cli.verbose);

    // Validating a file needs no store.
    if let Commands::Validate { file: Some(path) } = &cli.command {
        let document = read_document_file(path)?;
        return Ok(report_validation(&document, cli.json));
    }

    let settings = cli.settings().context("invalid settings")?;
    let store = connect_store(&settings.store)
        .await
        .context("could not connect to the config store")?;
    let service = RouteConfigService::new(store, settings.store.key.clone());

    match cli.command {
        Commands::List { search } => {
            let document = service.load_config().await?;
            let routes = search_routes(&document, search.as_deref().unwrap_or(""));
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&routes)?);
            } else {
                print_route_table(&document, &routes);
            }
        }
        Commands::Show { route_id } => {
            let document = service.load_config().await?;
            let Some(route) = document.route(&route_id) else {
                bail!("route '{route_id}' not found");
            };
            let cluster = document.cluster(&route.cluster_id);
            if cli.json {
                let out = json!({ "Route": route, "Cluster": cluster });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                print_route_details(route, &document);
            }
        }
        Commands::Add(args) => {
            let document = service.load_config().await?;
            let new_route = NewRoute {
                hosts: args.hosts,
                path: args.path,
                destinations: args.destinations,
                redirect_www: args.redirect_www,
                use_original_host_header: args.original_host_header,
                metadata: args.metadata,
            };
            let (updated, id) = add_route(&document, new_route)?;
            service.save_config(&updated).await?;
            report(cli.json, "added", &id);
        }
        Commands::Update(args) => {
            let document = service.load_config().await?;
            let hosts = if args.any_host {
                Some(Vec::new())
            } else if args.hosts.is_empty() {
                None
            } else {
                Some(args.hosts)
            };
            let changes = RouteChanges {
                hosts,
                path: args.path,
                destinations: (!args.destinations.is_empty()).then_some(args.destinations),
                redirect_www: args.redirect_www,
                use_original_host_header: args.original_host_header,
                set_metadata: args.metadata,
                remove_metadata: args.remove_metadata,
            };
            let updated = update_route(&document, &args.route_id, changes)?;
            service.save_config(&updated).await?;
            report(cli.json, "updated", &args.route_id);
        }
        Commands::Delete { route_id } => {
            let document = service.load_config().await?;
            let updated = delete_route(&document, &route_id)?;
            service.save_config(&updated).await?;
            report(cli.json, "deleted", &route_id);
        }
        Commands::Export { file } => {
            let document = service.load_config().await?;
            write_document_file(&file, &document)?;
            if cli.json {
                println!("{}", json!({ "exported": file, "routes": document.routes.len(), "clusters": document.clusters.len() }));
            } else {
                println!(
                    "Exported {} routes and {} clusters to {}",
                    document.routes.len(),
                    document.clusters.len(),
                    file.display()
                );
            }
        }
        Commands::Import { file, strategy } => {
            let incoming = read_document_file(&file)?;
            let combined = service.import(&incoming, strategy).await?;
            if cli.json {
                println!("{}", json!({ "strategy": strategy.to_string(), "routes": combined.routes.len(), "clusters": combined.clusters.len() }));
            } else {
                println!(
                    "Imported {} ({strategy}): now {} routes and {} clusters",
                    file.display(),
                    combined.routes.len(),
                    combined.clusters.len()
                );
            }
        }
        Commands::Validate { file: _ } => {
            let document = service.load_config().await?;
            return Ok(report_validation(&document, cli.json));
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn report(json: bool, action: &str, route_id: &str) {
    if json {
        println!("{}", json!({ "action": action, "route_id": route_id }));
    } else {
        println!("Route {route_id} {action}");
    }
}

fn report_validation(document: &ConfigurationDocument, json: bool) -> ExitCode {
    let violations = validate_document(document).err().unwrap_or_default();
    if json {
        let out = json!({
            "valid": violations.is_empty(),
            "violations": violations
                .iter()
                .map(|v| json!({ "rule": v.kind(), "message": v.to_string() }))
                .collect::<Vec<_>>(),
        });
        println!("{out}");
    } else if violations.is_empty() {
        println!(
            "Configuration is valid ({} routes, {} clusters)",
            document.routes.len(),
            document.clusters.len()
        );
    } else {
        for violation in &violations {
            println!("{:<24} {violation}", violation.kind());
        }
    }

    if violations.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn format_hosts(route: &RouteEntry) -> String {
    if route.hosts.is_empty() {
        "*".to_string()
    } else {
        route.hosts.join(", ")
    }
}

fn first_destination(document: &ConfigurationDocument, route: &RouteEntry) -> String {
    document
        .cluster(&route.cluster_id)
        .and_then(|c| c.destinations.values().next())
        .map(|d| d.address.clone())
        .unwrap_or_else(|| "N/A".to_string())
}

fn print_route_table(document: &ConfigurationDocument, routes: &[&RouteEntry]) {
    if routes.is_empty() {
        println!("No routes found");
        return;
    }

    let rows: Vec<[String; 5]> = routes
        .iter()
        .map(|r| {
            [
                r.id.clone(),
                format_hosts(r),
                r.path.clone(),
                r.cluster_id.clone(),
                first_destination(document, r),
            ]
        })
        .collect();
    let header = ["ROUTE", "HOSTS", "PATH", "CLUSTER", "DESTINATION"];

    let mut widths = header.map(str::len);
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.len());
        }
    }

    let line = |cells: [&str; 5]| {
        cells
            .iter()
            .zip(widths)
            .map(|(cell, width)| format!("{cell:<width$}"))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };
    println!("{}", line(header));
    for row in &rows {
        println!("{}", line([&row[0], &row[1], &row[2], &row[3], &row[4]].map(String::as_str)));
    }
    println!("\n{} of {} routes", routes.len(), document.routes.len());
}

fn print_route_details(route: &RouteEntry, document: &ConfigurationDocument) {
    println!("Route:        {}", route.id);
    println!("Hosts:        {}", format_hosts(route));
    println!("Path:         {}", route.path);
    println!("Cluster:      {}", route.cluster_id);
    match document.cluster(&route.cluster_id) {
        Some(cluster) => {
            for (name, destination) in &cluster.destinations {
                println!("Destination:  {name} = {}", destination.address);
            }
        }
        None => println!("Destination:  N/A (cluster missing)"),
    }
    for (key, value) in &route.metadata {
        println!("Metadata:     {key} = {value}");
    }
}
