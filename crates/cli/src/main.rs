use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use bridge_compose::{ComposeError, Composer};
use bridge_core::{walk, ResolutionContext};
use bridge_kubehub::{BridgeConfig, KubeClient};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{error, info};

mod catalog;

#[derive(Parser, Debug)]
#[command(name = "bridgectl", version, about = "Compose domain objects from annotated schemas")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    /// Kubernetes namespace (default: BRIDGE_NAMESPACE, else "default")
    #[arg(long = "ns", global = true)]
    namespace: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output { Human, Json }

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the deduplicated fetch plan for a schema
    Plan {
        /// Schema file (JSON or YAML) or `builtin:<name>`
        schema: String,
    },
    /// Print the parsed field descriptors
    Fields {
        schema: String,
    },
    /// Compose one domain object against the cluster
    Compose {
        schema: String,
        /// Name of the object's own backing resource
        target: String,
        /// Instance name available to patterns as {{instanceName}}
        #[arg(long = "instance")]
        instance: Option<String>,
        /// Extra variables, `key=value`
        #[arg(long = "set", value_parser = parse_var)]
        vars: Vec<(String, String)>,
        /// Kubeconfig to connect with; also exposed to `context` fields
        #[arg(long = "kubeconfig")]
        kubeconfig: Option<std::path::PathBuf>,
    },
    /// Print the active kind aliases
    Kinds,
}

fn parse_var(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((k, v)) if !k.trim().is_empty() => Ok((k.trim().to_string(), v.to_string())),
        _ => Err(format!("expected key=value, got `{}`", s)),
    }
}

fn init_tracing() {
    let env = std::env::var("BRIDGE_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_writer(std::io::stderr).init();
}

fn init_metrics() {
    if let Ok(addr) = std::env::var("BRIDGE_METRICS_ADDR") {
        if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => tracing::info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => tracing::warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            tracing::warn!(addr = %addr, "invalid BRIDGE_METRICS_ADDR; expected host:port");
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    init_metrics();
    let cli = Cli::parse();
    let cfg = BridgeConfig::load()?;

    match cli.command {
        Commands::Plan { schema } => {
            let fields = bridge_schema::parse(&catalog::load(&schema)?)?;
            let plan = bridge_compose::plan(&fields);
            info!(schema = %schema, locators = plan.len(), "plan invoked");
            match cli.output {
                Output::Human => {
                    println!("{:<22} {:<48} PATTERNS", "KIND", "LABEL");
                    for loc in &plan {
                        let label = loc.label.as_deref().unwrap_or("-");
                        let patterns = if loc.name_patterns.is_empty() { "-".to_string() } else { loc.name_patterns.join(" ") };
                        println!("{:<22} {:<48} {}", loc.resource_kind, label, patterns);
                    }
                }
                Output::Json => println!("{}", serde_json::to_string_pretty(&plan)?),
            }
        }
        Commands::Fields { schema } => {
            let fields = bridge_schema::parse(&catalog::load(&schema)?)?;
            match cli.output {
                Output::Human => {
                    for f in walk(&fields) {
                        let sources: Vec<String> = f.references.iter().map(|r| {
                            let mut s = r.resource_kind.clone();
                            if !r.path.is_empty() {
                                s.push_str(&format!(":{}", r.path));
                            }
                            s
                        }).collect();
                        let mut flags = Vec::new();
                        if f.required { flags.push("required".to_string()); }
                        if f.is_array { flags.push("array".to_string()); }
                        if let Some(t) = &f.transform { flags.push(t.name().to_string()); }
                        println!("{:<28} {:<60} {}", f.dotted(), sources.join(" | "), flags.join(","));
                    }
                }
                Output::Json => println!("{}", serde_json::to_string_pretty(&fields)?),
            }
        }
        Commands::Compose { schema, target, instance, vars, kubeconfig } => {
            let doc = catalog::load(&schema)?;
            let ns = cli.namespace.clone().unwrap_or_else(|| cfg.namespace_or_default().to_string());
            let kinds = cfg.registry()?;
            let mut ctx = ResolutionContext::new(target.as_str(), ns.as_str());
            if let Some(name) = instance {
                ctx = ctx.with_instance(name);
            }
            for (k, v) in vars {
                ctx = ctx.with_var(k, v);
            }
            let client = match &kubeconfig {
                Some(path) => {
                    let yaml = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
                    let client = KubeClient::from_kubeconfig_yaml(&yaml, kinds).await?;
                    ctx = ctx.with_connection(yaml);
                    client
                }
                None => KubeClient::try_default(kinds).await?,
            };
            info!(schema = %schema, target = %target, ns = %ns, "compose invoked");

            let composer = Composer::new(Arc::new(client));
            match composer.compose_with_report(&doc, &ctx).await {
                Ok(report) => match cli.output {
                    Output::Human => {
                        println!("{}", serde_json::to_string_pretty(&report.object)?);
                        for d in &report.diagnostics {
                            eprintln!("warn: {} ({}): {}", d.field, d.stage.as_str(), d.message);
                        }
                    }
                    Output::Json => println!("{}", serde_json::to_string_pretty(&report)?),
                },
                Err(ComposeError::Composition(e)) => {
                    error!(failures = e.failures.len(), "composition failed");
                    match cli.output {
                        Output::Human => {
                            for f in &e.failures {
                                eprintln!("{}: {}", f.path, f.message);
                            }
                        }
                        Output::Json => println!("{}", serde_json::to_string_pretty(&e.failures)?),
                    }
                    std::process::exit(2);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Commands::Kinds => {
            let kinds = cfg.registry()?;
            match cli.output {
                Output::Human => {
                    for (alias, key) in kinds.iter() {
                        println!("{:<22} {}", alias, key);
                    }
                }
                Output::Json => {
                    let map: std::collections::BTreeMap<&str, &str> = kinds.iter().collect();
                    println!("{}", serde_json::to_string_pretty(&map)?);
                }
            }
        }
    }
    Ok(())
}
