#![forbid(unsafe_code)]
use anyhow::{Context, Result};
use chrono::{Duration, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use garde::{
    api, io, Bureau, BureauId, ConflictId, ConflictQuery, ConflictStatus, Engine, EngineConfig,
    EvaluationScope, JsonStorage, Severity,
};
use std::path::PathBuf;
use std::sync::Arc;
#[cfg(feature = "logging")]
use tracing_subscriber::{fmt::Subscriber, EnvFilter};

/// CLI du moteur de conflits de planning
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Active les logs (feature `logging`)
    #[arg(long, global = true)]
    log: bool,

    /// Snapshot JSON de l'état (défaut : `data_path` de la config, sinon garde.json)
    #[arg(long, global = true)]
    data: Option<PathBuf>,

    /// Fichier de configuration JSON
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Lancer l'API REST et le balayage périodique
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },

    /// Déclarer un bureau
    AddBureau {
        #[arg(long)]
        id: String,
        #[arg(long)]
        name: String,
    },

    /// Importer des employés depuis un CSV
    ImportEmployees {
        #[arg(long)]
        csv: PathBuf,
    },

    /// Importer des shifts depuis un CSV
    ImportShifts {
        #[arg(long)]
        csv: PathBuf,
    },

    /// Réévaluer une période et signaler les conflits ouverts
    Check {
        /// YYYY-MM-DD, défaut : hier
        #[arg(long)]
        from: Option<NaiveDate>,
        /// YYYY-MM-DD, défaut : fin de l'horizon de balayage
        #[arg(long)]
        to: Option<NaiveDate>,
        /// Export CSV des conflits (optionnel)
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Lister les conflits
    Conflicts {
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        severity: Option<String>,
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Prendre en compte un conflit
    Acknowledge {
        #[arg(long)]
        id: String,
    },

    /// Marquer un conflit résolu
    Resolve {
        #[arg(long)]
        id: String,
    },

    /// Écarter un conflit
    Dismiss {
        #[arg(long)]
        id: String,
    },

    /// Agrégats du tableau de bord (JSON)
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    #[cfg(feature = "logging")]
    if cli.log {
        let _ = Subscriber::builder()
            .with_env_filter(EnvFilter::from_default_env())
            .try_init();
    }

    let mut config = match &cli.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    let data = cli
        .data
        .clone()
        .or_else(|| config.data_path.clone())
        .unwrap_or_else(|| PathBuf::from("garde.json"));
    config.data_path = Some(data.clone());
    let storage = Arc::new(JsonStorage::open(&data)?);
    let engine = Engine::open(&config, storage)?;

    let code = match cli.cmd {
        Commands::Serve { host, port } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            let addr = config.server.socket_addr()?;
            if config.sweep_interval_secs > 0 {
                engine.spawn_sweeper(std::time::Duration::from_secs(config.sweep_interval_secs));
            }
            let listener = tokio::net::TcpListener::bind(addr)
                .await
                .with_context(|| format!("binding {addr}"))?;
            println!("listening on http://{addr}");
            api::serve(engine, listener, async {
                let _ = tokio::signal::ctrl_c().await;
            })
            .await?;
            0
        }
        Commands::AddBureau { id, name } => {
            let bureau = engine.add_bureau(Bureau::new(id, name)).await?;
            println!("bureau {} ({})", bureau.id, bureau.name);
            0
        }
        Commands::ImportEmployees { csv } => {
            let employees = io::import_employees_csv(csv)?;
            let known: Vec<BureauId> = engine.bureaus().await.into_iter().map(|b| b.id).collect();
            let mut missing: Vec<BureauId> = employees
                .iter()
                .map(|e| e.bureau_id.clone())
                .filter(|b| !known.contains(b))
                .collect();
            missing.sort();
            missing.dedup();
            for bureau in missing {
                engine.add_bureau(Bureau::new(bureau.as_str(), bureau.as_str())).await?;
            }
            let count = employees.len();
            for employee in employees {
                let (_, pending) = engine.upsert_employee(employee).await?;
                pending.wait().await?;
            }
            println!("imported {count} employee(s)");
            0
        }
        Commands::ImportShifts { csv } => {
            let shifts = io::import_shifts_csv(csv)?;
            let count = shifts.len();
            for new in shifts {
                let (_, pending) = engine.create_shift(new).await?;
                pending.wait().await?;
            }
            println!("imported {count} shift(s)");
            0
        }
        Commands::Check { from, to, report } => {
            let today = Utc::now().date_naive();
            let from = from.unwrap_or(today - Duration::days(1));
            let to = to.unwrap_or(today + Duration::days(i64::from(config.sweep_horizon_days)));
            let outcome = engine.reevaluate(&EvaluationScope::full(from, to)).await?;
            for failure in &outcome.failures {
                eprintln!("warning: {failure}");
            }
            let open: Vec<_> = engine
                .list_conflicts(&ConflictQuery {
                    status: Some(ConflictStatus::Unresolved),
                    ..Default::default()
                })
                .await
                .into_iter()
                .filter(|c| c.date >= from && c.date <= to)
                .collect();
            if let Some(path) = report {
                io::export_conflicts_csv(path, &open)?;
            }
            if open.is_empty() {
                println!("OK: no unresolved conflicts");
                0
            } else {
                eprintln!("Found {} unresolved conflict(s)", open.len());
                for c in &open {
                    eprintln!("{} | {} | {} | {}", c.date, c.kind, c.severity.as_str(), c.description);
                }
                // Code 2 = WARNING/INCOMPLETE
                2
            }
        }
        Commands::Conflicts {
            status,
            severity,
            limit,
        } => {
            let status = status
                .map(|s| ConflictStatus::parse(&s).with_context(|| format!("unknown status {s}")))
                .transpose()?;
            let severity = severity
                .map(|s| Severity::parse(&s).with_context(|| format!("unknown severity {s}")))
                .transpose()?;
            let query = ConflictQuery {
                status,
                severity,
                limit,
            };
            for c in engine.list_conflicts(&query).await {
                let who = c
                    .employee_name
                    .as_deref()
                    .or(c.bureau_id.as_ref().map(BureauId::as_str))
                    .unwrap_or("-");
                println!(
                    "{} | {} | {} | {} | {} | {} | {}",
                    c.id,
                    c.date,
                    c.kind,
                    c.severity.as_str(),
                    c.status,
                    who,
                    c.description
                );
            }
            0
        }
        Commands::Acknowledge { id } => {
            let c = engine.acknowledge(&ConflictId::new(id)).await?;
            println!("{} {}", c.id, c.status);
            0
        }
        Commands::Resolve { id } => {
            let c = engine.resolve(&ConflictId::new(id)).await?;
            println!("{} {}", c.id, c.status);
            0
        }
        Commands::Dismiss { id } => {
            let c = engine.dismiss(&ConflictId::new(id)).await?;
            println!("{} {}", c.id, c.status);
            0
        }
        Commands::Stats => {
            let stats = engine.stats(Utc::now()).await;
            println!("{}", serde_json::to_string_pretty(&stats)?);
            0
        }
    };

    std::process::exit(code);
}
