mod connection;

use clap::{Parser, Subcommand};
use connection::DaemonConnection;
use modelbrowser_proto::protocol::{Event, Request};
use std::time::Duration;

/// Talk to a running modelbrowser daemon.
#[derive(Parser, Debug)]
#[command(name = "modelbrowser-ctl", version, about)]
struct Cli {
    /// Daemon address
    #[arg(long, default_value_t = modelbrowser_proto::platform::daemon_address())]
    addr: String,

    /// Viewer name to identify as
    #[arg(long, default_value = "console")]
    viewer: String,

    /// Seconds to wait for the answer
    #[arg(long, default_value_t = 5)]
    timeout: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List every model id
    List,
    /// Search model ids
    Search { query: String },
    /// Show models grouped by category
    Categories,
    /// Show size, category and timestamp of a model
    Info { id: String },
    /// Print the JSON source of a model
    Model { id: String },
    /// Ask the daemon to delete a model
    Delete { id: String },
    /// Rescan the resource pack
    Reload,
    Ping,
    /// Send a text command line, e.g. `run search coin`
    Run {
        #[arg(trailing_var_arg = true, required = true)]
        line: Vec<String>,
    },
}

impl Commands {
    fn request(&self) -> Request {
        match self {
            Commands::List => Request::RequestModels,
            Commands::Search { query } => Request::SearchModels { query: query.clone() },
            Commands::Categories => Request::GetCategories,
            Commands::Info { id } => Request::GetModelInfo { id: id.clone() },
            Commands::Model { id } => Request::RequestModel { id: id.clone() },
            Commands::Delete { id } => Request::DeleteModel { id: id.clone() },
            Commands::Reload => Request::Reload,
            Commands::Ping => Request::Ping,
            Commands::Run { line } => Request::Command { line: line.join(" ") },
        }
    }

    /// Whether `event` is the last one this command waits for.
    fn is_done(&self, event: &Event) -> bool {
        if matches!(event, Event::Error { .. }) {
            return true;
        }
        match self {
            Commands::List => matches!(event, Event::ModelList { .. }),
            Commands::Search { .. } => matches!(event, Event::SearchResults { .. }),
            Commands::Categories => matches!(event, Event::Categories { .. }),
            Commands::Info { .. } => matches!(event, Event::ModelInfo { .. }),
            Commands::Model { .. } => matches!(event, Event::ModelData { .. }),
            Commands::Delete { .. } => matches!(event, Event::DeleteResponse { .. }),
            Commands::Reload => matches!(
                event,
                Event::Notification { message }
                    if message.starts_with("Models reloaded") || message.starts_with("Reload failed")
            ),
            Commands::Ping => matches!(event, Event::Pong),
            // text commands have no fixed answer; stop when the daemon goes quiet
            Commands::Run { .. } => false,
        }
    }
}

fn describe(event: &Event) -> String {
    match event {
        Event::ModelList { models } => {
            let mut out = format!("{} models", models.len());
            for id in models {
                out.push_str(&format!("\n  {}", id));
            }
            out
        }
        Event::SearchResults { query, results } => {
            let mut out = format!("{} results for {:?}", results.len(), query);
            for id in results {
                out.push_str(&format!("\n  {}", id));
            }
            out
        }
        Event::Categories { groups } => groups
            .iter()
            .map(|g| format!("{} ({}): {}", g.name, g.members.len(), g.members.join(", ")))
            .collect::<Vec<_>>()
            .join("\n"),
        Event::CategoryModels { category, models } => {
            format!("{} ({}): {}", category, models.len(), models.join(", "))
        }
        Event::ModelInfo {
            id,
            size,
            category,
            last_modified,
        } => {
            let modified = chrono::DateTime::from_timestamp_millis(*last_modified)
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| last_modified.to_string());
            format!("{}\n  size: {} bytes\n  category: {}\n  modified: {}", id, size, category, modified)
        }
        Event::ModelData { id, json } => format!("{}\n{}", id, json),
        Event::DeleteResponse { id, deleted } => format!("delete {}: {}", id, if *deleted { "ok" } else { "failed" }),
        Event::UploadResponse { id, created } => {
            format!("{} {}", if *created { "created" } else { "updated" }, id)
        }
        Event::Notification { message } => message.clone(),
        Event::Error { reason, detail } => format!("error: {} ({})", reason.as_str(), detail),
        Event::Pong => "pong".to_string(),
        other => format!("{:?}", other),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut conn = DaemonConnection::connect(&cli.addr).await?;
    conn.send(Request::Hello { viewer: cli.viewer.clone() }).await?;
    // welcome notification
    conn.next_event().await?;

    conn.send(cli.command.request()).await?;

    let idle = match cli.command {
        Commands::Run { .. } => Duration::from_millis(500),
        _ => Duration::from_secs(cli.timeout),
    };
    let deadline = tokio::time::Instant::now() + Duration::from_secs(cli.timeout);

    loop {
        let wait = idle.min(deadline.saturating_duration_since(tokio::time::Instant::now()));
        let event = match tokio::time::timeout(wait, conn.next_event()).await {
            Ok(Ok(Some(event))) => event,
            Ok(Ok(None)) => anyhow::bail!("daemon closed the connection"),
            Ok(Err(e)) => return Err(e),
            Err(_) if matches!(cli.command, Commands::Run { .. }) => break,
            Err(_) => anyhow::bail!("no answer within {}s", cli.timeout),
        };
        println!("{}", describe(&event));
        if cli.command.is_done(&event) {
            if let Event::Error { .. } = event {
                std::process::exit(1);
            }
            break;
        }
    }

    Ok(())
}
