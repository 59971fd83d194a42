mod commands;
mod core;
mod dispatch;
mod registry;
mod service;
mod session;
mod socket;
mod upload;
mod viewer;

use modelbrowser_proto::catalog::ModelCatalog;
use modelbrowser_proto::config::Config;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// A custom tracing layer that forwards warnings and errors to the core,
/// which relays them to admin viewers as `HH:MM:SS [LEVEL] target: message`.
struct ForwardLayer {
    sender: mpsc::Sender<core::DaemonEvent>,
}

impl ForwardLayer {
    fn new(sender: mpsc::Sender<core::DaemonEvent>) -> Self {
        Self { sender }
    }
}

impl<S> tracing_subscriber::Layer<S> for ForwardLayer
where
    S: tracing::Subscriber,
{
    fn on_event(
        &self,
        event: &tracing::Event<'_>,
        _ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        let level = event.metadata().level();
        if !matches!(*level, tracing::Level::WARN | tracing::Level::ERROR) {
            return;
        }

        let mut message = String::new();
        let now = chrono::Local::now();
        message.push_str(&format!("{} ", now.format("%H:%M:%S")));
        message.push_str(&format!("[{}] {}: ", level, event.metadata().target()));

        let mut visitor = MessageVisitor(&mut message);
        event.record(&mut visitor);

        // Never block inside the subscriber; a full channel just loses the line
        let _ = self.sender.try_send(core::DaemonEvent::Log(message));
    }
}

struct MessageVisitor<'a>(&'a mut String);

impl<'a> tracing::field::Visit for MessageVisitor<'a> {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.0.push_str(&format!("{:?}", value));
        } else {
            self.0.push_str(&format!(" {}={:?}", field.name(), value));
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Event channel first so the log layer can feed it
    let (event_tx, event_rx) = mpsc::channel::<core::DaemonEvent>(256);

    let data_dir = modelbrowser_proto::platform::data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let log_path = data_dir.join("daemon.log");

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(log_file)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(ForwardLayer::new(event_tx.clone()))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,modelbrowser_daemon=debug")),
        )
        .init();

    info!("Log file: {:?}", log_path);

    let config = Config::load()?;
    info!("Config loaded from: {:?}", Config::config_path());
    info!("Resource pack: {:?}", config.catalog.resource_pack);

    // The first scan may bootstrap example files; keep it off the runtime threads
    let catalog_config = config.catalog.clone();
    let catalog = tokio::task::spawn_blocking(move || ModelCatalog::load(&catalog_config)).await?;
    let catalog = match catalog {
        Ok((catalog, report)) => {
            if report.bootstrapped {
                info!("Example models written; they load on the next reload");
            }
            catalog
        }
        Err(e) => {
            warn!("Initial catalog scan failed: {}", e);
            ModelCatalog::new(&config.catalog)
        }
    };

    let config = Arc::new(config);
    let service = service::BrowserService::new(config.clone(), Arc::new(catalog));
    let daemon_core = core::DaemonCore::new(service, event_tx.clone());

    let _socket_handle = socket::start_server(
        config.daemon.bind_address.clone(),
        config.daemon.port,
        event_tx.clone(),
    );

    info!("Daemon initialised, running event loop");
    daemon_core.run(event_rx).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forwarded_lines_name_their_source() {
        let (tx, mut rx) = mpsc::channel(8);
        let subscriber = tracing_subscriber::registry().with(ForwardLayer::new(tx));

        tracing::subscriber::with_default(subscriber, || {
            info!("not forwarded");
            warn!(target: "modelbrowser_daemon::socket", peer = 7, "frame dropped");
        });

        let Ok(core::DaemonEvent::Log(line)) = rx.try_recv() else {
            panic!("expected a forwarded line");
        };
        assert!(line.contains("[WARN] modelbrowser_daemon::socket: frame dropped"), "{}", line);
        assert!(line.contains(" peer=7"), "{}", line);
        assert!(rx.try_recv().is_err());
    }
}
