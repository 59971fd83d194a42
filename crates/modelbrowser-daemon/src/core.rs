//! Single-owner event loop. Socket tasks, the log layer and background
//! reloads only ever send [`DaemonEvent`]s; every piece of mutable state
//! lives here.

use std::collections::HashMap;
use std::sync::Arc;

use modelbrowser_proto::catalog::{ModelCatalog, ReloadReport};
use modelbrowser_proto::config::Capability;
use modelbrowser_proto::protocol::{ErrorReason, Event, Request};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::service::BrowserService;

pub type ClientId = usize;

// ── DaemonEvent ───────────────────────────────────────────────────────────────

/// All inputs into the DaemonCore loop.
#[derive(Debug)]
pub enum DaemonEvent {
    /// A socket accepted a client; `outbox` carries events back to it.
    ClientConnected {
        id: ClientId,
        outbox: mpsc::Sender<Event>,
    },
    ClientMessage {
        id: ClientId,
        request: Request,
    },
    ClientDisconnected {
        id: ClientId,
    },
    /// A background reload finished. `generation` orders overlapping reloads.
    CatalogReloaded {
        generation: u64,
        result: Result<(ModelCatalog, ReloadReport), String>,
        requested_by: Option<String>,
    },
    /// A formatted WARN/ERROR line from the tracing layer.
    Log(String),
}

// ── DaemonCore ────────────────────────────────────────────────────────────────

struct Client {
    outbox: mpsc::Sender<Event>,
    viewer: Option<String>,
}

pub struct DaemonCore {
    service: BrowserService,
    clients: HashMap<ClientId, Client>,
    event_tx: mpsc::Sender<DaemonEvent>,
    /// Generation of the most recently started reload.
    reload_generation: u64,
}

impl DaemonCore {
    pub fn new(service: BrowserService, event_tx: mpsc::Sender<DaemonEvent>) -> Self {
        Self {
            service,
            clients: HashMap::new(),
            event_tx,
            reload_generation: 0,
        }
    }

    /// Run the core event loop until the event channel closes.
    pub async fn run(mut self, mut event_rx: mpsc::Receiver<DaemonEvent>) -> anyhow::Result<()> {
        info!("DaemonCore: starting event loop");
        while let Some(event) = event_rx.recv().await {
            self.handle_event(event);
        }
        info!("DaemonCore: event channel closed, shutting down");
        Ok(())
    }

    fn handle_event(&mut self, event: DaemonEvent) {
        match event {
            DaemonEvent::ClientConnected { id, outbox } => {
                self.clients.insert(id, Client { outbox, viewer: None });
            }
            DaemonEvent::ClientMessage { id, request } => self.handle_request(id, request),
            DaemonEvent::ClientDisconnected { id } => {
                let Some(client) = self.clients.remove(&id) else {
                    return;
                };
                if let Some(viewer) = client.viewer {
                    if !self.viewer_online(&viewer) {
                        self.service.disconnect(&viewer);
                    }
                }
            }
            DaemonEvent::CatalogReloaded { generation, requested_by, .. }
                if generation < self.reload_generation =>
            {
                debug!(
                    "Discarding reload {} for {:?}, superseded by {}",
                    generation, requested_by, self.reload_generation
                );
            }
            DaemonEvent::CatalogReloaded { result, requested_by, .. } => match result {
                Ok((catalog, report)) => {
                    let updates = self
                        .service
                        .install_catalog(Arc::new(catalog), &report, requested_by.as_deref());
                    for (viewer, event) in updates {
                        self.send_to_viewer(&viewer, event);
                    }
                }
                Err(e) => {
                    error!("Catalog reload failed: {}", e);
                    if let Some(viewer) = requested_by {
                        self.send_to_viewer(&viewer, Event::notification(format!("Reload failed: {}", e)));
                    }
                }
            },
            DaemonEvent::Log(message) => {
                let admins: Vec<ClientId> = self
                    .clients
                    .iter()
                    .filter(|(_, c)| {
                        c.viewer
                            .as_deref()
                            .is_some_and(|v| self.service.has_capability(v, Capability::Admin))
                    })
                    .map(|(id, _)| *id)
                    .collect();
                for id in admins {
                    self.send_to_client(id, Event::notification(message.clone()));
                }
            }
        }
    }

    fn handle_request(&mut self, id: ClientId, request: Request) {
        let Some(client) = self.clients.get_mut(&id) else {
            return;
        };

        let viewer = match (&request, client.viewer.clone()) {
            (Request::Ping, _) => {
                self.send_to_client(id, Event::Pong);
                return;
            }
            (Request::Hello { viewer }, previous) => {
                let name = viewer.trim().to_string();
                if name.is_empty() {
                    self.send_to_client(id, Event::error(ErrorReason::InvalidName, "empty viewer name"));
                    return;
                }
                client.viewer = Some(name.clone());
                if let Some(previous) = previous.filter(|p| *p != name) {
                    if !self.viewer_online(&previous) {
                        self.service.disconnect(&previous);
                    }
                }
                info!("Client {} is {}", id, name);
                let welcome = self.service.connect(&name);
                self.send_to_client(id, welcome);
                return;
            }
            (_, None) => {
                warn!("Client {} sent {:?} before hello", id, request);
                self.send_to_client(id, Event::error(ErrorReason::NoPermission, "say hello first"));
                return;
            }
            (_, Some(viewer)) => viewer,
        };

        debug!("{} -> {:?}", viewer, request);
        let reply = self.service.handle(&viewer, request);
        for event in reply.events {
            self.send_to_client(id, event);
        }
        if reply.reload {
            self.start_reload(Some(viewer));
        }
    }

    /// Rebuild the catalog off the event loop and hand it back as a
    /// [`DaemonEvent::CatalogReloaded`].
    fn start_reload(&mut self, requested_by: Option<String>) {
        self.reload_generation += 1;
        let generation = self.reload_generation;
        let config = self.service.config().catalog.clone();
        let event_tx = self.event_tx.clone();
        tokio::task::spawn_blocking(move || {
            let result = ModelCatalog::load(&config).map_err(|e| e.to_string());
            if event_tx
                .blocking_send(DaemonEvent::CatalogReloaded {
                    generation,
                    result,
                    requested_by,
                })
                .is_err()
            {
                debug!("Core gone before reload finished");
            }
        });
    }

    fn viewer_online(&self, viewer: &str) -> bool {
        self.clients
            .values()
            .any(|c| c.viewer.as_deref() == Some(viewer))
    }

    fn send_to_client(&self, id: ClientId, event: Event) {
        if let Some(client) = self.clients.get(&id) {
            // A full outbox means the client stopped reading; drop rather than stall the loop.
            if client.outbox.try_send(event).is_err() {
                debug!("Dropped event for client {}", id);
            }
        }
    }

    fn send_to_viewer(&self, viewer: &str, event: Event) {
        for (id, client) in &self.clients {
            if client.viewer.as_deref() == Some(viewer) {
                self.send_to_client(*id, event.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use modelbrowser_proto::config::Config;
    use std::collections::BTreeSet;
    use std::time::Duration;

    struct Harness {
        _tmp: tempfile::TempDir,
        event_tx: mpsc::Sender<DaemonEvent>,
    }

    fn core_with(names: &[&str]) -> (tempfile::TempDir, DaemonCore, mpsc::Sender<DaemonEvent>, mpsc::Receiver<DaemonEvent>) {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("assets/minecraft/items");
        std::fs::create_dir_all(&dir).unwrap();
        for name in names {
            std::fs::write(dir.join(format!("{}.json", name)), r#"{"model":{"type":"minecraft:model"}}"#).unwrap();
        }
        let mut config = Config::default();
        config.catalog.resource_pack = tmp.path().to_path_buf();
        config
            .permissions
            .viewers
            .insert("op".to_string(), BTreeSet::from([Capability::Admin]));

        let (catalog, _) = ModelCatalog::load(&config.catalog).unwrap();
        let service = BrowserService::new(Arc::new(config), Arc::new(catalog));
        let (event_tx, event_rx) = mpsc::channel(64);
        let core = DaemonCore::new(service, event_tx.clone());
        (tmp, core, event_tx, event_rx)
    }

    fn start(names: &[&str]) -> Harness {
        let (tmp, core, event_tx, event_rx) = core_with(names);
        tokio::spawn(core.run(event_rx));
        Harness { _tmp: tmp, event_tx }
    }

    async fn connect(h: &Harness, id: ClientId) -> mpsc::Receiver<Event> {
        let (outbox, rx) = mpsc::channel(64);
        h.event_tx
            .send(DaemonEvent::ClientConnected { id, outbox })
            .await
            .unwrap();
        rx
    }

    async fn send(h: &Harness, id: ClientId, request: Request) {
        h.event_tx
            .send(DaemonEvent::ClientMessage { id, request })
            .await
            .unwrap();
    }

    async fn next(rx: &mut mpsc::Receiver<Event>) -> Event {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out")
            .expect("outbox closed")
    }

    #[tokio::test]
    async fn test_hello_gates_requests() {
        let h = start(&["coin"]);
        let mut rx = connect(&h, 1).await;

        send(&h, 1, Request::Ping).await;
        assert_eq!(next(&mut rx).await, Event::Pong);

        send(&h, 1, Request::RequestModels).await;
        assert!(matches!(next(&mut rx).await, Event::Error { reason: ErrorReason::NoPermission, .. }));

        send(&h, 1, Request::Hello { viewer: "alex".into() }).await;
        assert!(matches!(next(&mut rx).await, Event::Notification { .. }));

        send(&h, 1, Request::RequestModels).await;
        assert_eq!(
            next(&mut rx).await,
            Event::ModelList { models: vec!["minecraft:coin".into()] }
        );
    }

    #[tokio::test]
    async fn test_reload_runs_in_background() {
        let h = start(&["coin"]);
        let mut rx = connect(&h, 1).await;
        send(&h, 1, Request::Hello { viewer: "op".into() }).await;
        next(&mut rx).await;

        std::fs::write(
            h._tmp.path().join("assets/minecraft/items/apple.json"),
            r#"{"model":{}}"#,
        )
        .unwrap();
        send(&h, 1, Request::Reload).await;
        assert_eq!(next(&mut rx).await, Event::notification("Reloading models..."));
        match next(&mut rx).await {
            Event::Notification { message } => assert!(message.contains("Found 2 models"), "{}", message),
            other => panic!("unexpected {:?}", other),
        }

        send(&h, 1, Request::RequestModels).await;
        assert_eq!(
            next(&mut rx).await,
            Event::ModelList { models: vec!["minecraft:apple".into(), "minecraft:coin".into()] }
        );
    }

    #[test]
    fn test_superseded_reload_is_discarded() {
        let (tmp, mut core, _event_tx, _event_rx) = core_with(&["coin"]);
        let config = core.service.config().catalog.clone();
        let older = ModelCatalog::load(&config).unwrap();
        std::fs::write(tmp.path().join("assets/minecraft/items/apple.json"), r#"{"model":{}}"#).unwrap();
        let newer = ModelCatalog::load(&config).unwrap();

        // two reloads in flight; the newer one finishes first
        core.reload_generation = 2;
        core.handle_event(DaemonEvent::CatalogReloaded {
            generation: 2,
            result: Ok(newer),
            requested_by: None,
        });
        core.handle_event(DaemonEvent::CatalogReloaded {
            generation: 1,
            result: Ok(older),
            requested_by: None,
        });

        assert_eq!(core.service.catalog().len(), 2);
        assert!(core.service.catalog().get("minecraft:apple").is_some());
    }

    #[tokio::test]
    async fn test_logs_reach_admins_only() {
        let h = start(&[]);
        let mut op = connect(&h, 1).await;
        let mut alex = connect(&h, 2).await;
        send(&h, 1, Request::Hello { viewer: "op".into() }).await;
        send(&h, 2, Request::Hello { viewer: "alex".into() }).await;
        next(&mut op).await;
        next(&mut alex).await;

        h.event_tx
            .send(DaemonEvent::Log("12:00:00 [WARN] disk is sad".into()))
            .await
            .unwrap();
        send(&h, 2, Request::Ping).await;

        assert_eq!(next(&mut op).await, Event::notification("12:00:00 [WARN] disk is sad"));
        assert_eq!(next(&mut alex).await, Event::Pong);
    }

    #[tokio::test]
    async fn test_disconnect_closes_session() {
        let h = start(&["coin"]);
        let mut rx = connect(&h, 1).await;
        send(&h, 1, Request::Hello { viewer: "alex".into() }).await;
        next(&mut rx).await;
        send(&h, 1, Request::BrowserOpen { query: String::new(), category: String::new() }).await;
        assert_eq!(next(&mut rx).await, Event::OpenBrowser);
        assert!(matches!(next(&mut rx).await, Event::BrowserPage { .. }));

        h.event_tx.send(DaemonEvent::ClientDisconnected { id: 1 }).await.unwrap();

        // reconnecting starts from a clean slate
        let mut rx = connect(&h, 2).await;
        send(&h, 2, Request::Hello { viewer: "alex".into() }).await;
        next(&mut rx).await;
        send(&h, 2, Request::BrowserClose).await;
        send(&h, 2, Request::Ping).await;
        assert_eq!(next(&mut rx).await, Event::Pong);
    }
}
