//! The explicit context every request is handled against: configuration,
//! the current catalog, the session registry and the known viewers.

use std::collections::HashMap;
use std::sync::Arc;

use modelbrowser_proto::catalog::{Category, ModelCatalog, ReloadReport};
use modelbrowser_proto::config::{Capability, Config};
use modelbrowser_proto::protocol::{CategoryGroup, ErrorReason, Event, InteractionKind, Request};
use tracing::{debug, info, warn};

use crate::commands::{Command, USAGE};
use crate::dispatch::DispatchOutcome;
use crate::registry::SessionRegistry;
use crate::session::{BrowseFilter, Control};
use crate::upload;
use crate::viewer::Viewer;

/// Events for the requesting viewer, plus whether a catalog reload should
/// be started on its behalf.
#[derive(Debug, Default, PartialEq)]
pub struct Reply {
    pub events: Vec<Event>,
    pub reload: bool,
}

impl Reply {
    fn one(event: Event) -> Self {
        Self {
            events: vec![event],
            reload: false,
        }
    }

    fn none() -> Self {
        Self::default()
    }
}

pub struct BrowserService {
    config: Arc<Config>,
    catalog: Arc<ModelCatalog>,
    registry: SessionRegistry,
    viewers: HashMap<String, Viewer>,
}

impl BrowserService {
    pub fn new(config: Arc<Config>, catalog: Arc<ModelCatalog>) -> Self {
        let registry = SessionRegistry::new(config.browser.page_size);
        Self {
            config,
            catalog,
            registry,
            viewers: HashMap::new(),
        }
    }

    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    #[cfg(test)]
    pub fn catalog(&self) -> &Arc<ModelCatalog> {
        &self.catalog
    }

    #[cfg(test)]
    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    #[cfg(test)]
    pub fn viewer(&self, name: &str) -> Option<&Viewer> {
        self.viewers.get(name)
    }

    pub fn has_capability(&self, viewer: &str, capability: Capability) -> bool {
        self.viewers.get(viewer).is_some_and(|v| v.can(capability))
    }

    /// Register `name`, resolving its capabilities from config. Known
    /// viewers keep their state.
    pub fn connect(&mut self, name: &str) -> Event {
        if !self.viewers.contains_key(name) {
            let viewer = Viewer::new(
                name,
                self.config.permissions.capabilities_for(name),
                self.config.browser.inventory_capacity,
            );
            info!("Viewer {} joined with {:?}", name, viewer.capabilities);
            self.viewers.insert(name.to_string(), viewer);
        }
        Event::notification(format!("Connected as {} ({} models)", name, self.catalog.len()))
    }

    /// Forget `name` and tear down its session.
    pub fn disconnect(&mut self, name: &str) {
        self.registry.close(name);
        self.viewers.remove(name);
        debug!("Viewer {} left", name);
    }

    /// Swap in a freshly loaded catalog and rebuild every open page.
    /// `requested_by` is reset to page 0. Returns the page events to mirror.
    pub fn install_catalog(
        &mut self,
        catalog: Arc<ModelCatalog>,
        report: &ReloadReport,
        requested_by: Option<&str>,
    ) -> Vec<(String, Event)> {
        self.catalog = catalog;

        let mut pages = Vec::new();
        if let Some(viewer) = requested_by {
            if let Some(page) = self.registry.rebuild(viewer, Some(0), &self.catalog) {
                pages.push((viewer.to_string(), page));
            }
            let mut message = format!("Models reloaded! Found {} models", report.loaded);
            if !report.skipped.is_empty() {
                message.push_str(&format!(" ({} skipped)", report.skipped.len()));
            }
            pages.push((viewer.to_string(), Event::notification(message)));
        }
        for (viewer, page) in self.registry.rebuild_all(&self.catalog) {
            if Some(viewer.as_str()) != requested_by {
                pages.push((viewer, page));
            }
        }
        pages
    }

    /// Handle one request from a viewer that has already said hello.
    pub fn handle(&mut self, viewer: &str, request: Request) -> Reply {
        if !self.viewers.contains_key(viewer) {
            return Reply::one(Event::error(ErrorReason::NoPermission, "say hello first"));
        }

        match request {
            Request::Hello { viewer } => Reply::one(self.connect(&viewer)),
            Request::Ping => Reply::one(Event::Pong),
            Request::RequestModels => Reply::one(Event::ModelList {
                models: self.catalog.ids(),
            }),
            Request::RequestModel { id } => Reply::one(self.model_data(&id)),
            Request::UploadModel { id, json, overwrite } => Reply::one(self.upload(viewer, &id, &json, overwrite)),
            Request::DeleteModel { id } => Reply::one(self.delete(viewer, &id)),
            Request::SearchModels { query } => {
                let mut results: Vec<String> = self.catalog.search(&query).into_iter().map(|e| e.id.clone()).collect();
                results.sort();
                Reply::one(Event::SearchResults { query, results })
            }
            Request::GetCategories => Reply::one(self.categories()),
            Request::GetModelsByCategory { category } => {
                let models = match Category::parse(&category) {
                    Some(c) => self.catalog.in_category(c).into_iter().map(|e| e.id.clone()).collect(),
                    None => Vec::new(),
                };
                Reply::one(Event::CategoryModels { category, models })
            }
            Request::GetModelInfo { id } => Reply::one(self.model_info(&id)),
            Request::Reload => self.request_reload(viewer),
            Request::BrowserOpen { query, category } => self.open_browser(viewer, &query, &category),
            Request::BrowserClick { surface, slot, kind } => {
                let (Ok(surface), Ok(slot)) = (u64::try_from(surface), usize::try_from(slot)) else {
                    return Reply::none();
                };
                self.click(viewer, surface, slot, kind)
            }
            Request::BrowserClose => match self.registry.close(viewer) {
                Some(surface) => Reply::one(Event::BrowserClosed { surface: surface as i64 }),
                None => Reply::none(),
            },
            Request::HoldItem { material } => {
                let Some(v) = self.viewers.get_mut(viewer) else {
                    return Reply::none();
                };
                v.hold(&material);
                let message = match &v.held {
                    Some(item) => format!("Now holding {}", item),
                    None => "Hand emptied".to_string(),
                };
                Reply::one(Event::notification(message))
            }
            Request::Command { line } => self.command(viewer, &line),
        }
    }

    // ── Catalog queries ───────────────────────────────────────────────────────

    fn model_data(&self, id: &str) -> Event {
        match self.catalog.read_source(id) {
            // the source travels as one u16-prefixed string
            Ok(Some(json)) if json.len() > usize::from(u16::MAX) => {
                warn!("Model {} is {} bytes, too large to send", id, json.len());
                Event::error(ErrorReason::TooLarge, format!("{} is {} bytes", id, json.len()))
            }
            Ok(Some(json)) => Event::ModelData { id: id.to_string(), json },
            Ok(None) => Event::error(ErrorReason::ModelNotFound, id),
            Err(e) => {
                warn!("Failed to read model {}: {}", id, e);
                Event::error(ErrorReason::ModelNotFound, format!("{}: {}", id, e))
            }
        }
    }

    fn model_info(&self, id: &str) -> Event {
        match self.catalog.get(id) {
            Some(entry) => Event::ModelInfo {
                id: entry.id.clone(),
                size: i64::try_from(entry.size_bytes).unwrap_or(i64::MAX),
                category: entry.category.as_str().to_string(),
                last_modified: entry.last_modified_millis(),
            },
            None => Event::error(ErrorReason::ModelNotFound, id),
        }
    }

    fn categories(&self) -> Event {
        let groups = self
            .catalog
            .by_category()
            .into_iter()
            .map(|(category, entries)| CategoryGroup {
                name: category.as_str().to_string(),
                members: entries.into_iter().map(|e| e.id.clone()).collect(),
            })
            .collect();
        Event::Categories { groups }
    }

    // ── Mutations ─────────────────────────────────────────────────────────────

    fn upload(&self, viewer: &str, id: &str, json: &str, overwrite: bool) -> Event {
        if !self.has_capability(viewer, Capability::Upload) {
            return Event::error(ErrorReason::NoPermission, "upload");
        }
        let catalog = &self.config.catalog;
        match upload::write_model(
            &catalog.resource_pack,
            &catalog.namespace,
            id,
            json,
            overwrite,
            catalog.max_upload_bytes,
        ) {
            Ok(uploaded) => {
                info!("{} uploaded {} to {:?}", viewer, uploaded.id, uploaded.path);
                Event::UploadResponse {
                    id: uploaded.id,
                    created: uploaded.created,
                }
            }
            Err(e) => {
                warn!("Upload of {} rejected: {}", id, e);
                Event::error(e.reason(), e.to_string())
            }
        }
    }

    fn delete(&self, viewer: &str, id: &str) -> Event {
        if !self.has_capability(viewer, Capability::Delete) {
            return Event::error(ErrorReason::NoPermission, "delete");
        }
        if self.catalog.get(id).is_none() {
            return Event::error(ErrorReason::ModelNotFound, id);
        }
        let deleted = self.catalog.delete(id).is_ok();
        Event::DeleteResponse {
            id: id.to_string(),
            deleted,
        }
    }

    fn request_reload(&self, viewer: &str) -> Reply {
        if !self.has_capability(viewer, Capability::Admin) {
            return Reply::one(Event::error(ErrorReason::NoPermission, "reload"));
        }
        Reply {
            events: vec![Event::notification("Reloading models...")],
            reload: true,
        }
    }

    // ── Browser ───────────────────────────────────────────────────────────────

    fn open_browser(&mut self, viewer: &str, query: &str, category: &str) -> Reply {
        let filter = if !category.trim().is_empty() {
            match Category::parse(category) {
                Some(c) => BrowseFilter::Category(c),
                None => return Reply::one(Event::notification(format!("Unknown category: {}", category))),
            }
        } else if !query.trim().is_empty() {
            BrowseFilter::Search(query.trim().to_string())
        } else {
            BrowseFilter::All
        };

        let page = self.registry.open(viewer, filter, &self.catalog);
        Reply {
            events: vec![Event::OpenBrowser, page],
            reload: false,
        }
    }

    fn click(&mut self, viewer: &str, surface: u64, slot: usize, kind: InteractionKind) -> Reply {
        let Some(v) = self.viewers.get_mut(viewer) else {
            return Reply::none();
        };
        let interaction = self.registry.interact(
            v,
            surface,
            slot,
            kind,
            &self.catalog,
            self.config.browser.custom_model_data_base,
        );

        let mut reply = Reply::none();
        match interaction.outcome {
            DispatchOutcome::NotFound => debug!("{} clicked unbound slot {} on {}", viewer, slot, surface),
            DispatchOutcome::Applied { id, display_name } => {
                reply.events.push(Event::ItemApplied { id, display_name });
            }
            DispatchOutcome::Given {
                id,
                material,
                display_name,
                custom_model_data,
            } => reply.events.push(Event::ItemGiven {
                id,
                material: material.as_str().to_string(),
                display_name,
                custom_model_data: custom_model_data.unwrap_or(0),
            }),
            DispatchOutcome::Summary {
                id,
                material,
                custom_model_data,
            } => reply.events.push(Event::ModelSummary {
                id,
                material: material.as_str().to_string(),
                custom_model_data: custom_model_data.unwrap_or(0),
            }),
            DispatchOutcome::Describe(id) => reply.events.push(Event::notification(format!("Model: {}", id))),
            DispatchOutcome::Denied(message) => {
                reply.events.push(Event::error(ErrorReason::NoPermission, message));
            }
            DispatchOutcome::InventoryFull(_) => {
                reply.events.push(Event::notification("Your inventory is full"));
            }
            DispatchOutcome::Control(Control::Import) => {
                reply.events.push(Event::notification(format!(
                    "Import models at: {}",
                    self.config.browser.import_url
                )));
            }
            DispatchOutcome::Control(Control::Refresh) => {
                reply = self.request_reload(viewer);
            }
            DispatchOutcome::Control(_) => {}
        }

        if let Some(page) = interaction.page {
            reply.events.push(page);
        }
        if let Some(surface) = interaction.closed {
            reply.events.push(Event::BrowserClosed { surface: surface as i64 });
        }
        reply
    }

    // ── Text commands ─────────────────────────────────────────────────────────

    fn command(&mut self, viewer: &str, line: &str) -> Reply {
        let command = match Command::parse(line) {
            Ok(command) => command,
            Err(e) => return Reply::one(Event::notification(e.message())),
        };
        if let Some(capability) = command.required_capability() {
            if !self.has_capability(viewer, capability) {
                return Reply::one(Event::error(ErrorReason::NoPermission, capability.as_str()));
            }
        }
        let namespace = self.config.catalog.namespace.clone();
        match command.into_request(&namespace) {
            Some(request) => self.handle(viewer, request),
            None => Reply {
                events: USAGE.iter().map(|line| Event::notification(*line)).collect(),
                reload: false,
            },
        }
    }
}
