use std::collections::HashMap;

use modelbrowser_proto::catalog::ModelCatalog;
use modelbrowser_proto::protocol::{Event, InteractionKind};
use tracing::debug;

use crate::dispatch::{self, DispatchOutcome, DispatchTable, SurfaceId};
use crate::session::{BrowseFilter, BrowserSession, Control, SlotLayout};
use crate::viewer::Viewer;

/// Side effects of a click that the caller must still carry out.
#[derive(Debug, Clone, PartialEq)]
pub struct Interaction {
    pub outcome: DispatchOutcome,
    /// New page to mirror to the viewer, after navigation or a rebuild.
    pub page: Option<Event>,
    /// Surface torn down by a close click.
    pub closed: Option<SurfaceId>,
}

impl Interaction {
    fn outcome(outcome: DispatchOutcome) -> Self {
        Self {
            outcome,
            page: None,
            closed: None,
        }
    }
}

/// All open sessions, one per viewer, plus the dispatch table they bind into.
pub struct SessionRegistry {
    layout: SlotLayout,
    sessions: HashMap<String, BrowserSession>,
    table: DispatchTable,
    next_surface: SurfaceId,
}

impl SessionRegistry {
    pub fn new(page_size: usize) -> Self {
        Self {
            layout: SlotLayout::new(page_size),
            sessions: HashMap::new(),
            table: DispatchTable::new(),
            next_surface: 1,
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    #[cfg(test)]
    pub fn session(&self, viewer: &str) -> Option<&BrowserSession> {
        self.sessions.get(viewer)
    }

    #[cfg(test)]
    pub fn table(&self) -> &DispatchTable {
        &self.table
    }

    /// Open a browser for `viewer`, tearing down any session it already has.
    /// Returns the first page.
    pub fn open(&mut self, viewer: &str, filter: BrowseFilter, catalog: &ModelCatalog) -> Event {
        self.close(viewer);

        let surface_id = self.next_surface;
        self.next_surface += 1;

        let mut session = BrowserSession::new(viewer, surface_id, filter, self.layout);
        session.rebuild(catalog);
        self.table.register(surface_id, session.actions());
        let page = session.page_event();

        debug!("Opened surface {} for {} ({:?})", surface_id, session.viewer, session.filter);
        self.sessions.insert(viewer.to_string(), session);
        page
    }

    /// Drop `viewer`'s session, returning the surface it was bound to.
    pub fn close(&mut self, viewer: &str) -> Option<SurfaceId> {
        let session = self.sessions.remove(viewer)?;
        self.table.unregister(session.surface_id);
        debug!("Closed surface {} for {}", session.surface_id, session.viewer);
        Some(session.surface_id)
    }

    /// Rebuild `viewer`'s current page, optionally jumping to `page` first.
    pub fn rebuild(&mut self, viewer: &str, page: Option<usize>, catalog: &ModelCatalog) -> Option<Event> {
        let session = self.sessions.get_mut(viewer)?;
        if let Some(page) = page {
            session.surface_mut().set_page(page);
        }
        session.rebuild(catalog);
        self.table.register(session.surface_id, session.actions());
        Some(session.page_event())
    }

    /// Rebuild every open session against a new catalog.
    pub fn rebuild_all(&mut self, catalog: &ModelCatalog) -> Vec<(String, Event)> {
        let viewers: Vec<String> = self.sessions.keys().cloned().collect();
        viewers
            .into_iter()
            .filter_map(|viewer| {
                let page = self.rebuild(&viewer, None, catalog)?;
                Some((viewer, page))
            })
            .collect()
    }

    /// Route a click from `viewer`. Clicks on a surface the viewer does not
    /// currently own resolve to [`DispatchOutcome::NotFound`].
    pub fn interact(
        &mut self,
        viewer: &mut Viewer,
        surface: SurfaceId,
        slot: usize,
        kind: InteractionKind,
        catalog: &ModelCatalog,
        custom_model_data_base: Option<i32>,
    ) -> Interaction {
        let owned = self
            .sessions
            .get(&viewer.name)
            .is_some_and(|s| s.surface_id == surface);
        if !owned {
            debug!("{} clicked stale surface {}", viewer.name, surface);
            return Interaction::outcome(DispatchOutcome::NotFound);
        }

        let outcome = dispatch::dispatch(&self.table, surface, slot, kind, viewer, catalog, custom_model_data_base);
        let DispatchOutcome::Control(control) = outcome else {
            return Interaction::outcome(outcome);
        };

        let mut result = Interaction::outcome(outcome);
        match control {
            Control::Previous | Control::Next => {
                if let Some(session) = self.sessions.get_mut(&viewer.name) {
                    let moved = match control {
                        Control::Previous => session.surface_mut().previous_page(),
                        _ => session.surface_mut().next_page(),
                    };
                    if moved {
                        result.page = self.rebuild(&viewer.name, None, catalog);
                    }
                }
            }
            Control::Reload => {
                result.page = self.rebuild(&viewer.name, None, catalog);
            }
            Control::Close => {
                result.closed = self.close(&viewer.name);
            }
            Control::Title | Control::PageInfo | Control::Import | Control::Refresh => {}
        }
        result
    }
}
