//! Paginated browsing surface and per-viewer sessions.
//!
//! Layout of the default 7-row surface (page size 45):
//!
//! ```text
//!  row 0   . . . . T . . I R      T title, I import, R reload
//!  rows 1-5  content (45 slots, starting at slot 9)
//!  row 6   F . . P N X . . C      F refresh, P prev, N page info, X next, C close
//! ```

use std::collections::BTreeMap;

use modelbrowser_proto::catalog::{Category, ModelCatalog};
use modelbrowser_proto::protocol::{Event, SlotBinding};

use crate::dispatch::{SlotAction, SurfaceId};

pub const COLUMNS: usize = 9;

const CONTENT_START: usize = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Control {
    Title,
    Import,
    Reload,
    Refresh,
    Previous,
    PageInfo,
    Next,
    Close,
}

impl Control {
    pub const ALL: [Control; 8] = [
        Control::Title,
        Control::Import,
        Control::Reload,
        Control::Refresh,
        Control::Previous,
        Control::PageInfo,
        Control::Next,
        Control::Close,
    ];
}

// ── SlotLayout ────────────────────────────────────────────────────────────────

/// Slot geometry for a given page size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotLayout {
    page_size: usize,
    rows: usize,
}

impl SlotLayout {
    pub fn new(page_size: usize) -> Self {
        let page_size = page_size.max(1);
        let content_rows = page_size.div_ceil(COLUMNS);
        Self {
            page_size,
            rows: 1 + content_rows + 1,
        }
    }

    #[cfg(test)]
    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn slot_count(&self) -> usize {
        self.rows * COLUMNS
    }

    pub fn control_slot(&self, control: Control) -> usize {
        let footer = (self.rows - 1) * COLUMNS;
        match control {
            Control::Title => 4,
            Control::Import => 7,
            Control::Reload => 8,
            Control::Refresh => footer,
            Control::Previous => footer + 3,
            Control::PageInfo => footer + 4,
            Control::Next => footer + 5,
            Control::Close => footer + 8,
        }
    }

    pub fn is_control_slot(&self, slot: usize) -> bool {
        Control::ALL.iter().any(|c| self.control_slot(*c) == slot)
    }

    /// Slots that carry page content, in binding order.
    pub fn content_slots(&self) -> Vec<usize> {
        (CONTENT_START..self.slot_count())
            .filter(|slot| !self.is_control_slot(*slot))
            .take(self.page_size)
            .collect()
    }

    pub fn total_pages(&self, total: usize) -> usize {
        total.div_ceil(self.page_size)
    }
}

// ── PagedSurface ──────────────────────────────────────────────────────────────

/// Produces the ordered identifiers a surface pages over.
pub type ContentProvider = Box<dyn Fn(&ModelCatalog) -> Vec<String> + Send>;

/// Generic paginated surface: a layout, a content provider and a page cursor.
pub struct PagedSurface {
    layout: SlotLayout,
    provider: ContentProvider,
    page: usize,
    total_pages: usize,
}

/// One materialised page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageView {
    pub page: usize,
    pub total_pages: usize,
    pub content: Vec<(usize, String)>,
}

impl PageView {
    pub fn has_previous(&self) -> bool {
        self.page > 0
    }

    pub fn has_next(&self) -> bool {
        self.page + 1 < self.total_pages
    }
}

impl PagedSurface {
    pub fn new(layout: SlotLayout, provider: ContentProvider) -> Self {
        Self {
            layout,
            provider,
            page: 0,
            total_pages: 0,
        }
    }

    pub fn layout(&self) -> &SlotLayout {
        &self.layout
    }

    #[cfg(test)]
    pub fn page(&self) -> usize {
        self.page
    }

    pub fn set_page(&mut self, page: usize) {
        self.page = page;
    }

    /// Advance one page. Returns `false` (and changes nothing) on the last page.
    pub fn next_page(&mut self) -> bool {
        if self.page + 1 < self.total_pages {
            self.page += 1;
            true
        } else {
            false
        }
    }

    /// Go back one page. Returns `false` (and changes nothing) on the first page.
    pub fn previous_page(&mut self) -> bool {
        if self.page > 0 {
            self.page -= 1;
            true
        } else {
            false
        }
    }

    /// Pull content from the provider and bind the current page, clamping
    /// the cursor into range first.
    pub fn build(&mut self, catalog: &ModelCatalog) -> PageView {
        let mut ids = (self.provider)(catalog);
        ids.sort();

        self.total_pages = self.layout.total_pages(ids.len());
        self.page = self.page.min(self.total_pages.saturating_sub(1));

        let start = self.page * self.layout.page_size;
        let end = (start + self.layout.page_size).min(ids.len());
        let content = self
            .layout
            .content_slots()
            .into_iter()
            .zip(ids.into_iter().skip(start).take(end.saturating_sub(start)))
            .collect();

        PageView {
            page: self.page,
            total_pages: self.total_pages.max(1),
            content,
        }
    }
}

// ── BrowseFilter ──────────────────────────────────────────────────────────────

/// Which catalog entries a session pages over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrowseFilter {
    All,
    Search(String),
    Category(Category),
}

impl BrowseFilter {
    pub fn provider(&self) -> ContentProvider {
        match self.clone() {
            BrowseFilter::All => Box::new(|catalog: &ModelCatalog| catalog.ids()),
            BrowseFilter::Search(query) => Box::new(move |catalog: &ModelCatalog| {
                catalog.search(&query).into_iter().map(|e| e.id.clone()).collect()
            }),
            BrowseFilter::Category(category) => Box::new(move |catalog: &ModelCatalog| {
                catalog
                    .in_category(category)
                    .into_iter()
                    .map(|e| e.id.clone())
                    .collect()
            }),
        }
    }
}

// ── BrowserSession ────────────────────────────────────────────────────────────

/// One viewer's open browser.
pub struct BrowserSession {
    pub viewer: String,
    pub surface_id: SurfaceId,
    pub filter: BrowseFilter,
    surface: PagedSurface,
    bindings: BTreeMap<usize, String>,
    view: Option<PageView>,
}

impl BrowserSession {
    pub fn new(viewer: impl Into<String>, surface_id: SurfaceId, filter: BrowseFilter, layout: SlotLayout) -> Self {
        let surface = PagedSurface::new(layout, filter.provider());
        Self {
            viewer: viewer.into(),
            surface_id,
            filter,
            surface,
            bindings: BTreeMap::new(),
            view: None,
        }
    }

    #[cfg(test)]
    pub fn page(&self) -> usize {
        self.surface.page()
    }

    #[cfg(test)]
    pub fn slot_bindings(&self) -> &BTreeMap<usize, String> {
        &self.bindings
    }

    pub fn surface_mut(&mut self) -> &mut PagedSurface {
        &mut self.surface
    }

    /// Rebuild the current page from `catalog` and refresh the slot bindings.
    pub fn rebuild(&mut self, catalog: &ModelCatalog) -> &PageView {
        let view = self.surface.build(catalog);
        self.bindings = view.content.iter().cloned().collect();
        self.view.insert(view)
    }

    /// Every slot that does something on the current page.
    pub fn actions(&self) -> Vec<(usize, SlotAction)> {
        let layout = self.surface.layout();
        let mut actions = Vec::new();

        for control in [Control::Title, Control::Import, Control::Reload, Control::Refresh, Control::PageInfo, Control::Close] {
            actions.push((layout.control_slot(control), SlotAction::Control(control)));
        }
        if let Some(view) = &self.view {
            if view.has_previous() {
                actions.push((layout.control_slot(Control::Previous), SlotAction::Control(Control::Previous)));
            }
            if view.has_next() {
                actions.push((layout.control_slot(Control::Next), SlotAction::Control(Control::Next)));
            }
        }
        for (slot, id) in &self.bindings {
            actions.push((*slot, SlotAction::Entry(id.clone())));
        }
        actions
    }

    /// Wire form of the last built page.
    pub fn page_event(&self) -> Event {
        let (page, total_pages) = self
            .view
            .as_ref()
            .map(|v| (v.page, v.total_pages))
            .unwrap_or((0, 1));
        Event::BrowserPage {
            surface: self.surface_id as i64,
            page: page as i32,
            total_pages: total_pages as i32,
            slots: self
                .bindings
                .iter()
                .map(|(slot, id)| SlotBinding {
                    slot: *slot as i32,
                    id: id.clone(),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use modelbrowser_proto::config::CatalogConfig;

    fn catalog_with(n: usize) -> (tempfile::TempDir, ModelCatalog) {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("assets/minecraft/items");
        std::fs::create_dir_all(&dir).unwrap();
        for i in 0..n {
            let name = format!("item_{:03}", i);
            std::fs::write(
                dir.join(format!("{}.json", name)),
                format!(r#"{{"model":{{"type":"minecraft:model","model":"minecraft:item/{}"}}}}"#, name),
            )
            .unwrap();
        }
        let config = CatalogConfig {
            resource_pack: tmp.path().to_path_buf(),
            ..CatalogConfig::default()
        };
        let (catalog, _) = ModelCatalog::load(&config).unwrap();
        (tmp, catalog)
    }

    #[test]
    fn test_default_layout() {
        let layout = SlotLayout::new(45);
        assert_eq!(layout.rows(), 7);
        assert_eq!(layout.slot_count(), 63);
        assert_eq!(layout.control_slot(Control::Close), 62);
        assert_eq!(layout.control_slot(Control::Previous), 57);

        let content = layout.content_slots();
        assert_eq!(content.len(), 45);
        assert_eq!(content[0], 9);
        assert_eq!(content[44], 53);
        assert!(content.iter().all(|s| !layout.is_control_slot(*s)));
    }

    #[test]
    fn test_small_page_size_layout() {
        let layout = SlotLayout::new(10);
        assert_eq!(layout.rows(), 4);
        let content = layout.content_slots();
        assert_eq!(content.len(), 10);
        assert!(content.iter().all(|s| *s >= 9 && *s < 27));
    }

    #[test]
    fn test_pages_split_45_45_10() {
        let (_tmp, catalog) = catalog_with(100);
        let mut surface = PagedSurface::new(SlotLayout::new(45), BrowseFilter::All.provider());

        let mut sizes = Vec::new();
        loop {
            let view = surface.build(&catalog);
            assert_eq!(view.total_pages, 3);
            sizes.push(view.content.len());
            if !surface.next_page() {
                break;
            }
        }
        assert_eq!(sizes, vec![45, 45, 10]);
        assert_eq!(sizes.iter().sum::<usize>(), catalog.len());
    }

    #[test]
    fn test_navigation_past_ends_is_noop() {
        let (_tmp, catalog) = catalog_with(50);
        let mut surface = PagedSurface::new(SlotLayout::new(45), BrowseFilter::All.provider());
        surface.build(&catalog);

        assert!(!surface.previous_page());
        assert_eq!(surface.page(), 0);
        assert!(surface.next_page());
        assert!(!surface.next_page());
        assert_eq!(surface.page(), 1);
    }

    #[test]
    fn test_page_clamps_when_catalog_shrinks() {
        let (_tmp, catalog) = catalog_with(10);
        let mut surface = PagedSurface::new(SlotLayout::new(45), BrowseFilter::All.provider());
        surface.set_page(4);
        let view = surface.build(&catalog);
        assert_eq!(view.page, 0);
        assert_eq!(view.content.len(), 10);
    }

    #[test]
    fn test_empty_catalog_builds_one_empty_page() {
        let (_tmp, catalog) = catalog_with(0);
        let mut surface = PagedSurface::new(SlotLayout::new(45), BrowseFilter::All.provider());
        let view = surface.build(&catalog);
        assert_eq!(view.page, 0);
        assert_eq!(view.total_pages, 1);
        assert!(view.content.is_empty());
    }

    #[test]
    fn test_bindings_are_sorted_and_deterministic() {
        let (_tmp, catalog) = catalog_with(20);
        let mut a = BrowserSession::new("alex", 1, BrowseFilter::All, SlotLayout::new(45));
        let mut b = BrowserSession::new("alex", 2, BrowseFilter::All, SlotLayout::new(45));
        a.rebuild(&catalog);
        b.rebuild(&catalog);
        assert_eq!(a.slot_bindings(), b.slot_bindings());
        assert_eq!(a.slot_bindings()[&9], "minecraft:item_000");
    }

    #[test]
    fn test_search_filter() {
        let (_tmp, catalog) = catalog_with(20);
        let mut session = BrowserSession::new(
            "alex",
            1,
            BrowseFilter::Search("item_01".to_string()),
            SlotLayout::new(45),
        );
        session.rebuild(&catalog);
        assert_eq!(session.slot_bindings().len(), 10);
    }

    #[test]
    fn test_nav_controls_only_when_reachable() {
        let (_tmp, catalog) = catalog_with(50);
        let layout = SlotLayout::new(45);
        let mut session = BrowserSession::new("alex", 1, BrowseFilter::All, layout);
        session.rebuild(&catalog);

        let has = |s: &BrowserSession, c: Control| {
            s.actions()
                .iter()
                .any(|(_, a)| *a == SlotAction::Control(c))
        };
        assert!(!has(&session, Control::Previous));
        assert!(has(&session, Control::Next));

        session.surface_mut().next_page();
        session.rebuild(&catalog);
        assert!(has(&session, Control::Previous));
        assert!(!has(&session, Control::Next));
    }
}
