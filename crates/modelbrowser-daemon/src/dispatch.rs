//! Slot dispatch table and the click dispatcher.

use std::collections::HashMap;

use modelbrowser_proto::catalog::ModelCatalog;
use modelbrowser_proto::config::Capability;
use modelbrowser_proto::protocol::InteractionKind;

use crate::session::Control;
use crate::viewer::{display_name, ItemStack, Material, Viewer};

pub type SurfaceId = u64;

/// What a bound slot does when clicked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotAction {
    Entry(String),
    Control(Control),
}

/// Every live (surface, slot) binding across all sessions.
#[derive(Debug, Default)]
pub struct DispatchTable {
    entries: HashMap<(SurfaceId, usize), SlotAction>,
}

impl DispatchTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace every binding of `surface` with `actions`.
    pub fn register(&mut self, surface: SurfaceId, actions: Vec<(usize, SlotAction)>) {
        self.unregister(surface);
        for (slot, action) in actions {
            self.entries.insert((surface, slot), action);
        }
    }

    pub fn unregister(&mut self, surface: SurfaceId) {
        self.entries.retain(|(s, _), _| *s != surface);
    }

    pub fn lookup(&self, surface: SurfaceId, slot: usize) -> Option<&SlotAction> {
        self.entries.get(&(surface, slot))
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Result of routing one click.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Unbound slot, unknown surface, or an entry no longer in the catalog.
    NotFound,
    /// The held item now carries the model.
    Applied { id: String, display_name: String },
    /// A new preview item went into the inventory.
    Given {
        id: String,
        material: Material,
        display_name: String,
        custom_model_data: Option<i32>,
    },
    Summary {
        id: String,
        material: Material,
        custom_model_data: Option<i32>,
    },
    Describe(String),
    Denied(String),
    InventoryFull(String),
    Control(Control),
}

/// Numeric model-data tag for `id`: `base` plus its position in id order.
pub fn custom_model_data(catalog: &ModelCatalog, id: &str, base: Option<i32>) -> Option<i32> {
    let base = base?;
    let index = i32::try_from(catalog.position(id)?).ok()?;
    base.checked_add(index)
}

/// Route a click on `(surface, slot)` to its action.
///
/// Entry clicks may mutate the viewer's held item or inventory. Control
/// clicks are returned for the caller to act on.
pub fn dispatch(
    table: &DispatchTable,
    surface: SurfaceId,
    slot: usize,
    kind: InteractionKind,
    viewer: &mut Viewer,
    catalog: &ModelCatalog,
    custom_model_data_base: Option<i32>,
) -> DispatchOutcome {
    let id = match table.lookup(surface, slot) {
        None => return DispatchOutcome::NotFound,
        Some(SlotAction::Control(control)) => return DispatchOutcome::Control(*control),
        Some(SlotAction::Entry(id)) => id,
    };
    if catalog.get(id).is_none() {
        return DispatchOutcome::NotFound;
    }
    let cmd = custom_model_data(catalog, id, custom_model_data_base);

    match kind {
        InteractionKind::Primary => {
            if let Some(held) = viewer.held.as_mut() {
                held.apply_model(id, cmd);
                return DispatchOutcome::Applied {
                    id: id.clone(),
                    display_name: display_name(id),
                };
            }
            if !viewer.can(Capability::Give) {
                return DispatchOutcome::Denied(format!(
                    "You need the {} permission to take preview items",
                    Capability::Give.as_str()
                ));
            }
            let item = ItemStack::preview(id, cmd);
            match viewer.give(item) {
                Ok(()) => DispatchOutcome::Given {
                    id: id.clone(),
                    material: Material::for_model(id),
                    display_name: display_name(id),
                    custom_model_data: cmd,
                },
                Err(_) => DispatchOutcome::InventoryFull(id.clone()),
            }
        }
        InteractionKind::Secondary => DispatchOutcome::Summary {
            id: id.clone(),
            material: Material::for_model(id),
            custom_model_data: cmd,
        },
        InteractionKind::Shift
        | InteractionKind::Middle
        | InteractionKind::Drop
        | InteractionKind::DoubleClick
        | InteractionKind::NumberKey => DispatchOutcome::Describe(id.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use modelbrowser_proto::config::CatalogConfig;
    use std::collections::BTreeSet;

    fn catalog(names: &[&str]) -> (tempfile::TempDir, ModelCatalog) {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("assets/minecraft/items");
        std::fs::create_dir_all(&dir).unwrap();
        for name in names {
            std::fs::write(dir.join(format!("{}.json", name)), r#"{"model":{"type":"minecraft:model"}}"#).unwrap();
        }
        let config = CatalogConfig {
            resource_pack: tmp.path().to_path_buf(),
            ..CatalogConfig::default()
        };
        let (catalog, _) = ModelCatalog::load(&config).unwrap();
        (tmp, catalog)
    }

    fn table() -> DispatchTable {
        let mut table = DispatchTable::new();
        table.register(
            7,
            vec![
                (9, SlotAction::Entry("minecraft:ruby_sword".to_string())),
                (10, SlotAction::Entry("minecraft:gone".to_string())),
                (62, SlotAction::Control(Control::Close)),
            ],
        );
        table
    }

    fn viewer(caps: &[Capability]) -> Viewer {
        Viewer::new("alex", caps.iter().copied().collect::<BTreeSet<_>>(), 36)
    }

    #[test]
    fn test_primary_applies_to_held_item_first() {
        let (_tmp, catalog) = catalog(&["ruby_sword"]);
        let mut v = viewer(&[]);
        v.hold("stick");

        let outcome = dispatch(&table(), 7, 9, InteractionKind::Primary, &mut v, &catalog, None);
        assert_eq!(
            outcome,
            DispatchOutcome::Applied {
                id: "minecraft:ruby_sword".to_string(),
                display_name: "Ruby Sword".to_string(),
            }
        );
        let held = v.held.unwrap();
        assert_eq!(held.material, "stick");
        assert_eq!(held.item_model.as_deref(), Some("minecraft:ruby_sword"));
        assert!(v.inventory.is_empty());
    }

    #[test]
    fn test_primary_empty_hand_gives_with_permission() {
        let (_tmp, catalog) = catalog(&["coin", "ruby_sword"]);
        let mut v = viewer(&[Capability::Give]);

        let outcome = dispatch(&table(), 7, 9, InteractionKind::Primary, &mut v, &catalog, Some(1000));
        assert_eq!(
            outcome,
            DispatchOutcome::Given {
                id: "minecraft:ruby_sword".to_string(),
                material: Material::IronSword,
                display_name: "Ruby Sword".to_string(),
                custom_model_data: Some(1001),
            }
        );
        assert_eq!(v.inventory.len(), 1);
        assert_eq!(v.inventory[0].material, "iron_sword");
    }

    #[test]
    fn test_primary_empty_hand_denied_without_permission() {
        let (_tmp, catalog) = catalog(&["ruby_sword"]);
        let mut v = viewer(&[]);

        let outcome = dispatch(&table(), 7, 9, InteractionKind::Primary, &mut v, &catalog, None);
        assert!(matches!(outcome, DispatchOutcome::Denied(_)));
        assert!(v.inventory.is_empty());
    }

    #[test]
    fn test_full_inventory_reports_failure() {
        let (_tmp, catalog) = catalog(&["ruby_sword"]);
        let mut v = Viewer::new("alex", BTreeSet::from([Capability::Give]), 0);

        let outcome = dispatch(&table(), 7, 9, InteractionKind::Primary, &mut v, &catalog, None);
        assert_eq!(outcome, DispatchOutcome::InventoryFull("minecraft:ruby_sword".to_string()));
        assert!(v.inventory.is_empty());
    }

    #[test]
    fn test_secondary_is_read_only_summary() {
        let (_tmp, catalog) = catalog(&["ruby_sword"]);
        let mut v = viewer(&[Capability::Give]);
        v.hold("stick");

        let outcome = dispatch(&table(), 7, 9, InteractionKind::Secondary, &mut v, &catalog, None);
        assert_eq!(
            outcome,
            DispatchOutcome::Summary {
                id: "minecraft:ruby_sword".to_string(),
                material: Material::IronSword,
                custom_model_data: None,
            }
        );
        assert!(v.held.unwrap().item_model.is_none());
    }

    #[test]
    fn test_stale_and_unbound_slots_are_not_found() {
        let (_tmp, catalog) = catalog(&["ruby_sword"]);
        let mut v = viewer(&[Capability::Give]);
        let table = table();

        // bound, but the entry left the catalog
        assert_eq!(dispatch(&table, 7, 10, InteractionKind::Primary, &mut v, &catalog, None), DispatchOutcome::NotFound);
        // nothing bound at this slot
        assert_eq!(dispatch(&table, 7, 30, InteractionKind::Primary, &mut v, &catalog, None), DispatchOutcome::NotFound);
        // unknown surface
        assert_eq!(dispatch(&table, 8, 9, InteractionKind::Primary, &mut v, &catalog, None), DispatchOutcome::NotFound);
        assert!(v.inventory.is_empty());
    }

    #[test]
    fn test_control_slot_is_returned() {
        let (_tmp, catalog) = catalog(&[]);
        let mut v = viewer(&[]);
        let outcome = dispatch(&table(), 7, 62, InteractionKind::Shift, &mut v, &catalog, None);
        assert_eq!(outcome, DispatchOutcome::Control(Control::Close));
    }

    #[test]
    fn test_register_replaces_surface_bindings() {
        let mut table = table();
        table.register(7, vec![(11, SlotAction::Control(Control::Title))]);
        assert_eq!(table.len(), 1);
        assert!(table.lookup(7, 9).is_none());
        table.unregister(7);
        assert!(table.is_empty());
    }
}
