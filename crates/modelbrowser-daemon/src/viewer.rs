//! Viewers and the items they carry.

use modelbrowser_proto::config::Capability;
use std::collections::BTreeSet;
use std::fmt;

/// Base item a catalog entry is previewed on, derived from its identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Material {
    Shield,
    GoldNugget,
    IronSword,
    IronAxe,
    IronPickaxe,
    LeatherHelmet,
    IronChestplate,
    LeatherBoots,
    Bow,
    Potion,
    Apple,
    Paper,
}

impl Material {
    /// Keyword table, checked in order against the lowercased identifier.
    const KEYWORDS: &'static [(&'static [&'static str], Material)] = &[
        (&["shield"], Material::Shield),
        (&["coin", "gold", "nugget"], Material::GoldNugget),
        (&["sword"], Material::IronSword),
        (&["axe"], Material::IronAxe),
        (&["pickaxe", "pick"], Material::IronPickaxe),
        (&["hat", "helmet", "cap"], Material::LeatherHelmet),
        (&["chestplate", "armor"], Material::IronChestplate),
        (&["boot", "shoe"], Material::LeatherBoots),
        (&["bow", "arrow"], Material::Bow),
        (&["potion", "bottle"], Material::Potion),
        (&["food", "apple", "bread"], Material::Apple),
    ];

    pub fn for_model(id: &str) -> Self {
        let id = id.to_lowercase();
        Self::KEYWORDS
            .iter()
            .find(|(words, _)| words.iter().any(|w| id.contains(w)))
            .map(|(_, material)| *material)
            .unwrap_or(Material::Paper)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Material::Shield => "shield",
            Material::GoldNugget => "gold_nugget",
            Material::IronSword => "iron_sword",
            Material::IronAxe => "iron_axe",
            Material::IronPickaxe => "iron_pickaxe",
            Material::LeatherHelmet => "leather_helmet",
            Material::IronChestplate => "iron_chestplate",
            Material::LeatherBoots => "leather_boots",
            Material::Bow => "bow",
            Material::Potion => "potion",
            Material::Apple => "apple",
            Material::Paper => "paper",
        }
    }
}

impl fmt::Display for Material {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Human-readable name for a model id: `minecraft:ruby_sword` → `Ruby Sword`.
pub fn display_name(id: &str) -> String {
    let lower = id.to_lowercase();
    let name = match lower.split_once(':') {
        Some((_, rest)) => rest,
        None => lower.as_str(),
    };
    name.split('_')
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemStack {
    pub material: String,
    pub item_model: Option<String>,
    pub display_name: Option<String>,
    pub unbreakable: bool,
    pub custom_model_data: Option<i32>,
}

impl ItemStack {
    pub fn new(material: impl Into<String>) -> Self {
        Self {
            material: material.into(),
            item_model: None,
            display_name: None,
            unbreakable: false,
            custom_model_data: None,
        }
    }

    /// Fresh preview item for a catalog entry.
    pub fn preview(id: &str, custom_model_data: Option<i32>) -> Self {
        let mut item = Self::new(Material::for_model(id).as_str());
        item.apply_model(id, custom_model_data);
        item
    }

    /// Bind this item to a model. Everything else about the item is kept.
    pub fn apply_model(&mut self, id: &str, custom_model_data: Option<i32>) {
        self.item_model = Some(id.to_string());
        self.display_name = Some(display_name(id));
        self.unbreakable = true;
        self.custom_model_data = custom_model_data;
    }
}

impl fmt::Display for ItemStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.display_name {
            Some(name) => write!(f, "{} ({})", name, self.material)?,
            None => f.write_str(&self.material)?,
        }
        if let Some(model) = &self.item_model {
            write!(f, " model={}", model)?;
        }
        if let Some(cmd) = self.custom_model_data {
            write!(f, " cmd={}", cmd)?;
        }
        if self.unbreakable {
            f.write_str(" unbreakable")?;
        }
        Ok(())
    }
}

/// A connected participant with an identity, grants and a small inventory.
#[derive(Debug, Clone)]
pub struct Viewer {
    pub name: String,
    pub capabilities: BTreeSet<Capability>,
    pub held: Option<ItemStack>,
    pub inventory: Vec<ItemStack>,
    capacity: usize,
}

impl Viewer {
    pub fn new(name: impl Into<String>, capabilities: BTreeSet<Capability>, capacity: usize) -> Self {
        Self {
            name: name.into(),
            capabilities,
            held: None,
            inventory: Vec::new(),
            capacity,
        }
    }

    pub fn can(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    pub fn is_inventory_full(&self) -> bool {
        self.inventory.len() >= self.capacity
    }

    /// Put an item in the inventory; hands it back if there is no room.
    pub fn give(&mut self, item: ItemStack) -> Result<(), ItemStack> {
        if self.is_inventory_full() {
            return Err(item);
        }
        self.inventory.push(item);
        Ok(())
    }

    /// Replace the held item. An empty material empties the hand.
    pub fn hold(&mut self, material: &str) {
        let material = material.trim();
        self.held = if material.is_empty() {
            None
        } else {
            Some(ItemStack::new(material))
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_material_first_match_wins() {
        assert_eq!(Material::for_model("minecraft:gold_sword"), Material::GoldNugget);
        assert_eq!(Material::for_model("minecraft:Ruby_Sword"), Material::IronSword);
        assert_eq!(Material::for_model("minecraft:tower_shield"), Material::Shield);
        assert_eq!(Material::for_model("minecraft:wizard_hat"), Material::LeatherHelmet);
        assert_eq!(Material::for_model("minecraft:thing"), Material::Paper);
    }

    #[test]
    fn test_display_name() {
        assert_eq!(display_name("minecraft:ruby_sword"), "Ruby Sword");
        assert_eq!(display_name("minecraft:BIG__coin"), "Big Coin");
        assert_eq!(display_name("plain"), "Plain");
    }

    #[test]
    fn test_apply_keeps_material() {
        let mut item = ItemStack::new("stick");
        item.apply_model("minecraft:magic_wand", Some(1001));
        assert_eq!(item.material, "stick");
        assert_eq!(item.item_model.as_deref(), Some("minecraft:magic_wand"));
        assert_eq!(item.display_name.as_deref(), Some("Magic Wand"));
        assert!(item.unbreakable);
        assert_eq!(item.custom_model_data, Some(1001));
        assert_eq!(item.to_string(), "Magic Wand (stick) model=minecraft:magic_wand cmd=1001 unbreakable");
        assert_eq!(ItemStack::new("stick").to_string(), "stick");
    }

    #[test]
    fn test_give_respects_capacity() {
        let mut viewer = Viewer::new("alex", BTreeSet::new(), 1);
        assert!(viewer.give(ItemStack::new("paper")).is_ok());
        assert!(viewer.is_inventory_full());
        let back = viewer.give(ItemStack::new("apple")).unwrap_err();
        assert_eq!(back.material, "apple");
        assert_eq!(viewer.inventory.len(), 1);
    }

    #[test]
    fn test_hold_and_empty_hand() {
        let mut viewer = Viewer::new("alex", BTreeSet::new(), 36);
        viewer.hold("diamond_sword");
        assert_eq!(viewer.held.as_ref().map(|i| i.material.as_str()), Some("diamond_sword"));
        viewer.hold("  ");
        assert!(viewer.held.is_none());
    }
}
