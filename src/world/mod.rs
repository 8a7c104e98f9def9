//! World content: locations, items, monsters and the quest.
//!
//! The core never reads these tables directly. It goes through the
//! [`WorldOracle`] trait, which answers validity questions ("is there an exit
//! north of here?") and renders descriptive text. Everything in this module
//! is a pure function of its inputs.

mod content;

use std::collections::{BTreeMap, BTreeSet};

/// A place the subject can stand in.
#[derive(Debug, Clone, Copy)]
pub struct Location {
    /// Stable identifier.
    pub id: &'static str,
    /// Display name.
    pub name: &'static str,
    /// Base description, before items and monsters are mentioned.
    pub description: &'static str,
    /// `(direction, destination)` pairs.
    pub exits: &'static [(&'static str, &'static str)],
    /// Items lying here when a subject first arrives in the world.
    pub items: &'static [&'static str],
    /// The monster guarding this location, if any.
    pub monster: Option<&'static str>,
}

/// Something that can be picked up.
#[derive(Debug, Clone, Copy)]
pub struct Item {
    /// Stable identifier.
    pub id: &'static str,
    /// Display name.
    pub name: &'static str,
    /// Close-up description.
    pub description: &'static str,
}

/// A hostile creature.
#[derive(Debug, Clone, Copy)]
pub struct Monster {
    /// Stable identifier.
    pub id: &'static str,
    /// Display name.
    pub name: &'static str,
    /// Description shown when the monster is present.
    pub description: &'static str,
}

/// The fetch quest offered at one location.
#[derive(Debug, Clone, Copy)]
pub struct Quest {
    /// Stable identifier.
    pub id: &'static str,
    /// Display title.
    pub title: &'static str,
    /// Where the quest is offered and turned in.
    pub giver_location: &'static str,
    /// The item the giver wants.
    pub required_item: &'static str,
    /// Text shown when the quest is accepted.
    pub briefing: &'static str,
    /// Text shown when the quest is completed.
    pub reward: &'static str,
}

/// Read-only access to world content.
///
/// Implementations must be pure: the same question always gets the same
/// answer, regardless of any subject's state.
pub trait WorldOracle: Send + Sync {
    /// Where new subjects start.
    fn start_location(&self) -> &str;

    /// Looks up a location by id.
    fn location(&self, id: &str) -> Option<&Location>;

    /// Looks up an item by id.
    fn item(&self, id: &str) -> Option<&Item>;

    /// Looks up a monster by id.
    fn monster(&self, id: &str) -> Option<&Monster>;

    /// The quest on offer.
    fn quest(&self) -> &Quest;

    /// All locations, in a stable order.
    fn locations(&self) -> &[Location];

    /// Destination reached by leaving `from` towards `direction`, if valid.
    fn exit(&self, from: &str, direction: &str) -> Option<&str> {
        let direction = normalize_direction(direction);
        self.location(from)?
            .exits
            .iter()
            .find(|(d, _)| *d == direction)
            .map(|(_, to)| *to)
    }

    /// The monster guarding `location`, if any.
    fn monster_at(&self, location: &str) -> Option<&Monster> {
        self.location(location)
            .and_then(|l| l.monster)
            .and_then(|m| self.monster(m))
    }

    /// Initial per-location item placement for a fresh subject.
    fn initial_items(&self) -> BTreeMap<String, BTreeSet<String>> {
        self.locations()
            .iter()
            .map(|l| {
                (
                    l.id.to_string(),
                    l.items.iter().map(ToString::to_string).collect(),
                )
            })
            .collect()
    }
}

/// Renders a location description; usable through `dyn WorldOracle`.
pub fn render_location<'a, W: WorldOracle + ?Sized>(
    world: &W,
    location: &str,
    items_here: impl IntoIterator<Item = &'a String>,
    monster_here: Option<&str>,
) -> String {
    let Some(loc) = world.location(location) else {
        return format!("You are somewhere unknown ({location}).");
    };

    let mut text = format!("{}\n{}", loc.name, loc.description);

    let items: Vec<&str> = items_here
        .into_iter()
        .filter_map(|id| world.item(id))
        .map(|i| i.name)
        .collect();
    if !items.is_empty() {
        text.push_str(&format!("\nYou see: {}.", items.join(", ")));
    }

    if let Some(monster) = monster_here.and_then(|m| world.monster(m)) {
        text.push_str(&format!("\nDanger! {}", monster.description));
    }

    let exits: Vec<&str> = loc.exits.iter().map(|(d, _)| *d).collect();
    if exits.is_empty() {
        text.push_str("\nThere is no way out.");
    } else {
        text.push_str(&format!("\nExits: {}.", exits.join(", ")));
    }

    text
}

/// Expands single-letter compass abbreviations and lowercases the rest.
#[must_use]
pub fn normalize_direction(direction: &str) -> String {
    let lower = direction.trim().to_lowercase();
    match lower.as_str() {
        "n" => "north".to_string(),
        "s" => "south".to_string(),
        "e" => "east".to_string(),
        "w" => "west".to_string(),
        "u" => "up".to_string(),
        "d" => "down".to_string(),
        _ => lower,
    }
}

/// The built-in world backed by static tables.
#[derive(Debug, Default, Clone, Copy)]
pub struct StaticWorld;

impl StaticWorld {
    /// Creates the built-in world.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl WorldOracle for StaticWorld {
    fn start_location(&self) -> &str {
        content::START
    }

    fn location(&self, id: &str) -> Option<&Location> {
        content::LOCATIONS.iter().find(|l| l.id == id)
    }

    fn item(&self, id: &str) -> Option<&Item> {
        content::ITEMS.iter().find(|i| i.id == id)
    }

    fn monster(&self, id: &str) -> Option<&Monster> {
        content::MONSTERS.iter().find(|m| m.id == id)
    }

    fn quest(&self) -> &Quest {
        &content::QUEST
    }

    fn locations(&self) -> &[Location] {
        content::LOCATIONS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_exit_leads_somewhere() {
        let world = StaticWorld::new();
        for loc in world.locations() {
            for (direction, to) in loc.exits {
                assert!(
                    world.location(to).is_some(),
                    "{} exit {direction} points at unknown {to}",
                    loc.id
                );
            }
        }
    }

    #[test]
    fn every_placed_item_and_monster_is_defined() {
        let world = StaticWorld::new();
        for loc in world.locations() {
            for item in loc.items {
                assert!(world.item(item).is_some(), "unknown item {item}");
            }
            if let Some(m) = loc.monster {
                assert!(world.monster(m).is_some(), "unknown monster {m}");
            }
        }
        assert!(world.item(world.quest().required_item).is_some());
        assert!(world.location(world.quest().giver_location).is_some());
    }

    #[test]
    fn exit_accepts_abbreviations() {
        let world = StaticWorld::new();
        assert_eq!(world.exit("entrance", "N"), Some("hall"));
        assert_eq!(world.exit("entrance", "north"), Some("hall"));
        assert_eq!(world.exit("entrance", "west"), None);
        assert_eq!(world.exit("nowhere", "north"), None);
    }

    #[test]
    fn start_location_is_peaceful() {
        let world = StaticWorld::new();
        assert!(world.monster_at(world.start_location()).is_none());
        assert!(world.monster_at("armory").is_some());
    }

    #[test]
    fn description_mentions_items_monster_and_exits() {
        let world = StaticWorld::new();
        let items = vec!["sword".to_string()];
        let text = render_location(&world, "armory", &items, Some("goblin"));
        assert!(text.starts_with("Armory"));
        assert!(text.contains("Notched Sword"));
        assert!(text.contains("goblin"));
        assert!(text.contains("Exits: west."));
    }
}
