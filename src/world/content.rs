//! Static content tables for the built-in world.

use super::{Item, Location, Monster, Quest};

pub(super) const START: &str = "entrance";

pub(super) const LOCATIONS: &[Location] = &[
    Location {
        id: "entrance",
        name: "Cave Entrance",
        description: "Cold air spills out of a jagged opening in the hillside. \
                      Moss clings to the stones, and a passage leads north into the dark.",
        exits: &[("north", "hall"), ("east", "garden")],
        items: &["torch"],
        monster: None,
    },
    Location {
        id: "hall",
        name: "Great Hall",
        description: "Pillars carved with forgotten kings hold up a vaulted ceiling. \
                      An old keeper sits by a dying fire, watching you.",
        exits: &[
            ("south", "entrance"),
            ("east", "armory"),
            ("west", "library"),
            ("north", "lair"),
        ],
        items: &["map"],
        monster: None,
    },
    Location {
        id: "armory",
        name: "Armory",
        description: "Racks of rusted weapons line the walls. Something skitters \
                      behind a toppled shield.",
        exits: &[("west", "hall")],
        items: &["sword", "shield"],
        monster: Some("goblin"),
    },
    Location {
        id: "library",
        name: "Library",
        description: "Shelves sag under crumbling tomes. Dust hangs in the air like fog.",
        exits: &[("east", "hall")],
        items: &["key", "scroll"],
        monster: None,
    },
    Location {
        id: "garden",
        name: "Overgrown Garden",
        description: "Pale flowers grow between cracked flagstones, lit by a shaft \
                      of daylight from far above.",
        exits: &[("west", "entrance")],
        items: &["potion"],
        monster: None,
    },
    Location {
        id: "lair",
        name: "Dragon's Lair",
        description: "Heaps of tarnished coins glitter in the gloom. The air is \
                      hot and smells of sulphur.",
        exits: &[("south", "hall")],
        items: &["crown"],
        monster: Some("dragon"),
    },
];

pub(super) const ITEMS: &[Item] = &[
    Item {
        id: "torch",
        name: "Torch",
        description: "A pitch-soaked torch. It still smoulders faintly.",
    },
    Item {
        id: "map",
        name: "Faded Map",
        description: "A hand-drawn map of the caves. The lair is circled in red.",
    },
    Item {
        id: "sword",
        name: "Notched Sword",
        description: "A short sword, notched but still sharp.",
    },
    Item {
        id: "shield",
        name: "Dented Shield",
        description: "A round shield bearing a half-scraped crest.",
    },
    Item {
        id: "key",
        name: "Brass Key",
        description: "A heavy brass key engraved with the keeper's sigil.",
    },
    Item {
        id: "scroll",
        name: "Brittle Scroll",
        description: "A scroll covered in spidery runes you cannot read.",
    },
    Item {
        id: "potion",
        name: "Healing Potion",
        description: "A small vial of glowing red liquid.",
    },
    Item {
        id: "crown",
        name: "Tarnished Crown",
        description: "A crown of blackened gold, heavier than it looks.",
    },
];

pub(super) const MONSTERS: &[Monster] = &[
    Monster {
        id: "goblin",
        name: "Goblin",
        description: "A wiry goblin with a chipped dagger and a nasty grin.",
    },
    Monster {
        id: "dragon",
        name: "Dragon",
        description: "An ancient dragon, scales dulled with age, eyes still burning.",
    },
];

pub(super) const QUEST: Quest = Quest {
    id: "keepers_key",
    title: "The Keeper's Key",
    giver_location: "hall",
    required_item: "key",
    briefing: "The keeper lost his brass key somewhere among the library shelves. \
               Bring it back to him in the Great Hall.",
    reward: "The keeper takes the key with trembling hands and tells you the \
             dragon sleeps lightly at dawn.",
};
