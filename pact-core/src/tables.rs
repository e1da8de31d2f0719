//! SRD 5.1 progression tables.
//!
//! Literal lookup data keyed by level. Out-of-range keys are clamped to the
//! nearest bound before lookup.

use serde::{Deserialize, Serialize};
use std::fmt;

pub const LEVEL_MIN: u8 = 1;
pub const LEVEL_MAX: u8 = 20;

/// Proficiency bonus for character levels 1 through 20.
pub const PROFICIENCY_BY_LEVEL: [i32; 20] = [
    2, 2, 2, 2, // 1-4
    3, 3, 3, 3, // 5-8
    4, 4, 4, 4, // 9-12
    5, 5, 5, 5, // 13-16
    6, 6, 6, 6, // 17-20
];

/// Number and spell level of pact slots at a given warlock level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PactSlotInfo {
    pub count: u8,
    /// Spell level of every pact slot (not the character level).
    pub level: u8,
}

const fn pact(count: u8, level: u8) -> PactSlotInfo {
    PactSlotInfo { count, level }
}

/// Warlock Pact Magic table, index 0 is warlock level 1.
pub const PACT_SLOT_TABLE: [PactSlotInfo; 20] = [
    pact(1, 1),
    pact(2, 1),
    pact(2, 2),
    pact(2, 2),
    pact(2, 3),
    pact(2, 3),
    pact(2, 4),
    pact(2, 4),
    pact(2, 5),
    pact(2, 5),
    pact(3, 5),
    pact(3, 5),
    pact(3, 5),
    pact(3, 5),
    pact(3, 5),
    pact(3, 5),
    pact(4, 5),
    pact(4, 5),
    pact(4, 5),
    pact(4, 5),
];

/// Multiclass spellcaster slots, indexed by caster level (0..=20) then
/// spell level (index 0 is 1st level).
pub const MULTICLASS_SPELL_SLOTS: [[u8; 9]; 21] = [
    [0, 0, 0, 0, 0, 0, 0, 0, 0],
    [2, 0, 0, 0, 0, 0, 0, 0, 0],
    [3, 0, 0, 0, 0, 0, 0, 0, 0],
    [4, 2, 0, 0, 0, 0, 0, 0, 0],
    [4, 3, 0, 0, 0, 0, 0, 0, 0],
    [4, 3, 2, 0, 0, 0, 0, 0, 0],
    [4, 3, 3, 0, 0, 0, 0, 0, 0],
    [4, 3, 3, 1, 0, 0, 0, 0, 0],
    [4, 3, 3, 2, 0, 0, 0, 0, 0],
    [4, 3, 3, 3, 1, 0, 0, 0, 0],
    [4, 3, 3, 3, 2, 0, 0, 0, 0],
    [4, 3, 3, 3, 2, 1, 0, 0, 0],
    [4, 3, 3, 3, 2, 1, 0, 0, 0],
    [4, 3, 3, 3, 2, 1, 1, 0, 0],
    [4, 3, 3, 3, 2, 1, 1, 0, 0],
    [4, 3, 3, 3, 2, 1, 1, 1, 0],
    [4, 3, 3, 3, 2, 1, 1, 1, 0],
    [4, 3, 3, 3, 2, 1, 1, 1, 1],
    [4, 3, 3, 3, 3, 1, 1, 1, 1],
    [4, 3, 3, 3, 3, 2, 1, 1, 1],
    [4, 3, 3, 3, 3, 2, 2, 1, 1],
];

/// Character level at which each Mystic Arcanum level (6th-9th) unlocks.
pub const ARCANUM_UNLOCKS: [(u8, u8); 4] = [(6, 11), (7, 13), (8, 15), (9, 17)];

fn level_index(level: i64) -> usize {
    (level.clamp(LEVEL_MIN as i64, LEVEL_MAX as i64) - 1) as usize
}

/// Table lookup for the proficiency bonus.
pub fn proficiency_for_level(level: i64) -> i32 {
    PROFICIENCY_BY_LEVEL[level_index(level)]
}

/// Pact slot count and slot level for a warlock level.
pub fn pact_slot_info(level: i64) -> PactSlotInfo {
    PACT_SLOT_TABLE[level_index(level)]
}

/// Slot counts per spell level for a combined caster level.
pub fn spell_slots_for_caster_level(caster_level: i64) -> [u8; 9] {
    MULTICLASS_SPELL_SLOTS[caster_level.clamp(0, 20) as usize]
}

/// Character level required for an arcanum of the given spell level.
pub fn arcanum_unlock_level(spell_level: u8) -> Option<u8> {
    ARCANUM_UNLOCKS
        .iter()
        .find(|(lvl, _)| *lvl == spell_level)
        .map(|(_, unlock)| *unlock)
}

/// How much a class contributes to the multiclass caster level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CasterType {
    Full,
    Half,
    Third,
    #[default]
    None,
}

impl CasterType {
    pub fn contribution(&self, class_level: u8) -> u8 {
        match self {
            CasterType::Full => class_level,
            CasterType::Half => class_level / 2,
            CasterType::Third => class_level / 3,
            CasterType::None => 0,
        }
    }

    /// Caster type of an SRD class name. Subclass-gated third casters are
    /// written with their subclass in parentheses.
    pub fn for_class(class_name: &str) -> CasterType {
        match class_name.trim().to_ascii_lowercase().as_str() {
            "bard" | "cleric" | "druid" | "sorcerer" | "wizard" => CasterType::Full,
            "paladin" | "ranger" => CasterType::Half,
            "fighter (eldritch knight)" | "rogue (arcane trickster)" => CasterType::Third,
            _ => CasterType::None,
        }
    }
}

/// One class entry of a (possibly multiclassed) character.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClassLevel {
    pub class_name: String,
    pub level: u8,
    pub caster_type: CasterType,
}

impl ClassLevel {
    pub fn new(class_name: impl Into<String>, level: u8) -> Self {
        let class_name = class_name.into();
        let caster_type = CasterType::for_class(&class_name);
        Self {
            class_name,
            level,
            caster_type,
        }
    }

    pub fn with_caster_type(mut self, caster_type: CasterType) -> Self {
        self.caster_type = caster_type;
        self
    }
}

impl Default for ClassLevel {
    fn default() -> Self {
        Self {
            class_name: String::new(),
            level: 1,
            caster_type: CasterType::None,
        }
    }
}

impl fmt::Display for ClassLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.class_name, self.level)
    }
}

/// Total caster level across all classes, capped at 20.
pub fn calculate_caster_level(classes: &[ClassLevel]) -> u8 {
    let total: u32 = classes
        .iter()
        .map(|c| c.caster_type.contribution(c.level) as u32)
        .sum();
    total.min(20) as u8
}

/// Display form such as `Wizard 5 / Paladin 5`.
pub fn format_class_levels(classes: &[ClassLevel]) -> String {
    classes
        .iter()
        .filter(|c| c.level > 0)
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join(" / ")
}
