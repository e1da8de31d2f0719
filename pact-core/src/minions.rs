//! Summoned and controlled creatures.
//!
//! Minions live in a [`MinionRegistry`]: an id-keyed arena plus the order in
//! which they were added. A minion owns its own hit points, armor class and
//! attacks and holds no reference back to the character that raised it.

use crate::validation::{self, MINION_AC_MAX, MINION_NAME_MAX};
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use uuid::Uuid;

/// Rounds in 24 hours, the length of control over an animated corpse.
pub const ANIMATE_DEAD_CONTROL_ROUNDS: u32 = 14_400;
/// Rounds in one hour, the duration of Summon Undead.
pub const SUMMON_UNDEAD_ROUNDS: u32 = 600;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MinionId(pub Uuid);

impl MinionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MinionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MinionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MinionKind {
    #[default]
    Skeleton,
    Zombie,
    UndeadSpirit,
}

/// Summon Undead spirit forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpiritForm {
    Ghostly,
    Putrid,
    Skeletal,
}

/// Descriptive attack data. The damage formula is rolled by the dice module,
/// never here.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MinionAttack {
    pub name: String,
    pub to_hit: i32,
    pub damage: String,
    pub damage_type: String,
}

impl MinionAttack {
    pub fn new(name: &str, to_hit: i32, damage: impl Into<String>, damage_type: &str) -> Self {
        Self {
            name: name.to_string(),
            to_hit,
            damage: damage.into(),
            damage_type: damage_type.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Minion {
    pub id: MinionId,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: MinionKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub form: Option<SpiritForm>,
    pub hp: i32,
    pub max_hp: i32,
    pub ac: i32,
    pub speed: i32,
    pub attacks: Vec<MinionAttack>,
    pub conditions: BTreeSet<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub control_expires_round: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl Default for Minion {
    fn default() -> Self {
        Self {
            id: MinionId::new(),
            name: "Minion".to_string(),
            kind: MinionKind::default(),
            form: None,
            hp: 1,
            max_hp: 1,
            ac: 10,
            speed: 30,
            attacks: Vec::new(),
            conditions: BTreeSet::new(),
            control_expires_round: None,
            notes: None,
        }
    }
}

impl Minion {
    pub fn is_down(&self) -> bool {
        self.hp == 0
    }

    pub fn control_expired(&self, round: u32) -> bool {
        self.control_expires_round.is_some_and(|expires| round >= expires)
    }
}

/// Partial update for a minion. `None` fields are left alone.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MinionChanges {
    pub name: Option<String>,
    pub hp: Option<i64>,
    pub max_hp: Option<i64>,
    pub ac: Option<i64>,
    pub speed: Option<i64>,
    pub attacks: Option<Vec<MinionAttack>>,
    pub notes: Option<String>,
    pub control_expires_round: Option<u32>,
}

// ============================================================================
// Templates
// ============================================================================

lazy_static! {
    static ref SKELETON: Minion = Minion {
        name: "Skeleton".to_string(),
        kind: MinionKind::Skeleton,
        hp: 13,
        max_hp: 13,
        ac: 13,
        speed: 30,
        attacks: vec![
            MinionAttack::new("Shortsword", 4, "1d6+2", "piercing"),
            MinionAttack::new("Shortbow", 4, "1d6+2", "piercing"),
        ],
        ..Default::default()
    };
    static ref ZOMBIE: Minion = Minion {
        name: "Zombie".to_string(),
        kind: MinionKind::Zombie,
        hp: 22,
        max_hp: 22,
        ac: 8,
        speed: 20,
        attacks: vec![MinionAttack::new("Slam", 3, "1d6+1", "bludgeoning")],
        ..Default::default()
    };
}

/// An Animate Dead skeleton under control until `current_round` + 24 hours.
pub fn skeleton(current_round: u32) -> Minion {
    Minion {
        id: MinionId::new(),
        control_expires_round: Some(current_round.saturating_add(ANIMATE_DEAD_CONTROL_ROUNDS)),
        ..SKELETON.clone()
    }
}

/// An Animate Dead zombie under control until `current_round` + 24 hours.
pub fn zombie(current_round: u32) -> Minion {
    Minion {
        id: MinionId::new(),
        control_expires_round: Some(current_round.saturating_add(ANIMATE_DEAD_CONTROL_ROUNDS)),
        ..ZOMBIE.clone()
    }
}

/// A Summon Undead spirit scaled to the slot it was cast with.
///
/// AC is 11 + slot level; HP is 30 (20 for skeletal) plus 10 per slot level
/// above 3rd; attacks use the caster's spell attack bonus and add the slot
/// level to damage.
pub fn undead_spirit(form: SpiritForm, slot_level: u8, spell_attack: i32, current_round: u32) -> Minion {
    let slot_level = slot_level.clamp(3, 9) as i32;
    let base_hp = match form {
        SpiritForm::Skeletal => 20,
        SpiritForm::Ghostly | SpiritForm::Putrid => 30,
    };
    let hp = base_hp + 10 * (slot_level - 3);
    let bonus = 3 + slot_level;
    let (speed, attack) = match form {
        SpiritForm::Ghostly => (
            40,
            MinionAttack::new("Deathly Touch", spell_attack, format!("1d8+{bonus}"), "necrotic"),
        ),
        SpiritForm::Putrid => (
            30,
            MinionAttack::new("Rotting Claw", spell_attack, format!("1d6+{bonus}"), "slashing"),
        ),
        SpiritForm::Skeletal => (
            30,
            MinionAttack::new("Grave Bolt", spell_attack, format!("2d4+{bonus}"), "necrotic"),
        ),
    };

    Minion {
        id: MinionId::new(),
        name: "Undead Spirit".to_string(),
        kind: MinionKind::UndeadSpirit,
        form: Some(form),
        hp,
        max_hp: hp,
        ac: 11 + slot_level,
        speed,
        attacks: vec![attack],
        conditions: BTreeSet::new(),
        control_expires_round: Some(current_round.saturating_add(SUMMON_UNDEAD_ROUNDS)),
        notes: None,
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Id-keyed minion storage that remembers insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MinionRegistry {
    entities: HashMap<MinionId, Minion>,
    ids: Vec<MinionId>,
}

impl MinionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a registry from a saved list, sanitizing each record.
    /// Entries with a duplicate id get a fresh one.
    pub fn from_minions(minions: impl IntoIterator<Item = Minion>) -> Self {
        let mut registry = Self::new();
        for minion in minions {
            let mut minion = validation::sanitize_minion(minion);
            if registry.entities.contains_key(&minion.id) {
                minion.id = MinionId::new();
            }
            registry.ids.push(minion.id);
            registry.entities.insert(minion.id, minion);
        }
        registry
    }

    /// Add a minion under a freshly generated id and return that id.
    pub fn insert(&mut self, mut minion: Minion) -> MinionId {
        let id = MinionId::new();
        minion.id = id;
        let minion = validation::sanitize_minion(minion);
        self.ids.push(id);
        self.entities.insert(id, minion);
        id
    }

    pub fn get(&self, id: MinionId) -> Option<&Minion> {
        self.entities.get(&id)
    }

    pub fn contains(&self, id: MinionId) -> bool {
        self.entities.contains_key(&id)
    }

    pub fn remove(&mut self, id: MinionId) -> Option<Minion> {
        let removed = self.entities.remove(&id)?;
        self.ids.retain(|other| *other != id);
        Some(removed)
    }

    pub fn clear(&mut self) -> usize {
        let count = self.ids.len();
        self.entities.clear();
        self.ids.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> &[MinionId] {
        &self.ids
    }

    /// Minions in the order they were added.
    pub fn iter(&self) -> impl Iterator<Item = &Minion> {
        self.ids.iter().filter_map(|id| self.entities.get(id))
    }

    pub fn to_vec(&self) -> Vec<Minion> {
        self.iter().cloned().collect()
    }

    /// Returns the new HP, or `None` for an unknown id.
    pub fn damage(&mut self, id: MinionId, amount: i32) -> Option<i32> {
        let minion = self.entities.get_mut(&id)?;
        minion.hp = minion.hp.saturating_sub(amount.max(0)).clamp(0, minion.max_hp);
        Some(minion.hp)
    }

    pub fn heal(&mut self, id: MinionId, amount: i32) -> Option<i32> {
        let minion = self.entities.get_mut(&id)?;
        minion.hp = minion.hp.saturating_add(amount.max(0)).clamp(0, minion.max_hp);
        Some(minion.hp)
    }

    /// Apply a partial update. Numeric fields are clamped into their valid
    /// ranges and a blank name keeps the old one.
    pub fn update(&mut self, id: MinionId, changes: MinionChanges) -> bool {
        let Some(minion) = self.entities.get_mut(&id) else {
            return false;
        };

        if let Some(name) = changes.name {
            let trimmed = name.trim();
            if !trimmed.is_empty() {
                minion.name = trimmed.chars().take(MINION_NAME_MAX).collect();
            }
        }
        if let Some(max_hp) = changes.max_hp {
            minion.max_hp = clamp_i64(max_hp, 1, i32::MAX as i64);
        }
        if let Some(hp) = changes.hp {
            minion.hp = clamp_i64(hp, 0, i32::MAX as i64);
        }
        minion.hp = minion.hp.min(minion.max_hp);
        if let Some(ac) = changes.ac {
            minion.ac = clamp_i64(ac, 0, MINION_AC_MAX as i64);
        }
        if let Some(speed) = changes.speed {
            minion.speed = clamp_i64(speed, 0, i32::MAX as i64);
        }
        if let Some(attacks) = changes.attacks {
            minion.attacks = attacks;
        }
        if let Some(notes) = changes.notes {
            minion.notes = Some(notes);
        }
        if let Some(round) = changes.control_expires_round {
            minion.control_expires_round = Some(round);
        }
        true
    }

    /// Returns false for an unknown id or a condition already present.
    pub fn add_condition(&mut self, id: MinionId, condition: &str) -> bool {
        let condition = condition.trim();
        if condition.is_empty() {
            return false;
        }
        self.entities
            .get_mut(&id)
            .is_some_and(|m| m.conditions.insert(condition.to_string()))
    }

    pub fn remove_condition(&mut self, id: MinionId, condition: &str) -> bool {
        self.entities
            .get_mut(&id)
            .is_some_and(|m| m.conditions.remove(condition.trim()))
    }

    /// Minions whose control has lapsed by `round`.
    pub fn expired(&self, round: u32) -> Vec<MinionId> {
        self.iter()
            .filter(|m| m.control_expired(round))
            .map(|m| m.id)
            .collect()
    }
}

fn clamp_i64(value: i64, min: i64, max: i64) -> i32 {
    value.clamp(min, max) as i32
}
