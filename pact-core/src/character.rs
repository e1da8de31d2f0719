//! Character resource state.
//!
//! The mutable record of a single player character: hit points, hit dice,
//! spell and pact slots, death saves, concentration, attunement, inventory
//! and an optional Wild Shape form. Every operation keeps the bounds of
//! the record intact; a request that cannot be honored leaves the character
//! unchanged and reports that through its return value.

use crate::derived::{self, recalculate_derived};
use crate::dice::RandomSource;
use crate::tables::{arcanum_unlock_level, ClassLevel, LEVEL_MAX, LEVEL_MIN};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub const MAX_ATTUNED_ITEMS: usize = 3;
pub const MAX_DEATH_SAVES: u8 = 3;
pub const ABILITY_SCORE_MIN: i32 = 1;
pub const ABILITY_SCORE_MAX: i32 = 30;

/// Invocation id that grants Mage Armor at will.
pub const ARMOR_OF_SHADOWS: &str = "armor-of-shadows";

// ============================================================================
// Abilities
// ============================================================================

/// The six ability scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ability {
    Str,
    Dex,
    Con,
    Int,
    Wis,
    Cha,
}

impl Ability {
    pub fn abbreviation(&self) -> &'static str {
        match self {
            Ability::Str => "STR",
            Ability::Dex => "DEX",
            Ability::Con => "CON",
            Ability::Int => "INT",
            Ability::Wis => "WIS",
            Ability::Cha => "CHA",
        }
    }

    pub fn all() -> [Ability; 6] {
        [
            Ability::Str,
            Ability::Dex,
            Ability::Con,
            Ability::Int,
            Ability::Wis,
            Ability::Cha,
        ]
    }
}

impl fmt::Display for Ability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.abbreviation())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AbilityScores {
    pub str: i32,
    pub dex: i32,
    pub con: i32,
    pub int: i32,
    pub wis: i32,
    pub cha: i32,
}

impl AbilityScores {
    pub fn new(str: i32, dex: i32, con: i32, int: i32, wis: i32, cha: i32) -> Self {
        Self {
            str,
            dex,
            con,
            int,
            wis,
            cha,
        }
    }

    pub fn get(&self, ability: Ability) -> i32 {
        match ability {
            Ability::Str => self.str,
            Ability::Dex => self.dex,
            Ability::Con => self.con,
            Ability::Int => self.int,
            Ability::Wis => self.wis,
            Ability::Cha => self.cha,
        }
    }

    pub fn set(&mut self, ability: Ability, score: i32) {
        match ability {
            Ability::Str => self.str = score,
            Ability::Dex => self.dex = score,
            Ability::Con => self.con = score,
            Ability::Int => self.int = score,
            Ability::Wis => self.wis = score,
            Ability::Cha => self.cha = score,
        }
    }
}

impl Default for AbilityScores {
    fn default() -> Self {
        Self::new(10, 10, 10, 10, 10, 10)
    }
}

/// Modifiers derived from [`AbilityScores`]. Never set directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AbilityModifiers {
    pub str: i32,
    pub dex: i32,
    pub con: i32,
    pub int: i32,
    pub wis: i32,
    pub cha: i32,
}

impl AbilityModifiers {
    pub fn get(&self, ability: Ability) -> i32 {
        match ability {
            Ability::Str => self.str,
            Ability::Dex => self.dex,
            Ability::Con => self.con,
            Ability::Int => self.int,
            Ability::Wis => self.wis,
            Ability::Cha => self.cha,
        }
    }
}

/// A skill and how well the character knows it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Skill {
    pub name: String,
    pub ability: Ability,
    #[serde(default)]
    pub proficient: bool,
    #[serde(default)]
    pub expert: bool,
}

const SRD_SKILLS: [(&str, Ability); 18] = [
    ("Acrobatics", Ability::Dex),
    ("Animal Handling", Ability::Wis),
    ("Arcana", Ability::Int),
    ("Athletics", Ability::Str),
    ("Deception", Ability::Cha),
    ("History", Ability::Int),
    ("Insight", Ability::Wis),
    ("Intimidation", Ability::Cha),
    ("Investigation", Ability::Int),
    ("Medicine", Ability::Wis),
    ("Nature", Ability::Int),
    ("Perception", Ability::Wis),
    ("Performance", Ability::Cha),
    ("Persuasion", Ability::Cha),
    ("Religion", Ability::Int),
    ("Sleight of Hand", Ability::Dex),
    ("Stealth", Ability::Dex),
    ("Survival", Ability::Wis),
];

fn srd_skills(proficient: &[&str]) -> Vec<Skill> {
    SRD_SKILLS
        .iter()
        .map(|(name, ability)| Skill {
            name: name.to_string(),
            ability: *ability,
            proficient: proficient.contains(name),
            expert: false,
        })
        .collect()
}

// ============================================================================
// Resources
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HitPoints {
    pub current: i32,
    pub max: i32,
    pub temp: i32,
}

impl Default for HitPoints {
    fn default() -> Self {
        Self {
            current: 1,
            max: 1,
            temp: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HitDice {
    pub current: i32,
    pub max: i32,
    /// Die faces, e.g. 8 for a d8.
    pub size: i32,
}

impl Default for HitDice {
    fn default() -> Self {
        Self {
            current: 1,
            max: 1,
            size: 8,
        }
    }
}

/// Usage of one standard spell slot level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SlotUsage {
    pub used: i32,
    pub max: i32,
}

impl SlotUsage {
    pub fn available(&self) -> i32 {
        (self.max - self.used).max(0)
    }
}

/// Warlock pact slots. All slots share one spell level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PactSlots {
    pub current: i32,
    pub max: i32,
    pub level: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ArcanumSlot {
    pub spell_name: String,
    pub used: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DeathSaves {
    pub successes: u8,
    pub failures: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeathSaveKind {
    Success,
    Failure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeathSaveStatus {
    Pending,
    Stabilized,
    Dead,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ItemCharges {
    pub current: i32,
    pub max: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InventoryItem {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub charges: Option<ItemCharges>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub spells: Vec<String>,
}

impl InventoryItem {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_charges(mut self, current: i32, max: i32) -> Self {
        self.charges = Some(ItemCharges { current, max });
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FormHitPoints {
    pub current: i32,
    pub max: i32,
}

/// An alternate form (Wild Shape, Polymorph) with its own hit point pool.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Transformation {
    pub creature_name: String,
    pub hp: FormHitPoints,
    pub ac: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Invocation {
    pub id: String,
    pub name: String,
    pub description: String,
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uses_per_long_rest: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_uses: Option<u32>,
}

impl Invocation {
    pub fn new(id: impl Into<String>, name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: description.into(),
            active: true,
            uses_per_long_rest: None,
            current_uses: None,
        }
    }

    pub fn with_uses(mut self, per_long_rest: u32) -> Self {
        self.uses_per_long_rest = Some(per_long_rest);
        self.current_uses = Some(per_long_rest);
        self
    }
}

/// Toggleable spell effects that change armor class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AcEffects {
    pub mage_armor: bool,
    pub shield_spell: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcEffect {
    MageArmor,
    ShieldSpell,
}

// ============================================================================
// Operation outcomes
// ============================================================================

/// What a hit point change actually did.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HpChange {
    pub previous: i32,
    pub current: i32,
    pub temp_absorbed: i32,
    /// Damage that reached current HP after temporary HP.
    pub damage_taken: i32,
    pub healed: i32,
    /// Concentration ended because HP reached 0.
    pub concentration_lost: Option<String>,
    pub death_saves_reset: bool,
}

impl HpChange {
    fn unchanged(hp: i32) -> Self {
        Self {
            previous: hp,
            current: hp,
            ..Default::default()
        }
    }
}

/// Damage routed through an alternate form before reaching the character.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DamageOutcome {
    pub form_damage: i32,
    /// Name of the form that dropped to 0 and reverted.
    pub form_ended: Option<String>,
    pub hp: HpChange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HitDieSpend {
    pub roll: i32,
    pub healing: i32,
    pub applied: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LongRestSummary {
    pub hp_restored: i32,
    pub hit_dice_recovered: i32,
    pub pact_slots_restored: i32,
    pub concentration_ended: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttuneOutcome {
    Attuned,
    AtCapacity,
    InvalidName,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargeOutcome {
    Consumed { remaining: i32 },
    Empty,
    Missing,
}

// ============================================================================
// Character
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Character {
    pub name: String,
    pub level: u8,
    pub abilities: AbilityScores,
    pub ability_mods: AbilityModifiers,
    pub prof_bonus: i32,
    pub hp: HitPoints,
    pub hit_dice: HitDice,
    /// Standard slots, index 0 is 1st level.
    pub slots: [SlotUsage; 9],
    pub pact_slots: PactSlots,
    pub arcanum: BTreeMap<u8, ArcanumSlot>,
    pub death_saves: DeathSaves,
    pub concentration: Option<String>,
    pub attunement: Vec<String>,
    pub inventory: Vec<InventoryItem>,
    pub transformed: Option<Transformation>,
    pub invocations: Vec<Invocation>,
    pub base_ac: i32,
    pub max_dex_bonus: Option<i32>,
    pub shield_bonus: i32,
    pub other_ac_bonus: i32,
    pub ac_effects: AcEffects,
    pub spell_save_dc: i32,
    pub spellcasting_ability: Ability,
    pub saving_throw_proficiencies: Vec<Ability>,
    pub skills: Vec<Skill>,
    /// Class breakdown for multiclass characters; empty means single-class.
    pub classes: Vec<ClassLevel>,
}

impl Default for Character {
    /// A level 5 Fiend warlock.
    fn default() -> Self {
        let base = Self {
            name: "Warlock".to_string(),
            level: 5,
            abilities: AbilityScores::new(8, 14, 14, 10, 12, 16),
            ability_mods: AbilityModifiers::default(),
            prof_bonus: 0,
            hp: HitPoints {
                current: 38,
                max: 38,
                temp: 0,
            },
            hit_dice: HitDice {
                current: 5,
                max: 5,
                size: 8,
            },
            slots: [SlotUsage::default(); 9],
            pact_slots: PactSlots {
                current: 2,
                max: 2,
                level: 3,
            },
            arcanum: BTreeMap::new(),
            death_saves: DeathSaves::default(),
            concentration: None,
            attunement: Vec::new(),
            inventory: vec![
                InventoryItem::new("Arcane Focus (Rod)"),
                InventoryItem::new("Leather Armor"),
                InventoryItem::new("Dungeoneer's Pack"),
            ],
            transformed: None,
            invocations: default_invocations(),
            base_ac: 11,
            max_dex_bonus: None,
            shield_bonus: 0,
            other_ac_bonus: 0,
            ac_effects: AcEffects::default(),
            spell_save_dc: 0,
            spellcasting_ability: Ability::Cha,
            saving_throw_proficiencies: vec![Ability::Wis, Ability::Cha],
            skills: srd_skills(&["Arcana", "Deception", "Intimidation"]),
            classes: Vec::new(),
        };
        recalculate_derived(&base)
    }
}

/// Invocations a fresh warlock starts with.
pub fn default_invocations() -> Vec<Invocation> {
    vec![
        Invocation::new(
            "agonizing-blast",
            "Agonizing Blast",
            "Add your Charisma modifier to the damage of eldritch blast.",
        ),
        Invocation::new(
            "devils-sight",
            "Devil's Sight",
            "See normally in magical and nonmagical darkness out to 120 feet.",
        ),
        Invocation::new(
            "repelling-blast",
            "Repelling Blast",
            "Eldritch blast pushes a creature it hits up to 10 feet away.",
        ),
    ]
}

impl Character {
    /// Recompute derived fields in place.
    pub fn recalculate(&mut self) {
        *self = recalculate_derived(self);
    }

    pub fn set_level(&mut self, level: u8) {
        self.level = level.clamp(LEVEL_MIN, LEVEL_MAX);
        self.recalculate();
    }

    pub fn set_ability_score(&mut self, ability: Ability, score: i32) {
        self.abilities
            .set(ability, score.clamp(ABILITY_SCORE_MIN, ABILITY_SCORE_MAX));
        self.recalculate();
    }

    pub fn is_concentrating(&self) -> bool {
        self.concentration.is_some()
    }

    pub fn skill_bonus(&self, skill_name: &str) -> Option<i32> {
        self.skills
            .iter()
            .find(|s| s.name.eq_ignore_ascii_case(skill_name))
            .map(|s| {
                derived::skill_modifier(
                    self.ability_mods.get(s.ability),
                    self.prof_bonus,
                    s.proficient,
                    s.expert,
                )
            })
    }

    pub fn saving_throw_bonus(&self, ability: Ability) -> i32 {
        derived::saving_throw_modifier(
            self.ability_mods.get(ability),
            self.prof_bonus,
            self.saving_throw_proficiencies.contains(&ability),
        )
    }

    pub fn initiative_bonus(&self) -> i32 {
        derived::initiative_bonus(self.ability_mods.dex)
    }

    // ------------------------------------------------------------------------
    // Hit points
    // ------------------------------------------------------------------------

    /// Move current HP toward `new_current`.
    ///
    /// A lower value is damage: temporary HP absorbs first and the rest comes
    /// off current HP, never below 0. Reaching 0 HP ends concentration on the
    /// spot. A higher value is healing: only current HP moves, clamped to max,
    /// and rising from exactly 0 resets the death saves.
    pub fn change_hp(&mut self, new_current: i32) -> HpChange {
        let previous = self.hp.current;
        let delta = new_current.saturating_sub(previous);

        if delta < 0 {
            let damage = delta.saturating_abs();
            let temp_absorbed = self.hp.temp.min(damage);
            let remaining = damage - temp_absorbed;
            let next = (previous - remaining).max(0);

            self.hp.temp -= temp_absorbed;
            self.hp.current = next;

            let concentration_lost = if next == 0 {
                self.concentration.take()
            } else {
                None
            };

            HpChange {
                previous,
                current: next,
                temp_absorbed,
                damage_taken: previous - next,
                healed: 0,
                concentration_lost,
                death_saves_reset: false,
            }
        } else {
            let was_at_zero = previous == 0;
            self.hp.current = new_current.clamp(0, self.hp.max);

            let death_saves_reset = was_at_zero && self.hp.current > 0;
            if death_saves_reset {
                self.death_saves = DeathSaves::default();
            }

            HpChange {
                previous,
                current: self.hp.current,
                healed: self.hp.current - previous,
                death_saves_reset,
                ..Default::default()
            }
        }
    }

    /// Apply `amount` damage, routing it through an alternate form first.
    ///
    /// When the form's pool is exhausted the form ends and the excess carries
    /// over to the character (through temporary HP as usual).
    pub fn take_damage(&mut self, amount: i32) -> DamageOutcome {
        if amount <= 0 {
            return DamageOutcome {
                hp: HpChange::unchanged(self.hp.current),
                ..Default::default()
            };
        }

        let Some(form) = self.transformed.as_mut() else {
            let target = self.hp.current.saturating_sub(amount);
            return DamageOutcome {
                hp: self.change_hp(target),
                ..Default::default()
            };
        };

        if amount < form.hp.current {
            form.hp.current -= amount;
            return DamageOutcome {
                form_damage: amount,
                form_ended: None,
                hp: HpChange::unchanged(self.hp.current),
            };
        }

        let form_damage = form.hp.current;
        let carryover = amount - form_damage;
        let form_ended = self.transformed.take().map(|f| f.creature_name);
        let hp = if carryover > 0 {
            let target = self.hp.current.saturating_sub(carryover);
            self.change_hp(target)
        } else {
            HpChange::unchanged(self.hp.current)
        };

        DamageOutcome {
            form_damage,
            form_ended,
            hp,
        }
    }

    pub fn heal(&mut self, amount: i32) -> HpChange {
        if amount <= 0 {
            return HpChange::unchanged(self.hp.current);
        }
        let target = self.hp.current.saturating_add(amount);
        self.change_hp(target)
    }

    /// Temporary HP from a new source replaces the old only if it is larger.
    pub fn set_temp_hp(&mut self, new_temp: i32) -> bool {
        if new_temp > self.hp.temp {
            self.hp.temp = new_temp;
            true
        } else {
            false
        }
    }

    pub fn clear_temp_hp(&mut self) {
        self.hp.temp = 0;
    }

    pub fn can_spend_hit_die(&self) -> bool {
        self.hit_dice.current > 0 && self.hp.current < self.hp.max && self.hit_dice.size > 0
    }

    /// Roll one hit die plus CON and heal by the result.
    ///
    /// The die is spent even when the total is floored to 0.
    pub fn spend_hit_die<R: RandomSource + ?Sized>(&mut self, rng: &mut R) -> Option<HitDieSpend> {
        if !self.can_spend_hit_die() {
            return None;
        }
        let roll = rng.roll_die(self.hit_dice.size as u32) as i32;
        let healing = (roll + self.ability_mods.con).max(0);
        let applied = healing.min(self.hp.max - self.hp.current);

        self.hit_dice.current -= 1;
        self.hp.current += applied;

        Some(HitDieSpend {
            roll,
            healing,
            applied,
        })
    }

    // ------------------------------------------------------------------------
    // Rests
    // ------------------------------------------------------------------------

    pub fn long_rest(&mut self) -> LongRestSummary {
        let hp_restored = self.hp.max - self.hp.current;
        self.hp.current = self.hp.max;
        self.hp.temp = 0;

        let recovered = ((self.hit_dice.max + 1) / 2).max(1);
        let before = self.hit_dice.current;
        self.hit_dice.current = (before + recovered).min(self.hit_dice.max);

        for slot in self.slots.iter_mut() {
            slot.used = 0;
        }
        let pact_slots_restored = self.refill_pact_slots();

        for slot in self.arcanum.values_mut() {
            slot.used = false;
        }
        for invocation in self.invocations.iter_mut() {
            if let Some(uses) = invocation.uses_per_long_rest {
                invocation.current_uses = Some(uses);
            }
        }

        self.ac_effects = AcEffects::default();
        self.death_saves = DeathSaves::default();
        let concentration_ended = self.concentration.take();

        LongRestSummary {
            hp_restored,
            hit_dice_recovered: self.hit_dice.current - before,
            pact_slots_restored,
            concentration_ended,
        }
    }

    /// Pact slots come back on a short rest; standard slots do not.
    pub fn short_rest(&mut self) -> i32 {
        self.refill_pact_slots()
    }

    // ------------------------------------------------------------------------
    // Slots
    // ------------------------------------------------------------------------

    pub fn use_pact_slot(&mut self) -> bool {
        if self.pact_slots.current > 0 {
            self.pact_slots.current -= 1;
            true
        } else {
            false
        }
    }

    pub fn restore_pact_slot(&mut self) -> bool {
        if self.pact_slots.current < self.pact_slots.max {
            self.pact_slots.current += 1;
            true
        } else {
            false
        }
    }

    /// Returns how many slots came back.
    pub fn refill_pact_slots(&mut self) -> i32 {
        let restored = (self.pact_slots.max - self.pact_slots.current).max(0);
        self.pact_slots.current = self.pact_slots.max;
        restored
    }

    fn slot_mut(&mut self, level: u8) -> Option<&mut SlotUsage> {
        if (1..=9).contains(&level) {
            self.slots.get_mut(level as usize - 1)
        } else {
            None
        }
    }

    pub fn slot(&self, level: u8) -> Option<&SlotUsage> {
        if (1..=9).contains(&level) {
            self.slots.get(level as usize - 1)
        } else {
            None
        }
    }

    pub fn expend_slot(&mut self, level: u8) -> bool {
        match self.slot_mut(level) {
            Some(slot) if slot.used < slot.max => {
                slot.used += 1;
                true
            }
            _ => false,
        }
    }

    pub fn restore_slot(&mut self, level: u8) -> bool {
        match self.slot_mut(level) {
            Some(slot) if slot.used > 0 => {
                slot.used -= 1;
                true
            }
            _ => false,
        }
    }

    /// Whether a cast at `level` can be paid for, by pact or standard slot.
    pub fn can_cast_at(&self, level: u8) -> bool {
        level == 0
            || (self.pact_slots.level == level && self.pact_slots.current > 0)
            || self.slot(level).is_some_and(|s| s.available() > 0)
    }

    // ------------------------------------------------------------------------
    // Invocations and arcanum
    // ------------------------------------------------------------------------

    pub fn has_active_invocation(&self, id: &str) -> bool {
        self.invocations.iter().any(|i| i.active && i.id == id)
    }

    /// Flip an invocation on or off. Returns the new state.
    pub fn toggle_invocation(&mut self, id: &str) -> Option<bool> {
        let invocation = self.invocations.iter_mut().find(|i| i.id == id)?;
        invocation.active = !invocation.active;
        Some(invocation.active)
    }

    pub fn consume_invocation_use(&mut self, id: &str) -> bool {
        match self
            .invocations
            .iter_mut()
            .find(|i| i.id == id)
            .and_then(|i| i.current_uses.as_mut())
        {
            Some(uses) if *uses > 0 => {
                *uses -= 1;
                true
            }
            _ => false,
        }
    }

    pub fn arcanum_unlocked(&self, spell_level: u8) -> bool {
        arcanum_unlock_level(spell_level).is_some_and(|required| self.level >= required)
    }

    pub fn set_arcanum_spell(&mut self, spell_level: u8, spell_name: &str) -> bool {
        let name = spell_name.trim();
        if !self.arcanum_unlocked(spell_level) || name.is_empty() {
            return false;
        }
        self.arcanum.entry(spell_level).or_default().spell_name = name.to_string();
        true
    }

    pub fn use_arcanum(&mut self, spell_level: u8) -> bool {
        if !self.arcanum_unlocked(spell_level) {
            return false;
        }
        match self.arcanum.get_mut(&spell_level) {
            Some(slot) if !slot.used => {
                slot.used = true;
                true
            }
            _ => false,
        }
    }

    pub fn restore_arcanum(&mut self, spell_level: u8) -> bool {
        match self.arcanum.get_mut(&spell_level) {
            Some(slot) if slot.used => {
                slot.used = false;
                true
            }
            _ => false,
        }
    }

    // ------------------------------------------------------------------------
    // Death saves
    // ------------------------------------------------------------------------

    pub fn death_save_status(&self) -> DeathSaveStatus {
        if self.death_saves.failures >= MAX_DEATH_SAVES {
            DeathSaveStatus::Dead
        } else if self.death_saves.successes >= MAX_DEATH_SAVES {
            DeathSaveStatus::Stabilized
        } else {
            DeathSaveStatus::Pending
        }
    }

    pub fn record_death_save(&mut self, kind: DeathSaveKind) -> DeathSaveStatus {
        let counter = match kind {
            DeathSaveKind::Success => &mut self.death_saves.successes,
            DeathSaveKind::Failure => &mut self.death_saves.failures,
        };
        *counter = (*counter + 1).min(MAX_DEATH_SAVES);
        self.death_save_status()
    }

    pub fn set_death_save(&mut self, kind: DeathSaveKind, value: u8) -> DeathSaveStatus {
        let value = value.min(MAX_DEATH_SAVES);
        match kind {
            DeathSaveKind::Success => self.death_saves.successes = value,
            DeathSaveKind::Failure => self.death_saves.failures = value,
        }
        self.death_save_status()
    }

    // ------------------------------------------------------------------------
    // Concentration and effects
    // ------------------------------------------------------------------------

    /// Start concentrating; returns the spell that was dropped, if any.
    pub fn start_concentration(&mut self, spell_name: impl Into<String>) -> Option<String> {
        self.concentration.replace(spell_name.into())
    }

    pub fn end_concentration(&mut self) -> Option<String> {
        self.concentration.take()
    }

    /// Returns whether the flag changed.
    pub fn set_ac_effect(&mut self, effect: AcEffect, active: bool) -> bool {
        let flag = match effect {
            AcEffect::MageArmor => &mut self.ac_effects.mage_armor,
            AcEffect::ShieldSpell => &mut self.ac_effects.shield_spell,
        };
        let changed = *flag != active;
        *flag = active;
        changed
    }

    pub fn armor_class(&self) -> i32 {
        derived::current_armor_class(self)
    }

    pub fn start_transformation(&mut self, creature_name: &str, hp: i32, ac: i32) -> bool {
        let name = creature_name.trim();
        if name.is_empty() || hp < 1 {
            return false;
        }
        self.transformed = Some(Transformation {
            creature_name: name.to_string(),
            hp: FormHitPoints {
                current: hp,
                max: hp,
            },
            ac: ac.max(0),
        });
        true
    }

    pub fn end_transformation(&mut self) -> Option<Transformation> {
        self.transformed.take()
    }

    // ------------------------------------------------------------------------
    // Attunement and inventory
    // ------------------------------------------------------------------------

    pub fn add_attuned_item(&mut self, name: &str) -> AttuneOutcome {
        let name = name.trim();
        if name.is_empty() {
            return AttuneOutcome::InvalidName;
        }
        if self.attunement.len() >= MAX_ATTUNED_ITEMS {
            return AttuneOutcome::AtCapacity;
        }
        self.attunement.push(name.to_string());
        AttuneOutcome::Attuned
    }

    pub fn remove_attuned_item(&mut self, index: usize) -> Option<String> {
        (index < self.attunement.len()).then(|| self.attunement.remove(index))
    }

    pub fn add_inventory_item(&mut self, item: InventoryItem) {
        self.inventory.push(item);
    }

    pub fn remove_inventory_item(&mut self, index: usize) -> Option<InventoryItem> {
        (index < self.inventory.len()).then(|| self.inventory.remove(index))
    }

    pub fn update_inventory_item(&mut self, index: usize, item: InventoryItem) -> bool {
        match self.inventory.get_mut(index) {
            Some(slot) => {
                *slot = item;
                true
            }
            None => false,
        }
    }

    pub fn consume_item_charge(&mut self, index: usize) -> ChargeOutcome {
        let Some(item) = self.inventory.get_mut(index) else {
            return ChargeOutcome::Missing;
        };
        match item.charges.as_mut() {
            Some(charges) if charges.current > 0 => {
                charges.current -= 1;
                ChargeOutcome::Consumed {
                    remaining: charges.current,
                }
            }
            _ => ChargeOutcome::Empty,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn warlock() -> Character {
        Character::default()
    }

    #[test]
    fn test_default_warlock() {
        let c = warlock();
        assert_eq!(c.level, 5);
        assert_eq!(c.prof_bonus, 3);
        assert_eq!(c.hp.max, 38);
        assert_eq!(c.spell_save_dc, 14);
        assert_eq!(c.pact_slots, PactSlots { current: 2, max: 2, level: 3 });
        assert_eq!(c.ability_mods.cha, 3);
        assert_eq!(c.invocations.len(), 3);
        assert!(c.invocations.iter().all(|i| i.active));
        assert_eq!(c.inventory.len(), 3);
    }

    #[test]
    fn test_temp_hp_absorbs_first() {
        let mut c = warlock();
        c.hp.temp = 5;
        let change = c.change_hp(31);
        assert_eq!(c.hp.temp, 0);
        assert_eq!(c.hp.current, 36);
        assert_eq!(change.temp_absorbed, 5);
        assert_eq!(change.damage_taken, 2);
    }

    #[test]
    fn test_damage_fully_absorbed() {
        let mut c = warlock();
        c.hp.temp = 10;
        let change = c.change_hp(34);
        assert_eq!(c.hp.current, 38);
        assert_eq!(c.hp.temp, 6);
        assert_eq!(change.damage_taken, 0);
    }

    #[test]
    fn test_zero_hp_breaks_concentration() {
        let mut c = warlock();
        c.hp.current = 3;
        c.concentration = Some("Hex".to_string());
        let change = c.change_hp(0);
        assert_eq!(c.hp.current, 0);
        assert_eq!(c.concentration, None);
        assert_eq!(change.concentration_lost.as_deref(), Some("Hex"));
    }

    #[test]
    fn test_survivable_damage_keeps_concentration() {
        let mut c = warlock();
        c.concentration = Some("Hex".to_string());
        c.change_hp(30);
        assert_eq!(c.concentration.as_deref(), Some("Hex"));
    }

    #[test]
    fn test_overkill_floors_at_zero() {
        let mut c = warlock();
        let change = c.change_hp(-50);
        assert_eq!(c.hp.current, 0);
        assert_eq!(change.damage_taken, 38);
    }

    #[test]
    fn test_healing_from_zero_resets_death_saves() {
        let mut c = warlock();
        c.hp.current = 0;
        c.death_saves = DeathSaves {
            successes: 2,
            failures: 1,
        };
        let change = c.change_hp(4);
        assert!(change.death_saves_reset);
        assert_eq!(c.death_saves, DeathSaves::default());
        assert_eq!(c.hp.current, 4);
    }

    #[test]
    fn test_healing_never_touches_temp_and_clamps() {
        let mut c = warlock();
        c.hp.current = 30;
        c.hp.temp = 4;
        let change = c.heal(100);
        assert_eq!(c.hp.current, 38);
        assert_eq!(c.hp.temp, 4);
        assert_eq!(change.healed, 8);
    }

    #[test]
    fn test_set_temp_hp_only_larger() {
        let mut c = warlock();
        assert!(c.set_temp_hp(5));
        assert!(!c.set_temp_hp(3));
        assert_eq!(c.hp.temp, 5);
        assert!(c.set_temp_hp(8));
        assert_eq!(c.hp.temp, 8);
        c.clear_temp_hp();
        assert_eq!(c.hp.temp, 0);
    }

    #[test]
    fn test_spend_hit_die() {
        let mut c = warlock();
        c.hp.current = 20;
        // 0.5 on a d8 is a 5, plus CON 2
        let spend = c.spend_hit_die(&mut || 0.5).unwrap();
        assert_eq!(spend.roll, 5);
        assert_eq!(spend.applied, 7);
        assert_eq!(c.hp.current, 27);
        assert_eq!(c.hit_dice.current, 4);
    }

    #[test]
    fn test_hit_die_spent_even_when_floored() {
        let mut c = warlock();
        c.abilities.con = 1;
        c.recalculate();
        c.hp.current = 1;
        let before = c.hit_dice.current;
        let spend = c.spend_hit_die(&mut || 0.0).unwrap();
        assert_eq!(spend.healing, 0);
        assert_eq!(c.hp.current, 1);
        assert_eq!(c.hit_dice.current, before - 1);
    }

    #[test]
    fn test_hit_die_rejected_at_full_or_empty() {
        let mut c = warlock();
        assert!(c.spend_hit_die(&mut || 0.5).is_none());
        c.hp.current = 10;
        c.hit_dice.current = 0;
        assert!(c.spend_hit_die(&mut || 0.5).is_none());
    }

    #[test]
    fn test_long_rest() {
        let mut c = warlock();
        c.hp.current = 4;
        c.hp.temp = 3;
        c.hit_dice.current = 0;
        c.pact_slots.current = 0;
        c.concentration = Some("Hex".to_string());
        c.ac_effects.mage_armor = true;
        c.death_saves.failures = 2;
        c.invocations.push(Invocation::new("x", "X", "").with_uses(1));
        assert!(c.consume_invocation_use("x"));

        let summary = c.long_rest();
        assert_eq!(c.hp.current, 38);
        assert_eq!(c.hp.temp, 0);
        assert_eq!(c.hit_dice.current, 3);
        assert_eq!(summary.hit_dice_recovered, 3);
        assert_eq!(c.pact_slots.current, 2);
        assert_eq!(summary.concentration_ended.as_deref(), Some("Hex"));
        assert!(!c.ac_effects.mage_armor);
        assert_eq!(c.death_saves, DeathSaves::default());
        assert_eq!(c.invocations[3].current_uses, Some(1));
    }

    #[test]
    fn test_long_rest_recovers_at_least_one_die() {
        let mut c = warlock();
        c.set_level(1);
        c.hit_dice.current = 0;
        c.long_rest();
        assert_eq!(c.hit_dice.current, 1);
    }

    #[test]
    fn test_short_rest_only_pact_slots() {
        let mut c = warlock();
        c.slots[0] = SlotUsage { used: 2, max: 4 };
        c.pact_slots.current = 0;
        assert_eq!(c.short_rest(), 2);
        assert_eq!(c.pact_slots.current, 2);
        assert_eq!(c.slots[0].used, 2);
    }

    #[test]
    fn test_pact_slot_bounds() {
        let mut c = warlock();
        assert!(!c.restore_pact_slot());
        assert!(c.use_pact_slot());
        assert!(c.use_pact_slot());
        assert!(!c.use_pact_slot());
        assert_eq!(c.pact_slots.current, 0);
        assert!(c.restore_pact_slot());
        assert_eq!(c.pact_slots.current, 1);
    }

    #[test]
    fn test_standard_slot_bounds() {
        let mut c = warlock();
        c.slots[1] = SlotUsage { used: 0, max: 1 };
        assert!(c.expend_slot(2));
        assert!(!c.expend_slot(2));
        assert_eq!(c.slots[1].used, 1);
        assert!(!c.expend_slot(0));
        assert!(!c.expend_slot(10));
        assert!(c.restore_slot(2));
        assert!(!c.restore_slot(2));
    }

    #[test]
    fn test_level_change_clamps_pact_slots() {
        let mut c = warlock();
        c.set_level(1);
        assert_eq!(c.pact_slots.max, 1);
        assert_eq!(c.pact_slots.current, 1);
        c.set_level(11);
        assert_eq!(c.pact_slots.max, 3);
        assert_eq!(c.pact_slots.level, 5);
        assert_eq!(c.pact_slots.current, 1);
    }

    #[test]
    fn test_arcanum_locked_by_level() {
        let mut c = warlock();
        assert!(!c.set_arcanum_spell(6, "Circle of Death"));
        assert!(!c.use_arcanum(6));

        c.set_level(11);
        assert!(c.set_arcanum_spell(6, "Circle of Death"));
        assert!(!c.set_arcanum_spell(7, "Finger of Death"));
        assert!(c.use_arcanum(6));
        assert!(!c.use_arcanum(6));
        assert!(c.restore_arcanum(6));
        assert!(c.use_arcanum(6));

        c.long_rest();
        assert!(!c.arcanum[&6].used);
    }

    #[test]
    fn test_invocations() {
        let mut c = warlock();
        assert_eq!(c.toggle_invocation("devils-sight"), Some(false));
        assert_eq!(c.toggle_invocation("devils-sight"), Some(true));
        assert_eq!(c.toggle_invocation("nope"), None);
        assert!(!c.consume_invocation_use("devils-sight"));
    }

    #[test]
    fn test_attunement_capacity() {
        let mut c = warlock();
        for name in ["Ring", "Cloak", "Amulet"] {
            assert_eq!(c.add_attuned_item(name), AttuneOutcome::Attuned);
        }
        assert_eq!(c.add_attuned_item("Staff"), AttuneOutcome::AtCapacity);
        assert_eq!(c.attunement.len(), 3);
        assert_eq!(c.add_attuned_item("  "), AttuneOutcome::InvalidName);
        assert_eq!(c.remove_attuned_item(1).as_deref(), Some("Cloak"));
        assert_eq!(c.remove_attuned_item(5), None);
    }

    #[test]
    fn test_item_charges() {
        let mut c = warlock();
        c.add_inventory_item(InventoryItem::new("Wand of Magic Missiles").with_charges(1, 7));
        let index = c.inventory.len() - 1;
        assert_eq!(
            c.consume_item_charge(index),
            ChargeOutcome::Consumed { remaining: 0 }
        );
        assert_eq!(c.consume_item_charge(index), ChargeOutcome::Empty);
        assert_eq!(c.consume_item_charge(0), ChargeOutcome::Empty);
        assert_eq!(c.consume_item_charge(99), ChargeOutcome::Missing);
    }

    #[test]
    fn test_inventory_update_and_remove() {
        let mut c = warlock();
        assert!(c.update_inventory_item(0, InventoryItem::new("Arcane Focus (Orb)")));
        assert!(!c.update_inventory_item(42, InventoryItem::new("x")));
        assert_eq!(c.inventory[0].name, "Arcane Focus (Orb)");
        assert_eq!(c.remove_inventory_item(0).map(|i| i.name).as_deref(), Some("Arcane Focus (Orb)"));
        assert_eq!(c.inventory.len(), 2);
    }

    #[test]
    fn test_death_saves() {
        let mut c = warlock();
        assert_eq!(c.record_death_save(DeathSaveKind::Success), DeathSaveStatus::Pending);
        c.record_death_save(DeathSaveKind::Success);
        assert_eq!(c.record_death_save(DeathSaveKind::Success), DeathSaveStatus::Stabilized);
        assert_eq!(c.record_death_save(DeathSaveKind::Success), DeathSaveStatus::Stabilized);
        assert_eq!(c.death_saves.successes, 3);
        assert_eq!(c.set_death_save(DeathSaveKind::Failure, 9), DeathSaveStatus::Dead);
        assert_eq!(c.death_saves.failures, 3);
    }

    #[test]
    fn test_wild_shape_absorbs_damage() {
        let mut c = warlock();
        assert!(c.start_transformation("Brown Bear", 34, 11));
        let outcome = c.take_damage(10);
        assert_eq!(outcome.form_damage, 10);
        assert_eq!(c.transformed.as_ref().map(|t| t.hp.current), Some(24));
        assert_eq!(c.hp.current, 38);
    }

    #[test]
    fn test_wild_shape_carryover() {
        let mut c = warlock();
        c.hp.temp = 2;
        c.start_transformation("Wolf", 11, 13);
        let outcome = c.take_damage(16);
        assert_eq!(outcome.form_damage, 11);
        assert_eq!(outcome.form_ended.as_deref(), Some("Wolf"));
        assert!(c.transformed.is_none());
        assert_eq!(outcome.hp.temp_absorbed, 2);
        assert_eq!(c.hp.current, 35);
    }

    #[test]
    fn test_wild_shape_exact_damage_ends_form() {
        let mut c = warlock();
        c.start_transformation("Cat", 2, 12);
        let outcome = c.take_damage(2);
        assert_eq!(outcome.form_ended.as_deref(), Some("Cat"));
        assert_eq!(c.hp.current, 38);
    }

    #[test]
    fn test_transformation_rejects_bad_input() {
        let mut c = warlock();
        assert!(!c.start_transformation("", 10, 10));
        assert!(!c.start_transformation("Rat", 0, 10));
        assert!(c.end_transformation().is_none());
    }

    #[test]
    fn test_concentration_replaces() {
        let mut c = warlock();
        assert_eq!(c.start_concentration("Hex"), None);
        assert_eq!(c.start_concentration("Fly").as_deref(), Some("Hex"));
        assert_eq!(c.end_concentration().as_deref(), Some("Fly"));
    }

    #[test]
    fn test_skills_and_saves() {
        let c = warlock();
        assert_eq!(c.skill_bonus("Deception"), Some(6));
        assert_eq!(c.skill_bonus("athletics"), Some(-1));
        assert_eq!(c.skill_bonus("Juggling"), None);
        assert_eq!(c.saving_throw_bonus(Ability::Cha), 6);
        assert_eq!(c.saving_throw_bonus(Ability::Con), 2);
        assert_eq!(c.initiative_bonus(), 2);
    }

    #[test]
    fn test_ability_change_recalculates() {
        let mut c = warlock();
        c.set_ability_score(Ability::Cha, 20);
        assert_eq!(c.ability_mods.cha, 5);
        assert_eq!(c.spell_save_dc, 16);
        c.set_ability_score(Ability::Con, 99);
        assert_eq!(c.abilities.con, 30);
    }
}
