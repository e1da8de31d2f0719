//! Derived statistics.
//!
//! Pure functions from base attributes to dependent values. Nothing here
//! clamps its inputs beyond what the formulas require; out-of-domain values
//! are caught by [`crate::validation`] before they reach these functions.

use crate::character::{AbilityModifiers, AbilityScores, AcEffects, Character};
use crate::tables::{self, calculate_caster_level, pact_slot_info, LEVEL_MAX, LEVEL_MIN};

/// Mage Armor (and equivalents) replace base armor with this value plus DEX.
pub const MAGE_ARMOR_BASE: i32 = 13;
/// Flat bonus granted by the Shield spell.
pub const SHIELD_SPELL_BONUS: i32 = 5;
/// Spell save DC base.
pub const SPELL_DC_BASE: i32 = 8;

pub fn ability_modifier(score: i32) -> i32 {
    (score - 10).div_euclid(2)
}

pub fn proficiency_bonus(level: i64) -> i32 {
    let level = level.clamp(LEVEL_MIN as i64, LEVEL_MAX as i64);
    ((level - 1) / 4 + 2) as i32
}

/// Maximum hit points using the fixed average per level after the first.
///
/// The result is never below `level`, so each level is worth at least one
/// hit point even with a very low Constitution.
pub fn max_hp(level: i64, con_score: i32, hit_die_size: i32) -> i32 {
    let level = level.clamp(LEVEL_MIN as i64, LEVEL_MAX as i64) as i32;
    let con_mod = ability_modifier(con_score);
    let first = hit_die_size + con_mod;
    let per_level = hit_die_size / 2 + 1 + con_mod;
    let total = first + per_level * (level - 1);
    total.max(level)
}

pub fn spell_save_dc(prof_bonus: i32, casting_mod: i32) -> i32 {
    SPELL_DC_BASE + prof_bonus + casting_mod
}

pub fn spell_attack_bonus(prof_bonus: i32, casting_mod: i32) -> i32 {
    prof_bonus + casting_mod
}

/// Inputs to an armor class calculation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ArmorInputs {
    pub base_ac: i32,
    pub dex_mod: i32,
    /// Medium/heavy armor cap on the DEX contribution.
    pub max_dex_bonus: Option<i32>,
    /// A carried shield (not the spell).
    pub shield_bonus: i32,
    pub other_bonuses: i32,
}

pub fn armor_class(inputs: &ArmorInputs) -> i32 {
    let effective_dex = match inputs.max_dex_bonus {
        Some(cap) => inputs.dex_mod.min(cap),
        None => inputs.dex_mod,
    };
    inputs.base_ac + effective_dex + inputs.shield_bonus + inputs.other_bonuses
}

/// Armor class with spell effects applied.
///
/// Mage Armor replaces the worn armor entirely (13 + DEX, no cap); the Shield
/// spell adds +5 on top of whatever base is in effect.
pub fn armor_class_with_effects(inputs: &ArmorInputs, effects: &AcEffects) -> i32 {
    let mut ac = if effects.mage_armor {
        MAGE_ARMOR_BASE + inputs.dex_mod + inputs.shield_bonus + inputs.other_bonuses
    } else {
        armor_class(inputs)
    };
    if effects.shield_spell {
        ac += SHIELD_SPELL_BONUS;
    }
    ac
}

pub fn skill_modifier(ability_mod: i32, prof_bonus: i32, proficient: bool, expert: bool) -> i32 {
    let mut total = ability_mod;
    if proficient {
        total += prof_bonus;
    }
    if expert {
        total += prof_bonus;
    }
    total
}

pub fn saving_throw_modifier(ability_mod: i32, prof_bonus: i32, proficient: bool) -> i32 {
    skill_modifier(ability_mod, prof_bonus, proficient, false)
}

pub fn initiative_bonus(dex_mod: i32) -> i32 {
    dex_mod
}

/// Signed display form: `+3`, `+0`, `-1`.
pub fn format_modifier(value: i32) -> String {
    if value >= 0 {
        format!("+{value}")
    } else {
        value.to_string()
    }
}

pub fn ability_modifiers(scores: &AbilityScores) -> AbilityModifiers {
    AbilityModifiers {
        str: ability_modifier(scores.str),
        dex: ability_modifier(scores.dex),
        con: ability_modifier(scores.con),
        int: ability_modifier(scores.int),
        wis: ability_modifier(scores.wis),
        cha: ability_modifier(scores.cha),
    }
}

/// The armor class currently in effect for a character.
///
/// An active Armor of Shadows invocation counts as Mage Armor.
pub fn current_armor_class(character: &Character) -> i32 {
    let inputs = ArmorInputs {
        base_ac: character.base_ac,
        dex_mod: character.ability_mods.dex,
        max_dex_bonus: character.max_dex_bonus,
        shield_bonus: character.shield_bonus,
        other_bonuses: character.other_ac_bonus,
    };
    let mut effects = character.ac_effects;
    effects.mage_armor |= character.has_active_invocation(crate::character::ARMOR_OF_SHADOWS);
    armor_class_with_effects(&inputs, &effects)
}

pub fn character_spell_attack_bonus(character: &Character) -> i32 {
    spell_attack_bonus(
        character.prof_bonus,
        character.ability_mods.get(character.spellcasting_ability),
    )
}

/// Level of the character's Warlock class, if it has one.
///
/// A character without a class breakdown is treated as a single-class warlock.
fn warlock_level(character: &Character) -> Option<u8> {
    if character.classes.is_empty() {
        return Some(character.level);
    }
    character
        .classes
        .iter()
        .find(|c| c.class_name.eq_ignore_ascii_case("warlock"))
        .map(|c| c.level)
}

/// Recompute every derived field of a character.
///
/// Called after any level or ability score change. Current values (HP, hit
/// dice, pact slots, slot usage) are clamped to their new maxima; nothing
/// else is touched. Applying it twice gives the same result as once.
pub fn recalculate_derived(character: &Character) -> Character {
    let mut next = character.clone();
    next.level = next.level.clamp(LEVEL_MIN, LEVEL_MAX);
    let level = next.level as i64;

    next.ability_mods = ability_modifiers(&next.abilities);
    next.prof_bonus = proficiency_bonus(level);

    match warlock_level(&next) {
        Some(warlock) => {
            let pact = pact_slot_info(warlock as i64);
            next.pact_slots.max = pact.count as i32;
            next.pact_slots.level = pact.level;
        }
        None => {
            next.pact_slots.max = 0;
            next.pact_slots.level = 0;
        }
    }
    next.pact_slots.current = next.pact_slots.current.clamp(0, next.pact_slots.max);

    next.hp.max = max_hp(level, next.abilities.con, next.hit_dice.size);
    next.hp.current = next.hp.current.clamp(0, next.hp.max);
    next.hp.temp = next.hp.temp.max(0);

    next.hit_dice.max = level as i32;
    next.hit_dice.current = next.hit_dice.current.clamp(0, next.hit_dice.max);

    if !next.classes.is_empty() {
        let maxima = tables::spell_slots_for_caster_level(calculate_caster_level(&next.classes) as i64);
        for (slot, max) in next.slots.iter_mut().zip(maxima) {
            slot.max = max as i32;
        }
    }
    for slot in next.slots.iter_mut() {
        slot.used = slot.used.clamp(0, slot.max);
    }

    next.spell_save_dc = spell_save_dc(
        next.prof_bonus,
        next.ability_mods.get(next.spellcasting_ability),
    );
    next
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::character::Character;
    use crate::tables::ClassLevel;

    #[test]
    fn test_ability_modifier() {
        assert_eq!(ability_modifier(10), 0);
        assert_eq!(ability_modifier(11), 0);
        assert_eq!(ability_modifier(9), -1);
        assert_eq!(ability_modifier(8), -1);
        assert_eq!(ability_modifier(1), -5);
        assert_eq!(ability_modifier(20), 5);
        assert_eq!(ability_modifier(30), 10);
    }

    #[test]
    fn test_proficiency_bonus() {
        assert_eq!(proficiency_bonus(1), 2);
        assert_eq!(proficiency_bonus(5), 3);
        assert_eq!(proficiency_bonus(17), 6);
        assert_eq!(proficiency_bonus(0), 2);
        assert_eq!(proficiency_bonus(25), 6);

        let mut last = 0;
        for level in 1..=20 {
            let bonus = proficiency_bonus(level);
            assert!((2..=6).contains(&bonus));
            assert!(bonus >= last);
            assert_eq!(bonus, tables::proficiency_for_level(level));
            last = bonus;
        }
    }

    #[test]
    fn test_max_hp() {
        // 8 + 2, then 4 * (5 + 2)
        assert_eq!(max_hp(5, 14, 8), 38);
        assert_eq!(max_hp(1, 10, 12), 12);
        assert_eq!(max_hp(5, 1, 8), 5);
    }

    #[test]
    fn test_max_hp_at_least_level() {
        for level in 1..=20 {
            for con in 1..=30 {
                for die in [6, 8, 10, 12] {
                    assert!(max_hp(level, con, die) >= level as i32);
                }
            }
        }
    }

    #[test]
    fn test_spell_dc_and_attack() {
        assert_eq!(spell_save_dc(3, 3), 14);
        assert_eq!(spell_attack_bonus(3, 3), 6);
    }

    #[test]
    fn test_armor_class_dex_cap() {
        let inputs = ArmorInputs {
            base_ac: 14,
            dex_mod: 4,
            max_dex_bonus: Some(2),
            shield_bonus: 2,
            other_bonuses: 1,
        };
        assert_eq!(armor_class(&inputs), 19);

        let uncapped = ArmorInputs {
            max_dex_bonus: None,
            ..inputs
        };
        assert_eq!(armor_class(&uncapped), 21);
    }

    #[test]
    fn test_mage_armor_replaces_base() {
        let inputs = ArmorInputs {
            base_ac: 16,
            dex_mod: 2,
            max_dex_bonus: Some(0),
            ..Default::default()
        };
        let mage = AcEffects {
            mage_armor: true,
            shield_spell: false,
        };
        assert_eq!(armor_class_with_effects(&inputs, &mage), 15);

        let both = AcEffects {
            mage_armor: true,
            shield_spell: true,
        };
        assert_eq!(armor_class_with_effects(&inputs, &both), 20);

        let shield_only = AcEffects {
            mage_armor: false,
            shield_spell: true,
        };
        assert_eq!(armor_class_with_effects(&inputs, &shield_only), 21);
    }

    #[test]
    fn test_skill_and_save_modifiers() {
        assert_eq!(skill_modifier(2, 3, false, false), 2);
        assert_eq!(skill_modifier(2, 3, true, false), 5);
        assert_eq!(skill_modifier(2, 3, true, true), 8);
        assert_eq!(saving_throw_modifier(-1, 2, true), 1);
        assert_eq!(initiative_bonus(3), 3);
    }

    #[test]
    fn test_format_modifier() {
        assert_eq!(format_modifier(3), "+3");
        assert_eq!(format_modifier(0), "+0");
        assert_eq!(format_modifier(-1), "-1");
    }

    #[test]
    fn test_default_character_is_consistent() {
        let character = Character::default();
        assert_eq!(recalculate_derived(&character), character);
        // leather armor 11 + DEX 2
        assert_eq!(current_armor_class(&character), 13);
        assert_eq!(character_spell_attack_bonus(&character), 6);
    }

    #[test]
    fn test_recalculate_clamps_on_level_down() {
        let mut character = Character::default();
        character.level = 1;
        let next = recalculate_derived(&character);

        assert_eq!(next.prof_bonus, 2);
        assert_eq!(next.pact_slots.max, 1);
        assert_eq!(next.pact_slots.level, 1);
        assert_eq!(next.pact_slots.current, 1);
        assert_eq!(next.hp.max, 10);
        assert_eq!(next.hp.current, 10);
        assert_eq!(next.hit_dice.max, 1);
        assert_eq!(next.hit_dice.current, 1);
        assert_eq!(next.spell_save_dc, 13);
    }

    #[test]
    fn test_recalculate_is_idempotent() {
        let mut character = Character::default();
        character.level = 11;
        character.abilities.con = 3;
        character.abilities.cha = 20;
        character.hp.current = 500;
        character.pact_slots.current = 9;
        character.classes = vec![ClassLevel::new("Warlock", 6), ClassLevel::new("Wizard", 5)];

        let once = recalculate_derived(&character);
        let twice = recalculate_derived(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_multiclass_slots_from_classes() {
        let mut character = Character::default();
        character.level = 10;
        character.classes = vec![ClassLevel::new("Wizard", 5), ClassLevel::new("Paladin", 5)];
        character.slots[0].used = 9;

        let next = recalculate_derived(&character);
        assert_eq!(next.slots[0].max, 4);
        assert_eq!(next.slots[0].used, 4);
        assert_eq!(next.slots[3].max, 1);
        assert_eq!(next.slots[4].max, 0);
        // no warlock levels
        assert_eq!(next.pact_slots.max, 0);
        assert_eq!(next.pact_slots.current, 0);
    }

    #[test]
    fn test_armor_of_shadows_counts_as_mage_armor() {
        let mut character = Character::default();
        character.invocations.push(crate::character::Invocation::new(
            crate::character::ARMOR_OF_SHADOWS,
            "Armor of Shadows",
            "Cast mage armor on yourself at will.",
        ));
        assert_eq!(current_armor_class(&character), 15);

        character.ac_effects.shield_spell = true;
        assert_eq!(current_armor_class(&character), 20);
    }
}
