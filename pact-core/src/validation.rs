//! Boundary validation for externally sourced values.
//!
//! Form fields, voice commands and loaded save files all pass through here
//! before reaching the character. Validation never fails the caller: a bad
//! value is replaced by a safe fallback and the problem is reported alongside
//! it in a [`Validated`] so the presentation layer can warn without blocking.

use crate::character::{Ability, Character, MAX_ATTUNED_ITEMS, MAX_DEATH_SAVES};
use crate::derived::recalculate_derived;
use crate::minions::{Minion, MinionKind};
use crate::tables::{LEVEL_MAX, LEVEL_MIN};
use std::fmt;
use thiserror::Error;
use tracing::warn;

pub const SESSION_NUMBER_MIN: i64 = 1;
pub const SESSION_NUMBER_MAX: i64 = 9999;
/// Lowest ability score accepted from user input.
pub const ABILITY_INPUT_MIN: i64 = 3;
pub const ABILITY_INPUT_MAX: i64 = 30;
pub const HP_INPUT_MIN: i64 = -999;
pub const HP_INPUT_MAX: i64 = 9999;

pub const SESSION_NUMBER_FALLBACK: u32 = 1;
pub const LEVEL_FALLBACK: u8 = 1;
pub const ABILITY_FALLBACK: i32 = 10;
pub const HP_FALLBACK: i32 = 0;

pub const MINION_NAME_MAX: usize = 50;
pub const MINION_AC_MAX: i32 = 30;

const DEFAULT_HIT_DIE: i32 = 8;

/// The kind of input being validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    SessionNumber,
    AbilityScore(Ability),
    Level,
    CurrentHp,
    MaxHp,
    TempHp,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::SessionNumber => write!(f, "Session Number"),
            Field::AbilityScore(ability) => write!(f, "{ability} score"),
            Field::Level => write!(f, "Level"),
            Field::CurrentHp => write!(f, "Current HP"),
            Field::MaxHp => write!(f, "Maximum HP"),
            Field::TempHp => write!(f, "Temporary HP"),
        }
    }
}

/// Why an input was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationIssue {
    #[error("{field} is required")]
    Required { field: Field },

    #[error("{field} is invalid: {raw:?} is not a whole number")]
    Invalid { field: Field, raw: String },

    #[error("{field} is out of range: {value} is not between {min} and {max}")]
    OutOfRange {
        field: Field,
        value: i64,
        min: i64,
        max: i64,
    },
}

impl ValidationIssue {
    pub fn field(&self) -> Field {
        match self {
            ValidationIssue::Required { field }
            | ValidationIssue::Invalid { field, .. }
            | ValidationIssue::OutOfRange { field, .. } => *field,
        }
    }

    pub fn suggestion(&self) -> String {
        match self {
            ValidationIssue::Required { .. } => "Please enter a value".to_string(),
            ValidationIssue::Invalid { .. } => "Please enter a valid value".to_string(),
            ValidationIssue::OutOfRange { min, max, .. } => {
                format!("Please enter a value from {min} to {max}")
            }
        }
    }
}

/// A value that has been through validation, with the reason it was
/// replaced if it was.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validated<T> {
    pub value: T,
    pub issue: Option<ValidationIssue>,
}

impl<T> Validated<T> {
    fn ok(value: T) -> Self {
        Self { value, issue: None }
    }

    fn fallback(value: T, issue: ValidationIssue) -> Self {
        warn!(field = %issue.field(), error = %issue, "validation failed, using fallback");
        Self {
            value,
            issue: Some(issue),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.issue.is_none()
    }

    /// Human-readable warning with a suggestion, for invalid input only.
    pub fn message(&self) -> Option<String> {
        self.issue
            .as_ref()
            .map(|issue| format!("{issue}. {}", issue.suggestion()))
    }

    pub fn into_value(self) -> T {
        self.value
    }
}

// ============================================================================
// Numeric inputs
// ============================================================================

fn check_range(field: Field, value: i64, min: i64, max: i64) -> Result<i64, ValidationIssue> {
    if (min..=max).contains(&value) {
        Ok(value)
    } else {
        Err(ValidationIssue::OutOfRange {
            field,
            value,
            min,
            max,
        })
    }
}

fn parse_int(field: Field, raw: &str) -> Result<i64, ValidationIssue> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ValidationIssue::Required { field });
    }
    trimmed.parse::<i64>().map_err(|_| ValidationIssue::Invalid {
        field,
        raw: trimmed.to_string(),
    })
}

fn validated<T>(result: Result<i64, ValidationIssue>, convert: impl FnOnce(i64) -> T, fallback: T) -> Validated<T> {
    match result {
        Ok(value) => Validated::ok(convert(value)),
        Err(issue) => Validated::fallback(fallback, issue),
    }
}

pub fn validate_session_number(value: i64) -> Validated<u32> {
    validated(
        check_range(Field::SessionNumber, value, SESSION_NUMBER_MIN, SESSION_NUMBER_MAX),
        |v| v as u32,
        SESSION_NUMBER_FALLBACK,
    )
}

pub fn validate_level(value: i64) -> Validated<u8> {
    validated(
        check_range(Field::Level, value, LEVEL_MIN as i64, LEVEL_MAX as i64),
        |v| v as u8,
        LEVEL_FALLBACK,
    )
}

pub fn validate_ability_score(ability: Ability, value: i64) -> Validated<i32> {
    validated(
        check_range(
            Field::AbilityScore(ability),
            value,
            ABILITY_INPUT_MIN,
            ABILITY_INPUT_MAX,
        ),
        |v| v as i32,
        ABILITY_FALLBACK,
    )
}

/// Current HP may be entered below zero; the character floors it on write.
pub fn validate_current_hp(value: i64) -> Validated<i32> {
    validated(
        check_range(Field::CurrentHp, value, HP_INPUT_MIN, HP_INPUT_MAX),
        |v| v as i32,
        HP_FALLBACK,
    )
}

pub fn validate_max_hp(value: i64) -> Validated<i32> {
    validated(
        check_range(Field::MaxHp, value, 1, HP_INPUT_MAX),
        |v| v as i32,
        1,
    )
}

pub fn validate_temp_hp(value: i64) -> Validated<i32> {
    validated(
        check_range(Field::TempHp, value, 0, HP_INPUT_MAX),
        |v| v as i32,
        HP_FALLBACK,
    )
}

/// Validate raw text for `field`, as typed into a form or transcribed.
pub fn validate_text(field: Field, raw: &str) -> Validated<i64> {
    let parsed = match parse_int(field, raw) {
        Ok(value) => value,
        Err(issue) => return Validated::fallback(fallback_for(field), issue),
    };
    match field {
        Field::SessionNumber => widen(validate_session_number(parsed)),
        Field::Level => widen(validate_level(parsed)),
        Field::AbilityScore(ability) => widen(validate_ability_score(ability, parsed)),
        Field::CurrentHp => widen(validate_current_hp(parsed)),
        Field::MaxHp => widen(validate_max_hp(parsed)),
        Field::TempHp => widen(validate_temp_hp(parsed)),
    }
}

fn widen<T: Into<i64>>(v: Validated<T>) -> Validated<i64> {
    Validated {
        value: v.value.into(),
        issue: v.issue,
    }
}

fn fallback_for(field: Field) -> i64 {
    match field {
        Field::SessionNumber => SESSION_NUMBER_FALLBACK as i64,
        Field::Level => LEVEL_FALLBACK as i64,
        Field::AbilityScore(_) => ABILITY_FALLBACK as i64,
        Field::MaxHp => 1,
        Field::CurrentHp | Field::TempHp => HP_FALLBACK as i64,
    }
}

// ============================================================================
// Whole-record sanitization
// ============================================================================

/// Bring a loaded character back inside every invariant of the record.
pub fn sanitize_character(mut character: Character) -> Character {
    if !(LEVEL_MIN..=LEVEL_MAX).contains(&character.level) {
        warn!(level = character.level, "character level out of range, clamping");
    }
    character.level = character.level.clamp(LEVEL_MIN, LEVEL_MAX);

    for ability in Ability::all() {
        let score = character.abilities.get(ability);
        character.abilities.set(ability, score.clamp(1, 30));
    }

    if character.hit_dice.size <= 0 {
        warn!(size = character.hit_dice.size, "invalid hit die size, using d8");
        character.hit_dice.size = DEFAULT_HIT_DIE;
    }
    character.hp.temp = character.hp.temp.max(0);

    for slot in character.slots.iter_mut() {
        slot.max = slot.max.max(0);
    }

    character.death_saves.successes = character.death_saves.successes.min(MAX_DEATH_SAVES);
    character.death_saves.failures = character.death_saves.failures.min(MAX_DEATH_SAVES);

    character.attunement.retain(|name| !name.trim().is_empty());
    if character.attunement.len() > MAX_ATTUNED_ITEMS {
        warn!(count = character.attunement.len(), "too many attuned items, truncating");
        character.attunement.truncate(MAX_ATTUNED_ITEMS);
    }

    character.arcanum.retain(|level, _| (6..=9).contains(level));

    for item in character.inventory.iter_mut() {
        if let Some(charges) = item.charges.as_mut() {
            charges.max = charges.max.max(0);
            charges.current = charges.current.clamp(0, charges.max);
        }
    }

    if let Some(form) = character.transformed.as_mut() {
        form.hp.max = form.hp.max.max(1);
        form.hp.current = form.hp.current.clamp(0, form.hp.max);
        form.ac = form.ac.max(0);
    }
    if character.transformed.as_ref().is_some_and(|f| f.hp.current == 0) {
        character.transformed = None;
    }

    for invocation in character.invocations.iter_mut() {
        if let (Some(max), Some(current)) = (invocation.uses_per_long_rest, invocation.current_uses) {
            invocation.current_uses = Some(current.min(max));
        }
    }

    recalculate_derived(&character)
}

fn default_minion_name(kind: MinionKind) -> &'static str {
    match kind {
        MinionKind::Skeleton => "Skeleton",
        MinionKind::Zombie => "Zombie",
        MinionKind::UndeadSpirit => "Undead Spirit",
    }
}

/// Clamp every minion field into its valid range.
pub fn sanitize_minion(mut minion: Minion) -> Minion {
    let trimmed = minion.name.trim();
    minion.name = if trimmed.is_empty() {
        default_minion_name(minion.kind).to_string()
    } else {
        trimmed.chars().take(MINION_NAME_MAX).collect()
    };
    minion.max_hp = minion.max_hp.max(1);
    minion.hp = minion.hp.clamp(0, minion.max_hp);
    minion.ac = minion.ac.clamp(0, MINION_AC_MAX);
    minion.speed = minion.speed.max(0);
    minion.conditions = minion
        .conditions
        .into_iter()
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .collect();
    minion
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::character::{ArcanumSlot, DeathSaves, InventoryItem, Transformation};
    use crate::minions;

    #[test]
    fn test_valid_inputs_pass_through() {
        let level = validate_level(7);
        assert!(level.is_valid());
        assert_eq!(level.value, 7);
        assert_eq!(level.message(), None);

        assert_eq!(validate_session_number(9999).value, 9999);
        assert_eq!(validate_ability_score(Ability::Str, 3).value, 3);
        assert_eq!(validate_current_hp(-20).value, -20);
    }

    #[test]
    fn test_fallbacks() {
        assert_eq!(validate_level(0).value, 1);
        assert_eq!(validate_level(21).value, 1);
        assert_eq!(validate_session_number(10_000).value, 1);
        assert_eq!(validate_ability_score(Ability::Dex, 2).value, 10);
        assert_eq!(validate_ability_score(Ability::Dex, 31).value, 10);
        assert_eq!(validate_current_hp(10_000).value, 0);
        assert_eq!(validate_temp_hp(-1).value, 0);
        assert_eq!(validate_max_hp(0).value, 1);
    }

    #[test]
    fn test_messages() {
        let result = validate_level(25);
        assert!(!result.is_valid());
        assert_eq!(
            result.message().as_deref(),
            Some("Level is out of range: 25 is not between 1 and 20. Please enter a value from 1 to 20")
        );

        let cha = validate_ability_score(Ability::Cha, 1);
        assert!(cha.message().unwrap().starts_with("CHA score is out of range"));
    }

    #[test]
    fn test_text_inputs() {
        let blank = validate_text(Field::Level, "   ");
        assert_eq!(blank.value, 1);
        assert_eq!(blank.issue, Some(ValidationIssue::Required { field: Field::Level }));

        let junk = validate_text(Field::AbilityScore(Ability::Wis), "twelve");
        assert_eq!(junk.value, 10);
        assert!(matches!(junk.issue, Some(ValidationIssue::Invalid { .. })));

        let fine = validate_text(Field::SessionNumber, " 42 ");
        assert!(fine.is_valid());
        assert_eq!(fine.value, 42);

        let negative = validate_text(Field::CurrentHp, "-5");
        assert_eq!(negative.value, -5);
    }

    #[test]
    fn test_sanitize_character() {
        let mut c = Character::default();
        c.level = 40;
        c.abilities.str = 0;
        c.hp.current = 500;
        c.hp.temp = -4;
        c.hit_dice.size = 0;
        c.death_saves = DeathSaves {
            successes: 9,
            failures: 4,
        };
        c.attunement = vec!["A".into(), "B".into(), "".into(), "C".into(), "D".into()];
        c.pact_slots.current = 12;
        c.arcanum.insert(3, ArcanumSlot::default());
        c.inventory.push(InventoryItem::new("Wand").with_charges(12, 7));
        c.transformed = Some(Transformation {
            creature_name: "Ape".into(),
            ..Default::default()
        });

        let clean = sanitize_character(c);
        assert_eq!(clean.level, 20);
        assert_eq!(clean.abilities.str, 1);
        assert_eq!(clean.hp.current, clean.hp.max);
        assert_eq!(clean.hp.temp, 0);
        assert_eq!(clean.hit_dice.size, 8);
        assert_eq!(clean.death_saves, DeathSaves { successes: 3, failures: 3 });
        assert_eq!(clean.attunement, vec!["A", "B", "C"]);
        assert_eq!(clean.pact_slots.current, clean.pact_slots.max);
        assert!(clean.arcanum.is_empty());
        assert_eq!(clean.inventory[3].charges.map(|ch| ch.current), Some(7));
        assert!(clean.transformed.is_none());
        assert_eq!(sanitize_character(clean.clone()), clean);
    }

    #[test]
    fn test_sanitize_minion() {
        let mut m = minions::zombie(1);
        m.name = "   ".into();
        m.max_hp = -3;
        m.hp = 7;
        m.ac = -2;
        m.speed = -30;
        m.conditions.insert("  ".into());
        let clean = sanitize_minion(m);
        assert_eq!(clean.name, "Zombie");
        assert_eq!(clean.max_hp, 1);
        assert_eq!(clean.hp, 1);
        assert_eq!(clean.ac, 0);
        assert_eq!(clean.speed, 0);
        assert!(clean.conditions.is_empty());
    }
}
