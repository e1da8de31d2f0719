//! Testing utilities.
//!
//! This module provides tools for integration testing:
//! - Sample characters
//! - `FixedRandom` for deterministic rolls
//! - `RecordingSink` to capture persisted snapshots
//! - `TestHarness` for scripted command sequences
//! - Assertion helpers for verifying play state

use crate::character::{Character, InventoryItem};
use crate::combat::CastingStep;
use crate::dice::RandomSource;
use crate::persist::{PersistError, PersistenceSink, SessionSnapshot};
use crate::rules::{Command, Resolution};
use crate::session::{Session, SessionConfig};
use crate::tables::ClassLevel;
use std::sync::{Arc, Mutex};

/// The default level 5 warlock, named and carrying a charged wand.
pub fn sample_warlock() -> Character {
    let mut character = Character {
        name: "Test Warlock".to_string(),
        ..Character::default()
    };
    character.add_inventory_item(InventoryItem::new("Wand of Magic Missiles").with_charges(7, 7));
    character
}

/// Warlock 3 / Paladin 2: two pact slots of 2nd level plus two standard 1st
/// level slots.
pub fn sample_multiclass() -> Character {
    let mut character = Character {
        name: "Test Hexblade".to_string(),
        level: 5,
        classes: vec![ClassLevel::new("Warlock", 3), ClassLevel::new("Paladin", 2)],
        ..Character::default()
    };
    character.recalculate();
    character
}

/// Cycles through a fixed list of unit values.
#[derive(Debug, Clone)]
pub struct FixedRandom {
    values: Vec<f64>,
    next: usize,
}

impl FixedRandom {
    pub fn new(values: impl Into<Vec<f64>>) -> Self {
        Self {
            values: values.into(),
            next: 0,
        }
    }

    /// Unit value that makes a d`sides` come up `face`.
    pub fn face(face: u32, sides: u32) -> f64 {
        (f64::from(face.saturating_sub(1)) + 0.5) / f64::from(sides.max(1))
    }

    /// Always rolls `face` on a d`sides`.
    pub fn always(face: u32, sides: u32) -> Self {
        Self::new(vec![Self::face(face, sides)])
    }
}

impl RandomSource for FixedRandom {
    fn next_unit(&mut self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        let value = self.values[self.next % self.values.len()];
        self.next += 1;
        value
    }
}

/// Keeps every snapshot it is given. Clones share the same store.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    snapshots: Arc<Mutex<Vec<SessionSnapshot>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.lock().len()
    }

    pub fn last(&self) -> Option<SessionSnapshot> {
        self.lock().last().cloned()
    }

    pub fn all(&self) -> Vec<SessionSnapshot> {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<SessionSnapshot>> {
        self.snapshots
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl PersistenceSink for RecordingSink {
    fn persist(&mut self, snapshot: &SessionSnapshot) -> Result<(), PersistError> {
        self.lock().push(snapshot.clone());
        Ok(())
    }
}

/// Test harness for running scripted sessions.
pub struct TestHarness {
    pub session: Session,
    pub sink: RecordingSink,
    resolutions: Vec<Resolution>,
}

impl TestHarness {
    /// A harness around the sample warlock with dice that always roll 4 on
    /// a d8.
    pub fn new() -> Self {
        Self::with_character(sample_warlock())
    }

    pub fn with_character(character: Character) -> Self {
        Self::with_rng(character, FixedRandom::always(4, 8))
    }

    pub fn with_rng(character: Character, rng: impl RandomSource + 'static) -> Self {
        let sink = RecordingSink::new();
        let session = Session::with_character(SessionConfig::new(), character)
            .with_rng(rng)
            .with_sink(sink.clone());
        Self {
            session,
            sink,
            resolutions: Vec::new(),
        }
    }

    /// Dispatch one command.
    pub fn run(&mut self, command: Command) -> &Resolution {
        let resolution = self.session.dispatch(command);
        self.resolutions.push(resolution);
        // just pushed
        &self.resolutions[self.resolutions.len() - 1]
    }

    /// Dispatch a sequence of commands.
    pub fn script(&mut self, commands: impl IntoIterator<Item = Command>) -> &mut Self {
        for command in commands {
            self.run(command);
        }
        self
    }

    pub fn character(&self) -> &Character {
        self.session.character()
    }

    /// Current HP as (current, max).
    pub fn hp(&self) -> (i32, i32) {
        let hp = &self.session.character().hp;
        (hp.current, hp.max)
    }

    pub fn last_resolution(&self) -> Option<&Resolution> {
        self.resolutions.last()
    }

    pub fn last_toast(&self) -> Option<&str> {
        self.resolutions.last().and_then(|r| r.toast.as_deref())
    }

    /// Every toast produced so far, in order.
    pub fn toasts(&self) -> Vec<&str> {
        self.resolutions
            .iter()
            .filter_map(|r| r.toast.as_deref())
            .collect()
    }

    pub fn concentration(&self) -> Option<&str> {
        self.session.character().concentration.as_deref()
    }

    pub fn casting_step(&self) -> CastingStep {
        self.session.combat().casting.step
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Assertion Helpers
// ============================================================================

/// Assert the character's HP.
#[track_caller]
pub fn assert_hp(harness: &TestHarness, current: i32, max: i32) {
    let (actual_current, actual_max) = harness.hp();
    assert_eq!(
        (actual_current, actual_max),
        (current, max),
        "Expected HP {current}/{max}, got {actual_current}/{actual_max}"
    );
}

/// Assert the character is concentrating on `spell`.
#[track_caller]
pub fn assert_concentrating(harness: &TestHarness, spell: &str) {
    assert_eq!(
        harness.concentration(),
        Some(spell),
        "Expected concentration on {spell}"
    );
    let tracked = harness
        .session
        .combat()
        .active_concentration
        .as_ref()
        .map(|c| c.spell_name.as_str());
    assert_eq!(tracked, Some(spell), "Combat tracker disagrees on concentration");
}

/// Assert the character is not concentrating.
#[track_caller]
pub fn assert_not_concentrating(harness: &TestHarness) {
    assert_eq!(harness.concentration(), None, "Expected no concentration");
    assert!(
        harness.session.combat().active_concentration.is_none(),
        "Combat tracker still holds concentration"
    );
}

/// Assert the last command was rejected without changing anything.
#[track_caller]
pub fn assert_ignored(harness: &TestHarness) {
    assert!(
        harness.last_resolution().is_some_and(Resolution::is_ignored),
        "Expected the last command to be ignored, got {:?}",
        harness.last_resolution()
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_random_cycles() {
        let mut rng = FixedRandom::new(vec![0.1, 0.9]);
        assert_eq!(rng.next_unit(), 0.1);
        assert_eq!(rng.next_unit(), 0.9);
        assert_eq!(rng.next_unit(), 0.1);
    }

    #[test]
    fn test_fixed_random_face() {
        let mut rng = FixedRandom::always(4, 8);
        assert_eq!(rng.roll_die(8), 4);
        let mut rng = FixedRandom::always(20, 20);
        assert_eq!(rng.roll_die(20), 20);
    }

    #[test]
    fn test_sample_multiclass_slots() {
        let character = sample_multiclass();
        assert_eq!(character.pact_slots.max, 2);
        assert_eq!(character.pact_slots.level, 2);
        assert_eq!(character.slot(1).map(|s| s.max), Some(2));
        assert_eq!(character.slot(2).map(|s| s.max), Some(0));
    }

    #[test]
    fn test_harness_records_snapshots() {
        let mut harness = TestHarness::new();
        harness.run(Command::TakeDamage { amount: 8 });
        assert_hp(&harness, 30, 38);
        assert_eq!(harness.sink.count(), 1);
        assert_eq!(harness.sink.last().map(|s| s.character.hp.current), Some(30));

        harness.run(Command::BreakConcentration);
        assert_ignored(&harness);
        assert_eq!(harness.sink.count(), 1);
    }
}
