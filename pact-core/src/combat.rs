//! Combat state machine.
//!
//! Tracks the phase of play, the casting sequence, concentration, turn and
//! round counters, the minion roster and a bounded combat log. Transitions
//! that are not valid from the current state are ignored and reported as
//! `false`/`None` rather than errors.

use crate::minions::{Minion, MinionId, MinionRegistry};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, VecDeque};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;
use uuid::Uuid;

pub const DEFAULT_LOG_CAPACITY: usize = 50;
/// Lowest possible concentration save DC.
pub const CONCENTRATION_DC_FLOOR: i32 = 10;

/// Constitution save DC to keep concentrating after `damage`.
pub fn concentration_dc(damage: i32) -> i32 {
    (damage.max(0) / 2).max(CONCENTRATION_DC_FLOOR)
}

/// Convert a spell duration like `"Concentration, up to 1 minute"` to rounds
/// of six seconds. Instantaneous or unrecognised durations give `None`.
pub fn duration_to_rounds(duration: &str) -> Option<u32> {
    let lower = duration.to_ascii_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();

    words.windows(2).find_map(|pair| {
        let amount: u32 = pair[0].parse().ok()?;
        let per_unit = match pair[1].trim_end_matches('s') {
            "round" => 1,
            "minute" => 10,
            "hour" => 600,
            "day" => 14_400,
            _ => return None,
        };
        amount.checked_mul(per_unit)
    })
}

pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

// ============================================================================
// Phases and casting
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CombatPhase {
    #[default]
    Idle,
    Casting,
    Resolving,
    MinionTurn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CastingStep {
    #[default]
    Idle,
    SelectSpell,
    ConfirmSlot,
    ChooseTargets,
    Resolve,
    ApplyEffects,
    Complete,
}

impl fmt::Display for CastingStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CastingStep::Idle => "idle",
            CastingStep::SelectSpell => "select_spell",
            CastingStep::ConfirmSlot => "confirm_slot",
            CastingStep::ChooseTargets => "choose_targets",
            CastingStep::Resolve => "resolve",
            CastingStep::ApplyEffects => "apply_effects",
            CastingStep::Complete => "complete",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionMode {
    Attack,
    Save,
    Automatic,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CastingState {
    pub step: CastingStep,
    pub spell_id: Option<String>,
    pub spell_name: Option<String>,
    pub slot_level: Option<u8>,
    pub resolution_mode: Option<ResolutionMode>,
}

impl CastingState {
    pub fn is_idle(&self) -> bool {
        self.step == CastingStep::Idle
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveConcentration {
    pub spell_id: String,
    pub spell_name: String,
    pub start_round: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_duration_rounds: Option<u32>,
}

impl ActiveConcentration {
    /// Whether the spell's duration has run out by `round`.
    pub fn expired_at(&self, round: u32) -> bool {
        self.max_duration_rounds
            .is_some_and(|max| round >= self.start_round.saturating_add(max))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckResolution {
    Maintained,
    Broken(ActiveConcentration),
}

/// A participant in the initiative order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Combatant {
    Player,
    Minion(MinionId),
}

// ============================================================================
// Combat log
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogKind {
    Damage,
    Healing,
    Concentration,
    Spell,
    Minion,
    Rest,
    Turn,
    Info,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub id: Uuid,
    pub timestamp: u64,
    #[serde(rename = "type")]
    pub kind: LogKind,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Newest-first log that forgets its oldest entries past `capacity`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CombatLog {
    entries: VecDeque<LogEntry>,
    capacity: usize,
}

impl CombatLog {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, kind: LogKind, title: impl Into<String>, detail: Option<String>) {
        if self.capacity == 0 {
            return;
        }
        self.entries.push_front(LogEntry {
            id: Uuid::new_v4(),
            timestamp: now_millis(),
            kind,
            title: title.into(),
            detail,
        });
        self.entries.truncate(self.capacity);
    }

    pub fn entries(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    pub fn latest(&self) -> Option<&LogEntry> {
        self.entries.front()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl Default for CombatLog {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_LOG_CAPACITY)
    }
}

// ============================================================================
// Combat state
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CombatState {
    pub phase: CombatPhase,
    pub current_round: u32,
    pub current_turn_index: usize,
    pub active_concentration: Option<ActiveConcentration>,
    pub concentration_check_dc: Option<i32>,
    pub casting: CastingState,
    pub initiative_order: Vec<Combatant>,
    pub minions: MinionRegistry,
    pub log: CombatLog,
    /// Conditions on the character (minions track their own).
    pub conditions: BTreeSet<String>,
    pub reaction_available: bool,
    pub bonus_action_available: bool,
}

impl Default for CombatState {
    fn default() -> Self {
        Self::with_log_capacity(DEFAULT_LOG_CAPACITY)
    }
}

impl CombatState {
    pub fn with_log_capacity(capacity: usize) -> Self {
        Self {
            phase: CombatPhase::Idle,
            current_round: 1,
            current_turn_index: 0,
            active_concentration: None,
            concentration_check_dc: None,
            casting: CastingState::default(),
            initiative_order: Vec::new(),
            minions: MinionRegistry::new(),
            log: CombatLog::with_capacity(capacity),
            conditions: BTreeSet::new(),
            reaction_available: true,
            bonus_action_available: true,
        }
    }

    // ------------------------------------------------------------------------
    // Concentration
    // ------------------------------------------------------------------------

    /// Begin concentrating, silently dropping whatever came before.
    pub fn start_concentration(
        &mut self,
        spell_id: impl Into<String>,
        spell_name: impl Into<String>,
        max_duration_rounds: Option<u32>,
    ) -> Option<ActiveConcentration> {
        let previous = self.active_concentration.replace(ActiveConcentration {
            spell_id: spell_id.into(),
            spell_name: spell_name.into(),
            start_round: self.current_round,
            max_duration_rounds,
        });
        self.concentration_check_dc = None;
        previous
    }

    pub fn break_concentration(&mut self) -> Option<ActiveConcentration> {
        self.concentration_check_dc = None;
        self.active_concentration.take()
    }

    /// Record a pending save after `damage`. Ignored when not concentrating.
    pub fn require_concentration_check(&mut self, damage: i32) -> Option<i32> {
        if self.active_concentration.is_none() {
            debug!(damage, "concentration check without active concentration ignored");
            return None;
        }
        let dc = concentration_dc(damage);
        self.concentration_check_dc = Some(dc);
        Some(dc)
    }

    pub fn resolve_concentration_check(&mut self, passed: bool) -> Option<CheckResolution> {
        self.concentration_check_dc.take()?;
        if passed {
            return Some(CheckResolution::Maintained);
        }
        self.active_concentration.take().map(CheckResolution::Broken)
    }

    // ------------------------------------------------------------------------
    // Casting
    // ------------------------------------------------------------------------

    fn reject(&self, transition: &str) -> bool {
        debug!(transition, step = %self.casting.step, "casting transition rejected");
        false
    }

    pub fn start_casting(&mut self, spell_id: impl Into<String>, spell_name: impl Into<String>) -> bool {
        if !self.casting.is_idle() {
            return self.reject("casting_started");
        }
        self.phase = CombatPhase::Casting;
        self.casting = CastingState {
            step: CastingStep::SelectSpell,
            spell_id: Some(spell_id.into()),
            spell_name: Some(spell_name.into()),
            slot_level: None,
            resolution_mode: None,
        };
        true
    }

    pub fn can_confirm_slot(&self) -> bool {
        matches!(
            self.casting.step,
            CastingStep::SelectSpell | CastingStep::ConfirmSlot | CastingStep::ChooseTargets
        )
    }

    pub fn confirm_slot(&mut self, slot_level: u8, mode: ResolutionMode) -> bool {
        if !self.can_confirm_slot() {
            return self.reject("slot_confirmed");
        }
        self.casting.step = CastingStep::Resolve;
        self.casting.slot_level = Some(slot_level);
        self.casting.resolution_mode = Some(mode);
        self.phase = CombatPhase::Resolving;
        true
    }

    pub fn resolve_casting(&mut self) -> bool {
        if self.casting.step != CastingStep::Resolve {
            return self.reject("casting_resolved");
        }
        self.casting.step = CastingStep::ApplyEffects;
        true
    }

    pub fn complete_casting(&mut self) -> bool {
        if !matches!(
            self.casting.step,
            CastingStep::ApplyEffects | CastingStep::Complete
        ) {
            return self.reject("casting_completed");
        }
        self.reset_casting();
        true
    }

    /// Abandon the cast from any step. A slot already spent stays spent.
    /// Returns false when there was nothing to cancel.
    pub fn cancel_casting(&mut self) -> bool {
        if self.casting.is_idle() {
            return false;
        }
        self.reset_casting();
        true
    }

    fn reset_casting(&mut self) {
        self.casting = CastingState::default();
        if matches!(self.phase, CombatPhase::Casting | CombatPhase::Resolving) {
            self.phase = CombatPhase::Idle;
        }
    }

    // ------------------------------------------------------------------------
    // Minions
    // ------------------------------------------------------------------------

    pub fn add_minion(&mut self, minion: Minion, track_initiative: bool) -> MinionId {
        let id = self.minions.insert(minion);
        if track_initiative {
            self.initiative_order.push(Combatant::Minion(id));
        }
        id
    }

    pub fn remove_minion(&mut self, id: MinionId) -> Option<Minion> {
        let removed = self.minions.remove(id)?;
        self.remove_from_initiative(Combatant::Minion(id));
        if self.phase == CombatPhase::MinionTurn {
            self.phase = CombatPhase::Idle;
        }
        Some(removed)
    }

    pub fn clear_minions(&mut self) -> usize {
        let count = self.minions.clear();
        let current = self.current_combatant();
        self.initiative_order.retain(|c| *c == Combatant::Player);
        self.current_turn_index = match current {
            Some(Combatant::Player) => 0,
            _ => self
                .current_turn_index
                .min(self.initiative_order.len().saturating_sub(1)),
        };
        if self.phase == CombatPhase::MinionTurn {
            self.phase = CombatPhase::Idle;
        }
        count
    }

    fn remove_from_initiative(&mut self, combatant: Combatant) {
        let Some(position) = self.initiative_order.iter().position(|c| *c == combatant) else {
            return;
        };
        self.initiative_order.remove(position);
        if position < self.current_turn_index {
            self.current_turn_index -= 1;
        }
        if self.current_turn_index >= self.initiative_order.len() {
            self.current_turn_index = 0;
        }
    }

    pub fn minion_turn_started(&mut self, id: MinionId) -> bool {
        if !self.minions.contains(id) || self.phase != CombatPhase::Idle {
            debug!(%id, phase = ?self.phase, "minion turn start rejected");
            return false;
        }
        self.phase = CombatPhase::MinionTurn;
        true
    }

    pub fn minion_turn_ended(&mut self) -> bool {
        if self.phase != CombatPhase::MinionTurn {
            return false;
        }
        self.phase = CombatPhase::Idle;
        true
    }

    /// Remove minions whose control has lapsed by the current round.
    pub fn release_expired_minions(&mut self) -> Vec<Minion> {
        self.minions
            .expired(self.current_round)
            .into_iter()
            .filter_map(|id| self.remove_minion(id))
            .collect()
    }

    // ------------------------------------------------------------------------
    // Turns and rounds
    // ------------------------------------------------------------------------

    pub fn start_combat(&mut self) {
        self.phase = CombatPhase::Idle;
        self.current_round = 1;
        self.current_turn_index = 0;
        if !self.initiative_order.contains(&Combatant::Player) {
            self.initiative_order.insert(0, Combatant::Player);
        }
        self.round_reset();
    }

    /// Replace the initiative order. Unknown minions and duplicates are
    /// dropped.
    pub fn set_initiative_order(&mut self, order: Vec<Combatant>) {
        let mut seen = BTreeSet::new();
        self.initiative_order = order
            .into_iter()
            .filter(|c| match c {
                Combatant::Player => seen.insert(None),
                Combatant::Minion(id) => self.minions.contains(*id) && seen.insert(Some(*id)),
            })
            .collect();
        self.current_turn_index = 0;
    }

    pub fn current_combatant(&self) -> Option<Combatant> {
        self.initiative_order.get(self.current_turn_index).copied()
    }

    /// Move to the next combatant; wrapping around starts a new round.
    pub fn advance_turn(&mut self) -> bool {
        if self.initiative_order.is_empty() {
            return false;
        }
        self.current_turn_index = (self.current_turn_index + 1) % self.initiative_order.len();
        if self.current_turn_index == 0 {
            self.current_round += 1;
            self.round_reset();
        }
        true
    }

    /// Step back one turn, never before the first turn of round 1.
    pub fn previous_turn(&mut self) -> bool {
        if self.initiative_order.is_empty() {
            return false;
        }
        if self.current_turn_index > 0 {
            self.current_turn_index -= 1;
            true
        } else if self.current_round > 1 {
            self.current_round -= 1;
            self.current_turn_index = self.initiative_order.len() - 1;
            true
        } else {
            false
        }
    }

    /// Back to out-of-combat defaults. Minions stay.
    pub fn end_combat(&mut self) {
        self.phase = CombatPhase::Idle;
        self.current_round = 1;
        self.current_turn_index = 0;
        self.active_concentration = None;
        self.concentration_check_dc = None;
        self.casting = CastingState::default();
        self.round_reset();
    }

    // ------------------------------------------------------------------------
    // Action economy and conditions
    // ------------------------------------------------------------------------

    pub fn use_reaction(&mut self) -> bool {
        std::mem::replace(&mut self.reaction_available, false)
    }

    pub fn use_bonus_action(&mut self) -> bool {
        std::mem::replace(&mut self.bonus_action_available, false)
    }

    pub fn round_reset(&mut self) {
        self.reaction_available = true;
        self.bonus_action_available = true;
    }

    pub fn add_condition(&mut self, condition: &str) -> bool {
        let condition = condition.trim();
        !condition.is_empty() && self.conditions.insert(condition.to_string())
    }

    pub fn remove_condition(&mut self, condition: &str) -> bool {
        self.conditions.remove(condition.trim())
    }

    pub fn clear_conditions(&mut self) -> usize {
        let count = self.conditions.len();
        self.conditions.clear();
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::minions;

    #[test]
    fn test_concentration_dc() {
        assert_eq!(concentration_dc(0), 10);
        assert_eq!(concentration_dc(7), 10);
        assert_eq!(concentration_dc(21), 10);
        assert_eq!(concentration_dc(22), 11);
        assert_eq!(concentration_dc(45), 22);
    }

    #[test]
    fn test_duration_to_rounds() {
        assert_eq!(duration_to_rounds("Concentration, up to 1 minute"), Some(10));
        assert_eq!(duration_to_rounds("10 minutes"), Some(100));
        assert_eq!(duration_to_rounds("1 hour"), Some(600));
        assert_eq!(duration_to_rounds("Up to 8 hours"), Some(4800));
        assert_eq!(duration_to_rounds("24 hours"), Some(14_400));
        assert_eq!(duration_to_rounds("1 round"), Some(1));
        assert_eq!(duration_to_rounds("11 minutes"), Some(110));
        assert_eq!(duration_to_rounds("Instantaneous"), None);
        assert_eq!(duration_to_rounds(""), None);
    }

    #[test]
    fn test_new_concentration_replaces_old() {
        let mut combat = CombatState::default();
        assert!(combat.start_concentration("hex", "Hex", Some(600)).is_none());
        combat.require_concentration_check(12);
        let previous = combat.start_concentration("fly", "Fly", Some(100));
        assert_eq!(previous.map(|c| c.spell_name), Some("Hex".to_string()));
        assert_eq!(combat.concentration_check_dc, None);
        assert_eq!(
            combat.active_concentration.as_ref().map(|c| c.spell_id.as_str()),
            Some("fly")
        );
    }

    #[test]
    fn test_check_lifecycle() {
        let mut combat = CombatState::default();
        assert_eq!(combat.require_concentration_check(30), None);
        assert_eq!(combat.resolve_concentration_check(false), None);

        combat.start_concentration("hex", "Hex", None);
        assert_eq!(combat.require_concentration_check(30), Some(15));
        assert_eq!(
            combat.resolve_concentration_check(true),
            Some(CheckResolution::Maintained)
        );
        assert!(combat.active_concentration.is_some());
        assert_eq!(combat.concentration_check_dc, None);

        combat.require_concentration_check(4);
        let resolution = combat.resolve_concentration_check(false);
        assert!(matches!(resolution, Some(CheckResolution::Broken(c)) if c.spell_name == "Hex"));
        assert!(combat.active_concentration.is_none());
    }

    #[test]
    fn test_casting_happy_path() {
        let mut combat = CombatState::default();
        assert!(combat.start_casting("hex", "Hex"));
        assert_eq!(combat.phase, CombatPhase::Casting);
        assert_eq!(combat.casting.step, CastingStep::SelectSpell);

        assert!(combat.confirm_slot(3, ResolutionMode::Automatic));
        assert_eq!(combat.phase, CombatPhase::Resolving);
        assert_eq!(combat.casting.step, CastingStep::Resolve);
        assert_eq!(combat.casting.slot_level, Some(3));

        assert!(combat.resolve_casting());
        assert_eq!(combat.casting.step, CastingStep::ApplyEffects);

        assert!(combat.complete_casting());
        assert_eq!(combat.casting, CastingState::default());
        assert_eq!(combat.phase, CombatPhase::Idle);
    }

    #[test]
    fn test_casting_out_of_order_is_ignored() {
        let mut combat = CombatState::default();
        assert!(!combat.confirm_slot(1, ResolutionMode::Attack));
        assert!(!combat.resolve_casting());
        assert!(!combat.complete_casting());
        assert_eq!(combat.casting.step, CastingStep::Idle);

        combat.start_casting("hex", "Hex");
        assert!(!combat.start_casting("fly", "Fly"));
        assert!(!combat.resolve_casting());
        assert!(!combat.complete_casting());
        assert_eq!(combat.casting.spell_id.as_deref(), Some("hex"));
    }

    #[test]
    fn test_cancel_from_every_step() {
        for steps in 1..=3 {
            let mut combat = CombatState::default();
            combat.start_casting("hex", "Hex");
            if steps >= 2 {
                combat.confirm_slot(3, ResolutionMode::Save);
            }
            if steps >= 3 {
                combat.resolve_casting();
            }
            assert!(combat.cancel_casting());
            assert!(combat.casting.is_idle());
            assert_eq!(combat.phase, CombatPhase::Idle);
            assert!(!combat.cancel_casting());
        }
    }

    #[test]
    fn test_turn_advance_wraps_round() {
        let mut combat = CombatState::default();
        assert!(!combat.advance_turn());

        combat.start_combat();
        combat.add_minion(minions::skeleton(1), true);
        combat.use_reaction();
        assert!(combat.advance_turn());
        assert_eq!(combat.current_turn_index, 1);
        assert_eq!(combat.current_round, 1);
        assert!(!combat.reaction_available);

        assert!(combat.advance_turn());
        assert_eq!(combat.current_turn_index, 0);
        assert_eq!(combat.current_round, 2);
        assert!(combat.reaction_available);
    }

    #[test]
    fn test_previous_turn() {
        let mut combat = CombatState::default();
        combat.start_combat();
        combat.add_minion(minions::zombie(1), true);
        assert!(!combat.previous_turn());
        combat.advance_turn();
        combat.advance_turn();
        assert!(combat.previous_turn());
        assert_eq!((combat.current_round, combat.current_turn_index), (1, 1));
    }

    #[test]
    fn test_end_combat_keeps_minions() {
        let mut combat = CombatState::default();
        combat.start_combat();
        let id = combat.add_minion(minions::skeleton(1), true);
        combat.advance_turn();
        combat.advance_turn();
        combat.start_concentration("hex", "Hex", None);
        combat.require_concentration_check(10);
        combat.start_casting("fly", "Fly");

        combat.end_combat();
        assert_eq!(combat.current_round, 1);
        assert_eq!(combat.current_turn_index, 0);
        assert!(combat.active_concentration.is_none());
        assert!(combat.concentration_check_dc.is_none());
        assert!(combat.casting.is_idle());
        assert!(combat.minions.contains(id));
    }

    #[test]
    fn test_remove_minion_adjusts_turn() {
        let mut combat = CombatState::default();
        combat.start_combat();
        let a = combat.add_minion(minions::skeleton(1), true);
        let b = combat.add_minion(minions::zombie(1), true);
        combat.advance_turn();
        combat.advance_turn();
        assert_eq!(combat.current_combatant(), Some(Combatant::Minion(b)));

        combat.remove_minion(a);
        assert_eq!(combat.current_combatant(), Some(Combatant::Minion(b)));
        combat.remove_minion(b);
        assert_eq!(combat.current_combatant(), Some(Combatant::Player));
        assert!(combat.remove_minion(b).is_none());
    }

    #[test]
    fn test_clear_minions_keeps_player() {
        let mut combat = CombatState::default();
        combat.start_combat();
        combat.add_minion(minions::skeleton(1), true);
        combat.add_minion(minions::zombie(1), false);
        assert_eq!(combat.clear_minions(), 2);
        assert_eq!(combat.initiative_order, vec![Combatant::Player]);
        assert!(combat.minions.is_empty());
    }

    #[test]
    fn test_set_initiative_order_filters() {
        let mut combat = CombatState::default();
        let id = combat.add_minion(minions::skeleton(1), false);
        combat.set_initiative_order(vec![
            Combatant::Minion(id),
            Combatant::Player,
            Combatant::Minion(MinionId::new()),
            Combatant::Player,
        ]);
        assert_eq!(
            combat.initiative_order,
            vec![Combatant::Minion(id), Combatant::Player]
        );
    }

    #[test]
    fn test_minion_turn_phase() {
        let mut combat = CombatState::default();
        let id = combat.add_minion(minions::skeleton(1), true);
        assert!(!combat.minion_turn_ended());
        assert!(!combat.minion_turn_started(MinionId::new()));
        assert!(combat.minion_turn_started(id));
        assert_eq!(combat.phase, CombatPhase::MinionTurn);
        assert!(!combat.minion_turn_started(id));
        assert!(combat.minion_turn_ended());
        assert_eq!(combat.phase, CombatPhase::Idle);
    }

    #[test]
    fn test_release_expired_minions() {
        let mut combat = CombatState::default();
        combat.add_minion(minions::undead_spirit(minions::SpiritForm::Ghostly, 3, 5, 1), true);
        combat.add_minion(minions::zombie(1), true);
        combat.current_round = 700;
        let released = combat.release_expired_minions();
        assert_eq!(released.len(), 1);
        assert_eq!(combat.minions.len(), 1);
        assert_eq!(combat.initiative_order.len(), 1);
    }

    #[test]
    fn test_action_economy() {
        let mut combat = CombatState::default();
        assert!(combat.use_reaction());
        assert!(!combat.use_reaction());
        assert!(combat.use_bonus_action());
        assert!(!combat.use_bonus_action());
        combat.round_reset();
        assert!(combat.reaction_available && combat.bonus_action_available);
    }

    #[test]
    fn test_conditions_set_semantics() {
        let mut combat = CombatState::default();
        assert!(combat.add_condition("Poisoned"));
        assert!(!combat.add_condition("Poisoned"));
        assert!(!combat.add_condition(" "));
        assert!(combat.add_condition("Prone"));
        assert!(combat.remove_condition("Prone"));
        assert_eq!(combat.clear_conditions(), 1);
    }

    #[test]
    fn test_log_is_bounded_newest_first() {
        let mut log = CombatLog::with_capacity(3);
        for i in 0..5 {
            log.push(LogKind::Info, format!("entry {i}"), None);
        }
        assert_eq!(log.len(), 3);
        let titles: Vec<_> = log.entries().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["entry 4", "entry 3", "entry 2"]);
    }

    #[test]
    fn test_concentration_expiry() {
        let active = ActiveConcentration {
            spell_id: "hex".into(),
            spell_name: "Hex".into(),
            start_round: 2,
            max_duration_rounds: Some(10),
        };
        assert!(!active.expired_at(11));
        assert!(active.expired_at(12));
    }
}
