//! Command dispatch.
//!
//! Every mutation of play state arrives as a [`Command`]. The [`RulesEngine`]
//! runs it to completion against a [`PlayState`] and returns a
//! [`Resolution`]: the [`Effect`]s describing what changed plus an optional
//! short message for the player. Commands that are not valid in the current
//! state change nothing and resolve to an informational effect.

use crate::character::{
    Ability, AcEffect, AttuneOutcome, Character, ChargeOutcome, DeathSaveKind, DeathSaveStatus,
    HpChange, InventoryItem, MAX_ATTUNED_ITEMS,
};
use crate::combat::{
    duration_to_rounds, CastingStep, CheckResolution, CombatState, Combatant, LogKind, ResolutionMode,
};
use crate::derived::character_spell_attack_bonus;
use crate::dice::{roll_dice_formula, DiceRollBreakdown, RandomSource};
use crate::minions::{self, Minion, MinionChanges, MinionId, SpiritForm};
use crate::validation::{self, Validated};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// The full mutable state tree of a play session.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PlayState {
    pub character: Character,
    pub combat: CombatState,
}

impl PlayState {
    pub fn new(character: Character, combat: CombatState) -> Self {
        Self { character, combat }
    }
}

// ============================================================================
// Commands
// ============================================================================

/// Minion stat blocks that can be raised by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MinionTemplate {
    Skeleton,
    Zombie,
    UndeadSpirit { form: SpiritForm },
}

/// A single requested state transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    // Hit points
    SetHp { value: i64 },
    TakeDamage { amount: i32 },
    Heal { amount: i32 },
    SetTempHp { value: i64 },
    ClearTempHp,
    SpendHitDie,
    ShortRest,
    LongRest,

    // Level and abilities
    SetLevel { level: i64 },
    SetAbilityScore { ability: Ability, score: i64 },

    // Slots, invocations, arcanum
    UsePactSlot,
    RestorePactSlot,
    RefillPactSlots,
    ExpendSlot { level: u8 },
    RestoreSlot { level: u8 },
    ToggleInvocation { id: String },
    ConsumeInvocationUse { id: String },
    SetArcanumSpell { level: u8, spell_name: String },
    UseArcanum { level: u8 },
    RestoreArcanum { level: u8 },

    // Death saves, AC effects, alternate forms
    RecordDeathSave { kind: DeathSaveKind },
    SetDeathSave { kind: DeathSaveKind, value: u8 },
    SetAcEffect { effect: AcEffect, active: bool },
    StartTransformation { creature_name: String, hp: i32, ac: i32 },
    EndTransformation,

    // Attunement and inventory
    AttuneItem { name: String },
    UnattuneItem { index: usize },
    AddInventoryItem { item: InventoryItem },
    RemoveInventoryItem { index: usize },
    UpdateInventoryItem { index: usize, item: InventoryItem },
    ConsumeItemCharge { index: usize },

    // Conditions and action economy
    AddCondition { condition: String },
    RemoveCondition { condition: String },
    ClearConditions,
    UseReaction,
    UseBonusAction,
    RoundReset,

    // Concentration
    StartConcentration {
        spell_id: String,
        spell_name: String,
        #[serde(default)]
        duration: Option<String>,
    },
    BreakConcentration,
    ResolveConcentrationCheck { passed: bool },

    // Casting
    StartCasting { spell_id: String, spell_name: String },
    ConfirmSlot {
        slot_level: u8,
        mode: ResolutionMode,
        #[serde(default)]
        concentration: bool,
        #[serde(default)]
        duration: Option<String>,
    },
    ResolveCasting,
    CompleteCasting,
    CancelCasting,

    // Minions
    AddMinion {
        minion: Minion,
        #[serde(default)]
        track_initiative: bool,
    },
    SummonMinion {
        template: MinionTemplate,
        #[serde(default)]
        slot_level: u8,
        #[serde(default)]
        track_initiative: bool,
    },
    DamageMinion { id: MinionId, amount: i32 },
    HealMinion { id: MinionId, amount: i32 },
    UpdateMinion { id: MinionId, changes: MinionChanges },
    RemoveMinion { id: MinionId },
    ClearMinions,
    AddMinionCondition { id: MinionId, condition: String },
    RemoveMinionCondition { id: MinionId, condition: String },
    MinionTurnStarted { id: MinionId },
    MinionTurnEnded,
    ReleaseExpiredMinions,

    // Turns
    StartCombat,
    SetInitiativeOrder { order: Vec<Combatant> },
    AdvanceTurn,
    PreviousTurn,
    EndCombat,

    // Dice
    RollFormula { formula: String, purpose: String },
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::SetHp { .. } => "set_hp",
            Command::TakeDamage { .. } => "take_damage",
            Command::Heal { .. } => "heal",
            Command::SetTempHp { .. } => "set_temp_hp",
            Command::ClearTempHp => "clear_temp_hp",
            Command::SpendHitDie => "spend_hit_die",
            Command::ShortRest => "short_rest",
            Command::LongRest => "long_rest",
            Command::SetLevel { .. } => "set_level",
            Command::SetAbilityScore { .. } => "set_ability_score",
            Command::UsePactSlot => "use_pact_slot",
            Command::RestorePactSlot => "restore_pact_slot",
            Command::RefillPactSlots => "refill_pact_slots",
            Command::ExpendSlot { .. } => "expend_slot",
            Command::RestoreSlot { .. } => "restore_slot",
            Command::ToggleInvocation { .. } => "toggle_invocation",
            Command::ConsumeInvocationUse { .. } => "consume_invocation_use",
            Command::SetArcanumSpell { .. } => "set_arcanum_spell",
            Command::UseArcanum { .. } => "use_arcanum",
            Command::RestoreArcanum { .. } => "restore_arcanum",
            Command::RecordDeathSave { .. } => "record_death_save",
            Command::SetDeathSave { .. } => "set_death_save",
            Command::SetAcEffect { .. } => "set_ac_effect",
            Command::StartTransformation { .. } => "start_transformation",
            Command::EndTransformation => "end_transformation",
            Command::AttuneItem { .. } => "attune_item",
            Command::UnattuneItem { .. } => "unattune_item",
            Command::AddInventoryItem { .. } => "add_inventory_item",
            Command::RemoveInventoryItem { .. } => "remove_inventory_item",
            Command::UpdateInventoryItem { .. } => "update_inventory_item",
            Command::ConsumeItemCharge { .. } => "consume_item_charge",
            Command::AddCondition { .. } => "add_condition",
            Command::RemoveCondition { .. } => "remove_condition",
            Command::ClearConditions => "clear_conditions",
            Command::UseReaction => "use_reaction",
            Command::UseBonusAction => "use_bonus_action",
            Command::RoundReset => "round_reset",
            Command::StartConcentration { .. } => "start_concentration",
            Command::BreakConcentration => "break_concentration",
            Command::ResolveConcentrationCheck { .. } => "resolve_concentration_check",
            Command::StartCasting { .. } => "start_casting",
            Command::ConfirmSlot { .. } => "confirm_slot",
            Command::ResolveCasting => "resolve_casting",
            Command::CompleteCasting => "complete_casting",
            Command::CancelCasting => "cancel_casting",
            Command::AddMinion { .. } => "add_minion",
            Command::SummonMinion { .. } => "summon_minion",
            Command::DamageMinion { .. } => "damage_minion",
            Command::HealMinion { .. } => "heal_minion",
            Command::UpdateMinion { .. } => "update_minion",
            Command::RemoveMinion { .. } => "remove_minion",
            Command::ClearMinions => "clear_minions",
            Command::AddMinionCondition { .. } => "add_minion_condition",
            Command::RemoveMinionCondition { .. } => "remove_minion_condition",
            Command::MinionTurnStarted { .. } => "minion_turn_started",
            Command::MinionTurnEnded => "minion_turn_ended",
            Command::ReleaseExpiredMinions => "release_expired_minions",
            Command::StartCombat => "start_combat",
            Command::SetInitiativeOrder { .. } => "set_initiative_order",
            Command::AdvanceTurn => "advance_turn",
            Command::PreviousTurn => "previous_turn",
            Command::EndCombat => "end_combat",
            Command::RollFormula { .. } => "roll_formula",
        }
    }

    /// Whether this command can lower the character's hit points.
    pub fn deals_damage(&self) -> bool {
        matches!(self, Command::SetHp { .. } | Command::TakeDamage { .. })
    }
}

// ============================================================================
// Effects
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakReason {
    Incapacitated,
    FailedSave,
    Ended,
    Rest,
    Expired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotSource {
    Pact,
    Standard,
    /// Level 0: nothing to spend.
    Cantrip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestKind {
    Short,
    Long,
}

/// A record of something that happened while resolving a command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Effect {
    HpChanged {
        previous: i32,
        current: i32,
        temp_absorbed: i32,
        damage_taken: i32,
        healed: i32,
    },
    TempHpChanged { temp: i32 },
    FormDamaged { creature_name: String, damage: i32, ended: bool },
    DeathSavesReset,
    DeathSaveRecorded { successes: u8, failures: u8, status: DeathSaveStatus },
    HitDieSpent { roll: i32, healing: i32, applied: i32, remaining: i32 },
    RestCompleted { kind: RestKind, pact_slots_restored: i32, hit_dice_recovered: i32 },
    LevelChanged { level: u8 },
    AbilityScoreChanged { ability: Ability, score: i32 },
    SlotSpent { source: SlotSource, level: u8 },
    SlotRestored { source: SlotSource, level: u8 },
    SlotUnavailable { level: u8 },
    InvocationToggled { id: String, active: bool },
    InvocationUsed { id: String },
    ArcanumChanged { level: u8, spell_name: String, used: bool },
    AcEffectChanged { effect: AcEffect, active: bool },
    TransformationStarted { creature_name: String },
    TransformationEnded { creature_name: String },
    ItemAttuned { name: String },
    ItemUnattuned { name: String },
    InventoryChanged { count: usize },
    ChargeConsumed { name: String, remaining: i32 },
    ConditionAdded { condition: String },
    ConditionRemoved { condition: String },
    ConditionsCleared { count: usize },
    ReactionUsed,
    BonusActionUsed,
    ActionsReset,
    ConcentrationStarted { spell_name: String, replaced: Option<String> },
    ConcentrationBroken { spell_name: String, reason: BreakReason },
    ConcentrationMaintained { spell_name: String },
    ConcentrationCheckRequired { spell_name: String, damage: i32, dc: i32 },
    CastingStarted { spell_id: String },
    CastingAdvanced { step: CastingStep },
    CastingCompleted { spell_id: Option<String> },
    CastingCancelled { spell_id: Option<String> },
    MinionAdded { id: MinionId, name: String },
    MinionHpChanged { id: MinionId, hp: i32 },
    MinionUpdated { id: MinionId },
    MinionRemoved { id: MinionId, name: String },
    MinionsCleared { count: usize },
    MinionConditionChanged { id: MinionId, condition: String, present: bool },
    MinionTurn { id: Option<MinionId> },
    MinionControlLapsed { id: MinionId },
    CombatStarted,
    TurnAdvanced { round: u32, turn_index: usize, combatant: Option<Combatant> },
    CombatEnded,
    FormulaRolled { purpose: String, breakdown: DiceRollBreakdown },
    RollFailed { formula: String, error: String },
    ValidationWarning { message: String },
    /// The command was not valid in the current state and changed nothing.
    Ignored { command: String, reason: String },
}

impl Effect {
    fn ignored(command: &Command, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        debug!(command = command.name(), %reason, "command ignored");
        Effect::Ignored {
            command: command.name().to_string(),
            reason,
        }
    }

    /// Combat log line for effects worth remembering.
    pub fn log_line(&self) -> Option<(LogKind, String, Option<String>)> {
        let line = match self {
            Effect::HpChanged {
                damage_taken,
                temp_absorbed,
                current,
                ..
            } if *damage_taken > 0 || *temp_absorbed > 0 => (
                LogKind::Damage,
                format!("Took {} damage", damage_taken + temp_absorbed),
                Some(format!("{temp_absorbed} absorbed by temporary HP, now at {current} HP")),
            ),
            Effect::HpChanged { healed, current, .. } if *healed > 0 => (
                LogKind::Healing,
                format!("Healed {healed} HP"),
                Some(format!("Now at {current} HP")),
            ),
            Effect::FormDamaged {
                creature_name,
                damage,
                ended,
            } => (
                LogKind::Damage,
                format!("{creature_name} took {damage} damage"),
                ended.then(|| format!("{creature_name} form ended")),
            ),
            Effect::ConcentrationStarted { spell_name, .. } => (
                LogKind::Concentration,
                format!("Concentrating on {spell_name}"),
                None,
            ),
            Effect::ConcentrationBroken { spell_name, reason } => (
                LogKind::Concentration,
                format!("Concentration on {spell_name} ended"),
                Some(format!("{reason:?}")),
            ),
            Effect::ConcentrationCheckRequired { spell_name, dc, .. } => (
                LogKind::Concentration,
                format!("CON save DC {dc}"),
                Some(format!("To maintain {spell_name}")),
            ),
            Effect::SlotSpent { source, level } => (
                LogKind::Spell,
                format!("Spent a level {level} slot"),
                Some(format!("{source:?}")),
            ),
            Effect::CastingCompleted { spell_id } => (
                LogKind::Spell,
                "Spell cast".to_string(),
                spell_id.clone(),
            ),
            Effect::RestCompleted { kind, .. } => (LogKind::Rest, format!("{kind:?} rest"), None),
            Effect::MinionAdded { name, .. } => (LogKind::Minion, format!("{name} joined"), None),
            Effect::MinionRemoved { name, .. } => (LogKind::Minion, format!("{name} removed"), None),
            Effect::MinionsCleared { count } => {
                (LogKind::Minion, format!("Cleared {count} minions"), None)
            }
            Effect::MinionControlLapsed { id } => (
                LogKind::Minion,
                "Control lapsed".to_string(),
                Some(id.to_string()),
            ),
            Effect::TurnAdvanced { round, .. } => (LogKind::Turn, format!("Round {round}"), None),
            Effect::CombatStarted => (LogKind::Turn, "Combat started".to_string(), None),
            Effect::CombatEnded => (LogKind::Turn, "Combat ended".to_string(), None),
            Effect::FormulaRolled { purpose, breakdown } => (
                LogKind::Info,
                format!("{purpose}: {}", breakdown.total),
                Some(breakdown.detail.clone()),
            ),
            _ => return None,
        };
        Some(line)
    }
}

/// The outcome of one command.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Resolution {
    pub effects: Vec<Effect>,
    pub toast: Option<String>,
}

impl Resolution {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    pub fn with_effects(mut self, effects: impl IntoIterator<Item = Effect>) -> Self {
        self.effects.extend(effects);
        self
    }

    pub fn with_toast(mut self, toast: impl Into<String>) -> Self {
        self.toast = Some(toast.into());
        self
    }

    fn push(&mut self, effect: Effect) {
        self.effects.push(effect);
    }

    fn toast(&mut self, toast: impl Into<String>) {
        self.toast = Some(toast.into());
    }

    /// Whether the command was rejected without changing anything.
    pub fn is_ignored(&self) -> bool {
        matches!(self.effects.as_slice(), [Effect::Ignored { .. }])
    }

    fn warn_if_invalid<T>(&mut self, validated: &Validated<T>) {
        if let Some(message) = validated.message() {
            self.push(Effect::ValidationWarning {
                message: message.clone(),
            });
            self.toast(message);
        }
    }
}

// ============================================================================
// Engine
// ============================================================================

/// Stateless executor of commands.
#[derive(Debug, Clone, Copy, Default)]
pub struct RulesEngine;

impl RulesEngine {
    pub fn new() -> Self {
        Self
    }

    /// Run `command` against `state`.
    pub fn execute(
        &self,
        state: &mut PlayState,
        command: &Command,
        rng: &mut dyn RandomSource,
    ) -> Resolution {
        let mut res = Resolution::new();
        match command {
            Command::SetHp { value } => {
                let validated = validation::validate_current_hp(*value);
                res.warn_if_invalid(&validated);
                let change = state.character.change_hp(validated.value);
                record_hp_change(state, &change, &mut res);
            }
            Command::TakeDamage { amount } => take_damage(state, command, *amount, &mut res),
            Command::Heal { amount } => {
                if *amount <= 0 {
                    return res.with_effect(Effect::ignored(command, "healing must be positive"));
                }
                let change = state.character.heal(*amount);
                record_hp_change(state, &change, &mut res);
            }
            Command::SetTempHp { value } => {
                let validated = validation::validate_temp_hp(*value);
                res.warn_if_invalid(&validated);
                if state.character.set_temp_hp(validated.value) {
                    res.push(Effect::TempHpChanged {
                        temp: state.character.hp.temp,
                    });
                } else {
                    res.push(Effect::ignored(command, "existing temporary HP is higher"));
                }
            }
            Command::ClearTempHp => {
                state.character.clear_temp_hp();
                res.push(Effect::TempHpChanged { temp: 0 });
            }
            Command::SpendHitDie => match state.character.spend_hit_die(rng) {
                Some(spend) => {
                    res.push(Effect::HitDieSpent {
                        roll: spend.roll,
                        healing: spend.healing,
                        applied: spend.applied,
                        remaining: state.character.hit_dice.current,
                    });
                    if spend.applied > 0 {
                        res.toast(format!("Healed {} HP", spend.applied));
                    }
                }
                None => res.push(Effect::ignored(command, "no hit dice or already at full HP")),
            },
            Command::ShortRest => {
                let restored = state.character.short_rest();
                res.push(Effect::RestCompleted {
                    kind: RestKind::Short,
                    pact_slots_restored: restored,
                    hit_dice_recovered: 0,
                });
                res.toast("Short Rest: Pact Slots Refilled");
            }
            Command::LongRest => {
                let summary = state.character.long_rest();
                if let Some(active) = state.combat.break_concentration() {
                    res.push(Effect::ConcentrationBroken {
                        spell_name: active.spell_name,
                        reason: BreakReason::Rest,
                    });
                } else if let Some(spell_name) = summary.concentration_ended {
                    res.push(Effect::ConcentrationBroken {
                        spell_name,
                        reason: BreakReason::Rest,
                    });
                }
                state.combat.round_reset();
                res.push(Effect::RestCompleted {
                    kind: RestKind::Long,
                    pact_slots_restored: summary.pact_slots_restored,
                    hit_dice_recovered: summary.hit_dice_recovered,
                });
                res.toast("Long Rest Completed");
            }

            Command::SetLevel { level } => {
                let validated = validation::validate_level(*level);
                res.warn_if_invalid(&validated);
                state.character.set_level(validated.value);
                res.push(Effect::LevelChanged {
                    level: state.character.level,
                });
                if validated.is_valid() {
                    res.toast(format!("Level changed to {}", state.character.level));
                }
            }
            Command::SetAbilityScore { ability, score } => {
                let validated = validation::validate_ability_score(*ability, *score);
                res.warn_if_invalid(&validated);
                state.character.set_ability_score(*ability, validated.value);
                res.push(Effect::AbilityScoreChanged {
                    ability: *ability,
                    score: validated.value,
                });
                if validated.is_valid() {
                    res.toast(format!("{ability} updated to {}", validated.value));
                }
            }

            Command::UsePactSlot => {
                let level = state.character.pact_slots.level;
                if state.character.use_pact_slot() {
                    res.push(Effect::SlotSpent {
                        source: SlotSource::Pact,
                        level,
                    });
                } else {
                    res.push(Effect::ignored(command, "no pact slots remaining"));
                }
            }
            Command::RestorePactSlot => {
                let level = state.character.pact_slots.level;
                if state.character.restore_pact_slot() {
                    res.push(Effect::SlotRestored {
                        source: SlotSource::Pact,
                        level,
                    });
                } else {
                    res.push(Effect::ignored(command, "pact slots already full"));
                }
            }
            Command::RefillPactSlots => {
                let restored = state.character.refill_pact_slots();
                res.push(Effect::RestCompleted {
                    kind: RestKind::Short,
                    pact_slots_restored: restored,
                    hit_dice_recovered: 0,
                });
            }
            Command::ExpendSlot { level } => {
                if state.character.expend_slot(*level) {
                    res.push(Effect::SlotSpent {
                        source: SlotSource::Standard,
                        level: *level,
                    });
                } else {
                    res.push(Effect::ignored(command, format!("no level {level} slots available")));
                }
            }
            Command::RestoreSlot { level } => {
                if state.character.restore_slot(*level) {
                    res.push(Effect::SlotRestored {
                        source: SlotSource::Standard,
                        level: *level,
                    });
                } else {
                    res.push(Effect::ignored(command, format!("no used level {level} slots")));
                }
            }
            Command::ToggleInvocation { id } => match state.character.toggle_invocation(id) {
                Some(active) => res.push(Effect::InvocationToggled {
                    id: id.clone(),
                    active,
                }),
                None => res.push(Effect::ignored(command, format!("unknown invocation {id}"))),
            },
            Command::ConsumeInvocationUse { id } => {
                if state.character.consume_invocation_use(id) {
                    res.push(Effect::InvocationUsed { id: id.clone() });
                } else {
                    res.push(Effect::ignored(command, "no uses remaining"));
                }
            }
            Command::SetArcanumSpell { level, spell_name } => {
                if state.character.set_arcanum_spell(*level, spell_name) {
                    res.push(arcanum_effect(&state.character, *level));
                } else {
                    res.push(Effect::ignored(command, format!("level {level} arcanum is locked")));
                }
            }
            Command::UseArcanum { level } => {
                if state.character.use_arcanum(*level) {
                    res.push(arcanum_effect(&state.character, *level));
                } else {
                    res.push(Effect::ignored(command, format!("level {level} arcanum unavailable")));
                }
            }
            Command::RestoreArcanum { level } => {
                if state.character.restore_arcanum(*level) {
                    res.push(arcanum_effect(&state.character, *level));
                } else {
                    res.push(Effect::ignored(command, format!("level {level} arcanum not used")));
                }
            }

            Command::RecordDeathSave { kind } => {
                let status = state.character.record_death_save(*kind);
                death_save_recorded(&state.character, status, &mut res);
            }
            Command::SetDeathSave { kind, value } => {
                let status = state.character.set_death_save(*kind, *value);
                death_save_recorded(&state.character, status, &mut res);
            }
            Command::SetAcEffect { effect, active } => {
                if state.character.set_ac_effect(*effect, *active) {
                    res.push(Effect::AcEffectChanged {
                        effect: *effect,
                        active: *active,
                    });
                } else {
                    res.push(Effect::ignored(command, "effect already in that state"));
                }
            }
            Command::StartTransformation {
                creature_name,
                hp,
                ac,
            } => {
                if state.character.start_transformation(creature_name, *hp, *ac) {
                    res.push(Effect::TransformationStarted {
                        creature_name: creature_name.trim().to_string(),
                    });
                } else {
                    res.push(Effect::ignored(command, "form needs a name and at least 1 HP"));
                }
            }
            Command::EndTransformation => match state.character.end_transformation() {
                Some(form) => res.push(Effect::TransformationEnded {
                    creature_name: form.creature_name,
                }),
                None => res.push(Effect::ignored(command, "not transformed")),
            },

            Command::AttuneItem { name } => match state.character.add_attuned_item(name) {
                AttuneOutcome::Attuned => res.push(Effect::ItemAttuned {
                    name: name.trim().to_string(),
                }),
                AttuneOutcome::AtCapacity => {
                    res.push(Effect::ignored(command, "attunement at capacity"));
                    res.toast(format!("Maximum {MAX_ATTUNED_ITEMS} attuned items!"));
                }
                AttuneOutcome::InvalidName => res.push(Effect::ignored(command, "blank item name")),
            },
            Command::UnattuneItem { index } => match state.character.remove_attuned_item(*index) {
                Some(name) => res.push(Effect::ItemUnattuned { name }),
                None => res.push(Effect::ignored(command, "no attuned item at that index")),
            },
            Command::AddInventoryItem { item } => {
                state.character.add_inventory_item(item.clone());
                res.push(Effect::InventoryChanged {
                    count: state.character.inventory.len(),
                });
                res.toast(format!("Added {}", item.name));
            }
            Command::RemoveInventoryItem { index } => {
                if state.character.remove_inventory_item(*index).is_some() {
                    res.push(Effect::InventoryChanged {
                        count: state.character.inventory.len(),
                    });
                } else {
                    res.push(Effect::ignored(command, "no item at that index"));
                }
            }
            Command::UpdateInventoryItem { index, item } => {
                if state.character.update_inventory_item(*index, item.clone()) {
                    res.push(Effect::InventoryChanged {
                        count: state.character.inventory.len(),
                    });
                } else {
                    res.push(Effect::ignored(command, "no item at that index"));
                }
            }
            Command::ConsumeItemCharge { index } => {
                let name = state
                    .character
                    .inventory
                    .get(*index)
                    .map(|item| item.name.clone())
                    .unwrap_or_default();
                match state.character.consume_item_charge(*index) {
                    ChargeOutcome::Consumed { remaining } => {
                        res.push(Effect::ChargeConsumed {
                            name: name.clone(),
                            remaining,
                        });
                        res.toast(format!("Used charge on {name}"));
                    }
                    ChargeOutcome::Empty => {
                        res.push(Effect::ignored(command, "no charges left"));
                        res.toast(format!("{name} has no charges left!"));
                    }
                    ChargeOutcome::Missing => {
                        res.push(Effect::ignored(command, "no item at that index"))
                    }
                }
            }

            Command::AddCondition { condition } => {
                if state.combat.add_condition(condition) {
                    res.push(Effect::ConditionAdded {
                        condition: condition.trim().to_string(),
                    });
                } else {
                    res.push(Effect::ignored(command, "condition already present"));
                }
            }
            Command::RemoveCondition { condition } => {
                if state.combat.remove_condition(condition) {
                    res.push(Effect::ConditionRemoved {
                        condition: condition.trim().to_string(),
                    });
                } else {
                    res.push(Effect::ignored(command, "condition not present"));
                }
            }
            Command::ClearConditions => {
                let count = state.combat.clear_conditions();
                res.push(Effect::ConditionsCleared { count });
            }
            Command::UseReaction => {
                if state.combat.use_reaction() {
                    res.push(Effect::ReactionUsed);
                } else {
                    res.push(Effect::ignored(command, "reaction already used"));
                }
            }
            Command::UseBonusAction => {
                if state.combat.use_bonus_action() {
                    res.push(Effect::BonusActionUsed);
                } else {
                    res.push(Effect::ignored(command, "bonus action already used"));
                }
            }
            Command::RoundReset => {
                state.combat.round_reset();
                res.push(Effect::ActionsReset);
            }

            Command::StartConcentration {
                spell_id,
                spell_name,
                duration,
            } => {
                let rounds = duration.as_deref().and_then(duration_to_rounds);
                start_concentration(state, spell_id, spell_name, rounds, &mut res);
            }
            Command::BreakConcentration => {
                let from_combat = state.combat.break_concentration().map(|c| c.spell_name);
                let from_character = state.character.end_concentration();
                match from_combat.or(from_character) {
                    Some(spell_name) => res.push(Effect::ConcentrationBroken {
                        spell_name,
                        reason: BreakReason::Ended,
                    }),
                    None => res.push(Effect::ignored(command, "not concentrating")),
                }
            }
            Command::ResolveConcentrationCheck { passed } => {
                match state.combat.resolve_concentration_check(*passed) {
                    Some(CheckResolution::Maintained) => {
                        let spell_name = state.character.concentration.clone().unwrap_or_default();
                        res.push(Effect::ConcentrationMaintained { spell_name });
                    }
                    Some(CheckResolution::Broken(active)) => {
                        state.character.end_concentration();
                        res.push(Effect::ConcentrationBroken {
                            spell_name: active.spell_name.clone(),
                            reason: BreakReason::FailedSave,
                        });
                        res.toast(format!("Lost concentration on {}", active.spell_name));
                    }
                    None => res.push(Effect::ignored(command, "no concentration check pending")),
                }
            }

            Command::StartCasting {
                spell_id,
                spell_name,
            } => {
                if state.combat.start_casting(spell_id.clone(), spell_name.clone()) {
                    res.push(Effect::CastingStarted {
                        spell_id: spell_id.clone(),
                    });
                } else {
                    res.push(Effect::ignored(command, "already casting"));
                }
            }
            Command::ConfirmSlot {
                slot_level,
                mode,
                concentration,
                duration,
            } => confirm_slot(
                state,
                command,
                *slot_level,
                *mode,
                *concentration,
                duration.as_deref(),
                &mut res,
            ),
            Command::ResolveCasting => {
                if state.combat.resolve_casting() {
                    res.push(Effect::CastingAdvanced {
                        step: state.combat.casting.step,
                    });
                } else {
                    res.push(Effect::ignored(command, "casting is not resolving"));
                }
            }
            Command::CompleteCasting => {
                let spell_id = state.combat.casting.spell_id.clone();
                if state.combat.complete_casting() {
                    res.push(Effect::CastingCompleted { spell_id });
                } else {
                    res.push(Effect::ignored(command, "effects have not been applied"));
                }
            }
            Command::CancelCasting => {
                let spell_id = state.combat.casting.spell_id.clone();
                if state.combat.cancel_casting() {
                    res.push(Effect::CastingCancelled { spell_id });
                } else {
                    res.push(Effect::ignored(command, "not casting"));
                }
            }

            Command::AddMinion {
                minion,
                track_initiative,
            } => {
                let id = state.combat.add_minion(minion.clone(), *track_initiative);
                push_minion_added(state, id, &mut res);
            }
            Command::SummonMinion {
                template,
                slot_level,
                track_initiative,
            } => {
                let round = state.combat.current_round;
                let minion = match template {
                    MinionTemplate::Skeleton => minions::skeleton(round),
                    MinionTemplate::Zombie => minions::zombie(round),
                    MinionTemplate::UndeadSpirit { form } => minions::undead_spirit(
                        *form,
                        *slot_level,
                        character_spell_attack_bonus(&state.character),
                        round,
                    ),
                };
                let id = state.combat.add_minion(minion, *track_initiative);
                push_minion_added(state, id, &mut res);
            }
            Command::DamageMinion { id, amount } => match state.combat.minions.damage(*id, *amount) {
                Some(hp) => res.push(Effect::MinionHpChanged { id: *id, hp }),
                None => res.push(Effect::ignored(command, "unknown minion")),
            },
            Command::HealMinion { id, amount } => match state.combat.minions.heal(*id, *amount) {
                Some(hp) => res.push(Effect::MinionHpChanged { id: *id, hp }),
                None => res.push(Effect::ignored(command, "unknown minion")),
            },
            Command::UpdateMinion { id, changes } => {
                if state.combat.minions.update(*id, changes.clone()) {
                    res.push(Effect::MinionUpdated { id: *id });
                } else {
                    res.push(Effect::ignored(command, "unknown minion"));
                }
            }
            Command::RemoveMinion { id } => match state.combat.remove_minion(*id) {
                Some(minion) => res.push(Effect::MinionRemoved {
                    id: *id,
                    name: minion.name,
                }),
                None => res.push(Effect::ignored(command, "unknown minion")),
            },
            Command::ClearMinions => {
                let count = state.combat.clear_minions();
                res.push(Effect::MinionsCleared { count });
            }
            Command::AddMinionCondition { id, condition } => {
                if state.combat.minions.add_condition(*id, condition) {
                    res.push(Effect::MinionConditionChanged {
                        id: *id,
                        condition: condition.trim().to_string(),
                        present: true,
                    });
                } else {
                    res.push(Effect::ignored(command, "unknown minion or duplicate condition"));
                }
            }
            Command::RemoveMinionCondition { id, condition } => {
                if state.combat.minions.remove_condition(*id, condition) {
                    res.push(Effect::MinionConditionChanged {
                        id: *id,
                        condition: condition.trim().to_string(),
                        present: false,
                    });
                } else {
                    res.push(Effect::ignored(command, "unknown minion or condition"));
                }
            }
            Command::MinionTurnStarted { id } => {
                if state.combat.minion_turn_started(*id) {
                    res.push(Effect::MinionTurn { id: Some(*id) });
                } else {
                    res.push(Effect::ignored(command, "minion turn cannot start now"));
                }
            }
            Command::MinionTurnEnded => {
                if state.combat.minion_turn_ended() {
                    res.push(Effect::MinionTurn { id: None });
                } else {
                    res.push(Effect::ignored(command, "no minion turn in progress"));
                }
            }
            Command::ReleaseExpiredMinions => {
                for minion in state.combat.release_expired_minions() {
                    res.push(Effect::MinionControlLapsed { id: minion.id });
                }
            }

            Command::StartCombat => {
                state.combat.start_combat();
                res.push(Effect::CombatStarted);
            }
            Command::SetInitiativeOrder { order } => {
                state.combat.set_initiative_order(order.clone());
                res.push(turn_effect(&state.combat));
            }
            Command::AdvanceTurn => {
                if state.combat.advance_turn() {
                    res.push(turn_effect(&state.combat));
                } else {
                    res.push(Effect::ignored(command, "initiative order is empty"));
                }
            }
            Command::PreviousTurn => {
                if state.combat.previous_turn() {
                    res.push(turn_effect(&state.combat));
                } else {
                    res.push(Effect::ignored(command, "already at the first turn"));
                }
            }
            Command::EndCombat => {
                if let Some(active) = state.combat.active_concentration.as_ref() {
                    res.push(Effect::ConcentrationBroken {
                        spell_name: active.spell_name.clone(),
                        reason: BreakReason::Ended,
                    });
                    state.character.end_concentration();
                }
                state.combat.end_combat();
                res.push(Effect::CombatEnded);
            }

            Command::RollFormula { formula, purpose } => {
                match roll_dice_formula(formula, rng) {
                    Ok(breakdown) => {
                        res.toast(breakdown.detail.clone());
                        res.push(Effect::FormulaRolled {
                            purpose: purpose.clone(),
                            breakdown,
                        });
                    }
                    Err(err) => {
                        res.toast(err.to_string());
                        res.push(Effect::RollFailed {
                            formula: formula.clone(),
                            error: err.to_string(),
                        });
                    }
                }
            }
        }
        res
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn record_hp_change(state: &mut PlayState, change: &HpChange, res: &mut Resolution) {
    res.push(Effect::HpChanged {
        previous: change.previous,
        current: change.current,
        temp_absorbed: change.temp_absorbed,
        damage_taken: change.damage_taken,
        healed: change.healed,
    });
    if let Some(spell_name) = &change.concentration_lost {
        state.combat.break_concentration();
        res.push(Effect::ConcentrationBroken {
            spell_name: spell_name.clone(),
            reason: BreakReason::Incapacitated,
        });
        res.toast(format!("Concentration on {spell_name} lost - Incapacitated!"));
    } else if change.current == 0 && state.combat.active_concentration.is_some() {
        if let Some(active) = state.combat.break_concentration() {
            res.push(Effect::ConcentrationBroken {
                spell_name: active.spell_name,
                reason: BreakReason::Incapacitated,
            });
        }
    }
    if change.death_saves_reset {
        res.push(Effect::DeathSavesReset);
        res.toast("Stabilized! Death saves reset.");
    }
}

fn take_damage(state: &mut PlayState, command: &Command, amount: i32, res: &mut Resolution) {
    if amount <= 0 {
        res.push(Effect::ignored(command, "damage must be positive"));
        return;
    }
    let form_name = state
        .character
        .transformed
        .as_ref()
        .map(|form| form.creature_name.clone());
    let outcome = state.character.take_damage(amount);
    if let Some(creature_name) = form_name {
        res.push(Effect::FormDamaged {
            creature_name,
            damage: outcome.form_damage,
            ended: outcome.form_ended.is_some(),
        });
    }
    if outcome.hp.previous != outcome.hp.current || outcome.hp.temp_absorbed > 0 {
        record_hp_change(state, &outcome.hp, res);
    }
}

fn start_concentration(
    state: &mut PlayState,
    spell_id: &str,
    spell_name: &str,
    rounds: Option<u32>,
    res: &mut Resolution,
) {
    let from_combat = state
        .combat
        .start_concentration(spell_id, spell_name, rounds)
        .map(|previous| previous.spell_name);
    let from_character = state.character.start_concentration(spell_name);
    let replaced = from_combat.or(from_character);
    res.push(Effect::ConcentrationStarted {
        spell_name: spell_name.to_string(),
        replaced,
    });
}

fn pay_for_slot(character: &mut Character, level: u8) -> Option<SlotSource> {
    if level == 0 {
        return Some(SlotSource::Cantrip);
    }
    if character.pact_slots.level == level && character.use_pact_slot() {
        return Some(SlotSource::Pact);
    }
    character.expend_slot(level).then_some(SlotSource::Standard)
}

/// Spend the slot and start concentration up front; cancelling later does
/// not give either back.
fn confirm_slot(
    state: &mut PlayState,
    command: &Command,
    slot_level: u8,
    mode: ResolutionMode,
    concentration: bool,
    duration: Option<&str>,
    res: &mut Resolution,
) {
    if !state.combat.can_confirm_slot() {
        res.push(Effect::ignored(command, "no spell selected"));
        return;
    }
    let Some(source) = pay_for_slot(&mut state.character, slot_level) else {
        res.push(Effect::SlotUnavailable { level: slot_level });
        res.toast(format!("No level {slot_level} slots remaining"));
        return;
    };
    if source != SlotSource::Cantrip {
        res.push(Effect::SlotSpent {
            source,
            level: slot_level,
        });
    }

    state.combat.confirm_slot(slot_level, mode);
    res.push(Effect::CastingAdvanced {
        step: state.combat.casting.step,
    });

    if concentration {
        let spell_id = state.combat.casting.spell_id.clone().unwrap_or_default();
        let spell_name = state
            .combat
            .casting
            .spell_name
            .clone()
            .unwrap_or_else(|| spell_id.clone());
        let rounds = duration.and_then(duration_to_rounds);
        start_concentration(state, &spell_id, &spell_name, rounds, res);
    }
}

fn arcanum_effect(character: &Character, level: u8) -> Effect {
    let slot = character.arcanum.get(&level).cloned().unwrap_or_default();
    Effect::ArcanumChanged {
        level,
        spell_name: slot.spell_name,
        used: slot.used,
    }
}

fn death_save_recorded(character: &Character, status: DeathSaveStatus, res: &mut Resolution) {
    res.push(Effect::DeathSaveRecorded {
        successes: character.death_saves.successes,
        failures: character.death_saves.failures,
        status,
    });
    match status {
        DeathSaveStatus::Stabilized => res.toast("Stabilized!"),
        DeathSaveStatus::Dead => res.toast("Three failed death saves."),
        DeathSaveStatus::Pending => {}
    }
}

fn push_minion_added(state: &PlayState, id: MinionId, res: &mut Resolution) {
    let name = state
        .combat
        .minions
        .get(id)
        .map(|m| m.name.clone())
        .unwrap_or_default();
    res.push(Effect::MinionAdded { id, name });
}

fn turn_effect(combat: &CombatState) -> Effect {
    Effect::TurnAdvanced {
        round: combat.current_round,
        turn_index: combat.current_turn_index,
        combatant: combat.current_combatant(),
    }
}

/// Apply an effect produced by a post-commit hook.
///
/// Effects returned from [`RulesEngine::execute`] describe changes that were
/// already made; only the follow-ups raised by hooks carry state of their
/// own.
pub fn apply_effect(state: &mut PlayState, effect: &Effect) {
    match effect {
        Effect::ConcentrationCheckRequired { damage, .. } => {
            state.combat.require_concentration_check(*damage);
        }
        Effect::ConcentrationBroken { .. } => {
            state.combat.break_concentration();
            state.character.end_concentration();
        }
        Effect::MinionControlLapsed { id } => {
            state.combat.remove_minion(*id);
        }
        _ => {}
    }
}

pub fn apply_effects(state: &mut PlayState, effects: &[Effect]) {
    for effect in effects {
        apply_effect(state, effect);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> (RulesEngine, PlayState) {
        (RulesEngine::new(), PlayState::default())
    }

    fn run(engine: &RulesEngine, state: &mut PlayState, command: Command) -> Resolution {
        engine.execute(state, &command, &mut || 0.5)
    }

    #[test]
    fn test_set_hp_records_effect() {
        let (engine, mut state) = engine();
        let res = run(&engine, &mut state, Command::SetHp { value: 30 });
        assert!(matches!(
            res.effects[0],
            Effect::HpChanged {
                previous: 38,
                current: 30,
                damage_taken: 8,
                ..
            }
        ));
    }

    #[test]
    fn test_set_hp_out_of_range_warns() {
        let (engine, mut state) = engine();
        let res = run(&engine, &mut state, Command::SetHp { value: 50_000 });
        assert!(res
            .effects
            .iter()
            .any(|e| matches!(e, Effect::ValidationWarning { .. })));
        // fallback of 0 is applied as damage
        assert_eq!(state.character.hp.current, 0);
    }

    #[test]
    fn test_zero_hp_breaks_both_concentration_records() {
        let (engine, mut state) = engine();
        run(
            &engine,
            &mut state,
            Command::StartConcentration {
                spell_id: "hex".into(),
                spell_name: "Hex".into(),
                duration: Some("Concentration, up to 1 hour".into()),
            },
        );
        assert_eq!(
            state.combat.active_concentration.as_ref().and_then(|c| c.max_duration_rounds),
            Some(600)
        );

        let res = run(&engine, &mut state, Command::TakeDamage { amount: 100 });
        assert!(state.character.concentration.is_none());
        assert!(state.combat.active_concentration.is_none());
        assert_eq!(
            res.toast.as_deref(),
            Some("Concentration on Hex lost - Incapacitated!")
        );
    }

    #[test]
    fn test_confirm_slot_spends_pact_slot_and_starts_concentration() {
        let (engine, mut state) = engine();
        run(
            &engine,
            &mut state,
            Command::StartCasting {
                spell_id: "hunger-of-hadar".into(),
                spell_name: "Hunger of Hadar".into(),
            },
        );
        let res = run(
            &engine,
            &mut state,
            Command::ConfirmSlot {
                slot_level: 3,
                mode: ResolutionMode::Save,
                concentration: true,
                duration: Some("1 minute".into()),
            },
        );
        assert!(res.effects.contains(&Effect::SlotSpent {
            source: SlotSource::Pact,
            level: 3
        }));
        assert_eq!(state.character.pact_slots.current, 1);
        assert_eq!(state.character.concentration.as_deref(), Some("Hunger of Hadar"));
        assert_eq!(
            state.combat.active_concentration.as_ref().map(|c| c.spell_id.as_str()),
            Some("hunger-of-hadar")
        );
    }

    #[test]
    fn test_confirm_unavailable_slot_keeps_selection() {
        let (engine, mut state) = engine();
        run(
            &engine,
            &mut state,
            Command::StartCasting {
                spell_id: "shield".into(),
                spell_name: "Shield".into(),
            },
        );
        let res = run(
            &engine,
            &mut state,
            Command::ConfirmSlot {
                slot_level: 1,
                mode: ResolutionMode::Automatic,
                concentration: false,
                duration: None,
            },
        );
        assert_eq!(res.effects, vec![Effect::SlotUnavailable { level: 1 }]);
        assert_eq!(state.combat.casting.step, CastingStep::SelectSpell);
    }

    #[test]
    fn test_cantrip_spends_nothing() {
        let (engine, mut state) = engine();
        run(
            &engine,
            &mut state,
            Command::StartCasting {
                spell_id: "eldritch-blast".into(),
                spell_name: "Eldritch Blast".into(),
            },
        );
        run(
            &engine,
            &mut state,
            Command::ConfirmSlot {
                slot_level: 0,
                mode: ResolutionMode::Attack,
                concentration: false,
                duration: None,
            },
        );
        assert_eq!(state.character.pact_slots.current, 2);
        assert_eq!(state.combat.casting.step, CastingStep::Resolve);
    }

    #[test]
    fn test_attunement_capacity_toast() {
        let (engine, mut state) = engine();
        for name in ["Ring", "Cloak", "Amulet"] {
            run(&engine, &mut state, Command::AttuneItem { name: name.into() });
        }
        let res = run(&engine, &mut state, Command::AttuneItem { name: "Staff".into() });
        assert!(res.is_ignored());
        assert_eq!(res.toast.as_deref(), Some("Maximum 3 attuned items!"));
    }

    #[test]
    fn test_roll_formula_effects() {
        let (engine, mut state) = engine();
        let res = engine.execute(
            &mut state,
            &Command::RollFormula {
                formula: "1d20+5".into(),
                purpose: "Attack".into(),
            },
            &mut || 0.0,
        );
        assert_eq!(res.toast.as_deref(), Some("1d20[1] + 5 = 6"));

        let bad = run(
            &engine,
            &mut state,
            Command::RollFormula {
                formula: "1d20+x".into(),
                purpose: "Attack".into(),
            },
        );
        assert!(matches!(bad.effects[0], Effect::RollFailed { .. }));
    }

    #[test]
    fn test_summon_uses_spell_attack_bonus() {
        let (engine, mut state) = engine();
        run(
            &engine,
            &mut state,
            Command::SummonMinion {
                template: MinionTemplate::UndeadSpirit {
                    form: SpiritForm::Ghostly,
                },
                slot_level: 3,
                track_initiative: true,
            },
        );
        let minion = state.combat.minions.iter().next().unwrap();
        assert_eq!(minion.attacks[0].to_hit, 6);
        assert_eq!(state.combat.initiative_order.len(), 1);
    }

    #[test]
    fn test_apply_hook_effects() {
        let mut state = PlayState::default();
        state.character.concentration = Some("Hex".into());
        state.combat.start_concentration("hex", "Hex", None);
        apply_effect(
            &mut state,
            &Effect::ConcentrationCheckRequired {
                spell_name: "Hex".into(),
                damage: 24,
                dc: 12,
            },
        );
        assert_eq!(state.combat.concentration_check_dc, Some(12));

        apply_effect(
            &mut state,
            &Effect::ConcentrationBroken {
                spell_name: "Hex".into(),
                reason: BreakReason::Expired,
            },
        );
        assert!(state.character.concentration.is_none());
        assert!(state.combat.active_concentration.is_none());
    }

    #[test]
    fn test_command_serde_shape() {
        let json = serde_json::to_string(&Command::TakeDamage { amount: 7 }).unwrap();
        assert_eq!(json, r#"{"take_damage":{"amount":7}}"#);
        let back: Command = serde_json::from_str(r#""long_rest""#).unwrap();
        assert_eq!(back, Command::LongRest);
    }
}
