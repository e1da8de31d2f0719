//! Session - the primary public API.
//!
//! A [`Session`] owns the play state and is its only writer. Every change
//! goes through [`Session::dispatch`], which runs the command, lets the
//! post-commit hooks react, records the combat log and hands a snapshot to the
//! persistence sink.

use crate::character::Character;
use crate::combat::{CombatState, LogKind, DEFAULT_LOG_CAPACITY};
use crate::dice::{roll_dice_formula, DiceError, DiceRollBreakdown, RandomSource, ThreadRandom};
use crate::hooks::{hook_toast, HookContext, HookRegistry};
use crate::minions::{Minion, MinionRegistry};
use crate::persist::{PersistError, PersistenceSink, SessionSnapshot};
use crate::rules::{apply_effects, Command, PlayState, Resolution, RulesEngine};
use crate::validation::validate_session_number;
use std::fmt;
use std::path::Path;
use tracing::{debug, info, warn};

/// Configuration for creating a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Session number, 1..=9999.
    pub session_number: u32,

    /// Maximum combat log entries kept.
    pub log_capacity: usize,

    /// Also write every toast into the combat log.
    pub echo_toasts_to_log: bool,
}

impl SessionConfig {
    pub fn new() -> Self {
        Self {
            session_number: 1,
            log_capacity: DEFAULT_LOG_CAPACITY,
            echo_toasts_to_log: false,
        }
    }

    /// Set the session number. Out-of-range values fall back to 1.
    pub fn with_session_number(mut self, number: i64) -> Self {
        self.session_number = validate_session_number(number).into_value();
        self
    }

    pub fn with_log_capacity(mut self, capacity: usize) -> Self {
        self.log_capacity = capacity.max(1);
        self
    }

    pub fn with_toast_echo(mut self, echo: bool) -> Self {
        self.echo_toasts_to_log = echo;
        self
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// A play session.
pub struct Session {
    config: SessionConfig,
    state: PlayState,
    engine: RulesEngine,
    hooks: HookRegistry,
    rng: Box<dyn RandomSource>,
    sink: Option<Box<dyn PersistenceSink>>,
}

impl Session {
    /// A session for the default character with the default hooks.
    pub fn new(config: SessionConfig) -> Self {
        Self::with_character(config, Character::default())
    }

    pub fn with_character(config: SessionConfig, character: Character) -> Self {
        let mut combat = CombatState::with_log_capacity(config.log_capacity);
        // Only the character's record survives a save; rebuild the tracker's.
        if let Some(spell) = character.concentration.as_deref() {
            combat.start_concentration(spell, spell, None);
        }
        Self {
            state: PlayState::new(character, combat),
            config,
            engine: RulesEngine::new(),
            hooks: HookRegistry::default_hooks(),
            rng: Box::new(ThreadRandom),
            sink: None,
        }
    }

    /// Resume from a loaded snapshot. The snapshot's session number wins.
    pub fn from_snapshot(config: SessionConfig, snapshot: SessionSnapshot) -> Self {
        let config = SessionConfig {
            session_number: validate_session_number(i64::from(snapshot.session_number))
                .into_value(),
            ..config
        };
        let mut session = Self::with_character(config, snapshot.character);
        session.state.combat.minions = MinionRegistry::from_minions(snapshot.minions);
        session
    }

    /// Load a saved session from a file.
    pub async fn load(config: SessionConfig, path: impl AsRef<Path>) -> Result<Self, PersistError> {
        let snapshot = SessionSnapshot::load_json(path).await?;
        info!(session = snapshot.session_number, "session loaded");
        Ok(Self::from_snapshot(config, snapshot))
    }

    /// Save the current session to a file.
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<(), PersistError> {
        self.snapshot().save_json(path).await
    }

    pub fn with_rng(mut self, rng: impl RandomSource + 'static) -> Self {
        self.rng = Box::new(rng);
        self
    }

    pub fn with_sink(mut self, sink: impl PersistenceSink + 'static) -> Self {
        self.sink = Some(Box::new(sink));
        self
    }

    pub fn with_hooks(mut self, hooks: HookRegistry) -> Self {
        self.hooks = hooks;
        self
    }

    /// Run one command to completion, including its hook reactions.
    pub fn dispatch(&mut self, command: Command) -> Resolution {
        debug!(command = command.name(), "dispatch");
        let previous = self.state.clone();
        let mut resolution = self
            .engine
            .execute(&mut self.state, &command, self.rng.as_mut());

        let hook_effects = self.hooks.run(&HookContext {
            previous: &previous,
            next: &self.state,
            command: &command,
        });
        apply_effects(&mut self.state, &hook_effects);
        if let Some(toast) = hook_effects.iter().filter_map(hook_toast).last() {
            resolution.toast = Some(toast);
        }
        resolution.effects.extend(hook_effects);

        self.record(&resolution);
        if self.state != previous {
            self.persist();
        }
        resolution
    }

    /// Dispatch several commands in order.
    pub fn dispatch_all(&mut self, commands: impl IntoIterator<Item = Command>) -> Vec<Resolution> {
        commands.into_iter().map(|c| self.dispatch(c)).collect()
    }

    /// Roll a formula with the session's random source without touching state.
    pub fn roll_formula(&mut self, formula: &str) -> Result<DiceRollBreakdown, DiceError> {
        roll_dice_formula(formula, self.rng.as_mut())
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot::new(
            self.config.session_number,
            self.state.character.clone(),
            self.state.combat.minions.to_vec(),
        )
    }

    fn record(&mut self, resolution: &Resolution) {
        let log = &mut self.state.combat.log;
        for (kind, title, detail) in resolution.effects.iter().filter_map(|e| e.log_line()) {
            log.push(kind, title, detail);
        }
        if self.config.echo_toasts_to_log {
            if let Some(toast) = &resolution.toast {
                log.push(LogKind::Info, toast.clone(), None);
            }
        }
    }

    fn persist(&mut self) {
        let Some(sink) = self.sink.as_mut() else {
            return;
        };
        let snapshot = SessionSnapshot::new(
            self.config.session_number,
            self.state.character.clone(),
            self.state.combat.minions.to_vec(),
        );
        if let Err(err) = sink.persist(&snapshot) {
            warn!(error = %err, "persisting session failed, continuing in memory");
        }
    }

    pub fn state(&self) -> &PlayState {
        &self.state
    }

    pub fn character(&self) -> &Character {
        &self.state.character
    }

    pub fn combat(&self) -> &CombatState {
        &self.state.combat
    }

    pub fn minions(&self) -> impl Iterator<Item = &Minion> {
        self.state.combat.minions.iter()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn session_number(&self) -> u32 {
        self.config.session_number
    }

    pub fn hooks(&self) -> &HookRegistry {
        &self.hooks
    }

    /// Whether the character is concentrating on anything.
    pub fn is_concentrating(&self) -> bool {
        self.state.character.is_concentrating()
    }

    /// DC of the concentration save awaiting resolution, if any.
    pub fn pending_concentration_dc(&self) -> Option<i32> {
        self.state.combat.concentration_check_dc
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.config)
            .field("state", &self.state)
            .field("hooks", &self.hooks)
            .field("has_sink", &self.sink.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::Effect;

    struct FailingSink;

    impl PersistenceSink for FailingSink {
        fn persist(&mut self, _snapshot: &SessionSnapshot) -> Result<(), PersistError> {
            Err(PersistError::Io(std::io::Error::other("disk full")))
        }
    }

    #[test]
    fn test_session_config() {
        let config = SessionConfig::new()
            .with_session_number(12)
            .with_log_capacity(5)
            .with_toast_echo(true);

        assert_eq!(config.session_number, 12);
        assert_eq!(config.log_capacity, 5);
        assert!(config.echo_toasts_to_log);
    }

    #[test]
    fn test_session_number_falls_back() {
        assert_eq!(SessionConfig::new().with_session_number(0).session_number, 1);
        assert_eq!(SessionConfig::new().with_session_number(10_000).session_number, 1);
    }

    #[test]
    fn test_damage_while_concentrating_asks_for_save() {
        let mut session = Session::new(SessionConfig::new());
        session.dispatch(Command::StartConcentration {
            spell_id: "hex".into(),
            spell_name: "Hex".into(),
            duration: None,
        });

        let res = session.dispatch(Command::TakeDamage { amount: 24 });
        assert_eq!(res.toast.as_deref(), Some("CON Save DC 12 to maintain Hex"));
        assert_eq!(session.pending_concentration_dc(), Some(12));

        session.dispatch(Command::ResolveConcentrationCheck { passed: false });
        assert!(!session.is_concentrating());
        assert!(session.combat().active_concentration.is_none());
        assert_eq!(session.pending_concentration_dc(), None);
    }

    #[test]
    fn test_failing_sink_does_not_stop_play() {
        let mut session = Session::new(SessionConfig::new()).with_sink(FailingSink);
        let res = session.dispatch(Command::TakeDamage { amount: 5 });
        assert!(!res.is_ignored());
        assert_eq!(session.character().hp.current, 33);
    }

    #[test]
    fn test_log_records_significant_effects() {
        let mut session = Session::new(SessionConfig::new().with_log_capacity(3));
        session.dispatch(Command::TakeDamage { amount: 5 });
        assert_eq!(
            session.combat().log.latest().map(|e| e.title.as_str()),
            Some("Took 5 damage")
        );

        for _ in 0..5 {
            session.dispatch(Command::Heal { amount: 1 });
        }
        assert_eq!(session.combat().log.len(), 3);
    }

    #[test]
    fn test_toast_echo() {
        let mut session = Session::new(SessionConfig::new().with_toast_echo(true));
        session.dispatch(Command::ShortRest);
        assert!(session
            .combat()
            .log
            .entries()
            .any(|e| e.title == "Short Rest: Pact Slots Refilled"));
    }

    #[test]
    fn test_roll_formula_uses_session_rng() {
        let mut session = Session::new(SessionConfig::new()).with_rng(|| 0.99);
        let roll = session.roll_formula("2d4+3").unwrap();
        assert_eq!(roll.total, 11);
        assert!(session.roll_formula("2d4+x").is_err());
    }

    #[test]
    fn test_snapshot_and_resume() {
        let mut session = Session::new(SessionConfig::new().with_session_number(3));
        session.dispatch(Command::TakeDamage { amount: 10 });
        session.dispatch(Command::SummonMinion {
            template: crate::rules::MinionTemplate::Zombie,
            slot_level: 3,
            track_initiative: false,
        });

        let resumed = Session::from_snapshot(SessionConfig::new(), session.snapshot());
        assert_eq!(resumed.session_number(), 3);
        assert_eq!(resumed.character(), session.character());
        assert_eq!(resumed.minions().count(), 1);
    }

    #[test]
    fn test_character_concentration_seeds_tracker() {
        let mut character = Character::default();
        character.concentration = Some("Darkness".to_string());
        let mut session = Session::with_character(SessionConfig::new(), character);
        let active = session.combat().active_concentration.as_ref().map(|c| c.spell_name.as_str());
        assert_eq!(active, Some("Darkness"));

        session.dispatch(Command::TakeDamage { amount: 30 });
        assert_eq!(session.pending_concentration_dc(), Some(15));
    }

    #[test]
    fn test_hooks_can_be_disabled() {
        let mut session = Session::new(SessionConfig::new()).with_hooks(HookRegistry::empty());
        session.dispatch(Command::StartConcentration {
            spell_id: "hex".into(),
            spell_name: "Hex".into(),
            duration: None,
        });
        let res = session.dispatch(Command::TakeDamage { amount: 10 });
        assert!(!res
            .effects
            .iter()
            .any(|e| matches!(e, Effect::ConcentrationCheckRequired { .. })));
    }
}
