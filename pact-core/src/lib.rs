//! Rules engine for an SRD 5.1 warlock's play session.
//!
//! This crate provides:
//! - Derived character statistics and the SRD resource tables
//! - Character resource state: hit points, slots, rests, death saves
//! - A combat tracker with a spell casting state machine
//! - Minion management for raised and summoned undead
//! - Command dispatch with post-commit hooks
//! - Versioned session persistence
//!
//! # Quick Start
//!
//! ```
//! use pact_core::{Command, Session, SessionConfig};
//!
//! let mut session = Session::new(SessionConfig::new().with_session_number(1));
//! session.dispatch(Command::StartConcentration {
//!     spell_id: "hex".into(),
//!     spell_name: "Hex".into(),
//!     duration: Some("1 hour".into()),
//! });
//!
//! let resolution = session.dispatch(Command::TakeDamage { amount: 12 });
//! assert_eq!(resolution.toast.as_deref(), Some("CON Save DC 10 to maintain Hex"));
//! ```

pub mod character;
pub mod combat;
pub mod derived;
pub mod dice;
pub mod hooks;
pub mod minions;
pub mod persist;
pub mod rules;
pub mod session;
pub mod tables;
pub mod testing;
pub mod validation;

// Re-export for convenience
pub use character::{Ability, AbilityScores, Character, InventoryItem, Invocation};
pub use combat::{CastingStep, CombatPhase, CombatState, Combatant, ResolutionMode};
pub use dice::{roll_dice_formula, DiceError, DiceFormula, DiceRollBreakdown, RandomSource, SeededRandom};
pub use hooks::{HookContext, HookRegistry, TransitionHook};
pub use minions::{Minion, MinionId, MinionRegistry, SpiritForm};
pub use persist::{PersistError, PersistenceSink, SessionSnapshot, CURRENT_MIGRATION_VERSION};
pub use rules::{Command, Effect, MinionTemplate, PlayState, Resolution, RulesEngine};
pub use session::{Session, SessionConfig};
pub use validation::{Validated, ValidationIssue};
