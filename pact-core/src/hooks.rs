//! Post-commit hooks.
//!
//! After a command resolves, every registered hook sees the state before and
//! after it ran. A hook that triggers returns follow-up [`Effect`]s, which the
//! session applies with [`crate::rules::apply_effects`]. Hooks run in priority
//! order (lower first) and may not issue commands of their own.

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::combat::concentration_dc;
use crate::rules::{BreakReason, Command, Effect, PlayState};

/// What a hook gets to look at.
pub struct HookContext<'a> {
    pub previous: &'a PlayState,
    pub next: &'a PlayState,
    pub command: &'a Command,
}

pub trait TransitionHook: Send + Sync {
    fn name(&self) -> &'static str;

    /// Lower runs first.
    fn priority(&self) -> i32 {
        0
    }

    fn should_trigger(&self, ctx: &HookContext<'_>) -> bool;

    fn create_effects(&self, ctx: &HookContext<'_>) -> Vec<Effect>;
}

/// Short player-facing message for a hook effect, if it warrants one.
pub fn hook_toast(effect: &Effect) -> Option<String> {
    match effect {
        Effect::ConcentrationCheckRequired { spell_name, dc, .. } => {
            Some(format!("CON Save DC {dc} to maintain {spell_name}"))
        }
        Effect::ConcentrationBroken {
            spell_name,
            reason: BreakReason::Expired,
        } => Some(format!("{spell_name} has expired")),
        _ => None,
    }
}

// ============================================================================
// Registry
// ============================================================================

pub struct HookRegistry {
    hooks: Vec<Arc<dyn TransitionHook>>,
}

impl HookRegistry {
    pub fn new(mut hooks: Vec<Arc<dyn TransitionHook>>) -> Self {
        hooks.sort_by_key(|h| h.priority());
        Self { hooks }
    }

    /// No hooks at all.
    pub fn empty() -> Self {
        Self { hooks: Vec::new() }
    }

    /// Concentration checks, concentration expiry and minion control expiry.
    pub fn default_hooks() -> Self {
        Self::new(vec![
            Arc::new(ConcentrationCheckHook) as Arc<dyn TransitionHook>,
            Arc::new(ConcentrationExpiryHook),
            Arc::new(MinionExpiryHook),
        ])
    }

    pub fn register(&mut self, hook: Arc<dyn TransitionHook>) {
        self.hooks.push(hook);
        self.hooks.sort_by_key(|h| h.priority());
    }

    /// Collect the effects of every hook that triggers, in priority order.
    pub fn run(&self, ctx: &HookContext<'_>) -> Vec<Effect> {
        let mut effects = Vec::new();
        for hook in &self.hooks {
            if !hook.should_trigger(ctx) {
                continue;
            }
            let created = hook.create_effects(ctx);
            debug!(
                hook = hook.name(),
                command = ctx.command.name(),
                count = created.len(),
                "hook triggered"
            );
            effects.extend(created);
        }
        effects
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Hook names and priorities, in execution order.
    pub fn hooks(&self) -> impl Iterator<Item = (&'static str, i32)> + '_ {
        self.hooks.iter().map(|h| (h.name(), h.priority()))
    }
}

impl Default for HookRegistry {
    fn default() -> Self {
        Self::default_hooks()
    }
}

impl fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.hooks()).finish()
    }
}

// ============================================================================
// Hooks
// ============================================================================

/// Asks for a Constitution save when a concentrating character takes damage
/// and stays conscious.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConcentrationCheckHook;

impl ConcentrationCheckHook {
    /// Damage that got past temporary HP, including any soaked by an
    /// alternate form.
    fn damage_taken(ctx: &HookContext<'_>) -> i32 {
        let before = &ctx.previous.character;
        let after = &ctx.next.character;
        let to_hp = (before.hp.current - after.hp.current).max(0);
        let to_form = match (&before.transformed, &after.transformed) {
            (Some(prev), Some(next)) => (prev.hp.current - next.hp.current).max(0),
            (Some(prev), None) => prev.hp.current.max(0),
            _ => 0,
        };
        to_hp + to_form
    }
}

impl TransitionHook for ConcentrationCheckHook {
    fn name(&self) -> &'static str {
        "concentration_check"
    }

    fn priority(&self) -> i32 {
        -10
    }

    fn should_trigger(&self, ctx: &HookContext<'_>) -> bool {
        ctx.command.deals_damage()
            && ctx.previous.character.is_concentrating()
            && ctx.next.character.is_concentrating()
            && ctx.next.character.hp.current > 0
            && Self::damage_taken(ctx) > 0
    }

    fn create_effects(&self, ctx: &HookContext<'_>) -> Vec<Effect> {
        let Some(spell_name) = ctx.next.character.concentration.clone() else {
            return Vec::new();
        };
        let damage = Self::damage_taken(ctx);
        vec![Effect::ConcentrationCheckRequired {
            spell_name,
            damage,
            dc: concentration_dc(damage),
        }]
    }
}

/// Ends concentration once its duration has run out.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConcentrationExpiryHook;

impl TransitionHook for ConcentrationExpiryHook {
    fn name(&self) -> &'static str {
        "concentration_expiry"
    }

    fn should_trigger(&self, ctx: &HookContext<'_>) -> bool {
        matches!(ctx.command, Command::AdvanceTurn)
            && ctx
                .next
                .combat
                .active_concentration
                .as_ref()
                .is_some_and(|c| c.expired_at(ctx.next.combat.current_round))
    }

    fn create_effects(&self, ctx: &HookContext<'_>) -> Vec<Effect> {
        ctx.next
            .combat
            .active_concentration
            .iter()
            .map(|c| Effect::ConcentrationBroken {
                spell_name: c.spell_name.clone(),
                reason: BreakReason::Expired,
            })
            .collect()
    }
}

/// Releases minions whose control window has closed.
#[derive(Debug, Clone, Copy, Default)]
pub struct MinionExpiryHook;

impl TransitionHook for MinionExpiryHook {
    fn name(&self) -> &'static str {
        "minion_expiry"
    }

    fn priority(&self) -> i32 {
        10
    }

    fn should_trigger(&self, ctx: &HookContext<'_>) -> bool {
        matches!(ctx.command, Command::AdvanceTurn)
            && !ctx.next.combat.minions.expired(ctx.next.combat.current_round).is_empty()
    }

    fn create_effects(&self, ctx: &HookContext<'_>) -> Vec<Effect> {
        ctx.next
            .combat
            .minions
            .expired(ctx.next.combat.current_round)
            .into_iter()
            .map(|id| Effect::MinionControlLapsed { id })
            .collect()
    }
}
