//! Play through a short scripted fight and print what happens.
//!
//! Run with: `RUST_LOG=pact_core=debug cargo run -p pact-core --example scripted_combat`

use pact_core::combat::Combatant;
use pact_core::derived::format_modifier;
use pact_core::{
    Command, Effect, MinionTemplate, ResolutionMode, SeededRandom, Session, SessionConfig,
    SpiritForm,
};
use tracing_subscriber::EnvFilter;

fn show(session: &Session, label: &str, resolution: &pact_core::Resolution) {
    let character = session.character();
    println!(
        "{label:<28} HP {:>2}/{:<2} temp {:<2} pact {}/{}  {}",
        character.hp.current,
        character.hp.max,
        character.hp.temp,
        character.pact_slots.current,
        character.pact_slots.max,
        resolution.toast.as_deref().unwrap_or(""),
    );
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut session =
        Session::new(SessionConfig::new().with_session_number(12)).with_rng(SeededRandom::new(7));

    let character = session.character();
    println!(
        "{} - level {}, AC {}, spell DC {}, initiative {}\n",
        character.name,
        character.level,
        character.armor_class(),
        character.spell_save_dc,
        format_modifier(character.initiative_bonus()),
    );

    let res = session.dispatch(Command::SummonMinion {
        template: MinionTemplate::UndeadSpirit {
            form: SpiritForm::Ghostly,
        },
        slot_level: 3,
        track_initiative: true,
    });
    show(&session, "Summon Undead", &res);
    let spirit = session.minions().next().map(|m| m.id);

    let res = session.dispatch(Command::StartCombat);
    show(&session, "Roll initiative", &res);
    if let Some(id) = spirit {
        session.dispatch(Command::SetInitiativeOrder {
            order: vec![Combatant::Player, Combatant::Minion(id)],
        });
    }

    session.dispatch(Command::StartCasting {
        spell_id: "hunger-of-hadar".into(),
        spell_name: "Hunger of Hadar".into(),
    });
    let res = session.dispatch(Command::ConfirmSlot {
        slot_level: 3,
        mode: ResolutionMode::Automatic,
        concentration: true,
        duration: Some("1 minute".into()),
    });
    show(&session, "Cast Hunger of Hadar", &res);
    session.dispatch(Command::ResolveCasting);
    session.dispatch(Command::CompleteCasting);

    let res = session.dispatch(Command::SetTempHp { value: 8 });
    show(&session, "Armor of Agathys", &res);

    let res = session.dispatch(Command::TakeDamage { amount: 19 });
    show(&session, "Ogre hits for 19", &res);

    let save = session.roll_formula("1d20+2");
    match (save, session.pending_concentration_dc()) {
        (Ok(roll), Some(dc)) => {
            let passed = roll.total >= dc;
            let res = session.dispatch(Command::ResolveConcentrationCheck { passed });
            show(&session, &format!("CON save {}", roll.detail), &res);
        }
        (Err(err), _) => println!("could not roll save: {err}"),
        _ => {}
    }

    if let Some(id) = spirit {
        session.dispatch(Command::AdvanceTurn);
        session.dispatch(Command::MinionTurnStarted { id });
        let res = session.dispatch(Command::RollFormula {
            formula: "1d8+6".into(),
            purpose: "Deathly Touch".into(),
        });
        show(&session, "Spirit attacks", &res);
        session.dispatch(Command::MinionTurnEnded);
    }

    let res = session.dispatch(Command::AdvanceTurn);
    if let Some(Effect::TurnAdvanced { round, .. }) = res.effects.first() {
        println!("\n-- round {round} --");
    }

    let res = session.dispatch(Command::ShortRest);
    show(&session, "Short rest", &res);

    println!("\nCombat log (newest first):");
    for entry in session.combat().log.entries() {
        match &entry.detail {
            Some(detail) => println!("  [{:?}] {} ({detail})", entry.kind, entry.title),
            None => println!("  [{:?}] {}", entry.kind, entry.title),
        }
    }
}
