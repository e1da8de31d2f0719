//! Dice formula evaluation.
//!
//! Supports sums of signed terms where each term is either an integer
//! (`5`) or a dice group (`2d8`, `d20`). Randomness is drawn from a
//! [`RandomSource`] so every roll can be made deterministic under test.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Upper bound on dice in a single group, keeps hostile input from looping.
pub const MAX_DICE_PER_TERM: u32 = 1000;

/// Error type for dice formula parsing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiceError {
    #[error("Empty dice formula")]
    Empty,
    #[error("Unsupported dice formula: \"{0}\"")]
    UnsupportedCharacters(String),
    #[error("Dangling operator in dice formula: \"{0}\"")]
    DanglingOperator(String),
    #[error("Invalid dice term: \"{0}\"")]
    InvalidDiceTerm(String),
    #[error("Invalid numeric term: \"{0}\"")]
    InvalidNumericTerm(String),
    #[error("Too many dice in term \"{term}\" (max {max})")]
    TooManyDice { term: String, max: u32 },
}

/// A source of uniformly distributed values in `[0, 1)`.
pub trait RandomSource {
    fn next_unit(&mut self) -> f64;

    /// Roll a single die with the given number of faces.
    fn roll_die(&mut self, sides: u32) -> u32 {
        let unit = self.next_unit();
        let unit = if unit.is_finite() {
            unit.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let face = (unit * sides as f64).floor() as u32 + 1;
        face.min(sides)
    }
}

impl<F> RandomSource for F
where
    F: FnMut() -> f64,
{
    fn next_unit(&mut self) -> f64 {
        self()
    }
}

/// Platform random generator.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn next_unit(&mut self) -> f64 {
        rand::thread_rng().gen::<f64>()
    }
}

/// Seeded generator for reproducible sequences.
#[derive(Debug, Clone)]
pub struct SeededRandom(StdRng);

impl SeededRandom {
    pub fn new(seed: u64) -> Self {
        Self(StdRng::seed_from_u64(seed))
    }
}

impl RandomSource for SeededRandom {
    fn next_unit(&mut self) -> f64 {
        self.0.gen::<f64>()
    }
}

/// A single signed term of a formula.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Term {
    Dice { sign: i32, count: u32, sides: u32 },
    Flat { value: i32 },
}

/// A parsed dice formula (e.g. `2d6+1d4-1`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiceFormula {
    pub terms: Vec<Term>,
    /// Normalized text with whitespace removed and lowercased.
    pub normalized: String,
}

impl DiceFormula {
    /// Parse a formula string.
    pub fn parse(formula: &str) -> Result<Self, DiceError> {
        let normalized: String = formula
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_lowercase();
        if normalized.is_empty() {
            return Err(DiceError::Empty);
        }
        if !normalized
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, 'd' | '+' | '-'))
        {
            return Err(DiceError::UnsupportedCharacters(formula.to_string()));
        }

        let mut terms = Vec::new();
        let mut current = String::new();
        let mut sign: i32 = 1;
        let mut saw_operator = false;

        for ch in normalized.chars() {
            match ch {
                '+' | '-' => {
                    if current.is_empty() {
                        // Only a single leading sign is allowed
                        if !terms.is_empty() || saw_operator {
                            return Err(DiceError::DanglingOperator(formula.to_string()));
                        }
                    } else {
                        terms.push(Self::parse_term(&current, sign)?);
                        current.clear();
                    }
                    sign = if ch == '+' { 1 } else { -1 };
                    saw_operator = true;
                }
                _ => current.push(ch),
            }
        }

        if current.is_empty() {
            return Err(DiceError::DanglingOperator(formula.to_string()));
        }
        terms.push(Self::parse_term(&current, sign)?);

        Ok(DiceFormula { terms, normalized })
    }

    fn parse_term(s: &str, sign: i32) -> Result<Term, DiceError> {
        let label = || {
            if sign < 0 {
                format!("-{s}")
            } else {
                s.to_string()
            }
        };

        if let Some(d_pos) = s.find('d') {
            let count_str = &s[..d_pos];
            let sides_str = &s[d_pos + 1..];

            let count: u32 = if count_str.is_empty() {
                1
            } else {
                count_str
                    .parse()
                    .map_err(|_| DiceError::InvalidDiceTerm(label()))?
            };
            let sides: u32 = sides_str
                .parse()
                .map_err(|_| DiceError::InvalidDiceTerm(label()))?;

            if count == 0 || sides == 0 {
                return Err(DiceError::InvalidDiceTerm(label()));
            }
            if count > MAX_DICE_PER_TERM {
                return Err(DiceError::TooManyDice {
                    term: label(),
                    max: MAX_DICE_PER_TERM,
                });
            }

            Ok(Term::Dice { sign, count, sides })
        } else {
            let value: i32 = s
                .parse()
                .map_err(|_| DiceError::InvalidNumericTerm(label()))?;
            Ok(Term::Flat {
                value: sign * value,
            })
        }
    }

    /// Roll the formula with the platform generator.
    pub fn roll(&self) -> DiceRollBreakdown {
        self.roll_with(&mut ThreadRandom)
    }

    /// Roll with an explicit random source.
    pub fn roll_with<R: RandomSource + ?Sized>(&self, rng: &mut R) -> DiceRollBreakdown {
        let mut total: i64 = 0;
        let mut results = Vec::with_capacity(self.terms.len());

        for term in &self.terms {
            match *term {
                Term::Dice { sign, count, sides } => {
                    let rolls: Vec<u32> = (0..count).map(|_| rng.roll_die(sides)).collect();
                    let sum: i64 = rolls.iter().map(|&r| r as i64).sum();
                    total += sign as i64 * sum;
                    results.push(TermResult::Dice {
                        sign,
                        count,
                        sides,
                        rolls,
                    });
                }
                Term::Flat { value } => {
                    total += value as i64;
                    results.push(TermResult::Flat { value });
                }
            }
        }

        let total = total.clamp(i32::MIN as i64, i32::MAX as i64) as i32;
        let detail = format!("{} = {}", render_terms(&results), total);

        DiceRollBreakdown {
            formula: self.normalized.clone(),
            total,
            terms: results,
            detail,
        }
    }
}

impl FromStr for DiceFormula {
    type Err = DiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DiceFormula::parse(s)
    }
}

impl fmt::Display for DiceFormula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.normalized)
    }
}

/// Outcome of one term of a rolled formula.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TermResult {
    Dice {
        sign: i32,
        count: u32,
        sides: u32,
        rolls: Vec<u32>,
    },
    Flat {
        value: i32,
    },
}

impl TermResult {
    fn is_negative(&self) -> bool {
        match self {
            TermResult::Dice { sign, .. } => *sign < 0,
            TermResult::Flat { value } => *value < 0,
        }
    }

    fn unsigned_label(&self) -> String {
        match self {
            TermResult::Dice {
                count,
                sides,
                rolls,
                ..
            } => format!(
                "{count}d{sides}[{}]",
                rolls
                    .iter()
                    .map(|r| r.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            TermResult::Flat { value } => value.unsigned_abs().to_string(),
        }
    }
}

fn render_terms(results: &[TermResult]) -> String {
    let mut out = String::new();
    for (i, term) in results.iter().enumerate() {
        let label = term.unsigned_label();
        match (i, term.is_negative()) {
            (0, false) => out.push_str(&label),
            (0, true) => {
                out.push('-');
                out.push_str(&label);
            }
            (_, false) => {
                out.push_str(" + ");
                out.push_str(&label);
            }
            (_, true) => {
                out.push_str(" - ");
                out.push_str(&label);
            }
        }
    }
    out
}

/// Total plus a human-readable per-term breakdown, e.g. `1d20[12] + 5 = 17`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiceRollBreakdown {
    pub formula: String,
    pub total: i32,
    pub terms: Vec<TermResult>,
    pub detail: String,
}

impl DiceRollBreakdown {
    /// All individual die faces in roll order.
    pub fn faces(&self) -> Vec<u32> {
        self.terms
            .iter()
            .flat_map(|t| match t {
                TermResult::Dice { rolls, .. } => rolls.clone(),
                TermResult::Flat { .. } => Vec::new(),
            })
            .collect()
    }
}

impl fmt::Display for DiceRollBreakdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.detail)
    }
}

/// Parse and roll a formula against the given random source.
pub fn roll_dice_formula<R: RandomSource + ?Sized>(
    formula: &str,
    rng: &mut R,
) -> Result<DiceRollBreakdown, DiceError> {
    let parsed = DiceFormula::parse(formula)?;
    Ok(parsed.roll_with(rng))
}

/// Convenience function using the platform generator.
pub fn roll(formula: &str) -> Result<DiceRollBreakdown, DiceError> {
    roll_dice_formula(formula, &mut ThreadRandom)
}
