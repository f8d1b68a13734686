//! Data-driven stat-effect formulas.
//!
//! Content definitions carry small arithmetic formulas (crit chance from
//! dexterity, strength bonus to attack, lifesteal fractions). They are a
//! closed AST over named operators, evaluated by a plain interpreter, so
//! content stays configurable without ever constructing code at runtime.

use serde::{Deserialize, Serialize};

/// A stat readable by a formula. `Own` refers to the side the formula is
/// attached to (attacker for on-attack effects, defender for on-defend).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatRef {
    Attack,
    Defense,
    Hp,
    MaxHp,
    Level,
    Strength,
    Dexterity,
    Constitution,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Formula {
    Const { value: f64 },
    Stat { stat: StatRef },
    Add { left: Box<Formula>, right: Box<Formula> },
    Divide { left: Box<Formula>, right: Box<Formula> },
    FloorDivide { left: Box<Formula>, right: Box<Formula> },
    /// `left` percent of `right`.
    PercentOf { left: Box<Formula>, right: Box<Formula> },
}

impl Formula {
    pub fn constant(value: f64) -> Formula {
        Formula::Const { value }
    }

    pub fn stat(stat: StatRef) -> Formula {
        Formula::Stat { stat }
    }

    pub fn floor_divide(left: Formula, right: Formula) -> Formula {
        Formula::FloorDivide { left: Box::new(left), right: Box::new(right) }
    }

    pub fn divide(left: Formula, right: Formula) -> Formula {
        Formula::Divide { left: Box::new(left), right: Box::new(right) }
    }
}

/// The numeric context a formula evaluates against: the stats of the side
/// it is attached to.
#[derive(Clone, Copy, Debug, Default)]
pub struct StatContext {
    pub attack: i32,
    pub defense: i32,
    pub hp: i32,
    pub max_hp: i32,
    pub level: u32,
    pub strength: i32,
    pub dexterity: i32,
    pub constitution: i32,
}

pub fn eval(formula: &Formula, ctx: &StatContext) -> f64 {
    match formula {
        Formula::Const { value } => *value,
        Formula::Stat { stat } => match stat {
            StatRef::Attack => f64::from(ctx.attack),
            StatRef::Defense => f64::from(ctx.defense),
            StatRef::Hp => f64::from(ctx.hp),
            StatRef::MaxHp => f64::from(ctx.max_hp),
            StatRef::Level => f64::from(ctx.level),
            StatRef::Strength => f64::from(ctx.strength),
            StatRef::Dexterity => f64::from(ctx.dexterity),
            StatRef::Constitution => f64::from(ctx.constitution),
        },
        Formula::Add { left, right } => eval(left, ctx) + eval(right, ctx),
        Formula::Divide { left, right } => {
            let divisor = eval(right, ctx);
            if divisor == 0.0 { 0.0 } else { eval(left, ctx) / divisor }
        }
        Formula::FloorDivide { left, right } => {
            let divisor = eval(right, ctx);
            if divisor == 0.0 { 0.0 } else { (eval(left, ctx) / divisor).floor() }
        }
        Formula::PercentOf { left, right } => eval(left, ctx) / 100.0 * eval(right, ctx),
    }
}

/// When a chance effect gets a roll: while attacking or while defending.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectTrigger {
    OnAttack,
    OnDefend,
}

/// What a chance effect does once its roll succeeds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EffectKind {
    /// Multiply outgoing damage (critical hit).
    CriticalMultiply { factor: f64 },
    /// Zero incoming damage entirely.
    Dodge,
    /// Heal the attacker for a fraction of dealt damage, after damage lands.
    Lifesteal { percent: f64 },
    /// Stun the target for a number of its own turns.
    Stun { turns: u32 },
}

/// A stochastic effect: `chance` evaluates to a percentage in `[0, 100]`,
/// rolled against a uniform draw in `[0, 100)`. A chance of zero consumes
/// no roll at all, which keeps fully deterministic setups roll-free.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChanceEffect {
    pub trigger: EffectTrigger,
    pub chance: Formula,
    pub effect: EffectKind,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> StatContext {
        StatContext { attack: 7, dexterity: 9, strength: 5, ..StatContext::default() }
    }

    #[test]
    fn floor_divide_floors() {
        let f = Formula::floor_divide(Formula::stat(StatRef::Dexterity), Formula::constant(2.0));
        assert_eq!(eval(&f, &ctx()), 4.0);
    }

    #[test]
    fn divide_by_zero_evaluates_to_zero() {
        let f = Formula::divide(Formula::stat(StatRef::Attack), Formula::constant(0.0));
        assert_eq!(eval(&f, &ctx()), 0.0);
    }

    #[test]
    fn percent_of_scales() {
        let f = Formula::PercentOf {
            left: Box::new(Formula::constant(50.0)),
            right: Box::new(Formula::stat(StatRef::Attack)),
        };
        assert_eq!(eval(&f, &ctx()), 3.5);
    }

    #[test]
    fn add_combines_stats_and_constants() {
        let f = Formula::Add {
            left: Box::new(Formula::stat(StatRef::Strength)),
            right: Box::new(Formula::constant(3.0)),
        };
        assert_eq!(eval(&f, &ctx()), 8.0);
    }

    #[test]
    fn formulas_round_trip_through_json() {
        let f = Formula::floor_divide(Formula::stat(StatRef::Strength), Formula::constant(2.0));
        let json = serde_json::to_string(&f).unwrap();
        let back: Formula = serde_json::from_str(&json).unwrap();
        assert_eq!(f, back);
    }
}
