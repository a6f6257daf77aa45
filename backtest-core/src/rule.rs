/// rule.rs — Rule AST and evaluator
///
/// `Rule` trees are immutable once built; the evaluator is pure and never
/// mutates `bars` or `indicators`. Failure to resolve an operand (missing
/// indicator key, invalid warm-up value, out-of-range index) yields `false`
/// for the enclosing comparison rather than aborting.
use std::collections::HashMap;
use std::fmt;

use crate::bar::{Bar, PriceField};
use crate::indicators::{indicator_key, IndicatorKind, IndicatorParams, IndicatorSeries, IndicatorValue};

const EQUALS_EPSILON: f64 = 1e-9;

/// Sub-field selector for a Bollinger-band operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BollingerField {
    Upper,
    Middle,
    Lower,
}

/// Sub-field selector for a pivot operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PivotField {
    Pivot,
    R1,
    R2,
    R3,
    S1,
    S2,
    S3,
}

/// One leaf value in a comparison: a price field, a constant, or an
/// indicator reference (with its parameters and, for Bollinger/Pivot, a
/// sub-field selector).
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Price(PriceField),
    Constant(f64),
    Indicator { kind: IndicatorKind, params: IndicatorParams, bollinger_field: Option<BollingerField>, pivot_field: Option<PivotField> },
}

impl Operand {
    pub fn price(field: PriceField) -> Self {
        Operand::Price(field)
    }

    pub fn constant(value: f64) -> Self {
        Operand::Constant(value)
    }

    pub fn indicator(kind: IndicatorKind, params: IndicatorParams) -> Self {
        Operand::Indicator { kind, params, bollinger_field: None, pivot_field: None }
    }

    pub fn bollinger(params: IndicatorParams, field: BollingerField) -> Self {
        Operand::Indicator { kind: IndicatorKind::Bollinger, params, bollinger_field: Some(field), pivot_field: None }
    }

    pub fn pivot(field: PivotField) -> Self {
        Operand::Indicator {
            kind: IndicatorKind::Pivot,
            params: IndicatorParams::period(1),
            bollinger_field: None,
            pivot_field: Some(field),
        }
    }

    /// Resolve this operand at bar index `i`. Returns `None` on any
    /// resolution failure (missing key, invalid warm-up, out-of-range
    /// index), which the evaluator turns into `false`.
    pub fn resolve(&self, bars: &[Bar], indicators: &HashMap<String, IndicatorSeries>, i: usize) -> Option<f64> {
        match self {
            Operand::Price(field) => bars.get(i).map(|b| field.resolve(b)),
            Operand::Constant(c) => Some(*c),
            Operand::Indicator { kind, params, bollinger_field, pivot_field } => {
                let key = indicator_key(*kind, params);
                let series = indicators.get(&key)?;
                let value = series.get(i)?;
                if !value.is_valid() {
                    return None;
                }
                resolve_indicator_value(value, *bollinger_field, *pivot_field)
            }
        }
    }
}

fn resolve_indicator_value(
    value: &IndicatorValue,
    bollinger_field: Option<BollingerField>,
    pivot_field: Option<PivotField>,
) -> Option<f64> {
    match value {
        IndicatorValue::Scalar { value, .. } => Some(*value),
        IndicatorValue::Macd { line, .. } => Some(*line),
        IndicatorValue::Bollinger { upper, middle, lower, .. } => match bollinger_field? {
            BollingerField::Upper => Some(*upper),
            BollingerField::Middle => Some(*middle),
            BollingerField::Lower => Some(*lower),
        },
        IndicatorValue::Stochastic { k, .. } => Some(*k),
        IndicatorValue::Pivot { pivot, r1, r2, r3, s1, s2, s3, .. } => match pivot_field? {
            PivotField::Pivot => Some(*pivot),
            PivotField::R1 => Some(*r1),
            PivotField::R2 => Some(*r2),
            PivotField::R3 => Some(*r3),
            PivotField::S1 => Some(*s1),
            PivotField::S2 => Some(*s2),
            PivotField::S3 => Some(*s3),
        },
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    CrossAbove,
    CrossBelow,
    Above,
    Below,
    Equals,
}

/// Predicate tree node. Trees are built once and never mutated; cycles are
/// structurally impossible since children are owned `Box`es.
#[derive(Debug, Clone, PartialEq)]
pub enum Rule {
    Compare { op: CompareOp, left: Operand, right: Operand },
    Between { left: Operand, lower: Operand, upper: Operand },
    And(Vec<Rule>),
    Or(Vec<Rule>),
    Not(Box<Rule>),
    Consecutive { child: Box<Rule>, lookback: usize },
    AnyOf { child: Box<Rule>, lookback: usize },
}

impl Rule {
    pub fn and(children: Vec<Rule>) -> Self {
        Rule::And(children)
    }

    pub fn or(children: Vec<Rule>) -> Self {
        Rule::Or(children)
    }

    pub fn not(child: Rule) -> Self {
        Rule::Not(Box::new(child))
    }

    pub fn consecutive(child: Rule, lookback: usize) -> Self {
        Rule::Consecutive { child: Box::new(child), lookback }
    }

    pub fn any_of(child: Rule, lookback: usize) -> Self {
        Rule::AnyOf { child: Box::new(child), lookback }
    }
}

/// Evaluate `rule` at bar index `i`. Pure and deterministic: reads but never
/// mutates `bars`/`indicators`.
pub fn evaluate(rule: &Rule, bars: &[Bar], indicators: &HashMap<String, IndicatorSeries>, i: usize) -> bool {
    match rule {
        Rule::Compare { op, left, right } => evaluate_compare(*op, left, right, bars, indicators, i),
        Rule::Between { left, lower, upper } => {
            let (Some(l), Some(lo), Some(hi)) = (
                left.resolve(bars, indicators, i),
                lower.resolve(bars, indicators, i),
                upper.resolve(bars, indicators, i),
            ) else {
                return false;
            };
            lo <= l && l <= hi
        }
        Rule::And(children) => {
            if children.is_empty() {
                return false;
            }
            children.iter().all(|c| evaluate(c, bars, indicators, i))
        }
        Rule::Or(children) => {
            if children.is_empty() {
                return false;
            }
            children.iter().any(|c| evaluate(c, bars, indicators, i))
        }
        Rule::Not(child) => !evaluate(child, bars, indicators, i),
        Rule::Consecutive { child, lookback } => {
            let lookback = (*lookback).max(1);
            if i + 1 < lookback {
                return false;
            }
            ((i + 1 - lookback)..=i).all(|j| evaluate(child, bars, indicators, j))
        }
        Rule::AnyOf { child, lookback } => {
            let lookback = (*lookback).max(1);
            if i + 1 < lookback {
                return false;
            }
            ((i + 1 - lookback)..=i).any(|j| evaluate(child, bars, indicators, j))
        }
    }
}

fn evaluate_compare(
    op: CompareOp,
    left: &Operand,
    right: &Operand,
    bars: &[Bar],
    indicators: &HashMap<String, IndicatorSeries>,
    i: usize,
) -> bool {
    match op {
        CompareOp::CrossAbove => {
            if i == 0 {
                return false;
            }
            let (Some(pl), Some(pr), Some(cl), Some(cr)) = (
                left.resolve(bars, indicators, i - 1),
                right.resolve(bars, indicators, i - 1),
                left.resolve(bars, indicators, i),
                right.resolve(bars, indicators, i),
            ) else {
                return false;
            };
            pl <= pr && cl > cr
        }
        CompareOp::CrossBelow => {
            if i == 0 {
                return false;
            }
            let (Some(pl), Some(pr), Some(cl), Some(cr)) = (
                left.resolve(bars, indicators, i - 1),
                right.resolve(bars, indicators, i - 1),
                left.resolve(bars, indicators, i),
                right.resolve(bars, indicators, i),
            ) else {
                return false;
            };
            pl >= pr && cl < cr
        }
        CompareOp::Above | CompareOp::Below | CompareOp::Equals => {
            let (Some(l), Some(r)) = (left.resolve(bars, indicators, i), right.resolve(bars, indicators, i)) else {
                return false;
            };
            match op {
                CompareOp::Above => l > r,
                CompareOp::Below => l < r,
                CompareOp::Equals => (l - r).abs() <= EQUALS_EPSILON,
                _ => unreachable!(),
            }
        }
    }
}

impl fmt::Display for PriceField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PriceField::Open => "open",
            PriceField::High => "high",
            PriceField::Low => "low",
            PriceField::Close => "close",
            PriceField::Volume => "volume",
        };
        write!(f, "{s}")
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Price(p) => write!(f, "{p}"),
            Operand::Constant(c) => write!(f, "{c}"),
            Operand::Indicator { kind, params, bollinger_field, pivot_field } => {
                let key = indicator_key(*kind, params);
                match bollinger_field {
                    Some(BollingerField::Upper) => write!(f, "BOLLINGER_UPPER({},{})", params.period, params.param),
                    Some(BollingerField::Middle) => write!(f, "BOLLINGER_MIDDLE({},{})", params.period, params.param),
                    Some(BollingerField::Lower) => write!(f, "BOLLINGER_LOWER({},{})", params.period, params.param),
                    None => match pivot_field {
                        Some(field) => write!(f, "PIVOT.{field:?}"),
                        None => write!(f, "{key}"),
                    },
                }
            }
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CompareOp::CrossAbove => "CROSS_ABOVE",
            CompareOp::CrossBelow => "CROSS_BELOW",
            CompareOp::Above => "ABOVE",
            CompareOp::Below => "BELOW",
            CompareOp::Equals => "EQUALS",
        };
        write!(f, "{s}")
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rule::Compare { op, left, right } => write!(f, "{op}({left}, {right})"),
            Rule::Between { left, lower, upper } => write!(f, "BETWEEN({left}, {lower}, {upper})"),
            Rule::And(children) => {
                let parts: Vec<String> = children.iter().map(|c| c.to_string()).collect();
                write!(f, "AND({})", parts.join(", "))
            }
            Rule::Or(children) => {
                let parts: Vec<String> = children.iter().map(|c| c.to_string()).collect();
                write!(f, "OR({})", parts.join(", "))
            }
            Rule::Not(child) => write!(f, "NOT({child})"),
            Rule::Consecutive { child, lookback } => write!(f, "CONSECUTIVE({child}, {lookback})"),
            Rule::AnyOf { child, lookback } => write!(f, "ANY_OF({child}, {lookback})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators;

    fn mkbars(closes: &[f64]) -> Vec<Bar> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| Bar {
                code: "T".into(),
                exchange: "X".into(),
                date: i as i64,
                open: c,
                high: c + 1.0,
                low: c - 2.0,
                close: c,
                volume: 1000,
            })
            .collect()
    }

    #[test]
    fn cross_above_false_at_index_zero() {
        let bars = mkbars(&[1.0, 2.0]);
        let rule = Rule::Compare {
            op: CompareOp::CrossAbove,
            left: Operand::price(PriceField::Close),
            right: Operand::constant(0.0),
        };
        let indicators = HashMap::new();
        assert!(!evaluate(&rule, &bars, &indicators, 0));
    }

    #[test]
    fn above_and_below_are_mutually_exclusive() {
        let bars = mkbars(&[10.0]);
        let above = Rule::Compare { op: CompareOp::Above, left: Operand::price(PriceField::Close), right: Operand::constant(5.0) };
        let below = Rule::Compare { op: CompareOp::Below, left: Operand::price(PriceField::Close), right: Operand::constant(5.0) };
        let indicators = HashMap::new();
        assert!(evaluate(&above, &bars, &indicators, 0));
        assert!(!evaluate(&below, &bars, &indicators, 0));
    }

    #[test]
    fn equals_implies_not_above_or_below() {
        let bars = mkbars(&[10.0]);
        let eq = Rule::Compare { op: CompareOp::Equals, left: Operand::price(PriceField::Close), right: Operand::constant(10.0) };
        let above = Rule::Compare { op: CompareOp::Above, left: Operand::price(PriceField::Close), right: Operand::constant(10.0) };
        let below = Rule::Compare { op: CompareOp::Below, left: Operand::price(PriceField::Close), right: Operand::constant(10.0) };
        let indicators = HashMap::new();
        assert!(evaluate(&eq, &bars, &indicators, 0));
        assert!(!evaluate(&above, &bars, &indicators, 0));
        assert!(!evaluate(&below, &bars, &indicators, 0));
    }

    #[test]
    fn consecutive_and_any_of_with_lookback_one_equal_child() {
        let bars = mkbars(&[1.0, 2.0, 3.0]);
        let child = Rule::Compare { op: CompareOp::Above, left: Operand::price(PriceField::Close), right: Operand::constant(1.5) };
        let consecutive = Rule::consecutive(child.clone(), 1);
        let any_of = Rule::any_of(child.clone(), 1);
        let indicators = HashMap::new();
        for i in 0..3 {
            assert_eq!(evaluate(&consecutive, &bars, &indicators, i), evaluate(&child, &bars, &indicators, i));
            assert_eq!(evaluate(&any_of, &bars, &indicators, i), evaluate(&child, &bars, &indicators, i));
        }
    }

    #[test]
    fn any_of_false_when_child_always_false_in_window() {
        let bars = mkbars(&[1.0, 1.0, 1.0, 1.0]);
        let child = Rule::Compare { op: CompareOp::Above, left: Operand::price(PriceField::Close), right: Operand::constant(100.0) };
        let rule = Rule::any_of(child, 3);
        let indicators = HashMap::new();
        assert!(!evaluate(&rule, &bars, &indicators, 3));
    }

    #[test]
    fn consecutive_true_iff_every_bar_in_window_true() {
        let bars = mkbars(&[5.0, 5.0, 5.0, 1.0]);
        let child = Rule::Compare { op: CompareOp::Above, left: Operand::price(PriceField::Close), right: Operand::constant(2.0) };
        let rule = Rule::consecutive(child, 3);
        let indicators = HashMap::new();
        assert!(evaluate(&rule, &bars, &indicators, 2));
        assert!(!evaluate(&rule, &bars, &indicators, 3));
    }

    #[test]
    fn missing_indicator_resolves_to_false() {
        let bars = mkbars(&[1.0, 2.0]);
        let rule = Rule::Compare {
            op: CompareOp::Above,
            left: Operand::indicator(IndicatorKind::Sma, IndicatorParams::period(5)),
            right: Operand::constant(0.0),
        };
        let indicators: HashMap<String, IndicatorSeries> = HashMap::new();
        assert!(!evaluate(&rule, &bars, &indicators, 1));
    }

    #[test]
    fn warmup_invalid_value_resolves_to_false() {
        let bars = mkbars(&[1.0, 2.0, 3.0]);
        let sma = indicators::compute(IndicatorKind::Sma, &bars, IndicatorParams::period(3)).unwrap();
        let mut map = HashMap::new();
        map.insert(indicator_key(IndicatorKind::Sma, &IndicatorParams::period(3)), sma);
        let rule = Rule::Compare {
            op: CompareOp::Above,
            left: Operand::indicator(IndicatorKind::Sma, IndicatorParams::period(3)),
            right: Operand::constant(0.0),
        };
        assert!(!evaluate(&rule, &bars, &map, 0));
        assert!(evaluate(&rule, &bars, &map, 2));
    }

    #[test]
    fn empty_and_or_are_false() {
        let bars = mkbars(&[1.0]);
        let indicators = HashMap::new();
        assert!(!evaluate(&Rule::and(vec![]), &bars, &indicators, 0));
        assert!(!evaluate(&Rule::or(vec![]), &bars, &indicators, 0));
    }

    #[test]
    fn between_bounds_are_inclusive() {
        let bars = mkbars(&[10.0]);
        let rule = Rule::Between {
            left: Operand::price(PriceField::Close),
            lower: Operand::constant(10.0),
            upper: Operand::constant(20.0),
        };
        let indicators = HashMap::new();
        assert!(evaluate(&rule, &bars, &indicators, 0));
    }
}
