/// rule_text.rs — Recursive-descent parser for the rule-text grammar
///
/// Grammar (informal):
///   rule        := compare | between | and | or | not | consecutive | any_of
///   compare     := operand op operand
///   between     := "BETWEEN" "(" operand "," operand "," operand ")"
///   and         := "AND" "(" rule ("," rule)* ")"
///   or          := "OR" "(" rule ("," rule)* ")"
///   not         := "NOT" "(" rule ")"
///   consecutive := "CONSECUTIVE" "(" rule "," integer ")"
///   any_of      := "ANY_OF" "(" rule "," integer ")"
///   operand     := price_field | number | indicator
///   price_field := "open" | "high" | "low" | "close" | "volume"
///   indicator   := "SMA" "(" n ")" | "EMA" "(" n ")" | "RSI" "(" n ")"
///                | "ATR" "(" n ")" | "MACD" "(" f "," s "," sig ")"
///                | "BOLLINGER_UPPER" "(" n "," m ")" | "BOLLINGER_MIDDLE" "(...)"
///                | "BOLLINGER_LOWER" "(...)" | "PIVOT" ("." field)?
///   op          := "CROSS_ABOVE" | "CROSS_BELOW" | ">" | "<" | "="
use backtest_core::bar::PriceField;
use backtest_core::indicators::{IndicatorKind, IndicatorParams};
use backtest_core::rule::{BollingerField, CompareOp, Operand, PivotField, Rule};

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum ParseError {
    #[error("unexpected end of input")]
    UnexpectedEof,
    #[error("unexpected token: {0}")]
    UnexpectedToken(String),
    #[error("expected {expected}, found {found}")]
    Expected { expected: String, found: String },
}

struct Tokenizer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
}

impl<'a> Tokenizer<'a> {
    fn new(input: &'a str) -> Self {
        Self { chars: input.chars().peekable() }
    }

    fn next_token(&mut self) -> Option<String> {
        while matches!(self.chars.peek(), Some(c) if c.is_whitespace()) {
            self.chars.next();
        }
        let &c = self.chars.peek()?;
        if "(),.".contains(c) {
            self.chars.next();
            return Some(c.to_string());
        }
        if c == '>' || c == '<' || c == '=' {
            self.chars.next();
            return Some(c.to_string());
        }
        let mut tok = String::new();
        while let Some(&c) = self.chars.peek() {
            if c.is_whitespace() || "(),.><=".contains(c) {
                break;
            }
            tok.push(c);
            self.chars.next();
        }
        Some(tok)
    }

    fn tokenize_all(mut self) -> Vec<String> {
        let mut tokens = Vec::new();
        while let Some(t) = self.next_token() {
            tokens.push(t);
        }
        tokens
    }
}

struct Parser {
    tokens: Vec<String>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&str> {
        self.tokens.get(self.pos).map(|s| s.as_str())
    }

    fn advance(&mut self) -> Result<String, ParseError> {
        let t = self.tokens.get(self.pos).cloned().ok_or(ParseError::UnexpectedEof)?;
        self.pos += 1;
        Ok(t)
    }

    fn expect(&mut self, expected: &str) -> Result<(), ParseError> {
        let found = self.advance()?;
        if found.eq_ignore_ascii_case(expected) {
            Ok(())
        } else {
            Err(ParseError::Expected { expected: expected.to_string(), found })
        }
    }

    fn parse_usize(&mut self) -> Result<usize, ParseError> {
        let t = self.advance()?;
        t.parse().map_err(|_| ParseError::UnexpectedToken(t))
    }

    fn parse_f64(&mut self) -> Result<f64, ParseError> {
        let t = self.advance()?;
        t.parse().map_err(|_| ParseError::UnexpectedToken(t))
    }

    fn parse_rule(&mut self) -> Result<Rule, ParseError> {
        let head = self.peek().ok_or(ParseError::UnexpectedEof)?.to_uppercase();
        match head.as_str() {
            "AND" => {
                self.advance()?;
                self.expect("(")?;
                let mut children = vec![self.parse_rule()?];
                while self.peek() == Some(",") {
                    self.advance()?;
                    children.push(self.parse_rule()?);
                }
                self.expect(")")?;
                Ok(Rule::and(children))
            }
            "OR" => {
                self.advance()?;
                self.expect("(")?;
                let mut children = vec![self.parse_rule()?];
                while self.peek() == Some(",") {
                    self.advance()?;
                    children.push(self.parse_rule()?);
                }
                self.expect(")")?;
                Ok(Rule::or(children))
            }
            "NOT" => {
                self.advance()?;
                self.expect("(")?;
                let child = self.parse_rule()?;
                self.expect(")")?;
                Ok(Rule::not(child))
            }
            "CONSECUTIVE" => {
                self.advance()?;
                self.expect("(")?;
                let child = self.parse_rule()?;
                self.expect(",")?;
                let lookback = self.parse_usize()?;
                self.expect(")")?;
                Ok(Rule::consecutive(child, lookback))
            }
            "ANY_OF" => {
                self.advance()?;
                self.expect("(")?;
                let child = self.parse_rule()?;
                self.expect(",")?;
                let lookback = self.parse_usize()?;
                self.expect(")")?;
                Ok(Rule::any_of(child, lookback))
            }
            "BETWEEN" => {
                self.advance()?;
                self.expect("(")?;
                let left = self.parse_operand()?;
                self.expect(",")?;
                let lower = self.parse_operand()?;
                self.expect(",")?;
                let upper = self.parse_operand()?;
                self.expect(")")?;
                Ok(Rule::Between { left, lower, upper })
            }
            _ => {
                let left = self.parse_operand()?;
                let op = self.parse_compare_op()?;
                let right = self.parse_operand()?;
                Ok(Rule::Compare { op, left, right })
            }
        }
    }

    fn parse_compare_op(&mut self) -> Result<CompareOp, ParseError> {
        let t = self.advance()?;
        match t.to_uppercase().as_str() {
            "CROSS_ABOVE" => Ok(CompareOp::CrossAbove),
            "CROSS_BELOW" => Ok(CompareOp::CrossBelow),
            ">" => Ok(CompareOp::Above),
            "<" => Ok(CompareOp::Below),
            "=" => Ok(CompareOp::Equals),
            other => Err(ParseError::UnexpectedToken(other.to_string())),
        }
    }

    fn parse_operand(&mut self) -> Result<Operand, ParseError> {
        let t = self.peek().ok_or(ParseError::UnexpectedEof)?.to_string();
        let upper = t.to_uppercase();
        match upper.as_str() {
            "OPEN" => {
                self.advance()?;
                Ok(Operand::price(PriceField::Open))
            }
            "HIGH" => {
                self.advance()?;
                Ok(Operand::price(PriceField::High))
            }
            "LOW" => {
                self.advance()?;
                Ok(Operand::price(PriceField::Low))
            }
            "CLOSE" => {
                self.advance()?;
                Ok(Operand::price(PriceField::Close))
            }
            "VOLUME" => {
                self.advance()?;
                Ok(Operand::price(PriceField::Volume))
            }
            "SMA" | "EMA" | "WMA" | "RSI" | "ATR" | "ROC" | "STDDEV" => {
                self.advance()?;
                self.expect("(")?;
                let n = self.parse_usize()?;
                self.expect(")")?;
                let kind = match upper.as_str() {
                    "SMA" => IndicatorKind::Sma,
                    "EMA" => IndicatorKind::Ema,
                    "WMA" => IndicatorKind::Wma,
                    "RSI" => IndicatorKind::Rsi,
                    "ATR" => IndicatorKind::Atr,
                    "ROC" => IndicatorKind::Roc,
                    "STDDEV" => IndicatorKind::Stddev,
                    _ => unreachable!(),
                };
                Ok(Operand::indicator(kind, IndicatorParams::period(n)))
            }
            "OBV" => {
                self.advance()?;
                Ok(Operand::indicator(IndicatorKind::Obv, IndicatorParams::period(0)))
            }
            "VWAP" => {
                self.advance()?;
                Ok(Operand::indicator(IndicatorKind::Vwap, IndicatorParams::period(0)))
            }
            "MACD" => {
                self.advance()?;
                self.expect("(")?;
                let fast = self.parse_usize()?;
                self.expect(",")?;
                let slow = self.parse_usize()?;
                self.expect(",")?;
                let signal = self.parse_usize()?;
                self.expect(")")?;
                Ok(Operand::indicator(IndicatorKind::Macd, IndicatorParams::macd(fast, slow, signal)))
            }
            "BOLLINGER_UPPER" | "BOLLINGER_MIDDLE" | "BOLLINGER_LOWER" => {
                self.advance()?;
                self.expect("(")?;
                let n = self.parse_usize()?;
                self.expect(",")?;
                let m = self.parse_f64()?;
                self.expect(")")?;
                let field = match upper.as_str() {
                    "BOLLINGER_UPPER" => BollingerField::Upper,
                    "BOLLINGER_MIDDLE" => BollingerField::Middle,
                    "BOLLINGER_LOWER" => BollingerField::Lower,
                    _ => unreachable!(),
                };
                Ok(Operand::bollinger(IndicatorParams::bollinger(n, m), field))
            }
            "PIVOT" => {
                self.advance()?;
                if self.peek() == Some(".") {
                    self.advance()?;
                    let field_tok = self.advance()?;
                    let field = match field_tok.to_uppercase().as_str() {
                        "PIVOT" => PivotField::Pivot,
                        "R1" => PivotField::R1,
                        "R2" => PivotField::R2,
                        "R3" => PivotField::R3,
                        "S1" => PivotField::S1,
                        "S2" => PivotField::S2,
                        "S3" => PivotField::S3,
                        other => return Err(ParseError::UnexpectedToken(other.to_string())),
                    };
                    Ok(Operand::pivot(field))
                } else {
                    Ok(Operand::pivot(PivotField::Pivot))
                }
            }
            _ => {
                let value: f64 = t.parse().map_err(|_| ParseError::UnexpectedToken(t.clone()))?;
                self.advance()?;
                Ok(Operand::constant(value))
            }
        }
    }
}

/// Parse one rule-text string into a `Rule` tree.
pub fn parse_rule_text(text: &str) -> Result<Rule, ParseError> {
    let tokens = Tokenizer::new(text).tokenize_all();
    let mut parser = Parser { tokens, pos: 0 };
    let rule = parser.parse_rule()?;
    if parser.pos != parser.tokens.len() {
        return Err(ParseError::UnexpectedToken(parser.tokens[parser.pos].clone()));
    }
    Ok(rule)
}
