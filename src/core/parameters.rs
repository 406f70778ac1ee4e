// src/core/parameters.rs

use crate::{
    core::{config::TreeSearchOptions, tokenizer::Tokenizer},
    models::{OptionName, ParameterKind, ParameterShape, ShapeError, TokenType},
};

/// Outcome of matching a shape against one pre-split `name -> values` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NamedMatch {
    /// The name addresses this shape and the value count is acceptable.
    Matched(Vec<String>),
    /// The name does not address this shape; another shape may apply.
    Mismatch,
    /// The name addresses this shape but the value count is invalid; the whole candidate
    /// must be rejected.
    Fatal(String),
}

impl ParameterShape {
    /// Checks the invariants a shape must hold before it can be part of a command.
    pub fn validate(&self) -> Result<(), ShapeError> {
        if let ParameterKind::Switch { .. } = self.kind
            && !self.parameter_type.is::<bool>()
        {
            return Err(ShapeError::SwitchNotBoolean(self.hint_name.clone()));
        }

        if let (Some(min), Some(max)) = self.kind.bounds()
            && min > max
        {
            return Err(ShapeError::InvalidBounds {
                parameter: self.hint_name.clone(),
                min: Some(min),
                max: Some(max),
            });
        }

        if let Some(default) = &self.default_value {
            let expected = if self.kind.is_collection() {
                self.parameter_type.collection_id()
            } else {
                self.parameter_type.id()
            };
            if default.type_id() != expected {
                return Err(ShapeError::DefaultTypeMismatch(self.hint_name.clone()));
            }
        }
        Ok(())
    }

    /// Whether the parameter may be absent from the input entirely.
    pub fn is_omissible(&self) -> bool {
        if self.optional {
            return true;
        }
        match self.kind {
            ParameterKind::PositionalCollection { min, .. }
            | ParameterKind::NamedCollection { min, .. } => min.unwrap_or(0) == 0,
            _ => false,
        }
    }

    /// `true` for a switch, which takes no value token.
    pub fn is_switch(&self) -> bool {
        matches!(self.kind, ParameterKind::Switch { .. })
    }

    /// Attempts to bind this shape at the tokenizer's current position.
    ///
    /// On success the consumed tokens are removed from `tokens` and their value texts are
    /// returned (empty for a switch). On failure `tokens` is left untouched.
    pub fn matches_tokens(
        &self,
        tokens: &mut Tokenizer<'_>,
        options: &TreeSearchOptions,
    ) -> Option<Vec<String>> {
        let mut probe = tokens.clone();
        let values = match &self.kind {
            ParameterKind::Positional => vec![take_value(&mut probe)?],
            ParameterKind::PositionalCollection { max, .. } => {
                let values = take_values(&mut probe, *max);
                let (min, _) = self.kind.bounds();
                // A positional collection never matches zero tokens.
                if values.is_empty() || values.len() < min.unwrap_or(0) {
                    return None;
                }
                values
            }
            ParameterKind::PositionalGreedy => non_empty(take_values(&mut probe, None))?,
            ParameterKind::Named { name } => {
                take_name(&mut probe, name, options)?;
                vec![take_value(&mut probe)?]
            }
            ParameterKind::NamedCollection { name, min, max } => {
                take_name(&mut probe, name, options)?;
                let values = take_values(&mut probe, *max);
                if values.len() < min.unwrap_or(0) {
                    return None;
                }
                values
            }
            ParameterKind::NamedGreedy { name } => {
                take_name(&mut probe, name, options)?;
                non_empty(take_values(&mut probe, None))?
            }
            ParameterKind::Switch { name, .. } => {
                take_name(&mut probe, name, options)?;
                Vec::new()
            }
        };
        *tokens = probe;
        Some(values)
    }

    /// Matches a pre-split parameter. Positional shapes are addressed by their hint name.
    pub fn matches_named(
        &self,
        name: &str,
        values: &[String],
        options: &TreeSearchOptions,
    ) -> NamedMatch {
        let addressed = match self.kind.option_name() {
            Some(option) => option_matches(option, name, options),
            None => options.key_comparison.equals(&self.hint_name, name),
        };
        if !addressed {
            return NamedMatch::Mismatch;
        }

        let count = values.len();
        let accepted = match self.kind {
            ParameterKind::Switch { .. } => count == 0,
            ParameterKind::Positional | ParameterKind::Named { .. } => count == 1,
            ParameterKind::PositionalGreedy | ParameterKind::NamedGreedy { .. } => count >= 1,
            ParameterKind::PositionalCollection { min, max }
            | ParameterKind::NamedCollection { min, max, .. } => {
                count >= min.unwrap_or(0) && max.is_none_or(|max| count <= max)
            }
        };

        if accepted {
            NamedMatch::Matched(values.to_vec())
        } else {
            NamedMatch::Fatal(format!(
                "Parameter '{}' does not accept {} value(s).",
                self.hint_name, count
            ))
        }
    }
}

fn non_empty(values: Vec<String>) -> Option<Vec<String>> {
    (!values.is_empty()).then_some(values)
}

fn take_value(tokens: &mut Tokenizer<'_>) -> Option<String> {
    let token = tokens.peek()?;
    if !token.is_value() {
        return None;
    }
    tokens.next();
    Some(token.text.into_owned())
}

/// Takes consecutive value tokens, up to `max` of them.
fn take_values(tokens: &mut Tokenizer<'_>, max: Option<usize>) -> Vec<String> {
    let mut values = Vec::new();
    while max.is_none_or(|max| values.len() < max) {
        match take_value(tokens) {
            Some(value) => values.push(value),
            None => break,
        }
    }
    values
}

fn take_name(tokens: &mut Tokenizer<'_>, name: &OptionName, options: &TreeSearchOptions) -> Option<()> {
    let token = tokens.peek()?;
    let comparison = options.key_comparison;
    let matched = match token.token_type {
        TokenType::LongName => name
            .long()
            .is_some_and(|long| comparison.equals(long, &token.text)),
        TokenType::ShortName => match (name.short(), token.text.chars().next()) {
            (Some(short), Some(given)) => comparison.equals_char(short, given),
            _ => false,
        },
        TokenType::Value => false,
    };
    if matched {
        tokens.next();
        Some(())
    } else {
        None
    }
}

/// Compares a pre-split parameter name against an option name. A single character
/// addresses the short name; anything else the long name.
fn option_matches(option: &OptionName, name: &str, options: &TreeSearchOptions) -> bool {
    let comparison = options.key_comparison;
    let mut chars = name.chars();
    if let (Some(given), None) = (chars.next(), chars.next())
        && let Some(short) = option.short()
        && comparison.equals_char(short, given)
    {
        return true;
    }
    option.long().is_some_and(|long| comparison.equals(long, name))
}

// MARK: --- UNIT TESTS ---
