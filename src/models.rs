// src/models.rs

use crate::core::{commons::wrap_value, tree::NodeId};
use std::{
    any::{Any, TypeId},
    borrow::Cow,
    fmt,
    sync::Arc,
};
use thiserror::Error;

/// A type-erased, materialized parameter value.
pub type Value = Box<dyn Any + Send + Sync>;

// --- TOKENS ---

/// Classifies a token produced by the tokenizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenType {
    /// A plain value (positional argument or option value).
    Value,
    /// A long option name, written `--name`. The text excludes the prefix.
    LongName,
    /// A short option name, written `-n`. The text excludes the prefix.
    ShortName,
}

/// A single token of a raw command string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token<'a> {
    /// What kind of token this is.
    pub token_type: TokenType,
    /// The token text with prefixes and quotes removed.
    pub text: Cow<'a, str>,
}

impl<'a> Token<'a> {
    /// A value token.
    pub fn value(text: impl Into<Cow<'a, str>>) -> Self {
        Self {
            token_type: TokenType::Value,
            text: text.into(),
        }
    }

    /// A long option name token.
    pub fn long_name(text: impl Into<Cow<'a, str>>) -> Self {
        Self {
            token_type: TokenType::LongName,
            text: text.into(),
        }
    }

    /// A short option name token.
    pub fn short_name(text: impl Into<Cow<'a, str>>) -> Self {
        Self {
            token_type: TokenType::ShortName,
            text: text.into(),
        }
    }

    /// `true` for a value token.
    pub fn is_value(&self) -> bool {
        self.token_type == TokenType::Value
    }
}

impl fmt::Display for Token<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.token_type {
            TokenType::LongName => write!(f, "--{}", self.text),
            TokenType::ShortName => write!(f, "-{}", self.text),
            TokenType::Value if self.text.contains(char::is_whitespace) || self.text.is_empty() => {
                f.write_str(&wrap_value(&self.text))
            }
            TokenType::Value => f.write_str(&self.text),
        }
    }
}

// --- TYPE DESCRIPTORS ---

/// Static description of a parameter's declared type.
///
/// Built once per parameter with [`TypeDescriptor::of`]. Besides identifying the type for
/// parser and condition lookup, it knows how to assemble parsed elements into a `Vec<T>`
/// for collection parameters, so no type inspection happens at dispatch time.
#[derive(Clone, Copy)]
pub struct TypeDescriptor {
    id: TypeId,
    name: &'static str,
    collection_id: TypeId,
    collect: fn(Vec<Value>) -> Value,
}

impl TypeDescriptor {
    /// The descriptor of `T`.
    pub fn of<T: Any + Send + Sync>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
            collection_id: TypeId::of::<Vec<T>>(),
            collect: collect_values::<T>,
        }
    }

    /// The `TypeId` of the element type.
    pub fn id(&self) -> TypeId {
        self.id
    }

    /// The `TypeId` of `Vec<T>`, the materialized type of a collection parameter.
    pub fn collection_id(&self) -> TypeId {
        self.collection_id
    }

    /// Type name for messages.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// `true` if this describes `T`.
    pub fn is<T: Any>(&self) -> bool {
        self.id == TypeId::of::<T>()
    }

    /// Assembles parsed elements into a boxed `Vec<T>`.
    pub fn collect(&self, values: Vec<Value>) -> Value {
        (self.collect)(values)
    }
}

fn collect_values<T: Any + Send + Sync>(values: Vec<Value>) -> Value {
    let items: Vec<T> = values
        .into_iter()
        .filter_map(|value| value.downcast::<T>().ok())
        .map(|value| *value)
        .collect();
    Box::new(items)
}

impl PartialEq for TypeDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeDescriptor {}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TypeDescriptor").field(&self.name).finish()
    }
}

/// Produces a fresh default value for every invocation.
#[derive(Clone)]
pub struct DefaultValue {
    type_id: TypeId,
    factory: Arc<dyn Fn() -> Value + Send + Sync>,
}

impl DefaultValue {
    /// A default that clones `value` for every invocation.
    pub fn of<T: Clone + Send + Sync + 'static>(value: T) -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            factory: Arc::new(move || Box::new(value.clone()) as Value),
        }
    }

    /// The `TypeId` of the produced value.
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// A fresh copy of the default.
    pub fn produce(&self) -> Value {
        (self.factory)()
    }
}

impl fmt::Debug for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DefaultValue").finish_non_exhaustive()
    }
}

// --- CONDITIONS ---

/// A precondition marker attached to a group type, a command or a parameter.
///
/// The attribute instance carries the condition's data (a required role, a range...); the
/// logic lives in a condition registered for the attribute's type in a
/// [`crate::core::conditions::ConditionRegistry`].
#[derive(Clone)]
pub struct ConditionAttribute {
    type_id: TypeId,
    type_name: &'static str,
    attribute: Arc<dyn Any + Send + Sync>,
}

impl ConditionAttribute {
    /// Wraps `attribute`.
    pub fn new<A: Any + Send + Sync>(attribute: A) -> Self {
        Self {
            type_id: TypeId::of::<A>(),
            type_name: std::any::type_name::<A>(),
            attribute: Arc::new(attribute),
        }
    }

    /// The `TypeId` of the attribute, used to look up its condition.
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Type name for messages.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// The attribute, for downcasting.
    pub fn attribute(&self) -> &(dyn Any + Send + Sync) {
        self.attribute.as_ref()
    }
}

impl fmt::Debug for ConditionAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ConditionAttribute")
            .field(&self.type_name)
            .finish()
    }
}

// --- PARAMETER SHAPES ---

/// The name(s) an option can be addressed by.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OptionName {
    Short(char),
    Long(String),
    Both { short: char, long: String },
}

impl OptionName {
    /// The short form, if declared.
    pub fn short(&self) -> Option<char> {
        match self {
            Self::Short(c) | Self::Both { short: c, .. } => Some(*c),
            Self::Long(_) => None,
        }
    }

    /// The long form, if declared.
    pub fn long(&self) -> Option<&str> {
        match self {
            Self::Long(l) | Self::Both { long: l, .. } => Some(l),
            Self::Short(_) => None,
        }
    }

    /// The name used as a parameter hint: the long name when present.
    pub fn hint(&self) -> String {
        match self {
            Self::Short(c) => c.to_string(),
            Self::Long(l) | Self::Both { long: l, .. } => l.clone(),
        }
    }
}

impl fmt::Display for OptionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Short(c) => write!(f, "-{}", c),
            Self::Long(l) => write!(f, "--{}", l),
            Self::Both { short, long } => write!(f, "-{}/--{}", short, long),
        }
    }
}

/// The variant-specific part of a [`ParameterShape`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParameterKind {
    /// Consumes exactly one value token.
    Positional,
    /// Consumes consecutive value tokens, between `min` and `max` of them.
    PositionalCollection {
        min: Option<usize>,
        max: Option<usize>,
    },
    /// Consumes every remaining value token, joined into one value.
    PositionalGreedy,
    /// `--name value`.
    Named { name: OptionName },
    /// `--name a b c`.
    NamedCollection {
        name: OptionName,
        min: Option<usize>,
        max: Option<usize>,
    },
    /// `--name every remaining value`.
    NamedGreedy { name: OptionName },
    /// `--name` with no value; its presence negates `default`.
    Switch { name: OptionName, default: bool },
}

impl ParameterKind {
    /// The option name of a named parameter or switch.
    pub fn option_name(&self) -> Option<&OptionName> {
        match self {
            Self::Named { name }
            | Self::NamedCollection { name, .. }
            | Self::NamedGreedy { name }
            | Self::Switch { name, .. } => Some(name),
            Self::Positional | Self::PositionalCollection { .. } | Self::PositionalGreedy => None,
        }
    }

    /// `true` for positional kinds.
    pub fn is_positional(&self) -> bool {
        self.option_name().is_none()
    }

    /// `true` for positional and named collections.
    pub fn is_collection(&self) -> bool {
        matches!(
            self,
            Self::PositionalCollection { .. } | Self::NamedCollection { .. }
        )
    }

    /// `true` for greedy kinds.
    pub fn is_greedy(&self) -> bool {
        matches!(self, Self::PositionalGreedy | Self::NamedGreedy { .. })
    }

    /// `(min, max)` element bounds of a collection; `(None, None)` otherwise.
    pub fn bounds(&self) -> (Option<usize>, Option<usize>) {
        match self {
            Self::PositionalCollection { min, max } | Self::NamedCollection { min, max, .. } => {
                (*min, *max)
            }
            _ => (None, None),
        }
    }
}

/// Static description of one formal parameter of a command.
#[derive(Debug, Clone)]
pub struct ParameterShape {
    /// Name shown in help and error messages.
    pub hint_name: String,
    /// Free text shown in the tree display.
    pub description: String,
    /// The declared type; the element type for collections.
    pub parameter_type: TypeDescriptor,
    /// Accepts an explicit null.
    pub nullable: bool,
    /// May be omitted from the input.
    pub optional: bool,
    /// Produced when an optional parameter is omitted.
    pub default_value: Option<DefaultValue>,
    /// Position of the parameter in the handler's argument list.
    pub ordinal: usize,
    /// Conditions checked against the parsed value.
    pub conditions: Vec<ConditionAttribute>,
    /// How tokens are bound to the parameter.
    pub kind: ParameterKind,
}

impl ParameterShape {
    fn with_kind<T: Any + Send + Sync>(hint_name: impl Into<String>, kind: ParameterKind) -> Self {
        Self {
            hint_name: hint_name.into(),
            description: String::new(),
            parameter_type: TypeDescriptor::of::<T>(),
            nullable: false,
            optional: false,
            default_value: None,
            ordinal: 0,
            conditions: Vec::new(),
            kind,
        }
    }

    /// A single positional value of type `T`.
    pub fn positional<T: Any + Send + Sync>(hint_name: impl Into<String>) -> Self {
        Self::with_kind::<T>(hint_name, ParameterKind::Positional)
    }

    /// Consecutive positional values of element type `T`.
    pub fn positional_collection<T: Any + Send + Sync>(
        hint_name: impl Into<String>,
        min: Option<usize>,
        max: Option<usize>,
    ) -> Self {
        Self::with_kind::<T>(hint_name, ParameterKind::PositionalCollection { min, max })
    }

    /// Every remaining value joined into one `T`.
    pub fn positional_greedy<T: Any + Send + Sync>(hint_name: impl Into<String>) -> Self {
        Self::with_kind::<T>(hint_name, ParameterKind::PositionalGreedy)
    }

    /// `--name value`.
    pub fn named<T: Any + Send + Sync>(name: OptionName) -> Self {
        Self::with_kind::<T>(name.hint(), ParameterKind::Named { name })
    }

    /// `--name a b c`, elements of type `T`.
    pub fn named_collection<T: Any + Send + Sync>(
        name: OptionName,
        min: Option<usize>,
        max: Option<usize>,
    ) -> Self {
        Self::with_kind::<T>(name.hint(), ParameterKind::NamedCollection { name, min, max })
    }

    /// `--name` followed by every remaining value.
    pub fn named_greedy<T: Any + Send + Sync>(name: OptionName) -> Self {
        Self::with_kind::<T>(name.hint(), ParameterKind::NamedGreedy { name })
    }

    /// A boolean switch. Switches always carry a default and are therefore optional.
    pub fn switch(name: OptionName, default: bool) -> Self {
        let mut shape = Self::with_kind::<bool>(name.hint(), ParameterKind::Switch { name, default });
        shape.optional = true;
        shape.default_value = Some(DefaultValue::of(default));
        shape
    }

    /// Overrides the hint name.
    pub fn hint(mut self, hint_name: impl Into<String>) -> Self {
        self.hint_name = hint_name.into();
        self
    }

    /// Sets the description.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Accepts an explicit null.
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Allows the parameter to be omitted.
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Declares a default value, which also makes the parameter optional.
    pub fn with_default<T: Clone + Send + Sync + 'static>(mut self, value: T) -> Self {
        self.optional = true;
        self.default_value = Some(DefaultValue::of(value));
        self
    }

    /// Attaches a condition checked against the parsed value.
    pub fn with_condition<A: Any + Send + Sync>(mut self, attribute: A) -> Self {
        self.conditions.push(ConditionAttribute::new(attribute));
        self
    }
}

/// A validation failure found while assembling a [`CommandShape`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShapeError {
    #[error("Switch '{0}' must be declared as a boolean.")]
    SwitchNotBoolean(String),
    #[error("Parameter '{parameter}' has invalid bounds (min {min:?}, max {max:?}).")]
    InvalidBounds {
        parameter: String,
        min: Option<usize>,
        max: Option<usize>,
    },
    #[error("The default value of parameter '{0}' does not match its declared type.")]
    DefaultTypeMismatch(String),
    #[error("Option name '{0}' is declared more than once.")]
    DuplicateName(String),
}

/// The ordered parameter shapes of one command, plus its description.
///
/// Named parameters are listed before positional ones; each shape keeps its declaration
/// position in [`ParameterShape::ordinal`].
#[derive(Debug, Clone, Default)]
pub struct CommandShape {
    parameters: Vec<ParameterShape>,
    description: String,
}

impl CommandShape {
    /// Builds a shape from parameters given in declaration (argument) order.
    pub fn new(
        parameters: Vec<ParameterShape>,
        description: impl Into<String>,
    ) -> Result<Self, ShapeError> {
        let mut parameters: Vec<ParameterShape> = parameters
            .into_iter()
            .enumerate()
            .map(|(ordinal, mut parameter)| {
                parameter.ordinal = ordinal;
                parameter
            })
            .collect();

        for parameter in &parameters {
            parameter.validate()?;
        }
        Self::check_unique_names(&parameters)?;

        // Stable: named shapes first, each group keeps declaration order.
        parameters.sort_by_key(|parameter| parameter.kind.is_positional());

        Ok(Self {
            parameters,
            description: description.into(),
        })
    }

    /// A shape with no parameters.
    pub fn empty(description: impl Into<String>) -> Self {
        Self {
            parameters: Vec::new(),
            description: description.into(),
        }
    }

    fn check_unique_names(parameters: &[ParameterShape]) -> Result<(), ShapeError> {
        let names: Vec<&OptionName> = parameters
            .iter()
            .filter_map(|parameter| parameter.kind.option_name())
            .collect();
        for (i, name) in names.iter().enumerate() {
            for other in names.iter().skip(i + 1) {
                if let (Some(a), Some(b)) = (name.long(), other.long())
                    && a == b
                {
                    return Err(ShapeError::DuplicateName(format!("--{}", a)));
                }
                if let (Some(a), Some(b)) = (name.short(), other.short())
                    && a == b
                {
                    return Err(ShapeError::DuplicateName(format!("-{}", a)));
                }
            }
        }
        Ok(())
    }

    /// Parameters in handler order.
    pub fn parameters(&self) -> &[ParameterShape] {
        &self.parameters
    }

    /// Free text shown in the tree display.
    pub fn description(&self) -> &str {
        &self.description
    }
}

// --- SEARCH RESULTS ---

/// The tokens bound to one parameter shape during a search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundParameter {
    /// Index into [`CommandShape::parameters`].
    pub shape_index: usize,
    /// The raw token texts, in input order.
    pub tokens: Vec<String>,
}

/// A command node that matched the input, with the tokens bound to its parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundCommandNode {
    /// The matched command.
    pub node: NodeId,
    /// Space-separated path of named keys leading to the command (`"test overload"`).
    pub path: String,
    /// Parameters that received tokens.
    pub parameters: Vec<BoundParameter>,
}

impl BoundCommandNode {
    /// Tokens bound to the parameter at `shape_index`, if any.
    pub fn tokens_for(&self, shape_index: usize) -> Option<&[String]> {
        self.parameters
            .iter()
            .find(|bound| bound.shape_index == shape_index)
            .map(|bound| bound.tokens.as_slice())
    }
}
