// src/core/parsers.rs

//! # Type Parsers
//!
//! Converts a token's text into a typed value. Parsers are registered per target type in a
//! [`ParserRegistry`]; a type may have several, tried in registration order until one
//! succeeds. When all of them fail, every rejection is reported.
use crate::{CancellationToken, models::{TypeDescriptor, Value}};
use futures::future::{self, BoxFuture, FutureExt};
use std::{
    any::{Any, TypeId},
    collections::HashMap,
    fmt,
    future::Future,
    marker::PhantomData,
    str::FromStr,
    sync::Arc,
};
use thiserror::Error;

/// A single parser's refusal of a token.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{reason}")]
pub struct ParseError {
    /// Why the value was rejected.
    pub reason: String,
}

impl ParseError {
    /// A failure with the given reason.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Why a token could not be turned into a value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseFailure {
    #[error("No parser is registered for type '{type_name}'.")]
    NoParser { type_name: &'static str },
    #[error("{}", join_reasons(.0))]
    Rejected(Vec<ParseError>),
}

fn join_reasons(errors: &[ParseError]) -> String {
    errors
        .iter()
        .map(|error| error.reason.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Parses a token into a `T`.
pub trait TypeParser<T>: Send + Sync {
    fn try_parse<'a>(
        &'a self,
        token: &'a str,
        cancellation: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<T, ParseError>>;
}

/// Parses any `T: FromStr`.
pub struct FromStrParser<T>(PhantomData<fn() -> T>);

impl<T> Default for FromStrParser<T> {
    fn default() -> Self {
        Self(PhantomData)
    }
}

impl<T> TypeParser<T> for FromStrParser<T>
where
    T: FromStr + Send + 'static,
    T::Err: fmt::Display,
{
    fn try_parse<'a>(
        &'a self,
        token: &'a str,
        _cancellation: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<T, ParseError>> {
        let result = token.parse::<T>().map_err(|error| {
            ParseError::new(format!(
                "'{}' is not a valid {}: {}",
                token,
                std::any::type_name::<T>(),
                error
            ))
        });
        future::ready(result).boxed()
    }
}

/// Adapts an async closure into a parser.
pub struct FnParser<F>(F);

impl<T, F, Fut> TypeParser<T> for FnParser<F>
where
    F: Fn(String, CancellationToken) -> Fut + Send + Sync,
    Fut: Future<Output = Result<T, ParseError>> + Send + 'static,
{
    fn try_parse<'a>(
        &'a self,
        token: &'a str,
        cancellation: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<T, ParseError>> {
        (self.0)(token.to_string(), cancellation.clone()).boxed()
    }
}

// --- TYPE ERASURE ---

trait ErasedParser: Send + Sync {
    fn parse<'a>(
        &'a self,
        token: &'a str,
        cancellation: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<Value, ParseError>>;
}

struct Typed<T, P> {
    parser: P,
    _target: PhantomData<fn() -> T>,
}

impl<T, P> ErasedParser for Typed<T, P>
where
    T: Any + Send + Sync,
    P: TypeParser<T>,
{
    fn parse<'a>(
        &'a self,
        token: &'a str,
        cancellation: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<Value, ParseError>> {
        self.parser
            .try_parse(token, cancellation)
            .map(|result| result.map(|value| Box::new(value) as Value))
            .boxed()
    }
}

/// Parsers keyed by target type.
#[derive(Default, Clone)]
pub struct ParserRegistry {
    parsers: HashMap<TypeId, Vec<Arc<dyn ErasedParser>>>,
}

impl ParserRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with `FromStr` parsers for strings, booleans, characters and numbers.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry
            .register_from_str::<String>()
            .register_from_str::<bool>()
            .register_from_str::<char>()
            .register_from_str::<i8>()
            .register_from_str::<i16>()
            .register_from_str::<i32>()
            .register_from_str::<i64>()
            .register_from_str::<i128>()
            .register_from_str::<isize>()
            .register_from_str::<u8>()
            .register_from_str::<u16>()
            .register_from_str::<u32>()
            .register_from_str::<u64>()
            .register_from_str::<u128>()
            .register_from_str::<usize>()
            .register_from_str::<f32>()
            .register_from_str::<f64>();
        registry
    }

    /// Registers `parser` for type `T`, replacing any earlier one.
    pub fn register<T, P>(&mut self, parser: P) -> &mut Self
    where
        T: Any + Send + Sync,
        P: TypeParser<T> + 'static,
    {
        self.parsers
            .entry(TypeId::of::<T>())
            .or_default()
            .push(Arc::new(Typed {
                parser,
                _target: PhantomData,
            }));
        self
    }

    /// Registers a parser backed by `T`'s [`std::str::FromStr`] implementation.
    pub fn register_from_str<T>(&mut self) -> &mut Self
    where
        T: FromStr + Any + Send + Sync,
        T::Err: fmt::Display,
    {
        self.register::<T, _>(FromStrParser::<T>::default())
    }

    /// Registers an async closure as the parser for type `T`.
    pub fn register_fn<T, F, Fut>(&mut self, parser: F) -> &mut Self
    where
        T: Any + Send + Sync,
        F: Fn(String, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ParseError>> + Send + 'static,
    {
        self.register::<T, _>(FnParser(parser))
    }

    /// `true` if a parser is registered for `type_id`.
    pub fn has_parser(&self, type_id: TypeId) -> bool {
        self.parsers
            .get(&type_id)
            .is_some_and(|parsers| !parsers.is_empty())
    }

    /// Parses `token` as the type described by `descriptor`.
    pub async fn parse(
        &self,
        descriptor: &TypeDescriptor,
        token: &str,
        cancellation: &CancellationToken,
    ) -> Result<Value, ParseFailure> {
        let parsers = self
            .parsers
            .get(&descriptor.id())
            .filter(|parsers| !parsers.is_empty())
            .ok_or(ParseFailure::NoParser {
                type_name: descriptor.name(),
            })?;

        let mut errors = Vec::new();
        for parser in parsers {
            match parser.parse(token, cancellation).await {
                Ok(value) => return Ok(value),
                Err(error) => {
                    log::trace!("Parser for '{}' rejected '{}': {}", descriptor.name(), token, error);
                    errors.push(error);
                }
            }
        }
        Err(ParseFailure::Rejected(errors))
    }
}

impl fmt::Debug for ParserRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParserRegistry")
            .field("types", &self.parsers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    fn token() -> CancellationToken {
        Arc::new(AtomicBool::new(false))
    }

    #[derive(Debug, Clone, PartialEq)]
    enum Color {
        Red,
        Blue,
    }

    #[tokio::test]
    async fn test_default_parsers() {
        let registry = ParserRegistry::with_defaults();
        let value = registry
            .parse(&TypeDescriptor::of::<i32>(), "42", &token())
            .await
            .unwrap();
        assert_eq!(value.downcast_ref::<i32>(), Some(&42));

        let value = registry
            .parse(&TypeDescriptor::of::<String>(), "booga", &token())
            .await
            .unwrap();
        assert_eq!(value.downcast_ref::<String>().map(String::as_str), Some("booga"));

        let failure = registry
            .parse(&TypeDescriptor::of::<i32>(), "booga", &token())
            .await
            .unwrap_err();
        assert!(matches!(failure, ParseFailure::Rejected(ref errors) if errors.len() == 1));
    }

    #[tokio::test]
    async fn test_missing_parser() {
        let registry = ParserRegistry::new();
        let failure = registry
            .parse(&TypeDescriptor::of::<Color>(), "red", &token())
            .await
            .unwrap_err();
        assert!(matches!(failure, ParseFailure::NoParser { .. }));
    }

    #[tokio::test]
    async fn test_first_successful_parser_wins_and_failures_aggregate() {
        let mut registry = ParserRegistry::new();
        registry
            .register_fn::<Color, _, _>(|token, _| async move {
                match token.as_str() {
                    "red" => Ok(Color::Red),
                    _ => Err(ParseError::new("not red")),
                }
            })
            .register_fn::<Color, _, _>(|token, _| async move {
                match token.as_str() {
                    "blue" => Ok(Color::Blue),
                    _ => Err(ParseError::new("not blue")),
                }
            });

        let value = registry
            .parse(&TypeDescriptor::of::<Color>(), "blue", &token())
            .await
            .unwrap();
        assert_eq!(value.downcast_ref::<Color>(), Some(&Color::Blue));

        let failure = registry
            .parse(&TypeDescriptor::of::<Color>(), "green", &token())
            .await
            .unwrap_err();
        assert_eq!(
            failure,
            ParseFailure::Rejected(vec![ParseError::new("not red"), ParseError::new("not blue")])
        );
        assert_eq!(failure.to_string(), "not red; not blue");
    }
}
