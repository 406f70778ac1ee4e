// src/core/conditions.rs

//! # Conditions
//!
//! Preconditions guarding a command. An attribute (any `'static` value) is attached to a
//! group type, a command or a parameter; the check itself is a [`Condition`] registered for
//! the attribute's type. Parameter conditions additionally receive the materialized value
//! and are registered per attribute type *and* value type.
use crate::{CancellationToken, models::ConditionAttribute};
use futures::future::{self, BoxFuture, FutureExt};
use std::{
    any::{Any, TypeId, type_name},
    collections::HashMap,
    fmt,
    marker::PhantomData,
    sync::Arc,
};
use thiserror::Error;

/// A condition's refusal.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{reason}")]
pub struct ConditionError {
    /// Human-readable cause, shown to the caller.
    pub reason: String,
}

impl ConditionError {
    /// A failure with the given reason.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Outcome of a single condition check.
pub type ConditionResult = Result<(), ConditionError>;

/// Checks a group or command attributed with an `A`.
pub trait Condition<A>: Send + Sync {
    fn check<'a>(
        &'a self,
        attribute: &'a A,
        cancellation: &'a CancellationToken,
    ) -> BoxFuture<'a, ConditionResult>;
}

/// Checks a parameter attributed with an `A` whose materialized value is a `V`. The value
/// is `None` when the argument is null.
pub trait ParameterCondition<A, V>: Send + Sync {
    fn check<'a>(
        &'a self,
        attribute: &'a A,
        value: Option<&'a V>,
        cancellation: &'a CancellationToken,
    ) -> BoxFuture<'a, ConditionResult>;
}

// --- TYPE ERASURE ---

pub(crate) trait ErasedCondition: Send + Sync {
    fn check<'a>(
        &'a self,
        attribute: &'a ConditionAttribute,
        cancellation: &'a CancellationToken,
    ) -> BoxFuture<'a, ConditionResult>;
}

pub(crate) trait ErasedParameterCondition: Send + Sync {
    fn check<'a>(
        &'a self,
        attribute: &'a ConditionAttribute,
        value: Option<&'a (dyn Any + Send + Sync)>,
        cancellation: &'a CancellationToken,
    ) -> BoxFuture<'a, ConditionResult>;
}

struct TypedCondition<A, C> {
    condition: C,
    _attribute: PhantomData<fn(A)>,
}

impl<A, C> ErasedCondition for TypedCondition<A, C>
where
    A: Any + Send + Sync,
    C: Condition<A>,
{
    fn check<'a>(
        &'a self,
        attribute: &'a ConditionAttribute,
        cancellation: &'a CancellationToken,
    ) -> BoxFuture<'a, ConditionResult> {
        match attribute.attribute().downcast_ref::<A>() {
            Some(attribute) => self.condition.check(attribute, cancellation),
            None => future::ready(Err(mismatch::<A>(attribute))).boxed(),
        }
    }
}

struct TypedParameterCondition<A, V, C> {
    condition: C,
    _types: PhantomData<fn(A, V)>,
}

impl<A, V, C> ErasedParameterCondition for TypedParameterCondition<A, V, C>
where
    A: Any + Send + Sync,
    V: Any + Send + Sync,
    C: ParameterCondition<A, V>,
{
    fn check<'a>(
        &'a self,
        attribute: &'a ConditionAttribute,
        value: Option<&'a (dyn Any + Send + Sync)>,
        cancellation: &'a CancellationToken,
    ) -> BoxFuture<'a, ConditionResult> {
        let Some(typed_attribute) = attribute.attribute().downcast_ref::<A>() else {
            return future::ready(Err(mismatch::<A>(attribute))).boxed();
        };
        let typed_value = match value {
            None => None,
            Some(value) => match value.downcast_ref::<V>() {
                Some(value) => Some(value),
                None => {
                    return future::ready(Err(ConditionError::new(format!(
                        "Condition expects a '{}' value.",
                        type_name::<V>()
                    ))))
                    .boxed();
                }
            },
        };
        self.condition.check(typed_attribute, typed_value, cancellation)
    }
}

fn mismatch<A>(attribute: &ConditionAttribute) -> ConditionError {
    ConditionError::new(format!(
        "Condition for '{}' received a '{}' attribute.",
        type_name::<A>(),
        attribute.type_name()
    ))
}

/// A closure-backed [`Condition`].
pub struct FnCondition<F>(pub F);

impl<A, F> Condition<A> for FnCondition<F>
where
    F: Fn(&A) -> ConditionResult + Send + Sync,
{
    fn check<'a>(
        &'a self,
        attribute: &'a A,
        _cancellation: &'a CancellationToken,
    ) -> BoxFuture<'a, ConditionResult> {
        future::ready((self.0)(attribute)).boxed()
    }
}

/// A closure-backed [`ParameterCondition`].
pub struct FnParameterCondition<F>(pub F);

impl<A, V, F> ParameterCondition<A, V> for FnParameterCondition<F>
where
    F: Fn(&A, Option<&V>) -> ConditionResult + Send + Sync,
{
    fn check<'a>(
        &'a self,
        attribute: &'a A,
        value: Option<&'a V>,
        _cancellation: &'a CancellationToken,
    ) -> BoxFuture<'a, ConditionResult> {
        future::ready((self.0)(attribute, value)).boxed()
    }
}

/// Conditions keyed by attribute type (and value type, for parameter conditions).
#[derive(Default, Clone)]
pub struct ConditionRegistry {
    conditions: HashMap<TypeId, Vec<Arc<dyn ErasedCondition>>>,
    parameter_conditions: HashMap<(TypeId, TypeId), Vec<Arc<dyn ErasedParameterCondition>>>,
}

impl ConditionRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `condition` for attribute type `A`, replacing any earlier one.
    pub fn register<A, C>(&mut self, condition: C) -> &mut Self
    where
        A: Any + Send + Sync,
        C: Condition<A> + 'static,
    {
        self.conditions
            .entry(TypeId::of::<A>())
            .or_default()
            .push(Arc::new(TypedCondition {
                condition,
                _attribute: PhantomData,
            }));
        self
    }

    /// Registers a closure as the condition for attribute type `A`.
    pub fn register_fn<A, F>(&mut self, condition: F) -> &mut Self
    where
        A: Any + Send + Sync,
        F: Fn(&A) -> ConditionResult + Send + Sync + 'static,
    {
        self.register::<A, _>(FnCondition(condition))
    }

    /// Registers a parameter condition. For collection parameters `V` is `Vec<T>`.
    pub fn register_parameter<A, V, C>(&mut self, condition: C) -> &mut Self
    where
        A: Any + Send + Sync,
        V: Any + Send + Sync,
        C: ParameterCondition<A, V> + 'static,
    {
        self.parameter_conditions
            .entry((TypeId::of::<A>(), TypeId::of::<V>()))
            .or_default()
            .push(Arc::new(TypedParameterCondition {
                condition,
                _types: PhantomData,
            }));
        self
    }

    /// Registers a closure that also receives the parsed parameter value, downcast to `V`.
    pub fn register_parameter_fn<A, V, F>(&mut self, condition: F) -> &mut Self
    where
        A: Any + Send + Sync,
        V: Any + Send + Sync,
        F: Fn(&A, Option<&V>) -> ConditionResult + Send + Sync + 'static,
    {
        self.register_parameter::<A, V, _>(FnParameterCondition(condition))
    }

    pub(crate) fn find_conditions(&self, attribute: TypeId) -> &[Arc<dyn ErasedCondition>] {
        self.conditions
            .get(&attribute)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub(crate) fn find_parameter_conditions(
        &self,
        attribute: TypeId,
        value: TypeId,
    ) -> &[Arc<dyn ErasedParameterCondition>] {
        self.parameter_conditions
            .get(&(attribute, value))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Runs every condition registered for `attribute`. An attribute with no registered
    /// condition is a failure.
    pub async fn check(
        &self,
        attribute: &ConditionAttribute,
        cancellation: &CancellationToken,
    ) -> ConditionResult {
        let conditions = self.find_conditions(attribute.type_id());
        if conditions.is_empty() {
            return Err(ConditionError::new(format!(
                "No condition is registered for '{}'.",
                attribute.type_name()
            )));
        }
        for condition in conditions {
            condition.check(attribute, cancellation).await?;
        }
        Ok(())
    }

    /// Runs every parameter condition registered for `attribute` and the value's type.
    pub async fn check_parameter(
        &self,
        attribute: &ConditionAttribute,
        value_type: TypeId,
        value: Option<&(dyn Any + Send + Sync)>,
        cancellation: &CancellationToken,
    ) -> ConditionResult {
        let conditions = self.find_parameter_conditions(attribute.type_id(), value_type);
        if conditions.is_empty() {
            return Err(ConditionError::new(format!(
                "No parameter condition is registered for '{}'.",
                attribute.type_name()
            )));
        }
        for condition in conditions {
            condition.check(attribute, value, cancellation).await?;
        }
        Ok(())
    }
}

impl fmt::Debug for ConditionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConditionRegistry")
            .field("conditions", &self.conditions.len())
            .field("parameter_conditions", &self.parameter_conditions.len())
            .finish()
    }
}
