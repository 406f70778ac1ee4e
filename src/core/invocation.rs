// src/core/invocation.rs

//! # Invocation Contract
//!
//! The types a command handler is compiled into and invoked with. A tree never inspects
//! handler metadata at dispatch time: every command carries a [`CommandHandler`] (a plain
//! boxed closure) and the [`GroupType`] that constructs its group instance.
//!
//! - **`GroupType`**: static descriptor of a command group: its name, the enclosing group
//!   type (if nested), the conditions attached to it and a factory for its instance.
//! - **`CommandGroup`**: the instance created per invocation. Its `dispose` hook is awaited
//!   after the handler finishes, successfully or not; `Drop` covers synchronous cleanup.
//! - **`Invocation`**: what the handler receives: materialized arguments, the ambient
//!   services and the cancellation token.
use crate::{
    CancellationToken,
    models::{ConditionAttribute, Value},
};
use anyhow::{Result, anyhow};
use futures::future::{self, BoxFuture, FutureExt};
use std::{
    any::{Any, TypeId, type_name},
    collections::HashMap,
    fmt,
    future::Future,
    sync::Arc,
};

// --- SERVICES ---

/// Ambient services available to group factories and handlers, keyed by type.
#[derive(Clone, Default)]
pub struct Services {
    entries: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl Services {
    /// An empty container.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `service`, replacing any earlier value of the same type.
    pub fn insert<T: Any + Send + Sync>(&mut self, service: T) -> &mut Self {
        self.entries.insert(TypeId::of::<T>(), Arc::new(service));
        self
    }

    /// Builder form of [`Services::insert`].
    pub fn with<T: Any + Send + Sync>(mut self, service: T) -> Self {
        self.insert(service);
        self
    }

    /// Registers a service that is already shared; [`Self::get`] returns this same `Arc`.
    pub fn insert_arc<T: Any + Send + Sync>(&mut self, service: Arc<T>) -> &mut Self {
        self.entries.insert(TypeId::of::<T>(), service);
        self
    }

    /// Adds an already shared service.
    pub fn with_arc<T: Any + Send + Sync>(mut self, service: Arc<T>) -> Self {
        self.insert_arc(service);
        self
    }

    /// The service of type `T`, if one was registered.
    pub fn get<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.entries
            .get(&TypeId::of::<T>())
            .cloned()
            .and_then(|service| service.downcast::<T>().ok())
    }

    /// Like [`Services::get`], but a missing service is an error.
    pub fn require<T: Any + Send + Sync>(&self) -> Result<Arc<T>> {
        self.get::<T>()
            .ok_or_else(|| anyhow!("Service '{}' is not registered.", type_name::<T>()))
    }
}

impl fmt::Debug for Services {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Services")
            .field("count", &self.entries.len())
            .finish()
    }
}

// --- GROUPS ---

/// A command group instance, constructed once per invocation.
pub trait CommandGroup: Send + Sync + 'static {
    /// Releases resources once the invocation is over. Awaited whether the handler
    /// succeeded, failed or panicked.
    fn dispose(&self) -> BoxFuture<'_, ()> {
        future::ready(()).boxed()
    }
}

/// The instance of groups that hold no state.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyGroup;

impl CommandGroup for EmptyGroup {}

/// A constructed group: the same instance seen as `Any` (for the handler) and as a
/// [`CommandGroup`] (for disposal).
pub(crate) struct GroupInstance {
    instance: Arc<dyn Any + Send + Sync>,
    lifecycle: Arc<dyn CommandGroup>,
}

impl GroupInstance {
    fn new<G: CommandGroup>(group: G) -> Self {
        let group = Arc::new(group);
        Self {
            instance: group.clone(),
            lifecycle: group,
        }
    }

    pub(crate) fn instance(&self) -> Arc<dyn Any + Send + Sync> {
        Arc::clone(&self.instance)
    }

    pub(crate) async fn dispose(&self) {
        self.lifecycle.dispose().await;
    }
}

type GroupFactory = Arc<dyn Fn(&Services) -> Result<GroupInstance> + Send + Sync>;

/// Static descriptor of a command group type.
///
/// A named group node may be declared by several group types (partial declarations); a
/// group type may be nested in another one, whose conditions then apply as well.
pub struct GroupType {
    name: String,
    conditions: Vec<ConditionAttribute>,
    enclosing: Option<Arc<GroupType>>,
    factory: GroupFactory,
}

impl GroupType {
    /// A group type whose instances are built by `factory` for every invocation.
    pub fn new<G, F>(name: impl Into<String>, factory: F) -> Self
    where
        G: CommandGroup,
        F: Fn(&Services) -> Result<G> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            conditions: Vec::new(),
            enclosing: None,
            factory: Arc::new(move |services: &Services| {
                factory(services).map(GroupInstance::new)
            }),
        }
    }

    /// A group type whose instance holds no state.
    pub fn stateless(name: impl Into<String>) -> Self {
        Self::new(name, |_: &Services| Ok::<_, anyhow::Error>(EmptyGroup))
    }

    /// Attaches a condition checked before any command of the group runs.
    pub fn with_condition<A: Any + Send + Sync>(mut self, attribute: A) -> Self {
        self.conditions.push(ConditionAttribute::new(attribute));
        self
    }

    /// Declares the enclosing group type, whose conditions are checked first.
    pub fn nested_in(mut self, enclosing: Arc<GroupType>) -> Self {
        self.enclosing = Some(enclosing);
        self
    }

    /// Name used in logs and condition failures.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Conditions attached to this group type.
    pub fn conditions(&self) -> &[ConditionAttribute] {
        &self.conditions
    }

    /// The enclosing group type, if any.
    pub fn enclosing(&self) -> Option<&Arc<GroupType>> {
        self.enclosing.as_ref()
    }

    /// This group type followed by its enclosing group types, innermost first.
    pub fn lineage(self: &Arc<Self>) -> Vec<Arc<GroupType>> {
        let mut lineage = vec![Arc::clone(self)];
        let mut current = self.enclosing.clone();
        while let Some(group_type) = current {
            current = group_type.enclosing.clone();
            lineage.push(group_type);
        }
        lineage
    }

    pub(crate) fn instantiate(&self, services: &Services) -> Result<GroupInstance> {
        (self.factory)(services)
    }
}

impl fmt::Debug for GroupType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroupType")
            .field("name", &self.name)
            .field("conditions", &self.conditions)
            .field("enclosing", &self.enclosing.as_ref().map(|e| e.name.as_str()))
            .finish_non_exhaustive()
    }
}

// --- ARGUMENTS ---

/// Materialized arguments in declaration order. A `None` slot is a null argument.
#[derive(Default)]
pub struct Arguments {
    values: Vec<Option<Value>>,
}

impl Arguments {
    /// Wraps one slot per parameter, in handler order.
    pub fn new(values: Vec<Option<Value>>) -> Self {
        Self { values }
    }

    /// Number of slots.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// `true` when the command declares no parameters.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// `true` if the argument exists and is null.
    pub fn is_null(&self, index: usize) -> bool {
        matches!(self.values.get(index), Some(None))
    }

    /// The value at `index` downcast to `T`; `None` when absent, null or of another type.
    pub fn get<T: Any>(&self, index: usize) -> Option<&T> {
        self.raw(index)?.downcast_ref::<T>()
    }

    /// The value at `index` without a downcast.
    pub fn raw(&self, index: usize) -> Option<&(dyn Any + Send + Sync)> {
        self.values.get(index)?.as_deref()
    }

    /// Moves an argument out, leaving null behind. A type mismatch leaves the slot intact.
    pub fn take<T: Any>(&mut self, index: usize) -> Option<T> {
        let slot = self.values.get_mut(index)?;
        let value = slot.take()?;
        match value.downcast::<T>() {
            Ok(value) => Some(*value),
            Err(value) => {
                *slot = Some(value);
                None
            }
        }
    }

    /// Like [`Arguments::get`], but an absent or mistyped value is an error.
    pub fn require<T: Any>(&self, index: usize) -> Result<&T> {
        self.get::<T>(index).ok_or_else(|| {
            anyhow!(
                "Argument {} is missing, null or not a '{}'.",
                index,
                type_name::<T>()
            )
        })
    }
}

impl fmt::Debug for Arguments {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slots: Vec<&str> = self
            .values
            .iter()
            .map(|value| if value.is_some() { "value" } else { "null" })
            .collect();
        f.debug_tuple("Arguments").field(&slots).finish()
    }
}

/// Everything a handler receives.
#[derive(Debug)]
pub struct Invocation {
    /// Parsed parameter values.
    pub arguments: Arguments,
    /// Caller-supplied services.
    pub services: Services,
    /// Set when the caller cancels the invocation.
    pub cancellation: CancellationToken,
}

// --- HANDLERS ---

/// The value a handler produced on success.
#[derive(Default)]
pub struct CommandOutput(Option<Value>);

impl CommandOutput {
    /// No value.
    pub fn empty() -> Self {
        Self(None)
    }

    /// Wraps `value`.
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Some(Box::new(value)))
    }

    /// `true` when the handler returned no value.
    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }

    /// The value downcast to `T`.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.as_deref()?.downcast_ref::<T>()
    }

    /// The output as text, if the handler returned a `String`.
    pub fn text(&self) -> Option<&str> {
        self.downcast_ref::<String>().map(String::as_str)
    }
}

impl From<String> for CommandOutput {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for CommandOutput {
    fn from(value: &str) -> Self {
        Self::new(value.to_string())
    }
}

impl From<()> for CommandOutput {
    fn from(_: ()) -> Self {
        Self::empty()
    }
}

impl fmt::Debug for CommandOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.0, self.text()) {
            (_, Some(text)) => f.debug_tuple("CommandOutput").field(&text).finish(),
            (Some(_), None) => f.write_str("CommandOutput(<value>)"),
            (None, None) => f.write_str("CommandOutput(<empty>)"),
        }
    }
}

/// What a handler returns. `Err` is a deliberate failure, not a fault.
pub type HandlerResult = Result<CommandOutput>;

type ErasedHandler =
    dyn Fn(Arc<dyn Any + Send + Sync>, Invocation) -> BoxFuture<'static, HandlerResult> + Send + Sync;

/// A command's handler, compiled into a boxed closure when the tree is built.
#[derive(Clone)]
pub struct CommandHandler {
    handler: Arc<ErasedHandler>,
    group_name: &'static str,
}

impl CommandHandler {
    /// A handler that receives the instance of its group type `G`.
    pub fn new<G, F, Fut>(handler: F) -> Self
    where
        G: CommandGroup,
        F: Fn(Arc<G>, Invocation) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        let erased = move |instance: Arc<dyn Any + Send + Sync>,
                           invocation: Invocation|
              -> BoxFuture<'static, HandlerResult> {
            match instance.downcast::<G>() {
                Ok(group) => handler(group, invocation).boxed(),
                Err(_) => future::ready(Err(anyhow!(
                    "Handler expects a '{}' group instance.",
                    type_name::<G>()
                )))
                .boxed(),
            }
        };
        let handler: Arc<ErasedHandler> = Arc::new(erased);
        Self {
            handler,
            group_name: type_name::<G>(),
        }
    }

    /// A handler that ignores its group instance.
    pub fn stateless<F, Fut>(handler: F) -> Self
    where
        F: Fn(Invocation) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        let erased = move |_instance: Arc<dyn Any + Send + Sync>,
                           invocation: Invocation|
              -> BoxFuture<'static, HandlerResult> { handler(invocation).boxed() };
        let handler: Arc<ErasedHandler> = Arc::new(erased);
        Self {
            handler,
            group_name: "*",
        }
    }

    pub(crate) fn invoke(
        &self,
        instance: Arc<dyn Any + Send + Sync>,
        invocation: Invocation,
    ) -> BoxFuture<'static, HandlerResult> {
        (self.handler)(instance, invocation)
    }
}

impl fmt::Debug for CommandHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandHandler")
            .field("group", &self.group_name)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Debug)]
    struct Counter(AtomicUsize);

    struct CountingGroup {
        counter: Arc<Counter>,
    }

    impl CommandGroup for CountingGroup {
        fn dispose(&self) -> BoxFuture<'_, ()> {
            async move {
                self.counter.0.fetch_add(1, Ordering::SeqCst);
            }
            .boxed()
        }
    }

    fn invocation(arguments: Arguments) -> Invocation {
        Invocation {
            arguments,
            services: Services::new(),
            cancellation: Arc::new(AtomicBool::new(false)),
        }
    }

    #[test]
    fn test_services_get_and_require() {
        let services = Services::new().with(Counter(AtomicUsize::new(3)));
        assert_eq!(services.get::<Counter>().unwrap().0.load(Ordering::SeqCst), 3);
        assert!(services.get::<String>().is_none());
        assert!(services.require::<String>().is_err());
    }

    #[test]
    fn test_arguments_access() {
        let mut arguments = Arguments::new(vec![
            Some(Box::new(42i64) as Value),
            None,
            Some(Box::new("booga".to_string()) as Value),
        ]);
        assert_eq!(arguments.len(), 3);
        assert_eq!(arguments.get::<i64>(0), Some(&42));
        assert!(arguments.get::<String>(0).is_none());
        assert!(arguments.is_null(1));
        assert!(!arguments.is_null(0));
        assert!(!arguments.is_null(7));
        assert!(arguments.require::<i64>(1).is_err());

        // A mismatched take leaves the slot untouched.
        assert_eq!(arguments.take::<i64>(2), None);
        assert_eq!(arguments.take::<String>(2), Some("booga".to_string()));
        assert!(arguments.is_null(2));
    }

    #[test]
    fn test_command_output() {
        let output: CommandOutput = "overload-1".into();
        assert_eq!(output.text(), Some("overload-1"));
        assert!(CommandOutput::from(()).is_empty());
        assert_eq!(CommandOutput::new(7u8).downcast_ref::<u8>(), Some(&7));
    }

    #[test]
    fn test_group_type_lineage() {
        let outer = Arc::new(GroupType::stateless("Outer"));
        let inner = Arc::new(GroupType::stateless("Inner").nested_in(outer));
        let names: Vec<String> = inner
            .lineage()
            .iter()
            .map(|group_type| group_type.name().to_string())
            .collect();
        assert_eq!(names, vec!["Inner", "Outer"]);
    }

    #[tokio::test]
    async fn test_handler_receives_its_group_and_group_is_disposed() {
        let counter = Arc::new(Counter(AtomicUsize::new(0)));
        let services = Services::new().with(Arc::clone(&counter));
        let group_type = GroupType::new("Counting", |services: &Services| {
            Ok(CountingGroup {
                counter: Arc::clone(&*services.require::<Arc<Counter>>()?),
            })
        });
        let handler = CommandHandler::new(|group: Arc<CountingGroup>, _invocation| async move {
            Ok(format!("seen {}", group.counter.0.load(Ordering::SeqCst)).into())
        });

        let instance = group_type.instantiate(&services).unwrap();
        let output = handler
            .invoke(instance.instance(), invocation(Arguments::default()))
            .await
            .unwrap();
        instance.dispose().await;

        assert_eq!(output.text(), Some("seen 0"));
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_handler_rejects_foreign_group_instance() {
        let handler =
            CommandHandler::new(|_group: Arc<CountingGroup>, _invocation| async { Ok(().into()) });
        let instance = GroupType::stateless("Other")
            .instantiate(&Services::new())
            .unwrap();
        let result = handler
            .invoke(instance.instance(), invocation(Arguments::default()))
            .await;
        assert!(result.is_err());
    }
}
