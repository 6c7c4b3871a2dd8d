// ABOUTME: Command table routing inbound channels to shell operations and capability handlers.
// ABOUTME: Built once at startup from explicit (namespace, action, leaf) triples plus the fixed shell channels.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;
use tracing::trace;

use crate::error::Result;

pub type HandlerFuture = BoxFuture<'static, Result<Value>>;

/// Async capability handler taking the inbound payload.
#[derive(Clone)]
pub struct Handler(Arc<dyn Fn(Value) -> HandlerFuture + Send + Sync>);

impl Handler {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        Self(Arc::new(move |payload| Box::pin(f(payload))))
    }

    pub fn call(&self, payload: Value) -> HandlerFuture {
        (self.0)(payload)
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Handler")
    }
}

/// A leaf of the capability map.
#[derive(Debug, Clone)]
pub enum Capability {
    Callable(Handler),
    /// Plain value exported next to the handlers. Never routed.
    Constant(Value),
}

/// Two-level map `namespace -> { action -> leaf }`.
#[derive(Debug, Clone, Default)]
pub struct CapabilityMap {
    namespaces: BTreeMap<String, BTreeMap<String, Capability>>,
}

impl CapabilityMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &mut self,
        namespace: impl Into<String>,
        action: impl Into<String>,
        leaf: Capability,
    ) -> &mut Self {
        self.namespaces
            .entry(namespace.into())
            .or_default()
            .insert(action.into(), leaf);
        self
    }

    pub fn handler(
        &mut self,
        namespace: impl Into<String>,
        action: impl Into<String>,
        handler: Handler,
    ) -> &mut Self {
        self.insert(namespace, action, Capability::Callable(handler))
    }

    pub fn constant(
        &mut self,
        namespace: impl Into<String>,
        action: impl Into<String>,
        value: Value,
    ) -> &mut Self {
        self.insert(namespace, action, Capability::Constant(value))
    }

    pub fn get(&self, namespace: &str, action: &str) -> Option<&Handler> {
        match self.namespaces.get(namespace)?.get(action)? {
            Capability::Callable(handler) => Some(handler),
            Capability::Constant(_) => None,
        }
    }

    /// Channel keys of every callable leaf.
    pub fn callable_keys(&self) -> impl Iterator<Item = String> + '_ {
        self.leaves().filter_map(|(namespace, action, leaf)| match leaf {
            Capability::Callable(_) => Some(channel_key(namespace, action)),
            Capability::Constant(_) => None,
        })
    }

    fn leaves(&self) -> impl Iterator<Item = (&str, &str, &Capability)> + '_ {
        self.namespaces.iter().flat_map(|(namespace, actions)| {
            actions
                .iter()
                .map(move |(action, leaf)| (namespace.as_str(), action.as_str(), leaf))
        })
    }
}

/// Inbound channel key for a capability.
pub fn channel_key(namespace: &str, action: &str) -> String {
    format!("{namespace}:{action}")
}

/// Fixed channels handled by the controller itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShellCommand {
    /// Forward an action object to the store.
    ReduxAction,
    CreateAndShowChildWindow,
    CreateChildWindow,
    ShowChildWindow,
    ClosePage,
}

impl ShellCommand {
    pub const ALL: [ShellCommand; 5] = [
        ShellCommand::ReduxAction,
        ShellCommand::CreateAndShowChildWindow,
        ShellCommand::CreateChildWindow,
        ShellCommand::ShowChildWindow,
        ShellCommand::ClosePage,
    ];

    pub fn channel(self) -> &'static str {
        match self {
            ShellCommand::ReduxAction => "redux-action",
            ShellCommand::CreateAndShowChildWindow => "createAndShowChildWindow",
            ShellCommand::CreateChildWindow => "createChildWindow",
            ShellCommand::ShowChildWindow => "showChildWindow",
            ShellCommand::ClosePage => "closePage",
        }
    }

    /// Commands that only make sense once a main window exists.
    pub fn needs_session(self) -> bool {
        !matches!(self, ShellCommand::ReduxAction)
    }
}

#[derive(Debug, Clone)]
pub enum Route {
    Shell(ShellCommand),
    Capability(Handler),
}

/// Channel name → route. Immutable once built.
#[derive(Debug, Default)]
pub struct CommandTable {
    routes: HashMap<String, Route>,
}

impl CommandTable {
    pub fn builder() -> CommandTableBuilder {
        CommandTableBuilder::default()
    }

    pub fn get(&self, channel: &str) -> Option<&Route> {
        self.routes.get(channel)
    }

    pub fn contains(&self, channel: &str) -> bool {
        self.routes.contains_key(channel)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct CommandTableBuilder {
    routes: HashMap<String, Route>,
}

impl CommandTableBuilder {
    /// Bind every callable leaf under `"<namespace>:<action>"`. Constant
    /// leaves are skipped. Existing keys are overwritten.
    pub fn register(mut self, map: &CapabilityMap) -> Self {
        for (namespace, action, leaf) in map.leaves() {
            match leaf {
                Capability::Callable(handler) => {
                    self.routes.insert(
                        channel_key(namespace, action),
                        Route::Capability(handler.clone()),
                    );
                }
                Capability::Constant(_) => {
                    trace!(namespace, action, "Skipping non-callable capability");
                }
            }
        }
        self
    }

    pub fn bind(mut self, channel: impl Into<String>, route: Route) -> Self {
        self.routes.insert(channel.into(), route);
        self
    }

    pub fn with_shell_commands(self) -> Self {
        ShellCommand::ALL
            .into_iter()
            .fold(self, |builder, cmd| builder.bind(cmd.channel(), Route::Shell(cmd)))
    }

    pub fn build(self) -> CommandTable {
        CommandTable {
            routes: self.routes,
        }
    }
}
