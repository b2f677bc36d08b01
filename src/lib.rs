//! # Reactive Runtime Core
//!
//! Dependency tracking and statement ordering for component logic: props,
//! locals, `$:` reactive statements, and store subscriptions.
//!
//! ## Runtime Invariants
//!
//! 1. **Dirty-set ownership**: the `BindingRegistry` is the single owner of
//!    the changed-since-last-flush set. Every successful write records the
//!    name there; nothing else mutates it.
//!
//! 2. **Static, forward-only dependency graph**: edges are computed once per
//!    definition from top-level reads and writes. Statement `j` depends on
//!    statement `i` only when `i` precedes `j` in source order and `j` reads
//!    a name `i` assigns. Writes hidden inside function bodies contribute
//!    nothing.
//!
//! 3. **Batched, non-reentrant flushes**: a tracked write never runs
//!    statements synchronously. It queues the instance; `run_until_idle`
//!    drains the queue, one single-pass flush per entry, and flushes never
//!    nest. Each flush ends with at most one render notification, gated on
//!    the bindings the markup actually reads.
//!
//! 4. **Sync-first store contract**: `subscribe` delivers the current value
//!    before returning, so `$`-prefixed bindings are readable the moment the
//!    instance exists. Unsubscribe handles fire exactly once on teardown.
//!
//! 5. **Undefined is not null**: a prop instantiated without a value (and
//!    without a default) is `Value::Undefined`, distinct from JSON `null`.

mod analyze;
mod binding;
mod component;
mod scheduler;
mod store;
mod validate;

pub use analyze::{
    build_graph, extract_name_sets, DependencyEdge, DependencyGraph, NameSets, ReactiveStatement,
};
pub use binding::{Binding, BindingKind, BindingRegistry, Value};
pub use component::{
    ComponentDefinition, ComponentInstance, ComponentLogicIR, InstanceOptions, LocalIR,
    ModuleContext, PropIR, RenderCallback, Scope, StatementBody, StatementIR,
};
pub use scheduler::{Phase, Scheduler};
pub use store::{Store, StoreSubscription, Subscriber, SubscriptionManager, Unsubscriber};
pub use validate::*;
