//! Component definitions and instances.
//!
//! A definition is built once from the logic IR the upstream syntax-analysis
//! collaborator supplies: props, locals, module locals, store references,
//! reactive statement texts, and the binding names the markup reads. The
//! dependency graph is computed at build time, not per run. Instances own
//! their registry, subscriptions, and dirty-set; statement bodies are
//! closures aligned to statement indices.

use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::rc::{Rc, Weak};

use crate::analyze::{build_graph, DependencyEdge, DependencyGraph, ReactiveStatement};
use crate::binding::{BindingKind, BindingRegistry, Value};
use crate::scheduler::{Phase, Scheduler};
use crate::store::{Store, StoreSubscription, SubscriptionManager};
use crate::validate::{
    RuntimeError, INV_DUPLICATE_BINDING, INV_STATEMENT_SYNTAX, INV_STORE_NOT_WRITABLE,
    INV_UNKNOWN_BINDING, INV_UNKNOWN_STORE,
};

// ═══════════════════════════════════════════════════════════════════════════════
// LOGIC IR
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentLogicIR {
    pub name: String,
    #[serde(default)]
    pub props: Vec<PropIR>,
    #[serde(default)]
    pub locals: Vec<LocalIR>,
    #[serde(default)]
    pub module_locals: Vec<String>,
    /// Top-level store reference names (unprefixed).
    #[serde(default)]
    pub stores: Vec<String>,
    #[serde(default)]
    pub reactive_statements: Vec<StatementIR>,
    /// Binding names the markup actually reads, from the markup-parse
    /// collaborator. Gates the re-render notification.
    #[serde(default)]
    pub markup_bindings: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropIR {
    pub name: String,
    #[serde(default)]
    pub default: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalIR {
    pub name: String,
    #[serde(default = "default_true")]
    pub mutable: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatementIR {
    pub code: String,
}

// ═══════════════════════════════════════════════════════════════════════════════
// MODULE CONTEXT
// ═══════════════════════════════════════════════════════════════════════════════

/// Shared record for module-scope state: one per component definition,
/// evaluated at most once, no reactivity.
#[derive(Debug, Default)]
pub struct ModuleContext {
    initialized: Cell<bool>,
    values: RefCell<HashMap<String, Value>>,
}

impl ModuleContext {
    pub fn is_initialized(&self) -> bool {
        self.initialized.get()
    }

    /// Claims initialization. Returns true exactly once.
    fn begin_init(&self) -> bool {
        !self.initialized.replace(true)
    }

    pub fn read(&self, name: &str) -> Value {
        self.values
            .borrow()
            .get(name)
            .cloned()
            .unwrap_or(Value::Undefined)
    }

    pub fn write(&self, name: &str, value: Value) {
        self.values.borrow_mut().insert(name.to_string(), value);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// DEFINITION
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug)]
pub struct ComponentDefinition {
    pub name: String,
    props: Vec<PropIR>,
    locals: Vec<LocalIR>,
    stores: Vec<String>,
    module_names: HashSet<String>,
    markup_bindings: HashSet<String>,
    /// Instance-reactive statements, source order preserved. `index` is the
    /// position in the original statement list.
    reactive: Vec<ReactiveStatement>,
    /// Original indices of statements that touch only module scope; these
    /// run once at module evaluation and are excluded from the reactive set.
    module_only: Vec<usize>,
    /// Names assigned by reactive statements with no covering declaration.
    implicit_locals: Vec<String>,
    graph: DependencyGraph,
    module: ModuleContext,
}

impl ComponentDefinition {
    pub fn from_ir(ir: ComponentLogicIR) -> Result<Rc<Self>, RuntimeError> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut duplicate: Option<String> = None;
        let all_declared = ir
            .props
            .iter()
            .map(|p| p.name.clone())
            .chain(ir.locals.iter().map(|l| l.name.clone()))
            .chain(ir.module_locals.iter().cloned())
            .chain(
                ir.stores
                    .iter()
                    .flat_map(|s| [s.clone(), format!("${}", s)]),
            );
        for name in all_declared {
            if !seen.insert(name.clone()) {
                duplicate = Some(name);
                break;
            }
        }
        if let Some(name) = duplicate {
            return Err(RuntimeError::with_binding(
                INV_DUPLICATE_BINDING,
                &format!("Binding \"{}\" is declared more than once.", name),
                &ir.name,
                &name,
            ));
        }

        let mut statements = Vec::with_capacity(ir.reactive_statements.len());
        for (index, statement) in ir.reactive_statements.iter().enumerate() {
            let analyzed = ReactiveStatement::analyze(index, &statement.code).map_err(|msg| {
                RuntimeError::new(
                    INV_STATEMENT_SYNTAX,
                    &format!("Reactive statement {}: {}", index, msg),
                    &ir.name,
                )
            })?;
            statements.push(analyzed);
        }

        let store_names: HashSet<&str> = ir.stores.iter().map(|s| s.as_str()).collect();
        for statement in &statements {
            for name in statement.used.iter().chain(statement.assigned.iter()) {
                if let Some(unprefixed) = name.strip_prefix('$') {
                    if !unprefixed.is_empty() && !store_names.contains(unprefixed) {
                        return Err(RuntimeError::with_binding(
                            INV_UNKNOWN_STORE,
                            &format!(
                                "\"{}\" does not correspond to a top-level store reference.",
                                name
                            ),
                            &ir.name,
                            name,
                        ));
                    }
                }
            }
        }

        let module_names: HashSet<String> = ir.module_locals.iter().cloned().collect();
        let mut reactive = Vec::new();
        let mut module_only = Vec::new();
        for statement in statements {
            let touched: Vec<&String> = statement
                .used
                .iter()
                .chain(statement.assigned.iter())
                .collect();
            let is_module_only = !touched.is_empty()
                && touched.iter().all(|name| module_names.contains(name.as_str()));
            if is_module_only {
                module_only.push(statement.index);
            } else {
                reactive.push(statement);
            }
        }

        let mut implicit_locals = Vec::new();
        let mut implicit_seen = HashSet::new();
        for statement in &reactive {
            let mut assigned: Vec<&String> = statement.assigned.iter().collect();
            assigned.sort();
            for name in assigned {
                if !seen.contains(name)
                    && !module_names.contains(name)
                    && !name.starts_with('$')
                    && implicit_seen.insert(name.clone())
                {
                    implicit_locals.push(name.clone());
                }
            }
        }

        let graph = build_graph(&reactive);

        Ok(Rc::new(ComponentDefinition {
            name: ir.name,
            props: ir.props,
            locals: ir.locals,
            stores: ir.stores,
            module_names,
            markup_bindings: ir.markup_bindings.into_iter().collect(),
            reactive,
            module_only,
            implicit_locals,
            graph,
            module: ModuleContext::default(),
        }))
    }

    pub fn module(&self) -> &ModuleContext {
        &self.module
    }

    /// Execution order as original statement indices.
    pub fn execution_order(&self) -> Vec<usize> {
        self.graph
            .order
            .iter()
            .map(|&pos| self.reactive[pos].index)
            .collect()
    }

    /// Dependency edges as original statement indices.
    pub fn edges(&self) -> Vec<DependencyEdge> {
        self.graph
            .edges
            .iter()
            .map(|edge| DependencyEdge {
                producer: self.reactive[edge.producer].index,
                consumer: self.reactive[edge.consumer].index,
            })
            .collect()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// INSTANCES
// ═══════════════════════════════════════════════════════════════════════════════

pub type StatementBody = Box<dyn FnMut(&Scope) -> Result<(), RuntimeError>>;
pub type RenderCallback = Box<dyn FnMut(&[String])>;

#[derive(Default)]
pub struct InstanceOptions {
    pub props: HashMap<String, Value>,
    pub stores: HashMap<String, Rc<dyn Store>>,
    /// Statement bodies keyed by original statement index. Statements
    /// without a body are ordering-only.
    pub bodies: HashMap<usize, StatementBody>,
    pub render: Option<RenderCallback>,
}

struct InstanceState {
    registry: BindingRegistry,
    phase: Phase,
    subscriptions: SubscriptionManager,
    dev_warnings: Vec<String>,
    /// Execution position of the statement currently being evaluated.
    /// Meaningful only while the phase is Flushing.
    cursor: usize,
    /// Names written during the current flush after a statement reading
    /// them had already been passed. They survive the end-of-flush clear
    /// and force a follow-up flush.
    late: HashSet<String>,
}

pub(crate) struct InstanceCore {
    definition: Rc<ComponentDefinition>,
    scheduler: Rc<Scheduler>,
    self_weak: Weak<InstanceCore>,
    state: RefCell<InstanceState>,
    bodies: RefCell<HashMap<usize, StatementBody>>,
    stores: HashMap<String, Rc<dyn Store>>,
    render: RefCell<Option<RenderCallback>>,
}

pub struct ComponentInstance {
    core: Rc<InstanceCore>,
}

// Statement bodies and the render callback are opaque closures, so the
// instance formats through its component name and phase.
impl std::fmt::Debug for ComponentInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentInstance")
            .field("component", &self.core.definition.name)
            .field("phase", &self.core.state.borrow().phase)
            .finish()
    }
}

impl ComponentInstance {
    pub fn new(
        definition: Rc<ComponentDefinition>,
        scheduler: Rc<Scheduler>,
        options: InstanceOptions,
    ) -> Result<Self, RuntimeError> {
        let InstanceOptions {
            mut props,
            stores,
            bodies,
            render,
        } = options;

        for name in stores.keys() {
            if !definition.stores.contains(name) {
                return Err(RuntimeError::with_binding(
                    INV_UNKNOWN_STORE,
                    &format!("\"{}\" is not a declared store reference.", name),
                    &definition.name,
                    name,
                ));
            }
        }

        let mut registry = BindingRegistry::new(&definition.name);
        let mut dev_warnings = Vec::new();

        for prop in &definition.props {
            let initial = match props.remove(&prop.name) {
                Some(value) => value,
                None => match &prop.default {
                    Some(default) => Value::Data(default.clone()),
                    None => {
                        tracing::warn!(
                            component = %definition.name,
                            prop = %prop.name,
                            "missing prop with no default; value is undefined"
                        );
                        dev_warnings.push(format!(
                            "Component \"{}\" was created without expected prop \"{}\".",
                            definition.name, prop.name
                        ));
                        Value::Undefined
                    }
                },
            };
            registry.declare(&prop.name, BindingKind::Prop, initial, true)?;
        }
        for local in &definition.locals {
            registry.declare(
                &local.name,
                BindingKind::Local,
                Value::Undefined,
                local.mutable,
            )?;
        }
        for store_name in &definition.stores {
            if !stores.contains_key(store_name) {
                return Err(RuntimeError::with_binding(
                    INV_UNKNOWN_STORE,
                    &format!("No store supplied for reference \"{}\".", store_name),
                    &definition.name,
                    store_name,
                ));
            }
            registry.declare(
                &format!("${}", store_name),
                BindingKind::StoreValue,
                Value::Undefined,
                true,
            )?;
        }
        for name in &definition.implicit_locals {
            registry.declare(name, BindingKind::Local, Value::Undefined, true)?;
        }

        let state = InstanceState {
            registry,
            phase: Phase::Clean,
            subscriptions: SubscriptionManager::new(),
            dev_warnings,
            cursor: 0,
            late: HashSet::new(),
        };

        let core = Rc::new_cyclic(|weak| InstanceCore {
            definition: Rc::clone(&definition),
            scheduler,
            self_weak: weak.clone(),
            state: RefCell::new(state),
            bodies: RefCell::new(bodies),
            stores,
            render: RefCell::new(render),
        });

        // Module evaluation: the first instantiation runs module-only
        // statement bodies, exactly once per definition.
        if definition.module.begin_init() {
            for &index in &definition.module_only {
                let body = core.bodies.borrow_mut().remove(&index);
                if let Some(mut body) = body {
                    let result = body(&Scope { core: &core });
                    core.bodies.borrow_mut().insert(index, body);
                    result?;
                }
            }
        }

        // Store subscriptions: the initial callback fires synchronously, so
        // the prefixed binding is readable before this loop finishes.
        for store_name in &definition.stores {
            if let Some(store) = core.stores.get(store_name) {
                let prefixed = format!("${}", store_name);
                let weak = Rc::downgrade(&core);
                let callback_name = prefixed.clone();
                let unsubscribe = store.subscribe(Box::new(move |value| {
                    if let Some(instance) = weak.upgrade() {
                        instance.store_changed(&callback_name, value);
                    }
                }));
                core.state
                    .borrow_mut()
                    .subscriptions
                    .attach(StoreSubscription::new(&prefixed, unsubscribe));
            }
        }

        // Mount: every initial value counts as fresh, one flush is queued.
        {
            let mut state = core.state.borrow_mut();
            state.registry.mark_all_dirty();
            let schedule = state.phase == Phase::Clean;
            if schedule {
                state.phase = Phase::Pending;
            }
            drop(state);
            if schedule {
                core.schedule();
            }
        }

        Ok(ComponentInstance { core })
    }

    pub fn get(&self, name: &str) -> Result<Value, RuntimeError> {
        Scope { core: &self.core }.get(name)
    }

    /// External write, e.g. an event handler. Unknown names fail; writes to
    /// a destroyed instance are ignored.
    pub fn set(&self, name: &str, value: Value) -> Result<(), RuntimeError> {
        self.core.set(name, value)
    }

    /// Prop update from the component's consumer. `Value::Undefined`
    /// explicitly resets the prop to undefined, never to its default.
    pub fn set_prop(&self, name: &str, value: Value) -> Result<(), RuntimeError> {
        let kind = self.core.state.borrow().registry.kind(name);
        if kind != Some(BindingKind::Prop) {
            return Err(RuntimeError::with_binding(
                INV_UNKNOWN_BINDING,
                &format!(
                    "\"{}\" is not a prop of component \"{}\".",
                    name, self.core.definition.name
                ),
                &self.core.definition.name,
                name,
            ));
        }
        self.core.set(name, value)
    }

    /// Tears the instance down: every subscription's unsubscribe handle is
    /// invoked exactly once, and any queued flush becomes a no-op.
    pub fn destroy(&self) {
        let mut manager = {
            let mut state = self.core.state.borrow_mut();
            if state.phase == Phase::Destroyed {
                return;
            }
            state.phase = Phase::Destroyed;
            std::mem::take(&mut state.subscriptions)
        };
        manager.dispose_all();
    }

    pub fn is_destroyed(&self) -> bool {
        self.core.state.borrow().phase == Phase::Destroyed
    }

    pub fn dev_warnings(&self) -> Vec<String> {
        self.core.state.borrow().dev_warnings.clone()
    }

    pub fn definition(&self) -> &Rc<ComponentDefinition> {
        &self.core.definition
    }

    #[cfg(test)]
    pub(crate) fn phase(&self) -> Phase {
        self.core.state.borrow().phase
    }
}

impl InstanceCore {
    fn schedule(&self) {
        self.scheduler.enqueue(self.self_weak.clone());
    }

    /// Records a write landing while a flush is in progress. If a statement
    /// already passed in this pass reads the name, the current flush cannot
    /// honor it and the instance needs a follow-up flush. The statement at
    /// the cursor itself is excluded, so a statement rewriting its own
    /// inputs does not retrigger itself.
    fn note_flushing_write(&self, state: &mut InstanceState, name: &str) {
        if state.phase != Phase::Flushing {
            return;
        }
        let missed = self.definition.graph.order[..state.cursor]
            .iter()
            .any(|&pos| self.definition.reactive[pos].used.contains(name));
        if missed {
            state.late.insert(name.to_string());
        }
    }

    fn store_changed(&self, prefixed: &str, value: Value) {
        let mut state = self.state.borrow_mut();
        if state.phase == Phase::Destroyed {
            return;
        }
        // Store-value bindings are always writable at the registry level.
        let _ = state.registry.write(prefixed, value);
        self.note_flushing_write(&mut state, prefixed);
        let schedule = state.phase == Phase::Clean;
        if schedule {
            state.phase = Phase::Pending;
        }
        drop(state);
        if schedule {
            self.schedule();
        }
    }

    fn set(&self, name: &str, value: Value) -> Result<(), RuntimeError> {
        let kind = self.state.borrow().registry.kind(name);
        match kind {
            Some(BindingKind::StoreValue) => self.write_store(name, value),
            Some(_) => {
                let mut state = self.state.borrow_mut();
                if state.phase == Phase::Destroyed {
                    return Ok(());
                }
                state.registry.write(name, value)?;
                self.note_flushing_write(&mut state, name);
                let schedule = state.phase == Phase::Clean;
                if schedule {
                    state.phase = Phase::Pending;
                }
                drop(state);
                if schedule {
                    self.schedule();
                }
                Ok(())
            }
            None => {
                if self.definition.module_names.contains(name) {
                    self.definition.module.write(name, value);
                    return Ok(());
                }
                Err(RuntimeError::with_binding(
                    INV_UNKNOWN_BINDING,
                    &format!("Unknown binding \"{}\".", name),
                    &self.definition.name,
                    name,
                ))
            }
        }
    }

    /// Writes through the store; the registry write and dirty-marking happen
    /// in the subscription callback round-trip.
    fn write_store(&self, prefixed: &str, value: Value) -> Result<(), RuntimeError> {
        let store_name = prefixed.trim_start_matches('$');
        let store = self.stores.get(store_name).ok_or_else(|| {
            RuntimeError::with_binding(
                INV_UNKNOWN_STORE,
                &format!("No store supplied for reference \"{}\".", store_name),
                &self.definition.name,
                prefixed,
            )
        })?;
        if !store.writable() {
            return Err(RuntimeError::with_binding(
                INV_STORE_NOT_WRITABLE,
                &format!("Store \"{}\" has no set method.", store_name),
                &self.definition.name,
                prefixed,
            ));
        }
        if self.state.borrow().phase == Phase::Destroyed {
            return Ok(());
        }
        store.set(value);
        Ok(())
    }

    /// One flush: a single pass over the computed order. Eligibility is
    /// checked against the live dirty-set, so a statement run earlier in the
    /// pass can make a later one eligible; an executed statement is never
    /// revisited within the same flush. A write landing after its reader was
    /// already passed stays dirty, and the flush ends Pending with a
    /// follow-up flush enqueued instead of returning to Clean. Ends with at
    /// most one render notification, only when a markup-referenced binding
    /// changed.
    pub(crate) fn flush(&self) -> Result<(), RuntimeError> {
        {
            let mut state = self.state.borrow_mut();
            if state.phase != Phase::Pending {
                return Ok(());
            }
            state.phase = Phase::Flushing;
            state.cursor = 0;
            state.late.clear();
        }

        let definition = Rc::clone(&self.definition);
        let run = (|| -> Result<(), RuntimeError> {
            for (cursor, &pos) in definition.graph.order.iter().enumerate() {
                let statement = &definition.reactive[pos];
                let eligible = {
                    let mut state = self.state.borrow_mut();
                    state.cursor = cursor;
                    !statement.used.is_disjoint(state.registry.dirty())
                };
                if !eligible {
                    continue;
                }
                // The body is taken out of the map for the call, so the map
                // is never borrowed while user code runs.
                let body = self.bodies.borrow_mut().remove(&statement.index);
                if let Some(mut body) = body {
                    let result = body(&Scope { core: self });
                    self.bodies.borrow_mut().insert(statement.index, body);
                    result?;
                }
            }
            Ok(())
        })();

        match run {
            Ok(()) => {
                let (changed, reschedule) = {
                    let mut state = self.state.borrow_mut();
                    let mut changed: Vec<String> = state
                        .registry
                        .dirty()
                        .intersection(&definition.markup_bindings)
                        .cloned()
                        .collect();
                    changed.sort();
                    let late = std::mem::take(&mut state.late);
                    state.registry.clear_dirty();
                    for name in &late {
                        state.registry.mark_dirty(name);
                    }
                    let reschedule = !late.is_empty() && state.phase == Phase::Flushing;
                    if state.phase == Phase::Flushing {
                        state.phase = if reschedule { Phase::Pending } else { Phase::Clean };
                    }
                    (changed, reschedule)
                };
                if reschedule {
                    self.schedule();
                }
                if !changed.is_empty() {
                    if let Some(render) = self.render.borrow_mut().as_mut() {
                        render(&changed);
                    }
                }
                Ok(())
            }
            Err(err) => {
                // Partially applied: executed effects and the remaining
                // dirty-set stay as they are. No rollback.
                let mut state = self.state.borrow_mut();
                state.late.clear();
                if state.phase == Phase::Flushing {
                    state.phase = Phase::Clean;
                }
                Err(err)
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// STATEMENT SCOPE
// ═══════════════════════════════════════════════════════════════════════════════

/// The view a statement body gets of its component: instance bindings plus
/// the definition's module context.
pub struct Scope<'a> {
    core: &'a InstanceCore,
}

impl<'a> Scope<'a> {
    pub fn get(&self, name: &str) -> Result<Value, RuntimeError> {
        {
            let state = self.core.state.borrow();
            if state.registry.has(name) {
                return state.registry.read(name);
            }
        }
        if self.core.definition.module_names.contains(name) {
            return Ok(self.core.definition.module.read(name));
        }
        Err(RuntimeError::with_binding(
            INV_UNKNOWN_BINDING,
            &format!("Unknown binding \"{}\".", name),
            &self.core.definition.name,
            name,
        ))
    }

    /// Write from inside a statement body. Module names go to the shared
    /// module record without reactivity; store-prefixed names go through the
    /// store; an entirely undeclared name implicitly becomes a local.
    pub fn set(&self, name: &str, value: Value) -> Result<(), RuntimeError> {
        if self.core.definition.module_names.contains(name) {
            self.core.definition.module.write(name, value);
            return Ok(());
        }
        if self.core.state.borrow().registry.kind(name) == Some(BindingKind::StoreValue) {
            return self.core.write_store(name, value);
        }
        let mut state = self.core.state.borrow_mut();
        if state.phase == Phase::Destroyed {
            return Ok(());
        }
        if !state.registry.has(name) {
            state
                .registry
                .declare(name, BindingKind::Local, Value::Undefined, true)?;
        }
        state.registry.write(name, value)?;
        self.core.note_flushing_write(&mut state, name);
        let schedule = state.phase == Phase::Clean;
        if schedule {
            state.phase = Phase::Pending;
        }
        drop(state);
        if schedule {
            self.core.schedule();
        }
        Ok(())
    }
}
