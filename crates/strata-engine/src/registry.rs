//! Specialization registry.
//!
//! A [`Registry`] owns every base operation and the per-layer
//! specializations attached to it. Operations are keyed by name and carry
//! their argument and result types; the typed [`Operation`] handle returned
//! by [`Registry::register_base`] is what callers dispatch through.
//!
//! Registration takes `&mut self` and happens during setup. Once built, a
//! registry is shared read-only (for example behind an `Arc`) and any number
//! of threads can dispatch through it concurrently.

use std::any::{Any, type_name};
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use strata_core::{DispatchError, Layer, Result, SpecializationKind};
use strata_settings::DispatchSettings;
use tracing::debug;

use crate::dispatch::Proceed;

/// Base implementation of an operation.
pub type BaseFn<A, R> = dyn Fn(&A) -> anyhow::Result<R> + Send + Sync;
/// Before specialization: side effects only.
pub type BeforeFn<A> = dyn Fn(&A) -> anyhow::Result<()> + Send + Sync;
/// Around specialization: decides whether and how to proceed.
pub type AroundFn<A, R> = dyn Fn(&A, Proceed<'_, A, R>) -> anyhow::Result<R> + Send + Sync;
/// After specialization: sees the result and returns the one to keep.
pub type AfterFn<A, R> = dyn Fn(&A, R) -> anyhow::Result<R> + Send + Sync;
/// Activation guard: given the activation order (most specific first),
/// decides whether a specialization applies.
pub type GuardFn = dyn Fn(&[Layer]) -> bool + Send + Sync;

/// Typed handle to a registered operation.
pub struct Operation<A, R> {
    name: Arc<str>,
    _signature: PhantomData<fn(&A) -> R>,
}

impl<A, R> Operation<A, R> {
    /// Operation name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<A, R> Clone for Operation<A, R> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            _signature: PhantomData,
        }
    }
}

impl<A, R> fmt::Debug for Operation<A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("name", &self.name)
            .field("args", &type_name::<A>())
            .field("result", &type_name::<R>())
            .finish()
    }
}

pub(crate) enum Behavior<A, R> {
    Before(Box<BeforeFn<A>>),
    Around(Box<AroundFn<A, R>>),
    After(Box<AfterFn<A, R>>),
}

/// One behavior variation, ready to be attached to a layer.
///
/// Built with [`before`](Self::before), [`around`](Self::around) or
/// [`after`](Self::after), optionally restricted with [`when`](Self::when),
/// then handed to [`Registry::register_specialization`].
pub struct Specialization<A, R> {
    behavior: Behavior<A, R>,
    guard: Option<Box<GuardFn>>,
}

impl<A: 'static, R: 'static> Specialization<A, R> {
    /// Run `f` before the chain. Its `Ok` value is discarded.
    pub fn before<F>(f: F) -> Self
    where
        F: Fn(&A) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self::unguarded(Behavior::Before(Box::new(f)))
    }

    /// Wrap the rest of the chain.
    pub fn around<F>(f: F) -> Self
    where
        F: Fn(&A, Proceed<'_, A, R>) -> anyhow::Result<R> + Send + Sync + 'static,
    {
        Self::unguarded(Behavior::Around(Box::new(f)))
    }

    /// Run `f` after the chain with its result.
    pub fn after<F>(f: F) -> Self
    where
        F: Fn(&A, R) -> anyhow::Result<R> + Send + Sync + 'static,
    {
        Self::unguarded(Behavior::After(Box::new(f)))
    }

    fn unguarded(behavior: Behavior<A, R>) -> Self {
        Self {
            behavior,
            guard: None,
        }
    }

    /// Only apply when `guard` accepts the current activation order.
    #[must_use]
    pub fn when<G>(mut self, guard: G) -> Self
    where
        G: Fn(&[Layer]) -> bool + Send + Sync + 'static,
    {
        self.guard = Some(Box::new(guard));
        self
    }

    /// Kind of this specialization.
    pub fn kind(&self) -> SpecializationKind {
        match self.behavior {
            Behavior::Before(_) => SpecializationKind::Before,
            Behavior::Around(_) => SpecializationKind::Around,
            Behavior::After(_) => SpecializationKind::After,
        }
    }
}

impl<A, R> fmt::Debug for Specialization<A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.behavior {
            Behavior::Before(_) => "before",
            Behavior::Around(_) => "around",
            Behavior::After(_) => "after",
        };
        f.debug_struct("Specialization")
            .field("kind", &kind)
            .field("guarded", &self.guard.is_some())
            .finish()
    }
}

pub(crate) struct Guarded<F: ?Sized> {
    pub(crate) func: Box<F>,
    guard: Option<Box<GuardFn>>,
}

impl<F: ?Sized> Guarded<F> {
    pub(crate) fn applies(&self, order: &[Layer]) -> bool {
        self.guard.as_ref().is_none_or(|guard| guard(order))
    }
}

/// Specializations one layer contributes to one operation, each list in
/// registration order.
pub(crate) struct LayerSpecializations<A, R> {
    pub(crate) before: Vec<Guarded<BeforeFn<A>>>,
    pub(crate) around: Vec<Guarded<AroundFn<A, R>>>,
    pub(crate) after: Vec<Guarded<AfterFn<A, R>>>,
}

impl<A, R> Default for LayerSpecializations<A, R> {
    fn default() -> Self {
        Self {
            before: Vec::new(),
            around: Vec::new(),
            after: Vec::new(),
        }
    }
}

impl<A, R> LayerSpecializations<A, R> {
    fn len(&self) -> usize {
        self.before.len() + self.around.len() + self.after.len()
    }
}

pub(crate) struct OperationTable<A, R> {
    pub(crate) base: Box<BaseFn<A, R>>,
    pub(crate) layers: HashMap<Layer, LayerSpecializations<A, R>>,
}

/// Type-erased view of an [`OperationTable`] for bookkeeping that does not
/// need the signature.
trait ErasedTable: Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn remove_layer(&mut self, layer: &Layer) -> bool;
    fn specialization_count(&self) -> usize;
    fn layer_count(&self) -> usize;
}

impl<A: 'static, R: 'static> ErasedTable for OperationTable<A, R> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn remove_layer(&mut self, layer: &Layer) -> bool {
        self.layers.remove(layer).is_some()
    }

    fn specialization_count(&self) -> usize {
        self.layers.values().map(LayerSpecializations::len).sum()
    }

    fn layer_count(&self) -> usize {
        self.layers.len()
    }
}

/// Registry of base operations and their layer specializations.
pub struct Registry {
    operations: HashMap<String, Box<dyn ErasedTable>>,
    settings: DispatchSettings,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// Create an empty registry with default dispatch settings.
    pub fn new() -> Self {
        Self::from_settings(DispatchSettings::default())
    }

    /// Create an empty registry with the given dispatch settings.
    ///
    /// Pass `get_settings().dispatch.clone()` to honor the user's settings
    /// file and environment.
    pub fn from_settings(settings: DispatchSettings) -> Self {
        Self {
            operations: HashMap::new(),
            settings,
        }
    }

    /// Dispatch settings in effect.
    pub fn settings(&self) -> &DispatchSettings {
        &self.settings
    }

    /// Register a base operation under `name`.
    ///
    /// Fails with [`DispatchError::DuplicateOperation`] if the name is taken.
    pub fn register_base<A, R, F>(&mut self, name: impl Into<String>, base: F) -> Result<Operation<A, R>>
    where
        A: 'static,
        R: 'static,
        F: Fn(&A) -> anyhow::Result<R> + Send + Sync + 'static,
    {
        let name = name.into();
        if self.operations.contains_key(&name) {
            return Err(DispatchError::DuplicateOperation { operation: name });
        }
        let table = OperationTable::<A, R> {
            base: Box::new(base),
            layers: HashMap::new(),
        };
        debug!(
            operation = %name,
            args = type_name::<A>(),
            result = type_name::<R>(),
            "registered base operation"
        );
        let handle = Operation {
            name: Arc::from(name.as_str()),
            _signature: PhantomData,
        };
        let _ = self.operations.insert(name, Box::new(table));
        Ok(handle)
    }

    /// Look up a registered operation by name.
    ///
    /// Fails with [`DispatchError::UnknownOperation`] if nothing is
    /// registered under `name`, and with [`DispatchError::SignatureMismatch`]
    /// if it was registered with other argument or result types.
    pub fn operation<A: 'static, R: 'static>(&self, name: &str) -> Result<Operation<A, R>> {
        let _ = self.table::<A, R>(name)?;
        Ok(Operation {
            name: Arc::from(name),
            _signature: PhantomData,
        })
    }

    /// Attach `specialization` to `op` for `layer`.
    ///
    /// Repeated registrations for the same operation, layer and kind are all
    /// kept. The newest before and around run first; the newest after runs
    /// last.
    pub fn register_specialization<A: 'static, R: 'static>(
        &mut self,
        op: &Operation<A, R>,
        layer: &Layer,
        specialization: Specialization<A, R>,
    ) -> Result<()> {
        let kind = specialization.kind();
        let table = self.table_mut::<A, R>(op.name())?;
        let slot = table.layers.entry(layer.clone()).or_default();
        let Specialization { behavior, guard } = specialization;
        let guarded = guard.is_some();
        match behavior {
            Behavior::Before(func) => slot.before.push(Guarded { func, guard }),
            Behavior::Around(func) => slot.around.push(Guarded { func, guard }),
            Behavior::After(func) => slot.after.push(Guarded { func, guard }),
        }
        debug!(operation = op.name(), layer = %layer, %kind, guarded, "registered specialization");
        Ok(())
    }

    /// Register a before specialization of `op` for `layer`.
    pub fn register_before<A, R, F>(&mut self, op: &Operation<A, R>, layer: &Layer, f: F) -> Result<()>
    where
        A: 'static,
        R: 'static,
        F: Fn(&A) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.register_specialization(op, layer, Specialization::before(f))
    }

    /// Register an around specialization of `op` for `layer`.
    pub fn register_around<A, R, F>(&mut self, op: &Operation<A, R>, layer: &Layer, f: F) -> Result<()>
    where
        A: 'static,
        R: 'static,
        F: Fn(&A, Proceed<'_, A, R>) -> anyhow::Result<R> + Send + Sync + 'static,
    {
        self.register_specialization(op, layer, Specialization::around(f))
    }

    /// Register an after specialization of `op` for `layer`.
    pub fn register_after<A, R, F>(&mut self, op: &Operation<A, R>, layer: &Layer, f: F) -> Result<()>
    where
        A: 'static,
        R: 'static,
        F: Fn(&A, R) -> anyhow::Result<R> + Send + Sync + 'static,
    {
        self.register_specialization(op, layer, Specialization::after(f))
    }

    /// Drop every specialization `layer` contributes to `op`.
    ///
    /// Befores, arounds and afters go together: closures carry no identity
    /// to single one out. Returns whether anything was removed.
    pub fn unregister_layer<A: 'static, R: 'static>(
        &mut self,
        op: &Operation<A, R>,
        layer: &Layer,
    ) -> Result<bool> {
        let removed = self.table_mut::<A, R>(op.name())?.layers.remove(layer).is_some();
        if removed {
            debug!(operation = op.name(), layer = %layer, "unregistered layer");
        }
        Ok(removed)
    }

    /// Drop every specialization `layer` contributes to any operation.
    ///
    /// Returns the number of operations that lost specializations.
    pub fn remove_layer(&mut self, layer: &Layer) -> usize {
        let affected = self
            .operations
            .values_mut()
            .map(|table| usize::from(table.remove_layer(layer)))
            .sum();
        debug!(layer = %layer, affected, "removed layer from registry");
        affected
    }

    /// Layers with at least one specialization of `op`, oldest layer first.
    pub fn layers_for<A: 'static, R: 'static>(&self, op: &Operation<A, R>) -> Result<Vec<Layer>> {
        let mut layers: Vec<Layer> = self.table::<A, R>(op.name())?.layers.keys().cloned().collect();
        layers.sort_by(|a, b| a.id().cmp(b.id()));
        Ok(layers)
    }

    /// Whether an operation named `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.operations.contains_key(name)
    }

    /// Registered operation names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.operations.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Number of registered operations.
    pub fn count(&self) -> usize {
        self.operations.len()
    }

    pub(crate) fn table<A: 'static, R: 'static>(&self, name: &str) -> Result<&OperationTable<A, R>> {
        self.operations
            .get(name)
            .ok_or_else(|| DispatchError::UnknownOperation {
                operation: name.to_owned(),
            })?
            .as_any()
            .downcast_ref()
            .ok_or_else(|| DispatchError::SignatureMismatch {
                operation: name.to_owned(),
            })
    }

    fn table_mut<A: 'static, R: 'static>(&mut self, name: &str) -> Result<&mut OperationTable<A, R>> {
        self.operations
            .get_mut(name)
            .ok_or_else(|| DispatchError::UnknownOperation {
                operation: name.to_owned(),
            })?
            .as_any_mut()
            .downcast_mut()
            .ok_or_else(|| DispatchError::SignatureMismatch {
                operation: name.to_owned(),
            })
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for name in self.names() {
            if let Some(table) = self.operations.get(name) {
                let _ = map.entry(
                    &name,
                    &format_args!(
                        "{} layers, {} specializations",
                        table.layer_count(),
                        table.specialization_count()
                    ),
                );
            }
        }
        map.finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
