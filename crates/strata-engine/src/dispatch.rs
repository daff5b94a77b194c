//! Proceed-chain dispatch.
//!
//! A call builds a fresh plan from the activation order (most specific
//! first) and the operation's table, then runs it:
//!
//! 1. befores, most specific layer first;
//! 2. the around chain, most specific link outermost, ending in the base;
//! 3. afters, most specific layer first, each replacing the result.
//!
//! Each layer takes part at its most specific occurrence only, even when it
//! was activated more than once. With nothing applicable the base is called
//! directly.
//!
//! The first failure stops the call. Errors from user code come back as
//! [`DispatchError::Chain`] naming the operation, layer and phase; errors
//! that already are a [`DispatchError`] (from a nested call, or returned by
//! `proceed`) are passed through as they are.

use std::cell::Cell;
use std::fmt;

use strata_core::{DispatchError, Layer, Phase, Result};
use tracing::{debug, trace};

use crate::global;
use crate::registry::{AfterFn, AroundFn, BaseFn, BeforeFn, Operation, OperationTable, Registry};
use crate::scope;
use crate::stack::ActivationStack;

thread_local! {
    static DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// Counts nested dispatches on this thread for as long as it lives.
struct DepthGuard;

impl DepthGuard {
    fn enter(operation: &str, limit: usize) -> Result<Self> {
        DEPTH.with(|depth| {
            let current = depth.get();
            if current >= limit {
                return Err(DispatchError::DepthExceeded {
                    operation: operation.to_owned(),
                    limit,
                });
            }
            depth.set(current + 1);
            Ok(Self)
        })
    }
}

impl Drop for DepthGuard {
    fn drop(&mut self) {
        DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

/// Progress of a single dispatch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatchState {
    /// Plan built, nothing run yet.
    NotStarted,
    /// Running before specializations.
    RunningBefores,
    /// Inside the around chain; `link` is the index of the running link,
    /// equal to the number of around links when the base runs.
    RunningAroundChain {
        /// Index of the running link.
        link: usize,
    },
    /// Running after specializations.
    RunningAfters,
    /// Finished with a result.
    Completed,
    /// Stopped by an error.
    Errored,
}

impl fmt::Display for DispatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStarted => f.write_str("not_started"),
            Self::RunningBefores => f.write_str("running_befores"),
            Self::RunningAroundChain { link } => write!(f, "running_around_chain[{link}]"),
            Self::RunningAfters => f.write_str("running_afters"),
            Self::Completed => f.write_str("completed"),
            Self::Errored => f.write_str("errored"),
        }
    }
}

struct Link<'a, A, R> {
    layer: &'a Layer,
    func: &'a AroundFn<A, R>,
}

struct ChainCtx<'a, A, R> {
    operation: &'a str,
    base: &'a BaseFn<A, R>,
    arounds: usize,
    trace: bool,
    state: Cell<DispatchState>,
}

impl<A, R> ChainCtx<'_, A, R> {
    fn transition(&self, next: DispatchState) {
        if self.state.get() == DispatchState::Errored {
            return;
        }
        self.state.set(next);
        if self.trace {
            trace!(operation = self.operation, state = %next, "dispatch state");
        }
    }

    fn enter(&self, layer: Option<&Layer>, phase: Phase) {
        if self.trace {
            trace!(
                operation = self.operation,
                layer = layer.map_or("base", Layer::identifier),
                %phase,
                "running link"
            );
        }
    }
}

/// Continuation handed to an around specialization.
///
/// Consuming it with [`proceed`](Self::proceed) or
/// [`proceed_with`](Self::proceed_with) runs the rest of the chain: the next
/// less specific around, or the base after the last one. Dropping it
/// without proceeding short-circuits everything below.
pub struct Proceed<'a, A, R> {
    links: &'a [Link<'a, A, R>],
    args: &'a A,
    ctx: &'a ChainCtx<'a, A, R>,
}

impl<'a, A, R> Proceed<'a, A, R> {
    /// Continue with the arguments this link received.
    pub fn proceed(self) -> Result<R> {
        let args = self.args;
        self.run(args)
    }

    /// Continue with replacement arguments.
    ///
    /// Only the rest of the chain sees `args`; befores, afters and the
    /// caller keep the originals.
    pub fn proceed_with(self, args: A) -> Result<R> {
        self.run(&args)
    }

    /// Arguments this link received.
    pub fn args(&self) -> &'a A {
        self.args
    }

    /// Around links left before the base.
    pub fn remaining(&self) -> usize {
        self.links.len()
    }

    /// Name of the operation being dispatched.
    pub fn operation(&self) -> &'a str {
        self.ctx.operation
    }

    fn run(self, args: &A) -> Result<R> {
        let ctx = self.ctx;
        match self.links.split_first() {
            Some((link, rest)) => {
                ctx.transition(DispatchState::RunningAroundChain {
                    link: ctx.arounds - self.links.len(),
                });
                ctx.enter(Some(link.layer), Phase::Around);
                let next = Proceed {
                    links: rest,
                    args,
                    ctx,
                };
                (link.func)(args, next).map_err(|err| {
                    DispatchError::chain(ctx.operation, Some(link.layer.identifier()), Phase::Around, err)
                })
            }
            None => {
                ctx.transition(DispatchState::RunningAroundChain { link: ctx.arounds });
                ctx.enter(None, Phase::Base);
                (ctx.base)(args).map_err(|err| DispatchError::chain(ctx.operation, None, Phase::Base, err))
            }
        }
    }
}

impl<A, R> fmt::Debug for Proceed<'_, A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Proceed")
            .field("operation", &self.ctx.operation)
            .field("remaining", &self.links.len())
            .finish_non_exhaustive()
    }
}

struct Plan<'a, A, R> {
    befores: Vec<(&'a Layer, &'a BeforeFn<A>)>,
    arounds: Vec<Link<'a, A, R>>,
    afters: Vec<(&'a Layer, &'a AfterFn<A, R>)>,
}

impl<'a, A, R> Plan<'a, A, R> {
    fn build(table: &'a OperationTable<A, R>, order: &[Layer]) -> Self {
        let mut plan = Self {
            befores: Vec::new(),
            arounds: Vec::new(),
            afters: Vec::new(),
        };
        if table.layers.is_empty() {
            return plan;
        }
        let mut seen: Vec<&Layer> = Vec::with_capacity(order.len());
        for layer in order {
            if seen.contains(&layer) {
                continue;
            }
            seen.push(layer);
            let Some((layer, specs)) = table.layers.get_key_value(layer) else {
                continue;
            };
            plan.befores.extend(
                specs
                    .before
                    .iter()
                    .rev()
                    .filter(|s| s.applies(order))
                    .map(|s| (layer, s.func.as_ref())),
            );
            plan.arounds.extend(
                specs
                    .around
                    .iter()
                    .rev()
                    .filter(|s| s.applies(order))
                    .map(|s| Link {
                        layer,
                        func: s.func.as_ref(),
                    }),
            );
            plan.afters.extend(
                specs
                    .after
                    .iter()
                    .filter(|s| s.applies(order))
                    .map(|s| (layer, s.func.as_ref())),
            );
        }
        plan
    }

    fn is_empty(&self) -> bool {
        self.befores.is_empty() && self.arounds.is_empty() && self.afters.is_empty()
    }

    fn run(&self, ctx: &ChainCtx<'_, A, R>, args: &A) -> Result<R> {
        ctx.transition(DispatchState::RunningBefores);
        for &(layer, before) in &self.befores {
            ctx.enter(Some(layer), Phase::Before);
            before(args).map_err(|err| {
                DispatchError::chain(ctx.operation, Some(layer.identifier()), Phase::Before, err)
            })?;
        }

        let chain = Proceed {
            links: &self.arounds,
            args,
            ctx,
        };
        let mut result = chain.proceed()?;

        ctx.transition(DispatchState::RunningAfters);
        for &(layer, after) in &self.afters {
            ctx.enter(Some(layer), Phase::After);
            result = after(args, result).map_err(|err| {
                DispatchError::chain(ctx.operation, Some(layer.identifier()), Phase::After, err)
            })?;
        }
        Ok(result)
    }
}

impl Registry {
    /// Invoke `op` with `args` under the caller's current activation.
    ///
    /// The activation order is the implicit thread or task stack on top of
    /// the globally active layers.
    pub fn call<A: 'static, R: 'static>(&self, op: &Operation<A, R>, args: &A) -> Result<R> {
        let order = scope::current_activation_order();
        self.call_in_order(&order, op, args)
    }

    /// Invoke `op` with `args` under an explicit activation stack.
    ///
    /// Globally active layers still apply below the stack's frames.
    pub fn call_with<A: 'static, R: 'static>(
        &self,
        stack: &ActivationStack,
        op: &Operation<A, R>,
        args: &A,
    ) -> Result<R> {
        let order = stack.resolve(&global::global_layers());
        self.call_in_order(&order, op, args)
    }

    /// Invoke `op` with `args` under a resolved activation order, most
    /// specific layer first.
    pub fn call_in_order<A: 'static, R: 'static>(
        &self,
        order: &[Layer],
        op: &Operation<A, R>,
        args: &A,
    ) -> Result<R> {
        let table = self.table::<A, R>(op.name())?;
        let _depth = DepthGuard::enter(op.name(), self.settings().max_depth)?;

        let plan = Plan::build(table, order);
        let result = if plan.is_empty() {
            (table.base)(args).map_err(|err| DispatchError::chain(op.name(), None, Phase::Base, err))
        } else {
            let ctx = ChainCtx {
                operation: op.name(),
                base: table.base.as_ref(),
                arounds: plan.arounds.len(),
                trace: self.settings().trace_links,
                state: Cell::new(DispatchState::NotStarted),
            };
            let result = plan.run(&ctx, args);
            ctx.transition(if result.is_ok() {
                DispatchState::Completed
            } else {
                DispatchState::Errored
            });
            result
        };

        if let Err(err) = &result {
            debug!(operation = op.name(), kind = err.error_kind(), error = %err, "dispatch failed");
        }
        result
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
