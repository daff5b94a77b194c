//! Implicit, scoped layer activation.
//!
//! Every thread has its own [`ActivationStack`]. Inside
//! [`activation_scope`] or [`with_layers_async`] the stack is bound to the
//! async task instead (a tokio task-local), so a future that suspends and
//! resumes on another worker thread keeps its own activation state, and
//! concurrently running tasks never see each other's frames.
//!
//! [`activate`] and [`deactivate`] push a frame and return an
//! [`ActivationGuard`] that pops it exactly once: on drop (including
//! unwinding) or on an explicit [`release`](ActivationGuard::release).
//! Guards are `!Send`; in async code use [`with_layers_async`], whose frame
//! is dropped together with the future, so cancellation restores the
//! previous state.

use std::borrow::Borrow;
use std::cell::RefCell;
use std::future::Future;
use std::marker::PhantomData;

use strata_core::{Layer, Result};
use tokio::task::futures::TaskLocalFuture;
use tracing::{error, trace};

use crate::global;
use crate::stack::{ActivationStack, FrameToken};

thread_local! {
    static THREAD_STACK: RefCell<ActivationStack> = RefCell::new(ActivationStack::new());
}

tokio::task_local! {
    static TASK_STACK: RefCell<ActivationStack>;
}

fn with_current<T>(f: impl FnOnce(&mut ActivationStack) -> T) -> T {
    if TASK_STACK.try_with(|_| ()).is_ok() {
        TASK_STACK.with(|cell| f(&mut cell.borrow_mut()))
    } else {
        THREAD_STACK.with(|cell| f(&mut cell.borrow_mut()))
    }
}

fn collect_layers<I>(layers: I) -> Vec<Layer>
where
    I: IntoIterator,
    I::Item: Borrow<Layer>,
{
    layers.into_iter().map(|layer| layer.borrow().clone()).collect()
}

/// Scope guard for one activation or deactivation frame.
#[must_use = "dropping the guard immediately ends the activation"]
#[derive(Debug)]
pub struct ActivationGuard {
    token: FrameToken,
    released: bool,
    // Frames live in thread/task-local storage.
    _not_send: PhantomData<*const ()>,
}

impl ActivationGuard {
    fn new(token: FrameToken) -> Self {
        Self {
            token,
            released: false,
            _not_send: PhantomData,
        }
    }

    /// Token of the frame this guard owns.
    pub fn token(&self) -> FrameToken {
        self.token
    }

    /// Pop the frame now.
    ///
    /// Fails with [`UnbalancedActivation`](strata_core::DispatchError::UnbalancedActivation)
    /// if a frame pushed later is still active; the stack is left untouched
    /// and the guard stays armed. Releasing twice is a no-op.
    pub fn release(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        with_current(|stack| stack.pop(self.token))?;
        self.released = true;
        trace!(frame = self.token.get(), "activation frame released");
        Ok(())
    }
}

impl Drop for ActivationGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(err) = with_current(|stack| stack.pop(self.token)) {
            if std::thread::panicking() {
                error!(frame = self.token.get(), error = %err, "activation frame dropped out of order during unwind");
            } else {
                panic!("{err}");
            }
        }
    }
}

/// Activate `layers` together for the lifetime of the returned guard.
///
/// The layers become visible atomically as one frame, more specific than
/// everything already active. Within the frame the first layer given is the
/// most specific.
///
/// `layers` is collected before the stack is touched, so the iterator may
/// itself query activation state (for example through [`is_active`]).
///
/// Outside a task-bound stack the guard writes to the thread's stack. Two
/// futures polled on the same thread (for example under `tokio::join!`)
/// that hold guards across an `.await` therefore see each other's layers
/// and can release frames out of order. Give each future its own frame with
/// [`with_layers_async`] instead.
pub fn activate<I>(layers: I) -> ActivationGuard
where
    I: IntoIterator,
    I::Item: Borrow<Layer>,
{
    let layers = collect_layers(layers);
    let token = with_current(|stack| stack.push(layers));
    trace!(frame = token.get(), "activation frame pushed");
    ActivationGuard::new(token)
}

/// Hide `layers` (including globally active ones) for the lifetime of the
/// returned guard.
pub fn deactivate<I>(layers: I) -> ActivationGuard
where
    I: IntoIterator,
    I::Item: Borrow<Layer>,
{
    let layers = collect_layers(layers);
    let token = with_current(|stack| stack.push_deactivation(layers));
    trace!(frame = token.get(), "deactivation frame pushed");
    ActivationGuard::new(token)
}

/// Run `body` with `layers` active, deactivating them afterwards even if
/// `body` panics.
pub fn with_layers<I, T>(layers: I, body: impl FnOnce() -> T) -> T
where
    I: IntoIterator,
    I::Item: Borrow<Layer>,
{
    let _guard = activate(layers);
    body()
}

/// Run `body` with `layers` hidden.
pub fn without_layers<I, T>(layers: I, body: impl FnOnce() -> T) -> T
where
    I: IntoIterator,
    I::Item: Borrow<Layer>,
{
    let _guard = deactivate(layers);
    body()
}

/// Bind a copy of the current activation stack to `future`.
///
/// The copy is taken when this function is called, so wrapping a future
/// before handing it to `tokio::spawn` carries the spawner's activation
/// state into the new task.
pub fn activation_scope<F>(future: F) -> TaskLocalFuture<RefCell<ActivationStack>, F>
where
    F: Future,
{
    let stack = current_stack();
    TASK_STACK.scope(RefCell::new(stack), future)
}

/// Run `future` with `layers` active in a task-bound stack.
///
/// The frame belongs to the future: it is gone as soon as the future
/// completes or is dropped.
pub fn with_layers_async<I, F>(layers: I, future: F) -> TaskLocalFuture<RefCell<ActivationStack>, F>
where
    I: IntoIterator,
    I::Item: Borrow<Layer>,
    F: Future,
{
    let mut stack = current_stack();
    let _ = stack.push(layers);
    TASK_STACK.scope(RefCell::new(stack), future)
}

/// Clone of the activation stack in effect for the caller.
pub fn current_stack() -> ActivationStack {
    with_current(|stack| stack.clone())
}

/// Active layers for the caller, most specific first, including global
/// layers.
pub fn current_activation_order() -> Vec<Layer> {
    let globals = global::global_layers();
    with_current(|stack| stack.resolve(&globals))
}

/// Whether `layer` is active for the caller.
pub fn is_active(layer: &Layer) -> bool {
    current_activation_order().contains(layer)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use strata_core::DispatchError;
    use strata_logging::capture_logs;
    use tracing::Level;

    #[test]
    fn activate_and_drop_restores() {
        let l = Layer::new("l");
        assert!(!is_active(&l));
        {
            let _guard = activate([&l]);
            assert!(is_active(&l));
        }
        assert!(!is_active(&l));
    }

    #[test]
    fn with_layers_nests() {
        let l1 = Layer::new("l1");
        let l2 = Layer::new("l2");
        let order = with_layers([&l1], || with_layers([&l2], current_activation_order));
        assert_eq!(order, vec![l2, l1]);
        assert!(current_activation_order().is_empty());
    }

    #[test]
    fn without_layers_hides() {
        let l = Layer::new("l");
        with_layers([&l], || {
            assert!(without_layers([&l], || !is_active(&l)));
            assert!(is_active(&l));
        });
    }

    #[test]
    fn release_out_of_order_is_reported() {
        let l1 = Layer::new("l1");
        let l2 = Layer::new("l2");
        let mut outer = activate([&l1]);
        let inner = activate([&l2]);

        assert_matches!(
            outer.release(),
            Err(DispatchError::UnbalancedActivation { .. })
        );
        assert_eq!(current_activation_order(), vec![l2.clone(), l1.clone()]);

        drop(inner);
        outer.release().unwrap();
        outer.release().unwrap();
        assert!(current_activation_order().is_empty());
    }

    #[test]
    #[should_panic(expected = "released out of order")]
    fn dropping_out_of_order_panics() {
        let outer = activate([Layer::new("outer")]);
        let _inner = activate([Layer::new("inner")]);
        drop(outer);
    }

    #[test]
    fn out_of_order_drop_during_unwind_is_logged() {
        let (logs, _log_guard) = capture_logs();
        let l1 = Layer::new("l1");
        let l2 = Layer::new("l2");
        let outer = activate([&l1]);
        let outer_token = outer.token();
        let inner = activate([&l2]);

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _outer = outer;
            panic!("boom");
        }));

        assert!(result.is_err());
        assert!(logs.has_event(Level::ERROR, "dropped out of order during unwind"));
        assert_eq!(current_activation_order(), vec![l2.clone(), l1.clone()]);

        drop(inner);
        assert_eq!(current_stack().top(), Some(outer_token));
        with_current(|stack| stack.pop(outer_token)).unwrap();
        assert!(current_activation_order().is_empty());
    }

    #[test]
    fn guard_token_names_its_frame() {
        assert_eq!(current_stack().top(), None);
        let outer = activate([Layer::new("outer")]);
        assert_eq!(current_stack().top(), Some(outer.token()));
        let inner = deactivate([Layer::new("outer")]);
        assert_eq!(current_stack().top(), Some(inner.token()));
        assert_ne!(inner.token(), outer.token());
        drop(inner);
        assert_eq!(current_stack().top(), Some(outer.token()));
    }

    #[test]
    fn activation_iterator_may_read_activation_state() {
        let a = Layer::new("a");
        let b = Layer::new("b");
        let pool = [a.clone(), b.clone()];
        let _first = activate([&a]);

        let _rest = activate(pool.iter().filter(|layer| !is_active(layer)));
        assert_eq!(current_activation_order(), vec![b.clone(), a.clone()]);

        let _hidden = deactivate(pool.iter().filter(|layer| is_active(layer)));
        assert!(current_activation_order().is_empty());
    }

    #[test]
    fn panic_inside_scope_still_pops() {
        let l = Layer::new("l");
        let result = std::panic::catch_unwind(|| {
            with_layers([&l], || panic!("boom"));
        });
        assert!(result.is_err());
        assert!(!is_active(&l));
    }

    #[test]
    fn threads_do_not_share_stacks() {
        let l = Layer::new("l");
        let _guard = activate([&l]);
        let seen = std::thread::spawn({
            let l = l.clone();
            move || is_active(&l)
        })
        .join()
        .unwrap();
        assert!(!seen);
        assert!(is_active(&l));
    }

    #[tokio::test]
    async fn with_layers_async_survives_suspension() {
        let l = Layer::new("l");
        let seen = with_layers_async([&l], async {
            tokio::task::yield_now().await;
            is_active(&l)
        })
        .await;
        assert!(seen);
        assert!(!is_active(&l));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_tasks_are_isolated() {
        let a = Layer::new("a");
        let b = Layer::new("b");

        let task_a = tokio::spawn(with_layers_async([a.clone()], {
            let (a, b) = (a.clone(), b.clone());
            async move {
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
                (is_active(&a), is_active(&b))
            }
        }));
        let task_b = tokio::spawn(with_layers_async([b.clone()], {
            let (a, b) = (a.clone(), b.clone());
            async move {
                tokio::task::yield_now().await;
                (is_active(&a), is_active(&b))
            }
        }));

        assert_eq!(task_a.await.unwrap(), (true, false));
        assert_eq!(task_b.await.unwrap(), (false, true));
    }

    #[tokio::test]
    async fn joined_futures_keep_separate_frames() {
        let a = Layer::new("a");
        let b = Layer::new("b");

        let (seen_a, seen_b) = tokio::join!(
            with_layers_async([&a], async {
                tokio::task::yield_now().await;
                current_activation_order()
            }),
            with_layers_async([&b], async {
                tokio::task::yield_now().await;
                current_activation_order()
            }),
        );

        assert_eq!(seen_a, vec![a]);
        assert_eq!(seen_b, vec![b]);
        assert!(current_activation_order().is_empty());
    }

    #[tokio::test]
    async fn activation_scope_inherits_spawner_state() {
        let l = Layer::new("l");
        let fut = with_layers([&l], || {
            activation_scope({
                let l = l.clone();
                async move { is_active(&l) }
            })
        });
        assert!(!is_active(&l));
        assert!(tokio::spawn(fut).await.unwrap());
    }

    #[tokio::test]
    async fn cancelled_future_leaves_no_frame() {
        let l = Layer::new("l");
        let fut = with_layers_async([&l], std::future::pending::<()>());
        let timed_out = tokio::time::timeout(std::time::Duration::from_millis(5), fut).await;
        assert!(timed_out.is_err());
        assert!(!is_active(&l));
    }

    #[tokio::test]
    async fn guards_inside_task_scope_use_task_stack() {
        let outer = Layer::new("outer");
        let inner = Layer::new("inner");
        let order = with_layers_async([&outer], async {
            with_layers([&inner], current_activation_order)
        })
        .await;
        assert_eq!(order, vec![inner, outer]);
    }
}
