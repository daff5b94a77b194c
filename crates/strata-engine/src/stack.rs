//! Activation scope stack.
//!
//! An [`ActivationStack`] is an ordered list of frames. Each frame either
//! activates a group of layers or hides a group of layers for its extent.
//! Frames are strictly nested: only the top frame may be popped, and trying
//! to pop any other frame fails with
//! [`DispatchError::UnbalancedActivation`] without touching the stack.
//!
//! # Specificity
//!
//! [`resolve`](ActivationStack::resolve) flattens the frames into one
//! priority order, most specific first:
//! - a later frame is more specific than every earlier frame;
//! - within one frame, layers given earlier are more specific;
//! - an already-active layer activated again gains another, more specific
//!   occurrence (no deduplication);
//! - a deactivation frame removes every occurrence of its layers that is
//!   below it, including globally active ones.

use std::sync::atomic::{AtomicU64, Ordering};

use strata_core::{DispatchError, Layer, Result};

static NEXT_FRAME_ID: AtomicU64 = AtomicU64::new(1);

/// Handle identifying one pushed frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FrameToken(u64);

impl FrameToken {
    /// Raw frame number, as reported in errors.
    pub fn get(self) -> u64 {
        self.0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FrameKind {
    Activate,
    Deactivate,
}

#[derive(Clone, Debug)]
struct Frame {
    token: FrameToken,
    kind: FrameKind,
    layers: Vec<Layer>,
}

/// Stack of activation frames for one logical thread of control.
///
/// The implicit per-thread and per-task stacks in [`crate::scope`] are built
/// on this type; it can also be owned and passed down explicitly and
/// dispatched against with [`Registry::call_with`](crate::Registry::call_with).
#[derive(Clone, Debug, Default)]
pub struct ActivationStack {
    frames: Vec<Frame>,
}

impl ActivationStack {
    /// Create an empty stack.
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a frame activating `layers` together.
    pub fn push<I>(&mut self, layers: I) -> FrameToken
    where
        I: IntoIterator,
        I::Item: std::borrow::Borrow<Layer>,
    {
        self.push_frame(FrameKind::Activate, layers)
    }

    /// Push a frame hiding `layers` until it is popped.
    pub fn push_deactivation<I>(&mut self, layers: I) -> FrameToken
    where
        I: IntoIterator,
        I::Item: std::borrow::Borrow<Layer>,
    {
        self.push_frame(FrameKind::Deactivate, layers)
    }

    fn push_frame<I>(&mut self, kind: FrameKind, layers: I) -> FrameToken
    where
        I: IntoIterator,
        I::Item: std::borrow::Borrow<Layer>,
    {
        let token = FrameToken(NEXT_FRAME_ID.fetch_add(1, Ordering::Relaxed));
        let layers = layers
            .into_iter()
            .map(|l| std::borrow::Borrow::<Layer>::borrow(&l).clone())
            .collect();
        self.frames.push(Frame {
            token,
            kind,
            layers,
        });
        token
    }

    /// Pop the frame identified by `token`.
    ///
    /// Fails without modifying the stack unless `token` is the top frame.
    pub fn pop(&mut self, token: FrameToken) -> Result<()> {
        let top = self.frames.last().map(|f| f.token);
        if top != Some(token) {
            return Err(DispatchError::UnbalancedActivation {
                released: token.get(),
                top: top.map(FrameToken::get),
            });
        }
        let _ = self.frames.pop();
        Ok(())
    }

    /// Number of frames on the stack.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Whether no frames are pushed.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Token of the top frame, if any.
    pub fn top(&self) -> Option<FrameToken> {
        self.frames.last().map(|f| f.token)
    }

    /// Active layers from this stack alone, most specific first.
    pub fn activation_order(&self) -> Vec<Layer> {
        self.resolve(&[])
    }

    /// Active layers, most specific first, on top of `base` layers.
    ///
    /// `base` is given oldest first (the last entry is the most specific of
    /// them) and ranks below every frame.
    pub fn resolve(&self, base: &[Layer]) -> Vec<Layer> {
        // Built least specific first, reversed at the end.
        let mut order: Vec<Layer> = base.to_vec();
        for frame in &self.frames {
            match frame.kind {
                FrameKind::Activate => order.extend(frame.layers.iter().rev().cloned()),
                FrameKind::Deactivate => order.retain(|l| !frame.layers.contains(l)),
            }
        }
        order.reverse();
        order
    }

    /// Whether `layer` is active in this stack on top of `base`.
    pub fn is_active(&self, layer: &Layer, base: &[Layer]) -> bool {
        self.resolve(base).contains(layer)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
