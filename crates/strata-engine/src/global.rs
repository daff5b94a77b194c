//! Process-wide layer activation.
//!
//! Globally active layers are visible to every thread and task, below all
//! scoped frames. Among themselves, a layer activated later is more
//! specific. Scoped [`deactivate`](crate::deactivate) frames can still hide
//! them.

use parking_lot::RwLock;
use strata_core::{DispatchError, Layer, Result};
use strata_settings::get_settings;
use tracing::{debug, warn};

/// Oldest first.
static GLOBAL_LAYERS: RwLock<Vec<Layer>> = RwLock::new(Vec::new());

/// Snapshot of the globally active layers, oldest first.
pub fn global_layers() -> Vec<Layer> {
    GLOBAL_LAYERS.read().clone()
}

/// Make `layer` active for the whole process.
///
/// With `activation.strictGlobal` enabled (the default), activating a layer
/// that is already globally active fails with
/// [`DispatchError::AlreadyActive`]; otherwise it is logged and ignored.
pub fn activate_globally(layer: &Layer) -> Result<()> {
    let strict = get_settings().activation.strict_global;
    insert(&mut GLOBAL_LAYERS.write(), layer, strict)
}

/// Remove `layer` from the globally active set.
///
/// Fails with [`DispatchError::NotActive`] in strict mode when the layer is
/// not globally active.
pub fn deactivate_globally(layer: &Layer) -> Result<()> {
    let strict = get_settings().activation.strict_global;
    remove(&mut GLOBAL_LAYERS.write(), layer, strict)
}

fn insert(layers: &mut Vec<Layer>, layer: &Layer, strict: bool) -> Result<()> {
    if layers.contains(layer) {
        if strict {
            return Err(DispatchError::AlreadyActive {
                layer: layer.to_string(),
            });
        }
        warn!(layer = %layer, "layer already globally active, ignoring");
        return Ok(());
    }
    layers.push(layer.clone());
    debug!(layer = %layer, count = layers.len(), "layer activated globally");
    Ok(())
}

fn remove(layers: &mut Vec<Layer>, layer: &Layer, strict: bool) -> Result<()> {
    let Some(pos) = layers.iter().position(|l| l == layer) else {
        if strict {
            return Err(DispatchError::NotActive {
                layer: layer.to_string(),
            });
        }
        warn!(layer = %layer, "layer not globally active, ignoring");
        return Ok(());
    };
    let _ = layers.remove(pos);
    debug!(layer = %layer, count = layers.len(), "layer deactivated globally");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use strata_logging::capture_logs;
    use tracing::Level;

    #[test]
    fn insert_appends_in_activation_order() {
        let a = Layer::new("a");
        let b = Layer::new("b");
        let mut layers = Vec::new();
        insert(&mut layers, &a, true).unwrap();
        insert(&mut layers, &b, true).unwrap();
        assert_eq!(layers, vec![a, b]);
    }

    #[test]
    fn strict_insert_rejects_duplicates() {
        let a = Layer::new("a");
        let mut layers = vec![a.clone()];
        assert_matches!(
            insert(&mut layers, &a, true),
            Err(DispatchError::AlreadyActive { layer }) if layer == "<layer a>"
        );
        assert_eq!(layers.len(), 1);
    }

    #[test]
    fn lenient_insert_warns_and_ignores() {
        let (logs, _guard) = capture_logs();
        let a = Layer::new("a");
        let mut layers = vec![a.clone()];
        insert(&mut layers, &a, false).unwrap();
        assert_eq!(layers.len(), 1);
        assert!(logs.has_event(Level::WARN, "already globally active"));
    }

    #[test]
    fn remove_keeps_remaining_order() {
        let a = Layer::new("a");
        let b = Layer::new("b");
        let c = Layer::new("c");
        let mut layers = vec![a.clone(), b.clone(), c.clone()];
        remove(&mut layers, &b, true).unwrap();
        assert_eq!(layers, vec![a, c]);
    }

    #[test]
    fn strict_remove_of_inactive_layer_fails() {
        let mut layers = Vec::new();
        assert_matches!(
            remove(&mut layers, &Layer::new("ghost"), true),
            Err(DispatchError::NotActive { .. })
        );
        remove(&mut layers, &Layer::new("ghost"), false).unwrap();
    }
}
