//! Layer identity tokens.
//!
//! A [`Layer`] names a behavioral context. It carries no behavior of its
//! own: specializations are keyed by it and dispatch consults which layers
//! are active. Equality is identity: two layers built with the same name
//! are still different layers, while clones of one layer compare equal.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::ids::LayerId;

struct LayerInner {
    id: LayerId,
    name: Option<String>,
}

/// A behavioral context that can be activated for a dynamic extent.
#[derive(Clone)]
pub struct Layer {
    inner: Arc<LayerInner>,
}

impl Layer {
    /// Create a fresh layer with a diagnostic name.
    pub fn new(name: impl Into<String>) -> Self {
        Self::build(Some(name.into()))
    }

    /// Create a fresh layer without a name.
    pub fn anonymous() -> Self {
        Self::build(None)
    }

    fn build(name: Option<String>) -> Self {
        Self {
            inner: Arc::new(LayerInner {
                id: LayerId::new(),
                name,
            }),
        }
    }

    /// The identity of this layer.
    pub fn id(&self) -> &LayerId {
        &self.inner.id
    }

    /// The diagnostic name, if one was given.
    pub fn name(&self) -> Option<&str> {
        self.inner.name.as_deref()
    }

    /// Name if present, otherwise the identifier.
    pub fn identifier(&self) -> &str {
        self.inner
            .name
            .as_deref()
            .unwrap_or_else(|| self.inner.id.as_str())
    }
}

impl PartialEq for Layer {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for Layer {}

impl Hash for Layer {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.id.hash(state);
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<layer {}>", self.identifier())
    }
}

impl fmt::Debug for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Layer")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn same_name_is_not_same_layer() {
        let a = Layer::new("logging");
        let b = Layer::new("logging");
        assert_ne!(a, b);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn clones_share_identity() {
        let a = Layer::new("logging");
        let b = a.clone();
        assert_eq!(a, b);

        let set: HashSet<Layer> = [a, b].into_iter().collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn display_uses_name() {
        let layer = Layer::new("audit");
        assert_eq!(layer.to_string(), "<layer audit>");
        assert_eq!(layer.name(), Some("audit"));
    }

    #[test]
    fn anonymous_falls_back_to_id() {
        let layer = Layer::anonymous();
        assert!(layer.name().is_none());
        assert_eq!(layer.identifier(), layer.id().as_str());
        assert!(layer.to_string().starts_with("<layer layer_"));
    }
}
