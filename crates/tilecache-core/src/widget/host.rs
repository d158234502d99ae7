use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::lifecycle::MapInstanceId;

use super::WidgetError;

/// Classes the rendering library puts on a host element start with this.
pub const LIBRARY_CLASS_PREFIX: &str = "tilecache-";

/// Attributes the rendering library puts on a host element start with this.
pub const LIBRARY_ATTRIBUTE_PREFIX: &str = "data-tilecache-";

#[derive(Debug, Default)]
struct Surface {
    owner: Option<MapInstanceId>,
    classes: BTreeSet<String>,
    attributes: BTreeMap<String, String>,
}

/// The element a map widget draws into. Cloning shares the same element, the
/// way two components can hold the same DOM node.
#[derive(Clone)]
pub struct HostElement {
    id: Arc<str>,
    surface: Arc<Mutex<Surface>>,
}

impl HostElement {
    pub fn new(id: &str) -> Self {
        Self {
            id: Arc::from(id),
            surface: Arc::new(Mutex::new(Surface::default())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Surface> {
        self.surface.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// The instance currently drawing into this element.
    pub fn owner(&self) -> Option<MapInstanceId> {
        self.lock().owner
    }

    /// Take the element for `instance`. Fails if another instance holds it.
    pub fn claim(&self, instance: &MapInstanceId) -> Result<(), WidgetError> {
        let mut surface = self.lock();
        match surface.owner {
            Some(owner) if owner != *instance => Err(WidgetError::ContainerConflict {
                host: self.id.to_string(),
                owner,
            }),
            _ => {
                surface.owner = Some(*instance);
                Ok(())
            }
        }
    }

    /// Give the element up and strip library markers, but only if `instance`
    /// still owns it. Returns whether it did.
    pub fn release_claim(&self, instance: &MapInstanceId) -> bool {
        let mut surface = self.lock();
        if surface.owner != Some(*instance) {
            return false;
        }
        surface.owner = None;
        strip_library_markers(&mut surface);
        true
    }

    /// Drop the claim and library markers unless the current owner is still
    /// live according to `is_live`. Returns whether anything changed.
    pub(crate) fn scrub_unless_owned_by<F>(&self, is_live: F) -> bool
    where
        F: Fn(&MapInstanceId) -> bool,
    {
        let mut surface = self.lock();
        if let Some(owner) = surface.owner {
            if is_live(&owner) {
                return false;
            }
            surface.owner = None;
            strip_library_markers(&mut surface);
            return true;
        }
        strip_library_markers(&mut surface)
    }

    pub fn add_class(&self, class: &str) {
        self.lock().classes.insert(class.to_string());
    }

    pub fn remove_class(&self, class: &str) {
        self.lock().classes.remove(class);
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.lock().classes.contains(class)
    }

    pub fn classes(&self) -> Vec<String> {
        self.lock().classes.iter().cloned().collect()
    }

    pub fn set_attribute(&self, name: &str, value: &str) {
        self.lock().attributes.insert(name.to_string(), value.to_string());
    }

    pub fn attribute(&self, name: &str) -> Option<String> {
        self.lock().attributes.get(name).cloned()
    }
}

impl fmt::Debug for HostElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let surface = self.lock();
        f.debug_struct("HostElement")
            .field("id", &self.id)
            .field("owner", &surface.owner)
            .field("classes", &surface.classes)
            .finish()
    }
}

fn strip_library_markers(surface: &mut Surface) -> bool {
    let before = surface.classes.len() + surface.attributes.len();
    surface.classes.retain(|c| !c.starts_with(LIBRARY_CLASS_PREFIX));
    surface.attributes.retain(|a, _| !a.starts_with(LIBRARY_ATTRIBUTE_PREFIX));
    before != surface.classes.len() + surface.attributes.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::LifecycleManager;

    #[test]
    fn test_claim_conflict() {
        let manager = LifecycleManager::new();
        let a = manager.acquire().unwrap();
        let b = manager.acquire().unwrap();
        let host = HostElement::new("map");

        host.claim(&a).unwrap();
        host.claim(&a).unwrap();
        let err = host.claim(&b).unwrap_err();
        assert!(err.is_container_conflict());
        assert_eq!(host.owner(), Some(a));
    }

    #[test]
    fn test_release_claim_only_by_owner() {
        let manager = LifecycleManager::new();
        let a = manager.acquire().unwrap();
        let b = manager.acquire().unwrap();
        let host = HostElement::new("map");
        host.claim(&a).unwrap();
        host.add_class("tilecache-container");
        host.add_class("panel");

        assert!(!host.release_claim(&b));
        assert_eq!(host.owner(), Some(a));

        assert!(host.release_claim(&a));
        assert_eq!(host.owner(), None);
        assert_eq!(host.classes(), vec!["panel".to_string()]);
    }

    #[test]
    fn test_clones_share_the_element() {
        let host = HostElement::new("map");
        let other = host.clone();
        other.add_class("x");
        assert!(host.has_class("x"));
        host.remove_class("x");
        assert!(!other.has_class("x"));
    }
}
