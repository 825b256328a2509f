//! Scene Holder: the arena of scenes and the links between them.

use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};
use std::rc::Rc;

use super::manager::Scene;
use crate::{EraError, Result};

#[derive(Debug, Default)]
struct Links {
    registered: BTreeSet<String>,
    current: Option<String>,
    prev: Option<String>,
    next: Option<String>,
}

/// Cursor state of the scene graph, shared with the script API.
///
/// Scenes and scripts only get to set `next`; the manager moves the
/// cursor. All names stored here are registered.
#[derive(Debug, Clone, Default)]
pub struct SceneLinks {
    inner: Rc<RefCell<Links>>,
}

impl SceneLinks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the scene a forced transition goes to.
    pub fn set_next_by_name(&self, name: &str) -> Result<()> {
        let mut links = self.inner.borrow_mut();
        if !links.registered.contains(name) {
            return Err(EraError::SceneNotRegistered(name.to_string()));
        }
        links.next = Some(name.to_string());
        Ok(())
    }

    pub fn next(&self) -> Option<String> {
        self.inner.borrow().next.clone()
    }

    pub fn take_next(&self) -> Option<String> {
        self.inner.borrow_mut().next.take()
    }

    pub fn clear_next(&self) {
        self.inner.borrow_mut().next = None;
    }

    pub fn current(&self) -> Option<String> {
        self.inner.borrow().current.clone()
    }

    pub fn prev(&self) -> Option<String> {
        self.inner.borrow().prev.clone()
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.inner.borrow().registered.contains(name)
    }

    pub fn registered(&self) -> Vec<String> {
        self.inner.borrow().registered.iter().cloned().collect()
    }

    pub(crate) fn register(&self, name: &str) {
        self.inner.borrow_mut().registered.insert(name.to_string());
    }

    /// Forget a scene, dropping every link that points at it.
    pub(crate) fn unregister(&self, name: &str) {
        let mut guard = self.inner.borrow_mut();
        let links = &mut *guard;
        links.registered.remove(name);
        for slot in [&mut links.current, &mut links.prev, &mut links.next] {
            if slot.as_deref() == Some(name) {
                *slot = None;
            }
        }
    }

    pub(crate) fn set_current(&self, name: &str) -> Result<()> {
        let mut links = self.inner.borrow_mut();
        if !links.registered.contains(name) {
            return Err(EraError::SceneNotRegistered(name.to_string()));
        }
        links.current = Some(name.to_string());
        Ok(())
    }

    /// `prev = current`, `current = next`, and clear the pending next.
    pub(crate) fn advance(&self, next: String) {
        let mut guard = self.inner.borrow_mut();
        let links = &mut *guard;
        links.prev = links.current.replace(next);
        links.next = None;
    }
}

/// Owns every scene, keyed by name.
#[derive(Default)]
pub struct SceneHolder {
    scenes: HashMap<String, Box<dyn Scene>>,
    links: SceneLinks,
}

impl SceneHolder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn links(&self) -> &SceneLinks {
        &self.links
    }

    /// Add a scene, replacing any scene with the same name.
    pub fn insert(&mut self, scene: Box<dyn Scene>) -> Option<Box<dyn Scene>> {
        let name = scene.name().to_string();
        self.links.register(&name);
        self.scenes.insert(name, scene)
    }

    pub fn remove(&mut self, name: &str) -> Option<Box<dyn Scene>> {
        self.links.unregister(name);
        self.scenes.remove(name)
    }

    pub fn get(&self, name: &str) -> Result<&dyn Scene> {
        self.scenes
            .get(name)
            .map(|scene| scene.as_ref())
            .ok_or_else(|| EraError::SceneNotRegistered(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.scenes.contains_key(name)
    }

    pub fn scenes(&self) -> impl Iterator<Item = &dyn Scene> {
        self.scenes.values().map(|scene| scene.as_ref())
    }

    pub fn len(&self) -> usize {
        self.scenes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn links_with(names: &[&str]) -> SceneLinks {
        let links = SceneLinks::new();
        for name in names {
            links.register(name);
        }
        links
    }

    #[test]
    fn test_set_next_validates_name() {
        let links = links_with(&["title", "base"]);
        links.set_next_by_name("base").unwrap();
        assert_eq!(links.next(), Some("base".to_string()));

        match links.set_next_by_name("shop2") {
            Err(EraError::SceneNotRegistered(name)) => assert_eq!(name, "shop2"),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(links.next(), Some("base".to_string()));
    }

    #[test]
    fn test_advance_moves_cursor() {
        let links = links_with(&["title", "base"]);
        links.set_current("title").unwrap();
        links.set_next_by_name("base").unwrap();

        links.advance("base".to_string());
        assert_eq!(links.current(), Some("base".to_string()));
        assert_eq!(links.prev(), Some("title".to_string()));
        assert_eq!(links.next(), None);
    }

    #[test]
    fn test_unregister_clears_links() {
        let links = links_with(&["title", "shop"]);
        links.set_current("title").unwrap();
        links.set_next_by_name("shop").unwrap();

        links.unregister("shop");
        assert!(!links.is_registered("shop"));
        assert_eq!(links.next(), None);
        assert_eq!(links.current(), Some("title".to_string()));
        assert!(links.set_next_by_name("shop").is_err());
    }

    #[test]
    fn test_clones_share_state() {
        let links = links_with(&["base"]);
        let other = links.clone();
        other.set_next_by_name("base").unwrap();
        assert_eq!(links.take_next(), Some("base".to_string()));
        assert_eq!(other.next(), None);
    }
}
