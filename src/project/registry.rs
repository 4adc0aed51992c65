//! Project Registry
//!
//! The set of project roots rdm has loaded for the open workspace folders, and
//! the subset currently being loaded. Every lookup is a deepest-prefix match on
//! path components, so nested folders resolve to the most specific root.

use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::debug;

#[derive(Debug, Default)]
struct RegistryState {
    /// Registered roots in insertion order
    roots: Vec<PathBuf>,
    /// Roots with a Load task queued or running
    loading: Vec<PathBuf>,
}

/// Known and loading project roots
#[derive(Debug, Default)]
pub struct ProjectRegistry {
    state: RwLock<RegistryState>,
}

/// Deepest root containing `path`; equal depths keep the earliest inserted
fn deepest_match<'a>(roots: &'a [PathBuf], path: &Path) -> Option<&'a PathBuf> {
    roots
        .iter()
        .filter(|root| path.starts_with(root))
        .fold(None, |best: Option<&PathBuf>, root| match best {
            Some(best) if best.components().count() >= root.components().count() => Some(best),
            _ => Some(root),
        })
}

impl ProjectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The registered root owning `path`, if any
    pub fn get_project_root(&self, path: &Path) -> Option<PathBuf> {
        // Intentional .unwrap() - poisoned lock indicates serious bug, panic is appropriate
        let state = self.state.read().unwrap();
        deepest_match(&state.roots, path).cloned()
    }

    /// Whether `path` belongs to a registered project, optionally a specific one
    pub fn is_in_project(&self, path: &Path, root: Option<&Path>) -> bool {
        match (self.get_project_root(path), root) {
            (Some(found), Some(root)) => found == root,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }

    /// Whether `path` belongs to a project that is still loading
    ///
    /// A loading root only claims the path over a registered one when it is
    /// strictly deeper, i.e. a sub-root being loaded inside a loaded parent.
    pub fn is_in_loading_project(&self, path: &Path) -> bool {
        let state = self.state.read().unwrap();
        let Some(loading) = deepest_match(&state.loading, path) else {
            return false;
        };
        match deepest_match(&state.roots, path) {
            Some(registered) => {
                loading.components().count() > registered.components().count()
            }
            None => true,
        }
    }

    /// Register a root; returns false if it was already registered
    pub fn add_root(&self, root: PathBuf) -> bool {
        let mut state = self.state.write().unwrap();
        if state.roots.contains(&root) {
            return false;
        }
        debug!("ProjectRegistry: registered {}", root.display());
        state.roots.push(root);
        true
    }

    /// Unregister a root; returns false if it was not registered
    pub fn remove_root(&self, root: &Path) -> bool {
        let mut state = self.state.write().unwrap();
        let before = state.roots.len();
        state.roots.retain(|known| known != root);
        let removed = state.roots.len() != before;
        if removed {
            debug!("ProjectRegistry: unregistered {}", root.display());
        }
        removed
    }

    pub fn begin_loading(&self, root: PathBuf) {
        let mut state = self.state.write().unwrap();
        if !state.loading.contains(&root) {
            state.loading.push(root);
        }
    }

    pub fn finish_loading(&self, root: &Path) {
        self.state
            .write()
            .unwrap()
            .loading
            .retain(|loading| loading != root);
    }

    pub fn is_loading(&self, root: &Path) -> bool {
        self.state
            .read()
            .unwrap()
            .loading
            .iter()
            .any(|loading| loading == root)
    }

    /// Snapshot of registered roots in insertion order
    pub fn roots(&self) -> Vec<PathBuf> {
        self.state.read().unwrap().roots.clone()
    }

    pub fn len(&self) -> usize {
        self.state.read().unwrap().roots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with(roots: &[&str]) -> ProjectRegistry {
        let registry = ProjectRegistry::new();
        for root in roots {
            registry.add_root(PathBuf::from(root));
        }
        registry
    }

    #[test]
    fn test_nested_roots_resolve_to_deepest() {
        let registry = registry_with(&["/ws", "/ws/sub"]);

        assert_eq!(
            registry.get_project_root(Path::new("/ws/sub/file.cpp")),
            Some(PathBuf::from("/ws/sub"))
        );
        assert_eq!(
            registry.get_project_root(Path::new("/ws/main.cpp")),
            Some(PathBuf::from("/ws"))
        );
    }

    #[test]
    fn test_insertion_order_does_not_matter_for_depth() {
        let registry = registry_with(&["/ws/sub", "/ws"]);
        assert_eq!(
            registry.get_project_root(Path::new("/ws/sub/deep/file.cpp")),
            Some(PathBuf::from("/ws/sub"))
        );
    }

    #[test]
    fn test_prefix_match_is_per_component() {
        let registry = registry_with(&["/ws/sub"]);
        assert_eq!(registry.get_project_root(Path::new("/ws/subdir/a.cpp")), None);
        assert_eq!(registry.get_project_root(Path::new("/elsewhere/a.cpp")), None);
    }

    #[test]
    fn test_is_in_project_pinned_to_root() {
        let registry = registry_with(&["/ws", "/ws/sub"]);
        let path = Path::new("/ws/sub/a.cpp");

        assert!(registry.is_in_project(path, None));
        assert!(registry.is_in_project(path, Some(Path::new("/ws/sub"))));
        assert!(!registry.is_in_project(path, Some(Path::new("/ws"))));
        assert!(!registry.is_in_project(Path::new("/tmp/x.cpp"), None));
    }

    #[test]
    fn test_loading_root_wins_only_when_deeper() {
        let registry = registry_with(&["/ws"]);
        registry.begin_loading(PathBuf::from("/ws/sub"));

        assert!(registry.is_in_loading_project(Path::new("/ws/sub/a.cpp")));
        assert!(!registry.is_in_loading_project(Path::new("/ws/a.cpp")));

        // Reloading the registered root itself is not strictly deeper
        registry.begin_loading(PathBuf::from("/ws"));
        assert!(!registry.is_in_loading_project(Path::new("/ws/a.cpp")));
    }

    #[test]
    fn test_loading_without_registered_root() {
        let registry = ProjectRegistry::new();
        registry.begin_loading(PathBuf::from("/lib"));

        assert!(registry.is_in_loading_project(Path::new("/lib/src/x.cpp")));
        assert!(!registry.is_in_project(Path::new("/lib/src/x.cpp"), None));

        registry.finish_loading(Path::new("/lib"));
        assert!(!registry.is_in_loading_project(Path::new("/lib/src/x.cpp")));
    }

    #[test]
    fn test_add_remove_round_trip() {
        let registry = ProjectRegistry::new();
        assert!(registry.add_root(PathBuf::from("/ws")));
        assert!(!registry.add_root(PathBuf::from("/ws")));
        assert_eq!(registry.len(), 1);
        assert!(registry.is_in_project(Path::new("/ws/a/b.cpp"), None));

        assert!(registry.remove_root(Path::new("/ws")));
        assert!(!registry.remove_root(Path::new("/ws")));
        assert!(registry.is_empty());
        assert!(!registry.is_in_project(Path::new("/ws/a/b.cpp"), None));
    }

    #[test]
    fn test_longest_prefix_over_many_roots() {
        let roots = ["/a", "/a/b", "/a/b/c", "/a/bc", "/x/y"];
        let registry = registry_with(&roots);

        let cases = [
            ("/a/b/c/d/e.cpp", Some("/a/b/c")),
            ("/a/b/cd.cpp", Some("/a/b")),
            ("/a/bc/file.h", Some("/a/bc")),
            ("/a/file.h", Some("/a")),
            ("/x/y/z.c", Some("/x/y")),
            ("/x/z.c", None),
        ];
        for (path, expected) in cases {
            assert_eq!(
                registry.get_project_root(Path::new(path)),
                expected.map(PathBuf::from),
                "lookup of {path}"
            );
        }
    }
}
