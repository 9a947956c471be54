use std::collections::HashMap;
use std::sync::{Arc, OnceLock, Weak};

use jshare_core::Fingerprint;
use parking_lot::RwLock;

use crate::error::RegistryError;
use crate::loader::ClassLoader;

struct Registration {
    loader: Weak<ClassLoader>,
    signature: Fingerprint,
}

impl Registration {
    fn is_live(&self) -> bool {
        self.loader.strong_count() > 0
    }
}

/// Identifier → loader bindings.
///
/// Bindings are back-references: the registry holds [`Weak`] handles and
/// never keeps a loader alive. A binding whose loader has been dropped reads
/// as absent and may be replaced by a new registration. Dead bindings are
/// dropped whenever a new registration takes the write lock.
///
/// Bindings are write-once per live identifier. Registering an identifier
/// again succeeds only if the new loader has the same signature, in which
/// case the existing binding is kept unchanged.
#[derive(Default)]
pub struct ClassLoaderRegistry {
    entries: RwLock<HashMap<String, Registration>>,
}

impl std::fmt::Debug for ClassLoaderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassLoaderRegistry")
            .field("entries", &self.entries.read().len())
            .finish()
    }
}

static GLOBAL_REGISTRY: OnceLock<ClassLoaderRegistry> = OnceLock::new();

impl ClassLoaderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry.
    ///
    /// It is created on first access (the CLI touches it during start-up,
    /// before any loader is registered) and lives until the process exits;
    /// there is no teardown.
    pub fn global() -> &'static ClassLoaderRegistry {
        GLOBAL_REGISTRY.get_or_init(ClassLoaderRegistry::new)
    }

    /// Binds `identifier` to `loader`.
    ///
    /// Both arguments are optional because host runtimes hand them over
    /// unchecked; a missing or empty value is an [`RegistryError::InvalidRegistration`].
    pub fn register(
        &self,
        identifier: Option<&str>,
        loader: Option<&Arc<ClassLoader>>,
    ) -> Result<(), RegistryError> {
        let (identifier, loader) = match (identifier, loader) {
            (Some(identifier), Some(loader)) if !identifier.is_empty() => (identifier, loader),
            _ => {
                tracing::warn!(
                    target = "jshare.registry",
                    "[Register CL Exception] identifier or loader is null"
                );
                return Err(RegistryError::InvalidRegistration);
            }
        };

        // Hashing reads the classpath; keep it outside the lock.
        let signature = loader.signature();

        let mut entries = self.entries.write();
        entries.retain(|_, registration| registration.is_live());
        if let Some(existing) = entries.get(identifier) {
            if existing.is_live() {
                if existing.signature == signature {
                    tracing::debug!(
                        target = "jshare.registry",
                        identifier,
                        signature = %signature,
                        "class loader already registered with the same signature"
                    );
                    return Ok(());
                }

                tracing::warn!(
                    target = "jshare.registry",
                    "[Register CL Exception] the identifier {identifier} with signature: \
                     {signature} conflicts with registered signature: {}",
                    existing.signature
                );
                return Err(RegistryError::DuplicateIdentifierConflict {
                    identifier: identifier.to_owned(),
                    signature,
                });
            }
        }

        tracing::debug!(
            target = "jshare.registry",
            identifier,
            loader_type = loader.type_name(),
            signature = %signature,
            "registered class loader"
        );
        entries.insert(
            identifier.to_owned(),
            Registration {
                loader: Arc::downgrade(loader),
                signature,
            },
        );
        Ok(())
    }

    /// Looks up the live loader bound to `identifier`.
    pub fn resolve(&self, identifier: &str) -> Option<Arc<ClassLoader>> {
        self.entries
            .read()
            .get(identifier)
            .and_then(|registration| registration.loader.upgrade())
    }

    /// Signature captured when `identifier` was registered, if its loader is
    /// still alive.
    pub fn signature_of(&self, identifier: &str) -> Option<Fingerprint> {
        self.entries
            .read()
            .get(identifier)
            .filter(|registration| registration.is_live())
            .map(|registration| registration.signature.clone())
    }

    /// Reverse lookup by loader identity (pointer equality, not signature).
    pub fn identifier_of(&self, loader: &Arc<ClassLoader>) -> Option<String> {
        let target = Arc::downgrade(loader);
        self.entries
            .read()
            .iter()
            .find(|(_, registration)| registration.loader.ptr_eq(&target))
            .map(|(identifier, _)| identifier.clone())
    }

    /// Identifiers of all live bindings, sorted.
    pub fn identifiers(&self) -> Vec<String> {
        let mut out: Vec<String> = self
            .entries
            .read()
            .iter()
            .filter(|(_, registration)| registration.is_live())
            .map(|(identifier, _)| identifier.clone())
            .collect();
        out.sort();
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ClasspathEntry;

    fn loader_with(contents: &[u8]) -> (tempfile::TempDir, Arc<ClassLoader>) {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("A.class"), contents).unwrap();
        let loader = ClassLoader::custom(
            "java/net/URLClassLoader",
            vec![ClasspathEntry::from_path(dir.path())],
        );
        (dir, Arc::new(loader))
    }

    #[test]
    fn register_then_resolve_returns_the_same_loader() {
        let registry = ClassLoaderRegistry::new();
        let (_dir, loader) = loader_with(b"a");
        registry.register(Some("myloader"), Some(&loader)).unwrap();

        let resolved = registry.resolve("myloader").unwrap();
        assert!(Arc::ptr_eq(&resolved, &loader));
        assert_eq!(registry.identifier_of(&loader).as_deref(), Some("myloader"));
        assert_eq!(registry.signature_of("myloader"), Some(loader.signature()));
    }

    #[test]
    fn unknown_identifier_resolves_to_none() {
        let registry = ClassLoaderRegistry::new();
        assert!(registry.resolve("nobody").is_none());
        assert!(registry.signature_of("nobody").is_none());
    }

    #[test]
    fn missing_identifier_or_loader_is_invalid() {
        let registry = ClassLoaderRegistry::new();
        let (_dir, loader) = loader_with(b"a");

        assert_eq!(
            registry.register(None, Some(&loader)),
            Err(RegistryError::InvalidRegistration)
        );
        assert_eq!(
            registry.register(Some(""), Some(&loader)),
            Err(RegistryError::InvalidRegistration)
        );
        assert_eq!(
            registry.register(Some("myloader"), None),
            Err(RegistryError::InvalidRegistration)
        );
        assert!(registry.identifiers().is_empty());
    }

    #[test]
    fn same_signature_is_a_no_op() {
        let registry = ClassLoaderRegistry::new();
        let (_a, first) = loader_with(b"same");
        let (_b, second) = loader_with(b"same");

        registry.register(Some("myloader"), Some(&first)).unwrap();
        registry.register(Some("myloader"), Some(&second)).unwrap();
        registry.register(Some("myloader"), Some(&first)).unwrap();

        // The first binding is kept.
        assert!(Arc::ptr_eq(&registry.resolve("myloader").unwrap(), &first));
    }

    #[test]
    fn different_signature_conflicts() {
        let registry = ClassLoaderRegistry::new();
        let (_a, first) = loader_with(b"one");
        let (_b, second) = loader_with(b"two");

        registry.register(Some("myloader"), Some(&first)).unwrap();
        let err = registry
            .register(Some("myloader"), Some(&second))
            .unwrap_err();
        assert_eq!(
            err,
            RegistryError::DuplicateIdentifierConflict {
                identifier: "myloader".to_owned(),
                signature: second.signature(),
            }
        );
        assert!(Arc::ptr_eq(&registry.resolve("myloader").unwrap(), &first));
    }

    #[test]
    fn dropped_loader_is_not_kept_alive_and_can_be_replaced() {
        let registry = ClassLoaderRegistry::new();
        let (_a, first) = loader_with(b"one");
        let (_b, second) = loader_with(b"two");

        registry.register(Some("myloader"), Some(&first)).unwrap();
        drop(first);

        assert!(registry.resolve("myloader").is_none());
        assert!(registry.signature_of("myloader").is_none());
        assert!(registry.identifiers().is_empty());

        registry.register(Some("myloader"), Some(&second)).unwrap();
        assert!(Arc::ptr_eq(&registry.resolve("myloader").unwrap(), &second));
    }

    #[test]
    fn registering_prunes_bindings_of_dropped_loaders() {
        let registry = ClassLoaderRegistry::new();
        let (_a, first) = loader_with(b"one");
        let (_b, second) = loader_with(b"two");
        let (_c, third) = loader_with(b"three");

        registry.register(Some("first"), Some(&first)).unwrap();
        registry.register(Some("second"), Some(&second)).unwrap();
        drop(first);
        assert_eq!(registry.entries.read().len(), 2);

        registry.register(Some("third"), Some(&third)).unwrap();
        assert_eq!(registry.entries.read().len(), 2);
        assert!(!registry.entries.read().contains_key("first"));
        assert_eq!(
            registry.identifiers(),
            vec!["second".to_owned(), "third".to_owned()]
        );
    }

    #[test]
    fn concurrent_registration_of_one_loader_all_succeed() {
        let registry = Arc::new(ClassLoaderRegistry::new());
        let (_dir, loader) = loader_with(b"shared");

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                let loader = loader.clone();
                std::thread::spawn(move || registry.register(Some("myloader"), Some(&loader)))
            })
            .collect();

        for handle in handles {
            handle.join().unwrap().unwrap();
        }
        assert_eq!(registry.identifiers(), vec!["myloader".to_owned()]);
    }
}
