use std::path::Path;
use std::sync::Arc;

use jshare_core::BOOTSTRAP_ORIGIN;
use jshare_registry::{ClassLoader, ClassLoaderRegistry, LoaderKind};
use parking_lot::Mutex;

use crate::error::ClassListError;
use crate::record::{ClassList, ClassRecord, DefiningLoader};

/// Origin recorded when a non-boot loader reports no source. It is not a
/// shareable origin, so conversion drops such classes.
pub const UNKNOWN_ORIGIN: &str = "__unknown__";

/// A class definition reported by the runtime.
#[derive(Clone, Debug)]
pub struct ClassLoadEvent {
    pub name: String,
    /// Defining loader; `None` means the boot loader.
    pub loader: Option<Arc<ClassLoader>>,
    /// Where the bytes came from. Ignored for the boot loader; missing for
    /// other loaders means [`UNKNOWN_ORIGIN`].
    pub origin: Option<String>,
    /// Superclass first, then interfaces.
    pub supertypes: Vec<String>,
}

impl ClassLoadEvent {
    pub fn boot(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            loader: None,
            origin: None,
            supertypes: Vec::new(),
        }
    }

    pub fn defined_by(
        name: impl Into<String>,
        loader: &Arc<ClassLoader>,
        origin: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            loader: Some(loader.clone()),
            origin: Some(origin.into()),
            supertypes: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_supertypes<I, S>(mut self, supertypes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.supertypes = supertypes.into_iter().map(Into::into).collect();
        self
    }
}

/// Accumulates the classlist of one run.
///
/// Safe to feed from concurrent class-loading threads; order is the order in
/// which `record` calls acquire the internal lock.
pub struct ClassListRecorder<'r> {
    registry: &'r ClassLoaderRegistry,
    list: Mutex<ClassList>,
}

impl<'r> ClassListRecorder<'r> {
    pub fn new(registry: &'r ClassLoaderRegistry) -> Self {
        Self {
            registry,
            list: Mutex::new(ClassList::new()),
        }
    }

    /// Records the first load of a class. Later loads of the same class by
    /// the same loader are ignored.
    ///
    /// Classes defined by a custom loader that is not registered are not
    /// recorded: a later process could never tell that loader apart from any
    /// other.
    pub fn record(&self, event: ClassLoadEvent) {
        let loader = match &event.loader {
            None => DefiningLoader::Boot,
            Some(loader) => match loader.kind() {
                LoaderKind::Boot => DefiningLoader::Boot,
                LoaderKind::Platform => DefiningLoader::Platform,
                LoaderKind::App => DefiningLoader::App,
                LoaderKind::Custom => match self.registry.identifier_of(loader) {
                    Some(identifier) => DefiningLoader::Custom(identifier),
                    None => {
                        tracing::debug!(
                            target = "jshare.classlist",
                            class = %event.name,
                            loader_type = loader.type_name(),
                            "skipping class defined by an unregistered custom loader"
                        );
                        return;
                    }
                },
            },
        };

        let origin = match (&loader, event.origin) {
            (DefiningLoader::Boot, _) => BOOTSTRAP_ORIGIN.to_owned(),
            (_, Some(origin)) if !origin.trim().is_empty() => origin,
            _ => UNKNOWN_ORIGIN.to_owned(),
        };

        let record = ClassRecord::new(&event.name, origin)
            .with_supertypes(&event.supertypes)
            .with_loader(loader);

        let added = self.list.lock().push(record);
        if added {
            tracing::trace!(target = "jshare.classlist", class = %event.name, "recorded class");
        }
    }

    /// Snapshot of everything recorded so far, in first-load order.
    ///
    /// Draining does not reset the recorder, so repeated calls over the same
    /// run return the same list.
    pub fn drain(&self) -> ClassList {
        self.list.lock().clone()
    }

    /// Writes the current snapshot to `path` atomically.
    pub fn write_to(&self, path: &Path) -> Result<ClassList, ClassListError> {
        let list = self.drain();
        list.write(path)?;
        tracing::info!(
            target = "jshare.classlist",
            path = %path.display(),
            classes = list.len(),
            "wrote classlist"
        );
        Ok(list)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jshare_registry::ClasspathEntry;

    #[test]
    fn records_in_first_load_order_with_identifiers() {
        let registry = ClassLoaderRegistry::new();
        let dir = tempfile::TempDir::new().unwrap();
        let custom = Arc::new(ClassLoader::custom(
            "java/net/URLClassLoader",
            vec![ClasspathEntry::from_path(dir.path())],
        ));
        registry.register(Some("myloader"), Some(&custom)).unwrap();
        let app = Arc::new(ClassLoader::app(Vec::new()));

        let recorder = ClassListRecorder::new(&registry);
        recorder.record(ClassLoadEvent::boot("java/lang/Object"));
        recorder.record(
            ClassLoadEvent::boot("java/lang/Class").with_supertypes(["java/lang/Object"]),
        );
        recorder.record(ClassLoadEvent::defined_by(
            "TestClassLoaderWithSignature",
            &app,
            "file:/w/test.jar",
        ));
        recorder.record(
            ClassLoadEvent::defined_by("p/ThrowException", &custom, "file:/w/classes/")
                .with_supertypes(["java/lang/Object"]),
        );
        recorder.record(ClassLoadEvent::boot("java/lang/Object"));

        let list = recorder.drain();
        let names: Vec<&str> = list.iter().map(ClassRecord::name).collect();
        assert_eq!(
            names,
            [
                "java.lang.Object",
                "java.lang.Class",
                "TestClassLoaderWithSignature",
                "p.ThrowException"
            ]
        );
        assert!(list.records()[0].is_bootstrap());
        assert_eq!(list.records()[2].loader_identifier(), None);
        assert_eq!(list.records()[3].loader_identifier(), Some("myloader"));
        assert_eq!(list.records()[3].origin(), "file:/w/classes/");
    }

    #[test]
    fn drain_is_repeatable_and_empty_runs_are_fine() {
        let registry = ClassLoaderRegistry::new();
        let recorder = ClassListRecorder::new(&registry);
        assert!(recorder.drain().is_empty());

        recorder.record(ClassLoadEvent::boot("java.lang.Object"));
        assert_eq!(recorder.drain(), recorder.drain());
    }

    #[test]
    fn unregistered_custom_loader_does_not_shadow_the_app_loader() {
        let registry = ClassLoaderRegistry::new();
        let plugin = Arc::new(ClassLoader::custom("PluginLoader", Vec::new()));
        let app = Arc::new(ClassLoader::app(Vec::new()));
        let recorder = ClassListRecorder::new(&registry);

        recorder.record(ClassLoadEvent::defined_by("Foo", &plugin, "file:/plugins/"));
        assert!(recorder.drain().is_empty());

        recorder.record(ClassLoadEvent::defined_by("Foo", &app, "file:/w/app.jar"));
        let list = recorder.drain();
        assert_eq!(list.len(), 1);
        assert_eq!(*list.records()[0].loader(), DefiningLoader::App);
        assert_eq!(list.records()[0].origin(), "file:/w/app.jar");
    }

    #[test]
    fn builtin_loader_without_origin_keeps_its_kind() {
        let registry = ClassLoaderRegistry::new();
        let platform = Arc::new(ClassLoader::platform());
        let recorder = ClassListRecorder::new(&registry);

        recorder.record(ClassLoadEvent {
            name: "java/sql/Time".to_owned(),
            loader: Some(platform.clone()),
            origin: None,
            supertypes: Vec::new(),
        });
        recorder.record(ClassLoadEvent::defined_by(
            "java/sql/Date",
            &platform,
            "jrt:/java.sql",
        ));

        let list = recorder.drain();
        let time = &list.records()[0];
        assert_eq!(*time.loader(), DefiningLoader::Platform);
        assert_eq!(time.origin(), UNKNOWN_ORIGIN);
        assert!(!time.is_bootstrap());
        assert_eq!(*list.records()[1].loader(), DefiningLoader::Platform);

        // Without an origin the class cannot be located again.
        let selected = crate::convert_list(&list, &crate::SelectionPolicy::default());
        assert!(!selected.contains("java.sql.Time"));
        assert!(selected.contains("java.sql.Date"));
    }
}
