use std::collections::HashSet;
use std::io::Write;
use std::path::Path;

use jshare_core::{binary_name, internal_name, BOOTSTRAP_ORIGIN};
use jshare_registry::LoaderKind;
use serde::{Deserialize, Serialize};

use crate::error::ClassListError;

/// The loader that defined a recorded class.
///
/// Custom loaders are only ever recorded through their registered
/// identifier; a class from an unregistered custom loader has no
/// [`DefiningLoader`] and is not recorded at all.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefiningLoader {
    Boot,
    Platform,
    App,
    Custom(String),
}

impl DefiningLoader {
    pub fn kind(&self) -> LoaderKind {
        match self {
            DefiningLoader::Boot => LoaderKind::Boot,
            DefiningLoader::Platform => LoaderKind::Platform,
            DefiningLoader::App => LoaderKind::App,
            DefiningLoader::Custom(_) => LoaderKind::Custom,
        }
    }

    pub fn identifier(&self) -> Option<&str> {
        match self {
            DefiningLoader::Custom(identifier) => Some(identifier),
            _ => None,
        }
    }

    /// What a line without `builtin:` or `loader:` implies.
    fn implied_by(origin: &str) -> Self {
        if origin == BOOTSTRAP_ORIGIN {
            DefiningLoader::Boot
        } else {
            DefiningLoader::App
        }
    }

    fn builtin_name(&self) -> Option<&'static str> {
        match self {
            DefiningLoader::Boot => Some("boot"),
            DefiningLoader::Platform => Some("platform"),
            DefiningLoader::App => Some("app"),
            DefiningLoader::Custom(_) => None,
        }
    }

    fn parse_builtin(value: &str) -> Option<Self> {
        match value {
            "boot" => Some(DefiningLoader::Boot),
            "platform" => Some(DefiningLoader::Platform),
            "app" => Some(DefiningLoader::App),
            _ => None,
        }
    }
}

/// One class as observed at its first load.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClassRecord {
    name: String,
    origin: String,
    loader: DefiningLoader,
    supertypes: Vec<String>,
}

impl ClassRecord {
    /// `name` may be given in internal or binary form; it is stored in binary
    /// form. The defining loader is the boot loader for a `bootstrap` origin
    /// and the app loader otherwise, until set with [`Self::with_loader`].
    pub fn new(name: &str, origin: impl Into<String>) -> Self {
        let origin = origin.into().trim().to_owned();
        Self {
            name: binary_name(name.trim()),
            loader: DefiningLoader::implied_by(&origin),
            origin,
            supertypes: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_loader(mut self, loader: DefiningLoader) -> Self {
        self.loader = loader;
        self
    }

    /// Marks the record as defined by the custom loader registered under
    /// `identifier`. `None` or a blank identifier restores the loader implied
    /// by the origin.
    #[must_use]
    pub fn with_loader_identifier(mut self, identifier: Option<impl Into<String>>) -> Self {
        let identifier = identifier
            .map(Into::into)
            .map(|identifier: String| identifier.trim().to_owned())
            .filter(|identifier| !identifier.is_empty());
        self.loader = match identifier {
            Some(identifier) => DefiningLoader::Custom(identifier),
            None => DefiningLoader::implied_by(&self.origin),
        };
        self
    }

    /// Superclass first, then interfaces in declaration order.
    #[must_use]
    pub fn with_supertypes<I, S>(mut self, supertypes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.supertypes = supertypes
            .into_iter()
            .map(|s| binary_name(s.as_ref().trim()))
            .filter(|s| !s.is_empty())
            .collect();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn loader(&self) -> &DefiningLoader {
        &self.loader
    }

    pub fn loader_identifier(&self) -> Option<&str> {
        self.loader.identifier()
    }

    pub fn supertypes(&self) -> &[String] {
        &self.supertypes
    }

    pub fn is_bootstrap(&self) -> bool {
        self.origin == BOOTSTRAP_ORIGIN
    }

    pub fn is_file_origin(&self) -> bool {
        self.origin.starts_with("file:")
    }

    /// Identity of the load event: the same name may legitimately be defined
    /// by several loaders.
    fn key(&self) -> (String, DefiningLoader) {
        (self.name.clone(), self.loader.clone())
    }

    /// Formats the record as one classlist line.
    pub fn to_line(&self) -> String {
        let mut line = internal_name(&self.name);
        if !self.supertypes.is_empty() {
            let supers: Vec<String> = self.supertypes.iter().map(|s| internal_name(s)).collect();
            line.push_str(" super: ");
            line.push_str(&supers.join(","));
        }
        line.push_str(" source: ");
        line.push_str(&self.origin);
        match &self.loader {
            DefiningLoader::Custom(identifier) => {
                line.push_str(" loader: ");
                line.push_str(identifier);
            }
            builtin if *builtin != DefiningLoader::implied_by(&self.origin) => {
                line.push_str(" builtin: ");
                line.push_str(builtin.builtin_name().unwrap_or_default());
            }
            _ => {}
        }
        line
    }

    /// Parses one non-comment classlist line.
    ///
    /// ```text
    /// <name> [super: <a>,<b>] [source: <origin>] [builtin: boot|platform|app]
    ///        [loader: <identifier...>]
    /// ```
    ///
    /// `builtin:` and `loader:` are mutually exclusive.
    pub fn parse_line(line: &str) -> Result<Self, String> {
        let mut tokens = line.split_whitespace();
        let name = tokens.next().ok_or_else(|| "empty line".to_owned())?;
        if name.ends_with(':') {
            return Err(format!("expected a class name, found key `{name}`"));
        }

        let mut supertypes: Option<Vec<String>> = None;
        let mut origin: Option<String> = None;
        let mut loader: Option<String> = None;
        let mut builtin: Option<DefiningLoader> = None;

        while let Some(key) = tokens.next() {
            match key {
                "super:" => {
                    if supertypes.is_some() {
                        return Err("duplicate `super:`".to_owned());
                    }
                    let value = tokens
                        .next()
                        .ok_or_else(|| "`super:` is missing a value".to_owned())?;
                    let parsed: Vec<String> = value.split(',').map(str::to_owned).collect();
                    if parsed.iter().any(|s| s.is_empty()) {
                        return Err(format!("empty supertype in `{value}`"));
                    }
                    supertypes = Some(parsed);
                }
                "source:" => {
                    if origin.is_some() {
                        return Err("duplicate `source:`".to_owned());
                    }
                    let value = tokens
                        .next()
                        .ok_or_else(|| "`source:` is missing a value".to_owned())?;
                    origin = Some(value.to_owned());
                }
                "builtin:" => {
                    if builtin.is_some() {
                        return Err("duplicate `builtin:`".to_owned());
                    }
                    let value = tokens
                        .next()
                        .ok_or_else(|| "`builtin:` is missing a value".to_owned())?;
                    builtin = Some(
                        DefiningLoader::parse_builtin(value)
                            .ok_or_else(|| format!("unknown builtin loader `{value}`"))?,
                    );
                }
                "loader:" => {
                    // The identifier is free-form and runs to the end of the line.
                    let rest: Vec<&str> = tokens.by_ref().collect();
                    if rest.is_empty() {
                        return Err("`loader:` is missing a value".to_owned());
                    }
                    loader = Some(rest.join(" "));
                }
                other => return Err(format!("unexpected token `{other}`")),
            }
        }

        let record = ClassRecord::new(
            name,
            origin.unwrap_or_else(|| BOOTSTRAP_ORIGIN.to_owned()),
        )
        .with_supertypes(supertypes.unwrap_or_default());

        match (builtin, loader) {
            (Some(_), Some(_)) => Err("`builtin:` and `loader:` are exclusive".to_owned()),
            (Some(builtin), None) => Ok(record.with_loader(builtin)),
            (None, loader) => Ok(record.with_loader_identifier(loader)),
        }
    }
}

/// Records in first-load order, at most one per `(name, defining loader)`.
#[derive(Clone, Debug, Default)]
pub struct ClassList {
    records: Vec<ClassRecord>,
    seen: HashSet<(String, DefiningLoader)>,
}

impl PartialEq for ClassList {
    fn eq(&self, other: &Self) -> bool {
        self.records == other.records
    }
}

impl Eq for ClassList {}

impl ClassList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `record` unless the same load event is already present.
    ///
    /// Returns whether the record was added.
    pub fn push(&mut self, record: ClassRecord) -> bool {
        if !self.seen.insert(record.key()) {
            return false;
        }
        self.records.push(record);
        true
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ClassRecord> {
        self.records.iter()
    }

    pub fn records(&self) -> &[ClassRecord] {
        &self.records
    }

    pub fn contains(&self, name: &str) -> bool {
        let name = binary_name(name);
        self.records.iter().any(|record| record.name == name)
    }

    /// Parses classlist text. Blank lines and `#` comments are skipped; any
    /// other unparseable line fails the whole parse.
    pub fn parse(text: &str) -> Result<Self, ClassListError> {
        let mut list = ClassList::new();
        for (idx, line) in text.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let record = ClassRecord::parse_line(trimmed).map_err(|reason| {
                ClassListError::MalformedClassListEntry {
                    line: idx + 1,
                    reason,
                }
            })?;
            list.push(record);
        }
        Ok(list)
    }

    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for record in &self.records {
            out.push_str(&record.to_line());
            out.push('\n');
        }
        out
    }

    pub fn read(path: &Path) -> Result<Self, ClassListError> {
        let text = std::fs::read_to_string(path).map_err(|source| ClassListError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    /// Writes the classlist through a temporary file in the same directory so
    /// readers never see a partially written list.
    pub fn write(&self, path: &Path) -> Result<(), ClassListError> {
        let io_err = |source: std::io::Error| ClassListError::Io {
            path: path.to_path_buf(),
            source,
        };
        let parent = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(parent).map_err(io_err)?;

        let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(io_err)?;
        tmp.write_all(self.to_text().as_bytes()).map_err(io_err)?;
        tmp.as_file().sync_all().map_err(io_err)?;
        tmp.persist(path).map_err(|err| io_err(err.error))?;
        Ok(())
    }
}

impl<'a> IntoIterator for &'a ClassList {
    type Item = &'a ClassRecord;
    type IntoIter = std::slice::Iter<'a, ClassRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

impl FromIterator<ClassRecord> for ClassList {
    fn from_iter<T: IntoIterator<Item = ClassRecord>>(iter: T) -> Self {
        let mut list = ClassList::new();
        for record in iter {
            list.push(record);
        }
        list
    }
}
