use std::collections::HashSet;

use jshare_core::{is_generated_class, is_shareable_origin};
use serde::{Deserialize, Serialize};

use crate::error::ClassListError;
use crate::record::{ClassList, ClassRecord};

/// Eager selection: which recorded classes are worth putting in the archive.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SelectionPolicy {
    /// Drop lambda forms, proxies and hidden classes.
    pub skip_generated: bool,
    /// Drop a class when one of its supertypes was dropped; it could not be
    /// linked from the archive without it.
    pub require_supertypes: bool,
    /// Binary-name prefixes to leave out (e.g. `com.example.debug.`).
    pub exclude: Vec<String>,
}

impl Default for SelectionPolicy {
    fn default() -> Self {
        Self {
            skip_generated: true,
            require_supertypes: true,
            exclude: Vec::new(),
        }
    }
}

impl SelectionPolicy {
    fn rejects(&self, record: &ClassRecord, dropped: &HashSet<String>) -> Option<&'static str> {
        if !is_shareable_origin(record.origin()) {
            return Some("origin is not shareable");
        }
        if self.skip_generated && is_generated_class(record.name()) {
            return Some("generated class");
        }
        if self
            .exclude
            .iter()
            .any(|prefix| !prefix.is_empty() && record.name().starts_with(prefix.as_str()))
        {
            return Some("excluded by prefix");
        }
        if self.require_supertypes && record.supertypes().iter().any(|s| dropped.contains(s)) {
            return Some("supertype was not selected");
        }
        None
    }
}

/// Parses a raw classlist and applies `policy`.
///
/// An unparseable line fails the whole conversion; silently skipping it
/// would shrink the shared set without anyone noticing.
pub fn convert(input: &str, policy: &SelectionPolicy) -> Result<ClassList, ClassListError> {
    let list = ClassList::parse(input)?;
    Ok(convert_list(&list, policy))
}

/// Applies `policy` to an already parsed list, keeping the relative order of
/// retained records.
pub fn convert_list(input: &ClassList, policy: &SelectionPolicy) -> ClassList {
    let mut out = ClassList::new();
    let mut dropped: HashSet<String> = HashSet::new();

    for record in input {
        if let Some(reason) = policy.rejects(record, &dropped) {
            tracing::debug!(
                target = "jshare.classlist",
                class = record.name(),
                reason,
                "class not selected for sharing"
            );
            dropped.insert(record.name().to_owned());
            continue;
        }
        out.push(record.clone());
    }

    tracing::info!(
        target = "jshare.classlist",
        input = input.len(),
        selected = out.len(),
        "converted classlist"
    );
    out
}
