//! Class name conventions.
//!
//! Classlists may spell names in internal form (`java/lang/Object`) or binary
//! form (`java.lang.Object`). In memory everything is binary form.

/// Converts an internal (`/`-separated) name to binary (`.`-separated) form.
pub fn binary_name(name: &str) -> String {
    name.replace('/', ".")
}

/// Converts a binary (`.`-separated) name to internal (`/`-separated) form.
pub fn internal_name(name: &str) -> String {
    name.replace('.', "/")
}

/// Returns `true` for classes spun at runtime (lambda forms, proxies, hidden
/// classes). Their bytes do not exist on any classpath so they never share.
pub fn is_generated_class(name: &str) -> bool {
    let name = binary_name(name);
    name.contains("$$Lambda")
        || name.contains("$Proxy")
        || name
            .rsplit_once('.')
            .map(|(_, tail)| tail.starts_with("0x"))
            .unwrap_or(false)
}
