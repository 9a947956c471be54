use jshare_core::Fingerprint;

/// Reasons a loader registration is refused. Neither variant mutates the
/// registry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("identifier or loader is null")]
    InvalidRegistration,

    #[error(
        "the identifier {identifier} with signature: {signature} is already bound \
         to a class loader with a different signature"
    )]
    DuplicateIdentifierConflict {
        identifier: String,
        signature: Fingerprint,
    },
}
