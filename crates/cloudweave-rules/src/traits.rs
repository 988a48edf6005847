//! Capability traits shared by every reconcilable rule kind

/// A value with an identity-only serialization.
///
/// The canonical key excludes priority and every id, so two values describing
/// the same policy always produce the same key.
pub trait Comparable {
    fn canonical_key(&self) -> String;
}

/// A value that can be tracked on both sides of a reconciliation.
pub trait Identifiable {
    /// Local (database) id
    fn id(&self) -> Option<&str>;

    /// Id of the object in the remote system
    fn external_id(&self) -> Option<&str>;

    fn set_external_id(&mut self, external_id: Option<String>);
}

/// A value ordered by a provider priority.
pub trait Prioritized {
    fn priority(&self) -> i32;

    fn set_priority(&mut self, priority: i32);
}
