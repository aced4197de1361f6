/// Reference-handling policy applied to the shared composites of a document graph.
///
/// The policy is global to one serialization or parsing operation.
/// Value composites ([`Record`](oxjsongraph::JsonNode::Record) and
/// [`Tuple`](oxjsongraph::JsonNode::Tuple)) are serialized inline whatever the policy.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Default)]
#[non_exhaustive]
pub enum ReferenceHandling {
    /// No identity tracking. This is the fast path: a cyclic graph fails with
    /// [`CycleDetected`](crate::JsonRefSerializeError::CycleDetected) once nesting
    /// reaches the depth ceiling. On the read side, `$`-prefixed names are plain
    /// property names.
    #[default]
    Default,
    /// Track the identities on the current root-to-leaf path and silently drop any
    /// member that would close a loop: the property key is omitted entirely and the
    /// array element is skipped. Duplicates that do not loop are written twice.
    Ignore,
    /// Give every shared composite written in full a `$id` and write a
    /// `{"$ref": "<id>"}` stub at every re-encounter, so cycles and sharing
    /// round-trip. On the read side, enables `$id`/`$ref`/`$values` interpretation.
    Preserve,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_the_fast_path() {
        assert_eq!(ReferenceHandling::default(), ReferenceHandling::Default);
    }
}
