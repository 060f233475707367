use std::collections::HashMap;

use crate::config::{ConfigError, SubjectConfig};

/// Flat mapping from every declared subject id to its canonical (non-alias) subject id.
/// Built once before any target or characteristic is constructed.
#[derive(Debug, Clone, Default)]
pub struct SubjectAliases {
    canonical: HashMap<String, String>,
}

impl SubjectAliases {
    /// Follow each `aliasfor` chain to its end, rejecting dangling and cyclic chains.
    pub(crate) fn build(subjects: &[SubjectConfig]) -> Result<Self, ConfigError> {
        let declared = subjects.iter()
            .map(|s| (s.id.as_str(), s.alias_for.as_deref()))
            .collect::<HashMap<_, _>>();

        let mut canonical = HashMap::with_capacity(subjects.len());
        for subject in subjects {
            let mut current = subject.id.as_str();
            let mut hops = 0;
            while let Some(next) = declared[current] {
                if !declared.contains_key(next) {
                    return Err(ConfigError::UnresolvedReference { kind: "Subject", id: next.to_string() });
                }
                hops += 1;
                if hops > subjects.len() {
                    return Err(ConfigError::AliasCycle(subject.id.clone()));
                }
                current = next;
            }
            canonical.insert(subject.id.clone(), current.to_string());
        }

        Ok(Self { canonical })
    }

    /// Canonical subject id for any declared subject id.
    #[inline]
    pub fn resolve(&self, id: &str) -> Option<&str> {
        self.canonical.get(id).map(String::as_str)
    }

    /// Whether `id` is declared as an alias of another subject.
    #[inline]
    pub fn is_alias(&self, id: &str) -> bool {
        self.resolve(id).is_some_and(|canonical| canonical != id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subject(id: &str, alias_for: Option<&str>) -> SubjectConfig {
        SubjectConfig {
            id: id.into(),
            name: id.into(),
            short_name: id.into(),
            displayed: true,
            sort_key: 0,
            field: None,
            alias_for: alias_for.map(Into::into),
        }
    }

    #[test]
    fn chains_resolve_transitively() {
        let aliases = SubjectAliases::build(&[
            subject("a", Some("b")),
            subject("b", Some("c")),
            subject("c", None),
        ]).unwrap();

        assert_eq!(aliases.resolve("a"), Some("c"));
        assert_eq!(aliases.resolve("b"), Some("c"));
        assert_eq!(aliases.resolve("c"), Some("c"));
        assert!(aliases.is_alias("a"));
        assert!(!aliases.is_alias("c"));
        assert_eq!(aliases.resolve("missing"), None);
    }

    #[test]
    fn cycles_are_rejected() {
        let err = SubjectAliases::build(&[subject("a", Some("b")), subject("b", Some("a"))]).unwrap_err();
        assert!(matches!(err, ConfigError::AliasCycle(_)));
    }

    #[test]
    fn dangling_alias_is_rejected() {
        let err = SubjectAliases::build(&[subject("a", Some("ghost"))]).unwrap_err();
        assert!(matches!(err, ConfigError::UnresolvedReference { kind: "Subject", .. }));
    }
}
