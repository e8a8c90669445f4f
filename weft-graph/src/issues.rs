//! Recoverable graph problems, collected during compilation

use thiserror::Error;
use weft_core::{DependencyKind, InjectionSite, Token};

/// A structural problem that degrades resolution without failing the compile
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphIssue {
    /// A cycle among module import edges
    #[error("Circular import detected: {}", format_path(.path))]
    CircularImport {
        /// Modules along the cycle, first module repeated at the end
        path: Vec<Token>,
    },

    /// A cycle among provider dependency edges
    #[error("Circular dependency detected: {}{}", format_path(.path), lazy_suffix(.lazy))]
    CircularProviderDependency {
        /// Providers along the cycle, first provider repeated at the end
        path: Vec<Token>,
        /// Whether an edge on the cycle is a declared lazy reference
        lazy: bool,
    },

    /// A dependency that is not visible from the owning module
    #[error("{provider} in {module} depends on {dependency} at {site} ({kind:?}), which is not exported to {module}")]
    UnreachedDependency {
        provider: Token,
        module: Token,
        dependency: Token,
        kind: DependencyKind,
        site: InjectionSite,
    },

    /// A provider token declared more than once; the first declaration is kept
    #[error("Provider {token} declared in {ignored} is ignored; already provided by {kept}")]
    DuplicateProviderToken {
        token: Token,
        kept: Token,
        ignored: Token,
    },
}

impl GraphIssue {
    pub fn is_circular(&self) -> bool {
        matches!(
            self,
            GraphIssue::CircularImport { .. } | GraphIssue::CircularProviderDependency { .. }
        )
    }
}

fn format_path(path: &[Token]) -> String {
    path.iter()
        .map(|token| token.to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}

fn lazy_suffix(lazy: &bool) -> &'static str {
    if *lazy {
        " (through a lazy reference)"
    } else {
        ""
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_circular_messages() {
        let issue = GraphIssue::CircularProviderDependency {
            path: vec!["A".into(), "B".into(), "A".into()],
            lazy: true,
        };
        assert_eq!(
            issue.to_string(),
            "Circular dependency detected: A -> B -> A (through a lazy reference)"
        );
        assert!(issue.is_circular());

        let issue = GraphIssue::CircularImport {
            path: vec!["X".into(), "X".into()],
        };
        assert_eq!(issue.to_string(), "Circular import detected: X -> X");
    }

    #[test]
    fn test_unreached_message_names_site() {
        let issue = GraphIssue::UnreachedDependency {
            provider: "ServiceB".into(),
            module: "M2".into(),
            dependency: "ServiceA".into(),
            kind: DependencyKind::Property,
            site: InjectionSite::Key("service_a".into()),
        };
        let message = issue.to_string();
        assert!(message.contains(".service_a"));
        assert!(message.contains("not exported to M2"));
        assert!(!issue.is_circular());
    }
}
