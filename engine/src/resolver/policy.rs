//! Managed-package predicate and substitution lookup
//!
//! Pure functions over [`PackagePolicy`]; nothing here touches the
//! filesystem or the package manager.

use crate::config::{PackagePolicy, SubstitutionRule};

/// Whether the migration has authority over `name`
///
/// True for the explicit allow-list and for the framework family prefix,
/// except the migration tool's own package (and anything it prefixes).
pub fn is_managed(name: &str, policy: &PackagePolicy) -> bool {
    let name = name.to_lowercase();
    if name.starts_with(&policy.self_package) {
        return false;
    }
    policy
        .managed_packages
        .iter()
        .any(|managed| managed.eq_ignore_ascii_case(&name))
        || name.starts_with(&policy.managed_prefix)
}

/// Substitution rules with at least one trigger satisfied by `is_declared`
pub fn fired_substitutions<'a>(
    policy: &'a PackagePolicy,
    is_declared: impl Fn(&str) -> bool,
) -> Vec<&'a SubstitutionRule> {
    policy
        .substitutions
        .iter()
        .filter(|rule| rule.triggers.iter().any(|t| is_declared(t)))
        .collect()
}
