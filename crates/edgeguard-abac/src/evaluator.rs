//! Role selector evaluation.
//!
//! Matching is a pure function of the selector, the entity's role attribute
//! set, and the entity's identifier. Attribute and identifier comparisons are
//! case-sensitive.

use edgeguard_types::{RoleAttributes, Semantic};
use serde::{Deserialize, Serialize};

use crate::selector::RoleSelector;

// ============================================================================
// Verdict
// ============================================================================

/// Why a selector matched an entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchReason {
    /// The selector holds the `#all` wildcard.
    Wildcard,
    /// The selector is an empty `AllOf` selector.
    VacuousAllOf,
    /// The entity is named by an explicit reference.
    Reference,
    /// The entity carries the listed attributes the selector asked for.
    Attributes(Vec<String>),
}

/// The result of evaluating a selector against one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub matched: bool,
    /// Present exactly when `matched` is true.
    pub reason: Option<MatchReason>,
}

impl Verdict {
    fn matched(reason: MatchReason) -> Self {
        Self {
            matched: true,
            reason: Some(reason),
        }
    }

    fn unmatched() -> Self {
        Self {
            matched: false,
            reason: None,
        }
    }
}

// ============================================================================
// Public API
// ============================================================================

/// Returns `true` if `selector` matches the entity `id` carrying `attributes`.
///
/// - The wildcard matches unconditionally, under either semantic.
/// - `AnyOf`: at least one literal attribute is carried, or `id` is
///   referenced. An empty `AnyOf` selector matches nothing.
/// - `AllOf`: an empty selector matches everything. Otherwise the entity
///   matches if it is referenced, or if the selector has literal attributes
///   and the entity carries all of them.
pub fn matches(selector: &RoleSelector, attributes: &RoleAttributes, id: &str) -> bool {
    evaluate(selector, attributes, id).matched
}

/// Like [`matches`], but also reports the reason for a match.
pub fn evaluate(selector: &RoleSelector, attributes: &RoleAttributes, id: &str) -> Verdict {
    if selector.has_wildcard() {
        return Verdict::matched(MatchReason::Wildcard);
    }

    match selector.semantic() {
        Semantic::AnyOf => {
            if selector.references_entity(id) {
                return Verdict::matched(MatchReason::Reference);
            }
            let carried: Vec<String> = selector
                .attributes()
                .filter(|a| attributes.contains(*a))
                .map(str::to_string)
                .collect();
            if carried.is_empty() {
                Verdict::unmatched()
            } else {
                Verdict::matched(MatchReason::Attributes(carried))
            }
        }
        Semantic::AllOf => {
            if selector.is_empty() {
                return Verdict::matched(MatchReason::VacuousAllOf);
            }
            if selector.references_entity(id) {
                return Verdict::matched(MatchReason::Reference);
            }
            let required: Vec<&str> = selector.attributes().collect();
            if !required.is_empty() && required.iter().all(|a| attributes.contains(*a)) {
                Verdict::matched(MatchReason::Attributes(
                    required.into_iter().map(str::to_string).collect(),
                ))
            } else {
                Verdict::unmatched()
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use edgeguard_types::role_attributes;
    use proptest::prelude::*;
    use test_case::test_case;

    fn sel(roles: &[&str], semantic: Semantic) -> RoleSelector {
        RoleSelector::parse(roles, semantic).expect("valid selector")
    }

    fn attrs(values: &[&str]) -> RoleAttributes {
        role_attributes(values.iter().copied())
    }

    #[test]
    fn empty_any_of_matches_nothing() {
        let s = sel(&[], Semantic::AnyOf);
        assert!(!matches(&s, &attrs(&[]), "e1"));
        assert!(!matches(&s, &attrs(&["web"]), "e1"));
    }

    #[test]
    fn empty_all_of_matches_everything() {
        let s = sel(&[], Semantic::AllOf);
        assert!(matches(&s, &attrs(&[]), "e1"));
        assert!(matches(&s, &attrs(&["web", "db"]), "e2"));
        assert_eq!(
            evaluate(&s, &attrs(&[]), "e1").reason,
            Some(MatchReason::VacuousAllOf)
        );
    }

    #[test_case(Semantic::AnyOf)]
    #[test_case(Semantic::AllOf)]
    fn wildcard_matches_unconditionally(semantic: Semantic) {
        let s = sel(&["#missing", "#all"], semantic);
        assert!(matches(&s, &attrs(&[]), "e1"));
        assert_eq!(
            evaluate(&s, &attrs(&[]), "e1").reason,
            Some(MatchReason::Wildcard)
        );
    }

    #[test]
    fn any_of_unions_attributes_and_references() {
        let s = sel(&["#web", "@e9"], Semantic::AnyOf);
        assert!(matches(&s, &attrs(&["web"]), "e1"));
        assert!(matches(&s, &attrs(&[]), "e9"));
        assert!(!matches(&s, &attrs(&["db"]), "e2"));
    }

    #[test]
    fn all_of_requires_every_literal() {
        let s = sel(&["#web", "#prod"], Semantic::AllOf);
        assert!(matches(&s, &attrs(&["web", "prod", "extra"]), "e1"));
        assert!(!matches(&s, &attrs(&["web"]), "e1"));
        assert!(!matches(&s, &attrs(&[]), "e1"));
    }

    #[test]
    fn all_of_reference_is_satisfied_by_identity() {
        let s = sel(&["#web", "#prod", "@e9"], Semantic::AllOf);
        assert!(matches(&s, &attrs(&[]), "e9"));
        assert!(matches(&s, &attrs(&["web", "prod"]), "e1"));
        assert!(!matches(&s, &attrs(&["web"]), "e1"));
    }

    #[test]
    fn all_of_with_only_references_matches_only_referenced() {
        let s = sel(&["@e9"], Semantic::AllOf);
        assert!(matches(&s, &attrs(&[]), "e9"));
        assert!(!matches(&s, &attrs(&["web"]), "e1"));
    }

    #[test]
    fn comparisons_are_case_sensitive() {
        let s = sel(&["#Web", "@E1"], Semantic::AnyOf);
        assert!(!matches(&s, &attrs(&["web"]), "e1"));
        assert!(matches(&s, &attrs(&["Web"]), "e1"));
        assert!(matches(&s, &attrs(&[]), "E1"));
    }

    #[test]
    fn any_of_reason_lists_carried_attributes() {
        let s = sel(&["#a", "#b", "#c"], Semantic::AnyOf);
        assert_eq!(
            evaluate(&s, &attrs(&["c", "a"]), "e1").reason,
            Some(MatchReason::Attributes(vec!["a".to_string(), "c".to_string()]))
        );
    }

    #[test]
    fn verdict_serializes() {
        let v = evaluate(&sel(&["@e1"], Semantic::AnyOf), &attrs(&[]), "e1");
        let json = serde_json::to_string(&v).expect("serialize verdict");
        assert!(json.contains("Reference"));
    }

    proptest! {
        /// An entity that satisfies an `AllOf` selector also satisfies the
        /// `AnyOf` selector with the same non-empty token list.
        #[test]
        fn all_of_implies_any_of(
            tokens in proptest::collection::vec("[#@][a-c]", 1..4),
            entity_attrs in proptest::collection::btree_set("[a-c]", 0..4),
            id in "[a-c]",
        ) {
            let all_of = RoleSelector::parse(&tokens, Semantic::AllOf).unwrap();
            let any_of = RoleSelector::parse(&tokens, Semantic::AnyOf).unwrap();
            if matches(&all_of, &entity_attrs, &id) {
                prop_assert!(matches(&any_of, &entity_attrs, &id));
            }
        }

        /// Adding attributes never turns a match into a non-match.
        #[test]
        fn matching_is_monotonic_in_attributes(
            tokens in proptest::collection::vec("[#@][a-c]", 0..4),
            base in proptest::collection::btree_set("[a-c]", 0..3),
            extra in "[a-d]",
            all_of: bool,
        ) {
            let semantic = if all_of { Semantic::AllOf } else { Semantic::AnyOf };
            let selector = RoleSelector::parse(&tokens, semantic).unwrap();
            let mut grown = base.clone();
            grown.insert(extra);
            if matches(&selector, &base, "x") {
                prop_assert!(matches(&selector, &grown, "x"));
            }
        }
    }
}
