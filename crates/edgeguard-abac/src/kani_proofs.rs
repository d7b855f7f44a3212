//! Kani proofs for role selector evaluation
//!
//! These proofs verify matching properties with bounded model checking over
//! small attribute universes.
//!
//! Run with: `cargo kani --tests --harness verify_*`

#[cfg(kani)]
use crate::evaluator;
#[cfg(kani)]
use crate::selector::RoleSelector;
#[cfg(kani)]
use edgeguard_types::{RoleAttributes, Semantic};

#[cfg(kani)]
fn any_semantic() -> Semantic {
    if kani::any() {
        Semantic::AnyOf
    } else {
        Semantic::AllOf
    }
}

#[cfg(kani)]
fn any_attributes() -> RoleAttributes {
    let mut attrs = RoleAttributes::new();
    if kani::any() {
        attrs.insert("a".to_string());
    }
    if kani::any() {
        attrs.insert("b".to_string());
    }
    attrs
}

/// Proof: Evaluation determinism
///
/// **Property**: Same selector, attributes and id always give the same verdict
#[cfg(kani)]
#[kani::proof]
#[kani::unwind(6)]
fn verify_evaluation_determinism() {
    let selector = RoleSelector::parse(&["#a", "@x"], any_semantic()).unwrap();
    let attrs = any_attributes();

    let first = evaluator::evaluate(&selector, &attrs, "x");
    let second = evaluator::evaluate(&selector, &attrs, "x");

    assert_eq!(first, second);
    assert_eq!(first.matched, first.reason.is_some());
}

/// Proof: Wildcard matches unconditionally
///
/// **Property**: A selector holding `#all` matches every entity
#[cfg(kani)]
#[kani::proof]
#[kani::unwind(6)]
fn verify_wildcard_matches_everything() {
    let selector = RoleSelector::parse(&["#b", "#all"], any_semantic()).unwrap();
    let attrs = any_attributes();

    assert!(evaluator::matches(&selector, &attrs, "y"));
}

/// Proof: Empty selectors
///
/// **Property**: Empty `AllOf` matches everything, empty `AnyOf` matches nothing
#[cfg(kani)]
#[kani::proof]
#[kani::unwind(6)]
fn verify_empty_selectors() {
    let empty: [&str; 0] = [];
    let all_of = RoleSelector::parse(&empty, Semantic::AllOf).unwrap();
    let any_of = RoleSelector::parse(&empty, Semantic::AnyOf).unwrap();
    let attrs = any_attributes();

    assert!(evaluator::matches(&all_of, &attrs, "z"));
    assert!(!evaluator::matches(&any_of, &attrs, "z"));
}

/// Proof: `AllOf` literal requirement
///
/// **Property**: Without a reference, `AllOf` matches iff every literal is carried
#[cfg(kani)]
#[kani::proof]
#[kani::unwind(6)]
fn verify_all_of_requires_every_literal() {
    let selector = RoleSelector::parse(&["#a", "#b"], Semantic::AllOf).unwrap();
    let attrs = any_attributes();

    let expected = attrs.contains("a") && attrs.contains("b");
    assert_eq!(evaluator::matches(&selector, &attrs, "z"), expected);
}
