//! # edgeguard-abac: Role selectors
//!
//! Policies select their participants by role attribute rather than by
//! identifier. A [`RoleSelector`] is an ordered list of [`RoleToken`]s plus a
//! [`Semantic`](edgeguard_types::Semantic) that says how they combine.
//!
//! ## Token Grammar
//!
//! | Text       | Token                     | Matches                               |
//! |------------|---------------------------|---------------------------------------|
//! | `#all`     | [`RoleToken::All`]        | every entity in the collection        |
//! | `#<attr>`  | [`RoleToken::Attribute`]  | entities carrying `<attr>`            |
//! | `@<id>`    | [`RoleToken::Entity`]     | exactly the entity with id `<id>`     |
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │  Role text owned by a policy                 │
//! │  ["#web", "@svc-1"] + AnyOf                  │
//! └─────────────────┬───────────────────────────┘
//!                   │ RoleSelector::parse
//!                   ▼
//! ┌─────────────────────────────────────────────┐
//! │  RoleSelector                                │
//! │  ├─ validated tokens                         │
//! │  └─ index keys for the policy match index    │
//! └─────────────────┬───────────────────────────┘
//!                   │ evaluator::evaluate
//!                   ▼
//! ┌─────────────────────────────────────────────┐
//! │  Verdict (matched + reason)                  │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Examples
//!
//! ```
//! use edgeguard_abac::{RoleSelector, matches};
//! use edgeguard_types::{Semantic, role_attributes};
//!
//! let selector = RoleSelector::parse(&["#web", "@svc-9"], Semantic::AnyOf).unwrap();
//!
//! assert!(matches(&selector, &role_attributes(["web"]), "svc-1"));
//! assert!(matches(&selector, &role_attributes(Vec::<String>::new()), "svc-9"));
//! assert!(!matches(&selector, &role_attributes(["db"]), "svc-2"));
//! ```

pub mod evaluator;
pub mod selector;
pub mod token;

// Kani proofs for bounded model checking
#[cfg(any(test, kani))]
mod kani_proofs;

pub use evaluator::{MatchReason, Verdict, evaluate, matches};
pub use selector::{DEFAULT_MAX_TOKENS, RoleSelector, SelectorError};
pub use token::{ALL_TOKEN, RoleToken, UNCONDITIONAL_INDEX_KEY};
