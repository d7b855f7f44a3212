//! Role selector definitions.
//!
//! A selector is the validated form of a policy's role text together with
//! the semantic used to combine its tokens.

use std::collections::BTreeSet;

use edgeguard_types::Semantic;

use crate::token::{RoleToken, UNCONDITIONAL_INDEX_KEY};

/// Default upper bound on the number of tokens in one selector.
pub const DEFAULT_MAX_TOKENS: usize = 256;

// ============================================================================
// Errors
// ============================================================================

/// Validation errors for role text.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SelectorError {
    #[error("invalid role token '{token}': {reason}")]
    InvalidToken { token: String, reason: &'static str },

    #[error("selector has {count} tokens, maximum is {max}")]
    TooManyTokens { count: usize, max: usize },
}

// ============================================================================
// RoleSelector
// ============================================================================

/// A parsed role selector.
///
/// Tokens keep the order of the role text; repeated tokens are collapsed to
/// their first occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RoleSelector {
    tokens: Vec<RoleToken>,
    semantic: Semantic,
}

impl RoleSelector {
    /// Parses role text with the default token limit.
    pub fn parse<S: AsRef<str>>(roles: &[S], semantic: Semantic) -> Result<Self, SelectorError> {
        Self::parse_with_limit(roles, semantic, DEFAULT_MAX_TOKENS)
    }

    /// Parses role text, rejecting selectors longer than `max_tokens`.
    pub fn parse_with_limit<S: AsRef<str>>(
        roles: &[S],
        semantic: Semantic,
        max_tokens: usize,
    ) -> Result<Self, SelectorError> {
        if roles.len() > max_tokens {
            return Err(SelectorError::TooManyTokens {
                count: roles.len(),
                max: max_tokens,
            });
        }

        let mut tokens = Vec::with_capacity(roles.len());
        for role in roles {
            let token = RoleToken::parse(role.as_ref())?;
            if !tokens.contains(&token) {
                tokens.push(token);
            }
        }

        Ok(Self { tokens, semantic })
    }

    /// Builds a selector from already-parsed tokens.
    pub fn from_tokens(tokens: Vec<RoleToken>, semantic: Semantic) -> Self {
        let mut deduped = Vec::with_capacity(tokens.len());
        for token in tokens {
            if !deduped.contains(&token) {
                deduped.push(token);
            }
        }
        Self {
            tokens: deduped,
            semantic,
        }
    }

    pub fn tokens(&self) -> &[RoleToken] {
        &self.tokens
    }

    pub fn semantic(&self) -> Semantic {
        self.semantic
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn has_wildcard(&self) -> bool {
        self.tokens.contains(&RoleToken::All)
    }

    /// Returns `true` if the selector matches every entity regardless of
    /// attributes or identity: it holds the wildcard, or it is an empty
    /// `AllOf` selector.
    pub fn is_unconditional(&self) -> bool {
        self.has_wildcard() || (self.semantic == Semantic::AllOf && self.tokens.is_empty())
    }

    /// Literal attribute names, in token order.
    pub fn attributes(&self) -> impl Iterator<Item = &str> {
        self.tokens.iter().filter_map(|t| match t {
            RoleToken::Attribute(name) => Some(name.as_str()),
            _ => None,
        })
    }

    /// Explicitly referenced identifiers, in token order.
    pub fn references(&self) -> impl Iterator<Item = &str> {
        self.tokens.iter().filter_map(|t| match t {
            RoleToken::Entity(id) => Some(id.as_str()),
            _ => None,
        })
    }

    pub fn references_entity(&self, id: &str) -> bool {
        self.references().any(|r| r == id)
    }

    /// Returns a copy of this selector with every reference to `id` removed.
    pub fn without_reference(&self, id: &str) -> Self {
        Self {
            tokens: self
                .tokens
                .iter()
                .filter(|t| !matches!(t, RoleToken::Entity(r) if r == id))
                .cloned()
                .collect(),
            semantic: self.semantic,
        }
    }

    /// Renders the selector back to role text.
    pub fn to_roles(&self) -> Vec<String> {
        self.tokens.iter().map(RoleToken::to_text).collect()
    }

    /// Keys under which the policy match index must file this selector.
    ///
    /// A selector's verdict for an entity can only change when the entity
    /// gains or loses one of the literal attributes filed here. Unconditional
    /// selectors are additionally filed under [`UNCONDITIONAL_INDEX_KEY`]
    /// and references under their `@id` key, so that entity creation can
    /// find them.
    pub fn index_keys(&self) -> BTreeSet<String> {
        let mut keys: BTreeSet<String> = self.tokens.iter().map(RoleToken::index_key).collect();
        keys.remove(&RoleToken::All.index_key());
        if self.is_unconditional() {
            keys.insert(UNCONDITIONAL_INDEX_KEY.to_string());
        }
        keys
    }
}
