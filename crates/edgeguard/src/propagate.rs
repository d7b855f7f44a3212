//! Incremental link propagation.
//!
//! Every change that can alter which policies select which entities flows
//! through [`Propagator`], inside the caller's write transaction:
//!
//! ```text
//! entity roles (old -> new) ──┐
//!                             ├──▶ verdict flips ──▶ membership rows
//! policy selectors (old -> new)┘                    └─▶ ref-counted links
//! ```
//!
//! The invariant maintained is that for every relation and pair `(a, b)`,
//! the stored link count equals the number of policies contributing to that
//! relation whose selectors currently match both `a` and `b`. Membership rows
//! record, per policy and side, which entities the selector currently
//! matches; a link count is therefore always the number of policies that
//! hold `a` on one side and `b` on the other.

use std::collections::BTreeSet;

use edgeguard_abac::{RoleSelector, RoleToken, UNCONDITIONAL_INDEX_KEY, matches};
use edgeguard_config::IndexStrategy;
use edgeguard_store::{StoreError, Tx, WriteTx};
use edgeguard_types::{EntityKind, PolicyKind, RoleAttributes};

use crate::error::EngineError;
use crate::index::{self, PolicyMatchIndex, RoleAttributeIndex};
use crate::model::Policy;
use crate::tables::{self, Relation, Side};

// ============================================================================
// Propagation table
// ============================================================================

/// Policy collections, and the side within each, whose selectors range over
/// an entity collection. A role change in that collection re-evaluates
/// exactly these.
pub(crate) fn propagation_targets(kind: EntityKind) -> &'static [(PolicyKind, Side)] {
    match kind {
        EntityKind::Service => &[
            (PolicyKind::Service, Side::First),
            (PolicyKind::ServiceEdgeRouter, Side::First),
        ],
        EntityKind::Identity => &[
            (PolicyKind::Service, Side::Second),
            (PolicyKind::EdgeRouter, Side::First),
        ],
        EntityKind::EdgeRouter => &[
            (PolicyKind::ServiceEdgeRouter, Side::Second),
            (PolicyKind::EdgeRouter, Side::Second),
        ],
    }
}

// ============================================================================
// PolicyShape
// ============================================================================

/// The parts of a policy propagation needs, independent of its collection.
#[derive(Debug, Clone)]
pub(crate) struct PolicyShape {
    pub(crate) kind: PolicyKind,
    pub(crate) id: String,
    pub(crate) relation: Relation,
    pub(crate) first: RoleSelector,
    pub(crate) second: RoleSelector,
}

impl PolicyShape {
    /// Parses the stored role text of `policy`, which was validated when it
    /// was written.
    pub(crate) fn of<P: Policy>(policy: &P) -> Result<Self, EngineError> {
        Self::parse(policy, usize::MAX)
    }

    /// Parses role text supplied by a caller, enforcing the token limit.
    pub(crate) fn parse<P: Policy>(policy: &P, max_tokens: usize) -> Result<Self, EngineError> {
        let selector = |side| {
            RoleSelector::parse_with_limit(policy.roles(side), policy.semantic(), max_tokens)
        };
        Ok(Self {
            kind: P::KIND,
            id: policy.id().to_string(),
            relation: policy.relation(),
            first: selector(Side::First)?,
            second: selector(Side::Second)?,
        })
    }

    pub(crate) fn selector(&self, side: Side) -> &RoleSelector {
        match side {
            Side::First => &self.first,
            Side::Second => &self.second,
        }
    }

    /// Orders `(entity on side, entity on the other side)` as a relation pair.
    fn pair<'a>(side: Side, this: &'a str, other: &'a str) -> (&'a str, &'a str) {
        match side {
            Side::First => (this, other),
            Side::Second => (other, this),
        }
    }
}

/// Loads the shape of a policy that an index or membership row points at.
pub(crate) fn load_shape<T: Tx + ?Sized>(
    tx: &T,
    kind: PolicyKind,
    id: &str,
) -> Result<PolicyShape, EngineError> {
    fn load<P: Policy, T: Tx + ?Sized>(tx: &T, id: &str) -> Result<Option<PolicyShape>, EngineError> {
        P::TABLE
            .get(tx, id.as_bytes())?
            .map(|policy| PolicyShape::of(&policy))
            .transpose()
    }

    let shape = match kind {
        PolicyKind::Service => load::<crate::model::ServicePolicy, T>(tx, id)?,
        PolicyKind::ServiceEdgeRouter => {
            load::<crate::model::ServiceEdgeRouterPolicy, T>(tx, id)?
        }
        PolicyKind::EdgeRouter => load::<crate::model::EdgeRouterPolicy, T>(tx, id)?,
    };
    shape.ok_or_else(|| {
        EngineError::MissingPolicy {
            kind,
            id: id.to_string(),
        }
        .logged()
    })
}

/// Ids of every policy in a collection.
pub(crate) fn policy_ids<T: Tx + ?Sized>(tx: &T, kind: PolicyKind) -> Result<BTreeSet<String>, EngineError> {
    let table = tables::policy_table(kind);
    tx.scan_prefix(table, &[])?
        .into_iter()
        .map(|(key, _)| {
            String::from_utf8(key.to_vec()).map_err(|_| {
                EngineError::from(StoreError::MalformedKey {
                    table: table.to_string(),
                })
            })
        })
        .collect()
}

// ============================================================================
// Propagator
// ============================================================================

#[derive(Debug, Clone, Copy)]
pub(crate) struct Propagator {
    strategy: IndexStrategy,
}

impl Propagator {
    pub(crate) fn new(strategy: IndexStrategy) -> Self {
        Self { strategy }
    }

    // ------------------------------------------------------------------------
    // Entity role changes
    // ------------------------------------------------------------------------

    /// Re-evaluates the policies an entity's role change can affect.
    ///
    /// `old` is `None` for a newly created entity, which starts out matched
    /// by no policy. Creation still consults unconditional and referencing
    /// policies, so an empty attribute set picks up wildcard and empty
    /// `AllOf` selectors immediately.
    pub(crate) fn entity_roles_changed<T: WriteTx + ?Sized>(
        &self,
        tx: &mut T,
        kind: EntityKind,
        id: &str,
        old: Option<&RoleAttributes>,
        new: &RoleAttributes,
    ) -> Result<(), EngineError> {
        for &(policy_kind, side) in propagation_targets(kind) {
            let candidates = self.candidate_policies(tx, policy_kind, side, id, old, new)?;
            tracing::trace!(
                entity = id,
                %policy_kind,
                candidates = candidates.len(),
                "re-evaluating policies"
            );

            for policy in candidates {
                let shape = load_shape(tx, policy_kind, &policy)?;
                let selector = shape.selector(side);
                let was = old.is_some_and(|old| matches(selector, old, id));
                let now = matches(selector, new, id);

                let recorded = tables::membership(policy_kind, side).contains(tx, &policy, id)?;
                if recorded != was {
                    return Err(EngineError::MembershipMismatch {
                        kind: policy_kind,
                        policy,
                        entity: id.to_string(),
                        recorded,
                        expected: was,
                    }
                    .logged());
                }

                match (was, now) {
                    (false, true) => self.join(tx, &shape, side, id)?,
                    (true, false) => self.leave(tx, &shape, side, id)?,
                    _ => {}
                }
            }
        }
        Ok(())
    }

    /// Withdraws a departing entity from every policy that currently holds
    /// it, releasing its link contributions.
    pub(crate) fn entity_removed<T: WriteTx + ?Sized>(
        &self,
        tx: &mut T,
        kind: EntityKind,
        id: &str,
    ) -> Result<(), EngineError> {
        for &(policy_kind, side) in propagation_targets(kind) {
            let holding = tables::membership(policy_kind, side).list_reverse(tx, id)?;
            for policy in holding {
                let shape = load_shape(tx, policy_kind, &policy)?;
                self.leave(tx, &shape, side, id)?;
            }
        }
        Ok(())
    }

    /// Policies of `kind` whose `side` selector explicitly names `id`.
    pub(crate) fn referencing_policies<T: Tx + ?Sized>(
        &self,
        tx: &T,
        kind: PolicyKind,
        side: Side,
        id: &str,
    ) -> Result<BTreeSet<String>, EngineError> {
        if self.strategy == IndexStrategy::Narrowing {
            return Ok(PolicyMatchIndex::new(kind, side).referencing(tx, id)?);
        }

        let mut referencing = BTreeSet::new();
        for policy in policy_ids(tx, kind)? {
            if load_shape(tx, kind, &policy)?.selector(side).references_entity(id) {
                referencing.insert(policy);
            }
        }
        Ok(referencing)
    }

    fn candidate_policies<T: Tx + ?Sized>(
        &self,
        tx: &T,
        kind: PolicyKind,
        side: Side,
        id: &str,
        old: Option<&RoleAttributes>,
        new: &RoleAttributes,
    ) -> Result<BTreeSet<String>, EngineError> {
        if self.strategy == IndexStrategy::FullScan {
            return policy_ids(tx, kind);
        }

        let keys: Vec<String> = match old {
            // Only literal attributes that appeared or disappeared can flip
            // a verdict: wildcards and references ignore attributes.
            Some(old) => old
                .symmetric_difference(new)
                .map(|attr| RoleToken::attribute_key(attr))
                .collect(),
            None => new
                .iter()
                .map(|attr| RoleToken::attribute_key(attr))
                .chain([
                    UNCONDITIONAL_INDEX_KEY.to_string(),
                    RoleToken::entity_key(id),
                ])
                .collect(),
        };
        Ok(PolicyMatchIndex::new(kind, side).candidates(tx, keys)?)
    }

    // ------------------------------------------------------------------------
    // Policy selector changes
    // ------------------------------------------------------------------------

    /// Brings memberships and links from `old` to `new`.
    ///
    /// `old` is `None` for a created policy and `new` is `None` for a
    /// deleted one. When the relation changes (a service policy switching
    /// between Dial and Bind) the old contributions are withdrawn in full
    /// before the new ones are made.
    pub(crate) fn policy_changed<T: WriteTx + ?Sized>(
        &self,
        tx: &mut T,
        old: Option<&PolicyShape>,
        new: Option<&PolicyShape>,
    ) -> Result<(), EngineError> {
        if let (Some(old), Some(new)) = (old, new) {
            if old.relation != new.relation {
                tracing::debug!(
                    policy = %new.id,
                    from = %old.relation,
                    to = %new.relation,
                    "policy relation changed"
                );
                self.policy_changed(tx, Some(old), None)?;
                return self.policy_changed(tx, None, Some(new));
            }
        }

        let Some(shape) = new.or(old) else {
            return Ok(());
        };
        let kind = shape.kind;

        for side in Side::BOTH {
            let index = PolicyMatchIndex::new(kind, side);
            if let Some(old) = old {
                index.unfile(tx, &old.id, old.selector(side))?;
            }
            if let Some(new) = new {
                index.file(tx, &new.id, new.selector(side))?;
            }
        }

        for side in Side::BOTH {
            let members = tables::membership(kind, side);
            let current = members.list(tx, &shape.id)?;
            let target = match new {
                Some(new) => self.evaluate_members(tx, side.entity_kind(kind), new.selector(side))?,
                None => BTreeSet::new(),
            };

            if current != target {
                tracing::debug!(
                    policy = %shape.id,
                    %kind,
                    ?side,
                    joined = target.difference(&current).count(),
                    left = current.difference(&target).count(),
                    "policy membership changed"
                );
            }

            for id in current.difference(&target) {
                self.leave(tx, shape, side, id)?;
            }
            for id in target.difference(&current) {
                self.join(tx, shape, side, id)?;
            }
        }

        // Postcondition: a deleted policy holds nothing
        if new.is_none() {
            for side in Side::BOTH {
                debug_assert!(
                    tables::membership(kind, side)
                        .list(tx, &shape.id)
                        .is_ok_and(|m| m.is_empty())
                );
            }
        }
        Ok(())
    }

    /// Entities of `kind` that `selector` currently matches.
    pub(crate) fn evaluate_members<T: Tx + ?Sized>(
        &self,
        tx: &T,
        kind: EntityKind,
        selector: &RoleSelector,
    ) -> Result<BTreeSet<String>, EngineError> {
        let candidates = if self.strategy == IndexStrategy::FullScan || selector.is_unconditional() {
            index::entity_ids(tx, kind)?
        } else {
            let roles = RoleAttributeIndex::for_kind(kind);
            let mut ids = BTreeSet::new();
            for attr in selector.attributes() {
                ids.extend(roles.ids_with(tx, attr)?);
            }
            ids.extend(selector.references().map(str::to_string));
            ids
        };

        let mut members = BTreeSet::new();
        for id in candidates {
            let Some(attrs) = index::entity_attributes(tx, kind, &id)? else {
                continue;
            };
            if matches(selector, &attrs, &id) {
                members.insert(id);
            }
        }
        Ok(members)
    }

    // ------------------------------------------------------------------------
    // Membership flips
    // ------------------------------------------------------------------------

    /// Records that `shape`'s `side` selector now matches `id`, and links
    /// `id` with every member of the other side.
    fn join<T: WriteTx + ?Sized>(
        &self,
        tx: &mut T,
        shape: &PolicyShape,
        side: Side,
        id: &str,
    ) -> Result<(), EngineError> {
        let added = tables::membership(shape.kind, side).add(tx, &shape.id, id)?;
        debug_assert!(added, "{id} already a member of {}", shape.id);

        let links = shape.relation.links();
        for other in tables::membership(shape.kind, side.other()).list(tx, &shape.id)? {
            let (a, b) = PolicyShape::pair(side, id, &other);
            let count = links.increment(tx, a, b)?;
            tracing::debug!(relation = %shape.relation, a, b, count, policy = %shape.id, "link incremented");
        }
        Ok(())
    }

    /// Reverse of [`Self::join`].
    fn leave<T: WriteTx + ?Sized>(
        &self,
        tx: &mut T,
        shape: &PolicyShape,
        side: Side,
        id: &str,
    ) -> Result<(), EngineError> {
        let removed = tables::membership(shape.kind, side).remove(tx, &shape.id, id)?;
        debug_assert!(removed, "{id} not a member of {}", shape.id);

        let links = shape.relation.links();
        for other in tables::membership(shape.kind, side.other()).list(tx, &shape.id)? {
            let (a, b) = PolicyShape::pair(side, id, &other);
            let count = links.decrement(tx, a, b)?;
            tracing::debug!(relation = %shape.relation, a, b, count, policy = %shape.id, "link decremented");
        }
        Ok(())
    }
}
