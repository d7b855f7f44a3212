//! Link integrity checks.
//!
//! Recomputes every relation from scratch by evaluating every policy against
//! every entity, and compares the result with the stored link counts. No
//! index or propagation code is shared with the incremental path.

use std::collections::{BTreeMap, BTreeSet};

use edgeguard_abac::matches;
use edgeguard_types::{EntityKind, RoleAttributes};
use serde::Serialize;

use crate::error::EngineError;
use crate::model::{
    EdgeRouter, EdgeRouterPolicy, Identity, Policy, RoleEntity, Service, ServiceEdgeRouterPolicy,
    ServicePolicy,
};
use crate::propagate::PolicyShape;
use crate::queries::Queries;
use crate::tables::{Relation, Side};

/// A stored link that disagrees with the recomputed relation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkDiscrepancy {
    pub relation: Relation,
    pub a: String,
    pub b: String,
    /// Count on the forward row.
    pub stored: Option<u32>,
    /// Count on the reverse row.
    pub mirrored: Option<u32>,
    /// Number of policies that match both `a` and `b`.
    pub expected: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IntegrityReport {
    pub links_checked: usize,
    pub discrepancies: Vec<LinkDiscrepancy>,
    /// Reverse rows with no forward row, per relation.
    pub orphaned_reverse_rows: BTreeMap<Relation, usize>,
}

impl IntegrityReport {
    pub fn is_consistent(&self) -> bool {
        self.discrepancies.is_empty() && self.orphaned_reverse_rows.is_empty()
    }
}

/// Link counts implied by the current entities and policies.
pub fn expected_links<Q: Queries>(
    q: &Q,
) -> Result<BTreeMap<(Relation, String, String), u32>, EngineError> {
    let mut entities: BTreeMap<EntityKind, Vec<(String, RoleAttributes)>> = BTreeMap::new();
    entities.insert(EntityKind::Service, attributes::<Service, Q>(q)?);
    entities.insert(EntityKind::Identity, attributes::<Identity, Q>(q)?);
    entities.insert(EntityKind::EdgeRouter, attributes::<EdgeRouter, Q>(q)?);

    let mut policies = Vec::new();
    policies.extend(shapes::<ServicePolicy, Q>(q)?);
    policies.extend(shapes::<ServiceEdgeRouterPolicy, Q>(q)?);
    policies.extend(shapes::<EdgeRouterPolicy, Q>(q)?);

    let mut counts = BTreeMap::new();
    for shape in &policies {
        let selected = |side: Side| -> Vec<&str> {
            entities
                .get(&side.entity_kind(shape.kind))
                .into_iter()
                .flatten()
                .filter(|(id, attrs)| matches(shape.selector(side), attrs, id))
                .map(|(id, _)| id.as_str())
                .collect()
        };
        let firsts = selected(Side::First);
        let seconds = selected(Side::Second);
        for a in &firsts {
            for b in &seconds {
                *counts
                    .entry((shape.relation, (*a).to_string(), (*b).to_string()))
                    .or_insert(0) += 1;
            }
        }
    }
    Ok(counts)
}

/// Compares stored links with [`expected_links`].
pub fn check_links<Q: Queries>(q: &Q) -> Result<IntegrityReport, EngineError> {
    let expected = expected_links(q)?;

    let mut stored = BTreeMap::new();
    for relation in Relation::ALL {
        for (a, b, count) in q.links(relation)? {
            stored.insert((relation, a, b), count);
        }
    }

    let keys: BTreeSet<_> = expected.keys().chain(stored.keys()).cloned().collect();
    let mut report = IntegrityReport {
        links_checked: keys.len(),
        discrepancies: Vec::new(),
        orphaned_reverse_rows: BTreeMap::new(),
    };
    for (relation, a, b) in keys {
        let want = expected.get(&(relation, a.clone(), b.clone())).copied().unwrap_or(0);
        let have = stored.get(&(relation, a.clone(), b.clone())).copied();
        let mirrored = relation.links().reverse_count(q.txn(), &a, &b)?;
        if have.unwrap_or(0) != want || mirrored != have {
            report.discrepancies.push(LinkDiscrepancy {
                relation,
                a,
                b,
                stored: have,
                mirrored,
                expected: want,
            });
        }
    }

    for relation in Relation::ALL {
        let forward = stored.keys().filter(|(r, _, _)| *r == relation).count();
        let reverse = relation.links().reverse_len(q.txn())?;
        if reverse > forward {
            report.orphaned_reverse_rows.insert(relation, reverse - forward);
        }
    }

    if !report.is_consistent() {
        tracing::warn!(
            discrepancies = report.discrepancies.len(),
            orphaned = report.orphaned_reverse_rows.values().sum::<usize>(),
            "link integrity check failed"
        );
    }
    Ok(report)
}

fn attributes<E: RoleEntity, Q: Queries>(q: &Q) -> Result<Vec<(String, RoleAttributes)>, EngineError> {
    Ok(q.list::<E>()?
        .into_iter()
        .map(|entity| (entity.id().to_string(), entity.role_attributes().clone()))
        .collect())
}

fn shapes<P: Policy, Q: Queries>(q: &Q) -> Result<Vec<PolicyShape>, EngineError> {
    q.list::<P>()?.iter().map(PolicyShape::of).collect()
}
