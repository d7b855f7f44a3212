//! Set indexes over role attributes and role selectors.
//!
//! [`RoleAttributeIndex`] answers "which entities carry attribute X", the
//! hook a query engine uses to resolve attribute predicates.
//! [`PolicyMatchIndex`] answers the inverse question for selectors: "which
//! policies could change their verdict for an entity whose attribute X just
//! appeared or disappeared".

use std::collections::BTreeSet;

use edgeguard_abac::{RoleSelector, RoleToken};
use edgeguard_store::{StoreError, Table, Tx, WriteTx, pair_key, pair_prefix, split_pair};
use edgeguard_types::{EntityKind, PolicyKind, RoleAttributes, Semantic};

use crate::tables::{self, Side};

// ============================================================================
// RoleAttributeIndex
// ============================================================================

/// Attribute -> entity ids, for one entity collection.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RoleAttributeIndex {
    table: Table<()>,
}

impl RoleAttributeIndex {
    pub(crate) fn for_kind(kind: EntityKind) -> Self {
        Self {
            table: tables::role_index_table(kind),
        }
    }

    /// Moves `id` from the `old` attribute rows to the `new` ones, touching
    /// only the attributes that differ.
    pub(crate) fn replace<T: WriteTx + ?Sized>(
        &self,
        tx: &mut T,
        id: &str,
        old: &RoleAttributes,
        new: &RoleAttributes,
    ) -> Result<(), StoreError> {
        for attr in old.difference(new) {
            self.table.delete(tx, &pair_key(attr, id)?)?;
        }
        for attr in new.difference(old) {
            self.table.put(tx, pair_key(attr, id)?, &())?;
        }
        Ok(())
    }

    pub(crate) fn ids_with<T: Tx + ?Sized>(
        &self,
        tx: &T,
        attribute: &str,
    ) -> Result<BTreeSet<String>, StoreError> {
        let prefix = pair_prefix(attribute)?;
        tx.scan_prefix(self.table.name(), &prefix)?
            .into_iter()
            .map(|(key, _)| split_pair(self.table.name(), &key).map(|(_, id)| id))
            .collect()
    }

    /// Entities whose attributes satisfy `values` under `semantic`.
    ///
    /// Returns `None` for an empty `AllOf` predicate, which is satisfied by
    /// every entity and cannot be answered from attribute rows alone.
    pub(crate) fn matching<T, S>(
        &self,
        tx: &T,
        values: &[S],
        semantic: Semantic,
    ) -> Result<Option<BTreeSet<String>>, StoreError>
    where
        T: Tx + ?Sized,
        S: AsRef<str>,
    {
        match semantic {
            Semantic::AnyOf => {
                let mut ids = BTreeSet::new();
                for value in values {
                    ids.extend(self.ids_with(tx, value.as_ref())?);
                }
                Ok(Some(ids))
            }
            Semantic::AllOf => {
                let mut values = values.iter();
                let Some(first) = values.next() else {
                    return Ok(None);
                };
                let mut ids = self.ids_with(tx, first.as_ref())?;
                for value in values {
                    if ids.is_empty() {
                        break;
                    }
                    let with = self.ids_with(tx, value.as_ref())?;
                    ids.retain(|id| with.contains(id));
                }
                Ok(Some(ids))
            }
        }
    }

    /// Every attribute value carried by at least one entity.
    pub(crate) fn distinct<T: Tx + ?Sized>(&self, tx: &T) -> Result<BTreeSet<String>, StoreError> {
        tx.scan_prefix(self.table.name(), &[])?
            .into_iter()
            .map(|(key, _)| split_pair(self.table.name(), &key).map(|(attr, _)| attr))
            .collect()
    }

    /// Ids named by any row, for integrity checks.
    pub(crate) fn contains_id<T: Tx + ?Sized>(&self, tx: &T, id: &str) -> Result<bool, StoreError> {
        for (key, _) in tx.scan_prefix(self.table.name(), &[])? {
            let (_, indexed) = split_pair(self.table.name(), &key)?;
            if indexed == id {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

// ============================================================================
// PolicyMatchIndex
// ============================================================================

/// Index key -> policy ids, for one side of one policy collection.
///
/// A policy is filed under every key of [`RoleSelector::index_keys`]: its
/// literal attributes, its explicit references, and the unconditional key
/// when it matches everything.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PolicyMatchIndex {
    table: Table<()>,
}

impl PolicyMatchIndex {
    pub(crate) fn new(kind: PolicyKind, side: Side) -> Self {
        Self {
            table: tables::match_index_table(kind, side),
        }
    }

    pub(crate) fn file<T: WriteTx + ?Sized>(
        &self,
        tx: &mut T,
        policy: &str,
        selector: &RoleSelector,
    ) -> Result<(), StoreError> {
        for key in selector.index_keys() {
            self.table.put(tx, pair_key(&key, policy)?, &())?;
        }
        Ok(())
    }

    pub(crate) fn unfile<T: WriteTx + ?Sized>(
        &self,
        tx: &mut T,
        policy: &str,
        selector: &RoleSelector,
    ) -> Result<(), StoreError> {
        for key in selector.index_keys() {
            self.table.delete(tx, &pair_key(&key, policy)?)?;
        }
        Ok(())
    }

    /// Policies filed under any of `keys`.
    pub(crate) fn candidates<T, I>(&self, tx: &T, keys: I) -> Result<BTreeSet<String>, StoreError>
    where
        T: Tx + ?Sized,
        I: IntoIterator<Item = String>,
    {
        let mut policies = BTreeSet::new();
        for key in keys {
            let prefix = pair_prefix(&key)?;
            for (row, ()) in self.table.scan_prefix(tx, &prefix)? {
                let (_, policy) = split_pair(self.table.name(), &row)?;
                policies.insert(policy);
            }
        }
        Ok(policies)
    }

    /// Policies whose selector explicitly references `id`.
    pub(crate) fn referencing<T: Tx + ?Sized>(
        &self,
        tx: &T,
        id: &str,
    ) -> Result<BTreeSet<String>, StoreError> {
        self.candidates(tx, [RoleToken::entity_key(id)])
    }
}

// ============================================================================
// Entity lookups by kind
// ============================================================================

/// Ids of every entity in a collection.
pub(crate) fn entity_ids<T: Tx + ?Sized>(tx: &T, kind: EntityKind) -> Result<BTreeSet<String>, StoreError> {
    let table = tables::entity_table(kind);
    tx.scan_prefix(table, &[])?
        .into_iter()
        .map(|(key, _)| {
            String::from_utf8(key.to_vec()).map_err(|_| StoreError::MalformedKey {
                table: table.to_string(),
            })
        })
        .collect()
}

/// Role attributes of one entity, `None` if it does not exist.
pub(crate) fn entity_attributes<T: Tx + ?Sized>(
    tx: &T,
    kind: EntityKind,
    id: &str,
) -> Result<Option<RoleAttributes>, StoreError> {
    let key = id.as_bytes();
    Ok(match kind {
        EntityKind::Service => tables::SERVICES.get(tx, key)?.map(|e| e.role_attributes),
        EntityKind::Identity => tables::IDENTITIES.get(tx, key)?.map(|e| e.role_attributes),
        EntityKind::EdgeRouter => tables::EDGE_ROUTERS.get(tx, key)?.map(|e| e.role_attributes),
    })
}

pub(crate) fn entity_exists<T: Tx + ?Sized>(tx: &T, kind: EntityKind, id: &str) -> Result<bool, StoreError> {
    Ok(tx.get(tables::entity_table(kind), id.as_bytes())?.is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use edgeguard_store::Db;
    use edgeguard_types::role_attributes;

    fn attrs(values: &[&str]) -> RoleAttributes {
        role_attributes(values.iter().copied())
    }

    #[test]
    fn role_index_tracks_replacements() {
        let db = Db::new();
        let mut tx = db.begin_write().unwrap();
        let index = RoleAttributeIndex::for_kind(EntityKind::Service);

        index.replace(&mut tx, "s1", &attrs(&[]), &attrs(&["web", "prod"])).unwrap();
        index.replace(&mut tx, "s2", &attrs(&[]), &attrs(&["web"])).unwrap();
        assert_eq!(index.ids_with(&tx, "web").unwrap().len(), 2);

        index.replace(&mut tx, "s1", &attrs(&["web", "prod"]), &attrs(&["prod"])).unwrap();
        let web: Vec<_> = index.ids_with(&tx, "web").unwrap().into_iter().collect();
        assert_eq!(web, vec!["s2"]);

        let distinct: Vec<_> = index.distinct(&tx).unwrap().into_iter().collect();
        assert_eq!(distinct, vec!["prod", "web"]);
        assert!(index.contains_id(&tx, "s1").unwrap());
        assert!(!index.contains_id(&tx, "s3").unwrap());
    }

    #[test]
    fn role_index_matching_semantics() {
        let db = Db::new();
        let mut tx = db.begin_write().unwrap();
        let index = RoleAttributeIndex::for_kind(EntityKind::Identity);

        index.replace(&mut tx, "a", &attrs(&[]), &attrs(&["x", "y"])).unwrap();
        index.replace(&mut tx, "b", &attrs(&[]), &attrs(&["x"])).unwrap();
        index.replace(&mut tx, "c", &attrs(&[]), &attrs(&["y"])).unwrap();

        let any = index.matching(&tx, &["x", "y"], Semantic::AnyOf).unwrap().unwrap();
        assert_eq!(any.len(), 3);
        let all = index.matching(&tx, &["x", "y"], Semantic::AllOf).unwrap().unwrap();
        assert_eq!(all.into_iter().collect::<Vec<_>>(), vec!["a"]);

        let none: [&str; 0] = [];
        assert!(index.matching(&tx, &none, Semantic::AnyOf).unwrap().unwrap().is_empty());
        assert!(index.matching(&tx, &none, Semantic::AllOf).unwrap().is_none());
    }

    #[test]
    fn match_index_files_by_selector_keys() {
        let db = Db::new();
        let mut tx = db.begin_write().unwrap();
        let index = PolicyMatchIndex::new(PolicyKind::Service, Side::First);

        let web = RoleSelector::parse(&["#web", "@s9"], Semantic::AnyOf).unwrap();
        let everything = RoleSelector::parse(&["#all"], Semantic::AnyOf).unwrap();
        index.file(&mut tx, "p1", &web).unwrap();
        index.file(&mut tx, "p2", &everything).unwrap();

        let hits = index.candidates(&tx, [RoleToken::attribute_key("web")]).unwrap();
        assert_eq!(hits.into_iter().collect::<Vec<_>>(), vec!["p1"]);
        let hits = index
            .candidates(&tx, [edgeguard_abac::UNCONDITIONAL_INDEX_KEY.to_string()])
            .unwrap();
        assert_eq!(hits.into_iter().collect::<Vec<_>>(), vec!["p2"]);
        assert_eq!(index.referencing(&tx, "s9").unwrap().len(), 1);

        index.unfile(&mut tx, "p1", &web).unwrap();
        assert!(index.referencing(&tx, "s9").unwrap().is_empty());
    }
}
