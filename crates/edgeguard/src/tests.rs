//! Unit tests for edgeguard
//!
//! Each test drives the engine through its public mutation API and checks
//! the derived links through the read surface.

use std::collections::BTreeSet;
use std::sync::Arc;

use edgeguard_config::{EngineConfig, IndexStrategy, SelectorConfig};
use edgeguard_types::{
    ConfigId, EdgeRouterId, EntityKind, IdentityId, PolicyId, PolicyKind, PolicyType,
    Semantic, ServiceId, SessionId, SessionKind, role_attributes,
};
use test_case::test_case;

use crate::*;


// ============================================================================
// Test Helpers
// ============================================================================

fn sid(id: &str) -> ServiceId {
    ServiceId::new(id)
}

fn iid(id: &str) -> IdentityId {
    IdentityId::new(id)
}

fn pid(id: &str) -> PolicyId {
    PolicyId::new(id)
}

fn ids(values: &[&str]) -> BTreeSet<String> {
    values.iter().map(ToString::to_string).collect()
}

fn engine(strategy: IndexStrategy) -> Engine {
    Engine::new(
        EngineConfig {
            index_strategy: strategy,
            ..EngineConfig::default()
        },
        Arc::new(NoopNotifier),
    )
}

fn recording_engine() -> (Engine, Arc<RecordingNotifier>) {
    let notifier = Arc::new(RecordingNotifier::new());
    let engine = Engine::new(EngineConfig::default(), notifier.clone());
    (engine, notifier)
}

fn dial_policy(id: &str, semantic: Semantic, services: &[&str], identities: &[&str]) -> ServicePolicy {
    ServicePolicy::new(id, id, PolicyType::Dial)
        .with_semantic(semantic)
        .with_service_roles(services.iter().copied())
        .with_identity_roles(identities.iter().copied())
}

fn dial_count(engine: &Engine, service: &str, identity: &str) -> Option<u32> {
    engine
        .view(|s| s.link_count(Relation::ServiceDialIdentities, service, identity))
        .expect("read link count")
}

fn assert_consistent(engine: &Engine) {
    let report = engine.check_integrity().expect("integrity check");
    assert!(report.is_consistent(), "{report:#?}");
}

// ============================================================================
// End-to-end scenarios
// ============================================================================

#[test_case(IndexStrategy::Narrowing)]
#[test_case(IndexStrategy::FullScan)]
fn empty_all_of_bind_policy_binds_unattributed_entities(strategy: IndexStrategy) {
    let engine = engine(strategy);
    engine
        .update(|m| {
            m.create_service(Service::new("S", "S"))?;
            m.create_identity(Identity::new("I", "I"))?;
            m.create_service_policy(
                ServicePolicy::new("P", "P", PolicyType::Bind).with_semantic(Semantic::AllOf),
            )
        })
        .unwrap();

    assert!(engine.view(|s| s.is_bindable_by_identity(&sid("S"), &iid("I"))).unwrap());
    assert!(!engine.view(|s| s.is_dialable_by_identity(&sid("S"), &iid("I"))).unwrap());
    assert_consistent(&engine);
}

#[test_case(IndexStrategy::Narrowing)]
#[test_case(IndexStrategy::FullScan)]
fn removing_attribute_unlinks_pair(strategy: IndexStrategy) {
    let engine = engine(strategy);
    engine
        .update(|m| {
            m.create_service(Service::new("S", "S").with_role_attributes(["web"]))?;
            m.create_identity(Identity::new("I", "I"))?;
            m.create_service_policy(dial_policy("P", Semantic::AnyOf, &["#web"], &["#all"]))
        })
        .unwrap();
    assert_eq!(dial_count(&engine, "S", "I"), Some(1));

    engine
        .update(|m| m.set_role_attributes(EntityKind::Service, "S", role_attributes(Vec::<String>::new())))
        .unwrap();

    assert_eq!(dial_count(&engine, "S", "I"), None);
    let linked = engine
        .view(|s| s.linked_entities(Relation::ServiceDialIdentities, "S"))
        .unwrap();
    assert!(linked.is_empty());
    assert_consistent(&engine);
}

#[test_case(IndexStrategy::Narrowing)]
#[test_case(IndexStrategy::FullScan)]
fn link_count_follows_contributing_policies(strategy: IndexStrategy) {
    let engine = engine(strategy);
    engine
        .update(|m| {
            m.create_service(Service::new("S", "S").with_role_attributes(["web"]))?;
            m.create_identity(Identity::new("I", "I").with_role_attributes(["staff"]))?;
            m.create_service_policy(dial_policy("P1", Semantic::AnyOf, &["#web"], &["#staff"]))?;
            m.create_service_policy(dial_policy("P2", Semantic::AnyOf, &["@S"], &["#all"]))
        })
        .unwrap();
    assert_eq!(dial_count(&engine, "S", "I"), Some(2));

    engine.update(|m| m.delete_service_policy(&pid("P1"))).unwrap();
    assert_eq!(dial_count(&engine, "S", "I"), Some(1));
    assert!(engine.view(|s| s.is_dialable_by_identity(&sid("S"), &iid("I"))).unwrap());

    engine.update(|m| m.delete_service_policy(&pid("P2"))).unwrap();
    assert_eq!(dial_count(&engine, "S", "I"), None);
    assert!(!engine.view(|s| s.is_dialable_by_identity(&sid("S"), &iid("I"))).unwrap());
    assert_consistent(&engine);
}

// ============================================================================
// Link properties
// ============================================================================

#[test]
fn listed_links_are_exactly_positive_counts() {
    let engine = Engine::in_memory();
    engine
        .update(|m| {
            for (id, attrs) in [("s1", vec!["web"]), ("s2", vec!["db"]), ("s3", vec![])] {
                m.create_service(Service::new(id, id).with_role_attributes(attrs))?;
            }
            for (id, attrs) in [("i1", vec!["dev"]), ("i2", vec!["ops"])] {
                m.create_identity(Identity::new(id, id).with_role_attributes(attrs))?;
            }
            m.create_service_policy(dial_policy("p1", Semantic::AnyOf, &["#web", "#db"], &["#dev"]))?;
            m.create_service_policy(dial_policy("p2", Semantic::AnyOf, &["#all"], &["#ops", "@i1"]))
        })
        .unwrap();

    engine
        .view(|s| {
            let links = s.links(Relation::ServiceDialIdentities)?;
            assert_eq!(links.len(), 6);
            for (a, b, count) in &links {
                assert!(*count > 0);
                assert!(s.linked_entities(Relation::ServiceDialIdentities, a)?.contains(b));
                assert!(s.reverse_linked_entities(Relation::ServiceDialIdentities, b)?.contains(a));
            }
            for service in ["s1", "s2", "s3"] {
                for identity in s.linked_entities(Relation::ServiceDialIdentities, service)? {
                    assert!(s.link_count(Relation::ServiceDialIdentities, service, &identity)?.is_some());
                }
            }
            assert_eq!(s.link_count(Relation::ServiceDialIdentities, "s1", "i1")?, Some(2));
            assert_eq!(s.link_count(Relation::ServiceDialIdentities, "s3", "i1")?, Some(1));
            Ok(())
        })
        .unwrap();
    assert_consistent(&engine);
}

#[test_case(IndexStrategy::Narrowing)]
#[test_case(IndexStrategy::FullScan)]
fn reapplying_same_attributes_is_a_no_op(strategy: IndexStrategy) {
    let engine = engine(strategy);
    engine
        .update(|m| {
            m.create_service(Service::new("s1", "s1").with_role_attributes(["web", "prod"]))?;
            m.create_identity(Identity::new("i1", "i1"))?;
            m.create_service_policy(dial_policy("p1", Semantic::AllOf, &["#web", "#prod"], &[]))
        })
        .unwrap();

    let attrs = role_attributes(["web", "prod"]);
    engine
        .update(|m| m.set_role_attributes(EntityKind::Service, "s1", attrs.clone()))
        .unwrap();
    let first = engine.view(|s| s.links(Relation::ServiceDialIdentities)).unwrap();
    engine
        .update(|m| m.set_role_attributes(EntityKind::Service, "s1", attrs.clone()))
        .unwrap();
    let second = engine.view(|s| s.links(Relation::ServiceDialIdentities)).unwrap();

    assert_eq!(first, second);
    assert_eq!(first, vec![("s1".to_string(), "i1".to_string(), 1)]);
}

#[test_case(IndexStrategy::Narrowing)]
#[test_case(IndexStrategy::FullScan)]
fn deleting_referenced_entity_strips_references_and_links(strategy: IndexStrategy) {
    let engine = engine(strategy);
    engine
        .update(|m| {
            m.create_service(Service::new("s1", "s1").with_role_attributes(["web"]))?;
            m.create_service(Service::new("s2", "s2").with_role_attributes(["web"]))?;
            m.create_identity(Identity::new("i1", "i1"))?;
            m.create_edge_router(EdgeRouter::new("r1", "r1"))?;
            m.create_service_policy(dial_policy("p1", Semantic::AnyOf, &["@s1", "#web"], &["@i1"]))?;
            m.create_service_edge_router_policy(
                ServiceEdgeRouterPolicy::new("serp", "serp")
                    .with_service_roles(["@s1"])
                    .with_edge_router_roles(["#all"]),
            )
        })
        .unwrap();
    assert_eq!(dial_count(&engine, "s1", "i1"), Some(1));

    engine.update(|m| m.delete_service(&sid("s1"))).unwrap();

    engine
        .view(|s| {
            let p1 = s.load::<ServicePolicy>("p1")?.expect("policy kept");
            assert_eq!(p1.service_roles, vec!["#web"]);
            assert_eq!(p1.identity_roles, vec!["@i1"]);
            let serp = s.load::<ServiceEdgeRouterPolicy>("serp")?.expect("policy kept");
            assert!(serp.service_roles.is_empty());

            for relation in Relation::ALL {
                for (a, b, _) in s.links(relation)? {
                    assert_ne!(a, "s1");
                    assert_ne!(b, "s1");
                }
            }
            assert!(s.role_attributes(EntityKind::Service, "s1")?.is_none());
            assert_eq!(s.link_count(Relation::ServiceDialIdentities, "s2", "i1")?, Some(1));
            Ok(())
        })
        .unwrap();
    assert_consistent(&engine);
}

#[test_case(IndexStrategy::Narrowing)]
#[test_case(IndexStrategy::FullScan)]
fn created_entity_matches_vacuous_selector_immediately(strategy: IndexStrategy) {
    let engine = engine(strategy);
    engine
        .update(|m| {
            m.create_identity(Identity::new("i1", "i1"))?;
            m.create_identity(Identity::new("i2", "i2").with_role_attributes(["ops"]))?;
            m.create_service_policy(
                ServicePolicy::new("p1", "p1", PolicyType::Dial).with_semantic(Semantic::AllOf),
            )
        })
        .unwrap();

    engine.update(|m| m.create_service(Service::new("s1", "s1"))).unwrap();

    assert_eq!(dial_count(&engine, "s1", "i1"), Some(1));
    assert_eq!(dial_count(&engine, "s1", "i2"), Some(1));
    assert_consistent(&engine);
}

#[test]
fn created_entity_matches_wildcard_and_reference_immediately() {
    let engine = Engine::in_memory();
    engine
        .update(|m| {
            m.create_identity(Identity::new("i1", "i1"))?;
            m.create_edge_router(EdgeRouter::new("r1", "r1"))?;
            m.create_edge_router_policy(
                EdgeRouterPolicy::new("erp", "erp")
                    .with_identity_roles(["#all"])
                    .with_edge_router_roles(["@r1"]),
            )
        })
        .unwrap();

    engine.update(|m| m.create_identity(Identity::new("i2", "i2"))).unwrap();
    let routers = engine
        .view(|s| s.linked_entities(Relation::IdentityEdgeRouters, "i2"))
        .unwrap();
    assert_eq!(routers, ids(&["r1"]));
}

// ============================================================================
// Policy changes
// ============================================================================

#[test]
fn policy_selector_update_reevaluates_both_sides() {
    let engine = Engine::in_memory();
    engine
        .update(|m| {
            m.create_service(Service::new("s1", "s1").with_role_attributes(["web"]))?;
            m.create_service(Service::new("s2", "s2").with_role_attributes(["db"]))?;
            m.create_identity(Identity::new("i1", "i1").with_role_attributes(["dev"]))?;
            m.create_identity(Identity::new("i2", "i2").with_role_attributes(["ops"]))?;
            m.create_service_policy(dial_policy("p1", Semantic::AnyOf, &["#web"], &["#dev"]))
        })
        .unwrap();
    assert_eq!(dial_count(&engine, "s1", "i1"), Some(1));

    engine
        .update(|m| m.update_service_policy(dial_policy("p1", Semantic::AnyOf, &["#db"], &["#dev", "#ops"])))
        .unwrap();

    let links = engine.view(|s| s.links(Relation::ServiceDialIdentities)).unwrap();
    assert_eq!(
        links,
        vec![
            ("s2".to_string(), "i1".to_string(), 1),
            ("s2".to_string(), "i2".to_string(), 1),
        ]
    );
    let members = engine
        .view(|s| s.policy_members(PolicyKind::Service, &pid("p1"), Side::Second))
        .unwrap();
    assert_eq!(members, ids(&["i1", "i2"]));
    assert_consistent(&engine);
}

#[test]
fn policy_type_change_moves_links_between_relations() {
    let engine = Engine::in_memory();
    engine
        .update(|m| {
            m.create_service(Service::new("s1", "s1"))?;
            m.create_identity(Identity::new("i1", "i1"))?;
            m.create_service_policy(dial_policy("p1", Semantic::AnyOf, &["#all"], &["#all"]))
        })
        .unwrap();
    assert!(engine.view(|s| s.is_dialable_by_identity(&sid("s1"), &iid("i1"))).unwrap());

    let mut bind = dial_policy("p1", Semantic::AnyOf, &["#all"], &["#all"]);
    bind.policy_type = PolicyType::Bind;
    engine.update(|m| m.update_service_policy(bind)).unwrap();

    assert!(!engine.view(|s| s.is_dialable_by_identity(&sid("s1"), &iid("i1"))).unwrap());
    assert!(engine.view(|s| s.is_bindable_by_identity(&sid("s1"), &iid("i1"))).unwrap());
    assert_consistent(&engine);
}

#[test]
fn all_of_reference_matches_without_attributes() {
    let engine = Engine::in_memory();
    engine
        .update(|m| {
            m.create_service(Service::new("s1", "s1"))?;
            m.create_service(Service::new("s2", "s2").with_role_attributes(["web", "prod"]))?;
            m.create_service(Service::new("s3", "s3").with_role_attributes(["web"]))?;
            m.create_identity(Identity::new("i1", "i1"))?;
            m.create_service_policy(dial_policy("p1", Semantic::AllOf, &["#web", "#prod", "@s1"], &[]))
        })
        .unwrap();

    let linked = engine
        .view(|s| s.reverse_linked_entities(Relation::ServiceDialIdentities, "i1"))
        .unwrap();
    assert_eq!(linked, ids(&["s1", "s2"]));
}

#[test]
fn stripping_last_all_of_reference_widens_selector() {
    let engine = Engine::in_memory();
    engine
        .update(|m| {
            m.create_service(Service::new("s1", "s1"))?;
            m.create_service(Service::new("s2", "s2"))?;
            m.create_identity(Identity::new("i1", "i1"))?;
            m.create_service_policy(dial_policy("p1", Semantic::AllOf, &["@s1"], &["#all"]))
        })
        .unwrap();
    assert_eq!(dial_count(&engine, "s2", "i1"), None);

    engine.update(|m| m.delete_service(&sid("s1"))).unwrap();

    // An empty AllOf selector matches every service.
    assert_eq!(dial_count(&engine, "s2", "i1"), Some(1));
    assert_consistent(&engine);
}

#[test]
fn service_edge_router_policy_maintains_reachability() {
    let engine = Engine::in_memory();
    engine
        .update(|m| {
            m.create_service(Service::new("s1", "s1").with_role_attributes(["web"]))?;
            m.create_identity(Identity::new("i1", "i1").with_role_attributes(["dev"]))?;
            m.create_edge_router(EdgeRouter::new("r1", "r1").with_role_attributes(["eu"]))?;
            m.create_edge_router(EdgeRouter::new("r2", "r2").with_role_attributes(["us"]))?;
            m.create_service_policy(dial_policy("sp", Semantic::AnyOf, &["#web"], &["#dev"]))?;
            m.create_service_edge_router_policy(
                ServiceEdgeRouterPolicy::new("serp", "serp")
                    .with_service_roles(["#web"])
                    .with_edge_router_roles(["#all"]),
            )?;
            m.create_edge_router_policy(
                EdgeRouterPolicy::new("erp", "erp")
                    .with_identity_roles(["#dev"])
                    .with_edge_router_roles(["#eu"]),
            )
        })
        .unwrap();

    let report = engine.advise(&iid("i1"), &sid("s1")).unwrap();
    assert!(report.dial.allowed);
    assert_eq!(report.dial.policies, ids(&["sp"]));
    assert!(!report.bind.allowed);
    assert_eq!(report.service_edge_routers, ids(&["r1", "r2"]));
    assert_eq!(report.identity_edge_routers, ids(&["r1"]));
    assert_eq!(report.common_edge_routers, ids(&["r1"]));
    assert!(report.can_dial());
    assert!(report.to_string().contains("dial: allowed via sp"));

    engine
        .update(|m| m.set_role_attributes(EntityKind::EdgeRouter, "r1", role_attributes(["us"])))
        .unwrap();
    let report = engine.advise(&iid("i1"), &sid("s1")).unwrap();
    assert!(report.common_edge_routers.is_empty());
    assert!(!report.can_dial());

    engine.update(|m| m.delete_edge_router(&EdgeRouterId::new("r2"))).unwrap();
    let routers = engine
        .view(|s| s.linked_entities(Relation::ServiceEdgeRouters, "s1"))
        .unwrap();
    assert_eq!(routers, ids(&["r1"]));
    assert_consistent(&engine);
}

// ============================================================================
// Validation
// ============================================================================

#[test]
fn malformed_role_text_is_rejected_without_effect() {
    let engine = Engine::in_memory();
    engine.update(|m| m.create_service(Service::new("s1", "s1"))).unwrap();

    let err = engine
        .update(|m| m.create_service_policy(dial_policy("p1", Semantic::AnyOf, &["web"], &["#all"])))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(engine.view(|s| s.load::<ServicePolicy>("p1")).unwrap().is_none());
}

#[test]
fn unknown_reference_is_rejected() {
    let engine = Engine::in_memory();
    let err = engine
        .update(|m| m.create_service_policy(dial_policy("p1", Semantic::AnyOf, &["@ghost"], &[])))
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::UnknownReference { kind: EntityKind::Service, .. }
    ));
}

#[test]
fn selector_token_limit_comes_from_config() {
    let engine = Engine::in_memory().with_selector_config(SelectorConfig { max_tokens: 2 });
    let err = engine
        .update(|m| m.create_service_policy(dial_policy("p1", Semantic::AnyOf, &["#a", "#b", "#c"], &[])))
        .unwrap_err();
    assert!(matches!(err, EngineError::Selector(_)));
}

#[test]
fn stored_role_text_is_normalized() {
    let engine = Engine::in_memory();
    engine
        .update(|m| m.create_service_policy(dial_policy("p1", Semantic::AnyOf, &["#web", "#web", "#db"], &[])))
        .unwrap();
    let policy = engine.view(|s| s.load::<ServicePolicy>("p1")).unwrap().unwrap();
    assert_eq!(policy.service_roles, vec!["#web", "#db"]);
}

#[test]
fn names_are_unique_per_collection() {
    let engine = Engine::in_memory();
    engine
        .update(|m| {
            m.create_service(Service::new("s1", "web"))?;
            m.create_identity(Identity::new("i1", "web"))
        })
        .unwrap();

    let err = engine.update(|m| m.create_service(Service::new("s2", "web"))).unwrap_err();
    assert!(matches!(err, EngineError::DuplicateName { .. }));

    engine.update(|m| m.update_service(Service::new("s1", "web-v2"))).unwrap();
    engine.update(|m| m.create_service(Service::new("s2", "web"))).unwrap();

    let renamed = engine.view(|s| s.load_by_name::<Service>("web-v2")).unwrap().unwrap();
    assert_eq!(renamed.id, sid("s1"));
    let reused = engine.view(|s| s.load_by_name::<Service>("web")).unwrap().unwrap();
    assert_eq!(reused.id, sid("s2"));
}

#[test]
fn missing_fields_and_duplicates_are_validation_errors() {
    let engine = Engine::in_memory();
    let err = engine.update(|m| m.create_service(Service::new("", "x"))).unwrap_err();
    assert!(matches!(err, EngineError::MissingField { field: "id", .. }));
    let err = engine.update(|m| m.create_identity(Identity::new("i1", ""))).unwrap_err();
    assert!(matches!(err, EngineError::MissingField { field: "name", .. }));

    engine.update(|m| m.create_identity(Identity::new("i1", "a"))).unwrap();
    let err = engine.update(|m| m.create_identity(Identity::new("i1", "b"))).unwrap_err();
    assert!(matches!(err, EngineError::AlreadyExists { .. }));
    let err = engine.update(|m| m.delete_identity(&iid("nope"))).unwrap_err();
    assert!(matches!(err, EngineError::NotFound { .. }));
}

#[test]
fn over_long_fields_are_rejected_before_any_write() {
    let engine = Engine::in_memory();
    let long = "x".repeat(MAX_FIELD_LEN + 1);

    let err = engine
        .update(|m| m.create_service(Service::new("s1", "s1").with_role_attributes([long.as_str()])))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(matches!(err, EngineError::FieldTooLong { field: "role_attributes", .. }));

    let err = engine.update(|m| m.create_identity(Identity::new(long.as_str(), "i1"))).unwrap_err();
    assert!(matches!(err, EngineError::FieldTooLong { field: "id", len, max, .. } if len == max + 1));

    let err = engine.update(|m| m.create_identity(Identity::new("i1", long.as_str()))).unwrap_err();
    assert!(matches!(err, EngineError::FieldTooLong { field: "name", .. }));

    let selector = format!("#{long}");
    let err = engine
        .update(|m| m.create_service_policy(dial_policy("p1", Semantic::AnyOf, &[selector.as_str()], &["#all"])))
        .unwrap_err();
    assert!(matches!(err, EngineError::FieldTooLong { field: "roles", .. }));

    engine
        .view(|s| {
            assert!(s.load::<Service>("s1")?.is_none());
            assert!(s.load::<Identity>("i1")?.is_none());
            assert!(s.load::<ServicePolicy>("p1")?.is_none());
            Ok(())
        })
        .unwrap();

    let longest = "y".repeat(MAX_FIELD_LEN);
    engine
        .update(|m| m.create_service(Service::new("s1", "s1").with_role_attributes([longest.as_str()])))
        .unwrap();
    assert_eq!(
        engine.view(|s| s.role_attributes(EntityKind::Service, "s1")).unwrap(),
        Some(role_attributes([longest]))
    );
    assert_consistent(&engine);
}

// ============================================================================
// Sessions
// ============================================================================

#[test]
fn sessions_require_access_and_die_with_their_endpoints() {
    let engine = Engine::in_memory();
    engine
        .update(|m| {
            m.create_service(Service::new("s1", "s1"))?;
            m.create_identity(Identity::new("i1", "i1"))?;
            m.create_identity(Identity::new("i2", "i2"))?;
            m.create_service_policy(dial_policy("p1", Semantic::AnyOf, &["@s1"], &["@i1"]))
        })
        .unwrap();

    let err = engine
        .update(|m| m.create_session(Session::new("x", "s1", "i2", SessionKind::Dial)))
        .unwrap_err();
    assert!(matches!(err, EngineError::AccessDenied { access: "dial", .. }));
    let err = engine
        .update(|m| m.create_session(Session::new("x", "s1", "i1", SessionKind::Bind)))
        .unwrap_err();
    assert!(matches!(err, EngineError::AccessDenied { access: "bind", .. }));

    engine
        .update(|m| m.create_session(Session::new("x1", "s1", "i1", SessionKind::Dial)))
        .unwrap();
    engine
        .update(|m| m.create_session(Session::new("x2", "s1", "i1", SessionKind::Dial)))
        .unwrap();
    assert_eq!(engine.view(|s| s.sessions_for_service(&sid("s1"))).unwrap().len(), 2);

    engine.update(|m| m.delete_session(&SessionId::new("x1"))).unwrap();
    engine.update(|m| m.delete_identity(&iid("i1"))).unwrap();

    engine
        .view(|s| {
            assert!(s.load::<Session>("x2")?.is_none());
            assert!(s.sessions_for_service(&sid("s1"))?.is_empty());
            assert!(s.sessions_for_identity(&iid("i1"))?.is_empty());
            Ok(())
        })
        .unwrap();
}

#[test]
fn deleting_service_deletes_its_sessions() {
    let engine = Engine::in_memory();
    engine
        .update(|m| {
            m.create_service(Service::new("s1", "s1"))?;
            m.create_identity(Identity::new("i1", "i1"))?;
            m.create_service_policy(
                ServicePolicy::new("p1", "p1", PolicyType::Bind)
                    .with_service_roles(["#all"])
                    .with_identity_roles(["#all"]),
            )?;
            m.create_session(Session::new("x1", "s1", "i1", SessionKind::Bind))
        })
        .unwrap();

    engine.update(|m| m.delete_service(&sid("s1"))).unwrap();
    assert!(engine.view(|s| s.load::<Session>("x1")).unwrap().is_none());
    assert!(engine.view(|s| s.sessions_for_identity(&iid("i1"))).unwrap().is_empty());
}

// ============================================================================
// Configs and cache invalidation
// ============================================================================

#[test]
fn configs_are_validated_and_detached_on_delete() {
    let (engine, notifier) = recording_engine();

    let err = engine
        .update(|m| m.create_config(Config::new("c1", "bad", "{not json")))
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidConfigData { .. }));

    let err = engine
        .update(|m| m.create_service(Service::new("s1", "s1").with_configs(["c1"])))
        .unwrap_err();
    assert!(matches!(err, EngineError::NotFound { kind: "config", .. }));

    engine
        .update(|m| {
            m.create_config(Config::new("c1", "intercept", r#"{"port": 443}"#))?;
            m.create_config(Config::new("c2", "host", r#"{"address": "10.0.0.1"}"#))?;
            m.create_service(Service::new("s1", "s1").with_configs(["c1", "c2"]))?;
            m.create_service(Service::new("s2", "s2").with_configs(["c1"]))
        })
        .unwrap();
    assert!(notifier.take().is_empty());

    engine.update(|m| m.delete_config(&ConfigId::new("c1"))).unwrap();

    let s1 = engine.view(|s| s.load::<Service>("s1")).unwrap().unwrap();
    assert_eq!(s1.configs, vec![ConfigId::new("c2")]);
    let s2 = engine.view(|s| s.load::<Service>("s2")).unwrap().unwrap();
    assert!(s2.configs.is_empty());
    assert_eq!(notifier.take(), vec![sid("s1"), sid("s2")]);
    assert!(engine.view(|s| s.services_using_config("c1")).unwrap().is_empty());
}

#[test]
fn invalidations_are_delivered_only_after_commit() {
    let (engine, notifier) = recording_engine();
    engine.update(|m| m.create_service(Service::new("s1", "s1"))).unwrap();

    let mut mutation = engine.write().unwrap();
    mutation
        .update_service(Service::new("s1", "s1").with_role_attributes(["web"]))
        .unwrap();
    assert!(mutation.pending_invalidations().contains(&sid("s1")));
    assert!(notifier.recorded().is_empty());
    mutation.rollback();
    assert!(notifier.recorded().is_empty());

    let mut mutation = engine.write().unwrap();
    mutation
        .update_service(Service::new("s1", "s1").with_role_attributes(["web"]))
        .unwrap();
    mutation.commit().unwrap();
    assert_eq!(notifier.take(), vec![sid("s1")]);

    engine.update(|m| m.delete_service(&sid("s1"))).unwrap();
    assert_eq!(notifier.take(), vec![sid("s1")]);
}

#[test]
fn failed_notification_does_not_fail_commit() {
    let notifier = Arc::new(RecordingNotifier::failing());
    let engine = Engine::new(EngineConfig::default(), notifier.clone());
    engine.update(|m| m.create_service(Service::new("s1", "s1"))).unwrap();
    engine
        .update(|m| m.update_service(Service::new("s1", "s1").with_role_attributes(["x"])))
        .unwrap();

    assert_eq!(notifier.recorded(), vec![sid("s1")]);
    let attrs = engine
        .view(|s| s.role_attributes(EntityKind::Service, "s1"))
        .unwrap();
    assert_eq!(attrs, Some(role_attributes(["x"])));
}

#[test]
fn invalidation_can_be_disabled() {
    let notifier = Arc::new(RecordingNotifier::new());
    let engine = Engine::new(
        EngineConfig {
            invalidate_service_cache: false,
            ..EngineConfig::default()
        },
        notifier.clone(),
    );
    engine.update(|m| m.create_service(Service::new("s1", "s1"))).unwrap();
    engine.update(|m| m.delete_service(&sid("s1"))).unwrap();
    assert!(notifier.recorded().is_empty());
}

// ============================================================================
// Transactions and invariant failures
// ============================================================================

#[test]
fn mutation_reads_its_own_writes_and_snapshots_do_not() {
    let engine = Engine::in_memory();
    let before = engine.read().unwrap();

    let mut mutation = engine.write().unwrap();
    mutation.create_service(Service::new("s1", "s1")).unwrap();
    mutation.create_identity(Identity::new("i1", "i1")).unwrap();
    mutation
        .create_service_policy(dial_policy("p1", Semantic::AnyOf, &["#all"], &["#all"]))
        .unwrap();
    assert!(mutation.is_dialable_by_identity(&sid("s1"), &iid("i1")).unwrap());
    assert!(!before.is_dialable_by_identity(&sid("s1"), &iid("i1")).unwrap());
    mutation.commit().unwrap();

    assert!(!before.is_dialable_by_identity(&sid("s1"), &iid("i1")).unwrap());
    assert!(engine.read().unwrap().is_dialable_by_identity(&sid("s1"), &iid("i1")).unwrap());
    assert!(engine.read().unwrap().version() > before.version());
}

#[test]
fn failed_operation_poisons_the_mutation() {
    let (engine, notifier) = recording_engine();
    engine
        .update(|m| {
            m.create_identity(Identity::new("i1", "i1"))?;
            m.create_service_policy(dial_policy("p1", Semantic::AnyOf, &["#all"], &["#all"]))
        })
        .unwrap();
    let before = engine.read().unwrap().version();
    notifier.take();

    let mut mutation = engine.write().unwrap();
    mutation.create_service(Service::new("s1", "s1")).unwrap();
    let long = "x".repeat(70_000);
    let err = mutation
        .create_service(Service::new("s2", "s2").with_role_attributes([long.as_str()]))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(mutation.is_failed());

    let err = mutation.create_service(Service::new("s3", "s3")).unwrap_err();
    assert!(matches!(err, EngineError::Aborted { .. }));

    let err = mutation.commit().unwrap_err();
    assert!(matches!(err, EngineError::Aborted { .. }));
    assert_eq!(err.kind(), ErrorKind::Invariant);

    assert_eq!(engine.read().unwrap().version(), before);
    assert!(engine.view(|s| s.load::<Service>("s1")).unwrap().is_none());
    assert_eq!(dial_count(&engine, "s1", "i1"), None);
    assert!(notifier.take().is_empty());
    assert_consistent(&engine);
}

#[test]
fn failed_nested_operation_poisons_the_mutation() {
    let engine = Engine::in_memory();
    engine.update(|m| m.create_service(Service::new("s1", "s1"))).unwrap();

    let mut mutation = engine.write().unwrap();
    mutation
        .set_role_attributes(EntityKind::Service, "s1", role_attributes(["web"]))
        .unwrap();
    let long = "x".repeat(MAX_FIELD_LEN + 1);
    mutation
        .set_role_attributes(EntityKind::Service, "s1", role_attributes([long]))
        .unwrap_err();
    assert!(mutation.commit().is_err());

    assert_eq!(
        engine.view(|s| s.role_attributes(EntityKind::Service, "s1")).unwrap(),
        Some(role_attributes(Vec::<String>::new()))
    );
}

#[test]
fn link_underflow_aborts_the_whole_transaction() {
    let engine = Engine::in_memory();
    let err = engine
        .update(|m| {
            m.create_service(Service::new("s1", "s1"))?;
            Relation::ServiceDialIdentities
                .links()
                .decrement(m.txn_mut(), "s1", "i1")
                .map(drop)
        })
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Invariant);
    assert!(!err.is_retryable());
    assert!(engine.view(|s| s.load::<Service>("s1")).unwrap().is_none());
}

#[test]
fn membership_drift_is_detected_and_rolled_back() {
    let engine = Engine::in_memory();
    engine
        .update(|m| {
            m.create_service(Service::new("s1", "s1"))?;
            m.create_identity(Identity::new("i1", "i1"))?;
            m.create_service_policy(dial_policy("p1", Semantic::AnyOf, &["#web"], &["#all"]))
        })
        .unwrap();

    let err = engine
        .update(|m| {
            // A membership row the selector does not justify.
            crate::tables::membership(PolicyKind::Service, Side::First).add(m.txn_mut(), "p1", "s1")?;
            m.set_role_attributes(EntityKind::Service, "s1", role_attributes(["web"]))
        })
        .unwrap_err();

    assert!(matches!(err, EngineError::MembershipMismatch { recorded: true, expected: false, .. }));
    assert_eq!(err.kind(), ErrorKind::Invariant);
    assert_eq!(
        engine.view(|s| s.role_attributes(EntityKind::Service, "s1")).unwrap(),
        Some(role_attributes(Vec::<String>::new()))
    );
    assert_consistent(&engine);
}

// ============================================================================
// Role attribute queries
// ============================================================================

#[test]
fn role_attribute_queries() {
    let engine = Engine::in_memory();
    engine
        .update(|m| {
            m.create_identity(Identity::new("a", "a").with_role_attributes(["x", "y"]))?;
            m.create_identity(Identity::new("b", "b").with_role_attributes(["x"]))?;
            m.create_identity(Identity::new("c", "c"))
        })
        .unwrap();

    engine
        .view(|s| {
            assert_eq!(s.matching_entities(EntityKind::Identity, &["x"], Semantic::AnyOf)?, ids(&["a", "b"]));
            assert_eq!(s.matching_entities(EntityKind::Identity, &["x", "y"], Semantic::AllOf)?, ids(&["a"]));
            let none: [&str; 0] = [];
            assert_eq!(s.matching_entities(EntityKind::Identity, &none, Semantic::AllOf)?, ids(&["a", "b", "c"]));
            assert!(s.matching_entities(EntityKind::Identity, &none, Semantic::AnyOf)?.is_empty());
            assert_eq!(s.distinct_role_attributes(EntityKind::Identity)?, ids(&["x", "y"]));
            assert!(s.distinct_role_attributes(EntityKind::Service)?.is_empty());
            Ok(())
        })
        .unwrap();
}
