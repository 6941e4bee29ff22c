// Gatekeep
// Copyright (C) 2025 Synerthink

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.

// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

//! Integration tests for the authorization engine
//!
//! The workshop scenario models a small shop: Jeff sells, Shay administers the
//! system, a customer orders and an IRS agent audits.

use async_trait::async_trait;
use gatekeep_core::{
    Actor, ActorRecord, AuthorizationEngine, CustomDecision, DecisionRequest, EngineConfig, EntityRecord, GatekeepError, GatekeepResult, GroupSpecifier,
    ManagedEntity, MemoryPermissionStore, PermissionProfile, ProfileDefinition, ProfileSource, Role,
};
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

struct Workshop {
    store: Arc<MemoryPermissionStore>,
    engine: AuthorizationEngine,
    jeff: ActorRecord,
    shay: ActorRecord,
    customer: ActorRecord,
    irs_man: ActorRecord,
    workshop: EntityRecord,
    system: EntityRecord,
}

/// Open between 7 and 11 when the context carries `{"hour": h}`
struct MorningHours;

#[async_trait]
impl CustomDecision for MorningHours {
    async fn decide(&self, engine: &AuthorizationEngine, request: &DecisionRequest<'_>) -> GatekeepResult<bool> {
        let hour = request.context().and_then(|ctx| ctx.get("hour")).and_then(|h| h.as_u64()).unwrap_or(0);
        if !(7..12).contains(&hour) {
            return Ok(false);
        }

        engine.standard_decision(request).await
    }
}

async fn workshop_setup() -> Workshop {
    init_tracing();

    let store = Arc::new(MemoryPermissionStore::new());
    let engine = AuthorizationEngine::new(store.clone()).unwrap();

    engine
        .register_profile(PermissionProfile::new("Workshop").with_default_user_ops(["Buy", "Order"]).with_group_override("IRS", ["ReadDeep"]))
        .await
        .unwrap();
    engine.add_role("Seller", ["ReadDeep", "Sell"], "Workshop").await.unwrap();

    let system_profile = Arc::new(PermissionProfile::new("System").with_default_group_member_ops(["Admin"]));

    let setup = Workshop {
        store,
        engine,
        jeff: ActorRecord::new("1").with_groups("workers"),
        shay: ActorRecord::new("2").with_groups("admin"),
        customer: ActorRecord::new("3").with_groups(vec!["customers"]),
        irs_man: ActorRecord::new("irs1").with_groups(GroupSpecifier::provider(|| vec!["IRS".to_string()])),
        workshop: EntityRecord::new("12", "Workshop"),
        system: EntityRecord::new("System", "System").with_groups("admin").with_profile(system_profile),
    };

    setup.engine.assign_role(&setup.workshop, &setup.jeff, "Seller").await.unwrap();
    setup
}

#[tokio::test]
async fn test_workshop_scenario() {
    let s = workshop_setup().await;
    let engine = &s.engine;

    assert!(engine.is_allowed(&s.jeff, "ReadDeep", &s.workshop, None).await.unwrap());
    assert!(engine.is_allowed(&s.jeff, "ReadCommon", &s.workshop, None).await.unwrap());
    assert!(!engine.is_allowed(&s.jeff, "WriteAnything", &s.workshop, None).await.unwrap());

    assert!(engine.is_allowed(&s.shay, "EditAnything", &s.system, None).await.unwrap());
    assert!(!engine.is_allowed(&s.jeff, "EditAnything", &s.system, None).await.unwrap());

    assert!(engine.is_allowed(&s.jeff, "Buy", &s.workshop, None).await.unwrap());
    assert!(engine.is_allowed(&s.customer, "Order", &s.workshop, None).await.unwrap());

    assert!(!engine.is_allowed(&s.customer, "ReadDeep", &s.workshop, None).await.unwrap());
    assert!(engine.is_allowed(&s.irs_man, "ReadDeep", &s.workshop, None).await.unwrap());

    let roles = engine.get_roles_for_actor(&s.jeff, &s.workshop).await.unwrap();
    assert_eq!(roles.len(), 1);
    assert_eq!(roles[0].name(), "Seller");

    assert_eq!(s.store.saved_role("Workshop", "Seller").await.unwrap().name(), "Seller");
}

#[tokio::test]
async fn test_custom_decision_wraps_standard() {
    let s = workshop_setup().await;
    let morning_workshop = EntityRecord::new("13", "Workshop").with_custom_decision(Arc::new(MorningHours));

    let morning = json!({"hour": 9});
    let afternoon = json!({"hour": 15});

    assert!(s.engine.is_allowed(&s.customer, "Order", &morning_workshop, Some(&morning)).await.unwrap());
    assert!(!s.engine.is_allowed(&s.customer, "Order", &morning_workshop, Some(&afternoon)).await.unwrap());

    // Open hours do not widen what the standard algorithm grants
    assert!(!s.engine.is_allowed(&s.customer, "Sell", &morning_workshop, Some(&morning)).await.unwrap());
}

#[tokio::test]
async fn test_type_level_custom_decision_and_instance_override() {
    struct Always(bool);

    #[async_trait]
    impl CustomDecision for Always {
        async fn decide(&self, _engine: &AuthorizationEngine, _request: &DecisionRequest<'_>) -> GatekeepResult<bool> {
            Ok(self.0)
        }
    }

    let s = workshop_setup().await;
    s.engine.register_custom_decision("Workshop", Arc::new(Always(false))).unwrap();

    assert!(!s.engine.is_allowed(&s.jeff, "Buy", &s.workshop, None).await.unwrap());

    let open = EntityRecord::new("14", "Workshop").with_custom_decision(Arc::new(Always(true)));
    assert!(s.engine.is_allowed(&s.customer, "DeleteDatabase", &open, None).await.unwrap());

    assert!(matches!(
        s.engine.register_custom_decision("", Arc::new(Always(true))),
        Err(GatekeepError::InvalidRegistration { .. })
    ));
}

#[tokio::test]
async fn test_visitor_and_user_tiers_are_exclusive() {
    init_tracing();
    let engine = AuthorizationEngine::new(Arc::new(MemoryPermissionStore::new())).unwrap();
    engine
        .register_profile(PermissionProfile::new("Report").with_default_visitor_ops(["ReadHeadline", "Comment"]).with_default_user_ops(["ReadDeep"]))
        .await
        .unwrap();

    let report = EntityRecord::new("r1", "Report");
    let visitor = ActorRecord::visitor();
    let empty_id = ActorRecord::new("");
    let user = ActorRecord::new("5");

    assert!(engine.is_allowed(&visitor, "ReadHeadline", &report, None).await.unwrap());
    assert!(engine.is_allowed(&empty_id, "ReadHeadline", &report, None).await.unwrap());
    assert!(!engine.is_allowed(&visitor, "ReadCommon", &report, None).await.unwrap());

    assert!(engine.is_allowed(&visitor, "Comment", &report, None).await.unwrap());

    // Authenticated actors never fall back to visitor defaults
    assert!(!engine.is_allowed(&user, "Comment", &report, None).await.unwrap());
    assert!(engine.is_allowed(&user, "ReadCommon", &report, None).await.unwrap());
    assert!(engine.is_allowed(&user, "ReadHeadline", &report, None).await.unwrap());
    assert!(engine.get_roles_for_actor(&visitor, &report).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_mandatory_membership_suppresses_assigned_roles() {
    init_tracing();
    let engine = AuthorizationEngine::new(Arc::new(MemoryPermissionStore::new())).unwrap();
    engine
        .register_profile(PermissionProfile::new("Project").with_default_user_ops(["ReadCommon"]).with_membership_mandatory(true))
        .await
        .unwrap();
    engine.add_role("Editor", ["WriteAnything"], "Project").await.unwrap();

    let project = EntityRecord::new("p1", "Project").with_groups("team");
    let insider = ActorRecord::new("10").with_groups(vec!["team", "ops"]);
    let outsider = ActorRecord::new("11").with_groups("ops");

    engine.assign_role(&project, &insider, "Editor").await.unwrap();
    engine.assign_role(&project, &outsider, "Editor").await.unwrap();

    assert!(engine.is_allowed(&insider, "WriteCommon", &project, None).await.unwrap());
    assert!(engine.is_allowed(&insider, "ReadCommon", &project, None).await.unwrap());

    assert!(!engine.is_allowed(&outsider, "WriteCommon", &project, None).await.unwrap());
    assert!(!engine.is_allowed(&outsider, "ReadCommon", &project, None).await.unwrap());
}

#[tokio::test]
async fn test_group_role_for_shared_group() {
    init_tracing();
    let engine = AuthorizationEngine::new(Arc::new(MemoryPermissionStore::new())).unwrap();
    engine.add_role("MemberOfeditors", ["WriteCommon"], "Wiki").await.unwrap();

    let page = EntityRecord::new("w1", "Wiki").with_groups(vec!["editors", "readers"]);
    let editor = ActorRecord::new("20").with_groups(GroupSpecifier::deferred(|| async { Ok(vec!["editors".to_string()]) }));
    let reader = ActorRecord::new("21").with_groups("readers");

    assert!(engine.is_allowed(&editor, "ReadCommon", &page, None).await.unwrap());
    assert!(!engine.is_allowed(&reader, "ReadCommon", &page, None).await.unwrap());
}

#[tokio::test]
async fn test_group_provider_failure_propagates() {
    init_tracing();
    let engine = AuthorizationEngine::new(Arc::new(MemoryPermissionStore::new())).unwrap();

    let actor = ActorRecord::new("1").with_groups(GroupSpecifier::deferred(|| async {
        Err(GatekeepError::Provider {
            message: "directory offline".to_string(),
        })
    }));

    let err = engine.is_allowed(&actor, "ReadCommon", &EntityRecord::new("1", "Doc"), None).await.unwrap_err();
    assert!(matches!(err, GatekeepError::Provider { .. }));
    assert!(!err.is_configuration_error());
}

#[tokio::test]
async fn test_entity_profile_provider() {
    init_tracing();
    let engine = AuthorizationEngine::new(Arc::new(MemoryPermissionStore::new())).unwrap();
    let calls = Arc::new(AtomicUsize::new(0));

    let counter = calls.clone();
    let source = ProfileSource::provider(move || {
        counter.fetch_add(1, Ordering::SeqCst);
        async { Ok(Arc::new(PermissionProfile::new("Ticket").with_default_user_ops(["Comment"]))) }
    });

    let ticket = EntityRecord::new("t1", "Ticket").with_profile(source);
    let user = ActorRecord::new("7");

    assert!(engine.is_allowed(&user, "Comment", &ticket, None).await.unwrap());
    assert!(!engine.is_allowed(&user, "Rate", &ticket, None).await.unwrap());
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // The provided profile now serves the whole type
    let profile = engine.profile_for_type("Ticket");
    assert!(profile.default_user_ops().contains("Comment"));

    engine.add_role("Triager", ["Rate"], "Ticket").await.unwrap();
    engine.assign_role(&ticket, &user, "Triager").await.unwrap();
    assert!(engine.is_allowed(&user, "UpVote", &ticket, None).await.unwrap());
    assert!(engine.is_allowed(&user, "Comment", &EntityRecord::new("t2", "Ticket"), None).await.unwrap());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_roles_reach_entity_declared_profile() {
    let s = workshop_setup().await;
    let auditor = ActorRecord::new("50");

    s.engine.add_role("Auditor", ["ReadDeep"], "System").await.unwrap();
    s.engine.assign_role(&s.system, &auditor, "Auditor").await.unwrap();

    assert!(s.engine.is_allowed(&auditor, "ReadCommon", &s.system, None).await.unwrap());
    assert!(!s.engine.is_allowed(&auditor, "EditAnything", &s.system, None).await.unwrap());
    assert!(s.engine.is_allowed(&s.shay, "EditAnything", &s.system, None).await.unwrap());

    // Roles added after the declared profile was first used land on it too
    s.engine.add_role("Operator", ["Execute"], "System").await.unwrap();
    s.engine.assign_role(&s.system, &auditor, "Operator").await.unwrap();
    assert!(s.engine.is_allowed(&auditor, "GenericAction", &s.system, None).await.unwrap());
    assert!(s.engine.profile_for_type("System").default_group_member_ops().contains("Admin"));
}

#[tokio::test]
async fn test_invalid_profile_is_configuration_error() {
    init_tracing();
    let engine = AuthorizationEngine::new(Arc::new(MemoryPermissionStore::new())).unwrap();
    let broken = Arc::new(PermissionProfile::new("Broken").with_default_user_ops(["Teleport"]));
    let entity = EntityRecord::new("b1", "Broken").with_profile(broken);

    let err = engine.is_allowed(&ActorRecord::new("1"), "ReadCommon", &entity, None).await.unwrap_err();
    assert!(matches!(err, GatekeepError::InvalidProfile { .. }));
    assert!(err.is_configuration_error());
}

#[tokio::test]
async fn test_undefined_operation() {
    let s = workshop_setup().await;

    let err = s.engine.is_allowed(&s.jeff, "Teleport", &s.workshop, None).await.unwrap_err();
    assert!(matches!(err, GatekeepError::UndefinedOperation { ref operation } if operation == "Teleport"));
    assert!(err.is_configuration_error());

    let err = s.engine.test(&s.jeff, "Teleport", &s.workshop, None).await.unwrap_err();
    assert!(!err.is_access_denied());
}

#[tokio::test]
async fn test_access_denied_message() {
    let s = workshop_setup().await;

    s.engine.test(&s.jeff, "Sell", &s.workshop, None).await.unwrap();

    let context = json!({"reason": "audit"});
    let err = s.engine.test(&s.customer, "ReadDeep", &s.workshop, Some(&context)).await.unwrap_err();
    assert!(err.is_access_denied());
    assert_eq!(err.to_string(), r#"3 attempted unprivileged operation ReadDeep on 12 with {"reason":"audit"}"#);

    let err = s.engine.test(&ActorRecord::visitor(), "Buy", &s.workshop, None).await.unwrap_err();
    assert_eq!(err.to_string(), r#"visitor attempted unprivileged operation Buy on 12 with """#);
}

#[tokio::test]
async fn test_assign_role_validation() {
    let s = workshop_setup().await;

    let err = s.engine.assign_role(&s.workshop, &s.customer, "Janitor").await.unwrap_err();
    assert!(matches!(err, GatekeepError::UnknownRole { .. }));

    let err = s.engine.assign_role(&s.workshop, &ActorRecord::visitor(), "Seller").await.unwrap_err();
    assert!(matches!(err, GatekeepError::AnonymousActor { .. }));

    // Roles are scoped to their entity type
    let err = s.engine.assign_role(&s.system, &s.jeff, "Seller").await.unwrap_err();
    assert!(matches!(err, GatekeepError::UnknownRole { ref entity_type, .. } if entity_type == "System"));
}

#[tokio::test]
async fn test_role_reregistration_last_write_wins() {
    let s = workshop_setup().await;

    s.engine.add_role("Seller", ["ReadHeadline"], "Workshop").await.unwrap();

    assert!(!s.engine.is_allowed(&s.jeff, "Sell", &s.workshop, None).await.unwrap());
    assert!(!s.engine.is_allowed(&s.jeff, "ReadDeep", &s.workshop, None).await.unwrap());
    assert!(s.engine.is_allowed(&s.jeff, "ReadHeadline", &s.workshop, None).await.unwrap());

    let saved = s.store.saved_role("Workshop", "Seller").await.unwrap();
    assert!(saved.grants("ReadHeadline"));
    assert!(!saved.grants("Sell"));
}

#[tokio::test]
async fn test_register_profile_keeps_existing_roles() {
    let s = workshop_setup().await;
    assert!(s.engine.is_allowed(&s.jeff, "Sell", &s.workshop, None).await.unwrap());

    s.engine
        .register_profile(PermissionProfile::new("Workshop").with_default_user_ops(["Buy"]))
        .await
        .unwrap();

    assert!(s.engine.is_allowed(&s.jeff, "Sell", &s.workshop, None).await.unwrap());
    assert!(s.engine.is_allowed(&s.customer, "Buy", &s.workshop, None).await.unwrap());
    assert!(!s.engine.is_allowed(&s.irs_man, "ReadDeep", &s.workshop, None).await.unwrap());
    assert!(s.engine.profile_for_type("Workshop").role("Seller").is_some());
    s.engine.assign_role(&s.workshop, &s.customer, "Seller").await.unwrap();

    // A role the new profile defines itself replaces the registered one
    let replacement = PermissionProfile::new("Workshop");
    replacement.register_role(Arc::new(Role::new("Seller", ["ReadHeadline"], "Workshop")));
    s.engine.register_profile(replacement).await.unwrap();
    assert!(!s.engine.is_allowed(&s.jeff, "Sell", &s.workshop, None).await.unwrap());
    assert!(s.engine.is_allowed(&s.jeff, "ReadHeadline", &s.workshop, None).await.unwrap());
}

#[tokio::test]
async fn test_delete_role() {
    let s = workshop_setup().await;

    s.engine.delete_role("Seller", "Workshop").await.unwrap();

    assert!(!s.engine.is_allowed(&s.jeff, "Sell", &s.workshop, None).await.unwrap());
    assert!(s.engine.get_roles_for_actor(&s.jeff, &s.workshop).await.unwrap().is_empty());
    assert!(s.store.saved_role("Workshop", "Seller").await.is_none());

    // The stale assignment stays in the store
    let owners = s.engine.get_role_owners(&s.workshop).await.unwrap();
    assert_eq!(owners["1"], vec!["Seller"]);
}

#[tokio::test]
async fn test_revoke_role() {
    let s = workshop_setup().await;

    s.engine.revoke_role(&s.workshop, &s.jeff, "Seller").await.unwrap();

    assert!(!s.engine.is_allowed(&s.jeff, "Sell", &s.workshop, None).await.unwrap());
    assert!(s.engine.get_role_owners(&s.workshop).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_role_owners_and_actor_roles() {
    let s = workshop_setup().await;
    s.engine.add_role("Manager", ["Manage"], "Workshop").await.unwrap();

    let other = EntityRecord::new("15", "Workshop");
    let third = EntityRecord::new("16", "Workshop");
    s.engine.assign_role(&s.workshop, &s.shay, "Manager").await.unwrap();
    s.engine.assign_role(&other, &s.jeff, "Seller").await.unwrap();
    s.engine.assign_role(&third, &s.jeff, "Manager").await.unwrap();

    let owners = s.engine.get_role_owners(&s.workshop).await.unwrap();
    assert_eq!(owners.len(), 2);
    assert_eq!(owners["2"], vec!["Manager"]);

    let all = s.engine.get_actor_roles("1", 0, 10).await.unwrap();
    assert_eq!(all.keys().map(String::as_str).collect::<Vec<_>>(), vec!["12", "15", "16"]);

    let page = s.engine.get_actor_roles("1", 1, 1).await.unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page["15"], vec!["Seller"]);

    assert!(s.engine.get_actor_roles("nobody", 0, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_add_role_for_types() {
    init_tracing();
    let store = Arc::new(MemoryPermissionStore::new());
    let engine = AuthorizationEngine::new(store.clone()).unwrap();

    let roles = engine.add_role_for_types("Moderator", ["Disable"], &["Forum", "Thread"]).await.unwrap();
    assert_eq!(roles.len(), 2);
    assert_eq!(roles[1].entity_type(), "Thread");
    assert_eq!(store.saved_role_count().await, 2);

    let moderator = ActorRecord::new("30");
    let thread = EntityRecord::new("th1", "Thread");
    engine.assign_role(&thread, &moderator, "Moderator").await.unwrap();

    assert!(engine.is_allowed(&moderator, "Warn", &thread, None).await.unwrap());
    assert!(!engine.is_allowed(&moderator, "Warn", &EntityRecord::new("f1", "Forum"), None).await.unwrap());
}

#[tokio::test]
async fn test_load_profile_definition() {
    init_tracing();
    let engine = AuthorizationEngine::new(Arc::new(MemoryPermissionStore::new())).unwrap();

    let definition = ProfileDefinition::from_json(
        r#"{
            "type_name": "Store",
            "default_user_ops": ["Buy"],
            "group_override_ops": {"auditors": ["ReadDeep"]},
            "roles": {"Clerk": ["Sell"]}
        }"#,
    )
    .unwrap();
    engine.load_profile(&definition).await.unwrap();

    let shop = EntityRecord::new("s1", "Store");
    let clerk = ActorRecord::new("40");
    let auditor = ActorRecord::new("41").with_groups("auditors");

    engine.assign_role(&shop, &clerk, "Clerk").await.unwrap();
    assert!(engine.is_allowed(&clerk, "Rent", &shop, None).await.unwrap());
    assert!(engine.is_allowed(&auditor, "ReadHeadline", &shop, None).await.unwrap());
    assert!(!engine.is_allowed(&auditor, "Sell", &shop, None).await.unwrap());
}

#[tokio::test]
async fn test_load_profile_rejects_unknown_role_operation() {
    let s = workshop_setup().await;

    let definition = ProfileDefinition {
        type_name: "Workshop".to_string(),
        default_user_ops: vec!["ReadHeadline".to_string()],
        roles: [("Clerk".to_string(), vec!["Sell".to_string(), "Teleport".to_string()])].into_iter().collect(),
        ..Default::default()
    };

    let err = s.engine.load_profile(&definition).await.unwrap_err();
    assert!(matches!(err, GatekeepError::UndefinedOperation { ref operation } if operation == "Teleport"));

    // The previous profile stays installed
    let profile = s.engine.profile_for_type("Workshop");
    assert!(profile.default_user_ops().contains("Buy"));
    assert!(profile.role("Clerk").is_none());
    assert!(s.store.saved_role("Workshop", "Clerk").await.is_none());
    assert!(s.engine.is_allowed(&s.customer, "Order", &s.workshop, None).await.unwrap());
}

#[tokio::test]
async fn test_decisions_are_idempotent() {
    let s = workshop_setup().await;

    for _ in 0..3 {
        assert!(s.engine.is_allowed(&s.jeff, "ReadCommon", &s.workshop, None).await.unwrap());
        assert!(!s.engine.is_allowed(&s.customer, "ReadDeep", &s.workshop, None).await.unwrap());
    }
    assert_eq!(s.engine.get_roles_for_actor(&s.jeff, &s.workshop).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_config_from_lookup_applies_to_engine() {
    let config = EngineConfig::from_lookup(|key| match key {
        "GATEKEEP_MAX_ANCESTOR_DEPTH" => Some("2".to_string()),
        "GATEKEEP_AUDIT_MAX_EVENTS" => Some("1".to_string()),
        _ => None,
    });
    let engine = AuthorizationEngine::builder(Arc::new(MemoryPermissionStore::new())).with_config(config).build().unwrap();

    assert_eq!(engine.config().max_ancestor_depth, 2);

    let visitor = ActorRecord::visitor();
    let doc = EntityRecord::new("d1", "Doc");
    engine.is_allowed(&visitor, "ReadHeadline", &doc, None).await.unwrap();
    engine.is_allowed(&visitor, "ReadCommon", &doc, None).await.unwrap();

    let events = engine.audit_logger().get_events(None).await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].operation.as_deref(), Some("ReadCommon"));
}

#[test]
fn test_actor_trait_objects() {
    let actors: Vec<Box<dyn Actor>> = vec![Box::new(ActorRecord::new("1")), Box::new(ActorRecord::visitor())];
    assert_eq!(actors.iter().filter(|a| a.is_visitor()).count(), 1);

    let entity: Box<dyn ManagedEntity> = Box::new(EntityRecord::new("12", "Workshop"));
    assert_eq!(entity.type_name(), "Workshop");
}
