//! Integration tests for the floating IP workflow
//!
//! Every scenario runs twice: once over integer IDs (nova-network style) and
//! once over UUID IDs (neutron style). Backend calls are checked against the
//! memory backend's journal.

use floating_ip_substrate::activations::floating_ips::{
    BackendCall, FloatingIp, FloatingIpEvent, FloatingIpTarget, FloatingIps, Inventory,
    MemoryBackend, MessageLevel, Operation, Server,
};
use floating_ip_substrate::builder::{build_floating_ips, persist_inventory};
use floating_ip_substrate::{FloatingIpConfig, ResourceId};
use futures::{Stream, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

const INDEX_URL: &str = "/project/access_and_security/";
const INSTANCES_URL: &str = "/project/instances/";

// =============================================================================
// Fixtures
// =============================================================================

struct TestData {
    floating_ips: Vec<FloatingIp>,
    servers: Vec<Server>,
}

impl TestData {
    fn new(ip_ids: [ResourceId; 2], server_ids: [ResourceId; 2]) -> Self {
        let [first_ip, second_ip] = ip_ids;
        let servers: Vec<Server> = server_ids
            .into_iter()
            .enumerate()
            .map(|(i, id)| Server { id, name: format!("server_{}", i + 1) })
            .collect();

        let floating_ips = vec![
            FloatingIp::new(first_ip, "58.58.58.58", "public")
                .attached_to(servers[0].id.clone(), "10.0.0.4"),
            FloatingIp::new(second_ip, "58.58.58.59", "public"),
        ];

        Self { floating_ips, servers }
    }

    fn inventory(&self) -> Inventory {
        Inventory {
            floating_ips: self.floating_ips.clone(),
            targets: self
                .servers
                .iter()
                .map(|s| FloatingIpTarget { id: s.id.clone(), name: s.name.clone() })
                .collect(),
            servers: self.servers.clone(),
        }
    }

    fn workflow(&self) -> FloatingIps<MemoryBackend> {
        FloatingIps::new(Arc::new(MemoryBackend::new(self.inventory())), INDEX_URL)
    }

    /// The address already attached to the first server
    fn associated_ip(&self) -> &FloatingIp {
        &self.floating_ips[0]
    }

    fn free_ip(&self) -> &FloatingIp {
        &self.floating_ips[1]
    }

    fn server(&self) -> &Server {
        &self.servers[0]
    }

    fn form(&self, ip: &FloatingIp) -> HashMap<String, String> {
        HashMap::from([
            ("instance_id".to_string(), self.server().id.to_string()),
            ("ip_id".to_string(), ip.id.to_string()),
        ])
    }
}

fn nova_data() -> TestData {
    TestData::new(
        [ResourceId::Integer(1), ResourceId::Integer(2)],
        [ResourceId::Integer(101), ResourceId::Integer(102)],
    )
}

fn neutron_data() -> TestData {
    TestData::new(
        [Uuid::new_v4().into(), Uuid::new_v4().into()],
        [Uuid::new_v4().into(), Uuid::new_v4().into()],
    )
}

async fn collect(events: impl Stream<Item = FloatingIpEvent>) -> Vec<FloatingIpEvent> {
    events.collect().await
}

fn redirect_of(events: &[FloatingIpEvent]) -> Option<&str> {
    match events.last() {
        Some(FloatingIpEvent::Redirect { url }) => Some(url.as_str()),
        _ => None,
    }
}

fn message_count(events: &[FloatingIpEvent], level: MessageLevel) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, FloatingIpEvent::Message(m) if m.level == level))
        .count()
}

fn disassociate_action(ip: &FloatingIp) -> String {
    format!("floating_ips__disassociate__{}", ip.id)
}

// =============================================================================
// Scenarios
// =============================================================================

async fn associate_choices(data: TestData) {
    let workflow = data.workflow();
    let events = collect(workflow.associate_choices()).await;

    let [FloatingIpEvent::Choices { ips, targets }] = events.as_slice() else {
        panic!("Expected a single Choices event, got {:?}", events);
    };
    // The associated address must not be offered again.
    assert!(!ips.iter().any(|fip| fip.id == data.associated_ip().id));
    assert!(ips.iter().any(|fip| fip.id == data.free_ip().id));
    assert_eq!(targets.len(), data.servers.len());

    assert_eq!(
        workflow.backend().journal().await,
        vec![BackendCall::TenantFloatingIpList, BackendCall::FloatingIpTargetList]
    );
}

async fn associate_post(data: TestData) {
    let workflow = data.workflow();
    let events = collect(workflow.associate(data.form(data.free_ip()), None)).await;

    assert_eq!(redirect_of(&events), Some(INDEX_URL));
    assert_eq!(message_count(&events, MessageLevel::Success), 1);
    assert!(events.contains(&FloatingIpEvent::Associated {
        ip_id: data.free_ip().id.clone(),
        target_id: data.server().id.clone(),
    }));

    let backend = workflow.backend();
    assert_eq!(
        backend.journal().await,
        vec![
            BackendCall::TenantFloatingIpList,
            BackendCall::FloatingIpTargetList,
            BackendCall::FloatingIpAssociate {
                ip_id: data.free_ip().id.clone(),
                target_id: data.server().id.clone(),
            },
        ]
    );
    let stored = backend.snapshot().await;
    assert_eq!(stored.floating_ips[1].instance_id.as_ref(), Some(&data.server().id));
}

async fn associate_post_with_redirect(data: TestData) {
    let workflow = data.workflow();
    let body = format!(
        "instance_id={}&ip_id={}",
        data.server().id,
        data.free_ip().id
    );
    let query = format!("?next={}", INSTANCES_URL);

    let events = collect(workflow.associate_request(&query, &body)).await;

    assert_eq!(redirect_of(&events), Some(INSTANCES_URL));
}

async fn associate_post_with_exception(data: TestData) {
    let workflow = data.workflow();
    workflow.backend().fail_on(Operation::FloatingIpAssociate).await;

    let events = collect(workflow.associate(data.form(data.free_ip()), None)).await;

    assert_eq!(redirect_of(&events), Some(INDEX_URL));
    assert_eq!(message_count(&events, MessageLevel::Success), 0);
    assert_eq!(message_count(&events, MessageLevel::Error), 1);
    assert!(events
        .iter()
        .any(|e| matches!(e, FloatingIpEvent::Error { status: 502, .. })));
    assert!(!events.iter().any(|e| matches!(e, FloatingIpEvent::Associated { .. })));
}

async fn associate_post_rejects_associated_ip(data: TestData) {
    let workflow = data.workflow();
    let events = collect(workflow.associate(data.form(data.associated_ip()), None)).await;

    // Form is re-displayed: no redirect, no backend associate call.
    assert_eq!(redirect_of(&events), None);
    assert!(events
        .iter()
        .any(|e| matches!(e, FloatingIpEvent::Error { status: 400, .. })));
    let journal = workflow.backend().journal().await;
    assert!(!journal.iter().any(|c| c.operation() == Operation::FloatingIpAssociate));
}

async fn associate_post_rejects_invalid_identifier(data: TestData) {
    let workflow = data.workflow();
    let mut form = data.form(data.free_ip());
    form.insert("ip_id".to_string(), "55WbJTpJDf".to_string());

    let events = collect(workflow.associate(form, None)).await;

    assert_eq!(redirect_of(&events), None);
    assert_eq!(message_count(&events, MessageLevel::Error), 1);
    assert!(workflow.backend().journal().await.is_empty());
}

async fn associate_post_rejects_unlisted_target(data: TestData) {
    let workflow = data.workflow();
    let unlisted: ResourceId = if data.server().id.is_uuid() {
        Uuid::new_v4().into()
    } else {
        ResourceId::Integer(999)
    };
    let mut form = data.form(data.free_ip());
    form.insert("instance_id".to_string(), unlisted.to_string());

    let events = collect(workflow.associate(form, None)).await;

    assert_eq!(redirect_of(&events), None);
    assert_eq!(message_count(&events, MessageLevel::Error), 1);
    assert!(events
        .iter()
        .any(|e| matches!(e, FloatingIpEvent::Error { status: 400, .. })));
    let backend = workflow.backend();
    let journal = backend.journal().await;
    assert!(!journal.iter().any(|c| c.operation() == Operation::FloatingIpAssociate));
    assert!(!backend.snapshot().await.floating_ips[1].is_associated());
}

async fn disassociate_post(data: TestData) {
    let workflow = data.workflow();
    let action = disassociate_action(data.associated_ip());

    let events = collect(workflow.disassociate(action)).await;

    assert_eq!(message_count(&events, MessageLevel::Success), 1);
    assert_eq!(redirect_of(&events), Some(INDEX_URL));

    let backend = workflow.backend();
    assert_eq!(
        backend.journal().await,
        vec![
            BackendCall::ServerList { all_tenants: true },
            BackendCall::TenantFloatingIpList,
            BackendCall::FloatingIpDisassociate {
                ip_id: data.associated_ip().id.clone(),
                target_id: data.server().id.clone(),
            },
        ]
    );
    assert!(!backend.snapshot().await.floating_ips[0].is_associated());
}

async fn disassociate_post_with_exception(data: TestData) {
    let workflow = data.workflow();
    workflow.backend().fail_on(Operation::FloatingIpDisassociate).await;

    let events = collect(workflow.disassociate(disassociate_action(data.associated_ip()))).await;

    assert_eq!(redirect_of(&events), Some(INDEX_URL));
    assert_eq!(message_count(&events, MessageLevel::Success), 0);
    assert_eq!(message_count(&events, MessageLevel::Error), 1);
    assert!(workflow.backend().snapshot().await.floating_ips[0].is_associated());
}

async fn disassociate_free_ip(data: TestData) {
    let workflow = data.workflow();
    let events = collect(workflow.disassociate(disassociate_action(data.free_ip()))).await;

    assert_eq!(redirect_of(&events), Some(INDEX_URL));
    assert!(events
        .iter()
        .any(|e| matches!(e, FloatingIpEvent::Error { status: 409, .. })));
    let journal = workflow.backend().journal().await;
    assert!(!journal.iter().any(|c| c.operation() == Operation::FloatingIpDisassociate));
}

async fn disassociate_unknown_ip(data: TestData) {
    let workflow = data.workflow();
    let unknown = if data.free_ip().id.is_uuid() {
        ResourceId::from(Uuid::new_v4())
    } else {
        ResourceId::Integer(999)
    };

    let events = collect(workflow.disassociate(format!("floating_ips__disassociate__{}", unknown))).await;

    assert_eq!(redirect_of(&events), Some(INDEX_URL));
    assert_eq!(message_count(&events, MessageLevel::Error), 1);
    assert!(events
        .iter()
        .any(|e| matches!(e, FloatingIpEvent::Error { status: 404, .. })));
    let backend = workflow.backend();
    let journal = backend.journal().await;
    assert!(!journal.iter().any(|c| c.operation() == Operation::FloatingIpDisassociate));
    assert!(backend.snapshot().await.floating_ips[0].is_associated());
}

// =============================================================================
// Test matrix
// =============================================================================

macro_rules! floating_ip_view_tests {
    ($module:ident, $data:ident) => {
        mod $module {
            use super::*;

            #[tokio::test]
            async fn test_associate() {
                associate_choices($data()).await;
            }

            #[tokio::test]
            async fn test_associate_post() {
                associate_post($data()).await;
            }

            #[tokio::test]
            async fn test_associate_post_with_redirect() {
                associate_post_with_redirect($data()).await;
            }

            #[tokio::test]
            async fn test_associate_post_with_exception() {
                associate_post_with_exception($data()).await;
            }

            #[tokio::test]
            async fn test_associate_post_rejects_associated_ip() {
                associate_post_rejects_associated_ip($data()).await;
            }

            #[tokio::test]
            async fn test_associate_post_rejects_invalid_identifier() {
                associate_post_rejects_invalid_identifier($data()).await;
            }

            #[tokio::test]
            async fn test_associate_post_rejects_unlisted_target() {
                associate_post_rejects_unlisted_target($data()).await;
            }

            #[tokio::test]
            async fn test_disassociate_post() {
                disassociate_post($data()).await;
            }

            #[tokio::test]
            async fn test_disassociate_post_with_exception() {
                disassociate_post_with_exception($data()).await;
            }

            #[tokio::test]
            async fn test_disassociate_free_ip() {
                disassociate_free_ip($data()).await;
            }

            #[tokio::test]
            async fn test_disassociate_unknown_ip() {
                disassociate_unknown_ip($data()).await;
            }
        }
    };
}

floating_ip_view_tests!(nova, nova_data);
floating_ip_view_tests!(neutron, neutron_data);

// =============================================================================
// Standalone cases
// =============================================================================

#[tokio::test]
async fn test_associate_ignores_external_next() {
    let data = nova_data();
    let body = format!("instance_id={}&ip_id={}", data.server().id, data.free_ip().id);

    for query in [
        "next=https%3A%2F%2Fevil.example%2F",
        "next=%2F%2Fevil.example%2F",
        "next=%2F%5Cevil.example%2F",
        "next=%2F%09%2Fevil.example%2F",
    ] {
        let workflow = data.workflow();
        let events = collect(workflow.associate_request(query, &body)).await;

        assert_eq!(redirect_of(&events), Some(INDEX_URL), "{} should not be followed", query);
        assert_eq!(message_count(&events, MessageLevel::Success), 1);
    }
}

#[tokio::test]
async fn test_associate_accepts_uuid_spelling() {
    let data = neutron_data();
    let workflow = data.workflow();
    let spelled = |id: &ResourceId| format!(" {} ", id.to_string().to_uppercase());
    let form = HashMap::from([
        ("instance_id".to_string(), spelled(&data.server().id)),
        ("ip_id".to_string(), spelled(&data.free_ip().id)),
    ]);

    let events = collect(workflow.associate(form, None)).await;

    assert_eq!(redirect_of(&events), Some(INDEX_URL));
    assert!(events.contains(&FloatingIpEvent::Associated {
        ip_id: data.free_ip().id.clone(),
        target_id: data.server().id.clone(),
    }));
    let stored = workflow.backend().snapshot().await;
    assert_eq!(stored.floating_ips[1].instance_id.as_ref(), Some(&data.server().id));
}

#[tokio::test]
async fn test_disassociate_rejects_foreign_action() {
    let workflow = nova_data().workflow();
    let events = collect(workflow.disassociate("instances__terminate__1".to_string())).await;

    assert!(matches!(events.as_slice(), [FloatingIpEvent::Error { status: 400, .. }]));
    assert!(workflow.backend().journal().await.is_empty());
}

#[tokio::test]
async fn test_choices_with_backend_failure() {
    let workflow = nova_data().workflow();
    workflow.backend().fail_on(Operation::TenantFloatingIpList).await;

    let events = collect(workflow.associate_choices()).await;

    assert_eq!(redirect_of(&events), Some(INDEX_URL));
    assert_eq!(message_count(&events, MessageLevel::Error), 1);
}

#[tokio::test]
async fn test_builder_persists_inventory() {
    let dir = tempfile::tempdir().unwrap();
    let data = nova_data();
    let config = FloatingIpConfig {
        inventory_path: dir.path().join("inventory.json"),
        ..FloatingIpConfig::default()
    };
    data.inventory().save(&config.inventory_path).await.unwrap();

    let workflow = build_floating_ips(&config).await.unwrap();
    assert_eq!(workflow.index_url(), INDEX_URL);
    let events = collect(workflow.disassociate(disassociate_action(data.associated_ip()))).await;
    assert_eq!(message_count(&events, MessageLevel::Success), 1);
    persist_inventory(&config, &workflow).await.unwrap();

    let reloaded = build_floating_ips(&config).await.unwrap();
    let stored = reloaded.backend().snapshot().await;
    assert!(stored.floating_ips.iter().all(|fip| !fip.is_associated()));
}
