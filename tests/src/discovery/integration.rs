use std::collections::HashSet;

use hubkit_common::HubError;
use hubkit_common::discovery::{DiscoveryKind, IdTemplate, StrategyConfig};
use hubkit_core::discovery::{DiscoveryEvent, DiscoveryRun};

use crate::support::{Replay, Unbindable, announcement};

fn by_name() -> IdTemplate {
    IdTemplate::default_for(DiscoveryKind::MdnsSd)
}

#[tokio::test]
async fn one_entry_per_identifier() {
    let sightings = vec![
        announcement("hue-bridge", Some("192.168.1.20")),
        announcement("tv", Some("192.168.1.40")),
        announcement("hue-bridge", Some("192.168.1.20")),
        announcement("hue-bridge", Some("192.168.1.21")),
        announcement("tv", None),
    ];
    let results = DiscoveryRun::start(Box::new(Replay(sightings)), by_name())
        .await
        .unwrap()
        .collect()
        .await;

    let ids: HashSet<&str> = results.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(results.len(), 2);
    assert_eq!(ids, HashSet::from(["hue-bridge", "tv"]));

    let bridge = results.iter().find(|r| r.id == "hue-bridge").unwrap();
    assert_eq!(bridge.address, "192.168.1.21".parse().ok());
    let tv = results.iter().find(|r| r.id == "tv").unwrap();
    assert_eq!(tv.address, "192.168.1.40".parse().ok());
}

#[tokio::test]
async fn events_report_first_sightings_and_moves() {
    let sightings = vec![
        announcement("hue-bridge", Some("192.168.1.20")),
        announcement("hue-bridge", Some("192.168.1.20")),
        announcement("hue-bridge", Some("192.168.1.21")),
    ];
    let mut run = DiscoveryRun::start(Box::new(Replay(sightings)), by_name()).await.unwrap();

    let mut events = Vec::new();
    while let Some(event) = run.next().await {
        events.push(event);
    }

    assert!(matches!(events[0], DiscoveryEvent::Found(_)));
    assert!(matches!(events[1], DiscoveryEvent::Updated { address_changed: false, .. }));
    assert!(matches!(events[2], DiscoveryEvent::Updated { address_changed: true, .. }));
    assert_eq!(run.results().len(), 1);
}

#[tokio::test]
async fn custom_templates_key_on_txt_records() {
    let mut with_txt = announcement("hue-bridge", Some("192.168.1.20"));
    if let hubkit_common::discovery::DiscoveryDetails::MdnsSd { txt, .. } = &mut with_txt.details {
        txt.insert("bridgeid".into(), "001788fffe4a".into());
    }
    let without_txt = announcement("printer", Some("192.168.1.30"));

    let template = IdTemplate::parse("txt.bridgeid").unwrap();
    let results = DiscoveryRun::start(Box::new(Replay(vec![with_txt, without_txt])), template)
        .await
        .unwrap()
        .collect()
        .await;

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].id, "001788fffe4a");
}

#[tokio::test]
async fn bind_failure_is_discovery_unavailable() {
    let err = DiscoveryRun::start(Box::new(Unbindable), IdTemplate::default_for(DiscoveryKind::Ssdp))
        .await
        .err()
        .unwrap();
    assert!(matches!(err, HubError::DiscoveryUnavailable { .. }));
    assert_eq!(err.status(), 503);
}

#[test]
fn manifest_strategies_parse_with_default_templates() {
    let raw = r#"{ "type": "mdns-sd", "mdns-sd": { "name": "hue", "protocol": "tcp" } }"#;
    let config: StrategyConfig = serde_json::from_str(raw).unwrap();
    assert_eq!(config.kind(), DiscoveryKind::MdnsSd);
    assert_eq!(config.id, by_name());
}
