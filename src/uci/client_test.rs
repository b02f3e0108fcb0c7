use std::sync::Arc;

use mockall::predicate::eq;
use serde::Deserialize;
use serde::Serialize;

use crate::config::UciConfig;
use crate::test_utils::enable_logger;
use crate::test_utils::uci_fixture;
use crate::uci::AddSection;
use crate::uci::MockUciBackend;
use crate::uci::PackageId;
use crate::uci::SectionRef;
use crate::uci::SetOption;
use crate::uci::UciClient;
use crate::uci::UciContext;
use crate::uci::UciFragment;
use crate::Error;

/// Backend expecting one load and one unload of package 1.
fn scripted_backend(commits: usize) -> MockUciBackend {
    let mut backend = MockUciBackend::new();
    backend
        .expect_load()
        .with(eq("network"))
        .times(1)
        .returning(|_| Ok(PackageId(1)));
    backend
        .expect_unload()
        .with(eq(PackageId(1)))
        .times(1)
        .returning(|_| Ok(()));
    backend
        .expect_commit()
        .with(eq(PackageId(1)), eq(false))
        .times(commits)
        .returning(|_, _| Ok(()));
    backend
}

fn mock_context(
    backend: MockUciBackend,
    dir: &tempfile::TempDir,
) -> UciContext {
    UciContext::with_backend(Arc::new(backend), UciConfig::with_config_dir(dir.path()))
}

#[test]
fn clean_client_never_commits_on_close() {
    enable_logger();
    let dir = tempfile::tempdir().unwrap();
    let ctx = mock_context(scripted_backend(0), &dir);

    let mut client = UciClient::with_context(ctx, "network").unwrap();
    client.close().unwrap();
}

#[test]
fn dirty_client_commits_exactly_once_on_close() {
    enable_logger();
    let dir = tempfile::tempdir().unwrap();
    let mut backend = scripted_backend(1);
    backend.expect_set_option().times(2).returning(|_, _, _, _| Ok(()));
    let ctx = mock_context(backend, &dir);

    let mut client = UciClient::with_context(ctx, "network").unwrap();
    let lan = SectionRef::new("lan", "interface", false);
    for value in ["static", "dhcp"] {
        client
            .exec(&mut SetOption {
                section: Some(lan.clone()),
                option_name: "proto".into(),
                option_value: value.into(),
                ..Default::default()
            })
            .unwrap();
    }

    assert!(client.is_dirty());
    client.close().unwrap();
    client.close().unwrap();
}

#[test]
fn flush_commits_and_returns_to_clean() {
    enable_logger();
    let dir = tempfile::tempdir().unwrap();
    let mut backend = scripted_backend(1);
    backend.expect_set_option().times(1).returning(|_, _, _, _| Ok(()));
    let ctx = mock_context(backend, &dir);

    let mut client = UciClient::with_context(ctx, "network").unwrap();
    client
        .exec(&mut SetOption {
            section: Some(SectionRef::new("lan", "interface", false)),
            option_name: "proto".into(),
            option_value: "dhcp".into(),
            ..Default::default()
        })
        .unwrap();

    client.flush().unwrap();
    assert!(!client.is_dirty());
    client.flush().unwrap();
    drop(client);
}

#[test]
fn failed_command_leaves_client_clean() {
    let fx = uci_fixture(&["network"]);
    let mut client = UciClient::with_context(fx.ctx.clone(), "network").unwrap();

    let result = client.exec(&mut SetOption::new("missing", "proto", "dhcp"));

    assert!(matches!(result, Err(Error::NotFound(_))));
    assert!(!client.is_dirty());
    client.close().unwrap();
    assert_eq!(fx.store.commit_count(), 0);
}

#[test]
fn close_keeps_shared_context_open() {
    let fx = uci_fixture(&["network"]);
    let mut client = UciClient::with_context(fx.ctx.clone(), "network").unwrap();
    client.exec(&mut AddSection::named("lan", "interface")).unwrap();

    client.close().unwrap();

    assert!(!fx.ctx.is_closed());
    assert_eq!(fx.store.commit_count(), 1);
    assert!(matches!(client.package(), Err(Error::Closed(_))));
}

#[test]
fn owned_context_closes_with_client() {
    let fx = uci_fixture(&["network"]);
    let mut client = UciClient::open("network", fx.config()).unwrap();
    let ctx = client.context().clone();

    client.close().unwrap();

    assert!(ctx.is_closed());
}

#[test]
fn remove_deletes_package_file() {
    let fx = uci_fixture(&["network"]);
    let client = UciClient::with_context(fx.ctx.clone(), "network").unwrap();

    client.remove().unwrap();

    assert!(!fx.dir.path().join("network").exists());
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
struct Zone {
    name: String,
    input: String,
    network: Vec<String>,
}

fn lan_zone() -> Zone {
    Zone {
        name: "lan".into(),
        input: "ACCEPT".into(),
        network: vec!["lan".into()],
    }
}

#[test]
fn save_and_load_fragment_by_name() {
    let fx = uci_fixture(&["firewall"]);
    let mut client = UciClient::with_context(fx.ctx.clone(), "firewall").unwrap();

    client.save(&UciFragment::named("lan", "zone", lan_zone())).unwrap();
    assert!(client.is_dirty());

    let mut fragment = UciFragment::named("lan", "", Zone::default());
    client.load(&mut fragment).unwrap();

    assert_eq!(fragment.content, lan_zone());
}

#[test]
fn save_without_name_creates_anonymous_section() {
    let fx = uci_fixture(&["firewall"]);
    let mut client = UciClient::with_context(fx.ctx.clone(), "firewall").unwrap();

    let section = client.save(&UciFragment::named("", "zone", lan_zone())).unwrap();

    assert!(section.anonymous);
    let mut fragment = UciFragment::at(section, Zone::default());
    client.load(&mut fragment).unwrap();
    assert_eq!(fragment.content, lan_zone());
}

#[test]
fn save_into_section_reference_replaces_named_options_only() {
    let fx = uci_fixture(&["firewall"]);
    let mut client = UciClient::with_context(fx.ctx.clone(), "firewall").unwrap();
    let section = client.save(&UciFragment::named("lan", "zone", lan_zone())).unwrap();
    client
        .exec(&mut SetOption::new("lan", "forward", "REJECT"))
        .unwrap();

    let updated = Zone {
        network: vec!["lan".into(), "guest".into()],
        ..lan_zone()
    };
    client.save(&UciFragment::at(section, updated.clone())).unwrap();

    let mut fragment = UciFragment::named("lan", "", Zone::default());
    client.load(&mut fragment).unwrap();
    assert_eq!(fragment.content, updated);
    let kept = client.load_section_by_name("lan").unwrap().unwrap();
    assert!(kept.option("forward").unwrap().is_some());
}

#[test]
fn fragments_without_target_are_rejected() {
    let fx = uci_fixture(&["firewall"]);
    let mut client = UciClient::with_context(fx.ctx.clone(), "firewall").unwrap();

    let save = client.save(&UciFragment::named("lan", "", lan_zone()));
    let load = client.load(&mut UciFragment::named("", "zone", Zone::default()));

    assert!(matches!(save, Err(Error::Validation(_))));
    assert!(matches!(load, Err(Error::Validation(_))));
}
