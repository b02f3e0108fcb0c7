use openwrt_bind::uci::is_empty;
use openwrt_bind::uci::AddListOption;
use openwrt_bind::uci::AddSection;
use openwrt_bind::uci::SetOption;
use openwrt_bind::uci::UciClient;
use openwrt_bind::uci::UciFragment;
use openwrt_bind::Error;
use serde::Deserialize;
use serde::Serialize;

use crate::commons::config_dir;
use crate::commons::store;

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
struct WifiIface {
    device: String,
    mode: String,
    ssid: String,
    #[serde(rename = "key")]
    passphrase: String,
    hidden: bool,
    maxassoc: u32,
    maclist: Vec<String>,
    #[serde(skip_serializing_if = "is_empty")]
    comment: String,
}

fn guest_iface() -> WifiIface {
    WifiIface {
        device: "radio0".into(),
        mode: "ap".into(),
        ssid: "guest".into(),
        passphrase: "s3cret".into(),
        hidden: false,
        maxassoc: 32,
        maclist: vec!["00:11:22:33:44:55".into()],
        comment: String::new(),
    }
}

#[test]
fn record_survives_a_commit() {
    let dir = config_dir(&["wireless"]);
    let ctx = store(&dir);

    ctx.marshal("wireless", "guest", "wifi-iface", &guest_iface()).unwrap();
    let loaded: WifiIface = ctx.unmarshal("wireless", "guest").unwrap();

    assert_eq!(loaded, guest_iface());
    let pkg = ctx.load_package("wireless").unwrap();
    let section = pkg.section("guest").unwrap().unwrap();
    assert_eq!(section.section_type(), "wifi-iface");
    assert!(section.option("comment").unwrap().is_none());
    assert_eq!(
        section.option("key").unwrap().unwrap().as_str(),
        Some("s3cret")
    );
}

#[test]
fn client_batches_commands_behind_one_commit() {
    let dir = config_dir(&["firewall"]);
    let ctx = store(&dir);

    let mut client = UciClient::with_context(ctx.clone(), "firewall").unwrap();
    client.exec(&mut AddSection::named("lan", "zone")).unwrap();
    client.exec(&mut SetOption::new("lan", "input", "ACCEPT")).unwrap();
    client
        .exec(&mut AddListOption::new("lan", "network", vec!["lan".to_string(), "guest".to_string()]))
        .unwrap();
    assert!(client.is_dirty());
    client.close().unwrap();

    let client = UciClient::with_context(ctx, "firewall").unwrap();
    let zones = client.query_section_by_option("network", "guest").unwrap();
    assert_eq!(zones.len(), 1);
    assert_eq!(zones[0].name(), "lan");
}

#[test]
fn fragments_address_named_and_anonymous_sections() {
    let dir = config_dir(&["wireless"]);
    let mut client = UciClient::with_context(store(&dir), "wireless").unwrap();

    let named = client
        .save(&UciFragment::named("guest", "wifi-iface", guest_iface()))
        .unwrap();
    let anonymous = client
        .save(&UciFragment::named("", "wifi-iface", WifiIface {
            ssid: "iot".into(),
            ..guest_iface()
        }))
        .unwrap();
    client.flush().unwrap();

    assert_eq!(named.name, "guest");
    assert!(anonymous.anonymous);
    let mut fragment = UciFragment::at(anonymous, WifiIface::default());
    client.load(&mut fragment).unwrap();
    assert_eq!(fragment.content.ssid, "iot");
    assert_eq!(client.query_section_by_type("wifi-iface").unwrap().len(), 2);
}

#[test]
fn missing_targets_are_reported() {
    let dir = config_dir(&["network"]);
    let ctx = store(&dir);
    let mut client = UciClient::with_context(ctx.clone(), "network").unwrap();

    let untargeted = client.save(&UciFragment::named("", "", guest_iface()));
    let absent: Result<WifiIface, Error> = ctx.unmarshal("network", "nope");

    assert!(matches!(untargeted, Err(Error::Validation(_))));
    assert!(matches!(absent, Err(Error::NotFound(_))));
    assert!(matches!(ctx.load_package("absent"), Err(Error::NotFound(_))));
}

#[test]
fn closed_context_rejects_use() {
    let dir = config_dir(&["system"]);
    let ctx = store(&dir);
    let pkg = ctx.load_package("system").unwrap();

    ctx.close();
    ctx.close();

    assert!(matches!(pkg.sections(), Err(Error::Closed(_))));
    assert!(matches!(ctx.load_package("system"), Err(Error::Closed(_))));
}
