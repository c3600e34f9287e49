use crate::harness::{launched, plain_launch, spawn_failing_server, spawn_server};
use fmtk_config::SessionConfig;
use fmtk_wire::{settings, SettingScope, Value as TreeValue};
use serde_json::{json, Value};

fn mod_enabled(mods: &std::path::Path, name: &str) -> Option<bool> {
    let bytes = std::fs::read(mods.join("mod-list.json")).ok()?;
    let list: Value = serde_json::from_slice(&bytes).ok()?;
    list["mods"]
        .as_array()?
        .iter()
        .find(|m| m["name"] == name)
        .and_then(|m| m["enabled"].as_bool())
}

#[tokio::test]
async fn initialize_advertises_capabilities() {
    let mut h = spawn_server(SessionConfig::default());
    let resp = h.client.initialize().await;
    assert_eq!(resp["success"], true);
    assert_eq!(resp["body"]["supportsDisassembleRequest"], true);
    assert_eq!(resp["body"]["supportsLoadedSourcesRequest"], true);
    h.finish().await;
}

#[tokio::test]
async fn launch_prepares_mods_and_forwards_exit() {
    let mods = tempfile::tempdir().unwrap();
    std::fs::write(
        mods.path().join("mod-list.json"),
        br#"{"mods":[{"name":"base","enabled":true}]}"#,
    )
    .unwrap();

    let mut h = spawn_server(SessionConfig::default());
    h.client.initialize().await;
    let resp = h
        .client
        .launch(json!({
            "program": "/opt/factorio/bin/x64/factorio",
            "args": ["--load-game", "test"],
            "modsPath": mods.path(),
            "adjustModSettings": [
                {"scope": "startup", "name": "my-setting", "value": true},
            ],
        }))
        .await;
    assert_eq!(resp["success"], true, "{resp}");

    let spec = h.game.spec();
    assert_eq!(spec.args[..2], ["--load-game", "test"]);
    assert_eq!(spec.args[2], "--mod-directory");
    assert_eq!(mod_enabled(mods.path(), "debugadapter"), Some(true));
    assert_eq!(mod_enabled(mods.path(), "base"), Some(true));
    let file = settings::load(&mods.path().join("mod-settings.dat")).unwrap();
    assert_eq!(
        file.get(SettingScope::Startup, "my-setting"),
        Some(&TreeValue::Bool(true))
    );

    h.game.exit(Some(3), None);
    let exited = h.client.event("exited").await;
    assert_eq!(exited["body"]["exitCode"], 3);
    h.client.event("terminated").await;
    assert_eq!(mod_enabled(mods.path(), "debugadapter"), Some(false));

    h.finish().await;
}

#[tokio::test]
async fn signal_exit_is_reported_as_128_plus_signal() {
    let (mut h, _) = launched(SessionConfig::default()).await;
    h.game.exit(None, Some(9));
    let exited = h.client.event("exited").await;
    assert_eq!(exited["body"]["exitCode"], 137);
    h.client.event("terminated").await;
    h.finish().await;
}

#[tokio::test]
async fn launch_failure_still_terminates() {
    let mut h = spawn_failing_server();
    h.client.initialize().await;
    let resp = h.client.launch(plain_launch()).await;
    assert_eq!(resp["success"], false);
    assert_eq!(
        resp["message"],
        "failed to launch /opt/factorio/bin/x64/factorio: no such binary"
    );
    h.client.event("terminated").await;
    h.finish().await;
}

#[tokio::test]
async fn second_launch_is_rejected() {
    let (mut h, _) = launched(SessionConfig::default()).await;
    let resp = h.client.launch(plain_launch()).await;
    assert_eq!(resp["success"], false);
    h.finish().await;
}

#[tokio::test]
async fn terminate_is_idempotent() {
    let (mut h, _) = launched(SessionConfig::default()).await;

    let resp = h.client.request("terminate", json!({})).await;
    assert_eq!(resp["success"], true);
    assert!(h.game.killed());
    let resp = h.client.request("disconnect", json!({})).await;
    assert_eq!(resp["success"], true);

    h.game.exit(None, Some(15));
    h.client.event("exited").await;
    h.client.event("terminated").await;

    let resp = h.client.request("terminate", json!({})).await;
    assert_eq!(resp["success"], true);
    assert!(!h.client.saw_event("terminated"));
    h.finish().await;
}

#[tokio::test]
async fn disconnect_before_launch_terminates() {
    let mut h = spawn_server(SessionConfig::default());
    h.client.initialize().await;
    let resp = h.client.request("disconnect", json!({})).await;
    assert_eq!(resp["success"], true);
    h.client.event("terminated").await;
    h.finish().await;
}

#[tokio::test]
async fn stderr_is_forwarded_as_output() {
    let (mut h, _) = launched(SessionConfig::default()).await;
    h.game.print_stderr("Error: something broke");
    let evt = h.client.event("output").await;
    assert_eq!(evt["body"]["category"], "stderr");
    assert_eq!(evt["body"]["output"], "Error: something broke\n");
    h.finish().await;
}

#[tokio::test]
async fn stderr_blocks_are_one_output_event() {
    let (mut h, _) = launched(SessionConfig::default()).await;
    h.game.print_stderr("stack traceback:\n\tcontrol.lua:3: in main chunk");
    let evt = h.client.event("output").await;
    assert_eq!(evt["body"]["category"], "stderr");
    assert_eq!(
        evt["body"]["output"],
        "stack traceback:\n\tcontrol.lua:3: in main chunk\n"
    );
    h.client.request("threads", json!({})).await;
    assert!(!h.client.saw_event("output"));
    h.finish().await;
}
