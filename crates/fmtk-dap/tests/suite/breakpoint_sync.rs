use std::path::{Path, PathBuf};

use crate::harness::{spawn_server, stopped, Harness};
use fmtk_config::SessionConfig;
use serde_json::{json, Value};

const UPDATE: &str = "__DebugAdapter.updateBreakpoints([";

/// Launch with a mods directory holding `foo_1.0.0`, past the first prompt.
async fn launched_with_mods(mods: &Path) -> (Harness, PathBuf) {
    let foo = mods.join("foo_1.0.0");
    std::fs::create_dir_all(&foo).unwrap();

    let mut h = spawn_server(SessionConfig::default());
    h.client.initialize().await;
    let resp = h
        .client
        .launch(json!({
            "program": "/opt/factorio/bin/x64/factorio",
            "modsPath": mods,
            "hookMod": false,
        }))
        .await;
    assert_eq!(resp["success"], true, "{resp}");
    h.game.print("DBG: on_init");
    h.game.writes_until_cont().await;
    (h, foo)
}

async fn set_breakpoints(h: &mut Harness, source: Value, lines: &[u32]) -> Vec<Value> {
    let breakpoints: Vec<Value> = lines.iter().map(|l| json!({"line": l})).collect();
    let resp = h
        .client
        .request(
            "setBreakpoints",
            json!({"source": source, "breakpoints": breakpoints}),
        )
        .await;
    assert_eq!(resp["success"], true, "{resp}");
    resp["body"]["breakpoints"].as_array().cloned().unwrap()
}

#[tokio::test]
async fn breakpoints_follow_module_and_source_loading() {
    let mods = tempfile::tempdir().unwrap();
    let (mut h, foo) = launched_with_mods(mods.path()).await;
    let control = foo.join("control.lua").to_string_lossy().into_owned();

    let bps = set_breakpoints(&mut h, json!({"path": control}), &[3, 5]).await;
    assert_eq!(bps.len(), 2);
    assert!(bps.iter().all(|bp| bp["verified"] == false));
    assert_eq!(bps[0]["message"], "source not loaded yet");
    assert_eq!(h.game.try_write(), None);

    // Once the module is known the breakpoints are queued for the next prompt.
    h.game.print(r#"EVTmodules: {"foo":"1.0.0"}"#);
    h.client.event("module").await;
    h.game.print("DBG: on_tick");
    let writes = h.game.writes_until_cont().await;
    assert_eq!(writes.len(), 2, "{writes:?}");
    assert!(writes[0].starts_with(UPDATE));
    assert!(writes[0].contains("@__foo__/control.lua"));

    h.game
        .print(r#"EVTsource: {"name":"@__foo__/control.lua","lines":[1,4,5,6]}"#);
    let loaded = h.client.event("loadedSource").await;
    assert_eq!(loaded["body"]["reason"], "new");
    assert_eq!(loaded["body"]["source"]["path"], control.as_str());

    let first = h.client.event("breakpoint").await;
    assert_eq!(first["body"]["breakpoint"]["id"], 1);
    assert_eq!(first["body"]["breakpoint"]["line"], 4);
    assert_eq!(first["body"]["breakpoint"]["verified"], true);
    let second = h.client.event("breakpoint").await;
    assert_eq!(second["body"]["breakpoint"]["id"], 2);
    assert_eq!(second["body"]["breakpoint"]["line"], 5);

    // Reloading the same lines changes nothing.
    h.game
        .print(r#"EVTsource: {"name":"@__foo__/control.lua","lines":[1,4,5,6]}"#);
    let reloaded = h.client.event("loadedSource").await;
    assert_eq!(reloaded["body"]["reason"], "changed");
    h.client.request("threads", json!({})).await;
    assert!(!h.client.saw_event("breakpoint"));

    // Known lines validate immediately; ids survive for unchanged requests.
    let bps = set_breakpoints(&mut h, json!({"path": control}), &[3, 7]).await;
    assert_eq!(bps[0]["id"], 1);
    assert_eq!(bps[0]["line"], 4);
    assert_eq!(bps[1]["id"], 3);
    assert_eq!(bps[1]["verified"], false);
    assert_eq!(bps[1]["message"], "no executable code at or after this line");
    h.finish().await;
}

#[tokio::test]
async fn stage_load_resends_every_breakpoint() {
    let mods = tempfile::tempdir().unwrap();
    let (mut h, foo) = launched_with_mods(mods.path()).await;

    h.game.print(r#"EVTmodules: {"foo":"1.0.0"}"#);
    h.client.event("module").await;

    let control = foo.join("control.lua").to_string_lossy().into_owned();
    set_breakpoints(&mut h, json!({"path": control}), &[2]).await;

    h.game.print("DBG: on_instrument_control foo");
    let writes = h.game.writes_until_cont().await;
    assert_eq!(writes.len(), 3, "{writes:?}");
    assert!(writes[0].starts_with(UPDATE));
    assert!(writes[1].starts_with(UPDATE));
    assert_eq!(writes[2], "cont\n");
    h.finish().await;
}

#[tokio::test]
async fn breakpoints_in_memory_sources_use_the_reference() {
    let mut h = stopped(SessionConfig::default()).await;

    h.game.print(r#"EVTsource: {"name":"=(load)","lines":[2,3]}"#);
    let loaded = h.client.event("loadedSource").await;
    let reference = loaded["body"]["source"]["sourceReference"].clone();
    assert_eq!(reference, 1);

    let bps = set_breakpoints(&mut h, json!({"sourceReference": reference}), &[1]).await;
    assert_eq!(bps[0]["verified"], true);
    assert_eq!(bps[0]["line"], 2);

    // Stopped, so the update goes out right away.
    let write = h.game.next_write().await;
    assert!(write.starts_with(UPDATE));
    assert!(write.contains("=(load)"));
    h.finish().await;
}

#[tokio::test]
async fn reloads_without_line_metadata_keep_breakpoints() {
    let mut h = stopped(SessionConfig::default()).await;

    h.game.print(r#"EVTsource: {"name":"=(load)","lines":[2,3]}"#);
    h.client.event("loadedSource").await;
    let bps = set_breakpoints(&mut h, json!({"sourceReference": 1}), &[1]).await;
    assert_eq!(bps[0]["verified"], true);
    assert_eq!(bps[0]["line"], 2);
    h.game.next_write().await;

    h.game.print(r#"EVTsource: {"name":"=(load)"}"#);
    let reloaded = h.client.event("loadedSource").await;
    assert_eq!(reloaded["body"]["reason"], "changed");
    h.client.request("threads", json!({})).await;
    assert!(!h.client.saw_event("breakpoint"));

    // The known lines still resolve new requests.
    let bps = set_breakpoints(&mut h, json!({"sourceReference": 1}), &[3]).await;
    assert_eq!(bps[0]["verified"], true);
    assert_eq!(bps[0]["line"], 3);
    h.finish().await;
}

#[tokio::test]
async fn breakpoints_need_a_source() {
    let mut h = stopped(SessionConfig::default()).await;
    let resp = h
        .client
        .request(
            "setBreakpoints",
            json!({"source": {"name": "nowhere"}, "breakpoints": [{"line": 1}]}),
        )
        .await;
    assert_eq!(resp["success"], false);
    h.finish().await;
}
