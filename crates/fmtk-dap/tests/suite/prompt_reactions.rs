use crate::harness::{launched, stopped};
use fmtk_config::SessionConfig;
use serde_json::json;

#[tokio::test]
async fn first_prompt_sends_object_info_then_continues() {
    let (mut h, writes) = launched(SessionConfig::default()).await;
    assert_eq!(writes.len(), 3, "{writes:?}");
    assert!(writes[0].starts_with("__DebugAdapter.loadObjectInfo([["));
    assert_eq!(writes[1], "__DebugAdapter.loadObjectInfo()\n");
    assert_eq!(writes[2], "cont\n");

    h.game.print("DBG: on_tick");
    assert_eq!(h.game.writes_until_cont().await, ["cont\n"]);
    h.finish().await;
}

#[tokio::test]
async fn stopped_prompt_waits_for_continue() {
    let mut h = stopped(SessionConfig::default()).await;
    assert_eq!(h.game.try_write(), None);

    let resp = h.client.request("continue", json!({"threadId": 1})).await;
    assert_eq!(resp["success"], true);
    assert_eq!(resp["body"]["allThreadsContinued"], true);
    assert_eq!(h.game.next_write().await, "cont\n");

    let resp = h.client.request("continue", json!({"threadId": 1})).await;
    assert_eq!(resp["success"], false);
    assert_eq!(h.game.try_write(), None);
    h.finish().await;
}

#[tokio::test]
async fn step_leaves_the_prompt() {
    let mut h = stopped(SessionConfig::default()).await;

    let resp = h.client.request("next", json!({"threadId": 1})).await;
    assert_eq!(resp["success"], true);
    assert_eq!(h.game.next_write().await, "__DebugAdapter.step(\"over\")\n");

    let resp = h.client.request("stepIn", json!({"threadId": 1})).await;
    assert_eq!(resp["success"], false);
    assert_eq!(h.game.try_write(), None);

    h.game.print("DBG: step");
    let evt = h.client.event("stopped").await;
    assert_eq!(evt["body"]["reason"], "step");
    let resp = h.client.request("stepOut", json!({"threadId": 1})).await;
    assert_eq!(resp["success"], true);
    assert_eq!(h.game.next_write().await, "__DebugAdapter.step(\"out\")\n");
    h.finish().await;
}

#[tokio::test]
async fn pause_is_honoured_at_the_next_tick() {
    let (mut h, _) = launched(SessionConfig::default()).await;

    let resp = h.client.request("pause", json!({"threadId": 1})).await;
    assert_eq!(resp["success"], true);

    h.game.print("DBG: on_tick");
    let evt = h.client.event("stopped").await;
    assert_eq!(evt["body"]["reason"], "pause");
    assert_eq!(h.game.try_write(), None);

    h.client.request("continue", json!({"threadId": 1})).await;
    assert_eq!(h.game.next_write().await, "cont\n");
    h.game.print("DBG: on_tick");
    assert_eq!(h.game.writes_until_cont().await, ["cont\n"]);
    h.finish().await;
}

#[tokio::test]
async fn getref_hands_out_fresh_blocks() {
    let (mut h, _) = launched(SessionConfig::default()).await;

    h.game.print("DBG: getref");
    assert_eq!(
        h.game.writes_until_cont().await,
        ["__DebugAdapter.transferRef(65536)\n", "cont\n"]
    );
    h.game.print("DBG: getref");
    assert_eq!(
        h.game.writes_until_cont().await,
        ["__DebugAdapter.transferRef(131072)\n", "cont\n"]
    );
    h.finish().await;
}

#[tokio::test]
async fn unknown_prompt_continues() {
    let (mut h, _) = launched(SessionConfig::default()).await;
    h.game.print("DBG: on_something_new");
    assert_eq!(h.game.writes_until_cont().await, ["cont\n"]);
    h.finish().await;
}

#[tokio::test]
async fn output_lines_are_forwarded() {
    let (mut h, _) = launched(SessionConfig::default()).await;

    h.game.print("   0.512 Loading mod base 1.1.0");
    let evt = h.client.event("output").await;
    assert_eq!(evt["body"]["category"], "stdout");
    assert_eq!(evt["body"]["output"], "   0.512 Loading mod base 1.1.0\n");

    h.game
        .print(r#"DBGprint: {"output":"hello","category":"console","source":{"name":"x.lua"},"line":4}"#);
    let evt = h.client.event("output").await;
    assert_eq!(evt["body"]["output"], "hello\n");
    assert_eq!(evt["body"]["source"]["name"], "x.lua");
    assert_eq!(evt["body"]["line"], 4);

    h.game.print("PROFILE: tick 1.25");
    let evt = h.client.event("fmtk/profile").await;
    assert_eq!(evt["body"]["line"], "tick 1.25");
    h.finish().await;
}
