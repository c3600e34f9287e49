use crate::harness::{launched, spawn_server, stopped};
use fmtk_config::SessionConfig;
use serde_json::json;

#[tokio::test]
async fn variables_round_trip_at_the_prompt() {
    let mut h = stopped(SessionConfig::default()).await;

    let seq = h
        .client
        .send("variables", json!({"variablesReference": 65536}))
        .await;
    assert_eq!(
        h.game.next_write().await,
        format!("__DebugAdapter.variables(65536,{seq},nil,nil,nil)\n")
    );
    h.game.print(&format!(
        r#"DBGvars: {{"seq":{seq},"variables":[{{"name":"x","value":"1","variablesReference":0}}]}}"#
    ));
    let resp = h.client.response(seq).await;
    assert_eq!(resp["success"], true);
    assert_eq!(resp["body"]["variables"][0]["name"], "x");
    h.finish().await;
}

#[tokio::test]
async fn scopes_and_set_variable_are_correlated_by_seq() {
    let mut h = stopped(SessionConfig::default()).await;

    let scopes = h.client.send("scopes", json!({"frameId": 2})).await;
    assert_eq!(
        h.game.next_write().await,
        format!("__DebugAdapter.scopes(2,{scopes})\n")
    );
    let set = h
        .client
        .send(
            "setVariable",
            json!({"variablesReference": 65537, "name": "x", "value": "2"}),
        )
        .await;
    assert_eq!(
        h.game.next_write().await,
        format!("__DebugAdapter.setVariable(65537,[[x]],[[2]],{set})\n")
    );

    // Answered out of order.
    h.game.print(&format!(
        r#"DBGsetvar: {{"seq":{set},"value":"2","type":"number","variablesReference":0}}"#
    ));
    h.game.print(&format!(
        r#"DBGscopes: {{"seq":{scopes},"scopes":[{{"name":"Locals","variablesReference":65538,"expensive":false}}]}}"#
    ));
    let resp = h.client.response(scopes).await;
    assert_eq!(resp["body"]["scopes"][0]["name"], "Locals");
    let resp = h.client.response(set).await;
    assert_eq!(resp["body"]["value"], "2");
    h.finish().await;
}

#[tokio::test]
async fn multi_line_input_is_sent_as_one_command() {
    let mut h = stopped(SessionConfig::default()).await;

    let seq = h
        .client
        .send("evaluate", json!({"expression": "local a = 1\r\n\nreturn a"}))
        .await;
    let write = h.game.next_write().await;
    assert_eq!(write.matches('\n').count(), 1, "{write:?}");
    assert_eq!(
        write,
        format!("__DebugAdapter.evaluate(nil,[[repl]],[[local a = 1 return a]],{seq})\n")
    );

    let set = h
        .client
        .send(
            "setVariable",
            json!({"variablesReference": 65537, "name": "t", "value": "{\n  1,\n}"}),
        )
        .await;
    assert_eq!(
        h.game.next_write().await,
        format!("__DebugAdapter.setVariable(65537,[[t]],[[{{   1, }}]],{set})\n")
    );
    h.finish().await;
}

#[tokio::test]
async fn stack_trace_honors_the_requested_window() {
    let mut h = stopped(SessionConfig::default()).await;

    let seq = h
        .client
        .send(
            "stackTrace",
            json!({"threadId": 1, "startFrame": 1, "levels": 1}),
        )
        .await;
    assert_eq!(
        h.game.next_write().await,
        "__DebugAdapter.stackTrace(1,1)\n"
    );
    h.game.print(
        r#"DBGstack: {"frames":[{"id":1,"name":"a","line":1},{"id":2,"name":"b","line":2},{"id":3,"name":"c","line":3}]}"#,
    );
    let resp = h.client.response(seq).await;
    let frames = resp["body"]["stackFrames"].as_array().cloned().unwrap();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0]["name"], "a");
    assert_eq!(resp["body"]["totalFrames"], 4);
    h.finish().await;
}

#[tokio::test]
async fn evaluate_errors_fail_the_request() {
    let mut h = stopped(SessionConfig::default()).await;

    let seq = h
        .client
        .send(
            "evaluate",
            json!({"expression": "nope(", "frameId": 0, "context": "watch"}),
        )
        .await;
    assert_eq!(
        h.game.next_write().await,
        format!("__DebugAdapter.evaluate(0,[[watch]],[[nope(]],{seq})\n")
    );
    h.game.print(&format!(
        r#"DBGeval: {{"seq":{seq},"error":"unexpected symbol near <eof>"}}"#
    ));
    let resp = h.client.response(seq).await;
    assert_eq!(resp["success"], false);
    assert_eq!(resp["message"], "unexpected symbol near <eof>");
    h.finish().await;
}

#[tokio::test]
async fn requests_while_running_wait_for_the_next_prompt() {
    let (mut h, _) = launched(SessionConfig::default()).await;

    let seq = h
        .client
        .send("evaluate", json!({"expression": "game.tick"}))
        .await;
    h.client.request("threads", json!({})).await;
    assert_eq!(h.game.try_write(), None);

    h.game.print("DBG: on_tick");
    assert_eq!(
        h.game.writes_until_cont().await,
        [
            format!("__DebugAdapter.evaluate(nil,[[repl]],[[game.tick]],{seq})\n"),
            "cont\n".to_string(),
        ]
    );
    h.game.print(&format!(
        r#"DBGeval: {{"seq":{seq},"result":"120","type":"number","variablesReference":0}}"#
    ));
    let resp = h.client.response(seq).await;
    assert_eq!(resp["success"], true);
    assert_eq!(resp["body"]["result"], "120");
    h.finish().await;
}

#[tokio::test(start_paused = true)]
async fn unanswered_requests_time_out_as_unavailable() {
    let mut h = stopped(SessionConfig::default()).await;

    let seq = h
        .client
        .send("variables", json!({"variablesReference": 65536}))
        .await;
    h.game.next_write().await;
    let resp = h.client.response(seq).await;
    assert_eq!(resp["success"], true);
    assert_eq!(resp["body"]["variables"][0]["value"], "<unavailable>");

    // A late answer finds nothing waiting.
    h.game.print(&format!(r#"DBGvars: {{"seq":{seq},"variables":[]}}"#));
    h.client.request("threads", json!({})).await;
    h.finish().await;
}

#[tokio::test(start_paused = true)]
async fn expired_queued_commands_are_never_sent() {
    let (mut h, _) = launched(SessionConfig::default()).await;

    let seq = h
        .client
        .send("evaluate", json!({"expression": "1"}))
        .await;
    let resp = h.client.response(seq).await;
    assert_eq!(resp["body"]["result"], "<unavailable>");

    h.game.print("DBG: on_tick");
    assert_eq!(h.game.writes_until_cont().await, ["cont\n"]);
    h.finish().await;
}

#[tokio::test]
async fn requests_before_launch_are_unavailable() {
    let mut h = spawn_server(SessionConfig::default());
    h.client.initialize().await;
    let resp = h
        .client
        .request("stackTrace", json!({"threadId": 1}))
        .await;
    assert_eq!(resp["success"], true);
    assert_eq!(resp["body"]["stackFrames"], json!([]));

    let resp = h.client.request("threads", json!({})).await;
    assert_eq!(resp["body"]["threads"][0]["id"], 1);

    let resp = h.client.request("restartFrame", json!({"frameId": 1})).await;
    assert_eq!(resp["success"], false);
    h.finish().await;
}

#[tokio::test]
async fn stack_trace_translates_module_paths() {
    let mods = tempfile::tempdir().unwrap();
    let foo = mods.path().join("foo_1.0.0");
    std::fs::create_dir_all(&foo).unwrap();

    let mut h = spawn_server(SessionConfig::default());
    h.client.initialize().await;
    let resp = h
        .client
        .launch(json!({
            "program": "factorio",
            "modsPath": mods.path(),
            "hookMod": false,
        }))
        .await;
    assert_eq!(resp["success"], true);

    h.game.print(r#"EVTmodules: {"foo":"1.0.0","level":""}"#);
    let evt = h.client.event("module").await;
    assert_eq!(evt["body"]["module"]["name"], "foo");
    assert_eq!(
        evt["body"]["module"]["symbolStatus"],
        "Loaded from mods directory"
    );

    h.game.print("DBG: breakpoint");
    h.client.event("stopped").await;
    // The first prompt also carries the object info transfer.
    h.game.next_write().await;
    assert_eq!(h.game.next_write().await, "__DebugAdapter.loadObjectInfo()\n");

    let seq = h
        .client
        .send("stackTrace", json!({"threadId": 1}))
        .await;
    assert_eq!(
        h.game.next_write().await,
        "__DebugAdapter.stackTrace(0,1)\n"
    );
    h.game.print(
        r#"DBGstack: {"frames":[{"id":0,"name":"on_tick","line":7,"column":1,"source":{"name":"control.lua","path":"@__foo__/control.lua"}}]}"#,
    );
    let resp = h.client.response(seq).await;
    let frame = &resp["body"]["stackFrames"][0];
    assert_eq!(
        frame["source"]["path"],
        foo.join("control.lua").to_string_lossy().as_ref()
    );
    assert_eq!(frame["line"], 7);
    assert!(frame.get("instructionPointerReference").is_none());

    let resp = h.client.request("modules", json!({})).await;
    assert_eq!(resp["body"]["totalModules"], 2);
    h.finish().await;
}

#[tokio::test]
async fn in_memory_sources_are_fetched_from_the_game() {
    let mut h = stopped(SessionConfig::default()).await;

    h.game.print(r#"EVTsource: {"name":"=(load)","lines":[1]}"#);
    let evt = h.client.event("loadedSource").await;
    assert_eq!(evt["body"]["reason"], "new");
    assert_eq!(evt["body"]["source"]["sourceReference"], 1);

    let resp = h.client.request("loadedSources", json!({})).await;
    assert_eq!(resp["body"]["sources"][0]["sourceReference"], 1);

    let seq = h.client.send("source", json!({"sourceReference": 1})).await;
    assert_eq!(
        h.game.next_write().await,
        "__DebugAdapter.source(1,[[=(load)]])\n"
    );
    h.game
        .print(r#"DBGsource: {"id":1,"content":"return 1"}"#);
    let resp = h.client.response(seq).await;
    assert_eq!(resp["body"]["content"], "return 1");

    let resp = h.client.request("source", json!({"sourceReference": 9})).await;
    assert_eq!(resp["success"], false);
    h.finish().await;
}
