use base64::Engine as _;
use fmtk_bytecode::{Chunk, Constant, Instruction, OpCode, Prototype};
use fmtk_config::SessionConfig;
use serde_json::json;

use crate::harness::{stopped, Harness};

fn proto(line_defined: u32) -> Prototype {
    Prototype {
        source: Some("@t.lua".to_string()),
        line_defined,
        max_stack_size: 2,
        code: vec![
            Instruction::abx(OpCode::LoadK, 0, 0),
            Instruction::abc(OpCode::Return, 0, 1, 0),
        ],
        constants: vec![Constant::Number(1.0)],
        line_info: vec![line_defined + 1, line_defined + 2],
        ..Prototype::default()
    }
}

/// Two instructions at the top level and two in a function defined on line 3.
fn dump() -> String {
    let mut main = proto(0);
    main.is_vararg = 1;
    main.protos.push(proto(3));
    let bytes = Chunk { main }.dump();
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

async fn with_chunk() -> Harness {
    let mut h = stopped(SessionConfig::default()).await;
    h.game.print(&format!(
        r#"EVTsource: {{"name":"@t.lua","lines":[1,2,4,5],"dump":"{}"}}"#,
        dump()
    ));
    h.client.event("loadedSource").await;
    h
}

#[tokio::test]
async fn loaded_chunks_disassemble_at_flat_addresses() {
    let mut h = with_chunk().await;

    let resp = h
        .client
        .request(
            "disassemble",
            json!({"memoryReference": "1", "instructionCount": 5}),
        )
        .await;
    assert_eq!(resp["success"], true, "{resp}");
    let listing = resp["body"]["instructions"].as_array().cloned().unwrap();
    let addresses: Vec<_> = listing.iter().map(|i| i["address"].clone()).collect();
    assert_eq!(addresses, ["1", "2", "3", "4", "5"]);
    assert!(listing[0]["instruction"]
        .as_str()
        .unwrap()
        .starts_with("LOADK"));
    assert_eq!(listing[2]["line"], 4);
    assert!(listing[..4]
        .iter()
        .all(|i| i.get("presentationHint").is_none()));
    assert_eq!(listing[4]["presentationHint"], "invalid");
    h.finish().await;
}

#[tokio::test]
async fn offsets_and_hex_references() {
    let mut h = with_chunk().await;

    let resp = h
        .client
        .request(
            "disassemble",
            json!({"memoryReference": "0x2", "instructionOffset": -2, "instructionCount": 2}),
        )
        .await;
    let listing = resp["body"]["instructions"].as_array().cloned().unwrap();
    assert_eq!(listing[0]["address"], "0");
    assert_eq!(listing[0]["presentationHint"], "invalid");
    assert_eq!(listing[1]["address"], "1");

    let resp = h
        .client
        .request(
            "disassemble",
            json!({"memoryReference": "main", "instructionCount": 2}),
        )
        .await;
    assert_eq!(resp["success"], false);
    h.finish().await;
}

#[tokio::test]
async fn listings_keep_the_requested_length_past_the_last_chunk() {
    let mut h = with_chunk().await;

    let resp = h
        .client
        .request(
            "disassemble",
            json!({"memoryReference": "3", "instructionCount": 6}),
        )
        .await;
    let listing = resp["body"]["instructions"].as_array().cloned().unwrap();
    let addresses: Vec<_> = listing.iter().map(|i| i["address"].clone()).collect();
    assert_eq!(addresses, ["3", "4", "5", "6", "7", "8"]);
    assert!(listing[..2]
        .iter()
        .all(|i| i.get("presentationHint").is_none()));
    assert!(listing[2..]
        .iter()
        .all(|i| i["presentationHint"] == "invalid"));
    h.finish().await;
}

#[tokio::test]
async fn addresses_at_the_end_of_the_range_are_answered() {
    let mut h = with_chunk().await;

    let resp = h
        .client
        .request(
            "disassemble",
            json!({"memoryReference": "9223372036854775807", "instructionCount": 2}),
        )
        .await;
    assert_eq!(resp["success"], true, "{resp}");
    let listing = resp["body"]["instructions"].as_array().cloned().unwrap();
    assert_eq!(listing.len(), 1);
    assert_eq!(listing[0]["address"], "9223372036854775807");
    assert_eq!(listing[0]["presentationHint"], "invalid");

    let resp = h
        .client
        .request(
            "disassemble",
            json!({"memoryReference": "9223372036854775807", "instructionOffset": 1, "instructionCount": 1}),
        )
        .await;
    assert_eq!(resp["success"], false);

    // The session is still serving requests.
    let resp = h.client.request("threads", json!({})).await;
    assert_eq!(resp["success"], true);
    h.finish().await;
}

#[tokio::test]
async fn frames_carry_an_instruction_pointer() {
    let mut h = with_chunk().await;

    let seq = h
        .client
        .send("stackTrace", json!({"threadId": 1}))
        .await;
    h.game.next_write().await;
    h.game.print(
        r#"DBGstack: {"frames":[{"id":0,"name":"f","line":4,"source":{"name":"t.lua","path":"@t.lua"},"pc":0,"linedefined":3}]}"#,
    );
    let resp = h.client.response(seq).await;
    let frame = &resp["body"]["stackFrames"][0];
    assert_eq!(frame["instructionPointerReference"], "3");
    assert_eq!(frame["source"]["sourceReference"], 1);
    h.finish().await;
}
