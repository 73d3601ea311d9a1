//! Tests for local tools, routing, and tools served over the protocol client.

mod common;

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{content_chunk, sse_body, stop_chunk, tool_call_chunk, tool_finish_chunk, MemoryTransport};
use mcpez::mcp::{McpClient, McpClientOptions};
use mcpez::prelude::*;

fn convert_tool() -> AgentTool {
    AgentTool::new(
        "convert",
        "Convert an amount between currencies",
        AgentToolParameters::object()
            .number("amount", "Amount to convert", true)
            .string_enum("to", "Target currency", &["EUR", "GBP"], true)
            .build(),
        |args| async move {
            let amount = args.get_f64("amount")?;
            let rate = match args.get_str("to")? {
                "EUR" => 0.5,
                _ => 0.25,
            };
            Ok(json!({"amount": amount * rate}))
        },
    )
}

#[test]
fn parameter_builder_constructs_schema() {
    let params = AgentToolParameters::object()
        .string("query", "Search query", true)
        .number("limit", "Max results", false)
        .boolean("verbose", "Enable verbose output", false)
        .build();

    let schema = &params.schema;
    assert_eq!(schema["type"], "object");
    assert_eq!(schema["properties"]["query"]["type"], "string");
    assert_eq!(schema["properties"]["limit"]["type"], "number");
    assert_eq!(schema["required"], json!(["query"]));
}

#[test]
fn tool_arguments_parse_model_output() {
    let args = ToolArguments::parse(r#"{"name": "Alice", "age": 30}"#).unwrap();
    assert_eq!(args.get_str("name").unwrap(), "Alice");
    assert_eq!(args.get_i64("age").unwrap(), 30);
    assert!(args.get_str("missing").is_err());
    assert_eq!(ToolArguments::parse("  ").unwrap().raw(), &json!({}));
}

#[tokio::test]
async fn tool_set_advertises_function_definitions() {
    let tools = ToolSet::new().with(convert_tool());
    let catalogue = tools.tools();

    assert_eq!(catalogue.len(), 1);
    assert_eq!(catalogue[0]["type"], "function");
    assert_eq!(catalogue[0]["function"]["name"], "convert");
    assert_eq!(catalogue[0]["function"]["parameters"]["additionalProperties"], false);
    assert_eq!(catalogue[0]["function"]["parameters"]["required"], json!(["amount", "to"]));

    let result = tools
        .execute("convert", json!({"amount": 10.0, "to": "EUR"}))
        .await
        .unwrap();
    assert_eq!(result, json!({"amount": 5.0}));
}

#[tokio::test]
async fn router_fronts_local_and_remote_tools() {
    let client = McpClient::new(
        "http://tools.local/sse",
        MemoryTransport::server(),
        McpClientOptions::default(),
    );
    client.connect(Duration::from_secs(1)).await.unwrap();

    let router = ToolRouter::new()
        .with("stocks", Arc::new(client))
        .with("local", Arc::new(ToolSet::new().with(convert_tool())));

    let names: Vec<&str> = router.server_names().collect();
    assert_eq!(names, vec!["stocks", "local"]);
    assert_eq!(router.server_for("get_price"), Some("stocks"));
    assert_eq!(router.server_for("convert"), Some("local"));
    assert_eq!(router.tools().len(), 2);

    let price = router.execute("get_price", json!({"symbol": "AAPL"})).await.unwrap();
    assert_eq!(price["content"][0]["text"], "187.5");
    let converted = router.execute("convert", json!({"amount": 4, "to": "GBP"})).await.unwrap();
    assert_eq!(converted, json!({"amount": 1.0}));
}

#[tokio::test]
async fn engine_runs_tools_from_a_tool_server() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_string_contains(r#""role":"tool""#))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(sse_body(&[content_chunk("187.5 USD"), stop_chunk()]), "text/event-stream"),
        )
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            sse_body(&[
                tool_call_chunk(0, "call_1", "get_price", r#"{"symbol":"AAPL"}"#),
                tool_finish_chunk(),
            ]),
            "text/event-stream",
        ))
        .mount(&server)
        .await;

    let transport = MemoryTransport::server();
    let client = McpClient::new("http://tools.local/sse", transport.clone(), McpClientOptions::default());
    client.connect(Duration::from_secs(1)).await.unwrap();

    let config = ChatConfig::builder().base_url(server.uri()).build();
    let engine = ChatEngine::new(config).with_tool_executor(Arc::new(client));
    let bus = engine.create("price of AAPL?", &Attachments::new()).await.unwrap();

    assert_eq!(bus.final_message().await.unwrap().unwrap().text(), "187.5 USD");

    let call = transport
        .posted()
        .into_iter()
        .map(|(_, message)| message)
        .find(|message| message["method"] == "tools/call")
        .unwrap();
    assert_eq!(call["params"], json!({"name": "get_price", "arguments": {"symbol": "AAPL"}}));

    let requests = server.received_requests().await.unwrap();
    let follow_up: Value = requests[1].body_json().unwrap();
    let tool_message = &follow_up["messages"][2];
    let result: Value = serde_json::from_str(tool_message["content"].as_str().unwrap()).unwrap();
    assert_eq!(result["content"][0]["text"], "187.5");
}
