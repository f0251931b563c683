//! End-to-end conversation tests: a scripted model against the real tool
//! router, served over an in-memory MCP session.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};

use catalog::{Catalog, DedupPolicy};
use mcp::{Session, SessionOptions};
use runtime::{
    Conversation, ConversationConfig, Error, FunctionCall, GeminiAdapter, ModelBackend,
    ModelError, ModelReply, ModelRequest, OllamaAdapter, OllamaTool, OllamaToolCall, Phase,
    SchemaAdapter, ToolInvocation, Turn,
};
use runtime::adapter::{GeminiType, OllamaFunctionCall};
use serde_json::{Map, Value, json};
use toolbox::{ToolRegistry, ToolRouter};

const ROWS: &str = r#"
{"Material_Code":"CHD-A","Product_Type":"Chocolate","Base_Type":"Dark","Moulding_Type":"Callets","Legislation":"EU","Fat":40}
{"Material_Code":"CHD-B","Product_Type":"Chocolate","Base_Type":"Dark","Moulding_Type":"Callets","Fat":35.5}
{"Material_Code":"CHM-C","Product_Type":"Chocolate","Base_Type":"Milk","Moulding_Type":"Block","Fat":31}
{"Material_Code":"CHW-D","Product_Type":"Chocolate","Base_Type":"White","Moulding_Type":"Callets","Fat":28}
{"Material_Code":"FIL-E","Product_Type":"Filling","Fat":8}
"#;

/// Replays canned replies and records the history length of each request.
struct ScriptedBackend {
    replies: Mutex<VecDeque<ModelReply<OllamaToolCall>>>,
    repeat: Option<ModelReply<OllamaToolCall>>,
    requests: Mutex<Vec<usize>>,
}

impl ScriptedBackend {
    fn new(replies: Vec<ModelReply<OllamaToolCall>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            repeat: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    fn repeating(reply: ModelReply<OllamaToolCall>) -> Self {
        Self {
            repeat: Some(reply),
            ..Self::new(Vec::new())
        }
    }

    fn requests(&self) -> Vec<usize> {
        self.requests.lock().unwrap().clone()
    }
}

impl ModelBackend for ScriptedBackend {
    type Declaration = OllamaTool;
    type Call = OllamaToolCall;

    async fn generate(
        &self,
        request: ModelRequest<'_, OllamaTool>,
    ) -> Result<ModelReply<OllamaToolCall>, ModelError> {
        assert_eq!(request.tools.len(), 2);
        self.requests.lock().unwrap().push(request.history.len());
        let next = self.replies.lock().unwrap().pop_front();
        next.or_else(|| self.repeat.clone())
            .ok_or_else(|| ModelError::NoReply {
                backend: "script",
                reason: "script exhausted".into(),
            })
    }
}

fn ollama_call(name: &str, arguments: Value) -> OllamaToolCall {
    OllamaToolCall {
        function: OllamaFunctionCall {
            name: name.into(),
            arguments,
        },
    }
}

fn calls(calls: Vec<OllamaToolCall>) -> ModelReply<OllamaToolCall> {
    ModelReply {
        text: String::new(),
        calls,
    }
}

async fn session() -> Session {
    let catalog = Catalog::load_from(ROWS.as_bytes(), &DedupPolicy::default()).unwrap();
    let router = ToolRouter::new(ToolRegistry::builtin(), Arc::new(catalog));

    let (client, server) = tokio::io::duplex(64 * 1024);
    let (server_read, server_write) = tokio::io::split(server);
    tokio::spawn(mcp::serve(Arc::new(router), server_read, server_write));

    let (client_read, client_write) = tokio::io::split(client);
    Session::connect("ganache", client_read, client_write, SessionOptions::default())
        .await
        .unwrap()
}

#[tokio::test]
async fn threshold_question_takes_one_round_trip() {
    let backend = ScriptedBackend::new(vec![
        calls(vec![ollama_call(
            "query_skus_by_fat",
            json!({"fat_value": 10, "n": 3}),
        )]),
        ModelReply::text("CHD-A, CHD-B and CHM-C are above 10g."),
    ]);
    let mut conversation =
        Conversation::new(backend, OllamaAdapter, session().await, ConversationConfig::default())
            .unwrap();
    assert_eq!(conversation.phase(), Phase::AwaitingUserInput);

    let reply = conversation
        .send("find 3 records where fat > 10")
        .await
        .unwrap();
    assert!(!reply.degraded);
    assert_eq!(reply.round_trips, 1);
    assert_eq!(reply.text, "CHD-A, CHD-B and CHM-C are above 10g.");
    assert_eq!(conversation.phase(), Phase::Done);

    let history = conversation.history();
    assert_eq!(history.len(), 4);
    assert_eq!(history.iter().filter(|t| t.is_model()).count(), 2);
    assert_eq!(history.iter().filter(|t| t.is_tool_result()).count(), 1);

    let Turn::Model { calls, .. } = &history[1] else {
        panic!("expected model turn, got {:?}", history[1]);
    };
    let Turn::ToolResult {
        call_id,
        content,
        is_error,
        ..
    } = &history[2]
    else {
        panic!("expected tool result, got {:?}", history[2]);
    };
    assert_eq!(call_id, &calls[0].id);
    assert!(!is_error);
    assert!(content.starts_with("Found 3 SKU(s) where Fat > 10g:"), "{content}");
    assert!(content.contains("- CHD-A (Fat: 40g)"));
    assert!(!content.contains("CHW-D"));

    assert_eq!(conversation.backend().requests(), vec![1, 3]);
}

#[tokio::test]
async fn parallel_calls_keep_request_order() {
    let backend = ScriptedBackend::new(vec![
        calls(vec![
            ollama_call(
                "query_chocolate_products",
                json!({"chocolate_type": "dark", "moulding_type": "callets"}),
            ),
            ollama_call("query_recipes", json!({})),
            ollama_call("query_skus_by_fat", json!("not an object")),
            ollama_call("query_skus_by_fat", json!({"fat_value": 30, "operator": "<"})),
        ]),
        ModelReply::text("done"),
    ]);
    let mut conversation =
        Conversation::new(backend, OllamaAdapter, session().await, ConversationConfig::default())
            .unwrap();

    conversation.send("compare").await.unwrap();

    let results: Vec<(&str, &str, bool)> = conversation
        .history()
        .iter()
        .filter_map(|turn| match turn {
            Turn::ToolResult {
                call_id,
                content,
                is_error,
                ..
            } => Some((call_id.as_str(), content.as_str(), *is_error)),
            _ => None,
        })
        .collect();

    let ids: Vec<&str> = results.iter().map(|(id, _, _)| *id).collect();
    assert_eq!(ids, ["call_0_0", "call_0_1", "call_0_2", "call_0_3"]);

    assert!(!results[0].2);
    assert!(results[0].1.starts_with("Found 2 Dark chocolate product(s)"));
    assert!(results[1].2);
    assert!(results[1].1.contains("query_recipes"));
    assert!(results[2].2);
    assert!(results[2].1.starts_with("Error: malformed call to query_skus_by_fat"));
    assert!(!results[3].2);
    assert!(results[3].1.starts_with("Found 2 SKU(s) where Fat < 30g:"));
}

#[tokio::test]
async fn round_trip_bound_degrades_instead_of_failing() {
    let backend = ScriptedBackend::repeating(calls(vec![ollama_call(
        "query_skus_by_fat",
        json!({"fat_value": 1}),
    )]));
    let config = ConversationConfig {
        max_round_trips: 2,
        ..ConversationConfig::default()
    };
    let mut conversation =
        Conversation::new(backend, OllamaAdapter, session().await, config).unwrap();

    let reply = conversation.send("loop forever").await.unwrap();
    assert!(reply.degraded);
    assert_eq!(reply.round_trips, 2);
    assert!(reply.text.starts_with("Stopped after 2 tool round trips"));

    let history = conversation.history();
    // user, (model + result) x2, final model turn without calls
    assert_eq!(history.len(), 6);
    assert!(matches!(history.last(), Some(Turn::Model { calls, .. }) if calls.is_empty()));
    assert_eq!(conversation.backend().requests().len(), 3);
}

#[tokio::test]
async fn long_results_are_truncated_in_history() {
    let backend = ScriptedBackend::new(vec![
        calls(vec![ollama_call("query_skus_by_fat", json!({"fat_value": 0}))]),
        ModelReply::text("ok"),
    ]);
    let config = ConversationConfig {
        max_result_chars: 20,
        ..ConversationConfig::default()
    };
    let mut conversation =
        Conversation::new(backend, OllamaAdapter, session().await, config).unwrap();
    conversation.send("everything").await.unwrap();

    let Turn::ToolResult { content, .. } = &conversation.history()[2] else {
        panic!("expected tool result");
    };
    assert!(content.contains("[truncated"));
    assert!(content.starts_with("Found 5 SKU(s)"));
}

#[tokio::test]
async fn lost_session_fails_the_turn_and_rolls_back() {
    let session = session().await;
    let backend = ScriptedBackend::new(vec![calls(vec![ollama_call(
        "query_skus_by_fat",
        json!({"fat_value": 10}),
    )])]);
    let mut conversation =
        Conversation::new(backend, OllamaAdapter, session.clone(), ConversationConfig::default())
            .unwrap();

    session.close().await;
    let err = conversation.send("anything").await.unwrap_err();
    assert!(matches!(err, Error::ToolService(mcp::Error::SessionClosed)), "{err}");
    assert!(err.to_string().starts_with("cannot reach tool service"));
    assert!(conversation.history().is_empty());
    assert_eq!(conversation.phase(), Phase::AwaitingUserInput);
}

#[tokio::test]
async fn model_failure_keeps_earlier_turns() {
    let backend = ScriptedBackend::new(vec![ModelReply::text("hello")]);
    let mut conversation =
        Conversation::new(backend, OllamaAdapter, session().await, ConversationConfig::default())
            .unwrap();

    conversation.send("hi").await.unwrap();
    let err = conversation.send("again").await.unwrap_err();
    assert!(matches!(err, Error::Model(ModelError::NoReply { .. })));
    assert_eq!(conversation.history().len(), 2);
}

/// A plausible argument for a declared parameter: the first enum value,
/// else a value of the declared type.
fn sample_value(kind: &str, allowed: Option<&str>) -> Value {
    match (allowed, kind) {
        (Some(first), _) => json!(first),
        (None, "number") => json!(30.5),
        (None, "integer") => json!(4),
        (None, _) => json!("callets"),
    }
}

#[test]
fn adapters_round_trip_canonical_invocations() {
    let definitions = ToolRegistry::builtin().definitions();
    let ollama = OllamaAdapter.encode(&definitions).unwrap();
    let gemini = GeminiAdapter.encode(&definitions).unwrap();
    assert_eq!(ollama.len(), definitions.len());
    assert_eq!(gemini.len(), definitions.len());

    for (o, g) in ollama.iter().zip(&gemini) {
        assert_eq!(o.function.name, g.name);

        // Arguments are built only from what each adapter declared
        let ollama_args: Map<String, Value> = o
            .function
            .parameters
            .properties
            .iter()
            .map(|(key, schema)| {
                let kind = schema.kind.as_str();
                let first = schema
                    .allowed
                    .as_ref()
                    .and_then(|values| values.first())
                    .and_then(Value::as_str);
                (key.clone(), sample_value(kind, first))
            })
            .collect();

        let gemini_params = g.parameters.as_ref().unwrap();
        assert_eq!(gemini_params.kind, GeminiType::Object);
        let gemini_args: BTreeMap<String, Value> = gemini_params
            .properties
            .iter()
            .flatten()
            .map(|(key, schema)| {
                let kind = match schema.kind {
                    GeminiType::String => "string",
                    GeminiType::Number => "number",
                    GeminiType::Integer => "integer",
                    GeminiType::Object => "object",
                };
                let first = schema
                    .enum_values
                    .as_ref()
                    .and_then(|values| values.first())
                    .map(String::as_str);
                (key.clone(), sample_value(kind, first))
            })
            .collect();

        let expected = ToolInvocation::new(o.function.name.clone(), ollama_args.clone());
        assert_eq!(
            gemini_args.keys().collect::<Vec<_>>(),
            ollama_args.keys().collect::<Vec<_>>()
        );

        let native = ollama_call(&o.function.name, Value::Object(ollama_args));
        assert_eq!(OllamaAdapter.decode(&native).unwrap(), expected);

        let native = FunctionCall {
            name: g.name.clone(),
            args: Some(gemini_args),
            thought_signature: None,
        };
        assert_eq!(GeminiAdapter.decode(&native).unwrap(), expected);

        // Argument-less calls decode to empty arguments on both sides
        let bare = ToolInvocation::new(g.name.clone(), Map::new());
        assert_eq!(OllamaAdapter.decode(&ollama_call(&g.name, Value::Null)).unwrap(), bare);
        let native = FunctionCall {
            name: g.name.clone(),
            args: None,
            thought_signature: None,
        };
        assert_eq!(GeminiAdapter.decode(&native).unwrap(), bare);
    }
}

#[test]
fn gemini_declarations_use_uppercase_types_and_fold_defaults() {
    let definitions = ToolRegistry::builtin().definitions();
    let declarations = GeminiAdapter.encode(&definitions).unwrap();
    let json = serde_json::to_value(&declarations).unwrap();

    let products = json
        .as_array()
        .unwrap()
        .iter()
        .find(|d| d["name"] == "query_chocolate_products")
        .unwrap();
    let params = &products["parameters"];
    assert_eq!(params["type"], "OBJECT");

    let chocolate_type = &params["properties"]["chocolate_type"];
    assert_eq!(chocolate_type["type"], "STRING");
    assert_eq!(chocolate_type["enum"], json!(["Dark", "Milk", "White"]));

    let n = &params["properties"]["n"];
    assert_eq!(n["type"], "INTEGER");
    assert!(n.get("default").is_none());
    let canonical_default = definitions
        .iter()
        .find(|d| d.name == "query_chocolate_products")
        .unwrap()
        .input_schema
        .properties["n"]
        .default
        .clone()
        .unwrap();
    assert!(
        n["description"]
            .as_str()
            .unwrap()
            .ends_with(&format!("(default: {canonical_default})")),
        "{n}"
    );

    let fat = json
        .as_array()
        .unwrap()
        .iter()
        .find(|d| d["name"] == "query_skus_by_fat")
        .unwrap();
    assert_eq!(fat["parameters"]["properties"]["fat_value"]["type"], "NUMBER");
    assert_eq!(fat["parameters"]["properties"]["operator"]["type"], "STRING");
    assert!(
        fat["parameters"]["properties"]["operator"]["description"]
            .as_str()
            .unwrap()
            .ends_with("(default: >)")
    );
    assert_eq!(fat["parameters"]["required"], json!(["fat_value"]));
}
