//! MCP server: JSON-RPC 2.0 over stdio, one request per line

use crate::advice::{AdviceRequest, AdviceResult, ConversationContext, SituationType, Urgency};
use crate::error::Result;
use crate::session::AdviceSession;
use crate::storage::{ConversationRecord, MemoryRecord, MemorySearch};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

const PARSE_ERROR: i32 = -32700;
const METHOD_NOT_FOUND: i32 = -32601;
const INVALID_PARAMS: i32 = -32602;
const INTERNAL_ERROR: i32 = -32603;

#[derive(Debug, Deserialize)]
struct McpRequest {
    #[allow(dead_code)]
    jsonrpc: String,
    id: Option<Value>,
    method: String,
    #[serde(default)]
    params: Value,
}

#[derive(Debug, Serialize)]
pub struct McpResponse {
    jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<McpError>,
}

#[derive(Debug, Serialize)]
struct McpError {
    code: i32,
    message: String,
}

impl McpResponse {
    fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    fn error(id: Option<Value>, code: i32, message: &str) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(McpError {
                code,
                message: message.to_string(),
            }),
        }
    }

    /// Tool output as MCP text content plus the structured payload
    fn tool_result(id: Option<Value>, text: String, data: Value) -> Self {
        Self::success(
            id,
            json!({
                "content": [{
                    "type": "text",
                    "text": text
                }],
                "structuredContent": data
            }),
        )
    }
}

#[derive(Debug, Serialize)]
struct ToolDefinition {
    name: &'static str,
    description: &'static str,
    #[serde(rename = "inputSchema")]
    input_schema: Value,
}

fn get_tools() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: "get_conversation_advice",
            description: "Get advice for an upcoming conversation. Uses local models first and cloud models only with consent.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "situation": {"type": "string", "description": "What the conversation is about"},
                    "context": {"type": "string", "enum": ["general", "work", "family", "friends", "romantic"]},
                    "relationship": {"type": "string", "description": "Who the conversation is with (e.g. 'manager', 'partner')"},
                    "urgency": {"type": "string", "enum": ["low", "medium", "high"]}
                },
                "required": ["situation"]
            }),
        },
        ToolDefinition {
            name: "store_memory",
            description: "Remember an experience so future advice can draw on it",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "title": {"type": "string"},
                    "content": {"type": "string"},
                    "tags": {"type": "array", "items": {"type": "string"}},
                    "memory_type": {"type": "string", "description": "Defaults to 'experience'"}
                },
                "required": ["title", "content"]
            }),
        },
        ToolDefinition {
            name: "search_memories",
            description: "Search stored memories by text, tags, or type",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string"},
                    "tags": {"type": "array", "items": {"type": "string"}},
                    "memory_type": {"type": "string"},
                    "limit": {"type": "integer", "default": 10}
                }
            }),
        },
        ToolDefinition {
            name: "record_conversation_outcome",
            description: "Record how a coached conversation went (rating 1-5)",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "conversation_id": {"type": "integer"},
                    "outcome": {"type": "string"},
                    "success_rating": {"type": "integer", "minimum": 1, "maximum": 5},
                    "lessons_learned": {"type": "string"}
                },
                "required": ["conversation_id", "outcome", "success_rating"]
            }),
        },
        ToolDefinition {
            name: "analyze_communication_patterns",
            description: "Summarize advice history and conversation outcomes",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "situation_type": {
                        "type": "string",
                        "enum": ["professional", "romantic", "family", "friendship", "apology", "conflict_resolution", "general"]
                    }
                }
            }),
        },
        ToolDefinition {
            name: "get_security_status",
            description: "Report encryption, consent, and which backend would handle advice",
            input_schema: json!({
                "type": "object",
                "properties": {}
            }),
        },
    ]
}

fn handle_initialize(id: Option<Value>) -> McpResponse {
    McpResponse::success(
        id,
        json!({
            "protocolVersion": "2024-11-05",
            "capabilities": {
                "tools": {}
            },
            "serverInfo": {
                "name": "whaddyasay",
                "version": env!("CARGO_PKG_VERSION")
            }
        }),
    )
}

fn handle_tools_list(id: Option<Value>) -> McpResponse {
    McpResponse::success(id, json!({ "tools": get_tools() }))
}

fn str_arg<'a>(args: &'a Value, name: &str) -> Option<&'a str> {
    args.get(name).and_then(|v| v.as_str()).filter(|s| !s.trim().is_empty())
}

fn tags_arg(args: &Value) -> Vec<String> {
    args.get("tags")
        .and_then(|v| v.as_array())
        .map(|tags| {
            tags.iter()
                .filter_map(|t| t.as_str())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Plain-text rendering used as the tool's text content
pub fn format_advice(result: &AdviceResult) -> String {
    let mut text = format!("Strategy: {}\n", result.strategy());

    let sections: [(&str, &[String]); 4] = [
        ("Key points", result.key_points()),
        ("Helpful phrases", result.helpful_phrases()),
        ("Avoid", result.pitfalls()),
        ("Prepare", &result.content.preparation_steps),
    ];
    for (heading, items) in sections {
        if items.is_empty() {
            continue;
        }
        text.push_str(&format!("\n{}:\n", heading));
        for item in items {
            text.push_str(&format!("- {}\n", item));
        }
    }

    text.push_str(&format!(
        "\nGenerated by {} ({})",
        result.model,
        result.privacy_level.description()
    ));
    text
}

async fn handle_get_advice(id: Option<Value>, args: &Value, session: &mut AdviceSession) -> McpResponse {
    let Some(situation) = str_arg(args, "situation") else {
        return McpResponse::error(id, INVALID_PARAMS, "Missing 'situation' parameter");
    };

    let mut request = AdviceRequest::new(situation);
    if let Some(context) = str_arg(args, "context") {
        request = request.with_context(ConversationContext::parse(context));
    }
    if let Some(relationship) = str_arg(args, "relationship") {
        request = request.with_relationship(relationship);
    }
    if let Some(urgency) = str_arg(args, "urgency") {
        request = request.with_urgency(Urgency::parse(urgency));
    }

    // Advice is returned even when the history write fails
    let result = session.generate_advice(&request).await;
    let record = ConversationRecord::new(&request.situation, result.clone());
    let conversation_id = match session.records().store_conversation(&record) {
        Ok(conversation_id) => Some(conversation_id),
        Err(e) => {
            warn!("Could not save conversation: {}", e);
            None
        }
    };

    let text = match conversation_id {
        Some(conversation_id) => format!(
            "{}\n\nConversation id: {} (use it to record the outcome)",
            format_advice(&result),
            conversation_id
        ),
        None => format!(
            "{}\n\nThis conversation could not be saved, so no outcome can be recorded.",
            format_advice(&result)
        ),
    };
    McpResponse::tool_result(
        id,
        text,
        json!({ "conversation_id": conversation_id, "advice": result }),
    )
}

fn handle_store_memory(id: Option<Value>, args: &Value, session: &AdviceSession) -> McpResponse {
    let (Some(title), Some(content)) = (str_arg(args, "title"), str_arg(args, "content")) else {
        return McpResponse::error(id, INVALID_PARAMS, "Missing 'title' or 'content' parameter");
    };

    let mut memory = MemoryRecord::new(title, content).with_tags(tags_arg(args));
    if let Some(memory_type) = str_arg(args, "memory_type") {
        memory = memory.with_type(memory_type);
    }

    match session.records().store_memory(&memory) {
        Ok(memory_id) => McpResponse::tool_result(
            id,
            format!("Stored memory {} ({})", memory_id, title),
            json!({ "id": memory_id, "encrypted": session.records().is_encrypting() }),
        ),
        Err(e) => McpResponse::error(id, INTERNAL_ERROR, &e.to_string()),
    }
}

fn handle_search_memories(id: Option<Value>, args: &Value, session: &AdviceSession) -> McpResponse {
    let mut search = MemorySearch::new(str_arg(args, "query").unwrap_or("")).with_tags(tags_arg(args));
    if let Some(memory_type) = str_arg(args, "memory_type") {
        search = search.with_type(memory_type);
    }
    if let Some(limit) = args.get("limit").and_then(|v| v.as_u64()) {
        search = search.with_limit(limit as usize);
    }

    let memories = match session.records().search_memories(&search) {
        Ok(m) => m,
        Err(e) => return McpResponse::error(id, INTERNAL_ERROR, &e.to_string()),
    };

    let text = if memories.is_empty() {
        "No matching memories".to_string()
    } else {
        memories
            .iter()
            .map(|m| {
                format!(
                    "[{}] {} ({}): {}",
                    m.id.unwrap_or_default(),
                    m.title,
                    m.memory_type,
                    m.content
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    };
    McpResponse::tool_result(id, text, json!({ "memories": memories }))
}

fn handle_record_outcome(id: Option<Value>, args: &Value, session: &AdviceSession) -> McpResponse {
    let conversation_id = args.get("conversation_id").and_then(|v| v.as_i64());
    let rating = args.get("success_rating").and_then(|v| v.as_u64());
    let (Some(conversation_id), Some(outcome), Some(rating)) =
        (conversation_id, str_arg(args, "outcome"), rating)
    else {
        return McpResponse::error(
            id,
            INVALID_PARAMS,
            "Missing 'conversation_id', 'outcome', or 'success_rating' parameter",
        );
    };
    let rating = rating.clamp(1, 5) as u8;

    match session.records().record_outcome(
        conversation_id,
        outcome,
        rating,
        str_arg(args, "lessons_learned"),
    ) {
        Ok(()) => McpResponse::tool_result(
            id,
            format!("Recorded outcome for conversation {} ({}/5)", conversation_id, rating),
            json!({ "conversation_id": conversation_id, "success_rating": rating }),
        ),
        Err(e) => McpResponse::error(id, INTERNAL_ERROR, &e.to_string()),
    }
}

fn handle_analyze_patterns(id: Option<Value>, args: &Value, session: &AdviceSession) -> McpResponse {
    let filter = match str_arg(args, "situation_type") {
        Some(s) => match SituationType::from_str(s) {
            Some(t) => Some(t),
            None => {
                return McpResponse::error(id, INVALID_PARAMS, &format!("Unknown situation type: {}", s))
            }
        },
        None => None,
    };

    match session.pattern_report(filter) {
        Ok(report) => {
            let mut text = format!(
                "{} advice generated ({} by models, {} from templates), {} conversations recorded",
                report.total_advice,
                report.llm_generated,
                report.template_generated,
                report.conversations
            );
            if let Some(avg) = report.average_rating {
                text.push_str(&format!(", average rating {:.1}/5", avg));
            }
            for insight in &report.insights {
                text.push_str(&format!("\n- {}", insight));
            }
            McpResponse::tool_result(id, text, json!(report))
        }
        Err(e) => McpResponse::error(id, INTERNAL_ERROR, &e.to_string()),
    }
}

fn handle_security_status(id: Option<Value>, session: &AdviceSession) -> McpResponse {
    let vault = match session.vault_status() {
        Ok(v) => v,
        Err(e) => return McpResponse::error(id, INTERNAL_ERROR, &e.to_string()),
    };
    let engine = session.status();

    let text = format!(
        "Encryption: {} ({}, {})\nCloud consent: {}\nAdvice backend: {} - {}",
        if vault.authenticated {
            "unlocked"
        } else if vault.setup_complete {
            "locked"
        } else {
            "not set up"
        },
        vault.algorithm,
        vault.key_derivation,
        if engine.consent.cloud_api { "granted" } else { "not granted" },
        engine.model,
        engine.privacy_description
    );
    McpResponse::tool_result(id, text, json!({ "vault": vault, "engine": engine }))
}

async fn handle_tool_call(id: Option<Value>, params: &Value, session: &mut AdviceSession) -> McpResponse {
    let tool_name = params.get("name").and_then(|v| v.as_str()).unwrap_or("");
    let arguments = params.get("arguments").cloned().unwrap_or_else(|| json!({}));
    debug!("MCP tool call: {}", tool_name);

    match tool_name {
        "get_conversation_advice" => handle_get_advice(id, &arguments, session).await,
        "store_memory" => handle_store_memory(id, &arguments, session),
        "search_memories" => handle_search_memories(id, &arguments, session),
        "record_conversation_outcome" => handle_record_outcome(id, &arguments, session),
        "analyze_communication_patterns" => handle_analyze_patterns(id, &arguments, session),
        "get_security_status" => handle_security_status(id, session),
        _ => McpResponse::error(id, METHOD_NOT_FOUND, &format!("Unknown tool: {}", tool_name)),
    }
}

/// Handle one input line. Notifications get no response.
pub async fn handle_line(session: &mut AdviceSession, line: &str) -> Option<McpResponse> {
    let request: McpRequest = match serde_json::from_str(line) {
        Ok(r) => r,
        Err(e) => return Some(McpResponse::error(None, PARSE_ERROR, &format!("Parse error: {}", e))),
    };

    let response = match request.method.as_str() {
        "initialize" => handle_initialize(request.id),
        "notifications/initialized" => return None,
        "tools/list" => handle_tools_list(request.id),
        "tools/call" => handle_tool_call(request.id, &request.params, session).await,
        _ => McpResponse::error(
            request.id,
            METHOD_NOT_FOUND,
            &format!("Method not found: {}", request.method),
        ),
    };
    Some(response)
}

/// Serve until stdin closes
pub async fn run_mcp_server(session: &mut AdviceSession) -> Result<()> {
    info!("MCP server listening on stdio");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let stdout = std::io::stdout();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let Some(response) = handle_line(session, &line).await else {
            continue;
        };

        let mut stdout = stdout.lock();
        serde_json::to_writer(&mut stdout, &response)?;
        writeln!(stdout)?;
        stdout.flush()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionOptions;
    use crate::storage::Database;
    use std::sync::Arc;

    fn session() -> AdviceSession {
        let db = Arc::new(Database::open_in_memory().unwrap());
        AdviceSession::new(db, Vec::new(), SessionOptions::default()).with_vault_iterations(10)
    }

    async fn call(session: &mut AdviceSession, line: &str) -> Value {
        let response = handle_line(session, line).await.unwrap();
        serde_json::to_value(&response).unwrap()
    }

    async fn tool(session: &mut AdviceSession, name: &str, arguments: Value) -> Value {
        let line = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "tools/call",
            "params": {"name": name, "arguments": arguments}
        })
        .to_string();
        call(session, &line).await
    }

    #[tokio::test]
    async fn test_initialize_and_list() {
        let mut s = session();
        let init = call(&mut s, r#"{"jsonrpc":"2.0","id":1,"method":"initialize"}"#).await;
        assert_eq!(init["result"]["serverInfo"]["name"], "whaddyasay");

        let list = call(&mut s, r#"{"jsonrpc":"2.0","id":2,"method":"tools/list"}"#).await;
        let names: Vec<&str> = list["result"]["tools"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["name"].as_str().unwrap())
            .collect();
        assert_eq!(names.len(), 6);
        assert!(names.contains(&"get_conversation_advice"));
        assert!(names.contains(&"get_security_status"));
    }

    #[tokio::test]
    async fn test_notification_and_errors() {
        let mut s = session();
        assert!(handle_line(&mut s, r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
            .await
            .is_none());

        let bad = call(&mut s, "not json").await;
        assert_eq!(bad["error"]["code"], PARSE_ERROR);

        let unknown = call(&mut s, r#"{"jsonrpc":"2.0","id":3,"method":"nope"}"#).await;
        assert_eq!(unknown["error"]["code"], METHOD_NOT_FOUND);

        let missing = tool(&mut s, "get_conversation_advice", json!({})).await;
        assert_eq!(missing["error"]["code"], INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_advice_then_outcome_then_report() {
        let mut s = session();
        let advice = tool(
            &mut s,
            "get_conversation_advice",
            json!({"situation": "My boss hasn't given me a raise in two years", "relationship": "manager"}),
        )
        .await;
        let data = &advice["result"]["structuredContent"];
        assert_eq!(data["advice"]["source"], "template");
        let conversation_id = data["conversation_id"].as_i64().unwrap();

        let outcome = tool(
            &mut s,
            "record_conversation_outcome",
            json!({"conversation_id": conversation_id, "outcome": "Got a review date", "success_rating": 5}),
        )
        .await;
        assert!(outcome["error"].is_null());

        let report = tool(&mut s, "analyze_communication_patterns", json!({})).await;
        let report = &report["result"]["structuredContent"];
        assert_eq!(report["total_advice"], 1);
        assert_eq!(report["rated_conversations"], 1);
        assert_eq!(report["most_successful"], "professional");
    }

    #[tokio::test]
    async fn test_advice_survives_failed_history_write() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        db.conn()
            .unwrap()
            .execute_batch(
                "CREATE TRIGGER reject_conversations BEFORE INSERT ON conversations
                 BEGIN SELECT RAISE(FAIL, 'disk full'); END;",
            )
            .unwrap();
        let mut s = AdviceSession::new(db, Vec::new(), SessionOptions::default());

        let advice = tool(
            &mut s,
            "get_conversation_advice",
            json!({"situation": "I need to apologize to my sister"}),
        )
        .await;
        assert!(advice["error"].is_null());
        let data = &advice["result"]["structuredContent"];
        assert!(data["conversation_id"].is_null());
        assert_eq!(data["advice"]["source"], "template");
        let text = advice["result"]["content"][0]["text"].as_str().unwrap();
        assert!(text.contains("could not be saved"));
    }

    #[test]
    fn test_memory_type_default_matches_schema() {
        let tools = get_tools();
        let store = tools.iter().find(|t| t.name == "store_memory").unwrap();
        let described = store.input_schema["properties"]["memory_type"]["description"]
            .as_str()
            .unwrap();
        let default = MemoryRecord::new("t", "c").memory_type;
        assert!(described.contains(&format!("'{}'", default)));
    }

    #[tokio::test]
    async fn test_memory_tools() {
        let mut s = session();
        tool(
            &mut s,
            "store_memory",
            json!({"title": "Salary talk", "content": "Bringing numbers helped", "tags": ["work"]}),
        )
        .await;
        let found = tool(&mut s, "search_memories", json!({"query": "numbers"})).await;
        let memories = found["result"]["structuredContent"]["memories"].as_array().unwrap();
        assert_eq!(memories.len(), 1);
        assert_eq!(memories[0]["title"], "Salary talk");

        let status = tool(&mut s, "get_security_status", json!({})).await;
        let text = status["result"]["content"][0]["text"].as_str().unwrap();
        assert!(text.contains("not set up"));
    }
}
