//! Model Context Protocol (MCP) server implementation.
//!
//! Implements JSON-RPC 2.0 over stdin/stdout so an external AI agent can
//! discover and invoke the mission tool set.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::io::{self, BufRead, Write};
use std::sync::Arc;

use crate::tools::ToolRegistry;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: Option<serde_json::Value>,
    pub method: String,
    #[serde(default)]
    pub params: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerCapabilities {
    pub tools: Option<ToolsCapability>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsCapability {
    #[serde(rename = "listChanged")]
    pub list_changed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallResult {
    pub content: Vec<ToolContent>,
    #[serde(rename = "isError", default)]
    pub is_error: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ToolContent {
    #[serde(rename = "text")]
    Text { text: String },
}

pub struct McpServer {
    tools: Vec<ToolDefinition>,
    registry: Arc<ToolRegistry>,
    initialized: bool,
}

impl McpServer {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            tools: builtin_tool_definitions(),
            registry,
            initialized: false,
        }
    }

    /// Handle a single JSON-RPC request and return response
    pub fn handle_request(&mut self, request: &JsonRpcRequest) -> JsonRpcResponse {
        if request.jsonrpc != "2.0" {
            return Self::error_response(
                request.id.clone(),
                INVALID_REQUEST,
                "Invalid JSON-RPC version",
                None,
            );
        }

        let params = request
            .params
            .clone()
            .unwrap_or(serde_json::Value::Object(serde_json::Map::new()));

        match request.method.as_str() {
            "initialize" => self.handle_initialize(request.id.clone(), &params),
            "initialized" => {
                self.initialized = true;
                Self::success_response(request.id.clone(), serde_json::Value::Null)
            }
            "tools/list" => {
                if !self.initialized {
                    return Self::error_response(
                        request.id.clone(),
                        INVALID_REQUEST,
                        "Server not initialized",
                        None,
                    );
                }
                self.handle_tools_list(request.id.clone())
            }
            "tools/call" => {
                if !self.initialized {
                    return Self::error_response(
                        request.id.clone(),
                        INVALID_REQUEST,
                        "Server not initialized",
                        None,
                    );
                }
                self.handle_tools_call(request.id.clone(), &params)
            }
            _ => Self::error_response(
                request.id.clone(),
                METHOD_NOT_FOUND,
                "Method not found",
                None,
            ),
        }
    }

    /// Handle `initialize` method
    fn handle_initialize(
        &mut self,
        id: Option<serde_json::Value>,
        params: &serde_json::Value,
    ) -> JsonRpcResponse {
        if !params.is_object() {
            return Self::error_response(
                id,
                INVALID_PARAMS,
                "initialize params must be an object",
                None,
            );
        }

        self.initialized = true;

        let server_info = ServerInfo {
            name: "mission-control".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        };
        let capabilities = ServerCapabilities {
            tools: Some(ToolsCapability {
                list_changed: false,
            }),
        };

        Self::success_response(
            id,
            json!({
                "serverInfo": server_info,
                "capabilities": capabilities
            }),
        )
    }

    /// Handle `tools/list` method
    fn handle_tools_list(&self, id: Option<serde_json::Value>) -> JsonRpcResponse {
        Self::success_response(
            id,
            json!({
                "tools": self.tools
            }),
        )
    }

    /// Handle `tools/call` method
    fn handle_tools_call(
        &self,
        id: Option<serde_json::Value>,
        params: &serde_json::Value,
    ) -> JsonRpcResponse {
        let Some(params_obj) = params.as_object() else {
            return Self::error_response(
                id,
                INVALID_PARAMS,
                "tools/call params must be an object",
                None,
            );
        };

        let Some(name) = params_obj.get("name").and_then(serde_json::Value::as_str) else {
            return Self::error_response(
                id,
                INVALID_PARAMS,
                "tools/call missing string field 'name'",
                None,
            );
        };

        if !self.tools.iter().any(|tool| tool.name == name) {
            return Self::error_response(
                id,
                METHOD_NOT_FOUND,
                "Tool not found",
                Some(json!({ "name": name })),
            );
        }

        let arguments = params_obj
            .get("arguments")
            .cloned()
            .unwrap_or(serde_json::Value::Object(serde_json::Map::new()));

        let payload = self.registry.dispatch(name, &arguments);
        let is_error = payload.get("success") == Some(&serde_json::Value::Bool(false));
        let tool_result = match serde_json::to_string(&payload) {
            Ok(text) => ToolCallResult {
                content: vec![ToolContent::Text { text }],
                is_error,
            },
            Err(err) => {
                return Self::error_response(
                    id,
                    INTERNAL_ERROR,
                    "Failed to serialize tool result",
                    Some(json!({ "reason": err.to_string() })),
                );
            }
        };

        match serde_json::to_value(tool_result) {
            Ok(result) => Self::success_response(id, result),
            Err(err) => Self::error_response(
                id,
                INTERNAL_ERROR,
                "Failed to serialize tool result",
                Some(json!({ "reason": err.to_string() })),
            ),
        }
    }

    /// Run the MCP server loop reading from stdin and writing to stdout
    pub fn run_stdio(&mut self) -> io::Result<()> {
        let stdin = io::stdin();
        let stdout = io::stdout();
        let mut out = stdout.lock();

        for line in stdin.lock().lines() {
            let line = line?;
            if let Some(response) = self.process_line(&line) {
                out.write_all(response.as_bytes())?;
                out.write_all(b"\n")?;
                out.flush()?;
            }
        }

        Ok(())
    }

    /// Process a single line of input and return the response string
    pub fn process_line(&mut self, line: &str) -> Option<String> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return None;
        }

        let parsed_value = match serde_json::from_str::<serde_json::Value>(trimmed) {
            Ok(value) => value,
            Err(err) => {
                let response = Self::error_response(
                    None,
                    PARSE_ERROR,
                    "Parse error",
                    Some(json!({ "reason": err.to_string() })),
                );
                return serde_json::to_string(&response).ok();
            }
        };

        let request = match serde_json::from_value::<JsonRpcRequest>(parsed_value) {
            Ok(request) => request,
            Err(err) => {
                let response = Self::error_response(
                    None,
                    INVALID_REQUEST,
                    "Invalid request",
                    Some(json!({ "reason": err.to_string() })),
                );
                return serde_json::to_string(&response).ok();
            }
        };

        let is_notification = request.id.is_none();
        let response = self.handle_request(&request);

        if is_notification {
            None
        } else {
            serde_json::to_string(&response).ok()
        }
    }

    fn success_response(
        id: Option<serde_json::Value>,
        result: serde_json::Value,
    ) -> JsonRpcResponse {
        JsonRpcResponse {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    fn error_response(
        id: Option<serde_json::Value>,
        code: i64,
        message: &str,
        data: Option<serde_json::Value>,
    ) -> JsonRpcResponse {
        JsonRpcResponse {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.to_string(),
                data,
            }),
        }
    }
}

fn builtin_tool_definitions() -> Vec<ToolDefinition> {
    let project_path = json!({
        "type": "string",
        "description": "Repository to operate on; defaults to the process root"
    });

    vec![
        ToolDefinition {
            name: "create_task".to_string(),
            description: "Create a new task with optional dependencies".to_string(),
            input_schema: json!({
                "type": "object",
                "required": ["title"],
                "properties": {
                    "title": { "type": "string", "description": "Short task title" },
                    "description": { "type": "string", "description": "Longer free-form text" },
                    "depends_on": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "Ids of tasks that must finish first"
                    },
                    "tags": { "type": "array", "items": { "type": "string" } },
                    "priority": {
                        "type": "integer",
                        "description": "1 (lowest) to 10 (most urgent), default 5"
                    },
                    "project_path": project_path.clone()
                }
            }),
        },
        ToolDefinition {
            name: "update_task_status".to_string(),
            description: "Update a task's status; done leaf tasks are archived".to_string(),
            input_schema: json!({
                "type": "object",
                "required": ["task_id", "status"],
                "properties": {
                    "task_id": { "type": "string", "description": "Task ID" },
                    "status": {
                        "type": "string",
                        "description": "One of todo, in_progress, blocked, done"
                    },
                    "project_path": project_path.clone()
                }
            }),
        },
        ToolDefinition {
            name: "list_ready_work".to_string(),
            description: "List tasks whose dependencies are all complete".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": { "project_path": project_path.clone() }
            }),
        },
        ToolDefinition {
            name: "list_tasks".to_string(),
            description: "List tasks with optional status and tag filters".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "status": { "type": "string", "description": "Filter by status" },
                    "tags": { "type": "array", "items": { "type": "string" } },
                    "project_path": project_path.clone()
                }
            }),
        },
        ToolDefinition {
            name: "check_consistency".to_string(),
            description: "Detect circular and dangling dependencies".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": { "project_path": project_path.clone() }
            }),
        },
        ToolDefinition {
            name: "task_summary".to_string(),
            description: "Aggregate status counts and ready work".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": { "project_path": project_path.clone() }
            }),
        },
        ToolDefinition {
            name: "get_task".to_string(),
            description: "Get task details, optionally with chain and impact".to_string(),
            input_schema: json!({
                "type": "object",
                "required": ["task_id"],
                "properties": {
                    "task_id": { "type": "string", "description": "Task ID" },
                    "include_chain": {
                        "type": "boolean",
                        "description": "Include the topological dependency chain"
                    },
                    "include_impact": {
                        "type": "boolean",
                        "description": "Include direct dependents"
                    },
                    "project_path": project_path.clone()
                }
            }),
        },
        ToolDefinition {
            name: "commit_tasks".to_string(),
            description: "Commit the task directory via the version-control tool".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "message": { "type": "string", "description": "Commit message" },
                    "project_path": project_path.clone()
                }
            }),
        },
        ToolDefinition {
            name: "delete_task".to_string(),
            description: "Delete a task; refuses when dependents exist".to_string(),
            input_schema: json!({
                "type": "object",
                "required": ["task_id"],
                "properties": {
                    "task_id": { "type": "string", "description": "Task ID" },
                    "project_path": project_path
                }
            }),
        },
    ]
}
