//! MCP Server Core
//!
//! Handles the main MCP server logic, routing requests to appropriate
//! tool and resource handlers.

use std::collections::HashMap;
use std::sync::Arc;

use noema_core::Core;
use tracing::{debug, info, warn};

use crate::protocol::messages::{
    CallToolRequest, CallToolResult, InitializeRequest, InitializeResult,
    ListResourcesResult, ListToolsResult, ReadResourceRequest, ReadResourceResult,
    ResourceDescription, ServerCapabilities, ServerInfo, ToolDescription, ToolResultContent,
};
use crate::protocol::types::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, MCP_VERSION};
use crate::resources;
use crate::tools;

/// MCP server implementation, routing JSON-RPC requests to the graph tools
/// and resources backed by a single [`Core`].
pub struct McpServer {
    core: Arc<Core>,
    initialized: bool,
}

impl McpServer {
    pub fn new(core: Arc<Core>) -> Self {
        Self {
            core,
            initialized: false,
        }
    }

    /// Handle an incoming JSON-RPC request. Returns `None` for notifications,
    /// which have no response.
    pub async fn handle_request(&mut self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        debug!("Handling request: {}", request.method);

        if !self.initialized && request.method != "initialize" && request.method != "notifications/initialized" {
            warn!("Rejecting request '{}': server not initialized", request.method);
            return Some(JsonRpcResponse::error(
                request.id,
                JsonRpcError::server_not_initialized(),
            ));
        }

        let result = match request.method.as_str() {
            "initialize" => self.handle_initialize(request.params).await,
            "notifications/initialized" => {
                return None;
            }
            "tools/list" => self.handle_tools_list().await,
            "tools/call" => self.handle_tools_call(request.params).await,
            "resources/list" => self.handle_resources_list().await,
            "resources/read" => self.handle_resources_read(request.params).await,
            "ping" => Ok(serde_json::json!({})),
            method => {
                warn!("Unknown method: {}", method);
                Err(JsonRpcError::method_not_found())
            }
        };

        Some(match result {
            Ok(result) => JsonRpcResponse::success(request.id, result),
            Err(error) => JsonRpcResponse::error(request.id, error),
        })
    }

    /// Handle initialize request
    async fn handle_initialize(
        &mut self,
        params: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, JsonRpcError> {
        let request: InitializeRequest = match params {
            Some(p) => serde_json::from_value(p).map_err(|e| JsonRpcError::invalid_params(&e.to_string()))?,
            None => InitializeRequest::default(),
        };

        // Version negotiation: use client's version if older than server's.
        // Claude Desktop rejects servers with newer protocol versions.
        let negotiated_version = if request.protocol_version.as_str() < MCP_VERSION {
            info!("Client requested older protocol version {}, using it", request.protocol_version);
            request.protocol_version.clone()
        } else {
            MCP_VERSION.to_string()
        };

        self.initialized = true;
        info!("MCP session initialized with protocol version {}", negotiated_version);

        let result = InitializeResult {
            protocol_version: negotiated_version,
            server_info: ServerInfo {
                name: "noema".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            capabilities: ServerCapabilities {
                tools: Some({
                    let mut map = HashMap::new();
                    map.insert("listChanged".to_string(), serde_json::json!(false));
                    map
                }),
                resources: Some({
                    let mut map = HashMap::new();
                    map.insert("listChanged".to_string(), serde_json::json!(false));
                    map
                }),
                prompts: None,
            },
            instructions: Some(
                "Noema is a typed knowledge graph: entities with ordered observations, \
                 relations between them, and full-text search over their content. Use \
                 create_entities/create_relations to record structured facts, \
                 add_observations to append to an existing entity rather than duplicating \
                 it, and search_nodes to find entities by keyword before assuming one does \
                 not exist. get_neighbors and find_shortest_path walk the relation graph \
                 around an entity. Prefer updating an existing entity's observations over \
                 creating a near-duplicate with a slightly different name.".to_string()
            ),
        };

        serde_json::to_value(result).map_err(|e| JsonRpcError::internal_error(&e.to_string()))
    }

    /// Handle tools/list request
    async fn handle_tools_list(&self) -> Result<serde_json::Value, JsonRpcError> {
        let tools = vec![
            ToolDescription {
                name: "create_entities".to_string(),
                description: Some("Create one or more entities, each with an initial set of observations.".to_string()),
                input_schema: tools::entities::create_entities_schema(),
            },
            ToolDescription {
                name: "delete_entities".to_string(),
                description: Some("Delete entities by name, cascading to their relations and observations.".to_string()),
                input_schema: tools::entities::delete_entities_schema(),
            },
            ToolDescription {
                name: "create_relations".to_string(),
                description: Some("Create directed, typed relations between existing entities.".to_string()),
                input_schema: tools::relations::create_relations_schema(),
            },
            ToolDescription {
                name: "delete_relations".to_string(),
                description: Some("Delete relations matching the given from/to/relationType triples.".to_string()),
                input_schema: tools::relations::delete_relations_schema(),
            },
            ToolDescription {
                name: "add_observations".to_string(),
                description: Some("Append observations to existing entities, skipping structural duplicates.".to_string()),
                input_schema: tools::observations::schema(),
            },
            ToolDescription {
                name: "delete_observations".to_string(),
                description: Some("Remove observations from existing entities by structural match.".to_string()),
                input_schema: tools::observations::schema(),
            },
            ToolDescription {
                name: "search_nodes".to_string(),
                description: Some("Full-text search over entity observations, ranked by relevance and context.".to_string()),
                input_schema: tools::search::schema(),
            },
            ToolDescription {
                name: "read_graph".to_string(),
                description: Some("Page through every entity and relation in the graph.".to_string()),
                input_schema: tools::graph::read_graph_schema(),
            },
            ToolDescription {
                name: "open_nodes".to_string(),
                description: Some("Fetch specific entities (and the relations between them) by name.".to_string()),
                input_schema: tools::graph::open_nodes_schema(),
            },
            ToolDescription {
                name: "get_neighbors".to_string(),
                description: Some("Breadth-first expansion of an entity's neighbors up to a given depth.".to_string()),
                input_schema: tools::graph::get_neighbors_schema(),
            },
            ToolDescription {
                name: "find_shortest_path".to_string(),
                description: Some("Breadth-first shortest path between two entities, treating relations as undirected.".to_string()),
                input_schema: tools::graph::find_shortest_path_schema(),
            },
            ToolDescription {
                name: "get_stats".to_string(),
                description: Some("Entity/relation counts plus cache and bloom filter statistics.".to_string()),
                input_schema: tools::stats::schema(),
            },
            ToolDescription {
                name: "begin_transaction".to_string(),
                description: Some("Begin a manual transaction. Must be followed by commit_transaction or rollback_transaction.".to_string()),
                input_schema: tools::transaction::schema(),
            },
            ToolDescription {
                name: "commit_transaction".to_string(),
                description: Some("Commit the active manual transaction, clearing caches.".to_string()),
                input_schema: tools::transaction::schema(),
            },
            ToolDescription {
                name: "rollback_transaction".to_string(),
                description: Some("Roll back the active manual transaction, clearing caches.".to_string()),
                input_schema: tools::transaction::schema(),
            },
            ToolDescription {
                name: "backup".to_string(),
                description: Some("Checkpoint the write-ahead log and copy the database and bloom sidecar to a target path.".to_string()),
                input_schema: tools::backup::schema(),
            },
            ToolDescription {
                name: "maintenance".to_string(),
                description: Some("Operator maintenance actions: rebuild_bloom, rebuild_term_index, check_consistency, run_aging_pass.".to_string()),
                input_schema: tools::maintenance::schema(),
            },
        ];

        let result = ListToolsResult { tools };
        serde_json::to_value(result).map_err(|e| JsonRpcError::internal_error(&e.to_string()))
    }

    /// Handle tools/call request
    async fn handle_tools_call(
        &self,
        params: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, JsonRpcError> {
        let request: CallToolRequest = match params {
            Some(p) => serde_json::from_value(p).map_err(|e| JsonRpcError::invalid_params(&e.to_string()))?,
            None => return Err(JsonRpcError::invalid_params("Missing tool call parameters")),
        };

        let result: Result<serde_json::Value, String> = match request.name.as_str() {
            "create_entities" => tools::entities::create_entities(&self.core, request.arguments).await,
            "delete_entities" => tools::entities::delete_entities(&self.core, request.arguments).await,
            "create_relations" => tools::relations::create_relations(&self.core, request.arguments).await,
            "delete_relations" => tools::relations::delete_relations(&self.core, request.arguments).await,
            "add_observations" => tools::observations::add_observations(&self.core, request.arguments).await,
            "delete_observations" => tools::observations::delete_observations(&self.core, request.arguments).await,
            "search_nodes" => tools::search::execute(&self.core, request.arguments).await,
            "read_graph" => tools::graph::read_graph(&self.core, request.arguments).await,
            "open_nodes" => tools::graph::open_nodes(&self.core, request.arguments).await,
            "get_neighbors" => tools::graph::get_neighbors(&self.core, request.arguments).await,
            "find_shortest_path" => tools::graph::find_shortest_path(&self.core, request.arguments).await,
            "get_stats" => tools::stats::execute(&self.core, request.arguments).await,
            "begin_transaction" => tools::transaction::begin(&self.core, request.arguments).await,
            "commit_transaction" => tools::transaction::commit(&self.core, request.arguments).await,
            "rollback_transaction" => tools::transaction::rollback(&self.core, request.arguments).await,
            "backup" => tools::backup::execute(&self.core, request.arguments).await,
            "maintenance" => tools::maintenance::execute(&self.core, request.arguments).await,
            name => {
                return Err(JsonRpcError::method_not_found_with_message(&format!(
                    "Unknown tool: {}",
                    name
                )));
            }
        };

        let call_result = match result {
            Ok(content) => CallToolResult {
                content: vec![ToolResultContent {
                    content_type: "text".to_string(),
                    text: serde_json::to_string_pretty(&content).unwrap_or_else(|_| content.to_string()),
                }],
                is_error: Some(false),
            },
            Err(e) => CallToolResult {
                content: vec![ToolResultContent {
                    content_type: "text".to_string(),
                    text: serde_json::json!({ "error": e }).to_string(),
                }],
                is_error: Some(true),
            },
        };

        serde_json::to_value(call_result).map_err(|e| JsonRpcError::internal_error(&e.to_string()))
    }

    /// Handle resources/list request
    async fn handle_resources_list(&self) -> Result<serde_json::Value, JsonRpcError> {
        let resources = vec![ResourceDescription {
            uri: "graph://stats".to_string(),
            name: "Graph Statistics".to_string(),
            description: Some("Entity/relation counts plus cache and bloom filter statistics.".to_string()),
            mime_type: Some("application/json".to_string()),
        }];

        let result = ListResourcesResult { resources };
        serde_json::to_value(result).map_err(|e| JsonRpcError::internal_error(&e.to_string()))
    }

    /// Handle resources/read request
    async fn handle_resources_read(
        &self,
        params: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, JsonRpcError> {
        let request: ReadResourceRequest = match params {
            Some(p) => serde_json::from_value(p).map_err(|e| JsonRpcError::invalid_params(&e.to_string()))?,
            None => return Err(JsonRpcError::invalid_params("Missing resource URI")),
        };

        let uri = &request.uri;
        match resources::read(&self.core, uri).await {
            Ok(text) => {
                let result = ReadResourceResult {
                    contents: vec![crate::protocol::messages::ResourceContent {
                        uri: uri.clone(),
                        mime_type: Some("application/json".to_string()),
                        text: Some(text),
                        blob: None,
                    }],
                };
                serde_json::to_value(result).map_err(|e| JsonRpcError::internal_error(&e.to_string()))
            }
            Err(e) => Err(JsonRpcError::resource_not_found(&e)),
        }
    }
}
