use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use tracing::debug;

use crate::{AppState, WorkspaceError};

// JSON-RPC request/response types
#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: Option<Value>,
    pub method: String,
    pub params: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcResponse {
    fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    fn error(id: Value, code: i64, message: String) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message,
                data: None,
            }),
        }
    }
}

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const WORKSPACE_INACTIVE: i64 = -32001;
pub const COMMAND_FAILED: i64 = -32004;

const SERVER_NAME: &str = "tagspace";
const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

struct MethodInfo {
    name: &'static str,
    description: &'static str,
    requires_session: bool,
}

const fn method(name: &'static str, description: &'static str) -> MethodInfo {
    MethodInfo {
        name,
        description,
        requires_session: true,
    }
}

const fn open_method(name: &'static str, description: &'static str) -> MethodInfo {
    MethodInfo {
        name,
        description,
        requires_session: false,
    }
}

const METHODS: &[MethodInfo] = &[
    open_method("initialize", "Server name, version and protocol info."),
    open_method("ping", "Liveness check."),
    open_method("methods/list", "Every method with its description."),
    open_method("auth/login", "Sign in the local user."),
    open_method("auth/logout", "Sign out."),
    open_method("auth/session", "Current session snapshot."),
    open_method("settings/get", "Effective settings."),
    open_method("nav/get", "Current view and page."),
    open_method("editor/slash", "Slash-command menu entries matching `query`."),
    method("nav/home", "Switch to the home view."),
    method("nav/tags", "Switch to the super tag manager."),
    method("nav/openPage", "Open page `id`."),
    method("nav/summary", "Tag and page counts plus the first pages."),
    method("tags/list", "All super tags in creation order."),
    method("tags/get", "Super tag `id`."),
    method("tags/create", "Create a super tag from the params object."),
    method("tags/update", "Merge `patch` into tag `id`."),
    method("tags/delete", "Delete tag `id` and detach it from every page."),
    method("pages/list", "All pages."),
    method("pages/get", "Page `id`."),
    method("pages/roots", "Pages with no live parent."),
    method("pages/children", "Direct children of `parentId`."),
    method("pages/filter", "Pages whose title contains `query`."),
    method("pages/recent", "Most recently updated pages, up to `limit`."),
    method("pages/create", "Create a page under optional `parentId` and open it."),
    method("pages/createFromTemplate", "Create a page from tag `tagId`'s template."),
    method("pages/update", "Merge `patch` into page `id`."),
    method("pages/delete", "Delete page `id`."),
    method("pages/move", "Move page `id` under `parentId` (or to the root)."),
    method("pages/attachTag", "Attach `tagId` to `pageId` and fill defaults."),
    method("pages/detachTag", "Detach `tagId` from `pageId`; values stay."),
    method("pages/setProperty", "Convert and store `value` under property `name`."),
    method("pages/propertyView", "Effective property editors, missing and orphaned keys."),
    method("pages/purgeOrphans", "Drop values no attached tag defines."),
    method("blocks/insert", "Insert a `type` block after `after` (or at the end)."),
    method("blocks/update", "Apply `patch` to block `blockId`."),
    method("blocks/remove", "Remove block `blockId`."),
    method("editor/markup", "Editor markup for page `pageId`."),
    method("editor/ingest", "Replace page `pageId`'s blocks with parsed `markup`."),
    method("search/query", "Full-text search over pages."),
    method("search/rebuild", "Rebuild the search index."),
];

fn method_list() -> Value {
    Value::Array(
        METHODS
            .iter()
            .map(|m| {
                json!({
                    "name": m.name,
                    "description": m.description,
                    "requiresSession": m.requires_session,
                })
            })
            .collect(),
    )
}

enum Failure {
    BadParams(String),
    Command(String),
}

type Outcome = Result<Value, Failure>;

fn reply<T: Serialize>(result: Result<T, String>) -> Outcome {
    let value = result.map_err(Failure::Command)?;
    serde_json::to_value(value).map_err(|e| Failure::Command(e.to_string()))
}

fn required<T: DeserializeOwned>(params: &Value, key: &str) -> Result<T, Failure> {
    let value = params
        .get(key)
        .cloned()
        .ok_or_else(|| Failure::BadParams(format!("Missing required parameter: {}", key)))?;
    serde_json::from_value(value)
        .map_err(|e| Failure::BadParams(format!("Invalid parameter '{}': {}", key, e)))
}

fn optional<T: DeserializeOwned>(params: &Value, key: &str) -> Result<Option<T>, Failure> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => serde_json::from_value(value.clone())
            .map(Some)
            .map_err(|e| Failure::BadParams(format!("Invalid parameter '{}': {}", key, e))),
    }
}

fn whole<T: DeserializeOwned>(params: &Value) -> Result<T, Failure> {
    serde_json::from_value(params.clone()).map_err(|e| Failure::BadParams(e.to_string()))
}

/// Parse one line of input and answer it.
pub fn handle_line(state: &AppState, line: &str) -> JsonRpcResponse {
    match serde_json::from_str::<JsonRpcRequest>(line) {
        Ok(request) => handle(state, request),
        Err(e) => JsonRpcResponse::error(Value::Null, PARSE_ERROR, format!("Parse error: {}", e)),
    }
}

// Main JSON-RPC handler
pub fn handle(state: &AppState, request: JsonRpcRequest) -> JsonRpcResponse {
    let id = request.id.unwrap_or(Value::Null);

    if request.jsonrpc != "2.0" {
        return JsonRpcResponse::error(id, INVALID_REQUEST, "Invalid JSON-RPC version".to_string());
    }

    let Some(info) = METHODS.iter().find(|m| m.name == request.method) else {
        return JsonRpcResponse::error(
            id,
            METHOD_NOT_FOUND,
            format!("Method not found: {}", request.method),
        );
    };

    if info.requires_session && !state.is_active() {
        return JsonRpcResponse::error(id, WORKSPACE_INACTIVE, WorkspaceError::Inactive.to_string());
    }

    debug!("rpc {}", info.name);
    let params = request.params.unwrap_or_else(|| json!({}));
    match dispatch(state, info.name, &params) {
        Ok(result) => JsonRpcResponse::success(id, result),
        Err(Failure::BadParams(message)) => JsonRpcResponse::error(id, INVALID_PARAMS, message),
        Err(Failure::Command(message)) => JsonRpcResponse::error(id, COMMAND_FAILED, message),
    }
}

fn dispatch(state: &AppState, method: &str, params: &Value) -> Outcome {
    match method {
        "initialize" => Ok(json!({
            "serverInfo": {
                "name": SERVER_NAME,
                "version": SERVER_VERSION,
            },
            "methods": METHODS.len(),
        })),
        "ping" => Ok(json!({})),
        "methods/list" => Ok(json!({ "methods": method_list() })),

        // Session & settings
        "auth/login" => reply(crate::login(state)),
        "auth/logout" => reply(crate::logout(state)),
        "auth/session" => reply(Ok(crate::get_session(state))),
        "settings/get" => reply(Ok(crate::get_settings(state))),

        // Navigation
        "nav/get" => reply(Ok(crate::get_navigation(state))),
        "nav/home" => reply(crate::show_home(state)),
        "nav/tags" => reply(crate::show_tags(state)),
        "nav/openPage" => reply(crate::open_page(state, required(params, "id")?)),
        "nav/summary" => reply(crate::home_summary(state)),

        // Super tags
        "tags/list" => reply(crate::list_tags(state)),
        "tags/get" => reply(crate::get_tag(state, required(params, "id")?)),
        "tags/create" => reply(crate::create_tag(state, whole(params)?)),
        "tags/update" => reply(crate::update_tag(
            state,
            required(params, "id")?,
            required(params, "patch")?,
        )),
        "tags/delete" => reply(crate::delete_tag(state, required(params, "id")?)),

        // Pages
        "pages/list" => reply(crate::list_pages(state)),
        "pages/get" => reply(crate::get_page(state, required(params, "id")?)),
        "pages/roots" => reply(crate::list_root_pages(state)),
        "pages/children" => reply(crate::list_child_pages(state, required(params, "parentId")?)),
        "pages/filter" => reply(crate::filter_pages(state, required(params, "query")?)),
        "pages/recent" => reply(crate::recent_pages(
            state,
            optional(params, "limit")?.unwrap_or(10),
        )),
        "pages/create" => reply(crate::create_page(state, optional(params, "parentId")?)),
        "pages/createFromTemplate" => reply(crate::create_page_from_template(
            state,
            required(params, "tagId")?,
            optional(params, "parentId")?,
            optional::<HashMap<String, String>>(params, "variables")?.unwrap_or_default(),
        )),
        "pages/update" => reply(crate::update_page(
            state,
            required(params, "id")?,
            required(params, "patch")?,
        )),
        "pages/delete" => reply(crate::delete_page(state, required(params, "id")?)),
        "pages/move" => reply(crate::move_page(
            state,
            required(params, "id")?,
            optional(params, "parentId")?,
        )),

        // Tag binding
        "pages/attachTag" => reply(crate::attach_tag(
            state,
            required(params, "pageId")?,
            required(params, "tagId")?,
        )),
        "pages/detachTag" => reply(crate::detach_tag(
            state,
            required(params, "pageId")?,
            required(params, "tagId")?,
        )),
        "pages/setProperty" => reply(crate::set_property(
            state,
            required(params, "pageId")?,
            required(params, "name")?,
            required(params, "value")?,
        )),
        "pages/propertyView" => reply(crate::property_view(state, required(params, "pageId")?)),
        "pages/purgeOrphans" => reply(crate::purge_orphaned_properties(
            state,
            required(params, "pageId")?,
        )),

        // Blocks & editor
        "blocks/insert" => reply(crate::insert_block(
            state,
            required(params, "pageId")?,
            optional(params, "after")?,
            required(params, "type")?,
            optional(params, "content")?.unwrap_or_default(),
        )),
        "blocks/update" => reply(crate::update_block(
            state,
            required(params, "pageId")?,
            required(params, "blockId")?,
            required(params, "patch")?,
        )),
        "blocks/remove" => reply(crate::remove_block(
            state,
            required(params, "pageId")?,
            required(params, "blockId")?,
        )),
        "editor/markup" => reply(crate::page_markup(state, required(params, "pageId")?)),
        "editor/ingest" => reply(crate::ingest_markup(
            state,
            required(params, "pageId")?,
            required(params, "markup")?,
        )),
        "editor/slash" => reply(Ok(crate::slash_commands(
            optional(params, "query")?.unwrap_or_default(),
        ))),

        // Search
        "search/query" => reply(crate::search_pages(state, required(params, "query")?)),
        "search/rebuild" => reply(crate::rebuild_search_index(state)),

        _ => Err(Failure::Command(format!("Unhandled method: {}", method))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AuthProvider, LocalAuth, Settings, User};
    use std::sync::Arc;

    fn state(seed: bool) -> Arc<AppState> {
        let auth: Arc<dyn AuthProvider> = Arc::new(LocalAuth::new(User {
            id: "user-1".to_string(),
            display_name: "Alice".to_string(),
            email: None,
        }));
        let settings = Settings {
            seed_sample_data: seed,
            ..Settings::default()
        };
        AppState::new(settings, auth)
    }

    fn call(state: &AppState, method: &str, params: Value) -> JsonRpcResponse {
        handle(
            state,
            JsonRpcRequest {
                jsonrpc: "2.0".to_string(),
                id: Some(json!(1)),
                method: method.to_string(),
                params: Some(params),
            },
        )
    }

    fn error_code(response: &JsonRpcResponse) -> Option<i64> {
        response.error.as_ref().map(|e| e.code)
    }

    #[test]
    fn test_every_method_is_dispatched() {
        let state = state(false);
        call(&state, "auth/login", json!({}));
        for info in METHODS.iter().filter(|m| m.name != "auth/logout") {
            let response = call(&state, info.name, json!({}));
            let message = response.error.as_ref().map(|e| e.message.clone()).unwrap_or_default();
            assert!(
                !message.starts_with("Unhandled method"),
                "{} has no dispatch arm",
                info.name
            );
        }
    }

    #[test]
    fn test_protocol_errors() {
        let state = state(false);

        let response = handle_line(&state, "{ nope");
        assert_eq!(error_code(&response), Some(PARSE_ERROR));

        let response = handle_line(&state, r#"{"jsonrpc":"1.0","id":7,"method":"ping"}"#);
        assert_eq!(error_code(&response), Some(INVALID_REQUEST));
        assert_eq!(response.id, json!(7));

        let response = call(&state, "pages/explode", json!({}));
        assert_eq!(error_code(&response), Some(METHOD_NOT_FOUND));

        assert!(call(&state, "ping", json!({})).error.is_none());
    }

    #[test]
    fn test_workspace_methods_need_a_session() {
        let state = state(false);
        let response = call(&state, "pages/list", json!({}));
        assert_eq!(error_code(&response), Some(WORKSPACE_INACTIVE));
        assert_eq!(
            response.error.unwrap().message,
            "Please sign in to access your workspace"
        );

        let response = call(&state, "editor/slash", json!({ "query": "head" }));
        assert_eq!(response.result.unwrap().as_array().unwrap().len(), 3);

        let response = call(&state, "auth/login", json!({}));
        assert_eq!(response.result.unwrap()["user"]["displayName"], json!("Alice"));
        assert!(call(&state, "pages/list", json!({})).error.is_none());
    }

    #[test]
    fn test_bad_params_and_command_failures() {
        let state = state(false);
        call(&state, "auth/login", json!({}));

        let response = call(&state, "pages/get", json!({}));
        assert_eq!(error_code(&response), Some(INVALID_PARAMS));

        let response = call(&state, "pages/get", json!({ "id": "page-missing" }));
        assert_eq!(error_code(&response), Some(COMMAND_FAILED));
        assert!(response.error.unwrap().message.contains("page-missing"));
    }

    #[test]
    fn test_tag_and_property_flow() {
        let state = state(false);
        call(&state, "auth/login", json!({}));

        let tag = call(
            &state,
            "tags/create",
            json!({
                "name": "Project",
                "properties": [
                    { "id": "p1", "name": "Status", "type": "select",
                      "options": ["Planning", "Done"], "defaultValue": "Planning" },
                    { "id": "p2", "name": "Estimate", "type": "number" }
                ]
            }),
        )
        .result
        .unwrap();
        let tag_id = tag["id"].as_str().unwrap().to_string();
        assert_eq!(tag["color"], json!("#3B82F6"));

        let page = call(&state, "pages/create", json!({})).result.unwrap();
        let page_id = page["id"].as_str().unwrap().to_string();

        let page = call(
            &state,
            "pages/attachTag",
            json!({ "pageId": page_id, "tagId": tag_id }),
        )
        .result
        .unwrap();
        assert_eq!(page["properties"]["Status"], json!("Planning"));

        let value = call(
            &state,
            "pages/setProperty",
            json!({ "pageId": page_id, "name": "Estimate", "value": "8" }),
        )
        .result
        .unwrap();
        assert_eq!(value, json!(8));

        let response = call(
            &state,
            "pages/setProperty",
            json!({ "pageId": page_id, "name": "Status", "value": "Shipped" }),
        );
        assert_eq!(error_code(&response), Some(COMMAND_FAILED));

        let nav = call(&state, "nav/get", json!({})).result.unwrap();
        assert_eq!(nav["view"], json!("page"));
        assert_eq!(nav["currentPageId"], json!(page_id));
    }

    #[test]
    fn test_editor_round_trip_through_rpc() {
        let state = state(false);
        call(&state, "auth/login", json!({}));
        let page = call(&state, "pages/create", json!({})).result.unwrap();
        let page_id = page["id"].as_str().unwrap().to_string();

        call(
            &state,
            "editor/ingest",
            json!({
                "pageId": page_id,
                "markup": "<h1>Plan</h1><div data-type=\"taskItem\" data-checked=\"checked\">Ship</div>"
            }),
        );
        let markup = call(&state, "editor/markup", json!({ "pageId": page_id }))
            .result
            .unwrap();
        assert_eq!(
            markup,
            json!("<h1>Plan</h1><div data-type=\"taskItem\" data-checked=\"checked\">Ship</div>")
        );
    }
}
