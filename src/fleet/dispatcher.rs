use std::time::Duration;

use futures::future::BoxFuture;
use reqwest::{StatusCode, Url};
use serde_json::{json, Map, Value};

use crate::error::AssistantError;

/// Bound on every outbound fleet request.
pub const DEFAULT_FLEET_TIMEOUT_SECS: u64 = 10;

type Handler = for<'a> fn(&'a ToolDispatcher, &'a Map<String, Value>) -> BoxFuture<'a, Value>;

/// Tool name to handler table. Unknown names never reach the network.
static REGISTRY: &[(&str, Handler)] = &[
    ("find_panels", find_panels),
    ("get_panel_maintenance_history", get_panel_maintenance_history),
    ("send_drone", send_drone),
    ("find_drones", find_drones),
];

/// Dispatches extracted tool calls against the fleet-management backend.
///
/// Every outcome is a JSON value; failures are `{"error": ...}` objects so
/// the orchestrator can always feed something back to the model.
pub struct ToolDispatcher {
    client: reqwest::Client,
    base_url: Url,
    timeout: Duration,
}

impl ToolDispatcher {
    /// Creates a dispatcher for the fleet backend at `base_url`.
    pub fn new(base_url: &str, timeout_seconds: u64) -> Result<Self, AssistantError> {
        // Url::join replaces the last path segment unless the base ends
        // with a slash.
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{base_url}/")
        };
        let base_url = Url::parse(&normalized)
            .map_err(|e| AssistantError::InvalidRequest(format!("invalid fleet URL: {e}")))?;
        Ok(Self {
            client: reqwest::Client::new(),
            base_url,
            timeout: Duration::from_secs(timeout_seconds),
        })
    }

    /// Names of all registered tools.
    pub fn tool_names(&self) -> Vec<&'static str> {
        REGISTRY.iter().map(|(name, _)| *name).collect()
    }

    /// Runs the named tool. Unknown tools and handler failures come back as
    /// `{"error": ...}` values, never as faults.
    pub async fn dispatch(&self, tool_name: &str, parameters: &Map<String, Value>) -> Value {
        let Some((_, handler)) = REGISTRY.iter().find(|(name, _)| *name == tool_name) else {
            log::warn!("unknown tool requested: {tool_name}");
            return json!({"error": format!("Tool '{tool_name}' not found")});
        };
        log::debug!("dispatching tool {tool_name}");
        handler(self, parameters).await
    }

    async fn get_json(&self, path: &str, query: &[(&'static str, String)]) -> Value {
        let url = match self.base_url.join(path) {
            Ok(url) => url,
            Err(err) => return json!({"error": format!("invalid fleet endpoint '{path}': {err}")}),
        };
        let request = self.client.get(url).query(query).timeout(self.timeout);
        self.execute(request).await
    }

    async fn post_json(&self, path: &str, body: Value) -> Value {
        let url = match self.base_url.join(path) {
            Ok(url) => url,
            Err(err) => return json!({"error": format!("invalid fleet endpoint '{path}': {err}")}),
        };
        let request = self.client.post(url).json(&body).timeout(self.timeout);
        self.execute(request).await
    }

    async fn execute(&self, request: reqwest::RequestBuilder) -> Value {
        match request.send().await {
            Err(err) => {
                log::warn!("fleet backend unreachable: {err}");
                json!({"error": format!("Failed to reach fleet backend: {err}")})
            }
            Ok(response) => {
                let status = response.status();
                if status == StatusCode::NO_CONTENT {
                    return json!({"status": "ok"});
                }
                let body = response.text().await.unwrap_or_default();
                if !status.is_success() {
                    log::warn!("fleet backend returned status {status}");
                    return json!({
                        "error": format!("Fleet backend returned status {status}"),
                        "details": body,
                    });
                }
                serde_json::from_str::<Value>(&body).unwrap_or_else(|err| {
                    json!({
                        "error": format!("Invalid JSON from fleet backend: {err}"),
                        "details": body,
                    })
                })
            }
        }
    }
}

/// Collects present parameters, renamed to the fleet backend's query
/// convention. Absent parameters contribute no key at all.
fn renamed_query(
    params: &Map<String, Value>,
    renames: &[(&str, &'static str)],
) -> Vec<(&'static str, String)> {
    renames
        .iter()
        .filter_map(|(from, to)| params.get(*from).map(|v| (*to, query_value(v))))
        .collect()
}

fn query_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn find_panels<'a>(fleet: &'a ToolDispatcher, params: &'a Map<String, Value>) -> BoxFuture<'a, Value> {
    Box::pin(async move {
        let query = renamed_query(
            params,
            &[
                ("cluster_id", "clusterid"),
                ("panel_id", "panelid"),
                ("status", "status"),
            ],
        );
        fleet.get_json("panels", &query).await
    })
}

fn get_panel_maintenance_history<'a>(
    fleet: &'a ToolDispatcher,
    params: &'a Map<String, Value>,
) -> BoxFuture<'a, Value> {
    Box::pin(async move {
        if !params.contains_key("cluster_id") || !params.contains_key("panel_id") {
            return json!({"error": "cluster_id and panel_id are required parameters."});
        }
        let query = renamed_query(
            params,
            &[("cluster_id", "clusterid"), ("panel_id", "panelid")],
        );
        fleet.get_json("maintenance_requests", &query).await
    })
}

fn send_drone<'a>(fleet: &'a ToolDispatcher, params: &'a Map<String, Value>) -> BoxFuture<'a, Value> {
    Box::pin(async move {
        let Some(cluster_id) = params.get("cluster_id") else {
            return json!({"error": "cluster_id is required"});
        };
        let path = format!("drones/send/{}", query_value(cluster_id));
        let mut body = params.clone();
        body.remove("cluster_id");
        fleet.post_json(&path, Value::Object(body)).await
    })
}

fn find_drones<'a>(fleet: &'a ToolDispatcher, params: &'a Map<String, Value>) -> BoxFuture<'a, Value> {
    Box::pin(async move {
        let query = renamed_query(
            params,
            &[
                ("drone_id", "droneid"),
                ("destination_cluster_id", "destinationclusterid"),
            ],
        );
        fleet.get_json("drones", &query).await
    })
}
