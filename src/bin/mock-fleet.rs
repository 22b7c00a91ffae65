//! Stand-in fleet backend returning canned panel and drone data, for
//! exercising the coordinate server without real hardware.

use std::collections::HashMap;

use axum::{
    extract::{Path, Query},
    routing::{get, post},
    Json, Router,
};
use clap::Parser;
use env_logger::Env;
use rand::Rng;
use serde_json::{json, Value};

#[derive(Parser, Debug)]
#[command(name = "mock-fleet", about = "Mock fleet-management backend")]
struct Args {
    #[arg(long, default_value = "127.0.0.1")]
    host: String,
    #[arg(long, default_value_t = 8080)]
    port: u16,
}

fn panels() -> Vec<Value> {
    vec![
        json!({
            "clusterid": 3, "panelid": 1, "status": "clean",
            "latest_status_time": "2025-05-15T09:00:00Z",
            "most_recent_repair": "2025-04-30T13:45:00Z",
        }),
        json!({
            "clusterid": 3, "panelid": 2, "status": "dirty",
            "latest_status_time": "2025-05-14T15:30:00Z",
            "most_recent_repair": "2025-04-10T10:00:00Z",
        }),
        json!({
            "clusterid": 3, "panelid": 3, "status": "unknown",
            "latest_status_time": "2025-05-13T17:20:00Z",
            "most_recent_repair": "2025-03-25T08:00:00Z",
        }),
        json!({
            "clusterid": 3, "panelid": 4, "status": "dirty",
            "latest_status_time": "2025-05-15T07:00:00Z",
            "most_recent_repair": "2025-01-10T12:00:00Z",
        }),
    ]
}

fn drones() -> Vec<Value> {
    vec![
        json!({"droneid": 1, "battery": 100.0, "status": "available", "destinationclusterid": 3}),
        json!({"droneid": 2, "battery": 87.5, "status": "available", "destinationclusterid": 1}),
        json!({"droneid": 3, "battery": 65.0, "status": "charging", "destinationclusterid": 3}),
    ]
}

fn matches_filter(record: &Value, key: &str, filter: Option<&String>) -> bool {
    match filter {
        None => true,
        Some(wanted) => match &record[key] {
            Value::String(s) => s == wanted,
            other => &other.to_string() == wanted,
        },
    }
}

async fn list_panels(Query(params): Query<HashMap<String, String>>) -> Json<Vec<Value>> {
    let filtered = panels()
        .into_iter()
        .filter(|p| matches_filter(p, "clusterid", params.get("clusterid")))
        .filter(|p| matches_filter(p, "panelid", params.get("panelid")))
        .filter(|p| matches_filter(p, "status", params.get("status")))
        .collect();
    Json(filtered)
}

async fn list_maintenance(Query(params): Query<HashMap<String, String>>) -> Json<Vec<Value>> {
    let history = vec![
        json!({"clusterid": 3, "panelid": 2, "type": "inspection", "date": "2025-05-14", "result": "dust buildup"}),
        json!({"clusterid": 3, "panelid": 1, "type": "repair", "date": "2025-04-30", "action": "replaced connector"}),
    ];
    let filtered = history
        .into_iter()
        .filter(|r| matches_filter(r, "clusterid", params.get("clusterid")))
        .filter(|r| matches_filter(r, "panelid", params.get("panelid")))
        .collect();
    Json(filtered)
}

async fn list_drones(Query(params): Query<HashMap<String, String>>) -> Json<Vec<Value>> {
    let filtered = drones()
        .into_iter()
        .filter(|d| matches_filter(d, "droneid", params.get("droneid")))
        .filter(|d| {
            matches_filter(d, "destinationclusterid", params.get("destinationclusterid"))
        })
        .collect();
    Json(filtered)
}

async fn send_drone(Path(cluster_id): Path<String>, body: Option<Json<Value>>) -> Json<Value> {
    let drone_id = rand::thread_rng().gen_range(1..=3);
    log::info!("dispatching drone {drone_id} to cluster {cluster_id}");
    Json(json!({
        "dispatched": true,
        "drone_id": drone_id,
        "cluster_id": cluster_id,
        "task": body.map(|Json(b)| b).unwrap_or(Value::Null),
        "eta_minutes": 10,
    }))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let app = Router::new()
        .route("/panels", get(list_panels))
        .route("/maintenance_requests", get(list_maintenance))
        .route("/drones", get(list_drones))
        .route("/drones/send/:cluster_id", post(send_drone));

    let addr = format!("{}:{}", args.host, args.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    log::info!("mock fleet backend listening on {addr}");
    axum::serve(listener, app).await?;
    Ok(())
}
