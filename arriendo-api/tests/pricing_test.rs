// Public pricing routes and request validation (no database needed)

mod common;

use axum_test::TestServer;
use common::create_test_app_service;
use serde_json::json;
use uuid::Uuid;

#[tokio::test]
async fn test_root_and_version() {
    let server = TestServer::new(create_test_app_service()).unwrap();

    let response = server.get("/").await;
    assert_eq!(response.status_code(), 200);

    let response = server.get("/version").await;
    assert_eq!(response.status_code(), 200);
    let body: serde_json::Value = response.json();
    assert!(body["backend_version"].is_string());
}

#[tokio::test]
async fn test_rates_are_public() {
    let server = TestServer::new(create_test_app_service()).unwrap();

    let response = server.get("/pricing/rates").await;
    assert_eq!(response.status_code(), 200);
    let body: serde_json::Value = response.json();
    assert_eq!(body["horas_por_dia"], 24);
    assert_eq!(body["dias_por_mes_tarifa"], 30);
    assert_eq!(body["escala"], 4);
    assert!(body["ssd_gb_mes"].is_string());
    assert!(body["recargo_conexion_privada"].is_string());
}

#[tokio::test]
async fn test_estimate_rejects_out_of_range_sizing() {
    let server = TestServer::new(create_test_app_service()).unwrap();

    let response = server
        .post("/pricing/estimate")
        .json(&json!({
            "instance_type_id": Uuid::new_v4(),
            "ram_gb": 0,
            "disco_gb": 20000,
            "disco_tipo": "SSD",
            "conexion": "publica"
        }))
        .await;

    assert_eq!(response.status_code(), 422);
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"], "validation_failed");
    let fields: Vec<&str> = body["fields"]
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["field"].as_str().unwrap())
        .collect();
    assert_eq!(fields, vec!["ram_gb", "disco_gb"]);
}

#[tokio::test]
async fn test_estimate_rejects_unknown_disk_type() {
    let server = TestServer::new(create_test_app_service()).unwrap();

    let response = server
        .post("/pricing/estimate")
        .json(&json!({
            "instance_type_id": Uuid::new_v4(),
            "ram_gb": 4,
            "disco_gb": 40,
            "disco_tipo": "NVME",
            "conexion": "publica"
        }))
        .await;

    assert_eq!(response.status_code(), 422);
}

#[tokio::test]
async fn test_openapi_lists_billing_routes() {
    let server = TestServer::new(create_test_app_service()).unwrap();

    let response = server.get("/api-docs/openapi.json").await;
    assert_eq!(response.status_code(), 200);
    let body: serde_json::Value = response.json();
    for path in ["/pricing/estimate", "/servers/{id}/transition", "/payments/{id}/pay", "/reconcile"] {
        assert!(body["paths"].get(path).is_some(), "missing {}", path);
    }
}
