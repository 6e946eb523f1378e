// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// HTTP API.

pub mod envelope;
pub mod files;
pub mod printers;

use axum::Router;
use axum::routing::{delete, get, post};
use serde_json::{Value, json};

use crate::services::agent_services::AgentServices;
use envelope::{ApiResult, ok};

pub fn router(services: AgentServices) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/files", get(files::list_files))
        .route("/api/files/:id", delete(files::delete_file))
        .route("/api/files/:id/synced", post(files::mark_synced))
        .route("/api/print", post(files::print_file))
        .route("/api/printers", get(printers::list_printers))
        .route("/api/printers/drivers", get(printers::list_drivers))
        .route("/api/printers/sync", post(printers::sync_printers))
        .route("/api/printers/test-endpoint", post(printers::test_endpoint))
        .with_state(services)
}

async fn healthz() -> ApiResult<Value> {
    ok("ok", json!({ "version": env!("CARGO_PKG_VERSION") }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use printdock_core::config::AgentConfig;
    use printdock_core::types::{FileId, FileRecord};
    use printdock_print::testing::{FixedProbe, RecordingControl};
    use printdock_store::{FileRepository, SqliteStore};
    use reqwest::StatusCode;
    use std::net::SocketAddr;
    use std::sync::Arc;

    struct Harness {
        addr: SocketAddr,
        http: reqwest::Client,
        store: Arc<SqliteStore>,
        control: Arc<RecordingControl>,
        dir: tempfile::TempDir,
    }

    impl Harness {
        fn url(&self, path: &str) -> String {
            format!("http://{}{}", self.addr, path)
        }

        async fn get(&self, path: &str) -> (StatusCode, Value) {
            let response = self.http.get(self.url(path)).send().await.expect("send");
            (response.status(), response.json().await.expect("json body"))
        }

        async fn post(&self, path: &str, body: Value) -> (StatusCode, Value) {
            let response = self
                .http
                .post(self.url(path))
                .json(&body)
                .send()
                .await
                .expect("send");
            (response.status(), response.json().await.expect("json body"))
        }

        async fn delete(&self, path: &str) -> (StatusCode, Value) {
            let response = self.http.delete(self.url(path)).send().await.expect("send");
            (response.status(), response.json().await.expect("json body"))
        }

        async fn tracked_file(&self, name: &str) -> FileRecord {
            let id = FileId::new();
            let tenant = self.dir.path().join("tenant");
            std::fs::create_dir_all(&tenant).expect("mkdir");
            let path = tenant.join(id.canonical_file_name());
            std::fs::write(&path, b"%PDF-1.5").expect("write");
            let record = FileRecord::new(id, name.into(), 1, path);
            self.store.insert_file(&record).await.expect("insert");
            record
        }
    }

    async fn harness() -> Harness {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut config = AgentConfig::default();
        config.watch.root = dir.path().to_path_buf();
        config.print_cleanup_delay_secs = 3600;

        let store = Arc::new(SqliteStore::open_in_memory().expect("store"));
        let control = Arc::new(RecordingControl::default());
        let services = AgentServices::from_parts(
            config,
            store.clone(),
            control.clone(),
            Arc::new(FixedProbe::reachable()),
            None,
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("addr");
        let app = router(services);
        tokio::spawn(async move { axum::serve(listener, app).await.expect("serve app") });

        Harness {
            addr,
            http: reqwest::Client::new(),
            store,
            control,
            dir,
        }
    }

    fn lab_printer() -> Value {
        json!({
            "id": "p1",
            "name": "Lab",
            "protocol": "socket",
            "ipAddress": "10.0.0.5",
            "port": 9100
        })
    }

    #[tokio::test]
    async fn healthz_answers() {
        let h = harness().await;
        let (status, body) = h.get("/healthz").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
    }

    #[tokio::test]
    async fn sync_creates_then_replays_unchanged() {
        let h = harness().await;

        let (status, body) = h.post("/api/printers/sync", json!([lab_printer()])).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["created"], 1);

        h.control.clear();
        let (_, replay) = h.post("/api/printers/sync", json!([lab_printer()])).await;
        assert_eq!(replay["data"]["unchanged"], 1);
        assert!(h.control.calls().is_empty());

        let (_, listed) = h.get("/api/printers").await;
        assert_eq!(listed["data"][0]["name"], "Lab");
    }

    #[tokio::test]
    async fn invalid_descriptor_is_reported_per_item() {
        let h = harness().await;
        let (status, body) = h
            .post("/api/printers/sync", json!([{ "name": "No id" }, lab_printer()]))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], false);
        assert_eq!(body["data"]["created"], 1);
        assert_eq!(body["data"]["skipped"], 1);
    }

    #[tokio::test]
    async fn mistyped_descriptor_fields_do_not_fail_the_batch() {
        let h = harness().await;
        let batch = json!([
            lab_printer(),
            { "id": "p2", "name": "X", "ipAddress": "10.0.0.6", "port": "9100" },
            { "id": 7, "name": "Seven", "ipAddress": "10.0.0.7" }
        ]);

        let (status, body) = h.post("/api/printers/sync", batch).await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["success"], false);
        assert_eq!(body["data"]["created"], 1);
        assert_eq!(body["data"]["skipped"], 2);
        assert_eq!(body["data"]["errors"][0]["printerId"], "p2");
        assert_eq!(body["data"]["errors"][1]["printerId"], "7");
    }

    #[tokio::test]
    async fn malformed_sync_body_is_bad_request() {
        let h = harness().await;
        let (status, body) = h.post("/api/printers/sync", json!({ "not": "a list" })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn print_request_reaches_the_queue() {
        let h = harness().await;
        h.post("/api/printers/sync", json!([lab_printer()])).await;
        let file = h.tracked_file("report.pdf").await;

        let (status, body) = h
            .post(
                "/api/print",
                json!({ "fileId": file.id.to_string(), "assetId": "p1" }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["data"]["queue"], "Lab");
        assert_eq!(body["data"]["requestId"], "Lab-1");

        let stored = h.store.get_file(file.id).await.expect("get").expect("found");
        assert!(stored.printed);
    }

    #[tokio::test]
    async fn print_errors_map_to_statuses() {
        let h = harness().await;
        h.post("/api/printers/sync", json!([lab_printer()])).await;
        let file = h.tracked_file("report.pdf").await;

        let (status, _) = h
            .post(
                "/api/print",
                json!({ "fileId": FileId::new().to_string(), "assetId": "p1" }),
            )
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = h
            .post("/api/print", json!({ "fileId": "not-a-uuid", "assetId": "p1" }))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        h.control.fail_print(true);
        let (status, body) = h
            .post(
                "/api/print",
                json!({ "fileId": file.id.to_string(), "assetId": "p1" }),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn files_can_be_listed_acknowledged_and_deleted() {
        let h = harness().await;
        let first = h.tracked_file("a.pdf").await;
        let second = h.tracked_file("b.pdf").await;

        let (status, _) = h
            .post(&format!("/api/files/{}/synced", first.id), json!({}))
            .await;
        assert_eq!(status, StatusCode::OK);

        let (_, synced) = h.get("/api/files?synced=true").await;
        assert_eq!(synced["data"].as_array().map(Vec::len), Some(1));
        assert_eq!(synced["data"][0]["fileName"], "a.pdf");

        let (status, _) = h.delete(&format!("/api/files/{}", second.id)).await;
        assert_eq!(status, StatusCode::OK);
        assert!(!second.path.exists());

        let (status, _) = h.delete(&format!("/api/files/{}", second.id)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, all) = h.get("/api/files").await;
        assert_eq!(all["data"].as_array().map(Vec::len), Some(1));
    }

    #[tokio::test]
    async fn endpoint_test_goes_through_the_adapter() {
        let h = harness().await;
        let (status, body) = h
            .post(
                "/api/printers/test-endpoint",
                json!({ "protocol": "ipp", "ipAddress": "10.0.0.5" }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["valid"], true);

        let (status, _) = h
            .post(
                "/api/printers/test-endpoint",
                json!({ "protocol": "dnssd", "ipAddress": "10.0.0.5" }),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = h
            .post(
                "/api/printers/test-endpoint",
                json!({ "protocol": "carrier-pigeon", "ipAddress": "10.0.0.5" }),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn drivers_are_listed() {
        let h = harness().await;
        let (status, body) = h.get("/api/printers/drivers").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"][1], "everywhere");
    }
}
