use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use ulid::Ulid;

use dayblocks::api::Api;
use dayblocks::engine::Engine;
use dayblocks::store::{MemoryStore, SortedStore, WalStore};
use dayblocks::wire;

// ── Test infrastructure ──────────────────────────────────────

async fn start_test_server(store: Arc<dyn SortedStore>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let api = Arc::new(Api::new(Arc::new(Engine::new(store))));

    tokio::spawn(async move {
        loop {
            let (socket, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => break,
            };
            let api = api.clone();
            tokio::spawn(async move {
                let _ = wire::process_connection(socket, api).await;
            });
        }
    });

    addr
}

fn test_wal_path() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("dayblocks_int_test_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).unwrap();
    dir.join("blocks.wal")
}

struct Client {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl Client {
    async fn connect(addr: SocketAddr) -> Self {
        let (read, writer) = TcpStream::connect(addr).await.unwrap().into_split();
        Self {
            lines: BufReader::new(read).lines(),
            writer,
        }
    }

    async fn send_raw(&mut self, line: &str) -> (u16, Value) {
        self.writer.write_all(line.as_bytes()).await.unwrap();
        self.writer.write_all(b"\n").await.unwrap();
        let reply: Value = serde_json::from_str(&self.lines.next_line().await.unwrap().unwrap()).unwrap();
        (reply["status"].as_u64().unwrap() as u16, reply["body"].clone())
    }

    async fn post(&mut self, path: &str, body: Value) -> (u16, Value) {
        self.send_raw(&json!({"method": "POST", "path": path, "body": body}).to_string())
            .await
    }

    async fn save(&mut self, user: &str, date: &str, start: &str, end: &str, label: &str) -> (u16, Value) {
        self.post(
            "/blocks",
            json!({"userId": user, "date": date, "start": start, "end": end, "label": label}),
        )
        .await
    }

    async fn list(&mut self, user: &str, date: &str) -> Vec<Value> {
        let (status, body) = self.post("/blocks/list", json!({"userId": user, "date": date})).await;
        assert_eq!(status, 200, "{body}");
        body["blocks"].as_array().unwrap().clone()
    }
}

fn labels(blocks: &[Value]) -> Vec<&str> {
    blocks.iter().map(|b| b["label"].as_str().unwrap()).collect()
}

// ── Tests ────────────────────────────────────────────────────

#[tokio::test]
async fn plan_a_day_end_to_end() {
    let addr = start_test_server(Arc::new(MemoryStore::new())).await;
    let mut c = Client::connect(addr).await;

    let (status, body) = c.save("alice", "2024-05-01", "13:00", "14:00", "Lunch review").await;
    assert_eq!(status, 200);
    assert_eq!(body["ok"], true);
    assert_eq!(body["message"], "Block saved");

    let (status, body) = c.save("alice", "2024-05-01", "09:00", "10:30", "  Deep work  ").await;
    assert_eq!(status, 200);
    assert_eq!(labels(body["blocks"].as_array().unwrap()), vec!["Deep work", "Lunch review"]);

    // Touching endpoints are allowed.
    let (status, _) = c.save("alice", "2024-05-01", "10:30", "13:00", "Email").await;
    assert_eq!(status, 200);

    let (status, body) = c.save("alice", "2024-05-01", "12:45", "13:15", "Call").await;
    assert_eq!(status, 400);
    assert_eq!(body["ok"], false);
    assert_eq!(body["code"], "overlap");
    assert_eq!(body["error"], "Time overlaps with existing block 'Email' (10:30-13:00)");

    let blocks = c.list("alice", "2024-05-01").await;
    assert_eq!(labels(&blocks), vec!["Deep work", "Email", "Lunch review"]);
    let first = &blocks[0];
    assert_eq!(first["date"], "2024-05-01");
    assert_eq!(first["start"], "09:00");
    assert_eq!(first["end"], "10:30");
    assert!(first["createdAt"].as_str().unwrap().ends_with('Z'));

    let email_id = blocks[1]["blockId"].as_str().unwrap().to_string();
    let (status, body) = c
        .post("/blocks/delete", json!({"userId": "alice", "date": "2024-05-01", "blockId": email_id}))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["message"], "Deleted");
    assert_eq!(labels(body["blocks"].as_array().unwrap()), vec!["Deep work", "Lunch review"]);

    let (status, body) = c
        .post("/blocks/delete", json!({"userId": "alice", "date": "2024-05-01", "blockId": email_id}))
        .await;
    assert_eq!(status, 404);
    assert_eq!(body["error"], "Block not found");
}

#[tokio::test]
async fn request_errors_map_to_status_codes() {
    let addr = start_test_server(Arc::new(MemoryStore::new())).await;
    let mut c = Client::connect(addr).await;

    let (status, body) = c.save("alice", "2024-05-01", "10:00", "09:00", "Backwards").await;
    assert_eq!(status, 400);
    assert_eq!(body["code"], "validation");
    assert_eq!(body["error"], "end time must be after start time");

    let (status, body) = c.save("alice", "2024-02-30", "09:00", "10:00", "x").await;
    assert_eq!(status, 400);
    assert_eq!(body["error"], "date must be YYYY-MM-DD");

    let (status, body) = c
        .send_raw(r#"{"method": "GET", "path": "/blocks/list", "body": {}}"#)
        .await;
    assert_eq!(status, 405);
    assert_eq!(body["code"], "method_not_allowed");

    let (status, body) = c.post("/calendar", json!({})).await;
    assert_eq!(status, 404);
    assert_eq!(body["code"], "route_not_found");

    let (status, body) = c
        .send_raw(r#"{"path": "/blocks/list", "body": "{not json"}"#)
        .await;
    assert_eq!(status, 400);
    assert_eq!(body["code"], "malformed_request");

    // The connection survives every error above.
    assert!(c.list("alice", "2024-05-01").await.is_empty());
}

#[tokio::test]
async fn buckets_are_isolated_across_connections() {
    let addr = start_test_server(Arc::new(MemoryStore::new())).await;
    let mut alice = Client::connect(addr).await;
    let mut bob = Client::connect(addr).await;

    assert_eq!(alice.save("alice", "2024-05-01", "09:00", "10:00", "a").await.0, 200);
    assert_eq!(bob.save("bob", "2024-05-01", "09:00", "10:00", "b").await.0, 200);
    assert_eq!(alice.save("alice", "2024-05-02", "09:00", "10:00", "a2").await.0, 200);

    assert_eq!(labels(&bob.list("alice", "2024-05-01").await), vec!["a"]);
    assert_eq!(labels(&alice.list("bob", "2024-05-01").await), vec!["b"]);
    assert!(alice.list("carol", "2024-05-01").await.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_overlapping_saves_admit_one() {
    let addr = start_test_server(Arc::new(MemoryStore::new())).await;

    let mut handles = Vec::new();
    for i in 0..8 {
        handles.push(tokio::spawn(async move {
            let mut c = Client::connect(addr).await;
            c.save("alice", "2024-05-01", "09:00", "10:00", &format!("racer {i}")).await.0
        }));
    }
    let mut statuses = Vec::new();
    for h in handles {
        statuses.push(h.await.unwrap());
    }
    assert_eq!(statuses.iter().filter(|s| **s == 200).count(), 1);
    assert_eq!(statuses.iter().filter(|s| **s == 400).count(), 7);

    let mut c = Client::connect(addr).await;
    assert_eq!(c.list("alice", "2024-05-01").await.len(), 1);
}

#[tokio::test]
async fn blocks_survive_restart() {
    let path = test_wal_path();

    let block_id = {
        let store = Arc::new(WalStore::open(&path).unwrap());
        let addr = start_test_server(store).await;
        let mut c = Client::connect(addr).await;
        c.save("alice", "2024-05-01", "09:00", "10:00", "kept").await;
        let (_, body) = c.save("alice", "2024-05-01", "11:00", "12:00", "dropped").await;
        let dropped = body["blocks"][1]["blockId"].as_str().unwrap().to_string();
        let (status, _) = c
            .post("/blocks/delete", json!({"userId": "alice", "date": "2024-05-01", "blockId": dropped}))
            .await;
        assert_eq!(status, 200);
        body["blocks"][0]["blockId"].as_str().unwrap().to_string()
    };

    let store = Arc::new(WalStore::open(&path).unwrap());
    let addr = start_test_server(store).await;
    let mut c = Client::connect(addr).await;
    let blocks = c.list("alice", "2024-05-01").await;
    assert_eq!(labels(&blocks), vec!["kept"]);
    assert_eq!(blocks[0]["blockId"], block_id.as_str());
}
