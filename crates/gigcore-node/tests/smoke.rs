//! End-to-end smoke test for gigcore-node.
//!
//! Starts a real node process against `DATABASE_URL`, posts a synthetic
//! Stripe webhook event, and asserts the ingest-then-replay idempotency
//! contract and the admin read surface both behave.
//!
//! Run with:
//!   DATABASE_URL=postgres://... cargo test -p gigcore-node --test smoke
//!
//! Skipped automatically when `DATABASE_URL` is unset, since this suite
//! needs a real Postgres instance rather than the in-process unit doubles
//! used elsewhere.

use std::net::TcpListener;
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use hmac::{Hmac, Mac};
use sha2::Sha256;

struct NodeGuard {
    child: Child,
}

impl Drop for NodeGuard {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port()
}

fn sign(secret: &str, payload: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

async fn wait_for_api(client: &reqwest::Client, base: &str, timeout: Duration) -> bool {
    let deadline = std::time::Instant::now() + timeout;
    while std::time::Instant::now() < deadline {
        if client
            .get(format!("{base}/v1/admin/tasks/00000000-0000-0000-0000-000000000000"))
            .send()
            .await
            .is_ok()
        {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(250)).await;
    }
    false
}

#[tokio::test]
async fn smoke_webhook_ingest_is_idempotent() {
    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set, skipping gigcore-node smoke test");
        return;
    };

    let api_port = free_port();
    let base = format!("http://127.0.0.1:{api_port}");
    let webhook_secret = "whsec_smoke_test_secret";

    let node_bin = env!("CARGO_BIN_EXE_gigcore-node");
    let child = Command::new(node_bin)
        .args([
            "--database-url",
            &database_url,
            "--api-addr",
            &format!("127.0.0.1:{api_port}"),
            "--stripe-secret-key",
            "sk_test_smoke",
            "--stripe-webhook-secret",
            webhook_secret,
        ])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("failed to spawn gigcore-node");

    let _guard = NodeGuard { child };

    let http = reqwest::Client::new();
    assert!(
        wait_for_api(&http, &base, Duration::from_secs(20)).await,
        "gigcore-node did not become ready within 20 seconds"
    );

    // Unknown task id → 404, proving the admin read surface round-trips a
    // CoreError::NotFound as an HTTP status rather than a 500.
    let resp = http
        .get(format!("{base}/v1/admin/tasks/00000000-0000-0000-0000-000000000000"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::NOT_FOUND);

    // First delivery of a synthetic Stripe event is accepted.
    let payload = serde_json::json!({
        "id": "evt_smoke_test_1",
        "type": "payment_intent.succeeded",
        "created": 1_700_000_000,
        "data": { "object": {} }
    });
    let body = serde_json::to_vec(&payload).unwrap();
    let signature = sign(webhook_secret, &body);

    let resp = http
        .post(format!("{base}/v1/webhooks/stripe"))
        .header("Stripe-Signature", signature.clone())
        .header("content-type", "application/json")
        .body(body.clone())
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::OK);

    // Replaying the identical event is still a 200 (idempotent no-op), not
    // an error — invariant S1.
    let resp = http
        .post(format!("{base}/v1/webhooks/stripe"))
        .header("Stripe-Signature", signature)
        .header("content-type", "application/json")
        .body(body)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::OK);

    // A bad signature is rejected outright.
    let resp = http
        .post(format!("{base}/v1/webhooks/stripe"))
        .header("Stripe-Signature", "deadbeef")
        .header("content-type", "application/json")
        .body(serde_json::to_vec(&payload).unwrap())
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
}
