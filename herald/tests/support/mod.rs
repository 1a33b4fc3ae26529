#![allow(dead_code)] // Test utility module - not all methods used in every test

//! End-to-end test harness
//!
//! Starts a complete herald instance on a random port, with the mock
//! provider, and talks to it over plain HTTP/1.1.

use std::{net::SocketAddr, path::Path, time::Duration};

use herald::controller::{Herald, Running};
use herald_common::Signal;
use serde_json::Value;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
    sync::broadcast,
    time::timeout,
};

pub const PROVIDER: &str = "resend";
pub const SECRET: &str = "whsec_e2e";

pub struct E2ETestHarness {
    pub running: Running,
    shutdown: broadcast::Sender<Signal>,
}

impl E2ETestHarness {
    /// In-memory storage.
    pub async fn start() -> anyhow::Result<Self> {
        Self::start_with_storage("Memory").await
    }

    /// File storage rooted at `dir`.
    pub async fn start_in(dir: &Path) -> anyhow::Result<Self> {
        Self::start_with_storage(&format!("File(path: {:?})", dir.display().to_string())).await
    }

    async fn start_with_storage(storage: &str) -> anyhow::Result<Self> {
        let config = format!(
            r#"Herald (
                server: (listen_address: "127.0.0.1:0"),
                gateway: (provider: Mock, default_from: Some("noreply@example.com")),
                delivery: (token_secret: Some(Inline("e2e-token-secret"))),
                webhooks: (providers: {{ "{PROVIDER}": (secret: Inline("{SECRET}")) }}),
                storage: {storage},
            )"#
        );
        let herald: Herald = ron::from_str(&config)?;

        let (shutdown, _) = broadcast::channel(8);
        let running = herald.start(&shutdown).await?;

        Ok(Self { running, shutdown })
    }

    pub fn address(&self) -> SocketAddr {
        self.running.address
    }

    /// Broadcast shutdown and wait for both services to stop.
    pub async fn shutdown(self) -> anyhow::Result<()> {
        self.shutdown.send(Signal::Shutdown)?;
        timeout(Duration::from_secs(10), self.running.wait()).await?
    }

    pub async fn request(
        &self,
        method: &str,
        path: &str,
        headers: &[(&str, String)],
        body: Option<&str>,
    ) -> anyhow::Result<(u16, Value)> {
        let body = body.unwrap_or_default();
        let mut request = format!(
            "{method} {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\nContent-Type: application/json\r\nContent-Length: {}\r\n",
            body.len()
        );
        for (name, value) in headers {
            request.push_str(&format!("{name}: {value}\r\n"));
        }
        request.push_str("\r\n");
        request.push_str(body);

        let mut stream = TcpStream::connect(self.address()).await?;
        stream.write_all(request.as_bytes()).await?;

        let mut response = Vec::new();
        timeout(Duration::from_secs(5), stream.read_to_end(&mut response)).await??;
        let response = String::from_utf8(response)?;

        let (head, payload) = response
            .split_once("\r\n\r\n")
            .ok_or_else(|| anyhow::anyhow!("Malformed response: {response}"))?;
        let status = head
            .split_whitespace()
            .nth(1)
            .ok_or_else(|| anyhow::anyhow!("No status line: {head}"))?
            .parse()?;

        let payload = if payload.is_empty() {
            Value::Null
        } else {
            serde_json::from_str(payload).unwrap_or_else(|_| Value::String(payload.to_string()))
        };

        Ok((status, payload))
    }

    pub async fn get(&self, path: &str) -> anyhow::Result<(u16, Value)> {
        self.request("GET", path, &[], None).await
    }

    pub async fn post(&self, path: &str, body: &Value) -> anyhow::Result<(u16, Value)> {
        self.request("POST", path, &[], Some(&body.to_string())).await
    }

    pub async fn delete(&self, path: &str) -> anyhow::Result<(u16, Value)> {
        self.request("DELETE", path, &[], None).await
    }

    /// Post a webhook signed the way the provider signs it.
    pub async fn webhook(&self, body: &Value) -> anyhow::Result<(u16, Value)> {
        let body = body.to_string();
        let now = unix_now();
        let signature = herald_tracking::SignatureVerifier::new(SECRET, 300)
            .sign(now, body.as_bytes())?;

        self.request(
            "POST",
            &format!("/webhooks/{PROVIDER}"),
            &[
                (herald_tracking::signature::TIMESTAMP_HEADER, now.to_string()),
                (herald_tracking::signature::SIGNATURE_HEADER, signature),
            ],
            Some(&body),
        )
        .await
    }

    /// Poll `GET /sends/{id}` until the send has a result.
    pub async fn wait_for_result(&self, id: &str, within: Duration) -> anyhow::Result<Value> {
        timeout(within, async {
            loop {
                let (status, body) = self.get(&format!("/sends/{id}")).await?;
                if status == 200 && !body["result"].is_null() {
                    return anyhow::Ok(body["result"].clone());
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await?
    }
}

fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_or(0, |elapsed| i64::try_from(elapsed.as_secs()).unwrap_or(i64::MAX))
}
