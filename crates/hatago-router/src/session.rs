//! Session-owned state: the progress-token map and the per-session
//! backpressure primitives. A session has exactly one owner (the task
//! handling its connection); nothing here is shared across sessions.

use std::collections::{HashMap, VecDeque};

use serde_json::Value;
use tokio::sync::{Mutex, Semaphore};

const MAX_INFLIGHT: usize = 64;
const PROGRESS_QUEUE_CAPACITY: usize = 1024;

pub struct Session {
    pub id: String,
    pub client_capabilities: Value,
    progress_tokens: Mutex<HashMap<String, (String, String)>>,
    inflight: Semaphore,
    progress_queue: Mutex<VecDeque<(String, Value)>>,
}

impl Session {
    pub fn new(id: String, client_capabilities: Value) -> Self {
        Self {
            id,
            client_capabilities,
            progress_tokens: Mutex::new(HashMap::new()),
            inflight: Semaphore::new(MAX_INFLIGHT),
            progress_queue: Mutex::new(VecDeque::new()),
        }
    }

    /// Acquire a permit for one in-flight downstream request; await if the
    /// session is already at its concurrency cap.
    pub async fn acquire_inflight(&self) -> tokio::sync::SemaphorePermit<'_> {
        self.inflight
            .acquire()
            .await
            .expect("session semaphore is never closed")
    }

    pub async fn register_progress_token(
        &self,
        public_token: String,
        server_id: String,
        upstream_token: String,
    ) {
        self.progress_tokens
            .lock()
            .await
            .insert(public_token, (server_id, upstream_token));
    }

    pub async fn unregister_progress_token(&self, public_token: &str) {
        self.progress_tokens.lock().await.remove(public_token);
    }

    /// Find the public token whose mapping matches `(server_id, upstream_token)`,
    /// used to translate an inbound upstream progress notification back to
    /// the downstream client's own token.
    pub async fn public_token_for(&self, server_id: &str, upstream_token: &str) -> Option<String> {
        self.progress_tokens
            .lock()
            .await
            .iter()
            .find(|(_, (s, u))| s == server_id && u == upstream_token)
            .map(|(public, _)| public.clone())
    }

    /// Push a progress notification payload for `token` onto the lossy
    /// queue, dropping the oldest entry for that same token first if the
    /// queue is at capacity (falling back to the oldest entry overall).
    pub async fn push_progress(&self, token: String, payload: Value) {
        let mut queue = self.progress_queue.lock().await;
        if queue.len() >= PROGRESS_QUEUE_CAPACITY {
            if let Some(pos) = queue.iter().position(|(t, _)| *t == token) {
                queue.remove(pos);
            } else {
                queue.pop_front();
            }
        }
        queue.push_back((token, payload));
    }

    pub async fn drain_progress(&self) -> Vec<Value> {
        self.progress_queue
            .lock()
            .await
            .drain(..)
            .map(|(_, payload)| payload)
            .collect()
    }
}
