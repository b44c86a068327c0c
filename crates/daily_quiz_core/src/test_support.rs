//! crates/daily_quiz_core/src/test_support.rs
//!
//! In-memory stand-ins for the network and the auth provider, used by unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::api::ApiClient;
use crate::domain::AuthSession;
use crate::ports::{ApiRequest, ApiResponse, AuthProvider, HttpTransport, PortResult};

#[derive(Default)]
struct Script {
    responses: HashMap<String, VecDeque<(ApiResponse, Option<Duration>)>>,
    delays: HashMap<String, Duration>,
    requests: Vec<ApiRequest>,
}

/// Answers each path with its scripted responses in order; the last one repeats.
/// Unscripted paths answer 404.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    script: Arc<Mutex<Script>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(self, path: &str, status: u16, body: Value) -> Self {
        self.push(path, status, body, None)
    }

    /// Like `on`, but this response only arrives after `delay`.
    pub fn on_after(self, path: &str, delay: Duration, status: u16, body: Value) -> Self {
        self.push(path, status, body, Some(delay))
    }

    fn push(self, path: &str, status: u16, body: Value, delay: Option<Duration>) -> Self {
        self.script
            .lock()
            .unwrap()
            .responses
            .entry(path.to_string())
            .or_default()
            .push_back((ApiResponse { status, body }, delay));
        self
    }

    pub fn delayed(self, path: &str, delay: Duration) -> Self {
        self.script
            .lock()
            .unwrap()
            .delays
            .insert(path.to_string(), delay);
        self
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.script.lock().unwrap().requests.clone()
    }

    pub fn count(&self, path: &str) -> usize {
        self.requests().iter().filter(|r| r.path == path).count()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, request: ApiRequest) -> PortResult<ApiResponse> {
        let (response, delay) = {
            let mut script = self.script.lock().unwrap();
            script.requests.push(request.clone());
            let path_delay = script.delays.get(&request.path).copied();
            let scripted = match script.responses.get_mut(&request.path) {
                Some(queue) if queue.len() > 1 => queue.pop_front(),
                Some(queue) => queue.front().cloned(),
                None => None,
            };
            match scripted {
                Some((response, delay)) => (Some(response), delay.or(path_delay)),
                None => (None, path_delay),
            }
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(response.unwrap_or(ApiResponse {
            status: 404,
            body: Value::Null,
        }))
    }
}

/// An auth provider holding a fixed session until signed out.
pub struct StaticAuth {
    session: Mutex<Option<AuthSession>>,
    sign_outs: AtomicUsize,
}

impl StaticAuth {
    pub fn signed_in(user_id: &str) -> Self {
        Self {
            session: Mutex::new(Some(AuthSession {
                access_token: "token-1".to_string(),
                user_id: user_id.to_string(),
                email: None,
                expires_at: None,
            })),
            sign_outs: AtomicUsize::new(0),
        }
    }

    pub fn signed_out() -> Self {
        Self {
            session: Mutex::new(None),
            sign_outs: AtomicUsize::new(0),
        }
    }

    pub fn sign_outs(&self) -> usize {
        self.sign_outs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AuthProvider for StaticAuth {
    async fn get_session(&self) -> PortResult<Option<AuthSession>> {
        Ok(self.session.lock().unwrap().clone())
    }

    async fn sign_out(&self) -> PortResult<()> {
        self.sign_outs.fetch_add(1, Ordering::SeqCst);
        *self.session.lock().unwrap() = None;
        Ok(())
    }
}

/// An `ApiClient` signed in as `user-1` over `transport`.
pub fn client_with(transport: ScriptedTransport) -> (ApiClient, Arc<StaticAuth>) {
    let auth = Arc::new(StaticAuth::signed_in("user-1"));
    (ApiClient::new(Arc::new(transport), auth.clone()), auth)
}
