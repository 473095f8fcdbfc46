use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use crate::error::{AppError, Result};
use crate::infrastructure::http::{HttpMethod, HttpRequest, HttpResponse, HttpTransport};

/// Replays canned responses in order and records every request
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    responses: Mutex<VecDeque<HttpResponse>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    pub fn new(responses: Vec<HttpResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn push(&self, response: HttpResponse) {
        self.responses
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push_back(response);
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let url = request.url.clone();
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(request);
        self.responses
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop_front()
            .ok_or_else(|| AppError::Transport(format!("no scripted response for {}", url)))
    }
}

/// Key/value store behind PUT and GET, keyed by URL path.
///
/// Stands in for the dynamic-configuration endpoint: a PUT stores the body
/// verbatim (full replacement) and a GET returns it, or 404.
#[derive(Debug, Default)]
pub struct InMemoryTransport {
    documents: Mutex<HashMap<String, String>>,
    requests: Mutex<Vec<HttpRequest>>,
    forced_status: Mutex<Option<u16>>,
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every following request with `status` and an error body
    pub fn fail_with(&self, status: u16) {
        *self
            .forced_status
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(status);
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn stored(&self, url: &str) -> Option<String> {
        self.documents
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&path_of(url))
            .cloned()
    }
}

fn path_of(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => url.split('?').next().unwrap_or(url).to_string(),
    }
}

#[async_trait]
impl HttpTransport for InMemoryTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(request.clone());

        if let Some(status) = *self
            .forced_status
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
        {
            return Ok(HttpResponse::json(
                status,
                &serde_json::json!({"error": {"code": "Unavailable", "message": "injected failure"}}),
            ));
        }

        let key = path_of(&request.url);
        let mut documents = self
            .documents
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match request.method {
            HttpMethod::Put => {
                let body = request
                    .json_body()
                    .map(|v| v.to_string())
                    .unwrap_or_default();
                documents.insert(key, body.clone());
                Ok(HttpResponse::new(200, body))
            }
            HttpMethod::Get => Ok(match documents.get(&key) {
                Some(body) => HttpResponse::new(200, body.clone()),
                None => HttpResponse::new(404, ""),
            }),
            HttpMethod::Post => Ok(HttpResponse::new(405, "")),
        }
    }
}
