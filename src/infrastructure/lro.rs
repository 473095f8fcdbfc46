use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::http::{HttpRequest, HttpResponse, HttpTransport};
use crate::domain::ProvisioningState;
use crate::error::{AppError, Result, Sleeper};

const ASYNC_OPERATION_HEADER: &str = "azure-asyncoperation";
const LOCATION_HEADER: &str = "location";

/// Follows a long-running operation to a terminal state.
///
/// Three completion styles are understood, in order of preference:
/// an `Azure-AsyncOperation` status document, `202 Accepted` plus a
/// `Location` to poll, and the resource's own `properties.provisioningState`.
pub struct LroPoller {
    transport: Arc<dyn HttpTransport>,
    sleeper: Arc<dyn Sleeper>,
    poll_interval: Duration,
    max_polls: u32,
}

impl LroPoller {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        sleeper: Arc<dyn Sleeper>,
        poll_interval: Duration,
        max_polls: u32,
    ) -> Self {
        Self {
            transport,
            sleeper,
            poll_interval,
            max_polls,
        }
    }

    /// Wait for the operation started by `initial` and return the final resource body.
    ///
    /// `resource_url` is the URL of the resource for create-or-update calls;
    /// actions (POST) pass `None` and take their result from `Location` or the
    /// initial response.
    pub async fn poll_until_done(
        &self,
        resource: &str,
        initial: HttpResponse,
        resource_url: Option<&str>,
        token: &str,
    ) -> Result<Value> {
        if !initial.is_success() {
            return Err(initial.into_error(resource));
        }

        if let Some(status_url) = initial.header(ASYNC_OPERATION_HEADER) {
            self.poll_async_operation(resource, status_url, initial.retry_after(), token)
                .await?;
            return self.fetch_result(resource, &initial, resource_url, token).await;
        }

        if initial.status == 202 {
            if let Some(location) = initial.header(LOCATION_HEADER) {
                return self
                    .poll_location(resource, location, initial.retry_after(), resource_url, token)
                    .await;
            }
        }

        let body = initial.json_value()?;
        match (provisioning_state(&body), resource_url) {
            (Some(state), Some(url)) if !state.is_terminal() => {
                self.poll_resource(resource, url, state, initial.retry_after(), token)
                    .await
            }
            (Some(state), _) => {
                ensure_succeeded(resource, &state, &body)?;
                Ok(body)
            }
            (None, _) => Ok(body),
        }
    }

    async fn wait(&self, hint: Option<Duration>) {
        self.sleeper.sleep(hint.unwrap_or(self.poll_interval)).await;
    }

    async fn get(&self, url: &str, token: &str) -> Result<HttpResponse> {
        self.transport
            .send(HttpRequest::get(url).bearer(token))
            .await
    }

    async fn poll_async_operation(
        &self,
        resource: &str,
        status_url: &str,
        mut hint: Option<Duration>,
        token: &str,
    ) -> Result<()> {
        let mut last = ProvisioningState::InProgress;
        for poll in 1..=self.max_polls {
            self.wait(hint).await;
            let response = self.get(status_url, token).await?;
            if !response.is_success() {
                return Err(response.into_error(resource));
            }
            let document = response.json_value()?;
            let status = document
                .get("status")
                .and_then(Value::as_str)
                .map(ProvisioningState::from_status)
                .unwrap_or(ProvisioningState::InProgress);
            debug!(resource = resource, poll = poll, status = %status, "Polled async operation");

            if status.is_terminal() {
                return ensure_succeeded(resource, &status, &document);
            }
            last = status;
            hint = response.retry_after();
        }
        Err(self.budget_exceeded(resource, &last))
    }

    async fn poll_location(
        &self,
        resource: &str,
        location: &str,
        mut hint: Option<Duration>,
        resource_url: Option<&str>,
        token: &str,
    ) -> Result<Value> {
        for poll in 1..=self.max_polls {
            self.wait(hint).await;
            let response = self.get(location, token).await?;
            debug!(resource = resource, poll = poll, status = response.status, "Polled operation location");

            if response.status == 202 {
                hint = response.retry_after();
                continue;
            }
            if !response.is_success() {
                return Err(response.into_error(resource));
            }

            let body = response.json_value()?;
            if body.is_null() {
                if let Some(url) = resource_url {
                    return self.get_resource(resource, url, token).await;
                }
            }
            if let Some(state) = provisioning_state(&body) {
                ensure_succeeded(resource, &state, &body)?;
            }
            return Ok(body);
        }
        Err(self.budget_exceeded(resource, &ProvisioningState::Accepted))
    }

    async fn poll_resource(
        &self,
        resource: &str,
        url: &str,
        mut last: ProvisioningState,
        mut hint: Option<Duration>,
        token: &str,
    ) -> Result<Value> {
        for poll in 1..=self.max_polls {
            self.wait(hint).await;
            let response = self.get(url, token).await?;
            if !response.is_success() {
                return Err(response.into_error(resource));
            }
            let body = response.json_value()?;
            let state = provisioning_state(&body).unwrap_or(ProvisioningState::Succeeded);
            debug!(resource = resource, poll = poll, state = %state, "Polled provisioning state");

            if state.is_terminal() {
                ensure_succeeded(resource, &state, &body)?;
                return Ok(body);
            }
            last = state;
            hint = response.retry_after();
        }
        Err(self.budget_exceeded(resource, &last))
    }

    async fn fetch_result(
        &self,
        resource: &str,
        initial: &HttpResponse,
        resource_url: Option<&str>,
        token: &str,
    ) -> Result<Value> {
        if let Some(url) = resource_url {
            return self.get_resource(resource, url, token).await;
        }
        if let Some(location) = initial.header(LOCATION_HEADER) {
            return self.get_resource(resource, location, token).await;
        }
        initial.json_value()
    }

    async fn get_resource(&self, resource: &str, url: &str, token: &str) -> Result<Value> {
        let response = self.get(url, token).await?;
        if !response.is_success() {
            return Err(response.into_error(resource));
        }
        let body = response.json_value()?;
        info!(resource = resource, "✅ Long-running operation completed");
        Ok(body)
    }

    fn budget_exceeded(&self, resource: &str, last: &ProvisioningState) -> AppError {
        warn!(
            resource = resource,
            max_polls = self.max_polls,
            last_status = %last,
            "Operation did not reach a terminal state within the poll budget"
        );
        AppError::OperationInProgress {
            resource: resource.to_string(),
            status: last.to_string(),
        }
    }
}

fn provisioning_state(body: &Value) -> Option<ProvisioningState> {
    body.pointer("/properties/provisioningState")
        .and_then(Value::as_str)
        .map(ProvisioningState::from_status)
}

fn ensure_succeeded(resource: &str, state: &ProvisioningState, document: &Value) -> Result<()> {
    match state {
        ProvisioningState::Succeeded => Ok(()),
        ProvisioningState::Failed | ProvisioningState::Canceled => {
            let error = document
                .get("error")
                .or_else(|| document.pointer("/properties/error"));
            let code = error
                .and_then(|e| e.get("code"))
                .and_then(Value::as_str)
                .unwrap_or(if *state == ProvisioningState::Canceled {
                    "Canceled"
                } else {
                    "Failed"
                });
            let message = error
                .and_then(|e| e.get("message"))
                .and_then(Value::as_str)
                .unwrap_or("");
            Err(AppError::OperationFailed {
                resource: resource.to_string(),
                code: code.to_string(),
                message: message.to_string(),
            })
        }
        other => Err(AppError::OperationInProgress {
            resource: resource.to_string(),
            status: other.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingSleeper, ScriptedTransport};
    use serde_json::json;

    fn poller(responses: Vec<HttpResponse>, max_polls: u32) -> (LroPoller, Arc<ScriptedTransport>, Arc<RecordingSleeper>) {
        let transport = Arc::new(ScriptedTransport::new(responses));
        let sleeper = Arc::new(RecordingSleeper::default());
        let poller = LroPoller::new(
            transport.clone(),
            sleeper.clone(),
            Duration::from_secs(5),
            max_polls,
        );
        (poller, transport, sleeper)
    }

    #[tokio::test]
    async fn test_async_operation_header_then_resource_get() {
        let (poller, transport, sleeper) = poller(
            vec![
                HttpResponse::json(200, &json!({"status": "Running"})).with_header("Retry-After", "2"),
                HttpResponse::json(200, &json!({"status": "Succeeded"})),
                HttpResponse::json(
                    200,
                    &json!({"name": "schema", "properties": {"provisioningState": "Succeeded"}}),
                ),
            ],
            10,
        );
        let initial = HttpResponse::json(201, &json!({"properties": {"provisioningState": "Accepted"}}))
            .with_header("Azure-AsyncOperation", "https://ops/1");

        let body = poller
            .poll_until_done("schema", initial, Some("https://arm/schema"), "tok")
            .await
            .unwrap();

        assert_eq!(body["name"], "schema");
        assert_eq!(
            sleeper.recorded(),
            vec![Duration::from_secs(5), Duration::from_secs(2)]
        );
        let urls: Vec<String> = transport.requests().into_iter().map(|r| r.url).collect();
        assert_eq!(urls, vec!["https://ops/1", "https://ops/1", "https://arm/schema"]);
    }

    #[tokio::test]
    async fn test_failed_async_operation_carries_service_error() {
        let (poller, _, _) = poller(
            vec![HttpResponse::json(
                200,
                &json!({"status": "Failed", "error": {"code": "ResourceOperationInProgress", "message": "busy"}}),
            )],
            10,
        );
        let initial = HttpResponse::new(201, "").with_header("Azure-AsyncOperation", "https://ops/2");

        let err = poller
            .poll_until_done("target", initial, Some("https://arm/target"), "tok")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::OperationFailed { .. }));
        assert!(err.is_in_progress());
    }

    #[tokio::test]
    async fn test_location_polling_returns_final_body() {
        let (poller, _, sleeper) = poller(
            vec![
                HttpResponse::new(202, ""),
                HttpResponse::json(200, &json!({"id": "/solutionVersions/sv-1"})),
            ],
            10,
        );
        let initial = HttpResponse::new(202, "")
            .with_header("Location", "https://ops/loc")
            .with_header("Retry-After", "1");

        let body = poller
            .poll_until_done("review", initial, None, "tok")
            .await
            .unwrap();
        assert_eq!(body["id"], "/solutionVersions/sv-1");
        assert_eq!(
            sleeper.recorded(),
            vec![Duration::from_secs(1), Duration::from_secs(5)]
        );
    }

    #[tokio::test]
    async fn test_provisioning_state_budget_exceeded_is_in_progress() {
        let (poller, _, _) = poller(
            vec![
                HttpResponse::json(200, &json!({"properties": {"provisioningState": "Provisioning"}})),
                HttpResponse::json(200, &json!({"properties": {"provisioningState": "Provisioning"}})),
            ],
            2,
        );
        let initial =
            HttpResponse::json(201, &json!({"properties": {"provisioningState": "Accepted"}}));

        let err = poller
            .poll_until_done("target", initial, Some("https://arm/target"), "tok")
            .await
            .unwrap_err();
        match err {
            AppError::OperationInProgress { status, .. } => assert_eq!(status, "Provisioning"),
            other => panic!("expected OperationInProgress, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_synchronous_success_needs_no_polling() {
        let (poller, transport, sleeper) = poller(Vec::new(), 10);
        let initial = HttpResponse::json(
            200,
            &json!({"name": "ctx", "properties": {"provisioningState": "Succeeded"}}),
        );

        let body = poller
            .poll_until_done("context", initial, Some("https://arm/ctx"), "tok")
            .await
            .unwrap();
        assert_eq!(body["name"], "ctx");
        assert!(transport.requests().is_empty());
        assert!(sleeper.recorded().is_empty());
    }

    #[tokio::test]
    async fn test_initial_error_is_returned() {
        let (poller, _, _) = poller(Vec::new(), 10);
        let initial = HttpResponse::json(
            400,
            &json!({"error": {"code": "InvalidCapability", "message": "unknown capability"}}),
        );
        let err = poller
            .poll_until_done("solution template", initial, None, "tok")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ExternalServiceError { status: 400, .. }));
    }
}
