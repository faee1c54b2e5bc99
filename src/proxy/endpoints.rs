//! Operations only the primary can serve, each a fixed method and path.

use reqwest::Method;
use std::fmt;

use super::client::PrimaryClient;
use super::inbound::InboundRequest;
use super::request::Payload;
use super::response::OutboundResponse;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint<'a> {
    GetBackgroundTask { name: &'a str },
    TriggerMigrations,
    CreateSchedule { project: &'a str },
    UpdateSchedule { project: &'a str, name: &'a str },
    DeleteSchedule { project: &'a str, name: &'a str },
    DeleteSchedules { project: &'a str },
    InvokeSchedule { project: &'a str, name: &'a str },
    SubmitJob,
    BuildFunction,
    DeleteProject { name: &'a str },
}

impl Endpoint<'_> {
    pub fn method(&self) -> Method {
        match self {
            Endpoint::GetBackgroundTask { .. } => Method::GET,
            Endpoint::UpdateSchedule { .. } => Method::PUT,
            Endpoint::DeleteSchedule { .. }
            | Endpoint::DeleteSchedules { .. }
            | Endpoint::DeleteProject { .. } => Method::DELETE,
            Endpoint::TriggerMigrations
            | Endpoint::CreateSchedule { .. }
            | Endpoint::InvokeSchedule { .. }
            | Endpoint::SubmitJob
            | Endpoint::BuildFunction => Method::POST,
        }
    }

    /// Path below `/api/{version}/`.
    pub fn path(&self) -> String {
        match self {
            Endpoint::GetBackgroundTask { name } => format!("background-tasks/{}", name),
            Endpoint::TriggerMigrations => "operations/migrations".to_string(),
            Endpoint::CreateSchedule { project } | Endpoint::DeleteSchedules { project } => {
                format!("projects/{}/schedules", project)
            }
            Endpoint::UpdateSchedule { project, name }
            | Endpoint::DeleteSchedule { project, name } => {
                format!("projects/{}/schedules/{}", project, name)
            }
            Endpoint::InvokeSchedule { project, name } => {
                format!("projects/{}/schedules/{}/invoke", project, name)
            }
            Endpoint::SubmitJob => "submit_job".to_string(),
            Endpoint::BuildFunction => "build/function".to_string(),
            Endpoint::DeleteProject { name } => format!("projects/{}", name),
        }
    }

    /// Whether the operation forwards a request body.
    pub fn takes_body(&self) -> bool {
        matches!(
            self,
            Endpoint::CreateSchedule { .. }
                | Endpoint::UpdateSchedule { .. }
                | Endpoint::SubmitJob
                | Endpoint::BuildFunction
        )
    }
}

impl fmt::Display for Endpoint<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method(), self.path())
    }
}

impl PrimaryClient {
    /// Forwards `inbound` to a named endpoint. Nothing is validated locally;
    /// that is up to the primary. A body given to an endpoint that takes
    /// none is not sent.
    pub async fn proxy_endpoint(
        &self,
        endpoint: Endpoint<'_>,
        inbound: Option<&dyn InboundRequest>,
        body: Option<Payload>,
    ) -> OutboundResponse {
        let body = body.filter(|_| endpoint.takes_body());
        self.proxy(endpoint.method(), &endpoint.path(), inbound, body)
            .await
    }

    pub async fn get_background_task(
        &self,
        name: &str,
        request: Option<&dyn InboundRequest>,
    ) -> OutboundResponse {
        self.proxy_endpoint(Endpoint::GetBackgroundTask { name }, request, None)
            .await
    }

    pub async fn trigger_migrations(
        &self,
        request: Option<&dyn InboundRequest>,
    ) -> OutboundResponse {
        self.proxy_endpoint(Endpoint::TriggerMigrations, request, None)
            .await
    }

    pub async fn create_schedule(
        &self,
        project: &str,
        request: &dyn InboundRequest,
        body: Payload,
    ) -> OutboundResponse {
        self.proxy_endpoint(
            Endpoint::CreateSchedule { project },
            Some(request),
            Some(body),
        )
        .await
    }

    pub async fn update_schedule(
        &self,
        project: &str,
        name: &str,
        request: &dyn InboundRequest,
        body: Payload,
    ) -> OutboundResponse {
        self.proxy_endpoint(
            Endpoint::UpdateSchedule { project, name },
            Some(request),
            Some(body),
        )
        .await
    }

    pub async fn delete_schedule(
        &self,
        project: &str,
        name: &str,
        request: &dyn InboundRequest,
    ) -> OutboundResponse {
        self.proxy_endpoint(
            Endpoint::DeleteSchedule { project, name },
            Some(request),
            None,
        )
        .await
    }

    pub async fn delete_schedules(
        &self,
        project: &str,
        request: &dyn InboundRequest,
    ) -> OutboundResponse {
        self.proxy_endpoint(Endpoint::DeleteSchedules { project }, Some(request), None)
            .await
    }

    pub async fn invoke_schedule(
        &self,
        project: &str,
        name: &str,
        request: &dyn InboundRequest,
    ) -> OutboundResponse {
        self.proxy_endpoint(
            Endpoint::InvokeSchedule { project, name },
            Some(request),
            None,
        )
        .await
    }

    pub async fn submit_job(
        &self,
        request: &dyn InboundRequest,
        body: Payload,
    ) -> OutboundResponse {
        self.proxy_endpoint(Endpoint::SubmitJob, Some(request), Some(body))
            .await
    }

    pub async fn build_function(
        &self,
        request: &dyn InboundRequest,
        body: Payload,
    ) -> OutboundResponse {
        self.proxy_endpoint(Endpoint::BuildFunction, Some(request), Some(body))
            .await
    }

    pub async fn delete_project(
        &self,
        name: &str,
        request: &dyn InboundRequest,
    ) -> OutboundResponse {
        self.proxy_endpoint(Endpoint::DeleteProject { name }, Some(request), None)
            .await
    }
}
