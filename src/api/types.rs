//! API request/response types
//!
//! Field names on the application views are part of the wire contract.

use serde::{Deserialize, Serialize};

use crate::models::{Application, LogEntry};

// === Applications ===

#[derive(Debug, Serialize, Deserialize)]
pub struct StartRequest {
    /// `<name>:<port>`
    pub app: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StopRequest {
    pub id: i64,
}

/// Application as returned by `/app/start`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppView {
    pub id: u32,
    pub app: String,
    pub port: u16,
    #[serde(rename = "service-port")]
    pub service_port: u16,
    #[serde(rename = "docker-instance")]
    pub docker_instance: String,
}

impl From<&Application> for AppView {
    fn from(app: &Application) -> Self {
        Self {
            id: app.id(),
            app: app.app(),
            port: app.port_app(),
            service_port: app.port_service(),
            docker_instance: app.instance().to_string(),
        }
    }
}

/// Application with its running time, as returned by `/app/list` and
/// `/app/stop`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppStatusView {
    #[serde(flatten)]
    pub app: AppView,
    #[serde(rename = "elapsed-time")]
    pub elapsed_time: String,
}

impl From<&Application> for AppStatusView {
    fn from(app: &Application) -> Self {
        Self {
            app: AppView::from(app),
            elapsed_time: app.elapsed_time(),
        }
    }
}

// === Logs ===

#[derive(Debug, Serialize, Deserialize)]
pub struct LogEntryResponse {
    pub id: u32,
    pub event: String,
    pub message: String,
    pub at: String,
}

impl From<LogEntry> for LogEntryResponse {
    fn from(entry: LogEntry) -> Self {
        Self {
            id: entry.app_id,
            event: entry.event.to_string(),
            message: entry.message,
            at: entry.at.to_rfc3339(),
        }
    }
}

// === Generic ===

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: String,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AppSpec;

    fn app() -> Application {
        Application::new(1, &AppSpec::parse("hello:8080").unwrap(), 49152).unwrap()
    }

    #[test]
    fn test_start_view_fields() {
        let json = serde_json::to_value(AppView::from(&app())).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "id": 1,
                "app": "hello:8080",
                "port": 8080,
                "service-port": 49152,
                "docker-instance": "hello_8080"
            })
        );
    }

    #[test]
    fn test_status_view_adds_elapsed_time() {
        let json = serde_json::to_value(AppStatusView::from(&app())).unwrap();
        let obj = json.as_object().unwrap();
        assert_eq!(obj.len(), 6);
        assert_eq!(obj["docker-instance"], "hello_8080");
        assert_eq!(obj["elapsed-time"], "0m0s");
    }
}
