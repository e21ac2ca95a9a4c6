//! HTTP API - thin axum layer over the execution core

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::error::JudgeError;
use crate::harness::{self, Verdict};
use crate::languages::Language;
use crate::problems::ProblemStore;
use crate::runner::{RunLimits, RunStatus, SandboxRunner, Submission};

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ProblemStore>,
}

/// Create the HTTP router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/execute", post(execute))
        .route("/validate", post(validate))
        .with_state(state)
}

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Request body for raw execution
#[derive(Debug, Deserialize)]
pub struct ExecuteRequest {
    pub code: String,
}

/// Response for raw execution: output, or a staged error
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ExecuteResponse {
    Output { stdout: String },
    Failed { error: String, stage: &'static str },
}

async fn execute(
    State(_state): State<AppState>,
    Json(req): Json<ExecuteRequest>,
) -> (StatusCode, Json<ExecuteResponse>) {
    let submission = Submission {
        source: req.code,
        language: Language::Compiled,
    };

    let runner = match SandboxRunner::new(&submission, RunLimits::default()).await {
        Ok(runner) => runner,
        Err(e) => return internal_failure(e),
    };

    match runner.execute(&[]).await {
        Ok(result) => match result.status {
            RunStatus::Success => (
                StatusCode::OK,
                Json(ExecuteResponse::Output {
                    stdout: result.stdout,
                }),
            ),
            RunStatus::CompileError => staged_failure(result.stderr, "compile"),
            RunStatus::RuntimeError => staged_failure(result.stderr, "runtime"),
            RunStatus::Timeout => staged_failure("Execution timed out".into(), "timeout"),
            RunStatus::ResourceExceeded => {
                staged_failure("Resource limit exceeded".into(), "resource")
            }
        },
        Err(e) => internal_failure(e),
    }
}

fn staged_failure(error: String, stage: &'static str) -> (StatusCode, Json<ExecuteResponse>) {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(ExecuteResponse::Failed { error, stage }),
    )
}

fn internal_failure(e: anyhow::Error) -> (StatusCode, Json<ExecuteResponse>) {
    error!("Execution failed: {:#}", e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ExecuteResponse::Failed {
            error: "Internal execution failure".into(),
            stage: "internal",
        }),
    )
}

/// Request body for validation
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateRequest {
    /// Problem id, as the decimal string the original wire format used
    pub problem_id: String,
    /// Submission source text
    pub submission: String,
    /// Target language; the validation flow defaults to the scripted one
    #[serde(default = "default_language")]
    pub language: Language,
}

fn default_language() -> Language {
    Language::Scripted
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

async fn validate(
    State(state): State<AppState>,
    Json(req): Json<ValidateRequest>,
) -> Result<Json<Verdict>, (StatusCode, Json<ErrorBody>)> {
    if req.submission.is_empty() {
        return Err(reject(JudgeError::InvalidInput(
            "submission must not be empty".into(),
        )));
    }

    let problem_id: i64 = req.problem_id.trim().parse().map_err(|_| {
        reject(JudgeError::InvalidInput(format!(
            "problemId {:?} is not an integer",
            req.problem_id
        )))
    })?;

    let submission = Submission {
        source: req.submission,
        language: req.language,
    };

    info!("Validation request for problem {}", problem_id);

    match harness::validate(state.store.as_ref(), problem_id, &submission).await {
        Ok(verdict) => Ok(Json(verdict)),
        Err(e) => Err(reject(e)),
    }
}

fn reject(err: JudgeError) -> (StatusCode, Json<ErrorBody>) {
    let status = match &err {
        JudgeError::ProblemNotFound(_) => StatusCode::NOT_FOUND,
        JudgeError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        JudgeError::Internal(e) => {
            error!("Validation failed: {:#}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    let message = match &err {
        // Do not leak internals to clients.
        JudgeError::Internal(_) => "Internal validation failure".to_string(),
        other => other.to_string(),
    };
    (status, Json(ErrorBody { error: message }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_request_parses_the_original_wire_shape() {
        let req: ValidateRequest = serde_json::from_str(
            r#"{ "problemId": "3", "submission": "print(1)" }"#,
        )
        .unwrap();
        assert_eq!(req.problem_id, "3");
        assert_eq!(req.language, Language::Scripted);

        let req: ValidateRequest = serde_json::from_str(
            r#"{ "problemId": "3", "submission": "int main(void){return 0;}", "language": "c" }"#,
        )
        .unwrap();
        assert_eq!(req.language, Language::Compiled);
    }

    #[test]
    fn execute_response_shapes() {
        let ok = ExecuteResponse::Output {
            stdout: "6\n".into(),
        };
        assert_eq!(serde_json::to_string(&ok).unwrap(), r#"{"stdout":"6\n"}"#);

        let failed = ExecuteResponse::Failed {
            error: "boom".into(),
            stage: "runtime",
        };
        assert_eq!(
            serde_json::to_string(&failed).unwrap(),
            r#"{"error":"boom","stage":"runtime"}"#
        );
    }

    #[test]
    fn rejection_maps_to_http_status() {
        let (status, _) = reject(JudgeError::ProblemNotFound(1));
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = reject(JudgeError::InvalidInput("bad".into()));
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = reject(JudgeError::Internal(anyhow::anyhow!("x")));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
