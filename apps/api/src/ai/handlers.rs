use axum::{
    body::Body,
    extract::State,
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::info;

use crate::ai::evaluate::{evaluation_from, evaluation_prompt, validate, EvaluateRequest, Evaluation};
use crate::ai::questions::{generate_into, plan_questions, GenerateQuestionsRequest};
use crate::auth::AuthUser;
use crate::errors::AppError;
use crate::llm_client::prompts::JSON_ONLY_SYSTEM;
use crate::state::AppState;

const STREAM_BUFFER: usize = 8;

/// POST /api/ai/generate-questions
///
/// Responds immediately with an `application/x-ndjson` body that is filled
/// by a background task as questions are generated.
pub async fn handle_generate_questions(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(req): Json<GenerateQuestionsRequest>,
) -> Result<Response, AppError> {
    let plan = plan_questions(req)?;
    info!(
        "User {} requested {} technical and {} behavioral questions",
        user.id, plan.technical, plan.behavioral
    );

    let (tx, rx) = mpsc::channel(STREAM_BUFFER);
    let llm = state.llm.clone();
    tokio::spawn(async move {
        generate_into(&llm, &plan, &tx).await;
    });

    Ok((
        [
            (header::CONTENT_TYPE, "application/x-ndjson"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(ReceiverStream::new(rx)),
    )
        .into_response())
}

/// POST /api/ai/evaluate-answer
pub async fn handle_evaluate_answer(
    State(state): State<AppState>,
    AuthUser(_user): AuthUser,
    Json(req): Json<EvaluateRequest>,
) -> Result<Json<Evaluation>, AppError> {
    let input = validate(req)?;
    let outcome = state
        .llm
        .call(&evaluation_prompt(&input), JSON_ONLY_SYSTEM)
        .await;
    let evaluation = evaluation_from(outcome).map_err(|e| AppError::Llm(e.to_string()))?;
    Ok(Json(evaluation))
}
