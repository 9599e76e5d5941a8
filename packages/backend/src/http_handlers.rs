// packages/backend/src/http_handlers.rs
use super::{
    config,
    error::AppError,
    hub::HubStats,
    slide_cursor::SlideState,
    types::{
        AdminPayload, AdvanceResponse, LeaderboardSnapshot, RespondentQuery, ResultsResponse,
        SubmitPayload, SurveyStatus, SurveyToken, Tally,
    },
    ServerState,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json as AxumJson,
};
use tracing::{info, warn};

/// Where the survey stands for this respondent: waiting, on a slide, or done.
pub async fn survey_handler(
    State(state): State<ServerState>,
    Path(token): Path<String>,
    Query(query): Query<RespondentQuery>,
) -> Result<AxumJson<SurveyStatus>, AppError> {
    let token = SurveyToken::new(token);
    let session = &state.session;
    session.check_token(&token).await?;

    let respondent = query.respondent_or_generate();
    let survey = session.survey().await;
    let current = session.current_slide();
    let (label, slide) = match session.slide_state() {
        SlideState::NotStarted => ("waiting", None),
        SlideState::Active(index) => ("active", survey.slide(index).cloned()),
        SlideState::Finished => ("completed", None),
    };
    let has_answered = session.has_answered(&token, current, &respondent).await;

    Ok(AxumJson(SurveyStatus {
        survey_name: survey.name.clone(),
        respondent,
        current_slide: current,
        slide_count: survey.slide_count(),
        state: label,
        slide,
        user_count: session.live_count(),
        has_answered,
    }))
}

pub async fn submit_handler(
    State(state): State<ServerState>,
    Path(token): Path<String>,
    AxumJson(payload): AxumJson<SubmitPayload>,
) -> Result<AxumJson<Tally>, AppError> {
    let token = SurveyToken::new(token);
    let respondent = RespondentQuery {
        respondent: payload.respondent,
    }
    .respondent_or_generate();
    let tally = state
        .session
        .submit_current(&token, &respondent, payload.answers)
        .await?;
    Ok(AxumJson(tally))
}

pub async fn results_handler(
    State(state): State<ServerState>,
    Path(token): Path<String>,
    Query(query): Query<RespondentQuery>,
) -> Result<AxumJson<ResultsResponse>, AppError> {
    let token = SurveyToken::new(token);
    let session = &state.session;
    session.check_token(&token).await?;

    let respondent = query.respondent_or_generate();
    let current = session.current_slide();
    let results = session.tally(&token, current).await;
    let respondent_count = session.respondent_count(&token, current).await;
    let has_answered = session.has_answered(&token, current, &respondent).await;

    Ok(AxumJson(ResultsResponse {
        respondent,
        current_slide: current,
        slide: session.current_slide_definition().await,
        results,
        respondent_count,
        has_answered,
    }))
}

pub async fn next_slide_handler(
    State(state): State<ServerState>,
    AxumJson(payload): AxumJson<AdminPayload>,
) -> Result<AxumJson<AdvanceResponse>, AppError> {
    let index = state.session.advance_slide_as(&payload.secret).await?;
    Ok(AxumJson(AdvanceResponse {
        current_slide: index,
        finished: matches!(state.session.slide_state(), SlideState::Finished),
    }))
}

pub async fn highscores_handler(
    State(state): State<ServerState>,
    Query(query): Query<RespondentQuery>,
) -> AxumJson<LeaderboardSnapshot> {
    let respondent = query.respondent_or_generate();
    AxumJson(state.session.leaderboard_snapshot(&respondent).await)
}

pub async fn stats_handler(State(state): State<ServerState>) -> AxumJson<HubStats> {
    AxumJson(state.session.hub_stats())
}

/// Re-reads the survey file and restarts the session with it.
pub async fn reset_handler(
    State(state): State<ServerState>,
    AxumJson(payload): AxumJson<AdminPayload>,
) -> Result<StatusCode, AppError> {
    state.session.authorize(&payload.secret).await?;

    let path = state.config.survey_path.clone();
    let survey = tokio::task::spawn_blocking(move || config::load_survey(&path))
        .await
        .map_err(|e| AppError::SurveyLoad(e.to_string()))?
        .map_err(|e| {
            warn!("❌ [RESET] Keeping current survey: {:#}", e);
            AppError::SurveyLoad(format!("{:#}", e))
        })?;

    info!("🔄 [RESET] Reloading survey '{}'", survey.name);
    state.session.reload(survey).await;
    Ok(StatusCode::NO_CONTENT)
}
