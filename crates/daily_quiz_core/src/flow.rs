//! crates/daily_quiz_core/src/flow.rs
//!
//! The daily-quiz flow controller.
//!
//! Phases: `Idle -> CheckingStatus -> (Results | FetchingQuestions) -> Answering
//! -> Submitting -> Results -> Closed`. Failures while checking status or fetching
//! questions return to `Idle` with a `FlowNotice` offering a retry. Every entry into
//! `Results` fetches the ranking and score-distribution snapshots exactly once.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::api::ApiClient;
use crate::domain::{QuizResult, RankingEntry, ScoreDistribution, TodayResults};
use crate::error::{ClientError, ClientResult};
use crate::normalize::normalize_questions;
use crate::ports::{ApiRequest, ApiResponse};
use crate::results::{
    parse_distribution, parse_ranking, parse_today_results, ResultsInputs, ResultsView,
};
use crate::scheduling::RequestSlot;
use crate::session::{QuizAction, QuizSession, Transition};
use crate::submission::build_submission;

pub const TODAY_RESULTS_PATH: &str = "/api/results/today";
pub const DAILY_QUESTIONS_PATH: &str = "/api/daily-questions";
pub const SUBMIT_ANSWERS_PATH: &str = "/api/submit-answers";
pub const RANKING_PATH: &str = "/api/ranking";
pub const SCORE_DISTRIBUTION_PATH: &str = "/api/stats/score-distribution";

/// How long an animated exit waits before the flow is closed.
pub const EXIT_DELAY: Duration = Duration::from_millis(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowPhase {
    Idle,
    CheckingStatus,
    FetchingQuestions,
    Answering,
    Submitting,
    Results,
    Closed,
}

/// What the presentation layer should tell the user.
#[derive(Debug, Clone, PartialEq)]
pub enum FlowNotice {
    /// No session: redirect to the login view.
    LoginRequired,
    /// The API rejected the session: it has been signed out.
    SessionExpired,
    NoQuestions,
    Error { message: String, retryable: bool },
}

/// How the flow reached `Results`.
enum ResultsEntry {
    /// A fresh submission; today's richer payload is fetched alongside the snapshots.
    Submitted(QuizResult),
    /// The server says today's quiz is done. A non-authoritative payload came from
    /// an error body and is replaced by today's results if those can be fetched.
    AlreadyCompleted {
        payload: TodayResults,
        authoritative: bool,
    },
}

pub struct QuizFlow {
    api: ApiClient,
    requests: RequestSlot,
    phase: FlowPhase,
    notice: Option<FlowNotice>,
    user_id: Option<String>,
    session: Option<QuizSession>,
    result: Option<QuizResult>,
    today: Option<TodayResults>,
    ranking: Option<Vec<RankingEntry>>,
    distribution: Option<ScoreDistribution>,
    pending_exit: Option<Instant>,
    results_entries: u32,
}

impl QuizFlow {
    pub fn new(api: ApiClient) -> Self {
        Self {
            api,
            requests: RequestSlot::new(),
            phase: FlowPhase::Idle,
            notice: None,
            user_id: None,
            session: None,
            result: None,
            today: None,
            ranking: None,
            distribution: None,
            pending_exit: None,
            results_entries: 0,
        }
    }

    pub fn phase(&self) -> FlowPhase {
        self.phase
    }

    pub fn notice(&self) -> Option<&FlowNotice> {
        self.notice.as_ref()
    }

    pub fn clear_notice(&mut self) {
        self.notice = None;
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn session(&self) -> Option<&QuizSession> {
        self.session.as_ref()
    }

    pub fn result(&self) -> Option<&QuizResult> {
        self.result.as_ref()
    }

    /// How many times `Results` has been entered.
    pub fn results_entries(&self) -> u32 {
        self.results_entries
    }

    /// The derived results screen, while in `Results`.
    pub fn results_view(&self) -> Option<ResultsView> {
        (self.phase == FlowPhase::Results).then(|| {
            ResultsView::build(ResultsInputs {
                user_id: self.user_id.as_deref(),
                result: self.result.as_ref(),
                today: self.today.as_ref(),
                ranking: self.ranking.as_deref(),
                distribution: self.distribution.as_ref(),
            })
        })
    }

    //=====================================================================================
    // Opening
    //=====================================================================================

    /// Opens today's quiz on explicit user action.
    ///
    /// A flow that is already answering, submitting or showing results is left as
    /// is (a pending exit is cancelled). Otherwise any in-flight request is
    /// replaced by this attempt.
    pub async fn open(&mut self, now: Instant) -> FlowPhase {
        self.pending_exit = None;
        if matches!(
            self.phase,
            FlowPhase::Answering | FlowPhase::Submitting | FlowPhase::Results
        ) {
            debug!("Quiz already open in {:?}", self.phase);
            return self.phase;
        }

        self.notice = None;
        let cancel = self.requests.begin();
        let session = match self.api.current_user().await {
            Ok(session) => session,
            Err(e) => return self.fail(e, FlowPhase::Idle),
        };
        self.user_id = Some(session.user_id);

        self.phase = FlowPhase::CheckingStatus;
        match self.check_status(&cancel).await {
            Ok(Some(payload)) => {
                info!("Today's quiz already completed");
                self.enter_results(
                    ResultsEntry::AlreadyCompleted {
                        payload,
                        authoritative: true,
                    },
                    &cancel,
                )
                .await
            }
            Ok(None) => self.fetch_questions(now, &cancel).await,
            Err(e) => self.fail(e, FlowPhase::Idle),
        }
    }

    /// `Some(payload)` when today's quiz is already done, `None` when it is not.
    async fn check_status(&self, cancel: &CancellationToken) -> ClientResult<Option<TodayResults>> {
        let response = self
            .api
            .send(ApiRequest::get(TODAY_RESULTS_PATH), cancel)
            .await?;
        let status = response.status;
        match status {
            200..=299 => {
                let today = parse_today_results(&response.body);
                Ok(today.has_result().then_some(today))
            }
            404 => Ok(None),
            403 if response.already_completed() => Ok(Some(parse_today_results(&response.body))),
            _ => Err(server_error(response)),
        }
    }

    async fn fetch_questions(&mut self, now: Instant, cancel: &CancellationToken) -> FlowPhase {
        self.phase = FlowPhase::FetchingQuestions;
        let response = match self
            .api
            .send(ApiRequest::get(DAILY_QUESTIONS_PATH), cancel)
            .await
        {
            Ok(response) => response,
            Err(e) => return self.fail(e, FlowPhase::Idle),
        };

        if response.status == 403 && response.already_completed() {
            let payload = parse_today_results(&response.body);
            return self
                .enter_results(
                    ResultsEntry::AlreadyCompleted {
                        payload,
                        authoritative: false,
                    },
                    cancel,
                )
                .await;
        }
        if !response.is_success() && response.status != 404 {
            return self.fail(server_error(response), FlowPhase::Idle);
        }

        let questions = normalize_questions(&response.body);
        if questions.is_empty() {
            info!("No usable questions in the daily set");
            return self.fail(ClientError::NoQuestions, FlowPhase::Idle);
        }
        info!("Starting quiz with {} questions", questions.len());
        self.session = Some(QuizSession::new(questions, now));
        self.phase = FlowPhase::Answering;
        self.phase
    }

    //=====================================================================================
    // Answering
    //=====================================================================================

    /// Applies a navigation or selection step. Ignored outside `Answering`.
    pub fn apply(&mut self, action: QuizAction, now: Instant) -> Transition {
        match (&mut self.session, self.phase) {
            (Some(session), FlowPhase::Answering) => session.apply(action, now),
            _ => Transition::Stayed,
        }
    }

    pub fn select(&mut self, option: usize, now: Instant) {
        self.apply(QuizAction::Select(option), now);
    }

    pub fn previous(&mut self, now: Instant) {
        self.apply(QuizAction::Previous, now);
    }

    /// Advances, or submits when on the last question.
    pub async fn next(&mut self, now: Instant) -> FlowPhase {
        if self.apply(QuizAction::Next, now) == Transition::SubmitRequested {
            return self.submit(now).await;
        }
        self.phase
    }

    /// Submission is possible once every question is answered and nothing is in flight.
    pub fn can_submit(&self) -> bool {
        self.phase == FlowPhase::Answering
            && self.session.as_ref().is_some_and(QuizSession::is_complete)
    }

    //=====================================================================================
    // Submitting
    //=====================================================================================

    pub async fn submit(&mut self, now: Instant) -> FlowPhase {
        if !self.can_submit() {
            return self.phase;
        }
        let Some(session) = self.session.as_mut() else {
            return self.phase;
        };
        session.apply(QuizAction::BeginSubmit, now);
        let question_count = session.questions().len();
        let payload = match build_submission(session) {
            Ok(payload) => payload,
            Err(guard) => {
                error!("Submission guard rejected the answers: {}", guard);
                let err = ClientError::from(guard);
                self.notice = Some(FlowNotice::Error {
                    message: err.user_message(),
                    retryable: false,
                });
                return self.phase;
            }
        };
        let body = match serde_json::to_value(&payload) {
            Ok(body) => body,
            Err(e) => return self.fail(ClientError::Validation(e.to_string()), FlowPhase::Answering),
        };

        self.phase = FlowPhase::Submitting;
        self.notice = None;
        let cancel = self.requests.begin();
        let response = self
            .api
            .send(ApiRequest::post(SUBMIT_ANSWERS_PATH, body), &cancel)
            .await;

        match response {
            Ok(response) if response.is_success() => {
                let result = QuizResult::from_submission(&response.body, question_count);
                info!(
                    "Submitted session {}: {}/{} correct",
                    payload.session_id, result.correct_count, result.total_questions
                );
                self.enter_results(ResultsEntry::Submitted(result), &cancel).await
            }
            Ok(response) if response.already_completed() => {
                info!("Submission refused: quiz already completed");
                let payload = parse_today_results(&response.body);
                self.enter_results(
                    ResultsEntry::AlreadyCompleted {
                        payload,
                        authoritative: false,
                    },
                    &cancel,
                )
                .await
            }
            Ok(response) => self.fail(server_error(response), FlowPhase::Answering),
            Err(e) if e.is_session_error() => self.fail(e, FlowPhase::Idle),
            Err(e) => self.fail(e, FlowPhase::Answering),
        }
    }

    //=====================================================================================
    // Results
    //=====================================================================================

    async fn enter_results(&mut self, entry: ResultsEntry, cancel: &CancellationToken) -> FlowPhase {
        let fetch_today = match entry {
            ResultsEntry::Submitted(result) => {
                self.result = Some(result);
                self.today = None;
                true
            }
            ResultsEntry::AlreadyCompleted {
                payload,
                authoritative,
            } => {
                self.result = None;
                self.today = Some(payload);
                !authoritative
            }
        };
        self.session = None;
        self.ranking = None;
        self.distribution = None;
        self.phase = FlowPhase::Results;
        self.results_entries += 1;

        let api = self.api.clone();
        let today_request = async {
            if fetch_today {
                Some(api.send_ok(ApiRequest::get(TODAY_RESULTS_PATH), cancel).await)
            } else {
                None
            }
        };
        let (today, ranking, distribution) = tokio::join!(
            today_request,
            api.send_ok(ApiRequest::get(RANKING_PATH), cancel),
            api.send_ok(ApiRequest::get(SCORE_DISTRIBUTION_PATH), cancel),
        );

        match today {
            Some(Ok(response)) => {
                let today = parse_today_results(&response.body);
                if today.has_result() {
                    self.today = Some(today);
                }
            }
            Some(Err(e)) => self.snapshot_failed("today's results", e),
            None => {}
        }
        match ranking {
            Ok(response) => self.ranking = Some(parse_ranking(&response.body)),
            Err(e) => self.snapshot_failed("ranking", e),
        }
        match distribution {
            Ok(response) => self.distribution = Some(parse_distribution(&response.body)),
            Err(e) => self.snapshot_failed("score distribution", e),
        }
        self.phase
    }

    /// Snapshot failures never block the results screen.
    fn snapshot_failed(&mut self, what: &str, err: ClientError) {
        match err {
            ClientError::Aborted => debug!("{} fetch aborted", what),
            ClientError::SessionExpired => self.notice = Some(FlowNotice::SessionExpired),
            e => warn!("Failed to load {}: {}", what, e),
        }
    }

    //=====================================================================================
    // Closing
    //=====================================================================================

    /// Drops the session and results immediately. No network call.
    pub fn close(&mut self) {
        self.requests.cancel();
        self.phase = FlowPhase::Closed;
        self.notice = None;
        self.session = None;
        self.result = None;
        self.today = None;
        self.ranking = None;
        self.distribution = None;
        self.pending_exit = None;
    }

    /// Schedules a close after `EXIT_DELAY`; `open` cancels it.
    pub fn request_exit(&mut self, now: Instant) {
        if self.phase != FlowPhase::Closed {
            self.pending_exit = Some(now + EXIT_DELAY);
        }
    }

    pub fn exit_deadline(&self) -> Option<Instant> {
        self.pending_exit
    }

    /// Closes the flow if a requested exit is due. Returns whether it closed.
    pub fn poll_exit(&mut self, now: Instant) -> bool {
        match self.pending_exit {
            Some(deadline) if deadline <= now => {
                self.close();
                true
            }
            _ => false,
        }
    }

    /// Aborts in-flight requests when the owner goes away.
    pub fn teardown(&mut self) {
        self.requests.cancel();
        self.pending_exit = None;
        self.phase = match self.phase {
            FlowPhase::CheckingStatus | FlowPhase::FetchingQuestions => FlowPhase::Idle,
            FlowPhase::Submitting => FlowPhase::Answering,
            phase => phase,
        };
    }

    /// Moves to `phase` and turns `err` into a notice. Aborts stay silent.
    fn fail(&mut self, err: ClientError, phase: FlowPhase) -> FlowPhase {
        self.phase = phase;
        self.notice = match err {
            ClientError::Aborted => {
                debug!("Quiz request aborted");
                None
            }
            ClientError::SessionMissing => Some(FlowNotice::LoginRequired),
            ClientError::SessionExpired => {
                self.session = None;
                self.phase = FlowPhase::Idle;
                Some(FlowNotice::SessionExpired)
            }
            ClientError::NoQuestions => Some(FlowNotice::NoQuestions),
            e => {
                error!("Quiz flow error: {}", e);
                Some(FlowNotice::Error {
                    message: e.user_message(),
                    retryable: true,
                })
            }
        };
        self.phase
    }
}

impl Drop for QuizFlow {
    fn drop(&mut self) {
        self.requests.cancel();
    }
}

fn server_error(response: ApiResponse) -> ClientError {
    ClientError::Server {
        status: response.status,
        message: response.error_message().unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{client_with, ScriptedTransport, StaticAuth};
    use serde_json::{json, Value};
    use std::sync::Arc;

    fn question(id: &str) -> Value {
        json!({ "id": id, "statement": format!("Pregunta {id}"), "options": ["A", "B", "C", "D"] })
    }

    fn three_questions() -> Value {
        json!({ "questions": [question("q1"), question("q2"), question("q3")] })
    }

    fn snapshots(transport: ScriptedTransport) -> ScriptedTransport {
        transport
            .on(RANKING_PATH, 200, json!({ "ranking": [
                { "userId": "user-1", "rank": 3, "displayName": "Lucía", "score": 450 }
            ]}))
            .on(SCORE_DISTRIBUTION_PATH, 200, json!({
                "scores": [100, 250, 450, 600], "percentile": "62,5"
            }))
    }

    async fn answer_all(flow: &mut QuizFlow, start: Instant) -> FlowPhase {
        let count = flow.session().unwrap().questions().len();
        let mut phase = flow.phase();
        for i in 0..count {
            let now = start + Duration::from_secs(40 * (i as u64 + 1));
            flow.select(1, now);
            phase = flow.next(now).await;
        }
        phase
    }

    #[tokio::test]
    async fn fresh_quiz_reaches_results() {
        let transport = snapshots(ScriptedTransport::new())
            .on(TODAY_RESULTS_PATH, 404, json!({ "error": "not found" }))
            .on(DAILY_QUESTIONS_PATH, 200, three_questions())
            .on(SUBMIT_ANSWERS_PATH, 200, json!({
                "correctCount": 2, "totalQuestions": 3, "percentage": 67,
                "score": 450, "totalTime": 120
            }));
        let (client, _) = client_with(transport.clone());
        let mut flow = QuizFlow::new(client);
        let start = Instant::now();

        assert_eq!(flow.open(start).await, FlowPhase::Answering);
        assert_eq!(answer_all(&mut flow, start).await, FlowPhase::Results);

        let view = flow.results_view().unwrap();
        assert_eq!(view.summary.accuracy, 67);
        assert_eq!(view.summary.score, 450.0);
        assert_eq!(view.percentile, Some(62.5));
        assert_eq!(view.caller.rank, Some(3));
        assert!(!view.density.is_empty());

        let submitted = transport
            .requests()
            .into_iter()
            .find(|r| r.path == SUBMIT_ANSWERS_PATH)
            .unwrap();
        let body = submitted.body.unwrap();
        assert_eq!(body["answers"].as_array().unwrap().len(), 3);
        assert_eq!(body["answers"][0]["selectedOption"], json!(2));
        assert_eq!(body["answers"][0]["timeSpent"], json!(40));
        assert_eq!(transport.count(RANKING_PATH), 1);
        assert_eq!(transport.count(SCORE_DISTRIBUTION_PATH), 1);
    }

    #[tokio::test]
    async fn already_completed_skips_questions() {
        let transport = snapshots(ScriptedTransport::new()).on(
            TODAY_RESULTS_PATH,
            403,
            json!({ "alreadyCompleted": true, "correctCount": 5, "totalQuestions": 10, "score": 300 }),
        );
        let (client, _) = client_with(transport.clone());
        let mut flow = QuizFlow::new(client);

        assert_eq!(flow.open(Instant::now()).await, FlowPhase::Results);
        assert_eq!(transport.count(DAILY_QUESTIONS_PATH), 0);
        assert_eq!(transport.count(TODAY_RESULTS_PATH), 1);
        let view = flow.results_view().unwrap();
        assert_eq!(view.summary.accuracy, 50);
        assert_eq!(view.summary.score, 300.0);
    }

    #[tokio::test]
    async fn results_payload_counts_as_completed() {
        let transport = snapshots(ScriptedTransport::new())
            .on(TODAY_RESULTS_PATH, 200, json!({ "results": { "correctCount": 9, "totalQuestions": 10 } }));
        let (client, _) = client_with(transport.clone());
        let mut flow = QuizFlow::new(client);

        assert_eq!(flow.open(Instant::now()).await, FlowPhase::Results);
        assert_eq!(flow.results_view().unwrap().summary.accuracy, 90);
    }

    #[tokio::test]
    async fn empty_status_payload_starts_the_quiz() {
        for body in [json!({}), json!({ "completed": false, "results": null })] {
            let transport = ScriptedTransport::new()
                .on(TODAY_RESULTS_PATH, 200, body)
                .on(DAILY_QUESTIONS_PATH, 200, three_questions());
            let (client, _) = client_with(transport.clone());
            let mut flow = QuizFlow::new(client);

            assert_eq!(flow.open(Instant::now()).await, FlowPhase::Answering);
            assert_eq!(transport.count(DAILY_QUESTIONS_PATH), 1);
            assert!(flow.results_view().is_none());
        }
    }

    #[tokio::test]
    async fn repeated_question_never_reaches_the_network() {
        let transport = ScriptedTransport::new()
            .on(TODAY_RESULTS_PATH, 404, json!({}))
            .on(DAILY_QUESTIONS_PATH, 200, json!({ "questions": [question("q1"), question("q1")] }));
        let (client, _) = client_with(transport.clone());
        let mut flow = QuizFlow::new(client);
        let start = Instant::now();

        assert_eq!(flow.open(start).await, FlowPhase::Answering);
        assert_eq!(answer_all(&mut flow, start).await, FlowPhase::Answering);
        assert_eq!(transport.count(SUBMIT_ANSWERS_PATH), 0);
        assert!(matches!(
            flow.notice(),
            Some(FlowNotice::Error { retryable: false, .. })
        ));
    }

    #[tokio::test]
    async fn no_questions_today_leaves_flow_interactive() {
        let transport = ScriptedTransport::new()
            .on(TODAY_RESULTS_PATH, 404, json!({}))
            .on(DAILY_QUESTIONS_PATH, 404, json!("No hay preguntas para hoy"));
        let (client, _) = client_with(transport);
        let mut flow = QuizFlow::new(client);

        assert_eq!(flow.open(Instant::now()).await, FlowPhase::Idle);
        assert_eq!(flow.notice(), Some(&FlowNotice::NoQuestions));
        assert!(flow.session().is_none());
    }

    #[tokio::test]
    async fn submit_already_completed_shows_results_once() {
        let transport = snapshots(ScriptedTransport::new())
            .on(TODAY_RESULTS_PATH, 404, json!({}))
            .on(TODAY_RESULTS_PATH, 200, json!({ "correctCount": 3, "totalQuestions": 3 }))
            .on(DAILY_QUESTIONS_PATH, 200, three_questions())
            .on(SUBMIT_ANSWERS_PATH, 403, json!({ "alreadyCompleted": true }));
        let (client, _) = client_with(transport.clone());
        let mut flow = QuizFlow::new(client);
        let start = Instant::now();

        flow.open(start).await;
        assert_eq!(answer_all(&mut flow, start).await, FlowPhase::Results);
        assert!(flow.notice().is_none());
        assert_eq!(transport.count(RANKING_PATH), 1);
        assert_eq!(transport.count(SCORE_DISTRIBUTION_PATH), 1);
        assert_eq!(flow.results_view().unwrap().summary.accuracy, 100);

        // Rendering again must not refetch.
        let _ = flow.results_view();
        assert_eq!(transport.count(RANKING_PATH), 1);
    }

    #[tokio::test]
    async fn submission_error_keeps_answers() {
        let transport = ScriptedTransport::new()
            .on(TODAY_RESULTS_PATH, 404, json!({}))
            .on(DAILY_QUESTIONS_PATH, 200, three_questions())
            .on(SUBMIT_ANSWERS_PATH, 422, json!({ "error": "Respuestas fuera de plazo" }));
        let (client, _) = client_with(transport);
        let mut flow = QuizFlow::new(client);
        let start = Instant::now();

        flow.open(start).await;
        assert_eq!(answer_all(&mut flow, start).await, FlowPhase::Answering);
        assert_eq!(
            flow.notice(),
            Some(&FlowNotice::Error {
                message: "Respuestas fuera de plazo".into(),
                retryable: true
            })
        );
        assert!(flow.can_submit());
    }

    #[tokio::test]
    async fn expired_session_during_questions() {
        let transport = ScriptedTransport::new()
            .on(TODAY_RESULTS_PATH, 404, json!({}))
            .on(DAILY_QUESTIONS_PATH, 401, json!({}));
        let (client, auth) = client_with(transport);
        let mut flow = QuizFlow::new(client);

        assert_eq!(flow.open(Instant::now()).await, FlowPhase::Idle);
        assert_eq!(flow.notice(), Some(&FlowNotice::SessionExpired));
        assert_eq!(auth.sign_outs(), 1);
    }

    #[tokio::test]
    async fn missing_session_requires_login() {
        let transport = ScriptedTransport::new();
        let client = ApiClient::new(Arc::new(transport.clone()), Arc::new(StaticAuth::signed_out()));
        let mut flow = QuizFlow::new(client);

        assert_eq!(flow.open(Instant::now()).await, FlowPhase::Idle);
        assert_eq!(flow.notice(), Some(&FlowNotice::LoginRequired));
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn unexpected_status_check_is_retryable_error() {
        let transport = ScriptedTransport::new().on(TODAY_RESULTS_PATH, 500, json!({}));
        let (client, _) = client_with(transport.clone());
        let mut flow = QuizFlow::new(client);

        assert_eq!(flow.open(Instant::now()).await, FlowPhase::Idle);
        assert!(matches!(flow.notice(), Some(FlowNotice::Error { retryable: true, .. })));
        assert_eq!(transport.count(DAILY_QUESTIONS_PATH), 0);
    }

    #[tokio::test]
    async fn opening_twice_does_not_refetch() {
        let transport = ScriptedTransport::new()
            .on(TODAY_RESULTS_PATH, 404, json!({}))
            .on(DAILY_QUESTIONS_PATH, 200, three_questions());
        let (client, _) = client_with(transport.clone());
        let mut flow = QuizFlow::new(client);

        flow.open(Instant::now()).await;
        flow.open(Instant::now()).await;
        assert_eq!(transport.count(TODAY_RESULTS_PATH), 1);
        assert_eq!(transport.count(DAILY_QUESTIONS_PATH), 1);
    }

    #[tokio::test]
    async fn submit_is_disabled_until_every_question_is_answered() {
        let transport = ScriptedTransport::new()
            .on(TODAY_RESULTS_PATH, 404, json!({}))
            .on(DAILY_QUESTIONS_PATH, 200, three_questions());
        let (client, _) = client_with(transport.clone());
        let mut flow = QuizFlow::new(client);
        let now = Instant::now();

        flow.open(now).await;
        flow.select(0, now);
        assert!(!flow.can_submit());
        assert_eq!(flow.submit(now).await, FlowPhase::Answering);
        assert_eq!(transport.count(SUBMIT_ANSWERS_PATH), 0);
    }

    #[tokio::test]
    async fn reopening_after_close_refetches_snapshots() {
        let transport = snapshots(ScriptedTransport::new())
            .on(TODAY_RESULTS_PATH, 200, json!({ "correctCount": 1, "totalQuestions": 2 }));
        let (client, _) = client_with(transport.clone());
        let mut flow = QuizFlow::new(client);

        flow.open(Instant::now()).await;
        flow.close();
        assert!(flow.results_view().is_none());
        flow.open(Instant::now()).await;

        assert_eq!(flow.results_entries(), 2);
        assert_eq!(transport.count(RANKING_PATH), 2);
        assert_eq!(transport.count(SCORE_DISTRIBUTION_PATH), 2);
    }

    #[tokio::test]
    async fn delayed_exit_is_cancelled_by_reopening() {
        let transport = snapshots(ScriptedTransport::new())
            .on(TODAY_RESULTS_PATH, 200, json!({ "correctCount": 1, "totalQuestions": 2 }));
        let (client, _) = client_with(transport.clone());
        let mut flow = QuizFlow::new(client);
        let now = Instant::now();

        flow.open(now).await;
        flow.request_exit(now);
        assert!(!flow.poll_exit(now + Duration::from_millis(100)));
        flow.open(now + Duration::from_millis(150)).await;
        assert!(!flow.poll_exit(now + Duration::from_secs(1)));
        assert_eq!(flow.phase(), FlowPhase::Results);

        flow.request_exit(now + Duration::from_secs(2));
        assert!(flow.poll_exit(now + Duration::from_secs(3)));
        assert_eq!(flow.phase(), FlowPhase::Closed);
        assert!(flow.result().is_none());
    }

    #[tokio::test]
    async fn snapshot_failures_do_not_block_results() {
        let transport = ScriptedTransport::new()
            .on(TODAY_RESULTS_PATH, 200, json!({ "correctCount": 4, "totalQuestions": 5, "rank": 8 }))
            .on(RANKING_PATH, 500, json!({}))
            .on(SCORE_DISTRIBUTION_PATH, 503, json!({}));
        let (client, _) = client_with(transport);
        let mut flow = QuizFlow::new(client);

        assert_eq!(flow.open(Instant::now()).await, FlowPhase::Results);
        let view = flow.results_view().unwrap();
        assert_eq!(view.summary.accuracy, 80);
        assert_eq!(view.caller.rank, Some(8));
        assert_eq!(view.percentile, None);
        assert!(flow.notice().is_none());
    }
}
