//! The case lifecycle controller.
//!
//! A [`CaseSession`] owns one case from generation to completion and is the
//! only writer of its [`CaseState`]. Every mutating operation takes
//! `&mut self`, so at most one AI turn is ever in flight per case and the
//! transcript order follows the conversation.
//!
//! Collaborators are passed in through [`SessionDeps`]; nothing here is
//! global, so several sessions can run side by side.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use wardsim_ai::context::{self, CaseFacts, RECENT_WINDOW};
use wardsim_ai::error::AiError;
use wardsim_ai::operations::{
    self, CaseLookup, CaseReportBundle, CompletionRequest, EvaluationRequest, GenerateCaseRequest,
    PatientTurnRequest, QuestionGenerationRequest, ReportRequest,
};
use wardsim_ai::results::{PlanSubmission, ResultKind, ResultsCoordinator};
use wardsim_ai::retry::{self, RetryPolicy};
use wardsim_ai::service::AiService;
use wardsim_core::error::ValidationError;
use wardsim_core::models::case::{CaseMode, CaseState, Department, Difficulty};
use wardsim_core::models::feedback::Feedback;
use wardsim_core::models::message::Message;
use wardsim_core::models::osce::{FollowUpAnswer, OsceEvaluation, OsceGenerationStatus, OsceStation};
use wardsim_storage::remote::{
    FeedbackRecord, RemoteStore, SessionRecord, SessionValidity, StoreScope,
};

use crate::cache::LocalCaseCache;
use crate::clock::{ClockEvent, ClockHandle, SessionClock};
use crate::error::SessionError;
use crate::persistence::{
    BatchPersistenceQueue, BatchReport, SaveIndicator, case_save_steps, case_state_step, feedback_step,
};
use crate::phase::{CasePhase, FeedbackAvailability};
use crate::poller::{FollowUpQuestionPoller, FollowUpSource};
use crate::questions::QuestionGenerationJob;
use crate::settings::EngineSettings;

// ── Types ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserIdentity {
    pub email: String,
    pub country: Option<String>,
}

/// Everything a session talks to.
#[derive(Clone)]
pub struct SessionDeps {
    pub ai: Arc<dyn AiService>,
    pub store: Arc<dyn RemoteStore>,
    pub cache: Arc<LocalCaseCache>,
    pub persistence: Arc<BatchPersistenceQueue>,
    pub settings: EngineSettings,
    pub user: UserIdentity,
}

/// What the learner picked on the case-selection screen.
#[derive(Debug, Clone, PartialEq)]
pub enum CaseSelection {
    Simulation {
        department: Department,
        difficulty: Difficulty,
    },
    Practice {
        condition: Option<String>,
        custom_description: Option<String>,
        difficulty: Difficulty,
    },
    Osce {
        station: OsceStation,
        difficulty: Difficulty,
    },
}

impl CaseSelection {
    fn into_request(self, case_id: String, session_id: String) -> Result<GenerateCaseRequest, ValidationError> {
        let non_blank = |s: Option<String>| s.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());

        match self {
            CaseSelection::Simulation {
                department,
                difficulty,
            } => {
                if department.name.trim().is_empty() {
                    return Err(ValidationError::Empty("department"));
                }
                Ok(GenerateCaseRequest {
                    case_id,
                    session_id,
                    mode: CaseMode::Simulation,
                    department: Some(department),
                    difficulty,
                    condition: None,
                    custom_description: None,
                    station: None,
                })
            }
            CaseSelection::Practice {
                condition,
                custom_description,
                difficulty,
            } => {
                let condition = non_blank(condition);
                let custom_description = non_blank(custom_description);
                if condition.is_none() && custom_description.is_none() {
                    return Err(ValidationError::Empty("condition or case description"));
                }
                Ok(GenerateCaseRequest {
                    case_id,
                    session_id,
                    mode: CaseMode::Practice,
                    department: None,
                    difficulty,
                    condition,
                    custom_description,
                    station: None,
                })
            }
            CaseSelection::Osce {
                station,
                difficulty,
            } => {
                if station.title.trim().is_empty() {
                    return Err(ValidationError::Empty("station"));
                }
                Ok(GenerateCaseRequest {
                    case_id,
                    session_id,
                    mode: CaseMode::Osce,
                    department: None,
                    difficulty,
                    condition: None,
                    custom_description: None,
                    station: Some(station),
                })
            }
        }
    }
}

/// Result of one clerking turn. A failed turn still succeeds at this level:
/// the failure is recorded as a system message in `replies`.
#[derive(Debug)]
pub struct TurnOutcome {
    pub replies: Vec<Message>,
    pub error: Option<AiError>,
}

/// How many results of each kind were committed. `None` means that kind was
/// not requested or did not succeed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResultsSummary {
    pub examination: Option<usize>,
    pub investigation: Option<usize>,
}

impl ResultsSummary {
    pub fn is_empty(&self) -> bool {
        self.examination.is_none() && self.investigation.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionSubmission {
    pub final_diagnosis: String,
    pub management_plan: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionOutcome {
    pub availability: FeedbackAvailability,
    pub feedback: Option<Feedback>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreshReason {
    NotCached,
    SessionInvalid,
}

pub enum ResumeOutcome {
    Resumed(Box<CaseSession>),
    /// The case cannot be resumed; start a new one.
    Fresh(FreshReason),
}

type ReportTask = JoinHandle<Result<CaseReportBundle, AiError>>;
type SaveTask = JoinHandle<Result<BatchReport, SessionError>>;

// ── Session ──────────────────────────────────────────────────────────────────

pub struct CaseSession {
    deps: SessionDeps,
    phase: CasePhase,
    state: Option<CaseState>,
    station: Option<OsceStation>,
    report: Option<ReportTask>,
    questions: Option<JoinHandle<OsceGenerationStatus>>,
    save: Option<SaveTask>,
}

impl CaseSession {
    pub fn new(deps: SessionDeps) -> Self {
        Self {
            deps,
            phase: CasePhase::Uninitialized,
            state: None,
            station: None,
            report: None,
            questions: None,
            save: None,
        }
    }

    /// Restore a cached case if its server-side session is still valid.
    ///
    /// An invalid session also drops the local copy: a fresh case gets a
    /// new id, so the old entry can never be resumed.
    pub async fn resume(deps: SessionDeps, case_id: &str) -> ResumeOutcome {
        let Some(entry) = deps.cache.load(case_id) else {
            info!(case_id, "no cached case to resume");
            return ResumeOutcome::Fresh(FreshReason::NotCached);
        };

        let validity = match deps.store.validate_case_session(case_id).await {
            Ok(validity) => validity,
            Err(e) => {
                warn!(case_id, error = %e, "session validation failed, treating as invalid");
                SessionValidity::invalid()
            }
        };
        if !validity.is_valid {
            info!(case_id, "session no longer valid, starting fresh");
            deps.cache.clear(case_id);
            return ResumeOutcome::Fresh(FreshReason::SessionInvalid);
        }

        let mut state = entry.into_state();
        if let Some(session_id) = validity.session_id {
            state.session_id = Some(session_id);
        }
        let phase = CasePhase::infer(&state);
        info!(case_id, phase = %phase, messages = state.messages.len(), "case resumed");

        let mut session = Self::new(deps);
        session.phase = phase;
        session.state = Some(state);
        ResumeOutcome::Resumed(Box::new(session))
    }

    // ── Accessors ────────────────────────────────────────────────────────

    pub fn phase(&self) -> CasePhase {
        self.phase
    }

    /// Read-only view of the case. `None` before generation.
    pub fn snapshot(&self) -> Option<&CaseState> {
        self.state.as_ref()
    }

    pub fn case_id(&self) -> Option<&str> {
        self.state.as_ref().map(|s| s.case_id.as_str())
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.deps.settings
    }

    pub fn save_indicator(&self) -> SaveIndicator {
        self.deps.persistence.indicator()
    }

    pub fn report_ready(&self) -> bool {
        self.report.as_ref().is_some_and(JoinHandle::is_finished)
    }

    // ── Generation ───────────────────────────────────────────────────────

    pub async fn generate(&mut self, selection: CaseSelection) -> Result<&CaseState, SessionError> {
        self.guard(CasePhase::Generating, "generate a case")?;
        let station = match &selection {
            CaseSelection::Osce { station, .. } => Some(station.clone()),
            _ => None,
        };
        // Case and session ids are minted here; generated content never
        // supplies them.
        let request = selection.into_request(Uuid::new_v4().to_string(), Uuid::new_v4().to_string())?;

        self.phase = CasePhase::Generating;
        let policy = self.policy();
        let ai = self.deps.ai.as_ref();

        let generated =
            match retry::invoke(&policy, || operations::generate_case(ai, &request)).await {
                Ok(generated) => generated,
                Err(e) => {
                    warn!(mode = ?request.mode, error = %e, "case generation failed");
                    self.phase = CasePhase::Uninitialized;
                    return Err(e.into());
                }
            };

        let state = CaseState::seeded(
            request.case_id,
            Some(request.session_id),
            request.mode,
            request.department,
            request.difficulty,
            generated.details,
        );
        self.register_session(&state).await;
        self.cache_locally(&state);
        info!(case_id = %state.case_id, mode = ?state.mode, "clerking started");

        self.phase = CasePhase::Clerking;
        self.station = station;
        Ok(self.state.insert(state))
    }

    // ── Clerking ─────────────────────────────────────────────────────────

    /// Send one learner message and append the replies.
    ///
    /// AI failures do not fail the call: they are appended as a system
    /// message so the learner can carry on.
    pub async fn send_message(&mut self, text: &str) -> Result<TurnOutcome, SessionError> {
        if !self.phase.accepts_messages() {
            return Err(self.invalid("send a message"));
        }
        let text = text.trim();
        if text.is_empty() {
            return Err(ValidationError::Empty("message").into());
        }
        let policy = self.policy();
        let Some(state) = self.state.as_mut() else {
            return Err(SessionError::InvalidPhase {
                action: "send a message",
                phase: self.phase,
            });
        };

        let context = context::optimize(&state.messages, &CaseFacts::of(state));
        state.messages.push(Message::student(text));
        let request = PatientTurnRequest {
            case_id: state.case_id.clone(),
            session_id: state.session_id.clone(),
            message: text.to_string(),
            context,
        };

        let ai = self.deps.ai.as_ref();
        let outcome = match retry::invoke(&policy, || operations::patient_turn(ai, &request)).await {
            Ok(replies) => TurnOutcome {
                replies,
                error: None,
            },
            Err(e) => {
                warn!(case_id = %state.case_id, error = %e, "clerking turn failed");
                TurnOutcome {
                    replies: vec![Message::system(e.user_message())],
                    error: Some(e),
                }
            }
        };
        state.messages.extend(outcome.replies.iter().cloned());
        debug!(case_id = %state.case_id, replies = outcome.replies.len(), "clerking turn settled");

        cache_entry(&self.deps.cache, state);
        Ok(outcome)
    }

    pub fn set_preliminary_diagnosis(&mut self, diagnosis: &str) -> Result<(), SessionError> {
        if !self.phase.accepts_messages() {
            return Err(self.invalid("record a preliminary diagnosis"));
        }
        if let Some(state) = self.state.as_mut() {
            state.preliminary_diagnosis = diagnosis.trim().to_string();
            cache_entry(&self.deps.cache, state);
        }
        Ok(())
    }

    // ── Results ──────────────────────────────────────────────────────────

    /// Request examination and/or investigation results concurrently.
    ///
    /// With a partial success the successful half is committed, the case
    /// moves on to reviewing results, and the failure is still returned as
    /// [`SessionError::PartialResults`]. With no success the case returns to
    /// the phase it was in.
    pub async fn request_results(
        &mut self,
        examination_plan: &str,
        investigation_plan: &str,
    ) -> Result<ResultsSummary, SessionError> {
        self.guard(CasePhase::AwaitingResults, "request results")?;
        let submission = PlanSubmission::new(examination_plan, investigation_plan)?;
        let policy = self.policy();
        let from = self.phase;

        let Some(state) = self.state.as_mut() else {
            return Err(SessionError::InvalidPhase {
                action: "request results",
                phase: from,
            });
        };
        self.phase = CasePhase::AwaitingResults;

        if let Some(plan) = submission.examination() {
            state.examination_plan = plan.to_string();
        }
        if let Some(plan) = submission.investigation() {
            state.investigation_plan = plan.to_string();
        }
        let essential_info = context::optimize(&state.messages, &CaseFacts::of(state)).essential_info;

        let fan_in = ResultsCoordinator::new(self.deps.ai.as_ref(), policy)
            .fetch(
                &state.case_id,
                state.session_id.as_deref(),
                &submission,
                &essential_info,
            )
            .await;
        let (committed, failure) = fan_in.into_parts();

        let mut summary = ResultsSummary::default();
        for (kind, results) in committed {
            match kind {
                ResultKind::Examination => {
                    summary.examination = Some(results.len());
                    state.examination_results = results;
                }
                ResultKind::Investigation => {
                    summary.investigation = Some(results.len());
                    state.investigation_results = results;
                }
            }
        }

        if summary.is_empty() {
            self.phase = from;
            let e = failure.unwrap_or_else(|| AiError::Service("no results were generated".into()));
            warn!(case_id = %state.case_id, error = %e, "results request failed");
            return Err(e.into());
        }

        self.phase = CasePhase::ReviewingResults;
        cache_entry(&self.deps.cache, state);

        match failure {
            None => {
                info!(case_id = %state.case_id, ?summary, "results committed");
                Ok(summary)
            }
            Some(source) => {
                warn!(case_id = %state.case_id, ?summary, error = %source, "results partially committed");
                Err(SessionError::PartialResults {
                    committed: summary,
                    source,
                })
            }
        }
    }

    // ── Completion ───────────────────────────────────────────────────────

    /// Persist the final case and start feedback generation.
    ///
    /// Returns as soon as structured feedback is known to be ready or
    /// pending; the narrative report keeps assembling in the background
    /// (see [`CaseSession::await_report`]).
    pub async fn complete_case(
        &mut self,
        submission: CompletionSubmission,
    ) -> Result<CompletionOutcome, SessionError> {
        self.guard(CasePhase::Completing, "complete the case")?;
        let final_diagnosis = submission.final_diagnosis.trim();
        let management_plan = submission.management_plan.trim();
        if final_diagnosis.is_empty() {
            return Err(ValidationError::Empty("final diagnosis").into());
        }
        if management_plan.is_empty() {
            return Err(ValidationError::Empty("management plan").into());
        }
        let policy = self.policy();
        let Some(state) = self.state.as_mut() else {
            return Err(SessionError::InvalidPhase {
                action: "complete the case",
                phase: self.phase,
            });
        };

        self.phase = CasePhase::Completing;
        let scope = store_scope(&self.deps.user, &state.case_id);

        // The final answers only land in the case once the service accepted
        // them; a restored case with both set is taken to be completed.
        let request = CompletionRequest {
            case_id: state.case_id.clone(),
            session_id: state.session_id.clone(),
            preliminary_diagnosis: state.preliminary_diagnosis.clone(),
            examination_plan: state.examination_plan.clone(),
            investigation_plan: state.investigation_plan.clone(),
            final_diagnosis: final_diagnosis.to_string(),
            management_plan: management_plan.to_string(),
            context: context::optimize(&state.messages, &CaseFacts::of(state)),
        };
        let ai = self.deps.ai.as_ref();
        let response = match retry::invoke(&policy, || operations::feedback(ai, &request)).await {
            Ok(response) => response,
            Err(e) => {
                warn!(case_id = %state.case_id, error = %e, "case completion failed");
                self.phase = CasePhase::ReviewingResults;
                return Err(e.into());
            }
        };
        state.final_diagnosis = request.final_diagnosis;
        state.management_plan = request.management_plan;

        if let Err(e) = self.deps.store.save_completed_case(&scope, state).await {
            warn!(case_id = %state.case_id, error = %e, "failed to persist completed case");
        }

        let availability = match response.feedback {
            Some(feedback) => {
                state.feedback = Some(feedback);
                FeedbackAvailability::Ready
            }
            None => FeedbackAvailability::Pending,
        };
        self.phase = CasePhase::Completed(availability);
        info!(case_id = %state.case_id, ?availability, "case completed");

        self.report = Some(spawn_report(
            self.deps.ai.clone(),
            policy,
            ReportRequest {
                case_id: state.case_id.clone(),
                session_id: state.session_id.clone(),
                case_state: state.clone(),
            },
        ));
        cache_entry(&self.deps.cache, state);

        let steps = case_save_steps(self.deps.store.clone(), scope, state);
        self.save = Some(self.deps.persistence.spawn(state.case_id.clone(), steps));

        let outcome = CompletionOutcome {
            availability,
            feedback: state.feedback.clone(),
        };
        if state.mode == CaseMode::Osce {
            self.start_question_generation();
        }
        Ok(outcome)
    }

    /// Fetch structured feedback that was pending at completion. `Ok(None)`
    /// while it is still being generated. Feedback that arrives is saved
    /// with the updated case state in the background.
    pub async fn fetch_pending_feedback(&mut self) -> Result<Option<Feedback>, SessionError> {
        match self.phase {
            CasePhase::Completed(FeedbackAvailability::Ready) => {
                return Ok(self.state.as_ref().and_then(|s| s.feedback.clone()));
            }
            CasePhase::Completed(FeedbackAvailability::Pending) => {}
            _ => return Err(self.invalid("fetch feedback")),
        }
        let policy = self.policy();
        let Some(state) = self.state.as_ref() else {
            return Ok(None);
        };

        let lookup = CaseLookup {
            case_id: state.case_id.clone(),
            session_id: state.session_id.clone(),
        };
        let ai = self.deps.ai.as_ref();
        let Some(feedback) =
            retry::invoke(&policy, || operations::detailed_feedback(ai, &lookup)).await?
        else {
            return Ok(None);
        };

        // One batch per case at a time.
        self.await_save().await;
        let Some(state) = self.state.as_mut() else {
            return Ok(Some(feedback));
        };
        state.feedback = Some(feedback.clone());
        self.phase = CasePhase::Completed(FeedbackAvailability::Ready);
        cache_entry(&self.deps.cache, state);
        info!(case_id = %state.case_id, "pending feedback arrived");

        let store = self.deps.store.clone();
        let scope = store_scope(&self.deps.user, &state.case_id);
        let steps = vec![
            case_state_step(store.clone(), scope.clone(), state),
            feedback_step(
                store,
                scope,
                FeedbackRecord::Simple {
                    feedback: feedback.clone(),
                },
            ),
        ];
        self.save = Some(self.deps.persistence.spawn(state.case_id.clone(), steps));
        Ok(Some(feedback))
    }

    /// Wait for the background narrative report and fold it into the case.
    /// `Ok(None)` if no report was started.
    pub async fn await_report(&mut self) -> Result<Option<CaseReportBundle>, SessionError> {
        let Some(task) = self.report.take() else {
            return Ok(self.state.as_ref().and_then(|s| {
                Some(CaseReportBundle {
                    comprehensive_feedback: s.comprehensive_feedback.clone()?,
                    case_report: s.case_report.clone()?,
                })
            }));
        };
        let bundle = task
            .await
            .map_err(|e| SessionError::Background(e.to_string()))??;
        // One batch per case at a time.
        self.await_save().await;

        let Some(state) = self.state.as_mut() else {
            return Ok(Some(bundle));
        };
        state.comprehensive_feedback = Some(bundle.comprehensive_feedback.clone());
        state.case_report = Some(bundle.case_report.clone());
        cache_entry(&self.deps.cache, state);
        info!(case_id = %state.case_id, "case report ready");

        let store = self.deps.store.clone();
        let scope = store_scope(&self.deps.user, &state.case_id);
        let record = FeedbackRecord::Detailed {
            comprehensive_feedback: bundle.comprehensive_feedback.clone(),
            case_report: bundle.case_report.clone(),
        };
        let steps = vec![
            case_state_step(store.clone(), scope.clone(), state),
            feedback_step(store, scope, record),
        ];
        self.save = Some(self.deps.persistence.spawn(state.case_id.clone(), steps));

        Ok(Some(bundle))
    }

    // ── Persistence ──────────────────────────────────────────────────────

    /// Save the whole case now and wait for the batch to finish.
    pub async fn save_now(&mut self) -> Result<BatchReport, SessionError> {
        self.await_save().await;
        let Some(state) = self.state.as_ref() else {
            return Err(self.invalid("save the case"));
        };
        let scope = store_scope(&self.deps.user, &state.case_id);
        let steps = case_save_steps(self.deps.store.clone(), scope, state);
        self.deps.persistence.run(&state.case_id, steps).await
    }

    /// Wait for any background save this session started.
    pub async fn await_save(&mut self) -> Option<Result<BatchReport, SessionError>> {
        let task = self.save.take()?;
        Some(
            task.await
                .unwrap_or_else(|e| Err(SessionError::Background(e.to_string()))),
        )
    }

    // ── OSCE ─────────────────────────────────────────────────────────────

    /// A clock for this case: a countdown with auto-start for OSCE
    /// stations, a stopwatch otherwise.
    pub fn start_clock(&self) -> (ClockHandle, mpsc::UnboundedReceiver<ClockEvent>) {
        let settings = &self.deps.settings;
        match self.state.as_ref().map(|s| s.mode) {
            Some(CaseMode::Osce) => {
                let duration = self
                    .station
                    .as_ref()
                    .filter(|s| s.duration_secs > 0)
                    .map(|s| std::time::Duration::from_secs(u64::from(s.duration_secs)))
                    .unwrap_or_else(|| settings.osce_duration());
                ClockHandle::spawn(
                    SessionClock::countdown(duration),
                    Some(settings.osce_auto_start_delay()),
                )
            }
            _ => ClockHandle::spawn(SessionClock::stopwatch(), None),
        }
    }

    /// Poll the local cache for this case's follow-up questions.
    pub fn follow_up_poller(&self) -> Result<FollowUpQuestionPoller, SessionError> {
        let state = self.osce_state("follow-up questions")?;
        let source: Arc<dyn FollowUpSource> = self.deps.cache.clone();
        Ok(FollowUpQuestionPoller::start(
            source,
            state.case_id.clone(),
            self.deps.settings.poll_interval(),
        ))
    }

    /// Grade the learner's answers to the cached follow-up questions.
    pub async fn evaluate_follow_up(
        &self,
        answers: Vec<FollowUpAnswer>,
    ) -> Result<OsceEvaluation, SessionError> {
        let state = self.osce_state("follow-up evaluation")?;
        if !self.phase.is_completed() {
            return Err(self.invalid("evaluate follow-up answers"));
        }
        let questions = self
            .deps
            .cache
            .load_questions(&state.case_id)
            .filter(|q| !q.is_empty())
            .ok_or_else(|| SessionError::QuestionsNotReady {
                case_id: state.case_id.clone(),
            })?;

        let request = EvaluationRequest {
            case_id: state.case_id.clone(),
            questions,
            answers,
        };
        let ai = self.deps.ai.as_ref();
        let evaluation =
            retry::invoke(&self.policy(), || operations::osce_evaluation(ai, &request)).await?;
        info!(case_id = %state.case_id, score = evaluation.score, max_score = evaluation.max_score, "follow-up answers evaluated");
        Ok(evaluation)
    }

    /// Wait for the follow-up question job, if one was started.
    pub async fn await_question_generation(&mut self) -> Option<OsceGenerationStatus> {
        let task = self.questions.take()?;
        match task.await {
            Ok(status) => Some(status),
            Err(e) => {
                warn!(error = %e, "follow-up question job did not finish");
                None
            }
        }
    }

    fn start_question_generation(&mut self) {
        let Some(state) = self.state.as_ref() else {
            return;
        };
        let settings = &self.deps.settings;
        let tail = state.messages.len().saturating_sub(RECENT_WINDOW);
        let request = QuestionGenerationRequest {
            case_id: state.case_id.clone(),
            diagnosis: state.details.diagnosis.clone(),
            station: self.station.clone(),
            recent_messages: state.messages[tail..].to_vec(),
        };
        let job = QuestionGenerationJob::new(
            self.deps.ai.clone(),
            self.deps.cache.clone(),
            settings.question_generation_max_attempts,
            settings.retry_policy(),
        );
        info!(case_id = %state.case_id, "follow-up question generation started");
        self.questions = Some(job.spawn(request));
    }

    // ── Teardown ─────────────────────────────────────────────────────────

    /// End the session. Background report and question jobs are aborted;
    /// a background save is left to finish.
    pub fn dispose(self) {
        debug!(case_id = ?self.case_id(), phase = %self.phase, "session disposed");
    }

    // ── Helpers ──────────────────────────────────────────────────────────

    fn policy(&self) -> RetryPolicy {
        self.deps.settings.retry_policy()
    }

    fn invalid(&self, action: &'static str) -> SessionError {
        SessionError::InvalidPhase {
            action,
            phase: self.phase,
        }
    }

    fn guard(&self, target: CasePhase, action: &'static str) -> Result<(), SessionError> {
        if self.phase.can_transition_to(target) {
            Ok(())
        } else {
            Err(self.invalid(action))
        }
    }

    fn osce_state(&self, feature: &'static str) -> Result<&CaseState, SessionError> {
        match self.state.as_ref() {
            Some(state) if state.mode == CaseMode::Osce => Ok(state),
            _ => Err(SessionError::NotOsce(feature)),
        }
    }

    fn cache_locally(&self, state: &CaseState) {
        cache_entry(&self.deps.cache, state);
    }

    async fn register_session(&self, state: &CaseState) {
        let Some(session_id) = state.session_id.as_deref() else {
            return;
        };
        let record = SessionRecord::starting_now(
            &state.case_id,
            session_id,
            self.deps.settings.session_ttl(),
        );
        if let Err(e) = self.deps.store.register_session(&record).await {
            warn!(case_id = %state.case_id, error = %e, "failed to register session");
        }
    }
}

impl Drop for CaseSession {
    fn drop(&mut self) {
        if let Some(task) = self.report.take() {
            task.abort();
        }
        if let Some(task) = self.questions.take() {
            task.abort();
        }
    }
}

fn store_scope(user: &UserIdentity, case_id: &str) -> StoreScope {
    StoreScope::new(user.email.clone(), user.country.clone(), case_id)
}

fn cache_entry(cache: &LocalCaseCache, state: &CaseState) {
    if let Err(e) = cache.save(state) {
        warn!(case_id = %state.case_id, error = %e, "failed to cache case locally");
    }
}

fn spawn_report(ai: Arc<dyn AiService>, policy: RetryPolicy, request: ReportRequest) -> ReportTask {
    tokio::spawn(async move {
        let result = retry::invoke(&policy, || {
            operations::comprehensive_feedback(ai.as_ref(), &request)
        })
        .await;
        if let Err(e) = &result {
            warn!(case_id = %request.case_id, error = %e, "case report generation failed");
        }
        result
    })
}
