//! The interactive clerking loop.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use wardsim_core::models::case::{CaseMode, CaseState};
use wardsim_core::models::feedback::Feedback;
use wardsim_core::models::message::Message;
use wardsim_core::models::osce::FollowUpAnswer;
use wardsim_core::models::result::{ClinicalResult, ResultStatus};
use wardsim_engine::cache::LocalCaseCache;
use wardsim_engine::clock::{ClockEvent, ClockSnapshot};
use wardsim_engine::controller::{CaseSession, CompletionSubmission};
use wardsim_engine::error::SessionError;
use wardsim_engine::persistence::{SaveIndicator, SaveStatus};
use wardsim_engine::phase::FeedbackAvailability;
use wardsim_engine::poller::{FollowUpQuestionPoller, PollState};

use crate::command::{Command, HELP};

type Input = Lines<BufReader<Stdin>>;

/// Attempts at fetching feedback that was still pending at completion.
const PENDING_FEEDBACK_POLLS: u32 = 10;

enum Flow {
    Continue,
    Quit,
}

/// Drive `session` from stdin until the case is completed or the learner
/// quits.
pub async fn run(mut session: CaseSession, cache: Arc<LocalCaseCache>) -> eyre::Result<()> {
    let Some(state) = session.snapshot() else {
        return Err(eyre::eyre!("no case to run"));
    };
    print_intro(state);
    let osce = state.mode == CaseMode::Osce;

    let (clock, mut events) = session.start_clock();
    if !osce {
        clock.start();
    }
    let mut input = BufReader::new(tokio::io::stdin()).lines();
    println!("Type /help for commands.");

    loop {
        tokio::select! {
            line = input.next_line() => {
                let Some(line) = line? else { break };
                match handle(&mut session, &cache, &mut input, Command::parse(&line), clock.snapshot()).await? {
                    Flow::Continue => {}
                    Flow::Quit => break,
                }
            }
            Some(event) = events.recv() => {
                if event == ClockEvent::TimeUp {
                    println!("\n*** Time is up. Finish with /final <diagnosis> | <plan>. ***");
                }
            }
        }
    }

    clock.stop();
    if let Some(Err(e)) = session.await_save().await {
        warn!(error = %e, "background save did not finish");
    }
    if let Some(case_id) = session.case_id() {
        println!("Case {case_id} is saved on this device. Resume it with `wardsim resume {case_id}`.");
    }
    session.dispose();
    Ok(())
}

async fn handle(
    session: &mut CaseSession,
    cache: &LocalCaseCache,
    input: &mut Input,
    command: Command,
    clock: ClockSnapshot,
) -> eyre::Result<Flow> {
    if clock.time_up && !command.allowed_after_time_up() {
        println!("! Time is up. Finish with /final <diagnosis> | <plan>.");
        return Ok(Flow::Continue);
    }
    match command {
        Command::Empty => {}
        Command::Say(text) => match session.send_message(&text).await {
            Ok(turn) => turn.replies.iter().for_each(|m| println!("{}", render_message(m))),
            Err(e) => println!("! {}", e.user_message()),
        },
        Command::Diagnosis(text) => match session.set_preliminary_diagnosis(&text) {
            Ok(()) => println!("Preliminary diagnosis recorded."),
            Err(e) => println!("! {}", e.user_message()),
        },
        Command::Results {
            examination,
            investigation,
        } => {
            println!("Requesting results...");
            match session.request_results(&examination, &investigation).await {
                Ok(_) => print_results(session.snapshot()),
                Err(e @ SessionError::PartialResults { .. }) => {
                    print_results(session.snapshot());
                    println!("! {}", e.user_message());
                }
                Err(e) => println!("! {}", e.user_message()),
            }
        }
        Command::Final {
            diagnosis,
            management_plan,
        } => {
            let submission = CompletionSubmission {
                final_diagnosis: diagnosis,
                management_plan,
            };
            if complete(session, cache, input, submission).await? {
                return Ok(Flow::Quit);
            }
        }
        Command::Save => match session.save_now().await {
            Ok(report) if report.is_success() => println!("Saved."),
            Ok(report) => println!(
                "! {} part(s) could not be saved; they are kept on this device.",
                report.failed()
            ),
            Err(e) => println!("! {}", e.user_message()),
        },
        Command::Time => println!("{}", render_clock(&clock)),
        Command::Status => {
            println!("Phase: {}", session.phase());
            let indicator = session.save_indicator();
            if indicator.status != SaveStatus::Idle {
                println!("Save: {}", indicator.message());
            }
        }
        Command::Help => println!("{HELP}"),
        Command::Quit => return Ok(Flow::Quit),
        Command::Usage(usage) => println!("Usage: {usage}"),
        Command::Unknown(name) => println!("Unknown command /{name}. Type /help."),
    }
    Ok(Flow::Continue)
}

/// Complete the case and walk through feedback. Returns `true` once the
/// case is completed.
async fn complete(
    session: &mut CaseSession,
    cache: &LocalCaseCache,
    input: &mut Input,
    submission: CompletionSubmission,
) -> eyre::Result<bool> {
    println!("Submitting your case...");
    let outcome = match session.complete_case(submission).await {
        Ok(outcome) => outcome,
        Err(e) => {
            println!("! {}", e.user_message());
            return Ok(false);
        }
    };

    let feedback = match outcome.availability {
        FeedbackAvailability::Ready => outcome.feedback,
        FeedbackAvailability::Pending => {
            println!("Feedback is being prepared...");
            await_pending_feedback(session).await
        }
    };
    match feedback {
        Some(feedback) => {
            println!("\nScore: {}", feedback.score);
            println!("{}", feedback.summary);
            print_list("Strengths", &feedback.strengths);
            print_list("To improve", &feedback.improvements);
        }
        None => println!("Feedback is not ready yet. It will be saved with your case."),
    }

    println!("\nPreparing your case report...");
    match session.await_report().await {
        Ok(Some(bundle)) => {
            println!("\n{}", bundle.case_report.title);
            println!("Overall: {}", bundle.comprehensive_feedback.overall_score);
            println!("{}", bundle.comprehensive_feedback.summary);
            for domain in &bundle.comprehensive_feedback.domains {
                println!("  {}: {} {}", domain.domain, domain.score, domain.comment);
            }
        }
        Ok(None) => {}
        Err(e) => println!("! The case report could not be generated: {}", e.user_message()),
    }

    if session.snapshot().is_some_and(|s| s.mode == CaseMode::Osce) {
        follow_up(session, cache, input).await?;
    }
    Ok(true)
}

async fn await_pending_feedback(session: &mut CaseSession) -> Option<Feedback> {
    let interval = session.settings().poll_interval();
    for attempt in 1..=PENDING_FEEDBACK_POLLS {
        tokio::time::sleep(interval).await;
        match session.fetch_pending_feedback().await {
            Ok(Some(feedback)) => return Some(feedback),
            Ok(None) => debug!(attempt, "feedback still pending"),
            Err(e) => {
                warn!(attempt, error = %e, "fetching pending feedback failed");
                return None;
            }
        }
    }
    None
}

/// Wait for the OSCE follow-up questions, ask them and print the
/// evaluation.
async fn follow_up(
    session: &mut CaseSession,
    cache: &LocalCaseCache,
    input: &mut Input,
) -> eyre::Result<()> {
    println!("\nPreparing follow-up questions...");
    let poller = session.follow_up_poller()?;
    let ready = wait_for_follow_up(&poller).await;
    poller.stop();

    if !ready {
        println!("! Follow-up questions could not be prepared.");
        return Ok(());
    }
    let Some(questions) = cache.load_questions(poller.case_id()) else {
        return Ok(());
    };

    let mut answers = Vec::with_capacity(questions.len());
    for (i, question) in questions.iter().enumerate() {
        println!("\nQ{}. {}", i + 1, question.prompt);
        let Some(answer) = input.next_line().await? else {
            break;
        };
        answers.push(FollowUpAnswer {
            question_id: question.id.clone(),
            answer: answer.trim().to_string(),
        });
    }

    match session.evaluate_follow_up(answers).await {
        Ok(evaluation) => {
            println!("\nFollow-up: {}/{}", evaluation.score, evaluation.max_score);
            println!("{}", evaluation.summary);
        }
        Err(e) => println!("! {}", e.user_message()),
    }
    Ok(())
}

/// Wait until `poller` sees the questions or the generator gives up.
///
/// A failed status is final here: the job only reports it once its attempts
/// are used up.
pub async fn wait_for_follow_up(poller: &FollowUpQuestionPoller) -> bool {
    let mut updates = poller.subscribe();
    loop {
        let snapshot = updates.borrow_and_update().clone();
        match snapshot.state {
            PollState::Ready => return true,
            PollState::Failed => {
                if let Some(error) = snapshot.status.and_then(|s| s.last_error) {
                    warn!(case_id = poller.case_id(), error = %error, "follow-up question generation gave up");
                }
                return false;
            }
            PollState::Polling => {
                if let Some(status) = &snapshot.status {
                    debug!(
                        case_id = poller.case_id(),
                        attempts = status.attempts,
                        max_attempts = status.max_attempts,
                        "waiting for follow-up questions"
                    );
                }
            }
        }
        if updates.changed().await.is_err() {
            return poller.is_ready();
        }
    }
}

/// Log batch save progress until the queue goes away.
pub async fn report_saves(mut rx: watch::Receiver<SaveIndicator>) {
    while rx.changed().await.is_ok() {
        let indicator = rx.borrow_and_update().clone();
        match &indicator.status {
            SaveStatus::Failed { message } => warn!(case_id = ?indicator.case_id, "{message}"),
            SaveStatus::Idle => {}
            _ => info!(case_id = ?indicator.case_id, status = %indicator.message(), "save progress"),
        }
    }
}

// ── Rendering ────────────────────────────────────────────────────────────────

fn print_intro(state: &CaseState) {
    println!("Case {}", state.case_id);
    if let Some(department) = &state.department {
        println!("Department: {}", department.name);
    }
    println!("Presenting complaint: {}\n", state.details.presenting_complaint);
    for message in &state.messages {
        println!("{}", render_message(message));
    }
}

fn print_results(state: Option<&CaseState>) {
    let Some(state) = state else { return };
    for (title, results) in [
        ("Examination", &state.examination_results),
        ("Investigations", &state.investigation_results),
    ] {
        if results.is_empty() {
            continue;
        }
        println!("\n{title}:");
        for result in results {
            println!("  {}", render_result(result));
        }
    }
}

fn print_list(title: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    println!("{title}:");
    for item in items {
        println!("  - {item}");
    }
}

pub fn render_message(message: &Message) -> String {
    format!("{}: {}", message.speaker(), message.text)
}

pub fn render_result(result: &ClinicalResult) -> String {
    match result {
        ClinicalResult::Quantitative(q) => {
            let flag = match q.effective_status() {
                ResultStatus::Normal => "",
                ResultStatus::High => " [HIGH]",
                ResultStatus::Low => " [LOW]",
                ResultStatus::Critical => " [CRITICAL]",
            };
            format!(
                "{}: {} {} (ref {}-{}){flag}",
                q.name, q.value, q.unit, q.reference_range.low, q.reference_range.high
            )
        }
        ClinicalResult::Descriptive(d) => match &d.impression {
            Some(impression) => format!("{}: {} Impression: {impression}", d.name, d.findings),
            None => format!("{}: {}", d.name, d.findings),
        },
    }
}

pub fn render_clock(clock: &ClockSnapshot) -> String {
    let secs = clock.remaining_secs.unwrap_or(clock.elapsed_secs);
    let label = if clock.remaining_secs.is_some() {
        "remaining"
    } else {
        "elapsed"
    };
    format!("{:02}:{:02} {label}", secs / 60, secs % 60)
}
