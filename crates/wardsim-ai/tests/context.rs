use wardsim_ai::context::{
    self, CaseFacts, RECENT_WINDOW, SUMMARY_END, SUMMARY_START, is_medically_relevant,
};
use wardsim_core::models::case::{CaseDetails, CaseMode};
use wardsim_core::models::message::Message;

fn details() -> CaseDetails {
    CaseDetails {
        diagnosis: "Community-acquired pneumonia".to_string(),
        presenting_complaint: "Productive cough and fever".to_string(),
        opening_line: "I've had this awful cough for days.".to_string(),
        patient_profile: None,
        pediatric_profile: None,
    }
}

fn facts(details: &CaseDetails) -> CaseFacts<'_> {
    CaseFacts {
        mode: CaseMode::Simulation,
        details,
        department: None,
    }
}

/// Alternating small talk and clinical questions.
fn history(len: usize) -> Vec<Message> {
    (0..len)
        .map(|i| {
            if i % 2 == 0 {
                Message::student(format!("Tell me about the fever, question {i}"))
            } else {
                Message::student(format!("Nice weather today, remark {i}"))
            }
        })
        .collect()
}

#[test]
fn short_history_is_returned_unchanged() {
    let details = details();
    for len in [0, 1, 7, RECENT_WINDOW] {
        let messages = history(len);
        let optimized = context::optimize(&messages, &facts(&details));
        assert_eq!(optimized.recent_messages, messages);
        assert_eq!(optimized.essential_info.conversation_summary, None);
        assert_eq!(optimized.essential_info.diagnosis, details.diagnosis);
    }
}

#[test]
fn medium_history_is_filtered_without_summary() {
    let details = details();
    let messages = history(18);
    let optimized = context::optimize(&messages, &facts(&details));

    assert!(optimized.recent_messages.len() <= RECENT_WINDOW);
    assert_eq!(optimized.essential_info.conversation_summary, None);
    assert_eq!(optimized.recent_messages.last(), messages.last());
}

#[test]
fn long_history_keeps_a_suffix_of_the_filtered_set() {
    let details = details();
    for len in [21, 30, 64] {
        let messages = history(len);
        let optimized = context::optimize(&messages, &facts(&details));

        let filtered: Vec<Message> = context::relevant_indices(&messages)
            .into_iter()
            .map(|i| messages[i].clone())
            .collect();

        assert!(optimized.recent_messages.len() <= RECENT_WINDOW);
        assert!(filtered.ends_with(&optimized.recent_messages));
    }
}

#[test]
fn long_history_gets_a_marked_summary_of_earlier_clinical_turns() {
    let details = details();
    let messages = history(40);
    let optimized = context::optimize(&messages, &facts(&details));

    let summary = optimized
        .essential_info
        .conversation_summary
        .expect("summary for long history");
    assert!(summary.starts_with(SUMMARY_START));
    assert!(summary.ends_with(SUMMARY_END));
    assert!(summary.contains("question 0"));
    assert!(!summary.contains("Nice weather"));
    assert!(summary.lines().filter(|l| l.starts_with("- ")).count() <= 10);
}

#[test]
fn system_messages_survive_filtering() {
    let mut messages = vec![Message::system("Patient is anxious; be gentle.")];
    messages.extend((0..25).map(|i| Message::student(format!("Small talk {i}"))));

    let kept = context::relevant_indices(&messages);
    assert_eq!(kept.first(), Some(&0));
    // Only the system message and the protected tail remain.
    assert_eq!(kept.len(), 1 + context::PROTECTED_TAIL);
}

#[test]
fn optimize_is_deterministic() {
    let details = details();
    let messages = history(33);
    let a = context::optimize(&messages, &facts(&details));
    let b = context::optimize(&messages, &facts(&details));
    assert_eq!(a, b);
}

#[test]
fn vocabulary_match_is_case_insensitive() {
    assert!(is_medically_relevant("Any CHEST PAIN?"));
    assert!(is_medically_relevant("Do you smoke?"));
    assert!(!is_medically_relevant("Hello there"));
}
