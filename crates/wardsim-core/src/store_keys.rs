//! Remote store key conventions.
//!
//! Pure string functions with no AWS SDK dependency. These define the canonical
//! layout of objects in the simulator's bucket.

fn user_root(user_email: &str) -> String {
    format!("users/{}", user_email.trim().to_lowercase())
}

pub fn user_cases_prefix(user_email: &str) -> String {
    format!("{}/cases/", user_root(user_email))
}

pub fn case_prefix(user_email: &str, case_id: &str) -> String {
    format!("{}{case_id}/", user_cases_prefix(user_email))
}

pub fn conversation(user_email: &str, case_id: &str) -> String {
    format!("{}conversation.json", case_prefix(user_email, case_id))
}

pub fn case_state(user_email: &str, case_id: &str) -> String {
    format!("{}case-state.json", case_prefix(user_email, case_id))
}

pub fn results(user_email: &str, case_id: &str) -> String {
    format!("{}results.json", case_prefix(user_email, case_id))
}

pub fn feedback(user_email: &str, case_id: &str) -> String {
    format!("{}feedback.json", case_prefix(user_email, case_id))
}

pub fn report(user_email: &str, case_id: &str) -> String {
    format!("{}report.json", case_prefix(user_email, case_id))
}

pub fn completed_case(user_email: &str, case_id: &str) -> String {
    format!("{}completed.json", case_prefix(user_email, case_id))
}

pub fn session(case_id: &str) -> String {
    format!("sessions/{case_id}.json")
}
