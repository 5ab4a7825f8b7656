//! Parsing of interactive input lines.
//!
//! Plain lines are clerking messages. Lines starting with `/` are commands;
//! commands that take two fields separate them with `|`.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Say(String),
    Diagnosis(String),
    Results {
        examination: String,
        investigation: String,
    },
    Final {
        diagnosis: String,
        management_plan: String,
    },
    Save,
    Time,
    Status,
    Help,
    Quit,
    /// A known command used with the wrong arguments.
    Usage(&'static str),
    Unknown(String),
    Empty,
}

pub const HELP: &str = "\
Type to talk to the patient. Commands:
  /diagnosis <text>                     record your preliminary diagnosis
  /results <examination> | <investigations>
                                        request results (either side may be blank)
  /final <diagnosis> | <management plan>
                                        complete the case and get feedback
  /save                                 save the case now
  /time                                 show the clock
  /status                               show the case phase and save status
  /help                                 show this help
  /quit                                 leave; the case stays cached for /resume";

impl Command {
    /// Whether the command may still be used once the clock has run out.
    pub fn allowed_after_time_up(&self) -> bool {
        !matches!(
            self,
            Command::Say(_) | Command::Diagnosis(_) | Command::Results { .. }
        )
    }

    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Command::Empty;
        }
        let Some(rest) = line.strip_prefix('/') else {
            return Command::Say(line.to_string());
        };

        let (name, args) = match rest.split_once(char::is_whitespace) {
            Some((name, args)) => (name, args.trim()),
            None => (rest, ""),
        };

        match name.to_ascii_lowercase().as_str() {
            "diagnosis" | "dx" if !args.is_empty() => Command::Diagnosis(args.to_string()),
            "diagnosis" | "dx" => Command::Usage("/diagnosis <text>"),
            "results" => {
                let (examination, investigation) = split_pair(args);
                if examination.is_empty() && investigation.is_empty() {
                    Command::Usage("/results <examination> | <investigations>")
                } else {
                    Command::Results {
                        examination,
                        investigation,
                    }
                }
            }
            "final" => match split_pair(args) {
                (diagnosis, management_plan)
                    if !diagnosis.is_empty() && !management_plan.is_empty() =>
                {
                    Command::Final {
                        diagnosis,
                        management_plan,
                    }
                }
                _ => Command::Usage("/final <diagnosis> | <management plan>"),
            },
            "save" => Command::Save,
            "time" => Command::Time,
            "status" => Command::Status,
            "help" | "?" => Command::Help,
            "quit" | "exit" | "q" => Command::Quit,
            _ => Command::Unknown(name.to_string()),
        }
    }
}

fn split_pair(args: &str) -> (String, String) {
    match args.split_once('|') {
        Some((left, right)) => (left.trim().to_string(), right.trim().to_string()),
        None => (args.trim().to_string(), String::new()),
    }
}
