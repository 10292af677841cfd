use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::models::{Table, Turn};
use crate::services::insight::InsightService;

pub const GREETING: &str =
    "Hello! I'm your AI CSV Co-Pilot. Please upload a CSV file to begin.";

pub const FAILURE_REPLY: &str =
    "Sorry, I encountered an error trying to process your request. Please try again or ask a different question.";

/// Owns the transcript, the loaded table and the single-in-flight guard.
/// The transcript is append-only: turns are never mutated or removed, and
/// every `ask` appends exactly one user turn and one assistant turn.
pub struct Conversation {
    insight: InsightService,
    table: RwLock<Option<Table>>,
    transcript: RwLock<Vec<Turn>>,
    thinking: AtomicBool,
}

impl Conversation {
    pub fn new(insight: InsightService) -> Self {
        Self {
            insight,
            table: RwLock::new(None),
            transcript: RwLock::new(vec![Turn::assistant(GREETING, None)]),
            thinking: AtomicBool::new(false),
        }
    }

    pub fn transcript(&self) -> Vec<Turn> {
        self.transcript.read().clone()
    }

    pub fn is_thinking(&self) -> bool {
        self.thinking.load(Ordering::SeqCst)
    }

    pub fn has_table(&self) -> bool {
        self.table.read().is_some()
    }

    /// Stores a freshly parsed table and tells the user it is ready.
    pub fn load_table(&self, table: Table, file_name: &str) {
        *self.table.write() = Some(table);
        self.push(Turn::assistant(
            format!(
                "Successfully loaded \"{}\". You can now ask questions about your data.",
                file_name
            ),
            None,
        ));
    }

    /// Records a parse failure in the chat. The previously loaded table, if
    /// any, stays untouched.
    pub fn parse_failed(&self, message: &str) {
        self.push(Turn::assistant(
            format!("I couldn't parse that CSV. The error was: {}", message),
            None,
        ));
    }

    /// Asks one question about the loaded table.
    ///
    /// A missing or empty table, or a question already in flight, makes this
    /// a silent no-op: the transcript is left untouched. Otherwise the user
    /// turn is appended immediately, the model is queried, and exactly one
    /// assistant turn follows: the validated answer, or the fixed failure
    /// text with the underlying error kept to the logs. The thinking flag
    /// clears on every exit path.
    pub async fn ask(&self, question: &str) {
        let table = {
            let guard = self.table.read();
            match guard.as_ref() {
                Some(table) if !table.rows.is_empty() => table.clone(),
                _ => {
                    tracing::debug!("ask ignored: no table loaded");
                    return;
                }
            }
        };

        if self
            .thinking
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::debug!("ask ignored: a question is already in flight");
            return;
        }

        self.push(Turn::user(question));

        let reply = match self.insight.ask(question, &table).await {
            Ok(answer) => Turn::assistant(answer.text, answer.chart),
            Err(err) => {
                tracing::error!(error = %err, "insight query failed");
                Turn::assistant(FAILURE_REPLY, None)
            }
        };
        self.push(reply);

        self.thinking.store(false, Ordering::SeqCst);
    }

    fn push(&self, turn: Turn) {
        self.transcript.write().push(turn);
    }
}
