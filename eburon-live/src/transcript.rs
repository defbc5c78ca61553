//! Conversation transcript assembly.
//!
//! Transcription text arrives as fragments, interleaved across both sides of
//! the conversation. Fragments accumulate per speaker and become transcript
//! items only at a turn boundary, candidate side first, so one completed turn
//! reads question-then-answer regardless of fragment arrival order.

use chrono::{SecondsFormat, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Which side of the conversation produced a transcript item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranscriptRole {
    /// The human candidate (captured speech).
    User,
    /// The interviewer model (synthesized speech).
    Model,
}

/// One completed utterance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptItem {
    pub role: TranscriptRole,
    pub text: String,
    /// ISO-8601 timestamp of the turn boundary that flushed this item.
    pub timestamp: String,
}

#[derive(Default)]
struct Accumulators {
    input: String,
    output: String,
    items: Vec<TranscriptItem>,
}

/// Accumulates transcription fragments and flushes them on turn completion.
///
/// Shared between the dispatch task (writer) and the session surface
/// (snapshot reader), so all methods take `&self`.
#[derive(Default)]
pub struct TranscriptRecorder {
    state: Mutex<Accumulators>,
}

impl TranscriptRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fragment of the candidate's transcribed speech.
    pub fn push_input_fragment(&self, text: &str) {
        self.state.lock().input.push_str(text);
    }

    /// Append a fragment of the model's transcribed speech.
    pub fn push_output_fragment(&self, text: &str) {
        self.state.lock().output.push_str(text);
    }

    /// Turn boundary: flush the candidate accumulator first, then the model
    /// one. A side whose text is blank yields no item. Flushed text keeps
    /// its original whitespace; blankness is judged on the trimmed form.
    pub fn complete_turn(&self) {
        let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let mut st = self.state.lock();
        if !st.input.trim().is_empty() {
            let text = std::mem::take(&mut st.input);
            st.items.push(TranscriptItem {
                role: TranscriptRole::User,
                text,
                timestamp: timestamp.clone(),
            });
        } else {
            st.input.clear();
        }
        if !st.output.trim().is_empty() {
            let text = std::mem::take(&mut st.output);
            st.items.push(TranscriptItem {
                role: TranscriptRole::Model,
                text,
                timestamp,
            });
        } else {
            st.output.clear();
        }
    }

    /// Completed items so far. Fragments still inside an open turn are not
    /// included; they surface only once their turn completes.
    pub fn snapshot(&self) -> Vec<TranscriptItem> {
        self.state.lock().items.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;

    #[test]
    fn empty_turn_produces_no_items() {
        let recorder = TranscriptRecorder::new();
        recorder.complete_turn();
        assert!(recorder.snapshot().is_empty());
    }

    #[test]
    fn model_only_turn_produces_one_model_item() {
        let recorder = TranscriptRecorder::new();
        recorder.push_output_fragment("Tell me about yourself.");
        recorder.complete_turn();

        let items = recorder.snapshot();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].role, TranscriptRole::Model);
        assert_eq!(items[0].text, "Tell me about yourself.");
    }

    #[test]
    fn candidate_precedes_model_within_one_turn() {
        let recorder = TranscriptRecorder::new();
        recorder.push_output_fragment("I see. And your current role?");
        recorder.push_input_fragment("I work on distributed storage.");
        recorder.complete_turn();

        let items = recorder.snapshot();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].role, TranscriptRole::User);
        assert_eq!(items[1].role, TranscriptRole::Model);
    }

    #[test]
    fn fragments_concatenate_in_arrival_order() {
        let recorder = TranscriptRecorder::new();
        recorder.push_input_fragment("I have ");
        recorder.push_input_fragment("five years ");
        recorder.push_input_fragment("of experience.");
        recorder.complete_turn();

        assert_eq!(recorder.snapshot()[0].text, "I have five years of experience.");
    }

    #[test]
    fn flushed_text_keeps_leading_and_trailing_whitespace() {
        let recorder = TranscriptRecorder::new();
        recorder.push_input_fragment("  spaced out  ");
        recorder.complete_turn();

        assert_eq!(recorder.snapshot()[0].text, "  spaced out  ");
    }

    #[test]
    fn whitespace_only_accumulator_is_dropped_and_cleared() {
        let recorder = TranscriptRecorder::new();
        recorder.push_input_fragment("   \n\t");
        recorder.complete_turn();
        assert!(recorder.snapshot().is_empty());

        // The blank text must not leak into the next turn.
        recorder.push_input_fragment("real words");
        recorder.complete_turn();
        assert_eq!(recorder.snapshot()[0].text, "real words");
    }

    #[test]
    fn open_turn_fragments_stay_out_of_the_snapshot() {
        let recorder = TranscriptRecorder::new();
        recorder.push_input_fragment("not yet flushed");
        assert!(recorder.snapshot().is_empty());
    }

    #[test]
    fn turns_accumulate_across_the_session() {
        let recorder = TranscriptRecorder::new();
        recorder.push_output_fragment("Welcome.");
        recorder.complete_turn();
        recorder.push_input_fragment("Thanks.");
        recorder.push_output_fragment("Let's begin.");
        recorder.complete_turn();

        let roles: Vec<TranscriptRole> = recorder.snapshot().iter().map(|i| i.role).collect();
        assert_eq!(
            roles,
            vec![
                TranscriptRole::Model,
                TranscriptRole::User,
                TranscriptRole::Model
            ]
        );
    }

    #[test]
    fn timestamps_are_iso_8601() {
        let recorder = TranscriptRecorder::new();
        recorder.push_input_fragment("hello");
        recorder.complete_turn();

        let items = recorder.snapshot();
        assert!(DateTime::parse_from_rfc3339(&items[0].timestamp).is_ok());
        assert!(items[0].timestamp.ends_with('Z'));
    }

    #[test]
    fn item_serialization_uses_wire_casing() {
        let item = TranscriptItem {
            role: TranscriptRole::User,
            text: "hi".to_string(),
            timestamp: "2026-08-24T10:00:00.000Z".to_string(),
        };
        let json = serde_json::to_value(&item).expect("serialize");
        assert_eq!(json["role"], "user");
        assert_eq!(json["timestamp"], "2026-08-24T10:00:00.000Z");

        let back: TranscriptItem =
            serde_json::from_value(json).expect("deserialize");
        assert_eq!(back, item);
    }
}
