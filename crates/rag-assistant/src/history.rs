//! Chat history with export and summary statistics

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::types::AskResponse;

/// Turns kept before the oldest are dropped
pub const DEFAULT_MAX_TURNS: usize = 100;

/// One question and its answer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub question: String,
    pub answer: String,
    pub sources: Vec<String>,
    pub confidence: usize,
    pub timestamp: DateTime<Utc>,
    pub processing_time_ms: u64,
    #[serde(default)]
    pub error: bool,
}

impl From<&AskResponse> for ConversationTurn {
    fn from(response: &AskResponse) -> Self {
        Self {
            question: response.question.clone(),
            answer: response.answer.clone(),
            sources: response.sources.clone(),
            confidence: response.confidence,
            timestamp: response.timestamp,
            processing_time_ms: response.processing_time_ms,
            error: response.error,
        }
    }
}

/// Export format for the chat history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Json,
    Text,
    Csv,
}

impl ExportFormat {
    /// Conventional file extension
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Text => "txt",
            Self::Csv => "csv",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "txt" | "text" => Ok(Self::Text),
            "csv" => Ok(Self::Csv),
            other => Err(Error::validation(format!(
                "Unsupported export format '{}' (expected json, txt or csv)",
                other
            ))),
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Summary of a chat history
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryStats {
    pub total_turns: usize,
    /// Mean answer length in characters, rounded
    pub avg_answer_chars: usize,
    /// Hour of day (UTC) with the most questions
    pub most_common_hour: Option<u32>,
    pub total_sources: usize,
    pub failed_turns: usize,
}

/// Bounded, append-only conversation log
#[derive(Debug, Clone)]
pub struct ChatHistory {
    turns: VecDeque<ConversationTurn>,
    max_turns: usize,
}

impl Default for ChatHistory {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_TURNS)
    }
}

impl ChatHistory {
    pub fn new(max_turns: usize) -> Self {
        Self {
            turns: VecDeque::new(),
            max_turns: max_turns.max(1),
        }
    }

    /// Append a turn, dropping the oldest beyond the limit
    pub fn push(&mut self, turn: ConversationTurn) {
        self.turns.push_back(turn);
        while self.turns.len() > self.max_turns {
            self.turns.pop_front();
        }
    }

    pub fn record(&mut self, response: &AskResponse) {
        self.push(ConversationTurn::from(response));
    }

    pub fn turns(&self) -> impl Iterator<Item = &ConversationTurn> {
        self.turns.iter()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    /// Render the history in `format`
    pub fn export(&self, format: ExportFormat) -> Result<String> {
        match format {
            ExportFormat::Json => Ok(serde_json::to_string_pretty(&self.turns)?),
            ExportFormat::Text => Ok(self.export_text()),
            ExportFormat::Csv => self.export_csv(),
        }
    }

    fn export_text(&self) -> String {
        let mut out = String::new();
        for (i, turn) in self.turns.iter().enumerate() {
            out.push_str(&format!("=== Conversation {} ===\n", i + 1));
            out.push_str(&format!(
                "Date: {}\n",
                turn.timestamp.format("%Y-%m-%d %H:%M:%S")
            ));
            out.push_str(&format!("Question: {}\n", turn.question));
            out.push_str(&format!("Answer: {}\n", turn.answer));
            if !turn.sources.is_empty() {
                out.push_str("Sources:\n");
                for source in &turn.sources {
                    out.push_str(&format!("  - {}\n", source));
                }
            }
            out.push('\n');
        }
        out
    }

    fn export_csv(&self) -> Result<String> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        let to_error = |e: csv::Error| Error::internal(format!("CSV export failed: {}", e));

        writer
            .write_record([
                "timestamp",
                "question",
                "answer",
                "sources",
                "confidence",
                "processing_time_ms",
                "error",
            ])
            .map_err(to_error)?;

        for turn in &self.turns {
            writer
                .write_record([
                    turn.timestamp.to_rfc3339(),
                    turn.question.clone(),
                    turn.answer.clone(),
                    turn.sources.join("; "),
                    turn.confidence.to_string(),
                    turn.processing_time_ms.to_string(),
                    turn.error.to_string(),
                ])
                .map_err(to_error)?;
        }

        let bytes = writer
            .into_inner()
            .map_err(|e| Error::internal(format!("CSV export failed: {}", e)))?;
        String::from_utf8(bytes).map_err(|e| Error::internal(format!("CSV export failed: {}", e)))
    }

    /// Summary statistics
    pub fn statistics(&self) -> HistoryStats {
        if self.turns.is_empty() {
            return HistoryStats::default();
        }

        let total_turns = self.turns.len();
        let answer_chars: usize = self.turns.iter().map(|t| t.answer.chars().count()).sum();

        let mut hours: HashMap<u32, usize> = HashMap::new();
        for turn in &self.turns {
            *hours.entry(turn.timestamp.hour()).or_default() += 1;
        }
        // Ties go to the earlier hour
        let most_common_hour = hours
            .into_iter()
            .max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(&a.0)))
            .map(|(hour, _)| hour);

        HistoryStats {
            total_turns,
            avg_answer_chars: (answer_chars as f64 / total_turns as f64).round() as usize,
            most_common_hour,
            total_sources: self.turns.iter().map(|t| t.sources.len()).sum(),
            failed_turns: self.turns.iter().filter(|t| t.error).count(),
        }
    }
}
