//! Per-document results, kept in submission order.

use schemars::JsonSchema;

use crate::{prelude::*, ui::Ui};

/// Output status of a document.
#[derive(Clone, Copy, Debug, JsonSchema, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WorkStatus {
    // Every OCR call succeeded.
    Ok,

    // Some chunks could not be OCRed.
    Incomplete,

    // We have no text at all.
    Failed,
}

/// The result of OCRing one document. Also the record type of our JSONL
/// output.
#[derive(Clone, Debug, JsonSchema, Serialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct DocumentResult {
    /// The zero-based position of this document in the batch.
    pub id: usize,

    /// The URL or path we read the document from.
    pub source: String,

    /// The base name used for output files.
    pub name: String,

    /// What is the status of this document?
    pub status: WorkStatus,

    /// Any errors that occurred during processing.
    pub errors: Vec<String>,

    /// The number of pages in the document, if we loaded it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_count: Option<usize>,

    /// How many chunks we submitted for OCR.
    pub chunk_count: usize,

    /// The extracted text. Chunks which failed are replaced by an error
    /// message.
    pub text: String,
}

/// An append-only list of results, in the order the documents were
/// submitted.
#[derive(Debug, Default)]
pub struct ResultStore {
    results: Vec<DocumentResult>,
}

impl ResultStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a result. Results must be pushed in submission order.
    pub fn push(&mut self, result: DocumentResult) {
        debug_assert_eq!(result.id, self.results.len(), "results pushed out of order");
        self.results.push(result);
    }

    /// How many results do we have?
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// Iterate over results in submission order.
    pub fn iter(&self) -> impl Iterator<Item = &DocumentResult> {
        self.results.iter()
    }

    /// Summarize the results for the user, and fail if too many documents
    /// could not be processed.
    pub fn finish(&self, ui: &Ui, allowed_failure_rate: f32) -> Result<()> {
        let total = self.results.len();
        let failure_count = self
            .results
            .iter()
            .filter(|r| r.status != WorkStatus::Ok)
            .count();
        let error_count = self.results.iter().map(|r| r.errors.len()).sum::<usize>();

        let failure_rate = if total == 0 {
            0.0
        } else {
            failure_count as f32 / total as f32
        };
        if failure_rate > allowed_failure_rate {
            return Err(anyhow!(
                "{}/{} ({:.2}%) of documents had failures, but only {:.2}% were allowed",
                failure_count,
                total,
                failure_rate * 100.0,
                allowed_failure_rate * 100.0
            ));
        }
        if error_count > 0 {
            ui.display_message("⚠️", &format!("{} errors encountered", error_count));
        }
        if failure_count > 0 {
            ui.display_message(
                "❌",
                &format!("{} documents could not be fully processed", failure_count),
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(id: usize, status: WorkStatus) -> DocumentResult {
        DocumentResult {
            id,
            source: format!("doc{id}.pdf"),
            name: format!("doc{id}"),
            status,
            errors: if status == WorkStatus::Ok {
                vec![]
            } else {
                vec!["boom".to_owned()]
            },
            page_count: None,
            chunk_count: 1,
            text: String::new(),
        }
    }

    #[test]
    fn results_keep_submission_order() {
        let mut store = ResultStore::new();
        for id in 0..3 {
            store.push(result(id, WorkStatus::Ok));
        }
        let ids = store.iter().map(|r| r.id).collect::<Vec<_>>();
        assert_eq!(ids, vec![0, 1, 2]);
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn finish_enforces_failure_rate() {
        let ui = Ui::init_for_tests();
        let mut store = ResultStore::new();
        store.push(result(0, WorkStatus::Ok));
        store.push(result(1, WorkStatus::Failed));
        assert!(store.finish(&ui, 0.01).is_err());
        assert!(store.finish(&ui, 0.5).is_ok());
    }

    #[test]
    fn empty_batches_succeed() {
        assert!(ResultStore::new().finish(&Ui::init_for_tests(), 0.0).is_ok());
    }

    #[test]
    fn records_serialize_with_snake_case_status() {
        let json = serde_json::to_value(result(4, WorkStatus::Incomplete)).unwrap();
        assert_eq!(json["status"], "incomplete");
        assert_eq!(json["id"], 4);
        assert!(json.get("page_count").is_none());
    }
}
