//! Operation sequences: the ordered list of remote operations applied to
//! every admitted input file.
//!
//! A sequence is read once, validated once, and then shared read-only by
//! every file's pipeline. Validation runs before any file is touched, so a
//! rejected sequence never produces partial output.

use crate::error::SequencerError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;
use tracing::debug;

/// Operations the sequencer refuses regardless of parameters.
pub const UNSUPPORTED_OPERATIONS: &[&str] = &[
    "splitpdf",
    "documentgeneration",
    "electronicseal",
    "combinepdf",
    "pagemanipulation",
];

pub const CREATE_PDF: &str = "createpdf";
pub const HTML_TO_PDF: &str = "htmltopdf";
pub const PROTECT_PDF: &str = "protectpdf";
pub const PDF_PROPERTIES: &str = "pdfproperties";

/// Operations whose result is saved as-is instead of feeding the next step.
pub const TERMINAL_SHAPE_OPERATIONS: &[&str] = &["extractpdf", PDF_PROPERTIES, "pdftoimages"];

/// One named operation with its per-step request parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationStep {
    pub operation: String,
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

impl OperationStep {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            parameters: Map::new(),
        }
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: Value) -> Self {
        self.parameters.insert(key.into(), value);
        self
    }

    /// Whether this step's result is consumed directly as an artifact.
    pub fn is_terminal_shape(&self) -> bool {
        TERMINAL_SHAPE_OPERATIONS.contains(&self.operation.as_str())
    }

    /// Whether this step only returns metadata (no downloadable asset).
    pub fn is_properties(&self) -> bool {
        self.operation == PDF_PROPERTIES
    }

    pub fn is_create_pdf(&self) -> bool {
        self.operation == CREATE_PDF
    }
}

/// A validated, non-empty, ordered list of [`OperationStep`]s.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sequence {
    steps: Vec<OperationStep>,
}

impl Sequence {
    /// Read, parse and validate a sequence file.
    pub fn load(path: &Path) -> Result<Self, SequencerError> {
        let text = std::fs::read_to_string(path).map_err(|source| {
            SequencerError::SequenceUnreadable {
                path: path.to_path_buf(),
                source,
            }
        })?;
        Self::parse(&text)
    }

    /// Parse and validate sequence JSON.
    pub fn parse(json: &str) -> Result<Self, SequencerError> {
        let value: Value =
            serde_json::from_str(json).map_err(|e| SequencerError::SequenceMalformed {
                detail: e.to_string(),
            })?;
        Self::from_value(value)
    }

    /// Build a sequence from an already-parsed JSON value.
    pub fn from_value(value: Value) -> Result<Self, SequencerError> {
        let items = match value {
            Value::Array(items) => items,
            _ => return Err(SequencerError::SequenceNotArray),
        };

        let steps = items
            .into_iter()
            .enumerate()
            .map(|(i, item)| {
                serde_json::from_value::<OperationStep>(item).map_err(|e| {
                    SequencerError::SequenceMalformed {
                        detail: format!("step {}: {}", i + 1, e),
                    }
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Self::new(steps)
    }

    /// Wrap steps into a sequence after validating them.
    pub fn new(steps: Vec<OperationStep>) -> Result<Self, SequencerError> {
        let sequence = Self { steps };
        sequence.validate()?;
        debug!("Sequence accepted: {}", sequence.describe());
        Ok(sequence)
    }

    /// Reject empty sequences, unsupported operations and unsafe parameter
    /// combinations.
    pub fn validate(&self) -> Result<(), SequencerError> {
        if self.steps.is_empty() {
            return Err(SequencerError::SequenceEmpty);
        }
        for step in &self.steps {
            if UNSUPPORTED_OPERATIONS.contains(&step.operation.as_str()) {
                return Err(SequencerError::UnsupportedOperation {
                    operation: step.operation.clone(),
                });
            }
            if step.operation == HTML_TO_PDF && step.parameters.contains_key("inputUrl") {
                return Err(SequencerError::UnsupportedParameter {
                    operation: step.operation.clone(),
                    parameter: "inputUrl".to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn steps(&self) -> &[OperationStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// The first step decides whether input pre-filtering applies to the run.
    pub fn first(&self) -> &OperationStep {
        &self.steps[0]
    }

    pub fn starts_with_create_pdf(&self) -> bool {
        self.first().is_create_pdf()
    }

    pub fn contains_create_pdf(&self) -> bool {
        self.steps.iter().any(OperationStep::is_create_pdf)
    }

    /// `createpdf → ocrpdf → protectpdf`
    pub fn describe(&self) -> String {
        self.steps
            .iter()
            .map(|s| s.operation.as_str())
            .collect::<Vec<_>>()
            .join(" → ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_steps_with_and_without_parameters() {
        let seq = Sequence::parse(
            r#"[{"operation":"createpdf"},{"operation":"ocrpdf","parameters":{"ocrLang":"en-US"}}]"#,
        )
        .unwrap();
        assert_eq!(seq.len(), 2);
        assert!(seq.steps()[0].parameters.is_empty());
        assert_eq!(seq.steps()[1].parameters["ocrLang"], json!("en-US"));
        assert!(seq.starts_with_create_pdf());
    }

    #[test]
    fn rejects_non_array() {
        let err = Sequence::parse(r#"{"operation":"ocrpdf"}"#).unwrap_err();
        assert!(matches!(err, SequencerError::SequenceNotArray));
    }

    #[test]
    fn rejects_invalid_json() {
        let err = Sequence::parse("[{").unwrap_err();
        assert!(matches!(err, SequencerError::SequenceMalformed { .. }));
    }

    #[test]
    fn rejects_step_without_operation() {
        let err = Sequence::parse(r#"[{"parameters":{}}]"#).unwrap_err();
        assert!(err.to_string().contains("step 1"), "got: {err}");
    }

    #[test]
    fn rejects_empty_array() {
        assert!(matches!(
            Sequence::parse("[]").unwrap_err(),
            SequencerError::SequenceEmpty
        ));
    }

    #[test]
    fn rejects_every_unsupported_operation() {
        for op in UNSUPPORTED_OPERATIONS {
            let json = format!(r#"[{{"operation":"ocrpdf"}},{{"operation":"{op}"}}]"#);
            match Sequence::parse(&json).unwrap_err() {
                SequencerError::UnsupportedOperation { operation } => assert_eq!(operation, *op),
                other => panic!("unexpected error for {op}: {other}"),
            }
        }
    }

    #[test]
    fn rejects_html_with_remote_url() {
        let err = Sequence::parse(
            r#"[{"operation":"htmltopdf","parameters":{"inputUrl":"https://example.com"}}]"#,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            SequencerError::UnsupportedParameter { ref parameter, .. } if parameter == "inputUrl"
        ));
    }

    #[test]
    fn accepts_html_without_remote_url() {
        let seq = Sequence::parse(
            r#"[{"operation":"htmltopdf","parameters":{"pageLayout":{"pageWidth":8.5}}}]"#,
        )
        .unwrap();
        assert_eq!(seq.first().operation, "htmltopdf");
    }

    #[test]
    fn terminal_shape_classification() {
        assert!(OperationStep::new("pdftoimages").is_terminal_shape());
        assert!(OperationStep::new("pdfproperties").is_properties());
        assert!(!OperationStep::new("ocrpdf").is_terminal_shape());
    }

    #[test]
    fn describe_joins_operations() {
        let seq = Sequence::new(vec![
            OperationStep::new("createpdf"),
            OperationStep::new("ocrpdf"),
        ])
        .unwrap();
        assert_eq!(seq.describe(), "createpdf → ocrpdf");
    }
}
