use chrono::{DateTime, Local};
use serde_json::{Map, Value};

pub const IMAGE_PATH_COLUMN: &str = "image_path";
pub const EXTRACTED_TIME_COLUMN: &str = "extracted_time";

/// Fields the model extracted from one still, plus where and when.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionRecord {
    fields: Map<String, Value>,
    pub image_path: String,
    pub extracted_time: String,
}

impl ExtractionRecord {
    /// Metadata keys win over same-named model fields.
    pub fn new(
        mut fields: Map<String, Value>,
        image_path: String,
        extracted_at: DateTime<Local>,
    ) -> Self {
        fields.remove(IMAGE_PATH_COLUMN);
        fields.remove(EXTRACTED_TIME_COLUMN);
        Self {
            fields,
            image_path,
            extracted_time: extracted_at.to_rfc3339(),
        }
    }

    /// Column names in model output order, metadata last.
    pub fn columns(&self) -> Vec<String> {
        self.fields
            .keys()
            .cloned()
            .chain([IMAGE_PATH_COLUMN.to_string(), EXTRACTED_TIME_COLUMN.to_string()])
            .collect()
    }

    /// Cell text for `column`; `None` when the record has no such field.
    pub fn cell(&self, column: &str) -> Option<String> {
        match column {
            IMAGE_PATH_COLUMN => Some(self.image_path.clone()),
            EXTRACTED_TIME_COLUMN => Some(self.extracted_time.clone()),
            _ => self.fields.get(column).map(render_value),
        }
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
