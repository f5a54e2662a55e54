use redlabel_core::{CoreError, ExportError, Record, RecordSchema};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::{debug, info};

/// Writes records as UTF-8 CSV in the column order of a declared schema.
#[derive(Debug, Clone)]
pub struct CsvExporter {
    schema: RecordSchema,
}

impl CsvExporter {
    pub fn new(schema: RecordSchema) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &RecordSchema {
        &self.schema
    }

    /// Write `records` to `path`, replacing any existing file. Missing parent
    /// directories are created. Returns the number of data rows written.
    pub fn export(&self, path: &Path, records: &[Record]) -> Result<usize, CoreError> {
        if self.schema.is_empty() {
            return Err(ExportError::EmptySchema.into());
        }

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| ExportError::CreateFailed {
                path: parent.display().to_string(),
                reason: e.to_string(),
            })?;
        }

        let file = File::create(path).map_err(|e| ExportError::CreateFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        let written = self.write_to(BufWriter::new(file), records)?;
        info!("Exported {} records to {}", written, path.display());
        Ok(written)
    }

    /// Write the header and one row per record to any writer.
    pub fn write_to<W: Write>(&self, writer: W, records: &[Record]) -> Result<usize, CoreError> {
        if self.schema.is_empty() {
            return Err(ExportError::EmptySchema.into());
        }

        let mut csv_writer = csv::Writer::from_writer(writer);
        csv_writer
            .write_record(self.schema.headers())
            .map_err(ExportError::from)?;

        for record in records {
            csv_writer
                .write_record(self.schema.row(record))
                .map_err(ExportError::from)?;
        }
        csv_writer.flush()?;

        if records.is_empty() {
            debug!("No records to export, wrote header only");
        }
        Ok(records.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use redlabel_core::{Column, Field};

    fn record(text: &str, label: Option<&str>) -> Record {
        Record {
            text: text.to_string(),
            subreddit: "worldnews".to_string(),
            post_title: "A title".to_string(),
            url: "https://example.com/a".to_string(),
            submission_id: "abc123".to_string(),
            label: label.map(str::to_string),
        }
    }

    fn to_string(exporter: &CsvExporter, records: &[Record]) -> String {
        let mut buffer = Vec::new();
        exporter.write_to(&mut buffer, records).unwrap();
        String::from_utf8(buffer).unwrap()
    }

    #[test]
    fn test_header_only_for_empty_input() {
        let exporter = CsvExporter::new(RecordSchema::from_fields(&[Field::Text, Field::Label]));
        assert_eq!(to_string(&exporter, &[]), "text,label\n");
    }

    #[test]
    fn test_columns_follow_schema_order() {
        let exporter = CsvExporter::new(RecordSchema::new(vec![
            Column::new(Field::SubmissionId),
            Column::renamed(Field::Text, "comment_body"),
            Column::new(Field::Label),
        ]));
        let output = to_string(&exporter, &[record("hello", Some("with israel"))]);
        assert_eq!(output, "submission_id,comment_body,label\nabc123,hello,with israel\n");
    }

    #[test]
    fn test_missing_label_is_empty_cell() {
        let exporter = CsvExporter::new(RecordSchema::from_fields(&[Field::Text, Field::Label]));
        assert_eq!(to_string(&exporter, &[record("plain", None)]), "text,label\nplain,\n");
    }

    #[test]
    fn test_empty_schema_rejected() {
        let exporter = CsvExporter::new(RecordSchema::new(Vec::new()));
        let result = exporter.write_to(Vec::new(), &[record("x", None)]);
        assert!(matches!(result, Err(CoreError::Export(ExportError::EmptySchema))));
    }
}
