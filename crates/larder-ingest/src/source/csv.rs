//! CSV file source
//!
//! Reads recipe exports with a header row. Column names are matched
//! case-insensitively against a set of aliases; only a title column is
//! required.

use async_trait::async_trait;
use csv_async::{AsyncReader, AsyncReaderBuilder, ByteRecord, StringRecord, Trim};
use std::path::Path;
use tokio::fs::File;
use tracing::debug;

use super::{RawRow, RecipeSource, RowReader, SourceDescriptor, SourceError};

const TITLE: &[&str] = &["title", "name", "recipe_name", "recipe"];
const DESCRIPTION: &[&str] = &["description", "summary"];
const INGREDIENTS: &[&str] = &["ingredients", "ingredient_lines", "ner"];
const INSTRUCTIONS: &[&str] = &["instructions", "directions", "steps", "method"];
const COOK_TIME: &[&str] = &["cook_time", "cooking_time", "minutes", "total_time"];
const SERVINGS: &[&str] = &["servings", "serves", "yield"];

/// Column positions resolved from the header row
#[derive(Debug, Clone, Copy)]
struct Columns {
    title: usize,
    description: Option<usize>,
    ingredients: Option<usize>,
    instructions: Option<usize>,
    cook_time: Option<usize>,
    servings: Option<usize>,
}

impl Columns {
    fn from_headers(headers: &StringRecord) -> Result<Self, SourceError> {
        let names: Vec<String> = headers
            .iter()
            .map(|h| h.trim().trim_start_matches('\u{feff}').to_lowercase())
            .collect();
        let find = |aliases: &[&str]| aliases.iter().find_map(|a| names.iter().position(|n| n == a));

        let title = find(TITLE).ok_or_else(|| {
            SourceError::Schema(format!(
                "no title column (expected one of: {}; found: {})",
                TITLE.join(", "),
                names.join(", ")
            ))
        })?;

        Ok(Self {
            title,
            description: find(DESCRIPTION),
            ingredients: find(INGREDIENTS),
            instructions: find(INSTRUCTIONS),
            cook_time: find(COOK_TIME),
            servings: find(SERVINGS),
        })
    }

    fn row(&self, record_number: u64, record: &StringRecord) -> RawRow {
        let field = |idx: Option<usize>| {
            idx.and_then(|i| record.get(i))
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
        };

        RawRow {
            record_number,
            title: field(Some(self.title)),
            description: field(self.description),
            ingredients: field(self.ingredients),
            instructions: field(self.instructions),
            cook_time: field(self.cook_time),
            servings: field(self.servings),
        }
    }
}

fn open_error(descriptor: &SourceDescriptor, source: std::io::Error) -> SourceError {
    SourceError::Open {
        location: descriptor.location().to_string(),
        source,
    }
}

fn is_io(err: &csv_async::Error) -> bool {
    matches!(err.kind(), csv_async::ErrorKind::Io(_))
}

fn classify(record: u64, err: csv_async::Error) -> SourceError {
    if is_io(&err) {
        return SourceError::Io(std::io::Error::other(err.to_string()));
    }
    SourceError::Record {
        record,
        message: err.to_string(),
    }
}

fn builder() -> AsyncReaderBuilder {
    let mut builder = AsyncReaderBuilder::new();
    builder.flexible(true).trim(Trim::All);
    builder
}

/// Reads recipes from CSV files on disk
#[derive(Debug, Clone)]
pub struct CsvFileSource {
    count_threshold_bytes: u64,
}

impl CsvFileSource {
    /// Files up to `count_threshold_bytes` are pre-scanned for a row count
    pub fn new(count_threshold_bytes: u64) -> Self {
        Self {
            count_threshold_bytes,
        }
    }

    async fn open_reader(
        descriptor: &SourceDescriptor,
    ) -> Result<(AsyncReader<File>, Columns), SourceError> {
        let path = Path::new(descriptor.location());
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| open_error(descriptor, e))?;
        if !metadata.is_file() {
            return Err(open_error(
                descriptor,
                std::io::Error::new(std::io::ErrorKind::InvalidInput, "not a regular file"),
            ));
        }

        let file = File::open(path).await.map_err(|e| open_error(descriptor, e))?;
        let mut reader = builder().create_reader(file);
        let headers = reader
            .headers()
            .await
            .map_err(|e| SourceError::Schema(e.to_string()))?
            .clone();
        let columns = Columns::from_headers(&headers)?;
        Ok((reader, columns))
    }

    /// Count data records without decoding them
    async fn count_records(&self, descriptor: &SourceDescriptor) -> Option<u64> {
        let path = Path::new(descriptor.location());
        let len = tokio::fs::metadata(path).await.ok()?.len();
        if len > self.count_threshold_bytes {
            debug!(bytes = len, "Source too large to pre-count");
            return None;
        }

        let file = File::open(path).await.ok()?;
        let mut reader = builder().create_reader(file);
        let mut record = ByteRecord::new();
        let mut count = 0u64;
        loop {
            match reader.read_byte_record(&mut record).await {
                Ok(true) => count += 1,
                Ok(false) => return Some(count),
                Err(e) if is_io(&e) => return None,
                Err(_) => count += 1,
            }
        }
    }
}

#[async_trait]
impl RecipeSource for CsvFileSource {
    async fn probe(&self, descriptor: &SourceDescriptor) -> Result<(), SourceError> {
        Self::open_reader(descriptor).await.map(|_| ())
    }

    async fn open(&self, descriptor: &SourceDescriptor) -> Result<Box<dyn RowReader>, SourceError> {
        let total = self.count_records(descriptor).await;
        let (reader, columns) = Self::open_reader(descriptor).await?;

        Ok(Box::new(CsvRowReader {
            reader,
            columns,
            record: StringRecord::new(),
            next_record: 1,
            total,
            done: false,
        }))
    }
}

struct CsvRowReader {
    reader: AsyncReader<File>,
    columns: Columns,
    record: StringRecord,
    next_record: u64,
    total: Option<u64>,
    done: bool,
}

#[async_trait]
impl RowReader for CsvRowReader {
    fn total_hint(&self) -> Option<u64> {
        self.total
    }

    async fn next_row(&mut self) -> Option<Result<RawRow, SourceError>> {
        if self.done {
            return None;
        }

        let record_number = self.next_record;
        match self.reader.read_record(&mut self.record).await {
            Ok(true) => {
                self.next_record += 1;
                Some(Ok(self.columns.row(record_number, &self.record)))
            },
            Ok(false) => {
                self.done = true;
                None
            },
            Err(e) => {
                let err = classify(record_number, e);
                if err.is_row_level() {
                    self.next_record += 1;
                } else {
                    self.done = true;
                }
                Some(Err(err))
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn csv_file(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    fn descriptor(file: &NamedTempFile) -> SourceDescriptor {
        SourceDescriptor::new(file.path().to_string_lossy())
    }

    async fn drain(reader: &mut Box<dyn RowReader>) -> Vec<Result<RawRow, SourceError>> {
        let mut rows = Vec::new();
        while let Some(row) = reader.next_row().await {
            rows.push(row);
        }
        rows
    }

    #[tokio::test]
    async fn test_reads_rows_with_aliases() {
        let file = csv_file(
            "Name,Summary,Ingredients,Directions,Minutes,Serves\n\
             Pancakes,Fluffy,\"['1 cup flour', '2 eggs']\",Mix. Fry.,20,4\n\
             Toast,,,,,\n",
        );
        let source = CsvFileSource::new(1024 * 1024);

        let mut reader = source.open(&descriptor(&file)).await.unwrap();
        assert_eq!(reader.total_hint(), Some(2));

        let rows = drain(&mut reader).await;
        assert_eq!(rows.len(), 2);

        let first = rows[0].as_ref().unwrap();
        assert_eq!(first.record_number, 1);
        assert_eq!(first.title.as_deref(), Some("Pancakes"));
        assert_eq!(first.description.as_deref(), Some("Fluffy"));
        assert_eq!(first.ingredients.as_deref(), Some("['1 cup flour', '2 eggs']"));
        assert_eq!(first.cook_time.as_deref(), Some("20"));
        assert_eq!(first.servings.as_deref(), Some("4"));

        let second = rows[1].as_ref().unwrap();
        assert_eq!(second.record_number, 2);
        assert_eq!(second.ingredients, None);
        assert_eq!(second.instructions, None);
    }

    #[tokio::test]
    async fn test_short_rows_are_tolerated() {
        let file = csv_file("title,ingredients,instructions\nSoup\n");
        let source = CsvFileSource::new(1024);

        let mut reader = source.open(&descriptor(&file)).await.unwrap();
        let rows = drain(&mut reader).await;
        let row = rows[0].as_ref().unwrap();
        assert_eq!(row.title.as_deref(), Some("Soup"));
        assert_eq!(row.ingredients, None);
    }

    #[tokio::test]
    async fn test_large_file_has_no_total() {
        let file = csv_file("title\nSoup\nStew\n");
        let source = CsvFileSource::new(4);

        let reader = source.open(&descriptor(&file)).await.unwrap();
        assert_eq!(reader.total_hint(), None);
    }

    #[tokio::test]
    async fn test_missing_title_column_is_schema_error() {
        let file = csv_file("dish,ingredients\nSoup,\n");
        let source = CsvFileSource::new(1024);

        let err = source.probe(&descriptor(&file)).await.unwrap_err();
        assert!(matches!(err, SourceError::Schema(_)));
    }

    #[tokio::test]
    async fn test_missing_file_fails_probe() {
        let source = CsvFileSource::new(1024);
        let err = source
            .probe(&SourceDescriptor::new("/nonexistent/recipes.csv"))
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::Open { .. }));
        assert!(!err.is_row_level());
    }

    #[tokio::test]
    async fn test_directory_fails_probe() {
        let dir = tempfile::tempdir().unwrap();
        let source = CsvFileSource::new(1024);
        let err = source
            .probe(&SourceDescriptor::new(dir.path().to_string_lossy()))
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::Open { .. }));
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_row_level() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"title\nGood\nBad \xff\xfe\nAlso good\n").unwrap();
        file.flush().unwrap();
        let source = CsvFileSource::new(1024);

        let mut reader = source.open(&descriptor(&file)).await.unwrap();
        assert_eq!(reader.total_hint(), Some(3));
        let rows = drain(&mut reader).await;

        assert_eq!(rows.len(), 3);
        assert!(rows[0].is_ok());
        assert!(matches!(
            rows[1],
            Err(SourceError::Record { record: 2, .. })
        ));
        assert_eq!(rows[2].as_ref().unwrap().record_number, 3);
    }
}
