use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use csv::StringRecord;

use super::catalog::QuestionCatalog;
use super::domain::{
    format_timestamp, parse_timestamp, ApplicationRecord, ApplicationStatus, RecordAnswer, UserId,
};
use super::repository::{
    check_transition, select_for_applicant, ApplicationRepository, RepositoryError,
};

pub const USERNAME_COLUMN: &str = "Username";
pub const PLATFORM_USERNAME_COLUMN: &str = "Discord Username";
pub const APPLICANT_ID_COLUMN: &str = "User ID";
pub const STATUS_COLUMN: &str = "Status";
pub const TIMESTAMP_COLUMN: &str = "Timestamp";
pub const DURATION_COLUMN: &str = "Duration";

/// Flat-file application store:
/// `Username, <question columns>, Discord Username, User ID, Status, Timestamp, Duration`.
///
/// Rows are appended; a status change rewrites the whole file through a sibling temp file.
/// Every operation runs under one lock so concurrent writers cannot lose updates.
#[derive(Debug)]
pub struct CsvApplicationRepository {
    path: PathBuf,
    header: Vec<String>,
    lock: Mutex<()>,
}

impl CsvApplicationRepository {
    pub fn new(path: impl Into<PathBuf>, catalog: &QuestionCatalog) -> Self {
        Self::with_question_columns(path, catalog.column_headers())
    }

    pub fn with_question_columns(path: impl Into<PathBuf>, question_columns: Vec<String>) -> Self {
        let mut header = Vec::with_capacity(question_columns.len() + 6);
        header.push(USERNAME_COLUMN.to_string());
        header.extend(question_columns);
        header.extend(
            [
                PLATFORM_USERNAME_COLUMN,
                APPLICANT_ID_COLUMN,
                STATUS_COLUMN,
                TIMESTAMP_COLUMN,
                DURATION_COLUMN,
            ]
            .map(str::to_string),
        );

        Self {
            path: path.into(),
            header,
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn header(&self) -> &[String] {
        &self.header
    }

    fn guard(&self) -> Result<MutexGuard<'_, ()>, RepositoryError> {
        self.lock
            .lock()
            .map_err(|_| RepositoryError::Unavailable("application store lock poisoned".to_string()))
    }

    fn read_table(&self) -> Result<Table, RepositoryError> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Table::default()),
            Err(err) => return Err(err.into()),
        };

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(BufReader::new(file));
        let headers = reader.headers()?.clone();
        if headers.is_empty() {
            return Ok(Table::default());
        }

        let layout = Layout::from_headers(&headers)?;
        let rows = reader.records().collect::<Result<Vec<_>, _>>()?;

        Ok(Table {
            header: Some((headers, layout)),
            rows,
        })
    }

    fn row_for(&self, record: &ApplicationRecord) -> Result<Vec<String>, RepositoryError> {
        let question_columns = self.header.len() - 6;
        if record.answers.len() != question_columns {
            return Err(RepositoryError::SchemaMismatch);
        }

        let mut row = Vec::with_capacity(self.header.len());
        row.push(record.applicant_username.clone());
        row.extend(record.answers.iter().map(|entry| entry.answer.clone()));
        row.push(record.platform_username.clone());
        row.push(record.applicant_id.to_string());
        row.push(record.status.label().to_string());
        row.push(format_timestamp(&record.submitted_at));
        row.push(record.fill_duration_seconds.to_string());
        Ok(row)
    }

    fn rewrite(&self, headers: &StringRecord, rows: &[StringRecord]) -> Result<(), RepositoryError> {
        let mut staging = OsString::from(self.path.as_os_str());
        staging.push(".tmp");
        let staging = PathBuf::from(staging);

        {
            let mut writer = csv::Writer::from_path(&staging)?;
            writer.write_record(headers)?;
            for row in rows {
                writer.write_record(row)?;
            }
            writer.flush()?;
        }

        fs::rename(&staging, &self.path)?;
        Ok(())
    }
}

impl ApplicationRepository for CsvApplicationRepository {
    fn append(&self, record: ApplicationRecord) -> Result<ApplicationRecord, RepositoryError> {
        let _guard = self.guard()?;
        let table = self.read_table()?;

        if let Some((headers, _)) = &table.header {
            if headers.iter().ne(self.header.iter().map(String::as_str)) {
                return Err(RepositoryError::SchemaMismatch);
            }
        }
        if table.open_row(record.applicant_id).is_some() {
            return Err(RepositoryError::DuplicateApplicant(record.applicant_id));
        }

        let row = self.row_for(&record)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        if table.header.is_none() {
            writer.write_record(&self.header)?;
        }
        writer.write_record(&row)?;
        writer.flush()?;

        Ok(record)
    }

    fn list_all(&self) -> Result<Vec<ApplicationRecord>, RepositoryError> {
        let _guard = self.guard()?;
        self.read_table()?.records()
    }

    fn list_by_status(
        &self,
        status: ApplicationStatus,
    ) -> Result<Vec<ApplicationRecord>, RepositoryError> {
        let _guard = self.guard()?;
        let records = self.read_table()?.records()?;
        Ok(records
            .into_iter()
            .filter(|record| record.status == status)
            .collect())
    }

    fn fetch(&self, applicant: UserId) -> Result<Option<ApplicationRecord>, RepositoryError> {
        let _guard = self.guard()?;
        let records = self.read_table()?.records()?;
        Ok(select_for_applicant(records.iter(), applicant).cloned())
    }

    fn update_status(
        &self,
        applicant: UserId,
        status: ApplicationStatus,
    ) -> Result<ApplicationRecord, RepositoryError> {
        let _guard = self.guard()?;
        let mut table = self.read_table()?;
        let index = table
            .open_row(applicant)
            .ok_or(RepositoryError::NotFound(applicant))?;
        let Some((headers, layout)) = table.header.as_ref() else {
            return Err(RepositoryError::NotFound(applicant));
        };

        let current = layout.parse_row(&table.rows[index], index)?;
        check_transition(current.status, status)?;

        let mut fields: Vec<String> = table.rows[index].iter().map(str::to_string).collect();
        fields[layout.status] = status.label().to_string();
        let updated = StringRecord::from(fields);
        let record = layout.parse_row(&updated, index)?;
        table.rows[index] = updated;

        self.rewrite(headers, &table.rows)?;
        Ok(record)
    }
}

#[derive(Debug, Default)]
struct Table {
    header: Option<(StringRecord, Layout)>,
    rows: Vec<StringRecord>,
}

impl Table {
    /// Index of the applicant's non-terminal row. Rows that do not parse are skipped.
    fn open_row(&self, applicant: UserId) -> Option<usize> {
        let (_, layout) = self.header.as_ref()?;
        let id = applicant.to_string();
        self.rows.iter().position(|row| {
            row.get(layout.applicant_id).map(str::trim) == Some(id.as_str())
                && row
                    .get(layout.status)
                    .and_then(ApplicationStatus::parse)
                    .is_some_and(|status| !status.is_terminal())
        })
    }

    fn records(&self) -> Result<Vec<ApplicationRecord>, RepositoryError> {
        let Some((_, layout)) = self.header.as_ref() else {
            return Ok(Vec::new());
        };
        self.rows
            .iter()
            .enumerate()
            .map(|(index, row)| layout.parse_row(row, index))
            .collect()
    }
}

/// Column positions resolved from the header of the file on disk.
#[derive(Debug)]
struct Layout {
    questions: Vec<(usize, String)>,
    platform_username: usize,
    applicant_id: usize,
    status: usize,
    timestamp: usize,
    duration: usize,
}

impl Layout {
    fn from_headers(headers: &StringRecord) -> Result<Self, RepositoryError> {
        let position = |name: &str| {
            headers
                .iter()
                .position(|header| header == name)
                .ok_or(RepositoryError::SchemaMismatch)
        };

        if headers.get(0) != Some(USERNAME_COLUMN) {
            return Err(RepositoryError::SchemaMismatch);
        }
        let platform_username = position(PLATFORM_USERNAME_COLUMN)?;
        let questions = (1..platform_username)
            .filter_map(|index| headers.get(index).map(|name| (index, name.to_string())))
            .collect();

        Ok(Self {
            questions,
            platform_username,
            applicant_id: position(APPLICANT_ID_COLUMN)?,
            status: position(STATUS_COLUMN)?,
            timestamp: position(TIMESTAMP_COLUMN)?,
            duration: position(DURATION_COLUMN)?,
        })
    }

    fn parse_row(&self, row: &StringRecord, index: usize) -> Result<ApplicationRecord, RepositoryError> {
        // header is line 1
        let line = index + 2;
        let malformed = |reason: String| RepositoryError::Malformed { row: line, reason };
        let field = move |position: usize| {
            row.get(position)
                .ok_or_else(|| malformed(format!("missing column {position}")))
        };

        let applicant_raw = field(self.applicant_id)?;
        let applicant_id = applicant_raw
            .parse::<UserId>()
            .map_err(|_| malformed(format!("invalid user id '{applicant_raw}'")))?;
        let status_raw = field(self.status)?;
        let status = ApplicationStatus::parse(status_raw)
            .ok_or_else(|| malformed(format!("unknown status '{status_raw}'")))?;
        let timestamp_raw = field(self.timestamp)?;
        let submitted_at = parse_timestamp(timestamp_raw)
            .ok_or_else(|| malformed(format!("invalid timestamp '{timestamp_raw}'")))?;
        let duration_raw = field(self.duration)?;
        let fill_duration_seconds = duration_raw
            .trim()
            .parse::<f64>()
            .map_err(|_| malformed(format!("invalid duration '{duration_raw}'")))?;

        let mut answers = Vec::with_capacity(self.questions.len());
        for (position, question) in &self.questions {
            answers.push(RecordAnswer {
                question: question.clone(),
                answer: field(*position)?.to_string(),
            });
        }

        Ok(ApplicationRecord {
            applicant_username: field(0)?.to_string(),
            answers,
            platform_username: field(self.platform_username)?.to_string(),
            applicant_id,
            status,
            submitted_at,
            fill_duration_seconds,
        })
    }
}
