use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use reqwest::header::CONTENT_TYPE;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::models::{Applied, EmploymentType, Job, WAITING_RESPONSE};
use crate::text::derive_id;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("request to sheet endpoint failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("sheet response is not valid JSON: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("sheet response is not a list of rows")]
    UnexpectedShape,

    #[error("sheet row {row} has {columns} columns, expected at least {expected}")]
    MalformedRow {
        row: usize,
        columns: usize,
        expected: usize,
    },
}

/// Anything that can hold the job list. The real one is a spreadsheet behind
/// a script endpoint; tests use an in-memory store.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Reads every row, failing on transport, decode or schema errors.
    async fn try_fetch_all(&self) -> Result<Vec<Job>, StoreError>;

    /// Like `try_fetch_all`, but a failed read looks like an empty sheet.
    async fn fetch_all(&self) -> Vec<Job> {
        match self.try_fetch_all().await {
            Ok(jobs) => jobs,
            Err(e) => {
                warn!("Error fetching jobs: {}", e);
                Vec::new()
            }
        }
    }

    /// Appends or updates a row. `previous` is the prior version of the job
    /// when this is an edit, so the remote side can find the old row.
    async fn write(&self, job: &Job, previous: Option<&Job>) -> Result<(), StoreError>;

    /// Deletes the row matching the job's company and position.
    async fn delete(&self, job: &Job) -> Result<(), StoreError>;
}

// --- Row schema ---

/// Positional layout of the sheet's rows. The sheet has a header row but the
/// script never exposes column names, so columns are identified by index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RowSchema {
    #[default]
    V1,
}

mod v1 {
    pub const COMPANY: usize = 0;
    pub const POSITION: usize = 1;
    pub const POSTING_LINK: usize = 2;
    pub const APPLIED: usize = 3;
    pub const DATE_APPLIED: usize = 4;
    pub const RESPONSE: usize = 5;
    pub const PREDICTED_PAY: usize = 6;
    pub const SALARY_BENEFITS: usize = 7;
    pub const NOTES: usize = 8;
    // 9 is unused
    pub const EMPLOYMENT_TYPE: usize = 10;
    pub const DATE_POSTED: usize = 11;

    /// Older sheets stop after the notes column.
    pub const MIN_COLUMNS: usize = NOTES + 1;
}

impl RowSchema {
    pub fn min_columns(self) -> usize {
        match self {
            RowSchema::V1 => v1::MIN_COLUMNS,
        }
    }

    /// Maps one data row (1-based sheet row number for error messages).
    pub fn map_row(self, row_number: usize, row: &[Value], today: NaiveDate) -> Result<Job, StoreError> {
        if row.len() < self.min_columns() {
            return Err(StoreError::MalformedRow {
                row: row_number,
                columns: row.len(),
                expected: self.min_columns(),
            });
        }

        let company = cell(row, v1::COMPANY);
        let position = cell(row, v1::POSITION);

        let response = cell(row, v1::RESPONSE);
        let response = if response.is_empty() {
            WAITING_RESPONSE.to_string()
        } else {
            response
        };

        let employment_raw = cell(row, v1::EMPLOYMENT_TYPE);
        let employment_type = if employment_raw.trim().is_empty() {
            EmploymentType::default()
        } else {
            employment_raw.parse().unwrap_or_else(|e| {
                warn!("Row {}: {}, using Full-time", row_number, e);
                EmploymentType::default()
            })
        };

        let date_posted = sheet_date(&cell(row, v1::DATE_POSTED));
        let date_posted = if date_posted.is_empty() {
            today.format("%Y-%m-%d").to_string()
        } else {
            date_posted
        };

        Ok(Job {
            id: derive_id(&company, &position),
            company,
            position,
            posting_link: cell(row, v1::POSTING_LINK),
            applied: Applied::from_cell(&cell(row, v1::APPLIED)),
            date_applied: sheet_date(&cell(row, v1::DATE_APPLIED)),
            response,
            predicted_pay: cell(row, v1::PREDICTED_PAY),
            salary_benefits: cell(row, v1::SALARY_BENEFITS),
            employment_type,
            notes: cell(row, v1::NOTES),
            date_posted,
        })
    }
}

fn cell(row: &[Value], idx: usize) -> String {
    match row.get(idx) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

/// Sheets hands dates back as timestamps; keep only the date part.
fn sheet_date(raw: &str) -> String {
    raw.split('T').next().unwrap_or_default().trim().to_string()
}

fn is_blank_row(row: &[Value]) -> bool {
    row.iter().all(|v| match v {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    })
}

/// Converts the script's `getValues()` dump into jobs. Row 0 is the header.
pub fn rows_to_jobs(body: &Value, schema: RowSchema, today: NaiveDate) -> Result<Vec<Job>, StoreError> {
    let rows = body.as_array().ok_or(StoreError::UnexpectedShape)?;

    let mut jobs = Vec::with_capacity(rows.len().saturating_sub(1));
    for (idx, row) in rows.iter().enumerate().skip(1) {
        let row = row.as_array().ok_or(StoreError::UnexpectedShape)?;
        if is_blank_row(row) {
            continue;
        }
        jobs.push(schema.map_row(idx + 1, row, today)?);
    }
    Ok(jobs)
}

// --- Payloads ---

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct JobPayload<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    action: Option<&'static str>,
    company: &'a str,
    position: &'a str,
    link: &'a str,
    applied: &'static str,
    date_applied: &'a str,
    response: &'a str,
    pay_rate: &'a str,
    benefits: &'a str,
    other: &'a str,
    employment_type: &'static str,
    date_posted: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    original_company: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    original_position: Option<&'a str>,
}

impl<'a> JobPayload<'a> {
    fn new(job: &'a Job, previous: Option<&'a Job>) -> Self {
        let response = if job.response.is_empty() {
            WAITING_RESPONSE
        } else {
            job.response.as_str()
        };
        Self {
            action: previous.map(|_| "update"),
            company: &job.company,
            position: &job.position,
            link: &job.posting_link,
            applied: job.applied.as_str(),
            date_applied: &job.date_applied,
            response,
            pay_rate: &job.predicted_pay,
            benefits: &job.salary_benefits,
            other: &job.notes,
            employment_type: job.employment_type.as_str(),
            date_posted: &job.date_posted,
            original_company: previous.map(|p| p.company.as_str()),
            original_position: previous.map(|p| p.position.as_str()),
        }
    }
}

#[derive(Debug, Serialize)]
struct DeletePayload<'a> {
    action: &'static str,
    company: &'a str,
    position: &'a str,
}

impl<'a> DeletePayload<'a> {
    fn new(job: &'a Job) -> Self {
        Self {
            action: "delete",
            company: &job.company,
            position: &job.position,
        }
    }
}

// --- HTTP client ---

pub struct SheetClient {
    endpoint: String,
    schema: RowSchema,
    client: reqwest::Client,
}

impl SheetClient {
    pub fn new(endpoint: impl Into<String>, timeout: Option<Duration>) -> Result<Self, StoreError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            endpoint: endpoint.into(),
            schema: RowSchema::default(),
            client: builder.build()?,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Posts a body the way a browser `no-cors` request would: plain text,
    /// and the response is never looked at.
    async fn post_opaque<T: Serialize>(&self, payload: &T) -> Result<(), StoreError> {
        let body = serde_json::to_string(payload)?;
        debug!("POST {} ({} bytes)", self.endpoint, body.len());
        self.client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "text/plain;charset=UTF-8")
            .body(body)
            .send()
            .await?;
        Ok(())
    }
}

#[async_trait]
impl JobStore for SheetClient {
    async fn try_fetch_all(&self) -> Result<Vec<Job>, StoreError> {
        debug!("GET {}", self.endpoint);
        let text = self
            .client
            .get(&self.endpoint)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        let body: Value = serde_json::from_str(&text)?;
        let jobs = rows_to_jobs(&body, self.schema, Utc::now().date_naive())?;
        debug!("Fetched {} jobs", jobs.len());
        Ok(jobs)
    }

    async fn write(&self, job: &Job, previous: Option<&Job>) -> Result<(), StoreError> {
        self.post_opaque(&JobPayload::new(job, previous)).await
    }

    async fn delete(&self, job: &Job) -> Result<(), StoreError> {
        self.post_opaque(&DeletePayload::new(job)).await
    }
}
