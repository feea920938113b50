use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Placeholder response for postings that have not heard back yet.
pub const WAITING_RESPONSE: &str = "WAITING T-T";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EmploymentType {
    #[default]
    #[serde(rename = "Full-time")]
    FullTime,
    #[serde(rename = "Part-time")]
    PartTime,
    #[serde(rename = "Contract")]
    Contract,
}

impl EmploymentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmploymentType::FullTime => "Full-time",
            EmploymentType::PartTime => "Part-time",
            EmploymentType::Contract => "Contract",
        }
    }
}

impl fmt::Display for EmploymentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EmploymentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace(['_', ' '], "-").as_str() {
            "full-time" | "fulltime" => Ok(EmploymentType::FullTime),
            "part-time" | "parttime" => Ok(EmploymentType::PartTime),
            "contract" => Ok(EmploymentType::Contract),
            other => Err(format!(
                "unknown employment type '{}' (expected full-time, part-time or contract)",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Applied {
    Yes,
    #[default]
    No,
}

impl Applied {
    pub fn as_str(&self) -> &'static str {
        match self {
            Applied::Yes => "yes",
            Applied::No => "no",
        }
    }

    /// Sheet cells only count as applied when they literally say "yes".
    pub fn from_cell(cell: &str) -> Self {
        if cell.trim().eq_ignore_ascii_case("yes") {
            Applied::Yes
        } else {
            Applied::No
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: String, // slug of company + position, never stored remotely
    pub company: String,
    pub position: String,
    pub posting_link: String,
    pub applied: Applied,
    pub date_applied: String,
    pub response: String,
    pub predicted_pay: String,
    pub salary_benefits: String,
    pub employment_type: EmploymentType,
    pub notes: String,
    pub date_posted: String,
}

impl Job {
    pub fn is_applied(&self) -> bool {
        self.applied == Applied::Yes
    }

    /// Response text as shown to the user; blank responses read as waiting.
    pub fn response_label(&self) -> &str {
        let trimmed = self.response.trim();
        if trimmed.is_empty() {
            WAITING_RESPONSE
        } else {
            trimmed
        }
    }

    pub fn response_bucket(&self) -> ResponseBucket {
        ResponseBucket::classify(self.response_label())
    }
}

/// The user-editable part of a posting, as entered in the post/edit form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobDraft {
    pub company: String,
    pub position: String,
    pub posting_link: String,
    pub predicted_pay: String,
    pub salary_benefits: String,
    pub notes: String,
    pub employment_type: EmploymentType,
}

impl From<&Job> for JobDraft {
    fn from(job: &Job) -> Self {
        Self {
            company: job.company.clone(),
            position: job.position.clone(),
            posting_link: job.posting_link.clone(),
            predicted_pay: job.predicted_pay.clone(),
            salary_benefits: job.salary_benefits.clone(),
            notes: job.notes.clone(),
            employment_type: job.employment_type,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseBucket {
    Waiting,
    Confirmation,
    Rejection,
    Interview,
    Acceptance,
    Other,
}

impl ResponseBucket {
    pub fn classify(response: &str) -> Self {
        let response = response.to_lowercase();
        if response.contains("waiting") {
            ResponseBucket::Waiting
        } else if response.contains("confirmation") {
            ResponseBucket::Confirmation
        } else if response.contains("rejection") {
            ResponseBucket::Rejection
        } else if response.contains("interview") {
            ResponseBucket::Interview
        } else if response.contains("acceptance") {
            ResponseBucket::Acceptance
        } else {
            ResponseBucket::Other
        }
    }
}
