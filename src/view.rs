use chrono::NaiveDate;
use std::cmp::{Ordering, Reverse};
use std::fmt;
use std::str::FromStr;

use crate::models::Job;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusFilter {
    #[default]
    All,
    Applied,
    NotApplied,
}

impl StatusFilter {
    pub fn matches(self, job: &Job) -> bool {
        match self {
            StatusFilter::All => true,
            StatusFilter::Applied => job.is_applied(),
            StatusFilter::NotApplied => !job.is_applied(),
        }
    }

    /// Next facet in the sidebar order, wrapping around.
    pub fn cycle(self) -> Self {
        match self {
            StatusFilter::All => StatusFilter::NotApplied,
            StatusFilter::NotApplied => StatusFilter::Applied,
            StatusFilter::Applied => StatusFilter::All,
        }
    }
}

impl fmt::Display for StatusFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StatusFilter::All => "all",
            StatusFilter::Applied => "applied",
            StatusFilter::NotApplied => "not-applied",
        })
    }
}

impl FromStr for StatusFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "all" => Ok(StatusFilter::All),
            "applied" | "yes" => Ok(StatusFilter::Applied),
            "not-applied" | "notapplied" | "no" => Ok(StatusFilter::NotApplied),
            other => Err(format!(
                "unknown status '{}' (expected all, applied or not-applied)",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub all: usize,
    pub applied: usize,
    pub not_applied: usize,
}

impl StatusCounts {
    pub fn of(jobs: &[Job]) -> Self {
        let applied = jobs.iter().filter(|j| j.is_applied()).count();
        Self {
            all: jobs.len(),
            applied,
            not_applied: jobs.len() - applied,
        }
    }

    pub fn for_filter(&self, filter: StatusFilter) -> usize {
        match filter {
            StatusFilter::All => self.all,
            StatusFilter::Applied => self.applied,
            StatusFilter::NotApplied => self.not_applied,
        }
    }
}

fn posted_on(job: &Job) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(job.date_posted.trim(), "%Y-%m-%d").ok()
}

fn matches_query(job: &Job, query: &str) -> bool {
    if query.is_empty() {
        return true;
    }
    job.company.to_lowercase().contains(query) || job.position.to_lowercase().contains(query)
}

/// Display order for the job list. Purely a view concern; nothing here is
/// written back.
///
/// With the `All` facet, jobs still waiting to be applied for come first.
/// Within that (or under a specific facet) the newest posting wins; postings
/// with an unreadable date sink to the bottom.
pub fn filter_and_sort<'a>(jobs: &'a [Job], query: &str, status: StatusFilter) -> Vec<&'a Job> {
    let query = query.to_lowercase();

    let mut visible: Vec<&Job> = jobs
        .iter()
        .filter(|job| matches_query(job, &query) && status.matches(job))
        .collect();

    visible.sort_by(|a, b| {
        let by_status = if status == StatusFilter::All {
            a.is_applied().cmp(&b.is_applied())
        } else {
            Ordering::Equal
        };
        by_status.then_with(|| {
            // Some(date) > None, so reversing puts undated jobs last
            Reverse(posted_on(a)).cmp(&Reverse(posted_on(b)))
        })
    });

    visible
}
