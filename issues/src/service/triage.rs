use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use common::{
    access_rules::{authorize, Triage},
    context::Context,
    entities::issue::{Category, Issue, IssueSummary, Status},
    error::{self, AddCode},
    repository::{IssueFilter, IssueRepositoryObject},
};

pub const RECENT_ISSUES_LIMIT: i64 = 10;

/// Admin list filters, all optional. Dates are RFC 3339 timestamps or plain
/// `YYYY-MM-DD` days (midnight UTC).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriageQuery {
    pub status: Option<String>,
    pub category: Option<String>,
    pub search: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn parse_date(value: &str) -> error::Result<i64> {
    if let Ok(date) = DateTime::parse_from_rfc3339(value) {
        return Ok(date.timestamp_micros());
    }

    let day = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| anyhow::anyhow!("Invalid date: {}", value).code(400))?;
    let midnight = day
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| anyhow::anyhow!("Invalid date: {}", value).code(400))?;

    Ok(Utc.from_utc_datetime(&midnight).timestamp_micros())
}

impl TriageQuery {
    pub fn to_filter(&self) -> error::Result<IssueFilter> {
        Ok(IssueFilter {
            status: non_empty(&self.status)
                .map(str::parse::<Status>)
                .transpose()?,
            category: non_empty(&self.category)
                .map(str::parse::<Category>)
                .transpose()?,
            search: non_empty(&self.search).map(str::to_string),
            created_from: non_empty(&self.start_date).map(parse_date).transpose()?,
            created_to: non_empty(&self.end_date).map(parse_date).transpose()?,
            ..Default::default()
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total: u64,
    pub pending: u64,
    pub in_progress: u64,
    pub resolved: u64,
    pub category_breakdown: BTreeMap<String, u64>,
    pub recent_issues: Vec<IssueSummary>,
}

pub struct TriageService {
    context: Context,
}

impl TriageService {
    pub fn new(context: Context) -> Self {
        Self { context }
    }

    pub async fn list_filtered(&self, query: &TriageQuery) -> error::Result<Vec<Issue<String>>> {
        authorize(Triage, self.context.auth(), (), "Admin access required")?;
        let filter = query.to_filter()?;

        let issues = self
            .context
            .try_get_manual::<IssueRepositoryObject>()?
            .find_filtered(&filter)
            .await?;

        Ok(issues.into_iter().map(Issue::stringify).collect())
    }

    pub async fn dashboard_stats(&self) -> error::Result<DashboardStats> {
        authorize(Triage, self.context.auth(), (), "Admin access required")?;
        let issues = self.context.try_get_manual::<IssueRepositoryObject>()?;

        let by_status = issues.count_by_status().await?;
        let category_breakdown = issues.count_by_category().await?;
        let recent_issues = issues
            .find_filtered(&IssueFilter {
                limit: Some(RECENT_ISSUES_LIMIT),
                ..Default::default()
            })
            .await?;

        Ok(DashboardStats {
            total: by_status.total(),
            pending: by_status.pending,
            in_progress: by_status.in_progress,
            resolved: by_status.resolved,
            category_breakdown,
            recent_issues: recent_issues.into_iter().map(Issue::summary).collect(),
        })
    }
}
