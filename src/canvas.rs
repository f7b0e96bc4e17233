//! Canvas LMS client
//!
//! Only the handful of read endpoints the backup tool needs: course groups,
//! group membership, assignments and assignment submissions. Requests are
//! authenticated with a bearer token.

use chrono::NaiveDateTime;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::CanvasConfig;
use crate::roster::RosterRecord;

/// Cache file for the attendance assignment's submissions
pub const ATTENDANCE_CACHE_FILE: &str = "attendance_submissions.json";

#[derive(Debug, Error)]
pub enum CanvasError {
    #[error("request to {url} failed: {source}")]
    Request { url: String, source: reqwest::Error },
    #[error("HTTP error {status} from {url}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },
    #[error("no {kind} named {name:?} in course {course_id}")]
    NotFound {
        kind: &'static str,
        name: String,
        course_id: i64,
    },
    #[error("attendance cache {path}: {source}")]
    Cache {
        path: String,
        source: std::io::Error,
    },
    #[error("malformed attendance cache: {0}")]
    CacheFormat(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Group {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CanvasUser {
    pub id: i64,
    #[serde(default)]
    pub login_id: Option<String>,
    #[serde(default)]
    pub sortable_name: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Assignment {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub user_id: i64,
    #[serde(default)]
    pub score: Option<f64>,
}

pub struct CanvasClient {
    http: reqwest::Client,
    api_prefix: String,
    token: String,
}

impl CanvasClient {
    pub fn new(api_prefix: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_prefix: api_prefix.into(),
            token: token.into(),
        }
    }

    pub fn from_config(config: &CanvasConfig) -> Self {
        Self::new(&config.api_prefix, &config.api_token)
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.api_prefix.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, CanvasError> {
        let url = self.url(path);
        debug!("GET {}", url);

        let request_err = |source| CanvasError::Request {
            url: url.clone(),
            source,
        };
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(request_err)?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(CanvasError::Status {
                url: url.clone(),
                status,
            });
        }
        response.json::<T>().await.map_err(request_err)
    }

    pub async fn list_groups(&self, course_id: i64) -> Result<Vec<Group>, CanvasError> {
        self.get_json(&format!("courses/{}/groups", course_id)).await
    }

    pub async fn list_group_users(&self, group_id: i64) -> Result<Vec<CanvasUser>, CanvasError> {
        self.get_json(&format!("groups/{}/users?per_page=100", group_id))
            .await
    }

    pub async fn list_assignments(&self, course_id: i64) -> Result<Vec<Assignment>, CanvasError> {
        self.get_json(&format!("courses/{}/assignments?per_page=50", course_id))
            .await
    }

    pub async fn list_submissions(
        &self,
        course_id: i64,
        assignment_id: i64,
    ) -> Result<Vec<Submission>, CanvasError> {
        self.get_json(&format!(
            "courses/{}/assignments/{}/submissions?per_page=200",
            course_id, assignment_id
        ))
        .await
    }

    pub async fn find_group(&self, course_id: i64, name: &str) -> Result<Group, CanvasError> {
        self.list_groups(course_id)
            .await?
            .into_iter()
            .find(|g| g.name == name)
            .ok_or_else(|| CanvasError::NotFound {
                kind: "group",
                name: name.to_string(),
                course_id,
            })
    }

    pub async fn find_assignment(
        &self,
        course_id: i64,
        name: &str,
    ) -> Result<Assignment, CanvasError> {
        self.list_assignments(course_id)
            .await?
            .into_iter()
            .find(|a| a.name == name)
            .ok_or_else(|| CanvasError::NotFound {
                kind: "assignment",
                name: name.to_string(),
                course_id,
            })
    }

    /// Roster rows for every member of the grader's group
    pub async fn fetch_grader_roster(
        &self,
        course_id: i64,
        grader: &str,
        now: NaiveDateTime,
    ) -> Result<Vec<RosterRecord>, CanvasError> {
        let group = self.find_group(course_id, grader).await?;
        let users = self.list_group_users(group.id).await?;
        info!("Fetched {} members of group {}", users.len(), group.name);

        Ok(users
            .into_iter()
            .map(|u| {
                RosterRecord::new(
                    u.login_id.unwrap_or_default(),
                    u.id.to_string(),
                    u.sortable_name,
                    now,
                )
            })
            .collect())
    }

    /// Submissions of the attendance assignment belonging to `lab`
    pub async fn fetch_attendance(
        &self,
        config: &CanvasConfig,
        lab: &str,
    ) -> Result<AttendanceSheet, CanvasError> {
        let name = attendance_assignment_name(&config.attendance_assignment_name_scheme, lab);
        let assignment = self.find_assignment(config.course_id, &name).await?;
        let submissions = self
            .list_submissions(config.course_id, assignment.id)
            .await?;
        Ok(AttendanceSheet::new(
            submissions,
            config.attendance_assignment_point_criterion,
        ))
    }
}

/// `scheme` followed by the lab name minus its `lab` prefix
pub fn attendance_assignment_name(scheme: &str, lab: &str) -> String {
    format!("{}{}", scheme, lab.get(3..).unwrap_or(""))
}

/// Attendance derived from an assignment's scores
#[derive(Debug, Clone, PartialEq)]
pub struct AttendanceSheet {
    submissions: Vec<Submission>,
    criterion: f64,
}

impl AttendanceSheet {
    pub fn new(submissions: Vec<Submission>, criterion: f64) -> Self {
        Self {
            submissions,
            criterion,
        }
    }

    /// Whether the student with Canvas id `canvas_id` scored the criterion
    pub fn is_present(&self, canvas_id: &str) -> bool {
        let Ok(id) = canvas_id.trim().parse::<i64>() else {
            return false;
        };
        self.submissions
            .iter()
            .any(|s| s.user_id == id && s.score == Some(self.criterion))
    }

    pub fn save(&self, path: &Path) -> Result<(), CanvasError> {
        let json = serde_json::to_string_pretty(&self.submissions)?;
        std::fs::write(path, json).map_err(|source| CanvasError::Cache {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn load(path: &Path, criterion: f64) -> Result<Self, CanvasError> {
        let content = std::fs::read_to_string(path).map_err(|source| CanvasError::Cache {
            path: path.display().to_string(),
            source,
        })?;
        Ok(Self::new(serde_json::from_str(&content)?, criterion))
    }
}
