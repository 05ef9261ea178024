use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Automation tool family a test case's script requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    /// k6 load-test runner (`.js` scripts).
    K6,
    /// Playwright browser automation (`.js` scripts).
    Playwright,
    /// Selenium automation driven by a Python script (`.py` scripts).
    Selenium,
}

impl ToolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolKind::K6 => "k6",
            ToolKind::Playwright => "playwright",
            ToolKind::Selenium => "selenium",
        }
    }

    /// File extension a script for this tool is expected to carry.
    pub fn script_extension(&self) -> &'static str {
        match self {
            ToolKind::K6 | ToolKind::Playwright => "js",
            ToolKind::Selenium => "py",
        }
    }
}

impl FromStr for ToolKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "k6" => Ok(ToolKind::K6),
            "playwright" => Ok(ToolKind::Playwright),
            "selenium" => Ok(ToolKind::Selenium),
            other => Err(format!("unknown tool kind: {}", other)),
        }
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deployment target scoping folders, cases, and dashboard rollups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    Dev,
    Staging,
    Production,
}

impl Environment {
    pub const ALL: [Environment; 3] = [
        Environment::Dev,
        Environment::Staging,
        Environment::Production,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Dev => "dev",
            Environment::Staging => "staging",
            Environment::Production => "production",
        }
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dev" => Ok(Environment::Dev),
            "staging" => Ok(Environment::Staging),
            "production" => Ok(Environment::Production),
            other => Err(format!("unknown environment: {}", other)),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A test case's last known verdict. Stored nullable: rows imported from
/// legacy spreadsheets carry no status at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    NotTested,
    Pass,
    Fail,
    Blocked,
    NotApplicable,
}

impl CaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaseStatus::NotTested => "not_tested",
            CaseStatus::Pass => "pass",
            CaseStatus::Fail => "fail",
            CaseStatus::Blocked => "blocked",
            CaseStatus::NotApplicable => "not_applicable",
        }
    }
}

impl FromStr for CaseStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not_tested" => Ok(CaseStatus::NotTested),
            "pass" => Ok(CaseStatus::Pass),
            "fail" => Ok(CaseStatus::Fail),
            "blocked" => Ok(CaseStatus::Blocked),
            "not_applicable" => Ok(CaseStatus::NotApplicable),
            other => Err(format!("unknown case status: {}", other)),
        }
    }
}

/// Outcome of one execution of a test case's script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Running,
    Pass,
    Fail,
    Error,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Running => "running",
            Outcome::Pass => "pass",
            Outcome::Fail => "fail",
            Outcome::Error => "error",
        }
    }
}

impl FromStr for Outcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(Outcome::Running),
            "pass" => Ok(Outcome::Pass),
            "fail" => Ok(Outcome::Fail),
            "error" => Ok(Outcome::Error),
            other => Err(format!("unknown outcome: {}", other)),
        }
    }
}

/// Key/value execution inputs. BTreeMap so argv construction is
/// deterministic regardless of insertion order.
pub type Parameters = BTreeMap<String, String>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCase {
    pub id: i64,
    pub name: String,
    pub main_category: Option<String>,
    pub sub_category: Option<String>,
    pub detail_category: Option<String>,
    /// Raw tool kind string from the persistence layer; validated into a
    /// [`ToolKind`] by the adapter before any subprocess is spawned.
    pub tool_kind: String,
    pub script_path: String,
    pub environment: Environment,
    pub folder_id: Option<i64>,
    pub parameters: Parameters,
    pub status: Option<CaseStatus>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub id: i64,
    pub case_id: i64,
    pub outcome: Outcome,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_secs: Option<f64>,
    pub stdout: Option<String>,
    pub stderr: Option<String>,
    pub error_message: Option<String>,
    pub screenshot_ref: Option<String>,
}

/// Folder level in the Environment → DeploymentDate → Feature hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FolderKind {
    Environment,
    DeploymentDate,
    Feature,
}

impl FolderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FolderKind::Environment => "environment",
            FolderKind::DeploymentDate => "deployment_date",
            FolderKind::Feature => "feature",
        }
    }
}

impl FromStr for FolderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "environment" => Ok(FolderKind::Environment),
            "deployment_date" => Ok(FolderKind::DeploymentDate),
            "feature" => Ok(FolderKind::Feature),
            other => Err(format!("unknown folder kind: {}", other)),
        }
    }
}

/// One row of the flat parent-pointer folder table. `kind` and
/// `environment` are nullable: legacy rows rely on depth inference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Folder {
    pub id: i64,
    pub name: String,
    pub kind: Option<FolderKind>,
    pub environment: Option<Environment>,
    pub parent_id: Option<i64>,
}

/// Per-environment rollup of test case statuses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardSummary {
    pub environment: Environment,
    pub total: i64,
    pub passed: i64,
    pub failed: i64,
    pub blocked: i64,
    pub not_tested: i64,
    pub not_applicable: i64,
    pub pass_rate: f64,
    /// True when the breakdown is the placeholder distribution, not real
    /// execution history.
    pub is_synthetic: bool,
    pub last_updated: DateTime<Utc>,
}
