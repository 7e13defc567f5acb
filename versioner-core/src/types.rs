//! Domain types for catalog extraction.
//!
//! Rows are decoded once at the data-source boundary into these structs; the
//! reconcilers never see raw driver rows. Field aliases match the column names
//! produced by the catalog queries so exported snapshots decode unchanged.

use std::fmt;

use chrono::{DateTime, FixedOffset, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Opaque SQL Agent job identifier (`msdb.dbo.sysjobs.job_id`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub String);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Which estate a run extracts from. Each source has its own watermark key
/// and its own subtree under `<repo>/src/`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Fabric,
    OnPrem,
}

impl SourceType {
    /// Directory name under `<repo>/src/`.
    pub fn dir_name(&self) -> &'static str {
        match self {
            SourceType::Fabric => "Fabric",
            SourceType::OnPrem => "OnPrem",
        }
    }

    /// Key in the watermark store.
    pub fn watermark_key(&self) -> &'static str {
        match self {
            SourceType::Fabric => "Fabric",
            SourceType::OnPrem => "On-Prem",
        }
    }

    /// Key under `environments:` in the config file.
    pub fn config_key(&self) -> &'static str {
        match self {
            SourceType::Fabric => "fabric",
            SourceType::OnPrem => "onprem",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.config_key())
    }
}

/// Object kinds that are exported. Anything else in the catalog is skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectKind {
    View,
    Procedure,
}

impl ObjectKind {
    /// Map a `sys.objects.type` code (or its `type_desc`) to a kind.
    pub fn from_type_code(code: &str) -> Option<ObjectKind> {
        match code.trim().to_ascii_uppercase().as_str() {
            "V" | "VIEW" => Some(ObjectKind::View),
            "P" | "SQL_STORED_PROCEDURE" => Some(ObjectKind::Procedure),
            _ => None,
        }
    }

    /// Directory name in the destination tree, also the DDL keyword.
    pub fn dir_name(&self) -> &'static str {
        match self {
            ObjectKind::View => "VIEW",
            ObjectKind::Procedure => "PROCEDURE",
        }
    }

    /// Type argument accepted by `OBJECT_ID(name, type)`.
    pub fn type_code(&self) -> &'static str {
        match self {
            ObjectKind::View => "V",
            ObjectKind::Procedure => "P",
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// An undecoded modification timestamp, as the data source delivered it.
///
/// Drivers hand back native values; exported snapshots hand back text. Decoding
/// to UTC happens in [`crate::timestamp::parse_timestamp`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawTimestamp {
    /// A naive driver value; interpreted as UTC.
    Native(NaiveDateTime),
    /// A value carrying its own offset.
    Zoned(DateTime<FixedOffset>),
    /// Anything else, decoded by format table.
    Text(String),
}

impl fmt::Display for RawTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawTimestamp::Native(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S%.f")),
            RawTimestamp::Zoned(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S%.f%:z")),
            RawTimestamp::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for RawTimestamp {
    fn from(s: &str) -> Self {
        RawTimestamp::Text(s.to_owned())
    }
}

impl From<String> for RawTimestamp {
    fn from(s: String) -> Self {
        RawTimestamp::Text(s)
    }
}

impl From<NaiveDateTime> for RawTimestamp {
    fn from(dt: NaiveDateTime) -> Self {
        RawTimestamp::Native(dt)
    }
}

impl From<DateTime<Utc>> for RawTimestamp {
    fn from(dt: DateTime<Utc>) -> Self {
        RawTimestamp::Zoned(dt.into())
    }
}

// ---------------------------------------------------------------------------
// Catalog rows
// ---------------------------------------------------------------------------

/// One view or procedure as returned by the object catalog query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogRow {
    #[serde(alias = "SchemaName")]
    pub schema: String,
    #[serde(alias = "ObjectName")]
    pub name: String,
    /// Raw `sys.objects.type`; see [`ObjectKind::from_type_code`].
    #[serde(alias = "ObjectType", default)]
    pub object_type: String,
    /// `None` or empty when the definition is encrypted or not visible.
    #[serde(alias = "ObjectDefinition", default)]
    pub definition: Option<String>,
    #[serde(alias = "ModifiedDate", default)]
    pub modified_at: Option<RawTimestamp>,
}

impl CatalogRow {
    /// `schema.name`, used in log lines and skip reports.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }
}

/// One row of the flattened job × step query. Jobs without steps appear once
/// with `step_id: None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStepRow {
    #[serde(alias = "JobId")]
    pub job_id: JobId,
    #[serde(alias = "JobName")]
    pub job_name: String,
    #[serde(alias = "IsEnabled", deserialize_with = "bool_or_int", default)]
    pub enabled: bool,
    #[serde(alias = "JobDescription", default)]
    pub description: Option<String>,
    #[serde(alias = "DateCreated", default)]
    pub created_at: Option<RawTimestamp>,
    #[serde(alias = "DateModified", default)]
    pub modified_at: Option<RawTimestamp>,
    #[serde(alias = "StepId", default)]
    pub step_id: Option<i32>,
    #[serde(alias = "StepName", default)]
    pub step_name: Option<String>,
    #[serde(alias = "Subsystem", default)]
    pub subsystem: Option<String>,
    #[serde(alias = "Command", default)]
    pub command: Option<String>,
    #[serde(alias = "DatabaseName", default)]
    pub database_name: Option<String>,
    #[serde(alias = "OnSuccessAction", deserialize_with = "opt_scalar_string", default)]
    pub on_success_action: Option<String>,
    #[serde(alias = "OnFailAction", deserialize_with = "opt_scalar_string", default)]
    pub on_fail_action: Option<String>,
    #[serde(alias = "RetryAttempts", default)]
    pub retry_attempts: Option<i32>,
    #[serde(alias = "RetryInterval", default)]
    pub retry_interval: Option<i32>,
}

// ---------------------------------------------------------------------------
// Grouped job records
// ---------------------------------------------------------------------------

/// A single job step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord {
    pub step_id: i32,
    pub name: String,
    pub subsystem: String,
    /// Raw command text, rendered verbatim.
    pub command: String,
    pub database_name: String,
    pub on_success_action: String,
    pub on_fail_action: String,
    pub retry_attempts: Option<i32>,
    pub retry_interval: Option<i32>,
}

/// A SQL Agent job with its steps. Header fields come from the first row seen
/// for the job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: JobId,
    pub name: String,
    pub enabled: bool,
    pub description: Option<String>,
    pub created_at: Option<RawTimestamp>,
    pub modified_at: Option<RawTimestamp>,
    /// Ordered by `step_id` ascending once grouping completes.
    pub steps: Vec<StepRecord>,
}

impl JobRecord {
    /// Start a record from the first row seen for a job (steps not included).
    pub fn from_header(row: &JobStepRow) -> Self {
        JobRecord {
            job_id: row.job_id.clone(),
            name: row.job_name.clone(),
            enabled: row.enabled,
            description: row.description.clone(),
            created_at: row.created_at.clone(),
            modified_at: row.modified_at.clone(),
            steps: Vec::new(),
        }
    }
}

impl StepRecord {
    /// The step carried by `row`, if any.
    pub fn from_row(row: &JobStepRow) -> Option<Self> {
        let step_id = row.step_id?;
        Some(StepRecord {
            step_id,
            name: row.step_name.clone().unwrap_or_default(),
            subsystem: row.subsystem.clone().unwrap_or_default(),
            command: row.command.clone().unwrap_or_default(),
            database_name: row.database_name.clone().unwrap_or_default(),
            on_success_action: row.on_success_action.clone().unwrap_or_default(),
            on_fail_action: row.on_fail_action.clone().unwrap_or_default(),
            retry_attempts: row.retry_attempts,
            retry_interval: row.retry_interval,
        })
    }
}

// ---------------------------------------------------------------------------
// Lenient scalar decoding
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

fn bool_or_int<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Scalar>::deserialize(deserializer)? {
        None => Ok(false),
        Some(Scalar::Bool(b)) => Ok(b),
        Some(Scalar::Int(i)) => Ok(i != 0),
        Some(Scalar::Float(f)) => Ok(f != 0.0),
        Some(Scalar::Str(s)) => Ok(matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "y"
        )),
    }
}

fn opt_scalar_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Scalar>::deserialize(deserializer)?.map(|value| match value {
        Scalar::Bool(b) => b.to_string(),
        Scalar::Int(i) => i.to_string(),
        Scalar::Float(f) => f.to_string(),
        Scalar::Str(s) => s,
    }))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn object_kind_from_type_code() {
        assert_eq!(ObjectKind::from_type_code("V "), Some(ObjectKind::View));
        assert_eq!(ObjectKind::from_type_code("p"), Some(ObjectKind::Procedure));
        assert_eq!(
            ObjectKind::from_type_code("SQL_STORED_PROCEDURE"),
            Some(ObjectKind::Procedure)
        );
        assert_eq!(ObjectKind::from_type_code("FN"), None);
        assert_eq!(ObjectKind::from_type_code(""), None);
    }

    #[test]
    fn source_type_keys() {
        assert_eq!(SourceType::Fabric.watermark_key(), "Fabric");
        assert_eq!(SourceType::OnPrem.watermark_key(), "On-Prem");
        assert_eq!(SourceType::OnPrem.dir_name(), "OnPrem");
    }

    #[test]
    fn catalog_row_decodes_catalog_column_names() {
        let yaml = r#"
SchemaName: dbo
ObjectName: V1
ObjectType: "V "
ObjectDefinition: "CREATE VIEW dbo.V1 AS SELECT 1"
ModifiedDate: "2024-01-02T00:00:00Z"
"#;
        let row: CatalogRow = serde_yaml::from_str(yaml).expect("decode");
        assert_eq!(row.qualified_name(), "dbo.V1");
        assert_eq!(ObjectKind::from_type_code(&row.object_type), Some(ObjectKind::View));
        assert!(matches!(row.modified_at, Some(RawTimestamp::Zoned(_))));
    }

    #[test]
    fn unparseable_modified_date_decodes_as_text() {
        let yaml = "schema: dbo\nname: P1\nobject_type: P\nmodified_at: not a date\n";
        let row: CatalogRow = serde_yaml::from_str(yaml).expect("decode");
        assert_eq!(row.modified_at, Some(RawTimestamp::Text("not a date".into())));
        assert!(row.definition.is_none());
    }

    #[test]
    fn job_step_row_accepts_numeric_flags_and_actions() {
        let yaml = r#"
job_id: 6F9619FF-8B86-D011-B42D-00C04FC964FF
JobName: Nightly ETL
IsEnabled: 1
StepId: 2
OnSuccessAction: 3
OnFailAction: Quit with failure
"#;
        let row: JobStepRow = serde_yaml::from_str(yaml).expect("decode");
        assert!(row.enabled);
        assert_eq!(row.step_id, Some(2));
        assert_eq!(row.on_success_action.as_deref(), Some("3"));
        assert_eq!(row.on_fail_action.as_deref(), Some("Quit with failure"));
    }

    #[test]
    fn raw_timestamp_display() {
        let naive = NaiveDate::from_ymd_opt(2024, 1, 2)
            .and_then(|d| d.and_hms_opt(3, 4, 5))
            .expect("valid date");
        assert_eq!(RawTimestamp::from(naive).to_string(), "2024-01-02 03:04:05");
        assert_eq!(RawTimestamp::from("whenever").to_string(), "whenever");
    }

    #[test]
    fn step_record_requires_step_id() {
        let row = JobStepRow {
            job_id: JobId::from("j1"),
            job_name: "Job".into(),
            enabled: true,
            description: None,
            created_at: None,
            modified_at: None,
            step_id: None,
            step_name: Some("ignored".into()),
            subsystem: None,
            command: None,
            database_name: None,
            on_success_action: None,
            on_fail_action: None,
            retry_attempts: None,
            retry_interval: None,
        };
        assert!(StepRecord::from_row(&row).is_none());
    }
}
