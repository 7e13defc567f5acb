//! Template contexts: serializable payloads built from catalog data.

use serde::Serialize;

use versioner_core::types::{JobRecord, ObjectKind};

use crate::error::RenderError;

/// Everything needed to render one `.sql` file.
#[derive(Debug, Clone)]
pub struct ObjectContext {
    pub server: String,
    pub database: String,
    pub schema: String,
    pub name: String,
    pub kind: ObjectKind,
    /// Human-readable modification time, as the catalog reported it.
    pub modified: Option<String>,
    /// Raw object definition; normalized by [`normalize_body`] when rendered.
    pub definition: String,
    pub include_header: bool,
    pub include_drop: bool,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct HeaderCtx {
    pub server: String,
    pub database: String,
    pub schema: String,
    pub object: String,
    pub kind: String,
    pub modified: String,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct DropCtx {
    /// `[schema].[name]`
    pub qualified: String,
    /// `qualified`, escaped for use inside `N'…'`.
    pub literal: String,
    pub kind: String,
    pub type_code: String,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct JobCtx {
    pub job_id: String,
    pub name: String,
    pub enabled: bool,
    pub description: String,
    pub created: String,
    pub modified: String,
    pub steps: Vec<StepCtx>,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct StepCtx {
    pub step_id: i32,
    pub name: String,
    pub subsystem: String,
    pub database: String,
    pub on_success_action: String,
    pub on_fail_action: String,
    pub retry_attempts: String,
    pub retry_interval: String,
    pub command: String,
}

impl ObjectContext {
    pub(crate) fn header(&self) -> HeaderCtx {
        HeaderCtx {
            server: self.server.clone(),
            database: self.database.clone(),
            schema: self.schema.clone(),
            object: self.name.clone(),
            kind: self.kind.dir_name().to_string(),
            modified: self.modified.clone().unwrap_or_else(|| "unknown".to_string()),
        }
    }

    pub(crate) fn drop_preamble(&self) -> DropCtx {
        let qualified = format!("{}.{}", bracket_ident(&self.schema), bracket_ident(&self.name));
        DropCtx {
            literal: qualified.replace('\'', "''"),
            qualified,
            kind: self.kind.dir_name().to_string(),
            type_code: self.kind.type_code().to_string(),
        }
    }
}

impl JobCtx {
    /// Steps are emitted in `step_id` order whatever order the record holds.
    pub(crate) fn from_record(job: &JobRecord) -> Self {
        let mut steps: Vec<StepCtx> = job
            .steps
            .iter()
            .map(|s| StepCtx {
                step_id: s.step_id,
                name: s.name.clone(),
                subsystem: s.subsystem.clone(),
                database: s.database_name.clone(),
                on_success_action: s.on_success_action.clone(),
                on_fail_action: s.on_fail_action.clone(),
                retry_attempts: s.retry_attempts.map(|v| v.to_string()).unwrap_or_default(),
                retry_interval: s.retry_interval.map(|v| v.to_string()).unwrap_or_default(),
                command: s.command.clone(),
            })
            .collect();
        steps.sort_by_key(|s| s.step_id);

        JobCtx {
            job_id: job.job_id.0.clone(),
            name: job.name.clone(),
            enabled: job.enabled,
            description: job.description.clone().unwrap_or_default(),
            created: job.created_at.as_ref().map(|t| t.to_string()).unwrap_or_default(),
            modified: job.modified_at.as_ref().map(|t| t.to_string()).unwrap_or_default(),
            steps,
        }
    }
}

/// Serialize any context into a tera context.
pub(crate) fn to_tera_context<T: Serialize>(ctx: &T) -> Result<tera::Context, RenderError> {
    let value = serde_json::to_value(ctx)?;
    Ok(tera::Context::from_value(value)?)
}

/// Quote a SQL Server identifier: `a]b` becomes `[a]]b]`.
pub fn bracket_ident(name: &str) -> String {
    format!("[{}]", name.replace(']', "]]"))
}

/// Normalize line endings to `\n` and end with exactly one newline.
pub fn normalize_body(definition: &str) -> String {
    let mut body = definition.replace("\r\n", "\n").replace('\r', "\n");
    let trimmed_len = body.trim_end().len();
    body.truncate(trimmed_len);
    body.push('\n');
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use versioner_core::types::{JobId, StepRecord};

    #[test]
    fn bracket_ident_doubles_closing_brackets() {
        assert_eq!(bracket_ident("dbo"), "[dbo]");
        assert_eq!(bracket_ident("we]ird"), "[we]]ird]");
        assert_eq!(bracket_ident("[x]"), "[[x]]]");
    }

    #[test]
    fn normalize_body_line_endings_and_trailing_whitespace() {
        assert_eq!(normalize_body("a\r\nb\r\n\r\n  \t"), "a\nb\n");
        assert_eq!(normalize_body("a\rb"), "a\nb\n");
        assert_eq!(normalize_body("  lead kept"), "  lead kept\n");
    }

    #[test]
    fn drop_literal_escapes_quotes() {
        let ctx = ObjectContext {
            server: "s".into(),
            database: "d".into(),
            schema: "dbo".into(),
            name: "O'Brien]".into(),
            kind: ObjectKind::Procedure,
            modified: None,
            definition: String::new(),
            include_header: false,
            include_drop: true,
        };
        let drop = ctx.drop_preamble();
        assert_eq!(drop.qualified, "[dbo].[O'Brien]]]");
        assert_eq!(drop.literal, "[dbo].[O''Brien]]]");
        assert_eq!(drop.type_code, "P");
    }

    #[test]
    fn job_ctx_sorts_steps() {
        let step = |id: i32| StepRecord {
            step_id: id,
            name: format!("s{id}"),
            subsystem: "TSQL".into(),
            command: "SELECT 1".into(),
            database_name: "master".into(),
            on_success_action: "1".into(),
            on_fail_action: "2".into(),
            retry_attempts: Some(0),
            retry_interval: None,
        };
        let job = JobRecord {
            job_id: JobId::from("j"),
            name: "Job".into(),
            enabled: false,
            description: None,
            created_at: None,
            modified_at: None,
            steps: vec![step(3), step(1), step(2)],
        };
        let ctx = JobCtx::from_record(&job);
        let ids: Vec<i32> = ctx.steps.iter().map(|s| s.step_id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(ctx.steps[0].retry_attempts, "0");
        assert_eq!(ctx.steps[0].retry_interval, "");
    }
}
