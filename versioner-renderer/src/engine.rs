//! Tera rendering engine: [`Renderer`].
//!
//! # Templates
//!
//! | Template                 | Output                                   |
//! |--------------------------|------------------------------------------|
//! | `object_header.sql.tera` | comment block at the top of a `.sql` file |
//! | `drop_preamble.sql.tera` | `IF OBJECT_ID(...) IS NOT NULL DROP ...; GO` |
//! | `agent_job.txt.tera`     | whole SQL Agent job `.txt` file          |
//!
//! A `.sql` file is `[header] [drop preamble] body`, sections separated by one
//! blank line. Every rendered file ends with exactly one newline.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tera::Tera;

use versioner_core::types::JobRecord;

use crate::context::{normalize_body, to_tera_context, JobCtx, ObjectContext};
use crate::error::RenderError;

pub const OBJECT_HEADER_TEMPLATE: &str = "object_header.sql.tera";
pub const DROP_PREAMBLE_TEMPLATE: &str = "drop_preamble.sql.tera";
pub const AGENT_JOB_TEMPLATE: &str = "agent_job.txt.tera";

// ---------------------------------------------------------------------------
// Embedded templates: baked into the binary at compile time via include_str!
// ---------------------------------------------------------------------------

const TPLS: &[(&str, &str)] = &[
    (OBJECT_HEADER_TEMPLATE, include_str!("templates/object_header.sql.tera")),
    (DROP_PREAMBLE_TEMPLATE, include_str!("templates/drop_preamble.sql.tera")),
    (AGENT_JOB_TEMPLATE, include_str!("templates/agent_job.txt.tera")),
];

// ---------------------------------------------------------------------------
// Template loading helpers
// ---------------------------------------------------------------------------

fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> RenderError {
    RenderError::Io { path: path.into(), source }
}

fn normalize_template_name(path: &Path) -> String {
    path.to_string_lossy()
        .replace('\\', "/")
        .to_lowercase()
}

fn load_user_templates(dir: &Path) -> Result<Vec<(String, String)>, RenderError> {
    if !dir.exists() {
        return Ok(vec![]);
    }
    let entries = std::fs::read_dir(dir).map_err(|e| io_err(dir, e))?;
    let mut templates = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| io_err(dir, e))?;
        let path = entry.path();
        let meta = entry.metadata().map_err(|e| io_err(&path, e))?;
        if !meta.is_file() || path.extension().and_then(|s| s.to_str()) != Some("tera") {
            continue;
        }
        let rel = path.strip_prefix(dir).unwrap_or(path.as_path());
        let name = normalize_template_name(rel);
        let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
        templates.push((name, contents));
    }
    Ok(templates)
}

fn build_tera(user_template_dir: Option<&Path>) -> Result<Tera, RenderError> {
    let mut templates: HashMap<String, String> = HashMap::new();
    for (name, content) in TPLS {
        templates.insert((*name).to_string(), (*content).to_string());
    }
    if let Some(dir) = user_template_dir {
        for (name, content) in load_user_templates(dir)? {
            templates.insert(name, content);
        }
    }

    let mut tera = Tera::default();
    let items: Vec<(String, String)> = templates.into_iter().collect();
    tera.add_raw_templates(items)?;
    Ok(tera)
}

/// Trim trailing whitespace and end with exactly one newline. Line endings
/// inside the output are left alone; job commands keep their `\r\n`.
fn finish(rendered: String) -> String {
    let mut out = rendered;
    let trimmed_len = out.trim_end().len();
    out.truncate(trimmed_len);
    out.push('\n');
    out
}

// ---------------------------------------------------------------------------
// Renderer
// ---------------------------------------------------------------------------

/// Renders `.sql` and agent-job files from embedded templates, optionally
/// overridden by same-named `.tera` files in a user template directory.
pub struct Renderer {
    tera: Tera,
}

impl Renderer {
    /// Construct a renderer with the embedded templates only.
    pub fn new() -> Result<Self, RenderError> {
        Self::with_template_dir(None)
    }

    /// Construct a renderer, letting `.tera` files in `dir` override the
    /// embedded templates of the same name.
    pub fn with_template_dir(dir: Option<&Path>) -> Result<Self, RenderError> {
        let tera = build_tera(dir)?;
        Ok(Renderer { tera })
    }

    /// Render a view or procedure script.
    pub fn render_object(&self, ctx: &ObjectContext) -> Result<String, RenderError> {
        let mut sections = Vec::with_capacity(3);
        if ctx.include_header {
            let tera_ctx = to_tera_context(&ctx.header())?;
            sections.push(finish(self.tera.render(OBJECT_HEADER_TEMPLATE, &tera_ctx)?));
        }
        if ctx.include_drop {
            let tera_ctx = to_tera_context(&ctx.drop_preamble())?;
            sections.push(finish(self.tera.render(DROP_PREAMBLE_TEMPLATE, &tera_ctx)?));
        }
        sections.push(normalize_body(&ctx.definition));
        Ok(sections.join("\n"))
    }

    /// Render a SQL Agent job definition.
    pub fn render_job(&self, job: &JobRecord) -> Result<String, RenderError> {
        let tera_ctx = to_tera_context(&JobCtx::from_record(job))?;
        Ok(finish(self.tera.render(AGENT_JOB_TEMPLATE, &tera_ctx)?))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
