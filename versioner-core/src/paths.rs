//! Destination tree layout.
//!
//! ```text
//! <repo>/src/<SourceType>/<database>/<VIEW|PROCEDURE>/<schema>/<object>.sql
//! <repo>/src/<SourceType>/<server>/SQL_AGENT_JOBS/<job>.txt
//! ```
//!
//! Every component below `<SourceType>` passes through [`sanitize_filename`].
//! All functions here are pure.

use std::path::{Path, PathBuf};

use crate::types::{ObjectKind, SourceType};

pub const SOURCE_FOLDER: &str = "src";
pub const AGENT_JOBS_FOLDER: &str = "SQL_AGENT_JOBS";

/// Make `name` safe as a single path component.
///
/// Characters outside `[A-Za-z0-9_.-]` become `_`, runs of `_` collapse, and
/// leading/trailing `_` are trimmed. An empty result (or one made only of dots,
/// which would walk the tree) becomes `unnamed`.
pub fn sanitize_filename(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        let c = if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
            c
        } else {
            '_'
        };
        if c == '_' && out.ends_with('_') {
            continue;
        }
        out.push(c);
    }
    let trimmed = out.trim_matches('_');
    if trimmed.is_empty() || trimmed.chars().all(|c| c == '.') {
        return "unnamed".to_string();
    }
    trimmed.to_string()
}

/// `<repo>/src/<SourceType>`
pub fn source_root(repo_root: &Path, source: SourceType) -> PathBuf {
    repo_root.join(SOURCE_FOLDER).join(source.dir_name())
}

/// Destination of a view or procedure. `container` is the database name.
pub fn object_path(
    repo_root: &Path,
    source: SourceType,
    container: &str,
    kind: ObjectKind,
    schema: &str,
    name: &str,
) -> PathBuf {
    source_root(repo_root, source)
        .join(sanitize_filename(container))
        .join(kind.dir_name())
        .join(sanitize_filename(schema))
        .join(format!("{}.sql", sanitize_filename(name)))
}

/// Destination of a SQL Agent job definition.
pub fn job_path(repo_root: &Path, source: SourceType, server: &str, job_name: &str) -> PathBuf {
    source_root(repo_root, source)
        .join(sanitize_filename(server))
        .join(AGENT_JOBS_FOLDER)
        .join(format!("{}.txt", sanitize_filename(job_name)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_replaces_collapses_and_trims() {
        assert_eq!(sanitize_filename("Sales Report (v2)"), "Sales_Report_v2");
        assert_eq!(sanitize_filename("__a  b__"), "a_b");
        assert_eq!(sanitize_filename("dbo.v-1"), "dbo.v-1");
        assert_eq!(sanitize_filename("ümlaut"), "mlaut");
    }

    #[test]
    fn sanitize_empty_becomes_unnamed() {
        assert_eq!(sanitize_filename(""), "unnamed");
        assert_eq!(sanitize_filename("???"), "unnamed");
        assert_eq!(sanitize_filename(".."), "unnamed");
    }

    #[test]
    fn object_path_layout() {
        let p = object_path(
            Path::new("/repo"),
            SourceType::Fabric,
            "Sales DB",
            ObjectKind::View,
            "dbo",
            "V1",
        );
        assert_eq!(p, PathBuf::from("/repo/src/Fabric/Sales_DB/VIEW/dbo/V1.sql"));
    }

    #[test]
    fn job_path_layout() {
        let p = job_path(Path::new("/repo"), SourceType::OnPrem, "SQL01\\PROD", "Nightly: ETL");
        assert_eq!(
            p,
            PathBuf::from("/repo/src/OnPrem/SQL01_PROD/SQL_AGENT_JOBS/Nightly_ETL.txt")
        );
    }
}
