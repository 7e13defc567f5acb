//! # versioner-renderer
//!
//! Tera-based rendering of exported files: `.sql` scripts for views and
//! procedures, `.txt` definitions for SQL Agent jobs.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use versioner_core::types::ObjectKind;
//! use versioner_renderer::{ObjectContext, Renderer};
//!
//! fn render_one() {
//!     if let Ok(renderer) = Renderer::new() {
//!         let ctx = ObjectContext {
//!             server: "sql01".into(),
//!             database: "Sales".into(),
//!             schema: "dbo".into(),
//!             name: "V1".into(),
//!             kind: ObjectKind::View,
//!             modified: Some("2024-01-02 00:00:00".into()),
//!             definition: "CREATE VIEW dbo.V1 AS SELECT 1".into(),
//!             include_header: true,
//!             include_drop: true,
//!         };
//!         if let Ok(sql) = renderer.render_object(&ctx) {
//!             print!("{sql}");
//!         }
//!     }
//! }
//! ```

pub mod context;
pub mod engine;
pub mod error;

pub use context::{bracket_ident, normalize_body, ObjectContext};
pub use engine::Renderer;
pub use error::RenderError;
