pub mod extract;
pub mod watermark;
