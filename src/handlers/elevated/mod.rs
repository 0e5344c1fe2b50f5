// handlers/elevated/mod.rs - SUPERADMIN-only handlers
pub mod export_requests;
pub mod lesson_plan;
