// handlers/protected/mod.rs - Handlers for any valid session token
//
// Reads of field-user data go through the access policy, which masks school,
// teacher and district values for every role below SUPERADMIN.
pub mod dashboard;
pub mod export_requests;
pub mod records;
