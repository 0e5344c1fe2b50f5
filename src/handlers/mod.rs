// handlers/mod.rs - Three handler tiers
//
// Public (no token) → Protected (any valid session token) → Elevated (SUPERADMIN).
// Protected and elevated routes share the bearer-token middleware; the role check
// for elevated handlers goes through the access policy.
pub mod elevated;
pub mod protected;
pub mod public;
