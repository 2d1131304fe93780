// Tenant administration (platform surface) and per-tenant quotas.

pub mod handlers;
pub mod quota;
