// The caller's own account and tenant-admin user management.

pub mod handlers;
