// Department hierarchy and the tenant's company profile.

pub mod handlers;
pub mod tree;
