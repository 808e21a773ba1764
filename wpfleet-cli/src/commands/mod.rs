pub mod destroy;
pub mod domain;
pub mod jobs;
pub mod provision;
pub mod sites;
