pub mod domain;
pub mod health;
pub mod jobs;
pub mod sites;
