//! Narrow capability interfaces over every external system the
//! orchestrators touch. No orchestrator or handler ever speaks to Docker,
//! the edge router, the application database, or the archive extractor
//! directly — everything goes through one of these traits, each of which
//! ships a real implementation and an in-memory fake
//! for tests.

pub mod appdb;
pub mod archive;
pub mod container;
pub mod edge;

pub use appdb::{AppDbOps, FakeAppDb, MariaDbAdmin};
pub use archive::{ArchiveOps, FakeArchive, ZipExtractor};
pub use container::{BollardContainers, ContainerOps, ContainerStatus, FakeContainers};
pub use edge::{CaddyEdge, EdgeConfigOps, FakeEdge};
