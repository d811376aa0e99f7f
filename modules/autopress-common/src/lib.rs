pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::Config;
pub use error::AutopressError;
pub use traits::{Distributor, PageFetcher, Publisher, TextEmbedder};
pub use types::{
    AuditReport, Blueprint, BlueprintSection, ContentPlan, DraftPost, FetchedPage, KnowledgeEntry,
    PublishedPost, RelatedLink, SourceRecord,
};
