//! Community document schema
//!
//! The engine only reads these: existence checks, division lookups, and the
//! slug that anchors a community's URL namespace in page-view queries.

use bson::{doc, oid::ObjectId, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for communities
pub const COMMUNITY_COLLECTION: &str = "communities";

/// Community document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct CommunityDoc {
    /// MongoDB document ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    /// Common metadata (created_at, updated_at)
    #[serde(default)]
    pub metadata: Metadata,

    /// Community identifier (UUID, stored as its hyphenated string)
    pub community_id: String,

    /// URL slug, unique across communities
    pub slug: String,

    /// Division this community belongs to, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub division_id: Option<String>,
}

impl IntoIndexes for CommunityDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "community_id": 1 },
                Some(IndexOptions::builder().unique(true).build()),
            ),
            (
                doc! { "slug": 1 },
                Some(IndexOptions::builder().unique(true).build()),
            ),
        ]
    }
}

impl MutMetadata for CommunityDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
