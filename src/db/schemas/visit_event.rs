//! Authenticated visit event schema
//!
//! One row per authenticated visit, written by the content pipeline when a
//! visitor is admitted. Historical analytics read these once the live
//! presence window has expired.

use bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for visit events
pub const VISIT_EVENT_COLLECTION: &str = "visit_events";

/// Authenticated visit event stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct VisitEventDoc {
    /// MongoDB document ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    /// Common metadata (created_at, updated_at)
    #[serde(default)]
    pub metadata: Metadata,

    /// Visited community (UUID, stored as its hyphenated string)
    pub community_id: String,

    /// Authenticated visitor
    pub user_id: String,

    /// Visitor's home division at visit time, if known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visitor_division_id: Option<String>,

    /// Community's division at visit time, if known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub community_division_id: Option<String>,

    /// Whether the visit crossed divisions
    #[serde(default)]
    pub is_cross_division: bool,

    /// When the visit happened
    pub visited_at: DateTime,
}

impl Default for VisitEventDoc {
    fn default() -> Self {
        Self {
            _id: None,
            metadata: Metadata::default(),
            community_id: String::new(),
            user_id: String::new(),
            visitor_division_id: None,
            community_division_id: None,
            is_cross_division: false,
            visited_at: DateTime::from_millis(0),
        }
    }
}

impl IntoIndexes for VisitEventDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            // one row per community+user+timestamp
            (
                doc! { "community_id": 1, "user_id": 1, "visited_at": 1 },
                Some(IndexOptions::builder().unique(true).build()),
            ),
            // range scans per community
            (doc! { "community_id": 1, "visited_at": 1 }, None),
        ]
    }
}

impl MutMetadata for VisitEventDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
