//! Anonymous session and page-view schemas
//!
//! Written by the content pipeline as anonymous traffic arrives. Sessions
//! carry the conversion pair (`converted_to_user`, `converted_at`) consumed
//! by the funnel metrics; page views tie a fingerprint to the URLs it hit.

use bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for anonymous sessions
pub const ANON_SESSION_COLLECTION: &str = "anonymous_sessions";

/// Collection name for anonymous page views
pub const ANON_PAGE_VIEW_COLLECTION: &str = "anonymous_page_views";

/// Anonymous browsing session stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct AnonymousSessionDoc {
    /// MongoDB document ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    /// Common metadata (created_at, updated_at)
    #[serde(default)]
    pub metadata: Metadata,

    /// Device fingerprint identifying the session
    pub fingerprint: String,

    /// Device class parsed from the user agent (desktop, mobile, tablet)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_type: Option<String>,

    /// Browser family parsed from the user agent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub browser: Option<String>,

    /// Operating system parsed from the user agent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub os: Option<String>,

    /// First URL the session landed on
    #[serde(skip_serializing_if = "Option::is_none")]
    pub landing_page: Option<String>,

    /// When the session started
    pub started_at: DateTime,

    /// User the session converted to, when it signed up
    #[serde(skip_serializing_if = "Option::is_none")]
    pub converted_to_user: Option<String>,

    /// When the conversion happened
    #[serde(skip_serializing_if = "Option::is_none")]
    pub converted_at: Option<DateTime>,
}

impl Default for AnonymousSessionDoc {
    fn default() -> Self {
        Self {
            _id: None,
            metadata: Metadata::default(),
            fingerprint: String::new(),
            device_type: None,
            browser: None,
            os: None,
            landing_page: None,
            started_at: DateTime::from_millis(0),
            converted_to_user: None,
            converted_at: None,
        }
    }
}

impl IntoIndexes for AnonymousSessionDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "fingerprint": 1, "started_at": 1 },
                Some(IndexOptions::builder().unique(true).build()),
            ),
            (doc! { "started_at": 1 }, None),
            (doc! { "converted_at": 1 }, None),
        ]
    }
}

impl MutMetadata for AnonymousSessionDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

/// One anonymous page view stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct AnonymousPageViewDoc {
    /// MongoDB document ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    /// Common metadata (created_at, updated_at)
    #[serde(default)]
    pub metadata: Metadata,

    /// Device fingerprint that viewed the page
    pub fingerprint: String,

    /// Path of the viewed page
    pub url: String,

    /// When the page was viewed
    pub viewed_at: DateTime,
}

impl Default for AnonymousPageViewDoc {
    fn default() -> Self {
        Self {
            _id: None,
            metadata: Metadata::default(),
            fingerprint: String::new(),
            url: String::new(),
            viewed_at: DateTime::from_millis(0),
        }
    }
}

impl IntoIndexes for AnonymousPageViewDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (doc! { "url": 1, "viewed_at": 1 }, None),
            (doc! { "fingerprint": 1, "viewed_at": 1 }, None),
        ]
    }
}

impl MutMetadata for AnonymousPageViewDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
