//! MongoDB-backed collaborator stores
//!
//! Implements the analytics collaborator traits over the content pipeline's
//! collections. Queries are plain indexed range scans; the pipeline owns the
//! schemas and their migration.

use async_trait::async_trait;
use bson::{doc, Bson, DateTime as BsonDateTime, Regex};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::db::schemas::{
    AnonymousPageViewDoc, AnonymousSessionDoc, CommunityDoc, VisitEventDoc,
    ANON_PAGE_VIEW_COLLECTION, ANON_SESSION_COLLECTION, COMMUNITY_COLLECTION,
    VISIT_EVENT_COLLECTION,
};
use crate::db::{MongoClient, MongoCollection};
use crate::types::Result;

use super::{
    AnonymousActivityStore, AnonymousPageView, AnonymousSession, CommunityDirectory, VisitEvent,
    VisitEventStore,
};

/// Collaborator stores over one MongoDB database
#[derive(Clone)]
pub struct MongoAnalyticsStore {
    communities: MongoCollection<CommunityDoc>,
    visits: MongoCollection<VisitEventDoc>,
    sessions: MongoCollection<AnonymousSessionDoc>,
    page_views: MongoCollection<AnonymousPageViewDoc>,
}

impl MongoAnalyticsStore {
    pub async fn new(client: &MongoClient) -> Result<Self> {
        Ok(Self {
            communities: client.collection(COMMUNITY_COLLECTION).await?,
            visits: client.collection(VISIT_EVENT_COLLECTION).await?,
            sessions: client.collection(ANON_SESSION_COLLECTION).await?,
            page_views: client.collection(ANON_PAGE_VIEW_COLLECTION).await?,
        })
    }

    async fn find_community(&self, community_id: Uuid) -> Result<Option<CommunityDoc>> {
        self.communities
            .find_one(doc! { "community_id": community_id.to_string() })
            .await
    }

    /// Mark an anonymous session as converted to an account.
    ///
    /// Called by the account pipeline when a fingerprinted device signs up;
    /// only the first conversion sticks.
    pub async fn mark_session_converted(
        &self,
        fingerprint: &str,
        user_id: &str,
        at: DateTime<Utc>,
    ) -> Result<()> {
        self.sessions
            .update_one(
                doc! { "fingerprint": fingerprint, "converted_to_user": Bson::Null },
                doc! { "$set": {
                    "converted_to_user": user_id,
                    "converted_at": BsonDateTime::from_chrono(at),
                } },
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl CommunityDirectory for MongoAnalyticsStore {
    async fn community_exists(&self, community_id: Uuid) -> Result<bool> {
        Ok(self.find_community(community_id).await?.is_some())
    }

    async fn community_division(&self, community_id: Uuid) -> Result<Option<String>> {
        Ok(self
            .find_community(community_id)
            .await?
            .and_then(|c| c.division_id))
    }

    async fn community_slug(&self, community_id: Uuid) -> Result<Option<String>> {
        Ok(self.find_community(community_id).await?.map(|c| c.slug))
    }
}

#[async_trait]
impl VisitEventStore for MongoAnalyticsStore {
    async fn record_authenticated_visit(&self, event: VisitEvent) -> Result<()> {
        self.visits
            .insert_one(VisitEventDoc {
                community_id: event.community_id.to_string(),
                user_id: event.user_id,
                visitor_division_id: event.visitor_division_id,
                community_division_id: event.community_division_id,
                is_cross_division: event.is_cross_division,
                visited_at: BsonDateTime::from_chrono(event.visited_at),
                ..Default::default()
            })
            .await?;
        Ok(())
    }

    async fn visits_in_range(
        &self,
        community_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<VisitEvent>> {
        let docs = self
            .visits
            .find_many(doc! {
                "community_id": community_id.to_string(),
                "visited_at": {
                    "$gte": BsonDateTime::from_chrono(start),
                    "$lt": BsonDateTime::from_chrono(end),
                },
            })
            .await?;

        Ok(docs.into_iter().filter_map(into_visit_event).collect())
    }
}

#[async_trait]
impl AnonymousActivityStore for MongoAnalyticsStore {
    async fn sessions_in_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<AnonymousSession>> {
        let docs = self
            .sessions
            .find_many(doc! {
                "started_at": {
                    "$gte": BsonDateTime::from_chrono(start),
                    "$lt": BsonDateTime::from_chrono(end),
                },
            })
            .await?;

        Ok(docs.into_iter().map(into_session).collect())
    }

    async fn page_views_for_path(
        &self,
        path: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<AnonymousPageView>> {
        // the path itself or anything under it
        let pattern = format!("^{}(/|$)", escape_regex(path));
        let docs = self
            .page_views
            .find_many(doc! {
                "url": Bson::RegularExpression(Regex {
                    pattern,
                    options: String::new(),
                }),
                "viewed_at": {
                    "$gte": BsonDateTime::from_chrono(start),
                    "$lt": BsonDateTime::from_chrono(end),
                },
            })
            .await?;

        Ok(docs
            .into_iter()
            .map(|d| AnonymousPageView {
                fingerprint: d.fingerprint,
                url: d.url,
                viewed_at: d.viewed_at.to_chrono(),
            })
            .collect())
    }
}

fn into_visit_event(doc: VisitEventDoc) -> Option<VisitEvent> {
    Some(VisitEvent {
        community_id: Uuid::parse_str(&doc.community_id).ok()?,
        user_id: doc.user_id,
        visitor_division_id: doc.visitor_division_id,
        community_division_id: doc.community_division_id,
        is_cross_division: doc.is_cross_division,
        visited_at: doc.visited_at.to_chrono(),
    })
}

fn into_session(doc: AnonymousSessionDoc) -> AnonymousSession {
    AnonymousSession {
        fingerprint: doc.fingerprint,
        device_type: doc.device_type,
        browser: doc.browser,
        os: doc.os,
        landing_page: doc.landing_page,
        started_at: doc.started_at.to_chrono(),
        converted_to_user: doc.converted_to_user,
        converted_at: doc.converted_at.map(|at| at.to_chrono()),
    }
}

/// Escape regex metacharacters so a slug cannot widen the match
fn escape_regex(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(
            c,
            '.' | '^' | '$' | '*' | '+' | '?' | '(' | ')' | '[' | ']' | '{' | '}' | '|' | '\\'
        ) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regex_escape_neutralizes_metacharacters() {
        assert_eq!(escape_regex("/c/plain-slug"), "/c/plain-slug");
        assert_eq!(escape_regex("/c/a.b"), "/c/a\\.b");
        assert_eq!(escape_regex("a+b*c"), "a\\+b\\*c");
    }
}
