//! Priority inbox: overdue actions, unanswered messages, upcoming deadlines
//! and stale relationships in one urgency-ordered feed.

use chrono::{DateTime, Utc};

use super::{run_feed, FeedQuery};
use crate::error::FeedError;
use crate::signals::{Feed, FeedKind, SourceType};
use crate::state::AppState;

pub const INBOX_SOURCES: [SourceType; 4] = [
    SourceType::OverdueAction,
    SourceType::UnansweredMessage,
    SourceType::UpcomingDeadline,
    SourceType::StaleRelationship,
];

pub async fn get_priority_inbox(
    state: &AppState,
    query: &FeedQuery,
    now: DateTime<Utc>,
) -> Result<Feed, FeedError> {
    let feed = run_feed(state, FeedKind::Urgency, &INBOX_SOURCES, query, now).await?;
    if !feed.errors.is_empty() {
        log::info!(
            "Priority inbox served with {} degraded branch(es)",
            feed.errors.len()
        );
    }
    Ok(feed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::test_db;
    use crate::db::{
        DbAction, DbCommunication, DbContact, DbMilestone, DbRelationshipHealth, OpsDb,
    };
    use crate::services::test_support::{now, state_for};
    use crate::signals::UrgencyTier;
    use crate::types::Config;

    fn seed(db: &OpsDb) {
        db.upsert_action(&DbAction {
            id: "a1".into(),
            title: Some("Send acquittal report".into()),
            project_code: Some("ACT-JH".into()),
            status: "open".into(),
            action_required: true,
            follow_up_date: Some("2026-09-30".into()),
            importance: Some("high".into()),
            contact_id: Some("c1".into()),
        })
        .unwrap();
        db.upsert_communication(&DbCommunication {
            id: "m1".into(),
            contact_id: Some("c1".into()),
            contact_name: Some("Jane Smith".into()),
            contact_email: Some("jane@example.com".into()),
            subject: Some("Partnership question".into()),
            direction: "inbound".into(),
            requires_response: true,
            responded_at: None,
            occurred_at: "2026-10-15T09:00:00Z".into(),
            project_code: Some("ACT-PS".into()),
        })
        .unwrap();
        db.upsert_milestone(&DbMilestone {
            id: "d1".into(),
            title: Some("Board pack due".into()),
            project_code: Some("ACT-JH".into()),
            due_date: Some("2026-10-19".into()),
            importance: Some("high".into()),
            status: "open".into(),
        })
        .unwrap();
        for (id, last) in [("c1", "2026-08-01"), ("c2", "2026-03-30")] {
            db.upsert_contact(&DbContact {
                id: id.into(),
                full_name: Some(format!("Contact {id}")),
                email: None,
                company_name: None,
                last_contact_date: Some(last.into()),
                engagement_status: "active".into(),
            })
            .unwrap();
        }
        db.upsert_relationship_health(&DbRelationshipHealth {
            contact_id: "c1".into(),
            temperature: 82,
            last_contact_at: Some("2026-10-15T09:00:00Z".into()),
        })
        .unwrap();
    }

    #[tokio::test]
    async fn inbox_merges_all_four_sources() {
        let (db, path) = test_db();
        seed(&db);
        let state = state_for(path, Config::default());

        let feed = get_priority_inbox(&state, &FeedQuery::default(), now())
            .await
            .unwrap();

        let ids: Vec<&str> = feed.items.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["action-a1", "deadline-d1", "message-m1", "contact-c1"]);
        assert_eq!(feed.items[0].score, 152.0);
        assert_eq!(feed.items[0].urgency_tier, UrgencyTier::Critical);
        // 2026-10-19 is 3 days out at noon on the 16th: 60 + 5*4 + 15.
        assert_eq!(feed.items[1].score, 95.0);
        assert_eq!(feed.items[1].urgency_tier, UrgencyTier::Medium);
        assert_eq!(feed.items[2].score, 90.0);
        assert_eq!(feed.items[2].urgency_tier, UrgencyTier::Medium);
        assert_eq!(feed.items[2].enrichment["relationshipHealth"]["band"], "hot");
        assert_eq!(feed.items[3].score, 68.0);

        // The 200-day contact is dropped before counting.
        assert_eq!(feed.counts.get(SourceType::StaleRelationship), 1);
        assert_eq!(feed.counts.total, 4);
        assert!(feed.errors.is_empty());
    }

    #[tokio::test]
    async fn stale_contact_carries_all_declared_context() {
        let (db, path) = test_db();
        seed(&db);
        let state = state_for(path, Config::default());

        let feed = get_priority_inbox(&state, &FeedQuery::default(), now())
            .await
            .unwrap();
        let stale = feed
            .items
            .iter()
            .find(|s| s.id == "contact-c1")
            .expect("stale contact");
        assert_eq!(stale.enrichment["relationshipHealth"]["temperature"], 82);
        assert_eq!(stale.enrichment["pipelineTotals"]["count"], 0);
        assert_eq!(
            stale.enrichment["lastCommunication"]["subject"],
            "Partnership question"
        );
    }

    #[tokio::test]
    async fn limit_and_project_are_applied() {
        let (db, path) = test_db();
        seed(&db);
        let state = state_for(path, Config::default());

        let feed = get_priority_inbox(
            &state,
            &FeedQuery {
                limit: Some(1),
                project: Some("ACT-JH".into()),
            },
            now(),
        )
        .await
        .unwrap();
        assert_eq!(feed.items.len(), 1);
        assert_eq!(feed.items[0].id, "action-a1");
        assert_eq!(feed.counts.total, 2);
    }

    #[tokio::test]
    async fn per_source_caps_come_from_config() {
        let (db, path) = test_db();
        for day in 1..=5 {
            db.upsert_action(&DbAction {
                id: format!("a{day}"),
                title: Some(format!("Action {day}")),
                project_code: None,
                status: "open".into(),
                action_required: true,
                follow_up_date: Some(format!("2026-10-0{day}")),
                importance: None,
                contact_id: None,
            })
            .unwrap();
        }
        let config: Config =
            serde_json::from_str(r#"{ "sources": { "overdueAction": { "limit": 2 } } }"#)
                .unwrap();
        let state = state_for(path, config);

        let feed = get_priority_inbox(&state, &FeedQuery::default(), now())
            .await
            .unwrap();
        assert_eq!(feed.counts.get(SourceType::OverdueAction), 2);
        assert_eq!(feed.items[0].id, "action-a1");
    }

    #[tokio::test]
    async fn long_dormant_contacts_do_not_hide_stale_relationships() {
        let (db, path) = test_db();
        let contacts = (1..=10)
            .map(|n| (format!("old{n}"), format!("2025-01-{n:02}")))
            .chain([("recent".to_string(), "2026-08-01".to_string())]);
        for (id, last) in contacts {
            db.upsert_contact(&DbContact {
                id,
                full_name: Some("Dormant partner".into()),
                email: None,
                company_name: None,
                last_contact_date: Some(last),
                engagement_status: "active".into(),
            })
            .unwrap();
        }
        let state = state_for(path, Config::default());

        let feed = get_priority_inbox(&state, &FeedQuery::default(), now())
            .await
            .unwrap();
        assert_eq!(feed.counts.get(SourceType::StaleRelationship), 1);
        assert_eq!(feed.items.len(), 1);
        assert_eq!(feed.items[0].id, "contact-recent");
        assert_eq!(feed.items[0].score, 68.0);
    }

    #[tokio::test]
    async fn missing_store_is_a_total_failure() {
        let dir = tempfile::tempdir().expect("tempdir");
        let state = state_for(dir.path().join("absent.db"), Config::default());
        let result = get_priority_inbox(&state, &FeedQuery::default(), now()).await;
        assert!(matches!(result, Err(FeedError::StoreUnavailable(_))));
    }
}
