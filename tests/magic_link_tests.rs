//! Portal magic links in the control plane.

use chrono::{Duration, Utc};
use taxdesk::error::CoreError;
use taxdesk::repositories::MagicLinkRepository;

#[path = "test_utils/mod.rs"]
mod test_utils;

use test_utils::setup_test_db_arc;

#[tokio::test]
async fn test_link_is_consumed_exactly_once() {
    let links = MagicLinkRepository::new(setup_test_db_arc().await.unwrap());

    let link = links
        .issue("acme", "c1", " ada@example.com ", Duration::minutes(15))
        .await
        .unwrap();
    assert_eq!(link.id.len(), 64);
    assert_eq!(link.email, "ada@example.com");
    assert!(!link.used);

    let used = links
        .consume(
            &link.id,
            Some("203.0.113.7".to_string()),
            Some("Mozilla/5.0".to_string()),
            Utc::now(),
        )
        .await
        .unwrap();
    assert!(used.used);
    assert!(used.used_at.is_some());
    assert_eq!(used.ip_address.as_deref(), Some("203.0.113.7"));

    assert!(matches!(
        links.consume(&link.id, None, None, Utc::now()).await,
        Err(CoreError::InvalidOrExpiredToken)
    ));
}

#[tokio::test]
async fn test_expired_and_unknown_links_are_refused() {
    let links = MagicLinkRepository::new(setup_test_db_arc().await.unwrap());
    let link = links
        .issue("acme", "c1", "ada@example.com", Duration::minutes(15))
        .await
        .unwrap();

    let later = Utc::now() + Duration::minutes(16);
    assert!(matches!(
        links.consume(&link.id, None, None, later).await,
        Err(CoreError::InvalidOrExpiredToken)
    ));
    assert!(!links.find(&link.id).await.unwrap().unwrap().used);

    assert!(matches!(
        links.consume("nope", None, None, Utc::now()).await,
        Err(CoreError::InvalidOrExpiredToken)
    ));
}

#[tokio::test]
async fn test_purge_removes_only_expired_links() {
    let links = MagicLinkRepository::new(setup_test_db_arc().await.unwrap());
    let short = links
        .issue("acme", "c1", "ada@example.com", Duration::minutes(5))
        .await
        .unwrap();
    let long = links
        .issue("acme", "c2", "alan@example.com", Duration::hours(2))
        .await
        .unwrap();

    let removed = links
        .purge_expired(Utc::now() + Duration::minutes(30))
        .await
        .unwrap();
    assert_eq!(removed, 1);
    assert!(links.find(&short.id).await.unwrap().is_none());
    assert!(links.find(&long.id).await.unwrap().is_some());

    assert!(matches!(
        links.issue("acme", "c3", "  ", Duration::minutes(5)).await,
        Err(CoreError::MalformedInput(_))
    ));
}
