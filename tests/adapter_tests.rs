//! Standard schema adapter against an attached tenant schema.

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::DatabaseConnection;
use taxdesk::adapters::{
    AffiliateUpdate, CommissionFilter, CommissionStatus, DiscountCodeFilter, DiscountCodeUpdate,
    NewAffiliate, NewDiscountCode, NewDocument, PageRequest, SchemaAdapter, StandardAdapter,
};
use taxdesk::error::CoreError;

#[path = "test_utils/mod.rs"]
mod test_utils;

use test_utils::{
    insert_affiliate, insert_client, insert_commission, insert_dependent, insert_filing,
    setup_tenant_db,
};

const SCHEMA: &str = "acme_tax";

/// Three clients, two of them with filings, one referred by `aff-1`.
async fn seeded_tenant() -> DatabaseConnection {
    let db = setup_tenant_db(SCHEMA).await.unwrap();
    let base = Utc::now() - Duration::days(10);

    insert_affiliate(&db, SCHEMA, "aff-1").await.unwrap();
    insert_client(&db, SCHEMA, "c1", ("Ada", "Lovelace"), Some("aff-1"), base)
        .await
        .unwrap();
    insert_client(&db, SCHEMA, "c2", ("Alan", "Turing"), None, base + Duration::days(1))
        .await
        .unwrap();
    insert_client(&db, SCHEMA, "c3", ("Grace", "Hopper"), None, base + Duration::days(2))
        .await
        .unwrap();

    insert_filing(&db, SCHEMA, "f1", "c1", 2023, base).await.unwrap();
    insert_filing(&db, SCHEMA, "f2", "c1", 2024, base + Duration::days(3))
        .await
        .unwrap();
    insert_filing(&db, SCHEMA, "f3", "c2", 2024, base + Duration::days(4))
        .await
        .unwrap();
    insert_dependent(&db, SCHEMA, "d1", "c1", ("Byron", "Lovelace"))
        .await
        .unwrap();

    db
}

#[tokio::test]
async fn test_list_clients_pages_newest_first() {
    let db = seeded_tenant().await;
    let adapter = StandardAdapter;

    let first = adapter
        .list_clients(&db, SCHEMA, PageRequest { page: 1, per_page: 2 })
        .await
        .unwrap();
    assert_eq!(first.total, 3);
    assert_eq!(
        first.items.iter().map(|c| c.id.as_str()).collect::<Vec<_>>(),
        ["c3", "c2"]
    );

    let second = adapter
        .list_clients(&db, SCHEMA, PageRequest { page: 2, per_page: 2 })
        .await
        .unwrap();
    assert_eq!(second.items.len(), 1);
    assert_eq!(second.items[0].id, "c1");

    // the government id column never comes back
    let json = serde_json::to_string(&second.items[0]).unwrap();
    assert!(!json.contains("ssn"));
}

#[tokio::test]
async fn test_client_lookup_and_comprehensive_view() {
    let db = seeded_tenant().await;
    let adapter = StandardAdapter;

    let client = adapter.client_by_id(&db, SCHEMA, "c1").await.unwrap();
    assert_eq!(client.last_name, "Lovelace");
    assert_eq!(client.affiliate_id.as_deref(), Some("aff-1"));

    let full = adapter.client_comprehensive(&db, SCHEMA, "c1").await.unwrap();
    assert_eq!(full.dependents.len(), 1);
    assert_eq!(
        full.filings.iter().map(|f| f.tax_year).collect::<Vec<_>>(),
        [2024, 2023]
    );
    assert!(full.documents.is_empty());

    assert!(matches!(
        adapter.client_by_id(&db, SCHEMA, "missing").await,
        Err(CoreError::NotFound { entity: "client", .. })
    ));
}

#[tokio::test]
async fn test_clients_with_filings_skips_clients_without_any() {
    let db = seeded_tenant().await;
    let page = StandardAdapter
        .clients_with_filings(&db, SCHEMA, PageRequest::default())
        .await
        .unwrap();

    assert_eq!(page.total, 2);
    let ids: Vec<_> = page.items.iter().map(|i| i.client.id.as_str()).collect();
    assert_eq!(ids, ["c2", "c1"]);
    assert_eq!(page.items[0].filings.len(), 1);
    assert_eq!(page.items[1].filings.len(), 2);
}

#[tokio::test]
async fn test_affiliate_create_update_and_validation() {
    let db = setup_tenant_db(SCHEMA).await.unwrap();
    let adapter = StandardAdapter;

    let created = adapter
        .create_affiliate(
            &db,
            SCHEMA,
            NewAffiliate {
                name: " Referral Partners ".to_string(),
                email: "partners@example.com".to_string(),
                phone: None,
                commission_rate: dec!(0.15),
            },
        )
        .await
        .unwrap();
    assert_eq!(created.name, "Referral Partners");
    assert_eq!(created.commission_rate, dec!(0.15));
    assert!(created.is_active);

    let updated = adapter
        .update_affiliate(
            &db,
            SCHEMA,
            &created.id,
            AffiliateUpdate {
                is_active: Some(false),
                ..AffiliateUpdate::default()
            },
        )
        .await
        .unwrap();
    assert!(!updated.is_active);
    assert_eq!(updated.email, "partners@example.com");

    let too_generous = adapter
        .create_affiliate(
            &db,
            SCHEMA,
            NewAffiliate {
                name: "Greedy".to_string(),
                email: "greedy@example.com".to_string(),
                phone: None,
                commission_rate: dec!(1.5),
            },
        )
        .await;
    assert!(matches!(too_generous, Err(CoreError::MalformedInput(_))));

    assert!(matches!(
        adapter
            .update_affiliate(&db, SCHEMA, "missing", AffiliateUpdate::default())
            .await,
        Err(CoreError::NotFound { .. })
    ));
    assert_eq!(adapter.list_affiliates(&db, SCHEMA).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_commission_lifecycle() {
    let db = seeded_tenant().await;
    let adapter = StandardAdapter;
    let now = Utc::now();
    insert_commission(&db, SCHEMA, "k1", "aff-1", 5000, "PENDING", now)
        .await
        .unwrap();

    let approved_at = now + Duration::minutes(5);
    let approved = adapter
        .approve_commission(&db, SCHEMA, "k1", approved_at)
        .await
        .unwrap();
    assert_eq!(approved.status, CommissionStatus::Approved);
    assert!(approved.approved_at.is_some());
    assert_eq!(approved.amount, dec!(50.00));

    let paid_at = now + Duration::days(2);
    let paid = adapter
        .mark_commission_paid(&db, SCHEMA, "k1", paid_at)
        .await
        .unwrap();
    assert_eq!(paid.status, CommissionStatus::Paid);
    // approval timestamp survives payment and precedes it
    let (approved_ts, paid_ts) = (paid.approved_at.unwrap(), paid.paid_at.unwrap());
    assert!(approved_ts < paid_ts);
    assert_eq!(approved_ts.timestamp(), approved_at.timestamp());
    assert_eq!(paid_ts.timestamp(), paid_at.timestamp());

    match adapter.cancel_commission(&db, SCHEMA, "k1", now).await {
        Err(CoreError::IllegalStateTransition { from, to }) => {
            assert_eq!(from, "PAID");
            assert_eq!(to, "CANCELLED");
        }
        other => panic!("expected IllegalStateTransition, got {other:?}"),
    }

    assert!(matches!(
        adapter.approve_commission(&db, SCHEMA, "missing", now).await,
        Err(CoreError::NotFound { entity: "commission", .. })
    ));
}

#[tokio::test]
async fn test_pending_commission_cannot_be_paid() {
    let db = seeded_tenant().await;
    let adapter = StandardAdapter;
    let now = Utc::now();
    insert_commission(&db, SCHEMA, "k1", "aff-1", 1000, "PENDING", now)
        .await
        .unwrap();

    let refused = adapter.mark_commission_paid(&db, SCHEMA, "k1", now).await;
    assert!(matches!(
        refused,
        Err(CoreError::IllegalStateTransition { .. })
    ));
    assert_eq!(refused.unwrap_err().status_code().as_u16(), 409);

    let untouched = adapter
        .list_commissions(
            &db,
            SCHEMA,
            CommissionFilter {
                affiliate_id: Some("aff-1".to_string()),
                ..CommissionFilter::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(untouched.len(), 1);
    assert_eq!(untouched[0].status, CommissionStatus::Pending);
    assert!(untouched[0].paid_at.is_none());

    let cancelled = adapter
        .cancel_commission(&db, SCHEMA, "k1", now)
        .await
        .unwrap();
    assert_eq!(cancelled.status, CommissionStatus::Cancelled);
    assert!(cancelled.cancelled_at.is_some());
}

#[tokio::test]
async fn test_commission_filters_and_stats() {
    let db = seeded_tenant().await;
    let adapter = StandardAdapter;
    let now = Utc::now();
    insert_affiliate(&db, SCHEMA, "aff-2").await.unwrap();
    insert_commission(&db, SCHEMA, "k1", "aff-1", 1000, "PENDING", now - Duration::hours(3))
        .await
        .unwrap();
    insert_commission(&db, SCHEMA, "k2", "aff-1", 2500, "PAID", now - Duration::hours(2))
        .await
        .unwrap();
    insert_commission(&db, SCHEMA, "k3", "aff-1", 700, "CANCELLED", now - Duration::hours(1))
        .await
        .unwrap();
    insert_commission(&db, SCHEMA, "k4", "aff-2", 9900, "PENDING", now)
        .await
        .unwrap();

    let mine = adapter
        .list_commissions(
            &db,
            SCHEMA,
            CommissionFilter {
                affiliate_id: Some("aff-1".to_string()),
                ..CommissionFilter::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(
        mine.iter().map(|c| c.id.as_str()).collect::<Vec<_>>(),
        ["k3", "k2", "k1"]
    );

    let pending = adapter
        .list_commissions(
            &db,
            SCHEMA,
            CommissionFilter {
                status: Some(CommissionStatus::Pending),
                limit: Some(1),
                ..CommissionFilter::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, "k4");

    let stats = adapter.affiliate_stats(&db, SCHEMA, "aff-1").await.unwrap();
    assert_eq!(stats.referred_clients, 1);
    assert_eq!(stats.commission_count, 3);
    assert_eq!(stats.pending_amount, dec!(10.00));
    assert_eq!(stats.approved_amount, dec!(0));
    assert_eq!(stats.paid_amount, dec!(25.00));
    assert_eq!(stats.cancelled_amount, dec!(7.00));
}

#[tokio::test]
async fn test_stats_totals_beyond_i64_cents() {
    let db = seeded_tenant().await;
    let now = Utc::now();
    insert_commission(&db, SCHEMA, "k1", "aff-1", i64::MAX, "PAID", now - Duration::hours(1))
        .await
        .unwrap();
    insert_commission(&db, SCHEMA, "k2", "aff-1", i64::MAX, "PAID", now)
        .await
        .unwrap();

    let stats = StandardAdapter
        .affiliate_stats(&db, SCHEMA, "aff-1")
        .await
        .unwrap();
    assert_eq!(stats.commission_count, 2);
    assert_eq!(
        stats.paid_amount,
        Decimal::from_i128_with_scale(i128::from(i64::MAX) * 2, 2)
    );
    assert_eq!(stats.pending_amount, dec!(0));
}

#[tokio::test]
async fn test_discount_codes_are_upper_cased_and_found_case_insensitively() {
    let db = setup_tenant_db(SCHEMA).await.unwrap();
    let adapter = StandardAdapter;
    let now = Utc::now();

    let created = adapter
        .create_discount_code(
            &db,
            SCHEMA,
            NewDiscountCode {
                code: "spring-25".to_string(),
                affiliate_id: Some("aff-1".to_string()),
                amount_off: Some(dec!(25.00)),
                percent_off: None,
                valid_from: Some(now - Duration::days(1)),
                valid_until: Some(now + Duration::days(30)),
                max_uses: Some(100),
            },
        )
        .await
        .unwrap();
    assert_eq!(created.code, "SPRING-25");
    assert_eq!(created.amount_off, Some(dec!(25.00)));
    assert_eq!(created.current_uses, 0);
    assert!(created.is_valid(now));

    let found = adapter
        .discount_code_by_code(&db, SCHEMA, "Spring-25")
        .await
        .unwrap();
    assert_eq!(found.id, created.id);

    adapter
        .deactivate_discount_code(&db, SCHEMA, &created.id)
        .await
        .unwrap();
    let deactivated = adapter
        .discount_code_by_id(&db, SCHEMA, &created.id)
        .await
        .unwrap();
    assert!(!deactivated.is_active);
    assert!(!deactivated.is_valid(now));

    let active = adapter
        .list_discount_codes(
            &db,
            SCHEMA,
            DiscountCodeFilter {
                affiliate_id: None,
                active_only: true,
            },
        )
        .await
        .unwrap();
    assert!(active.is_empty());
}

#[tokio::test]
async fn test_discount_code_validation() {
    let db = setup_tenant_db(SCHEMA).await.unwrap();
    let adapter = StandardAdapter;
    let now = Utc::now();
    let base = NewDiscountCode {
        code: "FALL".to_string(),
        affiliate_id: None,
        amount_off: None,
        percent_off: Some(dec!(15)),
        valid_from: None,
        valid_until: None,
        max_uses: None,
    };

    let no_terms = NewDiscountCode {
        percent_off: None,
        ..base.clone()
    };
    let inverted_window = NewDiscountCode {
        valid_from: Some(now),
        valid_until: Some(now - Duration::days(1)),
        ..base.clone()
    };
    let bad_code = NewDiscountCode {
        code: "two words".to_string(),
        ..base.clone()
    };
    for request in [no_terms, inverted_window, bad_code] {
        assert!(matches!(
            adapter.create_discount_code(&db, SCHEMA, request).await,
            Err(CoreError::MalformedInput(_))
        ));
    }

    let created = adapter.create_discount_code(&db, SCHEMA, base).await.unwrap();
    assert_eq!(created.percent_off, Some(dec!(15)));

    let updated = adapter
        .update_discount_code(
            &db,
            SCHEMA,
            &created.id,
            DiscountCodeUpdate {
                max_uses: Some(10),
                ..DiscountCodeUpdate::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.max_uses, Some(10));

    assert!(matches!(
        adapter.discount_code_by_code(&db, SCHEMA, "WINTER").await,
        Err(CoreError::NotFound { .. })
    ));
}

#[tokio::test]
async fn test_documents_follow_their_filing() {
    let db = seeded_tenant().await;
    let adapter = StandardAdapter;
    let upload = |client_id: &str| NewDocument {
        filing_id: "f1".to_string(),
        client_id: client_id.to_string(),
        file_name: "w2.pdf".to_string(),
        content_type: Some("application/pdf".to_string()),
        storage_path: "acme/c1/f1/w2.pdf".to_string(),
        size_bytes: 2048,
        uploaded_by: Some("staff-1".to_string()),
    };

    assert!(matches!(
        adapter.create_document(&db, SCHEMA, upload("c2")).await,
        Err(CoreError::MalformedInput(_))
    ));

    let document = adapter.create_document(&db, SCHEMA, upload("c1")).await.unwrap();
    assert_eq!(document.filing_id, "f1");
    assert_eq!(document.size_bytes, 2048);

    let listed = adapter.documents_by_filing(&db, SCHEMA, "f1").await.unwrap();
    assert_eq!(listed, vec![document.clone()]);

    adapter.delete_document(&db, SCHEMA, &document.id).await.unwrap();
    assert!(matches!(
        adapter.document_by_id(&db, SCHEMA, &document.id).await,
        Err(CoreError::NotFound { .. })
    ));
    assert!(matches!(
        adapter.delete_document(&db, SCHEMA, &document.id).await,
        Err(CoreError::NotFound { .. })
    ));
}

#[tokio::test]
async fn test_schemas_do_not_leak_into_each_other() {
    let db = setup_tenant_db("globex").await.unwrap();
    let adapter = StandardAdapter;
    let page = adapter
        .list_clients(&db, "globex", PageRequest::default())
        .await
        .unwrap();
    assert_eq!(page.total, 0);

    // the same pool has no acme_tax schema attached
    assert!(matches!(
        adapter.list_clients(&db, SCHEMA, PageRequest::default()).await,
        Err(CoreError::Database(_))
    ));
}
