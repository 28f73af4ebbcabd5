mod common;

use chrono::Duration;

use box_office_server::models::{AuditAction, AuditFilter, TicketStatus};
use box_office_server::utils::error::AppError;

use common::{admin, buyer, draft, Harness};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_two_buyers_for_the_last_seat() {
    let harness = Harness::new();
    let event = harness
        .state
        .catalog
        .create(&admin(), draft("Last Seat", 1))
        .await
        .unwrap();

    let first = {
        let issuance = harness.state.issuance.clone();
        tokio::spawn(async move { issuance.purchase(&buyer(10), event.id).await })
    };
    let second = {
        let issuance = harness.state.issuance.clone();
        tokio::spawn(async move { issuance.purchase(&buyer(11), event.id).await })
    };
    let results = [first.await.unwrap(), second.await.unwrap()];

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .any(|r| matches!(r, Err(AppError::CapacityExceeded(_)))));
    assert_eq!(
        harness.state.issuance.count_purchased(event.id).await.unwrap(),
        1
    );

    let (_, state) = harness.flush().await;
    let (logs, total) = state
        .audit
        .query(&AuditFilter {
            entity_type: Some("ticket".into()),
            action: Some(AuditAction::Create),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(total, 1);
    assert_eq!(logs.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_purchases_never_oversell() {
    let harness = Harness::new();
    let event = harness
        .state
        .catalog
        .create(&admin(), draft("Stampede", 10))
        .await
        .unwrap();

    let handles: Vec<_> = (0..100)
        .map(|i| {
            let issuance = harness.state.issuance.clone();
            tokio::spawn(async move { issuance.purchase(&buyer(100 + i), event.id).await })
        })
        .collect();

    let mut sold = 0;
    let mut refused = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => sold += 1,
            Err(AppError::CapacityExceeded(_)) => refused += 1,
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }
    assert_eq!(sold, 10);
    assert_eq!(refused, 90);
    assert_eq!(
        harness.state.issuance.count_purchased(event.id).await.unwrap(),
        10
    );
}

#[tokio::test]
async fn test_cancelled_ticket_frees_a_seat_and_stays_cancelled() {
    let harness = Harness::new();
    let issuance = &harness.state.issuance;
    let event = harness
        .state
        .catalog
        .create(&admin(), draft("Matinee", 1))
        .await
        .unwrap();

    let ticket = issuance.purchase(&buyer(5), event.id).await.unwrap();
    assert!(matches!(
        issuance.purchase(&buyer(6), event.id).await,
        Err(AppError::CapacityExceeded(_))
    ));

    let cancelled = issuance.cancel(&buyer(5), ticket.id).await.unwrap();
    assert_eq!(cancelled.status, TicketStatus::Cancelled);
    assert!(cancelled.updated_at >= ticket.updated_at);

    // Cancelling twice is refused and changes nothing.
    assert!(matches!(
        issuance.cancel(&buyer(5), ticket.id).await,
        Err(AppError::InvalidState(_))
    ));
    let reread = issuance.get(&buyer(5).actor, ticket.id).await.unwrap();
    assert_eq!(reread, cancelled);

    // The seat went back to the pool, but as a new ticket.
    let replacement = issuance.purchase(&buyer(6), event.id).await.unwrap();
    assert_ne!(replacement.id, ticket.id);
    assert_eq!(
        issuance.get(&admin().actor, ticket.id).await.unwrap().status,
        TicketStatus::Cancelled
    );
}

#[tokio::test]
async fn test_only_owner_or_admin_may_cancel() {
    let harness = Harness::new();
    let issuance = &harness.state.issuance;
    let event = harness
        .state
        .catalog
        .create(&admin(), draft("Recital", 5))
        .await
        .unwrap();
    let ticket = issuance.purchase(&buyer(20), event.id).await.unwrap();

    assert!(matches!(
        issuance.cancel(&buyer(21), ticket.id).await,
        Err(AppError::Forbidden(_))
    ));
    assert!(matches!(
        issuance.get(&buyer(21).actor, ticket.id).await,
        Err(AppError::Forbidden(_))
    ));
    assert!(issuance.cancel(&admin(), ticket.id).await.is_ok());
}

#[tokio::test]
async fn test_no_purchase_or_cancel_once_event_started() {
    let harness = Harness::new();
    let issuance = &harness.state.issuance;
    let upcoming = harness.raw_event("Upcoming", 5, Duration::days(1)).await;
    let ticket = issuance.purchase(&buyer(30), upcoming.id).await.unwrap();

    let started = harness.raw_event("Started", 5, Duration::hours(-1)).await;
    assert!(matches!(
        issuance.purchase(&buyer(30), started.id).await,
        Err(AppError::InvalidState(_))
    ));

    let imminent = harness
        .raw_event("Imminent", 5, Duration::milliseconds(300))
        .await;
    let late = issuance.purchase(&buyer(31), imminent.id).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(500)).await;
    assert!(matches!(
        issuance.cancel(&buyer(31), late.id).await,
        Err(AppError::InvalidState(_))
    ));
    assert!(matches!(
        issuance.purchase(&buyer(32), imminent.id).await,
        Err(AppError::InvalidState(_))
    ));

    // The upcoming event's ticket is still cancellable.
    assert!(issuance.cancel(&buyer(30), ticket.id).await.is_ok());
}

#[tokio::test]
async fn test_purchase_requires_identity_and_known_event() {
    let harness = Harness::new();
    let issuance = &harness.state.issuance;
    let event = harness
        .state
        .catalog
        .create(&admin(), draft("Gala", 5))
        .await
        .unwrap();

    let anonymous = box_office_server::models::RequestContext::new(
        box_office_server::models::Actor::anonymous(),
        Default::default(),
    );
    assert!(matches!(
        issuance.purchase(&anonymous, event.id).await,
        Err(AppError::AuthError(_))
    ));
    assert!(matches!(
        issuance.purchase(&buyer(2), 9999).await,
        Err(AppError::NotFound(_))
    ));
    assert!(matches!(
        issuance.cancel(&buyer(2), 9999).await,
        Err(AppError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_ticket_listing_is_scoped_to_owner() {
    let harness = Harness::new();
    let issuance = &harness.state.issuance;
    let catalog = &harness.state.catalog;

    let event = catalog.create(&admin(), draft("Pop-up", 3)).await.unwrap();
    for user in [40, 40, 41] {
        issuance.purchase(&buyer(user), event.id).await.unwrap();
    }

    let (mine, total) = issuance
        .list(&buyer(40).actor, Default::default())
        .await
        .unwrap();
    assert_eq!(total, 2);
    assert!(mine.iter().all(|t| t.user_id == 40));

    let (all, total) = issuance
        .list(&admin().actor, Default::default())
        .await
        .unwrap();
    assert_eq!(total, 3);
    assert_eq!(all.len(), 3);
}
