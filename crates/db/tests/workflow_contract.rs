use std::collections::HashSet;
use std::sync::Arc;

use rust_decimal::Decimal;
use woms_core::audit::InMemoryAuditSink;
use woms_core::domain::actor::{Actor, Role};
use woms_core::domain::request::{DraftInput, DraftLineInput, RequestItemInput, Stage};
use woms_core::flows::WorkflowAction;
use woms_core::listing::{Ordering, Queue, RequestFilter};
use woms_core::session::Session;
use woms_db::repositories::{SqlNotificationRepository, SqlRequestRepository};
use woms_db::{connect_in_memory, migrations, DemoDataset, NotificationInbox, WorkflowStore};

type ContractTestResult<T = ()> = Result<T, String>;

macro_rules! require {
    ($cond:expr) => {
        if !$cond {
            return Err(format!("assertion failed: `{}`", stringify!($cond)));
        }
    };
    ($cond:expr, $($arg:tt)*) => {
        if !$cond {
            return Err(format!($($arg)*));
        }
    };
}

macro_rules! require_eq {
    ($left:expr, $right:expr) => {
        if $left != $right {
            return Err(format!(
                "assertion failed: `left == right` (`{:?}` != `{:?}`)",
                $left,
                $right
            ));
        }
    };
}

fn staff() -> Session {
    Session::new(Actor::new("staff-7", "Ivo Marsh", Role::WarehouseStaff), "contract-staff")
}

fn analyst() -> Session {
    Session::new(Actor::new("analyst-7", "Pia Lund", Role::BudgetAnalyst), "contract-analyst")
}

async fn sql_stack() -> ContractTestResult<(WorkflowStore, NotificationInbox)> {
    let pool = connect_in_memory().await.map_err(|error| error.to_string())?;
    migrations::run_pending(&pool).await.map_err(|error| error.to_string())?;
    let store = WorkflowStore::new(
        Arc::new(SqlRequestRepository::new(pool.clone())),
        Arc::new(InMemoryAuditSink::default()),
    );
    let inbox = NotificationInbox::new(Arc::new(SqlNotificationRepository::new(pool)), 15);
    Ok((store, inbox))
}

#[tokio::test]
async fn purchase_order_lifecycle_over_sqlite() -> ContractTestResult {
    let (store, inbox) = sql_stack().await?;

    let created = store
        .create(
            &staff(),
            vec![RequestItemInput { name: "Bolts".to_string(), quantity: 10, unit: None }],
        )
        .await
        .map_err(|error| error.to_string())?;
    require_eq!(created.stage, Stage::Submitted);

    let analyst_view = inbox.list(&analyst(), true, None).await.map_err(|error| error.to_string())?;
    require_eq!(analyst_view.unread_count, 1);

    store
        .transition(&created.id, WorkflowAction::Approve, &analyst())
        .await
        .map_err(|error| error.to_string())?;
    let drafted = store
        .transition(
            &created.id,
            WorkflowAction::Draft(DraftInput {
                supplier: "Acme".to_string(),
                shipping_instructions: String::new(),
                address: "Dock 1".to_string(),
                lines: vec![DraftLineInput {
                    description: "Bolts".to_string(),
                    unit: None,
                    quantity: 10,
                    unit_price: Decimal::new(5, 0),
                }],
            }),
            &analyst(),
        )
        .await
        .map_err(|error| error.to_string())?;
    let draft = drafted.draft.as_ref().ok_or("draft should be attached")?;
    require_eq!(draft.grand_total, Decimal::new(50, 0));

    let finalized = store
        .transition(&created.id, WorkflowAction::Finalize, &analyst())
        .await
        .map_err(|error| error.to_string())?;
    require_eq!(finalized.stage, Stage::Finalized);

    let replay = store.transition(&created.id, WorkflowAction::Approve, &analyst()).await;
    require!(
        matches!(&replay, Err(error) if error.is_invalid_transition()),
        "approving a finalized request should be an invalid transition, got {replay:?}"
    );

    let requester_view = inbox.list(&staff(), false, None).await.map_err(|error| error.to_string())?;
    require_eq!(requester_view.notifications.len(), 2);
    Ok(())
}

#[tokio::test]
async fn seeded_history_pages_cover_every_processed_request() -> ContractTestResult {
    let pool = connect_in_memory().await.map_err(|error| error.to_string())?;
    migrations::run_pending(&pool).await.map_err(|error| error.to_string())?;
    DemoDataset::load(&pool).await.map_err(|error| error.to_string())?;

    let store = WorkflowStore::new(
        Arc::new(SqlRequestRepository::new(pool)),
        Arc::new(InMemoryAuditSink::default()),
    );
    let reviewer = Session::new(DemoDataset::analyst(), "contract-history");
    let filter = RequestFilter { ordering: Ordering::ProcessedDesc, ..Default::default() };

    let mut seen = HashSet::new();
    let first = store
        .queue(&reviewer, Queue::History, filter.clone(), Some(1), Some(2))
        .await
        .map_err(|error| error.to_string())?;
    require_eq!(first.count, 4);
    require_eq!(first.total_pages, 2);

    for page in 1..=first.total_pages {
        let listed = store
            .queue(&reviewer, Queue::History, filter.clone(), Some(page), Some(2))
            .await
            .map_err(|error| error.to_string())?;
        for request in listed.results {
            require!(request.stage != Stage::Submitted, "history must not list pending requests");
            require!(seen.insert(request.id.clone()), "request {} listed twice", request.id);
        }
    }
    require_eq!(seen.len(), 4);
    Ok(())
}
