use std::sync::Arc;

use rust_decimal::Decimal;

use woms_core::audit::TracingAuditSink;
use woms_core::domain::actor::{Actor, Role};
use woms_core::domain::request::{DraftInput, DraftLineInput, RequestItemInput, Stage};
use woms_core::errors::ApplicationError;
use woms_core::flows::WorkflowAction;
use woms_core::session::Session;

use crate::connection::DbPool;
use crate::repositories::{RepositoryError, SqlRequestRepository};
use crate::workflow::WorkflowStore;

pub const SEED_REQUESTER_ID: &str = "seed-staff-1";
pub const SEED_ANALYST_ID: &str = "seed-analyst-1";

/// One demo request per stage, each driven through the real workflow so the
/// stored rows, references and notifications look exactly like live data.
const SEED_FLOWS: &[SeedFlowContract] = &[
    SeedFlowContract {
        target: Stage::Submitted,
        item: "Pallet wrap",
        quantity: 12,
        unit: "rolls",
        unit_price: 1850,
        description: "Awaiting budget review",
    },
    SeedFlowContract {
        target: Stage::Approved,
        item: "Safety gloves",
        quantity: 40,
        unit: "pairs",
        unit_price: 325,
        description: "Approved, waiting for a purchase order",
    },
    SeedFlowContract {
        target: Stage::Rejected,
        item: "Forklift tyres",
        quantity: 4,
        unit: "pcs",
        unit_price: 42000,
        description: "Rejected during budget review",
    },
    SeedFlowContract {
        target: Stage::Drafted,
        item: "Bolts",
        quantity: 10,
        unit: "pcs",
        unit_price: 500,
        description: "Purchase order drafted, ready to finalize",
    },
    SeedFlowContract {
        target: Stage::Finalized,
        item: "Shelf labels",
        quantity: 500,
        unit: "pcs",
        unit_price: 12,
        description: "Purchase order finalized",
    },
];

pub struct DemoDataset;

impl DemoDataset {
    pub fn requester() -> Actor {
        Actor::new(SEED_REQUESTER_ID, "Rosa Delgado", Role::WarehouseStaff)
    }

    pub fn analyst() -> Actor {
        Actor::new(SEED_ANALYST_ID, "Ben Okafor", Role::BudgetAnalyst)
    }

    /// Seeds every stage once. A database that already holds seed requests is left alone.
    pub async fn load(pool: &DbPool) -> Result<SeedResult, ApplicationError> {
        if seeded_request_count(pool).await? > 0 {
            return Ok(SeedResult { flows_seeded: Vec::new(), skipped: true });
        }

        let store = WorkflowStore::new(
            Arc::new(SqlRequestRepository::new(pool.clone())),
            Arc::new(TracingAuditSink),
        );
        let requester = Session::new(Self::requester(), "seed");
        let analyst = Session::new(Self::analyst(), "seed");

        let mut flows_seeded = Vec::with_capacity(SEED_FLOWS.len());
        for flow in SEED_FLOWS {
            let created = store.create(&requester, vec![flow.item_input()]).await?;
            let mut request = created;
            for action in flow.actions() {
                request = store.transition(&request.id, action, &analyst).await?;
            }

            flows_seeded.push(FlowSeedInfo {
                stage: flow.target,
                reference: request.reference,
                description: flow.description,
            });
        }

        Ok(SeedResult { flows_seeded, skipped: false })
    }

    /// Checks that every stage has at least one seeded request.
    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::with_capacity(SEED_FLOWS.len() + 1);

        for flow in SEED_FLOWS {
            let present: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM restock_request WHERE requester_id = ?1 AND stage = ?2)",
            )
            .bind(SEED_REQUESTER_ID)
            .bind(flow.target.as_str())
            .fetch_one(pool)
            .await?;
            checks.push((flow.target.as_str(), present == 1));
        }

        let notifications: i64 = sqlx::query_scalar(
            "SELECT COUNT(1) FROM notification
             WHERE related_request_id IN (SELECT id FROM restock_request WHERE requester_id = ?1)",
        )
        .bind(SEED_REQUESTER_ID)
        .fetch_one(pool)
        .await?;
        let expected = SEED_FLOWS.iter().map(|flow| flow.actions().len() + 1).sum::<usize>();
        checks.push(("notifications", notifications == expected as i64));

        let all_present = checks.iter().all(|(_, ok)| *ok);
        Ok(VerificationResult { all_present, checks })
    }

    /// Removes seeded requests and their notifications.
    pub async fn clean(pool: &DbPool) -> Result<(), RepositoryError> {
        let mut tx = pool.begin().await?;

        sqlx::query(
            "DELETE FROM notification
             WHERE related_request_id IN (SELECT id FROM restock_request WHERE requester_id = ?1)",
        )
        .bind(SEED_REQUESTER_ID)
        .execute(&mut *tx)
        .await?;
        sqlx::query("DELETE FROM restock_request WHERE requester_id = ?1")
            .bind(SEED_REQUESTER_ID)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}

async fn seeded_request_count(pool: &DbPool) -> Result<i64, RepositoryError> {
    let count = sqlx::query_scalar("SELECT COUNT(1) FROM restock_request WHERE requester_id = ?1")
        .bind(SEED_REQUESTER_ID)
        .fetch_one(pool)
        .await?;
    Ok(count)
}

#[derive(Debug, Clone, Copy)]
struct SeedFlowContract {
    target: Stage,
    item: &'static str,
    quantity: i64,
    unit: &'static str,
    /// Minor units (cents).
    unit_price: i64,
    description: &'static str,
}

impl SeedFlowContract {
    fn item_input(&self) -> RequestItemInput {
        RequestItemInput {
            name: self.item.to_string(),
            quantity: self.quantity,
            unit: Some(self.unit.to_string()),
        }
    }

    fn draft_input(&self) -> DraftInput {
        DraftInput {
            supplier: "Harbor Industrial Supply".to_string(),
            shipping_instructions: "Deliver to receiving dock 2 before noon".to_string(),
            address: "88 Quay Street, Port District".to_string(),
            lines: vec![DraftLineInput {
                description: self.item.to_string(),
                unit: Some(self.unit.to_string()),
                quantity: self.quantity,
                unit_price: Decimal::new(self.unit_price, 2),
            }],
        }
    }

    fn actions(&self) -> Vec<WorkflowAction> {
        match self.target {
            Stage::Submitted => Vec::new(),
            Stage::Approved => vec![WorkflowAction::Approve],
            Stage::Rejected => vec![WorkflowAction::Reject],
            Stage::Drafted => {
                vec![WorkflowAction::Approve, WorkflowAction::Draft(self.draft_input())]
            }
            Stage::Finalized => vec![
                WorkflowAction::Approve,
                WorkflowAction::Draft(self.draft_input()),
                WorkflowAction::Finalize,
            ],
        }
    }
}

#[derive(Debug)]
pub struct SeedResult {
    pub flows_seeded: Vec<FlowSeedInfo>,
    pub skipped: bool,
}

#[derive(Debug)]
pub struct FlowSeedInfo {
    pub stage: Stage,
    pub reference: String,
    pub description: &'static str,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{connect_in_memory, migrations};

    async fn pool() -> DbPool {
        let pool = connect_in_memory().await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }

    #[test]
    fn every_stage_has_a_seed_flow() {
        for stage in Stage::ALL {
            assert!(SEED_FLOWS.iter().any(|flow| flow.target == stage), "missing {stage}");
        }
    }

    #[tokio::test]
    async fn load_then_verify_passes() {
        let pool = pool().await;

        let seeded = DemoDataset::load(&pool).await.expect("load");
        assert!(!seeded.skipped);
        assert_eq!(seeded.flows_seeded.len(), SEED_FLOWS.len());

        let verification = DemoDataset::verify(&pool).await.expect("verify");
        assert!(verification.all_present, "{:?}", verification.checks);
    }

    #[tokio::test]
    async fn second_load_is_skipped() {
        let pool = pool().await;
        DemoDataset::load(&pool).await.expect("first load");

        let again = DemoDataset::load(&pool).await.expect("second load");
        assert!(again.skipped);
        assert_eq!(seeded_request_count(&pool).await.expect("count"), SEED_FLOWS.len() as i64);
    }

    #[tokio::test]
    async fn clean_removes_seeded_rows() {
        let pool = pool().await;
        DemoDataset::load(&pool).await.expect("load");
        DemoDataset::clean(&pool).await.expect("clean");

        let verification = DemoDataset::verify(&pool).await.expect("verify");
        assert!(!verification.all_present);
        assert_eq!(seeded_request_count(&pool).await.expect("count"), 0);
    }
}
