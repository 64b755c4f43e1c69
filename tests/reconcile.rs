//! End-to-end behavior of the offline queue against an in-memory inventory.

use std::sync::Arc;
use std::time::Duration;

use stockflow::remote::{InventoryRemote, MemoryInventory, ProductRecord};
use stockflow::storage::Database;
use stockflow::sync::{
    ActionQueue, ActionState, Actor, EngineConfig, FailureDisposition, QueuedAction,
    ReconcileEngine, SaleLine,
};
use tempfile::TempDir;

fn memory_queue() -> Arc<ActionQueue> {
    Arc::new(ActionQueue::with_database(
        Database::open_in_memory().unwrap(),
    ))
}

fn clerk() -> Actor {
    Actor::new("u1", "clerk@shop.example")
}

fn line(product_id: &str, name: &str, quantity: u32) -> SaleLine {
    SaleLine {
        product_id: product_id.to_string(),
        product_name: name.to_string(),
        quantity,
        unit_price_cents: 500,
    }
}

fn sale(product_id: &str, name: &str, quantity: u32) -> QueuedAction {
    QueuedAction::sale(vec![line(product_id, name, quantity)], clerk())
}

fn restock(product_id: &str, name: &str, quantity: u32) -> QueuedAction {
    QueuedAction::restock(product_id, name, quantity, clerk())
}

fn engine(queue: &Arc<ActionQueue>, inventory: &Arc<MemoryInventory>) -> ReconcileEngine {
    ReconcileEngine::new(Arc::clone(queue), Arc::clone(inventory) as Arc<dyn InventoryRemote>)
}

#[tokio::test]
async fn drain_applies_everything_and_empties_queue() {
    let queue = memory_queue();
    let inventory = Arc::new(
        MemoryInventory::new()
            .with_product("p1", "Milk", 50)
            .with_product("p2", "Bread", 50),
    );

    for i in 1..=3 {
        queue.append(&sale("p1", "Milk", i)).unwrap();
    }
    queue.append(&restock("p2", "Bread", 5)).unwrap();
    queue.append(&sale("p2", "Bread", 10)).unwrap();

    let report = engine(&queue, &inventory).reconcile().await;

    assert_eq!(report.applied_count, 5);
    assert_eq!(report.conflicted_count, 0);
    assert_eq!(report.failed_count, 0);
    assert_eq!(report.remaining, 0);
    assert!(queue.list_all().unwrap().is_empty());
    assert_eq!(inventory.stock("p1"), Some(44));
    assert_eq!(inventory.stock("p2"), Some(45));
}

#[tokio::test]
async fn sale_exceeding_stock_is_conflicted_and_dropped() {
    let queue = memory_queue();
    let inventory = Arc::new(MemoryInventory::new().with_product("p1", "Milk", 2));
    queue.append(&sale("p1", "Milk", 5)).unwrap();

    let report = engine(&queue, &inventory).reconcile().await;

    assert_eq!(report.conflicted_count, 1);
    assert_eq!(report.applied_count, 0);
    assert_eq!(
        report.conflicts[0].reason,
        "Sale for Milk skipped: insufficient stock (2 available, 5 requested)"
    );
    assert_eq!(inventory.stock("p1"), Some(2));
    assert!(inventory.sales().is_empty());
    assert!(queue.list_all().unwrap().is_empty());
}

#[tokio::test]
async fn restock_adds_to_remote_stock() {
    let queue = memory_queue();
    let inventory = Arc::new(MemoryInventory::new().with_product("p1", "Milk", 2));
    queue.append(&restock("p1", "Milk", 10)).unwrap();

    let report = engine(&queue, &inventory).reconcile().await;

    assert_eq!(report.applied_count, 1);
    assert_eq!(inventory.stock("p1"), Some(12));
    assert_eq!(inventory.restocks().len(), 1);
}

#[tokio::test]
async fn sale_is_all_or_nothing() {
    let queue = memory_queue();
    let inventory = Arc::new(
        MemoryInventory::new()
            .with_product("p1", "Milk", 10)
            .with_product("p2", "Bread", 1)
            .with_product("p3", "Eggs", 10),
    );
    let action = QueuedAction::sale(
        vec![
            line("p1", "Milk", 2),
            line("p2", "Bread", 3),
            line("p3", "Eggs", 4),
        ],
        clerk(),
    );
    queue.append(&action).unwrap();

    let report = engine(&queue, &inventory).reconcile().await;

    assert_eq!(report.conflicted_count, 1);
    assert!(report.conflicts[0].reason.starts_with("Sale for Bread skipped"));
    assert_eq!(inventory.stock("p1"), Some(10));
    assert_eq!(inventory.stock("p2"), Some(1));
    assert_eq!(inventory.stock("p3"), Some(10));
}

#[tokio::test]
async fn lost_response_is_not_applied_twice() {
    let queue = memory_queue();
    let inventory = Arc::new(MemoryInventory::new().with_product("p1", "Milk", 10));
    let action = sale("p1", "Milk", 3);
    queue.append(&action).unwrap();
    let engine = engine(&queue, &inventory);

    // The apply commits remotely but the answer never arrives.
    inventory.lose_next_response(1);
    let first = engine.reconcile().await;
    assert_eq!(first.failed_count, 1);
    assert_eq!(first.failures[0].disposition, FailureDisposition::WillRetry);
    assert_eq!(
        queue.get(&action.id).unwrap().unwrap().state,
        ActionState::Pending
    );

    let second = engine.reconcile().await;
    assert_eq!(second.applied_count, 1);
    assert_eq!(inventory.stock("p1"), Some(7));
    assert_eq!(inventory.sales().len(), 1);
    assert!(queue.list_all().unwrap().is_empty());
}

#[tokio::test]
async fn interrupted_apply_is_resumed_through_idempotency_check() {
    let queue = memory_queue();
    let inventory = Arc::new(MemoryInventory::new().with_product("p1", "Milk", 10));
    let action = restock("p1", "Milk", 4);
    queue.append(&action).unwrap();

    // Simulate a drain that died after the remote write but before the
    // local bookkeeping.
    queue
        .update_state(&action.id, ActionState::Applying, 0)
        .unwrap();
    if let stockflow::sync::ActionPayload::Restock(payload) = &action.payload {
        inventory.apply_restock(&action.id, payload).await.unwrap();
    }

    let report = engine(&queue, &inventory).reconcile().await;

    assert_eq!(report.applied_count, 1);
    assert_eq!(inventory.stock("p1"), Some(14));
    assert_eq!(inventory.restocks().len(), 1);
    assert!(queue.list_all().unwrap().is_empty());
}

#[tokio::test]
async fn transient_failure_preserves_order() {
    let queue = memory_queue();
    let inventory = Arc::new(MemoryInventory::new().with_product("p1", "Milk", 0));
    let first = restock("p1", "Milk", 5);
    let second = sale("p1", "Milk", 3);
    queue.append(&first).unwrap();
    queue.append(&second).unwrap();
    let engine = engine(&queue, &inventory);

    inventory.fail_next(1);
    let report = engine.reconcile().await;

    assert_eq!(report.failed_count, 1);
    assert_eq!(report.failures[0].action_id, first.id);
    assert_eq!(report.applied_count, 0);
    assert_eq!(report.remaining, 2);
    assert_eq!(inventory.stock("p1"), Some(0));
    let ids: Vec<_> = queue.list_all().unwrap().iter().map(|a| a.id).collect();
    assert_eq!(ids, vec![first.id, second.id]);

    // The sale only fits once the earlier restock has landed.
    let report = engine.reconcile().await;
    assert_eq!(report.applied, vec![first.id, second.id]);
    assert_eq!(inventory.stock("p1"), Some(2));
}

#[tokio::test]
async fn conflict_does_not_block_later_actions() {
    let queue = memory_queue();
    let inventory = Arc::new(MemoryInventory::new().with_product("p1", "Milk", 3));
    let too_big = sale("p1", "Milk", 5);
    let fits = sale("p1", "Milk", 3);
    queue.append(&too_big).unwrap();
    queue.append(&fits).unwrap();

    let report = engine(&queue, &inventory).reconcile().await;

    assert_eq!(report.conflicts[0].action_id, too_big.id);
    assert_eq!(report.applied, vec![fits.id]);
    assert_eq!(inventory.stock("p1"), Some(0));
}

#[tokio::test]
async fn conflict_check_reads_fresh_remote_stock() {
    let queue = memory_queue();
    let inventory = Arc::new(MemoryInventory::new().with_product("p1", "Milk", 10));
    queue.append(&sale("p1", "Milk", 4)).unwrap();

    // Another device sold most of the stock while this one was offline.
    inventory.set_stock("p1", 1);

    let report = engine(&queue, &inventory).reconcile().await;
    assert_eq!(report.conflicted_count, 1);
    assert_eq!(inventory.stock("p1"), Some(1));
}

#[tokio::test]
async fn deleted_product_is_reported_as_conflict() {
    let queue = memory_queue();
    let inventory = Arc::new(MemoryInventory::new().with_product("p1", "Milk", 10));
    queue.append(&sale("p1", "Milk", 1)).unwrap();
    inventory.remove_product("p1");

    let report = engine(&queue, &inventory).reconcile().await;

    assert_eq!(
        report.conflicts[0].reason,
        "Sale for Milk skipped: product no longer exists"
    );
    assert!(queue.list_all().unwrap().is_empty());
}

#[tokio::test]
async fn slow_remote_times_out_as_transient_failure() {
    let queue = memory_queue();
    let inventory = Arc::new(MemoryInventory::new().with_product("p1", "Milk", 10));
    inventory.set_latency(Duration::from_millis(500));
    let action = sale("p1", "Milk", 1);
    queue.append(&action).unwrap();

    let config = EngineConfig {
        max_attempts: 5,
        remote_timeout: Duration::from_millis(20),
    };
    let engine = ReconcileEngine::with_config(
        Arc::clone(&queue),
        Arc::clone(&inventory) as Arc<dyn InventoryRemote>,
        config,
    );
    let report = engine.reconcile().await;

    assert_eq!(report.failed_count, 1);
    assert!(report.failures[0].error.contains("did not respond"));
    assert!(report.should_retry());
    assert_eq!(
        queue.get(&action.id).unwrap().unwrap().state,
        ActionState::Pending
    );
}

#[tokio::test]
async fn restock_of_unknown_product_is_parked() {
    let queue = memory_queue();
    let inventory = Arc::new(MemoryInventory::new());
    let action = restock("ghost", "Ghost", 1);
    queue.append(&action).unwrap();

    let report = engine(&queue, &inventory).reconcile().await;

    assert_eq!(report.failures[0].disposition, FailureDisposition::Rejected);
    let stored = queue.get(&action.id).unwrap().unwrap();
    assert_eq!(stored.state, ActionState::Failed);
    assert_eq!(stored.last_error.as_deref(), Some("Product ghost not found"));

    // Once the product exists the operator can retry it.
    inventory.upsert_product(ProductRecord {
        id: "ghost".to_string(),
        name: "Ghost".to_string(),
        quantity: 0,
        low_stock_threshold: 0,
    });
    queue.reset_for_retry(&action.id).unwrap();
    let report = engine(&queue, &inventory).reconcile().await;
    assert_eq!(report.applied_count, 1);
}

#[tokio::test]
async fn queue_survives_restart() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("queue.db");
    let actions = vec![sale("p1", "Milk", 1), restock("p1", "Milk", 2)];

    {
        let queue = ActionQueue::open_at(&path).unwrap();
        for action in &actions {
            queue.append(action).unwrap();
        }
    }

    let reopened = Arc::new(ActionQueue::open_at(&path).unwrap());
    let loaded = reopened.list_all().unwrap();
    assert_eq!(loaded, actions);

    let inventory = Arc::new(MemoryInventory::new().with_product("p1", "Milk", 5));
    let report = engine(&reopened, &inventory).reconcile().await;
    assert_eq!(report.applied_count, 2);
    assert_eq!(inventory.stock("p1"), Some(6));
}
