//! Queue operations against the in-memory store.

use super::helpers::{QueueHarness, harness};
use chrono::Duration;
use overseer::queue::domain::{
    ActivityStatus, QueueStatus, SubmitComponent, SubmitOption, TaskFailure, WorkersPauseStatus,
};
use overseer::queue::ports::QueueStoreError;
use overseer::queue::services::CeQueueError;
use rstest::rstest;
use std::collections::BTreeSet;

const PER_ENTITY: &[SubmitOption] = &[SubmitOption::UniqueQueuePerEntity];

#[rstest]
#[tokio::test]
async fn second_submit_for_same_entity_is_skipped(harness: QueueHarness) {
    let first = harness
        .queue
        .submit(harness.submission("REPORT", "E1"), PER_ENTITY)
        .await
        .expect("first submit");
    harness.tick();
    let second = harness
        .queue
        .submit(harness.submission("REPORT", "E1"), PER_ENTITY)
        .await
        .expect("second submit");

    let kept = first.expect("first submission enqueued");
    assert!(second.is_none());
    let queued = harness.store.queued_tasks();
    assert_eq!(queued.len(), 1);
    assert_eq!(queued.first().map(|task| task.id), Some(kept.id()));
}

#[rstest]
#[tokio::test]
async fn submit_without_options_never_deduplicates(harness: QueueHarness) {
    for _ in 0..2 {
        harness
            .queue
            .submit(harness.submission("REPORT", "E1"), &[])
            .await
            .expect("submit")
            .expect("enqueued");
    }
    assert_eq!(harness.store.queued_tasks().len(), 2);
}

#[rstest]
#[tokio::test]
async fn unique_per_task_type_ignores_entity(harness: QueueHarness) {
    let options = [SubmitOption::UniqueQueuePerTaskType];
    harness
        .queue
        .submit(harness.submission("AUDIT_PURGE", "E1"), &options)
        .await
        .expect("submit")
        .expect("enqueued");
    let skipped = harness
        .queue
        .submit(harness.submission("AUDIT_PURGE", "E2"), &options)
        .await
        .expect("submit");
    let other_type = harness
        .queue
        .submit(harness.submission("REPORT", "E2"), &options)
        .await
        .expect("submit");

    assert!(skipped.is_none());
    assert!(other_type.is_some());
}

#[rstest]
#[tokio::test]
async fn resubmitting_a_known_id_is_a_store_error(harness: QueueHarness) {
    let submission = harness.submission("REPORT", "E1");
    harness
        .queue
        .submit(submission.clone(), &[])
        .await
        .expect("first submit");

    let result = harness.queue.submit(submission, &[]).await;

    assert!(matches!(
        result,
        Err(CeQueueError::Store(QueueStoreError::DuplicateTask(_)))
    ));
    assert_eq!(harness.store.queued_tasks().len(), 1);
}

#[rstest]
#[tokio::test]
async fn mass_submit_admits_exactly_one_per_idle_entity(harness: QueueHarness) {
    let batch = vec![
        harness.submission("REPORT", "E1"),
        harness.submission("REPORT", "E1"),
        harness.submission("REPORT", "E1"),
    ];
    let first_id = batch.first().map(|submission| submission.id());

    let submitted = harness
        .queue
        .mass_submit(batch, PER_ENTITY)
        .await
        .expect("mass submit");

    assert_eq!(submitted.len(), 1);
    assert_eq!(submitted.first().map(|task| task.id()), first_id);
    assert_eq!(harness.store.queued_tasks().len(), 1);
}

#[rstest]
#[tokio::test]
async fn mass_submit_skips_entities_with_pending_work(harness: QueueHarness) {
    harness
        .queue
        .submit(harness.submission("REPORT", "E1"), &[])
        .await
        .expect("seed submit");
    harness.tick();

    let batch = vec![
        harness.submission("REPORT", "E1"),
        harness.submission("REPORT", "E2"),
        harness.global_submission("AUDIT_PURGE"),
    ];
    let submitted = harness
        .queue
        .mass_submit(batch, PER_ENTITY)
        .await
        .expect("mass submit");

    let types: Vec<&str> = submitted.iter().map(|task| task.task_type()).collect();
    assert_eq!(types, ["REPORT", "AUDIT_PURGE"]);
    assert_eq!(
        submitted
            .first()
            .and_then(|task| task.entity())
            .map(|entity| entity.uuid()),
        Some("E2")
    );
    assert_eq!(harness.store.queued_tasks().len(), 3);
}

#[rstest]
#[tokio::test]
async fn cancel_moves_pending_task_to_history(harness: QueueHarness) {
    let task = harness
        .queue
        .submit(harness.submission("REPORT", "E1"), &[])
        .await
        .expect("submit")
        .expect("enqueued");
    harness.store.store_task_input(task.id(), b"report.zip".to_vec());

    harness.queue.cancel(task.id()).await.expect("cancel");

    assert!(harness.store.queued_tasks().is_empty());
    assert!(!harness.store.has_task_input(task.id()));
    let activity = harness.store.activity(task.id()).expect("activity row");
    assert_eq!(activity.status, ActivityStatus::Canceled);
    assert_eq!(activity.execution_time_ms, 0);
    assert_eq!(activity.node_name.as_deref(), Some("node-a"));
    assert_eq!(harness.store.activities().len(), 1);
}

#[rstest]
#[tokio::test]
async fn cancel_refuses_in_progress_task(harness: QueueHarness) {
    let task = harness
        .queue
        .submit(harness.submission("REPORT", "E1"), &[])
        .await
        .expect("submit")
        .expect("enqueued");
    harness
        .queue
        .peek("worker-1")
        .await
        .expect("peek")
        .expect("task handed out");

    let result = harness.queue.cancel(task.id()).await;

    let Err(CeQueueError::IllegalState(message)) = result else {
        panic!("expected illegal state, got {result:?}");
    };
    assert!(message.contains("can't be canceled"));
    assert_eq!(harness.store.queued_tasks().len(), 1);
    assert!(harness.store.activities().is_empty());
}

#[rstest]
#[tokio::test]
async fn cancel_of_unknown_task_is_illegal_state(harness: QueueHarness) {
    let missing = harness.submission("REPORT", "E1").id();
    let result = harness.queue.cancel(missing).await;
    assert!(matches!(result, Err(CeQueueError::IllegalState(_))));
}

#[rstest]
#[tokio::test]
async fn fail_records_error_and_execution_time(harness: QueueHarness) {
    let task = harness
        .queue
        .submit(harness.submission("REPORT", "E1"), &[])
        .await
        .expect("submit")
        .expect("enqueued");
    harness.tick();
    harness
        .queue
        .peek("worker-1")
        .await
        .expect("peek")
        .expect("task handed out");
    harness.clock.advance(Duration::milliseconds(1_500));

    harness
        .queue
        .fail(
            task.id(),
            TaskFailure::new(Some("IAE".to_owned()), Some("boom".to_owned())),
        )
        .await
        .expect("fail");

    assert!(harness.store.queued_tasks().is_empty());
    let activity = harness.store.activity(task.id()).expect("activity row");
    assert_eq!(activity.status, ActivityStatus::Failed);
    assert_eq!(activity.error_type.as_deref(), Some("IAE"));
    assert_eq!(activity.error_message.as_deref(), Some("boom"));
    assert_eq!(activity.execution_time_ms, 1_500);
    assert_eq!(activity.worker_uuid.as_deref(), Some("worker-1"));
}

#[rstest]
#[tokio::test]
async fn fail_refuses_pending_task(harness: QueueHarness) {
    let task = harness
        .queue
        .submit(harness.submission("REPORT", "E1"), &[])
        .await
        .expect("submit")
        .expect("enqueued");

    let result = harness.queue.fail(task.id(), TaskFailure::default()).await;

    assert!(matches!(result, Err(CeQueueError::IllegalState(_))));
    assert_eq!(harness.store.queued_tasks().len(), 1);
    assert!(harness.store.activities().is_empty());
}

#[rstest]
#[case::canceled(ActivityStatus::Canceled, None)]
#[case::success_with_error(
    ActivityStatus::Success,
    Some(TaskFailure::new(Some("IAE".to_owned()), None))
)]
#[tokio::test]
async fn remove_rejects_invalid_outcomes(
    harness: QueueHarness,
    #[case] status: ActivityStatus,
    #[case] failure: Option<TaskFailure>,
) {
    let task = harness
        .queue
        .submit(harness.submission("REPORT", "E1"), &[])
        .await
        .expect("submit")
        .expect("enqueued");

    let result = harness.queue.remove(task.id(), status, failure).await;

    assert!(matches!(result, Err(CeQueueError::InvalidArgument(_))));
    assert_eq!(harness.store.queued_tasks().len(), 1);
}

#[rstest]
#[tokio::test]
async fn remove_records_worker_success(harness: QueueHarness) {
    let task = harness
        .queue
        .submit(harness.submission("REPORT", "E1"), &[])
        .await
        .expect("submit")
        .expect("enqueued");
    harness
        .queue
        .peek("worker-1")
        .await
        .expect("peek")
        .expect("task handed out");
    harness.clock.advance(Duration::seconds(2));

    harness
        .queue
        .remove(task.id(), ActivityStatus::Success, None)
        .await
        .expect("remove");

    let activity = harness.store.activity(task.id()).expect("activity row");
    assert_eq!(activity.status, ActivityStatus::Success);
    assert_eq!(activity.execution_time_ms, 2_000);
    assert!(harness.store.queued_tasks().is_empty());
}

#[rstest]
#[tokio::test]
async fn lost_removal_race_rolls_back_history(harness: QueueHarness) {
    let task = harness
        .queue
        .submit(harness.submission("REPORT", "E1"), &[])
        .await
        .expect("submit")
        .expect("enqueued");
    harness.store.store_task_input(task.id(), b"payload".to_vec());
    harness.store.contend_next_removal(task.id());

    harness.queue.cancel(task.id()).await.expect("lost race is not an error");

    assert_eq!(harness.store.queued_tasks().len(), 1);
    assert!(harness.store.activities().is_empty());
    assert!(harness.store.has_task_input(task.id()));
}

#[rstest]
#[tokio::test]
async fn pause_status_follows_in_progress_count(harness: QueueHarness) {
    harness
        .queue
        .submit(harness.submission("REPORT", "E1"), &[])
        .await
        .expect("submit");

    harness.queue.pause_workers().await.expect("pause");
    assert_eq!(
        harness.queue.workers_pause_status().await.expect("status"),
        WorkersPauseStatus::Paused
    );

    harness.queue.resume_workers().await.expect("resume");
    harness
        .queue
        .peek("worker-1")
        .await
        .expect("peek")
        .expect("task handed out");
    harness.queue.pause_workers().await.expect("pause again");
    assert_eq!(
        harness.queue.workers_pause_status().await.expect("status"),
        WorkersPauseStatus::Pausing
    );

    harness.queue.resume_workers().await.expect("resume again");
    assert_eq!(
        harness.queue.workers_pause_status().await.expect("status"),
        WorkersPauseStatus::Resumed
    );
}

#[rstest]
#[tokio::test]
async fn peek_hands_out_nothing_while_paused(harness: QueueHarness) {
    harness
        .queue
        .submit(harness.submission("REPORT", "E1"), &[])
        .await
        .expect("submit");
    harness.queue.pause_workers().await.expect("pause");

    let peeked = harness.queue.peek("worker-1").await.expect("peek");

    assert!(peeked.is_none());
    assert!(
        harness
            .store
            .queued_tasks()
            .iter()
            .all(|task| task.status == QueueStatus::Pending)
    );
}

#[rstest]
#[tokio::test]
async fn peek_serves_oldest_first(harness: QueueHarness) {
    let first = harness
        .queue
        .submit(harness.submission("REPORT", "E1"), &[])
        .await
        .expect("submit")
        .expect("enqueued");
    harness.tick();
    let second = harness
        .queue
        .submit(harness.submission("REPORT", "E2"), &[])
        .await
        .expect("submit")
        .expect("enqueued");

    let a = harness.queue.peek("worker-1").await.expect("peek");
    let b = harness.queue.peek("worker-2").await.expect("peek");
    let none = harness.queue.peek("worker-3").await.expect("peek");

    assert_eq!(a.map(|task| task.id()), Some(first.id()));
    assert_eq!(b.map(|task| task.id()), Some(second.id()));
    assert!(none.is_none());
}

#[rstest]
#[tokio::test]
async fn peek_rejects_blank_worker(harness: QueueHarness) {
    let result = harness.queue.peek("  ").await;
    assert!(matches!(result, Err(CeQueueError::InvalidArgument(_))));
}

#[rstest]
#[tokio::test]
async fn peek_returns_stale_work_of_same_worker(harness: QueueHarness) {
    let task = harness
        .queue
        .submit(harness.submission("REPORT", "E1"), &[])
        .await
        .expect("submit")
        .expect("enqueued");
    harness
        .queue
        .peek("worker-1")
        .await
        .expect("peek")
        .expect("task handed out");
    harness.tick();

    let again = harness.queue.peek("worker-1").await.expect("peek");

    assert_eq!(again.map(|picked| picked.id()), Some(task.id()));
    let queued = harness.store.queued_tasks();
    assert_eq!(queued.len(), 1);
    assert_eq!(
        queued.first().map(|row| row.status),
        Some(QueueStatus::InProgress)
    );
}

#[rstest]
#[tokio::test]
async fn cancel_all_spares_in_progress_unless_cleared(harness: QueueHarness) {
    for entity in ["E1", "E2", "E3"] {
        harness
            .queue
            .submit(harness.submission("REPORT", entity), &[])
            .await
            .expect("submit");
        harness.tick();
    }
    let running = harness
        .queue
        .peek("worker-1")
        .await
        .expect("peek")
        .expect("task handed out");

    let cancelled = harness.queue.cancel_all(false).await.expect("cancel all");

    assert_eq!(cancelled, 2);
    let remaining = harness.store.queued_tasks();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining.first().map(|task| task.id), Some(running.id()));

    let cleared = harness.queue.clear().await.expect("clear");

    assert_eq!(cleared, 1);
    assert!(harness.store.queued_tasks().is_empty());
    assert_eq!(harness.store.activities().len(), 3);
    assert!(
        harness
            .store
            .activities()
            .iter()
            .all(|activity| activity.status == ActivityStatus::Canceled)
    );
}

#[rstest]
#[tokio::test]
async fn tasks_of_unknown_workers_return_to_pending(harness: QueueHarness) {
    for entity in ["E1", "E2"] {
        harness
            .queue
            .submit(harness.submission("REPORT", entity), &[])
            .await
            .expect("submit");
        harness.tick();
    }
    harness.queue.peek("alive").await.expect("peek");
    harness.queue.peek("gone").await.expect("peek");

    let known = BTreeSet::from(["alive".to_owned()]);
    let reset = harness
        .queue
        .reset_tasks_with_unknown_workers(&known)
        .await
        .expect("reset");

    assert_eq!(reset, 1);
    let workers: Vec<Option<String>> = harness
        .store
        .queued_tasks()
        .into_iter()
        .filter(|task| task.status == QueueStatus::InProgress)
        .map(|task| task.worker_uuid)
        .collect();
    assert_eq!(workers, [Some("alive".to_owned())]);
}

#[rstest]
#[tokio::test]
async fn submitted_task_resolves_references(harness: QueueHarness) {
    harness.register_project("P1", "my-project");
    harness.register_user("U1", "alice");
    let submission = harness
        .queue
        .prepare_submit()
        .set_type("REPORT")
        .set_component(SubmitComponent::entity("P1").expect("valid uuid"))
        .set_submitter_uuid("U1")
        .build()
        .expect("valid submission");

    let task = harness
        .queue
        .submit(submission, &[])
        .await
        .expect("submit")
        .expect("enqueued");

    let component = task.component().expect("component");
    assert_eq!(component.key(), Some("my-project"));
    assert_eq!(component.name(), Some("my-project project"));
    assert_eq!(task.submitter().and_then(|user| user.login()), Some("alice"));

    harness.store.delete_component("P1");
    let found = harness
        .queue
        .find(task.id())
        .await
        .expect("find")
        .expect("still queued");
    let unresolved = found.component().expect("component uuid kept");
    assert_eq!(unresolved.uuid(), "P1");
    assert!(unresolved.key().is_none());
}
