//! Then steps for compute queue BDD scenarios.

use super::world::{QueueWorld, run_async};
use overseer::queue::{domain::ActivityStatus, services::CeQueueError};
use rstest_bdd_macros::then;

#[then("the last submission was skipped")]
fn last_submission_skipped(world: &QueueWorld) -> Result<(), eyre::Report> {
    match &world.last_submission {
        Some(None) => Ok(()),
        other => Err(eyre::eyre!("expected a skipped submission, got {other:?}")),
    }
}

#[then(r#"the queue holds {count:usize} task for entity "{entity}""#)]
fn queue_holds_for_entity(
    world: &QueueWorld,
    count: usize,
    entity: String,
) -> Result<(), eyre::Report> {
    let held = world
        .store
        .queued_tasks()
        .iter()
        .filter(|task| task.entity_uuid.as_deref() == Some(entity.as_str()))
        .count();
    if held != count {
        return Err(eyre::eyre!("expected {count} queued task(s) for {entity}, found {held}"));
    }
    Ok(())
}

#[then(r#"the activity of the task has status "{status}""#)]
fn activity_has_status(world: &QueueWorld, status: String) -> Result<(), eyre::Report> {
    let expected = ActivityStatus::try_from(status.as_str())?;
    let task_id = world.current_task()?.id();
    let activity = world
        .store
        .activity(task_id)
        .ok_or_else(|| eyre::eyre!("missing activity for {task_id}"))?;
    if activity.status != expected {
        return Err(eyre::eyre!("expected {expected}, found {}", activity.status));
    }
    Ok(())
}

#[then(r#"the activity of the task has error type "{error_type}""#)]
fn activity_has_error_type(world: &QueueWorld, error_type: String) -> Result<(), eyre::Report> {
    let task_id = world.current_task()?.id();
    let activity = world
        .store
        .activity(task_id)
        .ok_or_else(|| eyre::eyre!("missing activity for {task_id}"))?;
    if activity.error_type.as_deref() != Some(error_type.as_str()) {
        return Err(eyre::eyre!(
            "expected error type {error_type}, found {:?}",
            activity.error_type
        ));
    }
    Ok(())
}

#[then("the task is no longer queued")]
fn task_no_longer_queued(world: &QueueWorld) -> Result<(), eyre::Report> {
    let task_id = world.current_task()?.id();
    if run_async(world.queue.find(task_id))?.is_some() {
        return Err(eyre::eyre!("task {task_id} is still queued"));
    }
    Ok(())
}

#[then("the operation fails with an illegal state error")]
fn operation_fails_with_illegal_state(world: &QueueWorld) -> Result<(), eyre::Report> {
    match &world.last_error {
        Some(CeQueueError::IllegalState(_)) => Ok(()),
        other => Err(eyre::eyre!("expected an illegal state error, got {other:?}")),
    }
}

#[then(r#"the workers pause status is "{status}""#)]
fn workers_pause_status_is(world: &QueueWorld, status: String) -> Result<(), eyre::Report> {
    let actual = run_async(world.queue.workers_pause_status())?;
    if actual.as_str() != status {
        return Err(eyre::eyre!("expected pause status {status}, found {actual}"));
    }
    Ok(())
}
