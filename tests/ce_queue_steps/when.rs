//! When steps for compute queue BDD scenarios.

use super::world::{QueueWorld, run_async};
use overseer::queue::domain::{SubmitOption, TaskFailure};
use rstest_bdd_macros::when;

#[when(r#"a "{task_type}" task is submitted for entity "{entity}" with unique queue per entity"#)]
fn submit_unique_per_entity(
    world: &mut QueueWorld,
    task_type: String,
    entity: String,
) -> Result<(), eyre::Report> {
    let submission = world.submission(&task_type, &entity)?;
    let submitted = run_async(
        world
            .queue
            .submit(submission, &[SubmitOption::UniqueQueuePerEntity]),
    )?;
    if let Some(task) = &submitted {
        world.current_task = Some(task.clone());
    }
    world.last_submission = Some(submitted);
    Ok(())
}

#[when(r#"the task fails with error type "{error_type}" and message "{message}""#)]
fn task_fails(
    world: &mut QueueWorld,
    error_type: String,
    message: String,
) -> Result<(), eyre::Report> {
    let task_id = world.current_task()?.id();
    run_async(
        world
            .queue
            .fail(task_id, TaskFailure::new(Some(error_type), Some(message))),
    )?;
    Ok(())
}

#[when("the task is cancelled")]
fn task_is_cancelled(world: &mut QueueWorld) -> Result<(), eyre::Report> {
    let task_id = world.current_task()?.id();
    if let Err(err) = run_async(world.queue.cancel(task_id)) {
        world.last_error = Some(err);
    }
    Ok(())
}

#[when("workers are paused")]
fn workers_are_paused(world: &mut QueueWorld) -> Result<(), eyre::Report> {
    run_async(world.queue.pause_workers())?;
    Ok(())
}
