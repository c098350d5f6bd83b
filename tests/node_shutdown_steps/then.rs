//! Then steps for node shutdown BDD scenarios.

use super::world::{NodeWorld, run_async};
use overseer::process::domain::ProcessId;
use rstest_bdd_macros::then;
use std::time::Duration;

#[then("the node is stopped")]
fn node_is_stopped(world: &NodeWorld) -> Result<(), eyre::Report> {
    let scheduler = world.scheduler()?;
    run_async(tokio::time::timeout(
        Duration::from_secs(2),
        scheduler.await_termination(),
    ))?;
    Ok(())
}

#[then("every process received {count:u32} stop request")]
fn every_process_received_stop(world: &NodeWorld, count: u32) -> Result<(), eyre::Report> {
    for process in ProcessId::ALL {
        let launched = world
            .launcher
            .latest(process)?
            .ok_or_else(|| eyre::eyre!("{process} was never launched"))?;
        if launched.stop_requests() != count {
            return Err(eyre::eyre!(
                "{process} received {} stop request(s)",
                launched.stop_requests()
            ));
        }
    }
    Ok(())
}

#[then("the compute engine was hard stopped")]
fn compute_engine_hard_stopped(world: &NodeWorld) -> Result<(), eyre::Report> {
    let ce = world
        .launcher
        .latest(ProcessId::ComputeEngine)?
        .ok_or_else(|| eyre::eyre!("compute engine was never launched"))?;
    if ce.hard_stop_requests() != 1 {
        return Err(eyre::eyre!(
            "expected one hard stop, found {}",
            ce.hard_stop_requests()
        ));
    }
    Ok(())
}
