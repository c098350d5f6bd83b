//! Given steps for node shutdown BDD scenarios.

use super::world::{NodeWorld, run_async, scenario_settings};
use overseer::process::{
    adapters::InMemoryAppState,
    domain::{NodeLifecycle, NodePlan, ProcessCommand, ProcessId, ProcessSpec, StopRequestKind},
    services::{Scheduler, StopRequestWatcher},
};
use std::sync::Arc;
use std::time::Duration;

use rstest_bdd_macros::given;

fn spec(id: ProcessId, dependencies: &[ProcessId]) -> Result<ProcessSpec, eyre::Report> {
    let command = ProcessCommand::new(format!("bin/{}", id.key()))?;
    Ok(ProcessSpec::spawned(id, command).with_dependencies(dependencies.iter().copied())?)
}

#[given("a node with search, web and compute engine processes")]
fn node_with_processes(world: &mut NodeWorld) -> Result<(), eyre::Report> {
    let plan = NodePlan::new([
        spec(ProcessId::SearchNode, &[])?,
        spec(ProcessId::WebServer, &[ProcessId::SearchNode])?,
        spec(ProcessId::ComputeEngine, &[ProcessId::WebServer])?,
    ])?;
    world.scheduler = Some(Arc::new(Scheduler::new(
        Arc::clone(&world.launcher),
        Arc::new(InMemoryAppState::new()),
        plan,
        scenario_settings(),
    )));
    Ok(())
}

#[given("the compute engine ignores stop requests")]
fn compute_engine_ignores_stops(world: &mut NodeWorld) -> Result<(), eyre::Report> {
    world.launcher.make_unresponsive(ProcessId::ComputeEngine)?;
    Ok(())
}

#[given("the node is operational")]
fn node_is_operational(world: &mut NodeWorld) -> Result<(), eyre::Report> {
    let scheduler = Arc::clone(world.scheduler()?);
    let source = Arc::clone(&world.signals);
    let target = Arc::clone(&scheduler);
    let watcher = StopRequestWatcher::new(
        StopRequestKind::Graceful,
        source,
        target,
        Duration::from_millis(5),
    );
    run_async(async {
        scheduler.schedule()?;
        let mut lifecycle = scheduler.subscribe();
        tokio::time::timeout(
            Duration::from_secs(2),
            lifecycle.wait_for(|state| *state == NodeLifecycle::Operational),
        )
        .await??;
        Ok::<(), eyre::Report>(())
    })?;
    watcher.start_watching();
    world.watcher = Some(watcher);
    Ok(())
}
