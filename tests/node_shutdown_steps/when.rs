//! When steps for node shutdown BDD scenarios.

use super::world::NodeWorld;
use overseer::process::domain::StopRequestKind;
use rstest_bdd_macros::when;

#[when("a graceful stop is requested")]
fn graceful_stop_requested(world: &mut NodeWorld) {
    world.signals.request(StopRequestKind::Graceful);
}
