use cucumber::given;

use crate::cucumber::{campfund_world::LedgerSystem, CampfundWorld};

#[given("a fresh install")]
async fn fresh_database(world: &mut CampfundWorld) {
    let system = LedgerSystem::new().await;
    world.system = Some(system);
}
