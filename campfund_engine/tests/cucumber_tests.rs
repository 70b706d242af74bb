mod cucumber;

use ::cucumber::{writer, World};
use futures_util::FutureExt;
use log::*;

use crate::cucumber::CampfundWorld;

fn main() {
    dotenvy::from_filename(".env.test").ok();
    env_logger::init();
    let rt = tokio::runtime::Runtime::new().expect("Could not start the test runtime");
    rt.block_on(
        CampfundWorld::cucumber()
            .with_writer(writer::Libtest::or_basic())
            .after(|_feature, _rule, scenario, ev, world| {
                CampfundWorld::after_scenario(&scenario.name, ev, world).boxed_local()
            })
            .run("tests/features"),
    );
    info!("🧪️ Reconciliation features complete");
}
