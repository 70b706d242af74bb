mod campfund_world;
mod setups;
mod steps;

pub use campfund_world::CampfundWorld;
