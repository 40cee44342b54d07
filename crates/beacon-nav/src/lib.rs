//! # Beacon Nav
//!
//! Point-of-interest navigation over a host world.
//!
//! This crate provides the simulation-side half of guidance:
//! - Categorised entity lists built by scanning the loaded area
//! - Staged rescans while an area finishes loading, then periodic refresh
//! - A cursor for cycling categories and entries, with spoken summaries
//! - Route planning against a walkable-surface oracle, replanned on a timer
//! - Auto-traversal that emits movement intent and recovers from getting stuck
//! - A mock world implementing both host interfaces, for tests and demos
//!
//! The host is reached only through [`WorldQuery`] and [`WalkableSurface`].

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod announce;
pub mod category;
pub mod cursor;
pub mod entity;
pub mod mock;
pub mod names;
pub mod planner;
pub mod scanner;
pub mod traverse;
pub mod world;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::announce::*;
    pub use crate::category::*;
    pub use crate::cursor::*;
    pub use crate::entity::*;
    pub use crate::mock::*;
    pub use crate::names::*;
    pub use crate::planner::*;
    pub use crate::scanner::*;
    pub use crate::traverse::*;
    pub use crate::world::*;
}

pub use prelude::*;

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_common::Vec3;

    #[test]
    fn test_scan_select_plan() {
        let mut world = MockWorld::new();
        world.spawn(RecordKind::Transition, Vec3::new(0.0, 0.0, 12.0), "north gate");
        world.add_blocker(Vec3::new(0.0, 0.0, 6.0), 2.0);

        let mut scanner = AreaScanner::new(ScannerConfig::default(), NameCache::shared());
        scanner.rescan(&world, Vec3::ZERO);

        let mut cursor = NavigationCursor::new();
        cursor.cycle_category(CycleDirection::Forward, scanner.lists());
        let target = cursor.current(scanner.lists()).expect("gate").clone();
        assert_eq!(target.name, "north gate");

        let mut planner = PathPlanner::new(PlannerConfig::default());
        let plan = planner.plan(&world, Vec3::ZERO, target.position);
        assert_eq!(plan.completeness(), Completeness::Complete);
        assert!(plan.waypoints().len() >= 3);
    }
}
