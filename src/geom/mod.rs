mod extent;
mod repair;
mod wkb;

pub(crate) use extent::extent_of;
pub use repair::{GeometryRepairer, RepairError, RepairedGeometry};
pub(crate) use wkb::{multipolygon_from_wkb, multipolygon_to_wkb, point_from_wkb, point_to_wkb};
