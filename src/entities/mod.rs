// Entity Models
// "Identity persists, values change"
//
// - Building: live record and pending addition share one shape
// - PendingDeletion: back-reference to a live record + submission time

pub mod building;
pub mod deletion;

pub use building::{
    new_building_id, Building, BuildingFields, BuildingType, PendingAddition, Style, Tile,
};
pub use deletion::PendingDeletion;
