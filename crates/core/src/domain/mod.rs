pub mod category;
pub mod claim;
pub mod itinerary;
pub mod trip;
pub mod user;
