pub mod activity;
pub mod chat;
pub mod pickup;
pub mod quiz;
pub mod user;

pub use activity::{Activity, ActivityKind};
pub use pickup::{PickupRequest, PickupStatus};
pub use user::{AuthResponse, LoginRequest, RegisterRequest, User, UserProfile};
