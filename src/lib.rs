pub mod api_router;
pub mod config;
pub mod consequences;
pub mod events;
pub mod goals;
pub mod rewards;
pub mod shared;
pub mod skills;
