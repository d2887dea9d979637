pub mod channel_services;
pub mod edge_services;
pub mod rate_limit_services;
pub mod visit_services;
pub mod watch_services;

pub use channel_services::DynChannelsService;
pub use rate_limit_services::DynRateLimitService;
pub use visit_services::DynVisitService;
pub use watch_services::DynWatchService;
