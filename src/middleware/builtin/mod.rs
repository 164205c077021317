pub mod cookies;
pub mod robotstxt;
pub mod stats;

pub use cookies::CookiesDebugMiddleware;
pub use robotstxt::RobotsTxtMiddleware;
pub use stats::StatisticsMiddleware;
