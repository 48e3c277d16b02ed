pub mod session;
pub mod stop;
pub mod trip;
pub mod user;
