pub mod auth;
pub mod checkin;
pub mod middleware;
pub mod recipient;
pub mod webhook;
