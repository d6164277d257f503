pub mod access;
pub mod backend;
pub mod cache;
pub mod clock;
pub mod cmd;
pub mod db;
pub mod fees;
pub mod invitations;
pub mod metrics;
pub mod pubsub;
pub mod store;
pub mod utils;
