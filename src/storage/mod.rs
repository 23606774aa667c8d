pub mod backup;
pub mod database;
pub mod path_utils;
pub mod state_store;
