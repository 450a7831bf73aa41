//! Request handlers for the admin API

pub mod chatlogs;
pub mod kpi;
pub mod users;
