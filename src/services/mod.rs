//! Business logic services.

pub mod espocrm_client;
pub mod sync_service;
pub mod sync_worker;
