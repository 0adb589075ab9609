//! Database migrations for the coach portal.
//!
//! This module contains all database migrations using SeaORM Migration.

pub use sea_orm_migration::prelude::*;

mod m2025_06_10_090000_create_clients;
mod m2025_06_10_091000_create_oauth_states;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m2025_06_10_090000_create_clients::Migration),
            Box::new(m2025_06_10_091000_create_oauth_states::Migration),
        ]
    }
}
