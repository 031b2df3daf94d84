//! Environment-sourced configuration. These tests mutate the process
//! environment and run serially.

mod support;

use db_infra::{keys, DataSourceSettings, PersistenceSettings, Properties};
use serial_test::serial;

const VARS: &[&str] = &[
    "DATASOURCE_MAX_POOL_SIZE",
    "DATASOURCE_MIN_POOL_SIZE",
    "HIBERNATE_SHOW_SQL",
    "MIGRATION_LOCK_TIMEOUT_MS",
];

fn clear_vars() {
    for var in VARS {
        std::env::remove_var(var);
    }
}

#[test]
#[serial]
fn relaxed_env_names_are_read() {
    clear_vars();
    std::env::set_var("DATASOURCE_MAX_POOL_SIZE", "25");
    std::env::set_var("DATASOURCE_MIN_POOL_SIZE", "3");
    std::env::set_var("HIBERNATE_SHOW_SQL", "true");
    std::env::set_var("MIGRATION_LOCK_TIMEOUT_MS", "1500");

    let settings = PersistenceSettings::from_properties(&Properties::from_env()).expect("settings");
    clear_vars();

    let DataSourceSettings::Pooled(pool) = settings.datasource else {
        panic!("expected pooled settings");
    };
    assert_eq!(pool.max_pool_size, 25);
    assert_eq!(pool.min_pool_size, 3);
    assert!(settings.session.show_sql);
    assert_eq!(settings.migration.lock_timeout.as_millis(), 1500);
}

#[test]
#[serial]
fn explicit_values_win_over_environment() {
    clear_vars();
    std::env::set_var("DATASOURCE_MAX_POOL_SIZE", "25");

    let explicit = Properties::new().with(keys::MAX_POOL_SIZE, "40");
    let props = Properties::from_env().merge(explicit);
    clear_vars();

    assert_eq!(props.get(keys::MAX_POOL_SIZE), Some("40"));
}

#[test]
#[serial]
fn invalid_env_value_falls_back_to_default() {
    clear_vars();
    std::env::set_var("DATASOURCE_MAX_POOL_SIZE", "lots");

    let settings = PersistenceSettings::from_properties(&Properties::from_env()).expect("settings");
    clear_vars();

    let DataSourceSettings::Pooled(pool) = settings.datasource else {
        panic!("expected pooled settings");
    };
    assert_eq!(pool.max_pool_size, 100);
}
