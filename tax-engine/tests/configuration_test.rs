//! Configuration lifecycle tests against PostgreSQL.
//!
//! These suites need a reachable test database; they skip (with a note on
//! stderr) when `TEST_DATABASE_URL` points nowhere.

mod common;

use common::TestDb;
use serial_test::serial;
use service_core::error::AppError;
use tax_engine::models::UpdateTaxConfiguration;
use uuid::Uuid;

macro_rules! require_db {
    () => {
        match TestDb::spawn().await {
            Some(test_db) => test_db,
            None => {
                eprintln!("Skipping: test database unavailable (set TEST_DATABASE_URL)");
                return;
            }
        }
    };
}

#[tokio::test]
#[serial]
async fn first_template_configuration_becomes_default() {
    let test_db = require_db!();
    let tenant_id = Uuid::new_v4();

    let first = test_db
        .db
        .create_from_template(tenant_id, "IN", None)
        .await
        .expect("Failed to create from template");
    assert!(first.is_default);
    assert_eq!(first.name, "India GST");
    assert_eq!(first.tax_system, "gst");
    assert!(first.has_regional_tax);
    assert!(first.has_inter_regional_tax);

    let second = test_db
        .db
        .create_from_template(tenant_id, "GB", None)
        .await
        .expect("Failed to create from template");
    assert!(!second.is_default, "Existing default must not be demoted");

    let current = test_db
        .db
        .get_current(tenant_id)
        .await
        .expect("Failed to get current")
        .expect("Missing current configuration");
    assert_eq!(current.config_id, first.config_id);

    test_db.cleanup().await;
}

#[tokio::test]
#[serial]
async fn unknown_template_code_fails() {
    let test_db = require_db!();

    let err = test_db
        .db
        .create_from_template(Uuid::new_v4(), "XX", None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::UnknownTemplate(_)));

    test_db.cleanup().await;
}

#[tokio::test]
#[serial]
async fn set_as_default_keeps_exactly_one_default() {
    let test_db = require_db!();
    let tenant_id = Uuid::new_v4();

    let first = test_db
        .db
        .create_from_template(tenant_id, "IN", None)
        .await
        .unwrap();
    let second = test_db
        .db
        .create_from_template(tenant_id, "US", None)
        .await
        .unwrap();
    let third = test_db
        .db
        .create_from_template(tenant_id, "GB", None)
        .await
        .unwrap();

    for target in [&second, &third, &first, &third] {
        test_db
            .db
            .set_as_default(tenant_id, target.config_id)
            .await
            .expect("Failed to set default");

        let configs = test_db.db.list_configurations(tenant_id).await.unwrap();
        let defaults: Vec<_> = configs.iter().filter(|c| c.is_default).collect();
        assert_eq!(defaults.len(), 1, "Expected exactly one default");
        assert_eq!(defaults[0].config_id, target.config_id);
    }

    test_db.cleanup().await;
}

#[tokio::test]
#[serial]
async fn set_as_default_missing_configuration_fails() {
    let test_db = require_db!();

    let err = test_db
        .db
        .set_as_default(Uuid::new_v4(), Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    test_db.cleanup().await;
}

#[tokio::test]
#[serial]
async fn deleting_the_default_configuration_conflicts() {
    let test_db = require_db!();
    let tenant_id = Uuid::new_v4();

    let config = test_db
        .db
        .create_from_template(tenant_id, "SG", None)
        .await
        .unwrap();

    let err = test_db
        .db
        .delete_configuration(tenant_id, config.config_id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    test_db.cleanup().await;
}

#[tokio::test]
#[serial]
async fn soft_deleted_configuration_stays_retrievable_by_id() {
    let test_db = require_db!();
    let tenant_id = Uuid::new_v4();

    let first = test_db
        .db
        .create_from_template(tenant_id, "AE", None)
        .await
        .unwrap();
    let second = test_db
        .db
        .create_from_template(tenant_id, "AU", None)
        .await
        .unwrap();
    test_db
        .db
        .set_as_default(tenant_id, second.config_id)
        .await
        .unwrap();

    let deleted = test_db
        .db
        .delete_configuration(tenant_id, first.config_id)
        .await
        .expect("Failed to delete");
    assert!(deleted);

    // Gone from lists, still addressable for historical invoices.
    let configs = test_db.db.list_configurations(tenant_id).await.unwrap();
    assert!(configs.iter().all(|c| c.config_id != first.config_id));

    let by_id = test_db
        .db
        .get_configuration(tenant_id, first.config_id)
        .await
        .unwrap()
        .expect("Soft-deleted row must stay retrievable");
    assert!(by_id.is_deleted);
    assert!(!by_id.is_active);

    test_db.cleanup().await;
}

#[tokio::test]
#[serial]
async fn configurations_are_scoped_to_their_tenant() {
    let test_db = require_db!();
    let tenant_a = Uuid::new_v4();
    let tenant_b = Uuid::new_v4();

    let config = test_db
        .db
        .create_from_template(tenant_a, "CA", None)
        .await
        .unwrap();

    assert!(test_db
        .db
        .get_configuration(tenant_b, config.config_id)
        .await
        .unwrap()
        .is_none());
    assert!(test_db.db.get_current(tenant_b).await.unwrap().is_none());
    assert!(test_db
        .db
        .list_configurations(tenant_b)
        .await
        .unwrap()
        .is_empty());

    test_db.cleanup().await;
}

#[tokio::test]
#[serial]
async fn get_current_is_none_when_unconfigured() {
    let test_db = require_db!();

    let current = test_db.db.get_current(Uuid::new_v4()).await.unwrap();
    assert!(current.is_none());

    test_db.cleanup().await;
}

#[tokio::test]
#[serial]
async fn update_configuration_changes_labels_and_policy() {
    let test_db = require_db!();
    let tenant_id = Uuid::new_v4();

    let config = test_db
        .db
        .create_from_template(tenant_id, "NONE", None)
        .await
        .unwrap();

    let input = UpdateTaxConfiguration {
        name: Some("House Tax Rules".to_string()),
        combined_tax_label: Some("Levy".to_string()),
        round_at_line_level: Some(false),
        decimal_places: Some(3),
        ..Default::default()
    };
    let updated = test_db
        .db
        .update_configuration(tenant_id, config.config_id, &input)
        .await
        .expect("Failed to update")
        .expect("Configuration missing");

    assert_eq!(updated.name, "House Tax Rules");
    assert_eq!(updated.combined_tax_label, "Levy");
    assert!(!updated.round_at_line_level);
    assert_eq!(updated.decimal_places, 3);

    let bad = UpdateTaxConfiguration {
        tax_id_format: Some("[unclosed".to_string()),
        ..Default::default()
    };
    let err = test_db
        .db
        .update_configuration(tenant_id, config.config_id, &bad)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    test_db.cleanup().await;
}
