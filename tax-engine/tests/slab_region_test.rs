//! Slab and region lifecycle tests against PostgreSQL.

mod common;

use common::{dec, slab_input, TestDb};
use serial_test::serial;
use service_core::error::AppError;
use tax_engine::models::{CreateRegion, UpdateRateDefinition, UpdateRegion};
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

fn region_input(tenant_id: Uuid, config_id: Uuid, code: &str, name: &str) -> CreateRegion {
    CreateRegion {
        tenant_id,
        config_id,
        code: code.to_string(),
        name: name.to_string(),
        regional_tax_rate: None,
        has_local_tax: false,
        local_tax_rate: None,
        display_order: 0,
    }
}

#[tokio::test]
#[serial]
async fn create_and_list_slabs_in_display_order() {
    let test_db = require_db!();
    let tenant_id = Uuid::new_v4();
    let config = test_db
        .db
        .create_from_template(tenant_id, "IN", None)
        .await
        .unwrap();

    let mut first = slab_input(
        tenant_id,
        config.config_id,
        "GST 18%",
        "GST18",
        "18",
        "9",
        "9",
        "18",
    );
    first.display_order = 2;
    let mut second = slab_input(
        tenant_id,
        config.config_id,
        "GST 5%",
        "GST5",
        "5",
        "2.5",
        "2.5",
        "5",
    );
    second.display_order = 1;

    test_db.db.create_rate_definition(&first).await.unwrap();
    test_db.db.create_rate_definition(&second).await.unwrap();

    let slabs = test_db
        .db
        .list_active_slabs(tenant_id, config.config_id)
        .await
        .unwrap();
    let codes: Vec<&str> = slabs.iter().map(|s| s.code.as_str()).collect();
    assert_eq!(codes, vec!["GST5", "GST18"]);

    test_db.cleanup().await;
}

#[tokio::test]
#[serial]
async fn duplicate_slab_code_conflicts() {
    let test_db = require_db!();
    let tenant_id = Uuid::new_v4();
    let config = test_db
        .db
        .create_from_template(tenant_id, "IN", None)
        .await
        .unwrap();

    let input = slab_input(
        tenant_id,
        config.config_id,
        "GST 18%",
        "GST18",
        "18",
        "9",
        "9",
        "18",
    );
    test_db.db.create_rate_definition(&input).await.unwrap();

    let err = test_db.db.create_rate_definition(&input).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    test_db.cleanup().await;
}

#[tokio::test]
#[serial]
async fn split_violation_is_rejected_on_save() {
    let test_db = require_db!();
    let tenant_id = Uuid::new_v4();
    let config = test_db
        .db
        .create_from_template(tenant_id, "IN", None)
        .await
        .unwrap();

    let input = slab_input(
        tenant_id,
        config.config_id,
        "Broken",
        "BROKEN",
        "18",
        "9",
        "8.5",
        "18",
    );
    let err = test_db.db.create_rate_definition(&input).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
    assert!(err.to_string().contains("combined_rate"));

    test_db.cleanup().await;
}

#[tokio::test]
#[serial]
async fn default_slab_reassignment_is_atomic() {
    let test_db = require_db!();
    let tenant_id = Uuid::new_v4();
    let config = test_db
        .db
        .create_from_template(tenant_id, "IN", None)
        .await
        .unwrap();

    let mut first = slab_input(
        tenant_id,
        config.config_id,
        "GST 18%",
        "GST18",
        "18",
        "9",
        "9",
        "18",
    );
    first.is_default = true;
    let first = test_db.db.create_rate_definition(&first).await.unwrap();
    assert!(first.is_default);

    let mut second = slab_input(
        tenant_id,
        config.config_id,
        "GST 12%",
        "GST12",
        "12",
        "6",
        "6",
        "12",
    );
    second.is_default = true;
    let second = test_db.db.create_rate_definition(&second).await.unwrap();

    let default = test_db
        .db
        .get_default_slab(tenant_id, config.config_id)
        .await
        .unwrap()
        .expect("Missing default slab");
    assert_eq!(default.rate_id, second.rate_id);

    let slabs = test_db
        .db
        .list_active_slabs(tenant_id, config.config_id)
        .await
        .unwrap();
    assert_eq!(slabs.iter().filter(|s| s.is_default).count(), 1);

    // Moving the default back via update clears the other row too.
    let update = UpdateRateDefinition {
        is_default: Some(true),
        ..Default::default()
    };
    test_db
        .db
        .update_rate_definition(tenant_id, first.rate_id, &update)
        .await
        .unwrap()
        .expect("Slab missing");

    let slabs = test_db
        .db
        .list_active_slabs(tenant_id, config.config_id)
        .await
        .unwrap();
    let defaults: Vec<_> = slabs.iter().filter(|s| s.is_default).collect();
    assert_eq!(defaults.len(), 1);
    assert_eq!(defaults[0].rate_id, first.rate_id);

    test_db.cleanup().await;
}

#[tokio::test]
#[serial]
async fn update_breaking_split_is_rejected() {
    let test_db = require_db!();
    let tenant_id = Uuid::new_v4();
    let config = test_db
        .db
        .create_from_template(tenant_id, "IN", None)
        .await
        .unwrap();

    let slab = test_db
        .db
        .create_rate_definition(&slab_input(
            tenant_id,
            config.config_id,
            "GST 18%",
            "GST18",
            "18",
            "9",
            "9",
            "18",
        ))
        .await
        .unwrap();

    let update = UpdateRateDefinition {
        regional_rate: Some(dec("5")),
        ..Default::default()
    };
    let err = test_db
        .db
        .update_rate_definition(tenant_id, slab.rate_id, &update)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    test_db.cleanup().await;
}

#[tokio::test]
#[serial]
async fn soft_deleted_slab_leaves_lists_but_not_lookup() {
    let test_db = require_db!();
    let tenant_id = Uuid::new_v4();
    let config = test_db
        .db
        .create_from_template(tenant_id, "IN", None)
        .await
        .unwrap();

    let slab = test_db
        .db
        .create_rate_definition(&slab_input(
            tenant_id,
            config.config_id,
            "GST 18%",
            "GST18",
            "18",
            "9",
            "9",
            "18",
        ))
        .await
        .unwrap();

    assert!(test_db
        .db
        .delete_rate_definition(tenant_id, slab.rate_id)
        .await
        .unwrap());

    let slabs = test_db
        .db
        .list_active_slabs(tenant_id, config.config_id)
        .await
        .unwrap();
    assert!(slabs.is_empty());

    let by_id = test_db
        .db
        .get_rate_definition(tenant_id, slab.rate_id)
        .await
        .unwrap()
        .expect("Soft-deleted slab must stay retrievable");
    assert!(by_id.is_deleted);

    // The code is free again for a replacement slab.
    test_db
        .db
        .create_rate_definition(&slab_input(
            tenant_id,
            config.config_id,
            "GST 18% v2",
            "GST18",
            "18",
            "9",
            "9",
            "18",
        ))
        .await
        .expect("Replacement slab should not conflict with deleted one");

    test_db.cleanup().await;
}

#[tokio::test]
#[serial]
async fn slab_under_missing_configuration_fails() {
    let test_db = require_db!();

    let input = slab_input(
        Uuid::new_v4(),
        Uuid::new_v4(),
        "Orphan",
        "ORPHAN",
        "10",
        "5",
        "5",
        "10",
    );
    let err = test_db.db.create_rate_definition(&input).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    test_db.cleanup().await;
}

#[tokio::test]
#[serial]
async fn regions_resolve_by_code_case_insensitively() {
    let test_db = require_db!();
    let tenant_id = Uuid::new_v4();
    let config = test_db
        .db
        .create_from_template(tenant_id, "US", None)
        .await
        .unwrap();

    let mut california = region_input(tenant_id, config.config_id, "CA", "California");
    california.regional_tax_rate = Some(dec("7.25"));
    california.has_local_tax = true;
    california.local_tax_rate = Some(dec("1"));
    test_db.db.create_region(&california).await.unwrap();
    test_db
        .db
        .create_region(&region_input(tenant_id, config.config_id, "TX", "Texas"))
        .await
        .unwrap();

    let found = test_db
        .db
        .get_region_by_code(tenant_id, config.config_id, "ca")
        .await
        .unwrap()
        .expect("Region lookup failed");
    assert_eq!(found.code, "CA");
    assert_eq!(found.regional_tax_rate, Some(dec("7.25")));

    let regions = test_db
        .db
        .list_active_regions(tenant_id, config.config_id)
        .await
        .unwrap();
    assert_eq!(regions.len(), 2);

    test_db.cleanup().await;
}

#[tokio::test]
#[serial]
async fn duplicate_region_code_conflicts() {
    let test_db = require_db!();
    let tenant_id = Uuid::new_v4();
    let config = test_db
        .db
        .create_from_template(tenant_id, "US", None)
        .await
        .unwrap();

    let input = region_input(tenant_id, config.config_id, "NY", "New York");
    test_db.db.create_region(&input).await.unwrap();

    let err = test_db.db.create_region(&input).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    test_db.cleanup().await;
}

#[tokio::test]
#[serial]
async fn region_update_and_soft_delete() {
    let test_db = require_db!();
    let tenant_id = Uuid::new_v4();
    let config = test_db
        .db
        .create_from_template(tenant_id, "US", None)
        .await
        .unwrap();

    let region = test_db
        .db
        .create_region(&region_input(tenant_id, config.config_id, "WA", "Washington"))
        .await
        .unwrap();

    let update = UpdateRegion {
        regional_tax_rate: Some(dec("6.5")),
        ..Default::default()
    };
    let updated = test_db
        .db
        .update_region(tenant_id, region.region_id, &update)
        .await
        .unwrap()
        .expect("Region missing");
    assert_eq!(updated.regional_tax_rate, Some(dec("6.5")));

    assert!(test_db
        .db
        .delete_region(tenant_id, region.region_id)
        .await
        .unwrap());
    assert!(test_db
        .db
        .list_active_regions(tenant_id, config.config_id)
        .await
        .unwrap()
        .is_empty());
    assert!(test_db
        .db
        .get_region(tenant_id, region.region_id)
        .await
        .unwrap()
        .expect("Soft-deleted region must stay retrievable")
        .is_deleted);

    test_db.cleanup().await;
}
