//! Dual-account (blue/green) role behavior.

use std::time::Duration;

use serde_json::json;

use dirvault_engine::storage::records;
use dirvault_engine::testing::TestHarness;

#[tokio::test]
async fn test_dual_account_create_validation() {
    let harness = TestHarness::initialized().await;
    harness.configure_openldap().await;

    let cases: Vec<(&str, serde_json::Value, &str)> = vec![
        (
            "missing username_b",
            json!({
                "username": "svc-app-blue",
                "rotation_period": 60,
                "dual_account_mode": true,
                "grace_period": 30,
            }),
            "username_b is required",
        ),
        (
            "empty username_b",
            json!({
                "username": "svc-app-blue",
                "username_b": "",
                "rotation_period": 60,
                "dual_account_mode": true,
                "grace_period": 30,
            }),
            "must not be empty",
        ),
        (
            "missing grace_period",
            json!({
                "username": "svc-app-blue",
                "username_b": "svc-app-green",
                "rotation_period": 60,
                "dual_account_mode": true,
            }),
            "grace_period is required",
        ),
        (
            "username_b equal to username",
            json!({
                "username": "svc-app-blue",
                "username_b": "svc-app-blue",
                "rotation_period": 60,
                "dual_account_mode": true,
                "grace_period": 30,
            }),
            "must be different from username",
        ),
        (
            "grace_period greater than rotation_period",
            json!({
                "username": "svc-app-blue",
                "username_b": "svc-app-green",
                "rotation_period": 60,
                "dual_account_mode": true,
                "grace_period": 120,
            }),
            "grace_period must be less than rotation_period",
        ),
        (
            "grace_period equal to rotation_period",
            json!({
                "username": "svc-app-blue",
                "username_b": "svc-app-green",
                "rotation_period": 60,
                "dual_account_mode": true,
                "grace_period": 60,
            }),
            "grace_period must be less than rotation_period",
        ),
        (
            "grace_period under five seconds",
            json!({
                "username": "svc-app-blue",
                "username_b": "svc-app-green",
                "rotation_period": 60,
                "dual_account_mode": true,
                "grace_period": 3,
            }),
            "grace_period must be 5 seconds or more",
        ),
    ];

    for (name, data, expected) in cases {
        let err = harness
            .write("static-role/test-dual", data)
            .await
            .expect_err(name);
        assert!(
            err.to_string().contains(expected),
            "{name}: expected {expected:?} in {err}"
        );
    }

    // One second under the rotation period is accepted.
    harness
        .write("static-role/test-dual", json!({
            "username": "svc-app-blue",
            "username_b": "svc-app-green",
            "rotation_period": 60,
            "dual_account_mode": true,
            "grace_period": 59,
        }))
        .await
        .expect("grace_period of rotation_period - 1 is valid");
}

#[tokio::test]
async fn test_dual_account_initial_setup() {
    let harness = TestHarness::initialized().await;
    harness.configure_openldap().await;

    harness
        .write("static-role/banking-app", json!({
            "username": "svc-banking-blue",
            "username_b": "svc-banking-green",
            "dn": "uid=svc-banking-blue,ou=users,dc=bank,dc=com",
            "dn_b": "uid=svc-banking-green,ou=users,dc=bank,dc=com",
            "rotation_period": 60,
            "dual_account_mode": true,
            "grace_period": 30,
        }))
        .await
        .expect("create dual role");

    let read = harness.read("static-role/banking-app").await.unwrap();
    assert_eq!(read.get("dual_account_mode").unwrap(), &json!(true));
    assert_eq!(read.get_str("username_b"), Some("svc-banking-green"));
    assert_eq!(
        read.get_str("dn_b"),
        Some("uid=svc-banking-green,ou=users,dc=bank,dc=com")
    );
    assert_eq!(read.get("grace_period").unwrap(), &json!(30));
    assert_eq!(read.get_str("active_account"), Some("a"));
    assert_eq!(read.get_str("rotation_state"), Some("active"));

    // Both accounts received passwords (DN-targeted updates).
    let role = records::load_static_role(harness.storage.as_ref(), "banking-app")
        .await
        .unwrap()
        .unwrap();
    assert!(!role.password.is_empty());
    assert!(!role.password_b.is_empty());
    assert_eq!(
        harness
            .directory
            .password_for("uid=svc-banking-blue,ou=users,dc=bank,dc=com")
            .as_deref(),
        Some(role.password.expose())
    );
    assert_eq!(
        harness
            .directory
            .password_for("uid=svc-banking-green,ou=users,dc=bank,dc=com")
            .as_deref(),
        Some(role.password_b.expose())
    );

    // Both usernames are registered as managed.
    assert!(harness.backend.is_managed_user("svc-banking-blue"));
    assert!(harness.backend.is_managed_user("svc-banking-green"));
}

#[tokio::test]
async fn test_dual_account_blue_green_cycle() {
    let harness = TestHarness::initialized().await;
    harness.configure_openldap().await;

    harness
        .write("static-role/cycle", json!({
            "username": "svc-a",
            "username_b": "svc-b",
            "rotation_period": 3600,
            "dual_account_mode": true,
            "grace_period": 10,
        }))
        .await
        .expect("create dual role");

    let role = records::load_static_role(harness.storage.as_ref(), "cycle")
        .await
        .unwrap()
        .unwrap();
    let initial_b_password = role.password_b.expose().to_string();

    // In the active state no standby credentials are served.
    let creds = harness.read("static-cred/cycle").await.unwrap();
    assert_eq!(creds.get_str("rotation_state"), Some("active"));
    assert_eq!(creds.get_str("username"), Some("svc-a"));
    assert!(creds.get("standby_username").is_none());
    assert!(creds.get("standby_password").is_none());

    // First rotation: the standby (B) is rotated and becomes active.
    harness.write("rotate-role/cycle", json!(null)).await.unwrap();

    let role = records::load_static_role(harness.storage.as_ref(), "cycle")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(role.rotation_state.as_str(), "grace_period");
    assert_eq!(role.active_account.as_str(), "b");
    assert!(role.grace_period_end.is_some());
    assert_ne!(role.password_b.expose(), initial_b_password);

    // Grace window: active creds are B's, standby creds are A's, and the
    // standby password still binds against svc-a on the directory.
    let creds = harness.read("static-cred/cycle").await.unwrap();
    assert_eq!(creds.get_str("rotation_state"), Some("grace_period"));
    assert_eq!(creds.get_str("username"), Some("svc-b"));
    assert_eq!(creds.get_str("password"), Some(role.password_b.expose()));
    assert_eq!(creds.get_str("standby_username"), Some("svc-a"));
    assert_eq!(creds.get_str("standby_password"), Some(role.password.expose()));
    assert!(creds.get("grace_period_end").is_some());
    assert_eq!(
        harness.directory.password_for("svc-a").as_deref(),
        Some(role.password.expose()),
        "standby credentials must still be bindable"
    );

    // Second rotation flips back: the standby (A) is rotated.
    let previous_a_password = role.password.expose().to_string();
    harness.write("rotate-role/cycle", json!(null)).await.unwrap();

    let role = records::load_static_role(harness.storage.as_ref(), "cycle")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(role.rotation_state.as_str(), "grace_period");
    assert_eq!(role.active_account.as_str(), "a");
    assert_ne!(role.password.expose(), previous_a_password);
    assert_eq!(role.last_password.expose(), previous_a_password);
}

#[tokio::test]
async fn test_dual_account_grace_period_expiry() {
    let harness = TestHarness::initialized().await;
    harness.configure_openldap().await;

    harness
        .write("static-role/grace-expiry", json!({
            "username": "svc-grace-blue",
            "username_b": "svc-grace-green",
            "rotation_period": 3600,
            "dual_account_mode": true,
            "grace_period": 5,
        }))
        .await
        .expect("create dual role");

    harness
        .write("rotate-role/grace-expiry", json!(null))
        .await
        .unwrap();
    let role = records::load_static_role(harness.storage.as_ref(), "grace-expiry")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(role.rotation_state.as_str(), "grace_period");

    // Let the window close, then force a tick.
    tokio::time::sleep(Duration::from_secs(6)).await;
    harness.backend.tick().await;

    let role = records::load_static_role(harness.storage.as_ref(), "grace-expiry")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(role.rotation_state.as_str(), "active");
    assert_eq!(role.grace_period_end, None);
    assert!(
        harness
            .events
            .event_types()
            .contains(&"dual-account-grace-period-end".to_string())
    );

    // Standby credentials disappear from reads once the window closed.
    let creds = harness.read("static-cred/grace-expiry").await.unwrap();
    assert_eq!(creds.get_str("rotation_state"), Some("active"));
    assert!(creds.get("standby_password").is_none());
}

#[tokio::test]
async fn test_dual_account_skip_import_rotation() {
    let harness = TestHarness::initialized().await;
    harness.configure_openldap().await;

    harness
        .write("static-role/skip-dual", json!({
            "username": "svc-skip-blue",
            "username_b": "svc-skip-green",
            "rotation_period": 6,
            "dual_account_mode": true,
            "grace_period": 5,
            "skip_import_rotation": true,
        }))
        .await
        .expect("create dual role");

    let role = records::load_static_role(harness.storage.as_ref(), "skip-dual")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(role.rotation_state.as_str(), "active");
    assert_eq!(role.active_account.as_str(), "a");
    assert!(role.password.is_empty());
    assert!(role.password_b.is_empty());

    // The first due tick performs the full initial setup, not a flip.
    tokio::time::sleep(Duration::from_secs(8)).await;
    harness.backend.tick().await;

    let role = records::load_static_role(harness.storage.as_ref(), "skip-dual")
        .await
        .unwrap()
        .unwrap();
    assert!(!role.password.is_empty());
    assert!(!role.password_b.is_empty());
    assert_eq!(role.active_account.as_str(), "a");
    assert_eq!(role.rotation_state.as_str(), "active");
}

#[tokio::test]
async fn test_dual_account_immutable_fields() {
    let harness = TestHarness::initialized().await;
    harness.configure_openldap().await;

    harness
        .write("static-role/immutable", json!({
            "username": "svc-immutable-blue",
            "username_b": "svc-immutable-green",
            "rotation_period": 60,
            "dual_account_mode": true,
            "grace_period": 10,
        }))
        .await
        .expect("create dual role");

    let err = harness
        .write("static-role/immutable", json!({
            "username": "svc-immutable-blue",
            "dual_account_mode": false,
        }))
        .await
        .expect_err("dual_account_mode is immutable");
    assert!(err.to_string().contains("dual_account_mode"));

    let err = harness
        .write("static-role/immutable", json!({
            "username": "svc-immutable-blue",
            "username_b": "svc-other-green",
        }))
        .await
        .expect_err("username_b is immutable");
    assert!(err.to_string().contains("username_b"));

    let err = harness
        .write("static-role/immutable", json!({
            "username": "svc-immutable-blue",
            "dn_b": "uid=svc-other-green,ou=users,dc=bank,dc=com",
        }))
        .await
        .expect_err("dn_b is immutable");
    assert!(err.to_string().contains("dn_b"));

    // Mutable fields still update.
    harness
        .write("static-role/immutable", json!({
            "username": "svc-immutable-blue",
            "rotation_period": 120,
            "grace_period": 20,
        }))
        .await
        .expect("rotation_period and grace_period are mutable");
    let read = harness.read("static-role/immutable").await.unwrap();
    assert_eq!(read.get("rotation_period").unwrap(), &json!(120));
    assert_eq!(read.get("grace_period").unwrap(), &json!(20));
}

#[tokio::test]
async fn test_dual_account_delete_frees_both_usernames() {
    let harness = TestHarness::initialized().await;
    harness.configure_openldap().await;

    harness
        .write("static-role/tracked", json!({
            "username": "svc-tracked-blue",
            "username_b": "svc-tracked-green",
            "rotation_period": 60,
            "dual_account_mode": true,
            "grace_period": 10,
        }))
        .await
        .expect("create dual role");

    // Another role cannot claim either username.
    let err = harness
        .write("static-role/conflict", json!({
            "username": "svc-tracked-green",
            "rotation_period": 60,
        }))
        .await
        .expect_err("username_b is owned by the dual role");
    assert!(err.to_string().contains("already managed"));

    harness.delete("static-role/tracked").await.expect("delete role");
    assert!(!harness.backend.is_managed_user("svc-tracked-blue"));
    assert!(!harness.backend.is_managed_user("svc-tracked-green"));

    // Freed names are claimable again, by a library set this time.
    harness
        .create("library/reclaim-lib", json!({
            "service_account_names": ["svc-tracked-blue", "svc-tracked-green"],
            "ttl": "10h",
            "max_ttl": "11h",
        }))
        .await
        .expect("library set claims the freed usernames");
}
