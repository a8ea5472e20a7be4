use super::loading::apply_env_overrides;
use super::validation::validate_config;
use super::*;
use crate::common::constants::test_constants::*;
use serial_test::serial;
use std::fs;
use tempfile::tempdir;

const ENV_VARS: [&str; 6] = [
    ENV_LATITUDE,
    ENV_LONGITUDE,
    ENV_USE_GEOCLUE,
    ENV_DBUS_SERVER,
    ENV_PORTAL,
    ENV_DEBUG,
];

/// Run `test` with the given `DUSKLIGHT_*` variables set and every other one cleared.
fn with_env(vars: &[(&str, &str)], test: impl FnOnce()) {
    let saved: Vec<_> = ENV_VARS
        .iter()
        .map(|name| (*name, std::env::var(name).ok()))
        .collect();

    unsafe {
        for name in ENV_VARS {
            std::env::remove_var(name);
        }
        for (name, value) in vars {
            std::env::set_var(name, value);
        }
    }

    test();

    unsafe {
        for (name, value) in saved {
            match value {
                Some(value) => std::env::set_var(name, value),
                None => std::env::remove_var(name),
            }
        }
    }
}

fn write_config(content: &str) -> (tempfile::TempDir, std::path::PathBuf) {
    let dir = tempdir().unwrap();
    let path = dir.path().join("dusklight.toml");
    fs::write(&path, content).unwrap();
    (dir, path)
}

#[test]
#[serial]
fn test_missing_file_gives_defaults() {
    with_env(&[], || {
        let dir = tempdir().unwrap();
        let config = load_from_path(&dir.path().join("absent.toml")).unwrap();

        assert_eq!(config, Config::default());
        assert!(config.use_geoclue());
        assert_eq!(config.desktop_id(), DEFAULT_DESKTOP_ID);
        assert!(config.dbus_server());
        assert!(config.portal());
        assert!(!config.debug());
        assert_eq!(config.static_location(), None);
    });
}

#[test]
#[serial]
fn test_full_file_is_parsed() {
    with_env(&[], || {
        let (_dir, path) = write_config(
            r#"
latitude = 52.52
longitude = 13.405
use_geoclue = false
desktop_id = "my-desktop"
dbus_server = false
portal = true
debug = true
"#,
        );
        let config = load_from_path(&path).unwrap();

        assert_eq!(
            config.static_location(),
            Some(Location::new(TEST_BERLIN_LATITUDE, TEST_BERLIN_LONGITUDE).unwrap())
        );
        assert!(!config.use_geoclue());
        assert_eq!(config.desktop_id(), "my-desktop");
        assert!(!config.dbus_server());
        assert!(config.portal());
        assert!(config.debug());
    });
}

#[test]
#[serial]
fn test_unknown_keys_are_rejected() {
    with_env(&[], || {
        let (_dir, path) = write_config("lattitude = 52.0\n");
        let err = load_from_path(&path).unwrap_err();
        assert!(format!("{err:#}").contains("lattitude"));
    });
}

#[test]
#[serial]
fn test_malformed_toml_is_an_error() {
    with_env(&[], || {
        let (_dir, path) = write_config("latitude = \n");
        assert!(load_from_path(&path).is_err());
    });
}

#[test]
#[serial]
fn test_environment_overrides_file() {
    let (_dir, path) =
        write_config("latitude = 10.0\nlongitude = 20.0\nuse_geoclue = true\nportal = true\n");
    with_env(
        &[
            (ENV_LATITUDE, "-33.8688"),
            (ENV_LONGITUDE, "151.2093"),
            (ENV_USE_GEOCLUE, "false"),
            (ENV_DBUS_SERVER, "no"),
            (ENV_PORTAL, "off"),
            (ENV_DEBUG, "1"),
        ],
        || {
            let config = load_from_path(&path).unwrap();
            assert_eq!(config.latitude, Some(-33.8688));
            assert_eq!(config.longitude, Some(151.2093));
            assert!(!config.use_geoclue());
            assert!(!config.dbus_server());
            assert!(!config.portal());
            assert!(config.debug());
        },
    );
}

#[test]
#[serial]
fn test_environment_alone_supplies_location() {
    with_env(&[(ENV_LATITUDE, "52.52"), (ENV_LONGITUDE, "13.405")], || {
        let dir = tempdir().unwrap();
        let config = load_from_path(&dir.path().join("absent.toml")).unwrap();
        assert!(config.static_location().is_some());
    });
}

#[test]
#[serial]
fn test_invalid_environment_values_are_errors() {
    with_env(&[(ENV_LATITUDE, "north")], || {
        let mut config = Config::default();
        let err = apply_env_overrides(&mut config).unwrap_err();
        assert!(err.to_string().contains(ENV_LATITUDE));
    });
    with_env(&[(ENV_USE_GEOCLUE, "maybe")], || {
        let mut config = Config::default();
        assert!(apply_env_overrides(&mut config).is_err());
    });
}

#[test]
#[serial]
fn test_empty_environment_values_are_ignored() {
    with_env(&[(ENV_DEBUG, "  ")], || {
        let mut config = Config::default();
        apply_env_overrides(&mut config).unwrap();
        assert_eq!(config.debug, None);
    });
}

#[test]
fn test_validation_requires_both_coordinates() {
    let only_lat = Config {
        latitude: Some(52.0),
        ..Config::default()
    };
    assert!(validate_config(&only_lat).is_err());

    let only_lng = Config {
        longitude: Some(13.0),
        ..Config::default()
    };
    assert!(validate_config(&only_lng).is_err());
}

#[test]
fn test_validation_checks_ranges() {
    let bad_lat = Config {
        latitude: Some(91.0),
        longitude: Some(0.0),
        ..Config::default()
    };
    assert!(validate_config(&bad_lat).is_err());

    let bad_lng = Config {
        latitude: Some(0.0),
        longitude: Some(-181.0),
        ..Config::default()
    };
    assert!(validate_config(&bad_lng).is_err());

    let edges = Config {
        latitude: Some(-90.0),
        longitude: Some(180.0),
        ..Config::default()
    };
    assert!(validate_config(&edges).is_ok());
}

#[test]
fn test_validation_rejects_blank_desktop_id() {
    let config = Config {
        desktop_id: Some("   ".to_string()),
        ..Config::default()
    };
    assert!(validate_config(&config).is_err());
}

#[test]
#[serial]
fn test_default_path_follows_xdg_config_home() {
    let temp_dir = tempdir().unwrap();
    let original = std::env::var("XDG_CONFIG_HOME").ok();
    unsafe {
        std::env::set_var("XDG_CONFIG_HOME", temp_dir.path());
    }

    let path = get_config_path().unwrap();

    unsafe {
        match original {
            Some(value) => std::env::set_var("XDG_CONFIG_HOME", value),
            None => std::env::remove_var("XDG_CONFIG_HOME"),
        }
    }
    assert_eq!(path, temp_dir.path().join("dusklight").join("dusklight.toml"));
}
