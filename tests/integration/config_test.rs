//! Settings Persistence Tests

use std::fs;
use tempfile::TempDir;

use file_sync_homelab::storage::ConfigService;
use file_sync_homelab::{parse_ignore_list, SyncSettings};

fn settings_with(ignore_list: Vec<String>) -> SyncSettings {
    SyncSettings::new("/home/me/photos", "me@homelab", "/srv/photos", ignore_list)
}

#[test]
fn test_round_trip_preserves_ignore_lists() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("settings.json");

    let lists = vec![
        vec![],
        vec!["*.tmp".to_string()],
        vec![
            "*.tmp".to_string(),
            ".git/".to_string(),
            "build/**".to_string(),
            "file[0-9].log".to_string(),
            "{a,b}?.txt".to_string(),
            "node_modules".to_string(),
        ],
    ];

    for list in lists {
        let settings = settings_with(list);
        ConfigService::save_to_file(&path, &settings).unwrap();
        let loaded = ConfigService::load_from_file(&path).unwrap();
        assert_eq!(loaded, settings);
    }
}

#[test]
fn test_file_layout() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("nested/dir/settings.json");

    let mut service = ConfigService::open(&path).unwrap();
    assert!(!path.exists(), "opening must not create the file");

    service
        .update_settings(settings_with(vec!["*.tmp".to_string()]))
        .unwrap();

    let json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(json["localFolder"], "/home/me/photos");
    assert_eq!(json["sshConnection"], "me@homelab");
    assert_eq!(json["remotePath"], "/srv/photos");
    assert_eq!(json["ignoreList"][0], "*.tmp");
    assert!(json.get("logRetentionMinutes").is_none());

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}

#[test]
fn test_reads_record_written_by_other_front_ends() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("settings.json");
    fs::write(
        &path,
        r#"{
  "localFolder": "/w",
  "sshConnection": "pi@nas",
  "remotePath": "/mnt/w",
  "ignoreList": ["*.swp"],
  "logRetentionMinutes": 30
}"#,
    )
    .unwrap();

    let service = ConfigService::open(&path).unwrap();
    let settings = service.get_settings();
    assert_eq!(settings.ssh_connection, "pi@nas");
    assert_eq!(settings.ignore_list, vec!["*.swp"]);
    assert_eq!(settings.log_retention_minutes, Some(30));
    assert!(settings.is_complete());
}

#[test]
fn test_partial_record_loads_with_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("settings.json");
    fs::write(&path, r#"{"localFolder": "/w"}"#).unwrap();

    let settings = ConfigService::load_from_file(&path).unwrap();
    assert_eq!(settings.local_folder, "/w");
    assert!(settings.ignore_list.is_empty());
    assert!(!settings.is_complete());
}

#[test]
fn test_corrupt_file_is_an_error() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("settings.json");
    fs::write(&path, "{ not json").unwrap();
    assert!(ConfigService::open(&path).is_err());
}

#[test]
fn test_ignore_list_text_parsing() {
    let text = "*.tmp\n\n  .git/  \r\nbuild/**\n   \n";
    assert_eq!(parse_ignore_list(text), vec!["*.tmp", ".git/", "build/**"]);
}
