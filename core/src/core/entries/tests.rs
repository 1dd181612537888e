use super::*;
use chrono::Duration;
use tempfile::TempDir;

mod common {
    use super::*;

    pub(super) struct Fixture {
        pub store: EntryStore,
        pub keys: Vec<Key>,
        pub _temp: TempDir,
    }

    pub(super) fn create_test_store() -> Fixture {
        let temp = TempDir::new().unwrap();
        let registry = Arc::new(KeyRegistry::open(temp.path().join("keys.json")).unwrap());
        let keys = registry
            .generate(3, 8, "test", Utc::now())
            .unwrap()
            .into_iter()
            .map(|r| r.key)
            .collect();
        let store = EntryStore::new(temp.path().join("entries"), registry);
        Fixture {
            store,
            keys,
            _temp: temp,
        }
    }

    pub(super) fn payload(recipient: &str) -> EntryPayload {
        EntryPayload {
            recipient_name: recipient.to_string(),
            remarks: "fragile".to_string(),
            ..Default::default()
        }
    }

    pub(super) fn visit(minute: i64, ua: &str) -> AuditRecord {
        AuditRecord {
            time: Utc::now() + Duration::minutes(minute),
            user_agent: ua.to_string(),
            client_ip: "203.0.113.7".to_string(),
        }
    }
}

mod save_data {
    use super::common::{create_test_store, payload};
    use super::*;

    #[test]
    fn test_save_then_load() {
        let f = create_test_store();
        let now = Utc::now();

        let saved = f.store.save_data(&f.keys[0], payload("Alice"), now).unwrap();
        let loaded = f.store.load_data(&f.keys[0]).unwrap();

        assert_eq!(saved, loaded);
        assert_eq!(loaded.created_at, now);
        assert_eq!(loaded.data.recipient_name, "Alice");
    }

    #[test]
    fn test_second_save_preserves_created_at() {
        let f = create_test_store();
        let first = Utc::now();
        let later = first + Duration::days(3);

        f.store.save_data(&f.keys[0], payload("Alice"), first).unwrap();
        let second = f.store.save_data(&f.keys[0], payload("Bob"), later).unwrap();

        assert_eq!(second.created_at, first);
        let loaded = f.store.load_data(&f.keys[0]).unwrap();
        assert_eq!(loaded.created_at, first);
        assert_eq!(loaded.data.recipient_name, "Bob");
    }

    #[test]
    fn test_save_rejects_malformed_key() {
        let f = create_test_store();
        let result = f.store.save_data("../escape", payload("x"), Utc::now());
        assert!(matches!(result, Err(EntryStoreError::InvalidKey(_))));
    }

    #[test]
    fn test_save_rejects_unregistered_key() {
        let f = create_test_store();
        let result = f.store.save_data("UNKNOWN1", payload("x"), Utc::now());
        assert!(matches!(result, Err(EntryStoreError::KeyNotFound)));
        assert!(!f.store.has_data("UNKNOWN1"));
    }

    #[test]
    fn test_save_over_malformed_envelope_fails() {
        let f = create_test_store();
        let dir = f.store.entry_dir(&f.keys[0]);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(ENTRY_FILE), "garbage").unwrap();

        let result = f.store.save_data(&f.keys[0], payload("x"), Utc::now());
        assert!(matches!(result, Err(EntryStoreError::Decode(_))));
    }
}

mod load_data {
    use super::common::create_test_store;
    use super::*;

    #[test]
    fn test_missing_entry_is_not_found() {
        let f = create_test_store();
        let result = f.store.load_data(&f.keys[1]);
        assert!(matches!(result, Err(EntryStoreError::NotFound)));
    }

    #[test]
    fn test_malformed_entry_is_decode_error() {
        let f = create_test_store();
        let dir = f.store.entry_dir(&f.keys[0]);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(ENTRY_FILE), "{\"created_at\": 12").unwrap();

        let result = f.store.load_data(&f.keys[0]);
        assert!(matches!(result, Err(EntryStoreError::Decode(_))));
    }
}

mod has_data {
    use super::common::{create_test_store, payload};
    use super::*;

    #[test]
    fn test_has_data_flips_after_save() {
        let f = create_test_store();
        for key in &f.keys {
            assert!(!f.store.has_data(key));
        }

        f.store.save_data(&f.keys[0], payload("Alice"), Utc::now()).unwrap();

        assert!(f.store.has_data(&f.keys[0]));
        assert!(!f.store.has_data(&f.keys[1]));
    }

    #[test]
    fn test_has_data_false_for_invalid_key() {
        let f = create_test_store();
        assert!(!f.store.has_data(""));
        assert!(!f.store.has_data("a/b"));
    }

    #[test]
    fn test_visit_log_alone_is_not_data() {
        let f = create_test_store();
        f.store
            .record_visit(&f.keys[0], &super::common::visit(0, "ua"))
            .unwrap();
        assert!(!f.store.has_data(&f.keys[0]));
    }
}

mod visits {
    use super::common::{create_test_store, visit};
    use super::*;

    #[test]
    fn test_read_without_log_is_empty() {
        let f = create_test_store();
        assert!(f.store.read_visits(&f.keys[0]).unwrap().is_empty());
    }

    #[test]
    fn test_visits_are_returned_newest_first() {
        let f = create_test_store();
        let records: Vec<_> = (0..3).map(|i| visit(i, &format!("ua-{i}"))).collect();
        for record in &records {
            f.store.record_visit(&f.keys[0], record).unwrap();
        }

        let read = f.store.read_visits(&f.keys[0]).unwrap();
        let expected: Vec<_> = records.into_iter().rev().collect();
        assert_eq!(read, expected);
    }

    #[test]
    fn test_log_is_line_delimited_with_short_field_names() {
        let f = create_test_store();
        f.store.record_visit(&f.keys[0], &visit(0, "curl/8")).unwrap();
        f.store.record_visit(&f.keys[0], &visit(1, "curl/8")).unwrap();

        let raw = std::fs::read_to_string(f.store.history_file(&f.keys[0])).unwrap();
        let lines: Vec<_> = raw.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["ua"], "curl/8");
        assert_eq!(first["ip"], "203.0.113.7");
    }

    #[test]
    fn test_torn_last_line_is_skipped() {
        let f = create_test_store();
        f.store.record_visit(&f.keys[0], &visit(0, "first")).unwrap();
        f.store.record_visit(&f.keys[0], &visit(1, "second")).unwrap();

        let path = f.store.history_file(&f.keys[0]);
        let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(br#"{"time":"2025-01-0"#).unwrap();

        let read = f.store.read_visits(&f.keys[0]).unwrap();
        assert_eq!(read.len(), 2);
        assert_eq!(read[0].user_agent, "second");
    }

    #[test]
    fn test_corrupt_line_before_the_end_fails() {
        let f = create_test_store();
        f.store.record_visit(&f.keys[0], &visit(0, "first")).unwrap();
        let path = f.store.history_file(&f.keys[0]);
        let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"not json\n").unwrap();
        drop(file);
        f.store.record_visit(&f.keys[0], &visit(1, "third")).unwrap();

        let result = f.store.read_visits(&f.keys[0]);
        assert!(matches!(result, Err(EntryStoreError::Decode(_))));
    }

    #[test]
    fn test_record_visit_rejects_unknown_key() {
        let f = create_test_store();
        let result = f.store.record_visit("UNKNOWN1", &visit(0, "ua"));
        assert!(matches!(result, Err(EntryStoreError::KeyNotFound)));
    }

    #[test]
    fn test_concurrent_appends_keep_every_line() {
        let f = create_test_store();
        let store = Arc::new(f.store);
        let key = f.keys[0].to_string();

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let store = store.clone();
                let key = key.clone();
                std::thread::spawn(move || {
                    for i in 0..25 {
                        store
                            .record_visit(&key, &visit(i, &format!("thread-{t}")))
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.read_visits(&key).unwrap().len(), 200);
    }
}

mod image_path {
    use super::common::create_test_store;
    use super::*;

    #[test]
    fn test_resolves_existing_image() {
        let f = create_test_store();
        let dir = f.store.images_dir(&f.keys[0]);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("abc.webp"), b"x").unwrap();

        let path = f.store.image_path(&f.keys[0], "abc.webp").unwrap();
        assert_eq!(path, dir.join("abc.webp"));
    }

    #[test]
    fn test_rejects_traversal() {
        let f = create_test_store();
        for name in ["../entry.json", "a/b.webp", "", ".hidden", ".."] {
            let result = f.store.image_path(&f.keys[0], name);
            assert!(
                matches!(result, Err(EntryStoreError::InvalidImageName(_))),
                "{name:?}"
            );
        }
    }

    #[test]
    fn test_missing_image_is_not_found() {
        let f = create_test_store();
        let result = f.store.image_path(&f.keys[0], "nope.webp");
        assert!(matches!(result, Err(EntryStoreError::NotFound)));
    }
}

mod retain_images {
    use super::common::create_test_store;
    use super::*;

    #[test]
    fn test_removes_files_not_kept() {
        let f = create_test_store();
        let dir = f.store.images_dir(&f.keys[0]);
        std::fs::create_dir_all(&dir).unwrap();
        for name in ["old.webp", "old.heic", "new.webp"] {
            std::fs::write(dir.join(name), b"x").unwrap();
        }

        let removed = f.store.retain_images(&f.keys[0], |name| name == "new.webp");

        assert_eq!(removed, 2);
        assert!(dir.join("new.webp").is_file());
        assert!(!dir.join("old.webp").exists());
        assert!(!dir.join("old.heic").exists());
    }

    #[test]
    fn test_missing_directory_removes_nothing() {
        let f = create_test_store();
        assert_eq!(f.store.retain_images(&f.keys[1], |_| false), 0);
    }
}
