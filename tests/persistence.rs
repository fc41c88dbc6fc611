mod common;

use relkv::codec::codec::Codec;
use relkv::core::config::Config;
use relkv::core::store::StoreManager;
use relkv::storage::log::SyncMode;
use tempfile::TempDir;
use common::*;

fn config(dir: &TempDir) -> Config {
    Config {
        sync_mode: SyncMode::Immediate,
        ..Config::default().with_storage_path(dir.path())
    }
}

#[test]
fn rows_and_links_survive_a_reopen() {
    let dir = TempDir::new().unwrap();

    let (a, b) = {
        let store = StoreManager::open(config(&dir)).unwrap();
        let a = store.insert(&user("ada", 36)).unwrap();
        let b = store.insert(&post("notes")).unwrap();
        store.link(&a, true, &[b.clone()]).unwrap();
        store.close();
        (a, b)
    };

    let store = StoreManager::open(config(&dir)).unwrap();
    assert_eq!(store.get::<User>(&a).unwrap(), user("ada", 36));
    assert_eq!(store.collect_linked::<Post>(&a).unwrap()[0].value, post("notes"));
    // a -> b and b -> a both touch b.
    assert_eq!(store.collect_linked_keys(&b), vec![a.clone(), a.clone()]);

    let c = store.insert(&post("later")).unwrap();
    assert_ne!(c.id(), a.id());
    assert_ne!(c.id(), b.id());
}

#[test]
fn deletes_survive_a_reopen_and_free_their_ids() {
    let dir = TempDir::new().unwrap();

    let deleted = {
        let store = StoreManager::open(config(&dir)).unwrap();
        let keys: Vec<_> = (0..3)
            .map(|i| store.insert(&sample("a", i)).unwrap())
            .collect();
        store.delete(&keys[0]).unwrap();
        keys[0].clone()
    };

    let store = StoreManager::open(config(&dir)).unwrap();
    assert!(!store.exists(&deleted));
    assert_eq!(store.count::<Sample>(), 2);
    assert_eq!(store.insert(&sample("b", 9)).unwrap().id(), deleted.id());
}

#[test]
fn a_second_manager_cannot_open_a_locked_store() {
    let dir = TempDir::new().unwrap();
    let _first = StoreManager::open(config(&dir)).unwrap();
    assert!(StoreManager::open(config(&dir)).is_err());
}

#[test]
fn json_codec_round_trips_through_the_log() {
    let dir = TempDir::new().unwrap();
    let json = Config {
        codec: Codec::Json,
        ..config(&dir)
    };

    let key = {
        let store = StoreManager::open(json.clone()).unwrap();
        store.insert(&user("ada", 36)).unwrap()
    };

    let store = StoreManager::open(json).unwrap();
    assert_eq!(store.get::<User>(&key).unwrap(), user("ada", 36));
}
