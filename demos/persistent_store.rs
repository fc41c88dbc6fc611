/// Persistent store demo
///
/// Opens a log-backed store in a temporary directory, writes a few records,
/// closes it and opens it again to show that rows, links and ids survive.

use relkv::core::config::Config;
use relkv::core::store::StoreManager;
use relkv::core::types::Record;
use relkv::storage::log::SyncMode;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Device {
    name: String,
}
impl Record for Device {}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Reading {
    celsius: f32,
}
impl Record for Reading {}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let dir = std::env::temp_dir().join("relkv-persistent-demo");
    let _ = std::fs::remove_dir_all(&dir);

    let config = Config {
        sync_mode: SyncMode::Immediate,
        ..Config::default().with_storage_path(&dir)
    };

    println!("Opening store at {}", dir.display());
    let device = {
        let store = StoreManager::open(config.clone())?;
        let device = store.insert(&Device { name: "greenhouse".into() })?;
        let readings = store.link_new(
            &device,
            false,
            &[Reading { celsius: 21.5 }, Reading { celsius: 22.0 }],
        )?;
        println!("  wrote {} readings for {}", readings.len(), device);
        store.close();
        device
    };

    println!("Reopening...");
    let store = StoreManager::open(config)?;
    let device_row: Device = store.get(&device)?;
    let readings = store.collect_linked::<Reading>(&device)?;
    println!("  {} has {} readings:", device_row.name, readings.len());
    for reading in &readings {
        println!("    {} -> {:.1} C", reading.key, reading.value.celsius);
    }

    let next = store.insert(&Reading { celsius: 23.0 })?;
    println!("  next id handed out: {}", next.id());

    store.close();
    drop(store);
    std::fs::remove_dir_all(&dir)?;
    Ok(())
}
