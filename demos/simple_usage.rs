/// Complete relkv API Demo
///
/// Demonstrates the major store operations:
/// - CRUD operations (Insert, Get, Update, Delete)
/// - Links and cascading delete
/// - Triggers
/// - In-memory collections

use relkv::core::config::Config;
use relkv::core::store::StoreManager;
use relkv::core::types::Record;
use relkv::query::collection::Collection;
use relkv::trigger::operation::Operation;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Author {
    name: String,
}
impl Record for Author {}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Book {
    title: String,
    year: u16,
}
impl Record for Book {}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("\n╔═══════════════════════════════════════════════╗");
    println!("║        relkv - Complete API Demo              ║");
    println!("╚═══════════════════════════════════════════════╝\n");

    // Step 1: Create store
    println!("Creating in-memory store...");
    let store = StoreManager::in_memory(Config::default());
    println!("Done!\n");

    // Step 2: TRIGGERS - refuse books from the future
    println!("Step 2: TRIGGERS - Registering a guard...");
    let guarded_ops = Operation::INSERT | Operation::UPDATE;
    store.add_before_trigger::<Book, _>("no-future", guarded_ops, |_, _, book| {
        book.year <= 2025
    })?;
    store.add_after_trigger::<Book, _>("announce", Operation::INSERT, |_, key, book| {
        println!("  [trigger] stored {} as {}", book.title, key);
    })?;
    println!();

    // Step 3: INSERT
    println!("Step 3: INSERT - Adding records...");
    let author = store.insert(&Author { name: "Ursula".into() })?;
    let books = store.link_new(
        &author,
        true,
        &[
            Book { title: "A Wizard of Earthsea".into(), year: 1968 },
            Book { title: "The Dispossessed".into(), year: 1974 },
            Book { title: "Unwritten".into(), year: 2999 },
        ],
    )?;
    println!("  Inserted 1 author and {} books (one refused by trigger)\n", books.len());

    // Step 4: GET / UPDATE
    println!("Step 4: GET / UPDATE...");
    let first: Book = store.get(&books[0])?;
    println!("  Got: {:?}", first);
    let updated = store.update::<Book, _>(&books[0], |b| b.title.push_str(" (1st ed.)"))?;
    println!("  Updated: {:?}\n", updated);

    // Step 5: LINKS
    println!("Step 5: LINKS...");
    for entry in store.collect_linked::<Book>(&author)? {
        println!("  {} wrote {}", author, entry.value.title);
    }
    println!();

    // Step 6: COLLECTIONS
    println!("Step 6: COLLECTIONS - Books sorted by year, newest first...");
    let mut collection = Collection::<Book>::load(&store);
    collection.sort_by(|a, b| b.value.year.cmp(&a.value.year));
    for entry in collection.iter() {
        println!("  {} ({})", entry.value.title, entry.value.year);
    }
    println!();

    // Step 7: DEEP DELETE
    println!("Step 7: DEEP DELETE - Removing the author and everything it links to...");
    store.deep_delete(&author)?;
    println!("  Remaining rows: {}\n", store.count_all());

    store.close();
    println!("Demo complete!");
    Ok(())
}
