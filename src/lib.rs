pub mod core;
pub mod storage;
pub mod codec;
pub mod trigger;
pub mod query;
pub mod parallel;

/*
┌──────────────────────────────────────────────────────────────────────────────────┐
│                              RELKV STRUCT ARCHITECTURE                             │
└──────────────────────────────────────────────────────────────────────────────────┘

┌──────────────────────────────────── CORE LAYER ───────────────────────────────────┐
│                                                                                    │
│  ┌──────────────────────────────────────────────────────────────────────────┐    │
│  │                          struct StoreManager                              │    │
│  │  backend: Arc<dyn Backend>      // flat byte store                        │    │
│  │  tank: IdTank                   // store-wide id allocator                │    │
│  │  triggers: TriggerRegistry      // before/after callbacks                 │    │
│  │  config: Config                                                           │    │
│  │                                                                           │    │
│  │  store.rs: insert/set/get/update/delete/deep_delete/count/foreach/find_*  │    │
│  │  links.rs: link/link_new/collect_linked/unlink/collect_linked_keys        │    │
│  └──────────────────────────────────────────────────────────────────────────┘    │
│                                                                                    │
│  ┌──────────────────┐  ┌──────────────────────┐  ┌─────────────────────────┐     │
│  │ struct IdTank    │  │ trait Record         │  │ struct Config           │     │
│  │ • available: FIFO│  │ • table_name()       │  │ • storage_path          │     │
│  │ • used: HashSet  │  │ struct Entry<T>      │  │ • id_buffer_size        │     │
│  │ • buffer_size    │  │ • key, value         │  │ • max_workers, codec    │     │
│  └──────────────────┘  └──────────────────────┘  └─────────────────────────┘     │
└────────────────────────────────────────────────────────────────────────────────────┘

┌─────────────────────────────────── STORAGE LAYER ─────────────────────────────────┐
│                                                                                    │
│  enum Key ── TankAvailable(id) "tank%avlbId_<id>"                                 │
│           ── TankUsed(id)      "tank%usedId_<id>"                                 │
│           ── Table(TableKey)   "tbl%<table>_<id>"                                 │
│           ── Link(LinkKey)     "lnk%<table>_<id>@<table>_<id>"                    │
│                                                                                    │
│  trait Backend ──impl──> MemoryBackend (BTreeMap under RwLock)                    │
│                ──impl──> LogBackend    (BTreeMap + append-only data.log,          │
│                                         StorageLayout, FileLock)                  │
└────────────────────────────────────────────────────────────────────────────────────┘

┌──────────────────────────────── EXECUTION LAYER ──────────────────────────────────┐
│                                                                                    │
│  TriggerRegistry ──dispatches──> TaskPool (scoped, max_workers, lazy workers)     │
│  StoreManager::foreach/find_all ──fan out decode + predicate──> TaskPool          │
│  Collection<T> ──loads via──> StoreManager::find_all                              │
│                ──joins via──> StoreManager::collect_linked                        │
└────────────────────────────────────────────────────────────────────────────────────┘
*/
