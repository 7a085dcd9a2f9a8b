//! Response cache storage.
//!
//! The [`CacheStore`] maps a request's URL (query included) to the last
//! captured [`HttpResponse`] and when it was stored. Persistence is optional
//! and switchable at runtime:
//!
//! ```toml
//! [cache]
//! persistence = "local"      # none | session | local
//! directory = ".httpcache"
//! ```

mod clock;
mod entry;
mod lock;
mod persistence;
mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use entry::{CacheEntry, HttpResponse};
pub use persistence::{LocalStorage, PersistenceError, SessionStorage, StorageBackend};
pub use store::{CacheError, CacheStore, PERSISTENCE_KEY};
