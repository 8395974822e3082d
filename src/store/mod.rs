//! SQLite-backed persistence for documents, chunks, and embedding records.
//!
//! ```text
//!              ┌────────────────────┐
//!              │   Storage::open    │  one connection, sqlite-vec
//!              └─────────┬──────────┘  registered once per process
//!                        │
//!          ┌─────────────┴─────────────┐
//!          ▼                           ▼
//!   ┌──────────────┐           ┌──────────────┐
//!   │ DocumentStore│           │  VectorIndex │
//!   │ documents    │           │ chunks +     │
//!   │ (supersede)  │           │ embedding    │
//!   └──────────────┘           │ records      │
//!                              └──────────────┘
//! ```
//!
//! All access funnels through a single [`tokio_rusqlite::Connection`], whose
//! command channel serializes statements: a similarity search sees either the
//! old or the new vector for a chunk, never a torn write.

pub mod documents;
pub mod index;

use std::mem::transmute;
use std::os::raw::c_char;
use std::path::Path;
use std::sync::Once;

use tokio_rusqlite::{ffi, Connection};

use crate::error::PipelineError;

pub use documents::{DocumentStore, PutOutcome, PutStatus};
pub use index::{ScoredChunk, VectorIndex};

/// Opens the backing database, registers the `sqlite-vec` extension, and
/// bootstraps the schema.
pub struct Storage {
    conn: Connection,
}

impl Storage {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        register_sqlite_vec()?;
        let conn = Connection::open(path.as_ref().to_path_buf()).await?;
        conn.call(|conn| {
            conn.query_row("select vec_version()", [], |row| row.get::<_, String>(0))
                .map_err(tokio_rusqlite::Error::Rusqlite)?;
            Ok(())
        })
        .await?;
        let storage = Self { conn };
        storage.init_schema().await?;
        Ok(storage)
    }

    /// Clone of the shared connection handle.
    pub fn connection(&self) -> Connection {
        self.conn.clone()
    }

    async fn init_schema(&self) -> Result<(), PipelineError> {
        self.conn
            .call(|conn| {
                conn.execute_batch(
                    "CREATE TABLE IF NOT EXISTS documents (
                        id          TEXT PRIMARY KEY,
                        source_url  TEXT NOT NULL UNIQUE,
                        title       TEXT NOT NULL,
                        raw_text    TEXT NOT NULL,
                        fetched_at  TEXT NOT NULL
                    );
                    CREATE TABLE IF NOT EXISTS chunks (
                        id          TEXT PRIMARY KEY,
                        document_id TEXT NOT NULL,
                        ordinal     INTEGER NOT NULL,
                        content     TEXT NOT NULL,
                        span_start  INTEGER NOT NULL,
                        span_end    INTEGER NOT NULL
                    );
                    CREATE INDEX IF NOT EXISTS idx_chunks_document ON chunks(document_id);
                    CREATE TABLE IF NOT EXISTS embedding_records (
                        chunk_id    TEXT PRIMARY KEY,
                        model       TEXT NOT NULL,
                        dims        INTEGER NOT NULL,
                        embedding   TEXT NOT NULL
                    );",
                )
                .map_err(tokio_rusqlite::Error::Rusqlite)?;
                Ok(())
            })
            .await?;
        Ok(())
    }
}

fn register_sqlite_vec() -> Result<(), PipelineError> {
    use std::sync::Mutex;

    static INIT: Once = Once::new();
    static INIT_RESULT: Mutex<Option<Result<(), String>>> = Mutex::new(None);

    INIT.call_once(|| {
        let result = unsafe {
            type SqliteExtensionInit = unsafe extern "C" fn(
                *mut ffi::sqlite3,
                *mut *mut c_char,
                *const ffi::sqlite3_api_routines,
            ) -> i32;

            let init: unsafe extern "C" fn() = sqlite_vec::sqlite3_vec_init;
            let init_fn: SqliteExtensionInit =
                transmute::<unsafe extern "C" fn(), SqliteExtensionInit>(init);
            let rc = ffi::sqlite3_auto_extension(Some(init_fn));
            if rc != 0 {
                Err(format!("failed to register sqlite-vec extension (code {rc})"))
            } else {
                Ok(())
            }
        };
        *INIT_RESULT.lock().expect("init result mutex poisoned") = Some(result);
    });

    INIT_RESULT
        .lock()
        .expect("init result mutex poisoned")
        .clone()
        .expect("init was called but result not set")
        .map_err(PipelineError::Storage)
}
