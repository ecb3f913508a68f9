use crate::place::Place;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::mpsc::{channel, Receiver, Sender};
use tracing::{debug, info, warn};

// ============================================================================
// CONTENT HASH
// ============================================================================

/// Hash of every field of a place record.
///
/// Used to tell an unchanged record from a replaced one on refresh.
/// Identity is the place id; the hash only detects value changes.
/// Hashes the JSON encoding, where string fields are quoted and escaped,
/// so field boundaries cannot shift between two records.
pub fn content_hash(place: &Place) -> Result<String> {
    let encoded = serde_json::to_string(place).context("Failed to encode place for hashing")?;
    let mut hasher = Sha256::new();
    hasher.update(encoded.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}

/// Outcome of one upsert batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UpsertStats {
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
}

impl UpsertStats {
    pub fn total(&self) -> usize {
        self.inserted + self.updated + self.unchanged
    }
}

/// Audit record of a completed refresh
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshEvent {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub inserted: i64,
    pub updated: i64,
    pub unchanged: i64,
}

impl RefreshEvent {
    pub fn new(source: &str, stats: &UpsertStats) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            source: source.to_string(),
            inserted: stats.inserted as i64,
            updated: stats.updated as i64,
            unchanged: stats.unchanged as i64,
        }
    }
}

// ============================================================================
// SCHEMA
// ============================================================================

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS places (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            category TEXT NOT NULL,
            latitude REAL NOT NULL,
            longitude REAL NOT NULL,
            address TEXT NOT NULL,
            content_hash TEXT NOT NULL,
            fetched_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS refresh_events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            source TEXT NOT NULL,
            inserted INTEGER NOT NULL,
            updated INTEGER NOT NULL,
            unchanged INTEGER NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_places_category ON places(category)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_refresh_events_timestamp ON refresh_events(timestamp)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// WRITES
// ============================================================================

/// Insert or replace places keyed by id, in one SQL transaction.
pub fn upsert_places(conn: &Connection, places: &[Place]) -> Result<UpsertStats> {
    let tx = conn
        .unchecked_transaction()
        .context("Failed to begin upsert transaction")?;
    let fetched_at = Utc::now().to_rfc3339();
    let mut stats = UpsertStats::default();

    {
        let mut existing = tx.prepare("SELECT content_hash FROM places WHERE id = ?1")?;
        let mut replace = tx.prepare(
            "INSERT OR REPLACE INTO places (
                id, name, category, latitude, longitude, address, content_hash, fetched_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )?;

        for place in places {
            let hash = content_hash(place)?;
            let previous: Option<String> = existing
                .query_row([place.id], |row| row.get(0))
                .optional()?;

            match previous {
                Some(ref old) if *old == hash => {
                    stats.unchanged += 1;
                    continue;
                }
                Some(_) => stats.updated += 1,
                None => stats.inserted += 1,
            }

            replace.execute(params![
                place.id,
                place.name,
                place.category,
                place.latitude,
                place.longitude,
                place.address,
                hash,
                fetched_at,
            ])?;
        }
    }

    tx.commit().context("Failed to commit upsert transaction")?;

    debug!(
        inserted = stats.inserted,
        updated = stats.updated,
        unchanged = stats.unchanged,
        "upserted places"
    );

    Ok(stats)
}

/// Remove every cached place. Returns the number of rows deleted.
pub fn clear_places(conn: &Connection) -> Result<usize> {
    let deleted = conn.execute("DELETE FROM places", [])?;
    Ok(deleted)
}

pub fn insert_refresh_event(conn: &Connection, event: &RefreshEvent) -> Result<()> {
    conn.execute(
        "INSERT INTO refresh_events (
            event_id, timestamp, source, inserted, updated, unchanged
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            event.event_id,
            event.timestamp.to_rfc3339(),
            event.source,
            event.inserted,
            event.updated,
            event.unchanged,
        ],
    )?;

    Ok(())
}

// ============================================================================
// READS
// ============================================================================

fn place_from_row(row: &rusqlite::Row) -> rusqlite::Result<Place> {
    Ok(Place {
        id: row.get(0)?,
        name: row.get(1)?,
        category: row.get(2)?,
        latitude: row.get(3)?,
        longitude: row.get(4)?,
        address: row.get(5)?,
    })
}

/// All cached places, ordered by id
pub fn get_all_places(conn: &Connection) -> Result<Vec<Place>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, category, latitude, longitude, address
         FROM places
         ORDER BY id",
    )?;

    let places = stmt
        .query_map([], place_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(places)
}

pub fn get_place(conn: &Connection, id: i64) -> Result<Option<Place>> {
    let place = conn
        .query_row(
            "SELECT id, name, category, latitude, longitude, address
             FROM places
             WHERE id = ?1",
            [id],
            place_from_row,
        )
        .optional()?;

    Ok(place)
}

/// Places whose category label matches exactly (case-sensitive)
pub fn get_places_by_category(conn: &Connection, category: &str) -> Result<Vec<Place>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, category, latitude, longitude, address
         FROM places
         WHERE category = ?1
         ORDER BY id",
    )?;

    let places = stmt
        .query_map([category], place_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(places)
}

pub fn count_places(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM places", [], |row| row.get(0))?;

    Ok(count)
}

pub fn last_refresh_event(conn: &Connection) -> Result<Option<RefreshEvent>> {
    let event = conn
        .query_row(
            "SELECT event_id, timestamp, source, inserted, updated, unchanged
             FROM refresh_events
             ORDER BY id DESC
             LIMIT 1",
            [],
            |row| {
                let timestamp_str: String = row.get(1)?;

                Ok(RefreshEvent {
                    event_id: row.get(0)?,
                    timestamp: DateTime::parse_from_rfc3339(&timestamp_str)
                        .map_err(|_| rusqlite::Error::InvalidQuery)?
                        .with_timezone(&Utc),
                    source: row.get(2)?,
                    inserted: row.get(3)?,
                    updated: row.get(4)?,
                    unchanged: row.get(5)?,
                })
            },
        )
        .optional()?;

    Ok(event)
}

// ============================================================================
// PLACE STORE
// ============================================================================

/// Local durable cache of place records with snapshot subscriptions.
///
/// Every subscriber receives the full current snapshot when it subscribes
/// and again after every write. Dropping the receiver unsubscribes.
pub struct PlaceStore {
    conn: Connection,
    subscribers: Vec<Sender<Vec<Place>>>,
}

impl PlaceStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path.as_ref())
            .with_context(|| format!("Failed to open database: {:?}", path.as_ref()))?;
        info!(path = ?path.as_ref(), "opened place store");
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    pub fn from_connection(conn: Connection) -> Result<Self> {
        setup_database(&conn)?;
        Ok(PlaceStore {
            conn,
            subscribers: Vec::new(),
        })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn upsert(&mut self, places: &[Place]) -> Result<UpsertStats> {
        let stats = upsert_places(&self.conn, places)?;
        self.notify()?;
        Ok(stats)
    }

    pub fn clear(&mut self) -> Result<usize> {
        let deleted = clear_places(&self.conn)?;
        self.notify()?;
        Ok(deleted)
    }

    pub fn record_refresh(&self, event: &RefreshEvent) -> Result<()> {
        insert_refresh_event(&self.conn, event)
    }

    /// Upsert a fetched batch, then record the refresh event.
    ///
    /// The upsert is committed first. A failed audit insert is logged and
    /// the stats are still returned, since the places are already stored.
    pub fn apply_refresh(&mut self, source: &str, places: &[Place]) -> Result<UpsertStats> {
        let stats = self.upsert(places)?;

        if let Err(e) = self.record_refresh(&RefreshEvent::new(source, &stats)) {
            warn!(source = %source, error = %format!("{:#}", e), "refresh event not recorded");
        }

        Ok(stats)
    }

    pub fn last_refresh(&self) -> Result<Option<RefreshEvent>> {
        last_refresh_event(&self.conn)
    }

    pub fn all(&self) -> Result<Vec<Place>> {
        get_all_places(&self.conn)
    }

    pub fn get(&self, id: i64) -> Result<Option<Place>> {
        get_place(&self.conn, id)
    }

    pub fn by_category(&self, category: &str) -> Result<Vec<Place>> {
        get_places_by_category(&self.conn, category)
    }

    pub fn count(&self) -> Result<i64> {
        count_places(&self.conn)
    }

    /// Subscribe to snapshots. The current snapshot is already queued on
    /// the returned receiver.
    pub fn subscribe(&mut self) -> Result<Receiver<Vec<Place>>> {
        let (tx, rx) = channel();
        // The receiver is alive in this scope, so this send cannot fail
        let _ = tx.send(self.all()?);
        self.subscribers.push(tx);
        Ok(rx)
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    fn notify(&mut self) -> Result<()> {
        if self.subscribers.is_empty() {
            return Ok(());
        }

        let snapshot = self.all()?;
        self.subscribers.retain(|tx| tx.send(snapshot.clone()).is_ok());
        debug!(subscribers = self.subscribers.len(), "pushed place snapshot");
        Ok(())
    }
}
