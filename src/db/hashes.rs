//! Hash storage and lookup.

use rusqlite::{params, params_from_iter};

use super::Database;
use crate::error::Result;
use crate::hashing::HashStore;
use crate::model::HashRecord;

/// Keeps `IN (...)` lists under SQLite's bound-parameter limit.
const LOOKUP_CHUNK: usize = 500;

impl Database {
    pub fn add_hashes(&self, asset_id: i64, hashes: &[HashRecord]) -> Result<()> {
        let mut stmt = self
            .conn
            .prepare_cached("INSERT INTO hashes (asset_id, method, nibbles, time) VALUES (?1, ?2, ?3, ?4)")?;
        for hash in hashes {
            stmt.execute(params![asset_id, hash.method, hash.nibbles, hash.time])?;
        }
        Ok(())
    }

    /// Swap an asset's stored hashes for `hashes` in one transaction.
    pub fn replace_hashes(&self, asset_id: i64, hashes: &[HashRecord]) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM hashes WHERE asset_id = ?", [asset_id])?;
        self.add_hashes(asset_id, hashes)?;
        tx.commit()?;
        tracing::debug!(asset_id, count = hashes.len(), "Stored hashes");
        Ok(())
    }
}

impl HashStore for Database {
    fn hashes_for_asset(&self, asset_id: i64) -> Result<Vec<HashRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT asset_id, method, nibbles, time FROM hashes WHERE asset_id = ? ORDER BY method, time",
        )?;
        let hashes = stmt
            .query_map([asset_id], |row| {
                Ok(HashRecord {
                    asset_id: row.get(0)?,
                    method: row.get(1)?,
                    nibbles: row.get(2)?,
                    time: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(hashes)
    }

    fn find_hashes(&self, method: &str, nibbles: &[String]) -> Result<Vec<HashRecord>> {
        let mut found = Vec::new();
        for chunk in nibbles.chunks(LOOKUP_CHUNK) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let sql = format!(
                "SELECT asset_id, method, nibbles, time FROM hashes \
                 WHERE method = ? AND nibbles IN ({placeholders})"
            );
            let mut stmt = self.conn.prepare(&sql)?;
            let values = std::iter::once(method).chain(chunk.iter().map(String::as_str));
            let rows = stmt.query_map(params_from_iter(values), |row| {
                Ok(HashRecord {
                    asset_id: row.get(0)?,
                    method: row.get(1)?,
                    nibbles: row.get(2)?,
                    time: row.get(3)?,
                })
            })?;
            for row in rows {
                found.push(row?);
            }
        }
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashing::similar_by_content;
    use crate::model::{Asset, Medium};
    use std::collections::BTreeSet;

    fn db_with(hashes: &[(&str, &[&str])]) -> (Database, Vec<i64>) {
        let db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();
        let mut ids = Vec::new();
        for (slug, digests) in hashes {
            let mut asset = Asset::new(*slug, Medium::Photo, format!("/{slug}.jpg"));
            db.insert_asset(&mut asset).unwrap();
            let records: Vec<HashRecord> =
                digests.iter().map(|d| HashRecord::new("dhash-4", *d)).collect();
            db.add_hashes(asset.id, &records).unwrap();
            ids.push(asset.id);
        }
        (db, ids)
    }

    #[test]
    fn test_find_hashes_matches_method_and_nibbles() {
        let (db, ids) = db_with(&[("a", &["0f0f"]), ("b", &["0f0e", "ffff"])]);
        db.add_hashes(ids[0], &[HashRecord::new("dhash-8", "0f0e").at(5.0)]).unwrap();

        let found = db
            .find_hashes("dhash-4", &["0f0e".to_string(), "1234".to_string()])
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].asset_id, ids[1]);

        let timed = db.hashes_for_asset(ids[0]).unwrap();
        assert_eq!(timed.len(), 2);
        assert_eq!(timed[1].time, Some(5.0));
    }

    #[test]
    fn test_find_hashes_chunks_long_lists() {
        let (db, ids) = db_with(&[("a", &["0000"])]);
        let mut wanted: Vec<String> = (1..1200).map(|n| format!("{n:04x}")).collect();
        wanted.push("0000".to_string());
        let found = db.find_hashes("dhash-4", &wanted).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].asset_id, ids[0]);
    }

    #[test]
    fn test_similar_by_content_against_store() {
        let (db, ids) = db_with(&[
            ("a", &["0000"]),
            ("b", &["0001"]),
            ("c", &["0003"]),
            ("d", &["ffff"]),
        ]);
        assert_eq!(
            similar_by_content(&db, ids[0], "dhash-4", 1).unwrap(),
            BTreeSet::from([ids[1]])
        );
        assert_eq!(
            similar_by_content(&db, ids[0], "dhash-4", 2).unwrap(),
            BTreeSet::from([ids[1], ids[2]])
        );
        assert!(similar_by_content(&db, ids[0], "dhash-8", 4).unwrap().is_empty());
    }

    #[test]
    fn test_replace_hashes() {
        let (db, ids) = db_with(&[("a", &["0000", "1111"])]);
        db.replace_hashes(ids[0], &[HashRecord::new("rgbhist-4", "abc")]).unwrap();
        let stored = db.hashes_for_asset(ids[0]).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].method, "rgbhist-4");
    }
}
