//! SQLite-backed asset store.
//!
//! The store implements [`AssetIndex`](crate::query::AssetIndex) and
//! [`HashStore`](crate::hashing::HashStore), so queries and neighbor search
//! run against it without knowing about SQL.

mod hashes;
mod schema;
mod select;

use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;

use crate::error::{Error, Result};
use crate::filters::{FilterList, FilterOp};
use crate::model::{parse_stamp, update_stamp, Asset, Medium, STAMP_FORMAT};
use crate::tags::{canonical_form, datetime_tags};

pub use schema::SCHEMA;

const ASSET_COLUMNS: &str = "id, slug, medium, path, caption, width, height, orientation, \
                             duration, fps, lat, lng, stamp, filters";

pub struct Database {
    pub(crate) conn: Connection,
}

fn conversion_error(index: usize, err: Error) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(err))
}

/// Map a row selected with `ASSET_COLUMNS`; tags are loaded separately.
fn asset_from_row(row: &Row<'_>) -> rusqlite::Result<Asset> {
    let medium: String = row.get(2)?;
    let medium: Medium = medium.parse().map_err(|e| conversion_error(2, e))?;
    let stamp: Option<String> = row.get(12)?;
    let filters: String = row.get(13)?;

    let mut asset = Asset::new(row.get::<_, String>(1)?, medium, row.get::<_, String>(3)?);
    asset.id = row.get(0)?;
    asset.caption = row.get(4)?;
    asset.width = row.get(5)?;
    asset.height = row.get(6)?;
    asset.orientation = row.get(7)?;
    asset.duration = row.get(8)?;
    asset.fps = row.get(9)?;
    asset.lat = row.get(10)?;
    asset.lng = row.get(11)?;
    asset.stamp = stamp.as_deref().and_then(parse_stamp);
    asset.filters = FilterList::from_json(&filters).map_err(|e| conversion_error(13, e))?;
    Ok(asset)
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self { conn })
    }

    pub fn initialize(&self) -> Result<()> {
        self.conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    // ========================================================================
    // Assets
    // ========================================================================

    /// Insert a new asset with its tags and set `asset.id`.
    pub fn insert_asset(&self, asset: &mut Asset) -> Result<i64> {
        self.conn.execute(
            r#"
            INSERT INTO assets (slug, medium, path, caption, width, height, orientation,
                                duration, fps, lat, lng, stamp, filters)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
            params![
                asset.slug,
                asset.medium.as_str(),
                asset.path,
                asset.caption,
                asset.width,
                asset.height,
                asset.orientation,
                asset.duration,
                asset.fps,
                asset.lat,
                asset.lng,
                asset.stamp.map(|s| s.format(STAMP_FORMAT).to_string()),
                asset.filters.to_json()?,
            ],
        )?;
        asset.id = self.conn.last_insert_rowid();

        let tags: Vec<String> = asset.tags.iter().cloned().collect();
        asset.tags.clear();
        for tag in tags {
            if let Some(name) = self.add_tag(asset.id, &tag)? {
                asset.tags.insert(name);
            }
        }

        tracing::debug!(id = asset.id, slug = %asset.slug, "Inserted asset");
        Ok(asset.id)
    }

    /// Write every column of `asset` except its tags.
    pub fn update_asset(&self, asset: &Asset) -> Result<()> {
        let changed = self.conn.execute(
            r#"
            UPDATE assets
            SET slug = ?2, medium = ?3, path = ?4, caption = ?5, width = ?6, height = ?7,
                orientation = ?8, duration = ?9, fps = ?10, lat = ?11, lng = ?12,
                stamp = ?13, filters = ?14
            WHERE id = ?1
            "#,
            params![
                asset.id,
                asset.slug,
                asset.medium.as_str(),
                asset.path,
                asset.caption,
                asset.width,
                asset.height,
                asset.orientation,
                asset.duration,
                asset.fps,
                asset.lat,
                asset.lng,
                asset.stamp.map(|s| s.format(STAMP_FORMAT).to_string()),
                asset.filters.to_json()?,
            ],
        )?;
        if changed == 0 {
            return Err(Error::AssetNotFound(asset.slug.clone()));
        }
        Ok(())
    }

    fn load_tags(&self, asset: &mut Asset) -> Result<()> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT t.name FROM tags t
            JOIN asset_tags at ON at.tag_id = t.id
            WHERE at.asset_id = ?
            "#,
        )?;
        asset.tags = stmt
            .query_map([asset.id], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<_>>()?;
        Ok(())
    }

    pub fn get_asset(&self, id: i64) -> Result<Option<Asset>> {
        let sql = format!("SELECT {ASSET_COLUMNS} FROM assets WHERE id = ?");
        let asset = self.conn.query_row(&sql, [id], asset_from_row).optional()?;
        match asset {
            Some(mut asset) => {
                self.load_tags(&mut asset)?;
                Ok(Some(asset))
            }
            None => Ok(None),
        }
    }

    pub fn get_asset_by_slug(&self, slug: &str) -> Result<Option<Asset>> {
        let sql = format!("SELECT {ASSET_COLUMNS} FROM assets WHERE slug = ?");
        let asset = self.conn.query_row(&sql, [slug], asset_from_row).optional()?;
        match asset {
            Some(mut asset) => {
                self.load_tags(&mut asset)?;
                Ok(Some(asset))
            }
            None => Ok(None),
        }
    }

    /// Like [`get_asset_by_slug`](Self::get_asset_by_slug) but missing assets are an error.
    pub fn require_asset(&self, slug: &str) -> Result<Asset> {
        self.get_asset_by_slug(slug)?
            .ok_or_else(|| Error::AssetNotFound(slug.to_string()))
    }

    pub fn slug_exists(&self, slug: &str) -> Result<bool> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM assets WHERE slug = ?", [slug], |row| row.get(0))?;
        Ok(count > 0)
    }

    /// Delete an asset. Its hashes and tag links go with it.
    pub fn delete_asset(&self, id: i64) -> Result<bool> {
        let deleted = self.conn.execute("DELETE FROM assets WHERE id = ?", [id])?;
        if deleted > 0 {
            tracing::info!(id, "Deleted asset");
        }
        Ok(deleted > 0)
    }

    pub fn count_assets(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM assets", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    // ========================================================================
    // Tags
    // ========================================================================

    /// Attach a tag in canonical form, creating it if needed. Returns the
    /// stored name, or `None` when nothing is left after canonicalization.
    pub fn add_tag(&self, asset_id: i64, tag: &str) -> Result<Option<String>> {
        let name = canonical_form(tag);
        if name.is_empty() {
            return Ok(None);
        }
        self.conn
            .execute("INSERT OR IGNORE INTO tags (name) VALUES (?)", [&name])?;
        self.conn.execute(
            r#"
            INSERT OR IGNORE INTO asset_tags (asset_id, tag_id)
            SELECT ?1, id FROM tags WHERE name = ?2
            "#,
            params![asset_id, name],
        )?;
        Ok(Some(name))
    }

    pub fn remove_tag(&self, asset_id: i64, tag: &str) -> Result<bool> {
        let removed = self.conn.execute(
            r#"
            DELETE FROM asset_tags
            WHERE asset_id = ?1 AND tag_id IN (SELECT id FROM tags WHERE name = ?2)
            "#,
            params![asset_id, canonical_form(tag)],
        )?;
        Ok(removed > 0)
    }

    /// Every `(asset_id, tag)` pair, for building a similarity snapshot.
    pub fn tag_assignments(&self) -> Result<Vec<(i64, String)>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT at.asset_id, t.name FROM asset_tags at
            JOIN tags t ON t.id = at.tag_id
            ORDER BY at.asset_id
            "#,
        )?;
        let pairs = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(pairs)
    }

    /// Tag names with the number of assets carrying each.
    pub fn tag_counts(&self) -> Result<Vec<(String, usize)>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT t.name, COUNT(at.asset_id) FROM tags t
            JOIN asset_tags at ON at.tag_id = t.id
            GROUP BY t.id
            "#,
        )?;
        let counts = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get::<_, i64>(1)? as usize)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(counts)
    }

    // ========================================================================
    // Filters
    // ========================================================================

    pub fn save_filters(&self, asset_id: i64, filters: &FilterList) -> Result<()> {
        self.conn.execute(
            "UPDATE assets SET filters = ?2 WHERE id = ?1",
            params![asset_id, filters.to_json()?],
        )?;
        Ok(())
    }

    /// Append an operation to an asset's filter list and persist it.
    pub fn add_filter(&self, asset: &mut Asset, op: &FilterOp) -> Result<()> {
        asset.filters.add(op)?;
        self.save_filters(asset.id, &asset.filters)?;
        tracing::debug!(slug = %asset.slug, filter = op.name(), "Added filter");
        Ok(())
    }

    /// Remove the `name` operation at `index` (negative from the end).
    pub fn remove_filter(&self, asset: &mut Asset, name: &str, index: i64) -> Result<()> {
        asset.filters.remove(name, index)?;
        self.save_filters(asset.id, &asset.filters)?;
        tracing::debug!(slug = %asset.slug, filter = name, index, "Removed filter");
        Ok(())
    }

    // ========================================================================
    // Timestamps
    // ========================================================================

    /// Set or shift an asset's timestamp and regenerate its datetime tags.
    pub fn update_stamp(&self, asset: &mut Asset, when: &str) -> Result<()> {
        let stamp = update_stamp(asset.stamp, when)?;

        // Only the tags generated from the previous stamp go; user and path
        // tags that happen to look like dates stay.
        if let Some(previous) = asset.stamp {
            for tag in datetime_tags(&previous) {
                self.remove_tag(asset.id, &tag)?;
                asset.tags.remove(&tag);
            }
        }

        asset.stamp = Some(stamp);
        self.conn.execute(
            "UPDATE assets SET stamp = ?2 WHERE id = ?1",
            params![asset.id, stamp.format(STAMP_FORMAT).to_string()],
        )?;
        for tag in datetime_tags(&stamp) {
            if let Some(name) = self.add_tag(asset.id, &tag)? {
                asset.tags.insert(name);
            }
        }

        tracing::debug!(slug = %asset.slug, stamp = %stamp, "Updated timestamp");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::tempdir;

    fn db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();
        db
    }

    #[test]
    fn test_open_creates_parent_dirs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("lumio.db");
        let db = Database::open(&path).unwrap();
        db.initialize().unwrap();
        assert!(path.exists());
        assert_eq!(db.count_assets().unwrap(), 0);
    }

    #[test]
    fn test_insert_and_get_asset() {
        let db = db();
        let mut asset = Asset::new("abc", Medium::Video, "/lib/clip.mov");
        asset.width = Some(1920);
        asset.height = Some(1080);
        asset.duration = Some(12.5);
        asset.stamp = NaiveDate::from_ymd_opt(2019, 7, 4).unwrap().and_hms_opt(9, 30, 0);
        asset.tags = ["Beach Day".to_string(), "!!".to_string()].into();
        asset.filters.add(&FilterOp::Hflip).unwrap();

        let id = db.insert_asset(&mut asset).unwrap();
        assert!(id > 0);
        assert_eq!(asset.tags.iter().collect::<Vec<_>>(), vec!["beach-day"]);

        let loaded = db.get_asset(id).unwrap().unwrap();
        assert_eq!(loaded, asset);
        assert_eq!(db.require_asset("abc").unwrap().id, id);
        assert!(matches!(db.require_asset("nope"), Err(Error::AssetNotFound(_))));
        assert!(db.slug_exists("abc").unwrap());
    }

    #[test]
    fn test_duplicate_slug_rejected() {
        let db = db();
        db.insert_asset(&mut Asset::new("abc", Medium::Photo, "/a.jpg")).unwrap();
        let err = db.insert_asset(&mut Asset::new("abc", Medium::Photo, "/b.jpg"));
        assert!(matches!(err, Err(Error::Database(_))));
    }

    #[test]
    fn test_tags_are_shared_by_name() {
        let db = db();
        let mut a = Asset::new("a", Medium::Photo, "/a.jpg");
        let mut b = Asset::new("b", Medium::Photo, "/b.jpg");
        db.insert_asset(&mut a).unwrap();
        db.insert_asset(&mut b).unwrap();

        db.add_tag(a.id, "Cake").unwrap();
        db.add_tag(b.id, "cake").unwrap();
        db.add_tag(b.id, "party").unwrap();

        let mut counts = db.tag_counts().unwrap();
        counts.sort();
        assert_eq!(counts, vec![("cake".to_string(), 2), ("party".to_string(), 1)]);

        assert!(db.remove_tag(b.id, "CAKE").unwrap());
        assert!(!db.remove_tag(b.id, "cake").unwrap());
        assert_eq!(
            db.tag_assignments().unwrap(),
            vec![(a.id, "cake".to_string()), (b.id, "party".to_string())]
        );
    }

    #[test]
    fn test_filters_persist_in_order() {
        let db = db();
        let mut asset = Asset::new("a", Medium::Photo, "/a.jpg");
        db.insert_asset(&mut asset).unwrap();
        let before = asset.filters.clone();

        db.add_filter(&mut asset, &FilterOp::Rotate { degrees: 30.0 }).unwrap();
        db.add_filter(&mut asset, &FilterOp::Hflip).unwrap();
        let loaded = db.get_asset(asset.id).unwrap().unwrap();
        assert_eq!(loaded.filters.ops(), vec![FilterOp::Rotate { degrees: 30.0 }, FilterOp::Hflip]);

        assert!(matches!(
            db.remove_filter(&mut asset, "rotate", -1),
            Err(Error::FilterMismatch { index: 1, .. })
        ));
        db.remove_filter(&mut asset, "hflip", -1).unwrap();
        db.remove_filter(&mut asset, "rotate", 0).unwrap();
        assert_eq!(db.get_asset(asset.id).unwrap().unwrap().filters, before);
    }

    #[test]
    fn test_update_stamp_regenerates_datetime_tags() {
        let db = db();
        let mut asset = Asset::new("a", Medium::Photo, "/a.jpg");
        asset.tags = ["cake".to_string()].into();
        db.insert_asset(&mut asset).unwrap();

        db.update_stamp(&mut asset, "2009-01-22T10:50:00").unwrap();
        assert!(asset.tags.contains("2009"));
        assert!(asset.tags.contains("january"));
        assert!(asset.tags.contains("11am"));

        db.update_stamp(&mut asset, "+1y +1h").unwrap();
        let loaded = db.get_asset(asset.id).unwrap().unwrap();
        assert_eq!(loaded.tags, asset.tags);
        assert!(loaded.tags.contains("2010"));
        assert!(loaded.tags.contains("12pm"));
        assert!(!loaded.tags.contains("2009"));
        assert!(loaded.tags.contains("cake"));
        assert_eq!(
            loaded.stamp,
            NaiveDate::from_ymd_opt(2010, 1, 22).unwrap().and_hms_opt(11, 50, 0)
        );
    }

    #[test]
    fn test_update_stamp_keeps_tags_that_look_like_dates() {
        let db = db();
        let stamp = NaiveDate::from_ymd_opt(2018, 3, 4).unwrap().and_hms_opt(10, 0, 0).unwrap();
        let mut asset = Asset::new("a", Medium::Photo, "/photos/2019/a.jpg");
        asset.stamp = Some(stamp);
        asset.tags = ["may", "2019", "cake"].iter().map(|t| t.to_string()).collect();
        asset.tags.extend(datetime_tags(&stamp));
        db.insert_asset(&mut asset).unwrap();
        assert!(asset.tags.contains("sunday"));

        db.update_stamp(&mut asset, "+1d").unwrap();
        let loaded = db.get_asset(asset.id).unwrap().unwrap();
        assert_eq!(loaded.tags, asset.tags);
        for kept in ["may", "2019", "cake", "2018", "march", "10am"] {
            assert!(loaded.tags.contains(kept), "missing {kept}");
        }
        assert!(loaded.tags.contains("5th"));
        assert!(loaded.tags.contains("monday"));
        assert!(!loaded.tags.contains("4th"));
        assert!(!loaded.tags.contains("sunday"));
    }

    #[test]
    fn test_delete_cascades() {
        let db = db();
        let mut asset = Asset::new("a", Medium::Photo, "/a.jpg");
        asset.tags = ["cake".to_string()].into();
        db.insert_asset(&mut asset).unwrap();
        db.add_hashes(asset.id, &[crate::model::HashRecord::new("dhash-4", "abcd")])
            .unwrap();

        assert!(db.delete_asset(asset.id).unwrap());
        assert!(!db.delete_asset(asset.id).unwrap());
        assert!(db.tag_assignments().unwrap().is_empty());
        let hashes: i64 = db
            .conn
            .query_row("SELECT COUNT(*) FROM hashes", [], |row| row.get(0))
            .unwrap();
        assert_eq!(hashes, 0);
    }
}
