//! Leaf predicate lookups and ordered result loading.

use chrono::NaiveDateTime;
use rusqlite::{params, ToSql};

use super::{asset_from_row, Database, ASSET_COLUMNS};
use crate::error::Result;
use crate::model::{Asset, STAMP_FORMAT};
use crate::query::{select, AssetIndex, IdSet, Order, Predicate, QueryOptions, StampFilter};

fn stamp_text(stamp: &NaiveDateTime) -> String {
    stamp.format(STAMP_FORMAT).to_string()
}

impl Database {
    fn ids(&self, sql: &str, args: &[&dyn ToSql]) -> Result<IdSet> {
        let mut stmt = self.conn.prepare_cached(sql)?;
        let ids = stmt
            .query_map(args, |row| row.get::<_, i64>(0))?
            .collect::<rusqlite::Result<IdSet>>()?;
        Ok(ids)
    }

    /// Assets matching `query`, ordered and paged by `options`.
    pub fn assets(&self, query: &str, options: &QueryOptions) -> Result<Vec<Asset>> {
        let ids = select(self, query)?;
        tracing::debug!(query, matched = ids.len(), "Evaluated query");
        self.assets_by_ids(&ids, options)
    }

    /// Load the given assets, ordered and paged by `options`.
    pub fn assets_by_ids(&self, ids: &IdSet, options: &QueryOptions) -> Result<Vec<Asset>> {
        self.conn.execute_batch(
            "CREATE TEMP TABLE IF NOT EXISTS selected (id INTEGER PRIMARY KEY); DELETE FROM temp.selected;",
        )?;
        {
            let mut insert = self.conn.prepare_cached("INSERT INTO temp.selected (id) VALUES (?)")?;
            for id in ids {
                insert.execute([id])?;
            }
        }

        let order = match options.order {
            Some(Order::Random) => "RANDOM()".to_string(),
            Some(Order::Field { field, descending }) => {
                format!("{} {}, id", field.column(), if descending { "DESC" } else { "ASC" })
            }
            None => "id".to_string(),
        };
        let sql = format!(
            "SELECT {ASSET_COLUMNS} FROM assets WHERE id IN (SELECT id FROM temp.selected) \
             ORDER BY {order} LIMIT ?1 OFFSET ?2"
        );
        let limit = options.limit.map(|l| l as i64).unwrap_or(-1);

        let mut stmt = self.conn.prepare(&sql)?;
        let mut assets = stmt
            .query_map(params![limit, options.offset as i64], asset_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        for asset in &mut assets {
            self.load_tags(asset)?;
        }
        self.conn.execute("DELETE FROM temp.selected", [])?;
        Ok(assets)
    }
}

impl AssetIndex for Database {
    fn universe(&self) -> Result<IdSet> {
        self.ids("SELECT id FROM assets", &[])
    }

    fn matching(&self, predicate: &Predicate) -> Result<IdSet> {
        match predicate {
            Predicate::Tag(name) => self.ids(
                r#"
                SELECT at.asset_id FROM asset_tags at
                JOIN tags t ON t.id = at.tag_id
                WHERE t.name = ?
                "#,
                &[name],
            ),
            Predicate::Text(text) => self.ids(
                r#"
                SELECT id FROM assets WHERE instr(caption, ?1) > 0
                UNION
                SELECT at.asset_id FROM asset_tags at
                JOIN tags t ON t.id = at.tag_id
                WHERE t.name = ?1
                "#,
                &[text],
            ),
            Predicate::Stamp(StampFilter::Before(at)) => {
                self.ids("SELECT id FROM assets WHERE stamp < ?", &[&stamp_text(at)])
            }
            Predicate::Stamp(StampFilter::After(at)) => {
                self.ids("SELECT id FROM assets WHERE stamp > ?", &[&stamp_text(at)])
            }
            Predicate::Stamp(StampFilter::During(period)) => self.ids(
                "SELECT id FROM assets WHERE stamp >= ?1 AND stamp < ?2",
                &[&stamp_text(&period.start), &stamp_text(&period.end)],
            ),
            Predicate::Path(fragment) => {
                self.ids("SELECT id FROM assets WHERE instr(path, ?) > 0", &[fragment])
            }
            Predicate::Slug(prefix) => self.ids(
                "SELECT id FROM assets WHERE substr(slug, 1, length(?1)) = ?1",
                &[prefix],
            ),
            Predicate::Hash { method: None, prefix } => self.ids(
                "SELECT DISTINCT asset_id FROM hashes WHERE substr(nibbles, 1, length(?1)) = ?1",
                &[prefix],
            ),
            Predicate::Hash { method: Some(method), prefix } => self.ids(
                r#"
                SELECT DISTINCT asset_id FROM hashes
                WHERE method = ?2 AND substr(nibbles, 1, length(?1)) = ?1
                "#,
                &[prefix, method],
            ),
            Predicate::Medium(medium) => {
                self.ids("SELECT id FROM assets WHERE medium = ?", &[&medium.as_str()])
            }
        }
    }
}
