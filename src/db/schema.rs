pub const SCHEMA: &str = r#"
-- Assets: one row per imported photo, sound or video
CREATE TABLE IF NOT EXISTS assets (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    slug TEXT NOT NULL UNIQUE,
    medium TEXT NOT NULL,
    path TEXT NOT NULL,
    caption TEXT NOT NULL DEFAULT '',

    -- Geometry
    width INTEGER,
    height INTEGER,
    orientation INTEGER,
    duration REAL,
    fps REAL,

    -- Location and time
    lat REAL,
    lng REAL,
    stamp TEXT,

    -- Ordered edit operations as a JSON array
    filters TEXT NOT NULL DEFAULT '[]'
);

CREATE INDEX IF NOT EXISTS idx_assets_stamp ON assets(stamp);
CREATE INDEX IF NOT EXISTS idx_assets_medium ON assets(medium);
CREATE INDEX IF NOT EXISTS idx_assets_path ON assets(path);

-- Tags are shared between assets and unique by name
CREATE TABLE IF NOT EXISTS tags (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS asset_tags (
    asset_id INTEGER NOT NULL REFERENCES assets(id) ON DELETE CASCADE,
    tag_id INTEGER NOT NULL REFERENCES tags(id) ON DELETE CASCADE,
    PRIMARY KEY (asset_id, tag_id)
);

CREATE INDEX IF NOT EXISTS idx_asset_tags_tag ON asset_tags(tag_id);

-- Content hashes; time is set for temporal audio/video hashes
CREATE TABLE IF NOT EXISTS hashes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    asset_id INTEGER NOT NULL REFERENCES assets(id) ON DELETE CASCADE,
    method TEXT NOT NULL,
    nibbles TEXT NOT NULL,
    time REAL
);

CREATE INDEX IF NOT EXISTS idx_hashes_lookup ON hashes(method, nibbles);
CREATE INDEX IF NOT EXISTS idx_hashes_asset ON hashes(asset_id);
"#;

