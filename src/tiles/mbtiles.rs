//! Tile sets stored in a single SQLite database.
//!
//! Two layouts are recognised from their table structure:
//!
//! * MBTiles: `tiles(zoom_level, tile_column, tile_row, tile_data)` plus
//!   `metadata(name, value)`. Rows are counted from the south edge.
//! * RMaps/BigPlanet: `tiles(x, y, z, s, image)` plus `info(...)`. The `z`
//!   column holds `17 - zoom`.

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use log::{debug, info};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::core::constants::{MAX_KEY_ZOOM, RMAPS_BASE_ZOOM, TILE_SIZE};
use crate::core::geo::{LatLngBounds, TileCoord};
use crate::core::projection::Projection;
use crate::tiles::source::{TileBytes, TileSource};
use crate::{MapError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DatabaseSchema {
    MBTiles,
    RMaps,
}

impl DatabaseSchema {
    /// Inspects the `tiles` table columns
    pub fn detect(conn: &Connection) -> Result<Self> {
        let mut stmt = conn.prepare("PRAGMA table_info(tiles)")?;
        let columns = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let has = |name: &str| columns.iter().any(|c| c.eq_ignore_ascii_case(name));
        if has("zoom_level") && has("tile_column") && has("tile_row") && has("tile_data") {
            Ok(DatabaseSchema::MBTiles)
        } else if has("x") && has("y") && has("z") && has("image") {
            Ok(DatabaseSchema::RMaps)
        } else {
            Err(MapError::Storage(
                "database has no recognised tiles table".to_string(),
            ))
        }
    }

    fn tile_query(&self) -> &'static str {
        match self {
            DatabaseSchema::MBTiles => {
                "SELECT tile_data FROM tiles WHERE zoom_level = ?1 AND tile_column = ?2 AND tile_row = ?3"
            }
            DatabaseSchema::RMaps => "SELECT image FROM tiles WHERE z = ?1 AND x = ?2 AND y = ?3",
        }
    }

    /// Stored `(zoom, column, row)` for a tile address
    fn stored_address(&self, coord: TileCoord) -> (i64, i64, i64) {
        match self {
            DatabaseSchema::MBTiles => (coord.z as i64, coord.x as i64, coord.tms_y() as i64),
            DatabaseSchema::RMaps => (RMAPS_BASE_ZOOM - coord.z as i64, coord.x as i64, coord.y as i64),
        }
    }
}

/// MBTiles or RMaps database opened read-only
#[derive(Debug)]
pub struct EmbeddedDatabase {
    path: PathBuf,
    schema: DatabaseSchema,
    name: String,
    min_zoom: u8,
    max_zoom: u8,
    tile_size: u32,
    bounds: Option<LatLngBounds>,
    conn: Mutex<Option<Connection>>,
}

impl EmbeddedDatabase {
    /// Inspects the database: schema, zoom range, name, tile size and coverage.
    /// The connection is closed again until [`TileSource::activate`].
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let conn = open_readonly(&path)?;
        let schema = DatabaseSchema::detect(&conn)?;

        let range: (Option<i64>, Option<i64>) = match schema {
            DatabaseSchema::MBTiles => conn.query_row(
                "SELECT MIN(zoom_level), MAX(zoom_level) FROM tiles",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?,
            DatabaseSchema::RMaps => conn.query_row(
                "SELECT ?1 - MAX(z), ?1 - MIN(z) FROM tiles",
                [RMAPS_BASE_ZOOM],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?,
        };
        let (Some(min_zoom), Some(max_zoom)) = range else {
            return Err(MapError::Storage(format!("{} holds no tiles", path.display())));
        };
        let min_zoom = zoom_level(min_zoom)?;
        let max_zoom = zoom_level(max_zoom)?;

        let stem_name = file_stem_name(&path);
        let (name, bounds) = match schema {
            DatabaseSchema::MBTiles => {
                let name = metadata(&conn, "name")?.unwrap_or(stem_name);
                let bounds = metadata(&conn, "bounds")?
                    .as_deref()
                    .and_then(LatLngBounds::parse_ltrb);
                (name, bounds)
            }
            DatabaseSchema::RMaps => (stem_name, None),
        };

        let tile_size = sample_tile_size(&conn, schema)?.unwrap_or(TILE_SIZE);
        let bounds = match bounds {
            Some(bounds) => Some(bounds),
            None => extent_bounds(&conn, schema, max_zoom, tile_size)?,
        };

        info!(
            "Opened {:?} database {} ({}..{} zoom)",
            schema,
            path.display(),
            min_zoom,
            max_zoom
        );

        Ok(Self {
            path,
            schema,
            name,
            min_zoom,
            max_zoom,
            tile_size,
            bounds,
            conn: Mutex::new(None),
        })
    }

    pub fn schema(&self) -> DatabaseSchema {
        self.schema
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_open(&self) -> bool {
        self.conn.lock().map(|c| c.is_some()).unwrap_or(false)
    }
}

impl TileSource for EmbeddedDatabase {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn min_zoom(&self) -> u8 {
        self.min_zoom
    }

    fn max_zoom(&self) -> u8 {
        self.max_zoom
    }

    fn tile_size(&self) -> u32 {
        self.tile_size
    }

    fn bounds(&self) -> Option<LatLngBounds> {
        self.bounds.clone()
    }

    fn activate(&self) -> Result<()> {
        let mut conn = self
            .conn
            .lock()
            .map_err(|_| MapError::Storage("database lock poisoned".to_string()))?;
        if conn.is_none() {
            *conn = Some(open_readonly(&self.path)?);
            debug!("Opened connection to {}", self.path.display());
        }
        Ok(())
    }

    fn deactivate(&self) {
        if let Ok(mut conn) = self.conn.lock() {
            if conn.take().is_some() {
                debug!("Closed connection to {}", self.path.display());
            }
        }
    }

    fn load(&self, coord: TileCoord) -> Result<Option<TileBytes>> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| MapError::Storage("database lock poisoned".to_string()))?;
        let conn = conn.as_ref().ok_or(MapError::Inactive)?;

        let (z, x, y) = self.schema.stored_address(coord);
        let data: Option<Vec<u8>> = conn
            .prepare_cached(self.schema.tile_query())?
            .query_row(params![z, x, y], |row| row.get(0))
            .optional()?;

        Ok(data.map(TileBytes::new))
    }
}

fn open_readonly(path: &Path) -> Result<Connection> {
    Ok(Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY,
    )?)
}

fn zoom_level(value: i64) -> Result<u8> {
    u8::try_from(value)
        .ok()
        .filter(|z| *z <= MAX_KEY_ZOOM)
        .ok_or_else(|| MapError::Storage(format!("zoom level {} out of range", value)))
}

fn metadata(conn: &Connection, key: &str) -> Result<Option<String>> {
    let has_table: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE name = 'metadata'",
        [],
        |row| row.get(0),
    )?;
    if !has_table {
        return Ok(None);
    }
    Ok(conn
        .query_row(
            "SELECT value FROM metadata WHERE name = ?1",
            [key],
            |row| row.get(0),
        )
        .optional()?)
}

/// File name without the database extension, first letter capitalised
fn file_stem_name(path: &Path) -> String {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("database")
        .to_lowercase();
    let mut chars = stem.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => stem,
    }
}

fn sample_tile_size(conn: &Connection, schema: DatabaseSchema) -> Result<Option<u32>> {
    let query = match schema {
        DatabaseSchema::MBTiles => "SELECT tile_data FROM tiles LIMIT 1",
        DatabaseSchema::RMaps => "SELECT image FROM tiles LIMIT 1",
    };
    let data: Option<Vec<u8>> = conn.query_row(query, [], |row| row.get(0)).optional()?;
    let size = data.and_then(|data| {
        image::io::Reader::new(Cursor::new(data))
            .with_guessed_format()
            .ok()?
            .into_dimensions()
            .ok()
            .map(|(w, _)| w)
    });
    Ok(size)
}

/// Coverage of the tiles present at `zoom`
fn extent_bounds(
    conn: &Connection,
    schema: DatabaseSchema,
    zoom: u8,
    tile_size: u32,
) -> Result<Option<LatLngBounds>> {
    let (query, stored_zoom) = match schema {
        DatabaseSchema::MBTiles => (
            "SELECT MIN(tile_column), MAX(tile_column), MIN(tile_row), MAX(tile_row) FROM tiles WHERE zoom_level = ?1",
            zoom as i64,
        ),
        DatabaseSchema::RMaps => (
            "SELECT MIN(x), MAX(x), MIN(y), MAX(y) FROM tiles WHERE z = ?1",
            RMAPS_BASE_ZOOM - zoom as i64,
        ),
    };
    let extent: (Option<i64>, Option<i64>, Option<i64>, Option<i64>) =
        conn.query_row(query, [stored_zoom], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
        })?;
    let (Some(min_x), Some(max_x), Some(min_row), Some(max_row)) = extent else {
        return Ok(None);
    };

    let last = (1i64 << zoom) - 1;
    let (min_y, max_y) = match schema {
        DatabaseSchema::MBTiles => (last - max_row, last - min_row),
        DatabaseSchema::RMaps => (min_row, max_row),
    };

    let ts = tile_size as f64;
    let projection = Projection::Spherical;
    let north_west = projection.inverse(min_x as f64 * ts, min_y as f64 * ts, zoom, tile_size);
    let south_east =
        projection.inverse((max_x + 1) as f64 * ts, (max_y + 1) as f64 * ts, zoom, tile_size);

    Ok(Some(LatLngBounds::from_coords(
        south_east.lat,
        north_west.lng,
        north_west.lat,
        south_east.lng,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn rmaps_fixture(dir: &TempDir, file: &str) -> PathBuf {
        let path = dir.path().join(file);
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE tiles (x int, y int, z int, s int, image blob, PRIMARY KEY (x,y,z,s));
             CREATE TABLE info (maxzoom Int, minzoom Int, params VARCHAR);",
        )
        .unwrap();
        // zoom 2 and zoom 4
        conn.execute(
            "INSERT INTO tiles VALUES (1, 2, 15, 0, x'0102')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO tiles VALUES (4, 5, 13, 0, x'0304')",
            [],
        )
        .unwrap();
        path
    }

    #[test]
    fn test_rmaps_zoom_inversion() {
        let dir = TempDir::new().unwrap();
        let db = EmbeddedDatabase::open(rmaps_fixture(&dir, "topo.sqlitedb")).unwrap();

        assert_eq!(db.schema(), DatabaseSchema::RMaps);
        assert_eq!(db.name(), "Topo");
        assert_eq!(db.min_zoom(), 2);
        assert_eq!(db.max_zoom(), 4);
        assert_eq!(db.tile_size(), TILE_SIZE);

        db.activate().unwrap();
        assert_eq!(
            db.load(TileCoord::new(1, 2, 2)).unwrap(),
            Some(TileBytes::new(vec![1, 2]))
        );
        assert_eq!(
            db.load(TileCoord::new(4, 5, 4)).unwrap(),
            Some(TileBytes::new(vec![3, 4]))
        );
        assert_eq!(db.load(TileCoord::new(0, 0, 4)).unwrap(), None);
    }

    #[test]
    fn test_load_requires_activation() {
        let dir = TempDir::new().unwrap();
        let db = EmbeddedDatabase::open(rmaps_fixture(&dir, "a.sqlitedb")).unwrap();
        assert!(matches!(db.load(TileCoord::new(1, 2, 2)), Err(MapError::Inactive)));

        db.activate().unwrap();
        assert!(db.is_open());
        db.deactivate();
        assert!(!db.is_open());
    }

    #[test]
    fn test_unknown_schema() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("other.db");
        Connection::open(&path)
            .unwrap()
            .execute_batch("CREATE TABLE tiles (a int, b int);")
            .unwrap();
        assert!(matches!(
            EmbeddedDatabase::open(&path),
            Err(MapError::Storage(_))
        ));
    }

    #[test]
    fn test_file_stem_name() {
        assert_eq!(file_stem_name(Path::new("/x/OSM.sqlitedb")), "Osm");
        assert_eq!(file_stem_name(Path::new("maps/topo")), "Topo");
    }
}
