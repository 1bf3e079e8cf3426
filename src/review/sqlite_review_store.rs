use super::models::{AlbumOpinion, AlbumReview, Opinion, TrackReview};
use super::ranking;
use super::rescoring;
use super::review_store::{AlbumReviewStore, TrackReviewStore};
use crate::sqlite_column;
use crate::sqlite_persistence::{
    open_versioned_db, Column, ForeignKey, ForeignKeyOnChange, SqlType, Table, VersionedSchema,
    DEFAULT_TIMESTAMP,
};
use anyhow::{bail, Context, Result};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

/// V 0
const TRACK_REVIEW_TABLE_V_0: Table = Table {
    name: "track_review",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("user_id", &SqlType::Text, non_null = true),
        sqlite_column!("track_id", &SqlType::Text, non_null = true),
        sqlite_column!("opinion", &SqlType::Integer, non_null = true),
        sqlite_column!("bucket_rank", &SqlType::Integer, non_null = true),
        sqlite_column!("rating", &SqlType::Real, non_null = true),
        sqlite_column!(
            "description",
            &SqlType::Text,
            non_null = true,
            default_value = Some("''")
        ),
        sqlite_column!(
            "genres",
            &SqlType::Text,
            non_null = true,
            default_value = Some("'[]'")
        ),
        sqlite_column!("album_id", &SqlType::Text),
        sqlite_column!(
            "created",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
        sqlite_column!(
            "updated",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[
        ("idx_track_review_user_id", "user_id"),
        ("idx_track_review_track_id", "track_id"),
    ],
    unique_constraints: &[],
};
const ALBUM_REVIEW_TABLE_V_0: Table = Table {
    name: "album_review",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("user_id", &SqlType::Text, non_null = true),
        sqlite_column!("spotify_album_id", &SqlType::Text, non_null = true),
        sqlite_column!(
            "description",
            &SqlType::Text,
            non_null = true,
            default_value = Some("''")
        ),
        sqlite_column!("ranking", &SqlType::Integer, non_null = true),
        sqlite_column!(
            "genres",
            &SqlType::Text,
            non_null = true,
            default_value = Some("'[]'")
        ),
        sqlite_column!("rating", &SqlType::Real, non_null = true),
        sqlite_column!("opinion", &SqlType::Integer, non_null = true),
        sqlite_column!(
            "created",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[("idx_album_review_album_id", "spotify_album_id")],
    unique_constraints: &[&["user_id", "spotify_album_id"]],
};
const ALBUM_REVIEW_TRACK_TABLE_V_0: Table = Table {
    name: "album_review_track",
    columns: &[
        sqlite_column!(
            "album_review_id",
            &SqlType::Text,
            non_null = true,
            foreign_key = Some(&ForeignKey {
                foreign_table: "album_review",
                foreign_column: "id",
                on_delete: ForeignKeyOnChange::Cascade,
            })
        ),
        sqlite_column!("track_id", &SqlType::Text, non_null = true),
        sqlite_column!("position", &SqlType::Integer, non_null = true),
    ],
    indices: &[("idx_album_review_track_review_id", "album_review_id")],
    unique_constraints: &[&["album_review_id", "position"]],
};

/// V 1
const TRACK_REVIEW_TABLE_V_1: Table = Table {
    name: "track_review",
    columns: TRACK_REVIEW_TABLE_V_0.columns,
    indices: TRACK_REVIEW_TABLE_V_0.indices,
    unique_constraints: &[&["user_id", "track_id"]],
};

pub const VERSIONED_SCHEMAS: &[VersionedSchema] = &[
    VersionedSchema {
        version: 0,
        tables: &[
            TRACK_REVIEW_TABLE_V_0,
            ALBUM_REVIEW_TABLE_V_0,
            ALBUM_REVIEW_TRACK_TABLE_V_0,
        ],
        migration: None,
    },
    VersionedSchema {
        version: 1,
        tables: &[
            TRACK_REVIEW_TABLE_V_1,
            ALBUM_REVIEW_TABLE_V_0,
            ALBUM_REVIEW_TRACK_TABLE_V_0,
        ],
        migration: Some(|conn: &Connection| {
            for (index_name, _) in TRACK_REVIEW_TABLE_V_0.indices {
                conn.execute(&format!("DROP INDEX IF EXISTS {};", index_name), [])?;
            }
            conn.execute(
                "ALTER TABLE track_review RENAME TO track_review_backup;",
                [],
            )?;
            TRACK_REVIEW_TABLE_V_1.create(conn)?;

            // Keep only the oldest review of each (user, track)
            let copied = conn.execute(
                "INSERT INTO track_review SELECT * FROM track_review_backup b
                 WHERE b.id = (
                     SELECT b2.id FROM track_review_backup b2
                     WHERE b2.user_id = b.user_id AND b2.track_id = b.track_id
                     ORDER BY b2.created ASC, b2.id ASC LIMIT 1
                 );",
                [],
            )?;
            let total: i64 =
                conn.query_row("SELECT COUNT(*) FROM track_review_backup;", [], |row| {
                    row.get(0)
                })?;
            conn.execute("DROP TABLE track_review_backup;", [])?;
            info!(
                "Removed {} duplicate track reviews",
                total as usize - copied
            );

            // Dropping duplicates leaves holes in the buckets
            let mut by_user: HashMap<String, Vec<TrackReview>> = HashMap::new();
            {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM track_review;",
                    TRACK_REVIEW_COLUMNS
                ))?;
                let rows = stmt.query_map([], track_review_from_row)?;
                for row in rows {
                    let review = row?;
                    by_user
                        .entry(review.user_id.clone())
                        .or_default()
                        .push(review);
                }
            }
            for reviews in by_user.values_mut() {
                ranking::renormalize(reviews);
                rescoring::rescore(reviews);
                for review in reviews.iter() {
                    conn.execute(
                        "UPDATE track_review SET bucket_rank = ?1, rating = ?2 WHERE id = ?3",
                        params![review.rank, review.rating, review.id],
                    )?;
                }
            }
            Ok(())
        }),
    },
];

const TRACK_REVIEW_COLUMNS: &str = "id, user_id, track_id, opinion, bucket_rank, rating, \
     description, genres, album_id, created, updated";

const ALBUM_REVIEW_COLUMNS: &str =
    "id, user_id, spotify_album_id, description, ranking, genres, rating, opinion, created";

fn to_unix_secs(time: SystemTime) -> i64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn from_unix_secs(secs: i64) -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(secs.max(0) as u64)
}

fn parse_genres(idx: usize, raw: String) -> rusqlite::Result<Vec<String>> {
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn track_review_from_row(row: &Row) -> rusqlite::Result<TrackReview> {
    let opinion_int: i32 = row.get(3)?;
    let opinion = Opinion::from_int(opinion_int).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            Type::Integer,
            format!("Invalid opinion {}", opinion_int).into(),
        )
    })?;
    Ok(TrackReview {
        id: row.get(0)?,
        user_id: row.get(1)?,
        track_id: row.get(2)?,
        opinion,
        rank: row.get(4)?,
        rating: row.get(5)?,
        description: row.get(6)?,
        genres: parse_genres(7, row.get(7)?)?,
        album_id: row.get(8)?,
        created: from_unix_secs(row.get(9)?),
        updated: from_unix_secs(row.get(10)?),
    })
}

/// Album row without its track list, which lives in a separate table.
fn album_review_from_row(row: &Row) -> rusqlite::Result<AlbumReview> {
    Ok(AlbumReview {
        id: row.get(0)?,
        user_id: row.get(1)?,
        spotify_album_id: row.get(2)?,
        description: row.get(3)?,
        ranking: row.get(4)?,
        genres: parse_genres(5, row.get(5)?)?,
        spotify_track_ids: vec![],
        rating: row.get(6)?,
        opinion: AlbumOpinion::from_int(row.get(7)?),
        created: from_unix_secs(row.get(8)?),
    })
}

fn upsert_track_review(tx: &Transaction, review: &TrackReview) -> Result<()> {
    tx.execute(
        &format!(
            "INSERT INTO track_review ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT(id) DO UPDATE SET
                track_id = excluded.track_id,
                opinion = excluded.opinion,
                bucket_rank = excluded.bucket_rank,
                rating = excluded.rating,
                description = excluded.description,
                genres = excluded.genres,
                album_id = excluded.album_id,
                updated = excluded.updated",
            TRACK_REVIEW_COLUMNS
        ),
        params![
            review.id,
            review.user_id,
            review.track_id,
            review.opinion.to_int(),
            review.rank,
            review.rating,
            review.description,
            serde_json::to_string(&review.genres)?,
            review.album_id,
            to_unix_secs(review.created),
            to_unix_secs(review.updated),
        ],
    )
    .with_context(|| format!("Failed to save track review {}", review.id))?;
    Ok(())
}

fn write_album_tracks(tx: &Transaction, review: &AlbumReview) -> Result<()> {
    tx.execute(
        "DELETE FROM album_review_track WHERE album_review_id = ?1",
        params![review.id],
    )?;
    let mut stmt = tx.prepare(
        "INSERT INTO album_review_track (album_review_id, track_id, position) VALUES (?1, ?2, ?3)",
    )?;
    for (position, track_id) in review.spotify_track_ids.iter().enumerate() {
        stmt.execute(params![review.id, track_id, position as i64])?;
    }
    Ok(())
}

/// SQLite-backed store for track and album reviews.
#[derive(Clone)]
pub struct SqliteReviewStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteReviewStore {
    pub fn new<T: AsRef<Path>>(db_path: T) -> Result<Self> {
        let conn = open_versioned_db(db_path.as_ref(), VERSIONED_SCHEMAS)
            .with_context(|| format!("Failed to open review db {:?}", db_path.as_ref()))?;
        Ok(SqliteReviewStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn load_album_tracks(conn: &Connection, album: &mut AlbumReview) -> Result<()> {
        let mut stmt = conn.prepare(
            "SELECT track_id FROM album_review_track WHERE album_review_id = ?1 ORDER BY position",
        )?;
        album.spotify_track_ids = stmt
            .query_map(params![album.id], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(())
    }

    fn query_albums(
        conn: &Connection,
        where_clause: &str,
        args: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<AlbumReview>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM album_review {} ORDER BY created ASC, id ASC",
            ALBUM_REVIEW_COLUMNS, where_clause
        ))?;
        let mut albums = stmt
            .query_map(args, album_review_from_row)?
            .collect::<Result<Vec<AlbumReview>, _>>()?;
        for album in albums.iter_mut() {
            Self::load_album_tracks(conn, album)?;
        }
        Ok(albums)
    }

    fn query_tracks(
        conn: &Connection,
        where_clause: &str,
        args: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<TrackReview>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM track_review {}",
            TRACK_REVIEW_COLUMNS, where_clause
        ))?;
        let reviews = stmt
            .query_map(args, track_review_from_row)?
            .collect::<Result<Vec<TrackReview>, _>>()?;
        Ok(reviews)
    }
}

impl TrackReviewStore for SqliteReviewStore {
    fn get_track_review(&self, id: &str) -> Result<Option<TrackReview>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            &format!("SELECT {} FROM track_review WHERE id = ?1", TRACK_REVIEW_COLUMNS),
            params![id],
            track_review_from_row,
        )
        .optional()
        .with_context(|| format!("Failed to load track review {}", id))
    }

    fn get_user_track_review(&self, user_id: &str, track_id: &str) -> Result<Option<TrackReview>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            &format!(
                "SELECT {} FROM track_review WHERE user_id = ?1 AND track_id = ?2",
                TRACK_REVIEW_COLUMNS
            ),
            params![user_id, track_id],
            track_review_from_row,
        )
        .optional()
        .with_context(|| format!("Failed to load review of {} by {}", track_id, user_id))
    }

    fn get_user_track_reviews(&self, user_id: &str) -> Result<Vec<TrackReview>> {
        let conn = self.conn.lock().unwrap();
        Self::query_tracks(&conn, "WHERE user_id = ?1", params![user_id])
    }

    fn get_track_reviews(&self, track_id: &str) -> Result<Vec<TrackReview>> {
        let conn = self.conn.lock().unwrap();
        Self::query_tracks(&conn, "WHERE track_id = ?1", params![track_id])
    }

    fn save_user_track_reviews(
        &self,
        user_id: &str,
        reviews: &[TrackReview],
        deleted_ids: &[String],
    ) -> Result<()> {
        if let Some(foreign) = reviews.iter().find(|r| r.user_id != user_id) {
            bail!(
                "Review {} belongs to {}, not {}",
                foreign.id,
                foreign.user_id,
                user_id
            );
        }

        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        for id in deleted_ids {
            tx.execute(
                "DELETE FROM track_review WHERE id = ?1 AND user_id = ?2",
                params![id, user_id],
            )?;
        }
        for review in reviews {
            upsert_track_review(&tx, review)?;
        }
        tx.commit()?;
        debug!(
            "Saved {} reviews and deleted {} for user {}",
            reviews.len(),
            deleted_ids.len(),
            user_id
        );
        Ok(())
    }
}

impl AlbumReviewStore for SqliteReviewStore {
    fn get_album_review(&self, id: &str) -> Result<Option<AlbumReview>> {
        let conn = self.conn.lock().unwrap();
        Ok(Self::query_albums(&conn, "WHERE id = ?1", params![id])?
            .into_iter()
            .next())
    }

    fn get_user_album_review(
        &self,
        user_id: &str,
        spotify_album_id: &str,
    ) -> Result<Option<AlbumReview>> {
        let conn = self.conn.lock().unwrap();
        Ok(Self::query_albums(
            &conn,
            "WHERE user_id = ?1 AND spotify_album_id = ?2",
            params![user_id, spotify_album_id],
        )?
        .into_iter()
        .next())
    }

    fn get_user_album_reviews(&self, user_id: &str) -> Result<Vec<AlbumReview>> {
        let conn = self.conn.lock().unwrap();
        Self::query_albums(&conn, "WHERE user_id = ?1", params![user_id])
    }

    fn get_album_reviews(&self, spotify_album_id: &str) -> Result<Vec<AlbumReview>> {
        let conn = self.conn.lock().unwrap();
        Self::query_albums(&conn, "WHERE spotify_album_id = ?1", params![spotify_album_id])
    }

    fn get_all_album_reviews(&self) -> Result<Vec<AlbumReview>> {
        let conn = self.conn.lock().unwrap();
        Self::query_albums(&conn, "", params![])
    }

    fn insert_album_review(&self, review: &AlbumReview) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute(
            &format!(
                "INSERT INTO album_review ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                ALBUM_REVIEW_COLUMNS
            ),
            params![
                review.id,
                review.user_id,
                review.spotify_album_id,
                review.description,
                review.ranking,
                serde_json::to_string(&review.genres)?,
                review.rating,
                review.opinion.to_int(),
                to_unix_secs(review.created),
            ],
        )
        .with_context(|| {
            format!(
                "Failed to insert album review of {} by {}",
                review.spotify_album_id, review.user_id
            )
        })?;
        write_album_tracks(&tx, review)?;
        tx.commit()?;
        Ok(())
    }

    fn update_album_review(&self, review: &AlbumReview) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let updated = tx.execute(
            "UPDATE album_review SET description = ?1, ranking = ?2, genres = ?3, rating = ?4, opinion = ?5
             WHERE id = ?6",
            params![
                review.description,
                review.ranking,
                serde_json::to_string(&review.genres)?,
                review.rating,
                review.opinion.to_int(),
                review.id,
            ],
        )?;
        if updated == 0 {
            bail!("Album review {} does not exist", review.id);
        }
        write_album_tracks(&tx, review)?;
        tx.commit()?;
        Ok(())
    }

    fn delete_album_review(&self, id: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn.execute("DELETE FROM album_review WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }
}
