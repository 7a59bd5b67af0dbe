// Repository pattern - isolates all database side effects
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, OptionalExtension, Row, TransactionBehavior};
use std::collections::HashMap;
use thiserror::Error;

use crate::db::models::{
    Comment, CommentWithUser, NewPost, Post, PostCounts, PostPatch, UpsertUser, User,
};
use crate::state::DbPool;

/// SQLite caps bound parameters per statement; count queries are chunked.
const MAX_IDS_PER_QUERY: usize = 500;

const USER_COLUMNS: &str =
    "id, email, first_name, last_name, profile_image_url, created_at, updated_at";

const POST_COLUMNS: &str = "id, user_id, content, is_voice_transcription, image_url, \
     link_url, link_title, link_description, created_at, updated_at";

const COMMENT_COLUMNS: &str = "id, user_id, post_id, content, created_at, updated_at";

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    Database(#[from] r2d2::Error),

    #[error("SQL error: {0}")]
    Sql(#[from] rusqlite::Error),

    #[error("Post {0} does not exist")]
    MissingPost(i64),
}

/// Repository trait - all feed and user persistence
#[async_trait]
pub trait FeedRepository: Send + Sync {
    async fn get_user(&self, id: &str) -> Result<Option<User>, RepositoryError>;

    /// Insert or refresh a user keyed on id. `created_at` survives updates.
    async fn upsert_user(&self, user: &UpsertUser) -> Result<User, RepositoryError>;

    /// Posts joined with their owner, newest first. `owner` filters by user id.
    async fn list_posts(&self, owner: Option<&str>) -> Result<Vec<(Post, User)>, RepositoryError>;

    /// Comment and like counts grouped by post id. Ids without rows are absent.
    async fn count_for_posts(
        &self,
        post_ids: &[i64],
    ) -> Result<HashMap<i64, PostCounts>, RepositoryError>;

    async fn get_post(&self, id: i64) -> Result<Option<Post>, RepositoryError>;

    async fn insert_post(&self, owner_id: &str, post: &NewPost) -> Result<Post, RepositoryError>;

    /// Apply the fields present in `patch`. Returns None when the post is gone.
    async fn update_post(
        &self,
        id: i64,
        patch: &PostPatch,
    ) -> Result<Option<Post>, RepositoryError>;

    /// Delete a post with its comments and likes in one transaction.
    async fn delete_post(&self, id: i64) -> Result<bool, RepositoryError>;

    /// Comments on a post with their authors, oldest first.
    async fn list_comments(&self, post_id: i64) -> Result<Vec<CommentWithUser>, RepositoryError>;

    async fn insert_comment(
        &self,
        author_id: &str,
        post_id: i64,
        content: &str,
    ) -> Result<Comment, RepositoryError>;

    /// Returns true when a new row was written, false when already liked.
    async fn insert_like(&self, user_id: &str, post_id: i64) -> Result<bool, RepositoryError>;

    /// Returns true when a row was removed.
    async fn delete_like(&self, user_id: &str, post_id: i64) -> Result<bool, RepositoryError>;

    async fn has_liked(&self, user_id: &str, post_id: i64) -> Result<bool, RepositoryError>;
}

/// SQLite implementation
pub struct SqliteFeedRepository {
    pool: DbPool,
}

impl SqliteFeedRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FeedRepository for SqliteFeedRepository {
    async fn get_user(&self, id: &str) -> Result<Option<User>, RepositoryError> {
        let conn = self.pool.get()?;

        let user = conn
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                params![id],
                |row| user_from_row(row, 0),
            )
            .optional()?;

        Ok(user)
    }

    async fn upsert_user(&self, user: &UpsertUser) -> Result<User, RepositoryError> {
        let conn = self.pool.get()?;
        let now = Utc::now();

        let saved = conn.query_row(
            &format!(
                "INSERT INTO users (id, email, first_name, last_name, profile_image_url, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
                 ON CONFLICT(id) DO UPDATE SET
                   email = excluded.email,
                   first_name = excluded.first_name,
                   last_name = excluded.last_name,
                   profile_image_url = excluded.profile_image_url,
                   updated_at = excluded.updated_at
                 RETURNING {USER_COLUMNS}"
            ),
            params![
                user.id,
                user.email,
                user.first_name,
                user.last_name,
                user.profile_image_url,
                now
            ],
            |row| user_from_row(row, 0),
        )?;

        Ok(saved)
    }

    async fn list_posts(&self, owner: Option<&str>) -> Result<Vec<(Post, User)>, RepositoryError> {
        let conn = self.pool.get()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {}, {}
             FROM posts p
             JOIN users u ON u.id = p.user_id
             WHERE ?1 IS NULL OR p.user_id = ?1
             ORDER BY p.created_at DESC, p.id DESC",
            qualify("p", POST_COLUMNS),
            qualify("u", USER_COLUMNS)
        ))?;

        let rows = stmt
            .query_map(params![owner], |row| {
                Ok((post_from_row(row, 0)?, user_from_row(row, 10)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    async fn count_for_posts(
        &self,
        post_ids: &[i64],
    ) -> Result<HashMap<i64, PostCounts>, RepositoryError> {
        let mut counts: HashMap<i64, PostCounts> = HashMap::new();
        if post_ids.is_empty() {
            return Ok(counts);
        }

        let conn = self.pool.get()?;

        for chunk in post_ids.chunks(MAX_IDS_PER_QUERY) {
            let placeholders = vec!["?"; chunk.len()].join(", ");

            for (table, is_comments) in [("comments", true), ("likes", false)] {
                let mut stmt = conn.prepare(&format!(
                    "SELECT post_id, COUNT(*) FROM {table}
                     WHERE post_id IN ({placeholders})
                     GROUP BY post_id"
                ))?;

                let grouped = stmt
                    .query_map(params_from_iter(chunk.iter()), |row| {
                        Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;

                for (post_id, count) in grouped {
                    let entry = counts.entry(post_id).or_default();
                    if is_comments {
                        entry.comments = count;
                    } else {
                        entry.likes = count;
                    }
                }
            }
        }

        Ok(counts)
    }

    async fn get_post(&self, id: i64) -> Result<Option<Post>, RepositoryError> {
        let conn = self.pool.get()?;

        let post = conn
            .query_row(
                &format!("SELECT {POST_COLUMNS} FROM posts WHERE id = ?1"),
                params![id],
                |row| post_from_row(row, 0),
            )
            .optional()?;

        Ok(post)
    }

    async fn insert_post(&self, owner_id: &str, post: &NewPost) -> Result<Post, RepositoryError> {
        let conn = self.pool.get()?;
        let now = Utc::now();

        let created = conn.query_row(
            &format!(
                "INSERT INTO posts (user_id, content, is_voice_transcription, image_url,
                                         link_url, link_title, link_description, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
                 RETURNING {POST_COLUMNS}"
            ),
            params![
                owner_id,
                post.content,
                post.is_voice_transcription,
                post.image_url,
                post.link_url,
                post.link_title,
                post.link_description,
                now
            ],
            |row| post_from_row(row, 0),
        )?;

        Ok(created)
    }

    async fn update_post(
        &self,
        id: i64,
        patch: &PostPatch,
    ) -> Result<Option<Post>, RepositoryError> {
        let conn = self.pool.get()?;

        let mut assignments: Vec<&str> = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if let Some(content) = &patch.content {
            assignments.push("content = ?");
            values.push(Value::Text(content.clone()));
        }
        if let Some(flag) = patch.is_voice_transcription {
            assignments.push("is_voice_transcription = ?");
            values.push(Value::Integer(i64::from(flag)));
        }
        for (column, field) in [
            ("image_url = ?", &patch.image_url),
            ("link_url = ?", &patch.link_url),
            ("link_title = ?", &patch.link_title),
            ("link_description = ?", &patch.link_description),
        ] {
            if let Some(field) = field {
                assignments.push(column);
                values.push(field.clone().map(Value::Text).unwrap_or(Value::Null));
            }
        }

        assignments.push("updated_at = ?");
        values.push(Value::Text(sql_timestamp(Utc::now())));
        values.push(Value::Integer(id));

        let updated = conn
            .query_row(
                &format!(
                    "UPDATE posts SET {} WHERE id = ? RETURNING {POST_COLUMNS}",
                    assignments.join(", ")
                ),
                params_from_iter(values),
                |row| post_from_row(row, 0),
            )
            .optional()?;

        Ok(updated)
    }

    async fn delete_post(&self, id: i64) -> Result<bool, RepositoryError> {
        let mut conn = self.pool.get()?;

        // ATOMIC TRANSACTION - comments, likes and the post go together
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        tx.execute("DELETE FROM comments WHERE post_id = ?1", params![id])?;
        tx.execute("DELETE FROM likes WHERE post_id = ?1", params![id])?;
        let removed = tx.execute("DELETE FROM posts WHERE id = ?1", params![id])?;
        tx.commit()?;

        Ok(removed > 0)
    }

    async fn list_comments(&self, post_id: i64) -> Result<Vec<CommentWithUser>, RepositoryError> {
        let conn = self.pool.get()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {}, {}
             FROM comments c
             JOIN users u ON u.id = c.user_id
             WHERE c.post_id = ?1
             ORDER BY c.created_at ASC, c.id ASC",
            qualify("c", COMMENT_COLUMNS),
            qualify("u", USER_COLUMNS)
        ))?;

        let comments = stmt
            .query_map(params![post_id], |row| {
                Ok(CommentWithUser {
                    comment: comment_from_row(row, 0)?,
                    user: user_from_row(row, 6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(comments)
    }

    async fn insert_comment(
        &self,
        author_id: &str,
        post_id: i64,
        content: &str,
    ) -> Result<Comment, RepositoryError> {
        let conn = self.pool.get()?;
        let now = Utc::now();

        let result = conn.query_row(
            &format!(
                "INSERT INTO comments (user_id, post_id, content, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)
                 RETURNING {COMMENT_COLUMNS}"
            ),
            params![author_id, post_id, content, now],
            |row| comment_from_row(row, 0),
        );

        match result {
            Ok(comment) => Ok(comment),
            Err(e) if is_foreign_key_violation(&e) => Err(classify_missing_post(&conn, post_id, e)),
            Err(e) => Err(e.into()),
        }
    }

    async fn insert_like(&self, user_id: &str, post_id: i64) -> Result<bool, RepositoryError> {
        let conn = self.pool.get()?;

        // The composite key absorbs duplicate and concurrent likes
        let result = conn.execute(
            "INSERT INTO likes (user_id, post_id) VALUES (?1, ?2)
             ON CONFLICT(user_id, post_id) DO NOTHING",
            params![user_id, post_id],
        );

        match result {
            Ok(rows) => Ok(rows > 0),
            Err(e) if is_foreign_key_violation(&e) => Err(classify_missing_post(&conn, post_id, e)),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_like(&self, user_id: &str, post_id: i64) -> Result<bool, RepositoryError> {
        let conn = self.pool.get()?;

        let rows = conn.execute(
            "DELETE FROM likes WHERE user_id = ?1 AND post_id = ?2",
            params![user_id, post_id],
        )?;

        Ok(rows > 0)
    }

    async fn has_liked(&self, user_id: &str, post_id: i64) -> Result<bool, RepositoryError> {
        let conn = self.pool.get()?;

        let liked: bool = conn.query_row(
            "SELECT COUNT(*) > 0 FROM likes WHERE user_id = ?1 AND post_id = ?2",
            params![user_id, post_id],
            |row| row.get(0),
        )?;

        Ok(liked)
    }
}

// --- Row mapping ---

fn qualify(alias: &str, columns: &str) -> String {
    columns
        .split(", ")
        .map(|column| format!("{alias}.{column}"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn user_from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(offset)?,
        email: row.get(offset + 1)?,
        first_name: row.get(offset + 2)?,
        last_name: row.get(offset + 3)?,
        profile_image_url: row.get(offset + 4)?,
        created_at: row.get(offset + 5)?,
        updated_at: row.get(offset + 6)?,
    })
}

fn post_from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<Post> {
    Ok(Post {
        id: row.get(offset)?,
        user_id: row.get(offset + 1)?,
        content: row.get(offset + 2)?,
        is_voice_transcription: row.get(offset + 3)?,
        image_url: row.get(offset + 4)?,
        link_url: row.get(offset + 5)?,
        link_title: row.get(offset + 6)?,
        link_description: row.get(offset + 7)?,
        created_at: row.get(offset + 8)?,
        updated_at: row.get(offset + 9)?,
    })
}

fn comment_from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<Comment> {
    Ok(Comment {
        id: row.get(offset)?,
        user_id: row.get(offset + 1)?,
        post_id: row.get(offset + 2)?,
        content: row.get(offset + 3)?,
        created_at: row.get(offset + 4)?,
        updated_at: row.get(offset + 5)?,
    })
}

/// Same text layout rusqlite uses for `DateTime<Utc>` parameters, so values
/// bound through `Value` sort alongside the others.
fn sql_timestamp(at: chrono::DateTime<Utc>) -> String {
    at.format("%F %T%.f%:z").to_string()
}

fn is_foreign_key_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY
    )
}

/// A foreign-key failure may come from the post or the user reference.
/// Only a missing post is reported as such; anything else stays a SQL error.
fn classify_missing_post(
    conn: &rusqlite::Connection,
    post_id: i64,
    original: rusqlite::Error,
) -> RepositoryError {
    let exists = conn
        .query_row(
            "SELECT COUNT(*) > 0 FROM posts WHERE id = ?1",
            params![post_id],
            |row| row.get::<_, bool>(0),
        )
        .unwrap_or(true);

    if exists {
        RepositoryError::Sql(original)
    } else {
        RepositoryError::MissingPost(post_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn repo() -> SqliteFeedRepository {
        let pool = db::create_memory_pool().unwrap();
        db::run_migrations(&pool).unwrap();
        SqliteFeedRepository::new(pool)
    }

    fn upsert(id: &str) -> UpsertUser {
        UpsertUser {
            id: id.to_string(),
            first_name: "Test".to_string(),
            ..Default::default()
        }
    }

    fn new_post(content: &str) -> NewPost {
        NewPost {
            content: content.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn count_for_empty_batch_is_empty() {
        let repo = repo();
        let counts = repo.count_for_posts(&[]).await.unwrap();
        assert!(counts.is_empty());
    }

    #[tokio::test]
    async fn count_for_posts_groups_by_post() {
        let repo = repo();
        repo.upsert_user(&upsert("a")).await.unwrap();
        repo.upsert_user(&upsert("b")).await.unwrap();
        let p1 = repo.insert_post("a", &new_post("one")).await.unwrap();
        let p2 = repo.insert_post("a", &new_post("two")).await.unwrap();

        repo.insert_comment("b", p1.id, "x").await.unwrap();
        repo.insert_comment("a", p1.id, "y").await.unwrap();
        repo.insert_like("b", p1.id).await.unwrap();

        let counts = repo.count_for_posts(&[p1.id, p2.id]).await.unwrap();
        assert_eq!(
            counts.get(&p1.id),
            Some(&PostCounts {
                comments: 2,
                likes: 1
            })
        );
        assert_eq!(counts.get(&p2.id), None);
    }

    #[tokio::test]
    async fn count_for_posts_handles_more_ids_than_one_chunk() {
        let repo = repo();
        repo.upsert_user(&upsert("a")).await.unwrap();
        let post = repo.insert_post("a", &new_post("hi")).await.unwrap();
        repo.insert_like("a", post.id).await.unwrap();

        let mut ids: Vec<i64> = (10_000..10_000 + MAX_IDS_PER_QUERY as i64 + 7).collect();
        ids.push(post.id);

        let counts = repo.count_for_posts(&ids).await.unwrap();
        assert_eq!(counts.len(), 1);
        assert_eq!(counts[&post.id].likes, 1);
    }

    #[tokio::test]
    async fn update_with_only_timestamp_keeps_fields() {
        let repo = repo();
        repo.upsert_user(&upsert("a")).await.unwrap();
        let post = repo
            .insert_post(
                "a",
                &NewPost {
                    content: "hello".into(),
                    link_url: Some("https://example.com".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let updated = repo
            .update_post(post.id, &PostPatch::default())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.content, "hello");
        assert_eq!(updated.link_url.as_deref(), Some("https://example.com"));
        assert!(updated.updated_at >= post.updated_at);
    }

    #[tokio::test]
    async fn update_can_clear_optional_field() {
        let repo = repo();
        repo.upsert_user(&upsert("a")).await.unwrap();
        let post = repo
            .insert_post(
                "a",
                &NewPost {
                    content: "hello".into(),
                    link_title: Some("Title".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let patch = PostPatch {
            link_title: Some(None),
            is_voice_transcription: Some(true),
            ..Default::default()
        };
        let updated = repo.update_post(post.id, &patch).await.unwrap().unwrap();
        assert_eq!(updated.link_title, None);
        assert!(updated.is_voice_transcription);
    }

    #[tokio::test]
    async fn update_missing_post_returns_none() {
        let repo = repo();
        let patch = PostPatch {
            content: Some("x".into()),
            ..Default::default()
        };
        assert!(repo.update_post(404, &patch).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn like_on_missing_post_is_missing_post() {
        let repo = repo();
        repo.upsert_user(&upsert("a")).await.unwrap();
        let err = repo.insert_like("a", 77).await.unwrap_err();
        assert!(matches!(err, RepositoryError::MissingPost(77)));
    }

    #[tokio::test]
    async fn comment_from_unknown_user_is_sql_error() {
        let repo = repo();
        repo.upsert_user(&upsert("a")).await.unwrap();
        let post = repo.insert_post("a", &new_post("hi")).await.unwrap();

        let err = repo
            .insert_comment("ghost", post.id, "boo")
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Sql(_)));
    }

    #[test]
    fn sql_timestamp_matches_rusqlite_layout() {
        let at = chrono::DateTime::parse_from_rfc3339("2025-01-15T12:00:00.250Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(sql_timestamp(at), "2025-01-15 12:00:00.250+00:00");
    }
}
