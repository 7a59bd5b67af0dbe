//! Feed service: posts, comments and likes with ownership rules and
//! read-time counts.
//!
//! The service owns no storage of its own. It is built around an injected
//! [`FeedRepository`], which keeps handlers and tests independent of SQLite.

pub mod repository;

use std::sync::Arc;

use thiserror::Error;

use crate::db::models::{
    Comment, CommentWithUser, NewPost, Post, PostPatch, PostWithUser, UpsertUser, User,
};
use crate::state::DbPool;
pub use repository::{FeedRepository, RepositoryError, SqliteFeedRepository};

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Post not found")]
    NotFound,

    #[error("{0}")]
    Forbidden(&'static str),

    #[error("{0}")]
    Validation(&'static str),

    #[error(transparent)]
    Repository(RepositoryError),
}

impl From<RepositoryError> for FeedError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::MissingPost(_) => FeedError::NotFound,
            other => FeedError::Repository(other),
        }
    }
}

pub type FeedResult<T> = Result<T, FeedError>;

#[derive(Clone)]
pub struct FeedService {
    repo: Arc<dyn FeedRepository>,
}

impl FeedService {
    pub fn new(repo: Arc<dyn FeedRepository>) -> Self {
        Self { repo }
    }

    /// Service backed by the SQLite repository on `pool`.
    pub fn sqlite(pool: DbPool) -> Self {
        Self::new(Arc::new(SqliteFeedRepository::new(pool)))
    }

    // --- Users ---

    pub async fn get_user(&self, id: &str) -> FeedResult<Option<User>> {
        Ok(self.repo.get_user(id).await?)
    }

    pub async fn upsert_user(&self, user: &UpsertUser) -> FeedResult<User> {
        Ok(self.repo.upsert_user(user).await?)
    }

    // --- Reads ---

    pub async fn list_all_posts(&self) -> FeedResult<Vec<PostWithUser>> {
        self.posts_with_counts(None).await
    }

    pub async fn list_posts_by_user(&self, user_id: &str) -> FeedResult<Vec<PostWithUser>> {
        self.posts_with_counts(Some(user_id)).await
    }

    pub async fn get_post(&self, id: i64) -> FeedResult<Option<Post>> {
        Ok(self.repo.get_post(id).await?)
    }

    pub async fn list_comments(&self, post_id: i64) -> FeedResult<Vec<CommentWithUser>> {
        Ok(self.repo.list_comments(post_id).await?)
    }

    pub async fn has_liked(&self, user_id: &str, post_id: i64) -> FeedResult<bool> {
        Ok(self.repo.has_liked(user_id, post_id).await?)
    }

    async fn posts_with_counts(&self, owner: Option<&str>) -> FeedResult<Vec<PostWithUser>> {
        let rows = self.repo.list_posts(owner).await?;

        let ids: Vec<i64> = rows.iter().map(|(post, _)| post.id).collect();
        let counts = self.repo.count_for_posts(&ids).await?;

        Ok(rows
            .into_iter()
            .map(|(post, user)| {
                let count = counts.get(&post.id).copied().unwrap_or_default();
                PostWithUser { post, user, count }
            })
            .collect())
    }

    // --- Writes ---

    /// Create a post owned by `owner_id`, which is always the authenticated caller.
    pub async fn create_post(&self, owner_id: &str, mut post: NewPost) -> FeedResult<Post> {
        post.content = require_content(&post.content, "Post content cannot be empty")?;
        Ok(self.repo.insert_post(owner_id, &post).await?)
    }

    pub async fn update_post(
        &self,
        requester_id: &str,
        post_id: i64,
        mut patch: PostPatch,
    ) -> FeedResult<Post> {
        self.require_owner(requester_id, post_id, "You can only edit your own posts")
            .await?;

        if let Some(content) = &patch.content {
            patch.content = Some(require_content(content, "Post content cannot be empty")?);
        }

        self.repo
            .update_post(post_id, &patch)
            .await?
            .ok_or(FeedError::NotFound)
    }

    pub async fn delete_post(&self, requester_id: &str, post_id: i64) -> FeedResult<()> {
        self.require_owner(requester_id, post_id, "You can only delete your own posts")
            .await?;

        if !self.repo.delete_post(post_id).await? {
            return Err(FeedError::NotFound);
        }

        tracing::info!(post_id, user_id = requester_id, "Post deleted");
        Ok(())
    }

    /// Any authenticated user may comment on any post. Post existence is left
    /// to the store's foreign key.
    pub async fn create_comment(
        &self,
        author_id: &str,
        post_id: i64,
        content: &str,
    ) -> FeedResult<Comment> {
        let content = require_content(content, "Comment cannot be empty")?;
        Ok(self.repo.insert_comment(author_id, post_id, &content).await?)
    }

    /// Idempotent: liking an already-liked post succeeds without a new row.
    pub async fn like_post(&self, user_id: &str, post_id: i64) -> FeedResult<()> {
        let inserted = self.repo.insert_like(user_id, post_id).await?;
        if !inserted {
            tracing::debug!(post_id, user_id, "Post already liked");
        }
        Ok(())
    }

    /// Removing a like that does not exist is not an error.
    pub async fn unlike_post(&self, user_id: &str, post_id: i64) -> FeedResult<()> {
        self.repo.delete_like(user_id, post_id).await?;
        Ok(())
    }

    async fn require_owner(
        &self,
        requester_id: &str,
        post_id: i64,
        message: &'static str,
    ) -> FeedResult<Post> {
        let post = self
            .repo
            .get_post(post_id)
            .await?
            .ok_or(FeedError::NotFound)?;

        if post.user_id != requester_id {
            return Err(FeedError::Forbidden(message));
        }

        Ok(post)
    }
}

/// Trimmed content, or a validation error when nothing is left.
fn require_content(content: &str, message: &'static str) -> FeedResult<String> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(FeedError::Validation(message));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn require_content_trims() {
        assert_eq!(require_content("  hi  ", "x").unwrap(), "hi");
    }

    #[test]
    fn require_content_rejects_whitespace() {
        assert!(matches!(
            require_content(" \n\t ", "empty"),
            Err(FeedError::Validation("empty"))
        ));
    }

    #[test]
    fn missing_post_maps_to_not_found() {
        let err: FeedError = RepositoryError::MissingPost(3).into();
        assert!(matches!(err, FeedError::NotFound));
    }
}
