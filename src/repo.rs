use crate::models::*;
use crate::path::DecodeError;

use async_trait::async_trait;

#[derive(thiserror::Error, Debug)]
pub enum RepoError {
    #[error("not found")]
    NotFound,
    #[error("parent post missing or in a different thread")]
    InvalidParent,
    #[error("forbidden")]
    Forbidden,
    #[error("conflict")]
    Conflict,
    #[error("{0}")]
    Invalid(String),
    #[error("stored path is corrupt: {0}")]
    Corrupt(#[from] DecodeError),
    #[error("storage failure: {0}")]
    Internal(#[from] anyhow::Error),
}

pub type RepoResult<T> = Result<T, RepoError>;

#[async_trait]
pub trait ForumRepo: Send + Sync {
    async fn list_forums(&self, limit: i64, offset: i64) -> RepoResult<ForumPage>;
    async fn get_forum(&self, id: Id) -> RepoResult<Forum>;
    async fn create_forum(&self, owner: &str, new: NewForum) -> RepoResult<Forum>;
    async fn update_forum(&self, id: Id, owner: &str, upd: UpdateForum) -> RepoResult<Forum>;
    /// Owner-only; cascades to the forum's threads and their posts.
    async fn delete_forum(&self, id: Id, owner: &str) -> RepoResult<Id>;
}

#[async_trait]
pub trait ThreadRepo: Send + Sync {
    async fn list_threads(&self, limit: i64, offset: i64) -> RepoResult<ThreadPage>;
    async fn list_threads_by_forum(
        &self,
        forum_id: Id,
        limit: i64,
        offset: i64,
    ) -> RepoResult<ThreadPage>;
    async fn get_thread(&self, id: Id) -> RepoResult<Thread>;
    async fn create_thread(&self, author: &str, new: NewThread) -> RepoResult<Thread>;
    async fn update_thread(&self, id: Id, author: &str, upd: UpdateThread) -> RepoResult<Thread>;
    /// Owner-only; cascades to the thread's posts.
    async fn delete_thread(&self, id: Id, author: &str) -> RepoResult<Id>;
}

#[async_trait]
pub trait PostRepo: Send + Sync {
    async fn get_post(&self, id: Id) -> RepoResult<Post>;
    /// Inserts a post and computes its materialized path from the parent.
    /// The path is finalized before any reader can observe the row.
    async fn create_post(&self, author: &str, new: NewPost) -> RepoResult<Post>;
    /// Author-only. Fails with `Conflict` while the post still has replies,
    /// so a path can never reference a deleted ancestor.
    async fn delete_post(&self, id: Id, requesting_author: &str) -> RepoResult<Id>;
    /// A page of the thread's posts in depth-first path order: a parent
    /// immediately precedes its subtree, siblings ascend by id. limit/offset
    /// slice the globally ordered sequence.
    async fn list_posts_by_thread(
        &self,
        thread_id: Id,
        limit: i64,
        offset: i64,
    ) -> RepoResult<PostPage>;
}

pub trait Repo: ForumRepo + ThreadRepo + PostRepo {}

impl<T> Repo for T where T: ForumRepo + ThreadRepo + PostRepo {}

#[cfg(feature = "inmem-store")]
pub mod inmem {
    use super::*;
    use chrono::Utc;
    use serde::{Deserialize, Serialize};
    use std::collections::HashMap;
    use std::path::{Path as FsPath, PathBuf};
    use std::sync::{Arc, RwLock};

    const SNAPSHOT_PATH: &str = "data/state.json";

    #[derive(Default, Serialize, Deserialize)]
    struct State {
        forums: HashMap<Id, Forum>,
        threads: HashMap<Id, Thread>,
        posts: HashMap<Id, Post>,
        next_id: Id,
    }

    /// HashMap-backed store with JSON snapshot persistence. The whole state
    /// sits behind one `RwLock`, so id assignment and path computation happen
    /// under a single write guard.
    #[derive(Clone)]
    pub struct InMemRepo {
        state: Arc<RwLock<State>>,
        snapshot_path: Arc<PathBuf>,
    }

    impl InMemRepo {
        fn snapshot_path() -> PathBuf {
            match std::env::var("AGORA_DATA_DIR") {
                Ok(dir) => {
                    let mut p = PathBuf::from(dir);
                    p.push("state.json");
                    p
                }
                Err(_) => PathBuf::from(SNAPSHOT_PATH),
            }
        }

        fn load_state_from(path: &FsPath) -> State {
            match std::fs::read(path) {
                Ok(bytes) => match serde_json::from_slice::<State>(&bytes) {
                    Ok(s) => {
                        tracing::info!(snapshot = %path.display(), "loaded state snapshot");
                        s
                    }
                    Err(e) => {
                        tracing::warn!(snapshot = %path.display(), error = %e, "unreadable snapshot, starting empty");
                        State::default()
                    }
                },
                Err(_) => State::default(),
            }
        }

        fn persist(&self) {
            let path = self.snapshot_path.clone();
            if let Ok(s) = serde_json::to_vec_pretty(&*self.state.read().unwrap()) {
                if let Some(dir) = path.parent() {
                    let _ = std::fs::create_dir_all(dir);
                }
                if let Err(e) = std::fs::write(&*path, s) {
                    tracing::warn!(snapshot = %path.display(), error = %e, "failed to write snapshot");
                }
            }
        }

        pub fn new() -> Self {
            let snapshot_path = Self::snapshot_path();
            let state = Self::load_state_from(&snapshot_path);
            Self {
                state: Arc::new(RwLock::new(state)),
                snapshot_path: Arc::new(snapshot_path),
            }
        }

        fn next_id(state: &mut State) -> Id {
            state.next_id += 1;
            state.next_id
        }

        fn page_bounds(limit: i64, offset: i64) -> (usize, usize) {
            (limit.max(0) as usize, offset.max(0) as usize)
        }
    }

    impl Default for InMemRepo {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl ForumRepo for InMemRepo {
        async fn list_forums(&self, limit: i64, offset: i64) -> RepoResult<ForumPage> {
            let s = self.state.read().unwrap();
            let total = s.forums.len() as i64;
            let mut all: Vec<_> = s.forums.values().cloned().collect();
            all.sort_by_key(|f| f.id);
            let (limit, offset) = Self::page_bounds(limit, offset);
            let results: Vec<_> = all.into_iter().skip(offset).take(limit).collect();
            Ok(ForumPage::assemble(results, total))
        }

        async fn get_forum(&self, id: Id) -> RepoResult<Forum> {
            let s = self.state.read().unwrap();
            s.forums.get(&id).cloned().ok_or(RepoError::NotFound)
        }

        async fn create_forum(&self, owner: &str, new: NewForum) -> RepoResult<Forum> {
            let mut s = self.state.write().unwrap();
            let now = Utc::now();
            let id = Self::next_id(&mut s);
            let forum = Forum {
                id,
                name: new.name,
                owner: owner.to_string(),
                description: new.description,
                created: now,
                updated: now,
            };
            s.forums.insert(id, forum.clone());
            drop(s);
            self.persist();
            Ok(forum)
        }

        async fn update_forum(&self, id: Id, owner: &str, upd: UpdateForum) -> RepoResult<Forum> {
            let mut s = self.state.write().unwrap();
            let forum = s.forums.get_mut(&id).ok_or(RepoError::NotFound)?;
            if forum.owner != owner {
                return Err(RepoError::Forbidden);
            }
            if let Some(name) = upd.name {
                forum.name = name;
            }
            if let Some(description) = upd.description {
                forum.description = description;
            }
            forum.updated = Utc::now();
            let updated = forum.clone();
            drop(s);
            self.persist();
            Ok(updated)
        }

        async fn delete_forum(&self, id: Id, owner: &str) -> RepoResult<Id> {
            let mut s = self.state.write().unwrap();
            let forum = s.forums.get(&id).ok_or(RepoError::NotFound)?;
            if forum.owner != owner {
                return Err(RepoError::Forbidden);
            }
            s.forums.remove(&id);
            let dead_threads: Vec<Id> = s
                .threads
                .values()
                .filter(|t| t.forum_id == id)
                .map(|t| t.id)
                .collect();
            s.threads.retain(|_, t| t.forum_id != id);
            s.posts.retain(|_, p| !dead_threads.contains(&p.thread_id));
            drop(s);
            self.persist();
            Ok(id)
        }
    }

    #[async_trait]
    impl ThreadRepo for InMemRepo {
        async fn list_threads(&self, limit: i64, offset: i64) -> RepoResult<ThreadPage> {
            let s = self.state.read().unwrap();
            let total = s.threads.len() as i64;
            let mut all: Vec<_> = s.threads.values().cloned().collect();
            all.sort_by_key(|t| t.id);
            let (limit, offset) = Self::page_bounds(limit, offset);
            let results: Vec<_> = all.into_iter().skip(offset).take(limit).collect();
            Ok(ThreadPage::assemble(results, total))
        }

        async fn list_threads_by_forum(
            &self,
            forum_id: Id,
            limit: i64,
            offset: i64,
        ) -> RepoResult<ThreadPage> {
            let s = self.state.read().unwrap();
            if !s.forums.contains_key(&forum_id) {
                return Err(RepoError::NotFound);
            }
            let total = s.threads.len() as i64;
            let mut all: Vec<_> = s
                .threads
                .values()
                .filter(|t| t.forum_id == forum_id)
                .cloned()
                .collect();
            all.sort_by_key(|t| t.id);
            let (limit, offset) = Self::page_bounds(limit, offset);
            let results: Vec<_> = all.into_iter().skip(offset).take(limit).collect();
            Ok(ThreadPage::assemble(results, total))
        }

        async fn get_thread(&self, id: Id) -> RepoResult<Thread> {
            let s = self.state.read().unwrap();
            s.threads.get(&id).cloned().ok_or(RepoError::NotFound)
        }

        async fn create_thread(&self, author: &str, new: NewThread) -> RepoResult<Thread> {
            validate_tags(&new.tags).map_err(RepoError::Invalid)?;
            let mut s = self.state.write().unwrap();
            if !s.forums.contains_key(&new.forum_id) {
                return Err(RepoError::NotFound);
            }
            let now = Utc::now();
            let id = Self::next_id(&mut s);
            let thread = Thread {
                id,
                forum_id: new.forum_id,
                author: author.to_string(),
                subject: new.subject,
                open: true,
                locked: false,
                tags: new.tags,
                created: now,
                updated: now,
            };
            s.threads.insert(id, thread.clone());
            drop(s);
            self.persist();
            Ok(thread)
        }

        async fn update_thread(
            &self,
            id: Id,
            author: &str,
            upd: UpdateThread,
        ) -> RepoResult<Thread> {
            if let Some(ref tags) = upd.tags {
                validate_tags(tags).map_err(RepoError::Invalid)?;
            }
            let mut s = self.state.write().unwrap();
            let thread = s.threads.get_mut(&id).ok_or(RepoError::NotFound)?;
            if thread.author != author {
                return Err(RepoError::Forbidden);
            }
            if let Some(subject) = upd.subject {
                thread.subject = subject;
            }
            if let Some(tags) = upd.tags {
                thread.tags = tags;
            }
            if let Some(open) = upd.open {
                thread.open = open;
            }
            if let Some(locked) = upd.locked {
                thread.locked = locked;
            }
            thread.updated = Utc::now();
            let updated = thread.clone();
            drop(s);
            self.persist();
            Ok(updated)
        }

        async fn delete_thread(&self, id: Id, author: &str) -> RepoResult<Id> {
            let mut s = self.state.write().unwrap();
            let thread = s.threads.get(&id).ok_or(RepoError::NotFound)?;
            if thread.author != author {
                return Err(RepoError::Forbidden);
            }
            s.threads.remove(&id);
            s.posts.retain(|_, p| p.thread_id != id);
            drop(s);
            self.persist();
            Ok(id)
        }
    }

    #[async_trait]
    impl PostRepo for InMemRepo {
        async fn get_post(&self, id: Id) -> RepoResult<Post> {
            let s = self.state.read().unwrap();
            s.posts.get(&id).cloned().ok_or(RepoError::NotFound)
        }

        async fn create_post(&self, author: &str, new: NewPost) -> RepoResult<Post> {
            let mut s = self.state.write().unwrap();
            let thread = s.threads.get(&new.thread_id).ok_or(RepoError::NotFound)?;
            if thread.locked {
                return Err(RepoError::Conflict);
            }
            let ancestors = match new.parent_id {
                Some(parent_id) => {
                    let parent = s.posts.get(&parent_id).ok_or(RepoError::InvalidParent)?;
                    if parent.thread_id != new.thread_id {
                        return Err(RepoError::InvalidParent);
                    }
                    parent.path.clone()
                }
                None => Vec::new(),
            };
            // Id assignment and path computation stay under the same write
            // guard, so no reader can observe the post without its path.
            let id = Self::next_id(&mut s);
            let mut path = ancestors;
            path.push(id);
            let now = Utc::now();
            let post = Post {
                id,
                author: author.to_string(),
                body: new.body,
                parent_id: new.parent_id,
                thread_id: new.thread_id,
                path,
                created: now,
                updated: now,
            };
            s.posts.insert(id, post.clone());
            drop(s);
            self.persist();
            Ok(post)
        }

        async fn delete_post(&self, id: Id, requesting_author: &str) -> RepoResult<Id> {
            let mut s = self.state.write().unwrap();
            let post = s.posts.get(&id).ok_or(RepoError::NotFound)?;
            if post.author != requesting_author {
                return Err(RepoError::Forbidden);
            }
            if s.posts.values().any(|p| p.parent_id == Some(id)) {
                return Err(RepoError::Conflict);
            }
            s.posts.remove(&id);
            drop(s);
            self.persist();
            Ok(id)
        }

        async fn list_posts_by_thread(
            &self,
            thread_id: Id,
            limit: i64,
            offset: i64,
        ) -> RepoResult<PostPage> {
            let s = self.state.read().unwrap();
            if !s.threads.contains_key(&thread_id) {
                return Err(RepoError::NotFound);
            }
            let total = s.posts.len() as i64;
            let mut all: Vec<_> = s
                .posts
                .values()
                .filter(|p| p.thread_id == thread_id)
                .cloned()
                .collect();
            // Vec<Id> ordering is element-wise with a strict prefix first,
            // which is exactly depth-first traversal order.
            all.sort_by(|a, b| a.path.cmp(&b.path));
            let (limit, offset) = Self::page_bounds(limit, offset);
            let results: Vec<_> = all.into_iter().skip(offset).take(limit).collect();
            Ok(PostPage::assemble(results, total))
        }
    }
}

// Postgres implementation (feature = "postgres-store")
#[cfg(feature = "postgres-store")]
pub mod pg {
    use super::*;
    use crate::path::{self, encode};
    use chrono::{DateTime, Utc};
    use sqlx::{Pool, Postgres};

    const POST_COLUMNS: &str = "id, author, body, parent_id, thread_id, path, created, updated";
    const THREAD_COLUMNS: &str =
        "id, forum_id, author, subject, open, locked, tags, created, updated";
    const FORUM_COLUMNS: &str = "id, name, owner, description, created, updated";

    /// Raw row with the path still in its stored string form; the codec is
    /// the only way out of it.
    #[derive(sqlx::FromRow)]
    struct PostRow {
        id: Id,
        author: String,
        body: String,
        parent_id: Option<Id>,
        thread_id: Id,
        path: String,
        created: DateTime<Utc>,
        updated: DateTime<Utc>,
    }

    impl TryFrom<PostRow> for Post {
        type Error = RepoError;

        fn try_from(row: PostRow) -> Result<Self, Self::Error> {
            let path = path::decode(&row.path)?;
            Ok(Post {
                id: row.id,
                author: row.author,
                body: row.body,
                parent_id: row.parent_id,
                thread_id: row.thread_id,
                path,
                created: row.created,
                updated: row.updated,
            })
        }
    }

    /// Pool-backed store. The pool handle is injected by the caller; there is
    /// no process-global connection state.
    #[derive(Clone)]
    pub struct PgRepo {
        pool: Pool<Postgres>,
    }

    impl PgRepo {
        pub fn new(pool: Pool<Postgres>) -> Self {
            Self { pool }
        }

        /// Approximate live-row count from planner statistics; never a
        /// filtered COUNT(*).
        async fn table_total(&self, table: &str) -> RepoResult<i64> {
            let total: Option<i64> = sqlx::query_scalar(
                "SELECT n_live_tup::BIGINT FROM pg_stat_user_tables WHERE relname = $1",
            )
            .bind(table)
            .fetch_optional(&self.pool)
            .await
            .map_err(internal)?;
            Ok(total.unwrap_or(0))
        }
    }

    fn internal(e: sqlx::Error) -> RepoError {
        RepoError::Internal(e.into())
    }

    #[async_trait]
    impl ForumRepo for PgRepo {
        async fn list_forums(&self, limit: i64, offset: i64) -> RepoResult<ForumPage> {
            let total = self.table_total("forums").await?;
            let results = sqlx::query_as::<_, Forum>(&format!(
                "SELECT {FORUM_COLUMNS} FROM forums ORDER BY id LIMIT $1 OFFSET $2"
            ))
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(internal)?;
            Ok(ForumPage::assemble(results, total))
        }

        async fn get_forum(&self, id: Id) -> RepoResult<Forum> {
            sqlx::query_as::<_, Forum>(&format!(
                "SELECT {FORUM_COLUMNS} FROM forums WHERE id = $1"
            ))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(internal)?
            .ok_or(RepoError::NotFound)
        }

        async fn create_forum(&self, owner: &str, new: NewForum) -> RepoResult<Forum> {
            sqlx::query_as::<_, Forum>(&format!(
                "INSERT INTO forums (name, owner, description) VALUES ($1, $2, $3) \
                 RETURNING {FORUM_COLUMNS}"
            ))
            .bind(&new.name)
            .bind(owner)
            .bind(&new.description)
            .fetch_one(&self.pool)
            .await
            .map_err(internal)
        }

        async fn update_forum(&self, id: Id, owner: &str, upd: UpdateForum) -> RepoResult<Forum> {
            let stored: Option<String> =
                sqlx::query_scalar("SELECT owner FROM forums WHERE id = $1")
                    .bind(id)
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(internal)?;
            match stored {
                None => return Err(RepoError::NotFound),
                Some(stored) if stored != owner => return Err(RepoError::Forbidden),
                Some(_) => {}
            }
            sqlx::query_as::<_, Forum>(&format!(
                "UPDATE forums SET name = COALESCE($2, name), \
                 description = COALESCE($3, description), updated = now() \
                 WHERE id = $1 RETURNING {FORUM_COLUMNS}"
            ))
            .bind(id)
            .bind(upd.name)
            .bind(upd.description)
            .fetch_one(&self.pool)
            .await
            .map_err(internal)
        }

        async fn delete_forum(&self, id: Id, owner: &str) -> RepoResult<Id> {
            let stored: Option<String> =
                sqlx::query_scalar("SELECT owner FROM forums WHERE id = $1")
                    .bind(id)
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(internal)?;
            match stored {
                None => return Err(RepoError::NotFound),
                Some(stored) if stored != owner => return Err(RepoError::Forbidden),
                Some(_) => {}
            }
            // Threads and posts go with the forum via ON DELETE CASCADE.
            sqlx::query_scalar::<_, Id>("DELETE FROM forums WHERE id = $1 RETURNING id")
                .bind(id)
                .fetch_one(&self.pool)
                .await
                .map_err(internal)
        }
    }

    #[async_trait]
    impl ThreadRepo for PgRepo {
        async fn list_threads(&self, limit: i64, offset: i64) -> RepoResult<ThreadPage> {
            let total = self.table_total("threads").await?;
            let results = sqlx::query_as::<_, Thread>(&format!(
                "SELECT {THREAD_COLUMNS} FROM threads ORDER BY id LIMIT $1 OFFSET $2"
            ))
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(internal)?;
            Ok(ThreadPage::assemble(results, total))
        }

        async fn list_threads_by_forum(
            &self,
            forum_id: Id,
            limit: i64,
            offset: i64,
        ) -> RepoResult<ThreadPage> {
            self.get_forum(forum_id).await?;
            let total = self.table_total("threads").await?;
            let results = sqlx::query_as::<_, Thread>(&format!(
                "SELECT {THREAD_COLUMNS} FROM threads WHERE forum_id = $1 \
                 ORDER BY id LIMIT $2 OFFSET $3"
            ))
            .bind(forum_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(internal)?;
            Ok(ThreadPage::assemble(results, total))
        }

        async fn get_thread(&self, id: Id) -> RepoResult<Thread> {
            sqlx::query_as::<_, Thread>(&format!(
                "SELECT {THREAD_COLUMNS} FROM threads WHERE id = $1"
            ))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(internal)?
            .ok_or(RepoError::NotFound)
        }

        async fn create_thread(&self, author: &str, new: NewThread) -> RepoResult<Thread> {
            validate_tags(&new.tags).map_err(RepoError::Invalid)?;
            let forum_exists: Option<Id> =
                sqlx::query_scalar("SELECT id FROM forums WHERE id = $1")
                    .bind(new.forum_id)
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(internal)?;
            if forum_exists.is_none() {
                return Err(RepoError::NotFound);
            }
            sqlx::query_as::<_, Thread>(&format!(
                "INSERT INTO threads (forum_id, author, subject, tags) \
                 VALUES ($1, $2, $3, $4) RETURNING {THREAD_COLUMNS}"
            ))
            .bind(new.forum_id)
            .bind(author)
            .bind(&new.subject)
            .bind(&new.tags)
            .fetch_one(&self.pool)
            .await
            .map_err(internal)
        }

        async fn update_thread(
            &self,
            id: Id,
            author: &str,
            upd: UpdateThread,
        ) -> RepoResult<Thread> {
            if let Some(ref tags) = upd.tags {
                validate_tags(tags).map_err(RepoError::Invalid)?;
            }
            let stored: Option<String> =
                sqlx::query_scalar("SELECT author FROM threads WHERE id = $1")
                    .bind(id)
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(internal)?;
            match stored {
                None => return Err(RepoError::NotFound),
                Some(stored) if stored != author => return Err(RepoError::Forbidden),
                Some(_) => {}
            }
            sqlx::query_as::<_, Thread>(&format!(
                "UPDATE threads SET subject = COALESCE($2, subject), \
                 tags = COALESCE($3, tags), open = COALESCE($4, open), \
                 locked = COALESCE($5, locked), updated = now() \
                 WHERE id = $1 RETURNING {THREAD_COLUMNS}"
            ))
            .bind(id)
            .bind(upd.subject)
            .bind(upd.tags)
            .bind(upd.open)
            .bind(upd.locked)
            .fetch_one(&self.pool)
            .await
            .map_err(internal)
        }

        async fn delete_thread(&self, id: Id, author: &str) -> RepoResult<Id> {
            let stored: Option<String> =
                sqlx::query_scalar("SELECT author FROM threads WHERE id = $1")
                    .bind(id)
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(internal)?;
            match stored {
                None => return Err(RepoError::NotFound),
                Some(stored) if stored != author => return Err(RepoError::Forbidden),
                Some(_) => {}
            }
            sqlx::query_scalar::<_, Id>("DELETE FROM threads WHERE id = $1 RETURNING id")
                .bind(id)
                .fetch_one(&self.pool)
                .await
                .map_err(internal)
        }
    }

    #[async_trait]
    impl PostRepo for PgRepo {
        async fn get_post(&self, id: Id) -> RepoResult<Post> {
            let row = sqlx::query_as::<_, PostRow>(&format!(
                "SELECT {POST_COLUMNS} FROM posts WHERE id = $1"
            ))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(internal)?
            .ok_or(RepoError::NotFound)?;
            Post::try_from(row)
        }

        async fn create_post(&self, author: &str, new: NewPost) -> RepoResult<Post> {
            // Insert, read back the generated id, compute the path, store it:
            // one transaction, so the placeholder path is never visible.
            let mut tx = self.pool.begin().await.map_err(internal)?;

            let thread: Option<(Id, bool)> =
                sqlx::query_as("SELECT id, locked FROM threads WHERE id = $1")
                    .bind(new.thread_id)
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(internal)?;
            match thread {
                None => return Err(RepoError::NotFound),
                Some((_, true)) => return Err(RepoError::Conflict),
                Some((_, false)) => {}
            }

            let ancestors = match new.parent_id {
                Some(parent_id) => {
                    let parent: Option<(Id, String)> =
                        sqlx::query_as("SELECT thread_id, path FROM posts WHERE id = $1")
                            .bind(parent_id)
                            .fetch_optional(&mut *tx)
                            .await
                            .map_err(internal)?;
                    let (parent_thread, parent_path) = parent.ok_or(RepoError::InvalidParent)?;
                    if parent_thread != new.thread_id {
                        return Err(RepoError::InvalidParent);
                    }
                    path::decode(&parent_path)?
                }
                None => Vec::new(),
            };

            let inserted: Id = sqlx::query_scalar(
                "INSERT INTO posts (author, body, parent_id, thread_id, path) \
                 VALUES ($1, $2, $3, $4, '') RETURNING id",
            )
            .bind(author)
            .bind(&new.body)
            .bind(new.parent_id)
            .bind(new.thread_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(internal)?;

            let mut chain = ancestors;
            chain.push(inserted);
            let row = sqlx::query_as::<_, PostRow>(&format!(
                "UPDATE posts SET path = $2 WHERE id = $1 RETURNING {POST_COLUMNS}"
            ))
            .bind(inserted)
            .bind(encode(&chain))
            .fetch_one(&mut *tx)
            .await
            .map_err(internal)?;

            tx.commit().await.map_err(internal)?;
            Post::try_from(row)
        }

        async fn delete_post(&self, id: Id, requesting_author: &str) -> RepoResult<Id> {
            let mut tx = self.pool.begin().await.map_err(internal)?;
            let stored: Option<String> =
                sqlx::query_scalar("SELECT author FROM posts WHERE id = $1")
                    .bind(id)
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(internal)?;
            match stored {
                None => return Err(RepoError::NotFound),
                Some(stored) if stored != requesting_author => return Err(RepoError::Forbidden),
                Some(_) => {}
            }
            let has_children: bool =
                sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM posts WHERE parent_id = $1)")
                    .bind(id)
                    .fetch_one(&mut *tx)
                    .await
                    .map_err(internal)?;
            if has_children {
                return Err(RepoError::Conflict);
            }
            let deleted: Id = sqlx::query_scalar("DELETE FROM posts WHERE id = $1 RETURNING id")
                .bind(id)
                .fetch_one(&mut *tx)
                .await
                .map_err(internal)?;
            tx.commit().await.map_err(internal)?;
            Ok(deleted)
        }

        async fn list_posts_by_thread(
            &self,
            thread_id: Id,
            limit: i64,
            offset: i64,
        ) -> RepoResult<PostPage> {
            self.get_thread(thread_id).await?;
            let total = self.table_total("posts").await?;
            // Array comparison is element-wise with a strict prefix sorting
            // first, matching the in-memory Vec<Id> ordering exactly. Plain
            // ORDER BY path would put "10" before "2".
            let rows = sqlx::query_as::<_, PostRow>(&format!(
                "SELECT {POST_COLUMNS} FROM posts WHERE thread_id = $1 \
                 ORDER BY string_to_array(path, '.')::bigint[] LIMIT $2 OFFSET $3"
            ))
            .bind(thread_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(internal)?;
            let results = rows
                .into_iter()
                .map(Post::try_from)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(PostPage::assemble(results, total))
        }
    }
}
