use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub type Id = i64;

/// Upper bounds on thread tags; violations are client errors.
pub const MAX_TAGS: usize = 50;
pub const MAX_TAG_LEN: usize = 50;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[cfg_attr(feature = "postgres-store", derive(sqlx::FromRow))]
pub struct Forum {
    pub id: Id,
    pub name: String,
    pub owner: String,
    pub description: String,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewForum {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UpdateForum {
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[cfg_attr(feature = "postgres-store", derive(sqlx::FromRow))]
pub struct Thread {
    pub id: Id,
    pub forum_id: Id,
    pub author: String,
    pub subject: String,
    pub open: bool,
    pub locked: bool,
    pub tags: Vec<String>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewThread {
    pub forum_id: Id,
    pub subject: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UpdateThread {
    pub subject: Option<String>,
    pub tags: Option<Vec<String>>,
    pub open: Option<bool>,
    pub locked: Option<bool>,
}

/// A post in a thread. `path` is the ancestor id chain from the thread root
/// down to (and including) this post; it is computed once at creation and
/// never changes.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Post {
    pub id: Id,
    pub author: String,
    pub body: String,
    pub parent_id: Option<Id>,
    pub thread_id: Id,
    pub path: Vec<Id>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewPost {
    pub body: String,
    pub thread_id: Id,
    pub parent_id: Option<Id>,
}

// Page envelopes: `count` is the exact number of rows in this page, `total`
// an approximate whole-table row count from storage statistics.

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ForumPage {
    pub count: i64,
    pub total: i64,
    pub results: Vec<Forum>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ThreadPage {
    pub count: i64,
    pub total: i64,
    pub results: Vec<Thread>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PostPage {
    pub count: i64,
    pub total: i64,
    pub results: Vec<Post>,
}

macro_rules! impl_assemble {
    ($page:ident, $item:ident) => {
        impl $page {
            pub fn assemble(results: Vec<$item>, total: i64) -> Self {
                Self {
                    count: results.len() as i64,
                    total,
                    results,
                }
            }
        }
    };
}

impl_assemble!(ForumPage, Forum);
impl_assemble!(ThreadPage, Thread);
impl_assemble!(PostPage, Post);

/// Enforce the tag limits shared by thread create and update.
pub fn validate_tags(tags: &[String]) -> Result<(), String> {
    if tags.len() > MAX_TAGS {
        return Err(format!("at most {MAX_TAGS} tags allowed"));
    }
    if let Some(tag) = tags.iter().find(|t| t.len() > MAX_TAG_LEN) {
        return Err(format!("tag {tag:?} exceeds {MAX_TAG_LEN} characters"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_assemble_counts_rows() {
        let page = PostPage::assemble(vec![], 42);
        assert_eq!(page.count, 0);
        assert_eq!(page.total, 42);
    }

    #[test]
    fn tag_limits() {
        assert!(validate_tags(&["rust".into(), "forums".into()]).is_ok());
        assert!(validate_tags(&vec!["t".to_string(); MAX_TAGS + 1]).is_err());
        assert!(validate_tags(&["x".repeat(MAX_TAG_LEN + 1)]).is_err());
        assert!(validate_tags(&["x".repeat(MAX_TAG_LEN)]).is_ok());
    }
}
