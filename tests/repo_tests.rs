#![cfg(feature = "inmem-store")]

use agora::{
    models::{NewForum, NewPost, NewThread, UpdateForum, UpdateThread},
    repo::{inmem::InMemRepo, RepoError},
};
// Bring trait method namespaces into scope so calls on InMemRepo resolve.
use agora::repo::{ForumRepo, PostRepo, ThreadRepo};

/// Helper that returns a fresh, empty repository for every test run.
fn repo() -> InMemRepo {
    // isolate state: do **not** persist to the default file path
    std::env::set_var("AGORA_DATA_DIR", tempfile::tempdir().unwrap().into_path());
    InMemRepo::new()
}

fn new_post(thread_id: i64, parent_id: Option<i64>, body: &str) -> NewPost {
    NewPost {
        body: body.into(),
        thread_id,
        parent_id,
    }
}

/// forum + thread fixture most post tests hang off of.
async fn forum_and_thread(r: &InMemRepo) -> (i64, i64) {
    let forum = r
        .create_forum(
            "bill",
            NewForum {
                name: "general".into(),
                description: "best forum ever".into(),
            },
        )
        .await
        .unwrap();
    let thread = r
        .create_thread(
            "bill",
            NewThread {
                forum_id: forum.id,
                subject: "first thread".into(),
                tags: vec![],
            },
        )
        .await
        .unwrap();
    (forum.id, thread.id)
}

#[tokio::test]
async fn forum_crud_and_ownership() {
    let r = repo();

    assert_eq!(r.list_forums(20, 0).await.unwrap().count, 0);

    let f = r
        .create_forum(
            "bill",
            NewForum {
                name: "tech".into(),
                description: "tech talk".into(),
            },
        )
        .await
        .unwrap();
    assert_eq!(f.name, "tech");
    assert_eq!(f.owner, "bill");

    // non-owner cannot update
    let err = r
        .update_forum(
            f.id,
            "eve",
            UpdateForum {
                name: Some("hacked".into()),
                description: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, RepoError::Forbidden));

    let updated = r
        .update_forum(
            f.id,
            "bill",
            UpdateForum {
                name: Some("technology".into()),
                description: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.name, "technology");
    assert_eq!(updated.description, "tech talk");

    let page = r.list_forums(20, 0).await.unwrap();
    assert_eq!(page.count, 1);
    assert_eq!(page.total, 1);

    assert_eq!(r.delete_forum(f.id, "bill").await.unwrap(), f.id);
    assert!(matches!(
        r.get_forum(f.id).await.unwrap_err(),
        RepoError::NotFound
    ));
}

#[tokio::test]
async fn thread_crud_and_tag_limits() {
    let r = repo();
    let (forum_id, thread_id) = forum_and_thread(&r).await;

    let t = r.get_thread(thread_id).await.unwrap();
    assert!(t.open);
    assert!(!t.locked);
    assert_eq!(t.forum_id, forum_id);

    // creating in an unknown forum is NotFound
    let err = r
        .create_thread(
            "bill",
            NewThread {
                forum_id: 999,
                subject: "nope".into(),
                tags: vec![],
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, RepoError::NotFound));

    // too many tags rejected
    let err = r
        .create_thread(
            "bill",
            NewThread {
                forum_id,
                subject: "tagged".into(),
                tags: vec!["t".into(); 51],
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, RepoError::Invalid(_)));

    // oversized tag rejected on update too
    let err = r
        .update_thread(
            thread_id,
            "bill",
            UpdateThread {
                subject: None,
                tags: Some(vec!["x".repeat(51)]),
                open: None,
                locked: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, RepoError::Invalid(_)));

    // author updates subject + locks the thread
    let updated = r
        .update_thread(
            thread_id,
            "bill",
            UpdateThread {
                subject: Some("renamed".into()),
                tags: Some(vec!["rust".into()]),
                open: None,
                locked: Some(true),
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.subject, "renamed");
    assert_eq!(updated.tags, vec!["rust".to_string()]);
    assert!(updated.locked);

    // non-author cannot delete
    let err = r.delete_thread(thread_id, "eve").await.unwrap_err();
    assert!(matches!(err, RepoError::Forbidden));
    assert_eq!(r.delete_thread(thread_id, "bill").await.unwrap(), thread_id);
}

#[tokio::test]
async fn root_post_path_is_own_id() {
    let r = repo();
    let (_, thread_id) = forum_and_thread(&r).await;

    let post = r
        .create_post("bill", new_post(thread_id, None, "root"))
        .await
        .unwrap();
    assert_eq!(post.path, vec![post.id]);
    assert_eq!(post.parent_id, None);

    let fetched = r.get_post(post.id).await.unwrap();
    assert_eq!(fetched.path, post.path);
}

#[tokio::test]
async fn child_path_extends_parent_path() {
    let r = repo();
    let (_, thread_id) = forum_and_thread(&r).await;

    let parent = r
        .create_post("bill", new_post(thread_id, None, "parent"))
        .await
        .unwrap();
    let child = r
        .create_post("bill", new_post(thread_id, Some(parent.id), "child"))
        .await
        .unwrap();
    let grandchild = r
        .create_post("bill", new_post(thread_id, Some(child.id), "grandchild"))
        .await
        .unwrap();

    // child's path is the parent's path with its own id appended
    let mut expected = parent.path.clone();
    expected.push(child.id);
    assert_eq!(child.path, expected);

    let mut expected = child.path.clone();
    expected.push(grandchild.id);
    assert_eq!(grandchild.path, expected);
    assert_eq!(*grandchild.path.last().unwrap(), grandchild.id);
}

#[tokio::test]
async fn create_post_rejects_bad_parents() {
    let r = repo();
    let (forum_id, thread_id) = forum_and_thread(&r).await;

    // unknown parent
    let err = r
        .create_post("bill", new_post(thread_id, Some(999), "orphan"))
        .await
        .unwrap_err();
    assert!(matches!(err, RepoError::InvalidParent));

    // parent from another thread
    let other = r
        .create_thread(
            "bill",
            NewThread {
                forum_id,
                subject: "other thread".into(),
                tags: vec![],
            },
        )
        .await
        .unwrap();
    let foreign = r
        .create_post("bill", new_post(other.id, None, "elsewhere"))
        .await
        .unwrap();
    let err = r
        .create_post("bill", new_post(thread_id, Some(foreign.id), "cross"))
        .await
        .unwrap_err();
    assert!(matches!(err, RepoError::InvalidParent));

    // unknown thread
    let err = r
        .create_post("bill", new_post(999, None, "nowhere"))
        .await
        .unwrap_err();
    assert!(matches!(err, RepoError::NotFound));
}

#[tokio::test]
async fn locked_thread_rejects_new_posts() {
    let r = repo();
    let (_, thread_id) = forum_and_thread(&r).await;

    r.update_thread(
        thread_id,
        "bill",
        UpdateThread {
            subject: None,
            tags: None,
            open: None,
            locked: Some(true),
        },
    )
    .await
    .unwrap();

    let err = r
        .create_post("bill", new_post(thread_id, None, "too late"))
        .await
        .unwrap_err();
    assert!(matches!(err, RepoError::Conflict));
}

#[tokio::test]
async fn listing_orders_depth_first() {
    let r = repo();
    let (_, thread_id) = forum_and_thread(&r).await;

    // post1 (root) -> post2, post3 children of post1, post4 child of post2
    let post1 = r
        .create_post("bill", new_post(thread_id, None, "post 1"))
        .await
        .unwrap();
    let post2 = r
        .create_post("bill", new_post(thread_id, Some(post1.id), "post 2"))
        .await
        .unwrap();
    let post3 = r
        .create_post("bill", new_post(thread_id, Some(post1.id), "post 3"))
        .await
        .unwrap();
    let post4 = r
        .create_post("bill", new_post(thread_id, Some(post2.id), "post 4"))
        .await
        .unwrap();

    let page = r.list_posts_by_thread(thread_id, 20, 0).await.unwrap();
    assert_eq!(page.count, 4);
    assert_eq!(page.total, 4);
    let ids: Vec<_> = page.results.iter().map(|p| p.id).collect();
    // parent before subtree, then the next sibling: 1, 2, 4, 3
    assert_eq!(ids, vec![post1.id, post2.id, post4.id, post3.id]);

    // a strict path prefix never appears after one of its descendants
    for (i, earlier) in page.results.iter().enumerate() {
        for later in &page.results[i + 1..] {
            if later.path.len() < earlier.path.len() {
                assert!(
                    !earlier.path.starts_with(&later.path),
                    "ancestor {:?} listed after descendant {:?}",
                    later.path,
                    earlier.path
                );
            }
        }
    }

    // pagination slices the globally ordered sequence
    let page = r.list_posts_by_thread(thread_id, 2, 1).await.unwrap();
    let ids: Vec<_> = page.results.iter().map(|p| p.id).collect();
    assert_eq!(ids, vec![post2.id, post4.id]);
    assert_eq!(page.count, 2);

    // unknown thread is NotFound, not an empty page
    let err = r.list_posts_by_thread(999, 20, 0).await.unwrap_err();
    assert!(matches!(err, RepoError::NotFound));
}

#[tokio::test]
async fn delete_post_rules() {
    let r = repo();
    let (_, thread_id) = forum_and_thread(&r).await;

    let parent = r
        .create_post("bill", new_post(thread_id, None, "parent"))
        .await
        .unwrap();
    let child = r
        .create_post("bill", new_post(thread_id, Some(parent.id), "child"))
        .await
        .unwrap();

    // only the stored author may delete
    let err = r.delete_post(child.id, "eve").await.unwrap_err();
    assert!(matches!(err, RepoError::Forbidden));

    // a post with replies cannot be deleted
    let err = r.delete_post(parent.id, "bill").await.unwrap_err();
    assert!(matches!(err, RepoError::Conflict));

    // leaf-first works
    assert_eq!(r.delete_post(child.id, "bill").await.unwrap(), child.id);
    assert_eq!(r.delete_post(parent.id, "bill").await.unwrap(), parent.id);

    let err = r.delete_post(parent.id, "bill").await.unwrap_err();
    assert!(matches!(err, RepoError::NotFound));
}

#[tokio::test]
async fn thread_pages_by_forum() {
    let r = repo();
    let (forum_id, _) = forum_and_thread(&r).await;

    for i in 0..3 {
        r.create_thread(
            "bill",
            NewThread {
                forum_id,
                subject: format!("thread {i}"),
                tags: vec![],
            },
        )
        .await
        .unwrap();
    }

    let page = r.list_threads_by_forum(forum_id, 2, 0).await.unwrap();
    assert_eq!(page.count, 2);
    assert_eq!(page.total, 4); // fixture thread + 3 more
    let page = r.list_threads_by_forum(forum_id, 20, 3).await.unwrap();
    assert_eq!(page.count, 1);

    let err = r.list_threads_by_forum(999, 20, 0).await.unwrap_err();
    assert!(matches!(err, RepoError::NotFound));
}
