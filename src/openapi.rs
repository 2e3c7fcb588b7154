use crate::models::{
    Forum, ForumPage, NewForum, NewPost, NewThread, Post, PostPage, Thread, ThreadPage,
    UpdateForum, UpdateThread,
};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::list_forums,
        crate::routes::create_forum,
        crate::routes::get_forum,
        crate::routes::update_forum,
        crate::routes::delete_forum,
        crate::routes::list_forum_threads,
        crate::routes::list_threads,
        crate::routes::create_thread,
        crate::routes::get_thread,
        crate::routes::update_thread,
        crate::routes::delete_thread,
        crate::routes::list_thread_posts,
        crate::routes::create_post,
        crate::routes::get_post,
        crate::routes::delete_post,
    ),
    components(schemas(
        Forum, NewForum, UpdateForum, ForumPage,
        Thread, NewThread, UpdateThread, ThreadPage,
        Post, NewPost, PostPage,
    )),
    tags(
        (name = "forums", description = "Forum operations"),
        (name = "threads", description = "Thread operations"),
        (name = "posts", description = "Post operations and threaded listings"),
    )
)]
pub struct ApiDoc;
