use std::sync::Arc;

use actix_web::{web, HttpResponse};
use serde::Deserialize;

use crate::auth::{Auth, Role};
use crate::error::ApiError;
use crate::models::*;
use crate::repo::Repo;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .service(
                web::resource("/forums")
                    .route(web::get().to(list_forums))
                    .route(web::post().to(create_forum)),
            )
            .service(
                web::resource("/forums/{id}")
                    .route(web::get().to(get_forum))
                    .route(web::put().to(update_forum))
                    .route(web::delete().to(delete_forum)),
            )
            .service(web::resource("/forums/{id}/threads").route(web::get().to(list_forum_threads)))
            .service(
                web::resource("/threads")
                    .route(web::get().to(list_threads))
                    .route(web::post().to(create_thread)),
            )
            .service(
                web::resource("/threads/{id}")
                    .route(web::get().to(get_thread))
                    .route(web::put().to(update_thread))
                    .route(web::delete().to(delete_thread)),
            )
            .service(web::resource("/threads/{id}/posts").route(web::get().to(list_thread_posts)))
            .service(web::resource("/posts").route(web::post().to(create_post)))
            .service(
                web::resource("/posts/{id}")
                    .route(web::get().to(get_post))
                    .route(web::delete().to(delete_post)),
            ),
    );
}

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn Repo>,
}

pub const DEFAULT_PAGE_LIMIT: i64 = 20;
const MAX_PAGE_LIMIT: i64 = 100;

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    DEFAULT_PAGE_LIMIT
}

impl PageQuery {
    fn bounds(&self) -> (i64, i64) {
        (self.limit.clamp(0, MAX_PAGE_LIMIT), self.offset.max(0))
    }
}

fn ensure_participant(auth: &Auth) -> Result<(), ApiError> {
    if !auth
        .0
        .roles
        .iter()
        .any(|r| matches!(r, Role::User | Role::Moderator | Role::Admin))
    {
        return Err(ApiError::Forbidden);
    }
    Ok(())
}

// ---------------- Forums -----------------------------------------

#[utoipa::path(
    get,
    path = "/api/v1/forums",
    params(
        ("limit" = Option<i64>, Query, description = "Page size (default 20)"),
        ("offset" = Option<i64>, Query, description = "Rows to skip (default 0)")
    ),
    responses(
        (status = 200, description = "Page of forums", body = ForumPage)
    )
)]
pub async fn list_forums(
    data: web::Data<AppState>,
    query: web::Query<PageQuery>,
) -> Result<HttpResponse, ApiError> {
    let (limit, offset) = query.bounds();
    let page = data.repo.list_forums(limit, offset).await?;
    Ok(HttpResponse::Ok().json(page))
}

#[utoipa::path(
    post,
    path = "/api/v1/forums",
    request_body = NewForum,
    responses(
        (status = 201, description = "Forum created", body = Forum),
        (status = 403, description = "Forbidden")
    )
)]
pub async fn create_forum(
    auth: Auth,
    data: web::Data<AppState>,
    payload: web::Json<NewForum>,
) -> Result<HttpResponse, ApiError> {
    ensure_participant(&auth)?;
    let forum = data
        .repo
        .create_forum(auth.author(), payload.into_inner())
        .await?;
    Ok(HttpResponse::Created().json(forum))
}

#[utoipa::path(
    get,
    path = "/api/v1/forums/{id}",
    params(("id" = Id, Path, description = "Forum id")),
    responses(
        (status = 200, description = "Forum", body = Forum),
        (status = 404, description = "Forum not found")
    )
)]
pub async fn get_forum(
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let forum = data.repo.get_forum(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(forum))
}

#[utoipa::path(
    put,
    path = "/api/v1/forums/{id}",
    request_body = UpdateForum,
    params(("id" = Id, Path, description = "Forum id")),
    responses(
        (status = 200, description = "Forum updated", body = Forum),
        (status = 403, description = "Forbidden - owner only"),
        (status = 404, description = "Forum not found")
    )
)]
pub async fn update_forum(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<UpdateForum>,
) -> Result<HttpResponse, ApiError> {
    let forum = data
        .repo
        .update_forum(path.into_inner(), auth.author(), payload.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(forum))
}

#[utoipa::path(
    delete,
    path = "/api/v1/forums/{id}",
    params(("id" = Id, Path, description = "Forum id")),
    responses(
        (status = 200, description = "Forum deleted"),
        (status = 403, description = "Forbidden - owner only"),
        (status = 404, description = "Forum not found")
    )
)]
pub async fn delete_forum(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let id = data
        .repo
        .delete_forum(path.into_inner(), auth.author())
        .await?;
    log::info!("forum {} deleted by {}", id, auth.author());
    Ok(HttpResponse::Ok().json(serde_json::json!({ "id": id })))
}

#[utoipa::path(
    get,
    path = "/api/v1/forums/{id}/threads",
    params(
        ("id" = Id, Path, description = "Forum id"),
        ("limit" = Option<i64>, Query, description = "Page size (default 20)"),
        ("offset" = Option<i64>, Query, description = "Rows to skip (default 0)")
    ),
    responses(
        (status = 200, description = "Page of the forum's threads", body = ThreadPage),
        (status = 404, description = "Forum not found")
    )
)]
pub async fn list_forum_threads(
    data: web::Data<AppState>,
    path: web::Path<Id>,
    query: web::Query<PageQuery>,
) -> Result<HttpResponse, ApiError> {
    let (limit, offset) = query.bounds();
    let page = data
        .repo
        .list_threads_by_forum(path.into_inner(), limit, offset)
        .await?;
    Ok(HttpResponse::Ok().json(page))
}

// ---------------- Threads ----------------------------------------

#[utoipa::path(
    get,
    path = "/api/v1/threads",
    params(
        ("limit" = Option<i64>, Query, description = "Page size (default 20)"),
        ("offset" = Option<i64>, Query, description = "Rows to skip (default 0)")
    ),
    responses(
        (status = 200, description = "Page of threads", body = ThreadPage)
    )
)]
pub async fn list_threads(
    data: web::Data<AppState>,
    query: web::Query<PageQuery>,
) -> Result<HttpResponse, ApiError> {
    let (limit, offset) = query.bounds();
    let page = data.repo.list_threads(limit, offset).await?;
    Ok(HttpResponse::Ok().json(page))
}

#[utoipa::path(
    post,
    path = "/api/v1/threads",
    request_body = NewThread,
    responses(
        (status = 201, description = "Thread created", body = Thread),
        (status = 400, description = "Tag limits exceeded"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Forum not found")
    )
)]
pub async fn create_thread(
    auth: Auth,
    data: web::Data<AppState>,
    payload: web::Json<NewThread>,
) -> Result<HttpResponse, ApiError> {
    ensure_participant(&auth)?;
    let thread = data
        .repo
        .create_thread(auth.author(), payload.into_inner())
        .await?;
    Ok(HttpResponse::Created().json(thread))
}

#[utoipa::path(
    get,
    path = "/api/v1/threads/{id}",
    params(("id" = Id, Path, description = "Thread id")),
    responses(
        (status = 200, description = "Thread", body = Thread),
        (status = 404, description = "Thread not found")
    )
)]
pub async fn get_thread(
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let thread = data.repo.get_thread(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(thread))
}

#[utoipa::path(
    put,
    path = "/api/v1/threads/{id}",
    request_body = UpdateThread,
    params(("id" = Id, Path, description = "Thread id")),
    responses(
        (status = 200, description = "Thread updated", body = Thread),
        (status = 400, description = "Tag limits exceeded"),
        (status = 403, description = "Forbidden - author only"),
        (status = 404, description = "Thread not found")
    )
)]
pub async fn update_thread(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<UpdateThread>,
) -> Result<HttpResponse, ApiError> {
    let thread = data
        .repo
        .update_thread(path.into_inner(), auth.author(), payload.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(thread))
}

#[utoipa::path(
    delete,
    path = "/api/v1/threads/{id}",
    params(("id" = Id, Path, description = "Thread id")),
    responses(
        (status = 200, description = "Thread deleted"),
        (status = 403, description = "Forbidden - author only"),
        (status = 404, description = "Thread not found")
    )
)]
pub async fn delete_thread(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let id = data
        .repo
        .delete_thread(path.into_inner(), auth.author())
        .await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "id": id })))
}

// ---------------- Posts ------------------------------------------

#[utoipa::path(
    get,
    path = "/api/v1/threads/{id}/posts",
    params(
        ("id" = Id, Path, description = "Thread id"),
        ("limit" = Option<i64>, Query, description = "Page size (default 20)"),
        ("offset" = Option<i64>, Query, description = "Rows to skip (default 0)")
    ),
    responses(
        (status = 200, description = "Page of the thread's posts in depth-first path order", body = PostPage),
        (status = 404, description = "Thread not found")
    )
)]
pub async fn list_thread_posts(
    data: web::Data<AppState>,
    path: web::Path<Id>,
    query: web::Query<PageQuery>,
) -> Result<HttpResponse, ApiError> {
    let (limit, offset) = query.bounds();
    let page = data
        .repo
        .list_posts_by_thread(path.into_inner(), limit, offset)
        .await?;
    Ok(HttpResponse::Ok().json(page))
}

#[utoipa::path(
    post,
    path = "/api/v1/posts",
    request_body = NewPost,
    responses(
        (status = 201, description = "Post created with its computed path", body = Post),
        (status = 400, description = "Parent missing or in a different thread"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Thread not found"),
        (status = 409, description = "Thread locked")
    )
)]
pub async fn create_post(
    auth: Auth,
    data: web::Data<AppState>,
    payload: web::Json<NewPost>,
) -> Result<HttpResponse, ApiError> {
    ensure_participant(&auth)?;
    let post = data
        .repo
        .create_post(auth.author(), payload.into_inner())
        .await?;
    Ok(HttpResponse::Created().json(post))
}

#[utoipa::path(
    get,
    path = "/api/v1/posts/{id}",
    params(("id" = Id, Path, description = "Post id")),
    responses(
        (status = 200, description = "Post", body = Post),
        (status = 404, description = "Post not found")
    )
)]
pub async fn get_post(
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let post = data.repo.get_post(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(post))
}

#[utoipa::path(
    delete,
    path = "/api/v1/posts/{id}",
    params(("id" = Id, Path, description = "Post id")),
    responses(
        (status = 200, description = "Post deleted"),
        (status = 403, description = "Forbidden - author only"),
        (status = 404, description = "Post not found"),
        (status = 409, description = "Post still has replies")
    )
)]
pub async fn delete_post(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let id = data
        .repo
        .delete_post(path.into_inner(), auth.author())
        .await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "id": id })))
}
