//! Store pages
//!
//! - GET /, /stores, /stores/page/{page} - paginated listing
//! - GET /add, POST /add - create form and submit
//! - GET /stores/{id}/edit, POST /add/{id} - owner-only edit
//! - GET /store/{slug} - detail with reviews
//! - GET /tags, /tags/{tag} - tag listing with facets
//! - GET /top, /map, /hearts

use axum::{
    extract::{Multipart, Path, State},
    response::Response,
};
use tera::Context as TeraContext;

use crate::api::flash::redirect_with_flash;
use crate::api::middleware::{AppState, AuthenticatedUser};
use crate::api::page::{render, PageError, PageRequest};
use crate::api::upload::{discard_photo, read_store_form, UploadError};
use crate::services::{StoreDraft, StoreServiceError};
use crate::views::Flash;

/// Tags offered on the store form
pub const TAG_CHOICES: &[&str] = &["Wifi", "Open Late", "Family Friendly", "Vegetarian", "Licensed"];

pub const MSG_STORE_MISSING: &str = "That store doesn't exist!";

/// Map store failures on a page route, sending the visitor to `back` for
/// problems they can fix
fn store_error(err: StoreServiceError, back: &str) -> PageError {
    match err {
        StoreServiceError::Validation(messages) => PageError::redirect(back, Flash::errors(messages)),
        StoreServiceError::NotFound => PageError::redirect("/stores", Flash::error(MSG_STORE_MISSING)),
        StoreServiceError::Forbidden => PageError::redirect("/stores", Flash::error(err.to_string())),
        StoreServiceError::Internal(e) => PageError::Internal(e),
    }
}

/// Card helpers need the viewer's id and hearts
async fn insert_viewer(
    state: &AppState,
    req: &PageRequest,
    context: &mut TeraContext,
) -> Result<(), PageError> {
    let hearts = match req.user_id() {
        Some(user_id) => state
            .heart_service
            .hearts_of(user_id)
            .await
            .map_err(|e| PageError::Internal(e.into()))?
            .hearts,
        None => Vec::new(),
    };
    context.insert("user_id", &req.user_id().unwrap_or(0));
    context.insert("hearts", &hearts);
    Ok(())
}

/// GET / and GET /stores
pub async fn index(state: State<AppState>, req: PageRequest) -> Result<Response, PageError> {
    list_page(state, req, 1).await
}

/// GET /stores/page/{page}
pub async fn page(
    state: State<AppState>,
    req: PageRequest,
    Path(page): Path<i64>,
) -> Result<Response, PageError> {
    list_page(state, req, page).await
}

async fn list_page(State(state): State<AppState>, req: PageRequest, page: i64) -> Result<Response, PageError> {
    let listing = state
        .store_service
        .get_page(page)
        .await
        .map_err(|e| store_error(e, "/stores"))?;

    if listing.is_out_of_range() {
        let last = listing.pages.max(1);
        return Ok(redirect_with_flash(
            &format!("/stores/page/{}", last),
            Flash::info(format!(
                "Hi! You asked for page {}. But that doesn't exist. So I put you on page {}.",
                listing.page, last
            )),
        ));
    }

    let mut context = TeraContext::new();
    context.insert("stores", &listing.stores);
    context.insert("page", &listing.page);
    context.insert("pages", &listing.pages);
    context.insert("count", &listing.count);
    insert_viewer(&state, &req, &mut context).await?;
    render(&state, &req, "stores.html", "Stores", &context)
}

/// GET /add
pub async fn add_form(State(state): State<AppState>, req: PageRequest) -> Result<Response, PageError> {
    let mut context = TeraContext::new();
    context.insert("store", &None::<()>);
    context.insert("tag_choices", TAG_CHOICES);
    render(&state, &req, "editStore.html", "Add Store", &context)
}

/// Read the multipart form, turning refusals into a notice at `back`
async fn read_form(state: &AppState, multipart: Multipart, back: &str) -> Result<StoreDraft, PageError> {
    read_store_form(multipart, &state.config.upload)
        .await
        .map_err(|e| match e {
            UploadError::Rejected(message) => PageError::redirect(back, Flash::error(message)),
            UploadError::Internal(e) => PageError::Internal(e),
        })
}

/// POST /add
pub async fn create(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    multipart: Multipart,
) -> Result<Response, PageError> {
    let draft = read_form(&state, multipart, "/add").await?;
    let photo = draft.photo.clone();

    match state.store_service.create(draft, user.id).await {
        Ok(store) => Ok(redirect_with_flash(
            &format!("/store/{}", store.slug),
            Flash::success(format!(
                "Successfully Created {}. Care to leave a review?",
                tera::escape_html(&store.name)
            )),
        )),
        Err(e) => {
            discard_photo(&state.config.upload, photo.as_deref()).await;
            Err(store_error(e, "/add"))
        }
    }
}

/// GET /stores/{id}/edit
pub async fn edit_form(
    State(state): State<AppState>,
    req: PageRequest,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Response, PageError> {
    let store = state
        .store_service
        .get_for_edit(id, user.id)
        .await
        .map_err(|e| store_error(e, "/stores"))?;

    let mut context = TeraContext::new();
    context.insert("store", &store);
    context.insert("tag_choices", TAG_CHOICES);
    render(&state, &req, "editStore.html", &format!("Edit {}", store.name), &context)
}

/// POST /add/{id}
pub async fn update(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
    multipart: Multipart,
) -> Result<Response, PageError> {
    let back = format!("/stores/{}/edit", id);
    let draft = read_form(&state, multipart, &back).await?;
    let photo = draft.photo.clone();

    match state.store_service.update(id, draft, user.id).await {
        Ok(store) => Ok(redirect_with_flash(
            &back,
            Flash::success(format!(
                "Successfully updated <strong>{}</strong>. <a href=\"/store/{}\">View Store &rarr;</a>",
                tera::escape_html(&store.name),
                store.slug
            )),
        )),
        Err(e) => {
            discard_photo(&state.config.upload, photo.as_deref()).await;
            Err(store_error(e, &back))
        }
    }
}

/// GET /store/{slug}
pub async fn detail(
    State(state): State<AppState>,
    req: PageRequest,
    Path(slug): Path<String>,
) -> Result<Response, PageError> {
    let detail = state
        .store_service
        .find_by_slug(&slug)
        .await
        .map_err(|e| store_error(e, "/stores"))?;

    let mut context = TeraContext::new();
    context.insert("store", &detail.store);
    context.insert("author", &detail.author);
    context.insert("reviews", &detail.reviews);
    render(&state, &req, "store.html", &detail.store.name, &context)
}

/// GET /tags
pub async fn tags(state: State<AppState>, req: PageRequest) -> Result<Response, PageError> {
    tag_listing(state, req, None).await
}

/// GET /tags/{tag}
pub async fn tag(
    state: State<AppState>,
    req: PageRequest,
    Path(tag): Path<String>,
) -> Result<Response, PageError> {
    tag_listing(state, req, Some(tag)).await
}

async fn tag_listing(
    State(state): State<AppState>,
    req: PageRequest,
    tag: Option<String>,
) -> Result<Response, PageError> {
    let (stores, tags) = state
        .store_service
        .find_by_tag(tag.as_deref())
        .await
        .map_err(|e| store_error(e, "/stores"))?;

    let mut context = TeraContext::new();
    context.insert("tag", &tag);
    context.insert("tags", &tags);
    context.insert("stores", &stores);
    insert_viewer(&state, &req, &mut context).await?;
    render(&state, &req, "tag.html", "Tags", &context)
}

/// GET /top
pub async fn top(State(state): State<AppState>, req: PageRequest) -> Result<Response, PageError> {
    let stores = state
        .store_service
        .top_rated()
        .await
        .map_err(|e| store_error(e, "/stores"))?;

    let mut context = TeraContext::new();
    context.insert("stores", &stores);
    render(&state, &req, "topStores.html", "Top Stores!", &context)
}

/// GET /map
pub async fn map(State(state): State<AppState>, req: PageRequest) -> Result<Response, PageError> {
    render(&state, &req, "map.html", "Map", &TeraContext::new())
}

/// GET /hearts
pub async fn hearts(
    State(state): State<AppState>,
    req: PageRequest,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Response, PageError> {
    let stores = state
        .store_service
        .hearted_by(user.id)
        .await
        .map_err(|e| store_error(e, "/stores"))?;

    let mut context = TeraContext::new();
    context.insert("stores", &stores);
    insert_viewer(&state, &req, &mut context).await?;
    render(&state, &req, "stores.html", "Hearted Stores", &context)
}
