use crate::{
    errors::AppError,
    feed::MemeView,
    models::{Meme, ReactionKind, Template, UserId},
    overlay::{check_caption, CaptionRenderer, TextBlock},
    previews::Preview,
    reactions::ToggleResult,
    session::{AccessToken, Viewer},
    submission::{Generated, Upload},
    templates::{category_options, filter_by_category},
    AppState,
};
use axum::{
    extract::{rejection::JsonRejection, Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Serialize)]
pub struct SessionResponse {
    pub user_id: Option<UserId>,
}

/// A freshly published meme together with the reloaded feed.
#[derive(Serialize)]
pub struct SubmissionResponse {
    pub meme: Meme,
    pub feed: Vec<MemeView>,
}

#[derive(Deserialize)]
pub struct GenerateRequest {
    pub template_id: Uuid,
    #[serde(default)]
    pub top_text: String,
    #[serde(default)]
    pub bottom_text: String,
}

#[derive(Deserialize)]
pub struct TemplateQuery {
    pub category: Option<String>,
}

#[derive(Deserialize)]
pub struct PreviewQuery {
    #[serde(default)]
    pub top: String,
    #[serde(default)]
    pub bottom: String,
}

#[derive(Serialize)]
pub struct PreviewCreated {
    pub id: Uuid,
}

fn png_response(png: Vec<u8>) -> Response {
    ([(header::CONTENT_TYPE, "image/png")], png).into_response()
}

fn check_captions(top: &str, bottom: &str) -> Result<(), AppError> {
    check_caption(TextBlock::Top, top)
        .and_then(|()| check_caption(TextBlock::Bottom, bottom))
        .map_err(AppError::InvalidInput)
}

fn renderer(state: &AppState) -> Result<&CaptionRenderer, AppError> {
    state.renderer.as_ref().ok_or(AppError::GeneratorUnavailable)
}

async fn find_template(state: &AppState, id: Uuid) -> Result<Template, AppError> {
    state
        .templates
        .get_by_id(id)
        .await?
        .ok_or(AppError::TemplateNotFound(id))
}

/// Reads the selected file out of a multipart form along with any text fields.
async fn read_upload(multipart: &mut Multipart) -> Result<Upload, AppError> {
    let mut upload = Upload::default();
    let mut has_file = false;

    while let Some(field) = multipart.next_field().await? {
        let field_name = match field.name() {
            Some(name) => name.to_string(),
            None => continue,
        };
        match field_name.as_str() {
            "file" => {
                upload.file_name = field.file_name().unwrap_or("upload").to_string();
                upload.content_type = field.content_type().map(|m| m.to_string());
                upload.data = field.bytes().await?.to_vec();
                has_file = true;
            }
            "caption" => upload.caption = Some(field.text().await?),
            "category" => upload.category = Some(field.text().await?),
            "custom_category" => upload.custom_category = Some(field.text().await?),
            _ => tracing::debug!("Ignoring unknown multipart field: {}", field_name),
        }
    }

    if !has_file || upload.data.is_empty() {
        return Err(AppError::MissingFormField("file".to_string()));
    }

    // Guess content type from the file name if the client did not send one
    if upload.content_type.is_none() {
        upload.content_type = mime_guess::from_path(&upload.file_name)
            .first_raw()
            .map(str::to_string);
    }
    Ok(upload)
}

pub async fn get_session(viewer: Viewer) -> Json<SessionResponse> {
    Json(SessionResponse { user_id: viewer.0 })
}

pub async fn sign_out(
    State(state): State<Arc<AppState>>,
    AccessToken(token): AccessToken,
) -> Result<StatusCode, AppError> {
    state.session.sign_out(&token).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_memes(
    State(state): State<Arc<AppState>>,
    viewer: Viewer,
) -> Result<Json<Vec<MemeView>>, AppError> {
    let viewer = viewer.require()?;
    let feed = state.feed.load(&viewer).await;
    tracing::debug!(viewer = %viewer, memes = feed.len(), "Serving feed");
    Ok(Json(feed))
}

pub async fn upload_meme(
    State(state): State<Arc<AppState>>,
    viewer: Viewer,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<SubmissionResponse>), AppError> {
    let viewer = viewer.require()?;
    let upload = read_upload(&mut multipart).await?;

    let meme = state.submitter.submit_upload(&viewer, upload).await?;
    let feed = state.feed.load(&viewer).await;
    Ok((StatusCode::CREATED, Json(SubmissionResponse { meme, feed })))
}

pub async fn generate_meme(
    State(state): State<Arc<AppState>>,
    viewer: Viewer,
    request: Result<Json<GenerateRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<SubmissionResponse>), AppError> {
    let viewer = viewer.require()?;
    let Json(request) = request?;
    check_captions(&request.top_text, &request.bottom_text)?;
    let renderer = renderer(&state)?;
    let template = find_template(&state, request.template_id).await?;

    let background = renderer.fetch_background(&template.url).await.map_err(|e| {
        tracing::warn!(template_id = %template.id, error = %e, "Template background failed to load");
        AppError::TemplateImageUnavailable(template.url.clone())
    })?;
    let png = renderer
        .render_png(Some(background), &request.top_text, &request.bottom_text)
        .await
        .map_err(|e| AppError::InternalServerError(e.to_string()))?;

    let meme = state
        .submitter
        .submit_generated(
            &viewer,
            Generated {
                template: &template,
                png,
                top_text: &request.top_text,
                bottom_text: &request.bottom_text,
            },
        )
        .await?;
    let feed = state.feed.load(&viewer).await;
    Ok((StatusCode::CREATED, Json(SubmissionResponse { meme, feed })))
}

pub async fn toggle_reaction(
    State(state): State<Arc<AppState>>,
    viewer: Viewer,
    Path((id_str, kind)): Path<(String, String)>,
) -> Result<Json<ToggleResult>, AppError> {
    let viewer = viewer.require()?;
    let meme_id = Uuid::parse_str(&id_str)?;
    let kind: ReactionKind = kind.parse().map_err(|e| AppError::InvalidInput(format!("{}", e)))?;
    let result = state.toggle.toggle(meme_id, kind, Some(&viewer)).await?;
    Ok(Json(result))
}

pub async fn list_templates(
    State(state): State<Arc<AppState>>,
    viewer: Viewer,
    Query(query): Query<TemplateQuery>,
) -> Result<Json<Vec<Template>>, AppError> {
    viewer.require()?;
    let templates = state.templates.list().await?;
    Ok(Json(filter_by_category(templates, query.category.as_deref())))
}

pub async fn list_categories(
    State(state): State<Arc<AppState>>,
    viewer: Viewer,
) -> Result<Json<Vec<String>>, AppError> {
    viewer.require()?;
    let templates = state.templates.list().await?;
    Ok(Json(category_options(&templates)))
}

pub async fn preview_template(
    State(state): State<Arc<AppState>>,
    viewer: Viewer,
    Path(id_str): Path<String>,
    Query(query): Query<PreviewQuery>,
) -> Result<Response, AppError> {
    viewer.require()?;
    let template_id = Uuid::parse_str(&id_str)?;
    check_captions(&query.top, &query.bottom)?;
    let renderer = renderer(&state)?;
    let template = find_template(&state, template_id).await?;

    let png = renderer
        .preview(&template.url, &query.top, &query.bottom)
        .await
        .map_err(|e| AppError::InternalServerError(e.to_string()))?;
    Ok(png_response(png))
}

pub async fn create_preview(
    State(state): State<Arc<AppState>>,
    viewer: Viewer,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<PreviewCreated>), AppError> {
    viewer.require()?;
    let upload = read_upload(&mut multipart).await?;
    let id = state.previews.acquire(Preview {
        data: upload.data,
        content_type: upload
            .content_type
            .unwrap_or_else(|| "application/octet-stream".to_string()),
    });
    tracing::debug!(preview_id = %id, "Preview created");
    Ok((StatusCode::CREATED, Json(PreviewCreated { id })))
}

/// Serves a preview once; the handle is released as it is served.
pub async fn take_preview(
    State(state): State<Arc<AppState>>,
    Path(id_str): Path<String>,
) -> Result<Response, AppError> {
    let id = Uuid::parse_str(&id_str)?;
    let preview = state.previews.take(id).ok_or(AppError::PreviewNotFound(id))?;
    tracing::debug!(preview_id = %id, "Preview served and released");
    Ok(([(header::CONTENT_TYPE, preview.content_type)], preview.data).into_response())
}
