use actix_multipart::{Field, Multipart};
use actix_web::{web, HttpMessage, HttpRequest};
use futures_util::StreamExt;

use common::{
    error::{self, AddCode},
    media::ImageUpload,
};

use super::issue::CreateIssue;

pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;
const MAX_TEXT_BYTES: usize = 16 * 1024;
const MAX_JSON_BYTES: usize = 64 * 1024;
const IMAGE_SUBTYPES: [&str; 5] = ["jpeg", "jpg", "png", "gif", "webp"];

/// Media type names compare case-insensitively; an unparsable header is not multipart.
fn is_multipart(req: &HttpRequest) -> bool {
    match req.mime_type() {
        Ok(Some(mime)) => mime.type_() == "multipart" && mime.subtype() == "form-data",
        _ => false,
    }
}

/// Reads a report from either a multipart form (with an optional `image` part) or a
/// JSON body.
pub async fn read_issue_form(
    req: &HttpRequest,
    payload: web::Payload,
) -> error::Result<(CreateIssue, Option<ImageUpload>)> {
    if is_multipart(req) {
        read_multipart(Multipart::new(req.headers(), payload)).await
    } else {
        Ok((read_json(payload).await?, None))
    }
}

async fn read_json(mut payload: web::Payload) -> error::Result<CreateIssue> {
    let mut body = web::BytesMut::new();
    while let Some(chunk) = payload.next().await {
        let chunk = chunk
            .map_err(|err| anyhow::anyhow!("Failed to read request body: {}", err).code(400))?;
        if body.len() + chunk.len() > MAX_JSON_BYTES {
            return Err(anyhow::anyhow!("Request body is too large").code(400));
        }
        body.extend_from_slice(&chunk);
    }

    if body.is_empty() {
        return Ok(CreateIssue::default());
    }

    serde_json::from_slice(&body)
        .map_err(|err| anyhow::anyhow!("Invalid request body: {}", err).code(400))
}

async fn read_multipart(
    mut multipart: Multipart,
) -> error::Result<(CreateIssue, Option<ImageUpload>)> {
    let mut request = CreateIssue::default();
    let mut image = None;

    while let Some(item) = multipart.next().await {
        let mut field =
            item.map_err(|err| anyhow::anyhow!("Malformed multipart body: {}", err).code(400))?;

        let name = field.name().to_string();
        match name.as_str() {
            "image" => {
                if image.is_some() {
                    return Err(anyhow::anyhow!("Only one image may be attached").code(400));
                }
                image = read_image(&mut field).await?;
            }
            "title" => request.title = Some(read_text(&mut field).await?),
            "description" => request.description = Some(read_text(&mut field).await?),
            "category" => request.category = Some(read_text(&mut field).await?),
            "location" => {
                request.location = Some(serde_json::Value::String(read_text(&mut field).await?))
            }
            _ => {
                log::debug!("Skipping unknown form field {}", name);
                read_limited(&mut field, MAX_TEXT_BYTES, "Form field").await?;
            }
        }
    }

    Ok((request, image))
}

async fn read_limited(field: &mut Field, limit: usize, what: &str) -> error::Result<Vec<u8>> {
    let mut bytes = Vec::new();
    while let Some(chunk) = field.next().await {
        let chunk = chunk
            .map_err(|err| anyhow::anyhow!("Malformed multipart body: {}", err).code(400))?;
        if bytes.len() + chunk.len() > limit {
            return Err(anyhow::anyhow!("{} exceeds the {} byte limit", what, limit).code(400));
        }
        bytes.extend_from_slice(&chunk);
    }
    Ok(bytes)
}

async fn read_text(field: &mut Field) -> error::Result<String> {
    let bytes = read_limited(field, MAX_TEXT_BYTES, "Form field").await?;
    String::from_utf8(bytes).map_err(|_| anyhow::anyhow!("Form fields must be UTF-8").code(400))
}

fn is_allowed_image(field: &Field) -> bool {
    field.content_type().map_or(false, |mime| {
        mime.type_().as_str() == "image" && IMAGE_SUBTYPES.contains(&mime.subtype().as_str())
    })
}

/// An empty file part counts as "no photo"; browsers send one when nothing was picked.
async fn read_image(field: &mut Field) -> error::Result<Option<ImageUpload>> {
    let file_name = field
        .content_disposition()
        .get_filename()
        .filter(|name| !name.is_empty())
        .unwrap_or("image")
        .to_string();
    let content_type = field.content_type().map(|mime| mime.to_string());
    let allowed = is_allowed_image(field);

    let bytes = read_limited(field, MAX_IMAGE_BYTES, "Image").await?;
    if bytes.is_empty() {
        return Ok(None);
    }

    let Some(content_type) = content_type.filter(|_| allowed) else {
        return Err(anyhow::anyhow!("Only image files are allowed!").code(400));
    };

    Ok(Some(ImageUpload {
        file_name,
        content_type,
        bytes,
    }))
}
